//! 各层反向传播的数值梯度检查（中心差分）
//!
//! 损失取 `L = Σ output[i] · w[i]`，于是 `∂L/∂output = w`。

use super::values;
use crate::nn::layer::{Activation, BatchNorm, Conv2d, Dense, ForwardCtx, LayerKernel, Lstm};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;

const STEP: f32 = 1e-2;
const TOLERANCE: f32 = 2e-2;

fn weighted_sum<K: LayerKernel>(kernel: &K, input: &[f32], weights: &[f32]) -> f32 {
    let (output, _) = kernel.forward(&[input], &mut ForwardCtx::inference());
    output.iter().zip(weights).map(|(o, w)| o * w).sum()
}

fn set_param<K: LayerKernel>(kernel: &mut K, param: usize, index: usize, value: f32) {
    let mut params = kernel.params_mut();
    params[param].as_slice_mut()[index] = value;
}

/// 比较解析梯度与数值梯度（输入与全部参数）
fn check_gradients<K: LayerKernel>(mut kernel: K, input: &[f32]) {
    let (output, trace) = kernel.forward(&[input], &mut ForwardCtx::inference());
    let weights = values(output.len(), 7);
    let mut grads = kernel.zero_grads();
    let input_grads = kernel.backward(&[input], &output, &trace, &weights, &mut grads);
    assert_eq!(input_grads.len(), 1);
    assert_eq!(input_grads[0].len(), input.len());

    for j in 0..input.len() {
        let mut plus = input.to_vec();
        plus[j] += STEP;
        let mut minus = input.to_vec();
        minus[j] -= STEP;
        let numeric = (weighted_sum(&kernel, &plus, &weights)
            - weighted_sum(&kernel, &minus, &weights))
            / (2.0 * STEP);
        assert_abs_diff_eq!(input_grads[0][j], numeric, epsilon = TOLERANCE);
    }

    for p in 0..grads.len() {
        for j in 0..grads[p].size() {
            let original = kernel.params()[p].as_slice()[j];
            set_param(&mut kernel, p, j, original + STEP);
            let up = weighted_sum(&kernel, input, &weights);
            set_param(&mut kernel, p, j, original - STEP);
            let down = weighted_sum(&kernel, input, &weights);
            set_param(&mut kernel, p, j, original);
            let numeric = (up - down) / (2.0 * STEP);
            assert_abs_diff_eq!(grads[p].as_slice()[j], numeric, epsilon = TOLERANCE);
        }
    }
}

#[test]
fn test_dense_gradients() {
    let weight = Tensor::new(&values(12, 1), &[4, 3]);
    let bias = Tensor::new(&values(3, 2), &[3]);
    let dense = Dense::new(weight, Some(bias), Activation::Tanh);
    // 两行：作用于最后一维
    check_gradients(dense, &values(8, 3));
}

#[test]
fn test_dense_softmax_gradients() {
    let weight = Tensor::new(&values(15, 4), &[3, 5]);
    let dense = Dense::new(weight, None, Activation::Softmax);
    check_gradients(dense, &values(3, 5));
}

#[test]
fn test_conv2d_gradients() {
    // 3x3 卷积核，2 输入通道，2 个滤波器，输入 3x3
    let kernel = Tensor::new(&values(36, 11), &[3, 3, 2, 2]);
    let bias = Tensor::new(&values(2, 12), &[2]);
    let conv = Conv2d::new(kernel, Some(bias), Activation::Sigmoid, (3, 3));
    check_gradients(conv, &values(18, 13));
}

#[test]
fn test_lstm_last_state_gradients() {
    let (features, units) = (2, 3);
    let w_x = Tensor::new(&values(features * 4 * units, 21), &[features, 4 * units]);
    let w_h = Tensor::new(&values(units * 4 * units, 22), &[units, 4 * units]);
    let bias = Tensor::new(&values(4 * units, 23), &[4 * units]);
    let lstm = Lstm::new(w_x, w_h, bias, false);
    // 3 个时间步
    check_gradients(lstm, &values(3 * features, 24));
}

#[test]
fn test_lstm_sequence_gradients() {
    let (features, units) = (2, 2);
    let w_x = Tensor::new(&values(features * 4 * units, 31), &[features, 4 * units]);
    let w_h = Tensor::new(&values(units * 4 * units, 32), &[units, 4 * units]);
    let bias = Tensor::zeros(&[4 * units]);
    let lstm = Lstm::new(w_x, w_h, bias, true);
    check_gradients(lstm, &values(4 * features, 33));
}

#[test]
fn test_batch_norm_per_channel_gradients() {
    let mut bn = BatchNorm::new(2, 1e-3);
    set_param(&mut bn, 0, 0, 1.5);
    set_param(&mut bn, 0, 1, 0.5);
    set_param(&mut bn, 1, 1, -0.2);
    // 4 行 × 2 通道
    let input: Vec<f32> = values(8, 41).iter().map(|x| x * 2.0).collect();
    check_gradients(bn, &input);
}

#[test]
fn test_batch_norm_single_row_gradients() {
    let bn = BatchNorm::new(4, 1e-3);
    check_gradients(bn, &[0.5, -1.0, 2.0, 0.25]);
}
