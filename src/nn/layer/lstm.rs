/*
 * @Date         : 2026-03-07
 * @Description  : LSTM 层
 *
 * 输入 [timesteps, features]，门顺序 i/f/g/o：
 * - i = σ(x·W_xi + h·W_hi + b_i)
 * - f = σ(x·W_xf + h·W_hf + b_f)
 * - g = tanh(x·W_xg + h·W_hg + b_g)
 * - o = σ(x·W_xo + h·W_ho + b_o)
 * - c' = f ⊙ c + i ⊙ g，h' = o ⊙ tanh(c')
 *
 * 参数：W_x [features, 4u]、W_h [u, 4u]、b [4u]。
 * 输出最后一个隐藏状态 [u]，或 `return_sequences` 时全部隐藏状态 [timesteps, u]。
 * 反向传播时重新执行前向得到每个时间步的缓存，再做完整的 BPTT。
 */

use super::{ForwardCtx, LayerKernel, Trace, accumulate, activation::sigmoid};
use crate::tensor::Tensor;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct Lstm {
    w_x: Tensor,
    w_h: Tensor,
    bias: Tensor,
    features: usize,
    units: usize,
    return_sequences: bool,
}

/// 单个时间步的前向缓存
struct Step {
    h_prev: Array1<f32>,
    c_prev: Array1<f32>,
    i: Array1<f32>,
    f: Array1<f32>,
    g: Array1<f32>,
    o: Array1<f32>,
    c: Array1<f32>,
}

impl Lstm {
    pub fn new(w_x: Tensor, w_h: Tensor, bias: Tensor, return_sequences: bool) -> Self {
        let features = w_x.shape()[0];
        let units = w_h.shape()[0];
        Self {
            w_x,
            w_h,
            bias,
            features,
            units,
            return_sequences,
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    fn run(&self, input: &[f32]) -> Vec<Step> {
        let u = self.units;
        let steps = input.len() / self.features.max(1);
        let x = ArrayView2::from_shape((steps, self.features), &input[..steps * self.features])
            .expect("LSTM 输入长度须为特征数的整数倍");
        let w_x = self.w_x.view_2d(self.features, 4 * u);
        let w_h = self.w_h.view_2d(u, 4 * u);
        let bias = ArrayView1::from(self.bias.as_slice());

        let mut h = Array1::<f32>::zeros(u);
        let mut c = Array1::<f32>::zeros(u);
        let mut cache = Vec::with_capacity(steps);
        for x_t in x.axis_iter(Axis(0)) {
            let z = x_t.dot(&w_x) + h.dot(&w_h) + bias;
            let i = z.slice(ndarray::s![0..u]).mapv(sigmoid);
            let f = z.slice(ndarray::s![u..2 * u]).mapv(sigmoid);
            let g = z.slice(ndarray::s![2 * u..3 * u]).mapv(f32::tanh);
            let o = z.slice(ndarray::s![3 * u..4 * u]).mapv(sigmoid);
            let c_next = &f * &c + &i * &g;
            let h_next = &o * &c_next.mapv(f32::tanh);
            cache.push(Step {
                h_prev: h,
                c_prev: c,
                i,
                f,
                g,
                o,
                c: c_next.clone(),
            });
            h = h_next;
            c = c_next;
        }
        cache
    }

    fn hidden(step: &Step) -> Array1<f32> {
        &step.o * &step.c.mapv(f32::tanh)
    }
}

impl LayerKernel for Lstm {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let cache = self.run(inputs[0]);
        let output = if self.return_sequences {
            cache.iter().flat_map(|s| Self::hidden(s).to_vec()).collect()
        } else {
            cache
                .last()
                .map_or_else(|| vec![0.0; self.units], |s| Self::hidden(s).to_vec())
        };
        (output, Trace::None)
    }

    fn backward(
        &self,
        inputs: &[&[f32]],
        _output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        let input = inputs[0];
        let u = self.units;
        let fx = self.features;
        let cache = self.run(input);
        let steps = cache.len();

        let w_x = self.w_x.view_2d(fx, 4 * u);
        let w_h = self.w_h.view_2d(u, 4 * u);
        let mut grad_wx = ndarray::Array2::<f32>::zeros((fx, 4 * u));
        let mut grad_wh = ndarray::Array2::<f32>::zeros((u, 4 * u));
        let mut grad_b = Array1::<f32>::zeros(4 * u);
        let mut grad_input = vec![0.0; input.len()];

        let mut dh_next = Array1::<f32>::zeros(u);
        let mut dc_next = Array1::<f32>::zeros(u);
        for t in (0..steps).rev() {
            let step = &cache[t];
            // 外部梯度：序列模式每步都有，否则只有最后一步
            let mut dh = dh_next.clone();
            if self.return_sequences {
                dh += &ArrayView1::from(&grad_out[t * u..(t + 1) * u]);
            } else if t + 1 == steps {
                dh += &ArrayView1::from(&grad_out[..u]);
            }

            let tanh_c = step.c.mapv(f32::tanh);
            let d_o = &dh * &tanh_c;
            let dc = &dc_next + &(&dh * &step.o * &tanh_c.mapv(|v| 1.0 - v * v));
            let d_i = &dc * &step.g;
            let d_f = &dc * &step.c_prev;
            let d_g = &dc * &step.i;
            dc_next = &dc * &step.f;

            // 门的预激活梯度，按 i/f/g/o 拼接
            let mut dz = Array1::<f32>::zeros(4 * u);
            for k in 0..u {
                let (i, f, g, o) = (step.i[k], step.f[k], step.g[k], step.o[k]);
                dz[k] = d_i[k] * i * (1.0 - i);
                dz[u + k] = d_f[k] * f * (1.0 - f);
                dz[2 * u + k] = d_g[k] * (1.0 - g * g);
                dz[3 * u + k] = d_o[k] * o * (1.0 - o);
            }

            let x_t = ArrayView1::from(&input[t * fx..(t + 1) * fx]);
            let dz_row = dz.view().insert_axis(Axis(0));
            grad_wx += &x_t.insert_axis(Axis(1)).dot(&dz_row);
            grad_wh += &step.h_prev.view().insert_axis(Axis(1)).dot(&dz_row);
            grad_b += &dz;

            let dx = w_x.dot(&dz);
            for (acc, v) in grad_input[t * fx..(t + 1) * fx].iter_mut().zip(dx.iter()) {
                *acc += v;
            }
            dh_next = w_h.dot(&dz);
        }

        accumulate(&mut grads[0], &grad_wx.into_raw_vec());
        accumulate(&mut grads[1], &grad_wh.into_raw_vec());
        accumulate(&mut grads[2], &grad_b.to_vec());
        vec![grad_input]
    }

    fn params(&self) -> Vec<&Tensor> {
        vec![&self.w_x, &self.w_h, &self.bias]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.w_x, &mut self.w_h, &mut self.bias]
    }
}
