/*
 * @Date         : 2026-03-06
 * @Description  : 激活函数（relu/sigmoid/tanh/softmax/linear）及独立的 Activation 层
 */

use super::{ForwardCtx, LayerKernel, Trace};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Linear,
}

impl Activation {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "relu" => Some(Self::Relu),
            "sigmoid" => Some(Self::Sigmoid),
            "tanh" => Some(Self::Tanh),
            "softmax" => Some(Self::Softmax),
            "linear" => Some(Self::Linear),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::Tanh => "tanh",
            Self::Softmax => "softmax",
            Self::Linear => "linear",
        }
    }

    /// 原地作用于一行（softmax 在整行上归一化）
    pub fn apply(self, row: &mut [f32]) {
        match self {
            Self::Relu => row.iter_mut().for_each(|x| *x = x.max(0.0)),
            Self::Sigmoid => row.iter_mut().for_each(|x| *x = sigmoid(*x)),
            Self::Tanh => row.iter_mut().for_each(|x| *x = x.tanh()),
            Self::Softmax => softmax(row),
            Self::Linear => {}
        }
    }

    /// 由输出`y`与输出梯度求输入梯度（一行）
    pub fn backward(self, y: &[f32], grad: &[f32]) -> Vec<f32> {
        match self {
            Self::Relu => y
                .iter()
                .zip(grad)
                .map(|(&y, &g)| if y > 0.0 { g } else { 0.0 })
                .collect(),
            Self::Sigmoid => y.iter().zip(grad).map(|(&y, &g)| g * y * (1.0 - y)).collect(),
            Self::Tanh => y.iter().zip(grad).map(|(&y, &g)| g * (1.0 - y * y)).collect(),
            Self::Softmax => {
                // 雅可比-向量积：dz_i = y_i * (g_i - Σ_j y_j g_j)
                let dot: f32 = y.iter().zip(grad).map(|(y, g)| y * g).sum();
                y.iter().zip(grad).map(|(&y, &g)| y * (g - dot)).collect()
            }
            Self::Linear => grad.to_vec(),
        }
    }

    /// 对按`width`分行的缓冲区逐行作用
    pub fn apply_rows(self, data: &mut [f32], width: usize) {
        if self == Self::Linear || width == 0 {
            return;
        }
        data.chunks_mut(width).for_each(|row| self.apply(row));
    }

    pub fn backward_rows(self, y: &[f32], grad: &[f32], width: usize) -> Vec<f32> {
        if width == 0 {
            return grad.to_vec();
        }
        y.chunks(width)
            .zip(grad.chunks(width))
            .flat_map(|(y, g)| self.backward(y, g))
            .collect()
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// 数值稳定的 softmax（先减去最大值）
fn softmax(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }
    if sum > 0.0 {
        row.iter_mut().for_each(|x| *x /= sum);
    }
}

/// 独立的激活层（沿最后一维分行，softmax 在每行内归一化）
#[derive(Debug, Clone)]
pub struct ActivationLayer {
    activation: Activation,
    width: usize,
}

impl ActivationLayer {
    pub fn new(activation: Activation, width: usize) -> Self {
        Self { activation, width }
    }
}

impl LayerKernel for ActivationLayer {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let mut output = inputs[0].to_vec();
        self.activation.apply_rows(&mut output, self.width);
        (output, Trace::None)
    }

    fn backward(
        &self,
        _inputs: &[&[f32]],
        output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        vec![self.activation.backward_rows(output, grad_out, self.width)]
    }
}
