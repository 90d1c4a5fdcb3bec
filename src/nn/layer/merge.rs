/*
 * @Date         : 2026-03-07
 * @Description  : 无参数的结构性层：Flatten、Add、Concatenate
 */

use super::{ForwardCtx, LayerKernel, Trace};
use crate::tensor::Tensor;

/// 展平：缓冲区本来就是展平的，恒等映射
#[derive(Debug, Clone, Default)]
pub struct Flatten;

impl Flatten {
    pub fn new() -> Self {
        Self
    }
}

impl LayerKernel for Flatten {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        (inputs[0].to_vec(), Trace::None)
    }

    fn backward(
        &self,
        _inputs: &[&[f32]],
        _output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        vec![grad_out.to_vec()]
    }
}

/// 逐元素求和（所有输入长度相同）
#[derive(Debug, Clone)]
pub struct Add {
    arity: usize,
}

impl Add {
    pub fn new(arity: usize) -> Self {
        Self {
            arity: arity.max(1),
        }
    }
}

impl LayerKernel for Add {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let mut output = inputs[0].to_vec();
        for input in &inputs[1..] {
            for (o, x) in output.iter_mut().zip(input.iter()) {
                *o += x;
            }
        }
        (output, Trace::None)
    }

    fn backward(
        &self,
        _inputs: &[&[f32]],
        _output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        vec![grad_out.to_vec(); self.arity]
    }
}

/// 沿最后一维拼接
///
/// `widths[k]` 为第 k 个输入的最后一维大小，各输入的行数相同
#[derive(Debug, Clone)]
pub struct Concatenate {
    widths: Vec<usize>,
}

impl Concatenate {
    pub fn new(widths: Vec<usize>) -> Self {
        Self { widths }
    }

    fn total(&self) -> usize {
        self.widths.iter().sum()
    }
}

impl LayerKernel for Concatenate {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let rows = inputs[0].len() / self.widths[0].max(1);
        let mut output = Vec::with_capacity(rows * self.total());
        for r in 0..rows {
            for (input, &w) in inputs.iter().zip(&self.widths) {
                output.extend_from_slice(&input[r * w..(r + 1) * w]);
            }
        }
        (output, Trace::None)
    }

    fn backward(
        &self,
        _inputs: &[&[f32]],
        _output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        let total = self.total().max(1);
        let mut grads: Vec<Vec<f32>> = self
            .widths
            .iter()
            .map(|w| Vec::with_capacity(grad_out.len() / total * w))
            .collect();
        for row in grad_out.chunks(total) {
            let mut offset = 0;
            for (grad, &w) in grads.iter_mut().zip(&self.widths) {
                grad.extend_from_slice(&row[offset..offset + w]);
                offset += w;
            }
        }
        grads
    }
}
