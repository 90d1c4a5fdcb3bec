/*
 * @Date         : 2026-03-06
 * @Description  : MaxPooling2D（二维最大池化）层
 *
 * 窗口大小 = 步长 = `pool_size`，不填充（尾部不足一个窗口的行列被丢弃）。
 * 通道在后，逐通道独立池化。反向时梯度只流向窗口内第一个最大值位置。
 */

use super::{ForwardCtx, LayerKernel, Trace};
use crate::tensor::Tensor;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct MaxPool2d {
    pool: usize,
    height: usize,
    width: usize,
    channels: usize,
}

impl MaxPool2d {
    /// `(height, width, channels)` 为输入尺寸
    pub fn new(pool: usize, (height, width, channels): (usize, usize, usize)) -> Self {
        Self {
            pool: pool.max(1),
            height,
            width,
            channels,
        }
    }

    pub fn output_dims(&self) -> (usize, usize, usize) {
        (self.height / self.pool, self.width / self.pool, self.channels)
    }

    /// 输出下标 → 窗口内最大值的输入下标
    fn argmax(&self, input: &[f32], out_index: usize) -> usize {
        let (_, out_w, c) = self.output_dims();
        let ch = out_index % c;
        let pixel = out_index / c;
        let (oy, ox) = (pixel / out_w, pixel % out_w);

        let mut best = (oy * self.pool * self.width + ox * self.pool) * c + ch;
        for py in 0..self.pool {
            for px in 0..self.pool {
                let iy = oy * self.pool + py;
                let ix = ox * self.pool + px;
                let index = (iy * self.width + ix) * c + ch;
                if input[index] > input[best] {
                    best = index;
                }
            }
        }
        best
    }
}

impl LayerKernel for MaxPool2d {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let input = inputs[0];
        let (out_h, out_w, c) = self.output_dims();
        let output = (0..out_h * out_w * c)
            .into_par_iter()
            .map(|i| input[self.argmax(input, i)])
            .collect();
        (output, Trace::None)
    }

    fn backward(
        &self,
        inputs: &[&[f32]],
        _output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        let input = inputs[0];
        let mut grad_input = vec![0.0; input.len()];
        for (i, g) in grad_out.iter().enumerate() {
            grad_input[self.argmax(input, i)] += g;
        }
        vec![grad_input]
    }
}
