/*
 * @Date         : 2026-03-06
 * @Description  : Conv2D（二维卷积）层
 *
 * 设计决策：
 * - 通道在后：输入 [h, w, c]，输出 [h, w, filters]
 * - 步长 1、`same` 填充，空间尺寸不变（只改写通道维）
 * - 卷积核形状 [k, k, c, filters]，偏置形状 [filters]
 */

use super::{Activation, ForwardCtx, LayerKernel, Trace};
use crate::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct Conv2d {
    kernel: Tensor,
    bias: Option<Tensor>,
    activation: Activation,
    height: usize,
    width: usize,
    channels: usize,
    filters: usize,
    kernel_size: usize,
}

impl Conv2d {
    /// # 参数
    /// - `kernel`: [k, k, c, filters]
    /// - `(height, width)`: 输入空间尺寸
    pub fn new(
        kernel: Tensor,
        bias: Option<Tensor>,
        activation: Activation,
        (height, width): (usize, usize),
    ) -> Self {
        let shape = kernel.shape().to_vec();
        Self {
            kernel,
            bias,
            activation,
            height,
            width,
            channels: shape[2],
            filters: shape[3],
            kernel_size: shape[0],
        }
    }

    pub fn filters(&self) -> usize {
        self.filters
    }

    /// 对每个有效的 (输出像素, 卷积核位置) 调用 `f(输入下标, 卷积核下标偏移, 输出像素下标)`
    fn for_each_tap(&self, mut f: impl FnMut(usize, usize, usize)) {
        let (h, w, k) = (self.height as isize, self.width as isize, self.kernel_size);
        let pad = ((k - 1) / 2) as isize;
        for y in 0..h {
            for x in 0..w {
                let pixel = (y * w + x) as usize;
                for ky in 0..k {
                    let iy = y + ky as isize - pad;
                    if iy < 0 || iy >= h {
                        continue;
                    }
                    for kx in 0..k {
                        let ix = x + kx as isize - pad;
                        if ix < 0 || ix >= w {
                            continue;
                        }
                        let in_pixel = (iy * w + ix) as usize;
                        f(in_pixel, ky * k + kx, pixel);
                    }
                }
            }
        }
    }
}

impl LayerKernel for Conv2d {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let input = inputs[0];
        let (c, f) = (self.channels, self.filters);
        let kernel = self.kernel.as_slice();
        let pixels = self.height * self.width;

        let mut output = match &self.bias {
            Some(bias) => bias.as_slice().repeat(pixels),
            None => vec![0.0; pixels * f],
        };
        self.for_each_tap(|in_pixel, tap, pixel| {
            for ci in 0..c {
                let x = input[in_pixel * c + ci];
                let k_row = &kernel[(tap * c + ci) * f..(tap * c + ci + 1) * f];
                let out = &mut output[pixel * f..(pixel + 1) * f];
                for (o, k) in out.iter_mut().zip(k_row) {
                    *o += x * k;
                }
            }
        });
        self.activation.apply_rows(&mut output, f);
        (output, Trace::None)
    }

    fn backward(
        &self,
        inputs: &[&[f32]],
        output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        let input = inputs[0];
        let (c, f) = (self.channels, self.filters);
        let g = self.activation.backward_rows(output, grad_out, f);
        let kernel = self.kernel.as_slice();
        let mut grad_input = vec![0.0; input.len()];

        {
            let grad_kernel = grads[0].as_slice_mut();
            self.for_each_tap(|in_pixel, tap, pixel| {
                let g_row = &g[pixel * f..(pixel + 1) * f];
                for ci in 0..c {
                    let offset = (tap * c + ci) * f;
                    let x = input[in_pixel * c + ci];
                    let mut dx = 0.0;
                    for (o, go) in g_row.iter().enumerate() {
                        grad_kernel[offset + o] += x * go;
                        dx += kernel[offset + o] * go;
                    }
                    grad_input[in_pixel * c + ci] += dx;
                }
            });
        }

        if self.bias.is_some() {
            let grad_bias = grads[1].as_slice_mut();
            for g_row in g.chunks(f) {
                for (b, go) in grad_bias.iter_mut().zip(g_row) {
                    *b += go;
                }
            }
        }

        vec![grad_input]
    }

    fn params(&self) -> Vec<&Tensor> {
        std::iter::once(&self.kernel).chain(self.bias.as_ref()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        std::iter::once(&mut self.kernel)
            .chain(self.bias.as_mut())
            .collect()
    }
}
