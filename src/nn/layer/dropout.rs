/*
 * @Date         : 2026-03-06
 * @Description  : Dropout 层（inverted dropout）
 *
 * 训练时以概率 `rate` 置零，保留的元素乘 1/(1-rate)；推理时为恒等映射。
 */

use super::{ForwardCtx, LayerKernel, Trace};
use crate::tensor::Tensor;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
}

impl Dropout {
    /// `rate` 须在 [0, 1) 内（由参数模式保证）
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.999),
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl LayerKernel for Dropout {
    fn forward(&self, inputs: &[&[f32]], ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let input = inputs[0];
        let rate = self.rate;
        match ctx.rng() {
            Some(rng) if rate > 0.0 => {
                let keep = 1.0 / (1.0 - rate);
                let mask: Vec<f32> = input
                    .iter()
                    .map(|_| if rng.gen_bool(rate as f64) { 0.0 } else { keep })
                    .collect();
                let output = input.iter().zip(&mask).map(|(x, m)| x * m).collect();
                (output, Trace::Mask(mask))
            }
            _ => (input.to_vec(), Trace::None),
        }
    }

    fn backward(
        &self,
        _inputs: &[&[f32]],
        _output: &[f32],
        trace: &Trace,
        grad_out: &[f32],
        _grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        match trace {
            Trace::Mask(mask) => vec![grad_out.iter().zip(mask).map(|(g, m)| g * m).collect()],
            Trace::None => vec![grad_out.to_vec()],
        }
    }
}
