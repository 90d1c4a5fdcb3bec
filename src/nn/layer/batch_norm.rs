/*
 * @Date         : 2026-03-06
 * @Description  : BatchNormalization 层
 *
 * 以最后一维为通道：对每个通道在当前缓冲区内求均值/方差后归一化，
 * 再做 `gamma * x̂ + beta`。gamma 初始化为 1，beta 初始化为 0。
 *
 * 缓冲区只有一行（例如 (batch, n) 的单个样本）时每个通道只有一个值，
 * 此时退化为整行共用一组统计量（层归一化）。
 */

use super::{ForwardCtx, LayerKernel, Trace, accumulate};
use crate::tensor::Tensor;

#[derive(Debug, Clone)]
pub struct BatchNorm {
    gamma: Tensor,
    beta: Tensor,
    epsilon: f32,
    channels: usize,
}

impl BatchNorm {
    pub fn new(channels: usize, epsilon: f32) -> Self {
        let channels = channels.max(1);
        Self {
            gamma: Tensor::filled(1.0, &[channels]),
            beta: Tensor::zeros(&[channels]),
            epsilon,
            channels,
        }
    }

    /// 统计分组数：多行时按通道，单行时整行一组
    fn groups(&self, input: &[f32]) -> usize {
        if input.len() > self.channels {
            self.channels
        } else {
            1
        }
    }

    /// 每组的 (均值, 1/√(方差+ε))
    fn statistics(&self, input: &[f32], groups: usize) -> Vec<(f32, f32)> {
        let count = (input.len() / groups).max(1) as f32;
        (0..groups)
            .map(|group| {
                let values = input.iter().skip(group).step_by(groups);
                let mean = values.clone().sum::<f32>() / count;
                let var = values.map(|x| (x - mean).powi(2)).sum::<f32>() / count;
                (mean, 1.0 / (var + self.epsilon).sqrt())
            })
            .collect()
    }
}

impl LayerKernel for BatchNorm {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let input = inputs[0];
        let groups = self.groups(input);
        let stats = self.statistics(input, groups);
        let (gamma, beta) = (self.gamma.as_slice(), self.beta.as_slice());
        let output = input
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let ch = i % self.channels;
                let (mean, inv_std) = stats[i % groups];
                gamma[ch] * (x - mean) * inv_std + beta[ch]
            })
            .collect();
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
        let c = self.channels;
        let groups = self.groups(input);
        let count = (input.len() / groups).max(1) as f32;
        let stats = self.statistics(input, groups);
        let gamma = self.gamma.as_slice();

        let x_hat = |i: usize| {
            let (mean, inv_std) = stats[i % groups];
            (input[i] - mean) * inv_std
        };

        let mut grad_gamma = vec![0.0; c];
        let mut grad_beta = vec![0.0; c];
        // 对 x̂ 的梯度逐组求 Σ 与 Σ·x̂
        let mut sum_g = vec![0.0; groups];
        let mut sum_gx = vec![0.0; groups];
        for (i, g) in grad_out.iter().enumerate() {
            let ch = i % c;
            grad_gamma[ch] += g * x_hat(i);
            grad_beta[ch] += g;
            let gx = g * gamma[ch];
            sum_g[i % groups] += gx;
            sum_gx[i % groups] += gx * x_hat(i);
        }
        accumulate(&mut grads[0], &grad_gamma);
        accumulate(&mut grads[1], &grad_beta);

        // dx = 1/σ · (ĝ - mean(ĝ) - x̂·mean(ĝ·x̂))，其中 ĝ = γ·g
        let grad_input = grad_out
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let group = i % groups;
                let inv_std = stats[group].1;
                let gx = g * gamma[i % c];
                inv_std * (gx - sum_g[group] / count - x_hat(i) * sum_gx[group] / count)
            })
            .collect();
        vec![grad_input]
    }

    fn params(&self) -> Vec<&Tensor> {
        vec![&self.gamma, &self.beta]
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.gamma, &mut self.beta]
    }
}
