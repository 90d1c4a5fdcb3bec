/*
 * @Date         : 2026-03-10
 * @Description  : 梯度下降优化器实现
 */

use super::{Optimizer, for_each_param};
use crate::nn::model::CompiledLayer;
use crate::tensor::Tensor;

/// SGD (随机梯度下降) 优化器
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, layers: &mut [CompiledLayer], grads: &[Vec<Tensor>]) {
        // θ = θ - α * ∇θ
        let lr = self.learning_rate;
        for_each_param(layers, grads, |_, param, grad| param.scaled_add(-lr, grad));
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
