/*
 * @Date         : 2026-03-10
 * @Description  : Adam优化器实现
 */

use super::{Optimizer, for_each_param};
use crate::nn::model::CompiledLayer;
use crate::tensor::Tensor;
use std::collections::HashMap;

/// 参数键：(层序号, 参数序号)
type ParamKey = (usize, usize);

/// Adam优化器
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// 一阶矩估计
    m: HashMap<ParamKey, Tensor>,
    /// 二阶矩估计
    v: HashMap<ParamKey, Tensor>,
    /// 时间步
    t: usize,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: HashMap::new(),
            v: HashMap::new(),
            t: 0,
        }
    }

    /// 使用默认参数创建Adam优化器（与 Adam 积木的默认值一致）
    pub fn new_default(learning_rate: f32) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-7)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, layers: &mut [CompiledLayer], grads: &[Vec<Tensor>]) {
        self.t += 1;
        let (beta1, beta2, epsilon, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        // 偏差修正系数
        let correction1 = 1.0 - beta1.powi(self.t as i32);
        let correction2 = 1.0 - beta2.powi(self.t as i32);
        let (m_all, v_all) = (&mut self.m, &mut self.v);

        for_each_param(layers, grads, |key, param, grad| {
            let m = m_all
                .entry(key)
                .or_insert_with(|| Tensor::zeros(grad.shape()));
            let v = v_all
                .entry(key)
                .or_insert_with(|| Tensor::zeros(grad.shape()));

            let g = grad.as_slice();
            let (m, v) = (m.as_slice_mut(), v.as_slice_mut());
            for (((theta, g), m), v) in param
                .as_slice_mut()
                .iter_mut()
                .zip(g)
                .zip(m.iter_mut())
                .zip(v.iter_mut())
            {
                // m = β1 * m + (1 - β1) * g，v = β2 * v + (1 - β2) * g²
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                // θ = θ - α * m_hat / (√v_hat + ε)
                *theta -= lr * m_hat / (v_hat.sqrt() + epsilon);
            }
        });
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
