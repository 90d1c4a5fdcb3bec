/*
 * @Date         : 2026-03-10
 * @Description  : 优化器模块：用平均梯度更新编译模型的权重
 */

mod adam;
mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

use crate::nn::layer::LayerKernel;
use crate::nn::model::CompiledLayer;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// 优化器核心 trait
pub trait Optimizer: Send {
    /// 参数更新（使用已计算的梯度）
    ///
    /// `grads[i]` 与 `layers[i].kind.params_mut()` 一一对应。
    /// 只更新带权重的层，并按层序逆序进行。
    fn step(&mut self, layers: &mut [CompiledLayer], grads: &[Vec<Tensor>]);

    /// 重置累积状态
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}

/// 训练配置中的优化器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[serde(alias = "SGD")]
    Sgd,
    #[serde(alias = "Adam")]
    Adam,
}

impl OptimizerKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sgd" | "SGD" => Some(Self::Sgd),
            "adam" | "Adam" => Some(Self::Adam),
            _ => None,
        }
    }

    /// 以默认超参数创建优化器
    pub fn build(self, learning_rate: f32) -> Box<dyn Optimizer> {
        match self {
            Self::Sgd => Box::new(SGD::new(learning_rate)),
            Self::Adam => Box::new(Adam::new_default(learning_rate)),
        }
    }
}

/// 逆序遍历带权重的层，对每个 (层序号, 参数序号, 参数, 梯度) 调用`f`
pub(crate) fn for_each_param(
    layers: &mut [CompiledLayer],
    grads: &[Vec<Tensor>],
    mut f: impl FnMut((usize, usize), &mut Tensor, &Tensor),
) {
    for layer in layers.iter_mut().rev() {
        if !layer.is_weight_bearing() {
            continue;
        }
        let Some(layer_grads) = grads.get(layer.index) else {
            continue;
        };
        let index = layer.index;
        for (k, (param, grad)) in layer
            .kind
            .params_mut()
            .into_iter()
            .zip(layer_grads)
            .enumerate()
        {
            f((index, k), param, grad);
        }
    }
}
