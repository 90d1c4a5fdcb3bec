/*
 * @Date         : 2026-03-06
 * @Description  : 运行时层（编译后的积木）及其数值内核
 *
 * 每种层只需实现 `LayerKernel`：
 * - `forward`：根据输入缓冲区计算输出（推理模式下是纯函数，绝不修改权重）
 * - `backward`：真正的反向模式求导，参数梯度累加进 `grads`，返回对每个输入的梯度
 *
 * 所有缓冲区都是单个样本展平后的 f32 切片，布局为通道在后（channels-last）。
 */

mod activation;
mod batch_norm;
mod conv2d;
mod dense;
mod dropout;
mod lstm;
mod max_pool2d;
mod merge;

pub use activation::{Activation, ActivationLayer};
pub use batch_norm::BatchNorm;
pub use conv2d::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use lstm::Lstm;
pub use max_pool2d::MaxPool2d;
pub use merge::{Add, Concatenate, Flatten};

use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;

/// 前向上下文：携带随机数发生器即为训练模式
pub struct ForwardCtx<'r> {
    rng: Option<&'r mut StdRng>,
}

impl<'r> ForwardCtx<'r> {
    pub fn inference() -> Self {
        Self { rng: None }
    }

    pub fn training(rng: &'r mut StdRng) -> Self {
        Self { rng: Some(rng) }
    }

    pub fn is_training(&self) -> bool {
        self.rng.is_some()
    }

    pub(crate) fn rng(&mut self) -> Option<&mut StdRng> {
        self.rng.as_deref_mut()
    }
}

/// 训练前向时需要留给反向传播的额外记录
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Trace {
    #[default]
    None,
    /// Dropout 掩码（已乘上 1/(1-rate)）
    Mask(Vec<f32>),
}

#[enum_dispatch]
pub trait LayerKernel {
    /// 计算本层输出
    fn forward(&self, inputs: &[&[f32]], ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace);

    /// 反向传播
    ///
    /// # 参数
    /// - `inputs`/`output`/`trace`: 对应前向时的输入、输出与记录
    /// - `grad_out`: 损失对本层输出的梯度
    /// - `grads`: 与 `params()` 一一对应的参数梯度累加器
    ///
    /// # 返回
    /// 损失对每个输入的梯度（顺序与 `inputs` 相同）
    fn backward(
        &self,
        inputs: &[&[f32]],
        output: &[f32],
        trace: &Trace,
        grad_out: &[f32],
        grads: &mut [Tensor],
    ) -> Vec<Vec<f32>>;

    /// 可训练参数（权重在前，偏置在后）
    fn params(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// 参数量：各参数张量元素数之和，无权重的层为 0
    fn param_count(&self) -> usize {
        self.params().iter().map(|t| t.size()).sum()
    }

    /// 与 `params()` 同形状的零梯度
    fn zero_grads(&self) -> Vec<Tensor> {
        self.params()
            .iter()
            .map(|t| Tensor::zeros(t.shape()))
            .collect()
    }
}

#[enum_dispatch(LayerKernel)]
#[derive(Debug, Clone)]
pub enum LayerKind {
    Dense(Dense),
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Flatten(Flatten),
    Dropout(Dropout),
    BatchNorm(BatchNorm),
    Activation(ActivationLayer),
    Lstm(Lstm),
    Add(Add),
    Concatenate(Concatenate),
}

impl LayerKind {
    /// 是否带有可训练的权重
    pub fn is_weight_bearing(&self) -> bool {
        self.param_count() > 0
    }
}

/// 把`grad`逐元素累加到`acc`
pub(crate) fn accumulate(acc: &mut Tensor, grad: &[f32]) {
    for (a, g) in acc.as_slice_mut().iter_mut().zip(grad) {
        *a += g;
    }
}
