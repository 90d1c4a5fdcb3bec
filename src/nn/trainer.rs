/*
 * @Date         : 2026-03-11
 * @Description  : 训练器：按轮驱动批次、损失/准确率、优化器更新与协作式取消
 *
 * 每一轮：
 * 1. 执行 `steps_per_epoch` 步：取批次 → 每个样本做训练前向、在任何更新之前计算损失与准确率
 *    → 反向传播 → 按样本顺序汇总并求平均梯度 → 优化器逆序更新带权重的层
 * 2. 轮末：平均损失/准确率、验证估计、生成 `TrainingMetrics`，同步调用 `on_epoch_end`
 *
 * 停止信号只在轮与轮之间检查：当前轮总会完整结束，然后以已有的历史调用 `on_complete`。
 */

use super::catalog::{BlockCatalog, BlockCategory};
use super::criterion::{LossFunction, is_correct};
use super::executor::Gradients;
use super::graph::GraphSnapshot;
use super::model::CompiledModel;
use super::optimizer::OptimizerKind;
use crate::data::{BatchSource, Sample};
use crate::errors::TrainError;
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn default_steps() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

/// 训练配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    pub loss_function: LossFunction,
    #[serde(default = "default_steps")]
    pub steps_per_epoch: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.001,
            optimizer: OptimizerKind::Adam,
            loss_function: LossFunction::CrossEntropy,
            steps_per_epoch: default_steps(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    /// 从图中的损失/优化器节点读取配置，其余字段取默认值
    ///
    /// - 优化器节点决定 `optimizer` 与 `learning_rate`
    /// - 损失节点决定 `loss_function`
    /// - DataLoader 节点的 `batch_size` 参数决定批大小
    pub fn from_graph(snapshot: &GraphSnapshot, catalog: &BlockCatalog) -> Self {
        let mut config = Self::default();
        for node in &snapshot.nodes {
            let Some(definition) = catalog.get(&node.block_type) else {
                continue;
            };
            let Ok(params) = definition.effective_params(&node.params) else {
                continue;
            };
            match definition.category {
                BlockCategory::Optimizer => {
                    if let Some(kind) = OptimizerKind::parse(&node.block_type) {
                        config.optimizer = kind;
                    }
                    if let Some(lr) = params.float("learning_rate") {
                        config.learning_rate = lr as f32;
                    }
                }
                BlockCategory::Loss => {
                    if let Some(loss) = LossFunction::parse(&node.block_type) {
                        config.loss_function = loss;
                    }
                }
                BlockCategory::Input => {
                    if let Some(batch_size) = params.usize("batch_size") {
                        config.batch_size = batch_size;
                    }
                }
                BlockCategory::Layer => {}
            }
        }
        config
    }

    pub fn validate(&self) -> Result<(), TrainError> {
        let invalid = |msg: &str| Err(TrainError::InvalidConfig(msg.to_string()));
        if self.epochs == 0 {
            return invalid("epochs 必须大于 0");
        }
        if self.batch_size == 0 {
            return invalid("batch_size 必须大于 0");
        }
        if self.steps_per_epoch == 0 {
            return invalid("steps_per_epoch 必须大于 0");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning_rate 必须是正数");
        }
        Ok(())
    }
}

/// 每轮的训练指标（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    /// 从 1 开始
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_accuracy: Option<f32>,
    pub learning_rate: f32,
    /// 本轮各步平均梯度的 L2 范数的均值
    pub gradient_norm: f32,
}

/// 协作式停止信号，可跨线程克隆
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 单个样本的训练结果
struct SampleOutcome {
    loss: f32,
    correct: bool,
    grads: Gradients,
}

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    stop: StopHandle,
}

impl Trainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用外部的停止信号
    pub fn with_stop_handle(stop: StopHandle) -> Self {
        Self { stop }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// 训练模型
    ///
    /// # 返回
    /// 所有已完成轮次的指标（与传给 `on_complete` 的相同）
    pub fn train_model<S, E, C>(
        &self,
        model: &mut CompiledModel,
        config: &TrainingConfig,
        source: &mut S,
        mut on_epoch_end: E,
        on_complete: C,
    ) -> Result<Vec<TrainingMetrics>, TrainError>
    where
        S: BatchSource + ?Sized,
        E: FnMut(&TrainingMetrics),
        C: FnOnce(&[TrainingMetrics]),
    {
        config.validate()?;
        let mut optimizer = config.optimizer.build(config.learning_rate);
        let mut history: Vec<TrainingMetrics> = Vec::with_capacity(config.epochs);

        for epoch in 1..=config.epochs {
            if self.stop.is_stopped() {
                info!("收到停止信号，在第 {epoch} 轮开始前结束训练");
                break;
            }

            let (mut loss_sum, mut norm_sum) = (0.0f32, 0.0f32);
            let (mut correct, mut seen) = (0usize, 0usize);
            for step in 0..config.steps_per_epoch {
                let batch = source.next_batch(epoch, config.batch_size)?;
                let outcomes = self.run_batch(model, config, &batch, epoch, step)?;

                // 按样本顺序汇总
                let mut total = Gradients::zeros_like(model);
                for outcome in &outcomes {
                    loss_sum += outcome.loss;
                    correct += usize::from(outcome.correct);
                    total.accumulate(&outcome.grads);
                }
                seen += outcomes.len();
                total.scale(1.0 / outcomes.len() as f32);
                let norm = total.norm();
                norm_sum += norm;

                optimizer.step(&mut model.layers, &total.layers);
                debug!(
                    "第 {epoch} 轮第 {} 步：批大小 {}，梯度范数 {norm:.6}",
                    step + 1,
                    outcomes.len()
                );
            }

            let (val_loss, val_accuracy) = match source.validation_batch(config.batch_size) {
                Some(samples) if !samples.is_empty() => {
                    let (loss, accuracy) = evaluate(model, config.loss_function, &samples)?;
                    (Some(loss), Some(accuracy))
                }
                _ => (None, None),
            };

            let metrics = TrainingMetrics {
                epoch,
                loss: loss_sum / seen.max(1) as f32,
                accuracy: correct as f32 / seen.max(1) as f32,
                val_loss,
                val_accuracy,
                learning_rate: optimizer.learning_rate(),
                gradient_norm: norm_sum / config.steps_per_epoch as f32,
            };
            info!(
                "第 {}/{} 轮：loss={:.4} accuracy={:.4}",
                epoch, config.epochs, metrics.loss, metrics.accuracy
            );
            on_epoch_end(&metrics);
            history.push(metrics);
        }

        on_complete(&history);
        Ok(history)
    }

    /// 批内样本并行计算损失、准确率与梯度；结果保持样本顺序
    fn run_batch(
        &self,
        model: &CompiledModel,
        config: &TrainingConfig,
        batch: &[Sample],
        epoch: usize,
        step: usize,
    ) -> Result<Vec<SampleOutcome>, TrainError> {
        if batch.is_empty() {
            return Err(TrainError::EmptyBatch);
        }
        let expected = model.output_size();
        batch
            .par_iter()
            .enumerate()
            .map(|(i, sample)| {
                if sample.target.len() != expected {
                    return Err(TrainError::TargetSizeMismatch {
                        expected,
                        got: sample.target.len(),
                    });
                }
                let mut rng = StdRng::seed_from_u64(sample_seed(config.seed, epoch, step, i));
                let tape = model.forward_train(&sample.input, &mut rng)?;
                let prediction = tape.output();
                let loss = config.loss_function.value(prediction, &sample.target);
                let correct = is_correct(prediction, &sample.target);
                let grad = config.loss_function.gradient(prediction, &sample.target);
                let grads = model.backward(&tape, &grad)?;
                Ok(SampleOutcome {
                    loss,
                    correct,
                    grads,
                })
            })
            .collect()
    }
}

/// 推理模式下的平均损失与准确率
pub fn evaluate(
    model: &CompiledModel,
    loss_function: LossFunction,
    samples: &[Sample],
) -> Result<(f32, f32), TrainError> {
    if samples.is_empty() {
        return Err(TrainError::EmptyBatch);
    }
    let expected = model.output_size();
    let results: Vec<(f32, bool)> = samples
        .par_iter()
        .map(|sample| {
            if sample.target.len() != expected {
                return Err(TrainError::TargetSizeMismatch {
                    expected,
                    got: sample.target.len(),
                });
            }
            let prediction = model.forward(&sample.input)?;
            Ok((
                loss_function.value(&prediction, &sample.target),
                is_correct(&prediction, &sample.target),
            ))
        })
        .collect::<Result<_, TrainError>>()?;
    let n = results.len() as f32;
    let loss = results.iter().map(|(l, _)| l).sum::<f32>() / n;
    let accuracy = results.iter().filter(|(_, c)| *c).count() as f32 / n;
    Ok((loss, accuracy))
}

/// 每个样本独立的 Dropout 随机流
fn sample_seed(seed: u64, epoch: usize, step: usize, index: usize) -> u64 {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for v in [epoch as u64, step as u64, index as u64] {
        h = (h ^ v).wrapping_mul(0x100_0000_01B3).rotate_left(17);
    }
    h
}

