/*
 * @Date         : 2026-03-09
 * @Description  : 损失函数与准确率
 *
 * - 交叉熵：`-Σ t·ln(p)`，p 截断到 [1e-7, 1-1e-7] 避免 log(0)；梯度按截断后的 p 计算，
 *   预测饱和时仍有梯度
 * - MSE：`mean((p - t)²)`
 */

use serde::{Deserialize, Serialize};

/// 交叉熵的数值下限
pub const PROB_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    #[serde(alias = "crossEntropy", alias = "CrossEntropy")]
    CrossEntropy,
    #[serde(alias = "MSE")]
    Mse,
}

impl LossFunction {
    /// 接受 `cross_entropy`/`crossEntropy`/`CrossEntropy` 与 `mse`/`MSE`
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cross_entropy" | "crossEntropy" | "CrossEntropy" => Some(Self::CrossEntropy),
            "mse" | "MSE" => Some(Self::Mse),
            _ => None,
        }
    }

    pub fn value(self, prediction: &[f32], target: &[f32]) -> f32 {
        match self {
            Self::CrossEntropy => -prediction
                .iter()
                .zip(target)
                .map(|(&p, &t)| t * clip(p).ln())
                .sum::<f32>(),
            Self::Mse => {
                let n = prediction.len().max(1) as f32;
                prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| (p - t).powi(2))
                    .sum::<f32>()
                    / n
            }
        }
    }

    /// 损失对预测值的梯度
    pub fn gradient(self, prediction: &[f32], target: &[f32]) -> Vec<f32> {
        match self {
            Self::CrossEntropy => prediction
                .iter()
                .zip(target)
                .map(|(&p, &t)| -t / clip(p))
                .collect(),
            Self::Mse => {
                let n = prediction.len().max(1) as f32;
                prediction
                    .iter()
                    .zip(target)
                    .map(|(p, t)| 2.0 * (p - t) / n)
                    .collect()
            }
        }
    }
}

fn clip(p: f32) -> f32 {
    p.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

/// 首个最大值的下标
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// 预测与目标的 argmax 是否一致
pub fn is_correct(prediction: &[f32], target: &[f32]) -> bool {
    match (argmax(prediction), argmax(target)) {
        (Some(p), Some(t)) => p == t,
        _ => false,
    }
}
