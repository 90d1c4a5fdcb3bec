/*
 * @Date         : 2026-03-08
 * @Description  : 数据集注册表与批次来源
 *
 * - `DatasetProvider`: 数据集 id → 元信息（样本数、特征形状、类别数），编译器据此确定模型输入形状
 * - `BatchSource`: 训练循环按需拉取 (输入, 目标) 批次
 * - `SyntheticDataset`: 按类别生成的确定性样本，便于在没有真实数据时跑通训练
 */

use crate::errors::DataError;
use crate::nn::shape::TensorShape;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 数据集元信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub samples: usize,
    /// 单个样本的特征形状（不含 batch 维）
    pub feature_shape: Vec<usize>,
    pub classes: usize,
}

impl DatasetInfo {
    pub fn new(id: &str, samples: usize, feature_shape: &[usize], classes: usize) -> Self {
        Self {
            id: id.to_string(),
            samples,
            feature_shape: feature_shape.to_vec(),
            classes,
        }
    }

    /// 单个样本展平后的长度
    pub fn sample_size(&self) -> usize {
        self.feature_shape.iter().product()
    }

    /// 模型输入形状：`(batch, ...feature_shape)`
    pub fn input_shape(&self) -> TensorShape {
        TensorShape::batched(&self.feature_shape)
    }
}

/// 数据集提供者
pub trait DatasetProvider: Send + Sync {
    fn dataset(&self, id: &str) -> Option<DatasetInfo>;
}

/// 内置数据集注册表
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, DatasetInfo>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// mnist / fashion_mnist / cifar10 / iris
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DatasetInfo::new("mnist", 60_000, &[28, 28, 1], 10));
        registry.register(DatasetInfo::new("fashion_mnist", 60_000, &[28, 28, 1], 10));
        registry.register(DatasetInfo::new("cifar10", 50_000, &[32, 32, 3], 10));
        registry.register(DatasetInfo::new("iris", 150, &[4], 3));
        registry
    }

    /// 注册（同 id 覆盖）
    pub fn register(&mut self, info: DatasetInfo) {
        self.datasets.insert(info.id.clone(), info);
    }

    pub fn get(&self, id: &str) -> Result<&DatasetInfo, DataError> {
        self.datasets
            .get(id)
            .ok_or_else(|| DataError::UnknownDataset(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }
}

impl DatasetProvider for DatasetRegistry {
    fn dataset(&self, id: &str) -> Option<DatasetInfo> {
        self.datasets.get(id).cloned()
    }
}

/// 单个 (输入, 目标) 样本，均已展平
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub input: Vec<f32>,
    pub target: Vec<f32>,
}

impl Sample {
    pub fn new(input: Vec<f32>, target: Vec<f32>) -> Self {
        Self { input, target }
    }
}

/// 训练循环的批次来源
pub trait BatchSource {
    /// 第`epoch`轮（从 1 开始）的下一个批次
    fn next_batch(&mut self, epoch: usize, batch_size: usize) -> Result<Vec<Sample>, DataError>;

    /// 验证批次；没有验证集时返回 `None`
    fn validation_batch(&mut self, _batch_size: usize) -> Option<Vec<Sample>> {
        None
    }
}

impl<B: BatchSource + ?Sized> BatchSource for Box<B> {
    fn next_batch(&mut self, epoch: usize, batch_size: usize) -> Result<Vec<Sample>, DataError> {
        (**self).next_batch(epoch, batch_size)
    }

    fn validation_batch(&mut self, batch_size: usize) -> Option<Vec<Sample>> {
        (**self).validation_batch(batch_size)
    }
}

/// 合成数据集：每个类别有固定的原型向量，样本 = 原型 + 均匀噪声，目标为 one-hot
///
/// 同一种子、同一调用序列总得到相同的批次
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    info: DatasetInfo,
    rng: StdRng,
    seed: u64,
    noise: f32,
    validation: bool,
}

impl SyntheticDataset {
    pub fn new(info: DatasetInfo, seed: u64) -> Self {
        Self {
            info,
            rng: StdRng::seed_from_u64(seed),
            seed,
            noise: 0.1,
            validation: true,
        }
    }

    /// 从注册表按 id 创建
    pub fn from_registry(
        registry: &DatasetRegistry,
        id: &str,
        seed: u64,
    ) -> Result<Self, DataError> {
        Ok(Self::new(registry.get(id)?.clone(), seed))
    }

    pub fn noise(mut self, noise: f32) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// 是否提供验证批次（默认提供）
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn info(&self) -> &DatasetInfo {
        &self.info
    }

    /// 类别`class`在第`i`个特征上的原型值（落在 [0, 1)）
    fn prototype(class: usize, i: usize) -> f32 {
        ((i * 7 + class * 13) % 17) as f32 / 17.0
    }

    fn sample<R: Rng>(info: &DatasetInfo, noise: f32, rng: &mut R) -> Sample {
        let classes = info.classes.max(1);
        let class = rng.gen_range(0..classes);
        let input = (0..info.sample_size())
            .map(|i| Self::prototype(class, i) + rng.gen_range(-1.0f32..=1.0) * noise)
            .collect();
        let mut target = vec![0.0; classes];
        target[class] = 1.0;
        Sample::new(input, target)
    }
}

impl BatchSource for SyntheticDataset {
    fn next_batch(&mut self, _epoch: usize, batch_size: usize) -> Result<Vec<Sample>, DataError> {
        if batch_size == 0 || self.info.sample_size() == 0 {
            return Err(DataError::Empty);
        }
        Ok((0..batch_size)
            .map(|_| Self::sample(&self.info, self.noise, &mut self.rng))
            .collect())
    }

    fn validation_batch(&mut self, batch_size: usize) -> Option<Vec<Sample>> {
        if !self.validation || batch_size == 0 {
            return None;
        }
        // 验证集使用独立且固定的随机流，每轮都相同
        let mut rng = StdRng::seed_from_u64(self.seed ^ 0x5EED_0000_0000_0001);
        Some(
            (0..batch_size)
                .map(|_| Self::sample(&self.info, self.noise, &mut rng))
                .collect(),
        )
    }
}
