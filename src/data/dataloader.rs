/*
 * @Date         : 2026-03-08
 * @Description  : DataLoader - 内存数据集的批量加载器
 *
 * 提供统一的数据迭代 API，支持：
 * - 自动分批 (batch_size)
 * - 随机打乱 (shuffle，可指定种子)
 * - 丢弃不完整批次 (drop_last)
 *
 * 同时实现 `BatchSource`，可直接交给训练循环：每轮开始时按 `seed + epoch` 重新打乱，
 * 轮内按游标顺序取样本，取完后回绕。
 */

use super::provider::{BatchSource, Sample};
use crate::errors::DataError;
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// TensorDataset - 持有特征和标签的数据集
///
/// # 示例
/// ```ignore
/// let dataset = TensorDataset::new(features, labels)?;
/// println!("样本数: {}", dataset.len());
/// ```
#[derive(Debug, Clone)]
pub struct TensorDataset {
    features: Tensor,
    labels: Tensor,
    len: usize,
}

impl TensorDataset {
    /// 创建新的 TensorDataset
    ///
    /// # 参数
    /// - `features`: 特征张量，第一维为样本数
    /// - `labels`: 标签张量，第一维为样本数（必须与 features 一致）
    pub fn new(features: Tensor, labels: Tensor) -> Result<Self, DataError> {
        let len = features.shape().first().copied().unwrap_or(0);
        let label_len = labels.shape().first().copied().unwrap_or(0);
        if len != label_len {
            return Err(DataError::ShapeMismatch {
                expected: vec![len],
                got: vec![label_len],
            });
        }
        Ok(Self {
            features,
            labels,
            len,
        })
    }

    /// 获取样本数量
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn features(&self) -> &Tensor {
        &self.features
    }

    pub fn labels(&self) -> &Tensor {
        &self.labels
    }

    /// 取出第`index`个样本（特征与标签都展平）
    pub fn sample(&self, index: usize) -> Sample {
        Sample::new(
            row(&self.features, self.len, index).to_vec(),
            row(&self.labels, self.len, index).to_vec(),
        )
    }
}

fn row(tensor: &Tensor, len: usize, index: usize) -> &[f32] {
    let width = tensor.size() / len.max(1);
    &tensor.as_slice()[index * width..(index + 1) * width]
}

/// DataLoader - 数据批量加载器
///
/// # 示例
/// ```ignore
/// let loader = DataLoader::new(dataset, 32)
///     .shuffle(true)
///     .seed(42);
///
/// for batch in loader.iter() {
///     // batch: Vec<Sample>
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: TensorDataset,
    validation: Option<TensorDataset>,
    batch_size: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
    /// `BatchSource` 的游标：(当前轮, 当前轮的索引顺序, 下一个位置)
    cursor: Option<(usize, Vec<usize>, usize)>,
}

impl DataLoader {
    /// 创建新的 DataLoader（`batch_size` 为 0 时按 1 处理）
    pub fn new(dataset: TensorDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            validation: None,
            batch_size: batch_size.max(1),
            shuffle: false,
            drop_last: false,
            seed: 0,
            cursor: None,
        }
    }

    /// 设置是否打乱数据
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// 设置是否丢弃最后一个不完整的批次
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// 设置随机种子（用于 shuffle）
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// 附加验证集（`BatchSource::validation_batch` 从中取前若干个样本）
    pub fn validation(mut self, dataset: TensorDataset) -> Self {
        self.validation = Some(dataset);
        self
    }

    /// 获取批次数量
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.drop_last {
            n / self.batch_size
        } else {
            n.div_ceil(self.batch_size)
        }
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    fn indices(&self, salt: u64) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(salt));
            indices.shuffle(&mut rng);
        }
        indices
    }

    /// 创建迭代器
    pub fn iter(&self) -> DataLoaderIterator<'_> {
        DataLoaderIterator {
            loader: self,
            indices: self.indices(0),
            current_batch: 0,
        }
    }
}

/// DataLoader 迭代器
pub struct DataLoaderIterator<'a> {
    loader: &'a DataLoader,
    indices: Vec<usize>,
    current_batch: usize,
}

impl Iterator for DataLoaderIterator<'_> {
    type Item = Vec<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.indices.len();
        let batch_size = self.loader.batch_size;
        let start = self.current_batch * batch_size;
        if start >= n {
            return None;
        }
        let end = (start + batch_size).min(n);
        if self.loader.drop_last && end - start < batch_size {
            return None;
        }
        self.current_batch += 1;
        Some(
            self.indices[start..end]
                .iter()
                .map(|&i| self.loader.dataset.sample(i))
                .collect(),
        )
    }
}

impl BatchSource for DataLoader {
    fn next_batch(&mut self, epoch: usize, batch_size: usize) -> Result<Vec<Sample>, DataError> {
        if self.dataset.is_empty() {
            return Err(DataError::Empty);
        }
        let fresh = !matches!(&self.cursor, Some((e, _, _)) if *e == epoch);
        if fresh {
            self.cursor = Some((epoch, self.indices(epoch as u64), 0));
        }
        let Some((_, order, position)) = self.cursor.as_mut() else {
            return Err(DataError::Empty);
        };

        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size.max(1) {
            if *position >= order.len() {
                *position = 0;
            }
            batch.push(self.dataset.sample(order[*position]));
            *position += 1;
        }
        Ok(batch)
    }

    fn validation_batch(&mut self, batch_size: usize) -> Option<Vec<Sample>> {
        let validation = self.validation.as_ref()?;
        let count = batch_size.min(validation.len());
        if count == 0 {
            return None;
        }
        Some((0..count).map(|i| validation.sample(i)).collect())
    }
}
