//! 数据模块
//!
//! 为编译器提供数据集元信息，为训练循环提供批次。
//!
//! # 主要组件
//!
//! - [`DatasetRegistry`]: 内置数据集（mnist、fashion_mnist、cifar10、iris）的元信息
//! - [`BatchSource`]: 训练循环拉取批次的接口
//! - [`SyntheticDataset`]: 按类别生成的确定性合成样本
//! - [`TensorDataset`] / [`DataLoader`]: 内存数据集与批量加载器
//!
//! # 使用示例
//!
//! ```ignore
//! use block_graph::data::{DataLoader, TensorDataset};
//!
//! let dataset = TensorDataset::new(train_x, train_y)?;
//! let loader = DataLoader::new(dataset, 32)
//!     .shuffle(true)
//!     .seed(42);
//!
//! for batch in loader.iter() {
//!     // ...
//! }
//! ```

mod dataloader;
mod provider;


pub use crate::errors::DataError;
pub use dataloader::{DataLoader, DataLoaderIterator, TensorDataset};
pub use provider::{
    BatchSource, DatasetInfo, DatasetProvider, DatasetRegistry, Sample, SyntheticDataset,
};
