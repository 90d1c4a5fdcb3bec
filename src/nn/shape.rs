/*
 * TensorShape: 端口的类型化形状（dtype + 维度列表）
 *
 * 类似 Keras/TensorFlow 的 (None, 128) 设计，允许某些维度在编译时未知：
 * - `Dim::Fixed(n)`：确定的维度
 * - `Dim::Batch`：动态维度（batch 维或由上游决定的特征维），匹配任意值
 * - `Dim::Unknown`：形状占位符，匹配任意值，且允许与上游的秩不一致（带警告）
 *
 * # 示例
 * ```
 * use block_graph::nn::{DType, Dim, TensorShape};
 *
 * let shape = TensorShape::new(DType::Float32, vec![Dim::Batch, Dim::Fixed(28), Dim::Unknown]);
 * assert_eq!(shape.to_string(), "(batch, 28, ?)");
 * assert!(shape.has_unknown());
 * ```
 */

use serde::{Deserialize, Serialize};
use std::fmt;

// ========== 数据类型 ==========

/// 端口数据类型
///
/// 兼容性是单向的子类型链：`Bool ⊆ Int32 ⊆ Float32`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int32,
    Float32,
}

impl DType {
    const fn rank(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Int32 => 1,
            Self::Float32 => 2,
        }
    }

    /// `self`（源）能否流入`target`（目标）
    pub const fn flows_into(self, target: DType) -> bool {
        self.rank() <= target.rank()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ========== 维度 ==========

/// 单个维度槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Fixed(usize),
    Batch,
    Unknown,
}

impl Dim {
    pub const fn is_dynamic(self) -> bool {
        !matches!(self, Self::Fixed(_))
    }

    pub const fn value(self) -> Option<usize> {
        match self {
            Self::Fixed(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Batch => write!(f, "batch"),
            Self::Unknown => write!(f, "?"),
        }
    }
}

// ========== 形状 ==========

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    pub dtype: DType,
    pub dims: Vec<Dim>,
}

impl TensorShape {
    pub fn new(dtype: DType, dims: Vec<Dim>) -> Self {
        Self { dtype, dims }
    }

    /// float32 标量（秩 0），如损失值
    pub fn scalar() -> Self {
        Self::new(DType::Float32, Vec::new())
    }

    /// float32，首维为 batch，其余维度确定
    pub fn batched(feature_dims: &[usize]) -> Self {
        let mut dims = vec![Dim::Batch];
        dims.extend(feature_dims.iter().map(|&d| Dim::Fixed(d)));
        Self::new(DType::Float32, dims)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn has_unknown(&self) -> bool {
        self.dims.contains(&Dim::Unknown)
    }

    /// 去掉首个 batch 维后，其余维度是否都确定
    pub fn is_resolved(&self) -> bool {
        self.feature_dims().iter().all(|d| !d.is_dynamic())
    }

    /// 去掉首个 batch 维后的维度
    pub fn feature_dims(&self) -> &[Dim] {
        match self.dims.first() {
            Some(Dim::Batch) => &self.dims[1..],
            _ => &self.dims,
        }
    }

    /// 单个样本的元素数（特征维都确定时）
    pub fn sample_size(&self) -> Option<usize> {
        self.feature_dims()
            .iter()
            .try_fold(1usize, |acc, d| d.value().map(|v| acc * v))
    }

    pub fn last(&self) -> Option<Dim> {
        self.dims.last().copied()
    }

    pub fn with_last(mut self, dim: Dim) -> Self {
        match self.dims.last_mut() {
            Some(last) => *last = dim,
            None => self.dims.push(dim),
        }
        self
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dims.is_empty() {
            return write!(f, "{}[]", self.dtype);
        }
        let dims = self
            .dims
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "({dims})")
    }
}

// ========== 兼容性规则 ==========

/// 形状比较结果（不含错误，错误由 `GraphValidator` 转换）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeCheck {
    Compatible,
    /// 秩不一致，但目标含 `Unknown` 占位，可以连接
    RankWarning,
    RankMismatch,
    DimensionMismatch {
        index: usize,
        source: usize,
        target: usize,
    },
}

/// 比较源端口形状与目标端口形状
///
/// - 双方都是秩 0：兼容
/// - 秩不一致：目标含 `Unknown` 时给出警告，否则不兼容
/// - 秩一致：逐维比较，任何一方为动态维度时跳过，首个确定值不同之处报错
pub fn check_shapes(source: &TensorShape, target: &TensorShape) -> ShapeCheck {
    if source.rank() != target.rank() {
        return if target.has_unknown() {
            ShapeCheck::RankWarning
        } else {
            ShapeCheck::RankMismatch
        };
    }
    for (index, (s, t)) in source.dims.iter().zip(&target.dims).enumerate() {
        if let (Dim::Fixed(s), Dim::Fixed(t)) = (*s, *t) {
            if s != t {
                return ShapeCheck::DimensionMismatch {
                    index,
                    source: s,
                    target: t,
                };
            }
        }
    }
    ShapeCheck::Compatible
}
