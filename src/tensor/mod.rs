/*
 * @Date         : 2026-03-02
 * @Description  : 张量：层权重/偏置的存储单元（基于 ndarray 的连续内存）
 */

use ndarray::{Array, ArrayView2, IxDyn};
use rand::Rng;
use rand::distributions::{Distribution, Uniform};

#[cfg(test)]
mod tests;

/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：本库中张量只用于持有层参数，数据总是标准（行优先、连续）布局。
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Array<f32, IxDyn>,
}

impl Tensor {
    /// 创建一个张量；`data`的长度必须和`shape`中所有元素的乘积相等，否则panic。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec())
            .expect("Tensor::new: 数据长度与形状不一致");
        Self { data }
    }

    /// 全零张量
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: Array::zeros(IxDyn(shape)),
        }
    }

    /// 全为`value`的张量
    pub fn filled(value: f32, shape: &[usize]) -> Self {
        Self {
            data: Array::from_elem(IxDyn(shape), value),
        }
    }

    /// Xavier/Glorot 均匀初始化：U(-limit, limit)，`limit = sqrt(6 / (fan_in + fan_out))`
    pub fn new_xavier<R: Rng + ?Sized>(
        fan_in: usize,
        fan_out: usize,
        shape: &[usize],
        rng: &mut R,
    ) -> Self {
        let limit = xavier_limit(fan_in, fan_out);
        let dist = Uniform::new_inclusive(-limit, limit);
        let len = shape.iter().product::<usize>();
        let data = (0..len).map(|_| dist.sample(rng)).collect::<Vec<_>>();
        Self::new(&data, shape)
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 元素总数
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("Tensor 的数据须为标准连续布局")
    }

    pub fn as_slice_mut(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("Tensor 的数据须为标准连续布局")
    }

    /// 以二维矩阵视图访问（`rows * cols`须等于元素总数）
    pub fn view_2d(&self, rows: usize, cols: usize) -> ArrayView2<'_, f32> {
        ArrayView2::from_shape((rows, cols), self.as_slice())
            .expect("Tensor::view_2d: 行列数与元素总数不一致")
    }

    /// 所有元素平方和（用于梯度范数）
    pub fn sum_squares(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum()
    }

    /// 原地执行 `self += alpha * other`
    pub fn scaled_add(&mut self, alpha: f32, other: &Tensor) {
        self.data.scaled_add(alpha, &other.data);
    }

    /// 原地缩放
    pub fn scale(&mut self, factor: f32) {
        self.data.mapv_inplace(|x| x * factor);
    }
}

/// Xavier/Glorot 均匀分布的边界
pub fn xavier_limit(fan_in: usize, fan_out: usize) -> f32 {
    let denom = (fan_in + fan_out).max(1) as f32;
    (6.0 / denom).sqrt()
}
