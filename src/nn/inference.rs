/*
 * @Date         : 2026-03-05
 * @Description  : 形状推断（ShapeInference）
 *
 * 两种模式：
 * - 模板模式（无上游形状）：取积木第一个输出端口的模板，按类型改写其中一个槽位；
 *   校验连接时附带的推断形状即来自这里
 * - 传播模式（给定上游的具体形状）：从上游形状出发改写，编译器用它逐层确定权重形状
 *
 * 每种积木只改写一个槽位：
 * - Dense/LSTM：最后一维 = `units`
 * - Conv2D：通道维（最后一维）= `filters`
 * - MaxPooling2D：每个空间维 = floor(dim / `pool_size`)，动态维度保持动态
 * - MultiHeadAttention：最后一维 = `dim`
 * - 其余类型原样透传
 *
 * 纯函数：相同输入总得到相同输出，可以放心缓存。
 */

use crate::nn::catalog::{BlockCatalog, BlockDefinition, Params};
use crate::nn::graph::Node;
use crate::nn::shape::{Dim, TensorShape};

/// 把上游形状规范为 (batch, h, w, c)
///
/// 展平的缓冲区按 `(batch, n)` → `(batch, n, 1, 1)`、`(batch, h, w)` → `(batch, h, w, 1)` 解释
pub fn to_image_shape(shape: &TensorShape) -> TensorShape {
    let features = shape.feature_dims();
    let mut dims = vec![Dim::Batch];
    match features.len() {
        0 => dims.extend([Dim::Fixed(1), Dim::Fixed(1), Dim::Fixed(1)]),
        1 => dims.extend([features[0], Dim::Fixed(1), Dim::Fixed(1)]),
        2 => dims.extend([features[0], features[1], Dim::Fixed(1)]),
        _ => dims.extend_from_slice(features),
    }
    TensorShape::new(shape.dtype, dims)
}

/// 推断节点输出形状（纯函数）
///
/// # 参数
/// - `definition`: 节点的积木定义
/// - `params`: 生效参数
/// - `upstream`: 上游形状；为 `None` 时使用模板模式
pub fn infer_output_shape(
    definition: &BlockDefinition,
    params: &Params,
    upstream: Option<&TensorShape>,
) -> TensorShape {
    let template = definition
        .outputs
        .first()
        .map(|p| p.shape.clone())
        .unwrap_or_else(TensorShape::scalar);

    let Some(upstream) = upstream else {
        return rewrite_slot(definition.block_type.as_str(), params, template);
    };

    let mut base = match definition.block_type.as_str() {
        "Conv2D" | "MaxPooling2D" => to_image_shape(upstream),
        "Flatten" => flatten(upstream),
        "LSTM" if !params.bool("return_sequences").unwrap_or(false) => {
            // 丢掉时间维：(batch, t, f) → (batch, f)
            let mut dims = vec![Dim::Batch];
            dims.push(upstream.last().unwrap_or(Dim::Unknown));
            TensorShape::new(upstream.dtype, dims)
        }
        _ => upstream.clone(),
    };
    base.dtype = template.dtype;
    rewrite_slot(definition.block_type.as_str(), params, base)
}

fn flatten(upstream: &TensorShape) -> TensorShape {
    let flat = upstream
        .sample_size()
        .map(Dim::Fixed)
        .unwrap_or(Dim::Unknown);
    TensorShape::new(upstream.dtype, vec![Dim::Batch, flat])
}

fn rewrite_slot(block_type: &str, params: &Params, shape: TensorShape) -> TensorShape {
    let set_last = |key: &str, shape: TensorShape| match params.usize(key) {
        Some(n) => shape.with_last(Dim::Fixed(n)),
        None => shape,
    };
    match block_type {
        "Dense" | "LSTM" => set_last("units", shape),
        "Conv2D" => set_last("filters", shape),
        "MultiHeadAttention" => set_last("dim", shape),
        "MaxPooling2D" => {
            let pool = params.usize("pool_size").unwrap_or(2).max(1);
            let rank = shape.rank();
            let mut shape = shape;
            // 跳过 batch 维与通道维
            for dim in shape.dims.iter_mut().take(rank.saturating_sub(1)).skip(1) {
                if let Dim::Fixed(d) = *dim {
                    *dim = Dim::Fixed(d / pool);
                }
            }
            shape
        }
        _ => shape,
    }
}

/// 绑定目录的形状推断器
pub struct ShapeInference<'a> {
    catalog: &'a BlockCatalog,
}

impl<'a> ShapeInference<'a> {
    pub fn new(catalog: &'a BlockCatalog) -> Self {
        Self { catalog }
    }

    /// 推断节点（模板模式或传播模式）的输出形状
    ///
    /// 积木类型未知或参数无效时返回 `None`
    pub fn infer(&self, node: &Node, upstream: Option<&TensorShape>) -> Option<TensorShape> {
        let definition = self.catalog.get(&node.block_type)?;
        let params = definition.effective_params(&node.params).ok()?;
        Some(infer_output_shape(definition, &params, upstream))
    }
}
