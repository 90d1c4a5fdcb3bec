/*
 * @Date         : 2026-03-09
 * @Description  : 模型编译器（ModelCompiler）：积木图快照 → CompiledModel
 *
 * 流程：
 * 1. 只保留类别为 `Layer` 的节点（以及数据输入节点，用于确定模型输入形状）；
 *    目录中不存在的积木类型记录警告后当作透传节点
 * 2. 拓扑排序（有环时记录警告，按尽力而为的顺序继续）
 * 3. 按顺序逐层：沿入边解析输入来源和形状 → 由形状推断确定输出形状 → 分配权重
 * 4. 汇总：总参数量、复杂度评分、输出层
 *
 * 权重形状只取决于生效参数与上游形状；初始化使用带种子的 Xavier 均匀分布，
 * 同一快照 + 同一种子总得到相同的权重。
 */

use super::catalog::{BlockCatalog, BlockCategory, BlockDefinition, Params};
use super::graph::{GraphSnapshot, Node, TopologicalScheduler};
use super::inference::{infer_output_shape, to_image_shape};
use super::layer::{
    Activation, ActivationLayer, Add, BatchNorm, Concatenate, Conv2d, Dense, Dropout, Flatten,
    LayerKernel, LayerKind, Lstm, MaxPool2d,
};
use super::model::{CompiledLayer, CompiledModel, Feed, complexity_score};
use super::shape::{DType, Dim, TensorShape};
use crate::data::DatasetProvider;
use crate::errors::CompileError;
use crate::tensor::Tensor;
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;

/// 默认的权重初始化种子
pub const DEFAULT_SEED: u64 = 42;

/// 节点在编译中的角色
enum Role<'c> {
    /// 生成运行时层
    Layer(&'c BlockDefinition, Params),
    /// 透传：未知类型或没有运行时内核的层
    Alias,
    /// 数据输入
    Input,
}

pub struct ModelCompiler<'a> {
    catalog: &'a BlockCatalog,
    datasets: Option<&'a dyn DatasetProvider>,
    input_shape: Option<TensorShape>,
    seed: u64,
}

impl<'a> ModelCompiler<'a> {
    pub fn new(catalog: &'a BlockCatalog) -> Self {
        Self {
            catalog,
            datasets: None,
            input_shape: None,
            seed: DEFAULT_SEED,
        }
    }

    /// 通过数据集提供者，由 DataLoader 节点的 `dataset` 参数确定输入形状
    pub fn with_datasets(mut self, datasets: &'a dyn DatasetProvider) -> Self {
        self.datasets = Some(datasets);
        self
    }

    /// 显式指定模型输入形状（优先于数据集）
    pub fn with_input_shape(mut self, shape: TensorShape) -> Self {
        self.input_shape = Some(shape);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn compile(&self, snapshot: &GraphSnapshot) -> Result<CompiledModel, CompileError> {
        let roles = self.classify(snapshot)?;
        if !roles.values().any(|role| matches!(role, Role::Layer(..))) {
            return Err(CompileError::NoComputationalLayers);
        }

        let schedule =
            TopologicalScheduler::sort_snapshot(snapshot, |node| roles.contains_key(&node.id));
        if schedule.cycle_detected {
            warn!(
                "积木图存在环（{:?}），按尽力而为的拓扑序继续编译",
                schedule.back_edges
            );
        }

        let model_input = self.model_input_shape(snapshot, &roles)?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut layers: Vec<CompiledLayer> = Vec::new();
        // 节点 id → 它对下游暴露的 (来源, 形状)
        let mut resolved: HashMap<&str, Vec<(Feed, TensorShape)>> = HashMap::new();
        let mut scored: Vec<(&str, Params)> = Vec::new();

        for id in &schedule.order {
            let Some(node) = snapshot.node(id) else {
                continue;
            };
            let feeds = self.feeds_of(snapshot, node, &resolved, &model_input);
            match &roles[id] {
                Role::Input => {
                    resolved.insert(
                        node.id.as_str(),
                        vec![(Feed::ModelInput, model_input.clone())],
                    );
                }
                Role::Alias => {
                    if let Some(definition) = self.catalog.get(&node.block_type) {
                        if let Ok(params) = definition.effective_params(&node.params) {
                            scored.push((definition.block_type.as_str(), params));
                        }
                    }
                    resolved.insert(node.id.as_str(), feeds);
                }
                Role::Layer(definition, params) => {
                    scored.push((definition.block_type.as_str(), params.clone()));
                    let index = layers.len();
                    let layer =
                        self.build_layer(index, node, definition, params, feeds, &mut rng)?;
                    debug!(
                        "编译层 #{} {}：{} → {}，参数量 {}",
                        layer.index,
                        layer.block_type,
                        layer.input_shape,
                        layer.output_shape,
                        layer.param_count
                    );
                    resolved.insert(
                        node.id.as_str(),
                        vec![(Feed::Layer(layer.index), layer.output_shape.clone())],
                    );
                    layers.push(layer);
                }
            }
        }

        // 输出层：没有被其他层消费的最后一层
        let consumed: Vec<usize> = layers
            .iter()
            .flat_map(|l| l.inputs.iter())
            .filter_map(|feed| match feed {
                Feed::Layer(i) => Some(*i),
                Feed::ModelInput => None,
            })
            .collect();
        let output_layer = layers
            .iter()
            .rev()
            .find(|l| !consumed.contains(&l.index))
            .or(layers.last())
            .map(|l| l.index)
            .ok_or(CompileError::NoComputationalLayers)?;

        let total_params = layers.iter().map(|l| l.param_count).sum();
        let complexity = complexity_score(scored.iter().map(|(t, p)| (*t, p)));
        let model = CompiledModel {
            input_shape: model_input,
            output_shape: layers[output_layer].output_shape.clone(),
            total_params,
            complexity,
            cycle_detected: schedule.cycle_detected,
            output_layer,
            layers,
        };
        info!(
            "模型编译完成：{} 层（可训练 {}），总参数量 {}",
            model.layers.len(),
            model.weight_bearing_layers(),
            model.total_params
        );
        Ok(model)
    }

    /// 为参与编译的节点分配角色；损失/优化器节点不参与，不在结果中
    fn classify(
        &self,
        snapshot: &GraphSnapshot,
    ) -> Result<HashMap<String, Role<'a>>, CompileError> {
        let mut roles = HashMap::new();
        for node in &snapshot.nodes {
            let Some(definition) = self.catalog.get(&node.block_type) else {
                warn!(
                    "跳过未知积木类型：{}（节点 {}）",
                    node.block_type, node.id
                );
                roles.insert(node.id.clone(), Role::Alias);
                continue;
            };
            let role = match definition.category {
                BlockCategory::Input => Role::Input,
                BlockCategory::Layer => {
                    let params = definition.effective_params(&node.params).map_err(|source| {
                        CompileError::InvalidParameter {
                            node_id: node.id.clone(),
                            source,
                        }
                    })?;
                    if has_kernel(&definition.block_type) {
                        Role::Layer(definition, params)
                    } else {
                        warn!(
                            "{}没有运行时实现，按透传处理（节点 {}）",
                            definition.block_type, node.id
                        );
                        Role::Alias
                    }
                }
                BlockCategory::Loss | BlockCategory::Optimizer => continue,
            };
            roles.insert(node.id.clone(), role);
        }
        Ok(roles)
    }

    /// 模型输入形状：显式指定 > 数据集 > 未知
    fn model_input_shape(
        &self,
        snapshot: &GraphSnapshot,
        roles: &HashMap<String, Role<'a>>,
    ) -> Result<TensorShape, CompileError> {
        if let Some(shape) = &self.input_shape {
            return Ok(shape.clone());
        }
        let mut found: Option<TensorShape> = None;
        for node in &snapshot.nodes {
            if !matches!(roles.get(&node.id), Some(Role::Input)) {
                continue;
            }
            let Some(shape) = self.dataset_shape(node) else {
                continue;
            };
            match &found {
                Some(first) if *first != shape => {
                    return Err(CompileError::InputShapeConflict {
                        first: first.to_string(),
                        second: shape.to_string(),
                    });
                }
                Some(_) => {}
                None => found = Some(shape),
            }
        }
        Ok(found.unwrap_or_else(|| {
            TensorShape::new(DType::Float32, vec![Dim::Batch, Dim::Unknown])
        }))
    }

    fn dataset_shape(&self, node: &Node) -> Option<TensorShape> {
        let definition = self.catalog.get(&node.block_type)?;
        let params = definition.effective_params(&node.params).ok()?;
        let id = params.str("dataset")?;
        let info = self.datasets?.dataset(id);
        if info.is_none() {
            warn!("数据集提供者中没有数据集{id}（节点 {}）", node.id);
        }
        info.map(|info| info.input_shape())
    }

    /// 沿入边解析输入；没有任何已解析的上游时读取模型输入
    fn feeds_of(
        &self,
        snapshot: &GraphSnapshot,
        node: &Node,
        resolved: &HashMap<&str, Vec<(Feed, TensorShape)>>,
        model_input: &TensorShape,
    ) -> Vec<(Feed, TensorShape)> {
        let mut feeds: Vec<(Feed, TensorShape)> = Vec::new();
        for connection in snapshot.incoming(&node.id) {
            for feed in resolved.get(connection.source.as_str()).into_iter().flatten() {
                if !feeds.iter().any(|(f, _)| *f == feed.0) {
                    feeds.push(feed.clone());
                }
            }
        }
        if feeds.is_empty() {
            feeds.push((Feed::ModelInput, model_input.clone()));
        }
        feeds
    }

    fn build_layer(
        &self,
        index: usize,
        node: &Node,
        definition: &BlockDefinition,
        params: &Params,
        mut feeds: Vec<(Feed, TensorShape)>,
        rng: &mut StdRng,
    ) -> Result<CompiledLayer, CompileError> {
        let block_type = definition.block_type.as_str();
        let multi_input = matches!(block_type, "Add" | "Concatenate");
        if !multi_input && feeds.len() > 1 {
            warn!(
                "{}只接受一个输入，忽略多余的 {} 个输入",
                node.display_label(),
                feeds.len() - 1
            );
            feeds.truncate(1);
        }
        let unresolved = |shape: &TensorShape| CompileError::UnresolvedShape {
            node_id: node.id.clone(),
            shape: shape.to_string(),
        };
        for (_, shape) in &feeds {
            if !shape.is_resolved() {
                return Err(unresolved(shape));
            }
        }

        let input_shape = feeds[0].1.clone();
        let (kind, output_shape) = match block_type {
            "Add" => self.build_add(node, &feeds)?,
            "Concatenate" => self.build_concatenate(node, &feeds)?,
            _ => {
                let upstream = match block_type {
                    "LSTM" => to_sequence_shape(&input_shape),
                    _ => input_shape.clone(),
                };
                let output_shape = infer_output_shape(definition, params, Some(&upstream));
                if !output_shape.is_resolved() || output_shape.sample_size() == Some(0) {
                    return Err(unresolved(&output_shape));
                }
                let kind = build_kernel(block_type, params, &upstream, &output_shape, rng)
                    .ok_or_else(|| unresolved(&upstream))?;
                (kind, output_shape)
            }
        };

        Ok(CompiledLayer {
            index,
            node_id: node.id.clone(),
            block_type: block_type.to_string(),
            param_count: kind.param_count(),
            kind,
            inputs: feeds.iter().map(|(feed, _)| *feed).collect(),
            input_shape,
            output_shape,
            params: params.clone(),
        })
    }

    fn build_add(
        &self,
        node: &Node,
        feeds: &[(Feed, TensorShape)],
    ) -> Result<(LayerKind, TensorShape), CompileError> {
        let first = &feeds[0].1;
        if feeds.iter().any(|(_, s)| s.sample_size() != first.sample_size()) {
            return Err(incompatible(node, feeds));
        }
        Ok((Add::new(feeds.len()).into(), first.clone()))
    }

    fn build_concatenate(
        &self,
        node: &Node,
        feeds: &[(Feed, TensorShape)],
    ) -> Result<(LayerKind, TensorShape), CompileError> {
        let first = &feeds[0].1;
        let leading = |s: &TensorShape| s.dims[..s.rank().saturating_sub(1)].to_vec();
        if feeds
            .iter()
            .any(|(_, s)| s.rank() != first.rank() || leading(s) != leading(first))
        {
            return Err(incompatible(node, feeds));
        }
        let widths: Vec<usize> = feeds
            .iter()
            .map(|(_, s)| s.last().and_then(Dim::value).unwrap_or(0))
            .collect();
        let output = first.clone().with_last(Dim::Fixed(widths.iter().sum()));
        Ok((Concatenate::new(widths).into(), output))
    }
}

/// 有运行时内核的层类型
fn has_kernel(block_type: &str) -> bool {
    matches!(
        block_type,
        "Dense"
            | "Conv2D"
            | "MaxPooling2D"
            | "Flatten"
            | "Dropout"
            | "BatchNormalization"
            | "Activation"
            | "LSTM"
            | "Add"
            | "Concatenate"
    )
}

fn incompatible(node: &Node, feeds: &[(Feed, TensorShape)]) -> CompileError {
    CompileError::IncompatibleFeeds {
        node_id: node.id.clone(),
        shapes: feeds.iter().map(|(_, s)| s.to_string()).collect(),
    }
}

/// 把上游形状规范为 (batch, timesteps, features)：`(batch, n)` 视为 n 个时间步、每步 1 个特征
fn to_sequence_shape(shape: &TensorShape) -> TensorShape {
    let features = shape.feature_dims();
    let dims = match features {
        [] => vec![Dim::Fixed(1), Dim::Fixed(1)],
        [n] => vec![*n, Dim::Fixed(1)],
        [.., last] => {
            let steps = features[..features.len() - 1]
                .iter()
                .try_fold(1usize, |acc, d| d.value().map(|v| acc * v))
                .map_or(Dim::Unknown, Dim::Fixed);
            vec![steps, *last]
        }
    };
    let mut all = vec![Dim::Batch];
    all.extend(dims);
    TensorShape::new(shape.dtype, all)
}

fn activation_of(params: &Params) -> Activation {
    params
        .str("activation")
        .and_then(Activation::parse)
        .unwrap_or(Activation::Linear)
}

fn fixed(dim: Option<Dim>) -> Option<usize> {
    dim.and_then(Dim::value)
}

fn bias_of(params: &Params, len: usize) -> Option<Tensor> {
    if !params.bool("use_bias").unwrap_or(true) {
        return None;
    }
    let init = params.float("bias_initializer").unwrap_or(0.0) as f32;
    Some(Tensor::filled(init, &[len]))
}

/// 按上游形状与生效参数构造内核；形状信息不足时返回 `None`
fn build_kernel(
    block_type: &str,
    params: &Params,
    upstream: &TensorShape,
    output: &TensorShape,
    rng: &mut StdRng,
) -> Option<LayerKind> {
    let kind: LayerKind = match block_type {
        "Dense" => {
            let fan_in = fixed(upstream.last())?;
            let units = params.usize("units")?;
            let weight = Tensor::new_xavier(fan_in, units, &[fan_in, units], rng);
            Dense::new(weight, bias_of(params, units), activation_of(params)).into()
        }
        "Conv2D" => {
            let image = to_image_shape(upstream);
            let (h, w, c) = match image.feature_dims() {
                [h, w, c] => (h.value()?, w.value()?, c.value()?),
                _ => return None,
            };
            let k = params.usize("kernel_size")?.max(1);
            let filters = params.usize("filters")?;
            let kernel = Tensor::new_xavier(k * k * c, k * k * filters, &[k, k, c, filters], rng);
            Conv2d::new(kernel, bias_of(params, filters), activation_of(params), (h, w)).into()
        }
        "MaxPooling2D" => {
            let image = to_image_shape(upstream);
            let (h, w, c) = match image.feature_dims() {
                [h, w, c] => (h.value()?, w.value()?, c.value()?),
                _ => return None,
            };
            MaxPool2d::new(params.usize("pool_size")?, (h, w, c)).into()
        }
        "Flatten" => Flatten::new().into(),
        "Dropout" => Dropout::new(params.float("rate").unwrap_or(0.0) as f32).into(),
        "BatchNormalization" => {
            let channels = fixed(upstream.last())?;
            let epsilon = params.float("epsilon").unwrap_or(1e-3) as f32;
            BatchNorm::new(channels, epsilon).into()
        }
        "Activation" => {
            let width = fixed(output.last())?;
            ActivationLayer::new(activation_of(params), width).into()
        }
        "LSTM" => {
            let features = fixed(upstream.last())?;
            let units = params.usize("units")?;
            let w_x = Tensor::new_xavier(features, 4 * units, &[features, 4 * units], rng);
            let w_h = Tensor::new_xavier(units, 4 * units, &[units, 4 * units], rng);
            let bias = Tensor::zeros(&[4 * units]);
            let sequences = params.bool("return_sequences").unwrap_or(false);
            Lstm::new(w_x, w_h, bias, sequences).into()
        }
        _ => return None,
    };
    Some(kind)
}
