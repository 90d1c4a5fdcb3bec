//! ModelCompiler 测试

use super::{compile_builtin, mnist_mlp_snapshot};
use crate::data::DatasetRegistry;
use crate::errors::{CompileError, ParamError};
use crate::nn::catalog::ParamValue;
use crate::nn::{
    BlockCatalog, Connection, Dim, Feed, GraphSnapshot, ModelCompiler, Node, TensorShape,
    complexity_score,
};
use approx::assert_abs_diff_eq;
use std::collections::BTreeMap;

fn conn(id: &str, source: &str, target: &str) -> Connection {
    Connection::new(id, (source, "output"), (target, "input"))
}

#[test]
fn test_mnist_mlp_param_counts() {
    let model = compile_builtin(&mnist_mlp_snapshot());

    assert_eq!(model.input_shape, TensorShape::batched(&[28, 28, 1]));
    assert_eq!(model.input_size(), 784);
    assert_eq!(model.layers.len(), 3);
    assert_eq!(model.weight_bearing_layers(), 2);

    let flatten = &model.layers[0];
    assert_eq!(flatten.block_type, "Flatten");
    assert_eq!(flatten.output_shape, TensorShape::batched(&[784]));
    assert_eq!(flatten.inputs, vec![Feed::ModelInput]);

    // 784·128 + 128 与 128·10 + 10
    assert_eq!(model.layers[1].param_count, 100_480);
    assert_eq!(model.layers[2].param_count, 1_290);
    assert_eq!(model.total_params, 101_770);
    assert_eq!(model.layers[2].inputs, vec![Feed::Layer(1)]);

    assert_eq!(model.output_layer(), 2);
    assert_eq!(model.output_shape, TensorShape::batched(&[10]));
    assert_eq!(model.output_size(), 10);
    assert!(!model.cycle_detected);
}

#[test]
fn test_weights_deterministic_per_seed() {
    let catalog = BlockCatalog::builtin();
    let registry = DatasetRegistry::builtin();
    let snapshot = mnist_mlp_snapshot();
    let compile = |seed| {
        ModelCompiler::new(&catalog)
            .with_datasets(&registry)
            .seed(seed)
            .compile(&snapshot)
            .unwrap()
    };
    let weights = |model: &crate::nn::CompiledModel| {
        use crate::nn::layer::LayerKernel;
        model.layers[1].kind.params()[0].as_slice().to_vec()
    };
    let (a, b, c) = (compile(7), compile(7), compile(8));
    assert_eq!(weights(&a), weights(&b));
    assert_ne!(weights(&a), weights(&c));

    // Xavier 均匀分布的边界
    let limit = (6.0f32 / (784.0 + 128.0)).sqrt();
    assert!(weights(&a).iter().all(|w| w.abs() <= limit));
}

#[test]
fn test_empty_graph_has_no_layers() {
    let catalog = BlockCatalog::builtin();
    let err = ModelCompiler::new(&catalog)
        .compile(&GraphSnapshot::default())
        .unwrap_err();
    assert_eq!(err, CompileError::NoComputationalLayers);

    // 只有损失与优化器
    let snapshot = GraphSnapshot::new(
        vec![Node::new("loss", "MSE"), Node::new("opt", "SGD")],
        vec![Connection::new("c", ("loss", "loss"), ("opt", "loss"))],
    );
    assert_eq!(
        ModelCompiler::new(&catalog).compile(&snapshot).unwrap_err(),
        CompileError::NoComputationalLayers
    );
}

#[test]
fn test_unknown_type_is_skipped() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("mystery", "QuantumLayer"),
            Node::new("dense", "Dense").with_param("units", 3),
        ],
        vec![
            Connection::new("c1", ("data", "data"), ("mystery", "input")),
            conn("c2", "mystery", "dense"),
        ],
    );
    let model = compile_builtin(&snapshot);
    assert_eq!(model.layers.len(), 1);
    // 透传：Dense 直接读取模型输入
    assert_eq!(model.layers[0].inputs, vec![Feed::ModelInput]);
    assert_eq!(model.layers[0].param_count, 4 * 3 + 3);
}

#[test]
fn test_attention_is_passthrough() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("attn", "MultiHeadAttention"),
            Node::new("out", "Dense").with_param("units", 2),
        ],
        vec![
            Connection::new("c1", ("data", "data"), ("attn", "query")),
            conn("c2", "attn", "out"),
        ],
    );
    let model = compile_builtin(&snapshot);
    assert_eq!(model.layers.len(), 1);
    assert_eq!(model.layers[0].block_type, "Dense");
}

#[test]
fn test_unresolved_input_shape() {
    // 没有数据集提供者：输入形状无法确定
    let catalog = BlockCatalog::builtin();
    let err = ModelCompiler::new(&catalog)
        .compile(&mnist_mlp_snapshot())
        .unwrap_err();
    assert!(matches!(err, CompileError::UnresolvedShape { node_id, .. } if node_id == "flatten"));
}

#[test]
fn test_explicit_input_shape() {
    let catalog = BlockCatalog::builtin();
    let snapshot = GraphSnapshot::new(vec![Node::new("d", "Dense").with_param("units", 4)], Vec::new());
    let model = ModelCompiler::new(&catalog)
        .with_input_shape(TensorShape::batched(&[6]))
        .compile(&snapshot)
        .unwrap();
    assert_eq!(model.total_params, 6 * 4 + 4);
}

#[test]
fn test_invalid_parameter() {
    let catalog = BlockCatalog::builtin();
    let mut params = BTreeMap::new();
    params.insert("units".to_string(), ParamValue::Int(0));
    let mut node = Node::new("bad", "Dense");
    node.params = params;
    let err = ModelCompiler::new(&catalog)
        .with_input_shape(TensorShape::batched(&[3]))
        .compile(&GraphSnapshot::new(vec![node], Vec::new()))
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::InvalidParameter {
            source: ParamError::BelowMinimum { .. },
            ..
        }
    ));
}

#[test]
fn test_cnn_shapes() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "mnist"),
            Node::new("conv", "Conv2D").with_param("filters", 8),
            Node::new("pool", "MaxPooling2D"),
            Node::new("flat", "Flatten"),
            Node::new("out", "Dense")
                .with_param("units", 10)
                .with_param("activation", "softmax"),
        ],
        vec![
            Connection::new("c1", ("data", "data"), ("conv", "input")),
            conn("c2", "conv", "pool"),
            conn("c3", "pool", "flat"),
            conn("c4", "flat", "out"),
        ],
    );
    let model = compile_builtin(&snapshot);
    assert_eq!(model.layers[0].output_shape, TensorShape::batched(&[28, 28, 8]));
    assert_eq!(model.layers[0].param_count, 3 * 3 * 1 * 8 + 8);
    assert_eq!(model.layers[1].output_shape, TensorShape::batched(&[14, 14, 8]));
    assert_eq!(model.layers[2].output_shape, TensorShape::batched(&[1568]));
    assert_eq!(model.layers[3].param_count, 1568 * 10 + 10);
}

#[test]
fn test_lstm_reads_flat_input_as_sequence() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("lstm", "LSTM").with_param("units", 5),
        ],
        vec![Connection::new("c1", ("data", "data"), ("lstm", "input"))],
    );
    let model = compile_builtin(&snapshot);
    // (batch, 4) → 4 个时间步、每步 1 个特征
    let lstm = &model.layers[0];
    assert_eq!(lstm.output_shape, TensorShape::batched(&[5]));
    assert_eq!(lstm.param_count, 4 * 5 * (1 + 5 + 1));
}

#[test]
fn test_add_and_concatenate() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("a", "Dense").with_param("units", 6),
            Node::new("b", "Dense").with_param("units", 6),
            Node::new("c", "Dense").with_param("units", 2),
            Node::new("sum", "Add"),
            Node::new("cat", "Concatenate"),
        ],
        vec![
            Connection::new("d1", ("data", "data"), ("a", "input")),
            Connection::new("d2", ("data", "data"), ("b", "input")),
            Connection::new("d3", ("data", "data"), ("c", "input")),
            Connection::new("s1", ("a", "output"), ("sum", "input_a")),
            Connection::new("s2", ("b", "output"), ("sum", "input_b")),
            Connection::new("k1", ("sum", "output"), ("cat", "input_a")),
            Connection::new("k2", ("c", "output"), ("cat", "input_b")),
        ],
    );
    let model = compile_builtin(&snapshot);
    let sum = model.layers.iter().find(|l| l.node_id == "sum").unwrap();
    assert_eq!(sum.inputs.len(), 2);
    assert_eq!(sum.output_shape, TensorShape::batched(&[6]));

    let cat = model.layers.iter().find(|l| l.node_id == "cat").unwrap();
    assert_eq!(cat.output_shape, TensorShape::batched(&[8]));
    assert_eq!(model.output_layer(), cat.index);
    assert_eq!(model.output_size(), 8);
}

#[test]
fn test_add_rejects_mismatched_feeds() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("a", "Dense").with_param("units", 6),
            Node::new("b", "Dense").with_param("units", 5),
            Node::new("sum", "Add"),
        ],
        vec![
            Connection::new("d1", ("data", "data"), ("a", "input")),
            Connection::new("d2", ("data", "data"), ("b", "input")),
            Connection::new("s1", ("a", "output"), ("sum", "input_a")),
            Connection::new("s2", ("b", "output"), ("sum", "input_b")),
        ],
    );
    let catalog = BlockCatalog::builtin();
    let registry = DatasetRegistry::builtin();
    let err = ModelCompiler::new(&catalog)
        .with_datasets(&registry)
        .compile(&snapshot)
        .unwrap_err();
    assert!(matches!(err, CompileError::IncompatibleFeeds { node_id, .. } if node_id == "sum"));
}

#[test]
fn test_single_input_layer_keeps_first_feed() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("a", "Dense").with_param("units", 3),
            Node::new("b", "Dense").with_param("units", 7),
            Node::new("out", "Dense").with_param("units", 2),
        ],
        vec![
            Connection::new("d1", ("data", "data"), ("a", "input")),
            Connection::new("d2", ("data", "data"), ("b", "input")),
            conn("o1", "a", "out"),
            conn("o2", "b", "out"),
        ],
    );
    let model = compile_builtin(&snapshot);
    let out = model.layers.iter().find(|l| l.node_id == "out").unwrap();
    assert_eq!(out.inputs.len(), 1);
    // 第一条入边来自 a（3 个单元）
    assert_eq!(out.param_count, 3 * 2 + 2);
}

#[test]
fn test_cycle_still_compiles() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "iris"),
            Node::new("a", "Dense").with_param("units", 4),
            Node::new("b", "Dense").with_param("units", 4),
        ],
        vec![
            Connection::new("d1", ("data", "data"), ("a", "input")),
            conn("ab", "a", "b"),
            conn("ba", "b", "a"),
        ],
    );
    let model = compile_builtin(&snapshot);
    assert!(model.cycle_detected);
    assert_eq!(model.layers.len(), 2);
}

#[test]
fn test_input_shape_conflict() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("mnist", "DataLoader").with_param("dataset", "mnist"),
            Node::new("cifar", "DataLoader").with_param("dataset", "cifar10"),
            Node::new("d", "Dense"),
        ],
        vec![Connection::new("c", ("mnist", "data"), ("d", "input"))],
    );
    let catalog = BlockCatalog::builtin();
    let registry = DatasetRegistry::builtin();
    let err = ModelCompiler::new(&catalog)
        .with_datasets(&registry)
        .compile(&snapshot)
        .unwrap_err();
    assert!(matches!(err, CompileError::InputShapeConflict { .. }));
}

#[test]
fn test_dense_on_image_acts_on_last_axis() {
    let snapshot = GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "cifar10"),
            Node::new("d", "Dense").with_param("units", 4),
        ],
        vec![Connection::new("c", ("data", "data"), ("d", "input"))],
    );
    let model = compile_builtin(&snapshot);
    let dense = &model.layers[0];
    assert_eq!(
        dense.output_shape.dims,
        vec![Dim::Batch, Dim::Fixed(32), Dim::Fixed(32), Dim::Fixed(4)]
    );
    assert_eq!(dense.param_count, 3 * 4 + 4);
}

#[test]
fn test_complexity_score() {
    let model = compile_builtin(&mnist_mlp_snapshot());
    // 1 + 0.5·log10(129) + 0.5·log10(11)
    assert_abs_diff_eq!(model.complexity, 2.5759912, epsilon = 1e-4);

    let catalog = BlockCatalog::builtin();
    let dropout = catalog.get("Dropout").unwrap().effective_params(&BTreeMap::new()).unwrap();
    let many = vec![("Dropout", &dropout); 10];
    assert_abs_diff_eq!(complexity_score(many), 0.5);

    let dense = catalog.get("Dense").unwrap();
    let mut overrides = BTreeMap::new();
    overrides.insert("units".to_string(), ParamValue::Int(1_000_000));
    let huge = dense.effective_params(&overrides).unwrap();
    assert_abs_diff_eq!(complexity_score(vec![("Dense", &huge); 5]), 5.0);
}

#[test]
fn test_summary_and_parameter_table() {
    let model = compile_builtin(&mnist_mlp_snapshot());
    let summary = model.summary();
    assert!(summary.contains("101,770"));
    assert!(summary.contains("100,480"));
    assert!(summary.contains("units=128, activation=relu"));
    assert!(summary.contains("可训练层: 2"));

    let table = model.parameter_table();
    assert_eq!(table.len(), 3);
    assert_eq!(table[1].layer_type, "Dense");
    assert_eq!(table[1].output_shape, "(batch, 128)");
    assert_eq!(table.iter().map(|row| row.params).sum::<usize>(), model.total_params);
    let json = serde_json::to_value(&table).unwrap();
    assert_eq!(json[2]["params"], 1290);
}
