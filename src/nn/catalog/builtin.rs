/*
 * @Date         : 2026-03-03
 * @Description  : 内置积木目录
 *
 * 端口模板约定：
 * - 首维总是 `Batch`
 * - 由上游决定的特征维用 `Batch`（可匹配任意值，但不放宽秩）
 * - 接受任意秩输入的端口用 `Unknown` 占位
 */

use super::{BlockCatalog, BlockCategory, BlockDefinition, ParamSpec, Port};
use crate::nn::shape::{DType, Dim, TensorShape};

const ACTIVATIONS: &[&str] = &["relu", "sigmoid", "tanh", "softmax", "linear"];

fn f32_shape(dims: &[Dim]) -> TensorShape {
    TensorShape::new(DType::Float32, dims.to_vec())
}

/// (batch, ?)：接受任意秩
fn any_rank() -> TensorShape {
    f32_shape(&[Dim::Batch, Dim::Unknown])
}

/// (batch, batch)：二维，特征维由上游决定
fn matrix() -> TensorShape {
    f32_shape(&[Dim::Batch, Dim::Batch])
}

/// (batch, ?, ?, ?)：图像类输入，秩不一致时仅警告
fn image_in() -> TensorShape {
    f32_shape(&[Dim::Batch, Dim::Unknown, Dim::Unknown, Dim::Unknown])
}

/// (batch, h, w, c)
fn image_out() -> TensorShape {
    f32_shape(&[Dim::Batch, Dim::Batch, Dim::Batch, Dim::Batch])
}

fn layer(block_type: &str, inputs: Vec<Port>, outputs: Vec<Port>, params: Vec<ParamSpec>) -> BlockDefinition {
    BlockDefinition {
        block_type: block_type.to_string(),
        category: BlockCategory::Layer,
        inputs,
        outputs,
        params,
    }
}

fn single_io(block_type: &str, input: TensorShape, output: TensorShape, params: Vec<ParamSpec>) -> BlockDefinition {
    layer(
        block_type,
        vec![Port::new("input", input, "输入张量")],
        vec![Port::new("output", output, "输出张量")],
        params,
    )
}

pub(super) fn builtin_catalog() -> BlockCatalog {
    BlockCatalog::new()
        // ========== 数据 ==========
        .with(BlockDefinition {
            block_type: "DataLoader".to_string(),
            category: BlockCategory::Input,
            inputs: Vec::new(),
            outputs: vec![
                Port::new("data", any_rank(), "样本特征"),
                Port::new(
                    "labels",
                    TensorShape::new(DType::Int32, vec![Dim::Batch]),
                    "类别标签",
                ),
            ],
            params: vec![
                ParamSpec::choice("dataset", &["mnist", "fashion_mnist", "cifar10", "iris"], "mnist"),
                ParamSpec::integer("batch_size", 32, 1),
                ParamSpec::boolean("shuffle", true),
            ],
        })
        // ========== 层 ==========
        .with(single_io(
            "Dense",
            matrix(),
            matrix(),
            vec![
                ParamSpec::integer("units", 64, 1),
                ParamSpec::choice("activation", ACTIVATIONS, "relu"),
                ParamSpec::boolean("use_bias", true),
                ParamSpec::float("bias_initializer", 0.0),
            ],
        ))
        .with(single_io(
            "Conv2D",
            image_in(),
            image_out(),
            vec![
                ParamSpec::integer("filters", 32, 1),
                ParamSpec::integer("kernel_size", 3, 1),
                ParamSpec::choice("activation", ACTIVATIONS, "relu"),
                ParamSpec::boolean("use_bias", true),
                ParamSpec::float("bias_initializer", 0.0),
            ],
        ))
        .with(single_io(
            "MaxPooling2D",
            image_in(),
            image_out(),
            vec![ParamSpec::integer("pool_size", 2, 1)],
        ))
        .with(single_io("Flatten", any_rank(), matrix(), Vec::new()))
        .with(single_io(
            "Dropout",
            any_rank(),
            any_rank(),
            vec![ParamSpec::float_in("rate", 0.5, 0.0, 1.0)],
        ))
        .with(single_io(
            "BatchNormalization",
            any_rank(),
            any_rank(),
            vec![ParamSpec::float("epsilon", 1e-3)],
        ))
        .with(single_io(
            "Activation",
            any_rank(),
            any_rank(),
            vec![ParamSpec::choice("activation", ACTIVATIONS, "relu")],
        ))
        .with(single_io(
            "LSTM",
            f32_shape(&[Dim::Batch, Dim::Unknown, Dim::Unknown]),
            matrix(),
            vec![
                ParamSpec::integer("units", 64, 1),
                ParamSpec::boolean("return_sequences", false),
            ],
        ))
        .with(layer(
            "MultiHeadAttention",
            vec![
                Port::new("query", f32_shape(&[Dim::Batch, Dim::Unknown, Dim::Unknown]), "查询序列"),
                Port::new("value", f32_shape(&[Dim::Batch, Dim::Unknown, Dim::Unknown]), "键/值序列"),
            ],
            vec![Port::new(
                "output",
                f32_shape(&[Dim::Batch, Dim::Batch, Dim::Batch]),
                "注意力输出",
            )],
            vec![
                ParamSpec::integer("num_heads", 8, 1),
                ParamSpec::integer("dim", 64, 1),
            ],
        ))
        .with(layer(
            "Add",
            vec![
                Port::new("input_a", any_rank(), "第一个加数"),
                Port::new("input_b", any_rank(), "第二个加数"),
            ],
            vec![Port::new("output", any_rank(), "逐元素求和")],
            Vec::new(),
        ))
        .with(layer(
            "Concatenate",
            vec![
                Port::new("input_a", any_rank(), "第一个输入"),
                Port::new("input_b", any_rank(), "第二个输入"),
            ],
            vec![Port::new("output", any_rank(), "沿最后一维拼接")],
            Vec::new(),
        ))
        // ========== 损失 ==========
        .with(BlockDefinition {
            block_type: "CrossEntropy".to_string(),
            category: BlockCategory::Loss,
            inputs: vec![
                Port::new("predictions", matrix(), "预测概率"),
                Port::new(
                    "targets",
                    TensorShape::new(DType::Int32, vec![Dim::Batch]),
                    "类别标签",
                ),
            ],
            outputs: vec![Port::new("loss", TensorShape::scalar(), "标量损失")],
            params: Vec::new(),
        })
        .with(BlockDefinition {
            block_type: "MSE".to_string(),
            category: BlockCategory::Loss,
            inputs: vec![
                Port::new("predictions", matrix(), "预测值"),
                Port::new("targets", matrix(), "目标值"),
            ],
            outputs: vec![Port::new("loss", TensorShape::scalar(), "标量损失")],
            params: Vec::new(),
        })
        // ========== 优化器 ==========
        .with(BlockDefinition {
            block_type: "SGD".to_string(),
            category: BlockCategory::Optimizer,
            inputs: vec![Port::new("loss", TensorShape::scalar(), "待最小化的损失")],
            outputs: Vec::new(),
            params: vec![ParamSpec::float("learning_rate", 0.01)],
        })
        .with(BlockDefinition {
            block_type: "Adam".to_string(),
            category: BlockCategory::Optimizer,
            inputs: vec![Port::new("loss", TensorShape::scalar(), "待最小化的损失")],
            outputs: Vec::new(),
            params: vec![
                ParamSpec::float("learning_rate", 0.001),
                ParamSpec::float("beta1", 0.9),
                ParamSpec::float("beta2", 0.999),
                ParamSpec::float("epsilon", 1e-7),
            ],
        })
}
