/*
 * @Date         : 2026-03-02
 * @Description  : 积木图的校验、编译与执行
 */

pub mod catalog;
mod compiler;
pub mod criterion;
mod executor;
pub mod graph;
mod inference;
pub mod layer;
mod model;
pub mod optimizer;
pub mod shape;
mod trainer;
mod workbench;

pub use catalog::{BlockCatalog, BlockCategory, BlockDefinition, Port};
pub use compiler::{DEFAULT_SEED, ModelCompiler};
pub use criterion::LossFunction;
pub use executor::{Gradients, Tape};
pub use graph::{
    Connection, ConnectionIssue, ConnectionReport, GraphSnapshot, GraphValidator, Node, Schedule,
    TopologicalScheduler,
};
pub use inference::{ShapeInference, infer_output_shape, to_image_shape};
pub use model::{CompiledLayer, CompiledModel, Feed, LayerSummary, complexity_score};
pub use optimizer::{Optimizer, OptimizerKind};
pub use shape::{DType, Dim, ShapeCheck, TensorShape, check_shapes};
pub use trainer::{StopHandle, Trainer, TrainingConfig, TrainingMetrics, evaluate};
pub use workbench::Workbench;

#[cfg(test)]
mod tests;
