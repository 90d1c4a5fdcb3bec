//! # Block Graph
//!
//! `block_graph`把用户用积木（层、损失、优化器、数据加载器）拼出的有向图，
//! 变成经过形状检查、按拓扑序排列、持有权重的运行时模型，
//! 并在其上执行前向传播和可取消、逐轮产出指标的训练循环。
//!

pub mod data;
pub mod errors;
pub mod nn;
pub mod tensor;
