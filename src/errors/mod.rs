/*
 * @Date         : 2026-03-02
 * @Description  : 全库错误类型（按关注点拆分）
 *
 * - 校验类错误（`ValidationError`）总是以列表形式返回，从不中断其他连接的检查
 * - 编译、执行、训练类错误是终止性的单个错误
 */

use thiserror::Error;

mod param;
pub use self::param::ParamError;

/// 连接端口所在的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSide {
    Input,
    Output,
}

impl std::fmt::Display for PortSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Input => write!(f, "输入"),
            Self::Output => write!(f, "输出"),
        }
    }
}

/// 单条连接（或整张图）的校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("未知的积木类型：{block_type}")]
    UnknownBlockType { block_type: String },

    #[error("节点不存在：{node_id}")]
    NodeNotFound { node_id: String },

    #[error("积木{block_type}上不存在{side}端口`{port}`")]
    PortNotFound {
        block_type: String,
        port: String,
        side: PortSide,
    },

    #[error("数据类型不兼容：{source_dtype}无法流入{target_dtype}")]
    DtypeMismatch {
        source_dtype: String,
        target_dtype: String,
    },

    #[error("秩不一致：源形状{source_shape}（秩{source_rank}），目标形状{target_shape}（秩{target_rank}）")]
    RankMismatch {
        source_shape: String,
        target_shape: String,
        source_rank: usize,
        target_rank: usize,
    },

    #[error("第{index}维不一致：源为{source_dim}，目标为{target_dim}")]
    DimensionMismatch {
        index: usize,
        source_dim: usize,
        target_dim: usize,
    },
}

/// 模型编译错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("图中没有任何可计算的层")]
    NoComputationalLayers,

    #[error("节点{node_id}的参数无效：{source}")]
    InvalidParameter { node_id: String, source: ParamError },

    #[error("无法确定节点{node_id}的输入形状{shape}（需要确定的维度）")]
    UnresolvedShape { node_id: String, shape: String },

    #[error("节点{node_id}的多个输入形状不兼容：{shapes:?}")]
    IncompatibleFeeds { node_id: String, shapes: Vec<String> },

    #[error("模型存在多个不同的输入形状：{first}与{second}")]
    InputShapeConflict { first: String, second: String },
}

/// 前向/反向传播错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("输入长度不匹配：模型需要{expected}，实际为{got}")]
    InputSizeMismatch { expected: usize, got: usize },

    #[error("梯度长度不匹配：模型输出为{expected}，梯度为{got}")]
    GradSizeMismatch { expected: usize, got: usize },

    #[error("反向传播需要与模型匹配的前向记录")]
    TapeMismatch,
}

/// 训练错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrainError {
    #[error("尚未编译模型，无法开始训练")]
    ModelNotReady,

    #[error("运行时尚未初始化（缺少数据集提供者）")]
    RuntimeNotInitialized,

    #[error("训练配置无效：{0}")]
    InvalidConfig(String),

    #[error("数据批次为空")]
    EmptyBatch,

    #[error("目标长度不匹配：模型输出为{expected}，目标为{got}")]
    TargetSizeMismatch { expected: usize, got: usize },

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("训练线程异常退出")]
    WorkerPanicked,
}

/// 数据加载相关错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("未知的数据集：{0}")]
    UnknownDataset(String),

    #[error("形状不匹配: 期望 {expected:?}, 实际 {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("数据集为空")]
    Empty,
}
