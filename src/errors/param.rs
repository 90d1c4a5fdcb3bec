use thiserror::Error;

/// 积木参数错误（在为节点设置参数时即校验）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("节点不存在：{node_id}")]
    NodeNotFound { node_id: String },

    #[error("未知的积木类型：{block_type}")]
    UnknownBlockType { block_type: String },

    #[error("积木{block_type}没有参数`{key}`")]
    UnknownParameter { block_type: String, key: String },

    #[error("参数`{key}`类型错误：期望{expected}，实际为{got}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        got: String,
    },

    #[error("参数`{key}`的取值`{value}`不在可选项{options:?}中")]
    NotInOptions {
        key: String,
        value: String,
        options: Vec<String>,
    },

    #[error("参数`{key}`须>={min}，实际为{value}")]
    BelowMinimum { key: String, min: i64, value: i64 },

    #[error("参数`{key}`须在[{min}, {max})内，实际为{value}")]
    OutOfRange {
        key: String,
        min: f64,
        max: f64,
        value: f64,
    },
}
