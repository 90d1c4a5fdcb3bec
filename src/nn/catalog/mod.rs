/*
 * @Date         : 2026-03-03
 * @Description  : 积木目录（BlockCatalog）：积木类型 → 端口模板 + 参数模式
 *
 * 目录是只读的配置数据，以注入的方式传给 `GraphValidator`/`ModelCompiler`，
 * 测试中可以替换成自己的夹具（fixture）目录。
 */

mod builtin;
mod param;

pub use param::{ParamKind, ParamSpec, ParamValue, Params};

use crate::errors::{ParamError, PortSide, ValidationError};
use crate::nn::shape::TensorShape;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// 积木所属类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockCategory {
    /// 数据来源（如 DataLoader），在拓扑排序中被视为图的源头
    Input,
    /// 可计算的层，会被编译为 `CompiledLayer`
    Layer,
    Loss,
    Optimizer,
}

/// 端口：积木某一侧的命名输入/输出槽位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub shape: TensorShape,
    #[serde(default)]
    pub description: String,
}

impl Port {
    pub fn new(name: &str, shape: TensorShape, description: &str) -> Self {
        Self {
            name: name.to_string(),
            shape,
            description: description.to_string(),
        }
    }
}

/// 积木定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub block_type: String,
    pub category: BlockCategory,
    #[serde(default)]
    pub inputs: Vec<Port>,
    #[serde(default)]
    pub outputs: Vec<Port>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl BlockDefinition {
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// 按侧查找端口，不存在时返回 `PortNotFound`
    pub fn port(&self, side: PortSide, name: &str) -> Result<&Port, ValidationError> {
        let port = match side {
            PortSide::Input => self.input(name),
            PortSide::Output => self.output(name),
        };
        port.ok_or_else(|| ValidationError::PortNotFound {
            block_type: self.block_type.clone(),
            port: name.to_string(),
            side,
        })
    }

    pub fn param_spec(&self, key: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|spec| spec.name == key)
    }

    /// 校验单个参数覆盖值
    pub fn check_param(&self, key: &str, value: &ParamValue) -> Result<ParamValue, ParamError> {
        let spec = self
            .param_spec(key)
            .ok_or_else(|| ParamError::UnknownParameter {
                block_type: self.block_type.clone(),
                key: key.to_string(),
            })?;
        spec.kind.check(key, value)
    }

    /// 生效参数：默认值叠加覆盖值
    pub fn effective_params(
        &self,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Params, ParamError> {
        Params::resolve(&self.block_type, &self.params, overrides)
    }
}

/// 积木目录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockCatalog {
    blocks: HashMap<String, BlockDefinition>,
}

impl BlockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置目录（Dense、Conv2D、LSTM、损失、优化器等）
    pub fn builtin() -> Self {
        builtin::builtin_catalog()
    }

    pub fn insert(&mut self, definition: BlockDefinition) {
        self.blocks
            .insert(definition.block_type.clone(), definition);
    }

    pub fn with(mut self, definition: BlockDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn get(&self, block_type: &str) -> Option<&BlockDefinition> {
        self.blocks.get(block_type)
    }

    /// 查找定义，不存在时返回 `UnknownBlockType`
    pub fn resolve(&self, block_type: &str) -> Result<&BlockDefinition, ValidationError> {
        self.get(block_type)
            .ok_or_else(|| ValidationError::UnknownBlockType {
                block_type: block_type.to_string(),
            })
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.blocks.contains_key(block_type)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// 所有积木类型名（排序后，便于稳定展示）
    pub fn block_types(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.blocks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let definitions: Vec<BlockDefinition> = serde_json::from_str(json)?;
        Ok(definitions
            .into_iter()
            .fold(Self::new(), |catalog, def| catalog.with(def)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut definitions: Vec<_> = self.blocks.values().collect();
        definitions.sort_by(|a, b| a.block_type.cmp(&b.block_type));
        serde_json::to_string_pretty(&definitions)
    }
}
