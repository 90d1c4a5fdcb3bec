/*
 * @Date         : 2026-03-04
 * @Description  : 积木图：编辑器传来的节点/连接快照
 *
 * 公开 API：
 * - `GraphSnapshot`: 节点 + 连接（可原样 JSON 保存/加载）
 * - `GraphValidator`: 单条连接/整张图的校验
 * - `TopologicalScheduler`: 防环的拓扑排序
 */

mod scheduler;
mod validator;

pub use scheduler::{Schedule, TopologicalScheduler};
pub use validator::{ConnectionIssue, ConnectionReport, GraphValidator};

use crate::errors::ParamError;
use crate::nn::catalog::{BlockCatalog, ParamValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 图中的一个节点（只记录显式设置过的参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub block_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
    /// 显式标记为图的源头（拓扑排序从这里开始）
    #[serde(default)]
    pub is_source: bool,
}

impl Node {
    pub fn new(id: &str, block_type: &str) -> Self {
        Self {
            id: id.to_string(),
            block_type: block_type.to_string(),
            label: None,
            params: BTreeMap::new(),
            is_source: false,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn as_source(mut self) -> Self {
        self.is_source = true;
        self
    }

    /// 未经校验地写入参数，只用于构造快照/夹具；编辑器应使用 `GraphSnapshot::set_param`
    pub fn with_param(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// 人类可读的标签，如 `Dense (dense_1)`
    pub fn display_label(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{} ({})", self.block_type, self.id),
        }
    }
}

/// 有向连接：源节点输出端口 → 目标节点输入端口
///
/// `valid`/`error` 只是缓存（memo），由 `GraphValidator::refresh_flags` 按需重算，不是不变量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Connection {
    pub fn new(id: &str, source: (&str, &str), target: (&str, &str)) -> Self {
        Self {
            id: id.to_string(),
            source: source.0.to_string(),
            source_port: source.1.to_string(),
            target: target.0.to_string(),
            target_port: target.1.to_string(),
            valid: None,
            error: None,
        }
    }
}

/// 节点/连接快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<Connection>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        Self { nodes, connections }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// 指向`node_id`的连接（按连接列表顺序）
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target == node_id)
    }

    /// 从`node_id`出发的连接（按连接列表顺序）
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source == node_id)
    }

    /// 为节点设置参数，按目录中的模式立即校验
    ///
    /// 节点不存在时返回 `NodeNotFound`，积木类型不在目录中时返回 `UnknownBlockType`
    pub fn set_param(
        &mut self,
        catalog: &BlockCatalog,
        node_id: &str,
        key: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), ParamError> {
        let value = value.into();
        let node = self
            .node_mut(node_id)
            .ok_or_else(|| ParamError::NodeNotFound {
                node_id: node_id.to_string(),
            })?;
        let definition =
            catalog
                .get(&node.block_type)
                .ok_or_else(|| ParamError::UnknownBlockType {
                    block_type: node.block_type.clone(),
                })?;
        let checked = definition.check_param(key, &value)?;
        node.params.insert(key.to_string(), checked);
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
