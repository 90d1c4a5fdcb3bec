/*
 * @Date         : 2026-03-05
 * @Description  : 图校验（GraphValidator）
 *
 * 单条连接的检查顺序：
 * 1. 两端积木定义 → `UnknownBlockType`
 * 2. 端口是否在正确的一侧（源→输出，目标→输入）→ `PortNotFound`
 * 3. dtype 子类型链 → `DtypeMismatch`
 * 4. 形状 → `RankMismatch` / `DimensionMismatch`（秩不一致但目标含占位符时仅警告）
 * 5. 通过后附带源节点的推断输出形状
 *
 * 整图校验收集所有失败的连接（丢弃警告），按连接列表顺序返回，从不抛出。
 */

use super::{Connection, GraphSnapshot, Node};
use crate::errors::{PortSide, ValidationError};
use crate::nn::catalog::BlockCatalog;
use crate::nn::inference::ShapeInference;
use crate::nn::shape::{ShapeCheck, TensorShape, check_shapes};
use std::collections::HashMap;

/// 连接通过校验后的附加信息
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionReport {
    pub warning: Option<String>,
    pub inferred_shape: Option<TensorShape>,
}

/// 整图校验中的单个失败项
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionIssue {
    pub connection_id: String,
    pub source_label: String,
    pub target_label: String,
    pub error: ValidationError,
}

impl std::fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} → {}：{}",
            self.source_label, self.target_label, self.error
        )
    }
}

pub struct GraphValidator<'a> {
    catalog: &'a BlockCatalog,
}

impl<'a> GraphValidator<'a> {
    pub fn new(catalog: &'a BlockCatalog) -> Self {
        Self { catalog }
    }

    /// 校验单条连接
    pub fn validate_connection(
        &self,
        source: &Node,
        source_port: &str,
        target: &Node,
        target_port: &str,
    ) -> Result<ConnectionReport, ValidationError> {
        let report = self.check_ports(source, source_port, target, target_port)?;
        Ok(ConnectionReport {
            inferred_shape: ShapeInference::new(self.catalog).infer(source, None),
            ..report
        })
    }

    /// 步骤 1~4：不含形状推断
    fn check_ports(
        &self,
        source: &Node,
        source_port: &str,
        target: &Node,
        target_port: &str,
    ) -> Result<ConnectionReport, ValidationError> {
        let source_def = self.catalog.resolve(&source.block_type)?;
        let target_def = self.catalog.resolve(&target.block_type)?;

        let out = source_def.port(PortSide::Output, source_port)?;
        let inp = target_def.port(PortSide::Input, target_port)?;

        if !out.shape.dtype.flows_into(inp.shape.dtype) {
            return Err(ValidationError::DtypeMismatch {
                source_dtype: out.shape.dtype.to_string(),
                target_dtype: inp.shape.dtype.to_string(),
            });
        }

        let warning = match check_shapes(&out.shape, &inp.shape) {
            ShapeCheck::Compatible => None,
            ShapeCheck::RankWarning => Some(format!(
                "秩不一致：{}（秩{}）连接到{}（秩{}），将在编译时重新解释形状",
                out.shape,
                out.shape.rank(),
                inp.shape,
                inp.shape.rank()
            )),
            ShapeCheck::RankMismatch => {
                return Err(ValidationError::RankMismatch {
                    source_shape: out.shape.to_string(),
                    target_shape: inp.shape.to_string(),
                    source_rank: out.shape.rank(),
                    target_rank: inp.shape.rank(),
                });
            }
            ShapeCheck::DimensionMismatch {
                index,
                source,
                target,
            } => {
                return Err(ValidationError::DimensionMismatch {
                    index,
                    source_dim: source,
                    target_dim: target,
                });
            }
        };

        Ok(ConnectionReport {
            warning,
            inferred_shape: None,
        })
    }

    /// 校验单条已存在的连接（先解析两端节点）
    fn validate_edge(
        &self,
        snapshot: &GraphSnapshot,
        connection: &Connection,
    ) -> Result<(), ValidationError> {
        let find = |id: &str| {
            snapshot
                .node(id)
                .ok_or_else(|| ValidationError::NodeNotFound {
                    node_id: id.to_string(),
                })
        };
        let source = find(&connection.source)?;
        let target = find(&connection.target)?;
        self.check_ports(source, &connection.source_port, target, &connection.target_port)
            .map(|_| ())
    }

    /// 校验整张图，返回失败的连接（按连接列表顺序，丢弃警告）
    pub fn validate_graph(&self, snapshot: &GraphSnapshot) -> Vec<ConnectionIssue> {
        let label = |id: &str| {
            snapshot
                .node(id)
                .map_or_else(|| id.to_string(), Node::display_label)
        };
        snapshot
            .connections
            .iter()
            .filter_map(|connection| {
                self.validate_edge(snapshot, connection)
                    .err()
                    .map(|error| ConnectionIssue {
                        connection_id: connection.id.clone(),
                        source_label: label(&connection.source),
                        target_label: label(&connection.target),
                        error,
                    })
            })
            .collect()
    }

    /// 逐节点推断模板形状（同一次调用内按节点缓存）
    pub fn inferred_shapes(&self, snapshot: &GraphSnapshot) -> HashMap<String, TensorShape> {
        let inference = ShapeInference::new(self.catalog);
        let mut cache = HashMap::new();
        for connection in &snapshot.connections {
            if cache.contains_key(&connection.source) {
                continue;
            }
            if let Some(shape) = snapshot
                .node(&connection.source)
                .and_then(|node| inference.infer(node, None))
            {
                cache.insert(connection.source.clone(), shape);
            }
        }
        cache
    }

    /// 重算每条连接上缓存的 `valid`/`error`
    pub fn refresh_flags(&self, snapshot: &mut GraphSnapshot) {
        let results: Vec<_> = snapshot
            .connections
            .iter()
            .map(|c| self.validate_edge(snapshot, c))
            .collect();
        for (connection, result) in snapshot.connections.iter_mut().zip(results) {
            connection.valid = Some(result.is_ok());
            connection.error = result.err().map(|e| e.to_string());
        }
    }
}
