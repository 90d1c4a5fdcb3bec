/*
 * @Date         : 2026-03-03
 * @Description  : 积木参数：带类型的参数模式（schema）与取值
 *
 * 参数在设置到节点上时即按模式校验，而不是等到层实例化时才发现类型不对。
 */

use crate::errors::ParamError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 参数取值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "string",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// 参数类型（带默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamKind {
    Integer {
        default: i64,
        #[serde(default)]
        min: Option<i64>,
    },
    Float {
        default: f64,
        /// 半开区间 [min, max)
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
    Boolean {
        default: bool,
    },
    Enum {
        options: Vec<String>,
        default: String,
    },
    #[serde(rename = "string")]
    Text {
        default: String,
    },
}

impl ParamKind {
    pub fn default_value(&self) -> ParamValue {
        match self {
            Self::Integer { default, .. } => ParamValue::Int(*default),
            Self::Float { default, .. } => ParamValue::Float(*default),
            Self::Boolean { default } => ParamValue::Bool(*default),
            Self::Enum { default, .. } => ParamValue::Text(default.clone()),
            Self::Text { default } => ParamValue::Text(default.clone()),
        }
    }

    const fn expected(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Float { .. } => "float",
            Self::Boolean { .. } => "boolean",
            Self::Enum { .. } => "enum",
            Self::Text { .. } => "string",
        }
    }

    /// 校验并规范化取值（整数可提升为浮点）
    pub fn check(&self, key: &str, value: &ParamValue) -> Result<ParamValue, ParamError> {
        let mismatch = || ParamError::TypeMismatch {
            key: key.to_string(),
            expected: self.expected(),
            got: value.kind_name().to_string(),
        };
        match (self, value) {
            (Self::Integer { min, .. }, ParamValue::Int(v)) => match min {
                Some(min) if v < min => Err(ParamError::BelowMinimum {
                    key: key.to_string(),
                    min: *min,
                    value: *v,
                }),
                _ => Ok(value.clone()),
            },
            (Self::Float { range, .. }, ParamValue::Float(_) | ParamValue::Int(_)) => {
                let v = value.as_float().ok_or_else(mismatch)?;
                match range {
                    Some((min, max)) if !(v >= *min && v < *max) => Err(ParamError::OutOfRange {
                        key: key.to_string(),
                        min: *min,
                        max: *max,
                        value: v,
                    }),
                    _ => Ok(ParamValue::Float(v)),
                }
            }
            (Self::Boolean { .. }, ParamValue::Bool(_)) => Ok(value.clone()),
            (Self::Enum { options, .. }, ParamValue::Text(v)) => {
                if options.iter().any(|o| o == v) {
                    Ok(value.clone())
                } else {
                    Err(ParamError::NotInOptions {
                        key: key.to_string(),
                        value: v.clone(),
                        options: options.clone(),
                    })
                }
            }
            (Self::Text { .. }, ParamValue::Text(_)) => Ok(value.clone()),
            _ => Err(mismatch()),
        }
    }
}

/// 单个参数的模式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn integer(name: &str, default: i64, min: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Integer {
                default,
                min: Some(min),
            },
        }
    }

    pub fn float(name: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float {
                default,
                range: None,
            },
        }
    }

    pub fn float_in(name: &str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float {
                default,
                range: Some((min, max)),
            },
        }
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Boolean { default },
        }
    }

    pub fn choice(name: &str, options: &[&str], default: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Enum {
                options: options.iter().map(|o| o.to_string()).collect(),
                default: default.to_string(),
            },
        }
    }
}

/// 生效的参数：模式默认值叠加节点覆盖值，保持模式中的顺序
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    /// 用模式默认值叠加覆盖值；覆盖值按模式重新校验
    pub(crate) fn resolve(
        block_type: &str,
        schema: &[ParamSpec],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ParamError> {
        if let Some(key) = overrides
            .keys()
            .find(|key| !schema.iter().any(|spec| &spec.name == *key))
        {
            return Err(ParamError::UnknownParameter {
                block_type: block_type.to_string(),
                key: key.clone(),
            });
        }
        let entries = schema
            .iter()
            .map(|spec| {
                let value = match overrides.get(&spec.name) {
                    Some(v) => spec.kind.check(&spec.name, v)?,
                    None => spec.kind.default_value(),
                };
                Ok((spec.name.clone(), value))
            })
            .collect::<Result<Vec<_>, ParamError>>()?;
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 读取正整数参数（如 units/filters），缺失或非正时返回`None`
    pub fn usize(&self, key: &str) -> Option<usize> {
        self.get(key)
            .and_then(ParamValue::as_int)
            .and_then(|v| usize::try_from(v).ok())
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ParamValue::as_float)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ParamValue::as_bool)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
