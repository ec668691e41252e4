//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 严格相等
    Equals,
    NotEquals,

    // 数值比较
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,

    // 文本包含
    Contains,
    NotContains,

    // 列表成员
    In,
    NotIn,

    // 存在性检查
    Exists,
    NotExists,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterEqual => "greater_equal",
            Self::LessEqual => "less_equal",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
        }
    }

    /// 是否为数值比较操作符
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::GreaterThan | Self::LessThan | Self::GreaterEqual | Self::LessEqual
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 逻辑操作符
///
/// 只决定当前条件与下一个条件的连接方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_wire_names() {
        let op: Operator = serde_json::from_str("\"greater_equal\"").unwrap();
        assert_eq!(op, Operator::GreaterEqual);
        assert_eq!(op.to_string(), "greater_equal");
        assert_eq!(serde_json::to_string(&Operator::NotIn).unwrap(), "\"not_in\"");
    }

    #[test]
    fn test_unknown_operator_rejected() {
        assert!(serde_json::from_str::<Operator>("\"between\"").is_err());
    }

    #[test]
    fn test_logical_operator_default_and_case() {
        assert_eq!(LogicalOperator::default(), LogicalOperator::And);
        let op: LogicalOperator = serde_json::from_str("\"OR\"").unwrap();
        assert_eq!(op, LogicalOperator::Or);
        assert!(serde_json::from_str::<LogicalOperator>("\"or\"").is_err());
    }
}
