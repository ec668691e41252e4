//! 规则引擎错误类型

use serde::Serialize;
use thiserror::Error;

/// 结构校验的字段级错误明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// 出错字段的路径，如 `rules.0.priority`
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("配置结构无效: {message}")]
    Schema {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("未配置任何启用的规则")]
    NoRulesConfigured,

    #[error("表达式解析失败（位置 {position}）: {message}")]
    Parse { position: usize, message: String },

    #[error("条件评估失败: {0}")]
    Evaluation(String),

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    /// 构造不带字段明细的结构错误
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// 构造带字段明细的结构错误
    pub fn schema_with_details(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::Schema {
            message: message.into(),
            details,
        }
    }

    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::NoRulesConfigured => "NO_RULES_CONFIGURED",
            Self::Parse { .. } => "PARSE_ERROR",
            Self::Evaluation(_) => "EVALUATION_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// 字段级错误明细（仅结构错误携带）
    pub fn details(&self) -> &[FieldError] {
        match self {
            Self::Schema { details, .. } => details,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
