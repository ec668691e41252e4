//! 采购规则引擎
//!
//! 对采购数据执行可配置的业务规则，支持：
//! - JSON 规则配置的加载、结构校验和局部更新
//! - 字段条件与安全表达式两种条件形式
//! - 按优先级评估、顺序合并条件并执行动作
//! - 批量并行校验和有界的校验历史
//! - 基于 axum 的 HTTP 接口

pub mod actions;
pub mod api;
pub mod batch;
pub mod combiner;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod history;
pub mod legacy;
pub mod models;
pub mod operators;
pub mod record;
pub mod schema;
pub mod service;
pub mod store;

pub use actions::{ActionResolver, LoggingNotificationSink, NotificationIntent, NotificationSink};
pub use batch::BatchRunner;
pub use engine::RuleEngine;
pub use error::{FieldError, Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use expression::Expression;
pub use history::{ValidationHistory, ValidationKind};
pub use models::{
    Action, ActionType, BatchOptions, BatchOutcome, Condition, EvaluationOptions,
    EvaluationResult, EvaluationSummary, OverallStatus, Rule, RuleSet, RuleType,
};
pub use operators::{LogicalOperator, Operator};
pub use record::{FieldValue, Record};
pub use service::RuleEngineService;
pub use store::{RuleSetSnapshot, RuleStore};
