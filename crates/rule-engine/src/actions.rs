//! 动作执行
//!
//! 规则通过后按声明顺序执行动作，所有修改累积在同一条记录上，不做回滚。
//! 通知类动作不修改记录，而是通过 `NotificationSink` 发出通知意图。

use crate::evaluator::ConditionEvaluator;
use crate::models::{Action, ActionType, Rule};
use crate::record::{self, Record};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 通知意图
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
    pub rule_id: String,
    pub rule_name: String,
    /// 记录中的 `id`，没有时为空
    pub record_id: Option<String>,
    pub parameters: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// 通知出口
///
/// 默认实现只记录日志；接入消息系统时实现同一 trait。
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, intent: NotificationIntent);
}

/// 以结构化日志输出通知意图
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, intent: NotificationIntent) {
        info!(
            rule_id = %intent.rule_id,
            rule_name = %intent.rule_name,
            record_id = ?intent.record_id,
            parameters = ?intent.parameters,
            "规则触发通知"
        );
    }
}

/// 动作执行器
#[derive(Clone)]
pub struct ActionResolver {
    sink: Arc<dyn NotificationSink>,
}

impl Default for ActionResolver {
    fn default() -> Self {
        Self::new(Arc::new(LoggingNotificationSink))
    }
}

impl ActionResolver {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// 依次执行规则的所有动作，返回实际生效的动作数
    pub fn apply(&self, rule: &Rule, record: &mut Record, now: DateTime<Utc>) -> usize {
        let timestamp = Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true));
        let mut applied = 0;

        for action in &rule.actions {
            let done = match action.action_type {
                ActionType::Approve => {
                    let status = action.param_str("setStatus").unwrap_or("Approved");
                    record.insert("status".to_string(), Value::from(status));
                    record.insert("approvalType".to_string(), Value::from("Auto"));
                    record.insert("approvedAt".to_string(), timestamp.clone());
                    true
                }
                ActionType::Reject => {
                    let status = action.param_str("setStatus").unwrap_or("Rejected");
                    record.insert("status".to_string(), Value::from(status));
                    record.insert("rejectedAt".to_string(), timestamp.clone());
                    true
                }
                ActionType::Flag => {
                    let urgency = action.param_str("urgency").unwrap_or("High");
                    record.insert("urgency".to_string(), Value::from(urgency));
                    record.insert("urgencySetAt".to_string(), timestamp.clone());
                    true
                }
                ActionType::Calculate => Self::calculate(rule, action, record, &timestamp),
                ActionType::Notify => {
                    self.sink.notify(NotificationIntent {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        record_id: record_id(record),
                        parameters: action.parameters.clone(),
                        created_at: now,
                    });
                    true
                }
                ActionType::Modify => {
                    let level = action
                        .parameters
                        .get("approvalLevel")
                        .cloned()
                        .unwrap_or(Value::Null);
                    record.insert("status".to_string(), Value::from("Pending Approval"));
                    record.insert("approvalRequired".to_string(), Value::Bool(true));
                    record.insert("approvalLevel".to_string(), level);
                    true
                }
                ActionType::Unknown => {
                    warn!(rule_id = %rule.id, "未知的动作类型，已跳过");
                    false
                }
            };

            if done {
                applied += 1;
                debug!(rule_id = %rule.id, action = %action.action_type, "动作已执行");
            }
        }

        applied
    }

    /// 计算动作：结果写入 `target`，并记录 calculatedAt
    fn calculate(rule: &Rule, action: &Action, record: &mut Record, timestamp: &Value) -> bool {
        let Some(target) = action.param_str("target").filter(|t| !t.is_empty()) else {
            warn!(rule_id = %rule.id, "计算动作缺少 target 参数，已跳过");
            return false;
        };

        let formula = action.param_str("formula").unwrap_or("sum");
        let result = match formula {
            "line_items" => line_items_total(action, record),
            "sum" | "product" | "difference" | "ratio" => {
                operands(action, record).and_then(|values| fold_operands(formula, &values))
            }
            other => {
                warn!(rule_id = %rule.id, formula = %other, "未知的计算公式，已跳过");
                return false;
            }
        };

        let Some(mut value) = result else {
            warn!(
                rule_id = %rule.id,
                formula = %formula,
                "计算操作数缺失或不是数字，已跳过"
            );
            return false;
        };

        if let Some(decimals) = action.parameters.get("round").and_then(Value::as_u64) {
            let factor = 10f64.powi(decimals.min(15) as i32);
            value = (value * factor).round() / factor;
        }

        if !record::set_path(record, target, number_value(value)) {
            warn!(rule_id = %rule.id, target = %target, "无法写入计算结果，已跳过");
            return false;
        }
        record.insert("calculatedAt".to_string(), timestamp.clone());
        true
    }
}

/// 读取 `fields` 参数指向的数值
fn operands(action: &Action, record: &Record) -> Option<Vec<f64>> {
    let fields = action.parameters.get("fields")?.as_array()?;
    if fields.is_empty() {
        return None;
    }

    fields
        .iter()
        .map(|path| {
            let path = path.as_str()?;
            record::resolve(record, path)
                .as_value()
                .and_then(ConditionEvaluator::as_number)
        })
        .collect()
}

fn fold_operands(formula: &str, values: &[f64]) -> Option<f64> {
    let (&first, rest) = values.split_first()?;
    let result: f64 = match formula {
        "sum" => values.iter().sum(),
        "product" => values.iter().product(),
        "difference" => rest.iter().fold(first, |acc, v| acc - v),
        "ratio" => {
            if rest.contains(&0.0) {
                return None;
            }
            rest.iter().fold(first, |acc, v| acc / v)
        }
        _ => return None,
    };
    Some(result).filter(|v| v.is_finite())
}

/// 明细行合计：Σ quantity × unitPrice
fn line_items_total(action: &Action, record: &Record) -> Option<f64> {
    let items_field = action.param_str("items_field").unwrap_or("items");
    let quantity_field = action.param_str("quantity_field").unwrap_or("quantity");
    let price_field = action.param_str("price_field").unwrap_or("unitPrice");

    let items = record::resolve(record, items_field).as_value()?.as_array()?;

    items.iter().try_fold(0.0, |total, item| {
        let item = item.as_object()?;
        let quantity = item.get(quantity_field).and_then(ConditionEvaluator::as_number)?;
        let price = item.get(price_field).and_then(ConditionEvaluator::as_number)?;
        Some(total + quantity * price)
    })
}

/// 整数值以整数写回，其余为浮点
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// 记录标识：字符串或数字形式的 `id`
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
