//! 采购申请审批规则
//!
//! 旧格式的审批规则是 `{condition, action, ...}` 列表，条件为表达式字符串。
//! 加载时转换为普通规则集，条件按表达式解析，不执行任何代码。

use crate::engine::RuleEngine;
use crate::error::{FieldError, Result, RuleError};
use crate::models::{
    Action, ActionType, Condition, EvaluationOptions, Rule, RuleSet, RuleSetMetadata, RuleType,
};
use crate::record::Record;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;

/// 审批规则集
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalRuleSet {
    pub approval_rules: Vec<ApprovalRule>,
}

/// 单条审批规则
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApprovalRule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub condition: String,
    pub action: String,
    #[serde(default)]
    pub set_status: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub approval_level: Option<Value>,
}

impl ApprovalRule {
    fn to_action(&self) -> Option<Action> {
        let action = match self.action.as_str() {
            "autoApprove" => {
                let action = Action::new(ActionType::Approve);
                match &self.set_status {
                    Some(status) => action.with_param("setStatus", status.as_str()),
                    None => action,
                }
            }
            "setUrgency" => {
                let action = Action::new(ActionType::Flag);
                match &self.urgency {
                    Some(urgency) => action.with_param("urgency", urgency.as_str()),
                    None => action,
                }
            }
            "requireApproval" => {
                let action = Action::new(ActionType::Modify);
                match &self.approval_level {
                    Some(level) => action.with_param("approvalLevel", level.clone()),
                    None => action,
                }
            }
            _ => return None,
        };
        Some(action)
    }
}

impl ApprovalRuleSet {
    pub fn from_value(payload: Value) -> Result<Self> {
        serde_json::from_value(payload)
            .map_err(|e| RuleError::schema(format!("审批规则格式无效: {}", e)))
    }

    /// 转换为规则集，保持声明顺序
    pub fn into_rule_set(self) -> Result<RuleSet> {
        let mut errors = Vec::new();
        let mut rules = Vec::with_capacity(self.approval_rules.len());

        for (i, entry) in self.approval_rules.iter().enumerate() {
            let Some(action) = entry.to_action() else {
                errors.push(FieldError::new(
                    format!("approvalRules.{}.action", i),
                    format!(
                        "未知的审批动作: {}（支持 autoApprove、setUrgency、requireApproval）",
                        entry.action
                    ),
                ));
                continue;
            };

            let id = entry
                .id
                .clone()
                .unwrap_or_else(|| format!("approval_{}", i + 1));
            let name = entry.name.clone().unwrap_or_else(|| entry.condition.clone());

            rules.push(Rule::new(
                id,
                name,
                RuleType::Approval,
                vec![Condition::expression(entry.condition.as_str())],
                vec![action],
            ));
        }

        if !errors.is_empty() {
            return Err(RuleError::schema_with_details("审批规则校验失败", errors));
        }

        Ok(RuleSet {
            version: "legacy".to_string(),
            metadata: RuleSetMetadata {
                name: "Purchase request approval rules".to_string(),
                ..Default::default()
            },
            rules,
        })
    }
}

/// 对采购申请执行审批规则
///
/// 所有规则都会评估，通过的规则依次执行动作；最后记录处理时间和通过的规则数。
pub fn process_purchase_request(engine: &RuleEngine, record: Record) -> Result<Record> {
    process_purchase_request_at(engine, record, Utc::now())
}

pub fn process_purchase_request_at(
    engine: &RuleEngine,
    record: Record,
    now: DateTime<Utc>,
) -> Result<Record> {
    let (mut processed, applied) = if engine.has_active_rules() {
        let options = EvaluationOptions {
            strict_mode: false,
            stop_on_first_failure: false,
            include_rule_details: false,
        };
        let summary = engine.evaluate_at(record, &options, now)?;
        (summary.processed_data, summary.passed_rules)
    } else {
        (record, 0)
    };

    processed.insert(
        "processedAt".to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    processed.insert("rulesApplied".to_string(), Value::from(applied));
    Ok(processed)
}
