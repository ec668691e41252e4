//! 输入结构校验
//!
//! 规则配置、规则局部更新和评估请求在进入引擎前统一在此校验。
//! 结构问题汇总为一个 `RuleError::Schema`，表达式语法问题返回 `RuleError::Parse`。

use crate::error::{FieldError, Result, RuleError};
use crate::expression::Expression;
use crate::models::{
    Action, ActionType, BatchOptions, Condition, EvaluationOptions, Rule, RulePatch, RuleSet,
};
use crate::operators::{LogicalOperator, Operator};
use crate::record::Record;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

const CONDITION_KEYS: &[&str] = &["field", "operator", "value", "logical_operator", "expression"];

/// 单条记录评估请求
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationRequest {
    pub procurement_data: Record,
    #[serde(default)]
    pub options: EvaluationOptions,
}

/// 批量评估请求
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub procurement_records: Vec<Record>,
    #[serde(default)]
    pub options: BatchOptions,
}

/// 解析并校验规则配置
pub fn parse_rule_set(payload: Value) -> Result<RuleSet> {
    let mut errors = Vec::new();
    if let Some(rules) = payload.get("rules").and_then(Value::as_array) {
        for (i, rule) in rules.iter().enumerate() {
            if let Some(conditions) = rule.get("conditions") {
                check_conditions(conditions, &format!("rules.{}.conditions", i), &mut errors);
            }
        }
    }
    if !errors.is_empty() {
        return Err(RuleError::schema_with_details("规则配置格式无效", errors));
    }

    let rule_set: RuleSet = serde_json::from_value(payload)
        .map_err(|e| RuleError::schema(format!("规则配置格式无效: {}", e)))?;

    validate_rule_set(&rule_set)?;
    Ok(rule_set)
}

/// 校验已反序列化的规则配置
///
/// 检查字段约束、规则 ID 唯一性、动作类型，最后解析所有表达式条件。
pub fn validate_rule_set(rule_set: &RuleSet) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = rule_set.validate() {
        collect_validation_errors("", &e, &mut errors);
    }

    let mut seen = HashSet::new();
    for (i, rule) in rule_set.rules.iter().enumerate() {
        if !seen.insert(rule.id.as_str()) {
            errors.push(FieldError::new(
                format!("rules.{}.id", i),
                format!("规则 ID 重复: {}", rule.id),
            ));
        }
        check_actions(&rule.actions, &format!("rules.{}.actions", i), &mut errors);
    }

    if !errors.is_empty() {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        return Err(RuleError::schema_with_details("规则配置校验失败", errors));
    }

    for rule in &rule_set.rules {
        check_expressions(&rule.id, &rule.conditions)?;
    }

    Ok(())
}

/// 校验单条规则，用于局部更新后的合并结果
pub fn validate_rule(rule: &Rule) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = rule.validate() {
        collect_validation_errors("", &e, &mut errors);
    }
    check_actions(&rule.actions, "actions", &mut errors);

    if !errors.is_empty() {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        return Err(RuleError::schema_with_details("规则校验失败", errors));
    }

    check_expressions(&rule.id, &rule.conditions)
}

/// 解析规则局部更新，至少需要一个字段
pub fn parse_rule_patch(payload: Value) -> Result<RulePatch> {
    match payload.as_object() {
        Some(map) if map.is_empty() => {
            return Err(RuleError::schema("至少需要提供一个更新字段"));
        }
        Some(_) => {}
        None => return Err(RuleError::schema("规则更新内容必须是 JSON 对象")),
    }

    let mut errors = Vec::new();
    if let Some(conditions) = payload.get("conditions") {
        check_conditions(conditions, "conditions", &mut errors);
    }
    if !errors.is_empty() {
        return Err(RuleError::schema_with_details("规则更新格式无效", errors));
    }

    let patch: RulePatch = serde_json::from_value(payload)
        .map_err(|e| RuleError::schema(format!("规则更新格式无效: {}", e)))?;

    if let Err(e) = patch.validate() {
        collect_validation_errors("", &e, &mut errors);
    }
    if let Some(actions) = &patch.actions {
        check_actions(actions, "actions", &mut errors);
    }
    if !errors.is_empty() {
        errors.sort_by(|a, b| a.field.cmp(&b.field));
        return Err(RuleError::schema_with_details("规则更新校验失败", errors));
    }
    if patch.is_empty() {
        return Err(RuleError::schema("至少需要提供一个更新字段"));
    }

    Ok(patch)
}

/// 解析单条评估请求
pub fn parse_evaluation_request(payload: Value) -> Result<EvaluationRequest> {
    serde_json::from_value(payload)
        .map_err(|e| RuleError::schema(format!("评估请求格式无效: {}", e)))
}

/// 解析批量评估请求
pub fn parse_batch_request(payload: Value) -> Result<BatchRequest> {
    serde_json::from_value(payload)
        .map_err(|e| RuleError::schema(format!("批量评估请求格式无效: {}", e)))
}

/// 在反序列化之前检查条件的原始结构，给出逐字段的错误信息
fn check_conditions(conditions: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let Some(items) = conditions.as_array() else {
        errors.push(FieldError::new(path, "条件列表必须是数组"));
        return;
    };

    for (j, item) in items.iter().enumerate() {
        let at = format!("{}.{}", path, j);
        let Some(condition) = item.as_object() else {
            errors.push(FieldError::new(at, "条件必须是对象"));
            continue;
        };

        for key in condition.keys() {
            if !CONDITION_KEYS.contains(&key.as_str()) {
                errors.push(FieldError::new(format!("{}.{}", at, key), "不允许的字段"));
            }
        }

        if let Some(logical) = condition.get("logical_operator") {
            if serde_json::from_value::<LogicalOperator>(logical.clone()).is_err() {
                errors.push(FieldError::new(
                    format!("{}.logical_operator", at),
                    "逻辑操作符必须是 AND 或 OR",
                ));
            }
        }

        if let Some(expression) = condition.get("expression") {
            if !expression.is_string() {
                errors.push(FieldError::new(format!("{}.expression", at), "表达式必须是字符串"));
            }
            for key in ["field", "operator", "value"] {
                if condition.contains_key(key) {
                    errors.push(FieldError::new(
                        format!("{}.{}", at, key),
                        "表达式条件不能同时包含字段比较",
                    ));
                }
            }
            continue;
        }

        if !condition.get("field").is_some_and(Value::is_string) {
            errors.push(FieldError::new(format!("{}.field", at), "field 为必填字符串"));
        }

        let operator = condition
            .get("operator")
            .and_then(|op| serde_json::from_value::<Operator>(op.clone()).ok());
        match operator {
            None => errors.push(FieldError::new(format!("{}.operator", at), "无效的操作符")),
            Some(Operator::Exists | Operator::NotExists) => {}
            Some(_) => {
                if !condition.get("value").is_some_and(|v| !v.is_null()) {
                    errors.push(FieldError::new(format!("{}.value", at), "value 为必填项"));
                }
            }
        }
    }
}

fn check_actions(actions: &[Action], path: &str, errors: &mut Vec<FieldError>) {
    for (j, action) in actions.iter().enumerate() {
        if action.action_type == ActionType::Unknown {
            errors.push(FieldError::new(
                format!("{}.{}.type", path, j),
                "动作类型必须是 approve、reject、flag、calculate、notify 或 modify",
            ));
        }
    }
}

fn check_expressions(rule_id: &str, conditions: &[Condition]) -> Result<()> {
    for source in conditions.iter().filter_map(Condition::expression_source) {
        if let Err(RuleError::Parse { position, message }) = Expression::parse(source) {
            return Err(RuleError::parse(
                position,
                format!("规则 {} 的表达式 '{}': {}", rule_id, source, message),
            ));
        }
    }
    Ok(())
}

/// 将 validator 的嵌套错误展开为 `a.b.0.c` 形式的字段路径
fn collect_validation_errors(prefix: &str, errors: &ValidationErrors, out: &mut Vec<FieldError>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.push(FieldError::new(path.clone(), message));
                }
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_errors(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_errors(&format!("{}.{}", path, index), inner, out);
                }
            }
        }
    }
}
