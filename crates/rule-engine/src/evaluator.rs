//! 条件评估器
//!
//! 实现各操作符的判定语义。评估从不向调用方返回错误：
//! 内部失败体现在 `ConditionResult.error` 上，判定结果为不通过。

use crate::error::RuleError;
use crate::expression::Expression;
use crate::models::{Condition, ConditionResult, ConditionTest};
use crate::operators::Operator;
use crate::record::{self, FieldValue, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

const SATISFIED: &str = "Condition satisfied";
const NOT_SATISFIED: &str = "Condition not satisfied";

/// 表达式条件在结果中的操作符名
pub const EXPRESSION_OPERATOR: &str = "expression";

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估操作符
    ///
    /// # Arguments
    /// * `field` - 从记录中解析出的字段
    /// * `operator` - 操作符
    /// * `expected` - 规则中定义的期望值
    pub fn evaluate(field: FieldValue<'_>, operator: Operator, expected: &Value) -> bool {
        let actual = field.as_value();

        match operator {
            Operator::Equals => actual.is_some_and(|v| Self::strict_equals(v, expected)),
            Operator::NotEquals => !actual.is_some_and(|v| Self::strict_equals(v, expected)),
            Operator::GreaterThan => Self::compare(actual, expected, |a, b| a > b),
            Operator::LessThan => Self::compare(actual, expected, |a, b| a < b),
            Operator::GreaterEqual => Self::compare(actual, expected, |a, b| a >= b),
            Operator::LessEqual => Self::compare(actual, expected, |a, b| a <= b),
            Operator::Contains => Self::contains(actual, expected),
            Operator::NotContains => !Self::contains(actual, expected),
            // 期望值不是数组时 in / not_in 均不成立
            Operator::In => expected
                .as_array()
                .is_some_and(|items| Self::is_member(actual, items)),
            Operator::NotIn => expected
                .as_array()
                .is_some_and(|items| !Self::is_member(actual, items)),
            Operator::Exists => field.exists(),
            Operator::NotExists => !field.exists(),
        }
    }

    /// 评估一个条件并生成诊断结果
    ///
    /// `compiled` 为预解析的表达式；表达式条件缺少预解析结果时现场解析。
    pub fn evaluate_condition(
        record: &Record,
        condition: &Condition,
        compiled: Option<&Expression>,
        strict_mode: bool,
        now: DateTime<Utc>,
    ) -> ConditionResult {
        match &condition.test {
            ConditionTest::Field {
                field,
                operator,
                value,
            } => Self::evaluate_field(record, field, *operator, value, strict_mode),
            ConditionTest::Expression { expression } => {
                let parsed;
                let compiled = match compiled {
                    Some(expr) => expr,
                    None => match Expression::parse(expression) {
                        Ok(expr) => {
                            parsed = expr;
                            &parsed
                        }
                        Err(e) => {
                            return Self::failure(
                                expression,
                                EXPRESSION_OPERATOR,
                                Value::Bool(true),
                                e.to_string(),
                            );
                        }
                    },
                };

                let passed = compiled.evaluate_at(record, now);
                ConditionResult {
                    field: expression.clone(),
                    operator: EXPRESSION_OPERATOR.to_string(),
                    expected_value: Value::Bool(true),
                    actual_value: Some(Value::Bool(passed)),
                    passed,
                    message: Self::message(passed),
                    error: None,
                }
            }
        }
    }

    fn evaluate_field(
        record: &Record,
        field: &str,
        operator: Operator,
        expected: &Value,
        strict_mode: bool,
    ) -> ConditionResult {
        if field.is_empty() {
            return Self::failure(field, operator.as_str(), expected.clone(), "字段路径为空");
        }

        let resolved = record::resolve(record, field);
        let passed = Self::evaluate(resolved, operator, expected);

        let error = if strict_mode && operator.is_numeric() {
            Self::non_numeric_operand(field, resolved, expected)
                .map(|message| RuleError::Evaluation(message).to_string())
        } else {
            None
        };

        ConditionResult {
            field: field.to_string(),
            operator: operator.as_str().to_string(),
            expected_value: expected.clone(),
            actual_value: resolved.to_value(),
            passed,
            message: Self::message(passed),
            error,
        }
    }

    fn failure(
        field: &str,
        operator: &str,
        expected: Value,
        error: impl Into<String>,
    ) -> ConditionResult {
        ConditionResult {
            field: field.to_string(),
            operator: operator.to_string(),
            expected_value: expected,
            actual_value: None,
            passed: false,
            message: Self::message(false),
            error: Some(RuleError::Evaluation(error.into()).to_string()),
        }
    }

    fn message(passed: bool) -> String {
        let message = if passed { SATISFIED } else { NOT_SATISFIED };
        message.to_string()
    }

    /// 严格模式下说明哪个操作数无法转为数字
    fn non_numeric_operand(field: &str, actual: FieldValue<'_>, expected: &Value) -> Option<String> {
        match actual.as_value() {
            None => return Some(format!("字段 '{}' 不存在，无法进行数值比较", field)),
            Some(v) if Self::as_number(v).is_none() => {
                return Some(format!(
                    "字段 '{}' 的值不是数字（{}）",
                    field,
                    Self::type_name(v)
                ));
            }
            _ => {}
        }

        if Self::as_number(expected).is_none() {
            return Some(format!(
                "期望值不是数字（{}）",
                Self::type_name(expected)
            ));
        }

        None
    }

    /// 数值比较，任一操作数无法转换时为 false
    fn compare<F>(actual: Option<&Value>, expected: &Value, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (actual.and_then(Self::as_number), Self::as_number(expected)) {
            (Some(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 文本包含；字段不存在时不包含任何内容
    fn contains(actual: Option<&Value>, expected: &Value) -> bool {
        actual.is_some_and(|v| Self::to_text(Some(v)).contains(&Self::to_text(Some(expected))))
    }

    fn is_member(actual: Option<&Value>, items: &[Value]) -> bool {
        actual.is_some_and(|v| items.iter().any(|item| Self::strict_equals(v, item)))
    }

    /// 严格相等：类型必须相同，数字按数值比较，容器逐项比较
    pub fn strict_equals(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
            (Value::Array(x), Value::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| Self::strict_equals(l, r))
            }
            (Value::Object(x), Value::Object(y)) => {
                x.len() == y.len()
                    && x
                        .iter()
                        .all(|(k, v)| y.get(k).is_some_and(|w| Self::strict_equals(v, w)))
            }
            _ => a == b,
        }
    }

    /// 转为数字：数字和数字字符串可转换，其余返回 None
    pub fn as_number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
            }
            _ => None,
        }
    }

    /// 转为文本；字段不存在时为 "undefined"
    pub fn to_text(value: Option<&Value>) -> String {
        let Some(value) = value else {
            return "undefined".to_string();
        };

        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => {
                    format!("{:.0}", f)
                }
                _ => n.to_string(),
            },
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => String::new(),
                    other => Self::to_text(Some(other)),
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => value.to_string(),
        }
    }

    /// 解析 RFC 3339、不带时区的 `YYYY-MM-DDTHH:MM:SS` 或 `YYYY-MM-DD` 日期
    ///
    /// 不带时区的时间按 UTC 处理，纯日期取 UTC 零点。
    pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(dt.and_utc());
        }

        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// 获取值的类型名称
    pub fn type_name(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}
