//! 规则引擎领域模型

use crate::operators::{LogicalOperator, Operator};
use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use validator::Validate;

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Validation,
    Approval,
    Calculation,
    Notification,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Approval => "approval",
            Self::Calculation => "calculation",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 动作类型
///
/// 无法识别的类型反序列化为 `Unknown`：配置校验会拒绝它，执行时跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Approve,
    Reject,
    Flag,
    Calculate,
    Notify,
    Modify,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Flag => "flag",
            Self::Calculate => "calculate",
            Self::Notify => "notify",
            Self::Modify => "modify",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

fn default_priority() -> i32 {
    5
}

fn default_active() -> bool {
    true
}

/// 规则集（一次完整的规则配置）
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[validate(length(min = 1, message = "版本号不能为空"))]
    pub version: String,
    #[validate(nested)]
    pub metadata: RuleSetMetadata,
    #[validate(nested)]
    pub rules: Vec<Rule>,
}

/// 规则集元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RuleSetMetadata {
    #[validate(length(min = 1, message = "规则集名称不能为空"))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
}

/// 规则定义
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[validate(length(min = 1, message = "规则 ID 不能为空"))]
    pub id: String,
    #[validate(length(min = 1, message = "规则名称不能为空"))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// 1–10，数值越小越先评估
    #[serde(default = "default_priority")]
    #[validate(range(min = 1, max = 10, message = "优先级必须在1-10之间"))]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[validate(length(min = 1, message = "至少需要一个条件"))]
    pub conditions: Vec<Condition>,
    #[validate(length(min = 1, message = "至少需要一个动作"))]
    pub actions: Vec<Action>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: RuleType,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            rule_type,
            priority: default_priority(),
            active: true,
            conditions,
            actions,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// 规则局部更新
///
/// 仅覆盖出现的字段，至少需要一个字段。
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RulePatch {
    #[validate(length(min = 1, message = "规则名称不能为空"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub rule_type: Option<RuleType>,
    #[validate(range(min = 1, max = 10, message = "优先级必须在1-10之间"))]
    pub priority: Option<i32>,
    pub active: Option<bool>,
    #[validate(length(min = 1, message = "至少需要一个条件"))]
    pub conditions: Option<Vec<Condition>>,
    #[validate(length(min = 1, message = "至少需要一个动作"))]
    pub actions: Option<Vec<Action>>,
}

impl RulePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.rule_type.is_none()
            && self.priority.is_none()
            && self.active.is_none()
            && self.conditions.is_none()
            && self.actions.is_none()
    }

    /// 合并到已有规则上，并刷新 updated_at
    pub fn apply_to(self, rule: &mut Rule) {
        if let Some(name) = self.name {
            rule.name = name;
        }
        if let Some(description) = self.description {
            rule.description = Some(description);
        }
        if let Some(rule_type) = self.rule_type {
            rule.rule_type = rule_type;
        }
        if let Some(priority) = self.priority {
            rule.priority = priority;
        }
        if let Some(active) = self.active {
            rule.active = active;
        }
        if let Some(conditions) = self.conditions {
            rule.conditions = conditions;
        }
        if let Some(actions) = self.actions {
            rule.actions = actions;
        }
        rule.updated_at = Utc::now();
    }
}

/// 条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub test: ConditionTest,
    /// 与下一个条件的连接方式
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

/// 条件的判定方式：字段比较或表达式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionTest {
    Expression {
        expression: String,
    },
    Field {
        field: String,
        operator: Operator,
        #[serde(default)]
        value: Value,
    },
}

impl Condition {
    /// 字段比较条件
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            test: ConditionTest::Field {
                field: field.into(),
                operator,
                value: value.into(),
            },
            logical_operator: LogicalOperator::And,
        }
    }

    /// 表达式条件
    pub fn expression(source: impl Into<String>) -> Self {
        Self {
            test: ConditionTest::Expression {
                expression: source.into(),
            },
            logical_operator: LogicalOperator::And,
        }
    }

    pub fn with_logical(mut self, logical_operator: LogicalOperator) -> Self {
        self.logical_operator = logical_operator;
        self
    }

    pub fn or(self) -> Self {
        self.with_logical(LogicalOperator::Or)
    }

    pub fn expression_source(&self) -> Option<&str> {
        match &self.test {
            ConditionTest::Expression { expression } => Some(expression),
            ConditionTest::Field { .. } => None,
        }
    }
}

/// 动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            parameters: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 读取字符串参数
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// 评估选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationOptions {
    /// 数值比较遇到非数字操作数时在条件结果上附带错误说明（判定结果不变）
    pub strict_mode: bool,
    /// 遇到第一条未通过的规则即停止
    pub stop_on_first_failure: bool,
    /// 结果中是否保留逐条件明细
    pub include_rule_details: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            stop_on_first_failure: false,
            include_rule_details: true,
        }
    }
}

/// 批量评估选项，默认不保留逐条件明细
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchOptions {
    pub strict_mode: bool,
    pub stop_on_first_failure: bool,
    pub include_rule_details: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            stop_on_first_failure: false,
            include_rule_details: false,
        }
    }
}

impl From<BatchOptions> for EvaluationOptions {
    fn from(options: BatchOptions) -> Self {
        Self {
            strict_mode: options.strict_mode,
            stop_on_first_failure: options.stop_on_first_failure,
            include_rule_details: options.include_rule_details,
        }
    }
}

/// 总体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Passed,
    Failed,
}

impl OverallStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed { Self::Passed } else { Self::Failed }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个条件的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResult {
    pub field: String,
    pub operator: String,
    pub expected_value: Value,
    /// 字段不存在时省略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<Value>,
    pub passed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 单条规则的评估结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub rule_id: String,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub priority: i32,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_results: Option<Vec<ConditionResult>>,
    /// 仅在规则通过时填充
    pub actions: Vec<Action>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 单条记录的评估汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSummary {
    pub total_rules: usize,
    pub passed_rules: usize,
    pub failed_rules: usize,
    pub overall_status: OverallStatus,
    pub results: Vec<EvaluationResult>,
    pub recommendations: Vec<String>,
    pub evaluation_timestamp: DateTime<Utc>,
    /// 执行完所有动作后的记录
    pub processed_data: Record,
}

/// 批量评估汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total_records: usize,
    pub passed_records: usize,
    pub failed_records: usize,
    pub overall_status: OverallStatus,
    pub processing_timestamp: DateTime<Utc>,
}

/// 批量评估中单条记录的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecordResult {
    pub record_index: usize,
    pub record_id: String,
    #[serde(flatten)]
    pub summary: EvaluationSummary,
}

/// 批量评估输出
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch_summary: BatchSummary,
    pub results: Vec<BatchRecordResult>,
}
