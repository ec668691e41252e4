//! 规则引擎
//!
//! 对一条记录按优先级依次评估启用的规则：逐条件评估、合并判定、
//! 通过时执行动作，最后汇总为 `EvaluationSummary`。

use crate::actions::ActionResolver;
use crate::combiner::LogicalCombiner;
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::{
    ConditionResult, EvaluationOptions, EvaluationResult, EvaluationSummary, OverallStatus,
};
use crate::record::Record;
use crate::store::{CompiledRule, RuleSetSnapshot};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

const RULE_PASSED: &str = "Rule passed successfully";
const RULE_FAILED: &str = "Rule validation failed";
const ALL_PASSED: &str = "All rules passed successfully. Procurement data is valid.";

/// 规则引擎
///
/// 持有一份规则快照，评估期间规则配置的变更不可见。
#[derive(Clone, Default)]
pub struct RuleEngine {
    snapshot: Option<Arc<RuleSetSnapshot>>,
    resolver: ActionResolver,
}

impl RuleEngine {
    pub fn new(resolver: ActionResolver) -> Self {
        Self {
            snapshot: None,
            resolver,
        }
    }

    /// 使用给定快照创建引擎
    pub fn with_snapshot(snapshot: Arc<RuleSetSnapshot>, resolver: ActionResolver) -> Self {
        Self {
            snapshot: Some(snapshot),
            resolver,
        }
    }

    /// 替换规则快照；评估时只使用其中启用的规则，顺序与快照一致
    pub fn set_rules(&mut self, snapshot: Arc<RuleSetSnapshot>) {
        self.snapshot = Some(snapshot);
    }

    /// 启用的规则
    pub fn active_rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.snapshot.iter().flat_map(|s| s.active_rules())
    }

    pub fn has_active_rules(&self) -> bool {
        self.active_rules().next().is_some()
    }

    pub fn evaluate(&self, record: Record, options: &EvaluationOptions) -> Result<EvaluationSummary> {
        self.evaluate_at(record, options, Utc::now())
    }

    /// 以给定时间评估一条记录
    pub fn evaluate_at(
        &self,
        mut record: Record,
        options: &EvaluationOptions,
        now: DateTime<Utc>,
    ) -> Result<EvaluationSummary> {
        if !self.has_active_rules() {
            return Err(RuleError::NoRulesConfigured);
        }

        let mut results = Vec::new();
        for compiled in self.active_rules() {
            let result = self.evaluate_rule(compiled, &mut record, options, now);
            let passed = result.passed;
            results.push(result);

            if !passed && options.stop_on_first_failure {
                debug!(rule_id = %compiled.id(), "规则未通过，停止后续评估");
                break;
            }
        }

        let passed_rules = results.iter().filter(|r| r.passed).count();
        let failed_rules = results.len() - passed_rules;
        let recommendations = recommendations(&results);

        Ok(EvaluationSummary {
            total_rules: results.len(),
            passed_rules,
            failed_rules,
            overall_status: OverallStatus::from_passed(failed_rules == 0),
            results,
            recommendations,
            evaluation_timestamp: now,
            processed_data: record,
        })
    }

    fn evaluate_rule(
        &self,
        compiled: &CompiledRule,
        record: &mut Record,
        options: &EvaluationOptions,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let rule = compiled.rule();

        let condition_results: Vec<ConditionResult> = rule
            .conditions
            .iter()
            .enumerate()
            .map(|(i, condition)| {
                ConditionEvaluator::evaluate_condition(
                    record,
                    condition,
                    compiled.expression(i),
                    options.strict_mode,
                    now,
                )
            })
            .collect();

        let verdicts: Vec<bool> = condition_results.iter().map(|c| c.passed).collect();
        let passed = LogicalCombiner::combine(&rule.conditions, &verdicts);

        if passed {
            self.resolver.apply(rule, record, now);
        }
        debug!(rule_id = %rule.id, passed, "规则评估完成");

        EvaluationResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type,
            priority: rule.priority,
            passed,
            condition_results: options.include_rule_details.then_some(condition_results),
            actions: if passed { rule.actions.clone() } else { Vec::new() },
            message: (if passed { RULE_PASSED } else { RULE_FAILED }).to_string(),
            timestamp: now,
        }
    }
}

/// 为未通过的规则生成修复建议
fn recommendations(results: &[EvaluationResult]) -> Vec<String> {
    let mut lines = Vec::new();

    for result in results.iter().filter(|r| !r.passed) {
        lines.push(format!(
            "Fix rule violation: {} ({})",
            result.rule_name, result.rule_id
        ));

        let failed = result
            .condition_results
            .iter()
            .flatten()
            .filter(|c| !c.passed);
        for condition in failed {
            lines.push(format!(
                "  - Field '{}' should {} '{}' but got '{}'",
                condition.field,
                condition.operator,
                ConditionEvaluator::to_text(Some(&condition.expected_value)),
                ConditionEvaluator::to_text(condition.actual_value.as_ref()),
            ));
        }
    }

    if lines.is_empty() {
        lines.push(ALL_PASSED.to_string());
    }
    lines
}
