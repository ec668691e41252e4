//! 规则引擎服务
//!
//! 对外提供规则管理、记录校验、历史查询和审批规则处理，
//! 每次校验使用同一份规则快照，并记录历史和指标。

use crate::actions::ActionResolver;
use crate::batch::BatchRunner;
use crate::engine::RuleEngine;
use crate::error::{Result, RuleError};
use crate::history::{HistoryPage, ValidationHistory, ValidationKind, ValidationStats};
use crate::legacy::{self, ApprovalRuleSet};
use crate::models::{
    BatchOptions, BatchOutcome, EvaluationOptions, EvaluationSummary, Rule, RuleSetMetadata,
    RuleType,
};
use crate::record::Record;
use crate::schema;
use crate::store::{RuleSetSnapshot, RuleStats, RuleStore};
use chrono::{DateTime, Utc};
use procurement_shared::config::EngineConfig;
use procurement_shared::observability::metrics;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// 规则配置摘要
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetSummary {
    pub version: String,
    pub rules_count: usize,
    pub active_rules: usize,
    pub rule_types: Vec<RuleType>,
}

impl RuleSetSummary {
    fn from_snapshot(snapshot: &RuleSetSnapshot) -> Self {
        Self {
            version: snapshot.version.clone(),
            rules_count: snapshot.rules.len(),
            active_rules: snapshot.active_count(),
            rule_types: snapshot.rule_types(),
        }
    }
}

/// 加载规则的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRulesResponse {
    pub rules_count: usize,
    pub summary: RuleSetSummary,
}

/// 当前规则配置
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesOverview {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub metadata: RuleSetMetadata,
    pub rules_count: usize,
    pub active_rules: usize,
    pub rule_types: Vec<RuleType>,
    pub rules: Vec<Rule>,
}

/// 规则引擎服务
pub struct RuleEngineService {
    store: RuleStore,
    approval_store: RuleStore,
    history: ValidationHistory,
    resolver: ActionResolver,
    parallel_batch: bool,
}

impl Default for RuleEngineService {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl RuleEngineService {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_resolver(config, ActionResolver::default())
    }

    pub fn with_resolver(config: &EngineConfig, resolver: ActionResolver) -> Self {
        Self {
            store: RuleStore::new(),
            approval_store: RuleStore::new(),
            history: ValidationHistory::new(config.history_capacity),
            resolver,
            parallel_batch: config.parallel_batch,
        }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn history(&self) -> &ValidationHistory {
        &self.history
    }

    /// 以当前规则快照构建引擎
    fn engine(&self, store: &RuleStore) -> RuleEngine {
        match store.snapshot() {
            Some(snapshot) => RuleEngine::with_snapshot(snapshot, self.resolver.clone()),
            None => RuleEngine::new(self.resolver.clone()),
        }
    }

    /// 加载规则配置，整体替换当前规则
    #[instrument(skip(self, payload))]
    pub fn load_rules(&self, payload: Value) -> Result<LoadRulesResponse> {
        let result = schema::parse_rule_set(payload).and_then(|rs| self.store.save_rule_set(rs));

        match result {
            Ok(snapshot) => {
                metrics::record_rule_set_load("success");
                let summary = RuleSetSummary::from_snapshot(&snapshot);
                info!(
                    version = %summary.version,
                    rules = summary.rules_count,
                    active = summary.active_rules,
                    "规则配置加载成功"
                );
                Ok(LoadRulesResponse {
                    rules_count: summary.rules_count,
                    summary,
                })
            }
            Err(e) => {
                metrics::record_rule_set_load("failure");
                warn!(error = %e, "规则配置加载失败");
                Err(e)
            }
        }
    }

    /// 获取当前规则配置；尚未加载时返回 NotFound
    pub fn get_rules(&self) -> Result<RulesOverview> {
        let snapshot = self
            .store
            .snapshot()
            .ok_or_else(|| RuleError::RuleNotFound("尚未加载规则配置".to_string()))?;

        Ok(RulesOverview {
            version: snapshot.version.clone(),
            last_updated: snapshot.last_updated,
            metadata: snapshot.metadata.clone(),
            rules_count: snapshot.rules.len(),
            active_rules: snapshot.active_count(),
            rule_types: snapshot.rule_types(),
            rules: snapshot.rules.iter().map(|r| r.rule().clone()).collect(),
        })
    }

    pub fn get_rule(&self, rule_id: &str) -> Result<Rule> {
        self.store.get_by_id(rule_id)
    }

    pub fn update_rule(&self, rule_id: &str, payload: Value) -> Result<Rule> {
        let patch = schema::parse_rule_patch(payload)?;
        self.store.update(rule_id, patch)
    }

    pub fn delete_rule(&self, rule_id: &str) -> Result<Rule> {
        self.store.delete(rule_id)
    }

    /// 校验单条记录并写入历史
    #[instrument(skip(self, record, options))]
    pub fn validate(&self, record: Record, options: EvaluationOptions) -> Result<EvaluationSummary> {
        let start = Instant::now();
        let summary = self.engine(&self.store).evaluate(record, &options)?;

        let status = summary.overall_status;
        metrics::record_rule_evaluation(
            "single",
            status.is_passed(),
            start.elapsed().as_secs_f64(),
        );
        self.history
            .append(ValidationKind::Single, status, serde_json::to_value(&summary)?);

        info!(
            status = %status,
            passed = summary.passed_rules,
            failed = summary.failed_rules,
            "校验完成"
        );
        Ok(summary)
    }

    /// 批量校验并写入历史
    #[instrument(skip(self, records, options), fields(records = records.len()))]
    pub fn validate_batch(&self, records: Vec<Record>, options: BatchOptions) -> Result<BatchOutcome> {
        let start = Instant::now();
        let engine = self.engine(&self.store);
        let outcome = BatchRunner::new(&engine)
            .parallel(self.parallel_batch)
            .evaluate_batch(records, &options)?;

        let summary = &outcome.batch_summary;
        let passed = summary.overall_status.is_passed();
        metrics::record_rule_evaluation("batch", passed, start.elapsed().as_secs_f64());
        metrics::record_batch_validation(summary.total_records, passed);

        info!(
            status = %summary.overall_status,
            total = summary.total_records,
            passed = summary.passed_records,
            "批量校验完成"
        );

        self.history.append(
            ValidationKind::Batch,
            summary.overall_status,
            serde_json::to_value(&outcome)?,
        );
        Ok(outcome)
    }

    pub fn validation_history(&self, page: usize, limit: usize, status: Option<&str>) -> HistoryPage {
        self.history.query(page, limit, status)
    }

    pub fn rules_stats(&self) -> RuleStats {
        self.store.stats()
    }

    pub fn validation_stats(&self) -> ValidationStats {
        self.history.stats()
    }

    /// 加载采购申请审批规则
    #[instrument(skip(self, payload))]
    pub fn load_approval_rules(&self, payload: Value) -> Result<LoadRulesResponse> {
        let rule_set = ApprovalRuleSet::from_value(payload)?.into_rule_set()?;
        let snapshot = self.approval_store.save_rule_set(rule_set)?;

        let summary = RuleSetSummary::from_snapshot(&snapshot);
        info!(rules = summary.rules_count, "审批规则加载成功");
        Ok(LoadRulesResponse {
            rules_count: summary.rules_count,
            summary,
        })
    }

    /// 对采购申请执行审批规则
    pub fn process_purchase_request(&self, record: Record) -> Result<Record> {
        legacy::process_purchase_request(&self.engine(&self.approval_store), record)
    }
}
