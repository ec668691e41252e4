//! 批量评估
//!
//! 每条记录独立评估，可以并行执行；输出顺序与输入一致。

use crate::actions;
use crate::engine::RuleEngine;
use crate::error::{Result, RuleError};
use crate::models::{
    BatchOptions, BatchOutcome, BatchRecordResult, BatchSummary, EvaluationOptions, OverallStatus,
};
use crate::record::Record;
use chrono::Utc;
use rayon::prelude::*;
use tracing::debug;

pub struct BatchRunner<'a> {
    engine: &'a RuleEngine,
    parallel: bool,
}

impl<'a> BatchRunner<'a> {
    pub fn new(engine: &'a RuleEngine) -> Self {
        Self {
            engine,
            parallel: true,
        }
    }

    /// 是否使用 rayon 并行评估
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 逐条评估记录
    ///
    /// stop_on_first_failure 只作用于单条记录内部，所有记录都会被评估。
    pub fn evaluate_batch(&self, records: Vec<Record>, options: &BatchOptions) -> Result<BatchOutcome> {
        if !self.engine.has_active_rules() {
            return Err(RuleError::NoRulesConfigured);
        }

        let options = EvaluationOptions::from(*options);
        let evaluate = |(index, record): (usize, Record)| -> Result<BatchRecordResult> {
            let record_id =
                actions::record_id(&record).unwrap_or_else(|| format!("record_{}", index));
            let summary = self.engine.evaluate(record, &options)?;
            Ok(BatchRecordResult {
                record_index: index,
                record_id,
                summary,
            })
        };

        let results = if self.parallel {
            records
                .into_par_iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<Vec<_>>>()?
        } else {
            records
                .into_iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<Vec<_>>>()?
        };

        let total_records = results.len();
        let passed_records = results
            .iter()
            .filter(|r| r.summary.overall_status.is_passed())
            .count();
        debug!(total_records, passed_records, "批量评估完成");

        Ok(BatchOutcome {
            batch_summary: BatchSummary {
                total_records,
                passed_records,
                failed_records: total_records - passed_records,
                overall_status: OverallStatus::from_passed(passed_records == total_records),
                processing_timestamp: Utc::now(),
            },
            results,
        })
    }
}
