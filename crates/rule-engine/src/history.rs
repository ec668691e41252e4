//! 校验历史
//!
//! 只追加的有界日志，超出容量时按 FIFO 淘汰最早的记录。

use crate::models::OverallStatus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use procurement_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

/// 默认保留条数
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// 校验类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationKind {
    Single,
    Batch,
}

/// 历史记录
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ValidationKind,
    pub overall_status: OverallStatus,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

/// 分页查询结果
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub data: Vec<HistoryRecord>,
    pub pagination: Pagination,
}

/// 校验统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub total_validations: usize,
    pub passed_validations: usize,
    pub failed_validations: usize,
    /// 百分比，保留两位小数
    pub success_rate: f64,
    pub last_validation: Option<DateTime<Utc>>,
}

/// 校验历史
pub struct ValidationHistory {
    records: Mutex<VecDeque<HistoryRecord>>,
    capacity: usize,
}

impl Default for ValidationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ValidationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// 追加一条记录，返回生成的记录
    pub fn append(&self, kind: ValidationKind, status: OverallStatus, payload: Value) -> HistoryRecord {
        let mut records = self.records.lock();

        let record = HistoryRecord {
            id: format!("VAL_{}", Uuid::now_v7().simple()),
            kind,
            overall_status: status,
            payload,
            created_at: Utc::now(),
        };
        records.push_back(record.clone());

        let mut evicted = 0u64;
        while records.len() > self.capacity {
            records.pop_front();
            evicted += 1;
        }
        drop(records);

        if evicted > 0 {
            debug!(evicted, "校验历史超出容量，已淘汰最早的记录");
            metrics::record_history_evictions(evicted);
        }

        record
    }

    /// 分页查询，按创建时间倒序
    ///
    /// page 从 1 开始；status 按大小写不敏感匹配。
    pub fn query(&self, page: usize, limit: usize, status: Option<&str>) -> HistoryPage {
        let page = page.max(1);
        let records = self.records.lock();

        let filtered: Vec<&HistoryRecord> = records
            .iter()
            .rev()
            .filter(|r| status.is_none_or(|s| r.overall_status.as_str().eq_ignore_ascii_case(s)))
            .collect();

        let total = filtered.len();
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        let data = filtered
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .cloned()
            .collect();

        HistoryPage {
            data,
            pagination: Pagination {
                page,
                limit,
                total,
                pages,
            },
        }
    }

    pub fn stats(&self) -> ValidationStats {
        let records = self.records.lock();

        let total = records.len();
        let passed = records
            .iter()
            .filter(|r| r.overall_status.is_passed())
            .count();
        let success_rate = if total == 0 {
            0.0
        } else {
            (passed as f64 / total as f64 * 10_000.0).round() / 100.0
        };

        ValidationStats {
            total_validations: total,
            passed_validations: passed,
            failed_validations: total - passed,
            success_rate,
            last_validation: records.back().map(|r| r.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn append_n(history: &ValidationHistory, n: usize) {
        for i in 0..n {
            history.append(ValidationKind::Single, OverallStatus::Passed, json!({"seq": i}));
        }
    }

    #[test]
    fn test_fifo_eviction() {
        let history = ValidationHistory::default();
        append_n(&history, 1000);
        assert_eq!(history.len(), 1000);

        history.append(ValidationKind::Single, OverallStatus::Failed, json!({"seq": 1000}));
        assert_eq!(history.len(), 1000);

        let page = history.query(1, 1000, None);
        let seqs: Vec<i64> = page
            .data
            .iter()
            .map(|r| r.payload["seq"].as_i64().unwrap())
            .collect();
        // 只有第一条被淘汰
        assert_eq!(seqs.first(), Some(&1000));
        assert_eq!(seqs.last(), Some(&1));
    }

    #[test]
    fn test_query_orders_newest_first_and_paginates() {
        let history = ValidationHistory::new(10);
        append_n(&history, 5);

        let page = history.query(1, 2, None);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.pages, 3);
        let seqs: Vec<i64> = page.data.iter().map(|r| r.payload["seq"].as_i64().unwrap()).collect();
        assert_eq!(seqs, vec![4, 3]);

        let last = history.query(3, 2, None);
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.data[0].payload["seq"], json!(0));

        assert!(history.query(4, 2, None).data.is_empty());
        assert_eq!(history.query(1, 0, None).pagination.pages, 0);
    }

    #[test]
    fn test_status_filter_is_case_insensitive() {
        let history = ValidationHistory::new(10);
        history.append(ValidationKind::Single, OverallStatus::Passed, json!({}));
        history.append(ValidationKind::Batch, OverallStatus::Failed, json!({}));
        history.append(ValidationKind::Single, OverallStatus::Failed, json!({}));

        let failed = history.query(1, 10, Some("failed"));
        assert_eq!(failed.pagination.total, 2);
        assert_eq!(failed.data[1].kind, ValidationKind::Batch);
        assert_eq!(history.query(1, 10, Some("PASSED")).pagination.total, 1);
        assert_eq!(history.query(1, 10, Some("unknown")).pagination.total, 0);
    }

    #[test]
    fn test_stats() {
        let history = ValidationHistory::new(10);
        let empty = history.stats();
        assert_eq!(empty.total_validations, 0);
        assert_eq!(empty.success_rate, 0.0);
        assert!(empty.last_validation.is_none());

        history.append(ValidationKind::Single, OverallStatus::Passed, json!({}));
        history.append(ValidationKind::Single, OverallStatus::Failed, json!({}));
        let last = history.append(ValidationKind::Batch, OverallStatus::Failed, json!({}));

        let stats = history.stats();
        assert_eq!(stats.total_validations, 3);
        assert_eq!(stats.passed_validations, 1);
        assert_eq!(stats.failed_validations, 2);
        assert_eq!(stats.success_rate, 33.33);
        assert_eq!(stats.last_validation, Some(last.created_at));
    }

    #[test]
    fn test_record_serialization() {
        let history = ValidationHistory::new(10);
        let record = history.append(ValidationKind::Batch, OverallStatus::Passed, json!({"a": 1}));
        assert!(record.id.starts_with("VAL_"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], json!("batch"));
        assert_eq!(value["overallStatus"], json!("PASSED"));
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_concurrent_appends() {
        let history = Arc::new(ValidationHistory::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let history = Arc::clone(&history);
                thread::spawn(move || append_n(&history, 20))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(history.len(), 50);
        let ids: HashSet<String> = history
            .query(1, 50, None)
            .data
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 50);
    }
}
