//! 规则存储管理
//!
//! 规则配置以不可变快照的形式发布：读取方通过 `ArcSwap` 无锁获取当前快照，
//! 写入方在互斥锁内复制、修改后整体替换，评估过程中不会看到半完成的修改。

use crate::error::{Result, RuleError};
use crate::expression::Expression;
use crate::models::{Rule, RulePatch, RuleSet, RuleSetMetadata, RuleType};
use crate::schema;
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 预解析了表达式条件的规则
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: Rule,
    /// 与 conditions 一一对应，字段条件为 None
    expressions: Vec<Option<Expression>>,
}

impl CompiledRule {
    pub fn compile(rule: Rule) -> Result<Self> {
        let expressions = rule
            .conditions
            .iter()
            .map(|c| c.expression_source().map(Expression::parse).transpose())
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rule, expressions })
    }

    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn is_active(&self) -> bool {
        self.rule.active
    }

    /// 第 index 个条件的预解析表达式
    pub fn expression(&self, index: usize) -> Option<&Expression> {
        self.expressions.get(index).and_then(Option::as_ref)
    }
}

/// 规则配置快照
#[derive(Debug, Clone)]
pub struct RuleSetSnapshot {
    pub version: String,
    pub metadata: RuleSetMetadata,
    pub last_updated: DateTime<Utc>,
    /// 按优先级升序，同优先级保持声明顺序
    pub rules: Vec<CompiledRule>,
}

impl RuleSetSnapshot {
    pub fn active_rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|r| r.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_rules().count()
    }

    /// 出现过的规则类型，按首次出现顺序
    pub fn rule_types(&self) -> Vec<RuleType> {
        let mut types = Vec::new();
        for rule in &self.rules {
            if !types.contains(&rule.rule().rule_type) {
                types.push(rule.rule().rule_type);
            }
        }
        types
    }

    pub fn get(&self, rule_id: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.id() == rule_id)
    }
}

/// 规则统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub total_rules: usize,
    pub active_rules: usize,
    pub inactive_rules: usize,
    pub rules_by_type: BTreeMap<RuleType, usize>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// 规则存储
pub struct RuleStore {
    current: ArcSwapOption<RuleSetSnapshot>,
    /// 串行化写操作
    write_lock: Mutex<()>,
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            write_lock: Mutex::new(()),
        }
    }

    /// 当前快照，尚未加载配置时为 None
    pub fn snapshot(&self) -> Option<Arc<RuleSetSnapshot>> {
        self.current.load_full()
    }

    /// 整体替换规则配置
    ///
    /// 校验或编译失败时保留原配置不变。
    #[instrument(skip(self, rule_set), fields(version = %rule_set.version, rules = rule_set.rules.len()))]
    pub fn save_rule_set(&self, rule_set: RuleSet) -> Result<Arc<RuleSetSnapshot>> {
        schema::validate_rule_set(&rule_set)?;

        let mut rules = rule_set
            .rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        sort_by_priority(&mut rules);

        let snapshot = Arc::new(RuleSetSnapshot {
            version: rule_set.version,
            metadata: rule_set.metadata,
            last_updated: Utc::now(),
            rules,
        });

        let _guard = self.write_lock.lock();
        self.current.store(Some(snapshot.clone()));

        info!(active = snapshot.active_count(), "规则配置已加载");
        Ok(snapshot)
    }

    /// 获取所有规则
    pub fn get_all(&self) -> Vec<Rule> {
        self.snapshot()
            .map(|s| s.rules.iter().map(|r| r.rule().clone()).collect())
            .unwrap_or_default()
    }

    /// 获取启用的规则
    pub fn get_active(&self) -> Vec<Rule> {
        self.snapshot()
            .map(|s| s.active_rules().map(|r| r.rule().clone()).collect())
            .unwrap_or_default()
    }

    pub fn get_by_id(&self, rule_id: &str) -> Result<Rule> {
        self.snapshot()
            .and_then(|s| s.get(rule_id).map(|r| r.rule().clone()))
            .ok_or_else(|| RuleError::RuleNotFound(rule_id.to_string()))
    }

    /// 局部更新规则，合并后重新校验并按优先级重排
    #[instrument(skip(self, patch))]
    pub fn update(&self, rule_id: &str, patch: RulePatch) -> Result<Rule> {
        let _guard = self.write_lock.lock();

        let Some(current) = self.current.load_full() else {
            warn!("更新不存在的规则: {}", rule_id);
            return Err(RuleError::RuleNotFound(rule_id.to_string()));
        };
        let Some(index) = current.rules.iter().position(|r| r.id() == rule_id) else {
            warn!("更新不存在的规则: {}", rule_id);
            return Err(RuleError::RuleNotFound(rule_id.to_string()));
        };

        let mut rule = current.rules[index].rule().clone();
        patch.apply_to(&mut rule);
        schema::validate_rule(&rule)?;
        let compiled = CompiledRule::compile(rule.clone())?;

        let mut rules = current.rules.clone();
        rules[index] = compiled;
        sort_by_priority(&mut rules);

        self.current.store(Some(Arc::new(RuleSetSnapshot {
            version: current.version.clone(),
            metadata: current.metadata.clone(),
            last_updated: Utc::now(),
            rules,
        })));

        info!("规则已更新: {}", rule_id);
        Ok(rule)
    }

    /// 删除规则，返回被删除的规则
    #[instrument(skip(self))]
    pub fn delete(&self, rule_id: &str) -> Result<Rule> {
        let _guard = self.write_lock.lock();

        let current = self.current.load_full();
        let Some((current, index)) = current.and_then(|c| {
            let index = c.rules.iter().position(|r| r.id() == rule_id)?;
            Some((c, index))
        }) else {
            warn!("删除不存在的规则: {}", rule_id);
            return Err(RuleError::RuleNotFound(rule_id.to_string()));
        };

        let mut rules = current.rules.clone();
        let removed = rules.remove(index);

        self.current.store(Some(Arc::new(RuleSetSnapshot {
            version: current.version.clone(),
            metadata: current.metadata.clone(),
            last_updated: Utc::now(),
            rules,
        })));

        info!("规则已删除: {}", rule_id);
        Ok(removed.rule)
    }

    /// 获取统计信息
    pub fn stats(&self) -> RuleStats {
        let Some(snapshot) = self.snapshot() else {
            return RuleStats {
                total_rules: 0,
                active_rules: 0,
                inactive_rules: 0,
                rules_by_type: BTreeMap::new(),
                last_updated: None,
            };
        };

        let mut rules_by_type = BTreeMap::new();
        for rule in &snapshot.rules {
            *rules_by_type.entry(rule.rule().rule_type).or_insert(0) += 1;
        }
        let active_rules = snapshot.active_count();

        RuleStats {
            total_rules: snapshot.rules.len(),
            active_rules,
            inactive_rules: snapshot.rules.len() - active_rules,
            rules_by_type,
            last_updated: Some(snapshot.last_updated),
        }
    }
}

/// 稳定排序，同优先级保持原有顺序
fn sort_by_priority(rules: &mut [CompiledRule]) {
    rules.sort_by_key(|r| r.rule().priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, ActionType, Condition};
    use crate::operators::Operator;
    use std::thread;

    fn rule(id: &str, priority: i32) -> Rule {
        Rule::new(
            id,
            format!("Rule {}", id),
            RuleType::Validation,
            vec![Condition::new("totalAmount", Operator::GreaterThan, 0)],
            vec![Action::new(ActionType::Flag)],
        )
        .with_priority(priority)
    }

    fn rule_set(rules: Vec<Rule>) -> RuleSet {
        RuleSet {
            version: "1.0".to_string(),
            metadata: RuleSetMetadata {
                name: "test".to_string(),
                ..Default::default()
            },
            rules,
        }
    }

    fn ids(store: &RuleStore) -> Vec<String> {
        store.get_all().into_iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_save_sorts_by_priority_stably() {
        let store = RuleStore::new();
        store
            .save_rule_set(rule_set(vec![
                rule("a", 5),
                rule("b", 1),
                rule("c", 5),
                rule("d", 3),
            ]))
            .unwrap();

        assert_eq!(ids(&store), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_empty_store() {
        let store = RuleStore::new();
        assert!(store.snapshot().is_none());
        assert!(store.get_all().is_empty());
        assert!(matches!(store.get_by_id("x"), Err(RuleError::RuleNotFound(_))));
        assert!(matches!(
            store.update("x", RulePatch::default()),
            Err(RuleError::RuleNotFound(_))
        ));
        assert_eq!(store.stats().total_rules, 0);
    }

    #[test]
    fn test_failed_save_keeps_previous_config() {
        let store = RuleStore::new();
        store.save_rule_set(rule_set(vec![rule("a", 1)])).unwrap();

        let invalid = rule_set(vec![rule("x", 1), rule("x", 2)]);
        assert!(matches!(
            store.save_rule_set(invalid),
            Err(RuleError::Schema { .. })
        ));

        let mut bad_expression = rule("y", 1);
        bad_expression.conditions = vec![Condition::expression("amount =")];
        assert!(matches!(
            store.save_rule_set(rule_set(vec![bad_expression])),
            Err(RuleError::Parse { .. })
        ));

        assert_eq!(ids(&store), vec!["a"]);
    }

    #[test]
    fn test_active_filter() {
        let store = RuleStore::new();
        store
            .save_rule_set(rule_set(vec![rule("a", 1), rule("b", 2).inactive()]))
            .unwrap();

        assert_eq!(store.get_all().len(), 2);
        let active = store.get_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[test]
    fn test_update_resorts_and_stamps() {
        let store = RuleStore::new();
        store
            .save_rule_set(rule_set(vec![rule("a", 1), rule("b", 2), rule("c", 3)]))
            .unwrap();
        let before = store.get_by_id("a").unwrap().updated_at;

        let patch = RulePatch {
            priority: Some(9),
            ..Default::default()
        };
        let updated = store.update("a", patch).unwrap();

        assert_eq!(updated.priority, 9);
        assert!(updated.updated_at >= before);
        assert_eq!(ids(&store), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_update_rejects_invalid_merge() {
        let store = RuleStore::new();
        store.save_rule_set(rule_set(vec![rule("a", 1)])).unwrap();

        let patch = RulePatch {
            conditions: Some(vec![Condition::expression("a > ")]),
            ..Default::default()
        };
        assert!(matches!(store.update("a", patch), Err(RuleError::Parse { .. })));
        assert_eq!(store.get_by_id("a").unwrap().conditions.len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = RuleStore::new();
        store.save_rule_set(rule_set(vec![rule("a", 1), rule("b", 2)])).unwrap();

        let removed = store.delete("a").unwrap();
        assert_eq!(removed.id, "a");
        assert_eq!(ids(&store), vec!["b"]);
        assert!(matches!(store.delete("a"), Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let store = RuleStore::new();
        store.save_rule_set(rule_set(vec![rule("a", 1), rule("b", 2)])).unwrap();

        let snapshot = store.snapshot().unwrap();
        store.delete("a").unwrap();

        assert_eq!(snapshot.rules.len(), 2);
        assert_eq!(store.snapshot().unwrap().rules.len(), 1);
    }

    #[test]
    fn test_stats() {
        let store = RuleStore::new();
        let mut approval = rule("b", 2);
        approval.rule_type = RuleType::Approval;
        store
            .save_rule_set(rule_set(vec![rule("a", 1), approval, rule("c", 3).inactive()]))
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_rules, 3);
        assert_eq!(stats.active_rules, 2);
        assert_eq!(stats.inactive_rules, 1);
        assert_eq!(stats.rules_by_type[&RuleType::Validation], 2);
        assert_eq!(stats.rules_by_type[&RuleType::Approval], 1);
        assert!(stats.last_updated.is_some());

        let snapshot = store.snapshot().unwrap();
        assert_eq!(
            snapshot.rule_types(),
            vec![RuleType::Validation, RuleType::Approval]
        );
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(RuleStore::new());
        store
            .save_rule_set(rule_set((0..10).map(|i| rule(&format!("r{}", i), 5)).collect()))
            .unwrap();

        let mut handles = vec![];

        for i in 0..5 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store.delete(&format!("r{}", i)).unwrap();
            }));
        }

        for _ in 0..5 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let snapshot = store.snapshot().unwrap();
                assert!(snapshot.rules.len() >= 5);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_all().len(), 5);
    }
}
