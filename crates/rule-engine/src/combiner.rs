//! 条件结果合并
//!
//! 逻辑操作符只连接相邻两个条件：从左到右依次折叠，AND 与 OR 没有优先级之分。

use crate::models::Condition;
use crate::operators::LogicalOperator;

pub struct LogicalCombiner;

impl LogicalCombiner {
    /// 合并条件判定结果
    ///
    /// 第 i 个结果与之前累积结果的连接方式取自第 i-1 个条件的 `logical_operator`。
    /// 没有条件时返回 false。
    pub fn combine(conditions: &[Condition], results: &[bool]) -> bool {
        let Some((&first, rest)) = results.split_first() else {
            return false;
        };

        rest.iter()
            .zip(conditions)
            .fold(first, |verdict, (&next, previous)| {
                match previous.logical_operator {
                    LogicalOperator::And => verdict && next,
                    LogicalOperator::Or => verdict || next,
                }
            })
    }
}
