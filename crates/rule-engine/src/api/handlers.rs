//! API 处理器

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{
    AppState,
    error::{ApiError, ApiResult},
    response::ApiResponse,
};
use crate::error::RuleError;
use crate::history::{HistoryPage, ValidationStats};
use crate::models::{BatchOutcome, EvaluationSummary, Rule};
use crate::record::{self, Record};
use crate::schema;
use crate::service::{LoadRulesResponse, RulesOverview};
use crate::store::RuleStats;

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

/// 校验历史查询参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<String>,
}

fn body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    Ok(payload?.0)
}

/// 加载规则配置
///
/// POST /api/rules/load
pub async fn load_rules(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<LoadRulesResponse>>> {
    let loaded = state.service.load_rules(body(payload)?)?;
    Ok(Json(ApiResponse::success_with_message(loaded, "规则加载成功")))
}

/// 获取当前规则配置
///
/// GET /api/rules
pub async fn get_rules(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<RulesOverview>>> {
    Ok(Json(ApiResponse::success(state.service.get_rules()?)))
}

/// GET /api/rules/stats
pub async fn rules_stats(State(state): State<AppState>) -> Json<ApiResponse<RuleStats>> {
    Json(ApiResponse::success(state.service.rules_stats()))
}

/// GET /api/rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Rule>>> {
    Ok(Json(ApiResponse::success(state.service.get_rule(&id)?)))
}

/// 局部更新规则
///
/// PUT /api/rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Rule>>> {
    let rule = state.service.update_rule(&id, body(payload)?)?;
    info!(rule_id = %id, "规则已更新");
    Ok(Json(ApiResponse::success_with_message(rule, "规则更新成功")))
}

/// DELETE /api/rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Rule>>> {
    let rule = state.service.delete_rule(&id)?;
    info!(rule_id = %id, "规则已删除");
    Ok(Json(ApiResponse::success_with_message(rule, "规则删除成功")))
}

/// 校验单条采购数据
///
/// POST /api/validate
pub async fn validate(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<EvaluationSummary>>> {
    let request = schema::parse_evaluation_request(body(payload)?)?;
    let summary = state
        .service
        .validate(request.procurement_data, request.options)?;
    Ok(Json(ApiResponse::success(summary)))
}

/// 批量校验
///
/// POST /api/validate/batch
pub async fn validate_batch(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<BatchOutcome>>> {
    let request = schema::parse_batch_request(body(payload)?)?;

    // 批量评估是 CPU 密集任务，放到阻塞线程池执行
    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        service.validate_batch(request.procurement_records, request.options)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("批量校验任务失败: {}", e)))??;

    Ok(Json(ApiResponse::success(outcome)))
}

/// GET /api/validate/history?page&limit&status
pub async fn validation_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, axum::extract::rejection::QueryRejection>,
) -> ApiResult<Json<ApiResponse<HistoryPage>>> {
    let Query(query) = query?;
    let page = state.service.validation_history(
        query.page.unwrap_or(DEFAULT_PAGE),
        query.limit.unwrap_or(DEFAULT_LIMIT),
        query.status.as_deref(),
    );
    Ok(Json(ApiResponse::success(page)))
}

/// GET /api/validate/stats
pub async fn validation_stats(State(state): State<AppState>) -> Json<ApiResponse<ValidationStats>> {
    Json(ApiResponse::success(state.service.validation_stats()))
}

/// 加载采购申请审批规则
///
/// POST /api/purchase-requests/approval-rules
pub async fn load_approval_rules(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<LoadRulesResponse>>> {
    let loaded = state.service.load_approval_rules(body(payload)?)?;
    Ok(Json(ApiResponse::success_with_message(loaded, "审批规则加载成功")))
}

/// 处理采购申请
///
/// POST /api/purchase-requests/process
pub async fn process_purchase_request(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<Record>>> {
    let request = record::from_value(body(payload)?)
        .ok_or_else(|| RuleError::schema("采购申请必须是 JSON 对象"))?;
    let processed = state.service.process_purchase_request(request)?;
    Ok(Json(ApiResponse::success(processed)))
}

/// 存活探针
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "service": "rule-engine",
        "timestamp": Utc::now(),
        "uptime": state.started_at.elapsed().as_secs_f64()
    }))
}
