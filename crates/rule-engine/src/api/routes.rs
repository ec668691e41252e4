//! 路由配置

use axum::{
    Router,
    routing::{get, post},
};

use super::{AppState, handlers};

/// 规则管理路由
fn rule_routes() -> Router<AppState> {
    Router::new()
        .route("/rules/load", post(handlers::load_rules))
        .route("/rules", get(handlers::get_rules))
        .route("/rules/stats", get(handlers::rules_stats))
        .route(
            "/rules/{id}",
            get(handlers::get_rule)
                .put(handlers::update_rule)
                .delete(handlers::delete_rule),
        )
}

/// 校验路由
fn validation_routes() -> Router<AppState> {
    Router::new()
        .route("/validate", post(handlers::validate))
        .route("/validate/batch", post(handlers::validate_batch))
        .route("/validate/history", get(handlers::validation_history))
        .route("/validate/stats", get(handlers::validation_stats))
}

/// 采购申请审批路由
fn purchase_request_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/purchase-requests/approval-rules",
            post(handlers::load_approval_rules),
        )
        .route(
            "/purchase-requests/process",
            post(handlers::process_purchase_request),
        )
}

/// 所有 /api 下的路由
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(rule_routes())
        .merge(validation_routes())
        .merge(purchase_request_routes())
}
