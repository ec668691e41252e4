//! HTTP 接口
//!
//! 所有业务接口挂在 `/api` 下，响应统一为 `{success, code, message, data}`。

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

use crate::service::RuleEngineService;
use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};
use procurement_shared::observability::middleware as obs_middleware;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

pub use error::{ApiError, ApiResult};
pub use response::ApiResponse;

/// 请求体上限
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RuleEngineService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<RuleEngineService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }
}

/// 构建完整的 HTTP 应用
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_routes())
        .route("/health", get(handlers::health_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
