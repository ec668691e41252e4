//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
pub struct MetricsHandle {
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册规则引擎相关指标的描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!("rule_evaluations_total", "Total number of record evaluations");
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Record evaluation duration in seconds"
    );

    metrics::describe_counter!("batch_validations_total", "Total number of batch validations");
    metrics::describe_counter!("rule_sets_loaded_total", "Total number of rule set loads");
    metrics::describe_counter!(
        "validation_history_evictions_total",
        "Validation history entries evicted by the retention cap"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录单条记录的规则评估
#[inline]
pub fn record_rule_evaluation(mode: &str, passed: bool, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "mode" => mode.to_string(),
        "passed" => passed.to_string()
    )
    .increment(1);

    metrics::histogram!("rule_evaluation_duration_seconds", "mode" => mode.to_string())
        .record(duration_secs);
}

/// 记录批量校验
#[inline]
pub fn record_batch_validation(records: usize, passed: bool) {
    metrics::counter!("batch_validations_total", "passed" => passed.to_string()).increment(1);
    metrics::histogram!("batch_validation_records").record(records as f64);
}

/// 记录规则集加载
#[inline]
pub fn record_rule_set_load(status: &str) {
    metrics::counter!("rule_sets_loaded_total", "status" => status.to_string()).increment(1);
}

/// 记录历史淘汰条数
#[inline]
pub fn record_history_evictions(count: u64) {
    if count > 0 {
        metrics::counter!("validation_history_evictions_total").increment(count);
    }
}
