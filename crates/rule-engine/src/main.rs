//! 采购规则引擎服务
//!
//! 提供规则管理和采购数据校验的 HTTP 接口。

use anyhow::{Context, Result};
use procurement_shared::config::AppConfig;
use procurement_shared::observability;
use rule_engine::RuleEngineService;
use rule_engine::api::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 配置加载失败时使用默认值启动
    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        history_capacity = config.engine.history_capacity,
        parallel_batch = config.engine.parallel_batch,
        "Starting rule-engine service..."
    );

    let service = Arc::new(RuleEngineService::new(&config.engine));

    if let Some(path) = &config.engine.rules_file {
        match preload_rules(&service, path).await {
            Ok(count) => info!(path = %path, rules = count, "Preloaded rules"),
            Err(e) => warn!(path = %path, error = %e, "Failed to preload rules, starting empty"),
        }
    }

    let app = api::router(AppState::new(service));

    let listener = TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// 从 JSON 文件预加载规则配置
async fn preload_rules(service: &RuleEngineService, path: &str) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path))?;
    let payload: serde_json::Value = serde_json::from_str(&content)?;
    let loaded = service.load_rules(payload)?;
    Ok(loaded.rules_count)
}

/// 监听关闭信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
