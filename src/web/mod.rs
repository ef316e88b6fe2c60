//! Web API模块
//!
//! 以只读为主的探针状态接口，另外提供静默操作

pub mod api;

use crate::config::WebConfig;
use crate::probe::ProbeSet;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Web服务器状态
#[derive(Debug, Clone)]
pub struct WebAppState {
    /// 所有已注册的探针
    pub probes: ProbeSet,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl WebAppState {
    pub fn new(probes: ProbeSet) -> Self {
        Self {
            probes,
            start_time: chrono::Utc::now(),
        }
    }
}

/// API响应包装器
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 是否成功
    pub success: bool,
    /// 响应数据
    pub data: Option<T>,
    /// 错误信息
    pub error: Option<String>,
    /// 时间戳
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// 创建错误响应
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// 构建路由
pub fn build_router(state: WebAppState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/probes", get(api::list_probes))
        .route("/api/v1/probes/{name}", get(api::get_probe))
        .route("/api/v1/probes/{name}/silence", post(api::silence_probe))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 解析监听地址
pub fn socket_addr(config: &WebConfig) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("无效的Web监听地址 {}:{}: {}", config.bind_address, config.port, e))
}

/// 启动Web服务器，直到 `shutdown` 完成
///
/// # 参数
/// * `config` - Web配置
/// * `state` - 服务器状态
/// * `shutdown` - 关闭信号
pub async fn serve<F>(config: &WebConfig, state: WebAppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = socket_addr(config)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("绑定Web监听地址 {} 失败: {}", addr, e))?;

    info!("Web服务器启动，监听地址: {}", addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Web服务器已停止");
    Ok(())
}
