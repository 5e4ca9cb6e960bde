//! API端点实现
//!
//! `GET /api/health` 返回健康快照，`POST /api/check` 立即执行一轮检测

use crate::engine::{CycleSummary, HealthSnapshot, MonitorHandle};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Web 服务共享状态
#[derive(Clone)]
pub struct WebAppState {
    /// 调度器控制接口
    pub monitor: Arc<dyn MonitorHandle>,
    /// 启动时间
    pub start_time: chrono::DateTime<chrono::Utc>,
}

impl WebAppState {
    pub fn new(monitor: Arc<dyn MonitorHandle>) -> Self {
        Self {
            monitor,
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

/// 健康接口响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 版本信息
    pub version: &'static str,
    /// 运行时间（秒）
    pub uptime_seconds: i64,
    /// 调度器健康快照
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

/// 创建API路由
pub fn create_router(state: WebAppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/check", post(trigger_check_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<WebAppState>) -> Json<ApiResponse<HealthResponse>> {
    let uptime_seconds = chrono::Utc::now()
        .signed_duration_since(state.start_time)
        .num_seconds();

    Json(ApiResponse::success(HealthResponse {
        version: crate::VERSION,
        uptime_seconds,
        snapshot: state.monitor.health().await,
    }))
}

async fn trigger_check_handler(State(state): State<WebAppState>) -> Response {
    match state.monitor.trigger_check().await {
        Ok(summary) => Json(ApiResponse::<CycleSummary>::success(summary)).into_response(),
        Err(e) => {
            error!("手动触发检测失败: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(format!("检测失败: {}", e))),
            )
                .into_response()
        }
    }
}
