//! Web 管理接口模块
//!
//! 提供健康快照查询和手动触发检测的 HTTP API

pub mod api;
pub mod server;

pub use api::{create_router, ApiResponse, WebAppState};
pub use server::WebServer;
