//! Link Vitals - 链接健康监控引擎
//!
//! 周期性检测用户登记的链接，支持：
//! - HTTP/HTTPS 检测（DNS、证书、重定向、HEAD 回退 GET）
//! - 指数退避重试
//! - 分批并发检测与随机抖动
//! - 按所有者/链接/告警类型节流的告警通知
//! - 运行指标与健康快照

pub mod app;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod logging;
pub mod notification;
pub mod probe;
pub mod signal;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use engine::{HealthSnapshot, LinkScheduler, MonitorHandle};
pub use error::LinkVitalsError;
pub use link::{LinkStore, MonitoredLink};
pub use probe::{ErrorKind, ProbeExecutor, ProbeResult};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
