//! Web服务器实现
//!
//! 绑定监听地址，收到关闭信号后优雅退出

use super::api::{create_router, WebAppState};
use crate::config::WebConfig;
use crate::engine::MonitorHandle;
use crate::error::{ConfigError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// Web服务器
pub struct WebServer {
    /// 监听地址
    addr: SocketAddr,
    /// 共享状态
    state: WebAppState,
}

impl WebServer {
    /// 创建新的Web服务器
    pub fn new(config: &WebConfig, monitor: Arc<dyn MonitorHandle>) -> Result<Self> {
        let addr = config.socket_addr().map_err(ConfigError::ValidationError)?;
        Ok(Self {
            addr,
            state: WebAppState::new(monitor),
        })
    }

    /// 监听地址
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 启动Web服务器，直到 `shutdown` 变为 true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Web服务器已启动: http://{}", listener.local_addr()?);
        info!("健康接口: http://{}/api/health", self.addr);

        axum::serve(listener, create_router(self.state))
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
                info!("接收到关闭信号，正在关闭Web服务器...");
            })
            .await?;

        info!("Web服务器已关闭");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CycleSummary, HealthSnapshot, RunStatus};
    use async_trait::async_trait;

    struct IdleMonitor;

    #[async_trait]
    impl MonitorHandle for IdleMonitor {
        async fn health(&self) -> HealthSnapshot {
            crate::engine::MetricsAggregator::new().snapshot(false).await
        }

        async fn trigger_check(&self) -> anyhow::Result<CycleSummary> {
            anyhow::bail!("idle")
        }
    }

    #[test]
    fn test_web_server_creation() {
        let config = WebConfig {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 18080,
        };
        let server = WebServer::new(&config, Arc::new(IdleMonitor)).unwrap();
        assert_eq!(server.addr().to_string(), "127.0.0.1:18080");

        let bad = WebConfig {
            bind_address: "localhost-ish".to_string(),
            ..config
        };
        assert!(WebServer::new(&bad, Arc::new(IdleMonitor)).is_err());
    }

    #[tokio::test]
    async fn test_graceful_shutdown() {
        let config = WebConfig {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = WebServer::new(&config, Arc::new(IdleMonitor)).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));

        tx.send_replace(true);
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        let snapshot = IdleMonitor.health().await;
        assert_eq!(snapshot.status, RunStatus::Stopped);
    }
}
