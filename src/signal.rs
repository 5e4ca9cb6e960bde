//! 信号处理模块
//!
//! 监听 Ctrl+C / SIGTERM，通过 watch 通道广播关闭请求

use crate::error::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 关闭信号监听器
///
/// `subscribe` 得到的接收端在收到信号后变为 `true`
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// 创建监听器，尚未安装系统信号处理
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// 订阅关闭通知
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// 手动触发关闭
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// 安装系统信号处理器
    pub fn install(&self) -> Result<()> {
        #[cfg(unix)]
        {
            self.install_unix()
        }
        #[cfg(not(unix))]
        {
            self.install_ctrl_c();
            Ok(())
        }
    }

    #[cfg(unix)]
    fn install_unix(&self) -> Result<()> {
        use futures::stream::StreamExt;

        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                match signal {
                    SIGINT => info!("接收到 SIGINT 信号，开始优雅关闭..."),
                    SIGTERM => info!("接收到 SIGTERM 信号，开始优雅关闭..."),
                    _ => {
                        warn!("接收到未处理的信号: {signal}");
                        continue;
                    }
                }
                tx.send_replace(true);
                break;
            }
            handle.close();
        });

        Ok(())
    }

    #[cfg(not(unix))]
    fn install_ctrl_c(&self) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("接收到 Ctrl+C，开始优雅关闭...");
                    tx.send_replace(true);
                }
                Err(e) => error!("监听中断信号失败: {e}"),
            }
        });
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        let mut rx = self.subscribe();
        if rx.wait_for(|stop| *stop).await.is_err() {
            error!("等待关闭信号时发生错误: 通道已关闭");
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_manual_trigger_wakes_waiters() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        assert!(!*rx.borrow());

        signal.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());

        // 已触发后 wait 立即返回
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_install_handlers() {
        let signal = ShutdownSignal::new();
        assert!(signal.install().is_ok());
    }
}
