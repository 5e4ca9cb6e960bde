//! 应用装配
//!
//! 根据配置组装链接存储、检测执行器、通知组件和调度器，
//! 并负责运行期间的启动与关闭顺序

use crate::config::{validate_config, Config, GlobalConfig};
use crate::engine::{LinkScheduler, MonitorHandle, SchedulerConfig, SchedulerDeps};
use crate::error::ConfigError;
use crate::link::InMemoryLinkStore;
use crate::notification::{
    AlertTemplates, MemoryAlertSink, NoOpNotifier, NotificationThrottler, Notifier,
    WebhookNotifier,
};
use crate::probe::{HttpProbeExecutor, ProbeSettings};
use crate::web::WebServer;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// 由全局配置生成检测参数
pub fn probe_settings(global: &GlobalConfig) -> ProbeSettings {
    ProbeSettings {
        inspect_certificates: global.inspect_certificates,
        ..ProbeSettings::default()
    }
}

/// 创建通知发送器，未配置webhook时不外发通知
pub fn build_notifier(global: &GlobalConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match global.webhook_url.as_deref() {
        Some(url) => {
            let templates = AlertTemplates::new().context("加载通知模板失败")?;
            let notifier = WebhookNotifier::new(url, templates).context("创建webhook通知器失败")?;
            info!("告警通知将发送到: {}", url);
            Ok(Arc::new(notifier))
        }
        None => {
            info!("未配置webhook地址，告警只记录不外发");
            Ok(Arc::new(NoOpNotifier))
        }
    }
}

/// 应用命令行覆盖参数并重新验证
pub fn apply_overrides(
    config: &mut Config,
    interval: Option<u32>,
    max_concurrent: Option<usize>,
) -> crate::error::Result<()> {
    if let Some(minutes) = interval {
        config.global.check_interval_minutes = minutes;
    }
    if let Some(count) = max_concurrent {
        config.global.max_concurrent_checks = count;
    }
    validate_config(config).map_err(ConfigError::ValidationError)?;
    Ok(())
}

/// 已装配的监控应用
pub struct MonitorApp {
    config: Config,
    store: Arc<InMemoryLinkStore>,
    alert_sink: Arc<MemoryAlertSink>,
    scheduler: Arc<LinkScheduler>,
}

impl MonitorApp {
    /// 按配置装配所有组件
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let store = Arc::new(InMemoryLinkStore::from_config(&config).context("加载链接配置失败")?);
        let executor = Arc::new(
            HttpProbeExecutor::new(probe_settings(&config.global)).context("创建检测执行器失败")?,
        );
        let alert_sink = Arc::new(MemoryAlertSink::new());
        let notifier = build_notifier(&config.global)?;

        let scheduler = Arc::new(LinkScheduler::new(
            SchedulerConfig::from_global(&config.global),
            SchedulerDeps {
                store: store.clone(),
                executor,
                alert_sink: alert_sink.clone(),
                notifier,
                throttler: Arc::new(NotificationThrottler::new()),
            },
        ));

        Ok(Self {
            config,
            store,
            alert_sink,
            scheduler,
        })
    }

    /// 调度器
    pub fn scheduler(&self) -> &Arc<LinkScheduler> {
        &self.scheduler
    }

    /// 链接存储
    pub fn store(&self) -> &Arc<InMemoryLinkStore> {
        &self.store
    }

    /// 告警记录
    pub fn alert_sink(&self) -> &Arc<MemoryAlertSink> {
        &self.alert_sink
    }

    /// 启动调度器和Web接口，直到 `shutdown` 变为 true
    ///
    /// 关闭顺序：先停调度器（等待进行中的子批次上报完成），再关Web服务器
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "链接监控启动，共 {} 个链接",
            self.store.link_count().await
        );
        self.scheduler.start().await.context("启动调度器失败")?;

        let (web_stop_tx, web_stop_rx) = watch::channel(false);
        let web_handle = match self.config.global.web.as_ref().filter(|web| web.enabled) {
            Some(web_config) => {
                let monitor: Arc<dyn MonitorHandle> = self.scheduler.clone();
                let server = WebServer::new(web_config, monitor)?;
                Some(tokio::spawn(async move {
                    if let Err(e) = server.run(web_stop_rx).await {
                        error!("Web 服务器运行失败: {}", e);
                    }
                }))
            }
            None => {
                info!("Web 管理接口未启用");
                None
            }
        };

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("收到关闭信号，正在停止服务...");

        self.scheduler.stop().await.context("停止调度器失败")?;

        web_stop_tx.send_replace(true);
        if let Some(handle) = web_handle {
            if let Err(e) = handle.await {
                error!("等待Web服务器退出失败: {}", e);
            }
        }

        let snapshot = self.scheduler.health().await;
        info!(
            "服务已停止，累计检测 {} 次，成功率 {:.1}%",
            snapshot.total_checks,
            snapshot.success_rate * 100.0
        );
        Ok(())
    }
}
