//! 检测结果上报
//!
//! 子批次完成后依次更新指标、持久化结果、回写链接状态，
//! 再按所有者设置生成告警并经节流后发送

use crate::engine::batch::{CheckedLink, SubBatchHandler};
use crate::engine::metrics::MetricsAggregator;
use crate::link::{CheckUpdate, LinkStore, MonitoredLink, OwnerSettings};
use crate::logging::{notification_log, probe_log};
use crate::notification::alert::{self, Alert, AlertSink};
use crate::notification::sender::{AlertPayload, Notifier};
use crate::notification::throttler::{NotificationThrottler, ThrottleKey};
use crate::probe::ProbeResult;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 检测结果上报器
pub struct Reporter {
    /// 链接存储
    store: Arc<dyn LinkStore>,
    /// 告警接收器
    alert_sink: Arc<dyn AlertSink>,
    /// 通知发送器
    notifier: Arc<dyn Notifier>,
    /// 通知节流器
    throttler: Arc<NotificationThrottler>,
    /// 指标聚合器
    metrics: Arc<MetricsAggregator>,
    /// 通知基础冷却时间（分钟）
    cooldown_minutes: u32,
}

impl Reporter {
    /// 创建上报器
    pub fn new(
        store: Arc<dyn LinkStore>,
        alert_sink: Arc<dyn AlertSink>,
        notifier: Arc<dyn Notifier>,
        throttler: Arc<NotificationThrottler>,
        metrics: Arc<MetricsAggregator>,
        cooldown_minutes: u32,
    ) -> Self {
        Self {
            store,
            alert_sink,
            notifier,
            throttler,
            metrics,
            cooldown_minutes,
        }
    }

    /// 上报一个子批次
    ///
    /// 每条结果独立处理；持久化失败不影响其余结果，处理完后返回第一个错误
    pub async fn report(&self, checked: Vec<CheckedLink>) -> anyhow::Result<()> {
        let results: Vec<ProbeResult> = checked.iter().map(|item| item.result.clone()).collect();
        self.metrics.record_batch(&results).await;

        let mut first_error = None;
        for CheckedLink { link, result } in &checked {
            if let Err(e) = self.report_one(link, result).await {
                error!("上报检测结果失败: {} - {:#}", link.name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 上报单条检测结果
    async fn report_one(&self, link: &MonitoredLink, result: &ProbeResult) -> anyhow::Result<()> {
        probe_log(&link.name, result);

        self.store
            .record_result(result)
            .await
            .with_context(|| format!("保存检测结果失败: 链接 {}", link.id))?;

        let update = CheckUpdate::from_result(link, result);
        self.store
            .update_after_check(&update)
            .await
            .with_context(|| format!("更新链接状态失败: 链接 {}", link.id))?;

        let settings = match self.store.owner_settings(link.owner_id).await {
            Ok(Some(settings)) => settings,
            Ok(None) => OwnerSettings::defaults_for(link.owner_id),
            Err(e) => {
                warn!("读取所有者 {} 通知设置失败，跳过告警: {}", link.owner_id, e);
                return Ok(());
            }
        };

        for alert_type in alert::alerts_for(link, result, &settings) {
            let key = ThrottleKey::new(link.owner_id, link.id, alert_type);
            let admitted = self
                .throttler
                .admit(key, self.cooldown_minutes, result.status_code, result.error_kind)
                .await;
            if !admitted {
                debug!("告警被节流: {} {}", link.name, alert_type);
                continue;
            }

            let alert = Alert::new(alert_type, link, result);
            let payload = AlertPayload::new(&alert, link, result);
            if let Err(e) = self.alert_sink.append(alert).await {
                warn!("写入告警失败: {} {} - {}", link.name, alert_type, e);
            }

            if !settings.notifications_enabled {
                continue;
            }
            let Some(contact) = settings.contact.as_deref() else {
                continue;
            };

            match self.notifier.send(contact, alert_type, &payload).await {
                Ok(code) => notification_log(&link.name, alert_type, contact, Ok(code.0)),
                Err(e) => notification_log(&link.name, alert_type, contact, Err(&e.to_string())),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SubBatchHandler for Reporter {
    async fn handle(&self, checked: Vec<CheckedLink>) -> anyhow::Result<()> {
        self.report(checked).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::link::InMemoryLinkStore;
    use crate::notification::alert::{AlertType, MemoryAlertSink};
    use crate::notification::sender::DeliveryCode;
    use crate::probe::ErrorKind;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, AlertType)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            contact: &str,
            kind: AlertType,
            _payload: &AlertPayload,
        ) -> Result<DeliveryCode, NotificationError> {
            self.sent.lock().await.push((contact.to_string(), kind));
            if self.fail {
                Err(NotificationError::Transport("down".to_string()))
            } else {
                Ok(DeliveryCode(202))
            }
        }

        async fn test_connection(&self) -> Result<(), NotificationError> {
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<InMemoryLinkStore>,
        sink: Arc<MemoryAlertSink>,
        notifier: Arc<RecordingNotifier>,
        throttler: Arc<NotificationThrottler>,
        metrics: Arc<MetricsAggregator>,
        reporter: Reporter,
    }

    async fn fixture(contact: Option<&str>, fail_notifier: bool) -> Fixture {
        let store = Arc::new(InMemoryLinkStore::new());
        let link = MonitoredLink::new(1, 10, "API", "https://api.example.com", 60).unwrap();
        store.insert_link(link).await;
        let mut settings = OwnerSettings::defaults_for(10);
        settings.contact = contact.map(str::to_string);
        store.insert_owner(settings).await;

        let sink = Arc::new(MemoryAlertSink::new());
        let notifier = Arc::new(RecordingNotifier {
            fail: fail_notifier,
            ..Default::default()
        });
        let throttler = Arc::new(NotificationThrottler::new());
        let metrics = Arc::new(MetricsAggregator::new());
        let reporter = Reporter::new(
            store.clone(),
            sink.clone(),
            notifier.clone(),
            throttler.clone(),
            metrics.clone(),
            30,
        );

        Fixture {
            store,
            sink,
            notifier,
            throttler,
            metrics,
            reporter,
        }
    }

    fn checked(link: MonitoredLink, result: ProbeResult) -> Vec<CheckedLink> {
        let result = result.with_link_id(link.id);
        vec![CheckedLink { link, result }]
    }

    fn timeout() -> ProbeResult {
        ProbeResult::failure("https://api.example.com", ErrorKind::Timeout, "timeout")
    }

    #[tokio::test]
    async fn test_failure_persists_and_alerts() {
        let f = fixture(Some("ops@example.com"), false).await;
        let link = f.store.link(1).await.unwrap();

        f.reporter.report(checked(link, timeout())).await.unwrap();

        let stored = f.store.link(1).await.unwrap();
        assert_eq!(stored.consecutive_failures, 1);
        assert_eq!(stored.last_available, Some(false));
        assert_eq!(f.store.results_for(1).await.len(), 1);

        let alerts = f.sink.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Broken);
        assert_eq!(
            *f.notifier.sent.lock().await,
            vec![("ops@example.com".to_string(), AlertType::Broken)]
        );
        assert_eq!(f.metrics.state().await.failed_checks, 1);
    }

    #[tokio::test]
    async fn test_repeat_failure_is_throttled() {
        let f = fixture(Some("ops@example.com"), false).await;

        let link = f.store.link(1).await.unwrap();
        f.reporter.report(checked(link, timeout())).await.unwrap();
        let link = f.store.link(1).await.unwrap();
        f.reporter.report(checked(link, timeout())).await.unwrap();

        assert_eq!(f.sink.alerts().await.len(), 1);
        assert_eq!(f.store.link(1).await.unwrap().consecutive_failures, 2);
    }

    #[tokio::test]
    async fn test_recovery_emits_status_change() {
        let f = fixture(Some("ops@example.com"), false).await;

        let link = f.store.link(1).await.unwrap();
        f.reporter.report(checked(link, timeout())).await.unwrap();
        let link = f.store.link(1).await.unwrap();
        let ok = ProbeResult::new("https://api.example.com").with_status_code(200);
        f.reporter.report(checked(link, ok)).await.unwrap();

        let types: Vec<AlertType> = f.sink.alerts().await.iter().map(|a| a.alert_type).collect();
        assert_eq!(types, vec![AlertType::Broken, AlertType::StatusChange]);
        assert_eq!(f.store.link(1).await.unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_no_contact_still_records_alert() {
        let f = fixture(None, false).await;
        let link = f.store.link(1).await.unwrap();
        f.reporter.report(checked(link, timeout())).await.unwrap();

        assert_eq!(f.sink.alerts().await.len(), 1);
        assert!(f.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_still_counts_for_throttling() {
        let f = fixture(Some("ops@example.com"), true).await;
        let link = f.store.link(1).await.unwrap();
        f.reporter.report(checked(link, timeout())).await.unwrap();

        let record = f.throttler.summary(10, 1, AlertType::Broken).await.unwrap();
        assert_eq!(record.send_count, 1);
        assert_eq!(record.error_kinds, vec![ErrorKind::Timeout]);
    }

    #[tokio::test]
    async fn test_unknown_link_escalates_store_error() {
        let f = fixture(None, false).await;
        let ghost = MonitoredLink::new(99, 10, "Ghost", "https://ghost.example.com", 60).unwrap();
        let result = f.reporter.report(checked(ghost, timeout())).await;
        assert!(result.is_err());
    }
}
