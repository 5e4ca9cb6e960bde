//! 告警模块
//!
//! 告警类型、告警生成策略、告警文案以及告警接收器

use crate::link::{LinkId, MonitoredLink, OwnerId, OwnerSettings};
use crate::probe::{ErrorKind, ProbeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// 告警类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// 链接失效
    Broken,
    /// 可用状态变化
    StatusChange,
}

impl AlertType {
    /// 告警类型标识
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Broken => "broken",
            AlertType::StatusChange => "status_change",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 告警附带的检测详情
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDetails {
    /// HTTP状态码
    pub status_code: u16,
    /// 错误分类
    pub error_kind: Option<ErrorKind>,
    /// 错误信息
    pub error_message: Option<String>,
}

/// 告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// 告警ID
    pub id: Uuid,
    /// 告警类型
    pub alert_type: AlertType,
    /// 告警文案
    pub message: String,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 所有者ID
    pub owner_id: OwnerId,
    /// 链接ID
    pub link_id: LinkId,
    /// 检测详情
    pub details: AlertDetails,
}

impl Alert {
    /// 根据链接和检测结果创建告警
    pub fn new(alert_type: AlertType, link: &MonitoredLink, result: &ProbeResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            message: alert_message(alert_type, link, result),
            created_at: Utc::now(),
            owner_id: link.owner_id,
            link_id: link.id,
            details: AlertDetails {
                status_code: result.status_code,
                error_kind: result.error_kind,
                error_message: result.error_message.clone(),
            },
        }
    }
}

/// 计算一次检测需要生成的告警类型
///
/// # 参数
/// * `link` - 检测前的链接快照，`last_available` 为上一次的可用状态
/// * `result` - 本次检测结果
/// * `settings` - 所有者通知设置
///
/// # 返回
/// * `Vec<AlertType>` - 按 broken、status_change 顺序排列
pub fn alerts_for(
    link: &MonitoredLink,
    result: &ProbeResult,
    settings: &OwnerSettings,
) -> Vec<AlertType> {
    let mut alerts = Vec::with_capacity(2);

    if !result.available && settings.broken_links {
        alerts.push(AlertType::Broken);
    }

    let changed = link
        .last_available
        .is_some_and(|previous| previous != result.available);
    if changed && settings.status_changes {
        alerts.push(AlertType::StatusChange);
    }

    alerts
}

/// 生成告警文案
pub fn alert_message(alert_type: AlertType, link: &MonitoredLink, result: &ProbeResult) -> String {
    match alert_type {
        AlertType::StatusChange => {
            let state = if result.available { "恢复正常" } else { "变为异常" };
            format!("链接状态变化: {} {}", link.name, state)
        }
        AlertType::Broken => broken_message(link, result),
    }
}

fn broken_message(link: &MonitoredLink, result: &ProbeResult) -> String {
    let detail = result.error_message.as_deref().unwrap_or("未知原因");
    match result.error_kind {
        Some(ErrorKind::DnsError) => format!("域名无法解析: {}", link.name),
        Some(ErrorKind::SslError) => format!("SSL证书错误: {}", link.name),
        Some(ErrorKind::Timeout) => format!("连接超时: {}", link.name),
        Some(ErrorKind::RedirectError) => format!("重定向异常: {}", link.name),
        Some(ErrorKind::HttpError) if result.status_code >= 400 => {
            format!("链接已失效: {} (HTTP {})", link.name, result.status_code)
        }
        Some(ErrorKind::HttpError) | Some(ErrorKind::UnknownError) | None => {
            format!("链接检测出错: {} - {}", link.name, detail)
        }
    }
}

/// 告警接收器trait
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// 追加一条告警
    async fn append(&self, alert: Alert) -> anyhow::Result<()>;
}

/// 内存告警接收器
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    /// 已接收的告警
    alerts: RwLock<Vec<Alert>>,
}

impl MemoryAlertSink {
    /// 创建内存告警接收器
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部告警快照
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// 指定链接的告警
    pub async fn alerts_for_link(&self, link_id: LinkId) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|alert| alert.link_id == link_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn append(&self, alert: Alert) -> anyhow::Result<()> {
        self.alerts.write().await.push(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_link(last_available: Option<bool>) -> MonitoredLink {
        let mut link = MonitoredLink::new(3, 9, "Docs", "https://docs.example.com", 60).unwrap();
        link.last_available = last_available;
        link
    }

    fn ok_result() -> ProbeResult {
        ProbeResult::new("https://docs.example.com").with_status_code(200)
    }

    fn not_found() -> ProbeResult {
        ProbeResult::new("https://docs.example.com")
            .with_status_code(404)
            .with_error(ErrorKind::HttpError, "HTTP 404 Not Found")
    }

    #[test]
    fn test_first_failure_only_broken() {
        let settings = OwnerSettings::defaults_for(9);
        let alerts = alerts_for(&create_link(None), &not_found(), &settings);
        assert_eq!(alerts, vec![AlertType::Broken]);
    }

    #[test]
    fn test_up_to_down_emits_both() {
        let settings = OwnerSettings::defaults_for(9);
        let alerts = alerts_for(&create_link(Some(true)), &not_found(), &settings);
        assert_eq!(alerts, vec![AlertType::Broken, AlertType::StatusChange]);
    }

    #[test]
    fn test_recovery_emits_status_change_only() {
        let settings = OwnerSettings::defaults_for(9);
        let alerts = alerts_for(&create_link(Some(false)), &ok_result(), &settings);
        assert_eq!(alerts, vec![AlertType::StatusChange]);

        let steady = alerts_for(&create_link(Some(true)), &ok_result(), &settings);
        assert!(steady.is_empty());
    }

    #[test]
    fn test_owner_switches_disable_alerts() {
        let mut settings = OwnerSettings::defaults_for(9);
        settings.broken_links = false;
        settings.status_changes = false;
        assert!(alerts_for(&create_link(Some(true)), &not_found(), &settings).is_empty());
    }

    #[test]
    fn test_broken_messages_per_kind() {
        let link = create_link(None);
        let message = |kind| {
            alert_message(
                AlertType::Broken,
                &link,
                &ProbeResult::failure(&link.url, kind, "boom"),
            )
        };

        assert_eq!(message(ErrorKind::DnsError), "域名无法解析: Docs");
        assert_eq!(message(ErrorKind::SslError), "SSL证书错误: Docs");
        assert_eq!(message(ErrorKind::Timeout), "连接超时: Docs");
        assert_eq!(message(ErrorKind::RedirectError), "重定向异常: Docs");
        assert_eq!(message(ErrorKind::HttpError), "链接检测出错: Docs - boom");
        assert_eq!(message(ErrorKind::UnknownError), "链接检测出错: Docs - boom");
        assert_eq!(
            alert_message(AlertType::Broken, &link, &not_found()),
            "链接已失效: Docs (HTTP 404)"
        );
    }

    #[test]
    fn test_alert_carries_details() {
        let link = create_link(Some(true));
        let alert = Alert::new(AlertType::StatusChange, &link, &not_found());
        assert_eq!(alert.owner_id, 9);
        assert_eq!(alert.link_id, 3);
        assert_eq!(alert.details.status_code, 404);
        assert_eq!(alert.details.error_kind, Some(ErrorKind::HttpError));
        assert_eq!(alert.message, "链接状态变化: Docs 变为异常");
    }

    #[tokio::test]
    async fn test_memory_sink_collects() {
        let sink = MemoryAlertSink::new();
        let link = create_link(None);
        sink.append(Alert::new(AlertType::Broken, &link, &not_found()))
            .await
            .unwrap();

        assert_eq!(sink.alerts().await.len(), 1);
        assert_eq!(sink.alerts_for_link(3).await.len(), 1);
        assert!(sink.alerts_for_link(4).await.is_empty());
    }

    #[test]
    fn test_alert_type_serialization() {
        assert_eq!(
            serde_json::to_string(&AlertType::StatusChange).unwrap(),
            "\"status_change\""
        );
        assert_eq!(AlertType::Broken.to_string(), "broken");
    }
}
