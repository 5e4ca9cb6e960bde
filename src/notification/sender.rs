//! 通知发送器模块
//!
//! 定义外发通知的trait、通知载荷和空实现

use crate::error::NotificationError;
use crate::link::{LinkId, MonitoredLink};
use crate::notification::alert::{Alert, AlertType};
use crate::probe::ProbeResult;
use async_trait::async_trait;
use serde::Serialize;

/// 发送结果码（通常为接收方返回的HTTP状态码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryCode(pub u16);

/// 通知载荷，同时作为模板渲染上下文
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    /// 告警类型
    pub alert_type: AlertType,
    /// 告警文案
    pub message: String,
    /// 链接ID
    pub link_id: LinkId,
    /// 链接名称
    pub link_name: String,
    /// 链接地址
    pub url: String,
    /// 本次是否可用
    pub available: bool,
    /// HTTP状态码
    pub status_code: u16,
    /// 错误分类标识
    pub error_kind: Option<String>,
    /// 错误信息
    pub error_message: Option<String>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
    /// 检测时间
    pub checked_at: String,
}

impl AlertPayload {
    /// 由告警、链接和检测结果构建载荷
    pub fn new(alert: &Alert, link: &MonitoredLink, result: &ProbeResult) -> Self {
        Self {
            alert_type: alert.alert_type,
            message: alert.message.clone(),
            link_id: link.id,
            link_name: link.name.clone(),
            url: link.url.clone(),
            available: result.available,
            status_code: result.status_code,
            error_kind: result.error_kind.map(|kind| kind.to_string()),
            error_message: result.error_message.clone(),
            response_time_ms: result.response_time_ms,
            checked_at: result.checked_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        }
    }
}

/// 通知发送器trait
///
/// 发送失败不重试，节流记录已在发送前更新
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 发送告警通知
    ///
    /// # 参数
    /// * `contact` - 接收人
    /// * `kind` - 告警类型，决定使用的模板
    /// * `payload` - 通知载荷
    ///
    /// # 返回
    /// * `Result<DeliveryCode, NotificationError>` - 发送结果码或传输错误
    async fn send(
        &self,
        contact: &str,
        kind: AlertType,
        payload: &AlertPayload,
    ) -> Result<DeliveryCode, NotificationError>;

    /// 测试连接
    async fn test_connection(&self) -> Result<(), NotificationError>;
}

/// 空的通知发送器（用于测试或未配置外发通道）
pub struct NoOpNotifier;

#[async_trait]
impl Notifier for NoOpNotifier {
    async fn send(
        &self,
        _contact: &str,
        _kind: AlertType,
        _payload: &AlertPayload,
    ) -> Result<DeliveryCode, NotificationError> {
        Ok(DeliveryCode(200))
    }

    async fn test_connection(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}
