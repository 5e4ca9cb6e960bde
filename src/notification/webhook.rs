//! Webhook通知发送器
//!
//! 将渲染后的告警以JSON形式POST到配置的webhook地址

use crate::error::NotificationError;
use crate::notification::alert::AlertType;
use crate::notification::sender::{AlertPayload, DeliveryCode, Notifier};
use crate::notification::template::{AlertTemplates, RenderedAlert};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, info};

/// Webhook通知发送器
pub struct WebhookNotifier {
    /// HTTP客户端
    client: Client,
    /// webhook地址
    webhook_url: String,
    /// 告警模板
    templates: AlertTemplates,
}

impl WebhookNotifier {
    /// 创建新的webhook发送器
    ///
    /// # 参数
    /// * `webhook_url` - webhook地址
    /// * `templates` - 告警模板
    ///
    /// # 返回
    /// * `Result<Self, NotificationError>` - 发送器实例
    pub fn new(webhook_url: impl Into<String>, templates: AlertTemplates) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| NotificationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
            templates,
        })
    }

    /// 构建消息体
    fn build_message_body(contact: &str, kind: AlertType, rendered: &RenderedAlert) -> Value {
        json!({
            "to": contact,
            "kind": kind,
            "subject": rendered.subject,
            "content": rendered.body,
        })
    }

    /// 发送消息到webhook
    async fn send_to_webhook(&self, body: &Value) -> Result<DeliveryCode, NotificationError> {
        debug!("发送消息到webhook: {}", self.webhook_url);

        let response = self
            .client
            .post(&self.webhook_url)
            .json(body)
            .send()
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("webhook消息发送成功: {}", status);
            Ok(DeliveryCode(status.as_u16()))
        } else {
            let text = response.text().await.unwrap_or_default();
            error!("webhook消息发送失败: {} - {}", status, text);
            Err(NotificationError::Transport(format!(
                "webhook返回状态码 {}",
                status.as_u16()
            )))
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        contact: &str,
        kind: AlertType,
        payload: &AlertPayload,
    ) -> Result<DeliveryCode, NotificationError> {
        let rendered = self.templates.render(kind, payload)?;
        let body = Self::build_message_body(contact, kind, &rendered);
        self.send_to_webhook(&body).await
    }

    async fn test_connection(&self) -> Result<(), NotificationError> {
        let rendered = RenderedAlert {
            subject: "连接测试".to_string(),
            body: "这是一条测试消息，用于验证webhook连接是否正常。".to_string(),
        };
        let body = json!({
            "to": "",
            "kind": "test",
            "subject": rendered.subject,
            "content": rendered.body,
        });
        self.send_to_webhook(&body).await.map(|_| ())
    }
}
