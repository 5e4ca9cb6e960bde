//! 消息模板模块
//!
//! 基于 Handlebars 渲染告警通知的标题和正文

use crate::error::NotificationError;
use crate::notification::alert::AlertType;
use crate::notification::sender::AlertPayload;
use handlebars::Handlebars;

/// 渲染后的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAlert {
    /// 标题
    pub subject: String,
    /// 正文
    pub body: String,
}

/// 告警模板集合
#[derive(Debug, Clone)]
pub struct AlertTemplates {
    registry: Handlebars<'static>,
}

fn subject_name(kind: AlertType) -> String {
    format!("{}_subject", kind.as_str())
}

fn body_name(kind: AlertType) -> String {
    format!("{}_body", kind.as_str())
}

impl AlertTemplates {
    /// 使用默认模板创建
    pub fn new() -> Result<Self, NotificationError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);

        let mut templates = Self { registry };
        templates.register(
            AlertType::Broken,
            DEFAULT_BROKEN_SUBJECT,
            DEFAULT_BROKEN_BODY,
        )?;
        templates.register(
            AlertType::StatusChange,
            DEFAULT_STATUS_CHANGE_SUBJECT,
            DEFAULT_STATUS_CHANGE_BODY,
        )?;
        Ok(templates)
    }

    /// 注册（或替换）某类告警的模板
    ///
    /// # 参数
    /// * `kind` - 告警类型
    /// * `subject` - 标题模板
    /// * `body` - 正文模板
    pub fn register(
        &mut self,
        kind: AlertType,
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError> {
        self.registry
            .register_template_string(&subject_name(kind), subject)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        self.registry
            .register_template_string(&body_name(kind), body)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        Ok(())
    }

    /// 渲染告警通知
    pub fn render(
        &self,
        kind: AlertType,
        payload: &AlertPayload,
    ) -> Result<RenderedAlert, NotificationError> {
        let subject = self
            .registry
            .render(&subject_name(kind), payload)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;
        let body = self
            .registry
            .render(&body_name(kind), payload)
            .map_err(|e| NotificationError::TemplateError(e.to_string()))?;

        Ok(RenderedAlert {
            subject: subject.trim().to_string(),
            body,
        })
    }
}

const DEFAULT_BROKEN_SUBJECT: &str = "🚨 链接失效 - {{link_name}}";

const DEFAULT_BROKEN_BODY: &str = r#"**{{message}}**
- **链接名称**: {{link_name}}
- **链接地址**: {{url}}
- **状态码**: {{#if status_code}}{{status_code}}{{else}}无响应{{/if}}
- **检测时间**: {{checked_at}}
{{#if error_kind}}
- **错误类型**: {{error_kind}}
{{/if}}
{{#if error_message}}
- **错误信息**: {{error_message}}
{{/if}}"#;

const DEFAULT_STATUS_CHANGE_SUBJECT: &str =
    "{{#if available}}✅ 链接恢复{{else}}⚠️ 链接异常{{/if}} - {{link_name}}";

const DEFAULT_STATUS_CHANGE_BODY: &str = r#"**{{message}}**
- **链接名称**: {{link_name}}
- **链接地址**: {{url}}
- **当前状态**: {{#if available}}正常{{else}}异常{{/if}}
- **状态码**: {{#if status_code}}{{status_code}}{{else}}无响应{{/if}}
- **响应时间**: {{response_time_ms}}ms
- **检测时间**: {{checked_at}}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MonitoredLink;
    use crate::notification::alert::Alert;
    use crate::probe::{ErrorKind, ProbeResult};

    fn payload(kind: AlertType, result: ProbeResult) -> AlertPayload {
        let link = MonitoredLink::new(1, 1, "Shop", "https://shop.example.com", 60).unwrap();
        let alert = Alert::new(kind, &link, &result);
        AlertPayload::new(&alert, &link, &result)
    }

    #[test]
    fn test_render_broken() {
        let templates = AlertTemplates::new().unwrap();
        let rendered = templates
            .render(
                AlertType::Broken,
                &payload(
                    AlertType::Broken,
                    ProbeResult::failure("https://shop.example.com", ErrorKind::Timeout, "请求超时"),
                ),
            )
            .unwrap();

        assert_eq!(rendered.subject, "🚨 链接失效 - Shop");
        assert!(rendered.body.contains("连接超时: Shop"));
        assert!(rendered.body.contains("无响应"));
        assert!(rendered.body.contains("TIMEOUT"));
        assert!(rendered.body.contains("请求超时"));
    }

    #[test]
    fn test_render_recovery() {
        let templates = AlertTemplates::new().unwrap();
        let result = ProbeResult::new("https://shop.example.com")
            .with_status_code(200)
            .with_response_time_ms(87);
        let rendered = templates
            .render(AlertType::StatusChange, &payload(AlertType::StatusChange, result))
            .unwrap();

        assert_eq!(rendered.subject, "✅ 链接恢复 - Shop");
        assert!(rendered.body.contains("正常"));
        assert!(rendered.body.contains("87ms"));
        assert!(rendered.body.contains("200"));
    }

    #[test]
    fn test_register_custom_template() {
        let mut templates = AlertTemplates::new().unwrap();
        templates
            .register(AlertType::Broken, "down: {{link_name}}", "{{url}} <{{status_code}}>")
            .unwrap();

        let rendered = templates
            .render(
                AlertType::Broken,
                &payload(
                    AlertType::Broken,
                    ProbeResult::new("https://shop.example.com")
                        .with_status_code(500)
                        .with_error(ErrorKind::HttpError, "HTTP 500"),
                ),
            )
            .unwrap();
        assert_eq!(rendered.subject, "down: Shop");
        assert_eq!(rendered.body, "https://shop.example.com <500>");
    }

    #[test]
    fn test_invalid_template_rejected() {
        let mut templates = AlertTemplates::new().unwrap();
        let result = templates.register(AlertType::Broken, "{{#if available}}oops", "x");
        assert!(matches!(result, Err(NotificationError::TemplateError(_))));
    }
}
