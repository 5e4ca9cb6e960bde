//! 通知模块
//!
//! 告警生成、通知节流以及外发通知的发送器和模板

pub mod alert;
pub mod sender;
pub mod template;
pub mod throttler;
pub mod webhook;

pub use alert::{Alert, AlertSink, AlertType, MemoryAlertSink};
pub use sender::{AlertPayload, DeliveryCode, NoOpNotifier, Notifier};
pub use template::AlertTemplates;
pub use throttler::{NotificationRecord, NotificationThrottler, ThrottleKey};
pub use webhook::WebhookNotifier;
