//! 通知节流
//!
//! 按 (所有者, 链接, 告警类型) 记录发送历史，冷却时间随发送次数指数增长，
//! 空闲超过24小时后重新计数

use crate::link::{LinkId, OwnerId};
use crate::notification::alert::AlertType;
use crate::probe::ErrorKind;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// 触发清理的记录数阈值
pub const CLEANUP_THRESHOLD: usize = 1000;

/// 清理时保留的最长空闲天数
pub const RETENTION_DAYS: i64 = 7;

/// 重新计数的空闲小时数
pub const RESET_AFTER_HOURS: i64 = 24;

/// 每条记录保留的最近状态码/错误分类数量
const RECENT_HISTORY: usize = 20;

/// 冷却指数上限，保证 `1i64 << exponent` 不溢出
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// 节流键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ThrottleKey {
    /// 所有者ID
    pub owner_id: OwnerId,
    /// 链接ID
    pub link_id: LinkId,
    /// 告警类型
    pub alert_type: AlertType,
}

impl ThrottleKey {
    /// 创建节流键
    pub fn new(owner_id: OwnerId, link_id: LinkId, alert_type: AlertType) -> Self {
        Self {
            owner_id,
            link_id,
            alert_type,
        }
    }
}

/// 单个键的发送记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    /// 最后发送时间
    pub last_sent: DateTime<Utc>,
    /// 当前计数周期内的发送次数
    pub send_count: u32,
    /// 首次出现时间
    pub first_occurrence: DateTime<Utc>,
    /// 最近的状态码
    pub status_codes: Vec<u16>,
    /// 最近的错误分类
    pub error_kinds: Vec<ErrorKind>,
}

impl NotificationRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_sent: now,
            send_count: 1,
            first_occurrence: now,
            status_codes: Vec::new(),
            error_kinds: Vec::new(),
        }
    }

    fn remember(&mut self, status_code: Option<u16>, error_kind: Option<ErrorKind>) {
        if let Some(code) = status_code {
            push_bounded(&mut self.status_codes, code);
        }
        if let Some(kind) = error_kind {
            push_bounded(&mut self.error_kinds, kind);
        }
    }
}

fn push_bounded<T>(items: &mut Vec<T>, item: T) {
    if items.len() >= RECENT_HISTORY {
        items.remove(0);
    }
    items.push(item);
}

/// 按发送次数计算所需冷却时间：`base × 2^(count-1)`
pub fn required_cooldown(base_minutes: u32, send_count: u32) -> Duration {
    let exponent = send_count.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    Duration::minutes(i64::from(base_minutes).saturating_mul(1i64 << exponent))
}

/// 节流表
///
/// 同步数据结构，由 [`NotificationThrottler`] 加锁访问
#[derive(Debug, Default)]
pub struct ThrottleTable {
    records: HashMap<ThrottleKey, NotificationRecord>,
}

impl ThrottleTable {
    /// 创建空的节流表
    pub fn new() -> Self {
        Self::default()
    }

    /// 判断是否放行，放行时更新记录
    ///
    /// # 参数
    /// * `key` - 节流键
    /// * `base_minutes` - 基础冷却分钟数
    /// * `now` - 当前时间
    /// * `status_code` - 本次检测的状态码
    /// * `error_kind` - 本次检测的错误分类
    ///
    /// # 返回
    /// * `bool` - 是否发送
    pub fn evaluate(
        &mut self,
        key: ThrottleKey,
        base_minutes: u32,
        now: DateTime<Utc>,
        status_code: Option<u16>,
        error_kind: Option<ErrorKind>,
    ) -> bool {
        if self.records.len() > CLEANUP_THRESHOLD {
            self.cleanup(now);
        }

        let Some(record) = self.records.get_mut(&key) else {
            let mut record = NotificationRecord::new(now);
            record.remember(status_code, error_kind);
            self.records.insert(key, record);
            return true;
        };

        let idle = now - record.last_sent;
        if idle > Duration::hours(RESET_AFTER_HOURS) {
            record.send_count = 0;
            record.first_occurrence = now;
        } else {
            let required = required_cooldown(base_minutes, record.send_count);
            if idle < required {
                debug!(
                    "告警处于冷却期: 链接 {} {} (已发送 {} 次, 还需 {} 分钟)",
                    key.link_id,
                    key.alert_type,
                    record.send_count,
                    (required - idle).num_minutes()
                );
                return false;
            }
        }

        record.last_sent = now;
        record.send_count = record.send_count.saturating_add(1);
        record.remember(status_code, error_kind);
        true
    }

    /// 删除空闲超过保留天数的记录
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let cutoff = now - Duration::days(RETENTION_DAYS);
        self.records.retain(|_, record| record.last_sent >= cutoff);
        let removed = before - self.records.len();
        if removed > 0 {
            debug!("清理过期通知记录 {} 条", removed);
        }
        removed
    }

    /// 获取记录
    pub fn record(&self, key: &ThrottleKey) -> Option<&NotificationRecord> {
        self.records.get(key)
    }

    /// 记录数量
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// 通知节流器
#[derive(Debug, Default)]
pub struct NotificationThrottler {
    table: Mutex<ThrottleTable>,
}

impl NotificationThrottler {
    /// 创建通知节流器
    pub fn new() -> Self {
        Self::default()
    }

    /// 判断当前是否应当发送通知
    pub async fn should_notify(
        &self,
        owner_id: OwnerId,
        link_id: LinkId,
        alert_type: AlertType,
        cooldown_minutes: u32,
    ) -> bool {
        self.should_notify_at(owner_id, link_id, alert_type, cooldown_minutes, Utc::now())
            .await
    }

    /// 在指定时间判断是否应当发送通知
    pub async fn should_notify_at(
        &self,
        owner_id: OwnerId,
        link_id: LinkId,
        alert_type: AlertType,
        cooldown_minutes: u32,
        now: DateTime<Utc>,
    ) -> bool {
        self.table.lock().await.evaluate(
            ThrottleKey::new(owner_id, link_id, alert_type),
            cooldown_minutes,
            now,
            None,
            None,
        )
    }

    /// 判断是否放行并记录本次检测的状态码与错误分类
    pub async fn admit(
        &self,
        key: ThrottleKey,
        cooldown_minutes: u32,
        status_code: u16,
        error_kind: Option<ErrorKind>,
    ) -> bool {
        self.table.lock().await.evaluate(
            key,
            cooldown_minutes,
            Utc::now(),
            Some(status_code),
            error_kind,
        )
    }

    /// 获取指定键的发送摘要
    pub async fn summary(
        &self,
        owner_id: OwnerId,
        link_id: LinkId,
        alert_type: AlertType,
    ) -> Option<NotificationRecord> {
        self.table
            .lock()
            .await
            .record(&ThrottleKey::new(owner_id, link_id, alert_type))
            .cloned()
    }

    /// 记录数量
    pub async fn len(&self) -> usize {
        self.table.lock().await.len()
    }

    /// 是否没有任何记录
    pub async fn is_empty(&self) -> bool {
        self.table.lock().await.is_empty()
    }
}
