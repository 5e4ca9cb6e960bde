//! 监控链接数据结构
//!
//! 定义被监控链接、检测后的状态更新以及链接所有者的通知设置

use crate::error::ValidationError;
use crate::link::validation;
use crate::probe::ProbeResult;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 链接ID
pub type LinkId = i64;

/// 所有者（用户）ID
pub type OwnerId = i64;

/// 最小检测频率（分钟）
pub const MIN_CHECK_FREQUENCY: u32 = 1;

/// 最大检测频率（分钟），即一天
pub const MAX_CHECK_FREQUENCY: u32 = 1440;

/// 被监控的链接
///
/// 链接实体归链接存储所有，引擎只通过 [`CheckUpdate`] 回写
/// 最后检测时间、连续失败次数和最后可用状态，从不创建或删除链接。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredLink {
    /// 链接ID
    pub id: LinkId,
    /// 所有者ID
    pub owner_id: OwnerId,
    /// 显示名称
    pub name: String,
    /// 目标地址
    pub url: String,
    /// 检测频率（分钟，1-1440）
    pub check_frequency: u32,
    /// 是否启用
    pub active: bool,
    /// 最后检测时间
    pub last_checked: Option<DateTime<Utc>>,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 最后已知的可用状态，从未检测过时为 None
    pub last_available: Option<bool>,
}

impl MonitoredLink {
    /// 创建新的监控链接
    ///
    /// # 参数
    /// * `id` - 链接ID
    /// * `owner_id` - 所有者ID
    /// * `name` - 显示名称
    /// * `url` - 目标地址，会先经过清理再校验
    /// * `check_frequency` - 检测频率（分钟）
    ///
    /// # 返回
    /// * `Result<Self, ValidationError>` - 频率超出 [1, 1440] 或URL无效时返回错误
    pub fn new(
        id: LinkId,
        owner_id: OwnerId,
        name: impl Into<String>,
        url: &str,
        check_frequency: u32,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        validation::validate_check_frequency(check_frequency)?;

        let url = validation::sanitize_url(url);
        if !validation::is_valid_url(&url) {
            return Err(ValidationError::InvalidUrl { url });
        }

        Ok(Self {
            id,
            owner_id,
            name,
            url,
            check_frequency,
            active: true,
            last_checked: None,
            consecutive_failures: 0,
            last_available: None,
        })
    }

    /// 设置启用状态
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// 设置最后检测时间
    pub fn with_last_checked(mut self, last_checked: DateTime<Utc>) -> Self {
        self.last_checked = Some(last_checked);
        self
    }

    /// 检测间隔
    pub fn check_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.check_frequency))
    }

    /// 判断链接在给定时间是否需要检测
    ///
    /// 从未检测过的启用链接总是到期；否则当 `now >= last_checked + 频率` 时到期。
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }

        match self.last_checked {
            None => true,
            Some(last_checked) => now >= last_checked + self.check_interval(),
        }
    }

    /// 根据本次检测结果计算新的连续失败次数
    pub fn next_failure_count(&self, available: bool) -> u32 {
        if available {
            0
        } else {
            self.consecutive_failures.saturating_add(1)
        }
    }

    /// 应用检测后的状态更新
    pub fn apply_update(&mut self, update: &CheckUpdate) {
        self.last_checked = Some(update.checked_at);
        self.consecutive_failures = update.consecutive_failures;
        self.last_available = Some(update.available);
    }
}

/// 按检测优先级排序：连续失败次数降序，其次最后检测时间升序（从未检测的排最前）
pub fn prioritize(links: &mut [MonitoredLink]) {
    links.sort_by(|a, b| {
        b.consecutive_failures
            .cmp(&a.consecutive_failures)
            .then_with(|| a.last_checked.cmp(&b.last_checked))
    });
}

/// 单次检测后回写给链接存储的状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckUpdate {
    /// 链接ID
    pub link_id: LinkId,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 新的连续失败次数
    pub consecutive_failures: u32,
    /// 本次检测是否可用
    pub available: bool,
}

impl CheckUpdate {
    /// 由检测前的链接快照和检测结果生成状态更新
    pub fn from_result(link: &MonitoredLink, result: &ProbeResult) -> Self {
        Self {
            link_id: link.id,
            checked_at: result.checked_at,
            consecutive_failures: link.next_failure_count(result.available),
            available: result.available,
        }
    }
}

/// 链接所有者的通知设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSettings {
    /// 所有者ID
    pub owner_id: OwnerId,
    /// 通知联系方式（邮箱、webhook接收人等）
    pub contact: Option<String>,
    /// 是否启用外发通知
    pub notifications_enabled: bool,
    /// 是否接收失效链接告警
    pub broken_links: bool,
    /// 是否接收状态变化告警
    pub status_changes: bool,
}

impl OwnerSettings {
    /// 所有者未配置通知设置时使用的默认值
    pub fn defaults_for(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            contact: None,
            notifications_enabled: true,
            broken_links: true,
            status_changes: true,
        }
    }
}
