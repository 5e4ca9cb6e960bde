//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::error::ValidationError;
use crate::link::validation::{is_valid_url, sanitize_url, validate_check_frequency};
use crate::link::{LinkId, MonitoredLink, OwnerId, OwnerSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

/// 主配置结构，包含全局配置、所有者和链接列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 所有者通知设置
    #[serde(default)]
    pub owners: Vec<OwnerConfig>,
    /// 监控链接
    #[serde(default)]
    pub links: Vec<LinkConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 基础检测间隔（分钟）
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u32,
    /// 子批次并发上限
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 每轮最多检测的链接数
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// 抖动上限（秒）
    #[serde(default = "default_jitter")]
    pub jitter_seconds: u32,
    /// 周期错误的基础退避时间（分钟）
    #[serde(default = "default_error_backoff")]
    pub error_backoff_minutes: u32,
    /// 通知基础冷却时间（分钟）
    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown_minutes: u32,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否检查 https 证书
    #[serde(default = "default_enabled")]
    pub inspect_certificates: bool,
    /// 告警webhook地址，未配置时不外发通知
    pub webhook_url: Option<String>,
    /// Web 服务器配置
    pub web: Option<WebConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: default_check_interval(),
            max_concurrent_checks: default_max_concurrent(),
            max_batch_size: default_max_batch_size(),
            jitter_seconds: default_jitter(),
            error_backoff_minutes: default_error_backoff(),
            notification_cooldown_minutes: default_notification_cooldown(),
            log_level: default_log_level(),
            inspect_certificates: true,
            webhook_url: None,
            web: None,
        }
    }
}

/// Web 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 端口
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl WebConfig {
    /// 解析监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| format!("无效的Web服务器地址 {}:{}: {}", self.bind_address, self.port, e))
    }
}

/// 所有者配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerConfig {
    /// 所有者ID
    pub id: OwnerId,
    /// 通知联系方式
    pub contact: Option<String>,
    /// 是否启用外发通知
    #[serde(default = "default_enabled")]
    pub notifications_enabled: bool,
    /// 是否接收失效告警
    #[serde(default = "default_enabled")]
    pub broken_links: bool,
    /// 是否接收状态变化告警
    #[serde(default = "default_enabled")]
    pub status_changes: bool,
}

impl OwnerConfig {
    /// 转换为通知设置
    pub fn to_settings(&self) -> OwnerSettings {
        OwnerSettings {
            owner_id: self.id,
            contact: self.contact.clone().filter(|c| !c.trim().is_empty()),
            notifications_enabled: self.notifications_enabled,
            broken_links: self.broken_links,
            status_changes: self.status_changes,
        }
    }
}

/// 链接配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// 链接ID
    pub id: LinkId,
    /// 所有者ID
    pub owner_id: OwnerId,
    /// 显示名称
    pub name: String,
    /// 目标地址
    pub url: String,
    /// 检测频率（分钟）
    #[serde(default = "default_check_frequency")]
    pub check_frequency: u32,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub active: bool,
}

impl LinkConfig {
    /// 转换为监控链接
    pub fn to_link(&self) -> Result<MonitoredLink, ValidationError> {
        Ok(
            MonitoredLink::new(self.id, self.owner_id, &self.name, &self.url, self.check_frequency)?
                .with_active(self.active),
        )
    }
}

// 默认值函数
fn default_check_interval() -> u32 {
    60
}
fn default_max_concurrent() -> usize {
    10
}
fn default_max_batch_size() -> usize {
    100
}
fn default_jitter() -> u32 {
    30
}
fn default_error_backoff() -> u32 {
    5
}
fn default_notification_cooldown() -> u32 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_enabled() -> bool {
    true
}
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_web_port() -> u16 {
    8080
}
fn default_check_frequency() -> u32 {
    60
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    let positives = [
        ("检测间隔", global.check_interval_minutes as usize),
        ("最大并发检测数", global.max_concurrent_checks),
        ("每轮最大检测数", global.max_batch_size),
        ("抖动时间", global.jitter_seconds as usize),
        ("错误退避时间", global.error_backoff_minutes as usize),
        ("通知冷却时间", global.notification_cooldown_minutes as usize),
    ];
    for (name, value) in positives {
        if value == 0 {
            return Err(format!("{}不能为0", name));
        }
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    if let Some(ref webhook_url) = global.webhook_url {
        if !is_valid_url(webhook_url) {
            return Err(format!("无效的webhook地址: {}", webhook_url));
        }
    }

    // 验证Web配置（如果启用）
    if let Some(ref web_config) = global.web {
        if web_config.enabled {
            if web_config.port == 0 {
                return Err("无效的Web服务器端口: 0".to_string());
            }
            if web_config.bind_address.is_empty() {
                return Err("Web服务器绑定地址不能为空".to_string());
            }
            web_config.socket_addr()?;
        }
    }

    let mut owner_ids = HashSet::new();
    for owner in &config.owners {
        if !owner_ids.insert(owner.id) {
            return Err(format!("所有者ID重复: {}", owner.id));
        }
    }

    let mut link_ids = HashSet::new();
    for link in &config.links {
        if !link_ids.insert(link.id) {
            return Err(format!("链接ID重复: {}", link.id));
        }
        if link.name.trim().is_empty() {
            return Err(format!("链接 {} 的名称不能为空", link.id));
        }
        if !is_valid_url(&sanitize_url(&link.url)) {
            return Err(format!("链接 {} 的URL格式无效: {}", link.name, link.url));
        }
        validate_check_frequency(link.check_frequency)
            .map_err(|e| format!("链接 {}: {}", link.name, e))?;
    }

    Ok(())
}
