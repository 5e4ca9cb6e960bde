//! 检测结果数据结构
//!
//! 定义单次链接检测的结果、错误分类以及证书摘要

use crate::link::LinkId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 检测错误分类
///
/// 封闭枚举，重试判断、告警文案和指标统计都对它做穷尽匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// 域名无法解析
    DnsError,
    /// 证书或TLS握手失败
    SslError,
    /// 请求超时
    Timeout,
    /// 重定向异常
    RedirectError,
    /// 协议层失败或状态码 >= 400
    HttpError,
    /// 未知错误
    UnknownError,
}

impl ErrorKind {
    /// 错误分类的标识字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DnsError => "DNS_ERROR",
            ErrorKind::SslError => "SSL_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::RedirectError => "REDIRECT_ERROR",
            ErrorKind::HttpError => "HTTP_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP检测方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    /// HEAD 请求
    Head,
    /// GET 请求
    Get,
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeMethod::Head => write!(f, "HEAD"),
            ProbeMethod::Get => write!(f, "GET"),
        }
    }
}

/// 叶子证书摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// 过期时间
    pub not_after: DateTime<Utc>,
    /// 签发者
    pub issuer: String,
}

impl CertificateInfo {
    /// 距离过期的剩余天数，已过期时为负数
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }
}

/// 判断状态码是否视为可用
pub fn is_available_status(status_code: u16) -> bool {
    (200..400).contains(&status_code)
}

/// 单次检测结果
///
/// 每次检测创建一次，之后只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 结果ID
    pub id: Uuid,
    /// 所属链接ID，执行器直接检测地址时为 None
    pub link_id: Option<LinkId>,
    /// 检测地址
    pub address: String,
    /// HTTP状态码，未获得响应时为 0
    pub status_code: u16,
    /// 响应时间（毫秒），未获得响应时为 0
    pub response_time_ms: u64,
    /// 是否可用（200 <= 状态码 < 400）
    pub available: bool,
    /// 响应的 content-type
    pub content_type: Option<String>,
    /// 跟随重定向后的最终地址
    pub final_url: Option<String>,
    /// 重定向次数
    pub redirect_count: u32,
    /// 实际使用的检测方法
    pub method: Option<ProbeMethod>,
    /// 错误分类
    pub error_kind: Option<ErrorKind>,
    /// 错误信息
    pub error_message: Option<String>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 尝试次数
    pub attempts: u32,
    /// 证书摘要（仅 https 且执行了证书检查时存在）
    pub certificate: Option<CertificateInfo>,
}

impl ProbeResult {
    /// 创建新的检测结果，初始为未获得响应的状态
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            link_id: None,
            address: address.into(),
            status_code: 0,
            response_time_ms: 0,
            available: false,
            content_type: None,
            final_url: None,
            redirect_count: 0,
            method: None,
            error_kind: None,
            error_message: None,
            checked_at: Utc::now(),
            attempts: 1,
            certificate: None,
        }
    }

    /// 创建失败结果，状态码为 0，响应时间为 0
    ///
    /// # 参数
    /// * `address` - 检测地址
    /// * `kind` - 错误分类
    /// * `message` - 错误信息
    pub fn failure(address: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(address).with_error(kind, message)
    }

    /// 设置HTTP状态码，同时根据状态码更新可用状态
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self.available = is_available_status(status_code);
        self
    }

    /// 设置响应时间
    pub fn with_response_time_ms(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    /// 设置错误分类和信息，结果标记为不可用
    ///
    /// 已获得的状态码和响应时间保持不变
    pub fn with_error(mut self, kind: ErrorKind, message: impl Into<String>) -> Self {
        self.available = false;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self
    }

    /// 设置所属链接
    pub fn with_link_id(mut self, link_id: LinkId) -> Self {
        self.link_id = Some(link_id);
        self
    }

    /// 设置 content-type
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    /// 设置重定向信息
    pub fn with_redirects(mut self, final_url: impl Into<String>, redirect_count: u32) -> Self {
        self.final_url = Some(final_url.into());
        self.redirect_count = redirect_count;
        self
    }

    /// 设置检测方法
    pub fn with_method(mut self, method: ProbeMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// 设置尝试次数
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// 设置证书摘要
    pub fn with_certificate(mut self, certificate: Option<CertificateInfo>) -> Self {
        self.certificate = certificate;
        self
    }

    /// 是否记录了有效的响应时间
    pub fn is_timed(&self) -> bool {
        self.response_time_ms > 0
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
