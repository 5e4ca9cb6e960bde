//! 链接校验
//!
//! 创建监控链接前对URL进行清理和格式校验，并检查检测频率范围

use crate::error::ValidationError;
use crate::link::model::{MAX_CHECK_FREQUENCY, MIN_CHECK_FREQUENCY};
use reqwest::Url;

/// 校验检测频率是否在 [1, 1440] 分钟内
pub fn validate_check_frequency(value: u32) -> Result<(), ValidationError> {
    if (MIN_CHECK_FREQUENCY..=MAX_CHECK_FREQUENCY).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidFrequency { value })
    }
}

/// 清理URL
///
/// 去除首尾空白和不安全字符，缺少协议时默认补全为 https
pub fn sanitize_url(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '\\') && !c.is_control())
        .collect();

    if cleaned.is_empty() || cleaned.contains("://") {
        cleaned
    } else {
        format!("https://{}", cleaned)
    }
}

/// 判断URL是否为可检测的 http/https 地址
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https")
                && parsed.host_str().is_some_and(|host| !host.is_empty())
        }
        Err(_) => false,
    }
}

/// 提取URL中的主机名，IPv6 字面量去掉方括号
pub fn extract_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
}
