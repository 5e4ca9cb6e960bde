//! 域名解析
//!
//! 在阻塞线程池上执行系统解析器的 A 记录查询，并施加超时

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

/// 默认解析超时
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// 解析失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// 解析超时
    #[error("域名解析超时: {host}")]
    Timeout { host: String },

    /// 没有 IPv4 地址
    #[error("域名没有A记录: {host}")]
    NoRecords { host: String },

    /// 系统解析器返回错误
    #[error("域名无法解析: {host} ({reason})")]
    Lookup { host: String, reason: String },

    /// 阻塞任务异常退出
    #[error("解析任务异常: {0}")]
    Join(String),
}

/// A 记录解析器
#[derive(Debug, Clone)]
pub struct DnsResolver {
    /// 单次解析超时
    timeout: Duration,
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_TIMEOUT)
    }
}

impl DnsResolver {
    /// 创建解析器
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// 解析主机的 IPv4 地址
    ///
    /// # 参数
    /// * `host` - 主机名或IP字面量
    ///
    /// # 返回
    /// * `Result<Vec<Ipv4Addr>, ResolveError>` - 至少包含一个地址
    pub async fn resolve_ipv4(&self, host: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let owned_host = host.to_string();
        let lookup = tokio::task::spawn_blocking(move || {
            (owned_host.as_str(), 0u16)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>())
        });

        let addrs = match timeout(self.timeout, lookup).await {
            Err(_) => {
                return Err(ResolveError::Timeout {
                    host: host.to_string(),
                })
            }
            Ok(Err(join_error)) => return Err(ResolveError::Join(join_error.to_string())),
            Ok(Ok(Err(io_error))) => {
                return Err(ResolveError::Lookup {
                    host: host.to_string(),
                    reason: io_error.to_string(),
                })
            }
            Ok(Ok(Ok(addrs))) => addrs,
        };

        let ipv4: Vec<Ipv4Addr> = addrs
            .into_iter()
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .collect();

        if ipv4.is_empty() {
            return Err(ResolveError::NoRecords {
                host: host.to_string(),
            });
        }

        Ok(ipv4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        let resolver = DnsResolver::default();
        let addrs = resolver.resolve_ipv4("127.0.0.1").await.unwrap();
        assert_eq!(addrs, vec![Ipv4Addr::LOCALHOST]);
    }

    #[tokio::test]
    async fn test_resolve_invalid_tld_fails() {
        let resolver = DnsResolver::default();
        let result = resolver.resolve_ipv4("nonexistent.invalid").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ipv6_literal_has_no_a_record() {
        let resolver = DnsResolver::default();
        let result = resolver.resolve_ipv4("::1").await;
        assert_eq!(
            result,
            Err(ResolveError::NoRecords {
                host: "::1".to_string()
            })
        );
    }
}
