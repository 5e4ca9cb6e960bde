//! 链接检测执行器
//!
//! 单次检测依次执行域名校验、证书检查（仅 https）和 HTTP 探测，
//! 所有失败都记录在 [`ProbeResult`] 中，从不向上传播

use crate::link::validation;
use crate::probe::dns::{DnsResolver, DEFAULT_DNS_TIMEOUT};
use crate::probe::result::{CertificateInfo, ErrorKind, ProbeMethod, ProbeResult};
use crate::probe::tls::{CertificateInspector, DEFAULT_TLS_TIMEOUT};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect, Client, Method, Response, Url};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// 检测执行器trait
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// 检测一个地址
    ///
    /// # 参数
    /// * `address` - 目标地址
    ///
    /// # 返回
    /// * `ProbeResult` - 检测结果，失败信息包含在结果中
    async fn probe(&self, address: &str) -> ProbeResult;
}

/// 检测参数
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// HTTP阶段的绝对超时（含方法回退和重定向）
    pub request_timeout: Duration,
    /// 域名解析超时
    pub dns_timeout: Duration,
    /// 证书检查超时
    pub tls_timeout: Duration,
    /// 最大重定向次数
    pub max_redirects: u32,
    /// 是否检查 https 证书
    pub inspect_certificates: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            tls_timeout: DEFAULT_TLS_TIMEOUT,
            max_redirects: 10,
            inspect_certificates: true,
        }
    }
}

/// HTTP阶段的失败
#[derive(Debug)]
enum HttpFailure {
    /// 请求未获得响应
    Request(reqwest::Error),
    /// 超过重定向上限
    TooManyRedirects { limit: u32 },
    /// 重定向目标无法解析
    BadLocation { status: u16, location: String },
}

/// HTTP阶段的结果
struct HttpOutcome {
    response: Response,
    method: ProbeMethod,
    final_url: Url,
    redirects: u32,
}

/// 基于 reqwest 的检测执行器
#[derive(Debug, Clone)]
pub struct HttpProbeExecutor {
    /// HTTP客户端，关闭自动重定向
    client: Client,
    /// 域名解析器
    resolver: DnsResolver,
    /// 证书检查器
    inspector: Option<CertificateInspector>,
    /// 检测参数
    settings: ProbeSettings,
}

impl HttpProbeExecutor {
    /// 创建新的检测执行器
    ///
    /// # 参数
    /// * `settings` - 检测参数
    ///
    /// # 返回
    /// * `anyhow::Result<Self>` - HTTP客户端或TLS配置失败时返回错误
    pub fn new(settings: ProbeSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(settings.request_timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        let inspector = if settings.inspect_certificates {
            Some(CertificateInspector::new(settings.tls_timeout)?)
        } else {
            None
        };

        Ok(Self {
            client,
            resolver: DnsResolver::new(settings.dns_timeout),
            inspector,
            settings,
        })
    }

    /// 检测参数
    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// 发送请求并手动跟随重定向
    async fn follow(&self, method: Method, url: &Url) -> Result<(Response, Url, u32), HttpFailure> {
        let mut current = url.clone();
        let mut redirects = 0u32;

        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .send()
                .await
                .map_err(HttpFailure::Request)?;

            let status = response.status();
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let Some(location) = location.filter(|_| status.is_redirection()) else {
                return Ok((response, current, redirects));
            };

            if redirects >= self.settings.max_redirects {
                return Err(HttpFailure::TooManyRedirects {
                    limit: self.settings.max_redirects,
                });
            }

            current = current.join(&location).map_err(|_| HttpFailure::BadLocation {
                status: status.as_u16(),
                location: location.clone(),
            })?;
            redirects += 1;
            debug!("跟随重定向 #{} -> {}", redirects, current);
        }
    }

    /// HEAD 优先，未获得响应时回退到 GET
    async fn perform_http(&self, url: &Url) -> Result<HttpOutcome, HttpFailure> {
        match self.follow(Method::HEAD, url).await {
            Ok((response, final_url, redirects)) => Ok(HttpOutcome {
                response,
                method: ProbeMethod::Head,
                final_url,
                redirects,
            }),
            Err(HttpFailure::Request(head_error)) => {
                debug!("HEAD 请求失败，回退到 GET: {} ({})", url, head_error);
                let (response, final_url, redirects) = self.follow(Method::GET, url).await?;
                Ok(HttpOutcome {
                    response,
                    method: ProbeMethod::Get,
                    final_url,
                    redirects,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// 将获得的响应转换为检测结果
    fn response_result(
        address: &str,
        outcome: HttpOutcome,
        elapsed: Duration,
        certificate: Option<CertificateInfo>,
    ) -> ProbeResult {
        let status_code = outcome.response.status().as_u16();
        let content_type = outcome
            .response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let result = ProbeResult::new(address)
            .with_status_code(status_code)
            .with_response_time_ms(elapsed.as_millis() as u64)
            .with_content_type(content_type)
            .with_redirects(outcome.final_url.as_str(), outcome.redirects)
            .with_method(outcome.method)
            .with_certificate(certificate);

        if result.available {
            result
        } else {
            let reason = outcome
                .response
                .status()
                .canonical_reason()
                .unwrap_or("Unknown");
            result.with_error(
                ErrorKind::HttpError,
                format!("HTTP {} {}", status_code, reason),
            )
        }
    }

    /// 将HTTP阶段失败转换为检测结果
    fn failure_result(address: &str, failure: HttpFailure) -> ProbeResult {
        match failure {
            HttpFailure::TooManyRedirects { limit } => ProbeResult::failure(
                address,
                ErrorKind::RedirectError,
                format!("重定向次数超过上限 {}", limit),
            ),
            HttpFailure::BadLocation { status, location } => ProbeResult::failure(
                address,
                ErrorKind::RedirectError,
                format!("无效的重定向地址 (HTTP {}): {}", status, location),
            ),
            HttpFailure::Request(error) => {
                let (kind, message) = classify_request_error(&error);
                let result = ProbeResult::failure(address, kind, message);
                match error.status() {
                    Some(status) => ProbeResult {
                        status_code: status.as_u16(),
                        ..result
                    },
                    None => result,
                }
            }
        }
    }
}

/// 对 reqwest 错误分类
fn classify_request_error(error: &reqwest::Error) -> (ErrorKind, String) {
    if error.is_timeout() {
        (ErrorKind::Timeout, "请求超时".to_string())
    } else if error.is_redirect() {
        (ErrorKind::RedirectError, format!("重定向失败: {}", error))
    } else if error.is_builder() {
        (ErrorKind::UnknownError, format!("无法构建请求: {}", error))
    } else if error.is_connect() {
        (ErrorKind::HttpError, format!("连接失败: {}", error))
    } else if let Some(status) = error.status() {
        (
            ErrorKind::HttpError,
            format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            ),
        )
    } else {
        (ErrorKind::HttpError, format!("请求失败: {}", error))
    }
}

#[async_trait]
impl ProbeExecutor for HttpProbeExecutor {
    async fn probe(&self, address: &str) -> ProbeResult {
        let Ok(url) = Url::parse(address) else {
            return ProbeResult::failure(address, ErrorKind::DnsError, "无法解析地址中的域名");
        };
        let Some(host) = validation::extract_host(address) else {
            return ProbeResult::failure(address, ErrorKind::DnsError, "地址缺少域名");
        };

        if let Err(e) = self.resolver.resolve_ipv4(&host).await {
            debug!("域名校验失败: {}", e);
            return ProbeResult::failure(address, ErrorKind::DnsError, e.to_string());
        }

        let certificate = match (&self.inspector, url.scheme()) {
            (Some(inspector), "https") => {
                let port = url.port_or_known_default().unwrap_or(443);
                match inspector.inspect(&host, port).await {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!("证书检查失败: {} ({})", address, e);
                        return ProbeResult::failure(address, ErrorKind::SslError, e.to_string());
                    }
                }
            }
            _ => None,
        };

        let started = Instant::now();
        match timeout(self.settings.request_timeout, self.perform_http(&url)).await {
            Ok(Ok(outcome)) => Self::response_result(address, outcome, started.elapsed(), certificate),
            Ok(Err(failure)) => Self::failure_result(address, failure).with_certificate(certificate),
            Err(_) => ProbeResult::failure(
                address,
                ErrorKind::Timeout,
                format!("请求超过 {} 秒未完成", self.settings.request_timeout.as_secs()),
            )
            .with_certificate(certificate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_executor() -> HttpProbeExecutor {
        HttpProbeExecutor::new(ProbeSettings {
            inspect_certificates: false,
            ..ProbeSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
        assert_eq!(settings.dns_timeout, Duration::from_secs(5));
        assert_eq!(settings.tls_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_redirects, 10);
    }

    #[tokio::test]
    async fn test_unparseable_address_is_dns_error() {
        let result = create_executor().probe("not a url").await;
        assert_eq!(result.error_kind, Some(ErrorKind::DnsError));
        assert_eq!(result.status_code, 0);
        assert!(!result.available);
    }

    #[tokio::test]
    async fn test_refused_connection_is_http_error_without_status() {
        let result = create_executor().probe("http://127.0.0.1:1/").await;
        assert_eq!(result.error_kind, Some(ErrorKind::HttpError));
        assert_eq!(result.status_code, 0);
        assert_eq!(result.response_time_ms, 0);
    }

    #[test]
    fn test_too_many_redirects_message() {
        let result = HttpProbeExecutor::failure_result(
            "http://a",
            HttpFailure::TooManyRedirects { limit: 10 },
        );
        assert_eq!(result.error_kind, Some(ErrorKind::RedirectError));
        assert_eq!(result.status_code, 0);
    }
}
