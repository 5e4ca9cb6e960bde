//! 证书检查
//!
//! 使用系统根证书完成TLS握手，解析叶子证书的过期时间和签发者

use crate::probe::result::CertificateInfo;
use chrono::{DateTime, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};
use x509_parser::prelude::parse_x509_certificate;

/// 默认证书检查超时
pub const DEFAULT_TLS_TIMEOUT: Duration = Duration::from_secs(5);

/// 证书检查失败原因
#[derive(Error, Debug)]
pub enum CertificateError {
    /// TLS客户端配置失败
    #[error("TLS配置失败: {0}")]
    Setup(String),

    /// 主机名不能作为 SNI
    #[error("无效的服务器名称: {0}")]
    InvalidName(String),

    /// TCP连接失败
    #[error("连接失败: {0}")]
    Connect(std::io::Error),

    /// 握手失败
    #[error("TLS握手失败: {0}")]
    Handshake(std::io::Error),

    /// 对端未提供证书
    #[error("服务器未提供证书")]
    MissingCertificate,

    /// 证书解析失败
    #[error("证书解析失败: {0}")]
    Parse(String),

    /// 证书已过期
    #[error("证书已于 {not_after} 过期")]
    Expired { not_after: DateTime<Utc> },

    /// 检查超时
    #[error("证书检查超时")]
    Timeout,
}

/// 证书检查器
#[derive(Clone)]
pub struct CertificateInspector {
    /// TLS连接器
    connector: TlsConnector,
    /// 连接加握手的超时
    timeout: Duration,
}

impl std::fmt::Debug for CertificateInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateInspector")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CertificateInspector {
    /// 使用系统根证书创建证书检查器
    ///
    /// 个别系统证书无法加载时只记录日志，不影响创建
    pub fn new(timeout: Duration) -> Result<Self, CertificateError> {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            warn!("加载系统根证书出错: {}", error);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!("已加载系统根证书 {} 个，忽略 {} 个", added, ignored);

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CertificateError::Setup(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }

    /// 检查主机的叶子证书
    ///
    /// # 参数
    /// * `host` - 主机名
    /// * `port` - 端口
    ///
    /// # 返回
    /// * `Result<CertificateInfo, CertificateError>` - 握手失败、超时或证书过期时返回错误
    pub async fn inspect(&self, host: &str, port: u16) -> Result<CertificateInfo, CertificateError> {
        let handshake = async {
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|_| CertificateError::InvalidName(host.to_string()))?;
            let tcp = TcpStream::connect((host, port))
                .await
                .map_err(CertificateError::Connect)?;
            let tls = self
                .connector
                .connect(server_name, tcp)
                .await
                .map_err(CertificateError::Handshake)?;

            let (_, session) = tls.get_ref();
            let leaf = session
                .peer_certificates()
                .and_then(|chain| chain.first())
                .ok_or(CertificateError::MissingCertificate)?;
            parse_certificate(leaf.as_ref())
        };

        let info = timeout(self.timeout, handshake)
            .await
            .map_err(|_| CertificateError::Timeout)??;

        if info.not_after <= Utc::now() {
            return Err(CertificateError::Expired {
                not_after: info.not_after,
            });
        }

        Ok(info)
    }
}

/// 从DER编码解析证书摘要
pub fn parse_certificate(der: &[u8]) -> Result<CertificateInfo, CertificateError> {
    let (_, certificate) =
        parse_x509_certificate(der).map_err(|e| CertificateError::Parse(e.to_string()))?;

    let timestamp = certificate.validity().not_after.timestamp();
    let not_after = DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| CertificateError::Parse(format!("无效的过期时间: {}", timestamp)))?;

    Ok(CertificateInfo {
        not_after,
        issuer: certificate.issuer().to_string(),
    })
}
