//! 链接检测模块
//!
//! 包含检测执行器、域名解析、证书检查、重试策略和检测结果类型

pub mod dns;
pub mod executor;
pub mod result;
pub mod retry;
pub mod tls;

pub use executor::{HttpProbeExecutor, ProbeExecutor, ProbeSettings};
pub use result::{CertificateInfo, ErrorKind, ProbeMethod, ProbeResult};
pub use retry::{RetryPolicy, RetryingProbe};
