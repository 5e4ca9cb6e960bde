//! 重试策略
//!
//! 仅对瞬时错误（超时、无响应或 5xx）做有限次数的指数退避重试

use crate::probe::executor::ProbeExecutor;
use crate::probe::result::{ErrorKind, ProbeResult};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 首次重试的等待时间，之后每次翻倍
    pub base_delay: Duration,
    /// 总耗时上限，等待会越过上限的重试不再发起
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 创建重试策略
    pub fn new(max_attempts: u32, base_delay: Duration, max_elapsed: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_elapsed,
        }
    }

    /// 第 `attempt` 次尝试失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// 判断失败结果是否值得重试
    pub fn is_retryable(result: &ProbeResult) -> bool {
        if result.available {
            return false;
        }

        match result.error_kind {
            Some(ErrorKind::Timeout) => true,
            Some(ErrorKind::HttpError) => result.status_code == 0 || result.status_code >= 500,
            Some(ErrorKind::DnsError)
            | Some(ErrorKind::SslError)
            | Some(ErrorKind::RedirectError)
            | Some(ErrorKind::UnknownError)
            | None => false,
        }
    }

    /// 按策略执行检测
    ///
    /// # 参数
    /// * `operation` - 每次调用执行一次检测
    ///
    /// # 返回
    /// * `ProbeResult` - 最后一次检测结果，带实际尝试次数
    pub async fn run<F, Fut>(&self, mut operation: F) -> ProbeResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProbeResult>,
    {
        let started = Instant::now();
        let mut attempt = 1;

        loop {
            let result = operation().await;

            if attempt >= self.max_attempts || !Self::is_retryable(&result) {
                return result.with_attempts(attempt);
            }

            let delay = self.delay_for(attempt);
            if started.elapsed() + delay > self.max_elapsed {
                debug!(
                    "重试等待将超过总耗时上限，停止重试: {} (第 {} 次)",
                    result.address, attempt
                );
                return result.with_attempts(attempt);
            }

            debug!(
                "检测失败，{}ms 后重试: {} (第 {} 次, {:?})",
                delay.as_millis(),
                result.address,
                attempt,
                result.error_kind
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// 带重试的检测器
#[derive(Clone)]
pub struct RetryingProbe {
    /// 底层执行器
    executor: Arc<dyn ProbeExecutor>,
    /// 重试策略
    policy: RetryPolicy,
}

impl RetryingProbe {
    /// 创建带重试的检测器
    pub fn new(executor: Arc<dyn ProbeExecutor>, policy: RetryPolicy) -> Self {
        Self { executor, policy }
    }

    /// 重试策略
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 检测一个地址，瞬时失败按策略重试
    pub async fn check(&self, address: &str) -> ProbeResult {
        self.policy.run(|| self.executor.probe(address)).await
    }
}
