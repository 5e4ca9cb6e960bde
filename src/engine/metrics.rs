//! 运行指标
//!
//! 累计检测次数、成功率、错误计数和增量平均响应时间

use crate::probe::{ErrorKind, ProbeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 调度器运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// 运行中
    Running,
    /// 已停止
    Stopped,
}

/// 按错误分类的计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorKindCounts {
    pub dns_error: u64,
    pub ssl_error: u64,
    pub timeout: u64,
    pub redirect_error: u64,
    pub http_error: u64,
    pub unknown_error: u64,
}

impl ErrorKindCounts {
    /// 按分类加一
    pub fn increment(&mut self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::DnsError => &mut self.dns_error,
            ErrorKind::SslError => &mut self.ssl_error,
            ErrorKind::Timeout => &mut self.timeout,
            ErrorKind::RedirectError => &mut self.redirect_error,
            ErrorKind::HttpError => &mut self.http_error,
            ErrorKind::UnknownError => &mut self.unknown_error,
        };
        *counter += 1;
    }
}

/// 指标状态
///
/// 同步数据结构，由 [`MetricsAggregator`] 加锁访问
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsState {
    /// 最后一次批量检测时间
    pub last_run: Option<DateTime<Utc>>,
    /// 总检测次数
    pub total_checks: u64,
    /// 成功次数
    pub successful_checks: u64,
    /// 失败次数
    pub failed_checks: u64,
    /// 周期错误与任务异常的累计次数
    pub error_count: u64,
    /// 平均响应时间（毫秒），只统计响应时间大于 0 的样本
    pub avg_response_time: f64,
    /// 参与平均响应时间计算的样本数
    pub timed_samples: u64,
    /// 失败检测按错误分类的计数
    pub errors_by_kind: ErrorKindCounts,
}

impl MetricsState {
    /// 合并一批检测结果
    pub fn apply(&mut self, results: &[ProbeResult], now: DateTime<Utc>) {
        self.last_run = Some(now);
        if results.is_empty() {
            return;
        }

        self.total_checks += results.len() as u64;
        for result in results {
            if result.available {
                self.successful_checks += 1;
            } else {
                self.failed_checks += 1;
                if let Some(kind) = result.error_kind {
                    self.errors_by_kind.increment(kind);
                }
            }
        }

        let (timed, sum) = results
            .iter()
            .filter(|result| result.is_timed())
            .fold((0u64, 0u64), |(count, sum), result| {
                (count + 1, sum + result.response_time_ms)
            });
        if timed > 0 {
            let before = self.timed_samples as f64;
            self.avg_response_time =
                (self.avg_response_time * before + sum as f64) / (before + timed as f64);
            self.timed_samples += timed;
        }
    }

    /// 成功率，无检测时为 0
    pub fn success_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.successful_checks as f64 / self.total_checks as f64
        }
    }
}

/// 健康快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// 调度器运行状态
    pub status: RunStatus,
    /// 最后一次批量检测时间
    pub last_run: Option<DateTime<Utc>>,
    /// 总检测次数
    pub total_checks: u64,
    /// 成功次数
    pub successful_checks: u64,
    /// 失败次数
    pub failed_checks: u64,
    /// 成功率
    pub success_rate: f64,
    /// 平均响应时间（毫秒）
    pub avg_response_time: f64,
    /// 错误计数
    pub error_count: u64,
    /// 失败检测按错误分类的计数
    pub errors_by_kind: ErrorKindCounts,
}

/// 指标聚合器
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: RwLock<MetricsState>,
}

impl MetricsAggregator {
    /// 创建指标聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一批检测结果
    pub async fn record_batch(&self, results: &[ProbeResult]) {
        self.state.write().await.apply(results, Utc::now());
    }

    /// 记录错误
    pub async fn record_errors(&self, count: u64) {
        self.state.write().await.error_count += count;
    }

    /// 指标状态副本
    pub async fn state(&self) -> MetricsState {
        self.state.read().await.clone()
    }

    /// 生成健康快照
    ///
    /// # 参数
    /// * `running` - 调度器是否在运行
    pub async fn snapshot(&self, running: bool) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            status: if running {
                RunStatus::Running
            } else {
                RunStatus::Stopped
            },
            last_run: state.last_run,
            total_checks: state.total_checks,
            successful_checks: state.successful_checks,
            failed_checks: state.failed_checks,
            success_rate: state.success_rate(),
            avg_response_time: state.avg_response_time,
            error_count: state.error_count,
            errors_by_kind: state.errors_by_kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(ms: u64) -> ProbeResult {
        ProbeResult::new("https://example.com")
            .with_status_code(200)
            .with_response_time_ms(ms)
    }

    fn failed() -> ProbeResult {
        ProbeResult::failure("https://example.com", ErrorKind::Timeout, "timeout")
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let metrics = MetricsAggregator::new();
        metrics.record_batch(&[ok(100), ok(200), failed()]).await;

        let snapshot = metrics.snapshot(true).await;
        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(snapshot.total_checks, 3);
        assert_eq!(snapshot.successful_checks, 2);
        assert!((snapshot.success_rate - 0.667).abs() < 0.001);
        assert!((snapshot.avg_response_time - 150.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.errors_by_kind.timeout, 1);
        assert!(snapshot.last_run.is_some());
    }

    #[test]
    fn test_incremental_average_across_batches() {
        let mut state = MetricsState::default();
        let now = Utc::now();
        state.apply(&[ok(100), ok(200)], now);
        state.apply(&[ok(600), failed()], now);

        assert_eq!(state.total_checks, 4);
        assert_eq!(state.timed_samples, 3);
        assert!((state.avg_response_time - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_untimed_batch_keeps_average() {
        let mut state = MetricsState::default();
        let now = Utc::now();
        state.apply(&[ok(120)], now);
        state.apply(&[failed(), failed()], now);
        assert!((state.avg_response_time - 120.0).abs() < 1e-9);
        assert_eq!(state.failed_checks, 2);
    }

    #[tokio::test]
    async fn test_empty_snapshot() {
        let metrics = MetricsAggregator::new();
        let snapshot = metrics.snapshot(false).await;
        assert_eq!(snapshot.status, RunStatus::Stopped);
        assert_eq!(snapshot.success_rate, 0.0);
        assert_eq!(snapshot.avg_response_time, 0.0);
        assert!(snapshot.last_run.is_none());
    }

    #[tokio::test]
    async fn test_error_count() {
        let metrics = MetricsAggregator::new();
        metrics.record_errors(1).await;
        metrics.record_errors(2).await;
        assert_eq!(metrics.snapshot(true).await.error_count, 3);
    }

    #[test]
    fn test_snapshot_status_serialization() {
        assert_eq!(serde_json::to_string(&RunStatus::Running).unwrap(), "\"running\"");
    }
}
