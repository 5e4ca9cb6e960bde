//! 链接检测调度器
//!
//! 单实例运行循环：选择到期链接 → 分批检测 → 上报 → 带抖动休眠。
//! 周期内的错误和 panic 都会被捕获，按连续错误次数指数退避，循环本身不会退出。

use crate::config::GlobalConfig;
use crate::engine::batch::{BatchCoordinator, CheckedLink, SubBatchHandler};
use crate::engine::metrics::{HealthSnapshot, MetricsAggregator};
use crate::engine::report::Reporter;
use crate::link::LinkStore;
use crate::notification::{AlertSink, NotificationThrottler, Notifier};
use crate::probe::{ProbeExecutor, RetryPolicy, RetryingProbe};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::Rng;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// 调度器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    /// 尚未启动
    Idle,
    /// 查询到期链接
    Selecting,
    /// 检测子批次
    Checking,
    /// 上报子批次结果
    Reporting,
    /// 等待下一轮
    Sleeping,
    /// 已停止
    Stopped,
}

/// 调度参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// 基础检测间隔
    pub check_interval: Duration,
    /// 子批次并发上限
    pub max_concurrent_checks: usize,
    /// 每轮最多检测的链接数
    pub max_batch_size: usize,
    /// 抖动上限
    pub jitter: Duration,
    /// 周期错误的基础退避时间
    pub error_backoff: Duration,
    /// 通知基础冷却时间（分钟）
    pub notification_cooldown_minutes: u32,
    /// 单个链接的重试策略
    pub retry: RetryPolicy,
}

impl SchedulerConfig {
    /// 由全局配置生成调度参数
    pub fn from_global(global: &GlobalConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(u64::from(global.check_interval_minutes) * 60),
            max_concurrent_checks: global.max_concurrent_checks,
            max_batch_size: global.max_batch_size,
            jitter: Duration::from_secs(u64::from(global.jitter_seconds)),
            error_backoff: Duration::from_secs(u64::from(global.error_backoff_minutes) * 60),
            notification_cooldown_minutes: global.notification_cooldown_minutes,
            retry: RetryPolicy::default(),
        }
    }

    /// 第 n 次连续周期错误后的退避时间：`min(backoff × 2^(n-1), interval)`
    pub fn cycle_backoff(&self, consecutive_errors: u32) -> Duration {
        // 指数上限保证 `1u32 << exponent` 不溢出
        let exponent = consecutive_errors.saturating_sub(1).min(16);
        self.error_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.check_interval)
    }

    /// 正常周期结束后的休眠时间：间隔 ± 随机抖动，不小于 0
    pub fn next_sleep(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as i64;
        let offset = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(-jitter_ms..=jitter_ms)
        };
        let base_ms = self.check_interval.as_millis() as i64;
        Duration::from_millis((base_ms + offset).max(0) as u64)
    }
}

/// 调度器依赖的协作组件
pub struct SchedulerDeps {
    /// 链接存储
    pub store: Arc<dyn LinkStore>,
    /// 检测执行器
    pub executor: Arc<dyn ProbeExecutor>,
    /// 告警接收器
    pub alert_sink: Arc<dyn AlertSink>,
    /// 通知发送器
    pub notifier: Arc<dyn Notifier>,
    /// 通知节流器
    pub throttler: Arc<NotificationThrottler>,
}

/// 一轮检测的摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 选中的到期链接数
    pub selected: usize,
    /// 完成检测的链接数
    pub checked: usize,
    /// 各子批次大小
    pub sub_batches: Vec<usize>,
    /// 是否因停止信号提前结束
    pub interrupted: bool,
    /// 耗时（毫秒）
    pub duration_ms: u64,
}

/// 对外暴露的调度器控制接口
#[async_trait]
pub trait MonitorHandle: Send + Sync {
    /// 健康快照
    async fn health(&self) -> HealthSnapshot;

    /// 立即执行一轮检测
    async fn trigger_check(&self) -> anyhow::Result<CycleSummary>;
}

/// 链接检测调度器
pub struct LinkScheduler {
    /// 调度参数
    config: SchedulerConfig,
    /// 链接存储
    store: Arc<dyn LinkStore>,
    /// 带重试的检测器
    probe: Arc<RetryingProbe>,
    /// 批量检测协调器
    coordinator: BatchCoordinator,
    /// 结果上报器
    reporter: Reporter,
    /// 指标聚合器
    metrics: Arc<MetricsAggregator>,
    /// 当前阶段
    phase: RwLock<SchedulerPhase>,
    /// 停止信号
    stop_tx: watch::Sender<bool>,
    /// 周期锁，循环和手动触发互斥
    cycle_lock: Mutex<()>,
    /// 运行循环任务
    task: Mutex<Option<JoinHandle<()>>>,
    /// 连续周期错误次数
    consecutive_errors: AtomicU32,
}

impl LinkScheduler {
    /// 创建调度器
    ///
    /// # 参数
    /// * `config` - 调度参数
    /// * `deps` - 协作组件
    ///
    /// # 返回
    /// * `Self` - 调度器实例，需要调用 [`LinkScheduler::start`] 启动
    pub fn new(config: SchedulerConfig, deps: SchedulerDeps) -> Self {
        let metrics = Arc::new(MetricsAggregator::new());
        let reporter = Reporter::new(
            Arc::clone(&deps.store),
            deps.alert_sink,
            deps.notifier,
            deps.throttler,
            Arc::clone(&metrics),
            config.notification_cooldown_minutes,
        );
        let (stop_tx, _) = watch::channel(false);

        Self {
            coordinator: BatchCoordinator::new(config.max_concurrent_checks, config.jitter),
            probe: Arc::new(RetryingProbe::new(deps.executor, config.retry)),
            store: deps.store,
            reporter,
            metrics,
            phase: RwLock::new(SchedulerPhase::Idle),
            stop_tx,
            cycle_lock: Mutex::new(()),
            task: Mutex::new(None),
            consecutive_errors: AtomicU32::new(0),
            config,
        }
    }

    /// 调度参数
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// 当前阶段
    pub async fn phase(&self) -> SchedulerPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: SchedulerPhase) {
        *self.phase.write().await = phase;
    }

    /// 运行循环是否存活
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 当前连续周期错误次数
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// 启动运行循环
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            anyhow::bail!("调度器已在运行");
        }

        self.stop_tx.send_replace(false);
        self.consecutive_errors.store(0, Ordering::SeqCst);

        info!(
            "启动链接检测调度器，检测间隔: {}秒，并发: {}，每轮上限: {}",
            self.config.check_interval.as_secs(),
            self.config.max_concurrent_checks,
            self.config.max_batch_size
        );

        let scheduler = Arc::clone(self);
        *task = Some(tokio::spawn(async move { scheduler.run_loop().await }));
        Ok(())
    }

    /// 停止运行循环
    ///
    /// 正在检测的子批次会完成并上报，剩余子批次不再执行
    pub async fn stop(&self) -> anyhow::Result<()> {
        info!("停止链接检测调度器");
        self.stop_tx.send_replace(true);

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            handle.await.context("等待调度循环退出失败")?;
        }

        self.set_phase(SchedulerPhase::Stopped).await;
        info!("链接检测调度器已停止");
        Ok(())
    }

    /// 健康快照
    pub async fn health(&self) -> HealthSnapshot {
        let running = self.is_running().await;
        self.metrics.snapshot(running).await
    }

    /// 指标聚合器
    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// 立即执行一轮检测，不影响运行循环的计时
    ///
    /// 手动周期使用独立的停止信号，运行循环停止后仍会完整执行
    pub async fn trigger_check(&self) -> anyhow::Result<CycleSummary> {
        info!("手动触发链接检测");
        let previous = self.phase().await;
        let (_manual_tx, mut stop_rx) = watch::channel(false);

        let outcome = AssertUnwindSafe(self.run_cycle(&mut stop_rx))
            .catch_unwind()
            .await;

        self.restore_phase(previous).await;
        match outcome {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(e)) => {
                self.metrics.record_errors(1).await;
                Err(e)
            }
            Err(_) => {
                self.metrics.record_errors(1).await;
                anyhow::bail!("手动检测周期内发生panic")
            }
        }
    }

    /// 手动周期结束后恢复阶段，循环已推进阶段时不覆盖
    async fn restore_phase(&self, previous: SchedulerPhase) {
        let mut phase = self.phase.write().await;
        if matches!(
            *phase,
            SchedulerPhase::Selecting | SchedulerPhase::Checking | SchedulerPhase::Reporting
        ) {
            *phase = previous;
        }
    }

    async fn run_loop(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let outcome = AssertUnwindSafe(self.run_cycle(&mut stop_rx))
                .catch_unwind()
                .await;

            let delay = match outcome {
                Ok(Ok(summary)) => {
                    self.consecutive_errors.store(0, Ordering::SeqCst);
                    info!(
                        "本轮检测完成，检测链接: {}，耗时: {}ms",
                        summary.checked, summary.duration_ms
                    );
                    self.config.next_sleep()
                }
                Ok(Err(e)) => self.handle_cycle_error(&format!("{:#}", e)).await,
                Err(_) => self.handle_cycle_error("检测周期内发生panic").await,
            };

            if *stop_rx.borrow() {
                break;
            }

            self.set_phase(SchedulerPhase::Sleeping).await;
            debug!("下一轮检测将在 {:.1} 分钟后开始", delay.as_secs_f64() / 60.0);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop_rx.changed() => {}
            }
        }

        self.set_phase(SchedulerPhase::Stopped).await;
        info!("调度循环已退出");
    }

    /// 记录周期错误并返回退避时间
    async fn handle_cycle_error(&self, message: &str) -> Duration {
        let count = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.record_errors(1).await;

        let backoff = self.config.cycle_backoff(count);
        error!("检测周期出错 (连续第 {} 次): {}", count, message);
        warn!("退避 {:.1} 分钟后重试", backoff.as_secs_f64() / 60.0);
        backoff
    }

    async fn run_cycle(&self, stop_rx: &mut watch::Receiver<bool>) -> anyhow::Result<CycleSummary> {
        let _guard = self.cycle_lock.lock().await;
        let started = tokio::time::Instant::now();
        let started_at = Utc::now();

        self.set_phase(SchedulerPhase::Selecting).await;
        let links = self
            .store
            .list_due_links(started_at, self.config.max_batch_size)
            .await
            .context("查询到期链接失败")?;

        if links.is_empty() {
            info!("当前没有需要检测的链接");
            return Ok(CycleSummary {
                started_at,
                selected: 0,
                checked: 0,
                sub_batches: Vec::new(),
                interrupted: false,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        let selected = links.len();
        info!("开始检测 {} 个链接", selected);
        self.set_phase(SchedulerPhase::Checking).await;
        let report = self
            .coordinator
            .run(links, &self.probe, self, stop_rx)
            .await?;

        if report.failed_tasks > 0 {
            self.metrics.record_errors(report.failed_tasks as u64).await;
        }

        Ok(CycleSummary {
            started_at,
            selected,
            checked: report.checked,
            sub_batches: report.sub_batches,
            interrupted: report.interrupted,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl SubBatchHandler for LinkScheduler {
    async fn handle(&self, checked: Vec<CheckedLink>) -> anyhow::Result<()> {
        self.set_phase(SchedulerPhase::Reporting).await;
        let outcome = self.reporter.report(checked).await;
        self.set_phase(SchedulerPhase::Checking).await;
        outcome
    }
}

#[async_trait]
impl MonitorHandle for LinkScheduler {
    async fn health(&self) -> HealthSnapshot {
        LinkScheduler::health(self).await
    }

    async fn trigger_check(&self) -> anyhow::Result<CycleSummary> {
        LinkScheduler::trigger_check(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_config() -> SchedulerConfig {
        SchedulerConfig {
            check_interval: Duration::from_secs(60 * 60),
            max_concurrent_checks: 10,
            max_batch_size: 100,
            jitter: Duration::from_secs(30),
            error_backoff: Duration::from_secs(5 * 60),
            notification_cooldown_minutes: 30,
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn test_cycle_backoff_escalates_then_caps() {
        let config = create_config();
        assert_eq!(config.cycle_backoff(1), Duration::from_secs(5 * 60));
        assert_eq!(config.cycle_backoff(2), Duration::from_secs(10 * 60));
        assert_eq!(config.cycle_backoff(3), Duration::from_secs(20 * 60));
        assert_eq!(config.cycle_backoff(4), Duration::from_secs(40 * 60));
        assert_eq!(config.cycle_backoff(5), Duration::from_secs(60 * 60));
        assert_eq!(config.cycle_backoff(50), Duration::from_secs(60 * 60));
        assert_eq!(config.cycle_backoff(u32::MAX), Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_next_sleep_within_jitter() {
        let config = create_config();
        for _ in 0..100 {
            let delay = config.next_sleep();
            assert!(delay >= Duration::from_secs(60 * 60 - 30));
            assert!(delay <= Duration::from_secs(60 * 60 + 30));
        }

        let exact = SchedulerConfig {
            jitter: Duration::ZERO,
            ..create_config()
        };
        assert_eq!(exact.next_sleep(), Duration::from_secs(60 * 60));
    }

    #[test]
    fn test_next_sleep_never_negative() {
        let config = SchedulerConfig {
            check_interval: Duration::from_secs(1),
            jitter: Duration::from_secs(30),
            ..create_config()
        };
        for _ in 0..100 {
            assert!(config.next_sleep() <= Duration::from_secs(31));
        }
    }

    #[test]
    fn test_from_global_defaults() {
        let config = SchedulerConfig::from_global(&GlobalConfig::default());
        assert_eq!(config.check_interval, Duration::from_secs(60 * 60));
        assert_eq!(config.max_concurrent_checks, 10);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.jitter, Duration::from_secs(30));
        assert_eq!(config.error_backoff, Duration::from_secs(5 * 60));
        assert_eq!(config.notification_cooldown_minutes, 30);
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&SchedulerPhase::Sleeping).unwrap(),
            "\"sleeping\""
        );
    }
}
