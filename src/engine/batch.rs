//! 批量检测协调
//!
//! 将到期链接按并发上限切分为子批次，子批次内并行检测，
//! 子批次之间插入随机抖动延迟

use crate::link::MonitoredLink;
use crate::probe::{ProbeResult, RetryingProbe};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// 一次检测完成的链接及其结果
#[derive(Debug, Clone)]
pub struct CheckedLink {
    /// 检测前的链接快照
    pub link: MonitoredLink,
    /// 检测结果
    pub result: ProbeResult,
}

/// 子批次结果处理trait
#[async_trait]
pub trait SubBatchHandler: Send + Sync {
    /// 处理一个子批次的全部结果
    ///
    /// 返回错误时协调器立即结束本轮批量检测
    async fn handle(&self, checked: Vec<CheckedLink>) -> anyhow::Result<()>;
}

/// 批量检测报告
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 已执行的各子批次大小
    pub sub_batches: Vec<usize>,
    /// 插入的抖动延迟次数
    pub jitter_delays: usize,
    /// 完成检测的链接数
    pub checked: usize,
    /// 异常退出的检测任务数
    pub failed_tasks: usize,
    /// 是否因停止信号提前结束
    pub interrupted: bool,
}

/// 按宽度切分子批次
pub fn plan_sub_batches(links: Vec<MonitoredLink>, width: usize) -> Vec<Vec<MonitoredLink>> {
    let width = width.max(1);
    let mut batches = Vec::with_capacity(links.len().div_ceil(width));
    let mut iter = links.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(width).collect());
    }
    batches
}

/// 批量检测协调器
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    /// 子批次并发上限
    max_concurrent: usize,
    /// 子批次之间的最大抖动
    jitter_ceiling: Duration,
}

impl BatchCoordinator {
    /// 创建协调器
    ///
    /// # 参数
    /// * `max_concurrent` - 子批次并发上限
    /// * `jitter_ceiling` - 子批次之间抖动延迟的上限
    pub fn new(max_concurrent: usize, jitter_ceiling: Duration) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            jitter_ceiling,
        }
    }

    /// 在 [0, 上限] 内随机选择抖动延迟
    fn jitter_delay(&self) -> Duration {
        let ceiling_ms = self.jitter_ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }

    /// 并行检测一个子批次
    ///
    /// 异常退出的任务记录日志后计入返回的失败数
    pub async fn check_sub_batch(
        &self,
        probe: &Arc<RetryingProbe>,
        links: Vec<MonitoredLink>,
    ) -> (Vec<CheckedLink>, usize) {
        let mut tasks = JoinSet::new();
        for link in links {
            let probe = Arc::clone(probe);
            tasks.spawn(async move {
                let result = probe.check(&link.url).await.with_link_id(link.id);
                CheckedLink { link, result }
            });
        }

        let mut checked = Vec::with_capacity(tasks.len());
        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(item) => checked.push(item),
                Err(e) => {
                    error!("检测任务异常退出: {}", e);
                    failed += 1;
                }
            }
        }

        (checked, failed)
    }

    /// 执行一轮批量检测
    ///
    /// # 参数
    /// * `links` - 按优先级排列的到期链接
    /// * `probe` - 带重试的检测器
    /// * `handler` - 子批次结果处理
    /// * `stop` - 停止信号，在子批次边界检查
    ///
    /// # 返回
    /// * `anyhow::Result<BatchReport>` - 结果处理失败时返回错误
    pub async fn run(
        &self,
        links: Vec<MonitoredLink>,
        probe: &Arc<RetryingProbe>,
        handler: &dyn SubBatchHandler,
        stop: &mut watch::Receiver<bool>,
    ) -> anyhow::Result<BatchReport> {
        let batches = plan_sub_batches(links, self.max_concurrent);
        let total = batches.len();
        let mut report = BatchReport::default();

        for (index, batch) in batches.into_iter().enumerate() {
            if *stop.borrow() {
                info!("收到停止信号，跳过剩余 {} 个子批次", total - index);
                report.interrupted = true;
                break;
            }

            let size = batch.len();
            debug!("开始检测子批次 {}/{}，链接数量: {}", index + 1, total, size);
            let (checked, failed) = self.check_sub_batch(probe, batch).await;
            report.sub_batches.push(size);
            report.checked += checked.len();
            report.failed_tasks += failed;

            handler.handle(checked).await?;

            if index + 1 < total {
                let delay = self.jitter_delay();
                report.jitter_delays += 1;
                debug!("子批次间隔 {}ms", delay.as_millis());
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = stop.changed() => {}
                }
            }
        }

        Ok(report)
    }
}
