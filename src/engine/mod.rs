//! 检测引擎模块
//!
//! 调度循环、批量检测协调、结果上报与运行指标

pub mod batch;
pub mod metrics;
pub mod report;
pub mod scheduler;

pub use batch::{BatchCoordinator, BatchReport, CheckedLink, SubBatchHandler};
pub use metrics::{HealthSnapshot, MetricsAggregator, RunStatus};
pub use report::Reporter;
pub use scheduler::{
    CycleSummary, LinkScheduler, MonitorHandle, SchedulerConfig, SchedulerDeps, SchedulerPhase,
};
