//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Link Vitals - 链接健康监控引擎
#[derive(Parser, Debug, Clone)]
#[command(
    name = "link-vitals",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "LINK_VITALS_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "LINK_VITALS_LOG_LEVEL",
        global = true
    )]
    pub log_level: Option<LogLevel>,

    /// 以JSON格式输出日志
    #[arg(long, help = "以JSON格式输出日志", global = true)]
    pub json_logs: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    /// 跟踪级别
    Trace,
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 输出格式
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本
    Text,
    /// JSON
    Json,
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动监控循环，直到收到 Ctrl+C / SIGTERM
    Run {
        /// 覆盖检测间隔（分钟）
        #[arg(
            short,
            long,
            value_name = "MINUTES",
            help = "检测间隔（分钟）",
            env = "LINK_VITALS_INTERVAL"
        )]
        interval: Option<u32>,

        /// 覆盖子批次并发上限
        #[arg(
            short = 'm',
            long,
            value_name = "COUNT",
            help = "最大并发检测数",
            env = "LINK_VITALS_MAX_CONCURRENT"
        )]
        max_concurrent: Option<usize>,
    },

    /// 立即检测单个地址
    Check {
        /// 目标地址
        #[arg(value_name = "URL")]
        url: String,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// 不重试
        #[arg(long, help = "只检测一次，不重试")]
        no_retry: bool,
    },

    /// 验证配置文件
    Validate {
        /// 显示详细信息
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}
