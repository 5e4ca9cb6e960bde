//! Link Vitals 主程序入口
//!
//! 链接健康监控引擎

use anyhow::{Context, Result};
use clap::Parser;
use link_vitals::cli::{self, Args};
use link_vitals::config::{ConfigLoader, TomlConfigLoader};
use link_vitals::logging::{LogConfig, LoggingSystem};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = match args.log_level {
        Some(level) => LogConfig {
            level: level.into(),
            ..LogConfig::default()
        },
        None => LogConfig::default().with_level_name(&configured_log_level(&args).await),
    };
    let log_config = LogConfig {
        json_format: args.json_logs,
        ..log_config
    }
    .with_module_level("hyper", log::LevelFilter::Warn)
    .with_module_level("reqwest", log::LevelFilter::Warn)
    .with_module_level("rustls", log::LevelFilter::Warn);

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("Link Vitals v{} 启动", link_vitals::VERSION);

    if let Err(e) = cli::execute(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 读取配置文件中的日志级别，配置不可用时返回 info
async fn configured_log_level(args: &Args) -> String {
    let path = args.get_config_path();
    if !path.exists() {
        return "info".to_string();
    }
    TomlConfigLoader::new(true)
        .load_from_file(&path)
        .await
        .map(|config| config.global.log_level)
        .unwrap_or_else(|_| "info".to_string())
}
