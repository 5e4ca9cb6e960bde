//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::app::{apply_overrides, build_notifier, probe_settings, MonitorApp};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, GlobalConfig, TomlConfigLoader};
use crate::error::{ConfigError, Result};
use crate::probe::{HttpProbeExecutor, ProbeExecutor, ProbeResult, RetryPolicy, RetryingProbe};
use crate::signal::ShutdownSignal;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 加载并验证配置文件
async fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    TomlConfigLoader::new(true).load_from_file(path).await
}

/// 监控运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Run {
            interval,
            max_concurrent,
        } = &args.command
        else {
            return Ok(());
        };

        let mut config = load_config(&args.get_config_path()).await?;
        apply_overrides(&mut config, *interval, *max_concurrent)?;

        let app = MonitorApp::build(config)?;

        let shutdown = ShutdownSignal::new();
        shutdown.install()?;
        info!("按 Ctrl+C 停止监控");

        app.run(shutdown.subscribe()).await?;
        Ok(())
    }
}

/// 单地址检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Check {
            url,
            format,
            no_retry,
        } = &args.command
        else {
            return Ok(());
        };

        // 配置文件可选，不存在时使用默认参数
        let config_path = args.get_config_path();
        let global = if config_path.exists() {
            load_config(&config_path).await?.global
        } else {
            GlobalConfig::default()
        };

        let executor: Arc<dyn ProbeExecutor> = Arc::new(HttpProbeExecutor::new(probe_settings(&global))?);
        let policy = if *no_retry {
            RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            }
        } else {
            RetryPolicy::default()
        };
        let result = RetryingProbe::new(executor, policy).check(url).await;

        print_result(&result, *format)?;

        if result.available {
            Ok(())
        } else {
            Err(anyhow::anyhow!("链接不可用: {}", url).into())
        }
    }
}

fn print_result(result: &ProbeResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let status = if result.available { "✓ 可用" } else { "✗ 不可用" };
            println!("{} {}", status, result.address);
            println!("  状态码: {}", result.status_code);
            println!("  响应时间: {}ms", result.response_time_ms);
            println!("  尝试次数: {}", result.attempts);
            if let Some(method) = result.method {
                println!("  方法: {:?}", method);
            }
            if let Some(ref final_url) = result.final_url {
                println!("  最终地址: {} (重定向 {} 次)", final_url, result.redirect_count);
            }
            if let Some(ref cert) = result.certificate {
                println!(
                    "  证书: {} 到期 ({}, 剩余 {} 天)",
                    cert.not_after.format("%Y-%m-%d"),
                    cert.issuer,
                    cert.days_remaining(chrono::Utc::now())
                );
            }
            if let Some(kind) = result.error_kind {
                println!(
                    "  错误: {} {}",
                    kind,
                    result.error_message.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Validate { verbose } = &args.command else {
            return Ok(());
        };

        let config_path = args.get_config_path();
        println!("验证配置文件: {}", config_path.display());
        let config = load_config(&config_path).await?;

        println!("✓ 配置文件验证通过");
        println!(
            "✓ 找到 {} 个链接（启用 {} 个），{} 个所有者",
            config.links.len(),
            config.links.iter().filter(|l| l.active).count(),
            config.owners.len()
        );

        if *verbose {
            let global = &config.global;
            println!("全局配置:");
            println!("  检测间隔: {}分钟", global.check_interval_minutes);
            println!("  最大并发: {}", global.max_concurrent_checks);
            println!("  每轮上限: {}", global.max_batch_size);
            println!("  抖动: {}秒", global.jitter_seconds);
            println!("  错误退避: {}分钟", global.error_backoff_minutes);
            println!("  通知冷却: {}分钟", global.notification_cooldown_minutes);
            println!("  日志级别: {}", global.log_level);
            println!("链接:");
            for (i, link) in config.links.iter().enumerate() {
                println!(
                    "  {}. {} ({}) 每 {} 分钟{}",
                    i + 1,
                    link.name,
                    link.url,
                    link.check_frequency,
                    if link.active { "" } else { " [已停用]" }
                );
            }

            if let Some(url) = global.webhook_url.as_deref() {
                println!("测试webhook连接: {}", url);
                let notifier = build_notifier(global)?;
                match notifier.test_connection().await {
                    Ok(()) => println!("✓ webhook连接正常"),
                    Err(e) => println!("✗ webhook连接失败: {}", e),
                }
            }
        }

        Ok(())
    }
}

/// 执行解析后的命令
pub async fn execute(args: &Args) -> Result<()> {
    match &args.command {
        Commands::Run { .. } => RunCommand.execute(args).await,
        Commands::Check { .. } => CheckCommand.execute(args).await,
        Commands::Validate { .. } => ValidateCommand.execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    const VALID_CONFIG: &str = r#"
[global]
check_interval_minutes = 30

[[links]]
id = 7
owner_id = 1
name = "Docs"
url = "https://docs.example.com"
"#;

    #[tokio::test]
    async fn test_validate_command() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID_CONFIG.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from(["link-vitals", "--config", &path, "validate", "-v"]).unwrap();
        assert!(execute(&args).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_missing_file() {
        let args = Args::try_parse_from([
            "link-vitals",
            "--config",
            "/nonexistent/link-vitals.toml",
            "validate",
        ])
        .unwrap();

        let err = execute(&args).await.unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[tokio::test]
    async fn test_validate_verbose_tests_webhook() {
        let mut server = mockito::Server::new_async().await;
        let hook = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"kind": "test"})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let config = format!(
            "[global]\nwebhook_url = \"{}/hook\"\n{}",
            server.url(),
            VALID_CONFIG.trim_start().trim_start_matches("[global]")
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::try_parse_from(["link-vitals", "--config", &path, "validate", "-v"]).unwrap();
        assert!(execute(&args).await.is_ok());
        hook.assert_async().await;

        // 非详细模式不访问webhook
        let args = Args::try_parse_from(["link-vitals", "--config", &path, "validate"]).unwrap();
        assert!(execute(&args).await.is_ok());
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_check_reports_unavailable_link() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/gone", server.url());
        let args = Args::try_parse_from([
            "link-vitals",
            "--config",
            "/nonexistent/link-vitals.toml",
            "check",
            &url,
            "--no-retry",
        ])
        .unwrap();

        assert!(execute(&args).await.is_err());
    }
}
