//! 日志系统模块
//!
//! 提供结构化日志配置，以及检测、通知两类事件的日志输出

use crate::notification::AlertType;
use crate::probe::ProbeResult;
use log::LevelFilter;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败时的错误信息
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 日志文件路径（可选）
    pub file_path: Option<PathBuf>,
    /// 是否输出到控制台
    pub console: bool,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            file_path: None,
            console: true,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LogConfig {
    /// 按级别名称创建配置，无法识别的名称回退到 info
    pub fn with_level_name(mut self, level: &str) -> Self {
        self.level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
        self
    }

    /// 设置模块日志级别
    pub fn with_module_level(mut self, module: impl Into<String>, level: LevelFilter) -> Self {
        self.module_levels.insert(module.into(), level);
        self
    }
}

fn lock_state() -> std::sync::MutexGuard<'static, GlobalLoggingState> {
    GLOBAL_LOGGING_STATE
        .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只会真正初始化一次，重复调用直接返回
    ///
    /// # 参数
    /// * `config` - 日志配置
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否忽略之前的初始化结果重新初始化
    pub fn setup_logging_with_options(
        config: LogConfig,
        force_reinit: bool,
    ) -> anyhow::Result<Self> {
        {
            let state = lock_state();
            if state.initialized && !force_reinit {
                return match &state.init_error {
                    None => Ok(Self { config }),
                    Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let init_result = Self::perform_initialization(&config);

        let mut state = lock_state();
        state.initialized = true;
        state.current_config = Some(config.clone());
        state.init_error = init_result.as_ref().err().map(|e| e.to_string());
        init_result?;

        Ok(Self { config })
    }

    /// 当前日志配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        Self::init_log_tracer()?;
        Self::init_tracing_subscriber(config)
    }

    /// 初始化 LogTracer，把 log crate 的记录转发给 tracing
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        LOG_TRACER_INIT
            .get_or_init(|| LogTracer::init().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    fn build_filter(config: &LogConfig) -> EnvFilter {
        let mut env_filter =
            EnvFilter::from_default_env().add_directive(level_to_directive(config.level));

        for (module, level) in &config.module_levels {
            match format!("{}={}", module, level.as_str().to_lowercase()).parse::<Directive>() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(e) => eprintln!("忽略无效的模块日志级别 {}: {}", module, e),
            }
        }
        env_filter
    }

    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let env_filter = Self::build_filter(config);

        let result = match (&config.file_path, config.console) {
            (Some(file_path), false) => {
                let file = std::fs::File::create(file_path)
                    .map_err(|e| anyhow::anyhow!("创建日志文件失败: {}", e))?;
                let file_layer = fmt::layer()
                    .with_writer(file)
                    .with_timer(fmt::time::ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_target(true);
                registry().with(env_filter).with(file_layer).try_init()
            }
            _ => {
                let fmt_layer = if config.json_format {
                    fmt::layer()
                        .json()
                        .with_timer(fmt::time::ChronoUtc::rfc_3339())
                        .with_current_span(false)
                        .boxed()
                } else {
                    fmt::layer()
                        .with_timer(fmt::time::ChronoUtc::rfc_3339())
                        .with_ansi(true)
                        .with_target(true)
                        .boxed()
                };
                registry().with(env_filter).with(fmt_layer).try_init()
            }
        };

        match result {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("already") {
                    // 测试进程中可能已经注册过 subscriber
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        GLOBAL_LOGGING_STATE
            .get()
            .map(|_| lock_state().initialized)
            .unwrap_or(false)
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        GLOBAL_LOGGING_STATE
            .get()
            .and_then(|_| lock_state().current_config.clone())
    }

    #[cfg(test)]
    fn reset_for_testing() {
        let mut state = lock_state();
        *state = GlobalLoggingState::default();
    }
}

fn level_to_directive(level: LevelFilter) -> Directive {
    use tracing_subscriber::filter::LevelFilter as TracingLevel;
    match level {
        LevelFilter::Off => Directive::from(TracingLevel::OFF),
        LevelFilter::Error => Directive::from(tracing::Level::ERROR),
        LevelFilter::Warn => Directive::from(tracing::Level::WARN),
        LevelFilter::Info => Directive::from(tracing::Level::INFO),
        LevelFilter::Debug => Directive::from(tracing::Level::DEBUG),
        LevelFilter::Trace => Directive::from(tracing::Level::TRACE),
    }
}

/// 记录单次检测日志
///
/// 可用结果记为 info，失败结果记为 warn，字段便于 JSON 格式下检索
pub fn probe_log(link_name: &str, result: &ProbeResult) {
    let error_kind = result.error_kind.map(|k| k.as_str()).unwrap_or("");
    if result.available {
        tracing::info!(
            link = link_name,
            address = %result.address,
            status_code = result.status_code,
            response_time_ms = result.response_time_ms,
            attempts = result.attempts,
            "检测成功: {} - HTTP {} ({}ms)",
            link_name,
            result.status_code,
            result.response_time_ms
        );
    } else {
        tracing::warn!(
            link = link_name,
            address = %result.address,
            status_code = result.status_code,
            error_kind,
            attempts = result.attempts,
            "检测失败: {} - {} {}",
            link_name,
            error_kind,
            result.error_message.as_deref().unwrap_or("")
        );
    }
}

/// 记录通知发送日志
///
/// `outcome` 为发送结果：成功时是投递状态码，失败时是错误信息
pub fn notification_log(
    link_name: &str,
    alert_type: AlertType,
    contact: &str,
    outcome: Result<u16, &str>,
) {
    match outcome {
        Ok(code) => tracing::info!(
            link = link_name,
            alert_type = alert_type.as_str(),
            recipient = contact,
            delivery_code = code,
            "通知已发送: {} {} -> {}",
            alert_type,
            link_name,
            contact
        ),
        Err(error) => tracing::error!(
            link = link_name,
            alert_type = alert_type.as_str(),
            recipient = contact,
            error,
            "通知发送失败: {} {} -> {}: {}",
            alert_type,
            link_name,
            contact,
            error
        ),
    }
}

/// 获取默认日志文件路径
pub fn get_default_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::APP_NAME)
        .join(format!("{}.log", crate::APP_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ErrorKind;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    fn create_test_config() -> LogConfig {
        LogConfig {
            level: LevelFilter::Info,
            ..LogConfig::default()
        }
    }

    #[test]
    #[serial]
    fn test_logging_system_single_initialization() {
        LoggingSystem::reset_for_testing();

        let config = create_test_config();

        assert!(LoggingSystem::setup_logging(config.clone()).is_ok());
        assert!(LoggingSystem::is_initialized());

        // 重复初始化不会报错
        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    #[serial]
    fn test_logging_system_force_reinit() {
        LoggingSystem::reset_for_testing();

        let config = create_test_config();
        LoggingSystem::setup_logging(config.clone()).unwrap();

        let result = LoggingSystem::setup_logging_with_options(config, true);
        assert!(result.is_ok());
    }

    #[test]
    #[serial]
    fn test_logging_system_with_file_output() {
        LoggingSystem::reset_for_testing();

        let temp_file = NamedTempFile::new().unwrap();
        let config = LogConfig {
            file_path: Some(temp_file.path().to_path_buf()),
            console: false,
            ..create_test_config()
        };

        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    #[serial]
    fn test_logging_system_with_json_format() {
        LoggingSystem::reset_for_testing();

        let config = LogConfig {
            json_format: true,
            ..create_test_config()
        };
        assert!(LoggingSystem::setup_logging(config).is_ok());
    }

    #[test]
    #[serial]
    fn test_current_config_retrieval() {
        LoggingSystem::reset_for_testing();

        let config = create_test_config()
            .with_level_name("debug")
            .with_module_level("hyper", LevelFilter::Warn);
        let system = LoggingSystem::setup_logging(config).unwrap();
        assert_eq!(system.config().level, LevelFilter::Debug);

        let current = LoggingSystem::current_config().unwrap();
        assert_eq!(current.level, LevelFilter::Debug);
        assert_eq!(current.module_levels.get("hyper"), Some(&LevelFilter::Warn));
    }

    #[test]
    fn test_level_name_fallback() {
        let config = LogConfig::default().with_level_name("verbose");
        assert_eq!(config.level, LevelFilter::Info);

        let config = LogConfig::default().with_level_name("WARN");
        assert_eq!(config.level, LevelFilter::Warn);
    }

    #[test]
    fn test_event_helpers_do_not_panic() {
        let ok = ProbeResult::new("https://example.com")
            .with_status_code(200)
            .with_response_time_ms(42);
        probe_log("Homepage", &ok);

        let failed = ProbeResult::failure("https://nope.invalid", ErrorKind::DnsError, "no records");
        probe_log("Broken", &failed);

        notification_log("Homepage", AlertType::Broken, "ops@example.com", Ok(200));
        notification_log("Homepage", AlertType::StatusChange, "ops@example.com", Err("timeout"));
    }

    #[test]
    fn test_default_log_path() {
        let path = get_default_log_path();
        assert!(path.to_string_lossy().ends_with("link-vitals.log"));
    }
}
