//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Link Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum LinkVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 链接存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 通知相关错误
    #[error("通知错误: {0}")]
    Notification(#[from] NotificationError),

    /// 链接校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 链接存储错误类型
///
/// 写入失败会升级为调度周期错误，由调度器统一退避处理
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// 存储不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// 链接不存在
    #[error("链接不存在: {link_id}")]
    LinkNotFound { link_id: i64 },

    /// 写入失败
    #[error("写入失败: {0}")]
    WriteFailed(String),
}

/// 通知错误类型
#[derive(Error, Debug)]
pub enum NotificationError {
    /// 传输失败
    #[error("通知发送失败: {0}")]
    Transport(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("通知配置错误: {0}")]
    ConfigError(String),
}

/// 链接校验错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 检测频率超出范围
    #[error("检测频率必须在 1 到 1440 分钟之间，实际: {value}")]
    InvalidFrequency { value: u32 },

    /// URL格式无效
    #[error("URL格式无效: {url}")]
    InvalidUrl { url: String },

    /// 链接名称为空
    #[error("链接名称不能为空")]
    EmptyName,
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, LinkVitalsError>;
