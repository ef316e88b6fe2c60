//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Service Prober 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ProberError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探测执行相关错误
    #[error("探测错误: {0}")]
    Check(#[from] CheckError),

    /// 告警发送相关错误
    #[error("告警错误: {0}")]
    Alert(#[from] AlertError),

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
///
/// 配置错误只会在启动阶段出现，调用方应当将其视为致命错误。
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

/// 探测执行错误类型
///
/// 探测器内部使用，最终都会被转换为失败的 `Outcome`，不会向上传播。
#[derive(Error, Debug)]
pub enum CheckError {
    /// HTTP请求错误
    #[error("HTTP请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 超时错误
    #[error("请求超时")]
    Timeout,

    /// 连接错误
    #[error("连接失败: {target}")]
    Connect { target: String },

    /// 探测参数无效
    #[error("探测参数无效: {0}")]
    Invalid(String),
}

/// 告警发送错误类型
///
/// 返回该错误表示“稍后重试”，调度器不会因此退出。
#[derive(Error, Debug)]
pub enum AlertError {
    /// 发送失败
    #[error("告警发送失败: {0}")]
    SendError(String),

    /// 模板渲染错误
    #[error("模板渲染失败: {0}")]
    TemplateError(String),

    /// 配置错误
    #[error("告警配置错误: {0}")]
    ConfigError(String),
}

impl From<reqwest::Error> for AlertError {
    fn from(err: reqwest::Error) -> Self {
        AlertError::SendError(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ProberError>;
