//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use crate::config::ConfigOverrides;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Service Prober - 黑盒探测与告警引擎
#[derive(Parser, Debug, Clone)]
#[command(
    name = "service-prober",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "配置文件路径",
        env = "SERVICE_PROBER_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的值
    #[arg(
        short,
        long,
        global = true,
        value_enum,
        help = "日志级别",
        env = "SERVICE_PROBER_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 告警阈值
    #[arg(
        long,
        global = true,
        value_name = "SCORE",
        help = "达到该分数即告警",
        env = "SERVICE_PROBER_ALERT_THRESHOLD"
    )]
    pub alert_threshold: Option<u64>,

    /// 关闭所有告警
    #[arg(long, global = true, help = "关闭所有告警", env = "SERVICE_PROBER_NO_ALERTS")]
    pub no_alerts: bool,

    /// 禁用的探针，逗号分隔
    #[arg(
        long,
        global = true,
        value_name = "NAMES",
        help = "禁用的探针，例如 FooProbe,BarProbe",
        env = "SERVICE_PROBER_DISABLED_PROBES"
    )]
    pub disabled_probes: Option<String>,

    /// 仅启用的探针，逗号分隔
    #[arg(
        long,
        global = true,
        value_name = "NAMES",
        help = "仅启用的探针，例如 FooProbe,BarProbe",
        env = "SERVICE_PROBER_ONLY_PROBES"
    )]
    pub only_probes: Option<String>,

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

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动所有探针并持续运行
    Run,

    /// 执行一次性探测，不影响分数
    Check {
        /// 探针名称（可选，不指定则探测所有探针）
        #[arg(value_name = "NAME", help = "探针名称")]
        probe: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 发送一条测试告警
    TestNotification {
        /// 使用指定探针的webhook
        #[arg(value_name = "NAME", help = "探针名称")]
        probe: Option<String>,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }

    /// 命令行对配置文件的覆盖
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            alert_threshold: self.alert_threshold,
            alerts_disabled: self.no_alerts,
            disabled_probes: self.disabled_probes.as_deref().map(split_names),
            only_probes: self.only_probes.as_deref().map(split_names),
            log_level: self.log_level.map(|level| level.to_string()),
        }
    }
}

/// 拆分逗号分隔的名称列表
fn split_names(names: &str) -> Vec<String> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
