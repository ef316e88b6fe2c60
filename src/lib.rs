//! Service Prober - 黑盒探测与告警引擎
//!
//! 这是一个用Rust编写的持续探测工具，支持：
//! - 周期性执行任意探测（内置HTTP和TCP探测器）
//! - 失败计分，成功时衰减
//! - 告警限频与静默
//! - 飞书通知集成
//! - 按严重程度排序的只读状态接口

pub mod checks;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod probe;
pub mod web;

// 重新导出主要类型
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, GlobalConfig, ProbeConfig};
pub use error::ProberError;
pub use probe::{Check, Outcome, Probe, ProbeOption, ProbeScheduler, ProbeSet, Record, RecordLog};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
