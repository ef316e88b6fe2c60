//! 通知模块
//!
//! 提供飞书告警、日志告警和消息模板功能

pub mod feishu;
pub mod sender;
pub mod template;

// 重新导出主要类型
pub use feishu::FeishuSender;
pub use sender::{AlertMessage, LogSender, NoOpSender, NotificationSender};
pub use template::{AlertTemplate, DEFAULT_ALERT_TEMPLATE};
