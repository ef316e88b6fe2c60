//! 通知发送器模块
//!
//! 定义告警消息和通知发送的trait，以及不依赖外部服务的基础实现

use crate::error::AlertError;
use crate::probe::record::{Record, RecordLog};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::warn;

/// 告警消息结构
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    /// 消息标题
    pub title: String,
    /// 探针名称
    pub probe_name: String,
    /// 探针描述
    pub description: String,
    /// 告警时的分数
    pub score: u64,
    /// 生成时间
    pub timestamp: DateTime<Utc>,
    /// 时间窗口内的失败记录，最新的在前
    pub recent_failures: Vec<Record>,
    /// 历史记录总数
    pub total_records: usize,
    /// 探针特定的webhook，覆盖发送器的默认值
    pub webhook_url: Option<String>,
}

impl AlertMessage {
    /// 根据探测历史构建告警消息
    ///
    /// # 参数
    /// * `name` - 探针名称
    /// * `description` - 探针描述
    /// * `score` - 当前分数
    /// * `records` - 探测历史
    /// * `now` - 当前时间
    /// * `window` - 近期失败的时间窗口
    pub fn new(
        name: &str,
        description: &str,
        score: u64,
        records: &RecordLog,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        Self {
            title: format!("{name} failed (badness {score})"),
            probe_name: name.to_string(),
            description: description.to_string(),
            score,
            timestamp: now,
            recent_failures: records.recent_failures(now, window),
            total_records: records.len(),
            webhook_url: None,
        }
    }

    pub fn with_webhook_url(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }
}

/// 通知发送器trait
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// 发送告警
    ///
    /// # 参数
    /// * `message` - 告警消息
    ///
    /// # 返回
    /// * `Result<(), AlertError>` - 失败时探针会在之后的周期重试
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError>;

    /// 测试连接
    async fn test_connection(&self) -> Result<(), AlertError>;
}

/// 空的通知发送器实现（用于测试或禁用通知）
pub struct NoOpSender;

#[async_trait]
impl NotificationSender for NoOpSender {
    async fn send_alert(&self, _message: &AlertMessage) -> Result<(), AlertError> {
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), AlertError> {
        Ok(())
    }
}

/// 只写日志的发送器，未配置任何webhook时使用
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
        warn!(
            "告警: {} - {}，近期失败 {} 次，共 {} 条记录",
            message.title,
            message.description,
            message.recent_failures.len(),
            message.total_records
        );
        for record in &message.recent_failures {
            warn!("  {}", record);
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), AlertError> {
        Ok(())
    }
}
