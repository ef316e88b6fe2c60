//! 探测器trait
//!
//! 任何具体的探测类型（HTTP、TCP等）只需实现 `probe` 和 `alert` 两个操作

use crate::error::AlertError;
use crate::probe::outcome::Outcome;
use crate::probe::record::RecordLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 可插拔的探测能力
#[async_trait]
pub trait Check: Send + Sync {
    /// 执行一次探测
    ///
    /// 应在所属探针的间隔内返回；失败时必须携带可读的诊断信息。
    async fn probe(&self) -> Outcome;

    /// 发送告警
    ///
    /// # 参数
    /// * `name` - 探针名称
    /// * `description` - 探针描述
    /// * `score` - 当前分数
    /// * `records` - 探测历史快照
    /// * `now` - 探针时钟的当前时间
    ///
    /// # 返回
    /// * `Result<(), AlertError>` - 返回错误表示稍后重试
    async fn alert(
        &self,
        name: &str,
        description: &str,
        score: u64,
        records: &RecordLog,
        now: DateTime<Utc>,
    ) -> Result<(), AlertError>;
}
