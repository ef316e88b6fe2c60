//! 探测历史记录
//!
//! 每个探针保留最近若干次探测结果，插入顺序即时间顺序

use crate::probe::outcome::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// 毫秒时间戳的显示格式，例如 `Nov 19 15:14:00.000`
pub const TIME_MILLIS_FORMAT: &str = "%b %e %H:%M:%S%.3f";

/// 单次探测的历史记录，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 探测时间
    pub timestamp: DateTime<Utc>,
    /// 与 `timestamp` 相同，但保留了便于阅读的毫秒格式
    pub time_millis: String,
    /// 探测结果
    pub outcome: Outcome,
}

impl Record {
    /// 创建新的记录
    pub fn new(timestamp: DateTime<Utc>, outcome: Outcome) -> Self {
        Self {
            timestamp,
            time_millis: timestamp.format(TIME_MILLIS_FORMAT).to_string(),
            outcome,
        }
    }

    /// 描述距离记录发生已过去多久
    pub fn ago(&self, now: DateTime<Utc>) -> String {
        let secs = (now - self.timestamp).num_milliseconds() as f64 / 1000.0;
        if secs < 60.0 {
            format!("{secs:.1} sec ago")
        } else if secs < 3600.0 {
            format!("{:.1} min ago", secs / 60.0)
        } else if secs < 86400.0 {
            format!("{:.1} hrs ago", secs / 3600.0)
        } else {
            format!("{:.1} days ago", secs / 86400.0)
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Record{{Timestamp: {}, TimeMillis: {:?}, Outcome: {}}}",
            self.timestamp, self.time_millis, self.outcome
        )
    }
}

/// 有界的探测历史
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordLog {
    records: VecDeque<Record>,
}

impl RecordLog {
    /// 创建空的历史
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录，超出 `capacity` 时从头部丢弃最旧的记录
    ///
    /// # 返回
    /// * `usize` - 被丢弃的记录数量
    pub fn push_bounded(&mut self, record: Record, capacity: usize) -> usize {
        self.records.push_back(record);
        let over = self.records.len().saturating_sub(capacity);
        self.records.drain(..over);
        over
    }

    /// 记录数量
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按时间顺序遍历
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Record> + ExactSizeIterator {
        self.records.iter()
    }

    /// 最近一条记录
    pub fn last(&self) -> Option<&Record> {
        self.records.back()
    }

    /// 返回时间窗口内的失败记录，最新的在前
    ///
    /// # 参数
    /// * `now` - 当前时间
    /// * `window` - 时间窗口，早于 `now - window` 的记录被忽略
    pub fn recent_failures(&self, now: DateTime<Utc>, window: Duration) -> Vec<Record> {
        let cutoff = now
            .checked_sub_signed(crate::clock::to_chrono(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut failures: Vec<Record> = self
            .records
            .iter()
            .filter(|r| r.outcome.is_fail() && r.timestamp >= cutoff)
            .cloned()
            .collect();
        failures.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        failures
    }
}

impl fmt::Display for RecordLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.records.iter().map(Record::to_string).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl FromIterator<Record> for RecordLog {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a RecordLog {
    type Item = &'a Record;
    type IntoIter = std::collections::vec_deque::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
