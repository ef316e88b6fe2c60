//! 探针状态机
//!
//! 包装一个探测器，维护分数、告警状态、静默时间和探测历史，
//! 并在每次探测结果到达时按固定规则更新它们

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::error::ConfigError;
use crate::probe::check::Check;
use crate::probe::journal::OutcomeJournal;
use crate::probe::outcome::Outcome;
use crate::probe::record::{Record, RecordLog};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 默认探测间隔
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
/// 默认失败惩罚
pub const DEFAULT_FAILURE_PENALTY: u32 = 10;
/// 默认成功奖励
pub const DEFAULT_SUCCESS_REWARD: u32 = 1;
/// 默认告警阈值
pub const DEFAULT_ALERT_THRESHOLD: u64 = 200;
/// 两次告警之间的最短间隔
pub const DEFAULT_MAX_ALERT_FREQUENCY: Duration = Duration::from_secs(15 * 60);
/// 每个探针保留的最大记录数
pub const DEFAULT_BUFFER_SIZE: usize = 200;
/// 告警内容中“近期失败”的时间窗口
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// 探测结果回调函数类型
pub type ReportFn = Arc<dyn Fn(&Outcome) + Send + Sync>;

/// 单个探针的配置项，按给定顺序应用，后者覆盖前者
#[derive(Clone)]
pub enum ProbeOption {
    /// 探测间隔
    Interval(Duration),
    /// 每次失败增加的分数
    FailurePenalty(u32),
    /// 每次成功减少的分数
    SuccessReward(u32),
    /// 每次探测结果的回调
    Report(ReportFn),
}

impl fmt::Debug for ProbeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOption::Interval(d) => f.debug_tuple("Interval").field(d).finish(),
            ProbeOption::FailurePenalty(p) => f.debug_tuple("FailurePenalty").field(p).finish(),
            ProbeOption::SuccessReward(r) => f.debug_tuple("SuccessReward").field(r).finish(),
            ProbeOption::Report(_) => f.write_str("Report(..)"),
        }
    }
}

/// 同一调度器下所有探针共享的告警策略
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    /// 达到该分数即进入告警状态
    pub alert_threshold: u64,
    /// 全局关闭告警
    pub alerts_disabled: bool,
    /// 两次告警之间的最短间隔
    pub max_alert_frequency: Duration,
    /// 每个探针保留的最大记录数
    pub buffer_size: usize,
    /// 近期失败的时间窗口
    pub failure_window: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            alerts_disabled: false,
            max_alert_frequency: DEFAULT_MAX_ALERT_FREQUENCY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            failure_window: DEFAULT_FAILURE_WINDOW,
        }
    }
}

/// 受同一把锁保护的可变状态
#[derive(Debug, Default)]
pub(crate) struct AlertState {
    pub(crate) score: u64,
    pub(crate) alerting: bool,
    pub(crate) last_alert: Option<DateTime<Utc>>,
    pub(crate) silenced_until: Option<DateTime<Utc>>,
    pub(crate) disabled: bool,
}

/// 长期运行的探针
pub struct Probe {
    name: String,
    description: String,
    check: Arc<dyn Check>,
    interval: Duration,
    failure_penalty: u32,
    success_reward: u32,
    report: Option<ReportFn>,
    settings: Arc<ProbeSettings>,
    clock: Arc<dyn Clock>,
    journal: Option<Arc<OutcomeJournal>>,
    state: Mutex<AlertState>,
    records: RwLock<RecordLog>,
    alert_task: Mutex<Option<JoinHandle<()>>>,
}

impl Probe {
    /// 创建新的探针
    ///
    /// # 参数
    /// * `check` - 探测器实现
    /// * `name` - 探针名称
    /// * `description` - 探针描述
    /// * `options` - 配置项，按顺序应用
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 探测间隔为0时返回错误
    pub fn new(
        check: Arc<dyn Check>,
        name: impl Into<String>,
        description: impl Into<String>,
        options: impl IntoIterator<Item = ProbeOption>,
    ) -> Result<Self, ConfigError> {
        let mut probe = Self {
            name: name.into(),
            description: description.into(),
            check,
            interval: DEFAULT_INTERVAL,
            failure_penalty: DEFAULT_FAILURE_PENALTY,
            success_reward: DEFAULT_SUCCESS_REWARD,
            report: None,
            settings: Arc::new(ProbeSettings::default()),
            clock: Arc::new(SystemClock),
            journal: None,
            state: Mutex::new(AlertState::default()),
            records: RwLock::new(RecordLog::new()),
            alert_task: Mutex::new(None),
        };

        for option in options {
            match option {
                ProbeOption::Interval(interval) => probe.interval = interval,
                ProbeOption::FailurePenalty(penalty) => probe.failure_penalty = penalty,
                ProbeOption::SuccessReward(reward) => probe.success_reward = reward,
                ProbeOption::Report(report) => probe.report = Some(report),
            }
        }

        if probe.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("探针名称不能为空".to_string()));
        }
        if probe.interval.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "探针 {} 的探测间隔不能为0",
                probe.name
            )));
        }

        Ok(probe)
    }

    /// 使用共享的告警策略
    pub fn with_settings(mut self, settings: Arc<ProbeSettings>) -> Self {
        self.settings = settings;
        self
    }

    /// 使用指定的时钟
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 将每次探测记录追加到结果日志文件
    pub fn with_journal(mut self, journal: Arc<OutcomeJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn failure_penalty(&self) -> u32 {
        self.failure_penalty
    }

    pub fn success_reward(&self) -> u32 {
        self.success_reward
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub(crate) fn check(&self) -> Arc<dyn Check> {
        Arc::clone(&self.check)
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, AlertState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前分数
    pub fn score(&self) -> u64 {
        self.lock_state().score
    }

    /// 是否处于告警状态
    pub fn is_alerting(&self) -> bool {
        self.lock_state().alerting
    }

    /// 上次成功告警的时间，从未告警时为 `None`
    pub fn last_alert(&self) -> Option<DateTime<Utc>> {
        self.lock_state().last_alert
    }

    /// 静默截止时间
    pub fn silenced_until(&self) -> Option<DateTime<Utc>> {
        self.lock_state().silenced_until
    }

    /// 是否已被启用/禁用过滤器禁用
    pub fn is_disabled(&self) -> bool {
        self.lock_state().disabled
    }

    pub(crate) fn mark_disabled(&self) {
        self.lock_state().disabled = true;
    }

    /// 当前是否处于静默期
    pub fn is_silenced(&self) -> bool {
        let now = self.clock.now();
        self.silenced_until().is_some_and(|until| until > now)
    }

    /// 静默探针直到指定时间
    pub fn silence(&self, until: DateTime<Utc>) {
        self.lock_state().silenced_until = Some(until);
        info!("[{}] 已静默至 {}", self.name, SilenceTime(until, self.clock.now()));
    }

    /// 探测历史快照
    pub fn records(&self) -> RecordLog {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 记录数量
    pub fn history_len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 时间窗口内的近期失败，最新的在前
    pub fn recent_failures(&self) -> Vec<Record> {
        let now = self.clock.now();
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .recent_failures(now, self.settings.failure_window)
    }

    /// 处理一次探测结果
    ///
    /// 更新分数、历史和告警状态；满足条件时在独立任务中发送告警。
    /// 不在 tokio 运行时中调用时只更新状态，告警会在之后满足条件的周期重试。
    pub fn handle_outcome(self: &Arc<Self>, outcome: Outcome) {
        if let Some(report) = &self.report {
            report(&outcome);
        }

        let now = self.clock.now();
        let (score, alerting, last_alert) = {
            let mut state = self.lock_state();
            state.score = if outcome.is_pass() {
                state.score.saturating_sub(u64::from(self.success_reward))
            } else {
                state.score.saturating_add(u64::from(self.failure_penalty))
            };
            if outcome.is_pass() {
                debug!("[{}] 探测通过，当前分数 {}", self.name, state.score);
            } else {
                warn!(
                    "[{}] 探测失败，当前分数 {}: {}",
                    self.name,
                    state.score,
                    outcome.info().unwrap_or("N/A")
                );
            }

            if state.silenced_until.is_some_and(|until| until > now) {
                info!("[{}] 处于静默期，不会告警，分数重置为0", self.name);
                state.score = 0;
            }

            state.alerting = state.score >= self.settings.alert_threshold;
            (state.score, state.alerting, state.last_alert)
        };

        self.log_outcome(now, outcome);

        if !alerting {
            return;
        }
        if self.settings.alerts_disabled {
            info!("[{}] 已达到告警条件，但告警已全局关闭", self.name);
            return;
        }
        if let Some(last) = last_alert {
            let since = now - last;
            if since < to_chrono(self.settings.max_alert_frequency) {
                info!(
                    "[{}] 距上次告警仅 {} 秒，本次不告警",
                    self.name,
                    since.num_seconds()
                );
                return;
            }
        }

        self.dispatch_alert(score);
    }

    /// 写入历史并追加到结果日志
    fn log_outcome(&self, now: DateTime<Utc>, outcome: Outcome) {
        let record = Record::new(now, outcome);
        if let Some(journal) = &self.journal {
            journal.append(&self.name, &record);
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = records.push_bounded(record, self.settings.buffer_size);
        if dropped > 0 {
            debug!(
                "[{}] 历史记录超过 {} 条，丢弃最旧的 {} 条",
                self.name, self.settings.buffer_size, dropped
            );
        }
    }

    /// 在独立任务中发送告警，上一次告警仍在进行时跳过
    fn dispatch_alert(self: &Arc<Self>, score: u64) {
        let mut slot = self.alert_task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            info!("[{}] 上一次告警仍在发送中，跳过本次告警", self.name);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("[{}] 当前不在 tokio 运行时中，无法发送告警", self.name);
            return;
        };

        info!("[{}] 进入告警状态，分数 {}", self.name, score);
        let records = self.records();
        let probe = Arc::clone(self);
        *slot = Some(runtime.spawn(async move {
            probe.send_alert(score, records).await;
        }));
    }

    /// 调用探测器的告警实现并处理结果
    async fn send_alert(&self, score: u64, records: RecordLog) {
        let now = self.clock.now();
        match self
            .check
            .alert(&self.name, &self.description, score, &records, now)
            .await
        {
            Ok(()) => {
                let mut state = self.lock_state();
                state.last_alert = Some(now);
                state.score = 0;
                info!("[{}] 告警发送成功，分数重置为0", self.name);
            }
            Err(e) => {
                // 不重置分数，下一个满足条件的周期会重试
                warn!("[{}] 告警发送失败: {}", self.name, e);
            }
        }
    }

    /// 是否有告警正在发送
    pub fn alert_in_flight(&self) -> bool {
        self.alert_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// 等待当前告警任务完成
    pub async fn wait_for_alert(&self) {
        let task = self
            .alert_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("[{}] 告警任务异常退出: {}", self.name, e);
                }
            }
        }
    }

    /// 取消当前告警任务
    pub fn cancel_alert(&self) {
        let task = self
            .alert_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            debug!("[{}] 已取消告警任务", self.name);
        }
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("interval", &self.interval)
            .field("failure_penalty", &self.failure_penalty)
            .field("success_reward", &self.success_reward)
            .field("state", &*self.lock_state())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![
            format!("Name: {:?}", self.name),
            format!("Desc: {:?}", self.description),
            format!("Records: {}", self.records()),
        ];
        let state = self.lock_state();
        if state.score != 0 {
            parts.push(format!("Score: {}", state.score));
        }
        if self.interval != DEFAULT_INTERVAL {
            parts.push(format!("Interval: {:?}", self.interval));
        }
        if state.alerting {
            parts.push("alerting: true".to_string());
        }
        if let Some(last) = state.last_alert {
            parts.push(format!("lastAlert: {last}"));
        }
        if state.disabled {
            parts.push("Disabled: true".to_string());
        }
        if let Some(until) = state.silenced_until {
            parts.push(format!("SilencedUntil: {}", SilenceTime(until, self.clock.now())));
        }
        if self.failure_penalty != DEFAULT_FAILURE_PENALTY {
            parts.push(format!("failurePenalty: {}", self.failure_penalty));
        }
        write!(f, "&Probe{{{}}}", parts.join(", "))
    }
}

/// 静默截止时间的显示形式
pub struct SilenceTime(pub DateTime<Utc>, pub DateTime<Utc>);

impl fmt::Display for SilenceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = (self.0 - self.1).num_seconds() as f64 / 3600.0;
        write!(f, "{} ({:.6} hrs more)", self.0.to_rfc2822(), hours)
    }
}
