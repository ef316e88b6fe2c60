//! 探针调度模块
//!
//! 每个探针一个独立的任务，按间隔循环执行探测，超时视为失败

use crate::clock::{to_chrono, Clock, SystemClock};
use crate::error::ConfigError;
use crate::probe::check::Check;
use crate::probe::filter::ProbeFilter;
use crate::probe::journal::OutcomeJournal;
use crate::probe::ordering::ProbeSet;
use crate::probe::outcome::Outcome;
use crate::probe::state::{Probe, ProbeOption, ProbeSettings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

impl Probe {
    /// 永久循环执行探测
    ///
    /// 过滤器只在启动时检查一次：被禁用的探针标记为 Disabled 后立即返回。
    pub async fn run(self: Arc<Self>, filter: Arc<ProbeFilter>) {
        info!("[{}] 启动探针", self.name());

        if !filter.is_enabled(self.name()) {
            self.mark_disabled();
            info!("[{}] 已被禁用，探针退出", self.name());
            return;
        }

        loop {
            let wait = self.run_once().await;
            if !wait.is_zero() {
                self.clock().sleep(wait).await;
            }
        }
    }

    /// 执行一次探测
    ///
    /// # 返回
    /// * `Duration` - 距离下一次探测还需等待的时长；超时时为0
    pub async fn run_once(self: &Arc<Self>) -> Duration {
        let start = self.clock().now();
        let check = self.check();
        let name = self.name().to_string();
        let task = tokio::spawn(async move {
            debug!("[{}] 开始探测", name);
            check.probe().await
        });

        // 超时后丢弃任务句柄，探测任务本身不会被取消
        match tokio::time::timeout(self.interval(), task).await {
            Ok(result) => {
                let outcome = result.unwrap_or_else(|e| {
                    error!("[{}] 探测任务异常退出: {}", self.name(), e);
                    Outcome::failed_with(format!("{} probe task failed: {}", self.name(), e))
                });
                self.handle_outcome(outcome);

                let elapsed = self.clock().now() - start;
                let wait = to_chrono(self.interval())
                    .checked_sub(&elapsed)
                    .and_then(|left| left.to_std().ok())
                    .unwrap_or(Duration::ZERO);
                debug!("[{}] 还需等待 {:?}", self.name(), wait);
                wait
            }
            Err(_) => {
                warn!("[{}] 探测超时", self.name());
                self.handle_outcome(Outcome::failed_with(format!(
                    "{} timed out (with probe interval {:.1} sec)",
                    self.name(),
                    self.interval().as_secs_f64()
                )));
                Duration::ZERO
            }
        }
    }
}

/// 调度器启动配置
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// 告警策略
    pub settings: ProbeSettings,
    /// 禁用的探针名称
    pub disabled_probes: Vec<String>,
    /// 仅启用的探针名称
    pub only_probes: Vec<String>,
    /// 结果日志文件路径，为空时使用系统临时目录
    pub journal_path: Option<PathBuf>,
}

/// 探针调度器
///
/// 持有一组探针和它们的运行任务；多个调度器实例之间互不影响。
pub struct ProbeScheduler {
    settings: Arc<ProbeSettings>,
    filter: Arc<ProbeFilter>,
    clock: Arc<dyn Clock>,
    journal: Arc<OutcomeJournal>,
    probes: Vec<Arc<Probe>>,
    tasks: RwLock<HashMap<String, JoinHandle<()>>>,
}

impl ProbeScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `config` - 启动配置
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 过滤器配置不一致时返回错误
    pub fn new(config: SchedulerConfig) -> Result<Self, ConfigError> {
        let filter = ProbeFilter::new(config.disabled_probes, config.only_probes)?;
        if config.settings.buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "历史记录缓冲区大小不能为0".to_string(),
            ));
        }
        let journal_path = config
            .journal_path
            .unwrap_or_else(OutcomeJournal::default_path);

        Ok(Self {
            settings: Arc::new(config.settings),
            filter: Arc::new(filter),
            clock: Arc::new(SystemClock),
            journal: Arc::new(OutcomeJournal::new(journal_path)),
            probes: Vec::new(),
            tasks: RwLock::new(HashMap::new()),
        })
    }

    /// 使用指定的时钟，对之后注册的探针生效
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 注册一个探针
    ///
    /// # 参数
    /// * `check` - 探测器实现
    /// * `name` - 探针名称，在调度器内唯一
    /// * `description` - 探针描述
    /// * `options` - 探针配置项
    pub fn register(
        &mut self,
        check: Arc<dyn Check>,
        name: impl Into<String>,
        description: impl Into<String>,
        options: impl IntoIterator<Item = ProbeOption>,
    ) -> Result<Arc<Probe>, ConfigError> {
        let probe = Probe::new(check, name, description, options)?
            .with_settings(Arc::clone(&self.settings))
            .with_clock(Arc::clone(&self.clock))
            .with_journal(Arc::clone(&self.journal));

        if self.probes.iter().any(|p| p.name() == probe.name()) {
            return Err(ConfigError::ValidationError(format!(
                "探针名称重复: {}",
                probe.name()
            )));
        }

        let probe = Arc::new(probe);
        self.probes.push(Arc::clone(&probe));
        Ok(probe)
    }

    /// 启动所有探针的调度任务
    ///
    /// # 返回
    /// * `usize` - 新启动的任务数量
    pub async fn start(&self) -> usize {
        info!("启动探针调度器，探针数量: {}", self.probes.len());

        for name in self.filter.only().chain(self.filter.disabled()) {
            if !self.probes.iter().any(|p| p.name() == name) {
                warn!("过滤器中的探针不存在: {}", name);
            }
        }

        let mut tasks = self.tasks.write().await;
        let mut started = 0;
        for probe in &self.probes {
            if tasks.contains_key(probe.name()) {
                debug!("[{}] 已在运行，跳过", probe.name());
                continue;
            }
            let task = tokio::spawn(Arc::clone(probe).run(Arc::clone(&self.filter)));
            tasks.insert(probe.name().to_string(), task);
            started += 1;
        }

        info!("探针调度器启动完成");
        started
    }

    /// 停止所有调度任务和正在发送的告警
    pub async fn stop(&self) {
        info!("停止探针调度器");
        let mut tasks = self.tasks.write().await;
        for (name, task) in tasks.drain() {
            task.abort();
            debug!("[{}] 已停止", name);
        }
        for probe in &self.probes {
            probe.cancel_alert();
        }
        info!("探针调度器已停止");
    }

    /// 正在运行的调度任务数量
    pub async fn running_tasks(&self) -> usize {
        self.tasks
            .read()
            .await
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// 所有已注册的探针
    pub fn probes(&self) -> ProbeSet {
        self.probes.iter().cloned().collect()
    }

    /// 按名称查找探针
    pub fn probe(&self, name: &str) -> Option<Arc<Probe>> {
        self.probes.iter().find(|p| p.name() == name).cloned()
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn filter(&self) -> &ProbeFilter {
        &self.filter
    }

    pub fn journal(&self) -> &OutcomeJournal {
        &self.journal
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        // 不能在 drop 中 await，直接取出句柄中止
        for (_, task) in self.tasks.get_mut().drain() {
            task.abort();
        }
    }
}
