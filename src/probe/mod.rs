//! 探测引擎模块
//!
//! 提供探针状态机、周期调度、历史记录和严重程度排序

pub mod check;
pub mod filter;
pub mod journal;
pub mod ordering;
pub mod outcome;
pub mod record;
pub mod scheduler;
pub mod state;

// 重新导出主要类型
pub use check::Check;
pub use filter::ProbeFilter;
pub use journal::OutcomeJournal;
pub use ordering::{ProbeSet, ProbeSnapshot};
pub use outcome::Outcome;
pub use record::{Record, RecordLog};
pub use scheduler::{ProbeScheduler, SchedulerConfig};
pub use state::{Probe, ProbeOption, ProbeSettings, ReportFn, SilenceTime};
