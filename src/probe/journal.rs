//! 探测结果日志文件
//!
//! 所有探针共享一个只追加的日志文件，每行一条 JSON 记录，仅供离线排查

use crate::probe::record::Record;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing::{error, info, warn};

/// 默认日志文件名
pub const DEFAULT_JOURNAL_NAME: &str = "prober.outcomes.log";

/// 日志文件中的一行
#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    probe: &'a str,
    #[serde(flatten)]
    record: &'a Record,
}

/// 只追加的探测结果日志
///
/// 文件在第一次写入时打开，且只尝试打开一次；打开或写入失败只记录日志。
#[derive(Debug)]
pub struct OutcomeJournal {
    path: PathBuf,
    file: OnceLock<Option<Mutex<File>>>,
}

impl OutcomeJournal {
    /// 创建写入指定路径的日志
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: OnceLock::new(),
        }
    }

    /// 默认路径：系统临时目录下的 `prober.outcomes.log`
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_JOURNAL_NAME)
    }

    /// 日志文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Option<Mutex<File>> {
        info!("使用探测结果日志文件: {}", self.path.display());
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                error!("打开探测结果日志文件失败 {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// 追加一条记录
    pub fn append(&self, probe: &str, record: &Record) {
        let Some(file) = self.file.get_or_init(|| self.open()) else {
            return;
        };

        let mut line = match serde_json::to_string(&JournalEntry { probe, record }) {
            Ok(line) => line,
            Err(e) => {
                warn!("[{}] 序列化探测记录失败: {}", probe, e);
                return;
            }
        };
        line.push('\n');

        let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            warn!("[{}] 写入探测结果日志失败: {}", probe, e);
        }
    }
}

impl Default for OutcomeJournal {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}
