//! TCP探测器实现

use crate::checks::AlertRoute;
use crate::config::types::ProbeConfig;
use crate::error::{AlertError, CheckError};
use crate::probe::check::Check;
use crate::probe::outcome::Outcome;
use crate::probe::record::RecordLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// 检查目标能否在超时内建立 TCP 连接
#[derive(Debug)]
pub struct TcpCheck {
    /// `host:port`
    target: String,
    timeout: Duration,
    alert: AlertRoute,
}

impl TcpCheck {
    pub fn new(target: impl Into<String>, timeout: Duration, alert: AlertRoute) -> Self {
        Self {
            target: target.into(),
            timeout,
            alert,
        }
    }

    /// 根据探针配置创建
    pub fn from_config(config: &ProbeConfig, alert: AlertRoute) -> Result<Self, CheckError> {
        let target = config
            .target
            .clone()
            .ok_or_else(|| CheckError::Invalid(format!("TCP探针 {} 缺少target", config.name)))?;
        Ok(Self::new(target, config.timeout(), alert))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn connect(&self) -> Result<(), CheckError> {
        match timeout(self.timeout, TcpStream::connect(&self.target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => {
                debug!("连接 {} 失败: {}", self.target, e);
                Err(CheckError::Connect {
                    target: format!("{}: {}", self.target, e),
                })
            }
            Err(_) => Err(CheckError::Timeout),
        }
    }
}

#[async_trait]
impl Check for TcpCheck {
    async fn probe(&self) -> Outcome {
        match self.connect().await {
            Ok(()) => Outcome::passed(),
            Err(e) => Outcome::failed_with_info(
                &e,
                format!(
                    "failed to dial tcp {} within {:.1} sec: {}",
                    self.target,
                    self.timeout.as_secs_f64(),
                    e
                ),
                None,
            ),
        }
    }

    async fn alert(
        &self,
        name: &str,
        description: &str,
        score: u64,
        records: &RecordLog,
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        self.alert.deliver(name, description, score, records, now).await
    }
}
