//! 具体探测器实现
//!
//! HTTP 和 TCP 两种探测器，告警统一交给通知发送器

pub mod http;
pub mod tcp;

pub use http::HttpCheck;
pub use tcp::TcpCheck;

use crate::config::types::{ProbeConfig, ProbeKind};
use crate::error::{AlertError, CheckError};
use crate::notification::sender::{AlertMessage, NotificationSender};
use crate::probe::check::Check;
use crate::probe::record::RecordLog;
use crate::probe::state::DEFAULT_FAILURE_WINDOW;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 告警路由：发送器加上探针特定的webhook
#[derive(Clone)]
pub struct AlertRoute {
    sender: Arc<dyn NotificationSender>,
    webhook_url: Option<String>,
    failure_window: Duration,
}

impl AlertRoute {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            sender,
            webhook_url: None,
            failure_window: DEFAULT_FAILURE_WINDOW,
        }
    }

    pub fn with_webhook_url(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    /// 构建告警消息并发送
    ///
    /// 近期失败的时间窗口以 `now` 为终点，`now` 应来自探针的时钟。
    pub async fn deliver(
        &self,
        name: &str,
        description: &str,
        score: u64,
        records: &RecordLog,
        now: DateTime<Utc>,
    ) -> Result<(), AlertError> {
        let message = AlertMessage::new(
            name,
            description,
            score,
            records,
            now,
            self.failure_window,
        )
        .with_webhook_url(self.webhook_url.clone());
        self.sender.send_alert(&message).await
    }
}

impl fmt::Debug for AlertRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertRoute")
            .field("webhook_url", &self.webhook_url)
            .field("failure_window", &self.failure_window)
            .finish_non_exhaustive()
    }
}

/// 根据探针配置创建探测器
///
/// # 参数
/// * `config` - 探针配置
/// * `alert` - 告警路由，探针特定的webhook会覆盖其中的设置
///
/// # 返回
/// * `Result<Arc<dyn Check>, CheckError>` - 探测参数无效时返回错误
pub fn build_check(config: &ProbeConfig, alert: AlertRoute) -> Result<Arc<dyn Check>, CheckError> {
    let alert = match &config.feishu_webhook_url {
        Some(url) => alert.with_webhook_url(Some(url.clone())),
        None => alert,
    };

    match config.kind {
        ProbeKind::Http => Ok(Arc::new(HttpCheck::from_config(config, alert)?)),
        ProbeKind::Tcp => Ok(Arc::new(TcpCheck::from_config(config, alert)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notification::sender::NoOpSender;
    use crate::probe::outcome::Outcome;
    use crate::probe::state::{Probe, ProbeOption, ProbeSettings};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// 记录收到的告警消息
    #[derive(Default)]
    struct CapturingSender {
        messages: Mutex<Vec<AlertMessage>>,
    }

    #[async_trait]
    impl NotificationSender for CapturingSender {
        async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn test_connection(&self) -> Result<(), AlertError> {
            Ok(())
        }
    }

    fn probe_config(kind: ProbeKind) -> ProbeConfig {
        ProbeConfig {
            name: "p".to_string(),
            description: None,
            kind,
            url: Some("http://127.0.0.1:1/".to_string()),
            target: Some("127.0.0.1:1".to_string()),
            method: "GET".to_string(),
            expected_status_codes: vec![200],
            want_in_response: None,
            want_headers: BTreeMap::new(),
            timeout_seconds: 1,
            interval_seconds: None,
            failure_penalty: 10,
            success_reward: 1,
            feishu_webhook_url: Some("https://hook.example.com".to_string()),
        }
    }

    #[test]
    fn test_build_check_for_each_kind() {
        let route = AlertRoute::new(Arc::new(NoOpSender));
        assert!(build_check(&probe_config(ProbeKind::Http), route.clone()).is_ok());
        assert!(build_check(&probe_config(ProbeKind::Tcp), route.clone()).is_ok());

        let mut missing = probe_config(ProbeKind::Tcp);
        missing.target = None;
        assert!(matches!(
            build_check(&missing, route),
            Err(CheckError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_route_delivers_message() {
        let route = AlertRoute::new(Arc::new(NoOpSender))
            .with_webhook_url(Some("https://hook.example.com".to_string()));
        assert!(format!("{route:?}").contains("hook.example.com"));
        route
            .deliver("p", "d", 10, &RecordLog::new(), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_alert_window_follows_probe_clock() {
        let start = Utc.with_ymd_and_hms(1998, 11, 19, 15, 14, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let sender = Arc::new(CapturingSender::default());
        let check = build_check(
            &probe_config(ProbeKind::Tcp),
            AlertRoute::new(sender.clone()),
        )
        .unwrap();
        let probe = Arc::new(
            Probe::new(check, "db", "TCP 127.0.0.1:1", [ProbeOption::FailurePenalty(10)])
                .unwrap()
                .with_settings(Arc::new(ProbeSettings {
                    alert_threshold: 30,
                    ..Default::default()
                }))
                .with_clock(clock.clone()),
        );

        for _ in 0..3 {
            probe.handle_outcome(Outcome::failed_with("connection refused"));
            clock.advance(Duration::from_secs(60));
        }
        probe.wait_for_alert().await;

        let messages = sender.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, start + chrono::Duration::minutes(3));
        assert_eq!(messages[0].recent_failures.len(), 3);
        assert_eq!(
            messages[0].webhook_url.as_deref(),
            Some("https://hook.example.com")
        );
    }
}
