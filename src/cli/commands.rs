//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::checks::{build_check, AlertRoute};
use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{load_config, Config, ProbeConfig};
use crate::error::Result;
use crate::notification::sender::{AlertMessage, LogSender, NoOpSender};
use crate::notification::{AlertTemplate, FeishuSender, NotificationSender};
use crate::probe::outcome::Outcome;
use crate::probe::record::{Record, RecordLog};
use crate::probe::{ProbeFilter, ProbeOption, ProbeScheduler};
use crate::web::{self, WebAppState};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 根据配置创建通知发送器
///
/// 全局或任一探针配置了飞书webhook时使用飞书，否则只写日志。
pub fn build_sender(config: &Config) -> Result<Arc<dyn NotificationSender>> {
    let has_webhook = config.global.feishu_webhook_url.is_some()
        || config.probes.iter().any(|p| p.feishu_webhook_url.is_some());
    if !has_webhook {
        info!("未配置飞书webhook，告警仅写入日志");
        return Ok(Arc::new(LogSender));
    }

    let template = AlertTemplate::new(config.global.message_template.as_deref())?;
    let sender = FeishuSender::new(
        config.global.feishu_webhook_url.clone(),
        config.global.feishu_secret.clone(),
        template,
    )?;
    Ok(Arc::new(sender))
}

/// 根据配置创建调度器并注册所有探针
///
/// # 参数
/// * `config` - 已验证的配置
/// * `sender` - 告警发送器
///
/// # 返回
/// * `Result<ProbeScheduler>` - 尚未启动的调度器
pub fn build_scheduler(config: &Config, sender: Arc<dyn NotificationSender>) -> Result<ProbeScheduler> {
    let scheduler_config = config.scheduler_config();
    let route = AlertRoute::new(sender).with_failure_window(scheduler_config.settings.failure_window);
    let mut scheduler = ProbeScheduler::new(scheduler_config)?;

    for probe in &config.probes {
        let check = build_check(probe, route.clone())?;
        scheduler.register(
            check,
            probe.name.clone(),
            probe.description_or_default(),
            probe_options(probe, config),
        )?;
    }
    Ok(scheduler)
}

fn probe_options(probe: &ProbeConfig, config: &Config) -> Vec<ProbeOption> {
    vec![
        ProbeOption::Interval(probe.interval(&config.global)),
        ProbeOption::FailurePenalty(probe.failure_penalty),
        ProbeOption::SuccessReward(probe.success_reward),
    ]
}

/// 等待 Ctrl+C
async fn wait_for_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("监听关闭信号失败: {}", e);
    }
}

/// 启动命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config_path = args.get_config_path();
        info!("加载配置文件: {}", config_path.display());
        let config = load_config(&config_path, &args.overrides()).await?;

        let sender = build_sender(&config)?;
        let scheduler = build_scheduler(&config, sender)?;
        let started = scheduler.start().await;
        info!("已启动 {} 个探针", started);

        let web_config = config.web();
        let (web_stop, web_task) = if web_config.enabled {
            let (tx, rx) = oneshot::channel::<()>();
            let state = WebAppState::new(scheduler.probes());
            let task = tokio::spawn(async move {
                let shutdown = async move {
                    let _ = rx.await;
                };
                if let Err(e) = web::serve(&web_config, state, shutdown).await {
                    error!("Web服务器异常退出: {}", e);
                }
            });
            (Some(tx), Some(task))
        } else {
            (None, None)
        };

        wait_for_shutdown().await;
        info!("收到关闭信号，正在停止");

        if let Some(tx) = web_stop {
            let _ = tx.send(());
        }
        if let Some(task) = web_task {
            if let Err(e) = task.await {
                warn!("等待Web服务器停止失败: {}", e);
            }
        }
        scheduler.stop().await;
        Ok(())
    }
}

/// 单个探针的一次性检测结果
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub description: String,
    pub outcome: Outcome,
    pub duration_ms: u128,
}

/// 一次性检测命令，不发送告警也不计分
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { probe, format } = &args.command {
            let config = load_config(&args.get_config_path(), &args.overrides()).await?;
            let reports = self.run_checks(&config, probe.as_deref()).await?;
            self.print_reports(&reports, *format)?;

            let failed = reports.iter().filter(|r| r.outcome.is_fail()).count();
            if failed > 0 {
                return Err(anyhow::anyhow!("{} 个探针检测失败", failed).into());
            }
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 对选中的探针各执行一次探测
    ///
    /// # 参数
    /// * `config` - 配置
    /// * `only` - 仅检测该名称的探针
    pub async fn run_checks(&self, config: &Config, only: Option<&str>) -> Result<Vec<CheckReport>> {
        let filter = ProbeFilter::new(
            config.global.disabled_probes.clone(),
            config.global.only_probes.clone(),
        )?;

        let selected: Vec<&ProbeConfig> = match only {
            Some(name) => {
                let probe = config
                    .probes
                    .iter()
                    .find(|p| p.name == name)
                    .ok_or_else(|| anyhow::anyhow!("探针不存在: {}", name))?;
                vec![probe]
            }
            None => config
                .probes
                .iter()
                .filter(|p| filter.is_enabled(&p.name))
                .collect(),
        };

        let route = AlertRoute::new(Arc::new(NoOpSender));
        let mut pending = Vec::with_capacity(selected.len());
        for probe in selected {
            let check = build_check(probe, route.clone())?;
            let interval = probe.interval(&config.global);
            pending.push(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(interval, check.probe()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Outcome::failed_with(format!(
                        "{} timed out (with probe interval {:.1} sec)",
                        probe.name,
                        interval.as_secs_f64()
                    )),
                };
                CheckReport {
                    name: probe.name.clone(),
                    description: probe.description_or_default(),
                    outcome,
                    duration_ms: started.elapsed().as_millis(),
                }
            });
        }

        // 并发探测，结果保持配置中的顺序
        let reports = join_all(pending).await;
        Ok(reports)
    }

    fn print_reports(&self, reports: &[CheckReport], format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(reports)?);
            }
            OutputFormat::Text => {
                for report in reports {
                    let mark = if report.outcome.is_pass() { "✓" } else { "✗" };
                    println!(
                        "{} {} ({}) {}ms",
                        mark, report.name, report.description, report.duration_ms
                    );
                    if let Some(info) = report.outcome.info() {
                        println!("    {info}");
                    }
                }
            }
        }
        Ok(())
    }
}

/// 配置验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { verbose } = &args.command {
            let config_path = args.get_config_path();
            println!("验证配置文件: {}", config_path.display());
            let config = load_config(&config_path, &args.overrides()).await?;

            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个探针配置", config.probes.len());
            if *verbose {
                println!("全局配置:");
                println!("  告警阈值: {}", config.global.alert_threshold);
                println!("  告警开关: {}", if config.global.alerts_disabled { "关闭" } else { "开启" });
                println!("  告警最小间隔: {}秒", config.global.max_alert_frequency_seconds);
                println!("  历史记录数: {}", config.global.buffer_size);
                println!("  默认探测间隔: {}秒", config.global.default_interval_seconds);
                println!("探针配置:");
                for (i, probe) in config.probes.iter().enumerate() {
                    println!("  {}. {} ({})", i + 1, probe.name, probe.description_or_default());
                    println!("     间隔: {}秒", probe.interval(&config.global).as_secs());
                    println!("     失败惩罚: {} / 成功奖励: {}", probe.failure_penalty, probe.success_reward);
                }
            }
        }
        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 测试通知命令
pub struct TestNotificationCommand;

#[async_trait]
impl Command for TestNotificationCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::TestNotification { probe } = &args.command {
            let config = load_config(&args.get_config_path(), &args.overrides()).await?;
            let sender = build_sender(&config)?;

            let webhook_url = match probe {
                Some(name) => config
                    .probes
                    .iter()
                    .find(|p| &p.name == name)
                    .ok_or_else(|| anyhow::anyhow!("探针不存在: {}", name))?
                    .feishu_webhook_url
                    .clone(),
                None => None,
            };

            let now = chrono::Utc::now();
            let mut records = RecordLog::new();
            records.push_bounded(
                Record::new(now, Outcome::failed_with("this is a test alert")),
                1,
            );
            let name = probe.as_deref().unwrap_or("TestProbe");
            let message = AlertMessage::new(
                name,
                "测试告警",
                config.global.alert_threshold,
                &records,
                now,
                Duration::from_secs(60),
            )
            .with_webhook_url(webhook_url);

            println!("发送测试告警...");
            sender.send_alert(&message).await?;
            println!("✓ 测试告警发送成功");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn sample_config(url: &str) -> Config {
        toml::from_str(&format!(
            r#"
[global]
default_interval_seconds = 30

[[probes]]
name = "homepage"
url = "{url}/"

[[probes]]
name = "api"
url = "{url}/api"
interval_seconds = 5
failure_penalty = 25
"#
        ))
        .unwrap()
    }

    #[test]
    fn test_build_sender_without_webhook_logs() {
        let config = sample_config("http://127.0.0.1:1");
        assert!(build_sender(&config).is_ok());
    }

    #[test]
    fn test_build_scheduler_registers_probes() {
        let mut config = sample_config("http://127.0.0.1:1");
        let dir = tempfile::tempdir().unwrap();
        config.global.journal_path = Some(dir.path().join("journal.log"));

        let scheduler = build_scheduler(&config, Arc::new(NoOpSender)).unwrap();
        let homepage = scheduler.probe("homepage").unwrap();
        let api = scheduler.probe("api").unwrap();

        assert_eq!(homepage.interval(), Duration::from_secs(30));
        assert_eq!(homepage.description(), "GET http://127.0.0.1:1/");
        assert_eq!(api.interval(), Duration::from_secs(5));
        assert_eq!(api.failure_penalty(), 25);
        assert_eq!(scheduler.probes().len(), 2);
    }

    #[tokio::test]
    async fn test_check_command_reports_each_probe() {
        let mut server = mockito::Server::new_async().await;
        let _root = server.mock("GET", "/").with_status(200).create_async().await;
        let _api = server.mock("GET", "/api").with_status(500).create_async().await;

        let config = sample_config(&server.url());
        let reports = CheckCommand.run_checks(&config, None).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].outcome.is_pass());
        assert!(reports[1].outcome.is_fail());

        let single = CheckCommand.run_checks(&config, Some("api")).await.unwrap();
        assert_eq!(single.len(), 1);
        assert!(CheckCommand.run_checks(&config, Some("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_check_command_respects_only_filter() {
        let mut server = mockito::Server::new_async().await;
        let _root = server.mock("GET", "/").with_status(200).create_async().await;

        let mut config = sample_config(&server.url());
        config.global.only_probes = vec!["homepage".to_string()];
        let reports = CheckCommand.run_checks(&config, None).await.unwrap();
        let names: Vec<&str> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["homepage"]);
    }

    #[tokio::test]
    async fn test_validate_and_check_via_args() {
        let mut server = mockito::Server::new_async().await;
        let _root = server.mock("GET", "/").with_status(200).create_async().await;

        let file = write_config(&format!(
            r#"
[[probes]]
name = "homepage"
url = "{}/"
"#,
            server.url()
        ));
        let path = file.path().to_str().unwrap();

        let args = Args::try_parse_from(["service-prober", "-c", path, "validate", "-v"]).unwrap();
        ValidateCommand.execute(&args).await.unwrap();

        let args = Args::try_parse_from(["service-prober", "-c", path, "check"]).unwrap();
        CheckCommand.execute(&args).await.unwrap();

        let args = Args::try_parse_from([
            "service-prober",
            "-c",
            path,
            "check",
            "--disabled-probes",
            "homepage",
            "--only-probes",
            "homepage",
        ])
        .unwrap();
        assert!(CheckCommand.execute(&args).await.is_err());
    }
}
