//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体、命令行覆盖和验证逻辑

use crate::probe::scheduler::SchedulerConfig;
use crate::probe::state::{
    ProbeSettings, DEFAULT_ALERT_THRESHOLD, DEFAULT_BUFFER_SIZE, DEFAULT_FAILURE_PENALTY,
    DEFAULT_FAILURE_WINDOW, DEFAULT_SUCCESS_REWARD,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和探针列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 探针配置列表
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 达到该分数即告警
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u64,
    /// 全局关闭告警
    #[serde(default)]
    pub alerts_disabled: bool,
    /// 两次告警之间的最短间隔（秒）
    #[serde(default = "default_max_alert_frequency")]
    pub max_alert_frequency_seconds: u64,
    /// 每个探针保留的记录数
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// 探针未指定间隔时使用的探测间隔（秒）
    #[serde(default = "default_interval")]
    pub default_interval_seconds: u64,
    /// 结果日志文件路径，未指定时写入临时目录
    pub journal_path: Option<PathBuf>,
    /// 禁用的探针
    #[serde(default)]
    pub disabled_probes: Vec<String>,
    /// 仅启用的探针
    #[serde(default)]
    pub only_probes: Vec<String>,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 默认飞书webhook URL
    pub feishu_webhook_url: Option<String>,
    /// 飞书签名密钥
    pub feishu_secret: Option<String>,
    /// 告警消息模板
    pub message_template: Option<String>,
    /// Web 服务器配置
    pub web: Option<WebConfig>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            alerts_disabled: false,
            max_alert_frequency_seconds: default_max_alert_frequency(),
            buffer_size: default_buffer_size(),
            default_interval_seconds: default_interval(),
            journal_path: None,
            disabled_probes: Vec::new(),
            only_probes: Vec::new(),
            log_level: default_log_level(),
            feishu_webhook_url: None,
            feishu_secret: None,
            message_template: None,
            web: None,
        }
    }
}

/// 探测类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// HTTP/HTTPS 请求
    #[default]
    Http,
    /// TCP 连接
    Tcp,
}

/// 探针配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    /// 探针名称
    pub name: String,
    /// 探针描述
    pub description: Option<String>,
    /// 探测类型
    #[serde(default)]
    pub kind: ProbeKind,
    /// HTTP 探测的URL
    pub url: Option<String>,
    /// TCP 探测的地址，`host:port`
    pub target: Option<String>,
    /// HTTP方法
    #[serde(default = "default_method")]
    pub method: String,
    /// 期望的状态码列表
    #[serde(default = "default_status_codes")]
    pub expected_status_codes: Vec<u16>,
    /// 响应体中必须包含的文本
    pub want_in_response: Option<String>,
    /// 响应中必须包含的头
    #[serde(default)]
    pub want_headers: BTreeMap<String, String>,
    /// 单次请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// 探测间隔（秒）
    pub interval_seconds: Option<u64>,
    /// 每次失败增加的分数
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: u32,
    /// 每次成功减少的分数
    #[serde(default = "default_success_reward")]
    pub success_reward: u32,
    /// 探针特定的飞书webhook URL
    pub feishu_webhook_url: Option<String>,
}

impl ProbeConfig {
    /// 探针描述，未配置时根据探测目标生成
    pub fn description_or_default(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        match self.kind {
            ProbeKind::Http => format!(
                "{} {}",
                self.method.to_uppercase(),
                self.url.as_deref().unwrap_or_default()
            ),
            ProbeKind::Tcp => format!("TCP {}", self.target.as_deref().unwrap_or_default()),
        }
    }

    /// 探测间隔，未配置时使用全局默认值
    pub fn interval(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(
            self.interval_seconds
                .unwrap_or(global.default_interval_seconds),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Web 服务器配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// 是否启用 Web 功能
    #[serde(default)]
    pub enabled: bool,
    /// 监听端口
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// 绑定地址
    #[serde(default = "default_web_bind_address")]
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_web_port(),
            bind_address: default_web_bind_address(),
        }
    }
}

/// 命令行对配置文件的覆盖，`None` 表示不覆盖
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub alert_threshold: Option<u64>,
    pub alerts_disabled: bool,
    pub disabled_probes: Option<Vec<String>>,
    pub only_probes: Option<Vec<String>>,
    pub log_level: Option<String>,
}

impl Config {
    /// 应用命令行覆盖
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(threshold) = overrides.alert_threshold {
            self.global.alert_threshold = threshold;
        }
        if overrides.alerts_disabled {
            self.global.alerts_disabled = true;
        }
        if let Some(disabled) = &overrides.disabled_probes {
            self.global.disabled_probes = disabled.clone();
        }
        if let Some(only) = &overrides.only_probes {
            self.global.only_probes = only.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.global.log_level = level.clone();
        }
    }

    /// 转换为调度器配置
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            settings: ProbeSettings {
                alert_threshold: self.global.alert_threshold,
                alerts_disabled: self.global.alerts_disabled,
                max_alert_frequency: Duration::from_secs(self.global.max_alert_frequency_seconds),
                buffer_size: self.global.buffer_size,
                failure_window: DEFAULT_FAILURE_WINDOW,
            },
            disabled_probes: self.global.disabled_probes.clone(),
            only_probes: self.global.only_probes.clone(),
            journal_path: self.global.journal_path.clone(),
        }
    }

    /// Web 配置，未配置时返回默认值
    pub fn web(&self) -> WebConfig {
        self.global.web.clone().unwrap_or_default()
    }
}

// 默认值函数
fn default_alert_threshold() -> u64 {
    DEFAULT_ALERT_THRESHOLD
}
fn default_max_alert_frequency() -> u64 {
    15 * 60
}
fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}
fn default_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_method() -> String {
    "GET".to_string()
}
fn default_status_codes() -> Vec<u16> {
    vec![200]
}
fn default_timeout() -> u64 {
    10
}
fn default_failure_penalty() -> u32 {
    DEFAULT_FAILURE_PENALTY
}
fn default_success_reward() -> u32 {
    DEFAULT_SUCCESS_REWARD
}
fn default_web_port() -> u16 {
    8080
}
fn default_web_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    if global.alert_threshold == 0 {
        return Err("告警阈值不能为0".to_string());
    }
    if global.buffer_size == 0 {
        return Err("历史记录数量不能为0".to_string());
    }
    if global.default_interval_seconds == 0 {
        return Err("默认探测间隔不能为0".to_string());
    }

    if crate::logging::parse_level(&global.log_level).is_err() {
        return Err(format!("无效的日志级别: {}", global.log_level));
    }

    if let Some(ref web_config) = global.web {
        if web_config.enabled {
            if web_config.port == 0 {
                return Err("无效的Web服务器端口: 端口不能为0".to_string());
            }
            if web_config.bind_address.is_empty() {
                return Err("Web服务器绑定地址不能为空".to_string());
            }
        }
    }

    let disabled: HashSet<&str> = global.disabled_probes.iter().map(|s| s.trim()).collect();
    if let Some(name) = global
        .only_probes
        .iter()
        .map(|s| s.trim())
        .find(|name| !name.is_empty() && disabled.contains(name))
    {
        return Err(format!("探针 {name} 不能同时被禁用和仅启用"));
    }

    if config.probes.is_empty() {
        return Err("至少需要配置一个探针".to_string());
    }

    let mut names = HashSet::new();
    for probe in &config.probes {
        validate_probe(probe)?;
        if !names.insert(probe.name.as_str()) {
            return Err(format!("探针名称重复: {}", probe.name));
        }
    }

    Ok(())
}

fn validate_probe(probe: &ProbeConfig) -> Result<(), String> {
    if probe.name.trim().is_empty() {
        return Err("探针名称不能为空".to_string());
    }
    if probe.interval_seconds == Some(0) {
        return Err(format!("探针 {} 的探测间隔不能为0", probe.name));
    }
    if probe.timeout_seconds == 0 {
        return Err(format!("探针 {} 的超时时间不能为0", probe.name));
    }

    match probe.kind {
        ProbeKind::Http => {
            let url = probe
                .url
                .as_deref()
                .ok_or_else(|| format!("HTTP探针 {} 必须指定url", probe.name))?;
            match reqwest::Url::parse(url) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => return Err(format!("探针 {} 的URL格式无效: {}", probe.name, url)),
            }

            if probe.expected_status_codes.is_empty() {
                return Err(format!("探针 {} 必须指定期望的状态码", probe.name));
            }
            for &code in &probe.expected_status_codes {
                if !(100..=599).contains(&code) {
                    return Err(format!("探针 {} 的状态码 {} 无效", probe.name, code));
                }
            }

            let valid_methods = ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"];
            if !valid_methods.contains(&probe.method.to_uppercase().as_str()) {
                return Err(format!(
                    "探针 {} 的HTTP方法 {} 无效，支持的方法: {:?}",
                    probe.name, probe.method, valid_methods
                ));
            }
        }
        ProbeKind::Tcp => {
            let target = probe
                .target
                .as_deref()
                .ok_or_else(|| format!("TCP探针 {} 必须指定target", probe.name))?;
            let valid = target
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(format!(
                    "探针 {} 的地址格式无效: {}，应为 host:port",
                    probe.name, target
                ));
            }
        }
    }

    Ok(())
}
