//! 消息模板模块
//!
//! 使用 Handlebars 渲染告警消息内容

use crate::error::AlertError;
use crate::notification::sender::AlertMessage;
use handlebars::Handlebars;
use serde::Serialize;

const TEMPLATE_NAME: &str = "alert";

/// 默认的告警消息模板
pub const DEFAULT_ALERT_TEMPLATE: &str = r#"🚨 **探针告警**
- **探针名称**: {{probe_name}}
- **描述**: {{description}}
- **分数**: {{score}}
- **告警时间**: {{timestamp}}
- **历史记录**: {{total_records}} 条
{{#if failures}}
**近期失败** ({{failure_count}} 次):
{{#each failures}}
- {{time_millis}} ({{ago}}): {{info}}{{#if info_url}} [详情]({{info_url}}){{/if}}
{{/each}}
{{else}}
近期没有失败记录
{{/if}}"#;

/// 模板中每条失败记录的数据
#[derive(Debug, Serialize)]
struct FailureContext<'a> {
    time_millis: &'a str,
    ago: String,
    info: &'a str,
    info_url: Option<&'a str>,
}

/// 模板上下文数据
#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    title: &'a str,
    probe_name: &'a str,
    description: &'a str,
    score: u64,
    timestamp: String,
    total_records: usize,
    failure_count: usize,
    failures: Vec<FailureContext<'a>>,
}

impl<'a> TemplateContext<'a> {
    fn from_message(message: &'a AlertMessage) -> Self {
        let failures = message
            .recent_failures
            .iter()
            .map(|record| FailureContext {
                time_millis: &record.time_millis,
                ago: record.ago(message.timestamp),
                info: record.outcome.info().unwrap_or("N/A"),
                info_url: match &record.outcome {
                    crate::probe::Outcome::Pass { info_url, .. }
                    | crate::probe::Outcome::Fail { info_url, .. } => info_url.as_deref(),
                },
            })
            .collect::<Vec<_>>();

        Self {
            title: &message.title,
            probe_name: &message.probe_name,
            description: &message.description,
            score: message.score,
            timestamp: message.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            total_records: message.total_records,
            failure_count: failures.len(),
            failures,
        }
    }
}

/// 告警消息模板
pub struct AlertTemplate {
    registry: Handlebars<'static>,
}

impl AlertTemplate {
    /// 编译模板
    ///
    /// # 参数
    /// * `template` - 自定义模板，`None` 时使用默认模板
    ///
    /// # 返回
    /// * `Result<Self, AlertError>` - 模板语法错误时返回错误
    pub fn new(template: Option<&str>) -> Result<Self, AlertError> {
        let mut registry = Handlebars::new();
        // 消息是 Markdown 而不是 HTML
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(TEMPLATE_NAME, template.unwrap_or(DEFAULT_ALERT_TEMPLATE))
            .map_err(|e| AlertError::TemplateError(e.to_string()))?;
        Ok(Self { registry })
    }

    /// 渲染告警消息
    pub fn render(&self, message: &AlertMessage) -> Result<String, AlertError> {
        self.registry
            .render(TEMPLATE_NAME, &TemplateContext::from_message(message))
            .map_err(|e| AlertError::TemplateError(e.to_string()))
    }
}

impl Default for AlertTemplate {
    fn default() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        // 内置模板在测试中验证过语法
        let _ = registry.register_template_string(TEMPLATE_NAME, DEFAULT_ALERT_TEMPLATE);
        Self { registry }
    }
}
