//! 飞书通知发送器模块
//!
//! 实现飞书webhook告警，支持签名校验

use crate::error::AlertError;
use crate::notification::sender::{AlertMessage, NotificationSender};
use crate::notification::template::AlertTemplate;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, error, info};

/// 飞书通知发送器
pub struct FeishuSender {
    /// HTTP客户端
    client: Client,
    /// 默认webhook URL
    default_webhook_url: Option<String>,
    /// 签名密钥
    secret: Option<String>,
    /// 消息模板
    template: AlertTemplate,
}

impl FeishuSender {
    /// 创建新的飞书发送器
    ///
    /// # 参数
    /// * `default_webhook_url` - 默认webhook URL
    /// * `secret` - 签名密钥，未设置时不签名
    /// * `template` - 消息模板
    ///
    /// # 返回
    /// * `Result<Self, AlertError>` - 发送器实例
    pub fn new(
        default_webhook_url: Option<String>,
        secret: Option<String>,
        template: AlertTemplate,
    ) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AlertError::ConfigError(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            default_webhook_url,
            secret,
            template,
        })
    }

    /// 计算签名
    ///
    /// 以 `timestamp + "\n" + secret` 为密钥对空消息做 HmacSHA256，再进行 Base64 编码
    pub fn sign(timestamp: i64, secret: &str) -> Result<String, AlertError> {
        let key = format!("{timestamp}\n{secret}");
        let mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
            .map_err(|e| AlertError::ConfigError(format!("签名密钥无效: {e}")))?;
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// 构建飞书消息体
    fn build_message_body(&self, title: &str, content: &str) -> Result<Value, AlertError> {
        let mut body = json!({
            "msg_type": "interactive",
            "card": {
                "elements": [
                    {
                        "tag": "div",
                        "text": {
                            "content": content,
                            "tag": "lark_md"
                        }
                    }
                ],
                "header": {
                    "title": {
                        "content": title,
                        "tag": "plain_text"
                    },
                    "template": "red"
                }
            }
        });

        if let Some(secret) = &self.secret {
            let timestamp = chrono::Utc::now().timestamp();
            body["timestamp"] = json!(timestamp.to_string());
            body["sign"] = json!(Self::sign(timestamp, secret)?);
        }

        Ok(body)
    }

    /// 发送消息到飞书
    async fn send_to_webhook(&self, webhook_url: &str, body: &Value) -> Result<(), AlertError> {
        debug!("发送消息到飞书webhook: {}", webhook_url);

        let response = self.client.post(webhook_url).json(body).send().await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            error!("飞书消息发送失败: {} - {}", status, text);
            return Err(AlertError::SendError(format!("HTTP {status}")));
        }

        // 飞书在业务错误时同样返回 200，错误码在响应体中
        if let Ok(reply) = serde_json::from_str::<Value>(&text) {
            let code = reply
                .get("code")
                .or_else(|| reply.get("StatusCode"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if code != 0 {
                let msg = reply
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                error!("飞书返回错误: {} - {}", code, msg);
                return Err(AlertError::SendError(format!("飞书错误码 {code}: {msg}")));
            }
        }

        info!("飞书消息发送成功");
        Ok(())
    }
}

#[async_trait]
impl NotificationSender for FeishuSender {
    async fn send_alert(&self, message: &AlertMessage) -> Result<(), AlertError> {
        let webhook_url = message
            .webhook_url
            .as_deref()
            .or(self.default_webhook_url.as_deref())
            .ok_or_else(|| {
                AlertError::ConfigError(format!(
                    "探针 {} 未配置飞书webhook URL",
                    message.probe_name
                ))
            })?;

        let content = self.template.render(message)?;
        let body = self.build_message_body(&message.title, &content)?;
        self.send_to_webhook(webhook_url, &body).await
    }

    async fn test_connection(&self) -> Result<(), AlertError> {
        let webhook_url = self
            .default_webhook_url
            .as_deref()
            .ok_or_else(|| AlertError::ConfigError("未配置飞书webhook URL".to_string()))?;

        let body = self.build_message_body(
            "连接测试",
            "这是一条测试消息，用于验证飞书webhook连接是否正常。",
        )?;
        self.send_to_webhook(webhook_url, &body).await
    }
}
