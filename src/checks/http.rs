//! HTTP探测器实现
//!
//! 检查状态码、响应头和响应体内容

use crate::checks::AlertRoute;
use crate::config::types::ProbeConfig;
use crate::error::{AlertError, CheckError};
use crate::probe::check::Check;
use crate::probe::outcome::Outcome;
use crate::probe::record::RecordLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONNECTION;
use reqwest::{Client, Method, Response};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// 允许读取的最大响应体字节数
pub const MAX_RESPONSE_BYTES: usize = 1_000_000;

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP探测器
#[derive(Debug)]
pub struct HttpCheck {
    /// HTTP客户端
    client: Client,
    url: String,
    method: Method,
    expected_status_codes: Vec<u16>,
    want_in_response: Option<String>,
    want_headers: BTreeMap<String, String>,
    alert: AlertRoute,
}

impl HttpCheck {
    /// 创建新的HTTP探测器，默认 `GET` 并期望 200
    ///
    /// # 参数
    /// * `url` - 目标URL
    /// * `timeout` - 单次请求超时
    /// * `alert` - 告警路由
    pub fn new(url: impl Into<String>, timeout: Duration, alert: AlertRoute) -> Result<Self, CheckError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            method: Method::GET,
            expected_status_codes: vec![200],
            want_in_response: None,
            want_headers: BTreeMap::new(),
            alert,
        })
    }

    /// 根据探针配置创建
    pub fn from_config(config: &ProbeConfig, alert: AlertRoute) -> Result<Self, CheckError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| CheckError::Invalid(format!("HTTP探针 {} 缺少url", config.name)))?;
        let method = Method::from_str(&config.method.to_uppercase())
            .map_err(|_| CheckError::Invalid(format!("无效的HTTP方法: {}", config.method)))?;

        let mut check = Self::new(url, config.timeout(), alert)?
            .with_method(method)
            .with_expected_status_codes(config.expected_status_codes.clone());
        if let Some(want) = &config.want_in_response {
            check = check.with_want_in_response(want.clone());
        }
        for (name, value) in &config.want_headers {
            check = check.with_want_header(name.clone(), value.clone());
        }
        Ok(check)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_expected_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.expected_status_codes = codes;
        self
    }

    /// 响应体必须包含的文本
    pub fn with_want_in_response(mut self, want: impl Into<String>) -> Self {
        self.want_in_response = Some(want.into());
        self
    }

    /// 响应中必须出现的头及其值，名称不区分大小写
    pub fn with_want_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.want_headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 执行请求并检查响应
    async fn perform_request(&self) -> Result<(), Outcome> {
        let response = self
            .client
            .request(self.method.clone(), &self.url)
            .header(CONNECTION, "close")
            .send()
            .await
            .map_err(|e| {
                Outcome::failed_with_info(
                    &e,
                    format!("{} {} failed: {}", self.method, self.url, format_request_error(&e)),
                    Some(self.url.clone()),
                )
            })?;

        let status = response.status().as_u16();
        if !self.expected_status_codes.contains(&status) {
            return Err(Outcome::failed_with_info(
                format!("bad status code {status}"),
                format!(
                    "{} {} returned HTTP {}, want one of {:?}",
                    self.method, self.url, status, self.expected_status_codes
                ),
                Some(self.url.clone()),
            ));
        }

        self.check_headers(&response)?;

        if let Some(want) = &self.want_in_response {
            let body = self.read_body(response).await?;
            if !body.contains(want.as_str()) {
                return Err(Outcome::failed_with_info(
                    format!("response missing {want:?}"),
                    format!(
                        "{} {} response body does not contain {:?}",
                        self.method, self.url, want
                    ),
                    Some(self.url.clone()),
                ));
            }
        }

        Ok(())
    }

    fn check_headers(&self, response: &Response) -> Result<(), Outcome> {
        for (name, want) in &self.want_headers {
            let got = response
                .headers()
                .get(name.as_str())
                .and_then(|v| v.to_str().ok());
            if got != Some(want.as_str()) {
                return Err(Outcome::failed_with_info(
                    format!("bad header {name}"),
                    format!(
                        "{} {} header {} = {:?}, want {:?}",
                        self.method, self.url, name, got, want
                    ),
                    Some(self.url.clone()),
                ));
            }
        }
        Ok(())
    }

    /// 读取响应体，超过上限时失败
    async fn read_body(&self, mut response: Response) -> Result<String, Outcome> {
        let mut body = Vec::new();
        loop {
            let chunk = response.chunk().await.map_err(|e| {
                Outcome::failed_with_info(
                    &e,
                    format!("failed to read response from {}", self.url),
                    Some(self.url.clone()),
                )
            })?;
            let Some(chunk) = chunk else { break };

            if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(Outcome::failed_with_info(
                    format!("response larger than {MAX_RESPONSE_BYTES} bytes"),
                    format!(
                        "{} {} response exceeded {} bytes",
                        self.method, self.url, MAX_RESPONSE_BYTES
                    ),
                    Some(self.url.clone()),
                ));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// 格式化请求错误信息，使其更加清晰易读
fn format_request_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        "Connection refused".to_string()
    } else if error.is_request() {
        "Invalid request".to_string()
    } else {
        let error_str = error.to_string();
        if error_str.contains("dns") || error_str.contains("DNS") {
            "DNS resolution failed".to_string()
        } else if error_str.contains("certificate")
            || error_str.contains("tls")
            || error_str.contains("ssl")
        {
            "SSL/TLS certificate error".to_string()
        } else {
            format!("Request failed: {error_str}")
        }
    }
}

#[async_trait]
impl Check for HttpCheck {
    async fn probe(&self) -> Outcome {
        debug!("{} {}", self.method, self.url);
        match self.perform_request().await {
            Ok(()) => Outcome::passed(),
            Err(outcome) => outcome,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::sender::NoOpSender;
    use mockito::Matcher;
    use std::sync::Arc;

    fn route() -> AlertRoute {
        AlertRoute::new(Arc::new(NoOpSender))
    }

    fn check_for(url: String) -> HttpCheck {
        HttpCheck::new(url, Duration::from_secs(5), route()).unwrap()
    }

    #[tokio::test]
    async fn test_expected_status_passes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("connection", "close")
            .with_status(200)
            .create_async()
            .await;

        let outcome = check_for(format!("{}/health", server.url())).probe().await;
        assert!(outcome.is_pass());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unexpected_status_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/health")
            .with_status(503)
            .create_async()
            .await;

        let url = format!("{}/health", server.url());
        let outcome = check_for(url.clone()).probe().await;
        assert!(outcome.is_fail());
        assert_eq!(outcome.cause(), Some("bad status code 503"));
        assert!(outcome.info().unwrap().contains("want one of [200]"));
        assert!(matches!(
            outcome,
            Outcome::Fail { info_url: Some(ref u), .. } if *u == url
        ));
    }

    #[tokio::test]
    async fn test_method_and_status_codes() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/")
            .with_status(204)
            .create_async()
            .await;

        let outcome = check_for(server.url())
            .with_method(Method::HEAD)
            .with_expected_status_codes(vec![200, 204])
            .probe()
            .await;
        assert!(outcome.is_pass());
    }

    #[tokio::test]
    async fn test_want_in_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<h1>Welcome home</h1>")
            .create_async()
            .await;

        let check = check_for(server.url()).with_want_in_response("Welcome");
        assert!(check.probe().await.is_pass());

        let check = check_for(server.url()).with_want_in_response("Goodbye");
        let outcome = check.probe().await;
        assert!(outcome.is_fail());
        assert!(outcome.cause().unwrap().contains("Goodbye"));
    }

    #[tokio::test]
    async fn test_oversized_body_fails() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/big")
            .with_status(200)
            .with_body(vec![b'a'; MAX_RESPONSE_BYTES + 1])
            .create_async()
            .await;

        let outcome = check_for(format!("{}/big", server.url()))
            .with_want_in_response("a")
            .probe()
            .await;
        assert!(outcome.is_fail());
        assert!(outcome.cause().unwrap().contains("1000000"));
    }

    #[tokio::test]
    async fn test_want_headers() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .create_async()
            .await;

        let check = check_for(server.url()).with_want_header("Content-Type", "text/html");
        assert!(check.probe().await.is_pass());

        let check = check_for(server.url()).with_want_header("content-type", "application/json");
        let outcome = check.probe().await;
        assert_eq!(outcome.cause(), Some("bad header content-type"));

        let check = check_for(server.url()).with_want_header("x-missing", "1");
        assert!(check.probe().await.is_fail());
    }

    #[tokio::test]
    async fn test_connection_error_fails() {
        let outcome = check_for("http://127.0.0.1:1/".to_string()).probe().await;
        assert!(outcome.is_fail());
        assert!(outcome.info().unwrap().contains("http://127.0.0.1:1/"));
    }

    #[tokio::test]
    async fn test_from_config_rejects_bad_method() {
        let config: ProbeConfig = toml::from_str(
            r#"
name = "api"
url = "http://127.0.0.1:1/"
method = "GE T"
"#,
        )
        .unwrap();
        assert!(matches!(
            HttpCheck::from_config(&config, route()),
            Err(CheckError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_applies_expectations() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", Matcher::Any)
            .with_status(201)
            .with_body("created")
            .create_async()
            .await;

        let config: ProbeConfig = toml::from_str(&format!(
            r#"
name = "api"
url = "{}/items"
method = "post"
expected_status_codes = [201]
want_in_response = "created"
"#,
            server.url()
        ))
        .unwrap();
        let check = HttpCheck::from_config(&config, route()).unwrap();
        assert!(check.probe().await.is_pass());
    }
}
