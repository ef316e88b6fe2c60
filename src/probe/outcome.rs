//! 探测结果数据结构
//!
//! 定义单次探测的通过/失败结果

use serde::{Deserialize, Serialize};
use std::fmt;

/// 单次探测的结果
///
/// 两个结果在诊断信息和原因完全相同时视为相等（值相等）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "lowercase")]
pub enum Outcome {
    /// 探测通过
    Pass {
        /// 可选的附加信息
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<String>,
        /// 可选的详情链接
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info_url: Option<String>,
    },
    /// 探测失败
    Fail {
        /// 面向人的诊断信息
        diagnostic: String,
        /// 机器可读的失败原因
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
        /// 可选的详情链接
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info_url: Option<String>,
    },
}

impl Outcome {
    /// 通过
    pub fn passed() -> Self {
        Outcome::Pass {
            info: None,
            info_url: None,
        }
    }

    /// 通过，并附带信息
    pub fn passed_with(info: impl Into<String>, info_url: Option<String>) -> Self {
        Outcome::Pass {
            info: Some(info.into()),
            info_url,
        }
    }

    /// 因指定错误失败
    pub fn failed_with(err: impl fmt::Display) -> Self {
        let cause = err.to_string();
        Outcome::Fail {
            diagnostic: format!("The probe failed with {cause:?}"),
            cause: Some(cause),
            info_url: None,
        }
    }

    /// 因指定错误失败，并附带自定义诊断信息和链接
    pub fn failed_with_info(
        err: impl fmt::Display,
        diagnostic: impl Into<String>,
        info_url: Option<String>,
    ) -> Self {
        Outcome::Fail {
            diagnostic: diagnostic.into(),
            cause: Some(err.to_string()),
            info_url,
        }
    }

    /// 是否通过
    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass { .. })
    }

    /// 是否失败
    pub fn is_fail(&self) -> bool {
        !self.is_pass()
    }

    /// 结果代码名称
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Pass { .. } => "Pass",
            Outcome::Fail { .. } => "Fail",
        }
    }

    /// 附加信息：失败时为诊断信息，通过时为可选信息
    pub fn info(&self) -> Option<&str> {
        match self {
            Outcome::Pass { info, .. } => info.as_deref(),
            Outcome::Fail { diagnostic, .. } => Some(diagnostic.as_str()),
        }
    }

    /// 失败原因
    pub fn cause(&self) -> Option<&str> {
        match self {
            Outcome::Pass { .. } => None,
            Outcome::Fail { cause, .. } => cause.as_deref(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("Code: {:?}", self.code())];
        let info_url = match self {
            Outcome::Pass { info, info_url } => {
                if let Some(info) = info {
                    parts.push(format!("Info: {info:?}"));
                }
                info_url
            }
            Outcome::Fail {
                diagnostic,
                cause,
                info_url,
            } => {
                if let Some(cause) = cause {
                    parts.push(format!("Error: {cause:?}"));
                }
                parts.push(format!("Info: {diagnostic:?}"));
                info_url
            }
        };
        if let Some(url) = info_url {
            parts.push(format!("InfoUrl: {url:?}"));
        }
        write!(f, "Outcome{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_with_builds_diagnostic() {
        let outcome = Outcome::failed_with("connection refused");
        assert!(outcome.is_fail());
        assert_eq!(outcome.cause(), Some("connection refused"));
        assert_eq!(
            outcome.info(),
            Some("The probe failed with \"connection refused\"")
        );
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Outcome::failed_with("boom"), Outcome::failed_with("boom"));
        assert_ne!(Outcome::failed_with("boom"), Outcome::failed_with("bang"));
        assert_ne!(Outcome::passed(), Outcome::passed_with("ok", None));
        assert_eq!(Outcome::passed(), Outcome::passed());
    }

    #[test]
    fn test_display() {
        assert_eq!(Outcome::passed().to_string(), "Outcome{Code: \"Pass\"}");
        let shown = Outcome::failed_with_info("E", "bad", Some("http://x".into())).to_string();
        assert_eq!(
            shown,
            "Outcome{Code: \"Fail\", Error: \"E\", Info: \"bad\", InfoUrl: \"http://x\"}"
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Outcome::failed_with("down")).unwrap();
        assert_eq!(json["code"], "fail");
        assert_eq!(json["cause"], "down");

        let json = serde_json::to_value(Outcome::passed()).unwrap();
        assert_eq!(json, serde_json::json!({"code": "pass"}));
    }
}
