//! 配置加载器实现
//!
//! 提供TOML配置文件解析、`${VAR}` 环境变量替换和验证

use crate::config::types::{validate_config, Config, ConfigOverrides};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    ///
    /// # 参数
    /// * `content` - 配置文件内容
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    ///
    /// # 参数
    /// * `config` - 要验证的配置
    ///
    /// # 返回
    /// * `Result<()>` - 验证结果
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    ///
    /// # 返回
    /// * `Self` - 配置加载器实例
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中的环境变量
    ///
    /// # 参数
    /// * `content` - 要处理的字符串
    ///
    /// # 返回
    /// * `Result<String>` - 替换后的字符串或错误
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        // 匹配 ${VAR_NAME} 格式的环境变量
        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    ///
    /// # 参数
    /// * `content` - TOML内容
    ///
    /// # 返回
    /// * `Result<Config>` - 解析的配置或错误
    fn parse_toml(&self, content: &str) -> Result<Config> {
        // 替换环境变量
        let processed_content = self.substitute_env_vars(content)?;

        // 解析TOML
        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        // 检查文件是否存在
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        // 读取文件内容
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        // 解析配置
        let config = self.parse_toml(&content)?;

        // 验证配置
        self.validate(&config)?;

        log::info!(
            "成功加载配置文件: {}，共 {} 个探针",
            path.display(),
            config.probes.len()
        );
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        // 解析配置
        let config = self.parse_toml(content)?;

        // 验证配置
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 加载配置文件并应用命令行覆盖，覆盖后重新验证
///
/// # 参数
/// * `path` - 配置文件路径
/// * `overrides` - 命令行覆盖项
pub async fn load_config(path: &Path, overrides: &ConfigOverrides) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    let mut config = loader.load_from_file(path).await?;
    config.apply_overrides(overrides);
    loader.validate(&config)?;
    Ok(config)
}

/// 获取默认配置文件路径
///
/// 当前目录存在 `prober.toml` 时优先使用，否则为用户配置目录下的
/// `service-prober/prober.toml`
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|config_dir| config_dir.join(crate::APP_NAME).join(DEFAULT_CONFIG_FILE))
        .unwrap_or(local)
}

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "prober.toml";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProbeKind;
    use serial_test::serial;
    use std::env;

    const TEST_CONFIG_TOML: &str = r#"
[global]
alert_threshold = 100
max_alert_frequency_seconds = 600
log_level = "info"

[[probes]]
name = "homepage"
url = "https://example.com/health"
expected_status_codes = [200, 204]
want_in_response = "ok"

[[probes]]
name = "database"
kind = "tcp"
target = "db.internal:5432"
interval_seconds = 15
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[global]
feishu_webhook_url = "${PROBER_TEST_WEBHOOK_URL}"

[[probes]]
name = "api"
url = "https://example.com/status"

[probes.want_headers]
"x-api-version" = "${PROBER_TEST_API_VERSION}"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.alert_threshold, 100);
        assert_eq!(config.global.max_alert_frequency_seconds, 600);
        assert_eq!(config.probes.len(), 2);
        assert_eq!(config.probes[0].kind, ProbeKind::Http);
        assert_eq!(config.probes[0].expected_status_codes, vec![200, 204]);
        assert_eq!(config.probes[1].kind, ProbeKind::Tcp);
        assert_eq!(config.probes[1].interval_seconds, Some(15));
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("PROBER_TEST_WEBHOOK_URL", "https://test.webhook.url");
        env::set_var("PROBER_TEST_API_VERSION", "v2");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(
            config.global.feishu_webhook_url,
            Some("https://test.webhook.url".to_string())
        );
        assert_eq!(
            config.probes[0].want_headers.get("x-api-version"),
            Some(&"v2".to_string())
        );

        env::remove_var("PROBER_TEST_WEBHOOK_URL");
        env::remove_var("PROBER_TEST_API_VERSION");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        let content = r#"
[global]
feishu_webhook_url = "${PROBER_TEST_MISSING_VAR}"

[[probes]]
name = "Test"
url = "https://example.com"
"#;

        let loader = TomlConfigLoader::new(true);
        let err = loader.load_from_string(content).await.unwrap_err();
        assert!(err.to_string().contains("PROBER_TEST_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let loader = TomlConfigLoader::new(false);
        let err = loader
            .load_from_string("[global]\nbuffer_size = 0\n")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("配置验证失败"));

        let err = loader.load_from_string("[[probes]\n").await.unwrap_err();
        assert!(err.to_string().contains("TOML解析失败"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let err = loader
            .load_from_file("/definitely/not/here/prober.toml")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("配置文件不存在"));
    }

    #[tokio::test]
    async fn test_load_config_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prober.toml");
        std::fs::write(&path, TEST_CONFIG_TOML).unwrap();

        let overrides = ConfigOverrides {
            alerts_disabled: true,
            only_probes: Some(vec!["database".to_string()]),
            ..Default::default()
        };
        let config = load_config(&path, &overrides).await.unwrap();
        assert!(config.global.alerts_disabled);
        assert_eq!(config.global.only_probes, vec!["database".to_string()]);

        // 覆盖之后仍然需要通过验证
        let conflicting = ConfigOverrides {
            disabled_probes: Some(vec!["homepage".to_string()]),
            only_probes: Some(vec!["homepage".to_string()]),
            ..Default::default()
        };
        assert!(load_config(&path, &conflicting).await.is_err());
    }

    #[tokio::test]
    async fn test_load_demo_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/prober.toml");
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(&path).await.unwrap();
        assert!(!config.probes.is_empty());
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        assert_eq!(loader.substitute_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().ends_with(DEFAULT_CONFIG_FILE));
    }
}
