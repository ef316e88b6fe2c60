//! 探针启用/禁用过滤器
//!
//! 在任何探针启动前根据配置构建一次，之后只读

use crate::error::ConfigError;
use std::collections::BTreeSet;

/// 基于名称的允许/拒绝列表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeFilter {
    disabled: BTreeSet<String>,
    only: BTreeSet<String>,
}

impl ProbeFilter {
    /// 创建过滤器
    ///
    /// # 参数
    /// * `disabled` - 禁用的探针名称
    /// * `only` - 仅启用的探针名称，非空时其他探针全部不运行
    ///
    /// # 返回
    /// * `Result<Self, ConfigError>` - 同一名称同时出现在两个列表中时返回错误
    pub fn new<D, O, S>(disabled: D, only: O) -> Result<Self, ConfigError>
    where
        D: IntoIterator<Item = S>,
        O: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let disabled = normalize(disabled);
        let only = normalize(only);

        let conflicts: Vec<&str> = disabled.intersection(&only).map(String::as_str).collect();
        if !conflicts.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "探针不能同时出现在禁用列表和仅启用列表中: {}",
                conflicts.join(",")
            )));
        }

        Ok(Self { disabled, only })
    }

    /// 从逗号分隔的名称列表创建，例如 `FooProbe,BarProbe`
    pub fn from_lists(disabled: &str, only: &str) -> Result<Self, ConfigError> {
        Self::new(disabled.split(','), only.split(','))
    }

    /// 探针是否启用
    pub fn is_enabled(&self, name: &str) -> bool {
        if !self.only.is_empty() {
            return self.only.contains(name);
        }
        !self.disabled.contains(name)
    }

    pub fn disabled(&self) -> impl Iterator<Item = &str> {
        self.disabled.iter().map(String::as_str)
    }

    pub fn only(&self) -> impl Iterator<Item = &str> {
        self.only.iter().map(String::as_str)
    }
}

/// 去除空白和空项
fn normalize<I, S>(names: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
