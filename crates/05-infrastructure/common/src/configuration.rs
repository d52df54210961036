//! 容器配置定义
//!
//! `ContainerRules` 是控制容器全局策略的唯一配置包，可以从 TOML 文本或通用配置节绑定。

use crate::errors::{ConfigError, ConfigResult};
use crate::lifecycle::Lifetime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 无法解析依赖时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfUnresolved {
    /// 返回错误
    #[default]
    Throw,
    /// 返回空值
    ReturnDefault,
}

/// 字段/属性注入规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertiesAndFields {
    /// 是否启用字段注入
    pub enabled: bool,
    /// 字段无法解析时的处理方式
    pub if_unresolved: IfUnresolved,
}

impl Default for PropertiesAndFields {
    fn default() -> Self {
        Self {
            enabled: false,
            if_unresolved: IfUnresolved::ReturnDefault,
        }
    }
}

impl PropertiesAndFields {
    /// 启用全部字段注入
    pub fn all(if_unresolved: IfUnresolved) -> Self {
        Self {
            enabled: true,
            if_unresolved,
        }
    }
}

/// 容器规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerRules {
    /// 字段/属性注入规则
    pub properties_and_fields: PropertiesAndFields,
    /// 带参数的函数子是否忽略复用策略（每次调用都创建新实例）
    pub ignore_reuse_for_parameterized_functors: bool,
    /// 注册可释放的瞬时服务时是否报错
    pub throw_on_registering_disposable_transient: bool,
    /// 是否启用循环依赖检测
    pub enable_circular_dependency_detection: bool,
    /// 最大解析深度
    pub max_resolution_depth: usize,
    /// 未显式指定时使用的生命周期
    pub default_lifetime: Lifetime,
}

impl Default for ContainerRules {
    fn default() -> Self {
        Self {
            properties_and_fields: PropertiesAndFields::default(),
            ignore_reuse_for_parameterized_functors: false,
            throw_on_registering_disposable_transient: true,
            enable_circular_dependency_detection: true,
            max_resolution_depth: 100,
            default_lifetime: Lifetime::Transient,
        }
    }
}

impl ContainerRules {
    /// 设置字段注入规则
    pub fn with_properties_and_fields(mut self, rules: PropertiesAndFields) -> Self {
        self.properties_and_fields = rules;
        self
    }

    /// 带参数函数子忽略复用
    pub fn with_ignoring_reuse_for_func_with_args(mut self) -> Self {
        self.ignore_reuse_for_parameterized_functors = true;
        self
    }

    /// 允许注册可释放的瞬时服务
    pub fn with_disposable_transients_allowed(mut self) -> Self {
        self.throw_on_registering_disposable_transient = false;
        self
    }

    /// 设置最大解析深度
    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    /// 设置默认生命周期
    pub fn with_default_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// 从 TOML 文本加载
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let rules: Self = toml::from_str(text)?;
        rules.validate()?;
        Ok(rules)
    }

    /// 从配置节绑定
    pub fn from_section(section: &ConfigSection) -> ConfigResult<Self> {
        let rules: Self = section.bind()?;
        rules.validate()?;
        Ok(rules)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_resolution_depth == 0 {
            return Err(ConfigError::ValidationError {
                message: "max_resolution_depth 必须大于 0".to_string(),
            });
        }
        Ok(())
    }
}

/// 配置节
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSection {
    /// 配置数据
    pub data: HashMap<String, serde_json::Value>,
}

impl ConfigSection {
    /// 创建新的配置节
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入配置项
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// 获取配置项
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// 绑定到具体类型
    pub fn bind<T>(&self) -> Result<T, ConfigError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = serde_json::Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        serde_json::from_value(value).map_err(|e| ConfigError::SerializationError { source: e })
    }
}
