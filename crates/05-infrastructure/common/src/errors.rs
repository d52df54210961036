//! 错误类型定义

use thiserror::Error;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {source}")]
    ParseError {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("配置序列化失败: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::ParseError {
            source: Box::new(err),
        }
    }
}

/// 依赖注入错误类型
#[derive(Error, Debug)]
pub enum DependencyError {
    #[error("服务未注册: {service}")]
    ServiceNotRegistered { service: String },

    #[error("服务重复注册: {service}")]
    DuplicateRegistration { service: String },

    #[error("占位注册尚未填充: {service} (作用域: {scope})")]
    UnfilledPlaceholder { service: String, scope: String },

    #[error("作用域已销毁: {scope}")]
    ScopeDisposed { scope: String },

    #[error("父作用域已销毁，无法打开子作用域: {parent}")]
    ParentDisposed { parent: String },

    #[error("容器已销毁: {container}")]
    ContainerDisposed { container: String },

    #[error("循环依赖检测到: {dependency_chain}")]
    CircularDependency { dependency_chain: String },

    #[error("解析深度超过限制 {max_depth}: {dependency_chain}")]
    ResolutionDepthExceeded {
        max_depth: usize,
        dependency_chain: String,
    },

    #[error("实例类型不匹配: 期望 {expected}")]
    TypeMismatch { expected: String },

    #[error("组件创建失败: {type_name}, 原因: {source}")]
    ComponentCreationFailed {
        type_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("组件注册失败: {type_name}, 原因: {message}")]
    RegistrationError { type_name: String, message: String },
}

impl DependencyError {
    /// 包装工厂返回的任意错误
    pub fn creation_failed(
        type_name: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ComponentCreationFailed {
            type_name: type_name.into(),
            source: source.into(),
        }
    }

    /// 创建注册错误
    pub fn registration(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RegistrationError {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// 是否为“服务未注册”错误
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::ServiceNotRegistered { .. })
    }

    /// 是否为作用域/容器已销毁类错误
    pub fn is_disposed(&self) -> bool {
        matches!(
            self,
            Self::ScopeDisposed { .. } | Self::ParentDisposed { .. } | Self::ContainerDisposed { .. }
        )
    }
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type DependencyResult<T> = Result<T, DependencyError>;
