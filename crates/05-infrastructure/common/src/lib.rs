//! # Infrastructure Common
//!
//! 这个 crate 提供了依赖注入容器共用的基础类型。
//!
//! ## 核心组件
//!
//! - [`DependencyError`] - 注册与解析错误分类
//! - [`Lifetime`] - 生命周期策略
//! - [`Disposable`] - 资源释放约定
//! - [`ServiceType`] / [`ServiceKey`] - 服务抽象标识
//! - [`ContainerRules`] - 容器全局策略配置

pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod metadata;

pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
