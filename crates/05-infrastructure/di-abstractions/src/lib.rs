//! # Dependency Injection Abstractions
//! 
//! 依赖注入抽象层，定义服务注册、解析与作用域管理的核心接口。
//! 
//! ## 核心接口
//! 
//! - [`ServiceRegistrar`] - 服务注册接口
//! - [`ServiceResolver`] - 服务解析接口
//! - [`ScopeFactory`] - 作用域创建接口

pub mod container;
pub mod registry;
pub mod resolver;

pub use container::*;
pub use registry::*;
pub use resolver::*;
