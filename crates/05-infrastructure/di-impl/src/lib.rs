//! # 依赖注入具体实现
//!
//! 提供运行时依赖注入容器：注册表、作用域树、解析器、门面、装饰器/初始化器管线，
//! 以及函数子和延迟解析包装。
//!
//! ```rust,ignore
//! use di_abstractions::{ScopeFactory, ServiceRegistrar, ServiceResolver};
//! use di_impl::Container;
//!
//! let container = Container::new();
//! container.register_factory::<dyn Locale, _>(Lifetime::Scoped, |_| {
//!     Ok(Arc::new(LocaleImpl::new("RU")) as Arc<dyn Locale>)
//! })?;
//!
//! let scope = container.open_named_scope("request")?;
//! let locale = scope.resolve::<dyn Locale>()?;
//! ```

mod container;
mod descriptor;
mod functor;
mod injection;
mod registry;
mod resolver;
mod scope;

pub use container::{Container, ContainerBuilder};
pub use descriptor::{DescriptorKind, ServiceDescriptor};
pub use functor::{ServiceCollection, ServiceFunc, ServiceLazy};
pub use injection::Injectable;
pub use resolver::Resolver;
pub use scope::Scope;
