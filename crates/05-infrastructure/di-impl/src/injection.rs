//! 按类型注册
//!
//! 类型实现 [`Injectable`] 描述如何从解析器构造自身，之后可以直接按类型注册，
//! 无需在注册处手写工厂闭包。

use crate::container::Container;
use crate::descriptor::ServiceDescriptor;
use crate::resolver::Resolver;
use infrastructure_common::{DependencyResult, Lifetime};
use std::sync::Arc;

/// 可由容器构造的类型
///
/// ```rust,ignore
/// struct LocaleService { locale: Arc<dyn Locale> }
///
/// impl Injectable for LocaleService {
///     type Service = dyn LocaleAware;
///
///     fn inject(resolver: &Resolver) -> DependencyResult<Arc<dyn LocaleAware>> {
///         Ok(Arc::new(Self { locale: resolver.resolve()? }))
///     }
/// }
///
/// container.register_type::<LocaleService>(Lifetime::Scoped)?;
/// ```
pub trait Injectable: Send + Sync + 'static {
    /// 注册到的抽象
    type Service: ?Sized + Send + Sync + 'static;

    /// 构造函数注入
    fn inject(resolver: &Resolver) -> DependencyResult<Arc<Self::Service>>;
}

impl Container {
    /// 按类型注册
    pub fn register_type<I: Injectable>(&self, lifetime: Lifetime) -> DependencyResult<()> {
        self.register(ServiceDescriptor::<I::Service>::factory(I::inject).with_lifetime(lifetime))
    }

    /// 按类型注册带键服务
    pub fn register_keyed_type<I: Injectable>(
        &self,
        service_key: impl Into<String>,
        lifetime: Lifetime,
    ) -> DependencyResult<()> {
        self.register(
            ServiceDescriptor::<I::Service>::factory(I::inject)
                .with_lifetime(lifetime)
                .with_key(service_key),
        )
    }

    /// 按类型获取描述符构建器，用于进一步设置（例如 `disposable()`）
    pub fn describe_type<I: Injectable>() -> ServiceDescriptor<I::Service> {
        ServiceDescriptor::factory(I::inject)
    }
}
