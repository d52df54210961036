//! 服务注册抽象接口

use crate::resolver::RequestInfo;
use infrastructure_common::{DependencyResult, Lifetime};
use std::sync::Arc;

/// 默认注册冲突时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfAlreadyRegistered {
    /// 返回 `DuplicateRegistration` 错误
    #[default]
    Throw,
    /// 替换已有注册（保留原有枚举顺序）
    Replace,
    /// 保留已有注册，忽略新注册
    Keep,
}

/// 服务注册表 trait
///
/// 提供按工厂、占位、装饰器和初始化器注册服务的接口。
pub trait ServiceRegistrar: Send + Sync {
    /// 传给工厂的解析上下文类型
    type Resolver;

    /// 注册工厂（完整形式）
    fn register_factory_with<T, F>(
        &self,
        lifetime: Lifetime,
        service_key: Option<String>,
        if_already_registered: IfAlreadyRegistered,
        factory: F,
    ) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static;

    /// 注册占位：解析前必须在作用域内通过 `use_instance` 填充
    fn register_placeholder<T>(&self) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static;

    /// 注册装饰器
    ///
    /// 装饰器工厂内部解析同一抽象时得到下一层（被装饰的）实现。
    fn register_decorator<T, F>(&self, lifetime: Lifetime, factory: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static;

    /// 注册带条件的初始化器
    fn register_initializer_when<T, F, P>(&self, initializer: F, condition: P)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Arc<T>, &Self::Resolver) + Send + Sync + 'static,
        P: Fn(&RequestInfo) -> bool + Send + Sync + 'static;

    /// 注册工厂
    fn register_factory<T, F>(&self, lifetime: Lifetime, factory: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        self.register_factory_with(lifetime, None, IfAlreadyRegistered::Throw, factory)
    }

    /// 注册带键工厂
    fn register_keyed<T, F>(
        &self,
        service_key: impl Into<String>,
        lifetime: Lifetime,
        factory: F,
    ) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        self.register_factory_with(
            lifetime,
            Some(service_key.into()),
            IfAlreadyRegistered::Throw,
            factory,
        )
    }

    /// 注册或替换工厂
    fn replace_factory<T, F>(&self, lifetime: Lifetime, factory: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        self.register_factory_with(lifetime, None, IfAlreadyRegistered::Replace, factory)
    }

    /// 注册已有实例（单例）
    fn register_instance<T>(&self, instance: Arc<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_factory_with(
            Lifetime::Singleton,
            None,
            IfAlreadyRegistered::Throw,
            move |_: &Self::Resolver| Ok(instance.clone()),
        )
    }

    /// 注册初始化器，对每个新创建的实例调用
    fn register_initializer<T, F>(&self, initializer: F)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Arc<T>, &Self::Resolver) + Send + Sync + 'static,
    {
        self.register_initializer_when(initializer, |_: &RequestInfo| true);
    }
}
