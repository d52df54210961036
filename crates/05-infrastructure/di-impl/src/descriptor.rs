//! 服务描述符
//!
//! [`ServiceDescriptor`] 是带类型的注册构建器，注册时被擦除为内部的 [`Descriptor`]。

use crate::resolver::Resolver;
use di_abstractions::{IfAlreadyRegistered, RequestInfo};
use infrastructure_common::{
    DependencyError, DependencyResult, Disposable, Lifetime, ServiceKey, ServiceType,
};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 类型擦除后的实例，内部保存的是 `Arc<T>`
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

/// 类型擦除后的工厂
pub(crate) type FactoryFn = Arc<dyn Fn(&Resolver) -> DependencyResult<Instance> + Send + Sync>;

/// 类型擦除后的释放函数
pub(crate) type DisposerFn = Arc<dyn Fn(&Instance) + Send + Sync>;

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

/// 描述符种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// 普通实现
    Concrete,
    /// 装饰器
    Decorator,
    /// 占位，等待作用域内填充
    Placeholder,
}

/// 注册后的描述符（不可变）
pub(crate) struct Descriptor {
    /// 全局唯一标识，也是实例缓存的键
    pub(crate) id: u64,
    pub(crate) service: ServiceKey,
    pub(crate) kind: DescriptorKind,
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: Option<FactoryFn>,
    pub(crate) disposer: Option<DisposerFn>,
}

impl Descriptor {
    pub(crate) fn service_type(&self) -> ServiceType {
        self.service.service_type
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("kind", &self.kind)
            .field("lifetime", &self.lifetime)
            .field("disposable", &self.disposer.is_some())
            .field("factory", &"<function>")
            .finish()
    }
}

/// 初始化器
pub(crate) struct Initializer {
    pub(crate) action: Arc<dyn Fn(&Instance, &Resolver) + Send + Sync>,
    pub(crate) condition: Arc<dyn Fn(&RequestInfo) -> bool + Send + Sync>,
}

/// 服务描述符构建器
///
/// ```rust,ignore
/// container.register(
///     ServiceDescriptor::<dyn Locale>::factory(|_| Ok(Arc::new(LocaleImpl::new("RU")) as Arc<dyn Locale>))
///         .scoped()
///         .with_key("RU"),
/// )?;
/// ```
pub struct ServiceDescriptor<T: ?Sized> {
    key: Option<String>,
    kind: DescriptorKind,
    lifetime: Option<Lifetime>,
    factory: Option<FactoryFn>,
    disposer: Option<DisposerFn>,
    allow_disposable_transient: bool,
    if_already_registered: IfAlreadyRegistered,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T> ServiceDescriptor<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    fn with_kind(kind: DescriptorKind, factory: Option<FactoryFn>) -> Self {
        Self {
            key: None,
            kind,
            lifetime: None,
            factory,
            disposer: None,
            allow_disposable_transient: false,
            if_already_registered: IfAlreadyRegistered::Throw,
            _service: PhantomData,
        }
    }

    fn erase<F>(factory: F) -> FactoryFn
    where
        F: Fn(&Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        Arc::new(move |resolver: &Resolver| {
            factory(resolver).map(|instance| Arc::new(instance) as Instance)
        })
    }

    /// 由工厂创建描述符
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::with_kind(DescriptorKind::Concrete, Some(Self::erase(factory)))
    }

    /// 由已有实例创建单例描述符
    pub fn instance(instance: Arc<T>) -> Self {
        Self::factory(move |_| Ok(instance.clone())).singleton()
    }

    /// 创建装饰器描述符
    pub fn decorator<F>(factory: F) -> Self
    where
        F: Fn(&Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        Self::with_kind(DescriptorKind::Decorator, Some(Self::erase(factory)))
    }

    /// 创建占位描述符
    pub fn placeholder() -> Self {
        Self::with_kind(DescriptorKind::Placeholder, None)
    }

    /// 设置生命周期
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// 单例
    pub fn singleton(self) -> Self {
        self.with_lifetime(Lifetime::Singleton)
    }

    /// 作用域
    pub fn scoped(self) -> Self {
        self.with_lifetime(Lifetime::Scoped)
    }

    /// 瞬时
    pub fn transient(self) -> Self {
        self.with_lifetime(Lifetime::Transient)
    }

    /// 设置服务区分键
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// 冲突时替换已有注册
    pub fn replace_existing(mut self) -> Self {
        self.if_already_registered = IfAlreadyRegistered::Replace;
        self
    }

    /// 冲突时保留已有注册
    pub fn keep_existing(mut self) -> Self {
        self.if_already_registered = IfAlreadyRegistered::Keep;
        self
    }

    /// 设置冲突处理方式
    pub fn if_already_registered(mut self, policy: IfAlreadyRegistered) -> Self {
        self.if_already_registered = policy;
        self
    }

    /// 允许注册可释放的瞬时服务，释放责任由调用方承担
    pub fn allow_disposable_transient(mut self) -> Self {
        self.allow_disposable_transient = true;
        self
    }

    /// 擦除类型，生成内部描述符
    pub(crate) fn build(
        self,
        default_lifetime: Lifetime,
        throw_on_disposable_transient: bool,
    ) -> DependencyResult<(Descriptor, IfAlreadyRegistered)> {
        let service = ServiceKey::new(ServiceType::of::<T>(), self.key);
        let lifetime = self.lifetime.unwrap_or(default_lifetime);

        if self.kind == DescriptorKind::Placeholder && self.disposer.is_some() {
            return Err(DependencyError::registration(
                service.to_string(),
                "占位注册不能声明释放行为",
            ));
        }

        if lifetime == Lifetime::Transient
            && self.disposer.is_some()
            && throw_on_disposable_transient
            && !self.allow_disposable_transient
        {
            return Err(DependencyError::registration(
                service.to_string(),
                "可释放的瞬时服务不会被容器跟踪，请使用 allow_disposable_transient() 显式允许",
            ));
        }

        let descriptor = Descriptor {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            service,
            kind: self.kind,
            lifetime,
            factory: self.factory,
            disposer: self.disposer,
        };
        Ok((descriptor, self.if_already_registered))
    }
}

impl<T> ServiceDescriptor<T>
where
    T: ?Sized + Disposable + Send + Sync + 'static,
{
    /// 声明实例需要释放：作用域/单例实例在所属作用域销毁时调用 [`Disposable::dispose`]
    pub fn disposable(mut self) -> Self {
        self.disposer = Some(Arc::new(|instance: &Instance| {
            if let Some(instance) = instance.downcast_ref::<Arc<T>>() {
                instance.dispose();
            }
        }));
        self
    }
}

impl<T: ?Sized> fmt::Debug for ServiceDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("service", &std::any::type_name::<T>())
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("lifetime", &self.lifetime)
            .field("if_already_registered", &self.if_already_registered)
            .finish()
    }
}
