//! 函数子、延迟解析与服务集合
//!
//! 三者都持有一个脱离解析链的 [`Resolver`]，在被调用时才真正解析，
//! 因此可以保存在实例内部、跨线程传递。

use crate::resolver::{downcast, Resolver};
use di_abstractions::{Args, ResolveOptions, ServiceResolver};
use infrastructure_common::{DependencyError, DependencyResult, ServiceKey, ServiceType};
use once_cell::sync::OnceCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 服务函数子
///
/// 每次调用执行一次完整解析，生命周期规则照常生效：
/// 对作用域/单例服务，带参数的调用也只有第一次会真正创建实例。
pub struct ServiceFunc<T: ?Sized> {
    resolver: Resolver,
    service_key: Option<String>,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T> ServiceFunc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(resolver: Resolver, service_key: Option<String>) -> Self {
        Self {
            resolver,
            service_key,
            _service: PhantomData,
        }
    }

    /// 无参数调用
    pub fn call(&self) -> DependencyResult<Arc<T>> {
        self.call_with(Args::new())
    }

    /// 带参数调用
    pub fn call_with(&self, args: Args) -> DependencyResult<Arc<T>> {
        let mut options = ResolveOptions::new().with_args(args);
        if let Some(key) = &self.service_key {
            options = options.with_service_key(key.clone());
        }
        self.resolver
            .resolve_with::<T>(options)?
            .ok_or_else(|| DependencyError::ServiceNotRegistered {
                service: ServiceKey::new(ServiceType::of::<T>(), self.service_key.clone()).to_string(),
            })
    }

    /// 单参数调用
    pub fn call1<A>(&self, arg: A) -> DependencyResult<Arc<T>>
    where
        A: Send + Sync + 'static,
    {
        self.call_with(Args::new().with(arg))
    }

    /// 双参数调用
    pub fn call2<A, B>(&self, first: A, second: B) -> DependencyResult<Arc<T>>
    where
        A: Send + Sync + 'static,
        B: Send + Sync + 'static,
    {
        self.call_with(Args::new().with(first).with(second))
    }
}

impl<T: ?Sized> Clone for ServiceFunc<T> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            service_key: self.service_key.clone(),
            _service: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for ServiceFunc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceFunc")
            .field("service", &std::any::type_name::<T>())
            .field("key", &self.service_key)
            .finish()
    }
}

/// 延迟解析包装：首次 [`ServiceLazy::get`] 时解析并记住结果，失败不会被记住
pub struct ServiceLazy<T: ?Sized> {
    func: ServiceFunc<T>,
    value: OnceCell<Arc<T>>,
}

impl<T> ServiceLazy<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(func: ServiceFunc<T>) -> Self {
        Self {
            func,
            value: OnceCell::new(),
        }
    }

    pub fn get(&self) -> DependencyResult<Arc<T>> {
        self.value.get_or_try_init(|| self.func.call()).cloned()
    }

    /// 是否已经解析
    pub fn is_created(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T: ?Sized> fmt::Debug for ServiceLazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLazy")
            .field("service", &std::any::type_name::<T>())
            .field("created", &self.value.get().is_some())
            .finish()
    }
}

/// 某抽象所有注册（默认 + 带键）的集合
///
/// 可重复枚举：每次 [`ServiceCollection::iter`] 都重新读取注册并逐个解析。
pub struct ServiceCollection<T: ?Sized> {
    resolver: Resolver,
    _service: PhantomData<fn() -> Arc<T>>,
}

impl<T> ServiceCollection<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            _service: PhantomData,
        }
    }

    /// 按注册顺序逐个解析
    pub fn iter(&self) -> impl Iterator<Item = DependencyResult<Arc<T>>> + '_ {
        self.resolver
            .targets(ServiceType::of::<T>())
            .into_iter()
            .map(move |target| {
                let instance = self.resolver.resolve_enumerated(target)?;
                downcast::<T>(&instance)
            })
    }

    /// 可解析的注册数量
    pub fn len(&self) -> usize {
        self.resolver.targets(ServiceType::of::<T>()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前所有注册的服务键
    pub fn keys(&self) -> Vec<Option<String>> {
        self.resolver
            .targets(ServiceType::of::<T>())
            .iter()
            .map(|target| target.service_key().key.clone())
            .collect()
    }

    /// 立即解析全部
    pub fn to_vec(&self) -> DependencyResult<Vec<Arc<T>>> {
        self.iter().collect()
    }
}

impl<T: ?Sized> fmt::Debug for ServiceCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("service", &std::any::type_name::<T>())
            .finish()
    }
}
