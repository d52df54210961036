//! 演示用的服务与实现

use di_abstractions::ServiceResolver;
use di_impl::{Injectable, Resolver, ServiceFunc, ServiceLazy};
use infrastructure_common::{DependencyResult, Disposable};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static LOCALE_COUNTER: AtomicUsize = AtomicUsize::new(0);
static PARAMETER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 重置编号，每个场景从 #0 开始
pub fn reset_counters() {
    LOCALE_COUNTER.store(0, Ordering::SeqCst);
    PARAMETER_COUNTER.store(0, Ordering::SeqCst);
}

pub trait Locale: Send + Sync {
    fn locale(&self) -> String;
    fn set_locale(&self, locale: &str);
}

pub struct LocaleImpl {
    locale: Mutex<String>,
}

impl LocaleImpl {
    pub fn new(locale: &str) -> Self {
        let number = LOCALE_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self {
            locale: Mutex::new(format!("{}#{}", locale, number)),
        }
    }
}

impl Locale for LocaleImpl {
    fn locale(&self) -> String {
        self.locale.lock().clone()
    }

    fn set_locale(&self, locale: &str) {
        *self.locale.lock() = locale.to_string();
    }
}

/// 作用域结束时输出释放信息
pub struct DisposableLocale(LocaleImpl);

impl DisposableLocale {
    pub fn new(locale: &str) -> Self {
        Self(LocaleImpl::new(locale))
    }
}

impl Locale for DisposableLocale {
    fn locale(&self) -> String {
        self.0.locale()
    }

    fn set_locale(&self, locale: &str) {
        self.0.set_locale(locale);
    }
}

impl Disposable for DisposableLocale {
    fn dispose(&self) {
        println!("{} => Disposed", self.locale());
    }
}

/// 依赖语言的参数
pub trait Parameter: Send + Sync {
    fn name(&self) -> &str;
    fn full_name(&self) -> DependencyResult<String>;
}

/// 每次取全名时从保存的解析器重新解析语言
pub struct ParameterImpl {
    name: String,
    resolver: Resolver,
}

impl ParameterImpl {
    pub fn new(resolver: &Resolver, name: &str) -> Self {
        let number = PARAMETER_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self {
            name: format!("{}#{}", name, number),
            resolver: resolver.detach(),
        }
    }

    /// 从函数子参数中取名称
    pub fn from_args(resolver: &Resolver) -> Self {
        let name = resolver
            .args()
            .get::<String>()
            .cloned()
            .unwrap_or_default();
        Self::new(resolver, &name)
    }
}

impl Parameter for ParameterImpl {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> DependencyResult<String> {
        let locale = self.resolver.resolve::<dyn Locale>()?;
        Ok(format!("{} with locale: {}", self.name, locale.locale()))
    }
}

impl fmt::Display for ParameterImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.full_name() {
            Ok(full_name) => f.write_str(&full_name),
            Err(err) => write!(f, "{} (locale unavailable: {})", self.name, err),
        }
    }
}

pub trait ParameterDisposable: Parameter + Disposable {}

impl Disposable for ParameterImpl {
    fn dispose(&self) {
        println!("{} => Disposed", self);
    }
}

impl ParameterDisposable for ParameterImpl {}

/// 字段注入
pub struct Injections {
    locale: Option<Arc<dyn Locale>>,
}

impl Injectable for Injections {
    type Service = Injections;

    fn inject(resolver: &Resolver) -> DependencyResult<Arc<Self>> {
        Ok(Arc::new(Self {
            locale: resolver.inject()?,
        }))
    }
}

impl fmt::Display for Injections {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locale {
            Some(locale) => write!(f, "Injections with: {}", locale.locale()),
            None => f.write_str("Injections with: NULL"),
        }
    }
}

/// 保存函数子，使用时才解析
pub struct InjectionPlaceholder {
    locale: ServiceFunc<dyn Locale>,
}

impl InjectionPlaceholder {
    pub fn describe(&self) -> DependencyResult<String> {
        Ok(format!("Injections with: {}", self.locale.call()?.locale()))
    }
}

impl Injectable for InjectionPlaceholder {
    type Service = InjectionPlaceholder;

    fn inject(resolver: &Resolver) -> DependencyResult<Arc<Self>> {
        Ok(Arc::new(Self {
            locale: resolver.resolve_func(),
        }))
    }
}

/// 首次访问时解析并记住
pub struct InjectionLazy {
    locale: ServiceLazy<dyn Locale>,
}

impl InjectionLazy {
    pub fn describe(&self) -> DependencyResult<String> {
        Ok(format!("Injections with: {}", self.locale.get()?.locale()))
    }
}

impl Injectable for InjectionLazy {
    type Service = InjectionLazy;

    fn inject(resolver: &Resolver) -> DependencyResult<Arc<Self>> {
        Ok(Arc::new(Self {
            locale: resolver.resolve_lazy(),
        }))
    }
}

pub trait Handler: Send + Sync {
    fn handle(&self);
}

pub struct HandlerImpl;

impl Handler for HandlerImpl {
    fn handle(&self) {
        println!("Handler called");
    }
}

pub struct HandlerDecorator {
    handler: Arc<dyn Handler>,
}

impl Injectable for HandlerDecorator {
    type Service = dyn Handler;

    fn inject(resolver: &Resolver) -> DependencyResult<Arc<dyn Handler>> {
        Ok(Arc::new(Self {
            handler: resolver.resolve()?,
        }))
    }
}

impl Handler for HandlerDecorator {
    fn handle(&self) {
        println!("Before");
        self.handler.handle();
        println!("After");
    }
}
