//! 演示场景，每个场景对应一个子命令

use crate::model::{
    DisposableLocale, Handler, HandlerDecorator, HandlerImpl, InjectionLazy, InjectionPlaceholder,
    Injections, Locale, LocaleImpl, Parameter, ParameterDisposable, ParameterImpl,
};
use anyhow::{anyhow, Result};
use di_abstractions::{Args, ScopeFactory, ServiceRegistrar, ServiceResolver};
use di_impl::{Container, Injectable, Resolver, ServiceDescriptor};
use infrastructure_common::{
    ContainerRules, DependencyResult, Disposable, IfUnresolved, Lifetime, PropertiesAndFields,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn locale_from_args(resolver: &Resolver) -> DependencyResult<Arc<dyn Locale>> {
    let name = resolver
        .args()
        .get::<String>()
        .cloned()
        .unwrap_or_default();
    Ok(Arc::new(LocaleImpl::new(&name)))
}

fn fixed_locale(name: &'static str) -> impl Fn(&Resolver) -> DependencyResult<Arc<dyn Locale>> {
    move |_| Ok(Arc::new(LocaleImpl::new(name)) as Arc<dyn Locale>)
}

fn parameter_from_args(resolver: &Resolver) -> DependencyResult<Arc<dyn Parameter>> {
    Ok(Arc::new(ParameterImpl::from_args(resolver)))
}

fn describe(parameter: Option<Arc<dyn Parameter>>) -> Result<String> {
    Ok(parameter
        .map(|p| p.full_name())
        .transpose()?
        .unwrap_or_else(|| "NULL".to_string()))
}

/// 无作用域、无跟踪：每次解析都创建新实例
pub fn simple(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Transient, fixed_locale("RU"))?;
    c.register_factory::<dyn Parameter, _>(Lifetime::Transient, |r| {
        Ok(Arc::new(ParameterImpl::new(r, "Motion")) as Arc<dyn Parameter>)
    })?;

    for _ in 0..3 {
        println!("{}", c.resolve::<dyn Locale>()?.locale());
    }
    // 参数内部的嵌套解析同样每次创建新的语言实例
    for _ in 0..3 {
        println!("{}", c.resolve::<dyn Parameter>()?.full_name()?);
    }
    Ok(())
}

/// 每个线程一个作用域，作用域内只有一个实例
pub fn threads(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Scoped, fixed_locale("RU"))?;

    let worker = |index: usize| -> Result<()> {
        let scope = c.open_named_scope(format!("Thread-{}", index))?;
        for _ in 0..3 {
            println!("{}: {}", scope.info(), scope.resolve::<dyn Locale>()?.locale());
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    };

    let worker = &worker;
    thread::scope(|s| {
        let handles: Vec<_> = (0..4).map(|i| s.spawn(move || worker(i))).collect();
        handles
            .into_iter()
            .try_for_each(|handle| handle.join().map_err(|_| anyhow!("工作线程异常退出"))?)
    })
}

/// 函数子把参数传给工厂；作用域缓存不区分参数
pub fn functors(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Transient, locale_from_args)?;

    let create = c.resolve_func::<dyn Locale>();
    println!("{}", create.call1("RU".to_string())?.locale());
    println!("{}", create.call1("EN".to_string())?.locale());
    {
        let scope = c.open_scope()?;
        let create = scope.resolve_func::<dyn Locale>();
        println!("{}", create.call1("RU".to_string())?.locale());
        println!("{}", create.call1("EN".to_string())?.locale());
    }

    println!("----------");
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Scoped, locale_from_args)?;
    {
        let scope = c.open_scope()?;
        let create = scope.resolve_func::<dyn Locale>();
        println!("{}", create.call1("RU".to_string())?.locale());
        // 返回第一次调用缓存的 RU 实例
        println!("{}", create.call1("EN".to_string())?.locale());
    }

    println!("---------- ignore reuse for functors with args");
    let c = Container::with_rules(rules.clone().with_ignoring_reuse_for_func_with_args());
    c.register_factory::<dyn Locale, _>(Lifetime::Scoped, locale_from_args)?;
    let scope = c.open_scope()?;
    let create = scope.resolve_func::<dyn Locale>();
    println!("{}", create.call1("RU".to_string())?.locale());
    println!("{}", create.call1("EN".to_string())?.locale());
    Ok(())
}

/// 不同作用域中的实例，以及通过门面覆盖注册
pub fn scopes(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Scoped, locale_from_args)?;
    c.register_factory::<dyn Parameter, _>(Lifetime::Transient, parameter_from_args)?;

    for locale in ["RU", "EN"] {
        let scope = c.open_scope()?;
        // 第一次解析决定了本作用域内的语言实例
        scope.resolve_with_args::<dyn Locale>(Args::new().with(locale.to_string()))?;
        let create = scope.resolve_func::<dyn Parameter>();
        println!("{}", create.call1("Motion".to_string())?.full_name()?);
        println!("{}", create.call1("Move".to_string())?.full_name()?);
    }

    println!();
    println!("--------- With facade & manual registration ---------");
    for locale in ["RU", "EN"] {
        let facade = c.create_facade();
        facade.replace_factory::<dyn Locale, _>(Lifetime::Scoped, move |_| {
            Ok(Arc::new(LocaleImpl::new(locale)) as Arc<dyn Locale>)
        })?;
        let scope = facade.open_scope()?;
        let create = scope.resolve_func::<dyn Parameter>();
        println!("{}", create.call1("Motion".to_string())?.full_name()?);
        println!("{}", create.call1("Move".to_string())?.full_name()?);
    }
    Ok(())
}

fn disposable_parameters(c: &Container) -> Result<()> {
    c.register(
        ServiceDescriptor::<dyn ParameterDisposable>::factory(|r| {
            Ok(Arc::new(ParameterImpl::from_args(r)) as Arc<dyn ParameterDisposable>)
        })
        .transient()
        .disposable()
        .allow_disposable_transient(),
    )?;

    let scope = c.open_named_scope("outer")?;
    println!("OUTER SCOPE:");
    let create = scope.resolve_func::<dyn ParameterDisposable>();
    let motion = create.call1("Motion".to_string())?;
    println!("{}", motion.full_name()?);
    {
        let moving = create.call1("Move".to_string())?;
        println!(" {}", moving.full_name()?);
        println!("----- dispose after this line:");
        moving.dispose();
    }
    println!("----- {} dispose after this line:", motion.name());
    motion.dispose();

    {
        let inner = scope.open_named_scope("inner")?;
        println!();
        println!("  INNER SCOPE:");
        let create = inner.resolve_func::<dyn ParameterDisposable>();
        let motion = create.call1("Motion".to_string())?;
        println!("  {}", motion.full_name()?);
        let moving = create.call1("Move".to_string())?;
        println!("  {}", moving.full_name()?);
        moving.dispose();
        motion.dispose();
    }
    Ok(())
}

/// 瞬时可释放实例由调用方释放，语言每次重新解析
pub fn disposable(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Transient, fixed_locale("RU"))?;
    disposable_parameters(&c)
}

/// 作用域内的语言在作用域结束时释放
pub fn disposable_scoped(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register(
        ServiceDescriptor::<DisposableLocale>::factory(|_| Ok(Arc::new(DisposableLocale::new("RU"))))
            .scoped()
            .disposable(),
    )?;
    c.register_factory::<dyn Locale, _>(Lifetime::Transient, |r| {
        Ok(r.resolve::<DisposableLocale>()? as Arc<dyn Locale>)
    })?;
    disposable_parameters(&c)
}

/// 带键注册与枚举
pub fn keys(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Singleton, fixed_locale("Russian"))?;
    c.register_keyed::<dyn Locale, _>("EN", Lifetime::Singleton, fixed_locale("English"))?;
    c.register_keyed::<dyn Locale, _>("IT", Lifetime::Singleton, fixed_locale("Italiano"))?;

    let all = c.resolve_many::<dyn Locale>();
    println!("Locale implementations registered: {}", all.len());
    println!("{}", c.resolve::<dyn Locale>()?.locale());
    println!("{}", c.resolve::<dyn Locale>()?.locale());
    println!("{}", c.resolve_keyed::<dyn Locale>("IT")?.locale());
    println!("{}", c.resolve_keyed::<dyn Locale>("EN")?.locale());
    println!("{}", c.resolve::<dyn Locale>()?.locale());

    for (key, locale) in all.keys().into_iter().zip(all.iter()) {
        println!("  [{}] {}", key.as_deref().unwrap_or("default"), locale?.locale());
    }
    Ok(())
}

/// 字段注入与带条件的初始化器
pub fn injections(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(
        rules
            .clone()
            .with_properties_and_fields(PropertiesAndFields::all(IfUnresolved::Throw)),
    );
    c.register_factory::<dyn Locale, _>(Lifetime::Singleton, fixed_locale("RU"))?;
    c.register_type::<Injections>(Lifetime::Transient)?;

    // 条件返回 false 时初始化器不会执行
    c.register_initializer_when::<dyn Locale, _, _>(
        |item, _| {
            if item.locale().starts_with("RU") {
                item.set_locale("FR");
            }
        },
        |_| false,
    );

    println!("{}", c.resolve::<dyn Locale>()?.locale());
    println!("{}", c.resolve::<dyn Locale>()?.locale());
    println!("{}", c.resolve::<Injections>()?);
    Ok(())
}

/// 父作用域结束后不能再打开子作用域
pub fn scope_lifetime(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register(
        ServiceDescriptor::<DisposableLocale>::factory(|_| Ok(Arc::new(DisposableLocale::new("RU"))))
            .scoped()
            .disposable(),
    )?;

    let worker = {
        let scope = c.open_named_scope("parent")?;
        println!("{}", scope.resolve::<DisposableLocale>()?.locale());
        let resolver = scope.resolver();
        let worker = thread::spawn(move || {
            // 等待父作用域结束
            thread::sleep(Duration::from_millis(500));
            let child = resolver.open_named_scope("thread")?;
            println!("{}", child.resolve::<DisposableLocale>()?.locale());
            Ok::<_, anyhow::Error>(())
        });
        thread::sleep(Duration::from_millis(100));
        worker
    };

    match worker.join().map_err(|_| anyhow!("工作线程异常退出"))? {
        Ok(()) => println!("子作用域正常结束"),
        Err(err) => {
            warn!("父作用域已结束: {}", err);
            println!("Error: {}", err);
        }
    }
    Ok(())
}

/// 门面上的额外注册不影响父容器
pub fn facade(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Scoped, fixed_locale("RU"))?;

    let scope = c.open_named_scope("R1")?;
    let before = scope.resolve_or_default::<dyn Parameter>()?;
    println!("R1<Parameter> (before facade): {}", describe(before)?);

    {
        let facade = c.with_registrations_copy().without_singletons_and_cache();
        let locale_in_facade = facade.resolve::<dyn Locale>()?;
        println!("R1<Locale>    (inside facade): {}", locale_in_facade.locale());
        facade.register_factory::<dyn Parameter, _>(Lifetime::Scoped, |r| {
            Ok(Arc::new(ParameterImpl::new(r, "Motion")) as Arc<dyn Parameter>)
        })?;
        let inner = facade.open_named_scope("R2")?;
        let inside = inner.resolve_or_default::<dyn Parameter>()?;
        println!("R1<Parameter> (inside facade): {}", describe(inside)?);
    }

    let after = scope.resolve_or_default::<dyn Parameter>()?;
    println!("R1<Parameter>  (after facade): {}", describe(after)?);
    Ok(())
}

/// 占位注册在作用域内晚绑定
pub fn late(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(
        rules
            .clone()
            .with_properties_and_fields(PropertiesAndFields::all(IfUnresolved::Throw)),
    );
    c.register_placeholder::<dyn Locale>()?;
    c.register_type::<InjectionPlaceholder>(Lifetime::Scoped)?;
    c.register_type::<InjectionLazy>(Lifetime::Scoped)?;

    let scope = c.open_named_scope("R1")?;
    let parm = scope.resolve::<InjectionPlaceholder>()?;
    let lazy = scope.resolve::<InjectionLazy>()?;
    if let Err(err) = parm.describe() {
        println!("Late registration (before use_instance): {}", err);
    }

    scope.use_instance::<dyn Locale>(Arc::new(LocaleImpl::new("RU")))?;
    println!("Late registration: {}", parm.describe()?);
    println!("Late registration (lazy): {}", lazy.describe()?);
    Ok(())
}

/// 装饰器透明地包裹所有解析
pub fn decorator(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Handler, _>(Lifetime::Transient, |_| {
        Ok(Arc::new(HandlerImpl) as Arc<dyn Handler>)
    })?;
    c.resolve::<dyn Handler>()?.handle();

    println!("---------- with decorator");
    c.register_decorator::<dyn Handler, _>(Lifetime::Transient, HandlerDecorator::inject)?;
    c.resolve::<dyn Handler>()?.handle();
    Ok(())
}

/// 容器统计与校验
pub fn inspect(rules: &ContainerRules) -> Result<()> {
    let c = Container::with_rules(rules.clone());
    c.register_factory::<dyn Locale, _>(Lifetime::Singleton, fixed_locale("RU"))?;
    c.register_keyed::<dyn Locale, _>("EN", Lifetime::Scoped, fixed_locale("English"))?;
    c.register_factory::<dyn Parameter, _>(Lifetime::Transient, parameter_from_args)?;
    c.register_placeholder::<dyn Handler>()?;
    c.register_type::<InjectionPlaceholder>(Lifetime::Scoped)?;

    match c.validate() {
        Ok(()) => println!("validate: ok"),
        Err(errors) => {
            for err in errors {
                println!("validate: {}", err);
            }
        }
    }

    let scope = c.open_named_scope("R1")?;
    scope.resolve::<dyn Locale>()?;
    let stats = c.stats();
    info!("容器统计: {:?}", stats);
    println!(
        "registered={} decorators={} placeholders={} initializers={} singletons={} scopes={}",
        stats.registered_services,
        stats.decorators,
        stats.placeholders,
        stats.initializers,
        stats.cached_singletons,
        stats.open_scopes
    );
    Ok(())
}
