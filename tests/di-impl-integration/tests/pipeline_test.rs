//! 带键注册、函数子、门面、占位、装饰器与初始化器的集成测试

use di_abstractions::{
    FacadeOptions, IfAlreadyRegistered, ScopeFactory, ServiceRegistrar, ServiceResolver,
};
use di_impl::{Container, Injectable, Resolver, ServiceDescriptor, ServiceFunc, ServiceLazy};
use infrastructure_common::{
    ContainerRules, DependencyError, DependencyResult, Disposable, IfUnresolved, Lifetime,
    PropertiesAndFields,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

trait Locale: Send + Sync + std::fmt::Debug {
    fn locale(&self) -> String;
    fn set_locale(&self, locale: &str);
}

#[derive(Debug)]
struct LocaleImpl {
    locale: Mutex<String>,
}

impl LocaleImpl {
    fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: Mutex::new(locale.into()),
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

fn locale(name: &str) -> Arc<dyn Locale> {
    Arc::new(LocaleImpl::new(name))
}

trait Handler: Send + Sync {
    fn handle(&self);
}

struct HandlerImpl {
    log: Arc<Mutex<Vec<String>>>,
}

impl Handler for HandlerImpl {
    fn handle(&self) {
        self.log.lock().push("Handler called".to_string());
    }
}

struct HandlerDecorator {
    handler: Arc<dyn Handler>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Handler for HandlerDecorator {
    fn handle(&self) {
        self.log.lock().push("Before".to_string());
        self.handler.handle();
        self.log.lock().push("After".to_string());
    }
}

/// 持有函数子，等到使用时才解析语言
struct InjectionPlaceholder {
    locale: ServiceFunc<dyn Locale>,
}

impl InjectionPlaceholder {
    fn describe(&self) -> DependencyResult<String> {
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

struct InjectionLazy {
    locale: ServiceLazy<dyn Locale>,
}

impl Injectable for InjectionLazy {
    type Service = InjectionLazy;

    fn inject(resolver: &Resolver) -> DependencyResult<Arc<Self>> {
        Ok(Arc::new(Self {
            locale: resolver.resolve_lazy(),
        }))
    }
}

/// 字段注入
struct Injections {
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

#[test]
fn keyed_registrations_and_restartable_enumeration() {
    let container = Container::new();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, |_| Ok(locale("Russian")))
        .unwrap();
    container
        .register_keyed::<dyn Locale, _>("EN", Lifetime::Singleton, |_| Ok(locale("English")))
        .unwrap();
    container
        .register_keyed::<dyn Locale, _>("IT", Lifetime::Singleton, |_| Ok(locale("Italiano")))
        .unwrap();

    let all = container.resolve_many::<dyn Locale>();
    assert_eq!(all.len(), 3);
    assert_eq!(
        all.keys(),
        vec![None, Some("EN".to_string()), Some("IT".to_string())]
    );

    let default = container.resolve::<dyn Locale>().unwrap();
    assert!(Arc::ptr_eq(&default, &container.resolve::<dyn Locale>().unwrap()));
    assert_eq!(container.resolve_keyed::<dyn Locale>("IT").unwrap().locale(), "Italiano");
    assert_eq!(container.resolve_keyed::<dyn Locale>("EN").unwrap().locale(), "English");
    assert!(container.resolve_keyed::<dyn Locale>("FR").unwrap_err().is_not_registered());

    let names: Vec<_> = all.iter().map(|l| l.unwrap().locale()).collect();
    assert_eq!(names, ["Russian", "English", "Italiano"]);

    // 同一个集合再次枚举时能看到新注册
    container
        .register_keyed::<dyn Locale, _>("FR", Lifetime::Singleton, |_| Ok(locale("Francais")))
        .unwrap();
    assert_eq!(all.iter().count(), 4);
    assert_eq!(container.resolve_all::<dyn Locale>().unwrap().len(), 4);
    assert!(container.is_registered::<dyn Locale>(Some("FR")));
}

#[test]
fn functor_arguments_do_not_bypass_scoped_cache() {
    let register = |container: &Container, lifetime| {
        container
            .register_factory::<dyn Locale, _>(lifetime, |r| {
                let name = r
                    .args()
                    .get::<String>()
                    .cloned()
                    .unwrap_or_else(|| "default".to_string());
                Ok(locale(&name))
            })
            .unwrap();
    };

    let transient = Container::new();
    register(&transient, Lifetime::Transient);
    let create = transient.resolve_func::<dyn Locale>();
    assert_eq!(create.call1("RU".to_string()).unwrap().locale(), "RU");
    assert_eq!(create.call1("EN".to_string()).unwrap().locale(), "EN");

    let scoped = Container::new();
    register(&scoped, Lifetime::Scoped);
    let scope = scoped.open_scope().unwrap();
    let create = scope.resolve_func::<dyn Locale>();
    let ru = create.call1("RU".to_string()).unwrap();
    let en = create.call1("EN".to_string()).unwrap();
    // 作用域缓存不区分参数：第一次调用的结果胜出
    assert_eq!(en.locale(), "RU");
    assert!(Arc::ptr_eq(&ru, &en));

    let ignoring = Container::with_rules(ContainerRules::default().with_ignoring_reuse_for_func_with_args());
    register(&ignoring, Lifetime::Scoped);
    let scope = ignoring.open_scope().unwrap();
    let create = scope.resolve_func::<dyn Locale>();
    assert_eq!(create.call1("RU".to_string()).unwrap().locale(), "RU");
    assert_eq!(create.call1("EN".to_string()).unwrap().locale(), "EN");
    let cached = create.call().unwrap();
    assert!(Arc::ptr_eq(&cached, &create.call().unwrap()));
    assert_eq!(cached.locale(), "default");
}

#[test]
fn facade_overrides_stay_local() {
    let container = Container::new();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Scoped, |_| Ok(locale("RU")))
        .unwrap();

    let facade = container.create_facade();
    facade
        .replace_factory::<dyn Locale, _>(Lifetime::Scoped, |_| Ok(locale("EN")))
        .unwrap();
    facade
        .register_factory::<String, _>(Lifetime::Scoped, |r| {
            Ok(Arc::new(format!("Motion with locale: {}", r.resolve::<dyn Locale>()?.locale())))
        })
        .unwrap();

    let facade_scope = facade.open_named_scope("R2").unwrap();
    assert_eq!(facade_scope.resolve::<dyn Locale>().unwrap().locale(), "EN");
    assert_eq!(
        facade_scope.resolve::<String>().unwrap().as_str(),
        "Motion with locale: EN"
    );

    let scope = container.open_named_scope("R1").unwrap();
    assert_eq!(scope.resolve::<dyn Locale>().unwrap().locale(), "RU");
    assert!(scope.resolve_or_default::<String>().unwrap().is_none());
    assert_eq!(container.stats().registered_services, 1);
    assert_eq!(facade.stats().registered_services, 2);
}

#[test]
fn facade_singleton_store_follows_options() {
    struct Tracked(Arc<Mutex<Vec<String>>>);

    impl Disposable for Tracked {
        fn dispose(&self) {
            self.0.lock().push("Tracked => Disposed".to_string());
        }
    }

    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let container = Container::new();
    let shared = log.clone();
    container
        .register(
            Container::describe_type::<TrackedFactory>()
                .singleton()
                .disposable(),
        )
        .unwrap();
    container.use_instance(Arc::new(shared)).unwrap();

    let original = container.resolve::<Tracked>().unwrap();

    let copied = container.create_facade_with(FacadeOptions::with_singletons());
    assert!(Arc::ptr_eq(&original, &copied.resolve::<Tracked>().unwrap()));
    drop(copied);
    assert!(log.lock().is_empty());

    let fresh = container.without_singletons_and_cache();
    fresh.use_instance(Arc::new(log.clone())).unwrap();
    let own = fresh.resolve::<Tracked>().unwrap();
    assert!(!Arc::ptr_eq(&original, &own));
    drop(fresh);
    assert_eq!(log.lock().len(), 1);

    let with_copy = container.with_registrations_copy();
    assert!(Arc::ptr_eq(&original, &with_copy.resolve::<Tracked>().unwrap()));
    drop(with_copy);
    assert_eq!(log.lock().len(), 1);

    drop(container);
    assert_eq!(log.lock().len(), 2);

    struct TrackedFactory;

    impl Injectable for TrackedFactory {
        type Service = Tracked;

        fn inject(resolver: &Resolver) -> DependencyResult<Arc<Tracked>> {
            let log = resolver.resolve::<Arc<Mutex<Vec<String>>>>()?;
            Ok(Arc::new(Tracked(log.as_ref().clone())))
        }
    }
}

#[test]
fn placeholder_is_filled_by_late_use_instance() {
    let container = Container::with_rules(
        ContainerRules::default().with_properties_and_fields(PropertiesAndFields::all(IfUnresolved::Throw)),
    );
    container.register_placeholder::<dyn Locale>().unwrap();
    container
        .register_type::<InjectionPlaceholder>(Lifetime::Scoped)
        .unwrap();
    container.register_type::<InjectionLazy>(Lifetime::Scoped).unwrap();

    let scope = container.open_named_scope("R1").unwrap();
    let injections = scope.resolve::<InjectionPlaceholder>().unwrap();
    let lazy = scope.resolve::<InjectionLazy>().unwrap();

    assert!(matches!(
        injections.describe(),
        Err(DependencyError::UnfilledPlaceholder { .. })
    ));
    assert!(lazy.locale.get().is_err());
    assert!(!lazy.locale.is_created());

    scope.use_instance(locale("RU")).unwrap();
    assert_eq!(injections.describe().unwrap(), "Injections with: RU");
    assert_eq!(lazy.locale.get().unwrap().locale(), "RU");
    assert!(lazy.locale.is_created());

    // 其他作用域看不到 R1 中的晚绑定
    let other = container.open_named_scope("R2").unwrap();
    match other.resolve::<dyn Locale>() {
        Err(DependencyError::UnfilledPlaceholder { scope, .. }) => assert_eq!(scope, "root/R2"),
        unexpected => panic!("意外结果: {:?}", unexpected.map(|l| l.locale())),
    }
    assert_eq!(container.stats().placeholders, 1);
}

#[test]
fn decorator_wraps_every_resolution() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    let shared = log.clone();
    container
        .register_factory::<dyn Handler, _>(Lifetime::Transient, move |_| {
            Ok(Arc::new(HandlerImpl { log: shared.clone() }) as Arc<dyn Handler>)
        })
        .unwrap();

    container.resolve::<dyn Handler>().unwrap().handle();
    assert_eq!(*log.lock(), ["Handler called"]);
    log.lock().clear();

    let shared = log.clone();
    container
        .register_decorator::<dyn Handler, _>(Lifetime::Transient, move |r| {
            Ok(Arc::new(HandlerDecorator {
                handler: r.resolve()?,
                log: shared.clone(),
            }) as Arc<dyn Handler>)
        })
        .unwrap();

    container.resolve::<dyn Handler>().unwrap().handle();
    assert_eq!(*log.lock(), ["Before", "Handler called", "After"]);
    log.lock().clear();

    // 预置实例同样被装饰
    let scope = container.open_scope().unwrap();
    scope
        .use_instance::<dyn Handler>(Arc::new(HandlerImpl { log: log.clone() }))
        .unwrap();
    scope.resolve::<dyn Handler>().unwrap().handle();
    assert_eq!(*log.lock(), ["Before", "Handler called", "After"]);
    assert_eq!(container.stats().decorators, 1);
}

#[test]
fn decorator_reaches_other_keys_at_the_same_layer() {
    let container = Container::new();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Transient, |_| Ok(locale("default")))
        .unwrap();
    container
        .register_keyed::<dyn Locale, _>("EN", Lifetime::Transient, |_| Ok(locale("en")))
        .unwrap();
    container
        .register_decorator::<dyn Locale, _>(Lifetime::Transient, |r| {
            let own = r.resolve::<dyn Locale>()?;
            let english = r.resolve_keyed::<dyn Locale>("EN")?;
            Ok(locale(&format!("{}+{}", own.locale(), english.locale())))
        })
        .unwrap();

    assert_eq!(container.resolve::<dyn Locale>().unwrap().locale(), "default+en");
    assert_eq!(
        container.resolve_keyed::<dyn Locale>("EN").unwrap().locale(),
        "default+en"
    );
}

#[test]
fn singleton_decorator_over_used_instance_is_cached_per_owning_scope() {
    let container = Container::new();
    container.register_placeholder::<dyn Locale>().unwrap();
    container
        .register_decorator::<dyn Locale, _>(Lifetime::Singleton, |r| {
            let inner = r.resolve::<dyn Locale>()?;
            Ok(locale(&format!("wrap({})", inner.locale())))
        })
        .unwrap();

    let first = container.open_named_scope("R1").unwrap();
    first.use_instance(locale("one")).unwrap();
    let second = container.open_named_scope("R2").unwrap();
    second.use_instance(locale("two")).unwrap();

    let wrapped = first.resolve::<dyn Locale>().unwrap();
    assert_eq!(wrapped.locale(), "wrap(one)");
    assert!(Arc::ptr_eq(&wrapped, &first.resolve::<dyn Locale>().unwrap()));

    // 子作用域看到父作用域的预置实例，也复用同一个装饰结果
    let nested = first.open_scope().unwrap();
    assert!(Arc::ptr_eq(&wrapped, &nested.resolve::<dyn Locale>().unwrap()));
    drop(nested);

    assert_eq!(second.resolve::<dyn Locale>().unwrap().locale(), "wrap(two)");

    drop(first);
    let third = container.open_named_scope("R3").unwrap();
    third.use_instance(locale("three")).unwrap();
    assert_eq!(third.resolve::<dyn Locale>().unwrap().locale(), "wrap(three)");
    assert_eq!(container.stats().cached_singletons, 0);
}

#[test]
fn initializer_respects_condition() {
    let build = |condition: fn(&di_abstractions::RequestInfo) -> bool| {
        let container = Container::new();
        container
            .register_factory::<dyn Locale, _>(Lifetime::Singleton, |_| Ok(locale("RU#0")))
            .unwrap();
        container.register_initializer_when::<dyn Locale, _, _>(
            |item, _| {
                if item.locale().starts_with("RU") {
                    item.set_locale("FR");
                }
            },
            condition,
        );
        container
    };

    let skipped = build(|_| false);
    assert_eq!(skipped.resolve::<dyn Locale>().unwrap().locale(), "RU#0");

    let applied = build(|request| request.lifetime == Lifetime::Singleton && request.depth == 0);
    assert_eq!(applied.resolve::<dyn Locale>().unwrap().locale(), "FR");
    assert_eq!(applied.stats().initializers, 1);
}

#[test]
fn field_injection_uses_registered_singleton() {
    let container = Container::with_rules(
        ContainerRules::default().with_properties_and_fields(PropertiesAndFields::all(IfUnresolved::Throw)),
    );
    container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, |_| Ok(locale("RU")))
        .unwrap();
    container.register_type::<Injections>(Lifetime::Transient).unwrap();

    let singleton = container.resolve::<dyn Locale>().unwrap();
    let first = container.resolve::<Injections>().unwrap();
    let second = container.resolve::<Injections>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(first.locale.as_ref().unwrap(), &singleton));

    let disabled = Container::new();
    disabled.register_type::<Injections>(Lifetime::Transient).unwrap();
    assert!(disabled.resolve::<Injections>().unwrap().locale.is_none());
}

#[test]
fn duplicate_registration_policies() {
    let container = Container::new();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, |_| Ok(locale("RU")))
        .unwrap();

    let err = container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, |_| Ok(locale("EN")))
        .unwrap_err();
    assert!(matches!(err, DependencyError::DuplicateRegistration { .. }));

    container
        .register(ServiceDescriptor::<dyn Locale>::factory(|_| Ok(locale("IT"))).keep_existing())
        .unwrap();
    assert_eq!(container.resolve::<dyn Locale>().unwrap().locale(), "RU");

    container
        .register_factory_with::<dyn Locale, _>(
            Lifetime::Transient,
            None,
            IfAlreadyRegistered::Replace,
            |_| Ok(locale("EN")),
        )
        .unwrap();
    assert_eq!(container.resolve::<dyn Locale>().unwrap().locale(), "EN");
    assert_eq!(container.stats().registered_services, 1);
}

#[test]
fn return_default_for_unregistered_service() {
    let container = Container::new();
    let scope = container.open_named_scope("R1").unwrap();
    assert!(scope.resolve_or_default::<dyn Locale>().unwrap().is_none());
    assert!(!scope.is_registered::<dyn Locale>(None));
    assert!(scope.resolve::<dyn Locale>().unwrap_err().is_not_registered());
}

#[test]
fn cached_cycles_are_detected_even_when_detection_is_disabled() {
    struct A;
    struct B;

    let rules = ContainerRules {
        enable_circular_dependency_detection: false,
        ..ContainerRules::default()
    };
    let container = Container::with_rules(rules);
    container
        .register_factory::<A, _>(Lifetime::Singleton, |r| {
            r.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .unwrap();
    container
        .register_factory::<B, _>(Lifetime::Singleton, |r| {
            r.resolve::<A>()?;
            Ok(Arc::new(B))
        })
        .unwrap();

    assert!(matches!(
        container.resolve::<A>(),
        Err(DependencyError::CircularDependency { .. })
    ));
    // 失败的创建不会留下缓存
    assert_eq!(container.stats().cached_singletons, 0);
}

#[test]
fn validate_collects_every_failure() {
    struct NeedsMissing;
    struct Broken;

    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = calls.clone();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(locale("RU"))
        })
        .unwrap();
    container.register_placeholder::<dyn Handler>().unwrap();
    container
        .register_factory::<NeedsMissing, _>(Lifetime::Transient, |r| {
            r.resolve::<String>()?;
            Ok(Arc::new(NeedsMissing))
        })
        .unwrap();
    container
        .register_factory::<Broken, _>(Lifetime::Scoped, |_| {
            Err(DependencyError::creation_failed("Broken", "连接被拒绝"))
        })
        .unwrap();

    let errors = container.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().any(DependencyError::is_not_registered));
    assert!(errors
        .iter()
        .any(|err| matches!(err, DependencyError::ComponentCreationFailed { .. })));

    // 校验在一次性门面中进行，不影响容器自身的单例
    assert_eq!(container.stats().cached_singletons, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let healthy = Container::new();
    healthy
        .register_factory::<dyn Locale, _>(Lifetime::Scoped, |_| Ok(locale("RU")))
        .unwrap();
    assert!(healthy.validate().is_ok());
}
