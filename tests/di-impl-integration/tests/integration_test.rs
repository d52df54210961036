//! Centralized integration tests for di-impl crate
//!
//! 生命周期、作用域树、并发解析与释放顺序

use di_abstractions::{ScopeFactory, ServiceRegistrar, ServiceResolver};
use di_impl::{Container, Resolver, ServiceDescriptor};
use infrastructure_common::{
    ContainerRules, DependencyError, DependencyResult, Disposable, Lifetime, ScopeStatus,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

trait Locale: Send + Sync {
    fn locale(&self) -> String;
}

/// 带编号的语言实现，编号来自每个测试自己的计数器
struct LocaleImpl {
    locale: String,
}

impl LocaleImpl {
    fn new(name: &str, counter: &AtomicUsize) -> Self {
        Self {
            locale: format!("{}#{}", name, counter.fetch_add(1, Ordering::SeqCst)),
        }
    }
}

impl Locale for LocaleImpl {
    fn locale(&self) -> String {
        self.locale.clone()
    }
}

trait LocaleDisposable: Locale + Disposable {}

struct DisposableLocale {
    inner: LocaleImpl,
    log: Arc<Mutex<Vec<String>>>,
}

impl Locale for DisposableLocale {
    fn locale(&self) -> String {
        self.inner.locale()
    }
}

impl Disposable for DisposableLocale {
    fn dispose(&self) {
        self.log.lock().push(format!("{} => Disposed", self.inner.locale));
    }
}

impl LocaleDisposable for DisposableLocale {}

trait Parameter: Send + Sync {
    fn full_name(&self) -> DependencyResult<String>;
}

/// 每次取全名时重新解析语言
struct ParameterImpl {
    name: String,
    resolver: Resolver,
}

impl Parameter for ParameterImpl {
    fn full_name(&self) -> DependencyResult<String> {
        let locale = self.resolver.resolve::<dyn Locale>()?;
        Ok(format!("{} with locale: {}", self.name, locale.locale()))
    }
}

/// 构造时注入语言
struct BoundParameter {
    name: String,
    locale: Arc<dyn LocaleDisposable>,
}

impl Parameter for BoundParameter {
    fn full_name(&self) -> DependencyResult<String> {
        Ok(format!("{} with locale: {}", self.name, self.locale.locale()))
    }
}

fn locale_container(lifetime: Lifetime) -> (Container, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let shared = counter.clone();
    container
        .register_factory::<dyn Locale, _>(lifetime, move |_| {
            Ok(Arc::new(LocaleImpl::new("RU", &shared)) as Arc<dyn Locale>)
        })
        .unwrap();
    (container, counter)
}

fn register_disposable_locale(
    container: &Container,
    name: &'static str,
    key: Option<&str>,
    log: &Arc<Mutex<Vec<String>>>,
) {
    let counter = Arc::new(AtomicUsize::new(0));
    let log = log.clone();
    let mut descriptor = ServiceDescriptor::<dyn LocaleDisposable>::factory(move |_| {
        Ok(Arc::new(DisposableLocale {
            inner: LocaleImpl::new(name, &counter),
            log: log.clone(),
        }) as Arc<dyn LocaleDisposable>)
    })
    .scoped()
    .disposable();
    if let Some(key) = key {
        descriptor = descriptor.with_key(key);
    }
    container.register(descriptor).unwrap();
}

#[test]
fn transient_creates_new_instance_per_resolution() {
    let (container, _) = locale_container(Lifetime::Transient);
    container
        .register_factory::<dyn Parameter, _>(Lifetime::Transient, |r| {
            Ok(Arc::new(ParameterImpl {
                name: "Motion".to_string(),
                resolver: r.detach(),
            }) as Arc<dyn Parameter>)
        })
        .unwrap();

    let names: Vec<_> = (0..3)
        .map(|_| container.resolve::<dyn Locale>().unwrap().locale())
        .collect();
    assert_eq!(names, ["RU#0", "RU#1", "RU#2"]);

    // 参数每次取全名都会重新解析瞬时的语言
    let parameter = container.resolve::<dyn Parameter>().unwrap();
    assert_eq!(parameter.full_name().unwrap(), "Motion with locale: RU#3");
    assert_eq!(parameter.full_name().unwrap(), "Motion with locale: RU#4");
}

#[test]
fn scoped_instance_is_bound_to_innermost_scope() -> anyhow::Result<()> {
    let (container, counter) = locale_container(Lifetime::Scoped);

    let r1 = container.open_named_scope("R1")?;
    assert_eq!(r1.info().path, "root/R1");
    let first = r1.resolve::<dyn Locale>()?;
    assert!(Arc::ptr_eq(&first, &r1.resolve::<dyn Locale>()?));

    let r2 = container.open_named_scope("R2")?;
    assert!(!Arc::ptr_eq(&first, &r2.resolve::<dyn Locale>()?));

    let inner = r1.open_scope()?;
    let nested = inner.resolve::<dyn Locale>()?;
    assert!(!Arc::ptr_eq(&first, &nested));
    assert!(Arc::ptr_eq(&nested, &inner.resolve::<dyn Locale>()?));

    // 没有作用域时作用域服务落在根存储上
    let at_root = container.resolve::<dyn Locale>()?;
    assert!(Arc::ptr_eq(&at_root, &container.resolve::<dyn Locale>()?));

    assert_eq!(counter.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn each_thread_scope_gets_own_scoped_instance() {
    let (container, _) = locale_container(Lifetime::Scoped);

    let locales: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let container = &container;
                s.spawn(move || {
                    let scope = container
                        .open_named_scope(format!("Thread-{}", i))
                        .unwrap();
                    let first = scope.resolve::<dyn Locale>().unwrap();
                    let second = scope.resolve::<dyn Locale>().unwrap();
                    assert!(Arc::ptr_eq(&first, &second));
                    first.locale()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<_> = locales.iter().collect();
    assert_eq!(unique.len(), 4);
    assert_eq!(container.stats().open_scopes, 0);
}

#[test]
fn singleton_is_created_once_across_threads() {
    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = calls.clone();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Singleton, move |_| {
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(LocaleImpl::new("RU", &counter)) as Arc<dyn Locale>)
        })
        .unwrap();

    let barrier = Barrier::new(8);
    let resolved: Vec<Arc<dyn Locale>> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let scope = container.open_scope().unwrap();
                    barrier.wait();
                    scope.resolve::<dyn Locale>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(resolved.iter().all(|locale| Arc::ptr_eq(locale, &resolved[0])));
    assert_eq!(container.stats().cached_singletons, 1);
}

#[test]
fn concurrent_resolution_in_one_scope_runs_factory_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = calls.clone();
    container
        .register_factory::<dyn Locale, _>(Lifetime::Scoped, move |_| {
            thread::sleep(Duration::from_millis(20));
            Ok(Arc::new(LocaleImpl::new("RU", &counter)) as Arc<dyn Locale>)
        })
        .unwrap();

    let scope = container.open_scope().unwrap();
    let barrier = Barrier::new(8);
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                assert_eq!(scope.resolve::<dyn Locale>().unwrap().locale(), "RU#0");
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn scope_disposes_in_reverse_creation_order_once() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    register_disposable_locale(&container, "EN", Some("EN"), &log);
    register_disposable_locale(&container, "IT", Some("IT"), &log);

    let scope = container.open_scope().unwrap();
    let resolver = scope.resolver();
    scope.resolve_keyed::<dyn LocaleDisposable>("IT").unwrap();
    scope.resolve_keyed::<dyn LocaleDisposable>("EN").unwrap();
    scope.resolve_keyed::<dyn LocaleDisposable>("IT").unwrap();

    scope.close();
    scope.close();
    assert!(scope.is_disposed());
    drop(scope);
    assert_eq!(*log.lock(), ["EN#0 => Disposed", "IT#0 => Disposed"]);

    assert!(matches!(
        resolver.resolve_keyed::<dyn LocaleDisposable>("IT"),
        Err(DependencyError::ScopeDisposed { .. })
    ));
}

#[test]
fn scoped_dependency_is_disposed_with_its_own_scope() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    register_disposable_locale(&container, "RU", None, &log);
    container
        .register_factory::<dyn Parameter, _>(Lifetime::Transient, |r| {
            let name = r.args().get::<String>().cloned().unwrap_or_default();
            Ok(Arc::new(BoundParameter {
                name,
                locale: r.resolve()?,
            }) as Arc<dyn Parameter>)
        })
        .unwrap();

    let outer = container.open_scope().unwrap();
    let create = outer.resolve_func::<dyn Parameter>();
    let motion = create.call1("Motion".to_string()).unwrap();
    let moving = create.call1("Move".to_string()).unwrap();
    assert_eq!(motion.full_name().unwrap(), "Motion with locale: RU#0");
    assert_eq!(moving.full_name().unwrap(), "Move with locale: RU#0");

    {
        let inner = outer.open_scope().unwrap();
        let nested = inner
            .resolve_func::<dyn Parameter>()
            .call1("Motion".to_string())
            .unwrap();
        assert_eq!(nested.full_name().unwrap(), "Motion with locale: RU#1");
    }
    assert_eq!(*log.lock(), ["RU#1 => Disposed"]);

    drop(outer);
    assert_eq!(*log.lock(), ["RU#1 => Disposed", "RU#0 => Disposed"]);
}

#[test]
fn disposable_transient_requires_explicit_opt_in() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let make = |log: Arc<Mutex<Vec<String>>>| {
        let counter = AtomicUsize::new(0);
        ServiceDescriptor::<dyn LocaleDisposable>::factory(move |_| {
            Ok(Arc::new(DisposableLocale {
                inner: LocaleImpl::new("RU", &counter),
                log: log.clone(),
            }) as Arc<dyn LocaleDisposable>)
        })
        .disposable()
    };

    let strict = Container::new();
    assert!(matches!(
        strict.register(make(log.clone())),
        Err(DependencyError::RegistrationError { .. })
    ));

    let lenient = Container::with_rules(ContainerRules::default().with_disposable_transients_allowed());
    lenient.register(make(log.clone())).unwrap();
    {
        let scope = lenient.open_scope().unwrap();
        scope.resolve::<dyn LocaleDisposable>().unwrap();
    }
    // 瞬时实例不被跟踪，由调用方负责释放
    assert!(log.lock().is_empty());
}

#[test]
fn parent_teardown_waits_for_live_child() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();
    register_disposable_locale(&container, "RU", None, &log);

    let parent = container.open_named_scope("parent").unwrap();
    parent.resolve::<dyn LocaleDisposable>().unwrap();
    let child = parent.open_named_scope("child").unwrap();
    let in_child = child.resolve::<dyn LocaleDisposable>().unwrap();

    parent.close();
    assert_eq!(parent.status(), ScopeStatus::Closing);
    assert!(log.lock().is_empty());
    assert!(matches!(
        parent.resolve::<dyn LocaleDisposable>(),
        Err(DependencyError::ScopeDisposed { .. })
    ));
    assert!(Arc::ptr_eq(
        &in_child,
        &child.resolve::<dyn LocaleDisposable>().unwrap()
    ));

    drop(child);
    assert_eq!(parent.status(), ScopeStatus::Disposed);
    assert_eq!(*log.lock(), ["RU#1 => Disposed", "RU#0 => Disposed"]);
}

#[test]
fn opening_child_of_closed_scope_fails() {
    let (container, _) = locale_container(Lifetime::Scoped);
    let scope = container.open_named_scope("R1").unwrap();
    scope.resolve::<dyn Locale>().unwrap();
    let resolver = scope.resolver();

    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        resolver.open_scope().map(|scope| scope.info().path.clone())
    });
    drop(scope);

    assert!(matches!(
        worker.join().unwrap(),
        Err(DependencyError::ParentDisposed { .. })
    ));
}

#[test]
fn cycle_across_threads_fails_instead_of_deadlocking() {
    struct A;
    struct B;

    // 两个工厂都先占住自己的槽位，再去解析对方
    fn rendezvous(barrier: &Barrier, armed: &AtomicBool) {
        if armed.swap(false, Ordering::SeqCst) {
            barrier.wait();
        }
    }

    let barrier = Arc::new(Barrier::new(2));
    let container = Arc::new(Container::new());

    let (gate, armed) = (barrier.clone(), Arc::new(AtomicBool::new(true)));
    container
        .register_factory::<A, _>(Lifetime::Singleton, move |r| {
            rendezvous(&gate, &armed);
            r.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .unwrap();
    let (gate, armed) = (barrier, Arc::new(AtomicBool::new(true)));
    container
        .register_factory::<B, _>(Lifetime::Singleton, move |r| {
            rendezvous(&gate, &armed);
            r.resolve::<A>()?;
            Ok(Arc::new(B))
        })
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let a_side = {
        let (container, tx) = (container.clone(), tx.clone());
        thread::spawn(move || {
            tx.send(("A", container.resolve::<A>().map(|_| ()))).unwrap();
        })
    };
    let b_side = {
        let container = container.clone();
        thread::spawn(move || {
            tx.send(("B", container.resolve::<B>().map(|_| ()))).unwrap();
        })
    };

    for _ in 0..2 {
        let (side, result) = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("解析线程互相阻塞");
        assert!(
            matches!(result, Err(DependencyError::CircularDependency { .. })),
            "{} 侧结果: {:?}",
            side,
            result
        );
    }
    a_side.join().unwrap();
    b_side.join().unwrap();
    assert_eq!(container.stats().cached_singletons, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_task_scopes_on_multi_thread_runtime() {
    let (container, counter) = locale_container(Lifetime::Scoped);
    let container = Arc::new(container);

    let mut handles = Vec::new();
    for i in 0..8 {
        let container = container.clone();
        handles.push(tokio::spawn(async move {
            let scope = container.open_named_scope(format!("task-{}", i))?;
            let first = scope.resolve::<dyn Locale>()?;
            tokio::task::yield_now().await;
            let second = scope.resolve::<dyn Locale>()?;
            assert!(Arc::ptr_eq(&first, &second));
            Ok::<_, DependencyError>(first.locale())
        }));
    }

    let mut locales = HashSet::new();
    for handle in handles {
        locales.insert(handle.await.unwrap().unwrap());
    }
    assert_eq!(locales.len(), 8);
    assert_eq!(counter.load(Ordering::SeqCst), 8);
    assert_eq!(container.stats().open_scopes, 0);
}
