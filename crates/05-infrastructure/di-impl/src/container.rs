//! 依赖注入容器
//!
//! 容器持有注册表和根存储（单例缓存）。作用域从容器打开，门面是带有独立注册表副本的新容器。

use crate::descriptor::{Initializer, Instance, ServiceDescriptor};
use crate::functor::{ServiceCollection, ServiceFunc, ServiceLazy};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::scope::{Scope, ScopeCore};
use di_abstractions::{
    Args, ContainerStats, FacadeOptions, IfAlreadyRegistered, RequestInfo, ResolveOptions,
    ScopeFactory, ServiceRegistrar, ServiceResolver,
};
use infrastructure_common::{
    ContainerRules, DependencyError, DependencyResult, IfUnresolved, Lifetime, ScopeStatus,
    ServiceKey,
};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_CONTAINER_NAME: &str = "root";

/// 容器内部状态，由容器、作用域和解析器共享
pub(crate) struct ContainerCore {
    pub(crate) registry: Registry,
    pub(crate) root: Arc<ScopeCore>,
    pub(crate) rules: ContainerRules,
}

/// 容器构建器
#[derive(Debug, Clone, Default)]
pub struct ContainerBuilder {
    name: Option<String>,
    rules: ContainerRules,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置容器规则
    pub fn with_rules(mut self, rules: ContainerRules) -> Self {
        self.rules = rules;
        self
    }

    /// 设置根存储名称（作用域路径的第一段）
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Container {
        let name = self
            .name
            .unwrap_or_else(|| DEFAULT_CONTAINER_NAME.to_string());
        info!("创建依赖注入容器: {}", name);
        Container::from_parts(Registry::new(), ScopeCore::root(name), self.rules)
    }
}

/// 依赖注入容器
///
/// 容器被丢弃或调用 [`Container::dispose`] 时销毁根存储；
/// 如果仍有打开的作用域，销毁推迟到最后一个作用域关闭时。
pub struct Container {
    core: Arc<ContainerCore>,
}

impl Container {
    /// 使用默认规则创建容器
    pub fn new() -> Self {
        ContainerBuilder::new().build()
    }

    /// 使用指定规则创建容器
    pub fn with_rules(rules: ContainerRules) -> Self {
        ContainerBuilder::new().with_rules(rules).build()
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn from_parts(registry: Registry, root: Arc<ScopeCore>, rules: ContainerRules) -> Self {
        Self {
            core: Arc::new(ContainerCore {
                registry,
                root,
                rules,
            }),
        }
    }

    /// 容器名称
    pub fn name(&self) -> &str {
        &self.core.root.info().path
    }

    pub fn rules(&self) -> &ContainerRules {
        &self.core.rules
    }

    /// 注册描述符
    pub fn register<T>(&self, descriptor: ServiceDescriptor<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.core.root.ensure_open()?;
        let rules = &self.core.rules;
        let (descriptor, policy) = descriptor.build(
            rules.default_lifetime,
            rules.throw_on_registering_disposable_transient,
        )?;
        self.core.registry.register(descriptor, policy)?;
        Ok(())
    }

    /// 在根存储预置实例，对所有作用域可见
    pub fn use_instance<T>(&self, instance: Arc<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.core
            .root
            .use_instance(ServiceKey::of::<T>(), Arc::new(instance) as Instance)
    }

    /// 在根存储预置带键实例
    pub fn use_keyed_instance<T>(&self, service_key: impl Into<String>, instance: Arc<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.core
            .root
            .use_instance(ServiceKey::keyed::<T>(service_key), Arc::new(instance) as Instance)
    }

    /// 绑定到根存储的解析器
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.core.clone(), self.core.root.clone())
    }

    /// 延迟、可重复枚举所有注册
    pub fn resolve_many<T>(&self) -> ServiceCollection<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_many()
    }

    /// 获取服务函数子
    pub fn resolve_func<T>(&self) -> ServiceFunc<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_func()
    }

    /// 获取带键服务函数子
    pub fn resolve_keyed_func<T>(&self, service_key: impl Into<String>) -> ServiceFunc<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_keyed_func(service_key)
    }

    /// 获取延迟解析包装
    pub fn resolve_lazy<T>(&self) -> ServiceLazy<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_lazy()
    }

    /// 创建门面：复制当前注册，单例存储独立
    pub fn create_facade(&self) -> Container {
        self.create_facade_with(FacadeOptions::default())
    }

    /// 按选项创建门面
    ///
    /// 门面上的新注册和替换对父容器不可见。复制的单例仍由父容器负责释放。
    pub fn create_facade_with(&self, options: FacadeOptions) -> Container {
        let name = format!("{}.facade", self.name());
        let root = ScopeCore::root(name);
        if options.copy_singletons {
            root.copy_created_from(&self.core.root);
        }
        debug!(
            "创建门面: {} (复制单例: {})",
            root.info(),
            options.copy_singletons
        );
        Self::from_parts(self.core.registry.snapshot(), root, self.core.rules.clone())
    }

    /// 复制注册和已创建的单例
    pub fn with_registrations_copy(&self) -> Container {
        self.create_facade_with(FacadeOptions::with_singletons())
    }

    /// 复制注册，使用全新的单例存储
    pub fn without_singletons_and_cache(&self) -> Container {
        self.create_facade_with(FacadeOptions::default())
    }

    /// 校验所有具体注册是否可以解析
    ///
    /// 在一次性门面的作用域内逐个解析，返回全部失败。等待作用域填充的占位依赖不算失败。
    pub fn validate(&self) -> Result<(), Vec<DependencyError>> {
        let facade = self.with_registrations_copy();
        let scope = facade.open_named_scope("validation").map_err(|err| vec![err])?;
        let resolver = scope.resolver();

        let errors: Vec<_> = self
            .core
            .registry
            .concrete_descriptors()
            .into_iter()
            .filter_map(|descriptor| {
                resolver
                    .resolve_instance(
                        descriptor.service_type(),
                        descriptor.service.key.clone(),
                        IfUnresolved::Throw,
                        Args::new(),
                    )
                    .err()
            })
            .filter(|err| !matches!(err, DependencyError::UnfilledPlaceholder { .. }))
            .collect();

        if errors.is_empty() {
            debug!("容器校验通过: {}", self.name());
            Ok(())
        } else {
            warn!("容器校验失败: {} 个错误", errors.len());
            Err(errors)
        }
    }

    /// 容器统计信息
    pub fn stats(&self) -> ContainerStats {
        let mut stats = ContainerStats::default();
        self.core.registry.fill_stats(&mut stats);
        stats.cached_singletons = self.core.root.created_count();
        stats.open_scopes = self.core.root.open_children();
        stats
    }

    /// 销毁容器；仍有打开的作用域时推迟到它们全部关闭
    pub fn dispose(&self) {
        self.core.root.close();
    }

    pub fn is_disposed(&self) -> bool {
        self.core.root.status() == ScopeStatus::Disposed
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistrar for Container {
    type Resolver = Resolver;

    fn register_factory_with<T, F>(
        &self,
        lifetime: Lifetime,
        service_key: Option<String>,
        if_already_registered: IfAlreadyRegistered,
        factory: F,
    ) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        let mut descriptor = ServiceDescriptor::<T>::factory(factory)
            .with_lifetime(lifetime)
            .if_already_registered(if_already_registered);
        if let Some(key) = service_key {
            descriptor = descriptor.with_key(key);
        }
        self.register(descriptor)
    }

    fn register_placeholder<T>(&self) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::<T>::placeholder())
    }

    fn register_decorator<T, F>(&self, lifetime: Lifetime, factory: F) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Self::Resolver) -> DependencyResult<Arc<T>> + Send + Sync + 'static,
    {
        self.register(ServiceDescriptor::<T>::decorator(factory).with_lifetime(lifetime))
    }

    fn register_initializer_when<T, F, P>(&self, initializer: F, condition: P)
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Arc<T>, &Self::Resolver) + Send + Sync + 'static,
        P: Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    {
        debug!("注册初始化器: {}", std::any::type_name::<T>());
        let action = move |instance: &Instance, resolver: &Resolver| {
            if let Some(instance) = instance.downcast_ref::<Arc<T>>() {
                initializer(instance, resolver);
            }
        };
        self.core.registry.add_initializer(
            TypeId::of::<T>(),
            Initializer {
                action: Arc::new(action),
                condition: Arc::new(condition),
            },
        );
    }
}

impl ServiceResolver for Container {
    fn resolve_with<T>(&self, options: ResolveOptions) -> DependencyResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_with(options)
    }

    fn resolve_all<T>(&self) -> DependencyResult<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_all()
    }

    fn is_registered<T>(&self, service_key: Option<&str>) -> bool
    where
        T: ?Sized + 'static,
    {
        self.resolver().is_registered::<T>(service_key)
    }
}

impl ScopeFactory for Container {
    type Scope = Scope;

    fn open_scope_with(&self, name: Option<String>) -> DependencyResult<Scope> {
        let scope = self.core.root.open_child(name)?;
        Ok(Scope::new(self.core.clone(), scope))
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.core.root.close();
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("status", &self.core.root.status())
            .field("stats", &self.stats())
            .finish()
    }
}
