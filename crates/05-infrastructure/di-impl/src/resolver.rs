//! 解析器
//!
//! 沿 作用域链 → 注册表 的顺序查找服务，按生命周期委托作用域缓存，
//! 并负责装饰器替换、初始化器调用和循环依赖检测。

use crate::container::ContainerCore;
use crate::descriptor::{Descriptor, DescriptorKind, Instance};
use crate::functor::{ServiceCollection, ServiceFunc, ServiceLazy};
use crate::scope::{Scope, ScopeCore};
use di_abstractions::{Args, RequestInfo, ResolveOptions, ScopeFactory, ServiceResolver};
use infrastructure_common::{
    ContainerRules, DependencyError, DependencyResult, IfUnresolved, Lifetime, ServiceKey,
    ServiceType,
};
use std::any::TypeId;
use std::sync::Arc;
use tracing::{trace, warn};

/// 解析目标：预置实例或描述符
#[derive(Clone)]
pub(crate) enum Target {
    Used { service: ServiceKey, instance: Instance },
    Descriptor(Arc<Descriptor>),
}

impl Target {
    pub(crate) fn service_key(&self) -> &ServiceKey {
        match self {
            Self::Used { service, .. } => service,
            Self::Descriptor(descriptor) => &descriptor.service,
        }
    }
}

/// 装饰器工厂解析自身抽象时应得到的下一层
#[derive(Clone)]
struct Decoration {
    type_id: TypeId,
    /// 剩余可用的装饰器层数
    level: usize,
    target: Target,
}

#[derive(Debug, Clone)]
struct PathEntry {
    descriptor_id: u64,
    service: ServiceKey,
}

/// 解析上下文
///
/// 传给每个工厂调用；也可以通过 [`Scope::resolver`] 获得。
/// 工厂如果需要在构造完成后继续解析（例如晚绑定），应保存 [`Resolver::detach`] 的结果。
#[derive(Clone)]
pub struct Resolver {
    core: Arc<ContainerCore>,
    scope: Arc<ScopeCore>,
    path: Vec<PathEntry>,
    decoration: Option<Decoration>,
    args: Args,
    request: Option<RequestInfo>,
}

impl Resolver {
    pub(crate) fn new(core: Arc<ContainerCore>, scope: Arc<ScopeCore>) -> Self {
        Self {
            core,
            scope,
            path: Vec::new(),
            decoration: None,
            args: Args::new(),
            request: None,
        }
    }

    /// 当前工厂调用收到的额外参数
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// 当前请求信息，顶层解析器为 `None`
    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    /// 容器规则
    pub fn rules(&self) -> &ContainerRules {
        &self.core.rules
    }

    /// 当前作用域路径
    pub fn scope_path(&self) -> &str {
        &self.scope.info().path
    }

    /// 脱离当前解析链的句柄，保留作用域绑定
    pub fn detach(&self) -> Self {
        Self::new(self.core.clone(), self.scope.clone())
    }

    /// 字段/属性注入
    ///
    /// 未启用字段注入时返回 `None`；启用时按 `properties_and_fields.if_unresolved` 处理未注册的服务。
    pub fn inject<T>(&self) -> DependencyResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let rules = self.core.rules.properties_and_fields;
        if !rules.enabled {
            return Ok(None);
        }
        self.resolve_with(ResolveOptions::new().with_if_unresolved(rules.if_unresolved))
    }

    /// 延迟、可重复枚举所有注册
    pub fn resolve_many<T>(&self) -> ServiceCollection<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceCollection::new(self.detach())
    }

    /// 获取服务函数子，每次调用都执行一次解析
    pub fn resolve_func<T>(&self) -> ServiceFunc<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceFunc::new(self.detach(), None)
    }

    /// 获取带键服务函数子
    pub fn resolve_keyed_func<T>(&self, service_key: impl Into<String>) -> ServiceFunc<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceFunc::new(self.detach(), Some(service_key.into()))
    }

    /// 获取延迟解析包装，首次访问时解析
    pub fn resolve_lazy<T>(&self) -> ServiceLazy<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceLazy::new(self.resolve_func())
    }

    /// 枚举某抽象的可解析目标（跳过未填充的占位）
    pub(crate) fn targets(&self, service_type: ServiceType) -> Vec<Target> {
        self.core
            .registry
            .enumerate(service_type.id)
            .into_iter()
            .filter_map(|descriptor| match self.scope.find_used(&descriptor.service) {
                Some(instance) => Some(Target::Used {
                    service: descriptor.service.clone(),
                    instance,
                }),
                None if descriptor.kind == DescriptorKind::Placeholder => None,
                None => Some(Target::Descriptor(descriptor)),
            })
            .collect()
    }

    /// 查找解析目标：作用域链上的预置实例优先，其次是注册表
    fn lookup(&self, service: &ServiceKey) -> DependencyResult<Option<Target>> {
        if let Some(instance) = self.scope.find_used(service) {
            return Ok(Some(Target::Used {
                service: service.clone(),
                instance,
            }));
        }

        match self.core.registry.resolve_descriptor(service) {
            Ok(descriptor) if descriptor.kind == DescriptorKind::Placeholder => {
                Err(DependencyError::UnfilledPlaceholder {
                    service: service.to_string(),
                    scope: self.scope.info().path.clone(),
                })
            }
            Ok(descriptor) => Ok(Some(Target::Descriptor(descriptor))),
            Err(err) if err.is_not_registered() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 解析服务，返回类型擦除的实例
    pub(crate) fn resolve_instance(
        &self,
        service_type: ServiceType,
        service_key: Option<String>,
        if_unresolved: IfUnresolved,
        args: Args,
    ) -> DependencyResult<Option<Instance>> {
        self.scope.ensure_open()?;

        let service = ServiceKey::new(service_type, service_key);

        // 装饰器工厂解析自身抽象时得到下一层；同类型的其他键取同一层的实现
        let (target, level, args) = match &self.decoration {
            Some(decoration)
                if decoration.type_id == service_type.id
                    && decoration.target.service_key() == &service =>
            {
                let args = if args.is_empty() { self.args.clone() } else { args };
                (Some(decoration.target.clone()), decoration.level, args)
            }
            Some(decoration) if decoration.type_id == service_type.id => {
                (self.lookup(&service)?, decoration.level, args)
            }
            _ => (
                self.lookup(&service)?,
                self.core.registry.decorator_count(service_type.id),
                args,
            ),
        };

        let Some(target) = target else {
            return match if_unresolved {
                IfUnresolved::ReturnDefault => {
                    trace!("服务未注册，返回空值: {}", service);
                    Ok(None)
                }
                IfUnresolved::Throw => Err(DependencyError::ServiceNotRegistered {
                    service: service.to_string(),
                }),
            };
        };

        self.resolve_target(target, level, args).map(Some)
    }

    /// 解析枚举得到的目标，应用全部装饰器
    pub(crate) fn resolve_enumerated(&self, target: Target) -> DependencyResult<Instance> {
        self.scope.ensure_open()?;
        let level = self
            .core
            .registry
            .decorator_count(target.service_key().service_type.id);
        self.resolve_target(target, level, Args::new())
    }

    /// 解析指定目标，`level` 为外层尚未应用的装饰器数量
    pub(crate) fn resolve_target(&self, target: Target, level: usize, args: Args) -> DependencyResult<Instance> {
        if level > 0 {
            let type_id = target.service_key().service_type.id;
            let decorators = self.core.registry.decorators(type_id);
            if let Some(decorator) = decorators.get(level - 1) {
                let decoration = Decoration {
                    type_id,
                    level: level - 1,
                    target,
                };
                return self.produce(decorator, args, Some(decoration));
            }
        }

        match target {
            Target::Used { instance, .. } => Ok(instance),
            Target::Descriptor(descriptor) => self.produce(&descriptor, args, None),
        }
    }

    fn check_path(&self, descriptor: &Descriptor, lifetime: Lifetime) -> DependencyResult<()> {
        let rules = &self.core.rules;
        let detect = rules.enable_circular_dependency_detection || lifetime.is_cached();
        if detect && self.path.iter().any(|entry| entry.descriptor_id == descriptor.id) {
            return Err(DependencyError::CircularDependency {
                dependency_chain: self.render_path(descriptor),
            });
        }
        if self.path.len() >= rules.max_resolution_depth {
            return Err(DependencyError::ResolutionDepthExceeded {
                max_depth: rules.max_resolution_depth,
                dependency_chain: self.render_path(descriptor),
            });
        }
        Ok(())
    }

    fn render_path(&self, next: &Descriptor) -> String {
        self.path
            .iter()
            .map(|entry| entry.service.to_string())
            .chain(std::iter::once(next.service.to_string()))
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// 按生命周期创建或取回实例
    fn produce(
        &self,
        descriptor: &Arc<Descriptor>,
        args: Args,
        decoration: Option<Decoration>,
    ) -> DependencyResult<Instance> {
        let ignore_reuse =
            self.core.rules.ignore_reuse_for_parameterized_functors && !args.is_empty();
        let lifetime = if ignore_reuse {
            Lifetime::Transient
        } else {
            descriptor.lifetime
        };
        self.check_path(descriptor, lifetime)?;

        // 单例的依赖在根存储上解析，避免捕获短生命周期的作用域；
        // 装饰预置实例的单例随预置实例所在的作用域缓存
        let owner = match (&decoration, lifetime) {
            (
                Some(Decoration {
                    target: Target::Used { service, .. },
                    ..
                }),
                Lifetime::Singleton,
            ) => self
                .scope
                .used_owner(service)
                .unwrap_or_else(|| self.core.root.clone()),
            (_, Lifetime::Singleton) => self.core.root.clone(),
            (_, Lifetime::Scoped | Lifetime::Transient) => self.scope.clone(),
        };

        let request = RequestInfo {
            service: descriptor.service.clone(),
            lifetime,
            scope: (!owner.is_root()).then(|| owner.info().path.clone()),
            depth: self.path.len(),
            has_args: !args.is_empty(),
        };

        let decorated = decoration
            .as_ref()
            .map(|decoration| decoration.target.service_key().clone());

        let mut path = self.path.clone();
        path.push(PathEntry {
            descriptor_id: descriptor.id,
            service: descriptor.service.clone(),
        });

        let child = Self {
            core: self.core.clone(),
            scope: owner.clone(),
            path,
            decoration,
            args,
            request: Some(request),
        };

        match lifetime {
            Lifetime::Transient => {
                if descriptor.disposer.is_some() {
                    warn!("可释放的瞬时实例不会被跟踪，由调用方负责释放: {}", descriptor.service);
                }
                child.construct(descriptor)
            }
            Lifetime::Scoped | Lifetime::Singleton => {
                owner.get_or_create(
                    descriptor,
                    decorated.as_ref(),
                    || child.construct(descriptor),
                    || DependencyError::CircularDependency {
                        dependency_chain: self.render_path(descriptor),
                    },
                )
            }
        }
    }

    /// 调用工厂并执行初始化器
    fn construct(&self, descriptor: &Descriptor) -> DependencyResult<Instance> {
        let Some(factory) = &descriptor.factory else {
            return Err(DependencyError::UnfilledPlaceholder {
                service: descriptor.service.to_string(),
                scope: self.scope.info().path.clone(),
            });
        };

        let instance = factory(self)?;

        // 初始化器只作用于被装饰的实现本身
        let initializers = match descriptor.kind {
            DescriptorKind::Decorator => Vec::new(),
            DescriptorKind::Concrete | DescriptorKind::Placeholder => {
                self.core.registry.initializers(descriptor.service_type().id)
            }
        };
        if !initializers.is_empty() {
            if let Some(request) = &self.request {
                for initializer in initializers {
                    if (initializer.condition)(request) {
                        (initializer.action)(&instance, self);
                    }
                }
            }
        }

        trace!(
            "创建实例: {} ({}) @ {}",
            descriptor.service,
            descriptor.lifetime,
            self.scope.info()
        );
        Ok(instance)
    }
}

/// 将类型擦除的实例还原为 `Arc<T>`
pub(crate) fn downcast<T>(instance: &Instance) -> DependencyResult<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    instance
        .downcast_ref::<Arc<T>>()
        .cloned()
        .ok_or_else(|| DependencyError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
}

impl ServiceResolver for Resolver {
    fn resolve_with<T>(&self, options: ResolveOptions) -> DependencyResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_instance(
            ServiceType::of::<T>(),
            options.service_key,
            options.if_unresolved,
            options.args,
        )?
        .map(|instance| downcast::<T>(&instance))
        .transpose()
    }

    fn resolve_all<T>(&self) -> DependencyResult<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        ServiceCollection::<T>::new(self.clone()).to_vec()
    }

    fn is_registered<T>(&self, service_key: Option<&str>) -> bool
    where
        T: ?Sized + 'static,
    {
        let service = ServiceKey::new(ServiceType::of::<T>(), service_key.map(str::to_string));
        self.scope.find_used(&service).is_some() || self.core.registry.find(&service).is_some()
    }
}

impl ScopeFactory for Resolver {
    type Scope = Scope;

    fn open_scope_with(&self, name: Option<String>) -> DependencyResult<Scope> {
        let child = self.scope.open_child(name)?;
        Ok(Scope::new(self.core.clone(), child))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("scope", &self.scope.info().path)
            .field("path", &self.path)
            .field("args", &self.args)
            .finish()
    }
}
