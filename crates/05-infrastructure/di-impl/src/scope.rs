//! 作用域树
//!
//! 每个作用域持有自己的实例缓存、预置实例（`use_instance`）和释放列表。
//! 子作用域强引用父作用域，父作用域只记录存活子作用域的数量；
//! 父作用域在最后一个子作用域关闭之前不会完成销毁。
//!
//! 缓存槽位的创建在进程内登记创建线程和等待关系，等待另一个线程正在创建的槽位之前
//! 先检查等待链，跨线程的循环依赖因此报错而不是互相阻塞。

use crate::container::ContainerCore;
use crate::descriptor::{Descriptor, DisposerFn, Instance};
use crate::functor::{ServiceCollection, ServiceFunc, ServiceLazy};
use crate::resolver::Resolver;
use dashmap::DashMap;
use di_abstractions::{ResolveOptions, ScopeFactory, ServiceResolver};
use infrastructure_common::{
    DependencyError, DependencyResult, ScopeInfo, ScopeStatus, ServiceKey,
};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);
static IN_FLIGHT: Lazy<Mutex<InFlight>> = Lazy::new(|| Mutex::new(InFlight::default()));
static SLOT_RELEASED: Condvar = Condvar::new();

/// 进行中的创建：槽位 → 创建线程，线程 → 正在等待的槽位
#[derive(Default)]
struct InFlight {
    owners: HashMap<u64, ThreadId>,
    waiting: HashMap<ThreadId, u64>,
}

impl InFlight {
    /// 从 `owner` 沿等待关系能否回到 `current`
    fn leads_to(&self, mut owner: ThreadId, current: ThreadId) -> bool {
        for _ in 0..=self.waiting.len() {
            if owner == current {
                return true;
            }
            let Some(slot) = self.waiting.get(&owner) else {
                return false;
            };
            let Some(next) = self.owners.get(slot) else {
                return false;
            };
            owner = *next;
        }
        false
    }
}

/// 当前线程对槽位的创建权，离开时释放并唤醒等待者
struct SlotClaim(u64);

impl Drop for SlotClaim {
    fn drop(&mut self) {
        IN_FLIGHT.lock().owners.remove(&self.0);
        SLOT_RELEASED.notify_all();
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    status: ScopeStatus,
    open_children: usize,
}

/// 缓存槽位键：描述符ID，装饰器另加被装饰的服务键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    descriptor_id: u64,
    decorated: Option<ServiceKey>,
}

struct Slot {
    id: u64,
    cell: OnceCell<Instance>,
}

impl Slot {
    fn new() -> Self {
        Self {
            id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            cell: OnceCell::new(),
        }
    }
}

struct TrackedDisposable {
    service: String,
    instance: Instance,
    disposer: DisposerFn,
}

/// 作用域节点
pub(crate) struct ScopeCore {
    info: ScopeInfo,
    parent: Option<Arc<ScopeCore>>,
    state: Mutex<ScopeState>,
    /// 槽保证同一实例最多创建一次
    slots: DashMap<SlotKey, Arc<Slot>>,
    used: DashMap<ServiceKey, Instance>,
    disposables: Mutex<Vec<TrackedDisposable>>,
}

impl ScopeCore {
    /// 创建根作用域（容器的单例存储）
    pub(crate) fn root(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_info(ScopeInfo::root(name), None))
    }

    fn with_info(info: ScopeInfo, parent: Option<Arc<ScopeCore>>) -> Self {
        Self {
            info,
            parent,
            state: Mutex::new(ScopeState::default()),
            slots: DashMap::new(),
            used: DashMap::new(),
            disposables: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn info(&self) -> &ScopeInfo {
        &self.info
    }

    pub(crate) fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn status(&self) -> ScopeStatus {
        self.state.lock().status
    }

    pub(crate) fn open_children(&self) -> usize {
        self.state.lock().open_children
    }

    pub(crate) fn disposed_error(&self) -> DependencyError {
        if self.is_root() {
            DependencyError::ContainerDisposed {
                container: self.info.path.clone(),
            }
        } else {
            DependencyError::ScopeDisposed {
                scope: self.info.path.clone(),
            }
        }
    }

    /// 当前作用域是否可用于新的解析请求
    pub(crate) fn ensure_open(&self) -> DependencyResult<()> {
        match self.status() {
            ScopeStatus::Open => Ok(()),
            ScopeStatus::Closing | ScopeStatus::Disposed => Err(self.disposed_error()),
        }
    }

    /// 打开子作用域，父作用域不是打开状态时立即失败
    pub(crate) fn open_child(self: &Arc<Self>, name: Option<String>) -> DependencyResult<Arc<Self>> {
        let mut state = self.state.lock();
        if state.status != ScopeStatus::Open {
            return Err(DependencyError::ParentDisposed {
                parent: self.info.path.clone(),
            });
        }
        state.open_children += 1;
        drop(state);

        let child = Arc::new(Self::with_info(self.info.child(name), Some(self.clone())));
        debug!("打开作用域: {}", child.info);
        Ok(child)
    }

    /// 获取或创建实例
    ///
    /// 同一槽位上的并发调用只有一个会执行 `create`，其余调用阻塞直到结果写入缓存。
    /// `create` 失败时槽位保持为空，等待者中的一个接手重新创建。装饰器按被装饰的服务键分别缓存。
    /// 等待会构成环（包括同一线程重入正在创建的槽位）时返回 `on_cycle` 的错误。
    pub(crate) fn get_or_create<F, C>(
        &self,
        descriptor: &Descriptor,
        decorated: Option<&ServiceKey>,
        create: F,
        on_cycle: C,
    ) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<Instance>,
        C: FnOnce() -> DependencyError,
    {
        let slot = self
            .slots
            .entry(SlotKey {
                descriptor_id: descriptor.id,
                decorated: decorated.cloned(),
            })
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();
        let current = thread::current().id();

        loop {
            if self.status() == ScopeStatus::Disposed {
                return Err(self.disposed_error());
            }
            if let Some(instance) = slot.cell.get() {
                trace!("缓存命中: {} @ {}", descriptor.service, self.info);
                return Ok(instance.clone());
            }

            let mut in_flight = IN_FLIGHT.lock();
            if slot.cell.get().is_some() {
                continue;
            }
            let owner = in_flight.owners.get(&slot.id).copied();
            match owner {
                None => {
                    in_flight.owners.insert(slot.id, current);
                    drop(in_flight);
                    let _claim = SlotClaim(slot.id);
                    return self.create_in(descriptor, &slot, create);
                }
                Some(owner) if in_flight.leads_to(owner, current) => {
                    drop(in_flight);
                    warn!("等待 {} 会形成循环 @ {}", descriptor.service, self.info);
                    return Err(on_cycle());
                }
                Some(_) => {
                    in_flight.waiting.insert(current, slot.id);
                    SLOT_RELEASED.wait(&mut in_flight);
                    in_flight.waiting.remove(&current);
                }
            }
        }
    }

    fn create_in<F>(&self, descriptor: &Descriptor, slot: &Slot, create: F) -> DependencyResult<Instance>
    where
        F: FnOnce() -> DependencyResult<Instance>,
    {
        let instance = create()?;
        if slot.cell.set(instance.clone()).is_err() {
            warn!("槽位已被写入，丢弃重复创建的实例: {}", descriptor.service);
        }
        if let Some(disposer) = &descriptor.disposer {
            self.track(descriptor.service.to_string(), instance.clone(), disposer.clone());
        }
        Ok(instance)
    }

    /// 持有预置实例的作用域（沿作用域链向上）
    pub(crate) fn used_owner(self: &Arc<Self>, service: &ServiceKey) -> Option<Arc<Self>> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if scope.used.contains_key(service) {
                return Some(scope);
            }
            current = scope.parent.clone();
        }
        None
    }

    fn track(&self, service: String, instance: Instance, disposer: DisposerFn) {
        let state = self.state.lock();
        if state.status == ScopeStatus::Disposed {
            drop(state);
            warn!("作用域 {} 已销毁，立即释放晚到的实例: {}", self.info, service);
            disposer(&instance);
            return;
        }
        self.disposables.lock().push(TrackedDisposable {
            service,
            instance,
            disposer,
        });
    }

    /// 在本作用域预置实例，覆盖占位和后续的工厂调用（对子作用域同样可见）
    pub(crate) fn use_instance(&self, service: ServiceKey, instance: Instance) -> DependencyResult<()> {
        self.ensure_open()?;
        debug!("作用域 {} 预置实例: {}", self.info, service);
        self.used.insert(service, instance);
        Ok(())
    }

    /// 沿作用域链向上查找预置实例
    pub(crate) fn find_used(&self, service: &ServiceKey) -> Option<Instance> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(instance) = scope.used.get(service) {
                return Some(instance.clone());
            }
            current = scope.parent.as_deref();
        }
        None
    }

    /// 根存储中已创建的实例数量
    pub(crate) fn created_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.cell.get().is_some()).count()
    }

    /// 复制已创建的实例槽位（不复制释放责任）
    pub(crate) fn copy_created_from(&self, other: &ScopeCore) {
        for entry in other.slots.iter() {
            if entry.value().cell.get().is_some() {
                self.slots.insert(entry.key().clone(), entry.value().clone());
            }
        }
        for entry in other.used.iter() {
            self.used.insert(entry.key().clone(), entry.value().clone());
        }
    }

    /// 请求关闭
    ///
    /// 没有存活子作用域时立即销毁，否则推迟到最后一个子作用域关闭时。重复调用无副作用。
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        match state.status {
            ScopeStatus::Open => state.status = ScopeStatus::Closing,
            ScopeStatus::Closing | ScopeStatus::Disposed => {
                warn!("作用域 {} 已关闭，忽略重复关闭", self.info);
                return;
            }
        }
        let open_children = state.open_children;
        drop(state);

        if open_children == 0 {
            self.teardown();
        } else {
            warn!(
                "作用域 {} 仍有 {} 个子作用域，推迟销毁",
                self.info, open_children
            );
        }
    }

    fn child_closed(&self) {
        let mut state = self.state.lock();
        state.open_children = state.open_children.saturating_sub(1);
        let ready = state.status == ScopeStatus::Closing && state.open_children == 0;
        drop(state);

        if ready {
            self.teardown();
        }
    }

    fn teardown(&self) {
        self.state.lock().status = ScopeStatus::Disposed;

        let tracked = std::mem::take(&mut *self.disposables.lock());
        debug!("销毁作用域: {} (释放 {} 个实例)", self.info, tracked.len());
        for item in tracked.into_iter().rev() {
            trace!("释放实例: {} @ {}", item.service, self.info);
            (item.disposer)(&item.instance);
        }

        self.slots.clear();
        self.used.clear();

        if let Some(parent) = &self.parent {
            parent.child_closed();
        }
    }
}

/// 作用域句柄
///
/// 离开作用域（`Drop`）时自动关闭；也可以调用 [`Scope::close`] 显式关闭。
pub struct Scope {
    core: Arc<ContainerCore>,
    scope: Arc<ScopeCore>,
}

impl Scope {
    pub(crate) fn new(core: Arc<ContainerCore>, scope: Arc<ScopeCore>) -> Self {
        Self { core, scope }
    }

    /// 作用域信息
    pub fn info(&self) -> &ScopeInfo {
        self.scope.info()
    }

    /// 作用域名称
    pub fn name(&self) -> Option<&str> {
        self.scope.info().name.as_deref()
    }

    /// 作用域状态
    pub fn status(&self) -> ScopeStatus {
        self.scope.status()
    }

    /// 是否已销毁
    pub fn is_disposed(&self) -> bool {
        self.scope.status() == ScopeStatus::Disposed
    }

    /// 关闭作用域，按创建顺序的逆序释放实例；重复调用无副作用
    pub fn close(&self) {
        self.scope.close();
    }

    /// 在本作用域内预置实例（晚绑定）
    pub fn use_instance<T>(&self, instance: Arc<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope
            .use_instance(ServiceKey::of::<T>(), Arc::new(instance) as Instance)
    }

    /// 在本作用域内预置带键实例
    pub fn use_keyed_instance<T>(&self, service_key: impl Into<String>, instance: Arc<T>) -> DependencyResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.scope
            .use_instance(ServiceKey::keyed::<T>(service_key), Arc::new(instance) as Instance)
    }

    /// 获取绑定到本作用域的解析器，可以跨线程传递和保存
    pub fn resolver(&self) -> Resolver {
        Resolver::new(self.core.clone(), self.scope.clone())
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

    /// 获取延迟解析包装
    pub fn resolve_lazy<T>(&self) -> ServiceLazy<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolver().resolve_lazy()
    }
}

impl ServiceResolver for Scope {
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

impl ScopeFactory for Scope {
    type Scope = Scope;

    fn open_scope_with(&self, name: Option<String>) -> DependencyResult<Scope> {
        let child = self.scope.open_child(name)?;
        Ok(Scope::new(self.core.clone(), child))
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.scope.close();
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.scope.info().path)
            .field("status", &self.scope.status())
            .finish()
    }
}
