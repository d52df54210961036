//! 服务注册表
//!
//! 保存 抽象类型 → 描述符 的映射。读多写少，读取方克隆出 `Arc` 描述符后立即释放锁，
//! 工厂调用期间从不持有注册表锁。

use crate::descriptor::{Descriptor, DescriptorKind, Initializer};
use di_abstractions::{ContainerStats, IfAlreadyRegistered};
use infrastructure_common::{DependencyError, DependencyResult, ServiceKey};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Default, Clone)]
struct RegistryTable {
    /// 具体实现与占位，按注册顺序
    services: HashMap<TypeId, Vec<Arc<Descriptor>>>,
    /// 装饰器，按注册顺序（最后注册的在最外层）
    decorators: HashMap<TypeId, Vec<Arc<Descriptor>>>,
    initializers: HashMap<TypeId, Vec<Arc<Initializer>>>,
}

/// 注册结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registered {
    Added,
    Replaced,
    Kept,
}

#[derive(Default)]
pub(crate) struct Registry {
    table: RwLock<RegistryTable>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 复制当前全部注册，供门面使用
    pub(crate) fn snapshot(&self) -> Self {
        Self {
            table: RwLock::new(self.table.read().clone()),
        }
    }

    pub(crate) fn register(
        &self,
        descriptor: Descriptor,
        if_already_registered: IfAlreadyRegistered,
    ) -> DependencyResult<Registered> {
        let type_id = descriptor.service_type().id;
        let mut table = self.table.write();

        if descriptor.kind == DescriptorKind::Decorator {
            debug!("注册装饰器: {}", descriptor.service);
            table
                .decorators
                .entry(type_id)
                .or_default()
                .push(Arc::new(descriptor));
            return Ok(Registered::Added);
        }

        let entries = table.services.entry(type_id).or_default();
        let existing = entries
            .iter()
            .position(|entry| entry.service.key == descriptor.service.key);

        match (existing, if_already_registered) {
            (None, _) => {
                debug!(
                    "注册服务: {} ({:?}, {})",
                    descriptor.service, descriptor.kind, descriptor.lifetime
                );
                entries.push(Arc::new(descriptor));
                Ok(Registered::Added)
            }
            (Some(_), IfAlreadyRegistered::Throw) => Err(DependencyError::DuplicateRegistration {
                service: descriptor.service.to_string(),
            }),
            (Some(_), IfAlreadyRegistered::Keep) => {
                debug!("保留已有注册，忽略: {}", descriptor.service);
                Ok(Registered::Kept)
            }
            (Some(index), IfAlreadyRegistered::Replace) => {
                debug!("替换已有注册: {}", descriptor.service);
                entries[index] = Arc::new(descriptor);
                Ok(Registered::Replaced)
            }
        }
    }

    pub(crate) fn add_initializer(&self, type_id: TypeId, initializer: Initializer) {
        self.table
            .write()
            .initializers
            .entry(type_id)
            .or_default()
            .push(Arc::new(initializer));
    }

    /// 查找默认或带键描述符（含占位）
    pub(crate) fn find(&self, service: &ServiceKey) -> Option<Arc<Descriptor>> {
        self.table
            .read()
            .services
            .get(&service.service_type.id)?
            .iter()
            .find(|entry| entry.service.key == service.key)
            .cloned()
    }

    /// 查找描述符，未注册时返回 `ServiceNotRegistered`
    pub(crate) fn resolve_descriptor(&self, service: &ServiceKey) -> DependencyResult<Arc<Descriptor>> {
        self.find(service)
            .ok_or_else(|| DependencyError::ServiceNotRegistered {
                service: service.to_string(),
            })
    }

    /// 某抽象的全部描述符（默认 + 带键，含占位），按注册顺序
    pub(crate) fn enumerate(&self, type_id: TypeId) -> Vec<Arc<Descriptor>> {
        self.table
            .read()
            .services
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn decorators(&self, type_id: TypeId) -> Vec<Arc<Descriptor>> {
        self.table
            .read()
            .decorators
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn decorator_count(&self, type_id: TypeId) -> usize {
        self.table
            .read()
            .decorators
            .get(&type_id)
            .map_or(0, Vec::len)
    }

    pub(crate) fn initializers(&self, type_id: TypeId) -> Vec<Arc<Initializer>> {
        self.table
            .read()
            .initializers
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 所有具体实现（不含占位与装饰器）
    pub(crate) fn concrete_descriptors(&self) -> Vec<Arc<Descriptor>> {
        self.table
            .read()
            .services
            .values()
            .flatten()
            .filter(|entry| entry.kind == DescriptorKind::Concrete)
            .cloned()
            .collect()
    }

    /// 填充统计信息中的注册部分
    pub(crate) fn fill_stats(&self, stats: &mut ContainerStats) {
        let table = self.table.read();
        let services = table.services.values().flatten();
        let (placeholders, concrete): (Vec<_>, Vec<_>) =
            services.partition(|entry| entry.kind == DescriptorKind::Placeholder);
        stats.registered_services = concrete.len();
        stats.placeholders = placeholders.len();
        stats.decorators = table.decorators.values().map(Vec::len).sum();
        stats.initializers = table.initializers.values().map(Vec::len).sum();
    }
}
