//! 元数据定义
//!
//! 提供服务类型和服务键的元数据信息

use std::any::TypeId;
use std::fmt;

/// 服务类型信息（抽象标识）
///
/// 支持 `dyn Trait` 等非 Sized 类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceType {
    /// 类型ID
    pub id: TypeId,
    /// 完整类型名称
    pub name: &'static str,
}

impl ServiceType {
    /// 从类型获取类型信息
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 获取简短的类型名称（不包含模块路径）
    pub fn short_name(&self) -> &'static str {
        let name = self.name.strip_prefix("dyn ").unwrap_or(self.name);
        name.rsplit("::").next().unwrap_or(name)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// 服务键：抽象类型 + 可选区分键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub service_type: ServiceType,
    pub key: Option<String>,
}

impl ServiceKey {
    /// 默认（无区分键）服务键
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            service_type: ServiceType::of::<T>(),
            key: None,
        }
    }

    /// 带区分键的服务键
    pub fn keyed<T: ?Sized + 'static>(key: impl Into<String>) -> Self {
        Self {
            service_type: ServiceType::of::<T>(),
            key: Some(key.into()),
        }
    }

    /// 由类型信息与可选键构造
    pub fn new(service_type: ServiceType, key: Option<String>) -> Self {
        Self { service_type, key }
    }

    /// 是否为默认注册
    pub fn is_default(&self) -> bool {
        self.key.is_none()
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{}]", self.service_type, key),
            None => write!(f, "{}", self.service_type),
        }
    }
}
