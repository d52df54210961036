//! 依赖注入容器抽象接口
//!
//! 提供作用域创建、门面配置与容器统计的抽象

use infrastructure_common::DependencyResult;

/// 作用域工厂 trait
///
/// 容器和作用域都可以打开子作用域。
pub trait ScopeFactory {
    /// 作用域句柄类型
    type Scope;

    /// 打开子作用域，父作用域已销毁时返回 `ParentDisposed`
    fn open_scope_with(&self, name: Option<String>) -> DependencyResult<Self::Scope>;

    /// 打开匿名子作用域
    fn open_scope(&self) -> DependencyResult<Self::Scope> {
        self.open_scope_with(None)
    }

    /// 打开命名子作用域
    fn open_named_scope(&self, name: impl Into<String>) -> DependencyResult<Self::Scope> {
        self.open_scope_with(Some(name.into()))
    }
}

/// 门面创建选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FacadeOptions {
    /// 是否复制父容器已创建的单例
    ///
    /// 复制的单例仍归父容器所有，门面销毁时不会释放它们。
    pub copy_singletons: bool,
}

impl FacadeOptions {
    /// 复制已创建的单例
    pub fn with_singletons() -> Self {
        Self {
            copy_singletons: true,
        }
    }
}

/// 容器统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// 已注册的具体服务数量（含带键注册）
    pub registered_services: usize,
    /// 装饰器数量
    pub decorators: usize,
    /// 占位注册数量
    pub placeholders: usize,
    /// 初始化器数量
    pub initializers: usize,
    /// 根存储中已创建的实例数量
    pub cached_singletons: usize,
    /// 打开的顶层作用域数量
    pub open_scopes: usize,
}
