//! 服务解析器抽象接口
//!
//! 提供依赖解析和服务实例化的能力

use infrastructure_common::{DependencyError, DependencyResult, IfUnresolved, Lifetime, ServiceKey};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 服务解析器 trait
///
/// 容器、作用域以及传给工厂的解析上下文都实现此 trait。
pub trait ServiceResolver: Send + Sync {
    /// 按选项解析服务
    ///
    /// 当 `options.if_unresolved` 为 [`IfUnresolved::ReturnDefault`] 且服务未注册时返回 `Ok(None)`。
    fn resolve_with<T>(&self, options: ResolveOptions) -> DependencyResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static;

    /// 立即解析所有注册（默认注册和所有带键注册）
    fn resolve_all<T>(&self) -> DependencyResult<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static;

    /// 检查是否可以解析指定类型
    fn is_registered<T>(&self, service_key: Option<&str>) -> bool
    where
        T: ?Sized + 'static;

    /// 解析默认注册
    fn resolve<T>(&self) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        require::<T>(self.resolve_with::<T>(ResolveOptions::new())?, None)
    }

    /// 解析带键注册
    fn resolve_keyed<T>(&self, service_key: &str) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let options = ResolveOptions::new().with_service_key(service_key);
        require::<T>(self.resolve_with::<T>(options)?, Some(service_key))
    }

    /// 解析服务，未注册时返回 `None`
    fn resolve_or_default<T>(&self) -> DependencyResult<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_with::<T>(ResolveOptions::new().with_if_unresolved(IfUnresolved::ReturnDefault))
    }

    /// 带额外参数解析服务
    fn resolve_with_args<T>(&self, args: Args) -> DependencyResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        require::<T>(self.resolve_with::<T>(ResolveOptions::new().with_args(args))?, None)
    }
}

fn require<T: ?Sized + 'static>(
    resolved: Option<Arc<T>>,
    service_key: Option<&str>,
) -> DependencyResult<Arc<T>> {
    resolved.ok_or_else(|| DependencyError::ServiceNotRegistered {
        service: match service_key {
            Some(key) => ServiceKey::keyed::<T>(key).to_string(),
            None => ServiceKey::of::<T>().to_string(),
        },
    })
}

/// 解析选项
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// 服务区分键
    pub service_key: Option<String>,
    /// 未注册时的处理方式
    pub if_unresolved: IfUnresolved,
    /// 额外参数
    pub args: Args,
}

impl ResolveOptions {
    /// 创建默认解析选项
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置服务区分键
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// 设置未注册时的处理方式
    pub fn with_if_unresolved(mut self, if_unresolved: IfUnresolved) -> Self {
        self.if_unresolved = if_unresolved;
        self
    }

    /// 设置额外参数
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }
}

/// 传给工厂的额外参数
///
/// 按类型匹配：`get::<String>()` 返回第一个 `String` 参数。
#[derive(Clone, Default)]
pub struct Args {
    values: Vec<Arc<dyn Any + Send + Sync>>,
}

impl Args {
    /// 创建空参数列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加参数
    pub fn with<A: Send + Sync + 'static>(mut self, value: A) -> Self {
        self.push(value);
        self
    }

    /// 追加参数
    pub fn push<A: Send + Sync + 'static>(&mut self, value: A) {
        self.values.push(Arc::new(value));
    }

    /// 参数数量
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 第一个类型为 `A` 的参数
    pub fn get<A: 'static>(&self) -> Option<&A> {
        self.values.iter().find_map(|value| value.downcast_ref::<A>())
    }

    /// 指定位置的参数
    pub fn get_at<A: 'static>(&self, index: usize) -> Option<&A> {
        self.values.get(index)?.downcast_ref::<A>()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.values.len()).finish()
    }
}

/// 当前解析请求的描述，用于初始化器的条件判断
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// 被请求的服务
    pub service: ServiceKey,
    /// 生效的生命周期
    pub lifetime: Lifetime,
    /// 当前作用域路径，根解析时为 `None`
    pub scope: Option<String>,
    /// 依赖深度，顶层请求为 0
    pub depth: usize,
    /// 是否携带额外参数
    pub has_args: bool,
}
