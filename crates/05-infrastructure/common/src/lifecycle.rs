//! 组件生命周期管理

use serde::{Deserialize, Serialize};
use std::fmt;

/// 组件生命周期类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// 单例模式 - 整个容器（根）生命周期内只创建一个实例
    Singleton,
    /// 作用域模式 - 在同一作用域内共享实例
    Scoped,
    /// 瞬时模式 - 每次请求都创建新实例
    #[default]
    Transient,
}

impl Lifetime {
    /// 是否会缓存实例
    pub fn is_cached(self) -> bool {
        matches!(self, Self::Singleton | Self::Scoped)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singleton => write!(f, "Singleton"),
            Self::Scoped => write!(f, "Scoped"),
            Self::Transient => write!(f, "Transient"),
        }
    }
}

/// 可释放资源 trait
///
/// 由作用域在销毁时按创建顺序的逆序调用，每个实例只调用一次。
pub trait Disposable: Send + Sync {
    /// 释放资源
    fn dispose(&self);
}

/// 作用域状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeStatus {
    /// 打开中，可以解析和创建子作用域
    #[default]
    Open,
    /// 已请求关闭，等待子作用域全部关闭
    Closing,
    /// 已销毁
    Disposed,
}

/// 作用域描述信息
#[derive(Debug, Clone)]
pub struct ScopeInfo {
    pub id: uuid::Uuid,
    pub name: Option<String>,
    /// 从根到当前作用域的路径，例如 `root/R1/R2`
    pub path: String,
    pub depth: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ScopeInfo {
    /// 创建根作用域
    pub fn root(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: uuid::Uuid::new_v4(),
            path: name.clone(),
            name: Some(name),
            depth: 0,
            created_at: chrono::Utc::now(),
        }
    }

    /// 创建子作用域信息
    pub fn child(&self, name: Option<String>) -> Self {
        let id = uuid::Uuid::new_v4();
        let segment = name
            .clone()
            .unwrap_or_else(|| format!("scope-{}", &id.simple().to_string()[..8]));
        Self {
            id,
            path: format!("{}/{}", self.path, segment),
            name,
            depth: self.depth + 1,
            created_at: chrono::Utc::now(),
        }
    }
}

impl fmt::Display for ScopeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}
