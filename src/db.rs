//! 设计项目持久化模块
//!
//! # 设计思路
//!
//! 渲染编排只依赖 `ProjectRepository` 这一抽象：按 id 读取项目、保存项目。
//! 默认实现 `SqliteProjectRepository` 使用 `rusqlite` 直接操作 SQLite，
//! 测试与其他宿主可以注入自己的实现。
//!
//! # 实现思路
//!
//! - 数据模型 `DesignItem` 使用 serde（camelCase）以便宿主壳层直接透传。
//! - 仓库方法返回 `Send` 的 Future，编排器可以把整个渲染周期放进 `tokio::spawn`。
//! - SQL 逻辑集中在 `projects` 子模块，表结构与迁移集中在 `schema` 子模块。

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::payload::{ImagePayload, ImageRef};

mod projects;
mod schema;

pub use projects::SqliteProjectRepository;

// ============================================================================
// 数据模型
// ============================================================================

/// 设计项目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// 上传的原始平面图，设置后不再修改
    #[serde(default)]
    pub source_image: Option<ImageRef>,
    /// AI 渲染结果
    #[serde(default)]
    pub rendered_image: Option<ImagePayload>,
    /// 渲染结果的远程地址（与内联数据相互独立）
    #[serde(default)]
    pub rendered_path: Option<String>,
    /// 公开分享地址
    #[serde(default)]
    pub public_path: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// `None` 表示尚未设置，保存渲染结果时补默认值 `false`
    #[serde(default)]
    pub is_public: Option<bool>,
    /// 最后修改时间（毫秒时间戳）
    pub timestamp: i64,
}

impl DesignItem {
    /// 上传完成时在客户端创建的项目（尚未持久化）。
    pub fn from_upload(source: ImagePayload, name: Option<String>, owner_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            source_image: Some(ImageRef::Payload(source)),
            rendered_image: None,
            rendered_path: None,
            public_path: None,
            owner_id,
            is_public: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 界面展示名称，未命名时回退为 `Residence <id>`。
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("Residence {}", self.id),
        }
    }

    pub fn is_public(&self) -> bool {
        self.is_public.unwrap_or(false)
    }
}

/// 保存时的可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Self::Private),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

// ============================================================================
// 仓库抽象
// ============================================================================

/// 设计项目仓库。
///
/// 编排器把错误视为“未找到 / 未保存”，仓库本身仍按 `Result` 如实返回。
pub trait ProjectRepository: Send + Sync + 'static {
    /// 按 id 读取项目，不存在时返回 `Ok(None)`。
    fn get_project_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<DesignItem>, AppError>> + Send;

    /// 保存（新建或覆盖）项目，返回持久化后的版本。
    fn create_project(
        &self,
        item: DesignItem,
        visibility: Visibility,
    ) -> impl Future<Output = Result<DesignItem, AppError>> + Send;
}
