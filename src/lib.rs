//! # RoomMatrix 库入口
//!
//! 平面图上传、AI 3D 渲染编排、项目持久化与分享导出的后端核心，
//! 由界面壳层嵌入使用。
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                界面壳层 (上传页 / 可视化页)               │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ watch 状态订阅 + 方法调用
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ upload ────── 文件读取 + 进度动画会话 (RAII 取消)     │
//! │  │                                                       │
//! │  ├─ visualizer ── 渲染编排状态机                          │
//! │  │   ├─ render    AI 渲染网关 (reqwest)                   │
//! │  │   └─ db        项目仓库 (rusqlite)                     │
//! │  │                                                       │
//! │  ├─ share ─────── 链接复制 + 状态复位定时器               │
//! │  ├─ export        导出 PNG                                │
//! │  ├─ compare       前后对比视图                            │
//! │  ├─ auth          登录会话                                │
//! │  │                                                       │
//! │  ├─ payload       Data URL 编解码 / 远程图片下载          │
//! │  ├─ config        AppConfig (serde_json)                  │
//! │  └─ error         AppError (thiserror)                    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`config`] | 上传节奏、分享复位、AI 服务、下载限制与目录配置 |
//! | [`payload`] | `ImagePayload` / `ImageRef` 数据模型，远程图片下载 |
//! | [`db`] | `DesignItem`、`ProjectRepository` 与 SQLite 实现 |
//! | [`render`] | `RenderGateway`：源图 → 渲染图 |
//! | [`upload`] | `UploadSimulator`：读取文件并播放进度动画 |
//! | [`visualizer`] | `RenderOrchestrator`：加载、一次性生成、保存、显示同步 |
//! | [`share`] | `ShareController`：复制分享链接与“已复制”状态 |
//! | [`export`] | 把当前图片导出为 PNG 文件 |
//! | [`compare`] | 前后对比视图的选择 |
//! | [`auth`] | 登录会话接口与进程内实现 |

pub mod auth;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod payload;
pub mod render;
pub mod share;
pub mod upload;
pub mod visualizer;

/// 初始化日志，默认级别 `info`，可用 `RUST_LOG` 覆盖；重复调用无副作用。
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
