//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，各子模块的专用错误（`PayloadError`、
//! `RenderError`）通过 `From` 上转，调用侧统一使用 `?` 传播。
//!
//! 编排层（上传会话、渲染编排、分享）在自身边界处捕获并记录错误，
//! 不会把 `AppError` 继续抛给界面层；其余 API 都返回 `Result<T, AppError>`。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 实现 `Serialize` 将错误序列化为字符串，便于宿主壳层通过 IPC 透传。

use serde::Serialize;

use crate::payload::PayloadError;
use crate::render::RenderError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 上传阶段失败（未授权、类型不支持、读取失败）
    #[error("上传失败: {0}")]
    Upload(String),

    /// 图片数据解析 / 下载失败
    #[error("{0}")]
    Payload(#[from] PayloadError),

    /// AI 渲染网关错误
    #[error("{0}")]
    Render(#[from] RenderError),

    /// 数据库操作失败
    #[error("数据库错误: {0}")]
    Database(String),

    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 存储目录不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 登录 / 登出失败
    #[error("认证失败: {0}")]
    Auth(String),

    /// 导出图片失败
    #[error("导出失败: {0}")]
    Export(String),
}

/// 宿主 IPC 要求返回值实现 `Serialize`。
/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
