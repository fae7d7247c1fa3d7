//! # 图片数据模块（payload）
//!
//! ## 设计思路
//!
//! 上传的平面图与 AI 渲染结果都以“自包含数据”的形式流转：
//! MIME 类型 + 原始字节，可序列化为 `data:<mime>;base64,...`，
//! 不依赖原始文件即可存储或传输。
//!
//! - `data`：`ImagePayload` / `ImageRef` 数据模型与 Data URL 编解码
//! - `fetch`：把远程图片地址下载并转换为 `ImagePayload`
//! - `error`：本模块统一错误类型

mod error;
mod fetch;
mod data;

pub use error::PayloadError;
pub use fetch::PayloadFetcher;
pub(crate) use fetch::redact_url_for_log;
pub use data::{
    is_supported_upload_mime, normalize_mime, validate_image_signature, ImagePayload, ImageRef,
    SUPPORTED_UPLOAD_MIME_TYPES,
};
