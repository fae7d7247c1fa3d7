//! # 错误模型模块
//!
//! 使用单一错误枚举承载图片数据链路中的所有错误来源，
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。

/// 图片数据统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("网络错误：{0}")]
    Network(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}
