use crate::payload::PayloadError;

/// 渲染网关错误
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// 源图缺少 MIME 类型或数据段
    #[error("无效的图片数据：{0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Payload(#[from] PayloadError),

    /// AI 服务请求失败
    #[error("AI 服务错误：{0}")]
    Provider(String),

    /// AI 服务返回内容无法解析
    #[error("AI 服务响应无效：{0}")]
    Response(String),
}
