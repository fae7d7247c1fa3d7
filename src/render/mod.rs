//! # AI 渲染模块
//!
//! ## 设计思路
//!
//! 网关把一张源图映射为一张渲染图，不持有任何状态。
//! 真正的生成委托给外部 AI 服务（`ImageProvider`），网关只负责：
//! 源图规范化（远程地址先下载）→ 拼装固定提示词 / 模型 / 尺寸 → 收窄服务输出。
//!
//! - `provider`：请求体、服务输出枚举、HTTP 服务实现
//! - `gateway`：`RenderGateway` 抽象与默认实现
//! - `error`：`RenderError`

mod error;
mod gateway;
mod provider;

pub use error::RenderError;
pub use gateway::{ProviderRenderGateway, RenderGateway, RenderOutput};
pub use provider::{HttpImageProvider, ImageProvider, ProviderOutput, Ratio, RenderRequest, RENDER_PROMPT};

use crate::config::AppConfig;
use crate::payload::PayloadFetcher;

/// 按配置组装默认网关（HTTP 服务 + 共享下载器）
pub fn http_gateway(config: &AppConfig) -> Result<ProviderRenderGateway<HttpImageProvider>, RenderError> {
    let provider = HttpImageProvider::new(&config.provider)?;
    let fetcher = PayloadFetcher::new(config.fetch.clone())?;
    Ok(ProviderRenderGateway::new(provider, fetcher, config.provider.clone()))
}
