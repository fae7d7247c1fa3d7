//! AI 图片服务适配
//!
//! 服务的原始响应只有一个 `src` 字符串，可能是 Data URL、远程地址或空。
//! 这里一次性收窄为 `ProviderOutput`，网关之后只按枚举分支处理。

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RenderError;
use crate::config::ProviderConfig;
use crate::payload::{redact_url_for_log, ImagePayload};

/// 平面图转 3D 渲染的固定提示词
pub const RENDER_PROMPT: &str = "Convert the provided 2D architectural floor plan into a photorealistic \
top-down 3D rendering of the same residence. Keep every wall, door, window and room exactly where the \
plan places them and preserve the proportions. Furnish each room according to its labelled purpose with \
realistic materials, soft natural lighting and neutral colours. Remove all text, dimensions and \
annotation marks. Output a single clean image with no borders or captions.";

/// 输出尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ratio {
    pub w: u32,
    pub h: u32,
}

/// 发送给 AI 服务的请求体
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    pub prompt: String,
    pub provider: String,
    pub model: String,
    /// 源图 base64 数据（不含 Data URL 头）
    pub input_image: String,
    pub input_image_mime_type: String,
    pub ratio: Ratio,
}

impl RenderRequest {
    /// 由源图构造请求；MIME 或数据为空时返回 `InvalidPayload`。
    pub fn for_source(source: &ImagePayload, config: &ProviderConfig) -> Result<Self, RenderError> {
        let input_image = source.to_base64();
        if source.mime_type().trim().is_empty() || input_image.is_empty() {
            return Err(RenderError::InvalidPayload("源图缺少 MIME 类型或数据".to_string()));
        }

        Ok(Self {
            prompt: RENDER_PROMPT.to_string(),
            provider: config.provider.clone(),
            model: config.model.clone(),
            input_image,
            input_image_mime_type: source.mime_type().to_string(),
            ratio: Ratio { w: config.width, h: config.height },
        })
    }
}

/// 收窄后的服务输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutput {
    Image(ImagePayload),
    ImageUrl(String),
    Empty,
}

impl ProviderOutput {
    /// 从原始 `src` 字段收窄。空白视为无输出；Data URL 必须能解析。
    pub fn from_src(src: Option<&str>) -> Result<Self, RenderError> {
        let Some(src) = src.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(Self::Empty);
        };

        if src.starts_with("data:") {
            let payload = ImagePayload::parse_data_url(src)
                .map_err(|e| RenderError::Response(format!("内联图片无法解析：{}", e)))?;
            return Ok(Self::Image(payload));
        }

        let parsed = reqwest::Url::parse(src)
            .map_err(|e| RenderError::Response(format!("图片地址无效：{}", e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(Self::ImageUrl(src.to_string())),
            other => Err(RenderError::Response(format!("不支持的图片地址协议：{}", other))),
        }
    }
}

/// AI 图片生成服务
pub trait ImageProvider: Send + Sync + 'static {
    fn txt2img(
        &self,
        request: &RenderRequest,
    ) -> impl Future<Output = Result<ProviderOutput, RenderError>> + Send;
}

#[derive(Debug, Deserialize)]
struct RawProviderResponse {
    #[serde(default, alias = "url")]
    src: Option<String>,
}

/// 通过 HTTP JSON 接口调用的图片服务
pub struct HttpImageProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, RenderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RenderError::Provider(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key(),
        })
    }
}

impl ImageProvider for HttpImageProvider {
    async fn txt2img(&self, request: &RenderRequest) -> Result<ProviderOutput, RenderError> {
        log::info!(
            "🎨 请求 AI 渲染 - {} / {} ({}x{}) -> {}",
            request.provider,
            request.model,
            request.ratio.w,
            request.ratio.h,
            redact_url_for_log(&self.endpoint)
        );

        let body = serde_json::to_vec(request)
            .map_err(|e| RenderError::Provider(format!("请求序列化失败：{}", e)))?;

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RenderError::Provider("请求超时".to_string())
            } else {
                RenderError::Provider(format!("请求失败：{}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Provider(format!("HTTP {}", status.as_u16())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Provider(format!("读取响应失败：{}", e)))?;
        let raw: RawProviderResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RenderError::Response(format!("JSON 解析失败：{}", e)))?;

        let output = ProviderOutput::from_src(raw.src.as_deref())?;
        match &output {
            ProviderOutput::Image(payload) => log::info!("✅ AI 返回内联图片 - {} bytes", payload.len()),
            ProviderOutput::ImageUrl(url) => log::info!("✅ AI 返回图片地址 - {}", redact_url_for_log(url)),
            ProviderOutput::Empty => log::warn!("⚠️ AI 未返回图片"),
        }
        Ok(output)
    }
}
