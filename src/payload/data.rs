//! # 数据模型与 Data URL 编解码
//!
//! ## 设计思路
//!
//! - `ImagePayload`：已加载到内存的图片（MIME + 字节），构造时保证两者都非空。
//! - `ImageRef`：源图的两种形态（内联数据 / 远程地址），在边界处一次性区分，
//!   调用侧不再对字符串做前缀判断。
//!
//! ## 实现思路
//!
//! Data URL 解析沿用“先估算解码体积、再解码”的顺序，超限输入在解码前即被拒绝。

use std::fmt;

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};

use super::PayloadError;
use super::fetch::redact_url_for_log;

/// 允许上传的图片类型。
pub const SUPPORTED_UPLOAD_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// 归一化 MIME：小写、去空白，`image/jpg` 视为 `image/jpeg`。
pub fn normalize_mime(mime: &str) -> String {
    let base = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if base == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        base
    }
}

pub fn is_supported_upload_mime(mime: &str) -> bool {
    let normalized = normalize_mime(mime);
    SUPPORTED_UPLOAD_MIME_TYPES.contains(&normalized.as_str())
}

/// 通过文件签名（magic bytes）校验字节是否为图片，返回识别出的 MIME。
pub fn validate_image_signature(bytes: &[u8]) -> Result<&'static str, PayloadError> {
    if bytes.is_empty() {
        return Err(PayloadError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| PayloadError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(PayloadError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(kind.mime_type())
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, PayloadError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| PayloadError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| PayloadError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

/// 自包含的图片数据：MIME 类型 + 原始字节。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImagePayload {
    mime_type: String,
    bytes: Vec<u8>,
}

impl ImagePayload {
    /// 构造图片数据；MIME 或字节为空时返回 `InvalidFormat`。
    pub fn new(mime_type: &str, bytes: Vec<u8>) -> Result<Self, PayloadError> {
        let mime_type = normalize_mime(mime_type);
        if mime_type.is_empty() {
            return Err(PayloadError::InvalidFormat("缺少 MIME 类型".to_string()));
        }
        if bytes.is_empty() {
            return Err(PayloadError::InvalidFormat("图片内容为空".to_string()));
        }
        Ok(Self { mime_type, bytes })
    }

    /// 由原始字节构造，MIME 通过文件签名识别。
    pub fn from_image_bytes(bytes: Vec<u8>) -> Result<Self, PayloadError> {
        let mime = validate_image_signature(&bytes)?;
        Self::new(mime, bytes)
    }

    /// 解析 `data:<mime>;base64,<data>`。
    pub fn parse_data_url(data: &str) -> Result<Self, PayloadError> {
        Self::parse_data_url_with_limit(data, u64::MAX)
    }

    pub fn parse_data_url_with_limit(data: &str, max_size: u64) -> Result<Self, PayloadError> {
        let normalized = data.trim();
        let rest = normalized
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| PayloadError::InvalidFormat("不是 Data URL".to_string()))?;

        let (header, base64_data) = rest
            .split_once(',')
            .ok_or_else(|| PayloadError::InvalidFormat("Data URL 缺少数据段".to_string()))?;

        let mime = header
            .strip_suffix(BASE64_MARKER)
            .ok_or_else(|| PayloadError::InvalidFormat("缺少 base64 标记".to_string()))?;

        if mime.trim().is_empty() {
            return Err(PayloadError::InvalidFormat("Data URL 缺少 MIME 类型".to_string()));
        }
        if base64_data.trim().is_empty() {
            return Err(PayloadError::InvalidFormat("Data URL 数据段为空".to_string()));
        }

        let estimated_len = estimate_base64_decoded_upper_bound_len(base64_data)?;
        if estimated_len > max_size {
            return Err(PayloadError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(base64_data.trim())
            .map_err(|e| PayloadError::Decode(format!("Base64 解码失败：{}", e)))?;

        Self::new(mime, bytes)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// 不含前缀的 base64 数据段。
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn to_data_url(&self) -> String {
        format!("{}{}{},{}", DATA_URL_PREFIX, self.mime_type, BASE64_MARKER, self.to_base64())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl TryFrom<String> for ImagePayload {
    type Error = PayloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_data_url(&value)
    }
}

impl From<ImagePayload> for String {
    fn from(payload: ImagePayload) -> Self {
        payload.to_data_url()
    }
}

/// 图片引用：内联数据或远程地址。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageRef {
    Payload(ImagePayload),
    Url(String),
}

impl ImageRef {
    /// 解析字符串形式的图片引用：`data:` 前缀为内联数据，否则必须是 HTTP/HTTPS 地址。
    pub fn parse(value: &str) -> Result<Self, PayloadError> {
        let trimmed = value.trim();
        if trimmed.starts_with(DATA_URL_PREFIX) {
            return ImagePayload::parse_data_url(trimmed).map(Self::Payload);
        }

        let parsed = reqwest::Url::parse(trimmed)
            .map_err(|e| PayloadError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PayloadError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }
        Ok(Self::Url(trimmed.to_string()))
    }

    pub fn as_payload(&self) -> Option<&ImagePayload> {
        match self {
            Self::Payload(payload) => Some(payload),
            Self::Url(_) => None,
        }
    }

    /// 可直接用作链接 / `src` 的字符串形式。
    pub fn to_link(&self) -> String {
        match self {
            Self::Payload(payload) => payload.to_data_url(),
            Self::Url(url) => url.clone(),
        }
    }
}

impl From<ImagePayload> for ImageRef {
    fn from(payload: ImagePayload) -> Self {
        Self::Payload(payload)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = PayloadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        value.to_link()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload(payload) => write!(f, "{}({} bytes)", payload.mime_type(), payload.len()),
            // 仅用于日志，去掉查询串与片段
            Self::Url(url) => f.write_str(&redact_url_for_log(url)),
        }
    }
}
