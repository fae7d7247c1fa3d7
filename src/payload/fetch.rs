//! # 远程图片下载
//!
//! ## 设计思路
//!
//! 渲染网关在两处需要把远程地址转成自包含数据：源图是托管地址时，
//! 以及 AI 服务返回的是图片链接时。两处共用同一个 `PayloadFetcher`。
//!
//! ## 实现思路
//!
//! - 协议校验（仅 HTTP/HTTPS）→ 有限次重试发送 → 状态码 / 内容类型 / 体积校验
//!   → 分块读取（超限即停）→ 文件签名校验。
//! - 网络错误统一映射到 `PayloadError`，日志中的 URL 去掉查询串。

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::data::validate_image_signature;
use super::{ImagePayload, PayloadError};
use crate::config::FetchConfig;

const NETWORK_RETRY_MAX_ATTEMPTS: u8 = 3;
const NETWORK_RETRY_BASE_DELAY_MS: u64 = 180;
const BUFFER_INITIAL_CAPACITY: usize = 16 * 1024;

/// 远程图片下载器，内部复用同一个 HTTP 客户端。
pub struct PayloadFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl PayloadFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, PayloadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout))
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| PayloadError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self { client, config })
    }

    /// 下载远程图片并转换为 `ImagePayload`。
    pub async fn fetch_as_payload(&self, url: &str) -> Result<ImagePayload, PayloadError> {
        log::info!("🌐 开始下载图片 - URL: {}", redact_url_for_log(url));

        let parsed = reqwest::Url::parse(url)
            .map_err(|e| PayloadError::InvalidFormat(format!("URL 格式错误：{}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(PayloadError::InvalidFormat("仅支持 HTTP/HTTPS".to_string()));
        }

        let response = self.send_with_retry(parsed).await?;

        if !response.status().is_success() {
            return Err(PayloadError::Network(format!(
                "HTTP {}: {}",
                response.status().as_u16(),
                status_message(response.status().as_u16())
            )));
        }

        if let Some(ct) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            if let Ok(ct_str) = ct.to_str() {
                if !is_image_content_type(ct_str) {
                    return Err(PayloadError::InvalidFormat(format!("不是图片类型：{}", ct_str)));
                }
            }
        }

        let bytes = self.read_body_with_limit(response).await?;
        let mime = validate_image_signature(&bytes)?;

        log::debug!("✅ 下载完成 - {} bytes ({})", bytes.len(), mime);
        ImagePayload::new(mime, bytes)
    }

    async fn send_with_retry(&self, url: reqwest::Url) -> Result<reqwest::Response, PayloadError> {
        let mut attempt: u8 = 1;
        loop {
            match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    if attempt < NETWORK_RETRY_MAX_ATTEMPTS && is_retryable_http_status(resp.status()) {
                        let delay_ms = compute_retry_delay_with_jitter(attempt);
                        log::warn!(
                            "⚠️ HTTP {}（第 {}/{} 次，可重试）；{}ms 后重试",
                            resp.status().as_u16(),
                            attempt,
                            NETWORK_RETRY_MAX_ATTEMPTS,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt >= NETWORK_RETRY_MAX_ATTEMPTS || !(err.is_timeout() || err.is_connect()) {
                        return Err(self.map_reqwest_error(err, url.as_str()));
                    }

                    let delay_ms = compute_retry_delay_with_jitter(attempt);
                    log::warn!(
                        "⚠️ 网络请求失败（第 {}/{} 次，可重试）：{}；{}ms 后重试",
                        attempt,
                        NETWORK_RETRY_MAX_ATTEMPTS,
                        redact_url_for_log(url.as_str()),
                        delay_ms
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    async fn read_body_with_limit(&self, mut response: reqwest::Response) -> Result<Vec<u8>, PayloadError> {
        let max_file_size = self.config.max_file_size;
        let total_len = response.content_length();

        if let Some(size) = total_len {
            if size > max_file_size {
                return Err(PayloadError::ResourceLimit(format!(
                    "文件过大：{:.2} MB（限制：{:.2} MB）",
                    size as f64 / 1024.0 / 1024.0,
                    max_file_size as f64 / 1024.0 / 1024.0
                )));
            }
        }

        let initial_capacity = total_len
            .map(|len| len.min(max_file_size).min(usize::MAX as u64) as usize)
            .filter(|len| *len > 0)
            .unwrap_or(BUFFER_INITIAL_CAPACITY);
        let mut buffer = Vec::with_capacity(initial_capacity);
        let mut total: u64 = 0;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PayloadError::Network(format!("下载失败：{}", e)))?
        {
            total = total.saturating_add(chunk.len() as u64);
            if total > max_file_size {
                return Err(PayloadError::ResourceLimit("下载后文件超过大小限制".to_string()));
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> PayloadError {
        let err_msg = e.to_string().replace(url, &redact_url_for_log(url));

        if e.is_timeout() {
            PayloadError::Timeout(format!("下载超时（{}秒）", self.config.download_timeout))
        } else if e.is_connect() {
            PayloadError::Network(format!("无法连接：{}", err_msg))
        } else {
            PayloadError::Network(format!("请求失败：{}", err_msg))
        }
    }
}

fn compute_retry_delay_with_jitter(attempt: u8) -> u64 {
    let base = NETWORK_RETRY_BASE_DELAY_MS.saturating_mul(1_u64 << (attempt.saturating_sub(1) as u32));
    let jitter_bound = (base / 2).max(1);
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    base.saturating_add(seed % (jitter_bound + 1))
}

fn is_retryable_http_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 日志用 URL：去掉查询串与片段，避免泄露签名参数。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return "<invalid-url>".to_string();
    };

    let host = parsed.host_str().unwrap_or("<unknown-host>");
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    format!("{}://{}{}{}", parsed.scheme(), host, port, parsed.path())
}

fn status_message(code: u16) -> &'static str {
    match code {
        404 => "未找到",
        403 => "访问被拒绝",
        500..=599 => "服务器错误",
        _ => "请求失败",
    }
}
