//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `AppConfig`：上传进度动画节奏、分享状态复位延迟、
//! AI 渲染服务参数、远程图片下载限制以及数据 / 导出目录。
//!
//! ## 实现思路
//!
//! - 每个字段都有 `Default`，配置文件只需写需要覆盖的部分（`#[serde(default)]`）。
//! - 配置文件缺失或损坏时回退到默认值，只记录警告，不阻断启动。
//! - 环境变量覆盖优先级最高，便于部署时切换服务地址。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const DATA_DIR_ENV: &str = "ROOM_MATRIX_DATA_DIR";
const PROVIDER_URL_ENV: &str = "ROOM_MATRIX_PROVIDER_URL";
const APP_DIR_NAME: &str = "room-matrix";
const DB_FILE_NAME: &str = "room-matrix.db";

/// 应用配置根节点。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 自定义数据目录（数据库所在位置），为空时使用系统数据目录。
    pub data_dir: Option<String>,
    /// 自定义导出目录。
    pub export_dir: Option<String>,
    pub upload: UploadConfig,
    pub share: ShareConfig,
    pub provider: ProviderConfig,
    pub fetch: FetchConfig,
}

/// 上传进度动画配置。
///
/// 进度是纯装饰性的：与文件大小、真实读取耗时无关。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// 进度条每次推进的间隔（毫秒）。
    pub progress_interval_ms: u64,
    /// 每次推进的步长（百分比）。
    pub progress_step: u8,
    /// 进度到达 100 后、回调前的停顿（毫秒）。
    pub redirect_delay_ms: u64,
    /// 允许上传的最大文件体积（字节）。
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 100,
            progress_step: 5,
            redirect_delay_ms: 600,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

impl UploadConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }

    /// 步长为 0 时按 1 处理，保证动画一定能走到 100。
    pub fn effective_step(&self) -> u8 {
        self.progress_step.max(1)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

/// 分享状态配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// “链接已复制”状态自动复位的延迟（毫秒）。
    pub reset_delay_ms: u64,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self { reset_delay_ms: 2000 }
    }
}

impl ShareConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

/// AI 渲染服务配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// txt2img 接口地址。
    pub endpoint: String,
    /// 上游模型提供方标识。
    pub provider: String,
    /// 固定模型标识。
    pub model: String,
    /// 输出宽度（像素）。
    pub width: u32,
    /// 输出高度（像素）。
    pub height: u32,
    /// 单次渲染请求超时（秒）。
    pub request_timeout_secs: u64,
    /// 保存 API Key 的环境变量名；Key 本身不写入配置文件。
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787/v1/txt2img".to_string(),
            provider: "gemini".to_string(),
            model: "gemini-2.5-flash-image-preview".to_string(),
            width: 1024,
            height: 1024,
            request_timeout_secs: 120,
            api_key_env: "ROOM_MATRIX_API_KEY".to_string(),
        }
    }
}

impl ProviderConfig {
    /// 从配置的环境变量读取 API Key（空字符串视为未配置）。
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

/// 远程图片下载配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// 下载体积上限（字节）。
    pub max_file_size: u64,
    /// 整体下载超时（秒）。
    pub download_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            max_redirects: 5,
        }
    }
}

impl AppConfig {
    /// 读取配置文件；文件缺失或格式错误时回退到默认配置。
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                log::warn!("读取配置文件失败，使用默认配置: {}", err);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("解析配置文件失败，使用默认配置: {}", err);
                Self::default()
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("创建配置目录失败: {}", e)))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Storage(format!("序列化配置失败: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 应用环境变量覆盖。
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.data_dir = Some(dir);
            }
        }
        if let Ok(url) = std::env::var(PROVIDER_URL_ENV) {
            if !url.trim().is_empty() {
                self.provider.endpoint = url;
            }
        }
        self
    }

    /// 获取数据目录，不存在时自动创建。
    pub fn resolve_data_dir(&self) -> Result<PathBuf, AppError> {
        let dir = match self.data_dir.as_deref().filter(|dir| !dir.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| AppError::Storage("无法定位系统数据目录".to_string()))?
                .join(APP_DIR_NAME),
        };

        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Storage(format!("创建数据目录 '{}' 失败: {}", dir.display(), e)))?;
        Ok(dir)
    }

    pub fn resolve_db_path(&self) -> Result<PathBuf, AppError> {
        Ok(self.resolve_data_dir()?.join(DB_FILE_NAME))
    }
}
