//! # 上传模块
//!
//! ## 设计思路
//!
//! 把用户选择的平面图读成自包含的 `ImagePayload`，并播放一段与真实 I/O 无关的
//! 进度动画：读取完成后按固定间隔、固定步长把进度从 0 推到 100，
//! 停顿固定时长后只调用一次完成回调。
//!
//! ## 实现思路
//!
//! - 未授权或声明的类型不在 `{jpeg, png, webp}` 中时直接忽略，不改动任何状态。
//! - 进度通过 `tokio::sync::watch` 发布，界面层订阅即可。
//! - 同一时刻只有一个 `UploadSession`；重新选择文件会先丢弃旧会话（`Drop` 即取消）。
//! - 读取失败（I/O 错误、超出体积、内容不是图片）只记录日志并把状态重置为初始值。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::UploadConfig;
use crate::payload::{is_supported_upload_mime, normalize_mime, ImagePayload};

mod session;

use session::UploadSession;

pub const PROGRESS_COMPLETE: u8 = 100;

/// 用户选择的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    /// 文件选择器给出的声明类型
    pub mime_type: String,
    pub path: PathBuf,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mime_type: normalize_mime(mime_type),
            path: path.into(),
        }
    }

    /// 以文件名作为名称，按扩展名推断声明类型。
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(mime_from_extension)
            .unwrap_or("application/octet-stream");
        Self::new(name, mime_type, path)
    }
}

fn mime_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// 界面可见的上传状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    /// 当前选中的文件名，读取失败后清空
    pub file_name: Option<String>,
    pub progress: u8,
}

impl UploadState {
    pub fn status_text(&self) -> &'static str {
        if self.progress >= PROGRESS_COMPLETE {
            "Redirecting"
        } else {
            "Analyzing Floor Plan ..."
        }
    }
}

/// 进度推进一步，封顶 100。
pub fn advance_progress(current: u8, step: u8) -> u8 {
    current.saturating_add(step.max(1)).min(PROGRESS_COMPLETE)
}

/// 上传进度模拟器
pub struct UploadSimulator {
    config: UploadConfig,
    state: Arc<watch::Sender<UploadState>>,
    session: Option<UploadSession>,
}

impl UploadSimulator {
    pub fn new(config: UploadConfig) -> Self {
        let (sender, _) = watch::channel(UploadState::default());
        Self {
            config,
            state: Arc::new(sender),
            session: None,
        }
    }

    /// 开始上传，返回是否被接受。
    ///
    /// 被拒绝时不改动任何状态；被接受时取消上一个会话并启动新会话。
    /// 必须在 tokio 运行时内调用。
    pub fn upload<F>(&mut self, file: UploadFile, is_authorized: bool, on_complete: F) -> bool
    where
        F: FnOnce(ImagePayload) + Send + 'static,
    {
        if !is_authorized {
            log::debug!("未登录，忽略上传 - {}", file.name);
            return false;
        }
        if !is_supported_upload_mime(&file.mime_type) {
            log::debug!("不支持的文件类型，忽略上传 - {} ({})", file.name, file.mime_type);
            return false;
        }

        self.session = None;

        log::info!("📤 开始上传 - {}", file.name);
        self.state.send_replace(UploadState {
            file_name: Some(file.name.clone()),
            progress: 0,
        });
        self.session = Some(UploadSession::start(
            file,
            self.config.clone(),
            Arc::clone(&self.state),
            on_complete,
        ));
        true
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// 是否有尚未结束的会话
    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|session| !session.is_finished())
    }

    /// 取消当前会话，之后不会再有任何状态变化或回调。
    pub fn teardown(&mut self) {
        if self.session.take().is_some() {
            log::debug!("上传会话已取消");
        }
    }
}

impl Drop for UploadSimulator {
    fn drop(&mut self) {
        self.teardown();
    }
}
