//! # 分享模块
//!
//! ## 设计思路
//!
//! 复制分享链接并维护一个短暂的“已复制”状态：复制成功后状态变为 `Done`，
//! 固定延时后自动回到 `Idle`。连续分享时只保留最后一个复位定时器。
//!
//! ## 实现思路
//!
//! - 剪贴板写入是阻塞调用，放到 `spawn_blocking` 中执行。
//! - 复位定时器是一个 tokio 任务，新的成功分享或销毁时直接 abort。
//! - 复制全部失败时只记录日志，状态保持不变。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ShareConfig;

mod clipboard;

pub use clipboard::{copy_with_fallback, SelectionClipboard, SystemClipboard, TextClipboard};

/// “链接已复制”提示状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareStatus {
    #[default]
    Idle,
    Done,
}

pub struct ShareController {
    primary: Arc<dyn TextClipboard>,
    fallback: Arc<dyn TextClipboard>,
    reset_delay: Duration,
    status: Arc<watch::Sender<ShareStatus>>,
    reset_timer: Option<JoinHandle<()>>,
}

impl ShareController {
    pub fn new(primary: Arc<dyn TextClipboard>, fallback: Arc<dyn TextClipboard>, reset_delay: Duration) -> Self {
        let (sender, _) = watch::channel(ShareStatus::Idle);
        Self {
            primary,
            fallback,
            reset_delay,
            status: Arc::new(sender),
            reset_timer: None,
        }
    }

    /// 系统剪贴板 + 平台复制工具
    pub fn system(config: &ShareConfig) -> Self {
        Self::new(Arc::new(SystemClipboard), Arc::new(SelectionClipboard), config.reset_delay())
    }

    /// 复制分享链接，返回是否成功。
    ///
    /// `link` 为 `None`（尚无可显示图片）时直接返回 `false`。必须在 tokio 运行时内调用。
    pub async fn share(&mut self, link: Option<String>) -> bool {
        let Some(link) = link else {
            log::debug!("没有可分享的图片，忽略");
            return false;
        };

        let primary = Arc::clone(&self.primary);
        let fallback = Arc::clone(&self.fallback);
        let copied = match tokio::task::spawn_blocking(move || {
            copy_with_fallback(primary.as_ref(), fallback.as_ref(), &link)
        })
        .await
        {
            Ok(copied) => copied,
            Err(err) => {
                log::error!("❌ 复制任务异常结束: {}", err);
                false
            }
        };

        if !copied {
            log::warn!("⚠️ 分享链接复制失败，状态保持不变");
            return false;
        }

        log::info!("🔗 分享链接已复制");
        self.status.send_replace(ShareStatus::Done);
        self.arm_reset_timer();
        true
    }

    fn arm_reset_timer(&mut self) {
        if let Some(previous) = self.reset_timer.take() {
            previous.abort();
        }

        let status = Arc::clone(&self.status);
        let delay = self.reset_delay;
        self.reset_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            status.send_replace(ShareStatus::Idle);
        }));
    }

    pub fn status(&self) -> ShareStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShareStatus> {
        self.status.subscribe()
    }

    /// 是否有尚未触发的复位定时器
    pub fn has_pending_reset(&self) -> bool {
        self.reset_timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }

    pub fn teardown(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ShareController {
    fn drop(&mut self) {
        self.teardown();
    }
}
