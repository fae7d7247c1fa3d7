//! 单次上传会话
//!
//! 一个会话 = 一个 tokio 任务：读取文件 → 进度定时器 → 跳转延时 → 完成回调。
//! 两个定时器都活在任务内部，`Drop` 时置位存活标志并 abort 任务，
//! 所以任何退出路径（重新选择、销毁、成功、失败）都不会留下悬挂定时器。

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{advance_progress, UploadFile, UploadState, PROGRESS_COMPLETE};
use crate::config::UploadConfig;
use crate::error::AppError;
use crate::payload::{is_supported_upload_mime, ImagePayload};

pub(super) struct UploadSession {
    alive: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl UploadSession {
    /// 启动会话任务，必须在 tokio 运行时内调用。
    pub(super) fn start<F>(
        file: UploadFile,
        config: UploadConfig,
        state: Arc<watch::Sender<UploadState>>,
        on_complete: F,
    ) -> Self
    where
        F: FnOnce(ImagePayload) + Send + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_session(file, config, state, Arc::clone(&alive), on_complete));
        Self { alive, task }
    }

    pub(super) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

async fn run_session<F>(
    file: UploadFile,
    config: UploadConfig,
    state: Arc<watch::Sender<UploadState>>,
    alive: Arc<AtomicBool>,
    on_complete: F,
) where
    F: FnOnce(ImagePayload) + Send + 'static,
{
    let payload = match read_payload(&file.path, config.max_file_size).await {
        Ok(payload) => payload,
        Err(err) => {
            log::warn!("⚠️ 读取上传文件失败，已重置 - {}: {}", file.name, err);
            publish_if_alive(&state, &alive, |current| *current = UploadState::default());
            return;
        }
    };
    log::debug!("📄 文件读取完成 - {} ({} bytes)", file.name, payload.len());

    let step = config.effective_step();
    let mut ticker = tokio::time::interval(config.progress_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // 首个 tick 立即完成
    ticker.tick().await;

    let mut progress = 0_u8;
    while progress < PROGRESS_COMPLETE {
        ticker.tick().await;
        progress = advance_progress(progress, step);
        if !publish_if_alive(&state, &alive, |current| current.progress = progress) {
            return;
        }
    }
    drop(ticker);

    tokio::time::sleep(config.redirect_delay()).await;
    if !claim_completion(&alive) {
        return;
    }

    log::info!("✅ 上传完成 - {}", file.name);
    on_complete(payload);
}

/// 在 watch 写锁内检查存活标志再修改，销毁后的写入不会生效。
fn publish_if_alive(
    state: &watch::Sender<UploadState>,
    alive: &AtomicBool,
    modify: impl FnOnce(&mut UploadState),
) -> bool {
    state.send_if_modified(|current| {
        if !alive.load(Ordering::SeqCst) {
            return false;
        }
        modify(current);
        true
    })
}

/// 完成回调只能触发一次：抢占存活标志，与销毁互斥。
fn claim_completion(alive: &AtomicBool) -> bool {
    alive
        .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

async fn read_payload(path: &Path, max_size: u64) -> Result<ImagePayload, AppError> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > max_size {
        return Err(AppError::Upload(format!(
            "文件过大：{:.2} MB（限制：{:.2} MB）",
            metadata.len() as f64 / 1024.0 / 1024.0,
            max_size as f64 / 1024.0 / 1024.0
        )));
    }

    let bytes = tokio::fs::read(path).await?;
    let payload = ImagePayload::from_image_bytes(bytes)?;
    if !is_supported_upload_mime(payload.mime_type()) {
        return Err(AppError::Upload(format!("文件内容不是支持的图片：{}", payload.mime_type())));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_after_teardown_are_dropped_without_notification() {
        let state = watch::Sender::new(UploadState {
            file_name: Some("plan.png".to_string()),
            progress: 40,
        });
        let mut rx = state.subscribe();
        rx.borrow_and_update();
        let alive = AtomicBool::new(true);

        assert!(publish_if_alive(&state, &alive, |current| current.progress = 45));
        assert!(rx.has_changed().expect("channel open"));
        rx.borrow_and_update();

        alive.store(false, Ordering::SeqCst);
        assert!(!publish_if_alive(&state, &alive, |current| current.progress = 50));
        assert!(!rx.has_changed().expect("channel open"));
        assert_eq!(state.borrow().progress, 45);
    }

    #[test]
    fn completion_is_claimed_once_and_never_after_teardown() {
        let alive = AtomicBool::new(true);
        assert!(claim_completion(&alive));
        assert!(!claim_completion(&alive));

        let torn_down = AtomicBool::new(false);
        assert!(!claim_completion(&torn_down));
    }
}
