//! 文本剪贴板写入
//!
//! - `SystemClipboard`：通过 `arboard` 直接写系统剪贴板（主通道）
//! - `SelectionClipboard`：把文本通过 stdin 交给平台自带的复制工具（备用通道）

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::AppError;

/// 可写入文本的剪贴板
pub trait TextClipboard: Send + Sync {
    fn copy_text(&self, text: &str) -> Result<(), AppError>;
}

/// 系统剪贴板
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl TextClipboard for SystemClipboard {
    fn copy_text(&self, text: &str) -> Result<(), AppError> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|e| AppError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| AppError::Clipboard(e.to_string()))
    }
}

/// 平台复制工具
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionClipboard;

impl SelectionClipboard {
    #[cfg(target_os = "macos")]
    fn candidates() -> &'static [(&'static str, &'static [&'static str])] {
        &[("pbcopy", &[])]
    }

    #[cfg(target_os = "windows")]
    fn candidates() -> &'static [(&'static str, &'static [&'static str])] {
        &[("clip", &[])]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    fn candidates() -> &'static [(&'static str, &'static [&'static str])] {
        &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
        ]
    }

    fn pipe_to(program: &str, args: &[&str], text: &str) -> Result<(), AppError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AppError::Clipboard(format!("启动 {} 失败: {}", program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                drop(stdin);
                let _ = child.kill();
                let _ = child.wait();
                return Err(AppError::Clipboard(format!("写入 {} 失败: {}", program, e)));
            }
        }

        let status = child
            .wait()
            .map_err(|e| AppError::Clipboard(format!("等待 {} 失败: {}", program, e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Clipboard(format!("{} 退出码异常: {}", program, status)))
        }
    }
}

impl TextClipboard for SelectionClipboard {
    fn copy_text(&self, text: &str) -> Result<(), AppError> {
        let mut last_error = AppError::Clipboard("没有可用的复制工具".to_string());
        for (program, args) in Self::candidates() {
            match Self::pipe_to(program, args, text) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::debug!("复制工具不可用: {}", err);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

/// 先走主通道，失败后走备用通道，返回是否复制成功。
pub fn copy_with_fallback(primary: &dyn TextClipboard, fallback: &dyn TextClipboard, text: &str) -> bool {
    match primary.copy_text(text) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("⚠️ 系统剪贴板写入失败，改用备用方式: {}", err);
            match fallback.copy_text(text) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("⚠️ 备用复制也失败: {}", err);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recording {
        fail: bool,
        copied: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(fail: bool) -> Self {
            Self { fail, copied: Mutex::new(Vec::new()) }
        }
    }

    impl TextClipboard for Recording {
        fn copy_text(&self, text: &str) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Clipboard("unavailable".to_string()));
            }
            self.copied.lock().expect("lock copied").push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn primary_success_skips_fallback() {
        let primary = Recording::new(false);
        let fallback = Recording::new(false);

        assert!(copy_with_fallback(&primary, &fallback, "link"));
        assert_eq!(*primary.copied.lock().expect("lock"), vec!["link".to_string()]);
        assert!(fallback.copied.lock().expect("lock").is_empty());
    }

    #[test]
    fn fallback_result_is_used_when_primary_fails() {
        let primary = Recording::new(true);

        assert!(copy_with_fallback(&primary, &Recording::new(false), "link"));
        assert!(!copy_with_fallback(&primary, &Recording::new(true), "link"));
    }

    #[cfg(unix)]
    #[test]
    fn tool_that_closes_stdin_early_is_reported_as_write_failure() {
        // `true` 不读 stdin 就退出，超过管道缓冲的写入会得到 EPIPE
        let text = "x".repeat(4 * 1024 * 1024);

        let err = SelectionClipboard::pipe_to("true", &[], &text).expect_err("write must fail");
        assert!(err.to_string().contains("写入 true 失败"), "unexpected error: {err}");
    }
}
