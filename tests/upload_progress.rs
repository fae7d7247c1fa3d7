use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use proptest::prelude::*;
use room_matrix::config::UploadConfig;
use room_matrix::upload::{advance_progress, UploadFile, UploadSimulator, UploadState, PROGRESS_COMPLETE};
use tokio::time::Instant;

fn unique_temp_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock error")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("room_matrix_upload_test_{}_{}", std::process::id(), nanos));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn write_jpeg(dir: &std::path::Path, name: &str) -> PathBuf {
    let mut encoded = Cursor::new(Vec::new());
    image::RgbImage::from_pixel(8, 8, image::Rgb([30, 60, 90]))
        .write_to(&mut encoded, image::ImageFormat::Jpeg)
        .expect("encode jpeg");
    let path = dir.join(name);
    std::fs::write(&path, encoded.into_inner()).expect("write jpeg");
    path
}

fn test_config() -> UploadConfig {
    UploadConfig {
        progress_interval_ms: 100,
        progress_step: 5,
        redirect_delay_ms: 600,
        ..UploadConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn authorized_jpeg_upload_steps_to_100_then_completes_once() {
    let dir = unique_temp_dir();
    let path = write_jpeg(&dir, "plan.jpg");

    let mut simulator = UploadSimulator::new(test_config());
    let mut rx = simulator.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, done) = tokio::sync::oneshot::channel();

    let counter = Arc::clone(&calls);
    assert!(simulator.upload(UploadFile::from_path(&path), true, move |payload| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send((payload, Instant::now()));
    }));
    assert_eq!(simulator.state().file_name.as_deref(), Some("plan.jpg"));

    let mut seen = vec![rx.borrow_and_update().progress];
    let mut reached_at = None;
    while seen.last().copied() != Some(PROGRESS_COMPLETE) {
        rx.changed().await.expect("state channel open");
        seen.push(rx.borrow_and_update().progress);
        reached_at = Some(Instant::now());
    }

    let expected: Vec<u8> = (0..=20).map(|i| i * 5).collect();
    assert_eq!(seen, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "回调必须等待跳转延时");

    let (payload, completed_at) = done.await.expect("completion fires");
    assert_eq!(payload.mime_type(), "image/jpeg");
    assert!(payload.to_data_url().starts_with("data:image/jpeg;base64,"));
    let reached_at = reached_at.expect("progress reached 100");
    assert!(completed_at.duration_since(reached_at) >= Duration::from_millis(600));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!simulator.is_active());
    assert_eq!(simulator.state().status_text(), "Redirecting");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unauthorized_or_unsupported_uploads_are_ignored() {
    let dir = unique_temp_dir();
    let path = write_jpeg(&dir, "plan.jpg");
    let mut simulator = UploadSimulator::new(test_config());

    assert!(!simulator.upload(UploadFile::from_path(&path), false, |_| panic!("must not complete")));
    assert!(!simulator.upload(
        UploadFile::new("plan.gif", "image/gif", &path),
        true,
        |_| panic!("must not complete")
    ));

    assert_eq!(simulator.state(), UploadState::default());
    assert!(!simulator.is_active());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn read_failure_resets_state_without_completion() {
    let dir = unique_temp_dir();
    let mut simulator = UploadSimulator::new(test_config());
    let mut rx = simulator.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    assert!(simulator.upload(
        UploadFile::new("missing.png", "image/png", dir.join("missing.png")),
        true,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    ));

    rx.wait_for(|state| state.file_name.is_none()).await.expect("state channel open");
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(simulator.state(), UploadState::default());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn non_image_content_is_treated_as_read_failure() {
    let dir = unique_temp_dir();
    let path = dir.join("fake.png");
    std::fs::write(&path, b"definitely not a png").expect("write fake file");

    let mut simulator = UploadSimulator::new(test_config());
    let mut rx = simulator.subscribe();
    assert!(simulator.upload(UploadFile::from_path(&path), true, |_| panic!("must not complete")));

    rx.wait_for(|state| state.file_name.is_none()).await.expect("state channel open");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(simulator.state().progress, 0);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn reselecting_cancels_previous_pipeline() {
    let dir = unique_temp_dir();
    let first = write_jpeg(&dir, "first.jpg");
    let second = write_jpeg(&dir, "second.jpg");

    let mut simulator = UploadSimulator::new(test_config());
    let mut rx = simulator.subscribe();
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&first_calls);
    simulator.upload(UploadFile::from_path(&first), true, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    rx.wait_for(|state| state.progress >= 20).await.expect("state channel open");

    let counter = Arc::clone(&second_calls);
    simulator.upload(UploadFile::from_path(&second), true, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(simulator.state().progress, 0);
    assert_eq!(simulator.state().file_name.as_deref(), Some("second.jpg"));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_timers() {
    let dir = unique_temp_dir();
    let path = write_jpeg(&dir, "plan.jpg");

    let mut simulator = UploadSimulator::new(test_config());
    let mut rx = simulator.subscribe();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    simulator.upload(UploadFile::from_path(&path), true, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    rx.wait_for(|state| state.progress == PROGRESS_COMPLETE).await.expect("state channel open");

    // 进度已满、跳转延时尚未结束
    simulator.teardown();
    let frozen = simulator.state();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(simulator.state(), frozen);
    assert!(!simulator.is_active());
    let _ = std::fs::remove_dir_all(&dir);
}

proptest! {
    #[test]
    fn progress_is_monotonic_fixed_step_and_ends_at_100(step in 1u8..=100) {
        let mut progress = 0u8;
        let mut ticks = 0u32;
        while progress < PROGRESS_COMPLETE {
            let next = advance_progress(progress, step);
            prop_assert!(next > progress);
            if next < PROGRESS_COMPLETE {
                prop_assert_eq!(next - progress, step);
            }
            progress = next;
            ticks += 1;
        }
        prop_assert_eq!(progress, PROGRESS_COMPLETE);
        prop_assert_eq!(ticks, u32::from(PROGRESS_COMPLETE).div_ceil(u32::from(step)));
    }
}
