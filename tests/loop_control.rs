#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use conversion_reporter_lib::looper::{run_loop, LoopExit};
use conversion_reporter_lib::run_reporter;
use conversion_reporter_lib::store::{MemoryItemStore, MemoryRow};

#[path = "util.rs"]
mod util;

use util::{cycle_config, error_dir, RecordingMailer};

const TICK: Duration = Duration::from_millis(5);

/// Drive the loop with a cycle that counts itself and, on the given call,
/// rewrites the control file.
async fn drive(
    control: Option<&Path>,
    flip_after: Option<(usize, &'static str)>,
    shutdown: CancellationToken,
) -> (LoopExit, usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let control_path = control.map(Path::to_path_buf);
    let counter = count.clone();
    let exit = run_loop(control, TICK, shutdown, move || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let (Some((at, text)), Some(path)) = (flip_after, control_path.as_ref()) {
            if n == at {
                fs::write(path, text).unwrap();
            }
        }
        async {}
    })
    .await;
    (exit, count.load(Ordering::SeqCst))
}

#[tokio::test]
async fn without_control_file_a_single_cycle_runs() {
    let (exit, cycles) = drive(None, None, CancellationToken::new()).await;
    assert_eq!(exit, LoopExit::RanOnce);
    assert_eq!(cycles, 1);
}

#[tokio::test]
async fn padded_uppercase_true_keeps_looping_until_flipped() {
    let dir = tempfile::tempdir().unwrap();
    let control = dir.path().join("looper.txt");
    fs::write(&control, "  TRUE  \n").unwrap();

    let (exit, cycles) = drive(Some(control.as_path()), Some((3, "false")), CancellationToken::new()).await;

    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(cycles, 3);
}

#[tokio::test]
async fn false_or_empty_control_stops_after_first_cycle() {
    for text in ["false", "", "yes"] {
        let dir = tempfile::tempdir().unwrap();
        let control = dir.path().join("looper.txt");
        fs::write(&control, text).unwrap();

        let (exit, cycles) = drive(Some(control.as_path()), None, CancellationToken::new()).await;

        assert_eq!(exit, LoopExit::Stopped, "{text:?}");
        assert_eq!(cycles, 1, "{text:?}");
    }
}

#[tokio::test]
async fn absent_control_file_stops_after_first_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let control = dir.path().join("looper.txt");

    let (exit, cycles) = drive(Some(control.as_path()), None, CancellationToken::new()).await;

    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(cycles, 1);
}

#[tokio::test]
async fn unreadable_control_file_is_a_distinct_exit() {
    let dir = tempfile::tempdir().unwrap();

    let (exit, cycles) = drive(Some(dir.path()), None, CancellationToken::new()).await;

    let LoopExit::ControlFileUnreadable(err) = &exit else {
        panic!("expected unreadable control file, got {exit:?}");
    };
    assert_eq!(err.code(), "CONTROL/UNREADABLE");
    assert_eq!(exit.exit_code(), 2);
    assert_eq!(cycles, 1);
}

#[tokio::test]
async fn cancellation_interrupts_the_pause() {
    let dir = tempfile::tempdir().unwrap();
    let control = dir.path().join("looper.txt");
    fs::write(&control, "true").unwrap();
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();

    let exit = tokio::time::timeout(
        Duration::from_secs(5),
        run_loop(Some(control.as_path()), Duration::from_secs(3600), shutdown, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            trigger.cancel();
            async {}
        }),
    )
    .await
    .expect("loop ends promptly once cancelled");

    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancelled_before_start_runs_nothing() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let (exit, cycles) = drive(None, None, shutdown).await;
    assert_eq!(exit, LoopExit::Cancelled);
    assert_eq!(cycles, 0);
}

#[tokio::test]
async fn run_reporter_runs_real_cycles() {
    let dir = error_dir(&["11.pdf"], &[]);
    let config = cycle_config(dir.path());
    let store = MemoryItemStore::new();
    store.insert(11, MemoryRow::default());
    let mailer = RecordingMailer::new();
    let control_dir = tempfile::tempdir().unwrap();
    let control = control_dir.path().join("looper.txt");
    fs::write(&control, "false").unwrap();

    let exit = run_reporter(
        &config,
        &store,
        &mailer,
        Some(control.as_path()),
        TICK,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(exit, LoopExit::Stopped);
    assert_eq!(mailer.sent().len(), 1);
    assert!(store.row(11).unwrap().converter_error);
}
