//! The active-conversions gauge is process wide, so this file holds a single
//! test and runs in its own binary.

use std::sync::Arc;

use tempfile::TempDir;

use cadence_core::conversion::{ConversionManager, JobStatus, ManagerConfig, MediaSource};
use cadence_core::metrics::CONVERSIONS_ACTIVE;
use cadence_core::testing::fixtures::{exit, progress_line};
use cadence_core::testing::{MockConverter, MockRunner};

fn manager(work_dir: &TempDir, runner: &MockRunner) -> ConversionManager {
    let config = ManagerConfig::default().with_work_dir(work_dir.path().to_path_buf());
    ConversionManager::with_runner(config, Arc::new(runner.clone()))
}

#[test]
fn test_managers_share_active_gauge() {
    let source_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();
    let converter = Arc::new(MockConverter::new());

    let quick = MockRunner::new();
    quick.push_script_with_output(vec![vec![progress_line(1.0, 1.0), exit(0)]], "done");
    let slow = MockRunner::new();
    slow.push_script(vec![vec![]]);
    slow.push_script(vec![vec![]]);

    let mut first = manager(&work_dir, &quick);
    let mut second = manager(&work_dir, &slow);
    let baseline = CONVERSIONS_ACTIVE.get();

    let done = first
        .start_conversion(
            MediaSource::new(source_dir.path().join("a.webm")),
            converter.clone(),
        )
        .unwrap();
    second
        .start_conversion(
            MediaSource::new(source_dir.path().join("b.webm")),
            converter.clone(),
        )
        .unwrap();
    second
        .start_conversion(
            MediaSource::new(source_dir.path().join("c.webm")),
            converter,
        )
        .unwrap();
    assert_eq!(CONVERSIONS_ACTIVE.get(), baseline + 3);

    // Pumping one manager must not overwrite the other's share.
    first.check_notifications();
    assert_eq!(done.status(), JobStatus::Finished);
    assert_eq!(CONVERSIONS_ACTIVE.get(), baseline + 2);

    second.cancel_all();
    second.check_notifications();
    assert_eq!(CONVERSIONS_ACTIVE.get(), baseline);
}
