#[allow(dead_code)]
mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use demosaic_core::batch::{
    run_batch, run_batch_with_abort, BatchConfig, BatchReporter, SilentReporter, TargetItem,
    TaskOutcome,
};
use demosaic_core::evaluate::Evaluator;
use demosaic_core::DemosaicError;
use tempfile::TempDir;

use common::{resolved_bayer, write_bayer_png};

fn write_source(dir: &TempDir, name: &str) -> PathBuf {
    let cfa = resolved_bayer("RGGB");
    let path = dir.path().join(name);
    write_bayer_png(&path, 16, 16, &cfa.pattern, [0.8, 0.4, 0.2]);
    path
}

fn config_for(targets: Vec<TargetItem>, out_dir: &TempDir) -> BatchConfig {
    let mut config = BatchConfig {
        targets,
        ..Default::default()
    };
    config.job.pattern = Some("RGGB".to_owned());
    config.job.output.directory = Some(out_dir.path().to_path_buf());
    config
}

#[test]
fn batch_processes_every_enabled_target() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let targets = vec![
        TargetItem::new(write_source(&src, "a.png")),
        TargetItem::new(write_source(&src, "b.png")),
    ];
    let config = config_for(targets, &out);

    let summary = run_batch(&config, &Evaluator::default(), &SilentReporter).expect("batch");
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.skipped, 0);

    assert!(out.path().join("a_d.png").exists());
    assert!(out.path().join("b_d.png").exists());
    for outcome in summary.outcomes.iter() {
        let outcome = outcome.as_ref().expect("every slot filled");
        assert!(outcome.succeeded(), "{:?}", outcome.error);
    }
}

#[test]
fn disabled_targets_keep_their_slot_but_are_skipped() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut disabled = TargetItem::new(write_source(&src, "b.png"));
    disabled.enabled = false;
    let targets = vec![TargetItem::new(write_source(&src, "a.png")), disabled];
    let config = config_for(targets, &out);

    let summary = run_batch(&config, &Evaluator::default(), &SilentReporter).expect("batch");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.outcomes[0].is_some());
    assert!(summary.outcomes[1].is_none());
    assert!(!out.path().join("b_d.png").exists());
}

#[test]
fn fully_disabled_batch_is_an_error() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut target = TargetItem::new(write_source(&src, "a.png"));
    target.enabled = false;
    let config = config_for(vec![target], &out);

    let err = run_batch(&config, &Evaluator::default(), &SilentReporter).unwrap_err();
    assert!(matches!(err, DemosaicError::Batch(_)), "{err}");
}

#[test]
fn failed_targets_are_recorded_and_the_batch_continues() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let targets = vec![
        TargetItem::new(src.path().join("missing.png")),
        TargetItem::new(write_source(&src, "a.png")),
    ];
    let config = config_for(targets, &out);

    let summary = run_batch(&config, &Evaluator::default(), &SilentReporter).expect("batch");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let failed = summary.outcomes[0].as_ref().unwrap();
    assert!(!failed.succeeded());
    assert!(failed.error.is_some());
}

#[test]
fn batch_with_no_successes_is_an_error() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let config = config_for(vec![TargetItem::new(src.path().join("missing.png"))], &out);

    let err = run_batch(&config, &Evaluator::default(), &SilentReporter).unwrap_err();
    assert!(matches!(err, DemosaicError::Batch(_)), "{err}");
}

#[test]
fn duplicate_overwrite_outputs_are_rejected_up_front() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let source = write_source(&src, "a.png");
    let targets = vec![TargetItem::new(&source), TargetItem::new(&source)];
    let mut config = config_for(targets, &out);
    config.job.output.overwrite = true;

    let err = run_batch(&config, &Evaluator::default(), &SilentReporter).unwrap_err();
    assert!(matches!(err, DemosaicError::InvalidConfig(_)), "{err}");
    assert!(!out.path().join("a_d.png").exists());
}

#[test]
fn abort_policy_fails_the_batch_on_the_first_error() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let targets = vec![
        TargetItem::new(src.path().join("missing.png")),
        TargetItem::new(write_source(&src, "a.png")),
        TargetItem::new(write_source(&src, "b.png")),
    ];
    let mut config = config_for(targets, &out);
    config.error_policy = demosaic_core::batch::ErrorPolicy::Abort;
    config.tuning.max_file_threads = 1;

    // Under the abort policy any failed target fails the whole run,
    // regardless of how many targets finished before the flag was
    // observed.
    let err = run_batch(&config, &Evaluator::default(), &SilentReporter).unwrap_err();
    assert!(matches!(err, DemosaicError::Batch(_)), "{err}");
}

#[test]
fn raised_cancel_flag_aborts_the_batch() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let targets = vec![
        TargetItem::new(write_source(&src, "a.png")),
        TargetItem::new(write_source(&src, "b.png")),
    ];
    let config = config_for(targets, &out);

    // A flag raised before the run starts cancels every target.
    let cancel = Arc::new(AtomicBool::new(true));
    let err = run_batch_with_abort(&config, &Evaluator::default(), &SilentReporter, cancel)
        .unwrap_err();
    assert!(matches!(err, DemosaicError::Aborted), "{err}");
    assert!(!out.path().join("a_d.png").exists());
    assert!(!out.path().join("b_d.png").exists());
}

#[test]
fn outcome_slots_follow_target_order() {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let names = ["a.png", "b.png", "c.png"];
    let targets: Vec<TargetItem> = names
        .iter()
        .map(|name| TargetItem::new(write_source(&src, name)))
        .collect();
    let paths: Vec<PathBuf> = targets.iter().map(|t| t.path.clone()).collect();
    let config = config_for(targets, &out);

    let summary = run_batch(&config, &Evaluator::default(), &SilentReporter).expect("batch");
    assert_eq!(summary.outcomes.len(), names.len());
    for (index, path) in paths.iter().enumerate() {
        let outcome = summary.outcomes[index].as_ref().expect("slot filled");
        assert_eq!(outcome.index, index);
        assert_eq!(&outcome.source, path);
    }
}

#[test]
fn reporter_sees_every_target_once() {
    struct CountingReporter {
        started: AtomicUsize,
        completed: AtomicUsize,
        skipped: AtomicUsize,
    }

    impl BatchReporter for CountingReporter {
        fn task_started(&self, _index: usize, _path: &std::path::Path) {
            self.started.fetch_add(1, Ordering::Relaxed);
        }
        fn task_skipped(&self, _index: usize, _path: &std::path::Path) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
        fn task_completed(&self, _outcome: &TaskOutcome) {
            self.completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut disabled = TargetItem::new(write_source(&src, "c.png"));
    disabled.enabled = false;
    let targets = vec![
        TargetItem::new(write_source(&src, "a.png")),
        TargetItem::new(write_source(&src, "b.png")),
        disabled,
    ];
    let config = config_for(targets, &out);

    let reporter = CountingReporter {
        started: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        skipped: AtomicUsize::new(0),
    };
    run_batch(&config, &Evaluator::default(), &reporter).expect("batch");

    assert_eq!(reporter.started.load(Ordering::Relaxed), 2);
    assert_eq!(reporter.completed.load(Ordering::Relaxed), 2);
    assert_eq!(reporter.skipped.load(Ordering::Relaxed), 1);
}
