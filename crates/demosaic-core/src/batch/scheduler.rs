use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::config::{BatchConfig, ErrorPolicy};
use crate::batch::gate::Gate;
use crate::batch::memory::{estimate_task_bytes, plan_thread_count, resolve_thread_count};
use crate::batch::task::{process_file, TaskOutput};
use crate::compute::ComputeContext;
use crate::consts::BATCH_POLL_INTERVAL_MS;
use crate::error::{DemosaicError, Result};
use crate::evaluate::Evaluator;
use crate::io;
use crate::resolve::SourceMetadata;

/// Outcome of one batch slot, addressed by the target's original
/// index.
#[derive(Clone, Debug)]
pub struct TaskOutcome {
    pub index: usize,
    pub source: PathBuf,
    pub output: Option<TaskOutput>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// Batch result: per-slot outcomes plus the tallies. Disabled targets
/// leave their slot empty.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<Option<TaskOutcome>>,
}

/// Progress callbacks for batch runs. All methods default to no-ops so
/// library callers only implement what they need.
pub trait BatchReporter: Send + Sync {
    fn batch_started(&self, _total: usize, _workers: usize) {}
    fn task_started(&self, _index: usize, _path: &Path) {}
    fn task_skipped(&self, _index: usize, _path: &Path) {}
    fn task_completed(&self, _outcome: &TaskOutcome) {}
}

/// Reporter that does nothing.
pub struct SilentReporter;

impl BatchReporter for SilentReporter {}

/// Run a batch: a fixed set of worker threads drains the queue of
/// enabled targets, processes each file on its own sized rayon pool
/// and reports outcomes over a channel.
///
/// A failing target either gets recorded and the batch continues, or,
/// under [`ErrorPolicy::Abort`], raises the shared abort flag and the
/// whole run fails once the workers have drained. Workers are always
/// joined before this returns.
pub fn run_batch(
    cfg: &BatchConfig,
    evaluator: &Evaluator,
    reporter: &dyn BatchReporter,
) -> Result<BatchSummary> {
    run_batch_with_abort(cfg, evaluator, reporter, Arc::new(AtomicBool::new(false)))
}

/// [`run_batch`] with a caller-owned cancellation flag. Raising the
/// flag from another thread drops the queued targets and cancels
/// in-flight tasks at their next flag check; the run then returns
/// [`DemosaicError::Aborted`].
pub fn run_batch_with_abort(
    cfg: &BatchConfig,
    evaluator: &Evaluator,
    reporter: &dyn BatchReporter,
    abort: Arc<AtomicBool>,
) -> Result<BatchSummary> {
    let total = cfg.targets.len();
    let mut pending: Vec<usize> = Vec::new();
    let mut skipped = 0usize;
    for (index, target) in cfg.targets.iter().enumerate() {
        if target.enabled {
            pending.push(index);
        } else {
            debug!(path = %target.path.display(), "skipping disabled target");
            reporter.task_skipped(index, &target.path);
            skipped += 1;
        }
    }
    if pending.is_empty() {
        return Err(DemosaicError::Batch(
            "nothing to demosaic: the target list is empty or fully disabled".into(),
        ));
    }

    if cfg.job.output.overwrite {
        let outputs: Vec<PathBuf> = pending
            .iter()
            .map(|&i| cfg.job.output.output_path(&cfg.targets[i].path))
            .collect();
        io::naming::check_duplicate_outputs(&outputs)?;
    }

    let hw_threads = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    let planned = plan_thread_count(
        hw_threads,
        cfg.tuning.file_thread_overload,
        pending.len(),
        cfg.tuning.max_file_threads,
    );
    let workers = if planned > 1 && cfg.tuning.memory_load_control {
        let estimates = estimate_pending(cfg, &pending);
        resolve_thread_count(planned, true, cfg.tuning.memory_load_limit, estimates)
    } else {
        planned
    };
    let compute_share = (hw_threads / workers).max(1);
    info!(targets = pending.len(), workers, compute_share, "starting batch");
    reporter.batch_started(pending.len(), workers);

    let queue = Mutex::new(VecDeque::from(pending));
    let read_gate = Gate::new(cfg.tuning.max_read_threads);
    let write_gate = Gate::new(cfg.tuning.max_write_threads);
    let (tx, rx) = mpsc::channel::<TaskOutcome>();

    let mut outcomes: Vec<Option<TaskOutcome>> = vec![None; total];
    let mut succeeded = 0usize;
    let mut failed = 0usize;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            let abort = Arc::clone(&abort);
            let read_gate = &read_gate;
            let write_gate = &write_gate;
            scope.spawn(move || {
                loop {
                    if abort.load(Ordering::Relaxed) {
                        break;
                    }
                    let index = match queue.lock().expect("queue mutex poisoned").pop_front() {
                        Some(i) => i,
                        None => break,
                    };
                    let path = &cfg.targets[index].path;
                    reporter.task_started(index, path);

                    let result = ComputeContext::with_abort(compute_share, Arc::clone(&abort))
                        .and_then(|ctx| {
                            process_file(
                                path,
                                &cfg.job,
                                evaluator,
                                &ctx,
                                Some(read_gate),
                                Some(write_gate),
                            )
                        });

                    let outcome = match result {
                        Ok(output) => TaskOutcome {
                            index,
                            source: path.clone(),
                            output: Some(output),
                            error: None,
                        },
                        Err(e) => TaskOutcome {
                            index,
                            source: path.clone(),
                            output: None,
                            error: Some(e.to_string()),
                        },
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        // Collect until every worker has hung up. The timeout keeps
        // the loop responsive to the abort flag.
        loop {
            match rx.recv_timeout(Duration::from_millis(BATCH_POLL_INTERVAL_MS)) {
                Ok(outcome) => {
                    if let Some(error) = &outcome.error {
                        warn!(
                            path = %outcome.source.display(),
                            error,
                            "target failed"
                        );
                        failed += 1;
                        if cfg.error_policy == ErrorPolicy::Abort {
                            abort.store(true, Ordering::Relaxed);
                        }
                    } else {
                        succeeded += 1;
                    }
                    reporter.task_completed(&outcome);
                    let index = outcome.index;
                    outcomes[index] = Some(outcome);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    info!("{succeeded} succeeded, {failed} failed, {skipped} skipped");
    if cfg.error_policy == ErrorPolicy::Abort && failed > 0 {
        return Err(DemosaicError::Batch(format!(
            "batch aborted: {failed} target(s) failed under the abort policy"
        )));
    }
    if abort.load(Ordering::Relaxed) {
        return Err(DemosaicError::Aborted);
    }
    if succeeded == 0 {
        return Err(DemosaicError::Batch(
            "no mosaic could be demosaiced".into(),
        ));
    }
    Ok(BatchSummary {
        succeeded,
        failed,
        skipped,
        outcomes,
    })
}

/// Probe the enabled targets' headers for the memory estimator.
/// Unreadable headers simply contribute no estimate; the real error
/// surfaces when the target is processed.
fn estimate_pending(cfg: &BatchConfig, pending: &[usize]) -> Vec<u64> {
    let mut estimates = Vec::with_capacity(pending.len());
    for &index in pending {
        let path = &cfg.targets[index].path;
        let probe = match io::probe(path) {
            Ok(p) => p,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "header probe failed");
                continue;
            }
        };
        let xtrans = match cfg.job.pattern.as_deref() {
            Some(p) => p.trim().len() == 36,
            None => SourceMetadata::load_for(path)
                .map(|m| m.is_xtrans())
                .unwrap_or(false),
        };
        estimates.push(estimate_task_bytes(&probe, &cfg.job, xtrans));
    }
    estimates
}
