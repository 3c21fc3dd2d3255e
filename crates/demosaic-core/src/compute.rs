use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DemosaicError, Result};

/// Execution context for one reconstruction task: a dedicated rayon
/// pool plus a shared cancellation flag.
///
/// The batch scheduler sizes the pool so that file-level workers and
/// the per-image row/tile parallelism together stay within the global
/// compute budget. Long-running loops poll `is_aborted` once per row
/// band or tile and bail out early.
pub struct ComputeContext {
    pool: rayon::ThreadPool,
    abort: Arc<AtomicBool>,
}

impl ComputeContext {
    pub fn new(threads: usize) -> Result<Self> {
        Self::with_abort(threads, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_abort(threads: usize, abort: Arc<AtomicBool>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| DemosaicError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, abort })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// Fail with [`DemosaicError::Aborted`] if cancellation was
    /// requested.
    pub fn check_abort(&self) -> Result<()> {
        if self.is_aborted() {
            Err(DemosaicError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Run `f` inside this context's thread pool.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }
}
