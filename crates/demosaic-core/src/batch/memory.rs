//! Memory-aware admission control for batch runs.
//!
//! Before the workers start, every enabled target's header is probed
//! and a per-task working set is estimated; the median estimate caps
//! the number of concurrent tasks against available physical memory.

use tracing::warn;

use crate::batch::config::JobOptions;
use crate::demosaic::Method;
use crate::denoise::DenoiseMode;
use crate::io::MosaicProbe;

/// Estimated peak bytes for processing one mosaic.
pub fn estimate_task_bytes(probe: &MosaicProbe, job: &JobOptions, xtrans: bool) -> u64 {
    let npix = probe.pixels() as u64;

    // Decoded source.
    let mut bytes = npix * probe.bytes_per_sample as u64;

    // RGB output planes, quarter size for SuperPixel.
    let mut output = npix * 3 * 4;
    if job.method == Method::SuperPixel && !xtrans {
        output >>= 2;
    }
    bytes += output;

    if job.denoise != DenoiseMode::Off && !xtrans {
        // Interleaved working image plus the normalized copy.
        bytes += npix * 3 * 4 + npix * 4;
    }

    if xtrans {
        // Normalized input copy plus per-pixel green bounds.
        bytes += npix * 12;
    }

    if job.evaluate_noise || job.evaluate_signal {
        let tile = if xtrans { 6u64 } else { 2u64 };
        bytes += 6 * (npix / (tile * tile)) * 4;
    }

    bytes
}

/// Median of per-task estimates; zero for an empty batch.
pub fn median_task_bytes(mut estimates: Vec<u64>) -> u64 {
    if estimates.is_empty() {
        return 0;
    }
    let mid = estimates.len() / 2;
    *estimates.select_nth_unstable(mid).1
}

/// File-level worker count before memory control: hardware threads
/// scaled by the overload factor, never more than the pending targets.
pub fn plan_thread_count(hw_threads: usize, overload: f32, pending: usize, cap: usize) -> usize {
    let scaled = ((hw_threads as f32 * overload).round() as usize).max(1);
    let mut threads = scaled.min(pending.max(1));
    if cap > 0 {
        threads = threads.min(cap);
    }
    threads
}

/// Cap the worker count so that `threads * median_bytes` stays within
/// the allowed fraction of available memory.
pub fn memory_limited_threads(
    threads: usize,
    median_bytes: u64,
    load_limit: f32,
    available: u64,
) -> usize {
    if median_bytes == 0 {
        return threads;
    }
    let budget = (available as f64 * load_limit as f64) as u64;
    let fit = (budget / median_bytes).max(1) as usize;
    threads.min(fit)
}

/// Available physical memory in bytes, from `/proc/meminfo`.
pub fn available_memory() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Resolve the final worker count for a batch, logging when memory
/// control kicks in. Unknown available memory degrades to one worker.
pub fn resolve_thread_count(
    planned: usize,
    memory_load_control: bool,
    load_limit: f32,
    estimates: Vec<u64>,
) -> usize {
    if !memory_load_control || planned <= 1 {
        return planned;
    }
    let median = median_task_bytes(estimates);
    match available_memory() {
        Some(available) => {
            let limited = memory_limited_threads(planned, median, load_limit, available);
            if limited < planned {
                warn!(
                    planned,
                    limited,
                    median_task_bytes = median,
                    available_bytes = available,
                    "worker count is memory-limited"
                );
            }
            limited
        }
        None => {
            warn!("available memory unknown, running single-threaded");
            1
        }
    }
}
