/// Minimum mosaic side length for the Bayer interpolation methods.
/// Bilinear needs a 1-pixel border and VNG a 2-pixel border, so 6x6 is
/// the smallest mosaic that still has an interior.
pub const MIN_BAYER_SIZE: usize = 6;

/// Minimum mosaic side length for X-Trans interpolation. One full tile
/// is required so the homogeneity voting has enough context.
pub const MIN_XTRANS_SIZE: usize = 64;

/// Minimum mosaic side length for the FBDD pre-filter. Below this the
/// filter is skipped with a warning.
pub const MIN_DENOISE_SIZE: usize = 32;

/// VNG gradient threshold coefficient for the minimum gradient.
pub const VNG_K1: f64 = 1.5;

/// VNG gradient threshold coefficient for the gradient spread.
pub const VNG_K2: f64 = 0.5;

/// Slack added to the VNG threshold so gradients exactly at the
/// threshold stay valid under floating-point rounding.
pub const VNG_THRESHOLD_EPSILON: f64 = 1e-10;

/// X-Trans interpolation tile size.
pub const XTRANS_TILE: usize = 64;

/// Overlap between adjacent X-Trans tiles.
pub const XTRANS_OVERLAP: usize = 16;

/// Width of the X-Trans border band filled by neighbor averaging.
pub const XTRANS_BORDER: usize = 8;

/// Default fraction of available physical memory the batch scheduler
/// may commit to concurrent tasks.
pub const DEFAULT_MEMORY_LOAD_LIMIT: f32 = 0.85;

/// Default multiplier applied to the hardware thread count when sizing
/// the file-level worker pool.
pub const DEFAULT_FILE_THREAD_OVERLOAD: f32 = 1.0;

/// Default number of concurrent file read operations.
pub const DEFAULT_MAX_READ_THREADS: usize = 4;

/// Default number of concurrent file write operations.
pub const DEFAULT_MAX_WRITE_THREADS: usize = 4;

/// Poll interval for the batch result collector, in milliseconds.
pub const BATCH_POLL_INTERVAL_MS: u64 = 150;
