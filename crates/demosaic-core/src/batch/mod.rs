pub mod config;
pub mod gate;
pub mod memory;
pub mod scheduler;
pub mod task;

pub use config::{BatchConfig, ErrorPolicy, JobOptions, TargetItem, Tuning};
pub use gate::Gate;
pub use scheduler::{
    run_batch, run_batch_with_abort, BatchReporter, BatchSummary, SilentReporter, TaskOutcome,
};
pub use task::{process_file, TaskOutput};
