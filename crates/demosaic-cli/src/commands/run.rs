use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use demosaic_core::batch::{
    run_batch, BatchConfig, BatchReporter, ErrorPolicy, TargetItem, TaskOutcome,
};
use demosaic_core::evaluate::Evaluator;
use demosaic_core::{DenoiseMode, Method};
use indicatif::{ProgressBar, ProgressStyle};

use crate::summary;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MethodArg {
    SuperPixel,
    Bilinear,
    Vng,
    Xtrans,
}

impl From<MethodArg> for Method {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::SuperPixel => Method::SuperPixel,
            MethodArg::Bilinear => Method::Bilinear,
            MethodArg::Vng => Method::Vng,
            MethodArg::Xtrans => Method::XTrans,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DenoiseArg {
    Off,
    Basic,
    Full,
}

impl From<DenoiseArg> for DenoiseMode {
    fn from(arg: DenoiseArg) -> Self {
        match arg {
            DenoiseArg::Off => DenoiseMode::Off,
            DenoiseArg::Basic => DenoiseMode::Basic,
            DenoiseArg::Full => DenoiseMode::Full,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// Batch config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Input mosaic files (alternative to --config)
    pub files: Vec<PathBuf>,

    /// Demosaicing method
    #[arg(long, value_enum, default_value = "vng")]
    pub method: MethodArg,

    /// Pre-demosaicing noise reduction
    #[arg(long, value_enum, default_value = "off")]
    pub denoise: DenoiseArg,

    /// Fixed CFA pattern for all targets, e.g. RGGB
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output directory (default: next to each source)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,

    /// Estimate per-channel noise and record it in the summary
    #[arg(long)]
    pub evaluate_noise: bool,

    /// Also write the three channel planes as separate files
    #[arg(long)]
    pub save_channels: bool,

    /// Stop the whole batch on the first failure
    #[arg(long)]
    pub abort_on_error: bool,
}

struct ProgressReporter {
    bar: ProgressBar,
}

impl BatchReporter for ProgressReporter {
    fn batch_started(&self, total: usize, _workers: usize) {
        self.bar.set_length(total as u64);
    }

    fn task_completed(&self, outcome: &TaskOutcome) {
        if let Some(error) = &outcome.error {
            self.bar
                .println(format!("  failed: {} ({error})", outcome.source.display()));
        }
        self.bar.inc(1);
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    summary::print_batch_config(&config);

    let bar = ProgressBar::new(config.enabled_count() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    bar.set_message("demosaicing");

    let reporter = ProgressReporter { bar: bar.clone() };
    let result = run_batch(&config, &Evaluator::default(), &reporter);
    bar.finish_and_clear();

    let batch = result?;
    summary::print_batch_result(&batch);
    Ok(())
}

fn build_config(args: &RunArgs) -> Result<BatchConfig> {
    let config = if let Some(path) = &args.config {
        if !args.files.is_empty() {
            bail!("pass either --config or a file list, not both");
        }
        BatchConfig::from_toml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?
    } else {
        if args.files.is_empty() {
            bail!("no input files; pass mosaic files or --config");
        }
        let mut config = BatchConfig::default();
        config.targets = args.files.iter().map(TargetItem::new).collect();
        config.job.method = args.method.into();
        config.job.denoise = args.denoise.into();
        config.job.pattern = args.pattern.clone();
        config.job.evaluate_noise = args.evaluate_noise;
        config.job.save_channel_files = args.save_channels;
        config.job.output.directory = args.output_dir.clone();
        config.job.output.overwrite = args.overwrite;
        if args.abort_on_error {
            config.error_policy = ErrorPolicy::Abort;
        }
        config
    };

    for target in &config.targets {
        if target.enabled && !Path::new(&target.path).exists() {
            bail!("input file not found: {}", target.path.display());
        }
    }
    Ok(config)
}
