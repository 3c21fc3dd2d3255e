use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use demosaic_core::batch::task::resolve_pattern;
use demosaic_core::demosaic;
use demosaic_core::denoise::denoise;
use demosaic_core::evaluate::{EvaluationRequest, Evaluator};
use demosaic_core::io;
use demosaic_core::io::OutputNaming;
use demosaic_core::{ComputeContext, SourceMetadata};

use super::run::{DenoiseArg, MethodArg};

#[derive(Args)]
pub struct SingleArgs {
    /// Input mosaic file
    pub file: PathBuf,

    /// Demosaicing method
    #[arg(long, value_enum, default_value = "vng")]
    pub method: MethodArg,

    /// Pre-demosaicing noise reduction
    #[arg(long, value_enum, default_value = "off")]
    pub denoise: DenoiseArg,

    /// Fixed CFA pattern overriding the sidecar metadata
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output file path (default: source name with a _d postfix)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,

    /// Estimate per-channel noise
    #[arg(long)]
    pub evaluate_noise: bool,

    /// Also write the three channel planes as separate files
    #[arg(long)]
    pub save_channels: bool,
}

pub fn run(args: &SingleArgs) -> Result<()> {
    let mosaic = io::load_mosaic(&args.file)?;
    let meta = SourceMetadata::load_for(&args.file)?;
    let cfa = resolve_pattern(args.pattern.as_deref(), &meta)?;

    let threads = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    let ctx = ComputeContext::new(threads)?;

    let mosaic = match denoise(&mosaic, &cfa.pattern, args.denoise.into())? {
        Some(filtered) => filtered,
        None => mosaic,
    };
    let method = demosaic::Method::from(args.method).effective(&cfa);
    let raster = demosaic::reconstruct(&mosaic, &cfa, args.method.into(), &ctx)?;

    let output_path = match &args.output {
        Some(path) => {
            if path.exists() && !args.overwrite {
                bail!("output file exists: {} (use --overwrite)", path.display());
            }
            path.clone()
        }
        None => {
            let naming = OutputNaming {
                overwrite: args.overwrite,
                ..Default::default()
            };
            naming.resolve(&args.file)
        }
    };

    io::save_rgb(&raster, &output_path)?;
    let channel_paths = if args.save_channels {
        io::save_channels(&raster, &output_path)?
    } else {
        Vec::new()
    };

    println!("Pattern:  {}", cfa.pattern);
    println!("Method:   {}", method);
    println!("Output:   {}", output_path.display());
    for path in &channel_paths {
        println!("Channel:  {}", path.display());
    }

    if args.evaluate_noise {
        let request = EvaluationRequest {
            noise: true,
            signal: false,
        };
        let stats = Evaluator::default().evaluate(&mosaic.to_f32(), &cfa.pattern, request, &ctx)?;
        for s in &stats {
            if let Some(noise) = &s.noise {
                println!(
                    "Noise {}:  {:.3e} ({:.0}% of pixels)",
                    s.channel,
                    noise.sigma,
                    noise.fraction * 100.0
                );
            }
        }
    }
    Ok(())
}
