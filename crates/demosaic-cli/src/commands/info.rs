use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use demosaic_core::batch::task::resolve_pattern;
use demosaic_core::io;
use demosaic_core::SourceMetadata;

#[derive(Args)]
pub struct InfoArgs {
    /// Input mosaic file
    pub file: PathBuf,

    /// Fixed CFA pattern overriding the sidecar metadata
    #[arg(long)]
    pub pattern: Option<String>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let probe = io::probe(&args.file)?;
    let mosaic = io::load_mosaic(&args.file)?;

    println!("File:        {}", args.file.display());
    println!("Dimensions:  {}x{}", probe.width, probe.height);
    println!("Samples:     {} ({} bytes)", mosaic.data.kind(), probe.bytes_per_sample);

    let meta = SourceMetadata::load_for(&args.file)?;
    let sidecar = SourceMetadata::sidecar_path(&args.file);
    println!(
        "Sidecar:     {}",
        if sidecar.exists() {
            sidecar.display().to_string()
        } else {
            "none".to_owned()
        }
    );

    match resolve_pattern(args.pattern.as_deref(), &meta) {
        Ok(cfa) => {
            println!("Pattern:     {}", cfa.pattern);
            if cfa.xtrans {
                println!("Sensor:      X-Trans");
            }
        }
        Err(e) => println!("Pattern:     unavailable ({e})"),
    }

    Ok(())
}
