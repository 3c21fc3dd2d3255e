use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::batch::config::JobOptions;
use crate::batch::gate::Gate;
use crate::cfa::{BayerPattern, CfaPattern};
use crate::compute::ComputeContext;
use crate::demosaic::{self, Method};
use crate::denoise::denoise;
use crate::error::Result;
use crate::evaluate::{ChannelStats, EvaluationRequest, Evaluator};
use crate::io;
use crate::resolve::{self, ResolvedCfa, SourceMetadata, IDENTITY_MATRIX};

/// Result of processing one source file.
#[derive(Clone, Debug)]
pub struct TaskOutput {
    pub output_path: PathBuf,
    pub channel_paths: Vec<PathBuf>,
    /// Resolved CFA pattern id.
    pub pattern: String,
    /// Method actually applied.
    pub method: Method,
    pub stats: Option<Vec<ChannelStats>>,
}

/// Process one mosaic end to end: read, resolve, optionally denoise,
/// reconstruct, optionally evaluate, write.
///
/// The gates bound concurrent disk traffic across workers; the compute
/// context carries this task's rayon pool and the shared abort flag.
pub fn process_file(
    path: &Path,
    job: &JobOptions,
    evaluator: &Evaluator,
    ctx: &ComputeContext,
    read_gate: Option<&Gate>,
    write_gate: Option<&Gate>,
) -> Result<TaskOutput> {
    let mosaic = {
        let _slot = read_gate.map(Gate::acquire);
        io::load_mosaic(path)?
    };
    ctx.check_abort()?;

    let meta = SourceMetadata::load_for(path)?;
    let cfa = resolve_pattern(job.pattern.as_deref(), &meta)?;
    let method = job.method.effective(&cfa);
    debug!(
        path = %path.display(),
        pattern = %cfa.id,
        %method,
        samples = mosaic.data.kind(),
        "processing mosaic"
    );

    let mosaic = match denoise(&mosaic, &cfa.pattern, job.denoise)? {
        Some(filtered) => filtered,
        None => mosaic,
    };
    ctx.check_abort()?;

    let raster = demosaic::reconstruct(&mosaic, &cfa, job.method, ctx)?;

    let request = EvaluationRequest {
        noise: job.evaluate_noise,
        signal: job.evaluate_signal,
    };
    let stats = if request.is_empty() {
        None
    } else {
        Some(evaluator.evaluate(&mosaic.to_f32(), &cfa.pattern, request, ctx)?)
    };
    ctx.check_abort()?;

    let output_path = job.output.resolve(path);
    let channel_paths = {
        let _slot = write_gate.map(Gate::acquire);
        io::save_rgb(&raster, &output_path)?;
        if job.save_channel_files {
            io::save_channels(&raster, &output_path)?
        } else {
            Vec::new()
        }
    };
    info!(
        source = %path.display(),
        output = %output_path.display(),
        "demosaiced"
    );

    Ok(TaskOutput {
        output_path,
        channel_paths,
        pattern: cfa.id.clone(),
        method,
        stats,
    })
}

/// Resolve the CFA pattern, honoring a configured override: a
/// 4-character string fixes the Bayer ordering, a 36-character string
/// forces an X-Trans layout.
pub fn resolve_pattern(
    job_pattern: Option<&str>,
    meta: &SourceMetadata,
) -> Result<ResolvedCfa> {
    match job_pattern.map(str::trim) {
        Some(p) if p.len() == 36 => {
            let pattern = CfaPattern::parse(p)?;
            Ok(ResolvedCfa {
                id: pattern.id(),
                pattern,
                xtrans: true,
                matrix: meta.conversion_matrix.unwrap_or(IDENTITY_MATRIX),
            })
        }
        Some(p) => resolve::resolve(Some(BayerPattern::parse(p)?), meta),
        None => resolve::resolve(None, meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_metadata() {
        let meta = SourceMetadata {
            cfa_pattern: Some("BGGR".into()),
            ..Default::default()
        };
        let r = resolve_pattern(Some("GRBG"), &meta).unwrap();
        assert_eq!(r.id, "GRBG");
        assert!(!r.xtrans);
    }

    #[test]
    fn long_override_selects_xtrans() {
        let r = resolve_pattern(
            Some("GBGGRGRGRBGBGBGGRGGRGGBGBGBRGRGRGGBG"),
            &SourceMetadata::default(),
        )
        .unwrap();
        assert!(r.xtrans);
        assert_eq!(r.matrix, IDENTITY_MATRIX);
    }
}
