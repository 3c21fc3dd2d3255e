#[allow(dead_code)]
mod common;

use demosaic_core::batch::task::process_file;
use demosaic_core::batch::JobOptions;
use demosaic_core::demosaic::Method;
use demosaic_core::evaluate::Evaluator;
use demosaic_core::io::OutputNaming;
use demosaic_core::DenoiseMode;
use tempfile::TempDir;

use common::{ctx, resolved_bayer, write_bayer_png};

fn write_source(dir: &TempDir, name: &str, h: usize, w: usize) -> std::path::PathBuf {
    let cfa = resolved_bayer("RGGB");
    let path = dir.path().join(name);
    write_bayer_png(&path, h, w, &cfa.pattern, [0.8, 0.4, 0.2]);
    path
}

#[test]
fn process_file_writes_demosaiced_output() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "light_001.png", 16, 16);

    let job = JobOptions {
        method: Method::Vng,
        pattern: Some("RGGB".to_owned()),
        ..Default::default()
    };
    let output = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None)
        .expect("process file");

    assert_eq!(output.output_path, dir.path().join("light_001_d.png"));
    assert!(output.output_path.exists());
    assert_eq!(output.pattern, "RGGB");
    assert_eq!(output.method, Method::Vng);
    assert!(output.stats.is_none());
    assert!(output.channel_paths.is_empty());

    // The written file decodes to an RGB image of the source size.
    let img = image::open(&output.output_path).unwrap();
    assert_eq!((img.width(), img.height()), (16, 16));
}

#[test]
fn sidecar_metadata_resolves_the_pattern() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 16, 16);
    std::fs::write(
        dir.path().join("frame.cfa.toml"),
        "cfa_pattern = \"BGGR\"\n",
    )
    .unwrap();

    let job = JobOptions::default();
    let output = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None)
        .expect("process file");
    assert_eq!(output.pattern, "BGGR");
}

#[test]
fn missing_pattern_fails_the_task() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 16, 16);

    let job = JobOptions::default();
    let err = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None).unwrap_err();
    assert!(
        matches!(err, demosaic_core::DemosaicError::PatternUnavailable),
        "{err}"
    );
}

#[test]
fn noise_evaluation_produces_channel_stats() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 16, 16);

    let job = JobOptions {
        pattern: Some("RGGB".to_owned()),
        evaluate_noise: true,
        ..Default::default()
    };
    let output = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None)
        .expect("process file");

    let stats = output.stats.expect("stats requested");
    assert_eq!(stats.len(), 3);
    for st in &stats {
        let noise = st.noise.as_ref().expect("noise estimate");
        // Constant per-channel input carries no noise.
        assert!(noise.sigma < 1e-4, "{}: sigma {}", st.channel, noise.sigma);
    }
}

#[test]
fn denoise_runs_before_reconstruction() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 40, 40);

    let job = JobOptions {
        pattern: Some("RGGB".to_owned()),
        denoise: DenoiseMode::Basic,
        ..Default::default()
    };
    let output = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None)
        .expect("process file");
    assert!(output.output_path.exists());
}

#[test]
fn channel_files_are_written_on_request() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 16, 16);

    let job = JobOptions {
        pattern: Some("RGGB".to_owned()),
        save_channel_files: true,
        ..Default::default()
    };
    let output = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None)
        .expect("process file");

    assert_eq!(output.channel_paths.len(), 3);
    for (path, suffix) in output.channel_paths.iter().zip(["_R", "_G", "_B"]) {
        assert!(path.exists(), "missing channel file {}", path.display());
        assert!(
            path.file_stem().unwrap().to_str().unwrap().ends_with(suffix),
            "unexpected channel name {}",
            path.display()
        );
    }
}

#[test]
fn existing_outputs_are_uniquified_without_overwrite() {
    let dir = TempDir::new().unwrap();
    let source = write_source(&dir, "frame.png", 16, 16);

    let job = JobOptions {
        pattern: Some("RGGB".to_owned()),
        output: OutputNaming {
            overwrite: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let first = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None).unwrap();
    let second = process_file(&source, &job, &Evaluator::default(), &ctx(), None, None).unwrap();

    assert_eq!(first.output_path, dir.path().join("frame_d.png"));
    assert_eq!(second.output_path, dir.path().join("frame_d_1.png"));
    assert!(second.output_path.exists());
}
