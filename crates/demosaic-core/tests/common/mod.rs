use std::path::Path;

use image::Luma;
use ndarray::Array2;

use demosaic_core::{BayerPattern, CfaPattern, ComputeContext, Mosaic, MosaicData, ResolvedCfa};

pub const XTRANS_PATTERN: &str = "GBGGRGRGRBGBGBGGRGGRGGBGBGBRGRGRGGBG";

/// Compute context with a small fixed pool; tests never need more.
pub fn ctx() -> ComputeContext {
    ComputeContext::new(2).expect("create compute context")
}

/// Build a uniform f32 mosaic where every pixel has the same value.
pub fn uniform_mosaic(h: usize, w: usize, value: f32) -> Mosaic {
    Mosaic::new(MosaicData::F32(Array2::from_elem((h, w), value)))
}

/// Build an f32 mosaic where every CFA site carries its channel's
/// constant value.
pub fn patterned_mosaic(h: usize, w: usize, cfa: &CfaPattern, rgb: [f32; 3]) -> Mosaic {
    let mut raw = Array2::<f32>::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            raw[[row, col]] = rgb[cfa.channel_at(col, row) as usize];
        }
    }
    Mosaic::new(MosaicData::F32(raw))
}

/// Resolved CFA for a fixed Bayer pattern id.
pub fn resolved_bayer(id: &str) -> ResolvedCfa {
    let bayer = BayerPattern::parse(id).expect("valid Bayer id");
    demosaic_core::resolve::resolve(Some(bayer), &Default::default()).expect("resolve")
}

/// Resolved CFA for the sample X-Trans layout, identity matrix.
pub fn resolved_xtrans() -> ResolvedCfa {
    demosaic_core::batch::task::resolve_pattern(Some(XTRANS_PATTERN), &Default::default())
        .expect("resolve")
}

/// Write a 16-bit grayscale PNG with the given per-channel constants
/// laid out on the CFA grid. Values are in [0, 1].
pub fn write_bayer_png(path: &Path, h: usize, w: usize, cfa: &CfaPattern, rgb: [f32; 3]) {
    let mut img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::new(w as u32, h as u32);
    for (x, y, px) in img.enumerate_pixels_mut() {
        let v = rgb[cfa.channel_at(x as usize, y as usize) as usize];
        *px = Luma([(v.clamp(0.0, 1.0) * 65535.0) as u16]);
    }
    img.save(path).expect("write test mosaic");
}
