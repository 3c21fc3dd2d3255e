#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use demosaic_core::demosaic::{reconstruct, Method};
use demosaic_core::DemosaicError;

use common::{ctx, patterned_mosaic, resolved_bayer, resolved_xtrans, uniform_mosaic};

// ---------------------------------------------------------------------------
// SuperPixel
// ---------------------------------------------------------------------------

#[test]
fn superpixel_halves_dimensions_and_keeps_values() {
    let cfa = resolved_bayer("RGGB");
    // Odd sizes floor to half.
    let mosaic = patterned_mosaic(9, 11, &cfa.pattern, [0.8, 0.4, 0.2]);

    let out = reconstruct(&mosaic, &cfa, Method::SuperPixel, &ctx()).expect("superpixel");
    assert_eq!((out.height(), out.width()), (4, 5));

    for row in 0..4 {
        for col in 0..5 {
            assert_abs_diff_eq!(out.red[[row, col]], 0.8, epsilon = 1e-6);
            assert_abs_diff_eq!(out.green[[row, col]], 0.4, epsilon = 1e-6);
            assert_abs_diff_eq!(out.blue[[row, col]], 0.2, epsilon = 1e-6);
        }
    }
}

#[test]
fn superpixel_averages_unequal_greens() {
    let cfa = resolved_bayer("RGGB");
    let mut mosaic = patterned_mosaic(6, 6, &cfa.pattern, [0.8, 0.0, 0.2]);
    // Greens in the top-left cell: 0.2 at (0,1) and 0.6 at (1,0).
    if let demosaic_core::MosaicData::F32(a) = &mut mosaic.data {
        a[[0, 1]] = 0.2;
        a[[1, 0]] = 0.6;
    }

    let out = reconstruct(&mosaic, &cfa, Method::SuperPixel, &ctx()).expect("superpixel");
    assert_abs_diff_eq!(out.green[[0, 0]], 0.4, epsilon = 1e-6);
}

// ---------------------------------------------------------------------------
// Bilinear
// ---------------------------------------------------------------------------

#[test]
fn bilinear_uniform_stays_flat() {
    let cfa = resolved_bayer("RGGB");
    let mosaic = uniform_mosaic(16, 16, 0.5);

    let out = reconstruct(&mosaic, &cfa, Method::Bilinear, &ctx()).expect("bilinear");
    for row in 1..15 {
        for col in 1..15 {
            for c in 0..3 {
                let v = out.channel(c)[[row, col]];
                assert!(
                    (v - 0.5).abs() < 1e-4,
                    "channel {c} at [{row},{col}] = {v}"
                );
            }
        }
    }
}

#[test]
fn bilinear_reproduces_constant_channels() {
    for id in ["RGGB", "BGGR", "GRBG", "GBRG"] {
        let cfa = resolved_bayer(id);
        let mosaic = patterned_mosaic(12, 12, &cfa.pattern, [0.9, 0.5, 0.1]);

        let out = reconstruct(&mosaic, &cfa, Method::Bilinear, &ctx()).expect("bilinear");
        for row in 1..11 {
            for col in 1..11 {
                assert!(
                    (out.red[[row, col]] - 0.9).abs() < 1e-4,
                    "{id}: red[{row},{col}] = {}",
                    out.red[[row, col]]
                );
                assert!(
                    (out.green[[row, col]] - 0.5).abs() < 1e-4,
                    "{id}: green[{row},{col}] = {}",
                    out.green[[row, col]]
                );
                assert!(
                    (out.blue[[row, col]] - 0.1).abs() < 1e-4,
                    "{id}: blue[{row},{col}] = {}",
                    out.blue[[row, col]]
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// VNG
// ---------------------------------------------------------------------------

#[test]
fn vng_uniform_stays_flat() {
    let cfa = resolved_bayer("RGGB");
    let mosaic = uniform_mosaic(16, 16, 0.5);

    let out = reconstruct(&mosaic, &cfa, Method::Vng, &ctx()).expect("vng");
    // Borders are copied from interior pixels, so the whole frame is flat.
    for row in 0..16 {
        for col in 0..16 {
            for c in 0..3 {
                let v = out.channel(c)[[row, col]];
                assert!(
                    (v - 0.5).abs() < 1e-4,
                    "channel {c} at [{row},{col}] = {v}"
                );
            }
        }
    }
}

#[test]
fn vng_reproduces_constant_channels() {
    for id in ["RGGB", "GRBG"] {
        let cfa = resolved_bayer(id);
        let mosaic = patterned_mosaic(16, 16, &cfa.pattern, [0.8, 0.4, 0.2]);

        let out = reconstruct(&mosaic, &cfa, Method::Vng, &ctx()).expect("vng");
        for row in 2..14 {
            for col in 2..14 {
                assert!(
                    (out.red[[row, col]] - 0.8).abs() < 1e-4,
                    "{id}: red[{row},{col}] = {}",
                    out.red[[row, col]]
                );
                assert!(
                    (out.green[[row, col]] - 0.4).abs() < 1e-4,
                    "{id}: green[{row},{col}] = {}",
                    out.green[[row, col]]
                );
                assert!(
                    (out.blue[[row, col]] - 0.2).abs() < 1e-4,
                    "{id}: blue[{row},{col}] = {}",
                    out.blue[[row, col]]
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// X-Trans
// ---------------------------------------------------------------------------

#[test]
fn xtrans_uniform_stays_flat() {
    let cfa = resolved_xtrans();
    let mosaic = uniform_mosaic(72, 72, 0.5);

    let out = reconstruct(&mosaic, &cfa, Method::XTrans, &ctx()).expect("x-trans");
    for row in 0..72 {
        for col in 0..72 {
            for c in 0..3 {
                let v = out.channel(c)[[row, col]];
                assert!(
                    (v - 0.5).abs() < 1e-3,
                    "channel {c} at [{row},{col}] = {v}"
                );
            }
        }
    }
}

#[test]
fn xtrans_reproduces_constant_channels() {
    let cfa = resolved_xtrans();
    let mosaic = patterned_mosaic(72, 72, &cfa.pattern, [0.8, 0.4, 0.2]);

    let out = reconstruct(&mosaic, &cfa, Method::XTrans, &ctx()).expect("x-trans");
    for row in 8..64 {
        for col in 8..64 {
            assert!(
                (out.red[[row, col]] - 0.8).abs() < 2e-2,
                "red[{row},{col}] = {}",
                out.red[[row, col]]
            );
            assert!(
                (out.green[[row, col]] - 0.4).abs() < 2e-2,
                "green[{row},{col}] = {}",
                out.green[[row, col]]
            );
            assert!(
                (out.blue[[row, col]] - 0.2).abs() < 2e-2,
                "blue[{row},{col}] = {}",
                out.blue[[row, col]]
            );
        }
    }
}

#[test]
fn xtrans_gradient_stays_within_signal_range() {
    use demosaic_core::{Mosaic, MosaicData};
    use ndarray::Array2;

    let cfa = resolved_xtrans();
    // Smooth luminance ramp; the direction selection must not push any
    // reconstructed channel outside the signal range.
    let raw = Array2::from_shape_fn((72, 72), |(_, col)| 0.2 + 0.6 * col as f32 / 71.0);
    let mosaic = Mosaic::new(MosaicData::F32(raw));

    let out = reconstruct(&mosaic, &cfa, Method::XTrans, &ctx()).expect("x-trans");
    for row in 8..64 {
        for col in 8..64 {
            for c in 0..3 {
                let v = out.channel(c)[[row, col]];
                assert!(v.is_finite(), "channel {c} at [{row},{col}] is {v}");
                assert!(
                    (0.1..=0.9).contains(&v),
                    "channel {c} at [{row},{col}] = {v}"
                );
            }
        }
    }
}

#[test]
fn xtrans_path_is_forced_for_xtrans_sources() {
    // Any configured Bayer method falls through to X-Trans when the
    // resolved pattern is a 6x6 layout.
    let cfa = resolved_xtrans();
    let mosaic = uniform_mosaic(72, 72, 0.25);
    let out = reconstruct(&mosaic, &cfa, Method::Bilinear, &ctx()).expect("x-trans fallback");
    assert_abs_diff_eq!(out.green[[36, 36]], 0.25, epsilon = 1e-3);
}

// ---------------------------------------------------------------------------
// Geometry checks
// ---------------------------------------------------------------------------

#[test]
fn undersized_bayer_mosaic_is_rejected() {
    let cfa = resolved_bayer("RGGB");
    let mosaic = uniform_mosaic(4, 4, 0.5);
    let err = reconstruct(&mosaic, &cfa, Method::Vng, &ctx()).unwrap_err();
    assert!(matches!(err, DemosaicError::ImageTooSmall { .. }), "{err}");
}

#[test]
fn undersized_xtrans_mosaic_is_rejected() {
    let cfa = resolved_xtrans();
    let mosaic = uniform_mosaic(48, 48, 0.5);
    let err = reconstruct(&mosaic, &cfa, Method::XTrans, &ctx()).unwrap_err();
    assert!(matches!(err, DemosaicError::ImageTooSmall { .. }), "{err}");
}

#[test]
fn xtrans_method_on_bayer_source_is_rejected() {
    let cfa = resolved_bayer("RGGB");
    let mosaic = uniform_mosaic(72, 72, 0.5);
    let err = reconstruct(&mosaic, &cfa, Method::XTrans, &ctx()).unwrap_err();
    assert!(matches!(err, DemosaicError::InvalidConfig(_)), "{err}");
}
