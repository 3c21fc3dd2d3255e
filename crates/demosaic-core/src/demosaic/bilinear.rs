use ndarray::Array2;
use rayon::prelude::*;

use crate::cfa::{CfaPattern, Channel};
use crate::compute::ComputeContext;
use crate::error::Result;
use crate::raster::{RgbRaster, Sample};

/// Bilinear demosaicing.
///
/// Interior pixels interpolate the two missing channels from their
/// cardinal or diagonal neighbors; the one-pixel border is copied from
/// the adjacent interior row/column afterwards.
pub fn demosaic<S: Sample>(
    raw: &Array2<S>,
    cfa: &CfaPattern,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    let (h, w) = raw.dim();

    let rows: Vec<[Vec<f32>; 3]> = ctx.install(|| {
        (1..h - 1)
            .into_par_iter()
            .map(|row| {
                if ctx.is_aborted() {
                    return [vec![0.0; w], vec![0.0; w], vec![0.0; w]];
                }
                interpolate_row(raw, cfa, row, w)
            })
            .collect()
    });
    ctx.check_abort()?;

    let mut out = RgbRaster::zeros(h, w);
    for (i, [r, g, b]) in rows.into_iter().enumerate() {
        let row = i + 1;
        for col in 0..w {
            out.red[[row, col]] = r[col];
            out.green[[row, col]] = g[col];
            out.blue[[row, col]] = b[col];
        }
    }

    // Top and bottom rows from the adjacent interior rows.
    for col in 0..w {
        for c in 0..3 {
            let plane = out.channel_mut(c);
            plane[[0, col]] = plane[[1, col]];
            plane[[h - 1, col]] = plane[[h - 2, col]];
        }
    }
    Ok(out)
}

fn interpolate_row<S: Sample>(
    raw: &Array2<S>,
    cfa: &CfaPattern,
    row: usize,
    w: usize,
) -> [Vec<f32>; 3] {
    let mut out = [vec![0.0f32; w], vec![0.0f32; w], vec![0.0f32; w]];
    let px = |y: usize, x: usize| raw[[y, x]].to_f32();

    for col in 1..w - 1 {
        let current = cfa.channel_at(col, row);
        let mut target = [0.0f32; 3];
        target[current as usize] = px(row, col);

        match current {
            Channel::Red | Channel::Blue => {
                // Green from the four cardinal neighbors.
                target[Channel::Green as usize] = 0.25
                    * (px(row - 1, col) + px(row + 1, col) + px(row, col - 1) + px(row, col + 1));
                // The opposite channel from the four diagonals.
                let other = 2 - current as usize;
                target[other] = 0.25
                    * (px(row - 1, col - 1)
                        + px(row + 1, col + 1)
                        + px(row + 1, col - 1)
                        + px(row - 1, col + 1));
            }
            Channel::Green => {
                // The horizontal neighbors carry this row's non-green
                // channel, the vertical pair carries the other one.
                let next = cfa.channel_at(col + 1, row) as usize;
                let vertical = 0.5 * (px(row - 1, col) + px(row + 1, col));
                let horizontal = 0.5 * (px(row, col - 1) + px(row, col + 1));
                target[next] = horizontal;
                target[2 - next] = vertical;
            }
        }

        for c in 0..3 {
            out[c][col] = target[c];
        }
    }

    // First and last columns from their interior neighbors.
    for c in 0..3 {
        out[c][0] = out[c][1];
        out[c][w - 1] = out[c][w - 2];
    }
    out
}
