use ndarray::Array2;
use rayon::prelude::*;

use crate::cfa::{CfaPattern, Channel};
use crate::compute::ComputeContext;
use crate::error::Result;
use crate::raster::{RgbRaster, Sample};

/// Positions of the four channel samples within one 2x2 cell, as
/// (dx, dy) offsets from the cell origin. Greens in row-major order.
struct CellLayout {
    red: (usize, usize),
    green1: (usize, usize),
    green2: (usize, usize),
    blue: (usize, usize),
}

fn cell_layout(cfa: &CfaPattern) -> CellLayout {
    let mut red = (0, 0);
    let mut blue = (0, 0);
    let mut greens = [(0, 0); 2];
    let mut ng = 0;
    for y in 0..2 {
        for x in 0..2 {
            match cfa.channel_at(x, y) {
                Channel::Red => red = (x, y),
                Channel::Blue => blue = (x, y),
                Channel::Green => {
                    greens[ng] = (x, y);
                    ng += 1;
                }
            }
        }
    }
    CellLayout {
        red,
        green1: greens[0],
        green2: greens[1],
        blue,
    }
}

/// SuperPixel demosaicing: each 2x2 cell collapses to one output
/// pixel. Red and blue are taken verbatim, green is the mean of the
/// two green samples. Output dimensions are halved (floor).
pub fn demosaic<S: Sample>(
    raw: &Array2<S>,
    cfa: &CfaPattern,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    let (h, w) = raw.dim();
    let out_h = h >> 1;
    let out_w = w >> 1;
    let layout = cell_layout(cfa);

    let rows: Vec<[Vec<f32>; 3]> = ctx.install(|| {
        (0..out_h)
            .into_par_iter()
            .map(|row| {
                let mut r = vec![0.0f32; out_w];
                let mut g = vec![0.0f32; out_w];
                let mut b = vec![0.0f32; out_w];
                if ctx.is_aborted() {
                    return [r, g, b];
                }
                let y2 = row << 1;
                for col in 0..out_w {
                    let x2 = col << 1;
                    r[col] = raw[[y2 + layout.red.1, x2 + layout.red.0]].to_f32();
                    let g1 = raw[[y2 + layout.green1.1, x2 + layout.green1.0]].to_f32();
                    let g2 = raw[[y2 + layout.green2.1, x2 + layout.green2.0]].to_f32();
                    g[col] = 0.5 * (g1 + g2);
                    b[col] = raw[[y2 + layout.blue.1, x2 + layout.blue.0]].to_f32();
                }
                [r, g, b]
            })
            .collect()
    });
    ctx.check_abort()?;

    let mut out = RgbRaster::zeros(out_h, out_w);
    for (row, [r, g, b]) in rows.into_iter().enumerate() {
        for col in 0..out_w {
            out.red[[row, col]] = r[col];
            out.green[[row, col]] = g[col];
            out.blue[[row, col]] = b[col];
        }
    }
    Ok(out)
}
