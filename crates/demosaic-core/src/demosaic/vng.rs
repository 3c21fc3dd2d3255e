use ndarray::Array2;
use rayon::prelude::*;

use crate::cfa::{CfaPattern, Channel};
use crate::compute::ComputeContext;
use crate::consts::{VNG_K1, VNG_K2, VNG_THRESHOLD_EPSILON};
use crate::error::Result;
use crate::raster::{RgbRaster, Sample};

// Gradient direction order: N, E, S, W, NE, SE, NW, SW.

/// 5x5 window indices contributing to each direction's color sum when
/// the center pixel is green.
const GREEN_CENTER_INDICES: [[i8; 8]; 8] = [
    [1, 2, 3, 7, 11, 12, 13, -1],
    [7, 9, 12, 13, 14, 17, 19, -1],
    [11, 12, 13, 17, 21, 22, 23, -1],
    [5, 7, 10, 11, 12, 15, 17, -1],
    [3, 7, 8, 9, 13, -1, -1, -1],
    [13, 17, 18, 19, 23, -1, -1, -1],
    [1, 5, 6, 7, 11, -1, -1, -1],
    [11, 15, 16, 17, 21, -1, -1, -1],
];

/// 5x5 window indices per direction when the center pixel is red or
/// blue.
const OTHER_CENTER_INDICES: [[i8; 8]; 8] = [
    [2, 6, 7, 8, 12, -1, -1, -1],
    [8, 12, 13, 14, 18, -1, -1, -1],
    [12, 16, 17, 18, 22, -1, -1, -1],
    [6, 10, 11, 12, 16, -1, -1, -1],
    [3, 4, 7, 8, 9, 12, 13, -1],
    [12, 13, 17, 18, 19, 23, 24, -1],
    [0, 1, 5, 6, 7, 11, 12, -1],
    [11, 12, 15, 16, 17, 20, 21, -1],
];

/// Variable Number of Gradients demosaicing.
///
/// For every interior pixel, gradients in eight directions are
/// computed over a cached 5x5 window; directions below an adaptive
/// threshold contribute averaged color sums, and the missing channels
/// are reconstructed from normalized color differences. The two-pixel
/// border is copied from the nearest interior row/column.
pub fn demosaic<S: Sample>(
    raw: &Array2<S>,
    cfa: &CfaPattern,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    let (h, w) = raw.dim();

    let rows: Vec<[Vec<f32>; 3]> = ctx.install(|| {
        (2..h - 2)
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
        let row = i + 2;
        for col in 0..w {
            out.red[[row, col]] = r[col];
            out.green[[row, col]] = g[col];
            out.blue[[row, col]] = b[col];
        }
    }

    // Top and bottom two rows from the nearest computed row.
    for col in 0..w {
        for c in 0..3 {
            let plane = out.channel_mut(c);
            let top = plane[[2, col]];
            plane[[0, col]] = top;
            plane[[1, col]] = top;
            let bottom = plane[[h - 3, col]];
            plane[[h - 1, col]] = bottom;
            plane[[h - 2, col]] = bottom;
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

    // 5x5 window cache, shifted one column per step.
    let mut v = [0.0f64; 25];
    let mut channels = [0usize; 25];

    for col in 2..w - 2 {
        if col == 2 {
            for y in 0..5 {
                for x in 0..5 {
                    let r = row + y - 2;
                    let c = col + x - 2;
                    channels[y * 5 + x] = cfa.channel_at(c, r) as usize;
                    v[y * 5 + x] = raw[[r, c]].to_f32() as f64;
                }
            }
        } else {
            for y in 0..5 {
                for x in 0..4 {
                    channels[y * 5 + x] = channels[y * 5 + x + 1];
                    v[y * 5 + x] = v[y * 5 + x + 1];
                }
                let r = row + y - 2;
                let c = col + 2;
                channels[y * 5 + 4] = cfa.channel_at(c, r) as usize;
                v[y * 5 + 4] = raw[[r, c]].to_f32() as f64;
            }
        }

        let current = cfa.channel_at(col, row);
        let gradients = compute_gradients(&v, current);
        let (valid, count) = threshold_gradients(&gradients);
        let sums = compute_sums(&v, &channels, &valid, count, current);

        let current = current as usize;
        let (other1, other2) = match current {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };

        let diff1 = (sums[other1] - sums[current]) / count as f64;
        let diff2 = (sums[other2] - sums[current]) / count as f64;

        out[current][col] = v[12] as f32;
        out[other1][col] = (v[12] + diff1).clamp(0.0, 1.0) as f32;
        out[other2][col] = (v[12] + diff2).clamp(0.0, 1.0) as f32;
    }

    // Outer two columns from the nearest computed column.
    for c in 0..3 {
        out[c][0] = out[c][2];
        out[c][1] = out[c][2];
        out[c][w - 1] = out[c][w - 3];
        out[c][w - 2] = out[c][w - 3];
    }
    out
}

/// Gradients in the eight compass directions around the window center.
/// The diagonal formulas differ between green and non-green centers.
fn compute_gradients(v: &[f64; 25], current: Channel) -> [f64; 8] {
    let mut g = [0.0f64; 8];

    // N, E, S, W are the same for every center color.
    g[0] = (v[7] - v[17]).abs()
        + (v[2] - v[12]).abs()
        + (v[6] - v[16]).abs() / 2.0
        + (v[8] - v[18]).abs() / 2.0
        + (v[1] - v[11]).abs() / 2.0
        + (v[3] - v[13]).abs() / 2.0;
    g[1] = (v[13] - v[11]).abs()
        + (v[14] - v[12]).abs()
        + (v[8] - v[6]).abs() / 2.0
        + (v[18] - v[16]).abs() / 2.0
        + (v[9] - v[7]).abs() / 2.0
        + (v[19] - v[17]).abs() / 2.0;
    g[2] = (v[17] - v[7]).abs()
        + (v[22] - v[12]).abs()
        + (v[16] - v[6]).abs() / 2.0
        + (v[18] - v[8]).abs() / 2.0
        + (v[21] - v[11]).abs() / 2.0
        + (v[23] - v[13]).abs() / 2.0;
    g[3] = (v[11] - v[13]).abs()
        + (v[10] - v[12]).abs()
        + (v[6] - v[8]).abs() / 2.0
        + (v[16] - v[18]).abs() / 2.0
        + (v[5] - v[7]).abs() / 2.0
        + (v[15] - v[17]).abs() / 2.0;

    match current {
        Channel::Green => {
            g[4] = (v[8] - v[16]).abs()
                + (v[4] - v[12]).abs()
                + (v[3] - v[11]).abs()
                + (v[9] - v[17]).abs();
            g[5] = (v[18] - v[6]).abs()
                + (v[24] - v[12]).abs()
                + (v[23] - v[11]).abs()
                + (v[19] - v[7]).abs();
            g[6] = (v[6] - v[18]).abs()
                + (v[0] - v[12]).abs()
                + (v[1] - v[13]).abs()
                + (v[5] - v[17]).abs();
            g[7] = (v[16] - v[8]).abs()
                + (v[20] - v[12]).abs()
                + (v[21] - v[13]).abs()
                + (v[15] - v[7]).abs();
        }
        Channel::Red | Channel::Blue => {
            g[4] = (v[8] - v[16]).abs()
                + (v[4] - v[12]).abs()
                + (v[7] - v[11]).abs() / 2.0
                + (v[13] - v[17]).abs() / 2.0
                + (v[3] - v[7]).abs() / 2.0
                + (v[9] - v[13]).abs() / 2.0;
            g[5] = (v[18] - v[6]).abs()
                + (v[24] - v[12]).abs()
                + (v[13] - v[7]).abs() / 2.0
                + (v[17] - v[11]).abs() / 2.0
                + (v[19] - v[13]).abs()
                + (v[23] - v[17]).abs() / 2.0;
            g[6] = (v[6] - v[18]).abs()
                + (v[0] - v[12]).abs()
                + (v[7] - v[13]).abs() / 2.0
                + (v[11] - v[17]).abs() / 2.0
                + (v[1] - v[7]).abs() / 2.0
                + (v[5] - v[11]).abs() / 2.0;
            g[7] = (v[16] - v[8]).abs()
                + (v[20] - v[12]).abs()
                + (v[11] - v[7]).abs() / 2.0
                + (v[17] - v[13]).abs() / 2.0
                + (v[15] - v[11]).abs()
                + (v[21] - v[17]).abs() / 2.0;
        }
    }
    g
}

/// Keep the directions whose gradient is at most
/// k1*min + k2*(max - min), with a small slack for rounding.
fn threshold_gradients(gradients: &[f64; 8]) -> ([usize; 8], usize) {
    let mut min = gradients[0];
    let mut max = gradients[0];
    for &g in &gradients[1..] {
        min = min.min(g);
        max = max.max(g);
    }
    let threshold = VNG_K1 * min + VNG_K2 * (max - min);

    let mut valid = [0usize; 8];
    let mut count = 0;
    for (i, &g) in gradients.iter().enumerate() {
        if g <= threshold + VNG_THRESHOLD_EPSILON {
            valid[count] = i;
            count += 1;
        }
    }
    (valid, count)
}

/// Per-channel sums of averaged window colors over the valid
/// directions.
fn compute_sums(
    v: &[f64; 25],
    channels: &[usize; 25],
    valid: &[usize; 8],
    count: usize,
    current: Channel,
) -> [f64; 3] {
    let index_table = if current == Channel::Green {
        &GREEN_CENTER_INDICES
    } else {
        &OTHER_CENTER_INDICES
    };

    let mut sums = [0.0f64; 3];
    for &grad in &valid[..count] {
        let mut partial_sums = [0.0f64; 3];
        let mut partial_counts = [0usize; 3];
        for &index in &index_table[grad] {
            if index < 0 {
                break;
            }
            let index = index as usize;
            let channel = channels[index];
            partial_sums[channel] += v[index];
            partial_counts[channel] += 1;
        }
        for channel in 0..3 {
            if partial_counts[channel] > 0 {
                sums[channel] += partial_sums[channel] / partial_counts[channel] as f64;
            }
        }
    }
    sums
}
