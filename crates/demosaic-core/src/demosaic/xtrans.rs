use ndarray::Array2;
use rayon::prelude::*;

use crate::cfa::{CfaPattern, Channel};
use crate::compute::ComputeContext;
use crate::consts::{XTRANS_BORDER, XTRANS_OVERLAP, XTRANS_TILE};
use crate::demosaic::lab::{compose_xyz, rgb_to_lab};
use crate::error::Result;
use crate::raster::{RgbRaster, Sample};

const TS: usize = XTRANS_TILE;
const OVERLAP: usize = XTRANS_OVERLAP;

/// Markesteijn demosaicing for 6x6 X-Trans mosaics.
///
/// The image is processed in 64x64 tiles with a 16 pixel overlap. Per
/// tile: green is interpolated along four directions from weighted hex
/// neighbor combinations clamped to local green bounds, red/blue are
/// filled at solitary green sites, at opposite-chrominance sites and in
/// 2x2 green blocks, each direction is converted to CIELab, and a
/// homogeneity map summed over 5x5 windows selects the directions
/// averaged into the result. With `passes > 1` a second set of four
/// directions recomputes green from nearer interpolated values before
/// the selection runs over all eight. The 8 pixel frame around the
/// image falls back to 3x3 neighborhood averaging.
pub fn demosaic<S: Sample>(
    raw: &Array2<S>,
    cfa: &CfaPattern,
    matrix: &[[f32; 3]; 3],
    passes: usize,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    let (height, width) = raw.dim();
    let npix = width * height;
    let input: Vec<f32> = raw.iter().map(|s| s.to_f32()).collect();

    let cfa_lut = build_cfa_lut(cfa);
    let hexes = build_hex_table(cfa);
    let xyz = compose_xyz(matrix);

    let mut bounds = vec![[0.0f32; 2]; npix];
    compute_green_bounds(&input, width, height, &cfa_lut, &hexes, &mut bounds);

    let mut planes: [Vec<f32>; 3] = std::array::from_fn(|_| vec![0.0f32; npix]);
    border_interpolate(&input, width, height, &cfa_lut, &mut planes, XTRANS_BORDER);

    // Tile origins. Interior write regions are disjoint because each
    // tile only writes rows/cols OVERLAP/2 inside its own extent and
    // the step equals TS - OVERLAP.
    let stride = TS - OVERLAP;
    let mut origins = Vec::new();
    for top in (0..height).step_by(stride) {
        for left in (0..width).step_by(stride) {
            if height - top >= 16 && width - left >= 16 {
                origins.push((top, left));
            }
        }
    }

    let patches: Vec<TilePatch> = ctx.install(|| {
        origins
            .into_par_iter()
            .map(|(top, left)| {
                if ctx.is_aborted() {
                    return TilePatch::empty();
                }
                process_tile(
                    &input, width, height, &cfa_lut, &hexes, &bounds, &xyz, passes, top, left,
                )
            })
            .collect()
    });
    ctx.check_abort()?;

    for patch in &patches {
        for (i, px) in patch.data.iter().enumerate() {
            let y = patch.y0 + i / patch.w;
            let x = patch.x0 + i % patch.w;
            let idx = y * width + x;
            planes[0][idx] = px[0];
            planes[1][idx] = px[1];
            planes[2][idx] = px[2];
        }
    }

    let mut out = RgbRaster::zeros(height, width);
    for c in 0..3 {
        let plane = out.channel_mut(c);
        for y in 0..height {
            for x in 0..width {
                plane[[y, x]] = planes[c][y * width + x];
            }
        }
    }
    Ok(out)
}

/// Result of one tile: interpolated RGB for the interior write region.
struct TilePatch {
    y0: usize,
    x0: usize,
    w: usize,
    data: Vec<[f32; 3]>,
}

impl TilePatch {
    fn empty() -> Self {
        TilePatch {
            y0: 0,
            x0: 0,
            w: 0,
            data: Vec::new(),
        }
    }
}

type CfaLut = [[u8; 6]; 6];

fn build_cfa_lut(cfa: &CfaPattern) -> CfaLut {
    let mut lut = [[0u8; 6]; 6];
    for y in 0..6 {
        for x in 0..6 {
            lut[y][x] = cfa.channel_at(x, y) as u8;
        }
    }
    lut
}

#[inline(always)]
fn cfa_color(lut: &CfaLut, y: usize, x: usize) -> u8 {
    lut[y % 6][x % 6]
}

/// Read one mosaic sample as channel `ch`: the raw value where the CFA
/// carries that channel, zero elsewhere. Matches the sparse per-channel
/// image layout the hex weights were derived for.
#[inline(always)]
fn plane_val(input: &[f32], lut: &CfaLut, width: usize, y: i32, x: i32, ch: u8) -> f32 {
    let (y, x) = (y as usize, x as usize);
    if cfa_color(lut, y, x) == ch {
        input[y * width + x]
    } else {
        0.0
    }
}

#[inline(always)]
fn sq(x: f32) -> f32 {
    x * x
}

/// Hex neighbor offsets per (row % 3, col % 3) position, as (dy, dx)
/// pairs, plus the solitary green site of the pattern (the green pixel
/// whose four orthogonal neighbors are all red or blue).
struct HexTable {
    offsets: [[[(i8, i8); 8]; 3]; 3],
    sgrow: usize,
    sgcol: usize,
}

const ORTH: [i32; 12] = [1, 0, 0, 1, -1, 0, 0, -1, 1, 0, 0, 1];
const PATT: [[i32; 16]; 2] = [
    [0, 1, 0, -1, 2, 0, -1, 0, 1, 1, 1, -1, 0, 0, 0, 0],
    [0, 1, 0, -2, 1, 0, -2, 0, 1, 1, -2, -2, 1, -1, -1, 1],
];

fn build_hex_table(cfa: &CfaPattern) -> HexTable {
    let mut table = HexTable {
        offsets: [[[(0i8, 0i8); 8]; 3]; 3],
        sgrow: 0,
        sgcol: 0,
    };

    let color_at = |y: i32, x: i32| {
        cfa.channel_at(x.rem_euclid(6) as usize, y.rem_euclid(6) as usize)
    };

    for row in 0..3i32 {
        for col in 0..3i32 {
            let g = (color_at(row, col) == Channel::Green) as usize;
            let mut ng = 0usize;
            for d in (0..10).step_by(2) {
                if color_at(row + ORTH[d], col + ORTH[d + 2]) == Channel::Green {
                    ng = 0;
                } else {
                    ng += 1;
                }
                if ng == 4 {
                    table.sgrow = row as usize;
                    table.sgcol = col as usize;
                }
                if ng == g + 1 {
                    for c in 0..8 {
                        let v = ORTH[d] * PATT[g][2 * c] + ORTH[d + 1] * PATT[g][2 * c + 1];
                        let h = ORTH[d + 2] * PATT[g][2 * c] + ORTH[d + 3] * PATT[g][2 * c + 1];
                        table.offsets[row as usize][col as usize][c ^ (g * 2 & d)] =
                            (v as i8, h as i8);
                    }
                }
            }
        }
    }
    table
}

/// Min/max of the six hex green neighbors at every non-green site;
/// candidate greens are clamped to this range.
fn compute_green_bounds(
    input: &[f32],
    width: usize,
    height: usize,
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    bounds: &mut [[f32; 2]],
) {
    for y in 2..height - 2 {
        for x in 2..width - 2 {
            let idx = y * width + x;
            let v = input[idx];
            if cfa_color(cfa_lut, y, x) == Channel::Green as u8 {
                bounds[idx] = [v, v];
                continue;
            }

            let hex = &hexes.offsets[y % 3][x % 3];
            let mut lo = f32::MAX;
            let mut hi = f32::MIN;
            let mut found = false;
            for &(dy, dx) in hex.iter().take(6) {
                let ny = y as i32 + dy as i32;
                let nx = x as i32 + dx as i32;
                if cfa_color(cfa_lut, ny as usize, nx as usize) == Channel::Green as u8 {
                    let g = input[ny as usize * width + nx as usize];
                    lo = lo.min(g);
                    hi = hi.max(g);
                    found = true;
                }
            }
            bounds[idx] = if found { [lo, hi] } else { [v, v] };
        }
    }
}

fn border_interpolate(
    input: &[f32],
    width: usize,
    height: usize,
    cfa_lut: &CfaLut,
    planes: &mut [Vec<f32>; 3],
    border: usize,
) {
    let hb = height.min(border);
    let wb = width.min(border);

    for y in (0..hb).chain(height.saturating_sub(border)..height) {
        for x in 0..width {
            interpolate_border_pixel(input, width, height, cfa_lut, planes, y, x);
        }
    }
    for y in hb..height.saturating_sub(border) {
        for x in (0..wb).chain(width.saturating_sub(border)..width) {
            interpolate_border_pixel(input, width, height, cfa_lut, planes, y, x);
        }
    }
}

#[inline]
fn interpolate_border_pixel(
    input: &[f32],
    width: usize,
    height: usize,
    cfa_lut: &CfaLut,
    planes: &mut [Vec<f32>; 3],
    y: usize,
    x: usize,
) {
    let idx = y * width + x;
    let mut rgb = [0.0f32; 3];
    let mut count = [0u32; 3];

    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            let ch = cfa_color(cfa_lut, ny, nx) as usize;
            rgb[ch] += input[ny * width + nx];
            count[ch] += 1;
        }
    }

    let native = cfa_color(cfa_lut, y, x) as usize;
    for c in 0..3 {
        planes[c][idx] = if c == native {
            input[idx]
        } else if count[c] > 0 {
            rgb[c] / count[c] as f32
        } else {
            0.0
        };
    }
}

#[allow(clippy::too_many_arguments)]
fn process_tile(
    input: &[f32],
    width: usize,
    height: usize,
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    bounds: &[[f32; 2]],
    xyz: &[[f32; 3]; 3],
    passes: usize,
    top: usize,
    left: usize,
) -> TilePatch {
    let tile_h = TS.min(height - top);
    let tile_w = TS.min(width - left);
    let tpix = tile_h * tile_w;
    let ndir = if passes > 1 { 8 } else { 4 };

    let mut rgb = vec![[0.0f32; 3]; ndir * tpix];

    green_interpolation(
        input, width, height, cfa_lut, hexes, bounds, top, left, tile_h, tile_w, &mut rgb,
    );

    for pass in 0..passes {
        let base = if pass == 0 { 0 } else { 4 };
        if pass == 1 {
            let (first, second) = rgb.split_at_mut(4 * tpix);
            second[..4 * tpix].copy_from_slice(&first[..4 * tpix]);
        }
        if pass > 0 {
            green_recalculation(
                width, cfa_lut, hexes, bounds, top, left, tile_h, tile_w, base, &mut rgb,
            );
        }
        solitary_green_rb(cfa_lut, hexes, top, left, tile_h, tile_w, base, &mut rgb);
        cross_rb(cfa_lut, hexes, top, left, tile_h, tile_w, base, &mut rgb);
        green_block_rb(hexes, top, left, tile_h, tile_w, base, ndir, &mut rgb);
    }

    select_directions(xyz, tile_h, tile_w, ndir, &rgb, top, left)
}

/// Interpolate green along four directions from weighted combinations
/// of the hex neighborhood, clamped to the precomputed local bounds.
/// The weight sets sum to 256 so the raw signal level is preserved.
#[allow(clippy::too_many_arguments)]
fn green_interpolation(
    input: &[f32],
    width: usize,
    height: usize,
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    bounds: &[[f32; 2]],
    top: usize,
    left: usize,
    tile_h: usize,
    tile_w: usize,
    rgb: &mut [[f32; 3]],
) {
    let tpix = tile_h * tile_w;
    let green = Channel::Green as u8;

    for ty in 0..tile_h {
        let iy = top + ty;
        for tx in 0..tile_w {
            let ix = left + tx;
            let ti = ty * tile_w + tx;
            let raw = input[iy * width + ix];
            let f = cfa_color(cfa_lut, iy, ix);

            // Seed the native channel in every direction buffer; the
            // other channels stay zero until the chrominance stages.
            for d in 0..4 {
                rgb[d * tpix + ti][f as usize] = raw;
            }
            if f == green {
                continue;
            }

            if iy >= 3 && iy + 3 < height && ix >= 3 && ix + 3 < width {
                let hex = &hexes.offsets[iy % 3][ix % 3];
                let sample = |k: usize, m: i32, ch: u8| {
                    let (dy, dx) = hex[k];
                    plane_val(
                        input,
                        cfa_lut,
                        width,
                        iy as i32 + m * dy as i32,
                        ix as i32 + m * dx as i32,
                        ch,
                    )
                };

                let mut color = [0.0f32; 4];
                color[0] = 174.0 * (sample(1, 1, green) + sample(0, 1, green))
                    - 46.0 * (sample(1, 2, green) + sample(0, 2, green));
                color[1] = 223.0 * sample(3, 1, green)
                    + 33.0 * sample(2, 1, green)
                    + 92.0 * (raw - sample(2, -1, f));
                for c in 0..2 {
                    color[2 + c] = 164.0 * sample(4 + c, 1, green)
                        + 92.0 * sample(4 + c, -2, green)
                        + 33.0 * (2.0 * raw - sample(4 + c, 3, f) - sample(4 + c, -3, f));
                }

                let [lo, hi] = bounds[iy * width + ix];
                let flip = ((iy as i32 - hexes.sgrow as i32).rem_euclid(3) == 0) as usize;
                for (c, value) in color.into_iter().enumerate() {
                    rgb[(c ^ flip) * tpix + ti][1] = (value / 256.0).clamp(lo, hi);
                }
            } else {
                for d in 0..4 {
                    rgb[d * tpix + ti][1] = raw;
                }
            }
        }
    }
}

/// Second-pass green: recompute each direction's green at non-green
/// sites from the nearer interpolated values of the previous pass.
#[allow(clippy::too_many_arguments)]
fn green_recalculation(
    width: usize,
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    bounds: &[[f32; 2]],
    top: usize,
    left: usize,
    tile_h: usize,
    tile_w: usize,
    base: usize,
    rgb: &mut [[f32; 3]],
) {
    let tpix = tile_h * tile_w;

    for ty in 2..tile_h - 2 {
        let iy = top + ty;
        for tx in 2..tile_w - 2 {
            let ix = left + tx;
            let f = cfa_color(cfa_lut, iy, ix);
            if f == Channel::Green as u8 {
                continue;
            }
            let ti = ty * tile_w + tx;
            let hex = &hexes.offsets[iy % 3][ix % 3];
            let flip = ((iy as i32 - hexes.sgrow as i32).rem_euclid(3) == 0) as usize;
            let [lo, hi] = bounds[iy * width + ix];

            for d in 3..6 {
                let dir = base + ((d - 2) ^ flip);
                let b = dir * tpix;
                let (dy, dx) = hex[d];
                let off = dy as i32 * tile_w as i32 + dx as i32;
                let near = (ti as i32 + off) as usize;
                let far = (ti as i32 - 2 * off) as usize;

                let f = f as usize;
                let val = rgb[b + far][1] + 2.0 * rgb[b + near][1]
                    - rgb[b + far][f]
                    - 2.0 * rgb[b + near][f]
                    + 3.0 * rgb[b + ti][f];
                rgb[b + ti][1] = (val / 3.0).clamp(lo, hi);
            }
        }
    }
}

/// Red and blue at solitary green sites: axial color-difference
/// estimates whose ties between the two axes are broken by comparing
/// second-order differences in the opposite direction.
#[allow(clippy::too_many_arguments)]
fn solitary_green_rb(
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    top: usize,
    left: usize,
    tile_h: usize,
    tile_w: usize,
    base: usize,
    rgb: &mut [[f32; 3]],
) {
    let tpix = tile_h * tile_w;
    let row0 = (top as i32 - hexes.sgrow as i32 + 4) / 3 * 3 + hexes.sgrow as i32;
    let col0 = (left as i32 - hexes.sgcol as i32 + 4) / 3 * 3 + hexes.sgcol as i32;

    let mut iy = row0;
    while iy < (top + tile_h) as i32 - 2 {
        let mut ix = col0;
        while ix < (left + tile_w) as i32 - 2 {
            let ty = (iy - top as i32) as usize;
            let tx = (ix - left as i32) as usize;
            let ti = ty * tile_w + tx;

            let mut h = cfa_color(cfa_lut, iy as usize, ix as usize + 1) as usize;
            let mut diff = [0.0f32; 6];
            let mut color = [[0.0f32; 6]; 3];
            let mut step: i32 = 1;
            let mut dirbuf = base;

            for d in 0..6 {
                let b = dirbuf * tpix;
                for c in 0..2 {
                    let off = step << c;
                    let tp = (ti as i32 + off) as usize;
                    let tm = (ti as i32 - off) as usize;
                    let g = 2.0 * rgb[b + ti][1] - rgb[b + tp][1] - rgb[b + tm][1];
                    color[h][d] = g + rgb[b + tp][h] + rgb[b + tm][h];
                    if d > 1 {
                        diff[d] += sq(rgb[b + tp][1] - rgb[b + tm][1] - rgb[b + tp][h]
                            + rgb[b + tm][h])
                            + sq(g);
                    }
                    h ^= 2;
                }
                if d > 1 && (d & 1) == 1 && diff[d - 1] < diff[d] {
                    for c in 0..2 {
                        color[c * 2][d] = color[c * 2][d - 1];
                    }
                }
                if d < 2 || (d & 1) == 1 {
                    for c in 0..2 {
                        rgb[dirbuf * tpix + ti][c * 2] = (color[c * 2][d] / 2.0).max(0.0);
                    }
                    dirbuf += 1;
                }
                step = if step == 1 { tile_w as i32 } else { 1 };
                h ^= 2;
            }
            ix += 3;
        }
        iy += 3;
    }
}

/// Red at blue sites and vice versa, guided by the smoother of the
/// pattern axis and the tripled perpendicular step.
#[allow(clippy::too_many_arguments)]
fn cross_rb(
    cfa_lut: &CfaLut,
    hexes: &HexTable,
    top: usize,
    left: usize,
    tile_h: usize,
    tile_w: usize,
    base: usize,
    rgb: &mut [[f32; 3]],
) {
    let tpix = tile_h * tile_w;

    for ty in 3..tile_h - 3 {
        let iy = top + ty;
        for tx in 3..tile_w - 3 {
            let ix = left + tx;
            let f = 2 - cfa_color(cfa_lut, iy, ix) as i32;
            if f == 1 {
                continue;
            }
            let f = f as usize;
            let ti = ty * tile_w + tx;

            let vertical = (iy as i32 - hexes.sgrow as i32).rem_euclid(3) != 0;
            let c_off: i32 = if vertical { tile_w as i32 } else { 1 };
            let h_off: i32 = if vertical { 3 } else { 3 * tile_w as i32 };
            let cbit = usize::from(!vertical);

            for d in 0..4 {
                let b = (base + d) * tpix;
                let along = d > 1 || ((d ^ cbit) & 1) == 1 || {
                    let at = |o: i32| rgb[(b as i32 + ti as i32 + o) as usize][1];
                    let center = rgb[b + ti][1];
                    (center - at(c_off)).abs() + (center - at(-c_off)).abs()
                        < 2.0 * ((center - at(h_off)).abs() + (center - at(-h_off)).abs())
                };
                let i = if along { c_off } else { h_off };
                let tp = (ti as i32 + i) as usize;
                let tm = (ti as i32 - i) as usize;
                rgb[b + ti][f] = ((rgb[b + tp][f] + rgb[b + tm][f] + 2.0 * rgb[b + ti][1]
                    - rgb[b + tp][1]
                    - rgb[b + tm][1])
                    / 2.0)
                    .max(0.0);
            }
        }
    }
}

/// Fill red and blue inside the 2x2 green blocks from the two nearest
/// hex neighbors, weighted by their distance.
#[allow(clippy::too_many_arguments)]
fn green_block_rb(
    hexes: &HexTable,
    top: usize,
    left: usize,
    tile_h: usize,
    tile_w: usize,
    base: usize,
    ndir: usize,
    rgb: &mut [[f32; 3]],
) {
    let tpix = tile_h * tile_w;

    for ty in 2..tile_h - 2 {
        let iy = top + ty;
        if (iy as i32 - hexes.sgrow as i32).rem_euclid(3) == 0 {
            continue;
        }
        for tx in 2..tile_w - 2 {
            let ix = left + tx;
            if (ix as i32 - hexes.sgcol as i32).rem_euclid(3) == 0 {
                continue;
            }
            let ti = ty * tile_w + tx;
            let hex = &hexes.offsets[iy % 3][ix % 3];

            let mut dirbuf = base;
            let mut d = 0;
            while d < ndir {
                let b = dirbuf * tpix;
                let (dy0, dx0) = hex[d];
                let (dy1, dx1) = hex[d + 1];
                let o0 = dy0 as i32 * tile_w as i32 + dx0 as i32;
                let o1 = dy1 as i32 * tile_w as i32 + dx1 as i32;
                let n0 = (ti as i32 + o0) as usize;
                let n1 = (ti as i32 + o1) as usize;

                if dy0 as i32 + dy1 as i32 != 0 || dx0 as i32 + dx1 as i32 != 0 {
                    let g = 3.0 * rgb[b + ti][1] - 2.0 * rgb[b + n0][1] - rgb[b + n1][1];
                    for c in [0usize, 2] {
                        rgb[b + ti][c] =
                            ((g + 2.0 * rgb[b + n0][c] + rgb[b + n1][c]) / 3.0).max(0.0);
                    }
                } else {
                    let g = 2.0 * rgb[b + ti][1] - rgb[b + n0][1] - rgb[b + n1][1];
                    for c in [0usize, 2] {
                        rgb[b + ti][c] = ((g + rgb[b + n0][c] + rgb[b + n1][c]) / 2.0).max(0.0);
                    }
                }
                d += 2;
                dirbuf += 1;
            }
        }
    }
}

/// Convert every direction to CIELab, build homogeneity maps from the
/// second derivatives and average the directions whose 5x5 homogeneity
/// sum reaches the leader within an eighth.
fn select_directions(
    xyz: &[[f32; 3]; 3],
    tile_h: usize,
    tile_w: usize,
    ndir: usize,
    rgb: &[[f32; 3]],
    top: usize,
    left: usize,
) -> TilePatch {
    let tpix = tile_h * tile_w;
    let mut lab = vec![[0.0f32; 3]; tpix];
    let mut drv = vec![0.0f32; ndir * tpix];
    let mut homo = vec![0u8; ndir * tpix];

    let dir_offs: [i32; 4] = [1, tile_w as i32, tile_w as i32 + 1, tile_w as i32 - 1];

    for d in 0..ndir {
        let b = d * tpix;
        for ty in 2..tile_h - 2 {
            for tx in 2..tile_w - 2 {
                let ti = ty * tile_w + tx;
                let [r, g, bl] = rgb[b + ti];
                lab[ti] = rgb_to_lab(xyz, r, g, bl);
            }
        }

        let f = dir_offs[d & 3];
        for ty in 3..tile_h - 3 {
            for tx in 3..tile_w - 3 {
                let ti = ty * tile_w + tx;
                let lc = lab[ti];
                let lp = lab[(ti as i32 + f) as usize];
                let lm = lab[(ti as i32 - f) as usize];
                let g = 2.0 * lc[0] - lp[0] - lm[0];
                drv[b + ti] = sq(g)
                    + sq(2.0 * lc[1] - lp[1] - lm[1] + g * 500.0 / 232.0)
                    + sq(2.0 * lc[2] - lp[2] - lm[2] - g * 500.0 / 580.0);
            }
        }
    }

    // Homogeneity: count, per direction, the 3x3 neighbors whose
    // derivative stays within eight times the local minimum.
    for ty in 4..tile_h - 4 {
        for tx in 4..tile_w - 4 {
            let ti = ty * tile_w + tx;
            let mut tr = f32::MAX;
            for d in 0..ndir {
                tr = tr.min(drv[d * tpix + ti]);
            }
            tr *= 8.0;
            for d in 0..ndir {
                let b = d * tpix;
                let mut votes = 0u8;
                for v in -1i32..=1 {
                    for h in -1i32..=1 {
                        let ni = (ti as i32 + v * tile_w as i32 + h) as usize;
                        if drv[b + ni] <= tr {
                            votes += 1;
                        }
                    }
                }
                homo[b + ti] = votes;
            }
        }
    }

    let margin = OVERLAP / 2;
    let y0 = top + margin;
    let x0 = left + margin;
    let patch_h = tile_h - 2 * margin;
    let patch_w = tile_w - 2 * margin;
    let mut data = vec![[0.0f32; 3]; patch_h * patch_w];

    for py in 0..patch_h {
        let ty = py + margin;
        for px in 0..patch_w {
            let tx = px + margin;
            let ti = ty * tile_w + tx;

            let mut hm = [0u32; 8];
            for (d, h) in hm.iter_mut().take(ndir).enumerate() {
                let b = d * tpix;
                for v in -2i32..=2 {
                    for hh in -2i32..=2 {
                        let ni = (ti as i32 + v * tile_w as i32 + hh) as usize;
                        *h += u32::from(homo[b + ni]);
                    }
                }
            }

            // With eight directions each refined pair competes: the
            // weaker of (d, d+4) is knocked out before the threshold.
            if ndir > 4 {
                for d in 0..4 {
                    match hm[d].cmp(&hm[d + 4]) {
                        std::cmp::Ordering::Less => hm[d] = 0,
                        std::cmp::Ordering::Greater => hm[d + 4] = 0,
                        std::cmp::Ordering::Equal => {}
                    }
                }
            }

            let max = *hm[..ndir].iter().max().unwrap_or(&0);
            let threshold = max - (max >> 3);

            let mut sum = [0.0f32; 3];
            let mut cnt = 0u32;
            for (d, &h) in hm[..ndir].iter().enumerate() {
                if h >= threshold {
                    let v = rgb[d * tpix + ti];
                    sum[0] += v[0];
                    sum[1] += v[1];
                    sum[2] += v[2];
                    cnt += 1;
                }
            }

            let inv = 1.0 / cnt as f32;
            data[py * patch_w + px] = [sum[0] * inv, sum[1] * inv, sum[2] * inv];
        }
    }

    TilePatch {
        y0,
        x0,
        w: patch_w,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfa::CfaPattern;

    const XTRANS_SAMPLE: &str = "GBGGRGRGRBGBGBGGRGGRGGBGBGBRGRGRGGBG";

    fn sample_pattern() -> CfaPattern {
        CfaPattern::parse(XTRANS_SAMPLE).unwrap()
    }

    #[test]
    fn hex_table_has_neighbors_everywhere() {
        let hexes = build_hex_table(&sample_pattern());
        for r in 0..3 {
            for c in 0..3 {
                let has = hexes.offsets[r][c].iter().any(|&(dy, dx)| dy != 0 || dx != 0);
                assert!(has, "hex offsets at [{r}][{c}] are all zeros");
            }
        }
    }

    #[test]
    fn solitary_green_site_has_no_green_orthogonal_neighbors() {
        let cfa = sample_pattern();
        let hexes = build_hex_table(&cfa);
        let (row, col) = (hexes.sgrow, hexes.sgcol);
        assert_eq!(cfa.channel_at(col, row), Channel::Green);
        for (dy, dx) in [(1i32, 0i32), (0, 1), (-1, 0), (0, -1)] {
            let ny = (row as i32 + dy).rem_euclid(6) as usize;
            let nx = (col as i32 + dx).rem_euclid(6) as usize;
            assert_ne!(
                cfa.channel_at(nx, ny),
                Channel::Green,
                "green neighbor at ({ny},{nx})"
            );
        }
    }

    #[test]
    fn hex_offsets_stay_within_reach() {
        let hexes = build_hex_table(&sample_pattern());
        for r in 0..3 {
            for c in 0..3 {
                for &(dy, dx) in &hexes.offsets[r][c] {
                    assert!(dy.abs() <= 2 && dx.abs() <= 2, "({dy},{dx}) at [{r}][{c}]");
                }
            }
        }
    }
}
