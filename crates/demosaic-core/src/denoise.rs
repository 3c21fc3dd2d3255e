//! FBDD noise reduction applied to the mosaic before demosaicing.
//!
//! After Jacek Gozdz and Luis Sanz Rodriguez. The filter works on a
//! three-channel working image holding each CFA sample in its native
//! channel slot, smooths green with direction-weighted gradients,
//! rebuilds chrominance with DCB-style weighted interpolation and
//! clamps everything against local neighborhoods. Only the native
//! channel of each site is written back.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cfa::CfaPattern;
use crate::consts::MIN_DENOISE_SIZE;
use crate::error::Result;
use crate::raster::{Mosaic, MosaicData};

/// Strength of the pre-demosaicing denoise step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenoiseMode {
    /// No filtering.
    #[default]
    Off,
    /// Green smoothing, chroma rebuild and local clamping.
    Basic,
    /// Basic plus a chroma impulse suppression round in an opponent
    /// color space.
    Full,
}

impl std::fmt::Display for DenoiseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Basic => write!(f, "basic"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// The filter's gradient weights were tuned for 16-bit integer data,
/// so the working image is scaled to this range and back.
const SCALE: f32 = 65535.0;

/// Apply FBDD denoising to a Bayer mosaic.
///
/// Returns `None` when the mode is [`DenoiseMode::Off`], when the
/// mosaic is not a 2x2 Bayer pattern, or when it is too small for the
/// filter's margins; the caller then demosaics the original data.
pub fn denoise(mosaic: &Mosaic, cfa: &CfaPattern, mode: DenoiseMode) -> Result<Option<Mosaic>> {
    if mode == DenoiseMode::Off {
        return Ok(None);
    }
    if cfa.size() != 2 {
        warn!("noise reduction is only available for Bayer mosaics, skipping");
        return Ok(None);
    }
    let (h, w) = (mosaic.height(), mosaic.width());
    if w < MIN_DENOISE_SIZE || h < MIN_DENOISE_SIZE {
        warn!(
            width = w,
            height = h,
            "mosaic too small for noise reduction, skipping"
        );
        return Ok(None);
    }

    let raw = mosaic.to_f32();
    let mut engine = Engine::new(&raw, cfa);
    engine.run(mode == DenoiseMode::Full);
    Ok(Some(Mosaic {
        data: MosaicData::F32(engine.into_mosaic()),
    }))
}

struct Engine {
    /// Interleaved RGB working image, native CFA samples pre-filled.
    image: Vec<[f32; 3]>,
    width: usize,
    height: usize,
    /// Channel per (row % 2, col % 2).
    color: [[usize; 2]; 2],
}

impl Engine {
    fn new(raw: &Array2<f32>, cfa: &CfaPattern) -> Self {
        let (height, width) = raw.dim();
        let mut color = [[0usize; 2]; 2];
        for (y, row) in color.iter_mut().enumerate() {
            for (x, c) in row.iter_mut().enumerate() {
                *c = cfa.channel_at(x, y) as usize;
            }
        }

        let mut image = vec![[0.0f32; 3]; width * height];
        for row in 0..height {
            for col in 0..width {
                let c = color[row % 2][col % 2];
                image[row * width + col][c] = raw[[row, col]] * SCALE;
            }
        }
        Engine {
            image,
            width,
            height,
            color,
        }
    }

    fn into_mosaic(self) -> Array2<f32> {
        let mut out = Array2::zeros((self.height, self.width));
        for row in 0..self.height {
            for col in 0..self.width {
                let c = self.color[row % 2][col % 2];
                out[[row, col]] = self.image[row * self.width + col][c] / SCALE;
            }
        }
        out
    }

    #[inline]
    fn filter_color(&self, row: usize, col: usize) -> usize {
        self.color[row % 2][col % 2]
    }

    fn run(&mut self, full: bool) {
        self.interpolate_border(4);
        self.green_pass();
        self.chroma_pass();
        self.correction_pass();

        if full {
            self.dcb_color();
            let mut lch = self.rgb_to_lch();
            self.chroma_impulse_pass(&mut lch);
            self.chroma_impulse_pass(&mut lch);
            self.lch_to_rgb(&lch);
        }
    }

    /// Fill the missing channels in the outer frame with 3x3
    /// same-channel averages.
    fn interpolate_border(&mut self, border: usize) {
        let (h, w) = (self.height, self.width);
        for row in 0..h {
            let mut col = 0;
            while col < w {
                if col == border && row >= border && row < h - border {
                    col = w - border;
                }
                let mut sum = [0.0f64; 3];
                let mut count = [0u32; 3];
                for y in row.saturating_sub(1)..=(row + 1).min(h - 1) {
                    for x in col.saturating_sub(1)..=(x_hi(col, w)) {
                        let f = self.filter_color(y, x);
                        sum[f] += self.image[y * w + x][f] as f64;
                        count[f] += 1;
                    }
                }
                let f = self.filter_color(row, col);
                for c in 0..3 {
                    if c != f && count[c] > 0 {
                        self.image[row * w + col][c] = (sum[c] / count[c] as f64) as f32;
                    }
                }
                col += 1;
            }
        }
    }

    /// Directionally weighted green smoothing at red/blue sites.
    fn green_pass(&mut self) {
        let u = self.width;
        let (v, w3, x, y) = (2 * u, 3 * u, 4 * u, 5 * u);
        let img = &mut self.image;

        for row in 5..self.height - 5 {
            let start = 5 + (self.color[row % 2][1] & 1);
            let c = self.color[row % 2][start % 2];
            let mut col = start;
            while col < u - 5 {
                let i = row * u + col;

                let f = [
                    1.0 / (1.0
                        + (img[i - u][1] - img[i - w3][1]).abs()
                        + (img[i - w3][1] - img[i + y][1]).abs()),
                    1.0 / (1.0
                        + (img[i + 1][1] - img[i + 3][1]).abs()
                        + (img[i + 3][1] - img[i - 5][1]).abs()),
                    1.0 / (1.0
                        + (img[i - 1][1] - img[i - 3][1]).abs()
                        + (img[i - 3][1] - img[i + 5][1]).abs()),
                    1.0 / (1.0
                        + (img[i + u][1] - img[i + w3][1]).abs()
                        + (img[i + w3][1] - img[i - y][1]).abs()),
                ];

                let g = [
                    clip(
                        (23.0 * img[i - u][1]
                            + 23.0 * img[i - w3][1]
                            + 2.0 * img[i - y][1]
                            + 8.0 * (img[i - v][c] - img[i - x][c])
                            + 40.0 * (img[i][c] - img[i - v][c]))
                            / 48.0,
                    ),
                    clip(
                        (23.0 * img[i + 1][1]
                            + 23.0 * img[i + 3][1]
                            + 2.0 * img[i + 5][1]
                            + 8.0 * (img[i + 2][c] - img[i + 4][c])
                            + 40.0 * (img[i][c] - img[i + 2][c]))
                            / 48.0,
                    ),
                    clip(
                        (23.0 * img[i - 1][1]
                            + 23.0 * img[i - 3][1]
                            + 2.0 * img[i - 5][1]
                            + 8.0 * (img[i - 2][c] - img[i - 4][c])
                            + 40.0 * (img[i][c] - img[i - 2][c]))
                            / 48.0,
                    ),
                    clip(
                        (23.0 * img[i + u][1]
                            + 23.0 * img[i + w3][1]
                            + 2.0 * img[i + y][1]
                            + 8.0 * (img[i + v][c] - img[i + x][c])
                            + 40.0 * (img[i][c] - img[i + v][c]))
                            / 48.0,
                    ),
                ];

                img[i][1] = clip(
                    (f[0] * g[0] + f[1] * g[1] + f[2] * g[2] + f[3] * g[3])
                        / (f[0] + f[1] + f[2] + f[3]),
                );

                let (lo, hi) = ring_min_max(img, i, u, 1);
                img[i][1] = limit(img[i][1], lo, hi);

                col += 2;
            }
        }
    }

    /// DCB-style chroma reconstruction: chroma at native sites, a
    /// diagonal pass at red/blue sites, an axial pass at green sites,
    /// then write-back with 8-neighbor clamps.
    fn chroma_pass(&mut self) {
        let u = self.width;
        let w3 = 3 * u;
        let (h, w) = (self.height, self.width);
        let mut chroma = vec![[0.0f32; 2]; w * h];

        for row in 1..h - 1 {
            let start = 1 + (self.color[row % 2][1] & 1);
            let c = self.color[row % 2][start % 2];
            let d = c / 2;
            let mut col = start;
            while col < u - 1 {
                let i = row * u + col;
                chroma[i][d] = self.image[i][c] - self.image[i][1];
                col += 2;
            }
        }

        for row in 3..h - 3 {
            let start = 3 + (self.color[row % 2][1] & 1);
            let c = 1 - self.color[row % 2][start % 2] / 2;
            let mut col = start;
            while col < u - 3 {
                let i = row * u + col;

                let f = [
                    1.0 / (1.0
                        + (chroma[i - u - 1][c] - chroma[i + u + 1][c]).abs()
                        + (chroma[i - u - 1][c] - chroma[i - w3 - 3][c]).abs()
                        + (chroma[i + u + 1][c] - chroma[i - w3 - 3][c]).abs()),
                    1.0 / (1.0
                        + (chroma[i - u + 1][c] - chroma[i + u - 1][c]).abs()
                        + (chroma[i - u + 1][c] - chroma[i - w3 + 3][c]).abs()
                        + (chroma[i + u - 1][c] - chroma[i - w3 + 3][c]).abs()),
                    1.0 / (1.0
                        + (chroma[i + u - 1][c] - chroma[i - u + 1][c]).abs()
                        + (chroma[i + u - 1][c] - chroma[i + w3 + 3][c]).abs()
                        + (chroma[i - u + 1][c] - chroma[i + w3 - 3][c]).abs()),
                    1.0 / (1.0
                        + (chroma[i + u + 1][c] - chroma[i - u - 1][c]).abs()
                        + (chroma[i + u + 1][c] - chroma[i + w3 - 3][c]).abs()
                        + (chroma[i - u - 1][c] - chroma[i + w3 + 3][c]).abs()),
                ];

                let g = [
                    1.325 * chroma[i - u - 1][c]
                        - 0.175 * chroma[i - w3 - 3][c]
                        - 0.075 * chroma[i - w3 - 1][c]
                        - 0.075 * chroma[i - u - 3][c],
                    1.325 * chroma[i - u + 1][c]
                        - 0.175 * chroma[i - w3 + 3][c]
                        - 0.075 * chroma[i - w3 + 1][c]
                        - 0.075 * chroma[i - u + 3][c],
                    1.325 * chroma[i + u - 1][c]
                        - 0.175 * chroma[i + w3 - 3][c]
                        - 0.075 * chroma[i + w3 - 1][c]
                        - 0.075 * chroma[i + u - 3][c],
                    1.325 * chroma[i + u + 1][c]
                        - 0.175 * chroma[i + w3 + 3][c]
                        - 0.075 * chroma[i + w3 + 1][c]
                        - 0.075 * chroma[i + u + 3][c],
                ];

                chroma[i][c] = (f[0] * g[0] + f[1] * g[1] + f[2] * g[2] + f[3] * g[3])
                    / (f[0] + f[1] + f[2] + f[3]);
                col += 2;
            }
        }

        for row in 3..h - 3 {
            let start = 3 + (self.color[row % 2][0] & 1);
            let mut c = self.color[row % 2][(start + 1) % 2] / 2;
            let mut col = start;
            while col < u - 3 {
                let i = row * u + col;
                for _ in 0..2 {
                    let f = [
                        1.0 / (1.0
                            + (chroma[i - u][c] - chroma[i + u][c]).abs()
                            + (chroma[i - u][c] - chroma[i - w3][c]).abs()
                            + (chroma[i + u][c] - chroma[i - w3][c]).abs()),
                        1.0 / (1.0
                            + (chroma[i + 1][c] - chroma[i - 1][c]).abs()
                            + (chroma[i + 1][c] - chroma[i + 3][c]).abs()
                            + (chroma[i - 1][c] - chroma[i + 3][c]).abs()),
                        1.0 / (1.0
                            + (chroma[i - 1][c] - chroma[i + 1][c]).abs()
                            + (chroma[i - 1][c] - chroma[i - 3][c]).abs()
                            + (chroma[i + 1][c] - chroma[i - 3][c]).abs()),
                        1.0 / (1.0
                            + (chroma[i + u][c] - chroma[i - u][c]).abs()
                            + (chroma[i + u][c] - chroma[i + w3][c]).abs()
                            + (chroma[i - u][c] - chroma[i + w3][c]).abs()),
                    ];
                    let g = [
                        0.875 * chroma[i - u][c] + 0.125 * chroma[i - w3][c],
                        0.875 * chroma[i + 1][c] + 0.125 * chroma[i + 3][c],
                        0.875 * chroma[i - 1][c] + 0.125 * chroma[i - 3][c],
                        0.875 * chroma[i + u][c] + 0.125 * chroma[i + w3][c],
                    ];
                    chroma[i][c] = (f[0] * g[0] + f[1] * g[1] + f[2] * g[2] + f[3] * g[3])
                        / (f[0] + f[1] + f[2] + f[3]);
                    c = 1 - c;
                }
                col += 2;
            }
        }

        let img = &mut self.image;
        for row in 6..h - 6 {
            for col in 6..w - 6 {
                let i = row * u + col;
                img[i][0] = clip(chroma[i][0] + img[i][1]);
                img[i][2] = clip(chroma[i][1] + img[i][1]);

                let (lo, hi) = ring_min_max(img, i, u, 0);
                img[i][0] = limit(img[i][0], lo, hi);
                let (lo, hi) = ring_min_max(img, i, u, 2);
                img[i][2] = limit(img[i][2], lo, hi);
            }
        }
    }

    /// Clamp every native sample against its four same-channel
    /// neighbors.
    fn correction_pass(&mut self) {
        let u = self.width;
        let img = &mut self.image;
        for row in 2..self.height - 2 {
            for col in 2..self.width - 2 {
                let i = row * u + col;
                let c = self.color[row % 2][col % 2];
                let a = img[i - 1][c];
                let b = img[i + 1][c];
                let d = img[i - u][c];
                let e = img[i + u][c];
                img[i][c] = limit(img[i][c], a.min(b).min(d).min(e), a.max(b).max(d).max(e));
            }
        }
    }

    /// DCB second-step color interpolation, used to stabilize chroma
    /// before the opponent-space impulse filter.
    fn dcb_color(&mut self) {
        let u = self.width;
        let (h, w) = (self.height, self.width);
        let img = &mut self.image;

        for row in 1..h - 1 {
            let start = 1 + (self.color[row % 2][1] & 1);
            let c = 2 - self.color[row % 2][start % 2];
            let mut col = start;
            while col < u - 1 {
                let i = row * u + col;
                img[i][c] = clip(
                    (4.0 * img[i][1]
                        - img[i + u + 1][1]
                        - img[i + u - 1][1]
                        - img[i - u + 1][1]
                        - img[i - u - 1][1]
                        + img[i + u + 1][c]
                        + img[i + u - 1][c]
                        + img[i - u + 1][c]
                        + img[i - u - 1][c])
                        / 4.0,
                );
                col += 2;
            }
        }

        for row in 1..h - 1 {
            let start = 1 + (self.color[row % 2][0] & 1);
            let c = self.color[row % 2][(start + 1) % 2];
            let d = 2 - c;
            let mut col = start;
            while col < w - 1 {
                let i = row * u + col;
                img[i][c] = clip(
                    (2.0 * img[i][1] - img[i + 1][1] - img[i - 1][1]
                        + img[i + 1][c]
                        + img[i - 1][c])
                        / 2.0,
                );
                img[i][d] = clip(
                    (2.0 * img[i][1] - img[i + u][1] - img[i - u][1]
                        + img[i + u][d]
                        + img[i - u][d])
                        / 2.0,
                );
                col += 2;
            }
        }
    }

    fn rgb_to_lch(&self) -> Vec<[f32; 3]> {
        self.image
            .iter()
            .map(|p| {
                [
                    p[0] + p[1] + p[2],
                    1.732_050_8 * (p[0] - p[1]),
                    2.0 * p[2] - p[0] - p[1],
                ]
            })
            .collect()
    }

    fn lch_to_rgb(&mut self, lch: &[[f32; 3]]) {
        for (p, l) in self.image.iter_mut().zip(lch) {
            p[0] = clip(l[0] / 3.0 - l[2] / 6.0 + l[1] / 3.464_101_6);
            p[1] = clip(l[0] / 3.0 - l[2] / 6.0 - l[1] / 3.464_101_6);
            p[2] = clip(l[0] / 3.0 + l[2] / 3.0);
        }
    }

    /// Replace chroma outliers with the trimmed mean of their axial
    /// neighbors when the local chroma magnitude drops sharply.
    fn chroma_impulse_pass(&self, lch: &mut [[f32; 3]]) {
        let v = 2 * self.width;
        for row in 6..self.height - 6 {
            for col in 6..self.width - 6 {
                let i = row * self.width + col;
                if lch[i][1] * lch[i][2] == 0.0 {
                    continue;
                }
                let co = trimmed_pair_mean(
                    lch[i - 2][1],
                    lch[i + 2][1],
                    lch[i - v][1],
                    lch[i + v][1],
                );
                let ho = trimmed_pair_mean(
                    lch[i - 2][2],
                    lch[i + 2][2],
                    lch[i - v][2],
                    lch[i + v][2],
                );
                let ratio = ((co * co + ho * ho)
                    / (lch[i][1] * lch[i][1] + lch[i][2] * lch[i][2]))
                    .sqrt();
                if ratio < 0.85 {
                    lch[i][0] += co + ho - lch[i][1] - lch[i][2];
                    lch[i][1] = co;
                    lch[i][2] = ho;
                }
            }
        }
    }
}

#[inline]
fn x_hi(col: usize, w: usize) -> usize {
    (col + 1).min(w - 1)
}

#[inline]
fn clip(x: f32) -> f32 {
    x.clamp(0.0, SCALE)
}

/// Clamp `x` into the interval spanned by `a` and `b` in either order.
#[inline]
fn limit(x: f32, a: f32, b: f32) -> f32 {
    if b < a {
        x.clamp(b, a)
    } else {
        x.clamp(a, b)
    }
}

/// Min and max of channel `c` over the 8-neighborhood of `i`.
#[inline]
fn ring_min_max(img: &[[f32; 3]], i: usize, u: usize, c: usize) -> (f32, f32) {
    let vals = [
        img[i + 1 + u][c],
        img[i + 1 - u][c],
        img[i - 1 + u][c],
        img[i - 1 - u][c],
        img[i - 1][c],
        img[i + 1][c],
        img[i - u][c],
        img[i + u][c],
    ];
    let mut lo = vals[0];
    let mut hi = vals[0];
    for &v in &vals[1..] {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    (lo, hi)
}

/// Mean of the four values with the extremes removed.
#[inline]
fn trimmed_pair_mean(a: f32, b: f32, c: f32, d: f32) -> f32 {
    let sum = a + b + c + d;
    let max = a.max(b).max(c).max(d);
    let min = a.min(b).min(c).min(d);
    (sum - max - min) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn uniform_mosaic(h: usize, w: usize, value: f32) -> Mosaic {
        Mosaic {
            data: MosaicData::F32(Array2::from_elem((h, w), value)),
        }
    }

    #[test]
    fn off_mode_is_a_no_op() {
        let cfa = CfaPattern::bayer(crate::cfa::BayerPattern::RGGB);
        let m = uniform_mosaic(40, 40, 0.5);
        assert!(denoise(&m, &cfa, DenoiseMode::Off).unwrap().is_none());
    }

    #[test]
    fn small_mosaic_is_skipped() {
        let cfa = CfaPattern::bayer(crate::cfa::BayerPattern::RGGB);
        let m = uniform_mosaic(16, 16, 0.5);
        assert!(denoise(&m, &cfa, DenoiseMode::Basic).unwrap().is_none());
    }

    #[test]
    fn uniform_mosaic_stays_uniform() {
        let cfa = CfaPattern::bayer(crate::cfa::BayerPattern::RGGB);
        let m = uniform_mosaic(48, 48, 0.5);
        for mode in [DenoiseMode::Basic, DenoiseMode::Full] {
            let out = denoise(&m, &cfa, mode).unwrap().unwrap();
            let plane = out.to_f32();
            for v in plane.iter() {
                assert!((v - 0.5).abs() < 1e-4, "mode {mode}: {v}");
            }
        }
    }

    #[test]
    fn output_stays_in_range() {
        let cfa = CfaPattern::bayer(crate::cfa::BayerPattern::RGGB);
        let mut raw = Array2::zeros((48, 48));
        for ((y, x), v) in raw.indexed_iter_mut() {
            *v = (((y * 31 + x * 17) % 97) as f32) / 96.0;
        }
        let m = Mosaic {
            data: MosaicData::F32(raw),
        };
        let out = denoise(&m, &cfa, DenoiseMode::Full).unwrap().unwrap();
        for v in out.to_f32().iter() {
            assert!((0.0..=1.0).contains(v), "{v}");
        }
    }
}
