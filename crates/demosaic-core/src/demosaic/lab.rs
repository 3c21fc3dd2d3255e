//! Linear RGB to CIELab conversion for the X-Trans homogeneity maps.
//!
//! Exact colorimetric accuracy is not required here, only consistent
//! relative distances between candidate interpolations.

/// Linear sRGB to XYZ, D65 reference white.
pub const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

const D65_WHITE: [f32; 3] = [0.95047, 1.0, 1.08883];

/// Compose the camera-to-RGB conversion matrix with the fixed RGB-to-XYZ
/// step so that camera samples map to XYZ in one multiply per pixel.
pub fn compose_xyz(camera_to_rgb: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut m = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                m[i][j] += SRGB_TO_XYZ[i][k] * camera_to_rgb[k][j];
            }
        }
    }
    m
}

/// Convert one linear RGB triple to CIELab through the given RGB-to-XYZ
/// matrix.
#[inline]
pub fn rgb_to_lab(xyz: &[[f32; 3]; 3], r: f32, g: f32, b: f32) -> [f32; 3] {
    let x = xyz[0][0] * r + xyz[0][1] * g + xyz[0][2] * b;
    let y = xyz[1][0] * r + xyz[1][1] * g + xyz[1][2] * b;
    let z = xyz[2][0] * r + xyz[2][1] * g + xyz[2][2] * b;

    let fx = lab_f(x / D65_WHITE[0]);
    let fy = lab_f(y / D65_WHITE[1]);
    let fz = lab_f(z / D65_WHITE[2]);

    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

#[inline(always)]
fn lab_f(t: f32) -> f32 {
    const DELTA_CB: f32 = (6.0 / 29.0) * (6.0 / 29.0) * (6.0 / 29.0);
    const LINEAR_SCALE: f32 = 1.0 / (3.0 * (6.0 / 29.0) * (6.0 / 29.0));
    const LINEAR_OFFSET: f32 = 4.0 / 29.0;

    if t > DELTA_CB {
        fast_cbrt(t)
    } else {
        t * LINEAR_SCALE + LINEAR_OFFSET
    }
}

/// Cube root via bit-level seed plus one Newton-Raphson step. Accurate
/// to roughly 0.1%, which is plenty for gradient comparison.
#[inline(always)]
fn fast_cbrt(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    let approx = f32::from_bits(x.to_bits() / 3 + 0x2a50_8000);
    (2.0 * approx + x / (approx * approx)) * (1.0 / 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    #[test]
    fn white_is_l100() {
        let m = compose_xyz(&IDENTITY);
        let [l, a, b] = rgb_to_lab(&m, 1.0, 1.0, 1.0);
        assert_abs_diff_eq!(l, 100.0, epsilon = 0.5);
        assert_abs_diff_eq!(a, 0.0, epsilon = 1.0);
        assert_abs_diff_eq!(b, 0.0, epsilon = 1.0);
    }

    #[test]
    fn black_is_l0() {
        let m = compose_xyz(&IDENTITY);
        let [l, a, b] = rgb_to_lab(&m, 0.0, 0.0, 0.0);
        assert_abs_diff_eq!(l, 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(a, 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(b, 0.0, epsilon = 0.5);
    }

    #[test]
    fn identity_compose_matches_srgb_matrix() {
        let m = compose_xyz(&IDENTITY);
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(m[i][j], SRGB_TO_XYZ[i][j], epsilon = 1e-6);
            }
        }
    }
}
