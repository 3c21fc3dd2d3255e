use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cfa::{BayerPattern, CfaPattern};
use crate::error::{DemosaicError, Result};

pub const IDENTITY_MATRIX: [[f32; 3]; 3] =
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// CFA metadata carried alongside a mosaic file.
///
/// Stored as a TOML sidecar (`<stem>.cfa.toml`) next to the mosaic.
/// `cfa_pattern` is the authoritative pattern string when present;
/// `bayer_keyword` plus the alignment offsets is the legacy transport
/// used by older acquisition software.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Full CFA pattern string: 4 characters for Bayer, 36 for X-Trans.
    pub cfa_pattern: Option<String>,

    /// CFA pattern family name; "x-trans" (or "xtrans") selects the
    /// 6x6 interpolation path.
    pub cfa_pattern_name: Option<String>,

    /// Legacy Bayer pattern keyword.
    pub bayer_keyword: Option<String>,

    /// Horizontal alignment offset of the mosaic relative to the
    /// sensor origin. An odd value swaps the pattern columns.
    #[serde(default)]
    pub x_offset: i32,

    /// Vertical alignment offset. An odd value swaps the pattern rows.
    #[serde(default)]
    pub y_offset: i32,

    /// Camera RGB to linear sRGB conversion matrix, row-major.
    pub conversion_matrix: Option<[[f32; 3]; 3]>,
}

impl SourceMetadata {
    /// Path of the sidecar for a given mosaic file.
    pub fn sidecar_path(mosaic_path: &Path) -> PathBuf {
        let stem = mosaic_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        mosaic_path.with_file_name(format!("{stem}.cfa.toml"))
    }

    /// Load the sidecar next to `mosaic_path`, if one exists.
    pub fn load_for(mosaic_path: &Path) -> Result<Self> {
        let sidecar = Self::sidecar_path(mosaic_path);
        if !sidecar.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&sidecar)?;
        toml::from_str(&contents).map_err(|e| {
            DemosaicError::InvalidConfig(format!("{}: {e}", sidecar.display()))
        })
    }

    /// True if the pattern family name designates an X-Trans sensor.
    pub fn is_xtrans(&self) -> bool {
        self.cfa_pattern_name
            .as_deref()
            .map(|n| {
                let n = n.trim().to_ascii_lowercase();
                n == "x-trans" || n == "xtrans"
            })
            .unwrap_or(false)
    }
}

/// The outcome of pattern resolution for one source image.
#[derive(Clone, Debug)]
pub struct ResolvedCfa {
    pub pattern: CfaPattern,
    pub id: String,
    pub xtrans: bool,
    /// Camera RGB to linear sRGB matrix; identity when the source
    /// carries none.
    pub matrix: [[f32; 3]; 3],
}

/// Resolve the effective CFA pattern for a source image.
///
/// A fixed Bayer pattern always wins for Bayer sources. Otherwise the
/// direct pattern property is used as-is, and the legacy keyword is
/// used with the odd-offset column/row swaps applied.
pub fn resolve(fixed: Option<BayerPattern>, meta: &SourceMetadata) -> Result<ResolvedCfa> {
    if meta.is_xtrans() {
        let id = meta
            .cfa_pattern
            .as_deref()
            .ok_or(DemosaicError::PatternUnavailable)?
            .trim()
            .to_owned();
        let pattern = CfaPattern::parse(&id)?;
        if !pattern.is_xtrans() {
            return Err(DemosaicError::InvalidCfaPattern(id));
        }
        let matrix = meta.conversion_matrix.unwrap_or_else(|| {
            warn!("no camera conversion matrix in metadata, using identity");
            IDENTITY_MATRIX
        });
        return Ok(ResolvedCfa {
            id: pattern.id(),
            pattern,
            xtrans: true,
            matrix: matrix_or_identity(matrix),
        });
    }

    let bayer = match fixed {
        Some(p) => p,
        None => {
            if let Some(id) = meta.cfa_pattern.as_deref() {
                BayerPattern::parse(id)?
            } else if let Some(keyword) = meta.bayer_keyword.as_deref() {
                let id = apply_offsets(keyword.trim(), meta.x_offset, meta.y_offset)?;
                BayerPattern::parse(&id)?
            } else {
                return Err(DemosaicError::PatternUnavailable);
            }
        }
    };

    Ok(ResolvedCfa {
        pattern: CfaPattern::bayer(bayer),
        id: bayer.id().to_owned(),
        xtrans: false,
        matrix: meta.conversion_matrix.unwrap_or(IDENTITY_MATRIX),
    })
}

/// Apply odd alignment offsets to a 4-character Bayer pattern string.
/// An odd x offset swaps the pattern columns, an odd y offset swaps
/// the rows; the two swaps are independent.
pub fn apply_offsets(id: &str, dx: i32, dy: i32) -> Result<String> {
    if id.len() != 4 {
        return Err(DemosaicError::InvalidCfaPattern(id.to_owned()));
    }
    let mut p: Vec<char> = id.chars().collect();
    if dx % 2 != 0 {
        p.swap(0, 1);
        p.swap(2, 3);
    }
    if dy % 2 != 0 {
        p.swap(0, 2);
        p.swap(1, 3);
    }
    Ok(p.into_iter().collect())
}

fn matrix_or_identity(m: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    // An all-zero matrix in the metadata means "not recorded".
    let zero = m.iter().all(|row| row.iter().all(|&v| v == 0.0));
    if zero {
        IDENTITY_MATRIX
    } else {
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_swap_columns_and_rows() {
        assert_eq!(apply_offsets("RGGB", 0, 0).unwrap(), "RGGB");
        assert_eq!(apply_offsets("RGGB", 1, 0).unwrap(), "GRBG");
        assert_eq!(apply_offsets("RGGB", 0, 1).unwrap(), "GBRG");
        assert_eq!(apply_offsets("RGGB", 1, 1).unwrap(), "BGGR");
        // Parity only, not magnitude or sign.
        assert_eq!(apply_offsets("RGGB", 3, -2).unwrap(), "GRBG");
        assert_eq!(apply_offsets("RGGB", -1, 5).unwrap(), "BGGR");
    }

    #[test]
    fn no_metadata_is_an_error() {
        let err = resolve(None, &SourceMetadata::default()).unwrap_err();
        assert!(matches!(err, DemosaicError::PatternUnavailable));
    }

    #[test]
    fn fixed_pattern_wins() {
        let meta = SourceMetadata {
            cfa_pattern: Some("BGGR".into()),
            ..Default::default()
        };
        let r = resolve(Some(BayerPattern::RGGB), &meta).unwrap();
        assert_eq!(r.id, "RGGB");
        assert!(!r.xtrans);
    }
}
