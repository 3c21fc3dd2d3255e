use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::compute::ComputeContext;
use crate::consts::{MIN_BAYER_SIZE, MIN_XTRANS_SIZE};
use crate::error::{DemosaicError, Result};
use crate::raster::{Mosaic, MosaicData, RgbRaster, Sample};
use crate::resolve::ResolvedCfa;

pub mod bilinear;
pub mod lab;
pub mod superpixel;
pub mod vng;
pub mod xtrans;

/// Demosaicing algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// One output pixel per 2x2 cell; halves the resolution, no
    /// interpolation artifacts.
    SuperPixel,
    /// Plain neighbor averaging.
    Bilinear,
    /// Variable Number of Gradients; edge-aware, full resolution.
    #[default]
    Vng,
    /// Markesteijn interpolation for 6x6 X-Trans mosaics.
    XTrans,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuperPixel => write!(f, "SuperPixel"),
            Self::Bilinear => write!(f, "Bilinear"),
            Self::Vng => write!(f, "VNG"),
            Self::XTrans => write!(f, "X-Trans"),
        }
    }
}

impl Method {
    /// The method actually applied to a given source: X-Trans mosaics
    /// always take the X-Trans path, everything else keeps the
    /// configured Bayer method.
    pub fn effective(self, cfa: &ResolvedCfa) -> Method {
        if cfa.xtrans {
            Method::XTrans
        } else {
            self
        }
    }
}

/// Reconstruct an RGB raster from a CFA mosaic.
///
/// The mosaic's native sample type is matched here, exactly once; the
/// per-method kernels are generic over [`Sample`].
pub fn reconstruct(
    mosaic: &Mosaic,
    cfa: &ResolvedCfa,
    method: Method,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    let method = method.effective(cfa);
    check_geometry(mosaic, cfa, method)?;

    match &mosaic.data {
        MosaicData::U8(a) => dispatch(a, cfa, method, ctx),
        MosaicData::U16(a) => dispatch(a, cfa, method, ctx),
        MosaicData::U32(a) => dispatch(a, cfa, method, ctx),
        MosaicData::F32(a) => dispatch(a, cfa, method, ctx),
        MosaicData::F64(a) => dispatch(a, cfa, method, ctx),
    }
}

fn dispatch<S: Sample>(
    raw: &Array2<S>,
    cfa: &ResolvedCfa,
    method: Method,
    ctx: &ComputeContext,
) -> Result<RgbRaster> {
    match method {
        Method::SuperPixel => superpixel::demosaic(raw, &cfa.pattern, ctx),
        Method::Bilinear => bilinear::demosaic(raw, &cfa.pattern, ctx),
        Method::Vng => vng::demosaic(raw, &cfa.pattern, ctx),
        Method::XTrans => xtrans::demosaic(raw, &cfa.pattern, &cfa.matrix, 2, ctx),
    }
}

fn check_geometry(mosaic: &Mosaic, cfa: &ResolvedCfa, method: Method) -> Result<()> {
    let (h, w) = mosaic.data.dim();
    match method {
        Method::XTrans => {
            if !cfa.xtrans {
                return Err(DemosaicError::InvalidConfig(format!(
                    "X-Trans method selected for Bayer pattern {}",
                    cfa.id
                )));
            }
            if w < MIN_XTRANS_SIZE || h < MIN_XTRANS_SIZE {
                return Err(DemosaicError::ImageTooSmall {
                    method: "X-Trans",
                    width: w,
                    height: h,
                    min: MIN_XTRANS_SIZE,
                });
            }
        }
        _ => {
            if cfa.xtrans {
                return Err(DemosaicError::InvalidConfig(format!(
                    "{method} method selected for X-Trans pattern"
                )));
            }
            if w < MIN_BAYER_SIZE || h < MIN_BAYER_SIZE {
                return Err(DemosaicError::ImageTooSmall {
                    method: match method {
                        Method::SuperPixel => "SuperPixel",
                        Method::Bilinear => "Bilinear",
                        _ => "VNG",
                    },
                    width: w,
                    height: h,
                    min: MIN_BAYER_SIZE,
                });
            }
        }
    }
    Ok(())
}
