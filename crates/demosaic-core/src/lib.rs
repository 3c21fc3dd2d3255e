pub mod batch;
pub mod cfa;
pub mod compute;
pub mod consts;
pub mod demosaic;
pub mod denoise;
pub mod error;
pub mod evaluate;
pub mod io;
pub mod raster;
pub mod resolve;

pub use cfa::{BayerPattern, CfaPattern, Channel};
pub use compute::ComputeContext;
pub use demosaic::Method;
pub use denoise::DenoiseMode;
pub use error::{DemosaicError, Result};
pub use raster::{Mosaic, MosaicData, RgbRaster};
pub use resolve::{ResolvedCfa, SourceMetadata};
