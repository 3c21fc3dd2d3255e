pub mod image_io;
pub mod naming;

pub use image_io::{load_mosaic, probe, save_channels, save_rgb, MosaicProbe};
pub use naming::OutputNaming;
