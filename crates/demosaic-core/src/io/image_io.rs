use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Luma, Rgb};
use ndarray::Array2;
use tracing::warn;

use crate::error::Result;
use crate::raster::{Mosaic, MosaicData, RgbRaster};

/// Header-level description of an image file, read without decoding
/// the pixel data. Feeds the batch memory estimator.
#[derive(Clone, Copy, Debug)]
pub struct MosaicProbe {
    pub width: usize,
    pub height: usize,
    pub bytes_per_sample: usize,
}

impl MosaicProbe {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Read image dimensions and sample size from the file header.
pub fn probe(path: &Path) -> Result<MosaicProbe> {
    let decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let (w, h) = decoder.dimensions();
    let color = decoder.color_type();
    let bytes_per_sample =
        color.bytes_per_pixel() as usize / color.channel_count().max(1) as usize;
    Ok(MosaicProbe {
        width: w as usize,
        height: h as usize,
        bytes_per_sample,
    })
}

/// Load a mosaic frame, keeping the native sample type.
///
/// 8 and 16 bit grayscale map directly; float TIFF decodes as RGB so
/// the first channel is taken. Anything else is converted to 16-bit
/// grayscale with a warning.
pub fn load_mosaic(path: &Path) -> Result<Mosaic> {
    let img = image::open(path)?;
    let data = match img {
        DynamicImage::ImageLuma8(gray) => {
            let (w, h) = gray.dimensions();
            MosaicData::U8(from_luma(gray.as_raw(), w as usize, h as usize))
        }
        DynamicImage::ImageLuma16(gray) => {
            let (w, h) = gray.dimensions();
            MosaicData::U16(from_luma(gray.as_raw(), w as usize, h as usize))
        }
        DynamicImage::ImageRgb32F(rgb) => {
            let (w, h) = rgb.dimensions();
            let mut data = Array2::zeros((h as usize, w as usize));
            for (row, col, px) in pixel_iter(w, h) {
                data[[row, col]] = rgb.get_pixel(px.0, px.1).0[0];
            }
            MosaicData::F32(data)
        }
        other => {
            warn!(
                path = %path.display(),
                color = ?other.color(),
                "unexpected mosaic sample layout, converting to 16-bit grayscale"
            );
            let gray = other.to_luma16();
            let (w, h) = gray.dimensions();
            MosaicData::U16(from_luma(gray.as_raw(), w as usize, h as usize))
        }
    };
    Ok(Mosaic::new(data))
}

fn from_luma<T: Copy>(raw: &[T], w: usize, h: usize) -> Array2<T>
where
    T: num_traits::Zero,
{
    let mut data = Array2::zeros((h, w));
    for row in 0..h {
        for col in 0..w {
            data[[row, col]] = raw[row * w + col];
        }
    }
    data
}

fn pixel_iter(w: u32, h: u32) -> impl Iterator<Item = (usize, usize, (u32, u32))> {
    (0..h as usize).flat_map(move |row| {
        (0..w as usize).map(move |col| (row, col, (col as u32, row as u32)))
    })
}

/// Save an RGB raster as 16-bit TIFF or PNG, chosen by extension.
pub fn save_rgb(raster: &RgbRaster, path: &Path) -> Result<()> {
    let h = raster.height();
    let w = raster.width();

    let mut pixels: Vec<u16> = Vec::with_capacity(h * w * 3);
    for row in 0..h {
        for col in 0..w {
            pixels.push(to_u16(raster.red[[row, col]]));
            pixels.push(to_u16(raster.green[[row, col]]));
            pixels.push(to_u16(raster.blue[[row, col]]));
        }
    }

    let img = image::ImageBuffer::<Rgb<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .expect("buffer size matches dimensions");
    match output_format(path) {
        ImageFormat::Png => img.save_with_format(path, ImageFormat::Png)?,
        _ => img.save_with_format(path, ImageFormat::Tiff)?,
    }
    Ok(())
}

/// Save the three channel planes as separate 16-bit grayscale files
/// with `_R`/`_G`/`_B` stem suffixes. Returns the written paths.
pub fn save_channels(raster: &RgbRaster, path: &Path) -> Result<Vec<std::path::PathBuf>> {
    let h = raster.height();
    let w = raster.width();
    let mut written = Vec::with_capacity(3);

    for (suffix, plane) in [("_R", &raster.red), ("_G", &raster.green), ("_B", &raster.blue)] {
        let mut pixels: Vec<u16> = Vec::with_capacity(h * w);
        for row in 0..h {
            for col in 0..w {
                pixels.push(to_u16(plane[[row, col]]));
            }
        }
        let img =
            image::ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
                .expect("buffer size matches dimensions");

        let channel_path = with_stem_suffix(path, suffix);
        match output_format(&channel_path) {
            ImageFormat::Png => img.save_with_format(&channel_path, ImageFormat::Png)?,
            _ => img.save_with_format(&channel_path, ImageFormat::Tiff)?,
        }
        written.push(channel_path);
    }
    Ok(written)
}

fn output_format(path: &Path) -> ImageFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => ImageFormat::Png,
        _ => ImageFormat::Tiff,
    }
}

fn with_stem_suffix(path: &Path, suffix: &str) -> std::path::PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

#[inline]
fn to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_suffix_preserves_extension() {
        let p = with_stem_suffix(Path::new("/out/frame_d.tif"), "_R");
        assert_eq!(p, Path::new("/out/frame_d_R.tif"));
    }

    #[test]
    fn luma16_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mosaic.png");

        let mut img = image::ImageBuffer::<Luma<u16>, Vec<u16>>::new(8, 6);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Luma([(x * 1000 + y * 137) as u16]);
        }
        img.save(&path).unwrap();

        let mosaic = load_mosaic(&path).unwrap();
        assert_eq!((mosaic.width(), mosaic.height()), (8, 6));
        match &mosaic.data {
            MosaicData::U16(a) => {
                assert_eq!(a[[0, 0]], 0);
                assert_eq!(a[[2, 3]], 3000 + 2 * 137);
            }
            other => panic!("unexpected sample kind {:?}", other.kind()),
        }

        let p = probe(&path).unwrap();
        assert_eq!((p.width, p.height, p.bytes_per_sample), (8, 6, 2));
    }
}
