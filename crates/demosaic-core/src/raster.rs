use ndarray::Array2;

/// A native mosaic sample type. `to_f32` maps the full nominal range
/// of the type onto [0.0, 1.0].
pub trait Sample: Copy + Send + Sync + 'static {
    const BYTES: usize;
    fn to_f32(self) -> f32;
}

impl Sample for u8 {
    const BYTES: usize = 1;
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / u8::MAX as f32
    }
}

impl Sample for u16 {
    const BYTES: usize = 2;
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / u16::MAX as f32
    }
}

impl Sample for u32 {
    const BYTES: usize = 4;
    #[inline]
    fn to_f32(self) -> f32 {
        (self as f64 / u32::MAX as f64) as f32
    }
}

impl Sample for f32 {
    const BYTES: usize = 4;
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }
}

impl Sample for f64 {
    const BYTES: usize = 8;
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Mosaic sample storage, one variant per supported native type.
///
/// The variant is matched exactly once, at the reconstruction entry
/// point; everything downstream is generic over [`Sample`].
#[derive(Clone, Debug)]
pub enum MosaicData {
    U8(Array2<u8>),
    U16(Array2<u16>),
    U32(Array2<u32>),
    F32(Array2<f32>),
    F64(Array2<f64>),
}

impl MosaicData {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::U8(a) => a.dim(),
            Self::U16(a) => a.dim(),
            Self::U32(a) => a.dim(),
            Self::F32(a) => a.dim(),
            Self::F64(a) => a.dim(),
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8(_) => 1,
            Self::U16(_) => 2,
            Self::U32(_) | Self::F32(_) => 4,
            Self::F64(_) => 8,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
        }
    }
}

/// A single-channel CFA mosaic.
#[derive(Clone, Debug)]
pub struct Mosaic {
    /// Sample data, row-major, shape = (height, width).
    pub data: MosaicData,
}

impl Mosaic {
    pub fn new(data: MosaicData) -> Self {
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Normalized f32 copy of the mosaic.
    pub fn to_f32(&self) -> Array2<f32> {
        fn convert<S: Sample>(a: &Array2<S>) -> Array2<f32> {
            a.mapv(Sample::to_f32)
        }
        match &self.data {
            MosaicData::U8(a) => convert(a),
            MosaicData::U16(a) => convert(a),
            MosaicData::U32(a) => convert(a),
            MosaicData::F32(a) => a.clone(),
            MosaicData::F64(a) => convert(a),
        }
    }
}

/// Reconstructed RGB raster with separate f32 channel planes in [0, 1].
#[derive(Clone, Debug)]
pub struct RgbRaster {
    pub red: Array2<f32>,
    pub green: Array2<f32>,
    pub blue: Array2<f32>,
}

impl RgbRaster {
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            red: Array2::zeros((height, width)),
            green: Array2::zeros((height, width)),
            blue: Array2::zeros((height, width)),
        }
    }

    pub fn width(&self) -> usize {
        self.red.ncols()
    }

    pub fn height(&self) -> usize {
        self.red.nrows()
    }

    pub fn channel(&self, index: usize) -> &Array2<f32> {
        match index {
            0 => &self.red,
            1 => &self.green,
            _ => &self.blue,
        }
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut Array2<f32> {
        match index {
            0 => &mut self.red,
            1 => &mut self.green,
            _ => &mut self.blue,
        }
    }
}
