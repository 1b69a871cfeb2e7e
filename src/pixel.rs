use crate::error::RasterError;

/// Pixel memory layout of a raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes: R, G, B.
    Rgb,
    /// 4 bytes: R, G, B, A.
    Rgba,
    /// 4 bytes: A, R, G, B.
    Argb,
    /// 3 bytes: B, G, R.
    Bgr,
    /// 4 bytes: B, G, R, A.
    Bgra,
    /// 1 byte luminance.
    Grayscale,
    /// 1 byte index into the image palette.
    Palette,
    /// Typed numeric samples, see [`GridSample`].
    Grid,
    /// Layout a decoder could not map. Never valid for allocation.
    Unknown,
}

impl PixelFormat {
    /// Whether a palette applies to this format.
    pub fn has_palette(self) -> bool {
        self == Self::Palette
    }

    /// Whether the format carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba | Self::Argb | Self::Bgra)
    }

    /// Whether a no-data value applies to this format.
    pub fn has_no_data(self) -> bool {
        self == Self::Grid
    }

    /// Number of interleaved channels per pixel (1 for grids).
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb | Self::Bgr => 3,
            Self::Rgba | Self::Argb | Self::Bgra => 4,
            Self::Grayscale | Self::Palette | Self::Grid => 1,
            Self::Unknown => 0,
        }
    }
}

/// Numeric interpretation of grid samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    UInt,
    Int,
    Float,
    /// Interpretation a decoder could not map.
    Unknown,
}

/// The eight storage types a grid sample can take.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridSample {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl GridSample {
    /// Resolve `(sample_format, bits_per_sample)` into a storage type.
    pub fn from_parts(sample_format: SampleFormat, bits_per_sample: u8) -> Option<Self> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Int, 8) => Some(Self::Int8),
            (SampleFormat::UInt, 8) => Some(Self::UInt8),
            (SampleFormat::Int, 16) => Some(Self::Int16),
            (SampleFormat::UInt, 16) => Some(Self::UInt16),
            (SampleFormat::Int, 32) => Some(Self::Int32),
            (SampleFormat::UInt, 32) => Some(Self::UInt32),
            (SampleFormat::Float, 32) => Some(Self::Float32),
            (SampleFormat::Float, 64) => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn sample_format(self) -> SampleFormat {
        match self {
            Self::Int8 | Self::Int16 | Self::Int32 => SampleFormat::Int,
            Self::UInt8 | Self::UInt16 | Self::UInt32 => SampleFormat::UInt,
            Self::Float32 | Self::Float64 => SampleFormat::Float,
        }
    }

    pub fn bits_per_sample(self) -> u8 {
        (self.byte_width() * 8) as u8
    }

    /// Bytes occupied by one sample.
    pub fn byte_width(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Read one native-endian sample.
    pub(crate) fn read(self, bytes: &[u8]) -> SampleValue {
        match self {
            Self::Int8 => SampleValue::Int(i8::from_ne_bytes([bytes[0]]) as i64),
            Self::UInt8 => SampleValue::Int(bytes[0] as i64),
            Self::Int16 => SampleValue::Int(i16::from_ne_bytes([bytes[0], bytes[1]]) as i64),
            Self::UInt16 => SampleValue::Int(u16::from_ne_bytes([bytes[0], bytes[1]]) as i64),
            Self::Int32 => SampleValue::Int(i32::from_ne_bytes(ne4(bytes)) as i64),
            Self::UInt32 => SampleValue::Int(u32::from_ne_bytes(ne4(bytes)) as i64),
            Self::Float32 => SampleValue::Float(f32::from_ne_bytes(ne4(bytes)) as f64),
            Self::Float64 => SampleValue::Float(f64::from_ne_bytes(ne8(bytes))),
        }
    }

    /// Read one native-endian sample widened to `f64`.
    pub(crate) fn read_f64(self, bytes: &[u8]) -> f64 {
        match self.read(bytes) {
            SampleValue::Int(v) => v as f64,
            SampleValue::Float(v) => v,
        }
    }

    /// Store a value with C cast semantics: floats truncate toward zero
    /// into a 64-bit integer first, then integers wrap to the target width.
    pub(crate) fn write(self, value: SampleValue, out: &mut [u8]) {
        let as_int = || match value {
            SampleValue::Int(v) => v,
            SampleValue::Float(v) => v as i64,
        };
        let as_float = || match value {
            SampleValue::Int(v) => v as f64,
            SampleValue::Float(v) => v,
        };
        match self {
            Self::Int8 => out[..1].copy_from_slice(&(as_int() as i8).to_ne_bytes()),
            Self::UInt8 => out[0] = as_int() as u8,
            Self::Int16 => out[..2].copy_from_slice(&(as_int() as i16).to_ne_bytes()),
            Self::UInt16 => out[..2].copy_from_slice(&(as_int() as u16).to_ne_bytes()),
            Self::Int32 => out[..4].copy_from_slice(&(as_int() as i32).to_ne_bytes()),
            Self::UInt32 => out[..4].copy_from_slice(&(as_int() as u32).to_ne_bytes()),
            Self::Float32 => out[..4].copy_from_slice(&(as_float() as f32).to_ne_bytes()),
            Self::Float64 => out[..8].copy_from_slice(&as_float().to_ne_bytes()),
        }
    }

    /// Store an `f64` with the same cast rules as [`GridSample::write`].
    pub(crate) fn write_f64(self, value: f64, out: &mut [u8]) {
        self.write(SampleValue::Float(value), out);
    }
}

/// One grid sample as read from a buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum SampleValue {
    Int(i64),
    Float(f64),
}

fn ne4(b: &[u8]) -> [u8; 4] {
    [b[0], b[1], b[2], b[3]]
}

fn ne8(b: &[u8]) -> [u8; 8] {
    [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]
}

/// Bytes per pixel and bytes per scanline for a pixel layout.
///
/// | format | bits | sample | bytes |
/// |---|---|---|---|
/// | Grayscale, Palette | | | 1 |
/// | Rgb, Bgr | | | 3 |
/// | Rgba, Argb, Bgra | | | 4 |
/// | Grid | 8 | UInt/Int | 1 |
/// | Grid | 16 | UInt/Int | 2 |
/// | Grid | 32 | UInt/Int/Float | 4 |
/// | Grid | 64 | Float | 8 |
pub fn pixel_size_and_scanline(
    pixel_format: PixelFormat,
    bits_per_sample: u8,
    sample_format: SampleFormat,
    width: u32,
) -> Result<(usize, usize), RasterError> {
    let pixel_size = match pixel_format {
        PixelFormat::Grayscale | PixelFormat::Palette => 1,
        PixelFormat::Rgb | PixelFormat::Bgr => 3,
        PixelFormat::Rgba | PixelFormat::Argb | PixelFormat::Bgra => 4,
        PixelFormat::Grid => GridSample::from_parts(sample_format, bits_per_sample)
            .ok_or_else(|| {
                RasterError::InvalidArgument(format!(
                    "unsupported grid sample: {sample_format:?} at {bits_per_sample} bits"
                ))
            })?
            .byte_width(),
        PixelFormat::Unknown => {
            return Err(RasterError::InvalidArgument(
                "unknown pixel format".into(),
            ));
        }
    };
    let scanline = (width as usize)
        .checked_mul(pixel_size)
        .ok_or(RasterError::DimensionsTooLarge { width, height: 0 })?;
    Ok((pixel_size, scanline))
}
