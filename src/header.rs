//! Header fields shared by full rasters, probes and strip sessions.

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::palette::Palette;
use crate::pixel::{GridSample, PixelFormat, SampleFormat, pixel_size_and_scanline};

/// Everything about an image except its pixels.
///
/// `scanline_width == width * pixel_size` always holds; both are derived
/// from `(pixel_format, bits_per_sample, sample_format)` when the header is
/// built and whenever the format changes.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageHeader {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixel_format: PixelFormat,
    pub(crate) bits_per_sample: u8,
    pub(crate) samples_per_pixel: u8,
    pub(crate) sample_format: SampleFormat,
    pub(crate) pixel_size: usize,
    pub(crate) scanline_width: usize,
    pub palette: Palette,
    pub transparent: Option<[u8; 3]>,
    pub georef: GeoReference,
    pub no_data: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

impl ImageHeader {
    /// Validate a layout and derive its sizes.
    ///
    /// Pixel formats other than `Grid` are 8 bits per sample, unsigned.
    pub fn new(
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        bits_per_sample: u8,
        samples_per_pixel: u8,
        sample_format: SampleFormat,
    ) -> Result<Self, RasterError> {
        if sample_format == SampleFormat::Unknown {
            return Err(RasterError::InvalidArgument("unknown sample format".into()));
        }
        if pixel_format == PixelFormat::Unknown {
            return Err(RasterError::InvalidArgument("unknown pixel format".into()));
        }
        if width == 0 || height == 0 {
            return Err(RasterError::InvalidArgument(format!(
                "empty image: {width}x{height}"
            )));
        }
        if pixel_format != PixelFormat::Grid {
            if bits_per_sample != 8 || sample_format != SampleFormat::UInt {
                return Err(RasterError::InvalidArgument(format!(
                    "{pixel_format:?} requires 8-bit unsigned samples"
                )));
            }
            if samples_per_pixel as usize != pixel_format.channels() {
                return Err(RasterError::InvalidArgument(format!(
                    "{pixel_format:?} has {} samples per pixel, got {samples_per_pixel}",
                    pixel_format.channels()
                )));
            }
        } else if samples_per_pixel != 1 {
            return Err(RasterError::InvalidArgument(
                "grids have exactly one sample per pixel".into(),
            ));
        }
        let (pixel_size, scanline_width) =
            pixel_size_and_scanline(pixel_format, bits_per_sample, sample_format, width)?;
        Ok(Self {
            width,
            height,
            pixel_format,
            bits_per_sample,
            samples_per_pixel,
            sample_format,
            pixel_size,
            scanline_width,
            palette: Palette::default(),
            transparent: None,
            georef: GeoReference::default(),
            no_data: None,
            min_value: None,
            max_value: None,
        })
    }

    /// Header for an 8-bit pixel layout.
    pub fn pixels(pixel_format: PixelFormat, width: u32, height: u32) -> Result<Self, RasterError> {
        Self::new(
            pixel_format,
            width,
            height,
            8,
            pixel_format.channels() as u8,
            SampleFormat::UInt,
        )
    }

    /// Header for a typed grid.
    pub fn grid(sample: GridSample, width: u32, height: u32) -> Result<Self, RasterError> {
        Self::new(
            PixelFormat::Grid,
            width,
            height,
            sample.bits_per_sample(),
            1,
            sample.sample_format(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    pub fn bits_per_sample(&self) -> u8 {
        self.bits_per_sample
    }

    pub fn samples_per_pixel(&self) -> u8 {
        self.samples_per_pixel
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub fn pixel_size(&self) -> usize {
        self.pixel_size
    }

    pub fn scanline_width(&self) -> usize {
        self.scanline_width
    }

    /// Storage type of grid samples, `None` for pixel formats.
    pub fn grid_sample(&self) -> Option<GridSample> {
        if self.pixel_format != PixelFormat::Grid {
            return None;
        }
        GridSample::from_parts(self.sample_format, self.bits_per_sample)
    }

    /// Byte length of `rows` full scanlines.
    pub fn rows_len(&self, rows: u32) -> Result<usize, RasterError> {
        self.scanline_width
            .checked_mul(rows as usize)
            .ok_or(RasterError::DimensionsTooLarge {
                width: self.width,
                height: rows,
            })
    }

    /// Switch to another layout of the same dimensions.
    pub(crate) fn set_layout(
        &mut self,
        pixel_format: PixelFormat,
        bits_per_sample: u8,
        sample_format: SampleFormat,
    ) -> Result<(), RasterError> {
        let (pixel_size, scanline_width) =
            pixel_size_and_scanline(pixel_format, bits_per_sample, sample_format, self.width)?;
        self.pixel_format = pixel_format;
        self.bits_per_sample = bits_per_sample;
        self.sample_format = sample_format;
        self.samples_per_pixel = pixel_format.channels() as u8;
        self.pixel_size = pixel_size;
        self.scanline_width = scanline_width;
        Ok(())
    }

    /// Same layout and sample type, dimensions aside.
    pub(crate) fn same_layout(&self, other: &ImageHeader) -> bool {
        self.pixel_format == other.pixel_format
            && self.bits_per_sample == other.bits_per_sample
            && self.sample_format == other.sample_format
    }

    pub(crate) fn check_same_layout(&self, other: &ImageHeader) -> Result<(), RasterError> {
        if self.same_layout(other) {
            Ok(())
        } else {
            Err(RasterError::ImageMismatch(format!(
                "{:?}/{}-bit {:?} vs {:?}/{}-bit {:?}",
                self.pixel_format,
                self.bits_per_sample,
                self.sample_format,
                other.pixel_format,
                other.bits_per_sample,
                other.sample_format
            )))
        }
    }
}

/// Allocate `len` zeroed bytes, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed(len: usize) -> Result<Vec<u8>, RasterError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| RasterError::OutOfMemory(len))?;
    buf.resize(len, 0);
    Ok(buf)
}
