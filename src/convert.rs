//! Pixel-format conversion.
//!
//! Every conversion is a no-op when the image already has the target
//! format. Otherwise a new buffer is allocated for the target layout, each
//! scanline is converted pixel by pixel, and the new buffer replaces the old
//! one. Allocation failure leaves the image untouched.
//!
//! Channel rules:
//! - alpha is dropped when the target has none;
//! - alpha is 255 when the source has none, except that an `Rgba` target
//!   gets 0 where the pixel equals the transparent key colour;
//! - grey is [`luma`] of the colour;
//! - palette targets rebuild the palette with [`Palette::match_color`];
//! - monochrome maps pure black to 0, pure white to 1 and thresholds
//!   everything else on luma 128, with the palette fixed to black, white.
//!
//! Grid to grid conversions use C cast semantics (truncate, then wrap).

use crate::error::RasterError;
use crate::header::alloc_zeroed;
use crate::image::RasterImage;
use crate::palette::{Palette, luma};
use crate::pixel::{GridSample, PixelFormat};

/// Destination of a pixel conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Rgb,
    Rgba,
    Argb,
    Bgr,
    Bgra,
    Grayscale,
    Palette,
    Monochrome,
}

impl Target {
    pub(crate) fn from_format(format: PixelFormat) -> Option<Self> {
        match format {
            PixelFormat::Rgb => Some(Self::Rgb),
            PixelFormat::Rgba => Some(Self::Rgba),
            PixelFormat::Argb => Some(Self::Argb),
            PixelFormat::Bgr => Some(Self::Bgr),
            PixelFormat::Bgra => Some(Self::Bgra),
            PixelFormat::Grayscale => Some(Self::Grayscale),
            PixelFormat::Palette => Some(Self::Palette),
            PixelFormat::Grid | PixelFormat::Unknown => None,
        }
    }

    pub(crate) fn pixel_format(self) -> PixelFormat {
        match self {
            Self::Rgb => PixelFormat::Rgb,
            Self::Rgba => PixelFormat::Rgba,
            Self::Argb => PixelFormat::Argb,
            Self::Bgr => PixelFormat::Bgr,
            Self::Bgra => PixelFormat::Bgra,
            Self::Grayscale => PixelFormat::Grayscale,
            Self::Palette | Self::Monochrome => PixelFormat::Palette,
        }
    }

    fn initial_palette(self) -> Palette {
        match self {
            Self::Monochrome => Palette::monochrome(),
            _ => Palette::new(),
        }
    }
}

/// Decode one pixel into RGBA; formats without alpha report 255.
#[inline]
pub(crate) fn read_rgba(format: PixelFormat, px: &[u8], palette: &Palette) -> [u8; 4] {
    match format {
        PixelFormat::Rgb => [px[0], px[1], px[2], 255],
        PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
        PixelFormat::Argb => [px[1], px[2], px[3], px[0]],
        PixelFormat::Bgr => [px[2], px[1], px[0], 255],
        PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
        PixelFormat::Grayscale => [px[0], px[0], px[0], 255],
        PixelFormat::Palette => {
            let [r, g, b] = palette.get(px[0]);
            [r, g, b, 255]
        }
        PixelFormat::Grid | PixelFormat::Unknown => [0, 0, 0, 255],
    }
}

/// Monochrome index for a colour.
#[inline]
pub(crate) fn monochrome_index(r: u8, g: u8, b: u8) -> u8 {
    match (r, g, b) {
        (0, 0, 0) => 0,
        (255, 255, 255) => 1,
        _ if luma(r, g, b) < 128 => 0,
        _ => 1,
    }
}

/// Converts scanlines from one pixel format into a target format.
pub(crate) struct RowConverter<'a> {
    pub from: PixelFormat,
    pub src_palette: &'a Palette,
    pub target: Target,
    pub dst_palette: &'a mut Palette,
    pub transparent: Option<[u8; 3]>,
    /// Match against the existing palette without appending.
    pub frozen_palette: bool,
}

impl RowConverter<'_> {
    /// Convert `width` pixels from `src` into `dst`.
    pub(crate) fn convert(&mut self, src: &[u8], dst: &mut [u8], width: usize) {
        let src_px = self.from.channels();
        let dst_px = self.target.pixel_format().channels();
        let src_alpha = self.from.has_alpha();
        for (s, d) in src
            .chunks_exact(src_px)
            .zip(dst.chunks_exact_mut(dst_px))
            .take(width)
        {
            let [r, g, b, a] = read_rgba(self.from, s, self.src_palette);
            let alpha = if src_alpha {
                a
            } else if self.target == Target::Rgba && self.transparent == Some([r, g, b]) {
                0
            } else {
                255
            };
            match self.target {
                Target::Rgb => d.copy_from_slice(&[r, g, b]),
                Target::Rgba => d.copy_from_slice(&[r, g, b, alpha]),
                Target::Argb => d.copy_from_slice(&[alpha, r, g, b]),
                Target::Bgr => d.copy_from_slice(&[b, g, r]),
                Target::Bgra => d.copy_from_slice(&[b, g, r, alpha]),
                Target::Grayscale => d[0] = luma(r, g, b),
                Target::Palette if self.frozen_palette => {
                    d[0] = self
                        .dst_palette
                        .find([r, g, b])
                        .unwrap_or_else(|| self.dst_palette.nearest(r, g, b));
                }
                Target::Palette => d[0] = self.dst_palette.match_color(r, g, b),
                Target::Monochrome => d[0] = monochrome_index(r, g, b),
            }
        }
    }
}

impl RasterImage {
    pub fn convert_to_rgb(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Rgb)
    }

    pub fn convert_to_rgba(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Rgba)
    }

    pub fn convert_to_argb(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Argb)
    }

    pub fn convert_to_bgr(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Bgr)
    }

    pub fn convert_to_bgra(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Bgra)
    }

    pub fn convert_to_grayscale(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Grayscale)
    }

    /// Rebuild as a palette image; the palette starts empty.
    pub fn convert_to_palette(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Palette)
    }

    /// Two-entry black/white palette image.
    pub fn convert_to_monochrome(&mut self) -> Result<(), RasterError> {
        self.convert_pixels(Target::Monochrome)
    }

    /// Convert to any non-grid pixel format.
    pub fn convert_to(&mut self, format: PixelFormat) -> Result<(), RasterError> {
        let target = Target::from_format(format).ok_or_else(|| {
            RasterError::InvalidArgument(format!("cannot convert pixels to {format:?}"))
        })?;
        self.convert_pixels(target)
    }

    /// Convert grid samples to another storage type by raw casting.
    ///
    /// A `Float64` value of 65537.9 becomes 1 as `UInt16`: the value is
    /// truncated to 65537 and then wrapped to 16 bits. The no-data value is
    /// cast the same way.
    pub fn convert_to_grid(&mut self, target: GridSample) -> Result<(), RasterError> {
        let source = self
            .grid_sample()
            .ok_or_else(|| RasterError::InvalidImage("grid conversion of a pixel image".into()))?;
        if source == target {
            return Ok(());
        }
        let count = self.width() as usize * self.height() as usize;
        let len = count
            .checked_mul(target.byte_width())
            .ok_or(RasterError::DimensionsTooLarge {
                width: self.width(),
                height: self.height(),
            })?;
        let mut out = alloc_zeroed(len)?;
        for (s, d) in self
            .pixels
            .chunks_exact(source.byte_width())
            .zip(out.chunks_exact_mut(target.byte_width()))
        {
            target.write(source.read(s), d);
        }

        self.header.set_layout(
            PixelFormat::Grid,
            target.bits_per_sample(),
            target.sample_format(),
        )?;
        self.pixels = out;
        self.header.no_data = self.header.no_data.map(|v| {
            let mut tmp = [0u8; 8];
            target.write_f64(v, &mut tmp);
            target.read_f64(&tmp)
        });
        self.header.min_value = None;
        self.header.max_value = None;
        Ok(())
    }

    fn convert_pixels(&mut self, target: Target) -> Result<(), RasterError> {
        let from = self.header.pixel_format;
        if matches!(from, PixelFormat::Grid | PixelFormat::Unknown) {
            return Err(RasterError::InvalidImage(format!(
                "cannot convert {from:?} to {:?}",
                target.pixel_format()
            )));
        }
        let already = match target {
            Target::Monochrome => from == PixelFormat::Palette && self.header.palette.is_monochrome(),
            other => from == other.pixel_format(),
        };
        if already {
            return Ok(());
        }

        let dst_format = target.pixel_format();
        let dst_line = self.width() as usize * dst_format.channels();
        let len = dst_line
            .checked_mul(self.height() as usize)
            .ok_or(RasterError::DimensionsTooLarge {
                width: self.width(),
                height: self.height(),
            })?;
        let mut out = alloc_zeroed(len)?;
        let mut palette = target.initial_palette();
        {
            let mut conv = RowConverter {
                from,
                src_palette: &self.header.palette,
                target,
                dst_palette: &mut palette,
                transparent: self.header.transparent,
                frozen_palette: false,
            };
            let src_line = self.header.scanline_width;
            let width = self.width() as usize;
            for (s, d) in self
                .pixels
                .chunks_exact(src_line)
                .zip(out.chunks_exact_mut(dst_line))
            {
                conv.convert(s, d, width);
            }
        }

        self.header
            .set_layout(dst_format, 8, crate::pixel::SampleFormat::UInt)?;
        self.header.palette = palette;
        self.pixels = out;
        Ok(())
    }
}
