//! JPEG adapter over the `image` crate's baseline codec.
//!
//! Greyscale and RGB are stored as is; other pixel formats are converted to
//! RGB on a copy first. Strip writes are buffered and compressed on finish.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use image::ImageDecoder as _;

use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::strip::{Materialized, ReadState, RowWriter, StripImage, WriteState};
use enough::Stop;

/// Default encoder quality.
pub const DEFAULT_QUALITY: u8 = 85;

#[derive(Clone, Debug)]
pub struct JpegOptions {
    /// 1..=100.
    pub quality: u8,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }
}

fn header_of(data: &[u8]) -> Result<ImageHeader, RasterError> {
    let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(data))?;
    let (w, h) = decoder.dimensions();
    let format = match decoder.color_type() {
        image::ColorType::L8 | image::ColorType::L16 => PixelFormat::Grayscale,
        _ => PixelFormat::Rgb,
    };
    ImageHeader::pixels(format, w, h)
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    Ok(ImageInfos::new(ImageFormat::Jpeg, header_of(data)?))
}

/// Decode to greyscale or RGB (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let header = header_of(data)?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    stop.check()?;
    let decoded = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)?;
    let pixels = match header.pixel_format() {
        PixelFormat::Grayscale => decoded.into_luma8().into_raw(),
        _ => decoded.into_rgb8().into_raw(),
    };
    RasterImage::from_buffer(header, pixels)
}

fn encode_pixels(
    header: &ImageHeader,
    pixels: &[u8],
    quality: u8,
) -> Result<Vec<u8>, RasterError> {
    if !(1..=100).contains(&quality) {
        return Err(RasterError::InvalidArgument(format!(
            "JPEG quality {quality} outside 1..=100"
        )));
    }
    let color = match header.pixel_format() {
        PixelFormat::Grayscale => image::ExtendedColorType::L8,
        PixelFormat::Rgb => image::ExtendedColorType::Rgb8,
        other => {
            return Err(RasterError::UnsupportedLayout(format!(
                "JPEG stores grey or RGB, not {other:?}"
            )));
        }
    };
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality).encode(
        pixels,
        header.width(),
        header.height(),
        color,
    )?;
    Ok(out)
}

/// Encode as baseline JPEG (called from EncodeRequest).
pub(crate) fn encode(
    image: &RasterImage,
    options: &JpegOptions,
    stop: &dyn Stop,
) -> Result<Vec<u8>, RasterError> {
    stop.check()?;
    match image.pixel_format() {
        PixelFormat::Grayscale | PixelFormat::Rgb => {
            encode_pixels(image.header(), image.pixels(), options.quality)
        }
        PixelFormat::Grid | PixelFormat::Unknown => Err(RasterError::UnsupportedLayout(format!(
            "JPEG cannot store {:?}",
            image.pixel_format()
        ))),
        _ => {
            let mut rgb = image.clone();
            rgb.convert_to_rgb()?;
            stop.check()?;
            encode_pixels(rgb.header(), rgb.pixels(), options.quality)
        }
    }
}

/// Start a strip read session; the image is decoded up front.
pub fn open_strips<R: Read>(mut source: R) -> Result<StripImage, RasterError> {
    let mut data = Vec::new();
    source.read_to_end(&mut data)?;
    let image = decode(&data, None, &enough::Unstoppable)?;
    let header = image.header().clone();
    Ok(StripImage::for_reading(
        header,
        ImageFormat::Jpeg,
        ReadState::Materialized(Materialized::new(image.into_pixels())),
    ))
}

/// Buffers every row and compresses on finish.
pub(crate) struct JpegRowWriter {
    out: Box<dyn Write>,
    pixels: Vec<u8>,
    quality: u8,
}

impl RowWriter for JpegRowWriter {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        let start = header.rows_len(first_row)?;
        self.pixels[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn finish(mut self, header: &ImageHeader) -> Result<(), RasterError> {
        let encoded = encode_pixels(header, &self.pixels, self.quality)?;
        self.out.write_all(&encoded)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Start a strip write session for a greyscale or RGB header.
pub fn create_strips<W: Write + 'static>(
    out: W,
    header: ImageHeader,
    options: &JpegOptions,
) -> Result<StripImage, RasterError> {
    if !matches!(header.pixel_format(), PixelFormat::Grayscale | PixelFormat::Rgb) {
        return Err(RasterError::UnsupportedLayout(format!(
            "JPEG strips must be grey or RGB, not {:?}",
            header.pixel_format()
        )));
    }
    let pixels = alloc_zeroed(header.rows_len(header.height())?)?;
    let writer = JpegRowWriter {
        out: Box::new(out),
        pixels,
        quality: options.quality,
    };
    Ok(StripImage::for_writing(
        header,
        ImageFormat::Jpeg,
        WriteState::Jpeg(writer),
    ))
}

/// [`create_strips`] onto a new file.
pub fn create_strips_file(
    path: impl AsRef<Path>,
    header: ImageHeader,
    options: &JpegOptions,
) -> Result<StripImage, RasterError> {
    create_strips(crate::strip::create_file(path.as_ref())?, header, options)
}
