//! PNG adapter over the `png` crate.
//!
//! Decoding accepts every colour type and bit depth: 16-bit samples are
//! stripped to 8, 1/2/4-bit samples are unpacked (grey is scaled, palette
//! indices are not), grey+alpha widens to RGBA and tRNS becomes the
//! transparent colour. Encoding writes 8-bit palette, grey, RGB or RGBA;
//! BGR, BGRA and ARGB are reordered per row.
//!
//! Strip reading is true streaming and needs a non-interlaced file: an
//! interlaced image only becomes complete after its last pass.

mod decode;
mod encode;

pub(crate) use decode::PngRowReader;
pub(crate) use encode::PngRowWriter;

use std::io::{Read, Write};
use std::path::Path;

use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::strip::{ReadState, StripImage, WriteState};
use enough::Stop;

/// zlib effort used by the encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

#[derive(Clone, Debug, Default)]
pub struct PngOptions {
    pub compression: PngCompression,
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    decode::probe(data)
}

/// Decode a whole PNG (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let (header, pixels) = decode::decode_full(data, limits, stop)?;
    RasterImage::from_buffer(header, pixels)
}

/// Encode a raster as PNG (called from EncodeRequest).
pub(crate) fn encode(
    image: &RasterImage,
    options: &PngOptions,
    stop: &dyn Stop,
) -> Result<Vec<u8>, RasterError> {
    encode::encode_full(image.header(), image.pixels(), options, stop)
}

/// Start a strip read session over a non-interlaced PNG stream.
pub fn open_strips<R: Read + 'static>(source: R) -> Result<StripImage, RasterError> {
    let boxed: Box<dyn Read> = Box::new(source);
    let (reader, header, layout, interlaced) = decode::read_header(boxed)?;
    if interlaced {
        return Err(RasterError::UnsupportedLayout(
            "interlaced PNG cannot be read by strips".into(),
        ));
    }
    Ok(StripImage::for_reading(
        header,
        ImageFormat::Png,
        ReadState::Png(PngRowReader::new(reader, layout)),
    ))
}

/// Start a strip write session; the IHDR, PLTE and tRNS chunks are written
/// immediately, so the palette must be final.
pub fn create_strips<W: Write + 'static>(
    out: W,
    header: ImageHeader,
    options: &PngOptions,
) -> Result<StripImage, RasterError> {
    let writer = PngRowWriter::new(Box::new(out), &header, options)?;
    Ok(StripImage::for_writing(
        header,
        ImageFormat::Png,
        WriteState::Png(writer),
    ))
}

/// [`create_strips`] onto a new file.
pub fn create_strips_file(
    path: impl AsRef<Path>,
    header: ImageHeader,
    options: &PngOptions,
) -> Result<StripImage, RasterError> {
    create_strips(crate::strip::create_file(path.as_ref())?, header, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelFormat;
    use enough::Unstoppable;

    fn sample(format: PixelFormat) -> RasterImage {
        let mut img = RasterImage::new(format, 3, 2).unwrap();
        for (i, p) in img.pixels_mut().iter_mut().enumerate() {
            *p = (i * 37) as u8;
        }
        img
    }

    #[test]
    fn roundtrip_direct_formats() {
        for format in [PixelFormat::Grayscale, PixelFormat::Rgb, PixelFormat::Rgba] {
            let img = sample(format);
            let bytes = encode(&img, &PngOptions::default(), &Unstoppable).unwrap();
            let back = decode(&bytes, None, &Unstoppable).unwrap();
            assert_eq!(back.pixel_format(), format);
            assert_eq!(back.pixels(), img.pixels());
        }
    }

    #[test]
    fn bgr_is_reordered() {
        let header = ImageHeader::pixels(PixelFormat::Bgr, 1, 1).unwrap();
        let img = RasterImage::from_buffer(header, vec![1, 2, 3]).unwrap();
        let bytes = encode(&img, &PngOptions::default(), &Unstoppable).unwrap();
        let back = decode(&bytes, None, &Unstoppable).unwrap();
        assert_eq!(back.pixel_format(), PixelFormat::Rgb);
        assert_eq!(back.pixels(), &[3, 2, 1]);
    }

    #[test]
    fn palette_and_transparency_survive() {
        let mut img = RasterImage::new(PixelFormat::Palette, 2, 1).unwrap();
        img.palette_mut().set(0, [10, 20, 30]);
        img.palette_mut().set(1, [40, 50, 60]);
        img.pixels_mut().copy_from_slice(&[1, 0]);
        img.set_transparent(Some([40, 50, 60]));
        let bytes = encode(&img, &PngOptions::default(), &Unstoppable).unwrap();
        let back = decode(&bytes, None, &Unstoppable).unwrap();
        assert_eq!(back.pixels(), &[1, 0]);
        assert_eq!(back.palette().len(), 2);
        assert_eq!(back.transparent(), Some([40, 50, 60]));
    }

    #[test]
    fn grid_rejected() {
        let img = RasterImage::new_grid(crate::GridSample::Int16, 1, 1).unwrap();
        assert!(matches!(
            encode(&img, &PngOptions::default(), &Unstoppable),
            Err(RasterError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn probe_reports_dimensions() {
        let bytes = encode(&sample(PixelFormat::Rgb), &PngOptions::default(), &Unstoppable).unwrap();
        let info = probe_header(&bytes).unwrap();
        assert_eq!((info.width(), info.height()), (3, 2));
        assert_eq!(info.pixel_format(), PixelFormat::Rgb);
        assert!(!info.interlaced);
    }
}
