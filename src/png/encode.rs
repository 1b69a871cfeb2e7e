use std::io::Write;

use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::pixel::PixelFormat;
use crate::strip::RowWriter;

use super::{PngCompression, PngOptions};

/// How a pixel format is stored in a PNG.
#[derive(Clone, Copy, Debug)]
enum Native {
    Copy(png::ColorType),
    /// BGR to RGB.
    SwapBgr,
    /// BGRA to RGBA.
    SwapBgra,
    /// ARGB to RGBA.
    RotateArgb,
}

fn native(format: PixelFormat) -> Result<Native, RasterError> {
    Ok(match format {
        PixelFormat::Grayscale => Native::Copy(png::ColorType::Grayscale),
        PixelFormat::Palette => Native::Copy(png::ColorType::Indexed),
        PixelFormat::Rgb => Native::Copy(png::ColorType::Rgb),
        PixelFormat::Rgba => Native::Copy(png::ColorType::Rgba),
        PixelFormat::Bgr => Native::SwapBgr,
        PixelFormat::Bgra => Native::SwapBgra,
        PixelFormat::Argb => Native::RotateArgb,
        PixelFormat::Grid | PixelFormat::Unknown => {
            return Err(RasterError::UnsupportedLayout(format!(
                "PNG cannot store {format:?} pixels"
            )));
        }
    })
}

impl Native {
    fn color_type(self) -> png::ColorType {
        match self {
            Native::Copy(c) => c,
            Native::SwapBgr => png::ColorType::Rgb,
            Native::SwapBgra | Native::RotateArgb => png::ColorType::Rgba,
        }
    }

    fn convert<'a>(self, src: &'a [u8], scratch: &'a mut Vec<u8>) -> &'a [u8] {
        match self {
            Native::Copy(_) => src,
            Native::SwapBgr => {
                scratch.clear();
                for p in src.chunks_exact(3) {
                    scratch.extend_from_slice(&[p[2], p[1], p[0]]);
                }
                scratch
            }
            Native::SwapBgra => {
                scratch.clear();
                for p in src.chunks_exact(4) {
                    scratch.extend_from_slice(&[p[2], p[1], p[0], p[3]]);
                }
                scratch
            }
            Native::RotateArgb => {
                scratch.clear();
                for p in src.chunks_exact(4) {
                    scratch.extend_from_slice(&[p[1], p[2], p[3], p[0]]);
                }
                scratch
            }
        }
    }
}

/// tRNS payload for the header's transparent colour.
fn trns_chunk(header: &ImageHeader, color: png::ColorType) -> Option<Vec<u8>> {
    let [r, g, b] = header.transparent?;
    match color {
        png::ColorType::Indexed => {
            let index = header.palette.find([r, g, b])? as usize;
            let mut alpha = vec![255u8; index + 1];
            alpha[index] = 0;
            Some(alpha)
        }
        png::ColorType::Grayscale => Some(vec![0, r]),
        png::ColorType::Rgb => Some(vec![0, r, 0, g, 0, b]),
        _ => None,
    }
}

fn start<W: Write>(
    out: W,
    header: &ImageHeader,
    options: &PngOptions,
) -> Result<(png::Writer<W>, Native), RasterError> {
    let native = native(header.pixel_format())?;
    let color = native.color_type();
    let mut encoder = png::Encoder::new(out, header.width(), header.height());
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(match options.compression {
        PngCompression::Fast => png::Compression::Fast,
        PngCompression::Default => png::Compression::Default,
        PngCompression::Best => png::Compression::Best,
    });
    if color == png::ColorType::Indexed {
        let mut plte = header.palette.to_rgb_triplets();
        if plte.is_empty() {
            plte.extend_from_slice(&[0, 0, 0]);
        }
        encoder.set_palette(plte);
    }
    if let Some(trns) = trns_chunk(header, color) {
        encoder.set_trns(trns);
    }
    Ok((encoder.write_header()?, native))
}

pub(crate) fn encode_full(
    header: &ImageHeader,
    pixels: &[u8],
    options: &PngOptions,
    stop: &dyn enough::Stop,
) -> Result<Vec<u8>, RasterError> {
    let mut out = Vec::new();
    {
        let (mut writer, native) = start(&mut out, header, options)?;
        let mut stream = writer.stream_writer()?;
        let mut scratch = Vec::new();
        for (y, row) in pixels.chunks_exact(header.scanline_width()).enumerate() {
            if y % 16 == 0 {
                stop.check()?;
            }
            stream.write_all(native.convert(row, &mut scratch))?;
        }
        stream.finish()?;
    }
    Ok(out)
}

/// Streaming PNG writer fed by strips.
pub(crate) struct PngRowWriter {
    stream: png::StreamWriter<'static, Box<dyn Write>>,
    native: Native,
    scratch: Vec<u8>,
}

impl PngRowWriter {
    pub(crate) fn new(
        out: Box<dyn Write>,
        header: &ImageHeader,
        options: &PngOptions,
    ) -> Result<Self, RasterError> {
        let (writer, native) = start(out, header, options)?;
        Ok(Self {
            stream: writer.into_stream_writer()?,
            native,
            scratch: Vec::new(),
        })
    }
}

impl RowWriter for PngRowWriter {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        _first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        for row in buf.chunks_exact(header.scanline_width()) {
            let data = self.native.convert(row, &mut self.scratch);
            self.stream.write_all(data)?;
        }
        Ok(())
    }

    fn finish(self, _header: &ImageHeader) -> Result<(), RasterError> {
        self.stream.finish()?;
        Ok(())
    }
}
