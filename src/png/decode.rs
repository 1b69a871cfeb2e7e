use std::io::Read;

use crate::bits::unpack_samples;
use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::pixel::PixelFormat;
use crate::strip::RowReader;

/// Decoded PNG row layout once 16-bit samples are stripped.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PngLayout {
    color: png::ColorType,
    depth: u8,
}

impl PngLayout {
    fn pixel_format(self) -> PixelFormat {
        match self.color {
            png::ColorType::Grayscale => PixelFormat::Grayscale,
            png::ColorType::Indexed => PixelFormat::Palette,
            png::ColorType::Rgb => PixelFormat::Rgb,
            png::ColorType::Rgba | png::ColorType::GrayscaleAlpha => PixelFormat::Rgba,
        }
    }

    /// Convert one decoded row into the header layout.
    pub(crate) fn expand_row(self, src: &[u8], dst: &mut [u8]) {
        match self.color {
            png::ColorType::Grayscale => unpack_samples(self.depth, true, src, dst),
            png::ColorType::Indexed => unpack_samples(self.depth, false, src, dst),
            png::ColorType::Rgb | png::ColorType::Rgba => {
                let n = dst.len().min(src.len());
                dst[..n].copy_from_slice(&src[..n]);
            }
            png::ColorType::GrayscaleAlpha => {
                for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                    d.copy_from_slice(&[s[0], s[0], s[0], s[1]]);
                }
            }
        }
    }
}

fn depth_bits(depth: png::BitDepth) -> u8 {
    match depth {
        png::BitDepth::One => 1,
        png::BitDepth::Two => 2,
        png::BitDepth::Four => 4,
        png::BitDepth::Eight | png::BitDepth::Sixteen => 8,
    }
}

/// Open the stream and build the header from IHDR, PLTE and tRNS.
pub(crate) fn read_header<R: Read>(
    source: R,
) -> Result<(png::Reader<R>, ImageHeader, PngLayout, bool), RasterError> {
    let mut decoder = png::Decoder::new(source);
    decoder.set_transformations(png::Transformations::STRIP_16);
    let reader = decoder.read_info()?;
    let (color, depth) = reader.output_color_type();
    let layout = PngLayout {
        color,
        depth: depth_bits(depth),
    };

    let info = reader.info();
    let interlaced = info.interlaced;
    let source_depth = info.bit_depth;
    let mut header = ImageHeader::pixels(layout.pixel_format(), info.width, info.height)?;

    if let Some(plte) = info.palette.as_deref() {
        if color == png::ColorType::Indexed {
            header.palette = Palette::from_rgb_triplets(plte);
        }
    }
    if let Some(trns) = info.trns.as_deref() {
        header.transparent = transparent_key(color, source_depth, trns, &header.palette);
    }
    Ok((reader, header, layout, interlaced))
}

/// The tRNS chunk as a single transparent colour.
///
/// For palettes, the first fully transparent entry is the key.
fn transparent_key(
    color: png::ColorType,
    depth: png::BitDepth,
    trns: &[u8],
    palette: &Palette,
) -> Option<[u8; 3]> {
    let sample = |hi: u8, lo: u8| -> u8 {
        match depth {
            png::BitDepth::Sixteen => hi,
            png::BitDepth::One => lo.wrapping_mul(0xFF),
            png::BitDepth::Two => lo.wrapping_mul(0x55),
            png::BitDepth::Four => lo.wrapping_mul(0x11),
            png::BitDepth::Eight => lo,
        }
    };
    match color {
        png::ColorType::Indexed => trns
            .iter()
            .position(|&a| a == 0)
            .map(|i| palette.get(i as u8)),
        png::ColorType::Grayscale if trns.len() >= 2 => {
            let v = sample(trns[0], trns[1]);
            Some([v, v, v])
        }
        png::ColorType::Rgb if trns.len() >= 6 => Some([
            sample(trns[0], trns[1]),
            sample(trns[2], trns[3]),
            sample(trns[4], trns[5]),
        ]),
        _ => None,
    }
}

pub(crate) fn probe(data: &[u8]) -> Result<ImageInfos, RasterError> {
    let (_, header, _, interlaced) = read_header(data)?;
    let mut info = ImageInfos::new(ImageFormat::Png, header);
    info.interlaced = interlaced;
    Ok(info)
}

pub(crate) fn decode_full(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn enough::Stop,
) -> Result<(ImageHeader, Vec<u8>), RasterError> {
    let (mut reader, header, layout, _) = read_header(data)?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    stop.check()?;

    let mut raw = alloc_zeroed(reader.output_buffer_size())?;
    let frame = reader.next_frame(&mut raw)?;
    let line = header.scanline_width();
    let mut pixels = alloc_zeroed(header.rows_len(header.height())?)?;
    for (y, (src, dst)) in raw
        .chunks(frame.line_size)
        .zip(pixels.chunks_exact_mut(line))
        .enumerate()
    {
        if y % 16 == 0 {
            stop.check()?;
        }
        layout.expand_row(src, dst);
    }
    Ok((header, pixels))
}

/// Row-at-a-time reader over a non-interlaced PNG.
pub(crate) struct PngRowReader {
    reader: png::Reader<Box<dyn Read>>,
    layout: PngLayout,
    next_row: u32,
}

impl PngRowReader {
    pub(crate) fn new(reader: png::Reader<Box<dyn Read>>, layout: PngLayout) -> Self {
        Self {
            reader,
            layout,
            next_row: 0,
        }
    }
}

impl RowReader for PngRowReader {
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        if first_row != self.next_row {
            return Err(RasterError::UnsupportedLayout(format!(
                "PNG rows are sequential: asked for {first_row}, next is {}",
                self.next_row
            )));
        }
        for dst in buf.chunks_exact_mut(header.scanline_width()) {
            let row = self
                .reader
                .next_row()?
                .ok_or_else(|| RasterError::PngCodec("image data ended early".into()))?;
            self.layout.expand_row(row.data(), dst);
            self.next_row += 1;
        }
        Ok(())
    }
}
