//! RAW framing for handing pixel planes between in-process stages.
//!
//! A frame is
//!
//! ```text
//! start marker  u16 LE   0xC000 | type << 4 | pass
//! width         u32 LE
//! height        u32 LE
//! palette       u16 LE count + count RGB triplets   (palette type only)
//! pixels        height * scanline bytes, grid samples little-endian
//! end marker    u16 LE   0x3000 | type << 4 | pass
//! ```
//!
//! Pass 0 carries a whole image; passes 1..=7 carry the ADAM7 sub-images
//! produced by [`Adam7Planes::split`].

use crate::error::RasterError;
use crate::grid::ByteOrder;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::palette::Palette;
use crate::pixel::{GridSample, PixelFormat};
use enough::Stop;

const START: u16 = 0xC000;
const END: u16 = 0x3000;
const KIND_MASK: u16 = 0xF000;

/// ADAM7 passes as `(x0, y0, dx, dy)`, pass 1 first.
pub const ADAM7_PASSES: [(u32, u32, u32, u32); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

fn type_code(header: &ImageHeader) -> Result<u16, RasterError> {
    Ok(match header.pixel_format() {
        PixelFormat::Grayscale => 1,
        PixelFormat::Palette => 2,
        PixelFormat::Rgb => 3,
        PixelFormat::Rgba => 4,
        PixelFormat::Argb => 5,
        PixelFormat::Bgr => 6,
        PixelFormat::Bgra => 7,
        PixelFormat::Grid => match header.grid_sample() {
            Some(GridSample::Int8) => 8,
            Some(GridSample::UInt8) => 9,
            Some(GridSample::Int16) => 10,
            Some(GridSample::UInt16) => 11,
            Some(GridSample::Int32) => 12,
            Some(GridSample::UInt32) => 13,
            Some(GridSample::Float32) => 14,
            Some(GridSample::Float64) => 15,
            None => return Err(RasterError::UnsupportedLayout("grid without sample".into())),
        },
        PixelFormat::Unknown => {
            return Err(RasterError::UnsupportedLayout(
                "RAW cannot frame an unknown pixel format".into(),
            ));
        }
    })
}

fn header_for(code: u16, width: u32, height: u32) -> Result<ImageHeader, RasterError> {
    let pixels = |f| ImageHeader::pixels(f, width, height);
    let grid = |s| ImageHeader::grid(s, width, height);
    match code {
        1 => pixels(PixelFormat::Grayscale),
        2 => pixels(PixelFormat::Palette),
        3 => pixels(PixelFormat::Rgb),
        4 => pixels(PixelFormat::Rgba),
        5 => pixels(PixelFormat::Argb),
        6 => pixels(PixelFormat::Bgr),
        7 => pixels(PixelFormat::Bgra),
        8 => grid(GridSample::Int8),
        9 => grid(GridSample::UInt8),
        10 => grid(GridSample::Int16),
        11 => grid(GridSample::UInt16),
        12 => grid(GridSample::Int32),
        13 => grid(GridSample::UInt32),
        14 => grid(GridSample::Float32),
        15 => grid(GridSample::Float64),
        other => Err(RasterError::RawCodec(format!("unknown type code {other}"))),
    }
}

/// Start marker for a header and pass.
pub fn start_marker(header: &ImageHeader, pass: u8) -> Result<u16, RasterError> {
    if pass > 7 {
        return Err(RasterError::InvalidArgument(format!("ADAM7 pass {pass}")));
    }
    Ok(START | type_code(header)? << 4 | u16::from(pass))
}

/// End marker matching a start marker.
pub fn end_marker(start: u16) -> u16 {
    (start & !KIND_MASK) | END
}

fn split_marker(marker: u16) -> Option<(u16, u8)> {
    let code = (marker >> 4) & 0xFF;
    let pass = (marker & 0xF) as u8;
    (marker & KIND_MASK == START && (1..=15).contains(&code) && pass <= 7).then_some((code, pass))
}

pub(crate) fn is_start_marker(data: &[u8]) -> bool {
    data.get(..2)
        .is_some_and(|m| split_marker(u16::from_le_bytes([m[0], m[1]])).is_some())
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], RasterError> {
        let bytes = self
            .pos
            .checked_add(n)
            .and_then(|end| self.data.get(self.pos..end))
            .ok_or_else(|| RasterError::RawCodec("frame is truncated".into()))?;
        self.pos += n;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16, RasterError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, RasterError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Marker, pass and header of the frame at the cursor.
fn read_frame_header(cur: &mut Cursor<'_>) -> Result<(u16, u8, ImageHeader), RasterError> {
    let marker = cur.u16()?;
    let (code, pass) = split_marker(marker)
        .ok_or_else(|| RasterError::RawCodec(format!("bad start marker {marker:#06x}")))?;
    let width = cur.u32()?;
    let height = cur.u32()?;
    let mut header = header_for(code, width, height)?;
    if header.pixel_format() == PixelFormat::Palette {
        let count = usize::from(cur.u16()?);
        if count > crate::palette::PALETTE_SLOTS {
            return Err(RasterError::RawCodec(format!("{count} palette entries")));
        }
        header.palette = Palette::from_rgb_triplets(cur.take(count * 3)?);
    }
    Ok((marker, pass, header))
}

/// One decoded frame.
#[derive(Clone, Debug)]
pub struct RawFrame {
    /// 0 for a whole image, 1..=7 for an ADAM7 pass.
    pub pass: u8,
    pub image: RasterImage,
}

fn read_frame(
    cur: &mut Cursor<'_>,
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RawFrame, RasterError> {
    let (marker, pass, header) = read_frame_header(cur)?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    stop.check()?;
    let len = header.rows_len(header.height())?;
    let mut pixels = alloc_zeroed(len)?;
    pixels.copy_from_slice(cur.take(len)?);
    if let Some(sample) = header.grid_sample() {
        ByteOrder::LittleEndian.swap_samples(sample.byte_width(), &mut pixels);
    }
    let end = cur.u16()?;
    if end != end_marker(marker) {
        return Err(RasterError::RawCodec(format!(
            "end marker {end:#06x} does not match start {marker:#06x}"
        )));
    }
    Ok(RawFrame {
        pass,
        image: RasterImage::from_buffer(header, pixels)?,
    })
}

/// Decode the first frame of `data`.
pub fn decode_frame(data: &[u8]) -> Result<RawFrame, RasterError> {
    read_frame(&mut Cursor { data, pos: 0 }, None, &enough::Unstoppable)
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    let (_, pass, header) = read_frame_header(&mut Cursor { data, pos: 0 })?;
    let mut info = ImageInfos::new(ImageFormat::Raw, header);
    info.interlaced = pass > 0;
    Ok(info)
}

/// Decode the first frame's image (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    Ok(read_frame(&mut Cursor { data, pos: 0 }, limits, stop)?.image)
}

/// Append one frame for `image` as `pass`.
pub fn encode_frame(image: &RasterImage, pass: u8, out: &mut Vec<u8>) -> Result<(), RasterError> {
    let marker = start_marker(image.header(), pass)?;
    out.extend_from_slice(&marker.to_le_bytes());
    out.extend_from_slice(&image.width().to_le_bytes());
    out.extend_from_slice(&image.height().to_le_bytes());
    if image.pixel_format() == PixelFormat::Palette {
        let table = image.palette().to_rgb_triplets();
        out.extend_from_slice(&((table.len() / 3) as u16).to_le_bytes());
        out.extend_from_slice(&table);
    }
    let start = out.len();
    out.extend_from_slice(image.pixels());
    if let Some(sample) = image.grid_sample() {
        ByteOrder::LittleEndian.swap_samples(sample.byte_width(), &mut out[start..]);
    }
    out.extend_from_slice(&end_marker(marker).to_le_bytes());
    Ok(())
}

/// Encode a whole-image frame (called from EncodeRequest).
pub(crate) fn encode(image: &RasterImage, stop: &dyn Stop) -> Result<Vec<u8>, RasterError> {
    stop.check()?;
    let mut out = Vec::new();
    encode_frame(image, 0, &mut out)?;
    Ok(out)
}

/// Size of ADAM7 pass `pass` (1..=7) of a `width` x `height` image.
pub fn adam7_pass_size(width: u32, height: u32, pass: u8) -> (u32, u32) {
    let (x0, y0, dx, dy) = ADAM7_PASSES[usize::from(pass.clamp(1, 7)) - 1];
    let span = |len: u32, start: u32, step: u32| {
        if len > start {
            (len - start).div_ceil(step)
        } else {
            0
        }
    };
    (span(width, x0, dx), span(height, y0, dy))
}

/// The seven ADAM7 sub-images of one image. Passes that would be empty
/// for small images are `None`.
#[derive(Clone, Debug)]
pub struct Adam7Planes {
    pub width: u32,
    pub height: u32,
    pub passes: [Option<RasterImage>; 7],
}

impl Adam7Planes {
    /// Split `image` into its passes; each pass keeps the palette,
    /// transparency and no-data value.
    pub fn split(image: &RasterImage) -> Result<Self, RasterError> {
        let ps = image.pixel_size();
        let mut passes: [Option<RasterImage>; 7] = Default::default();
        for (i, slot) in passes.iter_mut().enumerate() {
            let (pw, ph) = adam7_pass_size(image.width(), image.height(), i as u8 + 1);
            if pw == 0 || ph == 0 {
                continue;
            }
            let (x0, y0, dx, dy) = ADAM7_PASSES[i];
            let mut header = image.header().clone();
            header.width = pw;
            header.height = ph;
            header.scanline_width = pw as usize * ps;
            header.georef.clear();
            let mut pass = RasterImage::from_header(header)?;
            for j in 0..ph {
                let src = image.row(y0 + j * dy);
                let dst = pass.row_mut(j);
                for (k, out) in dst.chunks_exact_mut(ps).enumerate() {
                    let x = (x0 + k as u32 * dx) as usize * ps;
                    out.copy_from_slice(&src[x..x + ps]);
                }
            }
            *slot = Some(pass);
        }
        Ok(Self {
            width: image.width(),
            height: image.height(),
            passes,
        })
    }

    /// Rebuild the image at 1:`scale` (1, 2, 4 or 8) from the passes that
    /// scale needs: all seven, 1..=5, 1..=3, or pass 1 alone.
    pub fn merge(&self, scale: u32) -> Result<RasterImage, RasterError> {
        let needed = match scale {
            1 => 7,
            2 => 5,
            4 => 3,
            8 => 1,
            other => {
                return Err(RasterError::InvalidArgument(format!(
                    "ADAM7 merge scale {other}, expected 1, 2, 4 or 8"
                )));
            }
        };
        let template = self.passes[0]
            .as_ref()
            .ok_or_else(|| RasterError::ImageMismatch("ADAM7 pass 1 is missing".into()))?;
        let mut header = template.header().clone();
        header.width = self.width.div_ceil(scale);
        header.height = self.height.div_ceil(scale);
        header.scanline_width = header.width as usize * header.pixel_size();
        let mut out = RasterImage::from_header(header)?;
        let ps = out.pixel_size();

        for (i, slot) in self.passes.iter().take(needed).enumerate() {
            let (pw, ph) = adam7_pass_size(self.width, self.height, i as u8 + 1);
            if pw == 0 || ph == 0 {
                continue;
            }
            let pass = slot.as_ref().ok_or_else(|| {
                RasterError::ImageMismatch(format!("ADAM7 pass {} is missing", i + 1))
            })?;
            if (pass.width(), pass.height()) != (pw, ph) {
                return Err(RasterError::ImageMismatch(format!(
                    "ADAM7 pass {} is {}x{}, expected {pw}x{ph}",
                    i + 1,
                    pass.width(),
                    pass.height()
                )));
            }
            template.header().check_same_layout(pass.header())?;
            let (x0, y0, dx, dy) = ADAM7_PASSES[i];
            for j in 0..ph {
                let y = y0 + j * dy;
                if y % scale != 0 {
                    continue;
                }
                let src = pass.row(j);
                for k in 0..pw {
                    let x = x0 + k * dx;
                    if x % scale != 0 {
                        continue;
                    }
                    let s = k as usize * ps;
                    let d = (x / scale) as usize * ps;
                    out.row_mut(y / scale)[d..d + ps].copy_from_slice(&src[s..s + ps]);
                }
            }
        }
        Ok(out)
    }

    /// Frames for every non-empty pass, concatenated.
    pub fn encode(&self) -> Result<Vec<u8>, RasterError> {
        let mut out = Vec::new();
        for (i, pass) in self.passes.iter().enumerate() {
            if let Some(img) = pass {
                encode_frame(img, i as u8 + 1, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Read concatenated pass frames of a `width` x `height` image.
    pub fn decode(data: &[u8], width: u32, height: u32) -> Result<Self, RasterError> {
        let mut cur = Cursor { data, pos: 0 };
        let mut passes: [Option<RasterImage>; 7] = Default::default();
        while cur.pos < data.len() {
            let frame = read_frame(&mut cur, None, &enough::Unstoppable)?;
            if frame.pass == 0 {
                return Err(RasterError::RawCodec(
                    "whole-image frame among ADAM7 passes".into(),
                ));
            }
            passes[usize::from(frame.pass) - 1] = Some(frame.image);
        }
        Ok(Self {
            width,
            height,
            passes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;

    fn numbered(w: u32, h: u32) -> RasterImage {
        let mut img = RasterImage::new(PixelFormat::Grayscale, w, h).unwrap();
        for (i, p) in img.pixels_mut().iter_mut().enumerate() {
            *p = i as u8;
        }
        img
    }

    #[test]
    fn markers() {
        let header = ImageHeader::grid(GridSample::Float32, 1, 1).unwrap();
        let start = start_marker(&header, 3).unwrap();
        assert_eq!(start, 0xC0E3);
        assert_eq!(end_marker(start), 0x30E3);
        assert!(is_start_marker(&start.to_le_bytes()));
        assert!(!is_start_marker(&end_marker(start).to_le_bytes()));
        assert!(start_marker(&header, 8).is_err());
    }

    #[test]
    fn palette_frame_roundtrip() {
        let mut img = RasterImage::new(PixelFormat::Palette, 3, 2).unwrap();
        img.palette_mut().set(0, [1, 2, 3]);
        img.palette_mut().set(1, [4, 5, 6]);
        img.pixels_mut().copy_from_slice(&[0, 1, 1, 0, 1, 0]);
        let bytes = encode(&img, &Unstoppable).unwrap();
        let info = probe_header(&bytes).unwrap();
        assert_eq!(info.format, ImageFormat::Raw);
        let back = decode(&bytes, None, &Unstoppable).unwrap();
        assert_eq!(back.pixels(), img.pixels());
        assert_eq!(back.palette().get(1), [4, 5, 6]);
    }

    #[test]
    fn grid_frame_is_little_endian() {
        let mut img = RasterImage::new_grid(GridSample::Int16, 1, 1).unwrap();
        img.set_grid_value(0, 0, 258.0).unwrap();
        let bytes = encode(&img, &Unstoppable).unwrap();
        assert_eq!(&bytes[10..12], &[2, 1]);
        assert_eq!(decode_frame(&bytes).unwrap().image.grid_value(0, 0), Some(258.0));
    }

    #[test]
    fn corrupt_end_marker() {
        let img = numbered(2, 2);
        let mut bytes = encode(&img, &Unstoppable).unwrap();
        let n = bytes.len();
        bytes[n - 1] ^= 0xFF;
        assert!(matches!(
            decode(&bytes, None, &Unstoppable),
            Err(RasterError::RawCodec(_))
        ));
        assert!(decode(&bytes[..n - 3], None, &Unstoppable).is_err());
    }

    #[test]
    fn pass_sizes() {
        assert_eq!(adam7_pass_size(8, 8, 1), (1, 1));
        assert_eq!(adam7_pass_size(8, 8, 7), (8, 4));
        assert_eq!(adam7_pass_size(3, 3, 2), (0, 1));
        assert_eq!(adam7_pass_size(1, 1, 6), (0, 1));
    }

    #[test]
    fn split_merge_full_scale() {
        let img = numbered(13, 11);
        let planes = Adam7Planes::split(&img).unwrap();
        assert_eq!(planes.merge(1).unwrap().pixels(), img.pixels());
    }

    #[test]
    fn reduced_scales_sample_the_grid() {
        let img = numbered(16, 16);
        let planes = Adam7Planes::split(&img).unwrap();
        for scale in [2u32, 4, 8] {
            let small = planes.merge(scale).unwrap();
            assert_eq!(small.width(), 16 / scale);
            for y in 0..small.height() {
                for x in 0..small.width() {
                    let full = img.row(y * scale)[(x * scale) as usize];
                    assert_eq!(small.row(y)[x as usize], full, "scale {scale}");
                }
            }
        }
        assert!(planes.merge(3).is_err());
    }

    #[test]
    fn pass_frames_roundtrip() {
        let img = numbered(9, 5);
        let planes = Adam7Planes::split(&img).unwrap();
        let bytes = planes.encode().unwrap();
        let back = Adam7Planes::decode(&bytes, 9, 5).unwrap();
        assert_eq!(back.merge(1).unwrap().pixels(), img.pixels());
    }

    #[test]
    fn missing_pass_is_a_mismatch() {
        let img = numbered(8, 8);
        let mut planes = Adam7Planes::split(&img).unwrap();
        planes.passes[6] = None;
        assert!(planes.merge(2).is_ok());
        assert!(matches!(
            planes.merge(1),
            Err(RasterError::ImageMismatch(_))
        ));
    }
}
