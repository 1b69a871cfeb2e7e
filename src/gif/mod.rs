//! GIF adapter over the `gif` crate.
//!
//! Only the first frame is decoded, composited onto the logical screen as
//! palette indices. The transparency extension becomes the transparent
//! colour. Encoding writes palette images directly; other formats are
//! snapped to the transparent key (±8 per channel) and palettized on a copy.

use std::borrow::Cow;
use std::io::Read;

use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::palette::{Palette, is_near_transparent};
use crate::pixel::PixelFormat;
use crate::strip::{Materialized, ReadState, StripImage};
use enough::Stop;

fn options() -> gif::DecodeOptions {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::Indexed);
    opts
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    let mut decoder = options().read_info(data)?;
    let header = ImageHeader::pixels(
        PixelFormat::Palette,
        u32::from(decoder.width()),
        u32::from(decoder.height()),
    )?;
    let mut info = ImageInfos::new(ImageFormat::Gif, header);
    if let Some(frame) = decoder.next_frame_info()? {
        info.interlaced = frame.interlaced;
    }
    Ok(info)
}

/// Decode the first frame (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    decode_from(data, limits, stop)
}

fn decode_from<R: Read>(
    source: R,
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let mut decoder = options().read_info(source)?;
    let mut header = ImageHeader::pixels(
        PixelFormat::Palette,
        u32::from(decoder.width()),
        u32::from(decoder.height()),
    )?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    stop.check()?;

    let global = decoder.global_palette().map(<[u8]>::to_vec);
    let background = decoder.bg_color();
    let frame = decoder
        .read_next_frame()?
        .ok_or_else(|| RasterError::GifCodec("no image frame".into()))?;

    let table = frame
        .palette
        .as_deref()
        .or(global.as_deref())
        .ok_or_else(|| RasterError::GifCodec("no colour table".into()))?;
    header.palette = Palette::from_rgb_triplets(table);
    header.transparent = frame.transparent.map(|i| header.palette.get(i));

    let fill = frame
        .transparent
        .or(background.and_then(|b| u8::try_from(b).ok()))
        .unwrap_or(0);
    let width = header.width() as usize;
    let mut pixels = alloc_zeroed(header.rows_len(header.height())?)?;
    pixels.fill(fill);

    let left = usize::from(frame.left);
    let top = usize::from(frame.top);
    let fw = usize::from(frame.width);
    let cols = fw.min(width.saturating_sub(left));
    for (y, src) in frame.buffer.chunks_exact(fw.max(1)).enumerate() {
        let dy = top + y;
        if dy >= header.height() as usize || cols == 0 {
            break;
        }
        if y % 16 == 0 {
            stop.check()?;
        }
        let start = dy * width + left;
        pixels[start..start + cols].copy_from_slice(&src[..cols]);
    }
    RasterImage::from_buffer(header, pixels)
}

/// Encode as a single-frame GIF (called from EncodeRequest).
pub(crate) fn encode(image: &RasterImage, stop: &dyn Stop) -> Result<Vec<u8>, RasterError> {
    let (w, h) = (image.width(), image.height());
    let (Ok(w16), Ok(h16)) = (u16::try_from(w), u16::try_from(h)) else {
        return Err(RasterError::InvalidArgument(format!(
            "{w}x{h} exceeds GIF dimensions"
        )));
    };
    let indexed: Cow<'_, RasterImage> = if image.pixel_format() == PixelFormat::Palette {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(palettize(image, stop)?)
    };

    let mut table = indexed.palette().to_rgb_triplets();
    if table.is_empty() {
        table.extend_from_slice(&[0, 0, 0]);
    }
    let mut frame = gif::Frame::default();
    frame.width = w16;
    frame.height = h16;
    frame.buffer = Cow::Borrowed(indexed.pixels());
    frame.transparent = indexed
        .transparent()
        .and_then(|key| indexed.palette().find(key));

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, w16, h16, &table)?;
        stop.check()?;
        encoder.write_frame(&frame)?;
        encoder.into_inner()?;
    }
    Ok(out)
}

/// RGB copy with near-key pixels snapped to the key, then palettized.
fn palettize(image: &RasterImage, stop: &dyn Stop) -> Result<RasterImage, RasterError> {
    let mut copy = image.clone();
    copy.convert_to_rgb()?;
    if let Some(key) = copy.transparent() {
        for (y, row) in copy
            .pixels_mut()
            .chunks_exact_mut(image.width() as usize * 3)
            .enumerate()
        {
            if y % 16 == 0 {
                stop.check()?;
            }
            for p in row.chunks_exact_mut(3) {
                if is_near_transparent(p[0], p[1], p[2], Some(key)) {
                    p.copy_from_slice(&key);
                }
            }
        }
    }
    copy.convert_to_palette()?;
    Ok(copy)
}

/// Start a strip read session; the first frame is decoded up front.
pub fn open_strips<R: Read>(source: R) -> Result<StripImage, RasterError> {
    let image = decode_from(source, None, &enough::Unstoppable)?;
    let header = image.header().clone();
    Ok(StripImage::for_reading(
        header,
        ImageFormat::Gif,
        ReadState::Materialized(Materialized::new(image.into_pixels())),
    ))
}
