use tiff::ColorType;
use tiff::decoder::{ChunkType, Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::bits::{packed_len, unpack_samples};
use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::palette::Palette;
use crate::pixel::{GridSample, PixelFormat};
use crate::strip::{ReadSeek, RowReader};

use super::TiffReadOptions;
use super::geo::{GeoTags, georeference, no_data};

/// How decoded chunk samples map onto the header layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SampleLayout {
    Gray8 { invert: bool },
    GrayLow { bits: u8, invert: bool },
    /// 1-bit, decoded as a monochrome palette.
    Bilevel { white_is_zero: bool },
    Palette { bits: u8 },
    Rgb8,
    Rgba8,
    GrayAlpha8,
    Rgb16,
    Rgba16,
    Grid(GridSample),
}

impl SampleLayout {
    fn pixel_format(self) -> PixelFormat {
        match self {
            Self::Gray8 { .. } | Self::GrayLow { .. } => PixelFormat::Grayscale,
            Self::Bilevel { .. } | Self::Palette { .. } => PixelFormat::Palette,
            Self::Rgb8 | Self::Rgb16 => PixelFormat::Rgb,
            Self::Rgba8 | Self::Rgba16 | Self::GrayAlpha8 => PixelFormat::Rgba,
            Self::Grid(_) => PixelFormat::Grid,
        }
    }

    /// Bytes of one packed source row of `width` pixels.
    fn source_stride(self, width: usize) -> usize {
        match self {
            Self::GrayLow { bits, .. } | Self::Palette { bits } => packed_len(width, bits),
            Self::Bilevel { .. } => packed_len(width, 1),
            Self::Gray8 { .. } => width,
            Self::Rgb8 | Self::Rgb16 => width * 3,
            Self::Rgba8 | Self::Rgba16 => width * 4,
            Self::GrayAlpha8 => width * 2,
            Self::Grid(_) => width,
        }
    }
}

/// Choose a layout from the colour type and photometric/sample-format tags.
pub(crate) fn sample_layout(
    color: ColorType,
    sample_format: u16,
    photometric: u16,
) -> Result<SampleLayout, RasterError> {
    let invert = photometric == 0;
    let layout = match color {
        ColorType::Gray(1) => SampleLayout::Bilevel {
            white_is_zero: invert,
        },
        ColorType::Gray(bits @ (2 | 4)) => SampleLayout::GrayLow { bits, invert },
        ColorType::Gray(8) if sample_format == 2 => SampleLayout::Grid(GridSample::Int8),
        ColorType::Gray(8) => SampleLayout::Gray8 { invert },
        ColorType::Gray(16) if sample_format == 2 => SampleLayout::Grid(GridSample::Int16),
        ColorType::Gray(16) => SampleLayout::Grid(GridSample::UInt16),
        ColorType::Gray(32) => SampleLayout::Grid(match sample_format {
            3 => GridSample::Float32,
            2 => GridSample::Int32,
            _ => GridSample::UInt32,
        }),
        ColorType::Gray(64) if sample_format == 3 => SampleLayout::Grid(GridSample::Float64),
        ColorType::Palette(bits @ (1 | 2 | 4 | 8)) => SampleLayout::Palette { bits },
        ColorType::RGB(8) => SampleLayout::Rgb8,
        ColorType::RGBA(8) => SampleLayout::Rgba8,
        ColorType::GrayA(8) => SampleLayout::GrayAlpha8,
        ColorType::RGB(16) => SampleLayout::Rgb16,
        ColorType::RGBA(16) => SampleLayout::Rgba16,
        other => {
            return Err(RasterError::UnsupportedLayout(format!(
                "TIFF colour type {other:?} with sample format {sample_format}"
            )));
        }
    };
    Ok(layout)
}

/// Whether a tag is present.
fn has_tag<R: ReadSeek>(dec: &mut Decoder<R>, tag: Tag) -> Result<bool, RasterError> {
    Ok(dec.find_tag(tag)?.is_some())
}

fn first_u16<R: ReadSeek>(dec: &mut Decoder<R>, tag: Tag) -> Result<Option<u16>, RasterError> {
    if !has_tag(dec, tag)? {
        return Ok(None);
    }
    Ok(dec.get_tag_u16_vec(tag)?.first().copied())
}

fn quirk(options: &TiffReadOptions, msg: &str) {
    if options.report_warnings {
        log::warn!("TIFF: {msg}");
    } else {
        log::debug!("TIFF: {msg}");
    }
}

const COMPRESSION_CCITT_RLE: u16 = 2;
const COMPRESSION_CCITT_FAX3: u16 = 3;
const COMPRESSION_CCITT_FAX4: u16 = 4;
const FILL_ORDER: u16 = 266;

/// Raw chunk locations of a CCITT Group 4 image, decoded here rather than by
/// the `tiff` crate.
pub(crate) struct FaxChunks {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
    lsb_first: bool,
    white_is_zero: bool,
}

impl FaxChunks {
    fn read<R: ReadSeek>(
        dec: &mut Decoder<R>,
        layout: SampleLayout,
        tiled: bool,
    ) -> Result<Self, RasterError> {
        let SampleLayout::Bilevel { white_is_zero } = layout else {
            return Err(RasterError::TiffCodec(format!(
                "CCITT Group 4 data with {layout:?} samples"
            )));
        };
        let (offsets, byte_counts) = if tiled {
            (Tag::TileOffsets, Tag::TileByteCounts)
        } else {
            (Tag::StripOffsets, Tag::StripByteCounts)
        };
        Ok(Self {
            offsets: dec.get_tag_u64_vec(offsets)?,
            byte_counts: dec.get_tag_u64_vec(byte_counts)?,
            lsb_first: first_u16(dec, Tag::from_u16_exhaustive(FILL_ORDER))? == Some(2),
            white_is_zero,
        })
    }

    fn raw_chunk<R: ReadSeek>(
        &self,
        dec: &mut Decoder<R>,
        index: u32,
    ) -> Result<Vec<u8>, RasterError> {
        let i = index as usize;
        let (Some(&offset), Some(&count)) = (self.offsets.get(i), self.byte_counts.get(i))
        else {
            return Err(RasterError::TiffCodec(format!("no CCITT chunk {index}")));
        };
        let len = usize::try_from(count).map_err(|_| RasterError::OutOfMemory(usize::MAX))?;
        let mut raw = Vec::new();
        raw.try_reserve_exact(len).map_err(|_| RasterError::OutOfMemory(len))?;
        dec.goto_offset_u64(offset)?;
        for _ in 0..len {
            let b = dec.read_byte()?;
            raw.push(if self.lsb_first { b.reverse_bits() } else { b });
        }
        Ok(raw)
    }
}

/// Decode `height` Group 4 coded rows of `width` pixels into monochrome
/// palette indices. Coded black runs take bit value 1, which photometric
/// interpretation then maps onto black or white.
pub(crate) fn decode_fax4(
    raw: &[u8],
    width: usize,
    height: usize,
    white_is_zero: bool,
    out: &mut [u8],
) -> Result<(), RasterError> {
    let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
        return Err(RasterError::UnsupportedLayout(format!(
            "CCITT chunk of {width}x{height} pixels"
        )));
    };
    let (ink, paper) = if white_is_zero { (0, 1) } else { (1, 0) };
    let mut rows = out[..width * height].chunks_exact_mut(width);
    let mut decoded = 0;
    fax::decoder::decode_g4(raw.iter().copied(), w, Some(h), |transitions| {
        if let Some(row) = rows.next() {
            paint_runs(transitions, row, ink, paper);
            decoded += 1;
        }
    })
    .ok_or_else(|| RasterError::TiffCodec("corrupt CCITT Group 4 data".into()))?;
    if decoded < height {
        return Err(RasterError::TiffCodec(format!(
            "CCITT Group 4 data ends after {decoded} of {height} rows"
        )));
    }
    Ok(())
}

/// Transitions alternate white-to-black and black-to-white, starting white.
fn paint_runs(transitions: &[u16], row: &mut [u8], ink: u8, paper: u8) {
    row.fill(paper);
    let width = row.len();
    let mut black = false;
    let mut prev = 0;
    for &pos in transitions {
        let pos = (pos as usize).min(width);
        if black {
            if let Some(run) = row.get_mut(prev..pos) {
                run.fill(ink);
            }
        }
        prev = pos;
        black = !black;
    }
    if black {
        if let Some(run) = row.get_mut(prev..) {
            run.fill(ink);
        }
    }
}

/// Header facts gathered when a TIFF is opened.
pub(crate) struct Opened<R: ReadSeek> {
    pub decoder: Decoder<R>,
    pub header: ImageHeader,
    pub layout: SampleLayout,
    pub tiled: bool,
    pub chunk_width: u32,
    pub chunk_height: u32,
    pub compression: u16,
    pub fax: Option<FaxChunks>,
}

pub(crate) fn open<R: ReadSeek>(
    source: R,
    options: &TiffReadOptions,
) -> Result<Opened<R>, RasterError> {
    let mut decoder = Decoder::new(source)?.with_limits(tiff::decoder::Limits::unlimited());
    let (width, height) = decoder.dimensions()?;
    let color = decoder.colortype()?;

    if !has_tag(&mut decoder, Tag::SamplesPerPixel)? {
        quirk(options, "SamplesPerPixel missing, assuming 1");
    }
    match first_u16(&mut decoder, Tag::PlanarConfiguration)? {
        None => quirk(options, "PlanarConfiguration missing, assuming contiguous"),
        Some(2) => {
            return Err(RasterError::UnsupportedLayout(
                "planar TIFF sample layout".into(),
            ));
        }
        Some(_) => {}
    }
    let sample_format = first_u16(&mut decoder, Tag::SampleFormat)?.unwrap_or(1);
    let photometric = first_u16(&mut decoder, Tag::PhotometricInterpretation)?.unwrap_or(1);
    let compression = first_u16(&mut decoder, Tag::Compression)?.unwrap_or(1);
    let layout = sample_layout(color, sample_format, photometric)?;

    let mut header = match layout {
        SampleLayout::Grid(sample) => ImageHeader::grid(sample, width, height)?,
        other => ImageHeader::pixels(other.pixel_format(), width, height)?,
    };
    match layout {
        SampleLayout::Bilevel { .. } => header.palette = Palette::monochrome(),
        SampleLayout::Palette { bits } => {
            let map = if has_tag(&mut decoder, Tag::ColorMap)? {
                decoder.get_tag_u16_vec(Tag::ColorMap)?
            } else {
                return Err(RasterError::TiffCodec("palette image without ColorMap".into()));
            };
            header.palette = colormap_palette(&map, bits);
        }
        _ => {}
    }

    let geo = GeoTags::read(&mut decoder)?;
    if let Some(georef) = georeference(&geo) {
        header.georef = georef;
    }
    header.no_data = no_data(&geo);

    let tiled = decoder.get_chunk_type() == ChunkType::Tile;
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let chunk_width = if tiled { chunk_width } else { width };
    let chunk_height = chunk_height.clamp(1, height.max(1));
    let fax = if compression == COMPRESSION_CCITT_FAX4 {
        Some(FaxChunks::read(&mut decoder, layout, tiled)?)
    } else {
        None
    };
    Ok(Opened {
        decoder,
        header,
        layout,
        tiled,
        chunk_width,
        chunk_height,
        compression,
        fax,
    })
}

/// TIFF colormaps hold 16-bit red, then green, then blue planes.
fn colormap_palette(map: &[u16], bits: u8) -> Palette {
    let n = (1usize << bits).min(map.len() / 3);
    let mut palette = Palette::new();
    for i in 0..n.min(crate::palette::PALETTE_SLOTS) {
        palette.set(
            i,
            [
                (map[i] >> 8) as u8,
                (map[n + i] >> 8) as u8,
                (map[2 * n + i] >> 8) as u8,
            ],
        );
    }
    palette
}

fn mismatch(layout: SampleLayout) -> RasterError {
    RasterError::TiffCodec(format!("decoded samples do not match {layout:?}"))
}

fn put_ne<T: Copy, const N: usize>(
    layout: SampleLayout,
    vals: &[T],
    to_ne: fn(T) -> [u8; N],
    out: &mut [u8],
) -> Result<(), RasterError> {
    let vals = vals.get(..out.len() / N).ok_or_else(|| mismatch(layout))?;
    for (v, o) in vals.iter().zip(out.chunks_exact_mut(N)) {
        o.copy_from_slice(&to_ne(*v));
    }
    Ok(())
}

/// Convert one decoded chunk of `cw` x `ch` pixels into header layout rows
/// of `cw * pixel_size` bytes.
pub(crate) fn convert_chunk(
    layout: SampleLayout,
    chunk: &DecodingResult,
    cw: usize,
    ch: usize,
    pixel_size: usize,
    out: &mut [u8],
) -> Result<(), RasterError> {
    let dst_stride = cw * pixel_size;
    let src_stride = layout.source_stride(cw);
    let out = &mut out[..dst_stride * ch];
    match (layout, chunk) {
        (SampleLayout::Grid(sample), result) => {
            let n = cw * ch;
            match (sample, result) {
                (GridSample::UInt8, DecodingResult::U8(v)) => out.copy_from_slice(v.get(..n).ok_or_else(|| mismatch(layout))?),
                (GridSample::Int8, DecodingResult::I8(v)) => put_ne(layout, v, i8::to_ne_bytes, out)?,
                (GridSample::UInt16, DecodingResult::U16(v)) => put_ne(layout, v, u16::to_ne_bytes, out)?,
                (GridSample::Int16, DecodingResult::I16(v)) => put_ne(layout, v, i16::to_ne_bytes, out)?,
                (GridSample::UInt32, DecodingResult::U32(v)) => put_ne(layout, v, u32::to_ne_bytes, out)?,
                (GridSample::Int32, DecodingResult::I32(v)) => put_ne(layout, v, i32::to_ne_bytes, out)?,
                (GridSample::Float32, DecodingResult::F32(v)) => put_ne(layout, v, f32::to_ne_bytes, out)?,
                (GridSample::Float64, DecodingResult::F64(v)) => put_ne(layout, v, f64::to_ne_bytes, out)?,
                _ => return Err(mismatch(layout)),
            }
        }
        (SampleLayout::Rgb16 | SampleLayout::Rgba16, DecodingResult::U16(v)) => {
            let v = v.get(..out.len()).ok_or_else(|| mismatch(layout))?;
            for (o, s) in out.iter_mut().zip(v.iter()) {
                *o = (s >> 8) as u8;
            }
        }
        (_, DecodingResult::U8(v)) => {
            for (y, dst) in out.chunks_exact_mut(dst_stride).enumerate() {
                let src = v
                    .get(y * src_stride..(y + 1) * src_stride)
                    .ok_or_else(|| mismatch(layout))?;
                convert_u8_row(layout, src, dst);
            }
        }
        _ => return Err(mismatch(layout)),
    }
    Ok(())
}

fn convert_u8_row(layout: SampleLayout, src: &[u8], dst: &mut [u8]) {
    match layout {
        SampleLayout::Gray8 { invert } => {
            dst.copy_from_slice(&src[..dst.len()]);
            if invert {
                dst.iter_mut().for_each(|v| *v = 255 - *v);
            }
        }
        SampleLayout::GrayLow { bits, invert } => {
            unpack_samples(bits, true, src, dst);
            if invert {
                dst.iter_mut().for_each(|v| *v = 255 - *v);
            }
        }
        SampleLayout::Bilevel { white_is_zero } => {
            unpack_samples(1, false, src, dst);
            if white_is_zero {
                dst.iter_mut().for_each(|v| *v ^= 1);
            }
        }
        SampleLayout::Palette { bits } => unpack_samples(bits, false, src, dst),
        SampleLayout::GrayAlpha8 => {
            for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(4)) {
                d.copy_from_slice(&[s[0], s[0], s[0], s[1]]);
            }
        }
        SampleLayout::Rgb8 | SampleLayout::Rgba8 => dst.copy_from_slice(&src[..dst.len()]),
        SampleLayout::Rgb16 | SampleLayout::Rgba16 | SampleLayout::Grid(_) => {}
    }
}

/// Random-access row reader holding one band: a strip, or a row of tiles.
///
/// Rows of a band are kept until a row outside it is requested, so blocks
/// that do not align with strip or tile boundaries decode each chunk once.
pub(crate) struct BandReader<R: ReadSeek> {
    decoder: Decoder<R>,
    layout: SampleLayout,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    band: Vec<u8>,
    band_index: Option<u32>,
    chunk: Vec<u8>,
    fax: Option<FaxChunks>,
}

/// Strip sessions read through a boxed source.
pub(crate) type TiffRowReader = BandReader<Box<dyn ReadSeek>>;

impl<R: ReadSeek> BandReader<R> {
    pub(crate) fn new(opened: Opened<R>) -> Result<Self, RasterError> {
        if matches!(
            opened.compression,
            COMPRESSION_CCITT_RLE | COMPRESSION_CCITT_FAX3
        ) {
            return Err(RasterError::TiffCodec(format!(
                "CCITT compression {} is not supported, only Group 4",
                opened.compression
            )));
        }
        let header = &opened.header;
        let band = alloc_zeroed(header.rows_len(opened.chunk_height)?)?;
        let chunk_len = (opened.chunk_width as usize)
            .checked_mul(opened.chunk_height as usize)
            .and_then(|n| n.checked_mul(header.pixel_size()))
            .ok_or(RasterError::DimensionsTooLarge {
                width: opened.chunk_width,
                height: opened.chunk_height,
            })?;
        let chunk = alloc_zeroed(chunk_len)?;
        let chunks_across = header.width().div_ceil(opened.chunk_width.max(1));
        Ok(Self {
            decoder: opened.decoder,
            layout: opened.layout,
            chunk_width: opened.chunk_width,
            chunk_height: opened.chunk_height,
            chunks_across,
            band,
            band_index: None,
            chunk,
            fax: opened.fax,
        })
    }

    fn load_band(&mut self, header: &ImageHeader, band: u32) -> Result<(), RasterError> {
        let line = header.scanline_width();
        let ps = header.pixel_size();
        self.band_index = None;
        for tx in 0..self.chunks_across {
            let index = band * self.chunks_across + tx;
            let (cw, ch) = self.decoder.chunk_data_dimensions(index);
            let (mut cw, ch) = (cw as usize, ch as usize);
            if let Some(fax) = &self.fax {
                // coded at the full chunk width, even for edge tiles
                cw = self.chunk_width as usize;
                let raw = fax.raw_chunk(&mut self.decoder, index)?;
                decode_fax4(&raw, cw, ch, fax.white_is_zero, &mut self.chunk)?;
            } else {
                let data = self.decoder.read_chunk(index)?;
                convert_chunk(self.layout, &data, cw, ch, ps, &mut self.chunk)?;
            }

            let x0 = (tx * self.chunk_width) as usize * ps;
            let cols = (cw * ps).min(line.saturating_sub(x0));
            for y in 0..ch.min(self.chunk_height as usize) {
                let src = &self.chunk[y * cw * ps..y * cw * ps + cols];
                self.band[y * line + x0..y * line + x0 + cols].copy_from_slice(src);
            }
        }
        log::trace!("TIFF band {band} decoded ({} chunks)", self.chunks_across);
        self.band_index = Some(band);
        Ok(())
    }
}

impl<R: ReadSeek> RowReader for BandReader<R> {
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        let line = header.scanline_width();
        for (i, dst) in buf.chunks_exact_mut(line).enumerate() {
            let row = first_row + i as u32;
            let band = row / self.chunk_height;
            if self.band_index != Some(band) {
                self.load_band(header, band)?;
            }
            let off = (row - band * self.chunk_height) as usize * line;
            dst.copy_from_slice(&self.band[off..off + line]);
        }
        Ok(())
    }

    fn can_seek(&self) -> bool {
        true
    }
}
