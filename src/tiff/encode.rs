//! Streaming baseline TIFF writer.
//!
//! Chunks are written as they fill; the IFD follows the last chunk and its
//! offset is patched into the header on finish. Classic TIFF only, so the
//! file must stay below 4 GiB.

use std::io::{Seek, SeekFrom, Write};

use crate::bits::{pack_bilevel, packed_len};
use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::pixel::{GridSample, PixelFormat, SampleFormat};
use crate::strip::{RowWriter, WriteSeek};

use super::{TiffCompression, TiffLayout, TiffOptions, geo};

const SHORT: u16 = 3;
const LONG: u16 = 4;
const ASCII: u16 = 2;
const DOUBLE: u16 = 12;

const NEW_SUBFILE_TYPE: u16 = 254;
const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const ROWS_PER_STRIP: u16 = 278;
const STRIP_BYTE_COUNTS: u16 = 279;
const PLANAR_CONFIGURATION: u16 = 284;
const COLOR_MAP: u16 = 320;
const TILE_WIDTH: u16 = 322;
const TILE_LENGTH: u16 = 323;
const TILE_OFFSETS: u16 = 324;
const TILE_BYTE_COUNTS: u16 = 325;
const EXTRA_SAMPLES: u16 = 338;
const SAMPLE_FORMAT: u16 = 339;

/// One IFD entry with its value already serialized little-endian.
#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub tag: u16,
    typ: u16,
    count: u32,
    pub data: Vec<u8>,
}

impl Entry {
    pub(crate) fn shorts(tag: u16, values: &[u16]) -> Self {
        Self {
            tag,
            typ: SHORT,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub(crate) fn longs(tag: u16, values: &[u32]) -> Self {
        Self {
            tag,
            typ: LONG,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    pub(crate) fn doubles(tag: u16, values: &[f64]) -> Self {
        Self {
            tag,
            typ: DOUBLE,
            count: values.len() as u32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
    }

    /// NUL-terminated ASCII.
    pub(crate) fn ascii(tag: u16, text: &str) -> Self {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        Self {
            tag,
            typ: ASCII,
            count: data.len() as u32,
            data,
        }
    }
}

/// Byte reordering applied to each source row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RowOrder {
    Copy,
    SwapBgr,
    SwapBgra,
    RotateArgb,
    Bilevel,
    /// Native-endian grid samples of this width, stored little-endian.
    GridLe(usize),
}

/// How a header is laid out in the file.
#[derive(Clone, Debug)]
struct WriteLayout {
    bits: u16,
    spp: u16,
    photometric: u16,
    sample_format: u16,
    alpha: bool,
    colormap: Option<Vec<u16>>,
    order: RowOrder,
}

impl WriteLayout {
    fn for_header(header: &ImageHeader, bilevel: bool) -> Result<Self, RasterError> {
        let base = |spp, photometric, order| WriteLayout {
            bits: 8,
            spp,
            photometric,
            sample_format: 1,
            alpha: spp == 4,
            colormap: None,
            order,
        };
        let layout = match header.pixel_format() {
            PixelFormat::Grayscale => base(1, 1, RowOrder::Copy),
            PixelFormat::Rgb => base(3, 2, RowOrder::Copy),
            PixelFormat::Bgr => base(3, 2, RowOrder::SwapBgr),
            PixelFormat::Rgba => base(4, 2, RowOrder::Copy),
            PixelFormat::Bgra => base(4, 2, RowOrder::SwapBgra),
            PixelFormat::Argb => base(4, 2, RowOrder::RotateArgb),
            PixelFormat::Palette if bilevel && header.palette.is_monochrome() => {
                // Index 0 is black, so BlackIsZero.
                WriteLayout {
                    bits: 1,
                    ..base(1, 1, RowOrder::Bilevel)
                }
            }
            PixelFormat::Palette => {
                let n = 256;
                let mut map = vec![0u16; 3 * n];
                for i in 0..header.palette.len() {
                    let [r, g, b] = header.palette.get(i as u8);
                    map[i] = u16::from(r) * 257;
                    map[n + i] = u16::from(g) * 257;
                    map[2 * n + i] = u16::from(b) * 257;
                }
                WriteLayout {
                    colormap: Some(map),
                    ..base(1, 3, RowOrder::Copy)
                }
            }
            PixelFormat::Grid => {
                let sample = header.grid_sample().ok_or_else(|| {
                    RasterError::UnsupportedLayout("grid header without sample type".into())
                })?;
                WriteLayout {
                    bits: u16::from(sample.bits_per_sample()),
                    sample_format: match sample.sample_format() {
                        SampleFormat::Int => 2,
                        SampleFormat::Float => 3,
                        _ => 1,
                    },
                    order: match sample {
                        GridSample::UInt8 | GridSample::Int8 => RowOrder::Copy,
                        other => RowOrder::GridLe(other.byte_width()),
                    },
                    ..base(1, 1, RowOrder::Copy)
                }
            }
            PixelFormat::Unknown => {
                return Err(RasterError::UnsupportedLayout(
                    "TIFF cannot store an unknown pixel format".into(),
                ));
            }
        };
        Ok(layout)
    }

    /// Encoded bytes for `width` pixels.
    fn row_bytes(&self, width: usize) -> usize {
        if self.order == RowOrder::Bilevel {
            packed_len(width, 1)
        } else {
            width * usize::from(self.spp) * usize::from(self.bits / 8)
        }
    }

    fn encode_row(&self, src: &[u8], out: &mut Vec<u8>) {
        match self.order {
            RowOrder::Copy => out.extend_from_slice(src),
            RowOrder::SwapBgr => {
                for p in src.chunks_exact(3) {
                    out.extend_from_slice(&[p[2], p[1], p[0]]);
                }
            }
            RowOrder::SwapBgra => {
                for p in src.chunks_exact(4) {
                    out.extend_from_slice(&[p[2], p[1], p[0], p[3]]);
                }
            }
            RowOrder::RotateArgb => {
                for p in src.chunks_exact(4) {
                    out.extend_from_slice(&[p[1], p[2], p[3], p[0]]);
                }
            }
            RowOrder::Bilevel => {
                let start = out.len();
                out.resize(start + packed_len(src.len(), 1), 0);
                pack_bilevel(src, &mut out[start..]);
            }
            RowOrder::GridLe(width) => {
                for s in src.chunks_exact(width) {
                    if cfg!(target_endian = "little") {
                        out.extend_from_slice(s);
                    } else {
                        out.extend(s.iter().rev());
                    }
                }
            }
        }
    }
}

/// Streaming TIFF writer over any seekable sink.
pub(crate) struct TiffStream<W: Write + Seek> {
    out: W,
    pos: u64,
    layout: WriteLayout,
    compression: TiffCompression,
    tiled: bool,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
    row_bytes: usize,
    pending: Vec<u8>,
    pending_rows: u32,
    rows_written: u32,
    offsets: Vec<u32>,
    counts: Vec<u32>,
    extra: Vec<Entry>,
}

/// Strip sessions write through a boxed sink.
pub(crate) type TiffRowWriter = TiffStream<Box<dyn WriteSeek>>;

impl<W: Write + Seek> TiffStream<W> {
    pub(crate) fn new(
        mut out: W,
        header: &ImageHeader,
        options: &TiffOptions,
    ) -> Result<Self, RasterError> {
        let layout = WriteLayout::for_header(header, options.bilevel)?;
        let (width, height) = (header.width(), header.height());
        let (tiled, chunk_width, chunk_height) = match options.layout {
            TiffLayout::Strips { rows_per_strip } => {
                (false, width, rows_per_strip.clamp(1, height.max(1)))
            }
            TiffLayout::Tiles {
                width: tw,
                height: th,
            } => {
                if tw == 0 || th == 0 || tw % 16 != 0 || th % 16 != 0 {
                    return Err(RasterError::InvalidArgument(format!(
                        "TIFF tile size {tw}x{th} must be non-zero multiples of 16"
                    )));
                }
                (true, tw, th)
            }
        };
        let extra = if options.geotiff {
            geo::entries(&header.georef, header.no_data)
        } else {
            Vec::new()
        };

        out.write_all(b"II")?;
        out.write_all(&42u16.to_le_bytes())?;
        out.write_all(&0u32.to_le_bytes())?;
        let row_bytes = layout.row_bytes(width as usize);
        log::debug!(
            "TIFF writer: {width}x{height} {:?}, {} {chunk_width}x{chunk_height}, {:?}",
            header.pixel_format(),
            if tiled { "tiles" } else { "strips" },
            options.compression
        );
        Ok(Self {
            out,
            pos: 8,
            layout,
            compression: options.compression,
            tiled,
            width,
            height,
            chunk_width,
            chunk_height,
            row_bytes,
            pending: Vec::with_capacity(row_bytes * chunk_height as usize),
            pending_rows: 0,
            rows_written: 0,
            offsets: Vec::new(),
            counts: Vec::new(),
            extra,
        })
    }

    pub(crate) fn push_row(&mut self, src: &[u8]) -> Result<(), RasterError> {
        if self.rows_written + self.pending_rows >= self.height {
            return Err(RasterError::TiffCodec("row beyond image height".into()));
        }
        self.layout.encode_row(src, &mut self.pending);
        self.pending_rows += 1;
        if self.pending_rows == self.chunk_height {
            self.flush_band()?;
        }
        Ok(())
    }

    fn flush_band(&mut self) -> Result<(), RasterError> {
        if self.tiled {
            let tile_row = self.layout.row_bytes(self.chunk_width as usize);
            let across = self.width.div_ceil(self.chunk_width);
            let mut tile = vec![0u8; tile_row * self.chunk_height as usize];
            for tx in 0..across as usize {
                tile.fill(0);
                let x0 = tx * tile_row;
                let cols = tile_row.min(self.row_bytes.saturating_sub(x0));
                for y in 0..self.pending_rows as usize {
                    let src = &self.pending[y * self.row_bytes + x0..][..cols];
                    tile[y * tile_row..y * tile_row + cols].copy_from_slice(src);
                }
                self.write_chunk(&tile)?;
            }
        } else {
            let band = core::mem::take(&mut self.pending);
            self.write_chunk(&band)?;
            self.pending = band;
        }
        self.rows_written += self.pending_rows;
        self.pending_rows = 0;
        self.pending.clear();
        Ok(())
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), RasterError> {
        let compressed;
        let bytes = match self.compression {
            TiffCompression::None => data,
            TiffCompression::Deflate => {
                compressed = miniz_oxide::deflate::compress_to_vec_zlib(data, 6);
                &compressed[..]
            }
        };
        self.offsets.push(self.offset32()?);
        self.counts.push(bytes.len() as u32);
        self.out.write_all(bytes)?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn offset32(&self) -> Result<u32, RasterError> {
        u32::try_from(self.pos)
            .map_err(|_| RasterError::TiffCodec("file exceeds 4 GiB; BigTIFF is not written".into()))
    }

    fn align(&mut self) -> Result<(), RasterError> {
        if self.pos % 2 == 1 {
            self.out.write_all(&[0])?;
            self.pos += 1;
        }
        Ok(())
    }

    fn entries(&self) -> Vec<Entry> {
        let layout = &self.layout;
        let spp = usize::from(layout.spp);
        let mut entries = vec![
            Entry::longs(NEW_SUBFILE_TYPE, &[0]),
            Entry::longs(IMAGE_WIDTH, &[self.width]),
            Entry::longs(IMAGE_LENGTH, &[self.height]),
            Entry::shorts(BITS_PER_SAMPLE, &vec![layout.bits; spp]),
            Entry::shorts(
                COMPRESSION,
                &[match self.compression {
                    TiffCompression::None => 1,
                    TiffCompression::Deflate => 8,
                }],
            ),
            Entry::shorts(PHOTOMETRIC, &[layout.photometric]),
            Entry::shorts(SAMPLES_PER_PIXEL, &[layout.spp]),
            Entry::shorts(PLANAR_CONFIGURATION, &[1]),
            Entry::shorts(SAMPLE_FORMAT, &vec![layout.sample_format; spp]),
        ];
        if self.tiled {
            entries.push(Entry::longs(TILE_WIDTH, &[self.chunk_width]));
            entries.push(Entry::longs(TILE_LENGTH, &[self.chunk_height]));
            entries.push(Entry::longs(TILE_OFFSETS, &self.offsets));
            entries.push(Entry::longs(TILE_BYTE_COUNTS, &self.counts));
        } else {
            entries.push(Entry::longs(ROWS_PER_STRIP, &[self.chunk_height]));
            entries.push(Entry::longs(STRIP_OFFSETS, &self.offsets));
            entries.push(Entry::longs(STRIP_BYTE_COUNTS, &self.counts));
        }
        if let Some(map) = &layout.colormap {
            entries.push(Entry::shorts(COLOR_MAP, map));
        }
        if layout.alpha {
            // Unassociated alpha.
            entries.push(Entry::shorts(EXTRA_SAMPLES, &[2]));
        }
        entries.extend(self.extra.iter().cloned());
        entries.sort_by_key(|e| e.tag);
        entries
    }

    /// Flush the partial band, pad missing rows, write the IFD.
    pub(crate) fn finalize(mut self) -> Result<W, RasterError> {
        if self.rows_written + self.pending_rows < self.height {
            log::debug!(
                "TIFF writer: padding {} missing rows",
                self.height - self.rows_written - self.pending_rows
            );
            let zero_row = vec![0u8; self.row_bytes];
            while self.rows_written + self.pending_rows < self.height {
                self.pending.extend_from_slice(&zero_row);
                self.pending_rows += 1;
                if self.pending_rows == self.chunk_height {
                    self.flush_band()?;
                }
            }
        }
        if self.pending_rows > 0 {
            self.flush_band()?;
        }

        let mut entries = self.entries();
        // Out-of-line values first, each word aligned.
        let mut value_offsets = vec![None; entries.len()];
        for (i, entry) in entries.iter().enumerate() {
            if entry.data.len() > 4 {
                self.align()?;
                value_offsets[i] = Some(self.offset32()?);
                self.out.write_all(&entry.data)?;
                self.pos += entry.data.len() as u64;
            }
        }
        self.align()?;
        let ifd_offset = self.offset32()?;

        let mut ifd = Vec::with_capacity(2 + entries.len() * 12 + 4);
        ifd.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (entry, offset) in entries.iter_mut().zip(value_offsets) {
            ifd.extend_from_slice(&entry.tag.to_le_bytes());
            ifd.extend_from_slice(&entry.typ.to_le_bytes());
            ifd.extend_from_slice(&entry.count.to_le_bytes());
            match offset {
                Some(off) => ifd.extend_from_slice(&off.to_le_bytes()),
                None => {
                    entry.data.resize(4, 0);
                    ifd.extend_from_slice(&entry.data);
                }
            }
        }
        ifd.extend_from_slice(&0u32.to_le_bytes());
        self.out.write_all(&ifd)?;
        self.pos += ifd.len() as u64;
        self.offset32()?;

        self.out.seek(SeekFrom::Start(4))?;
        self.out.write_all(&ifd_offset.to_le_bytes())?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        log::debug!(
            "TIFF writer: finished, {} chunks, {} bytes",
            self.offsets.len(),
            self.pos
        );
        Ok(self.out)
    }
}

impl<W: Write + Seek> RowWriter for TiffStream<W> {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        _first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        for row in buf.chunks_exact(header.scanline_width()) {
            self.push_row(row)?;
        }
        Ok(())
    }

    fn finish(self, _header: &ImageHeader) -> Result<(), RasterError> {
        self.finalize().map(drop)
    }
}
