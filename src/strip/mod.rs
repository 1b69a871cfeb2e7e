//! Strip-based streaming: read or write an image a block of rows at a time.
//!
//! A [`StripImage`] carries the full image header but only holds
//! `rows_per_block` scanlines. It moves through three states:
//!
//! ```text
//! prepared (next_row == 0) -> streaming -> eof (next_row == height)
//! ```
//!
//! Each [`StripImage::read_next_strip`] call decodes
//! `min(rows_per_block, height - next_row)` rows, stores that count in
//! `current_rows`, and advances `next_row` by it. A
//! [`StripImage::write_next_strip`] call consumes `current_rows` rows from the
//! buffer. Calling either past the end is an error from the bound codec.
//!
//! Codec state lives in a tagged enum owned by the session. Write sessions
//! are finalized by [`StripImage::finish`]. Dropping an unfinished write
//! session finalizes it best-effort and logs a warning.

mod state;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::convert::{RowConverter, Target};
use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::info::ImageFormat;
use crate::pixel::PixelFormat;

pub(crate) use state::{Materialized, ReadState, RowReader, RowWriter, WriteState};

/// `Read + Seek`, boxed by sessions that own their source.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// `Write + Seek`, boxed by sessions that own their sink.
pub trait WriteSeek: Write + Seek {}
impl<T: Write + Seek> WriteSeek for T {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

enum CodecState {
    Read(ReadState),
    Write(WriteState),
    Closed,
}

/// An image bound to a codec session and a resident block of rows.
pub struct StripImage {
    header: ImageHeader,
    format: ImageFormat,
    rows_per_block: u32,
    current_rows: u32,
    next_row: u32,
    pixels: Vec<u8>,
    state: CodecState,
}

impl core::fmt::Debug for StripImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StripImage")
            .field("format", &self.format)
            .field("direction", &self.direction())
            .field("width", &self.header.width())
            .field("height", &self.header.height())
            .field("pixel_format", &self.header.pixel_format())
            .field("rows_per_block", &self.rows_per_block)
            .field("current_rows", &self.current_rows)
            .field("next_row", &self.next_row)
            .finish()
    }
}

impl StripImage {
    pub(crate) fn for_reading(header: ImageHeader, format: ImageFormat, state: ReadState) -> Self {
        log::debug!(
            "strip read session: {format:?} {}x{} {:?}",
            header.width(),
            header.height(),
            header.pixel_format()
        );
        Self {
            header,
            format,
            rows_per_block: 0,
            current_rows: 0,
            next_row: 0,
            pixels: Vec::new(),
            state: CodecState::Read(state),
        }
    }

    pub(crate) fn for_writing(header: ImageHeader, format: ImageFormat, state: WriteState) -> Self {
        log::debug!(
            "strip write session: {format:?} {}x{} {:?}",
            header.width(),
            header.height(),
            header.pixel_format()
        );
        Self {
            header,
            format,
            rows_per_block: 0,
            current_rows: 0,
            next_row: 0,
            pixels: Vec::new(),
            state: CodecState::Write(state),
        }
    }

    /// Open a file for strip reading, choosing the codec by magic bytes and
    /// then by extension.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let mut file = open_file(path)?;
        let mut magic = [0u8; 8];
        let n = read_up_to(&mut file, &mut magic)?;
        file.rewind()?;
        let format = ImageFormat::detect(&magic[..n])
            .or_else(|| ImageFormat::from_path(path))
            .ok_or(RasterError::UnrecognizedFormat)?;
        let reader = BufReader::new(file);
        match format {
            #[cfg(feature = "png")]
            ImageFormat::Png => crate::png::open_strips(reader),
            #[cfg(feature = "gif")]
            ImageFormat::Gif => crate::gif::open_strips(reader),
            #[cfg(feature = "jpeg")]
            ImageFormat::Jpeg => crate::jpeg::open_strips(reader),
            #[cfg(feature = "tiff")]
            ImageFormat::Tiff => crate::tiff::open_strips(reader, &crate::TiffReadOptions::default()),
            ImageFormat::Hgt => crate::grid::hgt::open_strips(path),
            ImageFormat::Bil | ImageFormat::Flt => crate::grid::bil::open_strips(path),
            ImageFormat::AsciiGrid => crate::grid::ascii::open_strips(reader),
            other => Err(RasterError::InvalidArgument(format!(
                "no strip reader for {other:?}"
            ))),
        }
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Mutable header access, for setting palette or georeferencing on a
    /// read session before transcoding.
    pub fn header_mut(&mut self) -> &mut ImageHeader {
        &mut self.header
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn direction(&self) -> Option<Direction> {
        match self.state {
            CodecState::Read(_) => Some(Direction::Read),
            CodecState::Write(_) => Some(Direction::Write),
            CodecState::Closed => None,
        }
    }

    pub fn width(&self) -> u32 {
        self.header.width()
    }

    pub fn height(&self) -> u32 {
        self.header.height()
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.header.pixel_format()
    }

    pub fn rows_per_block(&self) -> u32 {
        self.rows_per_block
    }

    pub fn next_row(&self) -> u32 {
        self.next_row
    }

    /// Valid rows resident in the buffer.
    pub fn current_rows(&self) -> u32 {
        self.current_rows
    }

    /// Set the number of rows the next write consumes, or that the buffer is
    /// considered to hold.
    pub fn set_current_rows(&mut self, rows: u32) -> Result<(), RasterError> {
        if rows > self.rows_per_block {
            return Err(RasterError::InvalidArgument(format!(
                "{rows} rows exceed the {}-row block",
                self.rows_per_block
            )));
        }
        self.current_rows = rows;
        Ok(())
    }

    /// Resident rows, `current_rows * scanline_width` bytes.
    pub fn rows(&self) -> &[u8] {
        let len = self.header.scanline_width() * self.current_rows as usize;
        &self.pixels[..len]
    }

    /// The whole resident buffer, `rows_per_block` scanlines.
    pub fn rows_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Scanline `i` of the resident block.
    pub fn row(&self, i: u32) -> &[u8] {
        let w = self.header.scanline_width();
        &self.pixels[i as usize * w..(i as usize + 1) * w]
    }

    pub fn row_mut(&mut self, i: u32) -> &mut [u8] {
        let w = self.header.scanline_width();
        &mut self.pixels[i as usize * w..(i as usize + 1) * w]
    }

    /// Size the resident buffer for `rows_per_block` scanlines.
    ///
    /// Write sessions also set `current_rows` to the size of the next block.
    pub fn allocate_pixels(&mut self, rows_per_block: u32) -> Result<(), RasterError> {
        if rows_per_block == 0 {
            return Err(RasterError::InvalidArgument("rows_per_block must be positive".into()));
        }
        let len = self.header.rows_len(rows_per_block)?;
        if len > self.pixels.len() {
            let mut grown = alloc_zeroed(len)?;
            let keep = self.pixels.len();
            grown[..keep].copy_from_slice(&self.pixels);
            self.pixels = grown;
        } else {
            self.pixels.truncate(len);
        }
        self.rows_per_block = rows_per_block;
        self.current_rows = self.current_rows.min(rows_per_block);
        if matches!(self.state, CodecState::Write(_)) {
            self.current_rows = self.next_block_rows();
        }
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        self.next_row >= self.header.height()
    }

    /// Progress as a whole percentage.
    pub fn percent(&self) -> u32 {
        (u64::from(self.next_row) * 100 / u64::from(self.header.height())) as u32
    }

    /// Return a random-access read session to row 0.
    pub fn rewind(&mut self) -> Result<(), RasterError> {
        match &self.state {
            CodecState::Read(state) if state.can_seek() => {
                self.next_row = 0;
                self.current_rows = 0;
                Ok(())
            }
            _ => Err(RasterError::UnsupportedLayout(format!(
                "{:?} session cannot rewind",
                self.format
            ))),
        }
    }

    /// Decode the next block of rows; returns progress in percent.
    pub fn read_next_strip(&mut self) -> Result<u32, RasterError> {
        self.check_allocated()?;
        let height = self.header.height();
        if self.next_row >= height {
            return Err(self.past_end());
        }
        let rows = self.next_block_rows();
        let len = self.header.rows_len(rows)?;
        let CodecState::Read(state) = &mut self.state else {
            return Err(RasterError::InvalidArgument("not a read session".into()));
        };
        state.read_rows(&self.header, self.next_row, &mut self.pixels[..len])?;
        self.current_rows = rows;
        self.next_row += rows;
        log::trace!(
            "{:?} strip read: {rows} rows, next_row {}/{height}",
            self.format,
            self.next_row
        );
        Ok(self.percent())
    }

    /// Encode `current_rows` rows from the buffer; returns progress in
    /// percent. `current_rows` is then set to the size of the next block.
    pub fn write_next_strip(&mut self) -> Result<u32, RasterError> {
        self.check_allocated()?;
        let height = self.header.height();
        if self.next_row >= height {
            return Err(self.past_end());
        }
        let rows = self.current_rows;
        if rows == 0 || self.next_row + rows > height {
            return Err(RasterError::InvalidArgument(format!(
                "cannot write {rows} rows at row {} of {height}",
                self.next_row
            )));
        }
        let len = self.header.rows_len(rows)?;
        let CodecState::Write(state) = &mut self.state else {
            return Err(RasterError::InvalidArgument("not a write session".into()));
        };
        state.write_rows(&self.header, self.next_row, &self.pixels[..len])?;
        self.next_row += rows;
        self.current_rows = self.next_block_rows();
        log::trace!(
            "{:?} strip write: {rows} rows, next_row {}/{height}",
            self.format,
            self.next_row
        );
        Ok(self.percent())
    }

    /// Close the session, finalizing the stream of a write session.
    pub fn finish(mut self) -> Result<(), RasterError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), RasterError> {
        match core::mem::replace(&mut self.state, CodecState::Closed) {
            CodecState::Write(state) => {
                if self.next_row < self.header.height() {
                    log::warn!(
                        "{:?} write session closed at row {} of {}",
                        self.format,
                        self.next_row,
                        self.header.height()
                    );
                }
                state.finish(&self.header)?;
                log::debug!("{:?} write session finished", self.format);
                Ok(())
            }
            CodecState::Read(_) => {
                log::debug!("{:?} read session closed at row {}", self.format, self.next_row);
                Ok(())
            }
            CodecState::Closed => Ok(()),
        }
    }

    /// Copy the current rows of `src` into this session's buffer, converting
    /// pixel formats on the way. Both sessions must have the same width.
    ///
    /// Grids convert only to grids, with truncating casts. Palette targets
    /// append colours to a read session's palette but only match against the
    /// fixed palette of a write session.
    pub fn transcode_rows_from(&mut self, src: &StripImage) -> Result<(), RasterError> {
        if src.width() != self.width() {
            return Err(RasterError::ImageMismatch(format!(
                "width {} vs {}",
                src.width(),
                self.width()
            )));
        }
        let rows = src.current_rows;
        if rows > self.rows_per_block {
            return Err(RasterError::BufferTooSmall {
                needed: self.header.rows_len(rows)?,
                actual: self.pixels.len(),
            });
        }
        let width = self.width() as usize;
        let src_line = src.header.scanline_width();
        let dst_line = self.header.scanline_width();

        match (src.header.grid_sample(), self.header.grid_sample()) {
            (Some(from), Some(to)) => {
                for y in 0..rows as usize {
                    let s = &src.pixels[y * src_line..(y + 1) * src_line];
                    let d = &mut self.pixels[y * dst_line..(y + 1) * dst_line];
                    for (a, b) in s
                        .chunks_exact(from.byte_width())
                        .zip(d.chunks_exact_mut(to.byte_width()))
                    {
                        to.write(from.read(a), b);
                    }
                }
            }
            (None, None) => {
                let target = Target::from_format(self.header.pixel_format()).ok_or_else(|| {
                    RasterError::InvalidImage("unknown target pixel format".into())
                })?;
                let frozen = matches!(self.state, CodecState::Write(_));
                let mut conv = RowConverter {
                    from: src.header.pixel_format(),
                    src_palette: &src.header.palette,
                    target,
                    dst_palette: &mut self.header.palette,
                    transparent: src.header.transparent,
                    frozen_palette: frozen,
                };
                for y in 0..rows as usize {
                    conv.convert(
                        &src.pixels[y * src_line..(y + 1) * src_line],
                        &mut self.pixels[y * dst_line..(y + 1) * dst_line],
                        width,
                    );
                }
            }
            _ => {
                return Err(RasterError::ImageMismatch(
                    "cannot transcode between grids and pixel formats".into(),
                ));
            }
        }
        self.current_rows = rows;
        Ok(())
    }

    /// Interleave the current rows of three single-band sessions into this
    /// session's buffer as red, green and blue.
    ///
    /// Bands must be `Grayscale` or 8-bit unsigned grids, all with this
    /// session's width and the same number of current rows.
    pub fn merge_rgb_bands(
        &mut self,
        red: &StripImage,
        green: &StripImage,
        blue: &StripImage,
    ) -> Result<(), RasterError> {
        let rows = red.current_rows;
        for band in [red, green, blue] {
            let byte_band = band.pixel_format() == PixelFormat::Grayscale
                || band.header.grid_sample() == Some(crate::GridSample::UInt8);
            if !byte_band {
                return Err(RasterError::ImageMismatch(format!(
                    "band is {:?}, expected 8-bit single band",
                    band.pixel_format()
                )));
            }
            if band.width() != self.width() || band.current_rows != rows {
                return Err(RasterError::ImageMismatch(format!(
                    "band {}x{} rows vs {}x{rows}",
                    band.width(),
                    band.current_rows,
                    self.width()
                )));
            }
        }
        if rows > self.rows_per_block {
            return Err(RasterError::BufferTooSmall {
                needed: self.header.rows_len(rows)?,
                actual: self.pixels.len(),
            });
        }
        let format = self.header.pixel_format();
        let ps = self.header.pixel_size();
        let count = self.width() as usize * rows as usize;
        let dst = &mut self.pixels[..count * ps];
        for (i, d) in dst.chunks_exact_mut(ps).enumerate() {
            let (r, g, b) = (red.pixels[i], green.pixels[i], blue.pixels[i]);
            match format {
                PixelFormat::Rgb => d.copy_from_slice(&[r, g, b]),
                PixelFormat::Rgba => d.copy_from_slice(&[r, g, b, 255]),
                PixelFormat::Argb => d.copy_from_slice(&[255, r, g, b]),
                PixelFormat::Bgr => d.copy_from_slice(&[b, g, r]),
                PixelFormat::Bgra => d.copy_from_slice(&[b, g, r, 255]),
                other => {
                    return Err(RasterError::ImageMismatch(format!(
                        "cannot merge bands into {other:?}"
                    )));
                }
            }
        }
        self.current_rows = rows;
        Ok(())
    }

    fn next_block_rows(&self) -> u32 {
        self.rows_per_block
            .min(self.header.height().saturating_sub(self.next_row))
    }

    fn check_allocated(&self) -> Result<(), RasterError> {
        if self.rows_per_block == 0 {
            return Err(RasterError::InvalidArgument(
                "allocate_pixels must be called before streaming".into(),
            ));
        }
        Ok(())
    }

    fn past_end(&self) -> RasterError {
        let msg = format!("strip access past end of image (row {})", self.next_row);
        match self.format {
            ImageFormat::Png => RasterError::PngCodec(msg),
            ImageFormat::Gif => RasterError::GifCodec(msg),
            ImageFormat::Jpeg => RasterError::JpegCodec(msg),
            ImageFormat::Tiff => RasterError::TiffCodec(msg),
            ImageFormat::Raw => RasterError::RawCodec(msg),
            ImageFormat::Hgt | ImageFormat::Bil | ImageFormat::Flt | ImageFormat::AsciiGrid => {
                RasterError::GridCodec(msg)
            }
        }
    }
}

impl Drop for StripImage {
    fn drop(&mut self) {
        if matches!(self.state, CodecState::Write(_)) {
            log::warn!("{:?} write session dropped without finish", self.format);
            if let Err(e) = self.close() {
                log::warn!("finalizing dropped {:?} session failed: {e}", self.format);
            }
        }
    }
}

pub(crate) fn open_file(path: &Path) -> Result<File, RasterError> {
    File::open(path).map_err(|source| RasterError::FileOpen {
        path: path.display().to_string(),
        source,
    })
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>, RasterError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| RasterError::FileOpen {
            path: path.display().to_string(),
            source,
        })
}

fn read_up_to(r: &mut impl Read, buf: &mut [u8]) -> Result<usize, RasterError> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..])? {
            0 => break,
            k => n += k,
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RasterImage;

    fn materialized(format: PixelFormat, w: u32, h: u32) -> StripImage {
        let mut img = RasterImage::new(format, w, h).unwrap();
        for (i, p) in img.pixels_mut().iter_mut().enumerate() {
            *p = i as u8;
        }
        let header = img.header().clone();
        StripImage::for_reading(
            header,
            ImageFormat::Gif,
            ReadState::Materialized(Materialized::new(img.into_pixels())),
        )
    }

    #[test]
    fn must_allocate_first() {
        let mut s = materialized(PixelFormat::Grayscale, 2, 2);
        assert!(matches!(
            s.read_next_strip(),
            Err(RasterError::InvalidArgument(_))
        ));
        assert!(s.allocate_pixels(0).is_err());
    }

    #[test]
    fn uneven_blocks_and_past_end() {
        let mut s = materialized(PixelFormat::Grayscale, 2, 5);
        s.allocate_pixels(3).unwrap();
        assert_eq!(s.read_next_strip().unwrap(), 60);
        assert_eq!(s.current_rows(), 3);
        assert_eq!(s.rows(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(s.read_next_strip().unwrap(), 100);
        assert_eq!(s.current_rows(), 2);
        assert_eq!(s.rows(), &[6, 7, 8, 9]);
        assert!(s.is_eof());
        assert!(matches!(s.read_next_strip(), Err(RasterError::GifCodec(_))));
        assert_eq!(s.next_row(), 5);
    }

    #[test]
    fn rewind_materialized() {
        let mut s = materialized(PixelFormat::Grayscale, 1, 2);
        s.allocate_pixels(2).unwrap();
        s.read_next_strip().unwrap();
        s.rewind().unwrap();
        assert_eq!(s.next_row(), 0);
        s.read_next_strip().unwrap();
        assert_eq!(s.rows(), &[0, 1]);
    }

    #[test]
    fn transcode_and_merge() {
        let mut src = materialized(PixelFormat::Grayscale, 2, 1);
        src.allocate_pixels(1).unwrap();
        src.read_next_strip().unwrap();

        let mut dst = materialized(PixelFormat::Rgba, 2, 1);
        dst.allocate_pixels(1).unwrap();
        dst.transcode_rows_from(&src).unwrap();
        assert_eq!(dst.rows(), &[0, 0, 0, 255, 1, 1, 1, 255]);

        let mut rgb = materialized(PixelFormat::Bgr, 2, 1);
        rgb.allocate_pixels(1).unwrap();
        rgb.merge_rgb_bands(&src, &src, &src).unwrap();
        assert_eq!(rgb.rows(), &[0, 0, 0, 1, 1, 1]);

        let wide = materialized(PixelFormat::Grayscale, 3, 1);
        assert!(matches!(
            dst.transcode_rows_from(&wide),
            Err(RasterError::ImageMismatch(_))
        ));
    }
}
