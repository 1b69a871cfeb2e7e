//! Scientific grid formats: SRTM HGT, ESRI BIL/FLT with a `.hdr`
//! companion, and ESRI ASCII grids.
//!
//! The binary formats are headerless sample planes, so their strip readers
//! seek straight to the requested row.

pub mod ascii;
pub mod bil;
pub mod hgt;

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::strip::{ReadSeek, RowReader, RowWriter};

/// Sample byte order of a binary grid file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    fn is_native(self) -> bool {
        match self {
            ByteOrder::LittleEndian => cfg!(target_endian = "little"),
            ByteOrder::BigEndian => cfg!(target_endian = "big"),
        }
    }

    /// Swap samples of `width` bytes between this order and native order.
    /// The operation is its own inverse.
    pub(crate) fn swap_samples(self, width: usize, buf: &mut [u8]) {
        if width > 1 && !self.is_native() {
            for s in buf.chunks_exact_mut(width) {
                s.reverse();
            }
        }
    }
}

/// Output options for BIL/FLT.
#[derive(Clone, Debug, Default)]
pub struct GridOptions {
    pub byte_order: ByteOrder,
}

fn sample_width(header: &ImageHeader) -> usize {
    header.grid_sample().map_or(1, |s| s.byte_width())
}

/// Seekable reader of a raw sample plane.
pub(crate) struct PlaneReader {
    source: Box<dyn ReadSeek>,
    data_offset: u64,
    order: ByteOrder,
}

impl PlaneReader {
    pub(crate) fn new(source: Box<dyn ReadSeek>, data_offset: u64, order: ByteOrder) -> Self {
        Self {
            source,
            data_offset,
            order,
        }
    }
}

impl RowReader for PlaneReader {
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        let at = self.data_offset + header.rows_len(first_row)? as u64;
        self.source.seek(SeekFrom::Start(at))?;
        self.source.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                RasterError::GridCodec(format!("sample data ends before row {first_row}"))
            }
            _ => RasterError::Io(e),
        })?;
        self.order.swap_samples(sample_width(header), buf);
        Ok(())
    }

    fn can_seek(&self) -> bool {
        true
    }
}

pub(crate) enum GridRowReader {
    Plane(PlaneReader),
    Ascii(ascii::AsciiRowReader),
}

impl RowReader for GridRowReader {
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        match self {
            GridRowReader::Plane(r) => r.read_rows(header, first_row, buf),
            GridRowReader::Ascii(r) => r.read_rows(header, first_row, buf),
        }
    }

    fn can_seek(&self) -> bool {
        match self {
            GridRowReader::Plane(r) => r.can_seek(),
            GridRowReader::Ascii(r) => r.can_seek(),
        }
    }
}

/// Sequential writer of a raw sample plane.
pub(crate) struct PlaneWriter {
    out: Box<dyn Write>,
    order: ByteOrder,
    scratch: Vec<u8>,
}

impl PlaneWriter {
    pub(crate) fn new(out: Box<dyn Write>, order: ByteOrder) -> Self {
        Self {
            out,
            order,
            scratch: Vec::new(),
        }
    }
}

impl RowWriter for PlaneWriter {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        _first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.order.swap_samples(sample_width(header), &mut self.scratch);
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    fn finish(mut self, _header: &ImageHeader) -> Result<(), RasterError> {
        self.out.flush()?;
        Ok(())
    }
}

pub(crate) enum GridRowWriter {
    Plane(PlaneWriter),
    Ascii(ascii::AsciiRowWriter),
}

impl RowWriter for GridRowWriter {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        match self {
            GridRowWriter::Plane(w) => w.write_rows(header, first_row, buf),
            GridRowWriter::Ascii(w) => w.write_rows(header, first_row, buf),
        }
    }

    fn finish(self, header: &ImageHeader) -> Result<(), RasterError> {
        match self {
            GridRowWriter::Plane(w) => w.finish(header),
            GridRowWriter::Ascii(w) => w.finish(header),
        }
    }
}

/// Copy a sample plane out of `data`, converting to native order.
pub(crate) fn plane_from_bytes(
    header: &ImageHeader,
    data: &[u8],
    order: ByteOrder,
) -> Result<Vec<u8>, RasterError> {
    let len = header.rows_len(header.height())?;
    let src = data.get(..len).ok_or_else(|| {
        RasterError::GridCodec(format!("need {len} bytes of samples, got {}", data.len()))
    })?;
    let mut pixels = crate::header::alloc_zeroed(len)?;
    pixels.copy_from_slice(src);
    order.swap_samples(sample_width(header), &mut pixels);
    Ok(pixels)
}

/// A native-order sample plane in the given byte order.
pub(crate) fn plane_to_bytes(header: &ImageHeader, pixels: &[u8], order: ByteOrder) -> Vec<u8> {
    let mut out = pixels.to_vec();
    order.swap_samples(sample_width(header), &mut out);
    out
}
