use crate::error::RasterError;
use crate::header::ImageHeader;

/// Produces rows in the session's pixel layout.
pub(crate) trait RowReader {
    /// Fill `buf` with `buf.len() / scanline_width` rows starting at
    /// `first_row`.
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError>;

    /// Whether rows can be requested out of order.
    fn can_seek(&self) -> bool {
        false
    }
}

/// Consumes rows in the session's pixel layout.
pub(crate) trait RowWriter {
    fn write_rows(&mut self, header: &ImageHeader, first_row: u32, buf: &[u8])
    -> Result<(), RasterError>;

    /// Flush trailing data and close the stream.
    fn finish(self, header: &ImageHeader) -> Result<(), RasterError>;
}

/// A fully decoded image served by strips.
pub(crate) struct Materialized {
    pixels: Vec<u8>,
}

impl Materialized {
    pub(crate) fn new(pixels: Vec<u8>) -> Self {
        Self { pixels }
    }
}

impl RowReader for Materialized {
    fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        let start = header.rows_len(first_row)?;
        let src = self
            .pixels
            .get(start..start + buf.len())
            .ok_or(RasterError::UnexpectedEof)?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn can_seek(&self) -> bool {
        true
    }
}

pub(crate) enum ReadState {
    #[cfg(feature = "png")]
    Png(crate::png::PngRowReader),
    #[cfg(feature = "tiff")]
    Tiff(crate::tiff::TiffRowReader),
    /// GIF and JPEG, decoded whole when the session opens.
    Materialized(Materialized),
    Grid(crate::grid::GridRowReader),
}

impl ReadState {
    fn reader(&mut self) -> &mut dyn RowReader {
        match self {
            #[cfg(feature = "png")]
            ReadState::Png(r) => r,
            #[cfg(feature = "tiff")]
            ReadState::Tiff(r) => r,
            ReadState::Materialized(r) => r,
            ReadState::Grid(r) => r,
        }
    }

    pub(crate) fn read_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        self.reader().read_rows(header, first_row, buf)
    }

    pub(crate) fn can_seek(&self) -> bool {
        match self {
            #[cfg(feature = "png")]
            ReadState::Png(r) => r.can_seek(),
            #[cfg(feature = "tiff")]
            ReadState::Tiff(r) => r.can_seek(),
            ReadState::Materialized(r) => r.can_seek(),
            ReadState::Grid(r) => r.can_seek(),
        }
    }
}

pub(crate) enum WriteState {
    #[cfg(feature = "png")]
    Png(crate::png::PngRowWriter),
    #[cfg(feature = "tiff")]
    Tiff(crate::tiff::TiffRowWriter),
    #[cfg(feature = "jpeg")]
    Jpeg(crate::jpeg::JpegRowWriter),
    Grid(crate::grid::GridRowWriter),
}

impl WriteState {
    pub(crate) fn write_rows(
        &mut self,
        header: &ImageHeader,
        first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        match self {
            #[cfg(feature = "png")]
            WriteState::Png(w) => w.write_rows(header, first_row, buf),
            #[cfg(feature = "tiff")]
            WriteState::Tiff(w) => w.write_rows(header, first_row, buf),
            #[cfg(feature = "jpeg")]
            WriteState::Jpeg(w) => w.write_rows(header, first_row, buf),
            WriteState::Grid(w) => w.write_rows(header, first_row, buf),
        }
    }

    pub(crate) fn finish(self, header: &ImageHeader) -> Result<(), RasterError> {
        match self {
            #[cfg(feature = "png")]
            WriteState::Png(w) => w.finish(header),
            #[cfg(feature = "tiff")]
            WriteState::Tiff(w) => w.finish(header),
            #[cfg(feature = "jpeg")]
            WriteState::Jpeg(w) => w.finish(header),
            WriteState::Grid(w) => w.finish(header),
        }
    }
}
