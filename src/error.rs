use enough::StopReason;

/// Errors from raster decoding, encoding, conversion and strip streaming.
///
/// Every variant maps onto a flat negative integer through [`RasterError::code`],
/// so hosts that need numeric status codes can report them without matching.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RasterError {
    #[error("cannot open {path}: {source}")]
    FileOpen {
        path: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("insufficient memory for {0} bytes")]
    OutOfMemory(usize),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    #[error("image mismatch: {0}")]
    ImageMismatch(String),

    #[error("image is not georeferenced")]
    MissingGeoreference,

    #[error("unrecognized format magic bytes")]
    UnrecognizedFormat,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("dimensions too large: {width}x{height}")]
    DimensionsTooLarge { width: u32, height: u32 },

    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("PNG codec error: {0}")]
    PngCodec(String),

    #[error("GIF codec error: {0}")]
    GifCodec(String),

    #[error("TIFF codec error: {0}")]
    TiffCodec(String),

    #[error("JPEG codec error: {0}")]
    JpegCodec(String),

    #[error("grid codec error: {0}")]
    GridCodec(String),

    #[error("RAW codec error: {0}")]
    RawCodec(String),

    #[error("operation cancelled")]
    Cancelled(StopReason),
}

impl RasterError {
    /// Flat integer error code. Success is 0 and is never produced here.
    pub fn code(&self) -> i32 {
        match self {
            RasterError::FileOpen { .. } => -1,
            RasterError::Io(_) => -2,
            RasterError::OutOfMemory(_) => -3,
            RasterError::InvalidImage(_) => -4,
            RasterError::InvalidArgument(_) => -5,
            RasterError::UnsupportedLayout(_) => -6,
            RasterError::ImageMismatch(_) => -7,
            RasterError::MissingGeoreference => -8,
            RasterError::UnrecognizedFormat => -9,
            RasterError::UnexpectedEof => -10,
            RasterError::LimitExceeded(_) => -11,
            RasterError::DimensionsTooLarge { .. } => -12,
            RasterError::BufferTooSmall { .. } => -13,
            RasterError::PngCodec(_) => -20,
            RasterError::GifCodec(_) => -21,
            RasterError::TiffCodec(_) => -22,
            RasterError::JpegCodec(_) => -23,
            RasterError::GridCodec(_) => -24,
            RasterError::RawCodec(_) => -25,
            RasterError::Cancelled(_) => -30,
        }
    }
}

impl From<StopReason> for RasterError {
    fn from(r: StopReason) -> Self {
        RasterError::Cancelled(r)
    }
}

#[cfg(feature = "png")]
impl From<png::DecodingError> for RasterError {
    fn from(e: png::DecodingError) -> Self {
        match e {
            png::DecodingError::IoError(io) => RasterError::Io(io),
            other => RasterError::PngCodec(other.to_string()),
        }
    }
}

#[cfg(feature = "png")]
impl From<png::EncodingError> for RasterError {
    fn from(e: png::EncodingError) -> Self {
        match e {
            png::EncodingError::IoError(io) => RasterError::Io(io),
            other => RasterError::PngCodec(other.to_string()),
        }
    }
}

#[cfg(feature = "gif")]
impl From<gif::DecodingError> for RasterError {
    fn from(e: gif::DecodingError) -> Self {
        match e {
            gif::DecodingError::Io(io) => RasterError::Io(io),
            other => RasterError::GifCodec(other.to_string()),
        }
    }
}

#[cfg(feature = "gif")]
impl From<gif::EncodingError> for RasterError {
    fn from(e: gif::EncodingError) -> Self {
        match e {
            gif::EncodingError::Io(io) => RasterError::Io(io),
            other => RasterError::GifCodec(other.to_string()),
        }
    }
}

#[cfg(feature = "tiff")]
impl From<tiff::TiffError> for RasterError {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => RasterError::Io(io),
            other => RasterError::TiffCodec(other.to_string()),
        }
    }
}

#[cfg(feature = "jpeg")]
impl From<image::ImageError> for RasterError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => RasterError::Io(io),
            other => RasterError::JpegCodec(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct() {
        let errors = [
            RasterError::Io(std::io::Error::other("x")),
            RasterError::OutOfMemory(1),
            RasterError::InvalidImage(String::new()),
            RasterError::InvalidArgument(String::new()),
            RasterError::UnsupportedLayout(String::new()),
            RasterError::ImageMismatch(String::new()),
            RasterError::MissingGeoreference,
            RasterError::UnrecognizedFormat,
            RasterError::UnexpectedEof,
            RasterError::PngCodec(String::new()),
            RasterError::TiffCodec(String::new()),
            RasterError::GridCodec(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(RasterError::code).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
