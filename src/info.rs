use std::path::Path;

use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::pixel::PixelFormat;

/// Container formats this crate reads or writes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Gif,
    Jpeg,
    /// TIFF and GeoTIFF.
    Tiff,
    /// RAW / ADAM7 framed pixel planes.
    Raw,
    /// SRTM elevation tile.
    Hgt,
    /// ESRI BIL with `.hdr` companion.
    Bil,
    /// ESRI FLT with `.hdr` companion.
    Flt,
    /// ESRI ASCII grid.
    AsciiGrid,
}

impl ImageFormat {
    /// Detect the format from leading bytes.
    ///
    /// HGT has no magic and is recognized by its exact SRTM1/SRTM3 size.
    /// BIL and FLT are headerless and never detected.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
            return Some(Self::Tiff);
        }
        if crate::raw::is_start_marker(data) {
            return Some(Self::Raw);
        }
        if crate::grid::ascii::looks_like_ascii_grid(data) {
            return Some(Self::AsciiGrid);
        }
        if crate::grid::hgt::side_for_len(data.len()).is_some() {
            return Some(Self::Hgt);
        }
        None
    }

    /// Format implied by a file extension, case-insensitive, no dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "jpg" | "jpeg" | "jpe" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "raw" => Some(Self::Raw),
            "hgt" => Some(Self::Hgt),
            "bil" => Some(Self::Bil),
            "flt" => Some(Self::Flt),
            "asc" => Some(Self::AsciiGrid),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
            Self::Raw => "raw",
            Self::Hgt => "hgt",
            Self::Bil => "bil",
            Self::Flt => "flt",
            Self::AsciiGrid => "asc",
        }
    }
}

/// Header-only view of an image, produced without decoding pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfos {
    pub format: ImageFormat,
    pub header: ImageHeader,
    /// PNG ADAM7 or interlaced GIF.
    pub interlaced: bool,
    pub is_tiled: bool,
    pub tile_width: u32,
    pub tile_height: u32,
    /// TIFF rows per strip; equals the height for single-strip files.
    pub rows_per_strip: u32,
    /// TIFF compression tag value.
    pub compression: Option<u16>,
}

impl ImageInfos {
    pub(crate) fn new(format: ImageFormat, header: ImageHeader) -> Self {
        let rows_per_strip = header.height();
        Self {
            format,
            header,
            interlaced: false,
            is_tiled: false,
            tile_width: 0,
            tile_height: 0,
            rows_per_strip,
            compression: None,
        }
    }

    /// Probe a memory buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RasterError> {
        let format = ImageFormat::detect(data).ok_or(RasterError::UnrecognizedFormat)?;
        Self::from_bytes_as(data, format)
    }

    /// Probe a memory buffer known to hold `format`.
    pub fn from_bytes_as(data: &[u8], format: ImageFormat) -> Result<Self, RasterError> {
        match format {
            #[cfg(feature = "png")]
            ImageFormat::Png => crate::png::probe_header(data),
            #[cfg(feature = "gif")]
            ImageFormat::Gif => crate::gif::probe_header(data),
            #[cfg(feature = "jpeg")]
            ImageFormat::Jpeg => crate::jpeg::probe_header(data),
            #[cfg(feature = "tiff")]
            ImageFormat::Tiff => crate::tiff::probe_header(data),
            ImageFormat::Raw => crate::raw::probe_header(data),
            ImageFormat::Hgt => crate::grid::hgt::probe_header(data, None),
            ImageFormat::AsciiGrid => crate::grid::ascii::probe_header(data),
            other => Err(RasterError::InvalidArgument(format!(
                "{other:?} cannot be probed from bytes alone"
            ))),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_magic() {
        assert_eq!(
            ImageFormat::detect(b"\x89PNG\r\n\x1a\n...."),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::detect(b"GIF89a.."), Some(ImageFormat::Gif));
        assert_eq!(
            ImageFormat::detect(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::detect(b"II*\0\x08\0\0\0"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::detect(b"MM\0*\0\0\0\x08"), Some(ImageFormat::Tiff));
        assert_eq!(
            ImageFormat::detect(b"ncols 4\nnrows 2\n"),
            Some(ImageFormat::AsciiGrid)
        );
        assert_eq!(ImageFormat::detect(b"hello"), None);
        assert_eq!(ImageFormat::detect(&[]), None);
    }

    #[test]
    fn extensions() {
        assert_eq!(ImageFormat::from_extension("TIF"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_extension("jpeg"), Some(ImageFormat::Jpeg));
        assert_eq!(
            ImageFormat::from_path(Path::new("/data/N45E012.hgt")),
            Some(ImageFormat::Hgt)
        );
        assert_eq!(ImageFormat::from_extension("bmp"), None);
        for f in [
            ImageFormat::Png,
            ImageFormat::Gif,
            ImageFormat::Jpeg,
            ImageFormat::Tiff,
            ImageFormat::Raw,
            ImageFormat::Hgt,
            ImageFormat::Bil,
            ImageFormat::Flt,
            ImageFormat::AsciiGrid,
        ] {
            assert_eq!(ImageFormat::from_extension(f.extension()), Some(f));
        }
    }

    #[test]
    fn unknown_bytes_fail_probe() {
        assert!(matches!(
            ImageInfos::from_bytes(b"not an image"),
            Err(RasterError::UnrecognizedFormat)
        ));
    }
}
