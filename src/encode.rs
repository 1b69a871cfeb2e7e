use std::path::Path;

use crate::error::RasterError;
use crate::grid::GridOptions;
use crate::image::RasterImage;
use crate::info::ImageFormat;
use enough::Stop;

#[cfg(feature = "jpeg")]
use crate::jpeg::JpegOptions;
#[cfg(feature = "png")]
use crate::png::PngOptions;
#[cfg(feature = "tiff")]
use crate::tiff::TiffOptions;

#[derive(Clone, Debug)]
enum Target {
    #[cfg(feature = "png")]
    Png(PngOptions),
    #[cfg(feature = "gif")]
    Gif,
    #[cfg(feature = "tiff")]
    Tiff(TiffOptions),
    #[cfg(feature = "jpeg")]
    Jpeg(JpegOptions),
    Raw,
    Hgt,
    AsciiGrid,
    Bil(GridOptions),
    Flt(GridOptions),
}

/// Encode request builder.
///
/// ```no_run
/// use zenraster::{EncodeRequest, PixelFormat, RasterImage, TiffOptions, Unstoppable};
///
/// let image = RasterImage::new(PixelFormat::Rgb, 64, 64)?;
/// let png = EncodeRequest::png().encode(&image, Unstoppable)?;
/// EncodeRequest::tiff(TiffOptions::default()).encode_to_file(&image, "out.tif", Unstoppable)?;
/// # Ok::<(), zenraster::RasterError>(())
/// ```
#[derive(Clone, Debug)]
pub struct EncodeRequest {
    target: Target,
}

impl EncodeRequest {
    #[cfg(feature = "png")]
    pub fn png() -> Self {
        Self::png_with(PngOptions::default())
    }

    #[cfg(feature = "png")]
    pub fn png_with(options: PngOptions) -> Self {
        Self {
            target: Target::Png(options),
        }
    }

    #[cfg(feature = "gif")]
    pub fn gif() -> Self {
        Self {
            target: Target::Gif,
        }
    }

    #[cfg(feature = "tiff")]
    pub fn tiff(options: TiffOptions) -> Self {
        Self {
            target: Target::Tiff(options),
        }
    }

    /// Baseline JPEG at `quality` (1..=100).
    #[cfg(feature = "jpeg")]
    pub fn jpeg(quality: u8) -> Self {
        Self {
            target: Target::Jpeg(JpegOptions { quality }),
        }
    }

    /// A whole-image RAW frame.
    pub fn raw() -> Self {
        Self {
            target: Target::Raw,
        }
    }

    pub fn hgt() -> Self {
        Self {
            target: Target::Hgt,
        }
    }

    pub fn ascii_grid() -> Self {
        Self {
            target: Target::AsciiGrid,
        }
    }

    /// BIL samples plus `.hdr`; only [`EncodeRequest::encode_to_file`] can
    /// write both.
    pub fn bil(options: GridOptions) -> Self {
        Self {
            target: Target::Bil(options),
        }
    }

    /// FLT samples plus `.hdr`, Float32 grids only.
    pub fn flt(options: GridOptions) -> Self {
        Self {
            target: Target::Flt(options),
        }
    }

    pub fn format(&self) -> ImageFormat {
        match self.target {
            #[cfg(feature = "png")]
            Target::Png(_) => ImageFormat::Png,
            #[cfg(feature = "gif")]
            Target::Gif => ImageFormat::Gif,
            #[cfg(feature = "tiff")]
            Target::Tiff(_) => ImageFormat::Tiff,
            #[cfg(feature = "jpeg")]
            Target::Jpeg(_) => ImageFormat::Jpeg,
            Target::Raw => ImageFormat::Raw,
            Target::Hgt => ImageFormat::Hgt,
            Target::AsciiGrid => ImageFormat::AsciiGrid,
            Target::Bil(_) => ImageFormat::Bil,
            Target::Flt(_) => ImageFormat::Flt,
        }
    }

    /// Encode into memory.
    pub fn encode(&self, image: &RasterImage, stop: impl Stop) -> Result<Vec<u8>, RasterError> {
        let stop: &dyn Stop = &stop;
        log::debug!(
            "encoding {}x{} {:?} as {:?}",
            image.width(),
            image.height(),
            image.pixel_format(),
            self.format()
        );
        match &self.target {
            #[cfg(feature = "png")]
            Target::Png(options) => crate::png::encode(image, options, stop),
            #[cfg(feature = "gif")]
            Target::Gif => crate::gif::encode(image, stop),
            #[cfg(feature = "tiff")]
            Target::Tiff(options) => crate::tiff::encode(image, options, stop),
            #[cfg(feature = "jpeg")]
            Target::Jpeg(options) => crate::jpeg::encode(image, options, stop),
            Target::Raw => crate::raw::encode(image, stop),
            Target::Hgt => crate::grid::hgt::encode(image, stop),
            Target::AsciiGrid => crate::grid::ascii::encode(image, stop),
            Target::Bil(_) | Target::Flt(_) => Err(RasterError::InvalidArgument(format!(
                "{:?} needs a .hdr companion, use encode_to_file",
                self.format()
            ))),
        }
    }

    /// Encode and write to `path`. BIL/FLT also write `path` with a `.hdr`
    /// extension.
    pub fn encode_to_file(
        &self,
        image: &RasterImage,
        path: impl AsRef<Path>,
        stop: impl Stop,
    ) -> Result<(), RasterError> {
        let path = path.as_ref();
        match &self.target {
            Target::Bil(options) | Target::Flt(options) => {
                let flt = matches!(self.target, Target::Flt(_));
                let (data, hdr) = crate::grid::bil::encode(image, flt, options, &stop)?;
                write_file(&crate::grid::bil::hdr_path(path), hdr.as_bytes())?;
                write_file(path, &data)
            }
            _ => write_file(path, &self.encode(image, stop)?),
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), RasterError> {
    std::fs::write(path, bytes).map_err(|source| RasterError::FileOpen {
        path: path.display().to_string(),
        source,
    })
}

/// Encode as PNG with default options.
#[cfg(feature = "png")]
pub fn encode_png(image: &RasterImage, stop: impl Stop) -> Result<Vec<u8>, RasterError> {
    EncodeRequest::png().encode(image, stop)
}

/// Encode as GIF.
#[cfg(feature = "gif")]
pub fn encode_gif(image: &RasterImage, stop: impl Stop) -> Result<Vec<u8>, RasterError> {
    EncodeRequest::gif().encode(image, stop)
}

/// Encode as Deflate-compressed GeoTIFF.
#[cfg(feature = "tiff")]
pub fn encode_tiff(image: &RasterImage, stop: impl Stop) -> Result<Vec<u8>, RasterError> {
    EncodeRequest::tiff(TiffOptions::default()).encode(image, stop)
}

/// Encode as JPEG at the default quality.
#[cfg(feature = "jpeg")]
pub fn encode_jpeg(image: &RasterImage, stop: impl Stop) -> Result<Vec<u8>, RasterError> {
    EncodeRequest::jpeg(crate::jpeg::DEFAULT_QUALITY).encode(image, stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::{GridSample, PixelFormat};
    use enough::Unstoppable;

    #[test]
    fn bil_needs_a_file() {
        let img = RasterImage::new_grid(GridSample::Int16, 2, 2).unwrap();
        assert!(matches!(
            EncodeRequest::bil(GridOptions::default()).encode(&img, Unstoppable),
            Err(RasterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn bil_file_pair_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.bil");
        let mut img = RasterImage::new_grid(GridSample::UInt16, 3, 2).unwrap();
        img.set_grid_value(2, 1, 4242.0).unwrap();
        EncodeRequest::bil(GridOptions::default())
            .encode_to_file(&img, &path, Unstoppable)
            .unwrap();
        assert!(dir.path().join("band.hdr").exists());
        let back = crate::decode::decode_file(&path, Unstoppable).unwrap();
        assert_eq!(back.pixels(), img.pixels());
    }

    #[test]
    fn format_names() {
        assert_eq!(EncodeRequest::raw().format(), ImageFormat::Raw);
        assert_eq!(EncodeRequest::ascii_grid().format(), ImageFormat::AsciiGrid);
        let img = RasterImage::new(PixelFormat::Rgb, 1, 1).unwrap();
        let bytes = EncodeRequest::raw().encode(&img, Unstoppable).unwrap();
        assert_eq!(ImageFormat::detect(&bytes), Some(ImageFormat::Raw));
    }
}
