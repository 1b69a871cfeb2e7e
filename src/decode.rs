use std::path::Path;

use crate::error::RasterError;
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use enough::Stop;

#[cfg(feature = "tiff")]
use crate::tiff::TiffReadOptions;

/// Decode request builder.
///
/// ```no_run
/// use zenraster::{DecodeRequest, Limits, Unstoppable};
///
/// let data = std::fs::read("scene.tif")?;
/// let limits = Limits { max_pixels: Some(100_000_000), ..Default::default() };
/// let image = DecodeRequest::new(&data)
///     .with_limits(&limits)
///     .decode(Unstoppable)?;
/// println!("{}x{} {:?}", image.width(), image.height(), image.pixel_format());
/// # Ok::<(), zenraster::RasterError>(())
/// ```
#[derive(Clone, Debug)]
pub struct DecodeRequest<'a> {
    data: &'a [u8],
    format: Option<ImageFormat>,
    limits: Option<&'a Limits>,
    name: Option<&'a str>,
    hdr: Option<&'a str>,
    #[cfg(feature = "tiff")]
    tiff: TiffReadOptions,
}

impl<'a> DecodeRequest<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            format: None,
            limits: None,
            name: None,
            hdr: None,
            #[cfg(feature = "tiff")]
            tiff: TiffReadOptions::default(),
        }
    }

    /// Skip magic-byte detection.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_limits(mut self, limits: &'a Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// File name of the data. HGT tiles are georeferenced from it, and its
    /// extension is the fallback when the bytes carry no magic.
    pub fn with_name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Text of the `.hdr` that describes BIL/FLT samples.
    pub fn with_hdr(mut self, hdr: &'a str) -> Self {
        self.hdr = Some(hdr);
        self
    }

    #[cfg(feature = "tiff")]
    pub fn with_tiff_options(mut self, options: TiffReadOptions) -> Self {
        self.tiff = options;
        self
    }

    fn resolve_format(&self) -> Result<ImageFormat, RasterError> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        if let Some(format) = ImageFormat::detect(self.data) {
            return Ok(format);
        }
        let by_name = self.name.and_then(|n| ImageFormat::from_path(Path::new(n)));
        match by_name {
            Some(format) => Ok(format),
            None if self.hdr.is_some() => Ok(ImageFormat::Bil),
            None => Err(RasterError::UnrecognizedFormat),
        }
    }

    /// Probe the header without decoding pixels.
    pub fn probe(&self) -> Result<ImageInfos, RasterError> {
        match self.resolve_format()? {
            ImageFormat::Hgt => crate::grid::hgt::probe_header(self.data, self.name),
            format @ (ImageFormat::Bil | ImageFormat::Flt) => {
                let hdr = self.hdr_text(format)?;
                let parsed = crate::grid::bil::parse_hdr(hdr, format == ImageFormat::Flt)?;
                Ok(ImageInfos::new(format, parsed.header))
            }
            format => ImageInfos::from_bytes_as(self.data, format),
        }
    }

    fn hdr_text(&self, format: ImageFormat) -> Result<&'a str, RasterError> {
        self.hdr.ok_or_else(|| {
            RasterError::InvalidArgument(format!("{format:?} needs its .hdr text, see with_hdr"))
        })
    }

    /// Decode the whole image.
    pub fn decode(self, stop: impl Stop) -> Result<RasterImage, RasterError> {
        let format = self.resolve_format()?;
        let (data, limits, stop): (&[u8], Option<&Limits>, &dyn Stop) =
            (self.data, self.limits, &stop);
        log::debug!("decoding {} bytes as {format:?}", data.len());
        match format {
            #[cfg(feature = "png")]
            ImageFormat::Png => crate::png::decode(data, limits, stop),
            #[cfg(feature = "gif")]
            ImageFormat::Gif => crate::gif::decode(data, limits, stop),
            #[cfg(feature = "jpeg")]
            ImageFormat::Jpeg => crate::jpeg::decode(data, limits, stop),
            #[cfg(feature = "tiff")]
            ImageFormat::Tiff => crate::tiff::decode(data, limits, &self.tiff, stop),
            ImageFormat::Raw => crate::raw::decode(data, limits, stop),
            ImageFormat::Hgt => crate::grid::hgt::decode(data, self.name, limits, stop),
            ImageFormat::Bil | ImageFormat::Flt => crate::grid::bil::decode(
                data,
                self.hdr_text(format)?,
                format == ImageFormat::Flt,
                limits,
                stop,
            ),
            ImageFormat::AsciiGrid => crate::grid::ascii::decode(data, limits, stop),
            #[allow(unreachable_patterns)]
            other => Err(RasterError::UnsupportedLayout(format!(
                "{other:?} support is not compiled in"
            ))),
        }
    }
}

/// Decode with format auto-detection.
pub fn decode(data: &[u8], stop: impl Stop) -> Result<RasterImage, RasterError> {
    DecodeRequest::new(data).decode(stop)
}

/// Read and decode a file.
///
/// The format comes from the magic bytes, then the extension. HGT tiles
/// are georeferenced from the file name; BIL/FLT read their `.hdr`.
pub fn decode_file(path: impl AsRef<Path>, stop: impl Stop) -> Result<RasterImage, RasterError> {
    let path = path.as_ref();
    let data = read_file(path)?;
    let name = path.file_name().and_then(|n| n.to_str());
    let format = ImageFormat::detect(&data)
        .or_else(|| ImageFormat::from_path(path))
        .ok_or(RasterError::UnrecognizedFormat)?;

    let hdr = match format {
        ImageFormat::Bil | ImageFormat::Flt => {
            let hdr_path = crate::grid::bil::hdr_path(path);
            Some(
                std::fs::read_to_string(&hdr_path).map_err(|source| RasterError::FileOpen {
                    path: hdr_path.display().to_string(),
                    source,
                })?,
            )
        }
        _ => None,
    };
    let mut request = DecodeRequest::new(&data).with_format(format);
    if let Some(name) = name {
        request = request.with_name(name);
    }
    if let Some(hdr) = hdr.as_deref() {
        request = request.with_hdr(hdr);
    }
    request.decode(stop)
}

pub(crate) fn read_file(path: &Path) -> Result<Vec<u8>, RasterError> {
    std::fs::read(path).map_err(|source| RasterError::FileOpen {
        path: path.display().to_string(),
        source,
    })
}
