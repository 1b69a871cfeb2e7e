//! # zenraster
//!
//! In-memory rasters, strip streaming and format adapters for imagery and
//! georeferenced elevation grids.
//!
//! A [`RasterImage`] holds one of the 8-bit pixel layouts (palette,
//! monochrome, greyscale, RGB/BGR, RGBA/BGRA/ARGB) or a single-band numeric
//! grid with an optional no-data value. Images carry a [`GeoReference`]
//! that survives conversion, sub-setting and resampling.
//!
//! ## Formats
//!
//! | Format | Read | Write | Strips | Feature |
//! |--------|------|-------|--------|---------|
//! | PNG | yes | yes | sequential | `png` |
//! | GIF | yes | yes | materialized | `gif` |
//! | TIFF / GeoTIFF | yes | yes | seekable | `tiff` |
//! | JPEG | yes | yes | materialized | `jpeg` |
//! | RAW frames (Adam7 planes) | yes | yes | no | always |
//! | SRTM HGT | yes | yes | seekable | always |
//! | BIL / FLT + `.hdr` | yes | yes | seekable | always |
//! | Esri ASCII grid | yes | yes | sequential | always |
//!
//! ## Streaming
//!
//! [`StripImage`] reads or writes `rows_per_block` scanlines at a time, so
//! a 100k x 100k GeoTIFF can be shrunk or transcoded in bounded memory.
//!
//! ## Usage
//!
//! ```no_run
//! use zenraster::{DecodeRequest, EncodeRequest, ImageInfos, PixelFormat, Unstoppable};
//!
//! let data = std::fs::read("scene.png")?;
//!
//! // Probe without decoding
//! let info = ImageInfos::from_bytes(&data)?;
//! println!("{}x{} {:?}", info.width(), info.height(), info.format);
//!
//! let mut image = DecodeRequest::new(&data).decode(Unstoppable)?;
//! image.convert_to(PixelFormat::Rgb)?;
//! let thumb = image.thumbnail(128, 128)?;
//! let gif = EncodeRequest::gif().encode(&thumb, Unstoppable)?;
//! # let _ = gif;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]

mod bits;
mod convert;
mod decode;
mod encode;
mod error;
mod georef;
mod header;
mod image;
mod info;
mod limits;
mod palette;
mod pixel;
mod resample;

pub mod grid;
pub mod raw;
pub mod strip;

#[cfg(feature = "gif")]
pub mod gif;
#[cfg(feature = "jpeg")]
pub mod jpeg;
#[cfg(feature = "png")]
pub mod png;
#[cfg(feature = "tiff")]
pub mod tiff;

// Re-exports
pub use crate::decode::{DecodeRequest, decode, decode_file};
pub use crate::encode::EncodeRequest;
#[cfg(feature = "gif")]
pub use crate::encode::encode_gif;
#[cfg(feature = "jpeg")]
pub use crate::encode::encode_jpeg;
#[cfg(feature = "png")]
pub use crate::encode::encode_png;
#[cfg(feature = "tiff")]
pub use crate::encode::encode_tiff;
pub use crate::error::RasterError;
pub use crate::georef::{GeoReference, UNSET_COORDINATE};
pub use crate::grid::{ByteOrder, GridOptions};
pub use crate::header::ImageHeader;
#[cfg(feature = "rgb")]
pub use crate::image::RasterPixel;
pub use crate::image::RasterImage;
pub use crate::info::{ImageFormat, ImageInfos};
pub use crate::limits::Limits;
pub use crate::palette::{Palette, is_near_transparent, luma};
pub use crate::pixel::{GridSample, PixelFormat, SampleFormat, pixel_size_and_scanline};
pub use crate::raw::Adam7Planes;
pub use crate::resample::{make_thumbnail, resize_generic, shrink_by_integer_factor};
pub use crate::strip::{Direction, ReadSeek, StripImage, WriteSeek};
pub use enough::{Stop, Unstoppable};

#[cfg(feature = "jpeg")]
pub use crate::jpeg::JpegOptions;
#[cfg(feature = "png")]
pub use crate::png::{PngCompression, PngOptions};
#[cfg(feature = "tiff")]
pub use crate::tiff::{TiffCompression, TiffLayout, TiffOptions, TiffReadOptions};
