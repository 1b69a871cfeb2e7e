//! TIFF and GeoTIFF.
//!
//! Reading goes through the `tiff` crate and accepts stripped or tiled
//! files with 1/2/4/8-bit grey, palette, RGB(A) and grey+alpha samples, plus
//! single-band 8..64-bit integer and float grids. 16-bit colour is reduced to
//! 8 bits. YCbCr and planar layouts are rejected. Bilevel CCITT Group 4
//! data is decoded with the `fax` crate; Group 3 and modified Huffman
//! (compression 2 and 3) are refused with a codec error.
//!
//! Writing is a streaming baseline writer: strips or 16-aligned tiles,
//! uncompressed or Deflate, with GeoTIFF tags and GDAL nodata.
//!
//! Georeferencing is read from ModelPixelScale + ModelTiepoint, with the
//! GeoKey directory supplying the EPSG code, the citation and the raster
//! type (PixelIsPoint shifts the origin by half a pixel).

mod decode;
mod encode;
mod geo;

pub(crate) use decode::TiffRowReader;
pub(crate) use encode::TiffRowWriter;

use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use crate::error::RasterError;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::strip::{ReadSeek, ReadState, RowReader, StripImage, WriteState};
use enough::Stop;

use decode::BandReader;
use encode::TiffStream;

/// Reader behaviour for malformed-but-readable files.
#[derive(Clone, Debug, Default)]
pub struct TiffReadOptions {
    /// Log recoverable header quirks (missing SamplesPerPixel or
    /// PlanarConfiguration) at warn level instead of debug.
    pub report_warnings: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TiffCompression {
    None,
    #[default]
    Deflate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TiffLayout {
    Strips { rows_per_strip: u32 },
    /// Tile sides must be multiples of 16.
    Tiles { width: u32, height: u32 },
}

impl Default for TiffLayout {
    fn default() -> Self {
        TiffLayout::Strips { rows_per_strip: 16 }
    }
}

#[derive(Clone, Debug)]
pub struct TiffOptions {
    pub compression: TiffCompression,
    pub layout: TiffLayout,
    /// Write GeoTIFF tags for georeferenced images and GDAL_NODATA.
    pub geotiff: bool,
    /// Store monochrome palette images as 1-bit samples.
    pub bilevel: bool,
}

impl Default for TiffOptions {
    fn default() -> Self {
        Self {
            compression: TiffCompression::default(),
            layout: TiffLayout::default(),
            geotiff: true,
            bilevel: true,
        }
    }
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    let opened = decode::open(Cursor::new(data), &TiffReadOptions::default())?;
    let mut info = ImageInfos::new(ImageFormat::Tiff, opened.header);
    info.is_tiled = opened.tiled;
    info.compression = Some(opened.compression);
    if opened.tiled {
        info.tile_width = opened.chunk_width;
        info.tile_height = opened.chunk_height;
    } else {
        info.rows_per_strip = opened.chunk_height;
    }
    Ok(info)
}

/// Decode the first IFD (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    options: &TiffReadOptions,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let opened = decode::open(Cursor::new(data), options)?;
    if let Some(limits) = limits {
        limits.check_header(&opened.header)?;
    }
    let header = opened.header.clone();
    let band_rows = opened.chunk_height;
    let mut reader = BandReader::new(opened)?;
    let mut pixels = alloc_zeroed(header.rows_len(header.height())?)?;

    let mut row = 0;
    while row < header.height() {
        stop.check()?;
        let rows = band_rows.min(header.height() - row);
        let start = header.rows_len(row)?;
        let len = header.rows_len(rows)?;
        reader.read_rows(&header, row, &mut pixels[start..start + len])?;
        row += rows;
    }
    RasterImage::from_buffer(header, pixels)
}

/// Encode into memory (called from EncodeRequest).
pub(crate) fn encode(
    image: &RasterImage,
    options: &TiffOptions,
    stop: &dyn Stop,
) -> Result<Vec<u8>, RasterError> {
    let mut stream = TiffStream::new(Cursor::new(Vec::new()), image.header(), options)?;
    for y in 0..image.height() {
        if y % 16 == 0 {
            stop.check()?;
        }
        stream.push_row(image.row(y))?;
    }
    Ok(stream.finalize()?.into_inner())
}

/// Start a strip read session. Rows can be read in any order.
pub fn open_strips<R: Read + Seek + 'static>(
    source: R,
    options: &TiffReadOptions,
) -> Result<StripImage, RasterError> {
    let boxed: Box<dyn ReadSeek> = Box::new(source);
    let opened = decode::open(boxed, options)?;
    let header = opened.header.clone();
    log::debug!(
        "TIFF strips: {}x{} {:?}, {} {}x{}",
        header.width(),
        header.height(),
        header.pixel_format(),
        if opened.tiled { "tiles" } else { "strips" },
        opened.chunk_width,
        opened.chunk_height
    );
    Ok(StripImage::for_reading(
        header,
        ImageFormat::Tiff,
        ReadState::Tiff(TiffRowReader::new(opened)?),
    ))
}

/// Start a strip write session. Palette, georeferencing and no-data are
/// taken from `header` now; the IFD is written by [`StripImage::finish`].
pub fn create_strips<W: Write + Seek + 'static>(
    out: W,
    header: ImageHeader,
    options: &TiffOptions,
) -> Result<StripImage, RasterError> {
    let writer = TiffRowWriter::new(Box::new(out), &header, options)?;
    Ok(StripImage::for_writing(
        header,
        ImageFormat::Tiff,
        WriteState::Tiff(writer),
    ))
}

/// [`create_strips`] onto a new file.
pub fn create_strips_file(
    path: impl AsRef<Path>,
    header: ImageHeader,
    options: &TiffOptions,
) -> Result<StripImage, RasterError> {
    create_strips(crate::strip::create_file(path.as_ref())?, header, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::georef::GeoReference;
    use crate::palette::Palette;
    use crate::pixel::{GridSample, PixelFormat};
    use enough::Unstoppable;

    /// Little-endian single-strip TIFF around already coded strip bytes.
    fn one_strip_tiff(width: u16, height: u16, compression: u16, photometric: u16, strip: &[u8]) -> Vec<u8> {
        let entries: [(u16, u16, u32); 9] = [
            (256, 3, width.into()),
            (257, 3, height.into()),
            (258, 3, 1),
            (259, 3, compression.into()),
            (262, 3, photometric.into()),
            (273, 4, 8),
            (277, 3, 1),
            (278, 3, height.into()),
            (279, 4, strip.len() as u32),
        ];
        let ifd = (8 + strip.len() as u32 + 1) & !1;
        let mut out = b"II*\0".to_vec();
        out.extend_from_slice(&ifd.to_le_bytes());
        out.extend_from_slice(strip);
        out.resize(ifd as usize, 0);
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (tag, kind, value) in entries {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&kind.to_le_bytes());
            out.extend_from_slice(&1u32.to_le_bytes());
            if kind == 3 {
                out.extend_from_slice(&(value as u16).to_le_bytes());
                out.extend_from_slice(&[0, 0]);
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out
    }

    // 8x2: row 0 is two white, two black, four white; row 1 is white.
    // Horizontal mode then V0, pass mode then V0, then EOFB.
    const FAX4_STRIP: [u8; 5] = [0x2f, 0x8c, 0x00, 0x40, 0x04];

    #[test]
    fn ccitt_group4_strip_decodes() {
        let bytes = one_strip_tiff(8, 2, 4, 0, &FAX4_STRIP);
        let img = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap();
        assert_eq!(img.pixel_format(), PixelFormat::Palette);
        assert!(img.palette().is_monochrome());
        assert_eq!(img.row(0), &[1, 1, 0, 0, 1, 1, 1, 1]);
        assert_eq!(img.row(1), &[1; 8]);

        let info = probe_header(&bytes).unwrap();
        assert_eq!(info.compression, Some(4));
    }

    #[test]
    fn ccitt_group4_black_is_zero_inverts() {
        let bytes = one_strip_tiff(8, 2, 4, 1, &FAX4_STRIP);
        let img = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap();
        assert_eq!(img.row(0), &[0, 0, 1, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn ccitt_group4_truncated_is_codec_error() {
        let bytes = one_strip_tiff(8, 2, 4, 0, &FAX4_STRIP[..1]);
        let err = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap_err();
        assert!(matches!(err, RasterError::TiffCodec(_)), "{err}");
    }

    #[test]
    fn ccitt_group3_is_refused() {
        let bytes = one_strip_tiff(8, 2, 3, 0, &[0; 4]);
        let err = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap_err();
        assert!(matches!(err, RasterError::TiffCodec(_)), "{err}");
        assert_eq!(err.code(), -22);
    }

    fn gradient(format: PixelFormat, w: u32, h: u32) -> RasterImage {
        let mut img = RasterImage::new(format, w, h).unwrap();
        for (i, p) in img.pixels_mut().iter_mut().enumerate() {
            *p = (i * 7 % 251) as u8;
        }
        img
    }

    fn roundtrip(img: &RasterImage, options: &TiffOptions) -> RasterImage {
        let bytes = encode(img, options, &Unstoppable).unwrap();
        decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap()
    }

    #[test]
    fn strips_and_compression() {
        let img = gradient(PixelFormat::Rgb, 37, 23);
        for compression in [TiffCompression::None, TiffCompression::Deflate] {
            let options = TiffOptions {
                compression,
                layout: TiffLayout::Strips { rows_per_strip: 5 },
                ..TiffOptions::default()
            };
            let back = roundtrip(&img, &options);
            assert_eq!(back.pixel_format(), PixelFormat::Rgb);
            assert_eq!(back.pixels(), img.pixels());
        }
    }

    #[test]
    fn tiles_with_partial_edges() {
        let img = gradient(PixelFormat::Rgba, 40, 33);
        let options = TiffOptions {
            layout: TiffLayout::Tiles {
                width: 16,
                height: 16,
            },
            ..TiffOptions::default()
        };
        let bytes = encode(&img, &options, &Unstoppable).unwrap();
        let info = probe_header(&bytes).unwrap();
        assert!(info.is_tiled);
        assert_eq!((info.tile_width, info.tile_height), (16, 16));
        assert_eq!(info.compression, Some(8));
        let back = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap();
        assert_eq!(back.pixels(), img.pixels());
    }

    #[test]
    fn tile_size_must_be_aligned() {
        let img = gradient(PixelFormat::Grayscale, 4, 4);
        let options = TiffOptions {
            layout: TiffLayout::Tiles {
                width: 10,
                height: 16,
            },
            ..TiffOptions::default()
        };
        assert!(matches!(
            encode(&img, &options, &Unstoppable),
            Err(RasterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn bgr_is_stored_as_rgb() {
        let header = ImageHeader::pixels(PixelFormat::Bgr, 1, 1).unwrap();
        let img = RasterImage::from_buffer(header, vec![1, 2, 3]).unwrap();
        let back = roundtrip(&img, &TiffOptions::default());
        assert_eq!(back.pixel_format(), PixelFormat::Rgb);
        assert_eq!(back.pixels(), &[3, 2, 1]);
    }

    #[test]
    fn monochrome_is_bilevel() {
        let mut header = ImageHeader::pixels(PixelFormat::Palette, 19, 3).unwrap();
        header.palette = Palette::monochrome();
        let pixels = (0..19 * 3).map(|i| (i % 3 == 0) as u8).collect();
        let img = RasterImage::from_buffer(header, pixels).unwrap();
        let bytes = encode(&img, &TiffOptions::default(), &Unstoppable).unwrap();
        let back = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap();
        assert_eq!(back.pixel_format(), PixelFormat::Palette);
        assert!(back.palette().is_monochrome());
        assert_eq!(back.pixels(), img.pixels());
    }

    #[test]
    fn palette_colormap_roundtrip() {
        let mut img = RasterImage::new(PixelFormat::Palette, 4, 2).unwrap();
        img.palette_mut().set(0, [10, 20, 30]);
        img.palette_mut().set(1, [200, 100, 0]);
        img.palette_mut().set(2, [1, 2, 3]);
        img.pixels_mut().copy_from_slice(&[0, 1, 2, 1, 2, 1, 0, 0]);
        let back = roundtrip(&img, &TiffOptions::default());
        assert_eq!(back.pixels(), img.pixels());
        assert_eq!(back.palette().get(1), [200, 100, 0]);
    }

    #[test]
    fn grids_keep_sample_type() {
        for sample in [
            GridSample::Int8,
            GridSample::UInt16,
            GridSample::Int16,
            GridSample::Int32,
            GridSample::UInt32,
            GridSample::Float32,
            GridSample::Float64,
        ] {
            let mut img = RasterImage::new_grid(sample, 5, 4).unwrap();
            for y in 0..4 {
                for x in 0..5 {
                    img.set_grid_value(x, y, f64::from(x * 10 + y)).unwrap();
                }
            }
            let back = roundtrip(&img, &TiffOptions::default());
            assert_eq!(back.grid_sample(), Some(sample), "{sample:?}");
            assert_eq!(back.pixels(), img.pixels(), "{sample:?}");
        }
    }

    #[test]
    fn geotiff_tags_roundtrip() {
        let mut img = RasterImage::new_grid(GridSample::Float32, 3, 3).unwrap();
        img.set_georef(
            GeoReference::new(32632, 300_000.0, 5_000_000.0, 10.0, 10.0)
                .with_srs_name("WGS 84 / UTM zone 32N"),
        );
        img.set_no_data(Some(-9999.0));
        let back = roundtrip(&img, &TiffOptions::default());
        let g = back.georef();
        assert!(g.is_georeferenced);
        assert_eq!(g.srid, 32632);
        assert_eq!(g.upper_left_x, 300_000.0);
        assert_eq!(g.upper_left_y, 5_000_000.0);
        assert_eq!(g.pixel_x_size, 10.0);
        assert_eq!(g.srs_name.as_deref(), Some("WGS 84 / UTM zone 32N"));
        assert_eq!(back.no_data(), Some(-9999.0));
    }

    #[test]
    fn geotiff_can_be_disabled() {
        let mut img = gradient(PixelFormat::Grayscale, 2, 2);
        img.set_georef(GeoReference::new(4326, 0.0, 1.0, 0.5, 0.5));
        let options = TiffOptions {
            geotiff: false,
            ..TiffOptions::default()
        };
        assert!(!roundtrip(&img, &options).georef().is_georeferenced);
    }

    #[test]
    fn strip_reader_seeks_across_bands() {
        let img = gradient(PixelFormat::Grayscale, 8, 20);
        let options = TiffOptions {
            layout: TiffLayout::Strips { rows_per_strip: 6 },
            ..TiffOptions::default()
        };
        let bytes = encode(&img, &options, &Unstoppable).unwrap();
        let mut strips = open_strips(Cursor::new(bytes), &TiffReadOptions::default()).unwrap();
        strips.allocate_pixels(7).unwrap();
        strips.read_next_strip().unwrap();
        strips.read_next_strip().unwrap();
        assert_eq!(strips.row(0), img.row(7));
        strips.rewind().unwrap();
        strips.read_next_strip().unwrap();
        assert_eq!(strips.rows(), &img.pixels()[..7 * 8]);
    }

    #[test]
    fn strip_writer_produces_readable_file() {
        let img = gradient(PixelFormat::Rgb, 9, 10);
        let mut out = tempfile::tempfile().unwrap();
        {
            let file = out.try_clone().unwrap();
            let mut strips =
                create_strips(file, img.header().clone(), &TiffOptions::default()).unwrap();
            strips.allocate_pixels(4).unwrap();
            let mut y = 0;
            while !strips.is_eof() {
                let rows = strips.current_rows();
                let len = img.scanline_width() * rows as usize;
                let start = img.scanline_width() * y;
                strips.rows_mut()[..len].copy_from_slice(&img.pixels()[start..start + len]);
                strips.write_next_strip().unwrap();
                y += rows as usize;
            }
            strips.finish().unwrap();
        }
        out.rewind().unwrap();
        let mut bytes = Vec::new();
        out.read_to_end(&mut bytes).unwrap();
        let back = decode(&bytes, None, &TiffReadOptions::default(), &Unstoppable).unwrap();
        assert_eq!(back.pixels(), img.pixels());
    }
}
