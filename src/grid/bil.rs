//! ESRI BIL and FLT: a headerless single-band sample plane next to a
//! `.hdr` text file of `KEY value` lines.
//!
//! BIL headers use `NROWS`/`NCOLS`/`NBITS`/`PIXELTYPE`/`BYTEORDER` and
//! place the image with `ULXMAP`/`ULYMAP` (centre of the upper-left pixel)
//! and `XDIM`/`YDIM`. FLT headers use `ncols`/`nrows`, a lower-left
//! `xllcorner`/`yllcorner` (or `xllcenter`/`yllcenter`), `cellsize` and
//! `byteorder LSBFIRST|MSBFIRST`, and always hold 32-bit floats. Keys are
//! case-insensitive and either style is accepted for both.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::header::ImageHeader;
use crate::image::RasterImage;
use crate::info::ImageFormat;
use crate::limits::Limits;
use crate::pixel::{GridSample, SampleFormat};
use crate::strip::{ReadState, StripImage, WriteState, create_file, open_file};
use enough::Stop;

use super::{
    ByteOrder, GridOptions, GridRowReader, GridRowWriter, PlaneReader, PlaneWriter,
    plane_from_bytes, plane_to_bytes,
};

/// A parsed `.hdr`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct GridHdr {
    pub header: ImageHeader,
    pub order: ByteOrder,
    /// Bytes to skip before the first sample.
    pub skip_bytes: u64,
}

/// Path of the header that belongs to a data file.
pub fn hdr_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("hdr")
}

fn is_flt(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("flt"))
}

fn parse_order(value: &str) -> Result<ByteOrder, RasterError> {
    match value.to_ascii_uppercase().as_str() {
        "I" | "LSBFIRST" => Ok(ByteOrder::LittleEndian),
        "M" | "MSBFIRST" => Ok(ByteOrder::BigEndian),
        other => Err(RasterError::GridCodec(format!("unknown byte order {other}"))),
    }
}

/// Parse a `.hdr`; `flt` forces 32-bit float samples.
pub(crate) fn parse_hdr(text: &str, flt: bool) -> Result<GridHdr, RasterError> {
    let keys: HashMap<String, &str> = text
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?.to_ascii_lowercase(), parts.next()?))
        })
        .collect();
    let text_of = |k: &str| keys.get(k).copied();
    let number = |k: &str| -> Result<Option<f64>, RasterError> {
        text_of(k)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| RasterError::GridCodec(format!("bad {k} value {v:?}")))
            })
            .transpose()
    };
    let count = |k: &str| -> Result<u32, RasterError> {
        let v = text_of(k).ok_or_else(|| RasterError::GridCodec(format!("header lacks {k}")))?;
        v.parse()
            .map_err(|_| RasterError::GridCodec(format!("bad {k} value {v:?}")))
    };

    let ncols = count("ncols")?;
    let nrows = count("nrows")?;
    if let Some(bands) = number("nbands")? {
        if bands != 1.0 {
            return Err(RasterError::UnsupportedLayout(format!(
                "{bands} band grid, only single band is read"
            )));
        }
    }

    let sample = if flt {
        GridSample::Float32
    } else {
        let bits = number("nbits")?.unwrap_or(8.0) as u8;
        let format = match text_of("pixeltype").map(str::to_ascii_uppercase).as_deref() {
            Some("SIGNEDINT") => SampleFormat::Int,
            Some("FLOAT") => SampleFormat::Float,
            _ => SampleFormat::UInt,
        };
        match GridSample::from_parts(format, bits) {
            Some(GridSample::Float64) | None => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "BIL with {bits}-bit {format:?} samples"
                )));
            }
            Some(s) => s,
        }
    };
    let order = text_of("byteorder")
        .map(parse_order)
        .transpose()?
        .unwrap_or_default();

    let mut header = ImageHeader::grid(sample, ncols, nrows)?;
    header.no_data = match number("nodata")? {
        Some(v) => Some(v),
        None => number("nodata_value")?,
    };

    let rows = f64::from(nrows);
    let georef = if let (Some(ulx), Some(uly), Some(dx), Some(dy)) = (
        number("ulxmap")?,
        number("ulymap")?,
        number("xdim")?,
        number("ydim")?,
    ) {
        Some(GeoReference::new(-1, ulx - dx / 2.0, uly + dy / 2.0, dx, dy))
    } else if let Some(cell) = number("cellsize")? {
        match (
            number("xllcorner")?,
            number("yllcorner")?,
            number("xllcenter")?,
            number("yllcenter")?,
        ) {
            (Some(x), Some(y), _, _) => Some(GeoReference::new(-1, x, y + rows * cell, cell, cell)),
            (_, _, Some(x), Some(y)) => Some(GeoReference::new(
                -1,
                x - cell / 2.0,
                y - cell / 2.0 + rows * cell,
                cell,
                cell,
            )),
            _ => None,
        }
    } else {
        None
    };
    if let Some(georef) = georef {
        header.georef = georef;
    }
    let skip_bytes = number("skipbytes")?.unwrap_or(0.0) as u64;
    Ok(GridHdr {
        header,
        order,
        skip_bytes,
    })
}

fn check_writable(header: &ImageHeader, flt: bool) -> Result<GridSample, RasterError> {
    let sample = header.grid_sample().ok_or_else(|| {
        RasterError::UnsupportedLayout(format!(
            "BIL/FLT store grids, not {:?}",
            header.pixel_format()
        ))
    })?;
    match (flt, sample) {
        (true, GridSample::Float32) => Ok(sample),
        (true, other) => Err(RasterError::UnsupportedLayout(format!(
            "FLT stores Float32 grids, not {other:?}"
        ))),
        (false, GridSample::Float64) => Err(RasterError::UnsupportedLayout(
            "BIL cannot store Float64 grids".into(),
        )),
        (false, other) => Ok(other),
    }
}

/// `.hdr` text for a header, in BIL or FLT style.
pub(crate) fn format_hdr(header: &ImageHeader, flt: bool, order: ByteOrder) -> String {
    let mut out = String::new();
    let g = &header.georef;
    let (w, h) = (header.width(), header.height());
    // write! on a String is infallible.
    if flt {
        let _ = writeln!(out, "ncols {w}");
        let _ = writeln!(out, "nrows {h}");
        if g.is_georeferenced {
            let _ = writeln!(out, "xllcorner {}", g.upper_left_x);
            let _ = writeln!(out, "yllcorner {}", g.lower_left(h).1);
            let _ = writeln!(out, "cellsize {}", g.pixel_x_size);
        }
        if let Some(v) = header.no_data {
            let _ = writeln!(out, "NODATA_value {v}");
        }
        let order = match order {
            ByteOrder::LittleEndian => "LSBFIRST",
            ByteOrder::BigEndian => "MSBFIRST",
        };
        let _ = writeln!(out, "byteorder {order}");
    } else {
        let order = match order {
            ByteOrder::LittleEndian => "I",
            ByteOrder::BigEndian => "M",
        };
        let pixeltype = match header.sample_format() {
            SampleFormat::Int => "SIGNEDINT",
            SampleFormat::Float => "FLOAT",
            _ => "UNSIGNEDINT",
        };
        let _ = writeln!(out, "BYTEORDER {order}");
        let _ = writeln!(out, "LAYOUT BIL");
        let _ = writeln!(out, "NROWS {h}");
        let _ = writeln!(out, "NCOLS {w}");
        let _ = writeln!(out, "NBANDS 1");
        let _ = writeln!(out, "NBITS {}", header.bits_per_sample());
        let _ = writeln!(out, "PIXELTYPE {pixeltype}");
        let _ = writeln!(out, "BANDROWBYTES {}", header.scanline_width());
        let _ = writeln!(out, "TOTALROWBYTES {}", header.scanline_width());
        if g.is_georeferenced {
            let _ = writeln!(out, "ULXMAP {}", g.upper_left_x + g.pixel_x_size / 2.0);
            let _ = writeln!(out, "ULYMAP {}", g.upper_left_y - g.pixel_y_size / 2.0);
            let _ = writeln!(out, "XDIM {}", g.pixel_x_size);
            let _ = writeln!(out, "YDIM {}", g.pixel_y_size);
        }
        if let Some(v) = header.no_data {
            let _ = writeln!(out, "NODATA {v}");
        }
    }
    out
}

/// Decode a sample plane described by `hdr_text`.
pub(crate) fn decode(
    data: &[u8],
    hdr_text: &str,
    flt: bool,
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let hdr = parse_hdr(hdr_text, flt)?;
    if let Some(limits) = limits {
        limits.check_header(&hdr.header)?;
    }
    stop.check()?;
    let start = usize::try_from(hdr.skip_bytes).unwrap_or(usize::MAX);
    let body = data.get(start..).unwrap_or_default();
    let pixels = plane_from_bytes(&hdr.header, body, hdr.order)?;
    RasterImage::from_buffer(hdr.header, pixels)
}

/// Encode to `(samples, hdr text)`.
pub(crate) fn encode(
    image: &RasterImage,
    flt: bool,
    options: &GridOptions,
    stop: &dyn Stop,
) -> Result<(Vec<u8>, String), RasterError> {
    check_writable(image.header(), flt)?;
    stop.check()?;
    let data = plane_to_bytes(image.header(), image.pixels(), options.byte_order);
    Ok((data, format_hdr(image.header(), flt, options.byte_order)))
}

/// Start a seekable strip read session over `path` and its `.hdr`.
/// A `.flt` extension selects FLT semantics.
pub fn open_strips(path: impl AsRef<Path>) -> Result<StripImage, RasterError> {
    let path = path.as_ref();
    let hdr_file = hdr_path(path);
    let text = std::fs::read_to_string(&hdr_file).map_err(|source| RasterError::FileOpen {
        path: hdr_file.display().to_string(),
        source,
    })?;
    let flt = is_flt(path);
    let hdr = parse_hdr(&text, flt)?;
    let file = open_file(path)?;
    log::debug!(
        "{} strips: {} ({}x{} {:?})",
        if flt { "FLT" } else { "BIL" },
        path.display(),
        hdr.header.width(),
        hdr.header.height(),
        hdr.header.grid_sample()
    );
    let reader = PlaneReader::new(Box::new(BufReader::new(file)), hdr.skip_bytes, hdr.order);
    Ok(StripImage::for_reading(
        hdr.header,
        if flt { ImageFormat::Flt } else { ImageFormat::Bil },
        ReadState::Grid(GridRowReader::Plane(reader)),
    ))
}

/// Start a strip write session. The `.hdr` is written now, the samples as
/// strips arrive. A `.flt` extension selects FLT and requires Float32.
pub fn create_strips(
    path: impl AsRef<Path>,
    header: ImageHeader,
    options: &GridOptions,
) -> Result<StripImage, RasterError> {
    let path = path.as_ref();
    let flt = is_flt(path);
    check_writable(&header, flt)?;
    let hdr_file = hdr_path(path);
    std::fs::write(&hdr_file, format_hdr(&header, flt, options.byte_order)).map_err(
        |source| RasterError::FileOpen {
            path: hdr_file.display().to_string(),
            source,
        },
    )?;
    let writer = PlaneWriter::new(Box::new(create_file(path)?), options.byte_order);
    Ok(StripImage::for_writing(
        header,
        if flt { ImageFormat::Flt } else { ImageFormat::Bil },
        WriteState::Grid(GridRowWriter::Plane(writer)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;

    const BIL_HDR: &str = "BYTEORDER M\nLAYOUT BIL\nNROWS 2\nNCOLS 3\nNBANDS 1\n\
        NBITS 16\nPIXELTYPE SIGNEDINT\nULXMAP 100.5\nULYMAP 200.5\nXDIM 1\nYDIM 1\nNODATA -9999\n";

    #[test]
    fn bil_header() {
        let hdr = parse_hdr(BIL_HDR, false).unwrap();
        assert_eq!(hdr.order, ByteOrder::BigEndian);
        assert_eq!(hdr.header.grid_sample(), Some(GridSample::Int16));
        assert_eq!((hdr.header.width(), hdr.header.height()), (3, 2));
        assert_eq!(hdr.header.no_data, Some(-9999.0));
        assert_eq!(hdr.header.georef.upper_left_x, 100.0);
        assert_eq!(hdr.header.georef.upper_left_y, 201.0);
    }

    #[test]
    fn flt_header() {
        let text = "ncols 4\nnrows 3\nxllcorner 10\nyllcorner 20\ncellsize 0.5\n\
            NODATA_value -1\nbyteorder LSBFIRST\n";
        let hdr = parse_hdr(text, true).unwrap();
        assert_eq!(hdr.header.grid_sample(), Some(GridSample::Float32));
        assert_eq!(hdr.order, ByteOrder::LittleEndian);
        assert_eq!(hdr.header.georef.upper_left_x, 10.0);
        assert_eq!(hdr.header.georef.upper_left_y, 21.5);
        assert_eq!(hdr.header.no_data, Some(-1.0));
    }

    #[test]
    fn rejections() {
        assert!(parse_hdr("NCOLS 2\n", false).is_err());
        assert!(matches!(
            parse_hdr("NCOLS 2\nNROWS 2\nNBITS 64\nPIXELTYPE FLOAT\n", false),
            Err(RasterError::UnsupportedLayout(_))
        ));
        assert!(matches!(
            parse_hdr("NCOLS 2\nNROWS 2\nNBANDS 3\n", false),
            Err(RasterError::UnsupportedLayout(_))
        ));
    }

    #[test]
    fn bil_decode_and_encode() {
        let data: Vec<u8> = [1i16, -2, 3, 4, -9999, 6]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let img = decode(&data, BIL_HDR, false, None, &Unstoppable).unwrap();
        assert_eq!(img.grid_value(1, 0), Some(-2.0));
        assert_eq!(img.grid_value(1, 1), Some(-9999.0));

        let options = GridOptions {
            byte_order: ByteOrder::BigEndian,
        };
        let (bytes, text) = encode(&img, false, &options, &Unstoppable).unwrap();
        assert_eq!(bytes, data);
        let again = parse_hdr(&text, false).unwrap();
        assert_eq!(again.header.georef, img.georef().clone());
        assert_eq!(again.header.no_data, Some(-9999.0));
    }

    #[test]
    fn flt_requires_float32() {
        let img = RasterImage::new_grid(GridSample::Int16, 2, 2).unwrap();
        assert!(encode(&img, true, &GridOptions::default(), &Unstoppable).is_err());
        let img = RasterImage::new_grid(GridSample::Float64, 2, 2).unwrap();
        assert!(encode(&img, false, &GridOptions::default(), &Unstoppable).is_err());
    }

    #[test]
    fn strip_session_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.flt");
        let mut header = ImageHeader::grid(GridSample::Float32, 3, 5).unwrap();
        header.georef = GeoReference::new(-1, 0.0, 5.0, 1.0, 1.0);
        let mut out = create_strips(&path, header, &GridOptions::default()).unwrap();
        out.allocate_pixels(2).unwrap();
        let mut value = 0.0f32;
        while !out.is_eof() {
            for chunk in out.rows_mut().chunks_exact_mut(4) {
                chunk.copy_from_slice(&value.to_ne_bytes());
                value += 1.0;
            }
            out.write_next_strip().unwrap();
        }
        out.finish().unwrap();

        let mut strips = open_strips(&path).unwrap();
        assert_eq!(strips.format(), ImageFormat::Flt);
        assert_eq!(strips.header().georef.upper_left_y, 5.0);
        strips.allocate_pixels(5).unwrap();
        strips.read_next_strip().unwrap();
        let last = &strips.row(4)[8..12];
        assert_eq!(f32::from_ne_bytes([last[0], last[1], last[2], last[3]]), 14.0);
    }
}
