//! ESRI ASCII grids (`.asc`).
//!
//! A header of `ncols`, `nrows`, `xllcorner`/`xllcenter`,
//! `yllcorner`/`yllcenter`, `cellsize` (or `dx`/`dy`) and an optional
//! `NODATA_value`, followed by whitespace-separated samples in row order.
//! Samples are read as Float64; strip reading is sequential.

use std::collections::VecDeque;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::pixel::GridSample;
use crate::strip::{ReadState, RowReader, RowWriter, StripImage, WriteState};
use enough::Stop;

use super::{GridRowReader, GridRowWriter};

const HEADER_KEYS: [&str; 10] = [
    "ncols",
    "nrows",
    "xllcorner",
    "yllcorner",
    "xllcenter",
    "yllcenter",
    "cellsize",
    "dx",
    "dy",
    "nodata_value",
];

/// Whether `data` starts with an `ncols` header line.
pub(crate) fn looks_like_ascii_grid(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..]
        .get(..5)
        .is_some_and(|k| k.eq_ignore_ascii_case(b"ncols"))
}

/// Header values gathered line by line.
#[derive(Debug, Default)]
struct AscHeader {
    values: Vec<(String, f64)>,
}

impl AscHeader {
    /// Consume one line; `false` once the line is not a header line.
    fn accept(&mut self, line: &str) -> Result<bool, RasterError> {
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else {
            return Ok(true);
        };
        let key = key.to_ascii_lowercase();
        if !HEADER_KEYS.contains(&key.as_str()) {
            return Ok(false);
        }
        let value = parts
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| RasterError::GridCodec(format!("bad {key} line")))?;
        self.values.push((key, value));
        Ok(true)
    }

    fn get(&self, key: &str) -> Option<f64> {
        self.values.iter().find(|(k, _)| k == key).map(|&(_, v)| v)
    }

    fn into_header(self) -> Result<ImageHeader, RasterError> {
        let dim = |k: &str| -> Result<u32, RasterError> {
            let v = self
                .get(k)
                .ok_or_else(|| RasterError::GridCodec(format!("ASCII grid lacks {k}")))?;
            if v < 1.0 || v > f64::from(u32::MAX) || v.fract() != 0.0 {
                return Err(RasterError::GridCodec(format!("bad {k} {v}")));
            }
            Ok(v as u32)
        };
        let (ncols, nrows) = (dim("ncols")?, dim("nrows")?);
        let mut header = ImageHeader::grid(GridSample::Float64, ncols, nrows)?;
        header.no_data = self.get("nodata_value");

        let (dx, dy) = match (self.get("cellsize"), self.get("dx"), self.get("dy")) {
            (Some(c), _, _) => (c, c),
            (None, Some(dx), Some(dy)) => (dx, dy),
            _ => return Ok(header),
        };
        let rows = f64::from(nrows);
        let corner = match (
            self.get("xllcorner"),
            self.get("yllcorner"),
            self.get("xllcenter"),
            self.get("yllcenter"),
        ) {
            (Some(x), Some(y), _, _) => Some((x, y)),
            (_, _, Some(x), Some(y)) => Some((x - dx / 2.0, y - dy / 2.0)),
            _ => None,
        };
        if let Some((x, y)) = corner {
            header.georef = GeoReference::new(-1, x, y + rows * dy, dx, dy);
        }
        Ok(header)
    }
}

/// Split `data` into the parsed header and the offset of the first sample
/// line.
fn split_header(data: &[u8]) -> Result<(ImageHeader, usize), RasterError> {
    let mut asc = AscHeader::default();
    let mut offset = 0;
    for line in data.split_inclusive(|&b| b == b'\n') {
        let text = std::str::from_utf8(line)
            .map_err(|_| RasterError::GridCodec("ASCII grid header is not UTF-8".into()))?;
        if !asc.accept(text)? {
            break;
        }
        offset += line.len();
    }
    Ok((asc.into_header()?, offset))
}

pub(crate) fn probe_header(data: &[u8]) -> Result<ImageInfos, RasterError> {
    let (header, _) = split_header(data)?;
    Ok(ImageInfos::new(ImageFormat::AsciiGrid, header))
}

fn parse_sample(token: &str) -> Result<f64, RasterError> {
    token
        .parse()
        .map_err(|_| RasterError::GridCodec(format!("bad sample {token:?}")))
}

/// Decode to a Float64 grid (called from DecodeRequest).
pub(crate) fn decode(
    data: &[u8],
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let (header, offset) = split_header(data)?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    let body = std::str::from_utf8(&data[offset..])
        .map_err(|_| RasterError::GridCodec("ASCII grid body is not UTF-8".into()))?;
    let mut pixels = alloc_zeroed(header.rows_len(header.height())?)?;
    let mut tokens = body.split_ascii_whitespace();
    for (y, row) in pixels.chunks_exact_mut(header.scanline_width()).enumerate() {
        if y % 16 == 0 {
            stop.check()?;
        }
        for out in row.chunks_exact_mut(8) {
            let token = tokens.next().ok_or_else(|| {
                RasterError::GridCodec(format!("samples end in row {y}"))
            })?;
            out.copy_from_slice(&parse_sample(token)?.to_ne_bytes());
        }
    }
    RasterImage::from_buffer(header, pixels)
}

/// Sequential sample reader.
pub(crate) struct AsciiRowReader {
    source: Box<dyn BufRead>,
    pending: VecDeque<f64>,
    line: String,
}

impl AsciiRowReader {
    fn next_sample(&mut self) -> Result<f64, RasterError> {
        loop {
            if let Some(v) = self.pending.pop_front() {
                return Ok(v);
            }
            self.line.clear();
            if self.source.read_line(&mut self.line)? == 0 {
                return Err(RasterError::GridCodec("samples end early".into()));
            }
            for token in self.line.split_ascii_whitespace() {
                self.pending.push_back(parse_sample(token)?);
            }
        }
    }
}

impl RowReader for AsciiRowReader {
    fn read_rows(
        &mut self,
        _header: &ImageHeader,
        _first_row: u32,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        for out in buf.chunks_exact_mut(8) {
            out.copy_from_slice(&self.next_sample()?.to_ne_bytes());
        }
        Ok(())
    }
}

/// Start a sequential strip read session.
pub fn open_strips<R: Read + 'static>(source: R) -> Result<StripImage, RasterError> {
    let mut source: Box<dyn BufRead> = Box::new(BufReader::new(source));
    let mut asc = AscHeader::default();
    let mut line = String::new();
    let mut pending = VecDeque::new();
    loop {
        line.clear();
        if source.read_line(&mut line)? == 0 {
            break;
        }
        if !asc.accept(&line)? {
            for token in line.split_ascii_whitespace() {
                pending.push_back(parse_sample(token)?);
            }
            break;
        }
    }
    let header = asc.into_header()?;
    log::debug!(
        "ASCII grid strips: {}x{}",
        header.width(),
        header.height()
    );
    let reader = AsciiRowReader {
        source,
        pending,
        line,
    };
    Ok(StripImage::for_reading(
        header,
        ImageFormat::AsciiGrid,
        ReadState::Grid(GridRowReader::Ascii(reader)),
    ))
}

fn header_text(header: &ImageHeader) -> String {
    let mut out = String::new();
    let (w, h) = (header.width(), header.height());
    let g = &header.georef;
    let _ = writeln!(out, "ncols {w}");
    let _ = writeln!(out, "nrows {h}");
    if g.is_georeferenced {
        let (x, y) = g.lower_left(h);
        let _ = writeln!(out, "xllcorner {x}");
        let _ = writeln!(out, "yllcorner {y}");
        if g.pixel_x_size == g.pixel_y_size {
            let _ = writeln!(out, "cellsize {}", g.pixel_x_size);
        } else {
            let _ = writeln!(out, "dx {}", g.pixel_x_size);
            let _ = writeln!(out, "dy {}", g.pixel_y_size);
        }
    } else {
        let _ = writeln!(out, "xllcorner 0");
        let _ = writeln!(out, "yllcorner 0");
        let _ = writeln!(out, "cellsize 1");
    }
    if let Some(v) = header.no_data {
        let _ = writeln!(out, "NODATA_value {v}");
    }
    out
}

fn sample_of(header: &ImageHeader) -> Result<GridSample, RasterError> {
    header.grid_sample().ok_or_else(|| {
        RasterError::UnsupportedLayout(format!(
            "ASCII grids store grids, not {:?}",
            header.pixel_format()
        ))
    })
}

fn row_text(sample: GridSample, row: &[u8], out: &mut String) {
    for (i, s) in row.chunks_exact(sample.byte_width()).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}", sample.read_f64(s));
    }
    out.push('\n');
}

/// Encode any grid as text (called from EncodeRequest).
pub(crate) fn encode(image: &RasterImage, stop: &dyn Stop) -> Result<Vec<u8>, RasterError> {
    let sample = sample_of(image.header())?;
    let mut out = header_text(image.header());
    for y in 0..image.height() {
        if y % 16 == 0 {
            stop.check()?;
        }
        row_text(sample, image.row(y), &mut out);
    }
    Ok(out.into_bytes())
}

/// Streaming text writer; the header goes out when the session opens.
pub(crate) struct AsciiRowWriter {
    out: Box<dyn Write>,
    sample: GridSample,
    text: String,
}

impl RowWriter for AsciiRowWriter {
    fn write_rows(
        &mut self,
        header: &ImageHeader,
        _first_row: u32,
        buf: &[u8],
    ) -> Result<(), RasterError> {
        self.text.clear();
        for row in buf.chunks_exact(header.scanline_width()) {
            row_text(self.sample, row, &mut self.text);
        }
        self.out.write_all(self.text.as_bytes())?;
        Ok(())
    }

    fn finish(mut self, _header: &ImageHeader) -> Result<(), RasterError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Start a strip write session for any grid header.
pub fn create_strips<W: Write + 'static>(
    out: W,
    header: ImageHeader,
) -> Result<StripImage, RasterError> {
    let sample = sample_of(&header)?;
    let mut out: Box<dyn Write> = Box::new(out);
    out.write_all(header_text(&header).as_bytes())?;
    let writer = AsciiRowWriter {
        out,
        sample,
        text: String::new(),
    };
    Ok(StripImage::for_writing(
        header,
        ImageFormat::AsciiGrid,
        WriteState::Grid(GridRowWriter::Ascii(writer)),
    ))
}

/// [`create_strips`] onto a new file.
pub fn create_strips_file(
    path: impl AsRef<Path>,
    header: ImageHeader,
) -> Result<StripImage, RasterError> {
    create_strips(crate::strip::create_file(path.as_ref())?, header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enough::Unstoppable;
    use std::io::Cursor;

    const GRID: &str = "ncols 3\nnrows 2\nxllcorner 100\nyllcorner 50\ncellsize 10\n\
        NODATA_value -9999\n1 2.5 3\n-9999 5 6\n";

    #[test]
    fn detection() {
        assert!(looks_like_ascii_grid(b"  NCOLS 4\n"));
        assert!(!looks_like_ascii_grid(b"nrows 4\n"));
        assert!(!looks_like_ascii_grid(b""));
    }

    #[test]
    fn decode_with_georef() {
        let img = decode(GRID.as_bytes(), None, &Unstoppable).unwrap();
        assert_eq!(img.grid_sample(), Some(GridSample::Float64));
        assert_eq!(img.grid_value(1, 0), Some(2.5));
        assert_eq!(img.grid_value(0, 1), Some(-9999.0));
        assert_eq!(img.no_data(), Some(-9999.0));
        assert_eq!(img.georef().upper_left_x, 100.0);
        assert_eq!(img.georef().upper_left_y, 70.0);
    }

    #[test]
    fn encode_reads_back() {
        let img = decode(GRID.as_bytes(), None, &Unstoppable).unwrap();
        let text = encode(&img, &Unstoppable).unwrap();
        let back = decode(&text, None, &Unstoppable).unwrap();
        assert_eq!(back.pixels(), img.pixels());
        assert_eq!(back.georef(), img.georef());
    }

    #[test]
    fn missing_samples_fail() {
        let short = "ncols 2\nnrows 2\n1 2 3\n";
        assert!(matches!(
            decode(short.as_bytes(), None, &Unstoppable),
            Err(RasterError::GridCodec(_))
        ));
    }

    #[test]
    fn strips_are_sequential() {
        let mut strips = open_strips(Cursor::new(GRID.as_bytes().to_vec())).unwrap();
        strips.allocate_pixels(1).unwrap();
        strips.read_next_strip().unwrap();
        strips.read_next_strip().unwrap();
        let row = strips.row(0);
        assert_eq!(f64::from_ne_bytes(row[8..16].try_into().unwrap()), 5.0);
        assert!(strips.rewind().is_err());
        assert!(strips.read_next_strip().is_err());
    }

    #[test]
    fn strip_writer_emits_header_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.asc");
        let header = ImageHeader::grid(GridSample::Int16, 2, 1).unwrap();
        let mut strips = create_strips_file(&path, header).unwrap();
        strips.allocate_pixels(1).unwrap();
        strips.rows_mut()[..2].copy_from_slice(&7i16.to_ne_bytes());
        strips.rows_mut()[2..].copy_from_slice(&(-3i16).to_ne_bytes());
        strips.write_next_strip().unwrap();
        strips.finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ncols 2\nnrows 1\n"));
        assert!(text.ends_with("7 -3\n"));
    }
}
