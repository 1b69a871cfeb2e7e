//! SRTM `.hgt` tiles: square big-endian int16 planes, 1201 (3") or
//! 3601 (1") samples a side, named after their south-west corner
//! (`N45E012.hgt`). Edge samples overlap the neighbouring tiles, so sample
//! centres sit on whole degrees.

use std::path::Path;

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::header::ImageHeader;
use crate::image::RasterImage;
use crate::info::{ImageFormat, ImageInfos};
use crate::limits::Limits;
use crate::pixel::GridSample;
use crate::strip::{ReadState, StripImage, open_file};
use enough::Stop;

use super::{ByteOrder, GridRowReader, PlaneReader, plane_from_bytes, plane_to_bytes};

/// Void marker of SRTM data.
pub const HGT_NO_DATA: f64 = -32768.0;

const SIDES: [u32; 2] = [1201, 3601];

/// Tile side for a file of `len` bytes.
pub(crate) fn side_for_len(len: usize) -> Option<u32> {
    SIDES
        .into_iter()
        .find(|&s| (s as usize) * (s as usize) * 2 == len)
}

/// South-west corner `(lat, lon)` from a tile name such as `S12W077.hgt`.
pub fn parse_tile_name(name: &str) -> Option<(f64, f64)> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let stem = stem.get(..7)?.to_ascii_uppercase();
    let (lat_part, lon_part) = stem.split_at(3);
    let lat: f64 = lat_part[1..].parse().ok()?;
    let lon: f64 = lon_part[1..].parse().ok()?;
    let lat = match &lat_part[..1] {
        "N" => lat,
        "S" => -lat,
        _ => return None,
    };
    let lon = match &lon_part[..1] {
        "E" => lon,
        "W" => -lon,
        _ => return None,
    };
    Some((lat, lon))
}

fn header_for(side: u32, name: Option<&str>) -> Result<ImageHeader, RasterError> {
    let mut header = ImageHeader::grid(GridSample::Int16, side, side)?;
    header.no_data = Some(HGT_NO_DATA);
    if let Some((lat, lon)) = name.and_then(parse_tile_name) {
        let px = 1.0 / f64::from(side - 1);
        header.georef = GeoReference::new(4326, lon - px / 2.0, lat + 1.0 + px / 2.0, px, px)
            .with_srs_name("WGS 84");
    }
    Ok(header)
}

fn side_of(len: usize) -> Result<u32, RasterError> {
    side_for_len(len).ok_or_else(|| {
        RasterError::GridCodec(format!("{len} bytes is not an SRTM1 or SRTM3 tile"))
    })
}

pub(crate) fn probe_header(data: &[u8], name: Option<&str>) -> Result<ImageInfos, RasterError> {
    Ok(ImageInfos::new(
        ImageFormat::Hgt,
        header_for(side_of(data.len())?, name)?,
    ))
}

/// Decode a tile; `name` supplies the georeferencing.
pub(crate) fn decode(
    data: &[u8],
    name: Option<&str>,
    limits: Option<&Limits>,
    stop: &dyn Stop,
) -> Result<RasterImage, RasterError> {
    let header = header_for(side_of(data.len())?, name)?;
    if let Some(limits) = limits {
        limits.check_header(&header)?;
    }
    stop.check()?;
    let pixels = plane_from_bytes(&header, data, ByteOrder::BigEndian)?;
    RasterImage::from_buffer(header, pixels)
}

/// Encode a 1201 or 3601 square grid; other sample types are cast to int16.
pub(crate) fn encode(image: &RasterImage, stop: &dyn Stop) -> Result<Vec<u8>, RasterError> {
    let (w, h) = (image.width(), image.height());
    if w != h || !SIDES.contains(&w) {
        return Err(RasterError::InvalidArgument(format!(
            "HGT tiles are 1201x1201 or 3601x3601, not {w}x{h}"
        )));
    }
    if image.grid_sample().is_none() {
        return Err(RasterError::UnsupportedLayout(format!(
            "HGT stores grids, not {:?}",
            image.pixel_format()
        )));
    }
    stop.check()?;
    if image.grid_sample() == Some(GridSample::Int16) {
        return Ok(plane_to_bytes(image.header(), image.pixels(), ByteOrder::BigEndian));
    }
    let mut copy = image.clone();
    copy.convert_to_grid(GridSample::Int16)?;
    stop.check()?;
    Ok(plane_to_bytes(copy.header(), copy.pixels(), ByteOrder::BigEndian))
}

/// Start a seekable strip read session over a tile file.
pub fn open_strips(path: impl AsRef<Path>) -> Result<StripImage, RasterError> {
    let path = path.as_ref();
    let file = open_file(path)?;
    let len = file.metadata()?.len();
    let side = side_of(usize::try_from(len).unwrap_or(usize::MAX))?;
    let name = path.file_name().and_then(|n| n.to_str());
    let header = header_for(side, name)?;
    log::debug!("HGT strips: {} ({side}x{side})", path.display());
    let reader = PlaneReader::new(
        Box::new(std::io::BufReader::new(file)),
        0,
        ByteOrder::BigEndian,
    );
    Ok(StripImage::for_reading(
        header,
        ImageFormat::Hgt,
        ReadState::Grid(GridRowReader::Plane(reader)),
    ))
}
