//! GeoTIFF tags: ModelPixelScale, ModelTiepoint, the GeoKey directory and
//! GDAL's nodata string.

use tiff::decoder::Decoder;
use tiff::tags::Tag;

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::strip::ReadSeek;

use super::encode::Entry;

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const GEOG_CITATION: u16 = 2049;
const PROJECTED_CS_TYPE: u16 = 3072;
const PCS_CITATION: u16 = 3073;

const USER_DEFINED: u16 = 32767;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Raw GeoTIFF tag values of one IFD.
#[derive(Clone, Debug, Default)]
pub(crate) struct GeoTags {
    pub pixel_scale: Option<Vec<f64>>,
    pub tiepoint: Option<Vec<f64>>,
    pub keys: Option<Vec<u16>>,
    pub ascii: Option<String>,
    pub nodata: Option<String>,
}

impl GeoTags {
    pub(crate) fn read<R: ReadSeek>(dec: &mut Decoder<R>) -> Result<Self, RasterError> {
        let pixel_scale = Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE);
        let tiepoint = Tag::from_u16_exhaustive(MODEL_TIEPOINT);
        let keys = Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY);
        let ascii = Tag::from_u16_exhaustive(GEO_ASCII_PARAMS);
        let nodata = Tag::from_u16_exhaustive(GDAL_NODATA);

        let mut tags = GeoTags::default();
        if dec.find_tag(pixel_scale)?.is_some() {
            tags.pixel_scale = Some(dec.get_tag_f64_vec(pixel_scale)?);
        }
        if dec.find_tag(tiepoint)?.is_some() {
            tags.tiepoint = Some(dec.get_tag_f64_vec(tiepoint)?);
        }
        if dec.find_tag(keys)?.is_some() {
            tags.keys = Some(dec.get_tag_u16_vec(keys)?);
        }
        if dec.find_tag(ascii)?.is_some() {
            tags.ascii = Some(dec.get_tag_ascii_string(ascii)?);
        }
        if dec.find_tag(nodata)?.is_some() {
            tags.nodata = Some(dec.get_tag_ascii_string(nodata)?);
        }
        Ok(tags)
    }
}

#[derive(Debug, Default, PartialEq)]
struct GeoKeys {
    raster_type: Option<u16>,
    srid: Option<i32>,
    citation: Option<String>,
}

fn parse_keys(dir: &[u16], ascii: Option<&str>) -> GeoKeys {
    let mut keys = GeoKeys::default();
    let Some(count) = dir.get(3) else {
        return keys;
    };
    let ascii_value = |count: u16, offset: u16| -> Option<String> {
        let text = ascii?;
        let start = usize::from(offset);
        let value = text.get(start..start + usize::from(count))?;
        let value = value.trim_end_matches(['|', '\0']).trim();
        (!value.is_empty()).then(|| value.to_owned())
    };
    for key in dir[4..].chunks_exact(4).take(usize::from(*count)) {
        let (id, location, n, value) = (key[0], key[1], key[2], key[3]);
        match id {
            GT_RASTER_TYPE if location == 0 => keys.raster_type = Some(value),
            GEOGRAPHIC_TYPE | PROJECTED_CS_TYPE if location == 0 && value != USER_DEFINED => {
                keys.srid = Some(i32::from(value));
            }
            GT_CITATION | GEOG_CITATION | PCS_CITATION if location == GEO_ASCII_PARAMS => {
                // The general citation wins over the CRS-specific ones.
                if keys.citation.is_none() || id == GT_CITATION {
                    if let Some(text) = ascii_value(n, value) {
                        keys.citation = Some(text);
                    }
                }
            }
            _ => {}
        }
    }
    keys
}

/// Placement from scale + tiepoint, or `None` when either is missing.
pub(crate) fn georeference(tags: &GeoTags) -> Option<GeoReference> {
    let scale = tags.pixel_scale.as_deref().filter(|s| s.len() >= 2)?;
    let tie = tags.tiepoint.as_deref().filter(|t| t.len() >= 6)?;
    let (sx, sy) = (scale[0], scale[1]);
    let keys = tags
        .keys
        .as_deref()
        .map(|dir| parse_keys(dir, tags.ascii.as_deref()))
        .unwrap_or_default();

    let mut ulx = tie[3] - tie[0] * sx;
    let mut uly = tie[4] + tie[1] * sy;
    if keys.raster_type == Some(RASTER_PIXEL_IS_POINT) {
        ulx -= sx / 2.0;
        uly += sy / 2.0;
    }
    let mut georef = GeoReference::new(keys.srid.unwrap_or(-1), ulx, uly, sx, sy);
    georef.srs_name = keys.citation;
    Some(georef)
}

pub(crate) fn no_data(tags: &GeoTags) -> Option<f64> {
    tags.nodata
        .as_deref()
        .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

/// Tags describing `georef` and `no_data`, ready for the IFD.
pub(crate) fn entries(georef: &GeoReference, no_data: Option<f64>) -> Vec<Entry> {
    let mut out = Vec::new();
    if georef.is_georeferenced {
        out.push(Entry::doubles(
            MODEL_PIXEL_SCALE,
            &[georef.pixel_x_size, georef.pixel_y_size, 0.0],
        ));
        out.push(Entry::doubles(
            MODEL_TIEPOINT,
            &[0.0, 0.0, 0.0, georef.upper_left_x, georef.upper_left_y, 0.0],
        ));

        let geographic = (4000..5000).contains(&georef.srid);
        let mut keys: Vec<[u16; 4]> = vec![
            [GT_MODEL_TYPE, 0, 1, if geographic { 2 } else { 1 }],
            [GT_RASTER_TYPE, 0, 1, 1],
        ];
        let citation = georef.srs_name.as_deref().map(|name| format!("{name}|"));
        if let Some(text) = &citation {
            let len = u16::try_from(text.len()).unwrap_or(u16::MAX);
            keys.push([GT_CITATION, GEO_ASCII_PARAMS, len, 0]);
        }
        if georef.srid > 0 {
            let code = u16::try_from(georef.srid).unwrap_or(USER_DEFINED);
            let id = if geographic {
                GEOGRAPHIC_TYPE
            } else {
                PROJECTED_CS_TYPE
            };
            keys.push([id, 0, 1, code]);
        }
        let mut dir = vec![1, 1, 0, keys.len() as u16];
        dir.extend(keys.iter().flatten());
        out.push(Entry::shorts(GEO_KEY_DIRECTORY, &dir));
        if let Some(text) = citation {
            out.push(Entry::ascii(GEO_ASCII_PARAMS, &text));
        }
    }
    if let Some(value) = no_data {
        out.push(Entry::ascii(GDAL_NODATA, &value.to_string()));
    }
    out
}
