//! Georeferencing carried alongside raster pixels.

/// Sentinel stored in the upper-left coordinates of an image that has never
/// been georeferenced.
pub const UNSET_COORDINATE: f64 = f64::MAX;

/// Affine placement of a north-up raster plus its spatial reference.
///
/// `pixel_y_size` is positive: world Y decreases as pixel rows increase.
/// Strings are owned, so copying a `GeoReference` between images is a deep
/// copy.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoReference {
    pub is_georeferenced: bool,
    pub srid: i32,
    pub srs_name: Option<String>,
    pub proj4text: Option<String>,
    pub upper_left_x: f64,
    pub upper_left_y: f64,
    pub pixel_x_size: f64,
    pub pixel_y_size: f64,
}

impl Default for GeoReference {
    fn default() -> Self {
        Self {
            is_georeferenced: false,
            srid: -1,
            srs_name: None,
            proj4text: None,
            upper_left_x: UNSET_COORDINATE,
            upper_left_y: UNSET_COORDINATE,
            pixel_x_size: 0.0,
            pixel_y_size: 0.0,
        }
    }
}

impl GeoReference {
    /// Georeferencing with the given origin and pixel sizes.
    pub fn new(
        srid: i32,
        upper_left_x: f64,
        upper_left_y: f64,
        pixel_x_size: f64,
        pixel_y_size: f64,
    ) -> Self {
        Self {
            is_georeferenced: true,
            srid,
            upper_left_x,
            upper_left_y,
            pixel_x_size,
            pixel_y_size,
            ..Self::default()
        }
    }

    pub fn with_srs_name(mut self, name: impl Into<String>) -> Self {
        self.srs_name = Some(name.into());
        self
    }

    pub fn with_proj4text(mut self, text: impl Into<String>) -> Self {
        self.proj4text = Some(text.into());
        self
    }

    /// Back to the never-georeferenced state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The same placement covering the same extent at a different raster size.
    pub(crate) fn rescaled(&self, src_size: (u32, u32), dst_size: (u32, u32)) -> Self {
        let mut out = self.clone();
        if dst_size.0 > 0 {
            out.pixel_x_size = self.pixel_x_size * src_size.0 as f64 / dst_size.0 as f64;
        }
        if dst_size.1 > 0 {
            out.pixel_y_size = self.pixel_y_size * src_size.1 as f64 / dst_size.1 as f64;
        }
        out
    }

    /// The placement of a window starting at pixel `(x, y)`.
    pub(crate) fn offset(&self, x: u32, y: u32) -> Self {
        let mut out = self.clone();
        out.upper_left_x = self.upper_left_x + x as f64 * self.pixel_x_size;
        out.upper_left_y = self.upper_left_y - y as f64 * self.pixel_y_size;
        out
    }

    /// Lower-left corner, as ESRI grid headers want it.
    pub fn lower_left(&self, height: u32) -> (f64, f64) {
        (
            self.upper_left_x,
            self.upper_left_y - height as f64 * self.pixel_y_size,
        )
    }
}
