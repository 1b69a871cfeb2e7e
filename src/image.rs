//! Fully materialized rasters.

#[cfg(feature = "rgb")]
use rgb::AsPixels as _;

use crate::error::RasterError;
use crate::georef::GeoReference;
use crate::header::{ImageHeader, alloc_zeroed};
use crate::palette::{self, Palette};
use crate::pixel::{GridSample, PixelFormat, SampleFormat};

/// An image whose pixels are all resident in memory.
///
/// The pixel buffer always holds exactly `scanline_width * height` bytes and
/// is owned by the image. Grid samples are stored in native byte order.
#[derive(Clone, Debug, PartialEq)]
pub struct RasterImage {
    pub(crate) header: ImageHeader,
    pub(crate) pixels: Vec<u8>,
}

impl RasterImage {
    /// Allocate a zeroed image.
    ///
    /// Fails with [`RasterError::InvalidArgument`] for unknown formats or
    /// unsupported sample combinations and with [`RasterError::OutOfMemory`]
    /// when the buffer cannot be allocated.
    pub fn create(
        pixel_format: PixelFormat,
        width: u32,
        height: u32,
        bits_per_sample: u8,
        samples_per_pixel: u8,
        sample_format: SampleFormat,
    ) -> Result<Self, RasterError> {
        let header = ImageHeader::new(
            pixel_format,
            width,
            height,
            bits_per_sample,
            samples_per_pixel,
            sample_format,
        )?;
        Self::from_header(header)
    }

    /// Allocate a zeroed image for an existing header.
    pub fn from_header(header: ImageHeader) -> Result<Self, RasterError> {
        let len = header.rows_len(header.height)?;
        let pixels = alloc_zeroed(len)?;
        Ok(Self { header, pixels })
    }

    /// Zeroed 8-bit pixel image.
    pub fn new(pixel_format: PixelFormat, width: u32, height: u32) -> Result<Self, RasterError> {
        Self::from_header(ImageHeader::pixels(pixel_format, width, height)?)
    }

    /// Zeroed typed grid.
    pub fn new_grid(sample: GridSample, width: u32, height: u32) -> Result<Self, RasterError> {
        Self::from_header(ImageHeader::grid(sample, width, height)?)
    }

    /// Take ownership of a caller-built buffer.
    ///
    /// The buffer must hold exactly `scanline_width * height` bytes.
    pub fn from_buffer(header: ImageHeader, pixels: Vec<u8>) -> Result<Self, RasterError> {
        let needed = header.rows_len(header.height)?;
        if pixels.len() != needed {
            return Err(RasterError::BufferTooSmall {
                needed,
                actual: pixels.len(),
            });
        }
        Ok(Self { header, pixels })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.header.pixel_format
    }

    pub fn pixel_size(&self) -> usize {
        self.header.pixel_size
    }

    pub fn scanline_width(&self) -> usize {
        self.header.scanline_width
    }

    pub fn grid_sample(&self) -> Option<GridSample> {
        self.header.grid_sample()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Bytes of scanline `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let w = self.header.scanline_width;
        let start = y as usize * w;
        &self.pixels[start..start + w]
    }

    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let w = self.header.scanline_width;
        let start = y as usize * w;
        &mut self.pixels[start..start + w]
    }

    pub fn palette(&self) -> &Palette {
        &self.header.palette
    }

    pub fn palette_mut(&mut self) -> &mut Palette {
        &mut self.header.palette
    }

    pub fn transparent(&self) -> Option<[u8; 3]> {
        self.header.transparent
    }

    pub fn set_transparent(&mut self, rgb: Option<[u8; 3]>) {
        self.header.transparent = rgb;
    }

    pub fn georef(&self) -> &GeoReference {
        &self.header.georef
    }

    pub fn set_georef(&mut self, georef: GeoReference) {
        self.header.georef = georef;
    }

    /// Record the spatial reference names without placing the image.
    pub fn set_srs(&mut self, srs_name: Option<&str>, proj4text: Option<&str>) {
        self.header.georef.srs_name = srs_name.map(str::to_owned);
        self.header.georef.proj4text = proj4text.map(str::to_owned);
    }

    pub fn no_data(&self) -> Option<f64> {
        self.header.no_data
    }

    pub fn set_no_data(&mut self, value: Option<f64>) {
        self.header.no_data = value;
    }

    /// Paint every pixel with one colour.
    ///
    /// Palette images lose their palette: it is reset to the single entry
    /// `(r, g, b)` and every index becomes 0. Grids are rejected; use
    /// [`RasterImage::fill_grid`].
    pub fn fill(&mut self, r: u8, g: u8, b: u8, alpha: u8) -> Result<(), RasterError> {
        let (px, len): ([u8; 4], usize) = match self.header.pixel_format {
            PixelFormat::Rgb => ([r, g, b, 0], 3),
            PixelFormat::Rgba => ([r, g, b, alpha], 4),
            PixelFormat::Argb => ([alpha, r, g, b], 4),
            PixelFormat::Bgr => ([b, g, r, 0], 3),
            PixelFormat::Bgra => ([b, g, r, alpha], 4),
            PixelFormat::Grayscale => ([palette::luma(r, g, b), 0, 0, 0], 1),
            PixelFormat::Palette => {
                self.header.palette.clear();
                self.header.palette.set(0, [r, g, b]);
                ([0; 4], 1)
            }
            PixelFormat::Grid => {
                return Err(RasterError::InvalidImage(
                    "colour fill on a grid, use fill_grid".into(),
                ));
            }
            PixelFormat::Unknown => {
                return Err(RasterError::InvalidImage("unknown pixel format".into()));
            }
        };
        for chunk in self.pixels.chunks_exact_mut(len) {
            chunk.copy_from_slice(&px[..len]);
        }
        Ok(())
    }

    /// Set every grid sample to `value`, cast to the sample type.
    pub fn fill_grid(&mut self, value: f64) -> Result<(), RasterError> {
        let sample = self
            .grid_sample()
            .ok_or_else(|| RasterError::InvalidImage("fill_grid on a pixel image".into()))?;
        let mut encoded = [0u8; 8];
        sample.write_f64(value, &mut encoded);
        let width = sample.byte_width();
        for chunk in self.pixels.chunks_exact_mut(width) {
            chunk.copy_from_slice(&encoded[..width]);
        }
        Ok(())
    }

    /// Copy georeferencing from `src`, rescaling pixel sizes so this image
    /// covers the same extent at its own dimensions.
    ///
    /// A non-georeferenced `src` clears this image's georeferencing.
    pub fn clone_georeferencing(&mut self, src: &RasterImage) {
        if !src.header.georef.is_georeferenced {
            self.header.georef.clear();
            return;
        }
        self.header.georef = src.header.georef.rescaled(
            (src.width(), src.height()),
            (self.width(), self.height()),
        );
    }

    /// Copy the window of `src` at `(upper_left_x, upper_left_y)` sized like
    /// this image. Parts of the window beyond `src` stay untouched.
    ///
    /// Palette and transparency come across verbatim; georeferencing is
    /// translated to the window origin with unchanged pixel sizes.
    pub fn sub_set(
        &mut self,
        src: &RasterImage,
        upper_left_x: u32,
        upper_left_y: u32,
    ) -> Result<(), RasterError> {
        self.header.check_same_layout(&src.header)?;
        if upper_left_x >= src.width() || upper_left_y >= src.height() {
            return Err(RasterError::InvalidArgument(format!(
                "window origin ({upper_left_x}, {upper_left_y}) outside {}x{}",
                src.width(),
                src.height()
            )));
        }
        let px = self.header.pixel_size;
        let cols = (src.width() - upper_left_x).min(self.width()) as usize;
        let rows = (src.height() - upper_left_y).min(self.height());
        let src_off = upper_left_x as usize * px;
        for y in 0..rows {
            let src_row = src.row(upper_left_y + y);
            self.row_mut(y)[..cols * px].copy_from_slice(&src_row[src_off..src_off + cols * px]);
        }

        self.header.palette = src.header.palette.clone();
        self.header.transparent = src.header.transparent;
        self.header.no_data = src.header.no_data;
        if src.header.georef.is_georeferenced {
            self.header.georef = src.header.georef.offset(upper_left_x, upper_left_y);
        } else {
            self.header.georef.clear();
        }
        Ok(())
    }

    /// Index of `(r, g, b)` in this image's palette, appending while room
    /// remains. See [`Palette::match_color`].
    pub fn match_palette(&mut self, r: u8, g: u8, b: u8) -> u8 {
        self.header.palette.match_color(r, g, b)
    }

    /// Whether a colour is within ±8 per channel of the transparent key.
    pub fn is_near_transparent(&self, r: u8, g: u8, b: u8) -> bool {
        palette::is_near_transparent(r, g, b, self.header.transparent)
    }

    /// Record the min/max of all grid samples that are not no-data.
    pub fn compute_grid_stats(&mut self) -> Result<(), RasterError> {
        let sample = self
            .grid_sample()
            .ok_or_else(|| RasterError::InvalidImage("grid statistics on a pixel image".into()))?;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        let mut seen = false;
        for chunk in self.pixels.chunks_exact(sample.byte_width()) {
            let v = sample.read_f64(chunk);
            if self.header.no_data == Some(v) || v.is_nan() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
            seen = true;
        }
        if seen {
            self.header.min_value = Some(min);
            self.header.max_value = Some(max);
        } else {
            self.header.min_value = None;
            self.header.max_value = None;
        }
        Ok(())
    }

    /// One grid sample widened to `f64`.
    pub fn grid_value(&self, x: u32, y: u32) -> Option<f64> {
        let sample = self.grid_sample()?;
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let off = y as usize * self.header.scanline_width + x as usize * sample.byte_width();
        Some(sample.read_f64(&self.pixels[off..]))
    }

    /// Store one grid sample with truncating cast semantics.
    pub fn set_grid_value(&mut self, x: u32, y: u32, value: f64) -> Result<(), RasterError> {
        let sample = self
            .grid_sample()
            .ok_or_else(|| RasterError::InvalidImage("grid write on a pixel image".into()))?;
        if x >= self.width() || y >= self.height() {
            return Err(RasterError::InvalidArgument(format!(
                "({x}, {y}) outside {}x{}",
                self.width(),
                self.height()
            )));
        }
        let off = y as usize * self.header.scanline_width + x as usize * sample.byte_width();
        sample.write_f64(value, &mut self.pixels[off..]);
        Ok(())
    }

    /// Reinterpret pixel data as typed pixel slice.
    ///
    /// Returns [`RasterError::ImageMismatch`] if the pixel format doesn't match `P`.
    #[cfg(feature = "rgb")]
    pub fn as_pixels<P: RasterPixel>(&self) -> Result<&[P], RasterError>
    where
        [u8]: rgb::AsPixels<P>,
    {
        if self.header.pixel_format != P::pixel_format() {
            return Err(RasterError::ImageMismatch(format!(
                "expected {:?}, image is {:?}",
                P::pixel_format(),
                self.header.pixel_format
            )));
        }
        Ok(self.pixels().as_pixels())
    }

    /// Zero-copy view as an [`imgref::ImgRef`] of typed pixels.
    #[cfg(feature = "imgref")]
    pub fn as_imgref<P: RasterPixel>(&self) -> Result<imgref::ImgRef<'_, P>, RasterError>
    where
        [u8]: rgb::AsPixels<P>,
    {
        let pixels: &[P] = self.as_pixels()?;
        Ok(imgref::ImgRef::new(
            pixels,
            self.width() as usize,
            self.height() as usize,
        ))
    }
}

/// Typed pixels that can view a raster buffer.
#[cfg(feature = "rgb")]
pub trait RasterPixel: Copy {
    fn pixel_format() -> PixelFormat;
}

#[cfg(feature = "rgb")]
impl RasterPixel for rgb::RGB8 {
    fn pixel_format() -> PixelFormat {
        PixelFormat::Rgb
    }
}

#[cfg(feature = "rgb")]
impl RasterPixel for rgb::RGBA8 {
    fn pixel_format() -> PixelFormat {
        PixelFormat::Rgba
    }
}

#[cfg(feature = "rgb")]
impl RasterPixel for rgb::alt::BGR8 {
    fn pixel_format() -> PixelFormat {
        PixelFormat::Bgr
    }
}

#[cfg(feature = "rgb")]
impl RasterPixel for rgb::alt::BGRA8 {
    fn pixel_format() -> PixelFormat {
        PixelFormat::Bgra
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_zeroed() {
        let img = RasterImage::new(PixelFormat::Rgba, 3, 2).unwrap();
        assert_eq!(img.pixels().len(), 24);
        assert!(img.pixels().iter().all(|&b| b == 0));
        assert!(!img.georef().is_georeferenced);
    }

    #[test]
    fn from_buffer_checks_length() {
        let header = ImageHeader::pixels(PixelFormat::Rgb, 2, 2).unwrap();
        assert!(RasterImage::from_buffer(header.clone(), vec![0; 12]).is_ok());
        assert!(matches!(
            RasterImage::from_buffer(header, vec![0; 11]),
            Err(RasterError::BufferTooSmall { needed: 12, .. })
        ));
    }

    #[test]
    fn fill_per_format() {
        let mut argb = RasterImage::new(PixelFormat::Argb, 2, 1).unwrap();
        argb.fill(1, 2, 3, 4).unwrap();
        assert_eq!(argb.pixels(), &[4, 1, 2, 3, 4, 1, 2, 3]);

        let mut bgr = RasterImage::new(PixelFormat::Bgr, 1, 1).unwrap();
        bgr.fill(1, 2, 3, 4).unwrap();
        assert_eq!(bgr.pixels(), &[3, 2, 1]);

        let mut pal = RasterImage::new(PixelFormat::Palette, 2, 2).unwrap();
        pal.palette_mut().set(0, [9, 9, 9]);
        pal.palette_mut().set(1, [8, 8, 8]);
        pal.pixels_mut().fill(1);
        pal.fill(10, 20, 30, 255).unwrap();
        assert_eq!(pal.palette().len(), 1);
        assert_eq!(pal.palette().get(0), [10, 20, 30]);
        assert!(pal.pixels().iter().all(|&b| b == 0));

        let mut grid = RasterImage::new_grid(GridSample::Int16, 2, 2).unwrap();
        assert!(grid.fill(1, 2, 3, 4).is_err());
        grid.fill_grid(-7.9).unwrap();
        assert_eq!(grid.grid_value(1, 1), Some(-7.0));
    }

    #[test]
    fn sub_set_translates_georef() {
        let mut src = RasterImage::new(PixelFormat::Grayscale, 4, 4).unwrap();
        for (i, p) in src.pixels_mut().iter_mut().enumerate() {
            *p = i as u8;
        }
        src.set_georef(GeoReference::new(32632, 1000.0, 5000.0, 10.0, 20.0).with_srs_name("UTM 32N"));

        let mut dst = RasterImage::new(PixelFormat::Grayscale, 2, 2).unwrap();
        dst.sub_set(&src, 1, 2).unwrap();
        assert_eq!(dst.pixels(), &[9, 10, 13, 14]);
        let g = dst.georef();
        assert!(g.is_georeferenced);
        assert_eq!(g.upper_left_x, 1010.0);
        assert_eq!(g.upper_left_y, 4960.0);
        assert_eq!(g.pixel_x_size, 10.0);
        assert_eq!(g.pixel_y_size, 20.0);
        assert_eq!(g.srs_name.as_deref(), Some("UTM 32N"));
    }

    #[test]
    fn sub_set_clips_to_source() {
        let mut src = RasterImage::new(PixelFormat::Grayscale, 3, 3).unwrap();
        src.pixels_mut().fill(7);
        let mut dst = RasterImage::new(PixelFormat::Grayscale, 2, 2).unwrap();
        dst.sub_set(&src, 2, 2).unwrap();
        assert_eq!(dst.pixels(), &[7, 0, 0, 0]);
    }

    #[test]
    fn sub_set_rejects_mismatch() {
        let src = RasterImage::new(PixelFormat::Rgb, 3, 3).unwrap();
        let mut dst = RasterImage::new(PixelFormat::Rgba, 2, 2).unwrap();
        assert!(matches!(
            dst.sub_set(&src, 0, 0),
            Err(RasterError::ImageMismatch(_))
        ));
    }

    #[test]
    fn clone_georeferencing_rescales_or_clears() {
        let mut src = RasterImage::new(PixelFormat::Rgb, 100, 100).unwrap();
        src.set_georef(GeoReference::new(4326, 0.0, 10.0, 0.1, 0.1));
        let mut dst = RasterImage::new(PixelFormat::Rgb, 50, 25).unwrap();
        dst.clone_georeferencing(&src);
        assert_eq!(dst.georef().pixel_x_size, 0.2);
        assert_eq!(dst.georef().pixel_y_size, 0.4);

        let plain = RasterImage::new(PixelFormat::Rgb, 100, 100).unwrap();
        dst.clone_georeferencing(&plain);
        assert!(!dst.georef().is_georeferenced);
    }

    #[test]
    fn grid_stats_skip_no_data() {
        let mut grid = RasterImage::new_grid(GridSample::Float64, 3, 1).unwrap();
        grid.set_no_data(Some(-9999.0));
        grid.set_grid_value(0, 0, 4.5).unwrap();
        grid.set_grid_value(1, 0, -9999.0).unwrap();
        grid.set_grid_value(2, 0, -1.0).unwrap();
        grid.compute_grid_stats().unwrap();
        assert_eq!(grid.header().min_value, Some(-1.0));
        assert_eq!(grid.header().max_value, Some(4.5));
    }
}
