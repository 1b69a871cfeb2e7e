//! Resampling between two pre-allocated images of the same layout.
//!
//! Three operations, each with a pixel and a grid implementation:
//!
//! - [`shrink_by_integer_factor`]: block mean when both ratios are whole
//!   numbers.
//! - [`resize_generic`]: 16.16 fixed-point nearest neighbour, dispatching to
//!   the block mean when its precondition holds.
//! - [`make_thumbnail`]: box filter weighted by fractional overlap.
//!
//! Pixel means truncate. Grid cells touching a no-data sample become
//! no-data. Palette images are averaged in RGB and re-matched against a
//! copy of the source palette. None of these touch georeferencing; see
//! [`RasterImage::resized`] and [`RasterImage::thumbnail`] for the variants
//! that allocate and carry it across.

mod grid;
mod pixels;

use crate::error::RasterError;
use crate::header::ImageHeader;
use crate::image::RasterImage;
use crate::pixel::PixelFormat;

/// Average `(src.w / dst.w) x (src.h / dst.h)` blocks of `src` into `dst`.
///
/// Requires both source dimensions to be whole multiples of the destination
/// dimensions.
pub fn shrink_by_integer_factor(dst: &mut RasterImage, src: &RasterImage) -> Result<(), RasterError> {
    check_pair(dst, src)?;
    let (fx, fy) = integer_factors(dst, src).ok_or_else(|| {
        RasterError::InvalidArgument(format!(
            "{}x{} is not an integer reduction of {}x{}",
            dst.width(),
            dst.height(),
            src.width(),
            src.height()
        ))
    })?;
    shrink_unchecked(dst, src, fx, fy);
    Ok(())
}

/// Nearest-neighbour scaling to any size.
pub fn resize_generic(dst: &mut RasterImage, src: &RasterImage) -> Result<(), RasterError> {
    check_pair(dst, src)?;
    if let Some((fx, fy)) = integer_factors(dst, src) {
        shrink_unchecked(dst, src, fx, fy);
        return Ok(());
    }
    nearest(dst, src);
    Ok(())
}

/// Area-weighted scaling to any size.
pub fn make_thumbnail(dst: &mut RasterImage, src: &RasterImage) -> Result<(), RasterError> {
    check_pair(dst, src)?;
    let xs = area_spans(src.width(), dst.width());
    let ys = area_spans(src.height(), dst.height());
    if src.pixel_format() == PixelFormat::Grid {
        grid::area(dst, src, &xs, &ys);
    } else {
        pixels::area(dst, src, &xs, &ys);
    }
    Ok(())
}

impl RasterImage {
    /// A new image of `width` x `height` scaled with [`resize_generic`],
    /// georeferenced over the same extent.
    pub fn resized(&self, width: u32, height: u32) -> Result<RasterImage, RasterError> {
        let mut dst = RasterImage::from_header(header_like(self, width, height)?)?;
        resize_generic(&mut dst, self)?;
        dst.clone_georeferencing(self);
        Ok(dst)
    }

    /// A new image of `width` x `height` scaled with [`make_thumbnail`],
    /// georeferenced over the same extent.
    pub fn thumbnail(&self, width: u32, height: u32) -> Result<RasterImage, RasterError> {
        let mut dst = RasterImage::from_header(header_like(self, width, height)?)?;
        make_thumbnail(&mut dst, self)?;
        dst.clone_georeferencing(self);
        Ok(dst)
    }
}

fn header_like(src: &RasterImage, width: u32, height: u32) -> Result<ImageHeader, RasterError> {
    let s = src.header();
    let mut header = ImageHeader::new(
        s.pixel_format(),
        width,
        height,
        s.bits_per_sample(),
        s.samples_per_pixel(),
        s.sample_format(),
    )?;
    header.palette = s.palette.clone();
    header.transparent = s.transparent;
    header.no_data = s.no_data;
    Ok(header)
}

fn check_pair(dst: &RasterImage, src: &RasterImage) -> Result<(), RasterError> {
    if src.pixel_format() == PixelFormat::Unknown {
        return Err(RasterError::InvalidImage("unknown pixel format".into()));
    }
    dst.header().check_same_layout(src.header())
}

pub(crate) fn integer_factors(dst: &RasterImage, src: &RasterImage) -> Option<(u32, u32)> {
    let (sw, sh, dw, dh) = (src.width(), src.height(), dst.width(), dst.height());
    if sw >= dw && sh >= dh && sw % dw == 0 && sh % dh == 0 {
        Some((sw / dw, sh / dh))
    } else {
        None
    }
}

fn shrink_unchecked(dst: &mut RasterImage, src: &RasterImage, fx: u32, fy: u32) {
    if src.pixel_format() == PixelFormat::Grid {
        grid::shrink(dst, src, fx, fy);
    } else {
        pixels::shrink(dst, src, fx, fy);
    }
}

/// 16.16 fixed-point nearest neighbour; copies whole pixels of any layout.
fn nearest(dst: &mut RasterImage, src: &RasterImage) {
    let ps = src.pixel_size();
    let x_delta = (u64::from(src.width()) << 16) / u64::from(dst.width());
    let y_delta = (u64::from(src.height()) << 16) / u64::from(dst.height());
    let max_x = src.width() as usize - 1;
    let max_y = src.height() - 1;

    let mut y_acc = 0u64;
    for dy in 0..dst.height() {
        let sy = ((y_acc >> 16) as u32).min(max_y);
        let src_row = src.row(sy);
        let dst_row = dst.row_mut(dy);
        let mut x_acc = 0u64;
        for d in dst_row.chunks_exact_mut(ps) {
            let sx = ((x_acc >> 16) as usize).min(max_x);
            d.copy_from_slice(&src_row[sx * ps..sx * ps + ps]);
            x_acc += x_delta;
        }
        y_acc += y_delta;
    }
    if src.pixel_format() == PixelFormat::Palette {
        dst.header.palette = src.header.palette.clone();
    }
    dst.header.no_data = src.header.no_data;
}

/// For each destination index along one axis, the overlapped source indices
/// and their overlap lengths.
pub(crate) fn area_spans(src_len: u32, dst_len: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = f64::from(src_len) / f64::from(dst_len);
    (0..dst_len)
        .map(|d| {
            let start = f64::from(d) * scale;
            let end = (f64::from(d) + 1.0) * scale;
            let first = start.floor() as u32;
            let last = (end.ceil() as u32).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let w = end.min(f64::from(s) + 1.0) - start.max(f64::from(s));
                    (w > 1e-9).then_some((s, w))
                })
                .collect()
        })
        .collect()
}
