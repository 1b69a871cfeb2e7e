use crate::image::RasterImage;

/// NaN never compares equal, so a NaN no-data value matches any NaN sample.
fn is_no_data(no_data: Option<f64>, v: f64) -> bool {
    match no_data {
        Some(nd) if nd.is_nan() => v.is_nan(),
        Some(nd) => nd == v,
        None => false,
    }
}

pub(super) fn shrink(dst: &mut RasterImage, src: &RasterImage, fx: u32, fy: u32) {
    let Some(sample) = src.grid_sample() else {
        return;
    };
    let bw = sample.byte_width();
    let no_data = src.no_data();
    dst.header.no_data = no_data;
    let count = f64::from(fx) * f64::from(fy);

    for dy in 0..dst.height() {
        for dx in 0..dst.width() {
            let mut sum = 0f64;
            let mut poisoned = false;
            'block: for sy in dy * fy..(dy + 1) * fy {
                let row = src.row(sy);
                for sx in dx * fx..(dx + 1) * fx {
                    let v = sample.read_f64(&row[sx as usize * bw..]);
                    if is_no_data(no_data, v) {
                        poisoned = true;
                        break 'block;
                    }
                    sum += v;
                }
            }
            let value = match (poisoned, no_data) {
                (true, Some(nd)) => nd,
                _ => sum / count,
            };
            sample.write_f64(value, &mut dst.row_mut(dy)[dx as usize * bw..]);
        }
    }
}

pub(super) fn area(
    dst: &mut RasterImage,
    src: &RasterImage,
    xs: &[Vec<(u32, f64)>],
    ys: &[Vec<(u32, f64)>],
) {
    let Some(sample) = src.grid_sample() else {
        return;
    };
    let bw = sample.byte_width();
    let no_data = src.no_data();
    dst.header.no_data = no_data;

    for (dy, yspan) in ys.iter().enumerate() {
        for (dx, xspan) in xs.iter().enumerate() {
            let mut sum = 0f64;
            let mut total = 0f64;
            let mut poisoned = false;
            'cell: for &(sy, wy) in yspan {
                let row = src.row(sy);
                for &(sx, wx) in xspan {
                    let v = sample.read_f64(&row[sx as usize * bw..]);
                    if is_no_data(no_data, v) {
                        poisoned = true;
                        break 'cell;
                    }
                    sum += v * wx * wy;
                    total += wx * wy;
                }
            }
            let value = match (poisoned, no_data) {
                (true, Some(nd)) => nd,
                _ if total > 0.0 => sum / total,
                _ => 0.0,
            };
            sample.write_f64(value, &mut dst.row_mut(dy as u32)[dx * bw..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::image::RasterImage;
    use crate::pixel::GridSample;
    use crate::resample::{make_thumbnail, shrink_by_integer_factor};

    fn grid(sample: GridSample, w: u32, h: u32, values: &[f64]) -> RasterImage {
        let mut img = RasterImage::new_grid(sample, w, h).unwrap();
        for (i, &v) in values.iter().enumerate() {
            img.set_grid_value(i as u32 % w, i as u32 / w, v).unwrap();
        }
        img
    }

    #[test]
    fn nan_no_data_poisons_block() {
        let mut src = grid(GridSample::Float32, 4, 2, &[1.0, f64::NAN, 2.0, 4.0, 3.0, 5.0, 6.0, 8.0]);
        src.set_no_data(Some(f64::NAN));
        let mut dst = RasterImage::new_grid(GridSample::Float32, 2, 1).unwrap();
        shrink_by_integer_factor(&mut dst, &src).unwrap();
        assert!(dst.grid_value(0, 0).unwrap().is_nan());
        assert_eq!(dst.grid_value(1, 0), Some(5.0));

        let mut thumb = RasterImage::new_grid(GridSample::Float32, 2, 1).unwrap();
        make_thumbnail(&mut thumb, &src).unwrap();
        assert!(thumb.grid_value(0, 0).unwrap().is_nan());
    }

    #[test]
    fn integer_grid_mean_truncates() {
        let src = grid(GridSample::Int16, 2, 1, &[-3.0, -4.0]);
        let mut dst = RasterImage::new_grid(GridSample::Int16, 1, 1).unwrap();
        shrink_by_integer_factor(&mut dst, &src).unwrap();
        assert_eq!(dst.grid_value(0, 0), Some(-3.0));
    }

    #[test]
    fn thumbnail_poisons_on_no_data() {
        let mut src = grid(GridSample::Float32, 3, 1, &[1.0, -1.0, 5.0]);
        src.set_no_data(Some(-1.0));
        let mut dst = RasterImage::new_grid(GridSample::Float32, 2, 1).unwrap();
        make_thumbnail(&mut dst, &src).unwrap();
        assert_eq!(dst.grid_value(0, 0), Some(-1.0));
        assert_eq!(dst.grid_value(1, 0), Some(-1.0));
        assert_eq!(dst.no_data(), Some(-1.0));

        let src = grid(GridSample::Float32, 3, 1, &[1.0, 4.0, 5.0]);
        let mut dst = RasterImage::new_grid(GridSample::Float32, 2, 1).unwrap();
        make_thumbnail(&mut dst, &src).unwrap();
        assert_eq!(dst.grid_value(0, 0), Some(2.0));
        assert_eq!(dst.grid_value(1, 0), Some((14.0f64 / 3.0) as f32 as f64));
    }
}
