use crate::image::RasterImage;
use crate::pixel::PixelFormat;

/// Channel values of pixel `x` in `row`; palette indices expand to RGB.
#[inline]
fn sample(src: &RasterImage, row: &[u8], x: u32) -> [u8; 4] {
    let ps = src.pixel_size();
    let p = &row[x as usize * ps..x as usize * ps + ps];
    let mut out = [0u8; 4];
    if src.pixel_format() == PixelFormat::Palette {
        let [r, g, b] = src.palette().get(p[0]);
        out[..3].copy_from_slice(&[r, g, b]);
    } else {
        out[..ps].copy_from_slice(p);
    }
    out
}

#[inline]
fn store(dst: &mut RasterImage, x: u32, y: u32, px: [u8; 4]) {
    if dst.pixel_format() == PixelFormat::Palette {
        let index = dst.header.palette.match_color(px[0], px[1], px[2]);
        dst.row_mut(y)[x as usize] = index;
    } else {
        let ps = dst.pixel_size();
        dst.row_mut(y)[x as usize * ps..x as usize * ps + ps].copy_from_slice(&px[..ps]);
    }
}

pub(super) fn shrink(dst: &mut RasterImage, src: &RasterImage, fx: u32, fy: u32) {
    if src.pixel_format() == PixelFormat::Palette {
        dst.header.palette = src.header.palette.clone();
    }
    let count = u64::from(fx) * u64::from(fy);
    for dy in 0..dst.height() {
        for dx in 0..dst.width() {
            let mut acc = [0u64; 4];
            for sy in dy * fy..(dy + 1) * fy {
                let row = src.row(sy);
                for sx in dx * fx..(dx + 1) * fx {
                    for (a, v) in acc.iter_mut().zip(sample(src, row, sx)) {
                        *a += u64::from(v);
                    }
                }
            }
            store(dst, dx, dy, acc.map(|a| (a / count) as u8));
        }
    }
}

pub(super) fn area(
    dst: &mut RasterImage,
    src: &RasterImage,
    xs: &[Vec<(u32, f64)>],
    ys: &[Vec<(u32, f64)>],
) {
    if src.pixel_format() == PixelFormat::Palette {
        dst.header.palette = src.header.palette.clone();
    }
    for (dy, yspan) in ys.iter().enumerate() {
        for (dx, xspan) in xs.iter().enumerate() {
            let mut acc = [0f64; 4];
            let mut total = 0f64;
            for &(sy, wy) in yspan {
                let row = src.row(sy);
                for &(sx, wx) in xspan {
                    let w = wx * wy;
                    for (a, v) in acc.iter_mut().zip(sample(src, row, sx)) {
                        *a += f64::from(v) * w;
                    }
                    total += w;
                }
            }
            let px = if total > 0.0 {
                acc.map(|a| (a / total) as u8)
            } else {
                [0; 4]
            };
            store(dst, dx as u32, dy as u32, px);
        }
    }
}
