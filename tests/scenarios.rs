use enough::Unstoppable;
use zenraster::*;

#[test]
fn palette_png_to_rgba_window() {
    let mut img = RasterImage::new(PixelFormat::Palette, 2, 2).unwrap();
    img.palette_mut().set(0, [10, 20, 30]);
    img.palette_mut().set(1, [200, 100, 50]);
    img.pixels_mut().copy_from_slice(&[0, 1, 1, 0]);
    let encoded = encode_png(&img, Unstoppable).unwrap();

    let mut decoded = decode(&encoded, Unstoppable).unwrap();
    decoded.convert_to_rgba().unwrap();
    let mut window = RasterImage::new(PixelFormat::Rgba, 1, 1).unwrap();
    window.sub_set(&decoded, 1, 0).unwrap();
    assert_eq!(window.pixels(), &[200, 100, 50, 255]);
    assert!(!window.georef().is_georeferenced);
}

fn no_data_grid() -> RasterImage {
    let mut grid = RasterImage::new_grid(GridSample::Float64, 4, 4).unwrap();
    grid.set_no_data(Some(-9999.0));
    let values = [
        [1.0, 2.0, 5.0, 5.0],
        [3.0, -9999.0, 5.0, 5.0],
        [1.0, 2.0, 0.0, 0.0],
        [3.0, 4.0, 0.0, 8.0],
    ];
    for (y, row) in values.iter().enumerate() {
        for (x, v) in row.iter().enumerate() {
            grid.set_grid_value(x as u32, y as u32, *v).unwrap();
        }
    }
    grid.set_georef(GeoReference::new(4326, 10.0, 50.0, 0.25, 0.25));
    grid
}

#[test]
fn grid_shrink_propagates_no_data() {
    let src = no_data_grid();
    let mut dst = RasterImage::new_grid(GridSample::Float64, 2, 2).unwrap();
    shrink_by_integer_factor(&mut dst, &src).unwrap();
    assert_eq!(dst.grid_value(0, 0), Some(-9999.0));
    assert_eq!(dst.grid_value(1, 0), Some(5.0));
    assert_eq!(dst.grid_value(0, 1), Some(2.5));
    assert_eq!(dst.grid_value(1, 1), Some(2.0));
    assert_eq!(dst.no_data(), Some(-9999.0));
}

#[test]
fn resized_grid_keeps_extent() {
    let src = no_data_grid();
    let half = src.resized(2, 2).unwrap();
    let g = half.georef();
    assert_eq!(g.upper_left_x, 10.0);
    assert_eq!(g.upper_left_y, 50.0);
    assert_eq!(g.pixel_x_size, 0.5);
    assert_eq!(g.pixel_y_size, 0.5);
}

#[test]
fn thumbnail_of_rgb_is_averaged() {
    let mut src = RasterImage::new(PixelFormat::Rgb, 4, 2).unwrap();
    for x in 0..4usize {
        let v = if x < 2 { 0 } else { 200 };
        for y in 0..2 {
            src.row_mut(y)[x * 3..x * 3 + 3].copy_from_slice(&[v, v, v]);
        }
    }
    let thumb = src.thumbnail(2, 1).unwrap();
    assert_eq!(thumb.pixels(), &[0, 0, 0, 200, 200, 200]);
}

#[test]
fn rgb_to_palette_and_back() {
    let mut img = RasterImage::new(PixelFormat::Rgb, 3, 1).unwrap();
    img.pixels_mut()
        .copy_from_slice(&[255, 0, 0, 0, 255, 0, 255, 0, 0]);
    img.convert_to_palette().unwrap();
    assert_eq!(img.pixel_format(), PixelFormat::Palette);
    assert_eq!(img.palette().len(), 2);
    assert_eq!(img.pixels()[0], img.pixels()[2]);
    img.convert_to_bgr().unwrap();
    assert_eq!(img.pixels(), &[0, 0, 255, 0, 255, 0, 0, 0, 255]);
}

#[test]
fn monochrome_thresholds_on_luma() {
    let mut img = RasterImage::new(PixelFormat::Grayscale, 4, 1).unwrap();
    img.pixels_mut().copy_from_slice(&[0, 100, 160, 255]);
    img.convert_to_monochrome().unwrap();
    assert!(img.palette().is_monochrome());
    assert_eq!(img.pixels(), &[0, 0, 1, 1]);
}

#[test]
fn grid_cast_wraps() {
    let mut grid = RasterImage::new_grid(GridSample::Float64, 2, 1).unwrap();
    grid.set_grid_value(0, 0, 65537.9).unwrap();
    grid.set_grid_value(1, 0, -1.5).unwrap();
    grid.convert_to_grid(GridSample::UInt16).unwrap();
    assert_eq!(grid.grid_value(0, 0), Some(1.0));
    assert_eq!(grid.grid_value(1, 0), Some(65535.0));
}

#[test]
fn geotiff_grid_through_ascii() {
    let src = no_data_grid();
    let tiff = encode_tiff(&src, Unstoppable).unwrap();
    let decoded = decode(&tiff, Unstoppable).unwrap();
    let text = EncodeRequest::ascii_grid().encode(&decoded, Unstoppable).unwrap();
    let back = decode(&text, Unstoppable).unwrap();
    assert_eq!(back.grid_value(1, 1), Some(-9999.0));
    assert_eq!(back.grid_value(3, 3), Some(8.0));
    assert_eq!(back.no_data(), Some(-9999.0));
    assert_eq!(back.georef().upper_left_x, 10.0);
}
