use enough::Unstoppable;
use zenraster::*;

fn checker(format: PixelFormat, w: u32, h: u32) -> RasterImage {
    let mut img = RasterImage::new(format, w, h).unwrap();
    let px = img.pixel_size();
    for y in 0..h {
        let row = img.row_mut(y);
        for x in 0..w as usize {
            for c in 0..px {
                row[x * px + c] = if (x + y as usize) % 2 == 0 {
                    (40 * c + 200) as u8
                } else {
                    (30 * c + 10) as u8
                };
            }
        }
    }
    img
}

fn dem(sample: GridSample, w: u32, h: u32) -> RasterImage {
    let mut img = RasterImage::new_grid(sample, w, h).unwrap();
    for y in 0..h {
        for x in 0..w {
            img.set_grid_value(x, y, f64::from(x * 10 + y)).unwrap();
        }
    }
    img
}

#[test]
fn png_roundtrip_pixel_formats() {
    for format in [PixelFormat::Rgb, PixelFormat::Rgba, PixelFormat::Grayscale] {
        let img = checker(format, 5, 3);
        let encoded = EncodeRequest::png().encode(&img, Unstoppable).unwrap();
        assert_eq!(ImageFormat::detect(&encoded), Some(ImageFormat::Png));
        let decoded = decode(&encoded, Unstoppable).unwrap();
        assert_eq!(decoded.pixel_format(), format, "{format:?}");
        assert_eq!(decoded.pixels(), img.pixels(), "{format:?}");
    }
}

#[test]
fn png_keeps_palette() {
    let mut img = RasterImage::new(PixelFormat::Palette, 3, 1).unwrap();
    img.palette_mut().set(0, [255, 0, 0]);
    img.palette_mut().set(1, [0, 255, 0]);
    img.palette_mut().set(2, [0, 0, 255]);
    img.pixels_mut().copy_from_slice(&[2, 1, 0]);

    let encoded = EncodeRequest::png_with(PngOptions {
        compression: PngCompression::Best,
    })
    .encode(&img, Unstoppable)
    .unwrap();
    let decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.pixel_format(), PixelFormat::Palette);
    assert_eq!(decoded.pixels(), &[2, 1, 0]);
    assert_eq!(decoded.palette().get(2), [0, 0, 255]);
}

#[test]
fn gif_roundtrip_palette() {
    let mut img = RasterImage::new(PixelFormat::Palette, 4, 2).unwrap();
    img.palette_mut().set(0, [0, 0, 0]);
    img.palette_mut().set(1, [250, 250, 250]);
    for (i, p) in img.pixels_mut().iter_mut().enumerate() {
        *p = (i % 2) as u8;
    }
    let encoded = encode_gif(&img, Unstoppable).unwrap();
    let decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.width(), 4);
    assert_eq!(decoded.height(), 2);
    for i in 0..8u32 {
        let (x, y) = (i % 4, i / 4);
        let idx = decoded.row(y)[x as usize];
        assert_eq!(decoded.palette().get(idx), img.palette().get(img.row(y)[x as usize]));
    }
}

#[test]
fn jpeg_roundtrip_is_close() {
    let mut img = RasterImage::new(PixelFormat::Rgb, 16, 16).unwrap();
    img.fill(120, 60, 200, 255).unwrap();
    let encoded = EncodeRequest::jpeg(95).encode(&img, Unstoppable).unwrap();
    let decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.pixel_format(), PixelFormat::Rgb);
    for (a, b) in decoded.pixels().iter().zip(img.pixels()) {
        assert!(a.abs_diff(*b) <= 6, "{a} vs {b}");
    }
}

#[test]
fn tiff_roundtrip_with_georeference() {
    let mut img = dem(GridSample::Float32, 20, 7);
    img.set_no_data(Some(-9999.0));
    img.set_georef(GeoReference::new(32633, 500_000.0, 4_200_000.0, 30.0, 30.0));

    for layout in [
        TiffLayout::Strips { rows_per_strip: 3 },
        TiffLayout::Tiles {
            width: 16,
            height: 16,
        },
    ] {
        let options = TiffOptions {
            layout,
            ..Default::default()
        };
        let encoded = EncodeRequest::tiff(options).encode(&img, Unstoppable).unwrap();
        let decoded = decode(&encoded, Unstoppable).unwrap();
        assert_eq!(decoded.grid_sample(), Some(GridSample::Float32));
        assert_eq!(decoded.pixels(), img.pixels(), "{layout:?}");
        assert_eq!(decoded.no_data(), Some(-9999.0));
        let g = decoded.georef();
        assert!(g.is_georeferenced);
        assert_eq!(g.srid, 32633);
        assert_eq!(g.upper_left_x, 500_000.0);
        assert_eq!(g.upper_left_y, 4_200_000.0);
        assert_eq!(g.pixel_x_size, 30.0);
    }
}

#[test]
fn tiff_uncompressed_bgr() {
    let img = checker(PixelFormat::Bgr, 9, 4);
    let options = TiffOptions {
        compression: TiffCompression::None,
        ..Default::default()
    };
    let encoded = EncodeRequest::tiff(options).encode(&img, Unstoppable).unwrap();
    let mut decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.pixel_format(), PixelFormat::Rgb);
    decoded.convert_to_bgr().unwrap();
    assert_eq!(decoded.pixels(), img.pixels());
}

#[test]
fn raw_frame_roundtrip() {
    let img = checker(PixelFormat::Argb, 3, 3);
    let encoded = EncodeRequest::raw().encode(&img, Unstoppable).unwrap();
    let decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.pixel_format(), PixelFormat::Argb);
    assert_eq!(decoded.pixels(), img.pixels());
}

#[test]
fn adam7_planes_merge_to_full_resolution() {
    let img = checker(PixelFormat::Rgb, 10, 9);
    let planes = Adam7Planes::split(&img).unwrap();
    let bytes = planes.encode().unwrap();
    let back = Adam7Planes::decode(&bytes, 10, 9).unwrap();
    let merged = back.merge(1).unwrap();
    assert_eq!(merged.pixels(), img.pixels());
}

#[test]
fn ascii_grid_roundtrip() {
    let mut img = dem(GridSample::Float64, 4, 3);
    img.set_grid_value(0, 0, -9999.0).unwrap();
    img.set_no_data(Some(-9999.0));
    img.set_georef(GeoReference::new(0, 100.0, 230.0, 10.0, 10.0));

    let encoded = EncodeRequest::ascii_grid().encode(&img, Unstoppable).unwrap();
    let text = String::from_utf8(encoded.clone()).unwrap();
    assert!(text.to_ascii_lowercase().starts_with("ncols"));
    let decoded = decode(&encoded, Unstoppable).unwrap();
    assert_eq!(decoded.grid_value(3, 2), Some(32.0));
    assert_eq!(decoded.grid_value(0, 0), Some(-9999.0));
    assert_eq!(decoded.no_data(), Some(-9999.0));
    assert_eq!(decoded.georef().upper_left_y, 230.0);
}

#[test]
fn hgt_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("N45E006.hgt");
    let mut img = RasterImage::new_grid(GridSample::Int16, 1201, 1201).unwrap();
    img.set_grid_value(600, 600, 4808.0).unwrap();
    img.set_grid_value(0, 0, -12.0).unwrap();

    EncodeRequest::hgt()
        .encode_to_file(&img, &path, Unstoppable)
        .unwrap();
    let decoded = decode_file(&path, Unstoppable).unwrap();
    assert_eq!(decoded.grid_value(600, 600), Some(4808.0));
    assert_eq!(decoded.grid_value(0, 0), Some(-12.0));
    let g = decoded.georef();
    assert_eq!(g.srid, 4326);
    assert!((g.upper_left_y - 46.0).abs() < 1e-3);
}

#[test]
fn flt_file_pair_big_endian() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("depth.flt");
    let mut img = dem(GridSample::Float32, 6, 5);
    img.set_no_data(Some(-1.0));
    let options = GridOptions {
        byte_order: ByteOrder::BigEndian,
    };
    EncodeRequest::flt(options)
        .encode_to_file(&img, &path, Unstoppable)
        .unwrap();
    let decoded = decode_file(&path, Unstoppable).unwrap();
    assert_eq!(decoded.grid_sample(), Some(GridSample::Float32));
    assert_eq!(decoded.pixels(), img.pixels());
    assert_eq!(decoded.no_data(), Some(-1.0));
}

#[test]
fn probe_reports_dimensions() {
    let img = checker(PixelFormat::Rgba, 7, 2);
    let encoded = encode_tiff(&img, Unstoppable).unwrap();
    let info = ImageInfos::from_bytes(&encoded).unwrap();
    assert_eq!(info.format, ImageFormat::Tiff);
    assert_eq!((info.width(), info.height()), (7, 2));
    assert_eq!(info.pixel_format(), PixelFormat::Rgba);
}
