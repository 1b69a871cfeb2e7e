use std::io::Cursor;

use enough::Unstoppable;
use zenraster::*;

fn gradient(format: PixelFormat, w: u32, h: u32) -> RasterImage {
    let mut img = RasterImage::new(format, w, h).unwrap();
    for (i, p) in img.pixels_mut().iter_mut().enumerate() {
        *p = (i * 7 % 251) as u8;
    }
    img
}

/// Read every block and stitch the rows back together.
fn read_all(mut strips: StripImage, rows_per_block: u32) -> Vec<u8> {
    strips.allocate_pixels(rows_per_block).unwrap();
    let mut out = Vec::new();
    let mut last_percent = 0;
    while !strips.is_eof() {
        let before = strips.next_row();
        let percent = strips.read_next_strip().unwrap();
        let rows = strips.current_rows();
        assert!(rows >= 1 && rows <= rows_per_block);
        assert_eq!(strips.next_row(), before + rows);
        assert!(percent >= last_percent);
        last_percent = percent;
        out.extend_from_slice(strips.rows());
    }
    assert_eq!(last_percent, 100);
    out
}

#[test]
fn png_strips_match_whole_decode() {
    let img = gradient(PixelFormat::Rgb, 11, 7);
    let encoded = encode_png(&img, Unstoppable).unwrap();
    for rows_per_block in [1, 3, 7] {
        let strips = zenraster::png::open_strips(Cursor::new(encoded.clone())).unwrap();
        assert_eq!(strips.direction(), Some(Direction::Read));
        assert_eq!(read_all(strips, rows_per_block), img.pixels(), "{rows_per_block}");
    }
}

#[test]
fn tiff_strips_match_whole_decode() {
    let img = gradient(PixelFormat::Rgba, 40, 21);
    let options = TiffOptions {
        layout: TiffLayout::Tiles {
            width: 16,
            height: 16,
        },
        ..Default::default()
    };
    let encoded = EncodeRequest::tiff(options).encode(&img, Unstoppable).unwrap();
    for rows_per_block in [1, 3, 21] {
        let strips =
            zenraster::tiff::open_strips(Cursor::new(encoded.clone()), &TiffReadOptions::default()).unwrap();
        assert_eq!(read_all(strips, rows_per_block), img.pixels(), "{rows_per_block}");
    }
}

#[test]
fn reading_past_the_end_fails() {
    let img = gradient(PixelFormat::Grayscale, 4, 2);
    let encoded = encode_png(&img, Unstoppable).unwrap();
    let mut strips = zenraster::png::open_strips(Cursor::new(encoded)).unwrap();
    strips.allocate_pixels(2).unwrap();
    strips.read_next_strip().unwrap();
    assert!(strips.is_eof());
    assert!(matches!(
        strips.read_next_strip(),
        Err(RasterError::PngCodec(_))
    ));
}

#[test]
fn unallocated_session_is_rejected() {
    let img = gradient(PixelFormat::Grayscale, 4, 2);
    let encoded = encode_png(&img, Unstoppable).unwrap();
    let mut strips = zenraster::png::open_strips(Cursor::new(encoded)).unwrap();
    assert!(strips.read_next_strip().is_err());
}

#[test]
fn seekable_session_rewinds() {
    let img = gradient(PixelFormat::Grayscale, 5, 9);
    let encoded = encode_tiff(&img, Unstoppable).unwrap();
    let mut strips =
        zenraster::tiff::open_strips(Cursor::new(encoded), &TiffReadOptions::default()).unwrap();
    strips.allocate_pixels(4).unwrap();
    strips.read_next_strip().unwrap();
    strips.read_next_strip().unwrap();
    strips.rewind().unwrap();
    assert_eq!(strips.next_row(), 0);
    strips.read_next_strip().unwrap();
    assert_eq!(strips.row(0), img.row(0));
}

#[test]
fn sequential_session_cannot_rewind() {
    let img = gradient(PixelFormat::Grayscale, 5, 3);
    let encoded = encode_png(&img, Unstoppable).unwrap();
    let mut strips = zenraster::png::open_strips(Cursor::new(encoded)).unwrap();
    assert!(strips.rewind().is_err());
}

#[test]
fn tiff_file_written_in_strips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mosaic.tif");
    let src = gradient(PixelFormat::Rgb, 13, 10);

    let mut header = src.header().clone();
    header.georef = GeoReference::new(3857, -20_000.0, 10_000.0, 5.0, 5.0);
    let mut out = zenraster::tiff::create_strips_file(&path, header, &TiffOptions::default()).unwrap();
    assert_eq!(out.direction(), Some(Direction::Write));
    out.allocate_pixels(4).unwrap();
    let mut y = 0;
    while !out.is_eof() {
        let rows = out.current_rows();
        for i in 0..rows {
            out.row_mut(i).copy_from_slice(src.row(y + i));
        }
        out.write_next_strip().unwrap();
        y += rows;
    }
    out.finish().unwrap();

    let back = decode_file(&path, Unstoppable).unwrap();
    assert_eq!(back.pixels(), src.pixels());
    assert_eq!(back.georef().srid, 3857);
    assert_eq!(back.georef().upper_left_x, -20_000.0);
}

#[test]
fn transcode_png_to_tiff() {
    let dir = tempfile::tempdir().unwrap();
    let png_path = dir.path().join("in.png");
    let tif_path = dir.path().join("out.tif");
    let src = gradient(PixelFormat::Rgba, 9, 6);
    EncodeRequest::png()
        .encode_to_file(&src, &png_path, Unstoppable)
        .unwrap();

    let mut input = StripImage::open(&png_path).unwrap();
    assert_eq!(input.format(), ImageFormat::Png);
    input.allocate_pixels(2).unwrap();
    let header = ImageHeader::pixels(PixelFormat::Rgb, 9, 6).unwrap();
    let mut output = zenraster::tiff::create_strips_file(&tif_path, header, &TiffOptions::default()).unwrap();
    output.allocate_pixels(2).unwrap();
    while !input.is_eof() {
        input.read_next_strip().unwrap();
        output.transcode_rows_from(&input).unwrap();
        output.write_next_strip().unwrap();
    }
    output.finish().unwrap();

    let mut expected = src.clone();
    expected.convert_to_rgb().unwrap();
    let back = decode_file(&tif_path, Unstoppable).unwrap();
    assert_eq!(back.pixels(), expected.pixels());
}

#[test]
fn bil_strips_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dem.bil");
    let header = ImageHeader::grid(GridSample::Int16, 8, 5).unwrap();
    let mut out = zenraster::grid::bil::create_strips(&path, header, &GridOptions::default()).unwrap();
    out.allocate_pixels(5).unwrap();
    for y in 0..5u32 {
        for (x, chunk) in out.row_mut(y).chunks_exact_mut(2).enumerate() {
            chunk.copy_from_slice(&((y * 100 + x as u32) as i16).to_ne_bytes());
        }
    }
    out.write_next_strip().unwrap();
    out.finish().unwrap();

    let strips = StripImage::open(&path).unwrap();
    assert_eq!(strips.format(), ImageFormat::Bil);
    let bytes = read_all(strips, 2);
    let whole = decode_file(&path, Unstoppable).unwrap();
    assert_eq!(bytes, whole.pixels());
    assert_eq!(whole.grid_value(7, 4), Some(407.0));
}
