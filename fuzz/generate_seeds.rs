#!/usr/bin/env -S cargo +nightly -Zscript
//! Generate seed corpus files for fuzzing.
//! Run: cargo +nightly -Zscript fuzz/generate_seeds.rs

fn raw_frame(code: u16, width: u32, height: u32, body: &[u8]) -> Vec<u8> {
    let start = 0xC000u16 | code << 4;
    let end = 0x3000u16 | code << 4;
    let mut out = start.to_le_bytes().to_vec();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(&end.to_le_bytes());
    out
}

fn main() {
    use std::fs;
    let dir = "fuzz/corpus/fuzz_decode";
    fs::create_dir_all(dir).unwrap();

    // RAW RGB 2x1
    let rgb = raw_frame(3, 2, 1, &[0xff, 0, 0, 0, 0xff, 0]);
    fs::write(format!("{dir}/raw_rgb_2x1.raw"), rgb).unwrap();

    // RAW palette 2x1 with a 2-entry table
    let mut body = 2u16.to_le_bytes().to_vec();
    body.extend_from_slice(&[0, 0, 0, 0xff, 0xff, 0xff, 1, 0]);
    fs::write(format!("{dir}/raw_palette_2x1.raw"), raw_frame(2, 2, 1, &body)).unwrap();

    // RAW Float32 grid 1x1
    let grid = raw_frame(14, 1, 1, &12.5f32.to_le_bytes());
    fs::write(format!("{dir}/raw_f32_1x1.raw"), grid).unwrap();

    // ASCII grid 3x2 with no-data
    let asc = b"ncols 3\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n\
NODATA_value -9999\n1 2 3\n4 -9999 6\n";
    fs::write(format!("{dir}/grid_3x2.asc"), asc).unwrap();

    // Truncated/malformed seeds for edge coverage
    fs::write(format!("{dir}/empty.bin"), b"").unwrap();
    fs::write(format!("{dir}/png_sig_only.bin"), b"\x89PNG\r\n\x1a\n").unwrap();
    fs::write(format!("{dir}/tiff_short.bin"), b"II*\x00\x08\x00").unwrap();
    fs::write(format!("{dir}/raw_no_end.bin"), &raw_frame(1, 1, 1, &[7])[..11]).unwrap();
    fs::write(format!("{dir}/asc_no_rows.bin"), b"ncols 2\nnrows 2\n1 2\n").unwrap();

    println!("Generated seed corpus in {dir}/");
}
