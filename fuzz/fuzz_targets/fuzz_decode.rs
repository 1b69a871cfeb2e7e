#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::{DecodeRequest, ImageFormat, Limits};

fuzz_target!(|data: &[u8]| {
    let limits = Limits {
        max_pixels: Some(16 * 1024 * 1024),
        ..Default::default()
    };

    // Auto-detect must never panic
    let _ = DecodeRequest::new(data)
        .with_limits(&limits)
        .decode(enough::Unstoppable);

    // Headerless grids only decode when told what they are
    let _ = DecodeRequest::new(data)
        .with_format(ImageFormat::Bil)
        .with_hdr("NROWS 4\nNCOLS 4\nNBITS 16\nPIXELTYPE SIGNEDINT\n")
        .with_limits(&limits)
        .decode(enough::Unstoppable);
});
