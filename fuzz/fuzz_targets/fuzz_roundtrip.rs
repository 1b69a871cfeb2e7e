#![no_main]
use libfuzzer_sys::fuzz_target;
use zenraster::*;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must survive a lossless re-encode unchanged
    let limits = Limits {
        max_pixels: Some(4 * 1024 * 1024),
        ..Default::default()
    };
    let Ok(decoded) = DecodeRequest::new(data)
        .with_limits(&limits)
        .decode(enough::Unstoppable)
    else {
        return;
    };

    let request = match decoded.pixel_format() {
        PixelFormat::Grid => EncodeRequest::raw(),
        _ => EncodeRequest::png(),
    };
    let Ok(reencoded) = request.encode(&decoded, enough::Unstoppable) else {
        return;
    };
    let Ok(decoded2) = decode(&reencoded, enough::Unstoppable) else {
        panic!("re-encoded data failed to decode");
    };

    assert_eq!(decoded.width(), decoded2.width());
    assert_eq!(decoded.height(), decoded2.height());
    if decoded.pixel_format() == decoded2.pixel_format() {
        assert_eq!(decoded.pixels(), decoded2.pixels(), "roundtrip pixel mismatch");
    }
});
