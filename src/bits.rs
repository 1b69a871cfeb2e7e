//! Sub-byte sample packing.

/// Expand packed 1, 2 or 4 bit samples (MSB first) into one byte each.
///
/// With `scale` false the output holds raw indices; with `scale` true values
/// are stretched to 0..=255. Depth 8 is a plain copy. `out.len()` decides how
/// many samples are produced.
pub(crate) fn unpack_samples(depth: u8, scale: bool, input: &[u8], out: &mut [u8]) {
    let factor: u8 = match (scale, depth) {
        (false, _) => 1,
        (true, 1) => 0xFF,
        (true, 2) => 0x55,
        (true, 4) => 0x11,
        _ => 1,
    };
    if depth >= 8 {
        let n = out.len().min(input.len());
        out[..n].copy_from_slice(&input[..n]);
        return;
    }
    let depth = depth as usize;
    let per_byte = 8 / depth;
    let mask = (1u8 << depth) - 1;
    for (i, o) in out.iter_mut().enumerate() {
        let Some(&byte) = input.get(i / per_byte) else {
            break;
        };
        let shift = 8 - depth * (i % per_byte + 1);
        *o = ((byte >> shift) & mask).wrapping_mul(factor);
    }
}

/// Pack 0/1 values into MSB-first bits; nonzero counts as 1.
pub(crate) fn pack_bilevel(input: &[u8], out: &mut [u8]) {
    out.fill(0);
    for (i, &v) in input.iter().enumerate() {
        if v != 0 {
            if let Some(byte) = out.get_mut(i / 8) {
                *byte |= 0x80 >> (i % 8);
            }
        }
    }
}

/// Bytes needed for `samples` values at `depth` bits.
pub(crate) fn packed_len(samples: usize, depth: u8) -> usize {
    (samples * depth as usize).div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpack_one_bit() {
        let mut out = [0u8; 10];
        unpack_samples(1, false, &[0b1010_0001, 0b1100_0000], &mut out);
        assert_eq!(out, [1, 0, 1, 0, 0, 0, 0, 1, 1, 1]);
        unpack_samples(1, true, &[0b1000_0000], &mut out[..2]);
        assert_eq!(&out[..2], &[255, 0]);
    }

    #[test]
    fn unpack_two_and_four_bit() {
        let mut out = [0u8; 4];
        unpack_samples(2, false, &[0b00_01_10_11], &mut out);
        assert_eq!(out, [0, 1, 2, 3]);
        unpack_samples(2, true, &[0b00_01_10_11], &mut out);
        assert_eq!(out, [0, 85, 170, 255]);
        let mut out = [0u8; 3];
        unpack_samples(4, true, &[0xF1, 0x80], &mut out);
        assert_eq!(out, [255, 17, 136]);
    }

    #[test]
    fn pack_roundtrip() {
        let vals = [1u8, 0, 0, 1, 1, 1, 0, 0, 1];
        let mut packed = [0u8; 2];
        pack_bilevel(&vals, &mut packed);
        assert_eq!(packed, [0b1001_1100, 0b1000_0000]);
        let mut back = [0u8; 9];
        unpack_samples(1, false, &packed, &mut back);
        assert_eq!(back, vals);
        assert_eq!(packed_len(9, 1), 2);
        assert_eq!(packed_len(3, 4), 2);
    }
}
