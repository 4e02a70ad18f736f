//! Reversible payload obfuscation for the match service.
//!
//! Clients scramble the payload of every match-service packet with a
//! keyed XOR. The transform is self-inverse: applying it twice restores
//! the original bytes, so [`descramble`] doubles as the encoder. The
//! marker and opcode bytes are left untouched so a frame can still be
//! routed before it is unscrambled.
//!
//! Only the match service applies this step; the relay service carries
//! its payloads in the clear.

/// Bytes at the head of a frame body that are never scrambled
/// (marker + opcode).
const CLEAR_PREFIX: usize = 2;

const KEY: [u8; 40] = [
    0x82, 0x6F, 0x3C, 0xD1, 0x59, 0xE8, 0x27, 0xB4, 0x9A, 0x05, 0xC3, 0x7E,
    0x10, 0xAF, 0x68, 0xF5, 0x2B, 0x94, 0x4D, 0xE0, 0x37, 0x8C, 0x71, 0x1A,
    0xBE, 0x43, 0xD8, 0x65, 0x0F, 0xA2, 0x56, 0xC9, 0x3E, 0x87, 0x70, 0x1D,
    0xB2, 0x4B, 0xDC, 0x61,
];

/// Unscrambles a frame body in place, skipping the marker and opcode.
pub fn descramble(body: &mut [u8]) {
    for (i, byte) in body.iter_mut().skip(CLEAR_PREFIX).enumerate() {
        *byte ^= KEY[i % KEY.len()];
    }
}

/// Scrambles a frame body in place. Identical to [`descramble`] because
/// the transform is self-inverse; the alias exists for call-site clarity.
pub fn scramble(body: &mut [u8]) {
    descramble(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_is_self_inverse() {
        let original: Vec<u8> = (0..=255u8).collect();
        let mut body = original.clone();
        scramble(&mut body);
        assert_ne!(body[CLEAR_PREFIX..], original[CLEAR_PREFIX..]);
        descramble(&mut body);
        assert_eq!(body, original);
    }

    #[test]
    fn marker_and_opcode_stay_clear() {
        let mut body = vec![0xF0, 0x42, 1, 2, 3];
        scramble(&mut body);
        assert_eq!(&body[..CLEAR_PREFIX], &[0xF0, 0x42]);
    }
}
