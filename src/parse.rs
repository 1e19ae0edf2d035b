//! Binary decoder for headband notification payloads.
//!
//! Everything here is pure (no I/O, no state) and safe to call from any
//! async or sync context.
//!
//! Each notification is one frame, identified by its 4-byte prefix:
//!
//! | Prefix | Variant | Min length | Fields |
//! |---|---|---|---|
//! | `AA 01 01 0F` | [`DecodedFrame::FirstSegment`] | 19 | signal quality, focus, relax, δ, θ, low α, high α |
//! | `AA 01 02 0C` | [`DecodedFrame::SecondSegment`] | 16 | low β, high β, low γ, high γ |
//!
//! Band powers are 24-bit big-endian unsigned integers.  Delta and theta are
//! rescaled by the headband's fixed factors (`× 3 / 50` and `/ 3`) and rounded.

use crate::error::FrameError;
use crate::protocol::{
    FIRST_SEGMENT_LEN, FIRST_SEGMENT_PREFIX, PREFIX_LEN, SECOND_SEGMENT_LEN,
    SECOND_SEGMENT_PREFIX,
};
use crate::types::{DecodedFrame, FirstSegment, SecondSegment};

/// Read a 24-bit unsigned big-endian integer from `data` at byte `offset`.
///
/// # Panics
/// Panics if `offset + 2 >= data.len()`; callers check the frame length first.
fn read_u24_be(data: &[u8], offset: usize) -> u32 {
    ((data[offset] as u32) << 16) | ((data[offset + 1] as u32) << 8) | (data[offset + 2] as u32)
}

fn scale_delta(raw: u32) -> u32 {
    (raw as f64 / 50.0 * 3.0).round() as u32
}

fn scale_theta(raw: u32) -> u32 {
    (raw as f64 / 3.0).round() as u32
}

/// Decode one notification payload.
///
/// Never panics: unknown prefixes and short buffers come back as
/// [`DecodedFrame::Invalid`].  Trailing bytes past the layout are ignored.
pub fn decode_frame(data: &[u8]) -> DecodedFrame {
    match try_decode(data) {
        Ok(frame) => frame,
        Err(e) => DecodedFrame::Invalid(e),
    }
}

fn try_decode(data: &[u8]) -> Result<DecodedFrame, FrameError> {
    if data.len() < PREFIX_LEN {
        return Err(FrameError::TooShort { len: data.len() });
    }
    let prefix = [data[0], data[1], data[2], data[3]];

    if prefix == FIRST_SEGMENT_PREFIX {
        require_len(data, FIRST_SEGMENT_LEN)?;
        return Ok(DecodedFrame::FirstSegment(FirstSegment {
            signal_quality: data[4],
            focus: data[5],
            relax: data[6],
            delta: scale_delta(read_u24_be(data, 7)),
            theta: scale_theta(read_u24_be(data, 10)),
            low_alpha: read_u24_be(data, 13),
            high_alpha: read_u24_be(data, 16),
        }));
    }

    if prefix == SECOND_SEGMENT_PREFIX {
        require_len(data, SECOND_SEGMENT_LEN)?;
        return Ok(DecodedFrame::SecondSegment(SecondSegment {
            low_beta: read_u24_be(data, 4),
            high_beta: read_u24_be(data, 7),
            low_gamma: read_u24_be(data, 10),
            high_gamma: read_u24_be(data, 13),
        }));
    }

    Err(FrameError::UnknownPrefix(prefix))
}

fn require_len(data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() < expected {
        Err(FrameError::Truncated {
            expected,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u24(v: u32) -> [u8; 3] {
        [(v >> 16) as u8, (v >> 8) as u8, v as u8]
    }

    fn first_frame(sq: u8, focus: u8, relax: u8, bands: [u32; 4]) -> Vec<u8> {
        let mut f = FIRST_SEGMENT_PREFIX.to_vec();
        f.extend_from_slice(&[sq, focus, relax]);
        for b in bands {
            f.extend_from_slice(&u24(b));
        }
        f
    }

    fn second_frame(bands: [u32; 4]) -> Vec<u8> {
        let mut f = SECOND_SEGMENT_PREFIX.to_vec();
        for b in bands {
            f.extend_from_slice(&u24(b));
        }
        f
    }

    #[test]
    fn decodes_first_segment_worked_example() {
        let data = first_frame(0x00, 0x45, 0x3C, [100, 30, 500, 700]);
        assert_eq!(data.len(), 19);
        assert_eq!(
            decode_frame(&data),
            DecodedFrame::FirstSegment(FirstSegment {
                signal_quality: 0,
                focus: 69,
                relax: 60,
                delta: 6,
                theta: 10,
                low_alpha: 500,
                high_alpha: 700,
            })
        );
    }

    #[test]
    fn decodes_second_segment() {
        let data = second_frame([1, 0x01_00_00, 0xFF_FF_FF, 42]);
        assert_eq!(
            decode_frame(&data),
            DecodedFrame::SecondSegment(SecondSegment {
                low_beta: 1,
                high_beta: 65_536,
                low_gamma: 16_777_215,
                high_gamma: 42,
            })
        );
    }

    #[test]
    fn uint24_is_big_endian() {
        assert_eq!(read_u24_be(&[0x01, 0x02, 0x03], 0), 0x010203);
    }

    #[test]
    fn delta_and_theta_round_half_up() {
        // 25 / 50 × 3 = 1.5 → 2 ; 7 / 3 = 2.33 → 2 ; 8 / 3 = 2.67 → 3
        let data = first_frame(0, 0, 0, [25, 7, 0, 0]);
        let DecodedFrame::FirstSegment(f) = decode_frame(&data) else {
            panic!("expected first segment");
        };
        assert_eq!(f.delta, 2);
        assert_eq!(f.theta, 2);

        let data = first_frame(0, 0, 0, [0, 8, 0, 0]);
        let DecodedFrame::FirstSegment(f) = decode_frame(&data) else {
            panic!("expected first segment");
        };
        assert_eq!(f.theta, 3);
    }

    #[test]
    fn max_band_values_do_not_overflow() {
        let data = first_frame(200, 100, 100, [0xFF_FF_FF; 4]);
        let DecodedFrame::FirstSegment(f) = decode_frame(&data) else {
            panic!("expected first segment");
        };
        assert_eq!(f.delta, 1_006_633);
        assert_eq!(f.theta, 5_592_405);
        assert_eq!(f.high_alpha, 0xFF_FF_FF);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut data = second_frame([1, 2, 3, 4]);
        data.extend_from_slice(&[0xDE, 0xAD]);
        assert!(matches!(decode_frame(&data), DecodedFrame::SecondSegment(_)));
    }

    #[test]
    fn every_truncation_of_a_valid_frame_is_invalid() {
        let first = first_frame(0, 50, 50, [1, 2, 3, 4]);
        for len in 0..first.len() {
            assert!(
                matches!(decode_frame(&first[..len]), DecodedFrame::Invalid(_)),
                "first segment truncated to {len} decoded"
            );
        }
        let second = second_frame([1, 2, 3, 4]);
        for len in 0..second.len() {
            assert!(
                matches!(decode_frame(&second[..len]), DecodedFrame::Invalid(_)),
                "second segment truncated to {len} decoded"
            );
        }
    }

    #[test]
    fn invalid_reasons() {
        assert_eq!(
            decode_frame(&[0xAA, 0x01]),
            DecodedFrame::Invalid(FrameError::TooShort { len: 2 })
        );
        assert_eq!(
            decode_frame(&[0xAA, 0x01, 0x03, 0x0F, 0, 0]),
            DecodedFrame::Invalid(FrameError::UnknownPrefix([0xAA, 0x01, 0x03, 0x0F]))
        );
        assert_eq!(
            decode_frame(&FIRST_SEGMENT_PREFIX),
            DecodedFrame::Invalid(FrameError::Truncated {
                expected: 19,
                actual: 4
            })
        );
    }
}
