//! Bit-exact conversions for the Xenos-specific small float formats.
//!
//! - 7e3: 10-bit unsigned float used by `k_2_10_10_10_FLOAT` render targets,
//!   7-bit mantissa and 3-bit exponent, range `[0, 31.875]`.
//! - 20e4: 24-bit unsigned float used by `D24FS8` depth, 20-bit mantissa and
//!   4-bit exponent, range `[0, 2)`.
//!
//! The translator emits DXBC sequences computing exactly the same results
//! (see `translator::codec_emit`), so these functions double as the reference
//! the emitted code is tested against.

/// Largest value representable as 7e3.
pub const F7E3_MAX: f32 = 31.875;

/// Largest value representable as 20e4, `2 - 2^-20`.
pub const F20E4_MAX: f32 = 2.0 - 1.0 / 1_048_576.0;

/// Rounding mode of 20e4 encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rounding {
    /// Round to nearest, ties to even.
    NearestEven,
    /// Truncate.
    TowardZero,
}

/// Encodes a float as 7e3, clamping to `[0, 31.875]` with NaN becoming 0.
pub fn f32_to_7e3(value: f32) -> u32 {
    let clamped = if value > 0.0 {
        value.min(F7E3_MAX)
    } else {
        0.0
    };
    pre_clamped_f32_bits_to_7e3(clamped.to_bits())
}

/// Encodes the bits of a float already in `[0, 31.875]` as 7e3, rounding to
/// nearest even.
pub fn pre_clamped_f32_bits_to_7e3(f32_bits: u32) -> u32 {
    let biased = if f32_bits < 0x3E80_0000 {
        // Below 2^-2, the smallest normal 7e3.
        let shift = (125u32.wrapping_sub(f32_bits >> 23)).min(24);
        ((f32_bits & 0x7F_FFFF) | 0x80_0000) >> shift
    } else {
        f32_bits.wrapping_sub(124 << 23)
    };
    ((biased + 0x7FFF + ((biased >> 16) & 1)) >> 16) & 0x3FF
}

/// Decodes the 7e3 value in the low 10 bits of `value`.
pub fn f7e3_to_f32(value: u32) -> f32 {
    let exponent = (value >> 7) & 0b111;
    let mantissa = value & 0x7F;
    let (exponent, mantissa) = if exponent != 0 {
        (exponent, mantissa)
    } else if mantissa == 0 {
        return 0.0;
    } else {
        let msb = 31 - mantissa.leading_zeros();
        // The exponent of a normalized denormal can be negative, it's rebiased
        // below so wrapping arithmetic is fine.
        (msb.wrapping_sub(6), (mantissa << (7 - msb)) & 0x7F)
    };
    f32::from_bits((((exponent.wrapping_add(124)) << 7) | mantissa) << 16)
}

/// Largest encodable input of 20e4 with or without the `[0, 1)` to
/// `[0, 0.5)` remap.
pub fn f20e4_max(remap_from_0_to_0_5: bool) -> f32 {
    if remap_from_0_to_0_5 {
        F20E4_MAX * 0.5
    } else {
        F20E4_MAX
    }
}

/// Encodes a float as 20e4, clamping to the representable range with NaN
/// becoming 0.
///
/// With `remap_from_0_to_0_5` the exponent bias is off by one, so that a
/// value in `[0, 0.5)` is stored as the `[0, 1)` 20e4 value twice as large.
pub fn f32_to_20e4(value: f32, rounding: Rounding, remap_from_0_to_0_5: bool) -> u32 {
    let clamped = if value > 0.0 {
        value.min(f20e4_max(remap_from_0_to_0_5))
    } else {
        0.0
    };
    pre_clamped_f32_bits_to_20e4(clamped.to_bits(), rounding, remap_from_0_to_0_5)
}

/// Encodes the bits of a float already in the representable range as 20e4.
pub fn pre_clamped_f32_bits_to_20e4(f32_bits: u32, rounding: Rounding, remap_from_0_to_0_5: bool) -> u32 {
    let remap_bias = u32::from(remap_from_0_to_0_5);
    let mut biased = if f32_bits < 0x3880_0000 - (remap_bias << 23) {
        // Below 2^-14, the smallest normal 20e4.
        let shift = ((113 - remap_bias).wrapping_sub(f32_bits >> 23)).min(24);
        ((f32_bits & 0x7F_FFFF) | 0x80_0000) >> shift
    } else {
        f32_bits.wrapping_sub((112 - remap_bias) << 23)
    };
    if rounding == Rounding::NearestEven {
        biased = biased + 3 + ((biased >> 3) & 1);
    }
    (biased >> 3) & 0xFF_FFFF
}

/// Decodes the 20e4 value in the low 24 bits of `value`.
///
/// With `remap_to_0_to_0_5`, 20e4 `[0, 1)` decodes to `[0, 0.5)`, the inverse
/// of the encoder's remap.
pub fn f20e4_to_f32(value: u32, remap_to_0_to_0_5: bool) -> f32 {
    let remap_bias = u32::from(remap_to_0_to_0_5);
    let exponent = (value >> 20) & 0xF;
    let mantissa = value & 0xF_FFFF;
    let (exponent, mantissa) = if exponent != 0 {
        (exponent, mantissa)
    } else if mantissa == 0 {
        return 0.0;
    } else {
        let msb = 31 - mantissa.leading_zeros();
        (msb.wrapping_sub(19), (mantissa << (20 - msb)) & 0xF_FFFF)
    };
    f32::from_bits((((exponent.wrapping_add(112 - remap_bias)) << 20) | mantissa) << 3)
}

/// Converts a float in `[0, 1]` (saturated, NaN as 0) to 24-bit unorm,
/// rounding to nearest even.
pub fn f32_to_unorm24(value: f32) -> u32 {
    let saturated = if value > 0.0 { value.min(1.0) } else { 0.0 };
    let scaled = saturated * 16_777_215.0;
    // round_ne
    let rounded = scaled.round();
    let rounded = if (scaled - scaled.trunc()) == 0.5 && rounded % 2.0 != 0.0 {
        rounded - 1.0
    } else {
        rounded
    };
    rounded as u32
}

/// Converts 24-bit unorm back to a float.
pub fn unorm24_to_f32(value: u32) -> f32 {
    (value & 0xFF_FFFF) as f32 * (1.0 / 16_777_215.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn f7e3_known_values() {
        assert_eq!(f32_to_7e3(0.0), 0);
        assert_eq!(f32_to_7e3(1.0), 0x180);
        assert_eq!(f32_to_7e3(F7E3_MAX), 0x3FF);
        assert_eq!(f32_to_7e3(1000.0), 0x3FF);
        assert_eq!(f32_to_7e3(-5.0), 0);
        assert_eq!(f32_to_7e3(f32::NAN), 0);
        assert_eq!(f7e3_to_f32(0x180), 1.0);
        assert_eq!(f7e3_to_f32(0x3FF), F7E3_MAX);
    }

    #[test]
    fn f7e3_denormals_decode_with_normalization() {
        // Smallest denormal: 2^-2 * 1/128 = 2^-9.
        assert_eq!(f7e3_to_f32(1), 1.0 / 512.0);
        assert_eq!(f7e3_to_f32(0x40), 0.125);
        assert_eq!(f32_to_7e3(0.125), 0x40);
    }

    #[test]
    fn f20e4_known_values() {
        assert_eq!(f32_to_20e4(0.0, Rounding::NearestEven, false), 0);
        assert_eq!(f32_to_20e4(1.0, Rounding::NearestEven, false), 0xF0_0000);
        assert_eq!(f20e4_to_f32(0xF0_0000, false), 1.0);
        assert_eq!(f32_to_20e4(F20E4_MAX, Rounding::NearestEven, false), 0xFF_FFFF);
        assert_eq!(f32_to_20e4(2.5, Rounding::TowardZero, false), 0xFF_FFFF);
        assert_eq!(f20e4_to_f32(0xFF_FFFF, false), F20E4_MAX);
    }

    #[test]
    fn f20e4_remap_halves_the_range() {
        let encoded = f32_to_20e4(0.5, Rounding::NearestEven, true);
        assert_eq!(encoded, f32_to_20e4(1.0, Rounding::NearestEven, false));
        assert_eq!(f20e4_to_f32(encoded, true), 0.5);
    }

    #[test]
    fn f20e4_rounding_modes_differ_on_dropped_bits() {
        // 1 + 2^-20 + 2^-21 + 2^-23: mantissa bits below the 20e4 precision.
        let value = f32::from_bits(0x3F80_000D);
        assert_eq!(f32_to_20e4(value, Rounding::TowardZero, false), 0xF0_0001);
        assert_eq!(f32_to_20e4(value, Rounding::NearestEven, false), 0xF0_0002);
    }

    #[test]
    fn unorm24_endpoints() {
        assert_eq!(f32_to_unorm24(0.0), 0);
        assert_eq!(f32_to_unorm24(1.0), 0xFF_FFFF);
        assert_eq!(f32_to_unorm24(f32::NAN), 0);
        assert_eq!(unorm24_to_f32(0xFF_FFFF), 1.0);
    }

    proptest! {
        #[test]
        fn f7e3_round_trip_is_within_half_ulp(value in 0.0f32..=F7E3_MAX) {
            let encoded = f32_to_7e3(value);
            prop_assert!(encoded <= 0x3FF);
            let decoded = f7e3_to_f32(encoded);
            // Half a unit in the last place of the 7-bit mantissa, with
            // denormals sharing the smallest exponent.
            let exponent = value.log2().floor().max(-2.0);
            let half_ulp = 2f32.powf(exponent - 8.0);
            prop_assert!((decoded - value).abs() <= half_ulp, "{value} -> {decoded}");
        }

        #[test]
        fn f7e3_decode_encode_is_identity(bits in 0u32..0x400) {
            prop_assert_eq!(f32_to_7e3(f7e3_to_f32(bits)), bits);
        }

        #[test]
        fn f20e4_round_trip_is_within_rounding(value in 0.0f32..F20E4_MAX, remap in any::<bool>()) {
            let input = if remap { value * 0.5 } else { value };
            for rounding in [Rounding::NearestEven, Rounding::TowardZero] {
                let encoded = f32_to_20e4(input, rounding, remap);
                prop_assert!(encoded <= 0xFF_FFFF);
                let decoded = f20e4_to_f32(encoded, remap);
                let exponent = input.log2().floor().max(if remap { -15.0 } else { -14.0 });
                let ulp = 2f32.powf(exponent - 20.0);
                let tolerance = if rounding == Rounding::NearestEven { ulp * 0.5 } else { ulp };
                prop_assert!((decoded - input).abs() <= tolerance, "{input} -> {decoded}");
                if rounding == Rounding::TowardZero {
                    prop_assert!(decoded <= input);
                }
            }
        }

        #[test]
        fn f20e4_decode_encode_is_identity(bits in 0u32..0x100_0000) {
            let decoded = f20e4_to_f32(bits, false);
            prop_assert_eq!(f32_to_20e4(decoded, Rounding::NearestEven, false), bits);
            prop_assert_eq!(f32_to_20e4(decoded, Rounding::TowardZero, false), bits);
        }
    }
}
