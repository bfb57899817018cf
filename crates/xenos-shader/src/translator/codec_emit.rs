//! In-shader versions of [`crate::codec`], equal to it bit for bit.
//!
//! Every emitter converts components `mask` of a temp in place.

use xenos_dxbc::{Dest, Src};

use super::Translator;
use crate::codec::{self, Rounding};

/// A Xenos unsigned small float format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum SmallFloat {
    /// 10-bit color, `k_2_10_10_10_FLOAT`.
    F7e3,
    /// 24-bit depth, `D24FS8`.
    F20e4,
}

impl SmallFloat {
    const fn mantissa_bits(self) -> u32 {
        match self {
            Self::F7e3 => 7,
            Self::F20e4 => 20,
        }
    }

    const fn exponent_bits(self) -> u32 {
        match self {
            Self::F7e3 => 3,
            Self::F20e4 => 4,
        }
    }

    /// Difference between the float32 and the small float exponent biases.
    const fn rebias(self, remap: bool) -> u32 {
        let rebias = match self {
            Self::F7e3 => 124,
            Self::F20e4 => 112,
        };
        rebias - remap as u32
    }

    fn max(self, remap: bool) -> f32 {
        match self {
            Self::F7e3 => codec::F7E3_MAX,
            Self::F20e4 => codec::f20e4_max(remap),
        }
    }
}

impl Translator {
    /// Float32 to a small float, with clamping. `remap` is only meaningful
    /// for 20e4 and stores `[0, 0.5)` as `[0, 1)`.
    pub(super) fn emit_f32_to_small_float(
        &mut self,
        value: u32,
        mask: u32,
        format: SmallFloat,
        rounding: Rounding,
        remap: bool,
    ) {
        let mantissa_bits = format.mantissa_bits();
        let dropped = 23 - mantissa_bits;
        let rebias = format.rebias(remap);
        let total_mask = (1u32 << (mantissa_bits + format.exponent_bits())) - 1;
        let v = Src::r(value, Src::XYZW);
        let vd = Dest::r(value, mask);

        // NaN and negative numbers, including -0, become +0.
        asm!(self).op_max(vd, v, Src::lf(0.0));
        asm!(self).op_imax(vd, v, Src::li(0));
        asm!(self).op_min(vd, v, Src::lf(format.max(remap)));

        let denormal = self.push_temp(0);
        let shift = self.push_temp(0);
        let (dn, dnd) = (Src::r(denormal, Src::XYZW), Dest::r(denormal, mask));
        let (sh, shd) = (Src::r(shift, Src::XYZW), Dest::r(shift, mask));

        // Too small to be normalized: (mantissa | implicit 1) >> min(rebias + 1 - exponent, 24).
        asm!(self).op_and(dnd, v, Src::lu(0x7F_FFFF));
        asm!(self).op_or(dnd, dn, Src::lu(0x80_0000));
        asm!(self).op_ushr(shd, v, Src::lu(23));
        asm!(self).op_iadd(shd, -sh, Src::lu(rebias + 1));
        // The shift amount only has 5 bits.
        asm!(self).op_umin(shd, sh, Src::lu(24));
        asm!(self).op_ushr(dnd, dn, sh);
        asm!(self).op_ult(shd, v, Src::lu((rebias + 1) << 23));
        asm!(self).op_iadd(vd, v, Src::lu(0u32.wrapping_sub(rebias << 23)));
        asm!(self).op_movc(vd, sh, dn, v);

        if rounding == Rounding::NearestEven {
            asm!(self).op_ushr(dnd, v, Src::lu(dropped));
            asm!(self).op_and(dnd, dn, Src::lu(1));
            asm!(self).op_iadd(vd, v, Src::lu((1 << (dropped - 1)) - 1));
            asm!(self).op_iadd(vd, v, dn);
        }
        asm!(self).op_ushr(vd, v, Src::lu(dropped));
        asm!(self).op_and(vd, v, Src::lu(total_mask));
        self.pop_temps(2);
    }

    /// A small float in the low bits to float32. `remap` is the inverse of
    /// the one of [`Self::emit_f32_to_small_float`].
    pub(super) fn emit_small_float_to_f32(&mut self, value: u32, mask: u32, format: SmallFloat, remap: bool) {
        let mantissa_bits = format.mantissa_bits();
        let mantissa_mask = (1u32 << mantissa_bits) - 1;
        let total_mask = (1u32 << (mantissa_bits + format.exponent_bits())) - 1;
        let v = Src::r(value, Src::XYZW);

        let mantissa = self.push_temp(0);
        let exponent = self.push_temp(0);
        let normalize = self.push_temp(0);
        let (m, md) = (Src::r(mantissa, Src::XYZW), Dest::r(mantissa, mask));
        let (e, ed) = (Src::r(exponent, Src::XYZW), Dest::r(exponent, mask));
        let (n, nd) = (Src::r(normalize, Src::XYZW), Dest::r(normalize, mask));

        asm!(self).op_and(md, v, Src::lu(mantissa_mask));
        asm!(self).op_ubfe(ed, Src::lu(format.exponent_bits()), Src::lu(mantissa_bits), v);

        // Denormals: shift the highest set bit into the implicit 1 position.
        // firstbit_hi counts from the MSB.
        asm!(self).op_firstbit_hi(nd, m);
        asm!(self).op_iadd(nd, n, Src::li(-(31 - mantissa_bits as i32)));
        asm!(self).op_movc(nd, e, Src::lu(0), n);
        asm!(self).op_ishl(md, m, n);
        asm!(self).op_and(md, m, Src::lu(mantissa_mask));
        asm!(self).op_iadd(nd, -n, Src::lu(1));
        asm!(self).op_movc(ed, e, e, n);

        asm!(self).op_iadd(ed, e, Src::lu(format.rebias(remap)));
        asm!(self).op_and(nd, v, Src::lu(total_mask));
        asm!(self).op_movc(ed, n, e, Src::lu(0));
        asm!(self).op_ishl(md, m, Src::lu(23 - mantissa_bits));
        asm!(self).op_ishl(ed, e, Src::lu(23));
        asm!(self).op_or(Dest::r(value, mask), e, m);
        self.pop_temps(3);
    }

    /// Float32 to 24-bit unorm, saturating and rounding to nearest even.
    pub(super) fn emit_f32_to_unorm24(&mut self, value: u32, mask: u32) {
        let (v, vd) = (Src::r(value, Src::XYZW), Dest::r(value, mask));
        asm!(self).op_mov(vd, v, true);
        asm!(self).op_mul(vd, v, Src::lf(16_777_215.0), false);
        asm!(self).op_round_ne(vd, v);
        asm!(self).op_ftou(vd, v);
    }

    pub(super) fn emit_unorm24_to_f32(&mut self, value: u32, mask: u32) {
        let (v, vd) = (Src::r(value, Src::XYZW), Dest::r(value, mask));
        asm!(self).op_and(vd, v, Src::lu(0xFF_FFFF));
        asm!(self).op_utof(vd, v);
        asm!(self).op_mul(vd, v, Src::lf(1.0 / 16_777_215.0), false);
    }

    /// Converts the RGB of `color` between linear and gamma space, with the
    /// Xenos piecewise-linear curve or the sRGB one.
    pub(super) fn emit_gamma(&mut self, color: u32, to_gamma: bool, srgb: bool) {
        if srgb {
            self.emit_srgb(color, to_gamma);
            return;
        }
        // Each component is the sum of the saturated progress through each of
        // the 4 segments times the rise of the segment.
        let (scale, offset, rise) = if to_gamma {
            (
                [1.0 / 0.0625, 1.0 / 0.0625, 1.0 / 0.375, 1.0 / 0.5],
                [0.0, -1.0, -0.125 / 0.375, -1.0],
                [4.0 * 0.0625, 2.0 * 0.0625, 0.375, 0.5 * 0.5],
            )
        } else {
            (
                [1.0 / 0.25, 1.0 / 0.125, 1.0 / 0.375, 1.0 / 0.25],
                [0.0, -2.0, -1.0, -3.0],
                [0.25 * 0.25, 0.5 * 0.125, 0.375, 2.0 * 0.25],
            )
        };
        let pieces = self.push_temp(0);
        for c in 0..3 {
            let [sx, sy, sz, sw] = scale;
            let [ox, oy, oz, ow] = offset;
            let [rx, ry, rz, rw] = rise;
            asm!(self).op_mul(
                Dest::r(pieces, 0b1111),
                Src::r(color, Src::XYZW).select(c),
                Src::lf4(sx, sy, sz, sw),
                false,
            );
            asm!(self).op_add(Dest::r(pieces, 0b1111), Src::r(pieces, Src::XYZW), Src::lf4(ox, oy, oz, ow), true);
            asm!(self).op_dp4(Dest::r(color, 1 << c), Src::r(pieces, Src::XYZW), Src::lf4(rx, ry, rz, rw));
        }
        self.pop_temp();
    }

    fn emit_srgb(&mut self, color: u32, to_gamma: bool) {
        let (c, cd) = (Src::r(color, Src::XYZW), Dest::r(color, 0b0111));
        let curve = self.push_temp(0);
        let above = self.push_temp(0);
        let (t, td) = (Src::r(curve, Src::XYZW), Dest::r(curve, 0b0111));
        asm!(self).op_mov(cd, c, true);
        if to_gamma {
            asm!(self).op_log(td, c);
            asm!(self).op_mul(td, t, Src::lf(1.0 / 2.4), false);
            asm!(self).op_exp(td, t);
            asm!(self).op_mul(td, t, Src::lf(1.055), false);
            asm!(self).op_add(td, t, Src::lf(-0.055), false);
            asm!(self).op_ge(Dest::r(above, 0b0111), c, Src::lf(0.003_130_8));
            asm!(self).op_mul(cd, c, Src::lf(12.92), false);
        } else {
            asm!(self).op_add(td, c, Src::lf(0.055), false);
            asm!(self).op_mul(td, t, Src::lf(1.0 / 1.055), false);
            asm!(self).op_log(td, t);
            asm!(self).op_mul(td, t, Src::lf(2.4), false);
            asm!(self).op_exp(td, t);
            asm!(self).op_ge(Dest::r(above, 0b0111), c, Src::lf(0.040_45));
            asm!(self).op_mul(cd, c, Src::lf(1.0 / 12.92), false);
        }
        asm!(self).op_movc(cd, Src::r(above, Src::XYZW), t, c);
        self.pop_temps(2);
    }
}
