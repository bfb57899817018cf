//! Output merging done by the pixel shader itself, on the EDRAM bound as a
//! rasterizer-ordered raw buffer of 32-bit samples.
//!
//! `rov_params` holds, for the whole shader:
//! - x: the covered samples in bits 0:3, bit `2y + x` for the sample at
//!   `(x, y)` of the pixel, and color `i` written in bit `8 + i`;
//! - y: the depth/stencil dword of sample 0, wrapped;
//! - z: the 32bpp color dword of sample 0 relative to the base of a render
//!   target, not wrapped;
//! - w: samples whose depth/stencil write is deferred to the end.
//!
//! Depth/stencil dwords are the depth in bits 8:31 and the stencil in 0:7.

use xenos_dxbc::{Dest, Index, Src};

use super::codec_emit::SmallFloat;
use super::{uav, Translator};
use crate::codec::Rounding;
use crate::modification::DepthStencilMode;
use crate::system_constants::{Flags, SystemConstantIndex};
use crate::xenos::{
    blend_control, rt_format_flags, stencil_func_ops, BlendFactor, BlendOp, ColorRenderTargetFormat as Format,
    StencilOp, EDRAM_TILE_COUNT, EDRAM_TILE_DWORDS, EDRAM_TILE_HEIGHT_SAMPLES, EDRAM_TILE_WIDTH_SAMPLES,
    MAX_COLOR_RENDER_TARGETS,
};

/// Dwords of the EDRAM at 1x resolution scale.
const EDRAM_DWORDS: u32 = EDRAM_TILE_COUNT * EDRAM_TILE_DWORDS;

/// `zwzw`.
const ZWZW: u32 = 0b11_10_11_10;
/// `xxyy`.
const XXYY: u32 = 0b01_01_00_00;

fn edram_src(swizzle: u32) -> Src {
    Src::u(uav::EDRAM, Index::imm(uav::EDRAM), swizzle)
}

fn edram_dest(mask: u32) -> Dest {
    Dest::u(uav::EDRAM, Index::imm(uav::EDRAM), mask)
}

impl Translator {
    fn rov_tile_width(&self) -> u32 {
        EDRAM_TILE_WIDTH_SAMPLES * self.config.draw_resolution_scale().0
    }

    fn rov_edram_dwords(&self) -> u32 {
        let (scale_x, scale_y) = self.config.draw_resolution_scale();
        EDRAM_DWORDS * scale_x * scale_y
    }

    /// Coverage and EDRAM addresses of the pixel into `rov_params`.
    pub(super) fn rov_load_parameters(&mut self) {
        let params = self.sys.rov_params;
        let temp = self.push_temp(0);
        let t = Src::r(temp, Src::XYZW);

        // Host samples to guest positions. 4x is the same, 2x takes the top
        // from host sample 1 and the bottom from host sample 0, or 2 when
        // emulated with 4x.
        self.in_coverage_used = true;
        let coverage = Src::vcoverage();
        let bottom = if self.config.msaa_2x_supported { 0 } else { 2 };
        asm!(self).op_and(Dest::r(temp, 0b0001), coverage, Src::lu(0b1111));
        asm!(self).op_ubfe(Dest::r(temp, 0b0110), Src::lu(1), Src::lu4(0, 1, bottom, 0), coverage);
        asm!(self).op_bfi(Dest::r(temp, 0b0010), Src::lu(1), Src::lu(2), t.select(2), t.select(1));
        asm!(self).op_and(Dest::r(temp, 0b0100), coverage, Src::lu(1));
        let log2_y = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 4);
        asm!(self).op_movc(Dest::r(temp, 0b0010), log2_y, t.select(1), t.select(2));
        let log2_x = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 0);
        asm!(self).op_movc(Dest::r(params, 0b0001), log2_x, t.select(0), t.select(1));
        asm!(self).op_mov(Dest::r(params, 0b1000), Src::lu(0), false);

        // Coordinates of sample 0.
        self.in_position_used |= 0b0011;
        asm!(self).op_ftou(Dest::r(temp, 0b0011), Src::v(Index::imm(self.io.position), Src::XYZW));
        let log2 = self.system_constant(SystemConstantIndex::SampleCountLog2, 0, Src::XYZW);
        asm!(self).op_ishl(Dest::r(temp, 0b0011), t, log2);

        // Tile in xy, sample within the tile in zw.
        let (scale_x, scale_y) = self.config.draw_resolution_scale();
        let tile_width = self.rov_tile_width();
        let tile_height = EDRAM_TILE_HEIGHT_SAMPLES * scale_y;
        asm!(self).op_udiv(
            Dest::r(temp, 0b0011),
            Dest::r(temp, 0b1100),
            t.swizzle(Src::XYXY),
            Src::lu4(tile_width, tile_height, tile_width, tile_height),
        );
        let pitch = self.system_constant_scalar(SystemConstantIndex::Edram32bppTilePitchDwordsScaled, 0);
        asm!(self).op_imul(Dest::null(), Dest::r(temp, 0b0010), t.select(1), pitch);
        asm!(self).op_imad(
            Dest::r(temp, 0b0001),
            t.select(0),
            Src::lu(EDRAM_TILE_DWORDS * scale_x * scale_y),
            t.select(1),
        );
        asm!(self).op_imad(Dest::r(temp, 0b0001), t.select(3), Src::lu(tile_width), t.select(0));
        asm!(self).op_iadd(Dest::r(params, 0b0100), t.select(0), t.select(2));

        // Depth is stored with the left and right halves of the tile swapped.
        let half = tile_width / 2;
        asm!(self).op_uge(Dest::r(temp, 0b0010), t.select(2), Src::lu(half));
        asm!(self).op_movc(Dest::r(temp, 0b0010), t.select(1), Src::li(-(half as i32)), Src::lu(half));
        asm!(self).op_iadd(Dest::r(temp, 0b0001), t.select(0), t.select(2));
        asm!(self).op_iadd(Dest::r(temp, 0b0001), t.select(0), t.select(1));
        let depth_base = self.system_constant_scalar(SystemConstantIndex::EdramDepthBaseDwordsScaled, 0);
        asm!(self).op_iadd(Dest::r(temp, 0b0001), t.select(0), depth_base);
        let edram_dwords = self.rov_edram_dwords();
        asm!(self).op_udiv(Dest::null(), Dest::r(params, 0b0010), t.select(0), Src::lu(edram_dwords));

        self.pop_temp();
    }

    /// Depth of each sample position into `dest`, in the format of the depth
    /// buffer.
    fn rov_emit_depths(&mut self, dest: u32) {
        let Some(depth_stencil) = self.sys.depth_stencil else {
            return;
        };
        let (d, dd) = (Src::r(dest, Src::XYZW), Dest::r(dest, 0b1111));

        if self.info.writes_depth {
            asm!(self).op_mov(dd, Src::r(depth_stencil, Src::XXXX), true);
        } else {
            let slopes = self.push_temp(0);
            let offsets = self.push_temp(0);
            let (s, o) = (Src::r(slopes, Src::XYZW), Src::r(offsets, Src::XYZW));
            self.in_position_used |= 0b0100;
            let z = Src::v(Index::imm(self.io.position), Src::ZZZZ);
            if self.rov_is_depth_stencil_early() {
                asm!(self).op_deriv_rtx_coarse(Dest::r(slopes, 0b0001), z);
                asm!(self).op_deriv_rty_coarse(Dest::r(slopes, 0b0010), z);
            } else {
                asm!(self).op_mov(Dest::r(slopes, 0b0011), Src::r(depth_stencil, Src::XYZW), false);
            }

            // Samples are a quarter of a pixel away from the center on the
            // multisampled axes.
            let log2_x = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 0);
            asm!(self).op_movc(Dest::r(offsets, 0b1111), log2_x, Src::lf4(-0.25, 0.25, -0.25, 0.25), Src::lf(0.0));
            asm!(self).op_mul(Dest::r(offsets, 0b1111), o, s.select(0), false);
            let log2_y = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 4);
            asm!(self).op_movc(dd, log2_y, Src::lf4(-0.25, -0.25, 0.25, 0.25), Src::lf(0.0));
            asm!(self).op_mad(dd, d, s.select(1), o, false);
            asm!(self).op_add(dd, d, z, false);

            // Polygon offset of the face, the front one for non-polygons.
            let flags = self.flags();
            asm!(self).op_and(Dest::r(offsets, 0b0001), flags, Src::lu(Flags::PRIMITIVE_POLYGONAL.bits()));
            self.in_front_face_used = true;
            let face = Src::v(Index::imm(self.io.front_face), Src::XXXX);
            asm!(self).op_movc(Dest::r(offsets, 0b0001), o.select(0), face, Src::lu(u32::MAX));
            let front = self.system_constant(SystemConstantIndex::EdramPolyOffsetFront, 0, Src::XYXY);
            let back = self.system_constant(SystemConstantIndex::EdramPolyOffsetBack, 0, Src::XYXY);
            asm!(self).op_movc(Dest::r(slopes, 0b1100), o.select(0), front, back);
            asm!(self).op_max(Dest::r(slopes, 0b0001), s.select(0).abs(), s.select(1).abs());
            asm!(self).op_mad(Dest::r(slopes, 0b0001), s.select(0), s.select(2), s.select(3), false);
            asm!(self).op_add(dd, d, s.select(0), true);
            self.pop_temps(2);
        }

        let flag = self.push_temp(0);
        let flags = self.flags();
        asm!(self).op_and(Dest::r(flag, 0b0001), flags, Src::lu(Flags::ROV_DEPTH_FLOAT24.bits()));
        asm!(self).op_if(true, Src::r(flag, Src::XXXX));
        let rounding = if self.depth_stencil_mode() == DepthStencilMode::Float24Rounding {
            Rounding::NearestEven
        } else {
            Rounding::TowardZero
        };
        self.emit_f32_to_small_float(dest, 0b1111, SmallFloat::F20e4, rounding, false);
        asm!(self).op_else();
        self.emit_f32_to_unorm24(dest, 0b1111);
        asm!(self).op_endif();
        self.pop_temp();
    }

    /// Byte addresses of the depth/stencil of the 4 sample positions.
    fn rov_depth_stencil_addresses(&mut self, dest: u32) {
        let (d, dd) = (Src::r(dest, Src::XYZW), Dest::r(dest, 0b1111));
        let row = self.rov_tile_width();
        let edram_dwords = self.rov_edram_dwords();
        asm!(self).op_iadd(dd, Src::r(self.sys.rov_params, Src::YYYY), Src::lu4(0, 1, row, row + 1));
        asm!(self).op_udiv(Dest::null(), dd, d, Src::lu(edram_dwords));
        asm!(self).op_ishl(dd, d, Src::lu(2));
    }

    /// Stores `values.c` to `addresses.c` for each sample `c` set in `bits`.
    fn rov_store_samples(&mut self, bits: Src, addresses: u32, values: u32) {
        let temp = self.push_temp(0);
        for c in 0..4 {
            asm!(self).op_and(Dest::r(temp, 0b0001), bits, Src::lu(1 << c));
            asm!(self).op_if(true, Src::r(temp, Src::XXXX));
            asm!(self).op_store_raw(
                edram_dest(0b0001),
                Src::r(addresses, Src::XYZW).select(c),
                Src::r(values, Src::XYZW).select(c),
            );
            asm!(self).op_endif();
        }
        self.pop_temp();
    }

    /// Tests the covered samples against the depth/stencil buffer, removing
    /// the failing ones from the coverage and updating the buffer.
    ///
    /// Before the guest code, writes of passing samples are deferred to the
    /// end of the shader unless early writes are enabled, so a killed pixel
    /// leaves the buffer untouched.
    pub(super) fn rov_depth_stencil_test(&mut self) {
        let params = self.sys.rov_params;
        let p = Src::r(params, Src::XYZW);
        let early = self.rov_is_depth_stencil_early();

        let state = self.push_temp(0);
        let st = Src::r(state, Src::XYZW);
        let flags = self.flags();
        asm!(self).op_and(Dest::r(state, 0b0001), flags, Src::lu(Flags::ROV_DEPTH_STENCIL.bits()));
        asm!(self).op_if(true, st.select(0));

        let new = self.push_temp(0);
        self.rov_emit_depths(new);
        let address = self.push_temp(0);
        self.rov_depth_stencil_addresses(address);
        let old = self.push_temp(0);
        for c in 0..4 {
            asm!(self).op_ld_raw(
                Dest::r(old, 1 << c),
                Src::r(address, Src::XYZW).select(c),
                edram_src(Src::XXXX),
            );
        }
        let pass = self.push_temp(0);
        let compare = self.push_temp(0);
        let (n, o, ps, cm) = (
            Src::r(new, Src::XYZW),
            Src::r(old, Src::XYZW),
            Src::r(pass, Src::XYZW),
            Src::r(compare, Src::XYZW),
        );
        let (nd, pd, cd) = (Dest::r(new, 0b1111), Dest::r(pass, 0b1111), Dest::r(compare, 0b1111));

        // Depth test, one function bit at a time.
        let flags = self.flags();
        let shift = Flags::ROV_DEPTH_PASS_SHIFT;
        asm!(self).op_ibfe(Dest::r(state, 0b1110), Src::lu(1), Src::lu4(0, shift, shift + 1, shift + 2), flags);
        let old_depth = self.push_temp(0);
        let od = Src::r(old_depth, Src::XYZW);
        asm!(self).op_ushr(Dest::r(old_depth, 0b1111), o, Src::lu(8));
        asm!(self).op_ult(pd, n, od);
        asm!(self).op_and(pd, ps, st.select(1));
        asm!(self).op_ieq(cd, n, od);
        asm!(self).op_and(cd, cm, st.select(2));
        asm!(self).op_or(pd, ps, cm);
        asm!(self).op_ult(cd, od, n);
        asm!(self).op_and(cd, cm, st.select(3));
        asm!(self).op_or(pd, ps, cm);
        self.pop_temp();
        asm!(self).op_bfi(nd, Src::lu(24), Src::lu(8), n, o);

        let flags = self.flags();
        asm!(self).op_and(Dest::r(state, 0b0010), flags, Src::lu(Flags::ROV_STENCIL_TEST.bits()));
        asm!(self).op_if(true, st.select(1));
        self.rov_stencil_test(old, new, pass);
        asm!(self).op_endif();

        // The depth is only replaced by passing samples with writes enabled.
        let flags = self.flags();
        asm!(self).op_and(Dest::r(state, 0b0010), flags, Src::lu(Flags::ROV_DEPTH_WRITE.bits()));
        asm!(self).op_ine(Dest::r(state, 0b0010), st.select(1), Src::lu(0));
        asm!(self).op_and(cd, ps, st.select(1));
        asm!(self).op_movc(cd, cm, n, o);
        asm!(self).op_bfi(nd, Src::lu(8), Src::lu(0), n, cm);

        // Passing and changed samples as bits, then covered ones only.
        asm!(self).op_and(pd, ps, Src::lu4(1, 2, 4, 8));
        asm!(self).op_ine(cd, n, o);
        asm!(self).op_and(cd, cm, Src::lu4(1, 2, 4, 8));
        asm!(self).op_or(Dest::r(pass, 0b0011), ps, ps.swizzle(ZWZW));
        asm!(self).op_or(Dest::r(pass, 0b0001), ps.select(0), ps.select(1));
        asm!(self).op_or(Dest::r(compare, 0b0011), cm, cm.swizzle(ZWZW));
        asm!(self).op_or(Dest::r(compare, 0b0001), cm.select(0), cm.select(1));
        asm!(self).op_and(Dest::r(state, 0b0001), p.select(0), Src::lu(0b1111));
        asm!(self).op_and(Dest::r(compare, 0b0001), cm.select(0), st.select(0));
        asm!(self).op_or(Dest::r(state, 0b0010), ps.select(0), Src::lu(!0b1111));
        asm!(self).op_and(Dest::r(params, 0b0001), p.select(0), st.select(1));

        if early {
            // Changed samples that failed are written now. Passing ones wait
            // for the end unless early writes are enabled.
            let flags = self.flags();
            asm!(self).op_and(Dest::r(state, 0b0010), flags, Src::lu(Flags::ROV_DEPTH_STENCIL_EARLY_WRITE.bits()));
            asm!(self).op_movc(Dest::r(state, 0b0010), st.select(1), Src::lu(0b1111), Src::lu(0));
            asm!(self).op_and(Dest::r(state, 0b1000), ps.select(0), cm.select(0));
            asm!(self).op_and(Dest::r(state, 0b0010), st.select(3), st.select(1));
            asm!(self).op_xor(Dest::r(params, 0b1000), st.select(3), st.select(1));
            asm!(self).op_not(Dest::r(state, 0b0100), ps.select(0));
            asm!(self).op_and(Dest::r(state, 0b0100), st.select(2), cm.select(0));
            asm!(self).op_or(Dest::r(state, 0b0100), st.select(2), st.select(1));
            self.rov_store_samples(st.select(2), address, new);
            if let Some(depth_stencil) = self.sys.depth_stencil {
                asm!(self).op_mov(Dest::r(depth_stencil, 0b1111), n, false);
            }
        } else {
            self.rov_store_samples(cm.select(0), address, new);
        }
        self.pop_temps(5);
        asm!(self).op_endif();

        if early {
            // Leave once no pixel of the quad is covered, the others may still
            // need this one for derivatives.
            asm!(self).op_and(Dest::r(state, 0b0001), p.select(0), Src::lu(0b1111));
            asm!(self).op_movc(Dest::r(state, 0b0001), st.select(0), Src::lf(1.0), Src::lf(0.0));
            asm!(self).op_deriv_rtx_fine(Dest::r(state, 0b0010), st.select(0));
            asm!(self).op_deriv_rty_fine(Dest::r(state, 0b0100), st.select(0));
            asm!(self).op_add(Dest::r(state, 0b0001), st.select(0), st.select(1).abs(), false);
            asm!(self).op_add(Dest::r(state, 0b0001), st.select(0), st.select(2).abs(), false);
            asm!(self).op_retc(false, st.select(0));
        }
        self.pop_temp();
    }

    /// Stencil test of the face, merging the new stencil into the low byte of
    /// `new` and dropping failing samples from `pass`.
    fn rov_stencil_test(&mut self, old: u32, new: u32, pass: u32) {
        let stencil = self.push_temp(0);
        let stencil_pass = self.push_temp(0);
        let value = self.push_temp(0);
        let op = self.push_temp(0);
        let result = self.push_temp(0);
        let scratch = self.push_temp(0);
        let s = Src::r(stencil, Src::XYZW);
        let (sp, spd) = (Src::r(stencil_pass, Src::XYZW), Dest::r(stencil_pass, 0b1111));
        let (v, vd) = (Src::r(value, Src::XYZW), Dest::r(value, 0b1111));
        let (op_src, opd) = (Src::r(op, Src::XYZW), Dest::r(op, 0b1111));
        let (r, rd) = (Src::r(result, Src::XYZW), Dest::r(result, 0b1111));
        let (k, kd) = (Src::r(scratch, Src::XYZW), Dest::r(scratch, 0b1111));
        let ps = Src::r(pass, Src::XYZW);

        // Reference, read mask, write mask and function of the face.
        let flags = self.flags();
        asm!(self).op_and(Dest::r(scratch, 0b0001), flags, Src::lu(Flags::PRIMITIVE_POLYGONAL.bits()));
        self.in_front_face_used = true;
        let face = Src::v(Index::imm(self.io.front_face), Src::XXXX);
        asm!(self).op_movc(Dest::r(scratch, 0b0001), k.select(0), face, Src::lu(u32::MAX));
        let front = self.system_constant(SystemConstantIndex::EdramStencil, 0, Src::XYZW);
        let back = self.system_constant(SystemConstantIndex::EdramStencil, 16, Src::XYZW);
        asm!(self).op_movc(Dest::r(stencil, 0b1111), k.select(0), front, back);

        // Masked reference against the masked old values.
        asm!(self).op_and(vd, Src::r(old, Src::XYZW), Src::lu(0xFF));
        asm!(self).op_and(rd, v, s.select(1));
        asm!(self).op_and(Dest::r(scratch, 0b0001), s.select(0), s.select(1));
        asm!(self).op_ibfe(Dest::r(scratch, 0b1110), Src::lu(1), Src::lu4(0, 0, 1, 2), s.select(3));
        asm!(self).op_ult(spd, k.select(0), r);
        asm!(self).op_and(spd, sp, k.select(1));
        asm!(self).op_ieq(opd, k.select(0), r);
        asm!(self).op_and(opd, op_src, k.select(2));
        asm!(self).op_or(spd, sp, op_src);
        asm!(self).op_ult(opd, r, k.select(0));
        asm!(self).op_and(opd, op_src, k.select(3));
        asm!(self).op_or(spd, sp, op_src);

        // The operation of each sample.
        asm!(self).op_ubfe(
            Dest::r(scratch, 0b0111),
            Src::lu(3),
            Src::lu4(
                stencil_func_ops::FAIL_SHIFT,
                stencil_func_ops::PASS_SHIFT,
                stencil_func_ops::DEPTH_FAIL_SHIFT,
                0,
            ),
            s.select(3),
        );
        asm!(self).op_movc(opd, ps, k.select(1), k.select(2));
        asm!(self).op_movc(opd, sp, op_src, k.select(0));
        asm!(self).op_and(Dest::r(pass, 0b1111), ps, sp);

        asm!(self).op_mov(rd, v, false);
        for stencil_op in StencilOp::ALL.into_iter().skip(1) {
            let computed = match stencil_op {
                StencilOp::Keep => v,
                StencilOp::Zero => Src::lu(0),
                StencilOp::Replace => s.select(0),
                StencilOp::IncrementClamp => {
                    asm!(self).op_iadd(spd, v, Src::lu(1));
                    asm!(self).op_umin(spd, sp, Src::lu(0xFF));
                    sp
                }
                StencilOp::DecrementClamp => {
                    asm!(self).op_iadd(spd, v, Src::li(-1));
                    asm!(self).op_imax(spd, sp, Src::li(0));
                    sp
                }
                StencilOp::Invert => {
                    asm!(self).op_not(spd, v);
                    asm!(self).op_and(spd, sp, Src::lu(0xFF));
                    sp
                }
                StencilOp::IncrementWrap => {
                    asm!(self).op_iadd(spd, v, Src::lu(1));
                    asm!(self).op_and(spd, sp, Src::lu(0xFF));
                    sp
                }
                StencilOp::DecrementWrap => {
                    asm!(self).op_iadd(spd, v, Src::li(-1));
                    asm!(self).op_and(spd, sp, Src::lu(0xFF));
                    sp
                }
            };
            asm!(self).op_ieq(kd, op_src, Src::lu(stencil_op as u32));
            asm!(self).op_movc(rd, k, computed, r);
        }

        // Only the bits in the write mask change.
        asm!(self).op_xor(kd, v, r);
        asm!(self).op_and(kd, k, s.select(2));
        asm!(self).op_xor(rd, v, k);
        asm!(self).op_bfi(Dest::r(new, 0b1111), Src::lu(8), Src::lu(0), r, Src::r(new, Src::XYZW));
        self.pop_temps(6);
    }

    /// Writes the depth/stencil of samples that passed the early test and
    /// are still covered.
    fn rov_write_deferred_depth_stencil(&mut self) {
        let Some(depth_stencil) = self.sys.depth_stencil else {
            return;
        };
        let p = Src::r(self.sys.rov_params, Src::XYZW);
        let bits = self.push_temp(0);
        let address = self.push_temp(0);
        asm!(self).op_and(Dest::r(bits, 0b0001), p.select(3), p.select(0));
        self.rov_depth_stencil_addresses(address);
        self.rov_store_samples(Src::r(bits, Src::XXXX), address, depth_stencil);
        self.pop_temps(2);
    }

    pub(super) fn rov_complete(&mut self) {
        if !self.depth_only {
            if let Some(color) = self.sys.colors[0] {
                self.rov_alpha_to_coverage(color);
            }
        }
        if self.rov_is_depth_stencil_early() {
            self.rov_write_deferred_depth_stencil();
        } else {
            self.rov_depth_stencil_test();
        }
        for rt in 0..MAX_COLOR_RENDER_TARGETS {
            if let Some(color) = self.sys.colors[rt as usize] {
                self.rov_write_color(rt, color);
            }
        }
    }

    fn rov_alpha_to_coverage(&mut self, color: u32) {
        let params = self.sys.rov_params;
        let p = Src::r(params, Src::XYZW);
        let mask = self.push_temp(0);
        let m = Src::r(mask, Src::XXXX);
        let flags = self.flags();
        asm!(self).op_and(Dest::r(mask, 0b0001), flags, Src::lu(Flags::ALPHA_TO_COVERAGE.bits()));
        asm!(self).op_if(true, m);
        self.emit_alpha_to_coverage_mask(mask, color);
        asm!(self).op_or(Dest::r(mask, 0b0001), m, Src::lu(!0b1111));
        asm!(self).op_and(Dest::r(params, 0b0001), p.select(0), m);
        asm!(self).op_and(Dest::r(mask, 0b0001), p.select(0), Src::lu(0b1111));
        asm!(self).op_retc(false, m);
        asm!(self).op_endif();
        self.kills = true;
        self.pop_temp();
    }

    /// Blends and writes color `rt` to the covered samples.
    fn rov_write_color(&mut self, rt: u32, color: u32) {
        let params = self.sys.rov_params;
        let p = Src::r(params, Src::XYZW);
        let c = Src::r(color, Src::XYZW);

        // x: sample index, y: blending, z: the old value is needed, w: 64bpp.
        let state = self.push_temp(0);
        let st = Src::r(state, Src::XYZW);
        let format_flags = self.system_constant_scalar(SystemConstantIndex::EdramRtFormatFlags, 4 * rt);
        let keep = self.system_constant(SystemConstantIndex::EdramRtKeepMask, 8 * rt, Src::XYZW);

        // Skip the target if not written or with every bit kept. The high
        // dword of 32bpp targets doesn't exist.
        asm!(self).op_and(Dest::r(state, 0b0001), format_flags, Src::lu(rt_format_flags::BPP64));
        asm!(self).op_movc(
            Dest::r(state, 0b0001),
            st.select(0),
            keep.select_from_swizzled(1),
            Src::lu(u32::MAX),
        );
        asm!(self).op_and(Dest::r(state, 0b0001), st.select(0), keep.select_from_swizzled(0));
        asm!(self).op_ine(Dest::r(state, 0b0001), st.select(0), Src::lu(u32::MAX));
        asm!(self).op_and(Dest::r(state, 0b0010), p.select(0), Src::lu(1 << (8 + rt)));
        asm!(self).op_and(Dest::r(state, 0b0001), st.select(0), st.select(1));
        asm!(self).op_if(true, st.select(0));

        let bias = self.system_constant_scalar(SystemConstantIndex::ColorExpBias, 4 * rt);
        asm!(self).op_mul(Dest::r(color, 0b1111), c, bias, false);
        self.rov_clamp_color(rt, color);

        let blend = self.system_constant_scalar(SystemConstantIndex::EdramRtBlendFactorsOps, 4 * rt);
        asm!(self).op_ine(Dest::r(state, 0b0010), blend, Src::lu(blend_control::DISABLED));
        asm!(self).op_or(
            Dest::r(state, 0b0100),
            keep.select_from_swizzled(0),
            keep.select_from_swizzled(1),
        );
        asm!(self).op_or(Dest::r(state, 0b0100), st.select(2), st.select(1));
        asm!(self).op_and(Dest::r(state, 0b1000), format_flags, Src::lu(rt_format_flags::BPP64));
        asm!(self).op_mov(Dest::r(state, 0b0001), Src::lu(0), false);

        let sample = self.push_temp(0);
        let s = Src::r(sample, Src::XYZW);
        asm!(self).op_loop();
        asm!(self).op_uge(Dest::r(sample, 0b0010), st.select(0), Src::lu(4));
        asm!(self).op_if(true, s.select(1));
        asm!(self).op_break();
        asm!(self).op_endif();
        asm!(self).op_ishl(Dest::r(sample, 0b0010), Src::lu(1), st.select(0));
        asm!(self).op_and(Dest::r(sample, 0b0010), s.select(1), p.select(0));
        asm!(self).op_if(true, s.select(1));
        self.rov_write_color_sample(rt, color, state, sample);
        asm!(self).op_endif();
        asm!(self).op_iadd(Dest::r(state, 0b0001), st.select(0), Src::lu(1));
        asm!(self).op_endloop();
        self.pop_temp();

        asm!(self).op_endif();
        self.pop_temp();
    }

    /// Clamps `color` to the range of the format of `rt`.
    fn rov_clamp_color(&mut self, rt: u32, color: u32) {
        let c = Src::r(color, Src::XYZW);
        let clamp = self.system_constant(SystemConstantIndex::EdramRtClamp, 16 * rt, Src::XYZW);
        asm!(self).op_max(Dest::r(color, 0b0111), c, clamp.select_from_swizzled(0));
        asm!(self).op_max(Dest::r(color, 0b1000), c, clamp.select_from_swizzled(1));
        asm!(self).op_min(Dest::r(color, 0b0111), c, clamp.select_from_swizzled(2));
        asm!(self).op_min(Dest::r(color, 0b1000), c, clamp.select_from_swizzled(3));
    }

    /// One sample of [`Self::rov_write_color`], the sample index in
    /// `state.x`.
    fn rov_write_color_sample(&mut self, rt: u32, color: u32, state: u32, sample: u32) {
        let p = Src::r(self.sys.rov_params, Src::XYZW);
        let st = Src::r(state, Src::XYZW);
        let s = Src::r(sample, Src::XYZW);
        let address = Dest::r(sample, 0b0001);

        // Byte address, 64bpp samples taking two dwords.
        let row = self.rov_tile_width();
        asm!(self).op_and(address, st.select(0), Src::lu(1));
        asm!(self).op_ushr(Dest::r(sample, 0b0010), st.select(0), Src::lu(1));
        asm!(self).op_imad(address, s.select(1), Src::lu(row), s.select(0));
        asm!(self).op_iadd(address, s.select(0), p.select(2));
        asm!(self).op_movc(Dest::r(sample, 0b0010), st.select(3), Src::lu(1), Src::lu(0));
        asm!(self).op_ishl(address, s.select(0), s.select(1));
        let base = self.system_constant_scalar(SystemConstantIndex::EdramRtBaseDwordsScaled, 4 * rt);
        asm!(self).op_iadd(address, s.select(0), base);
        let edram_dwords = self.rov_edram_dwords();
        asm!(self).op_udiv(Dest::null(), address, s.select(0), Src::lu(edram_dwords));
        asm!(self).op_ishl(address, s.select(0), Src::lu(2));

        let old = self.push_temp(0b0011);
        let o = Src::r(old, Src::XYZW);
        asm!(self).op_if(true, st.select(2));
        asm!(self).op_ld_raw(Dest::r(old, 0b0011), s.select(0), edram_src(Src::XYZW));
        asm!(self).op_endif();

        let result = self.push_temp(0);
        asm!(self).op_if(true, st.select(1));
        let dst = self.push_temp(0);
        self.rov_unpack_color(rt, dst, old);
        self.rov_blend(rt, color, dst, result);
        self.pop_temp();
        asm!(self).op_else();
        asm!(self).op_mov(Dest::r(result, 0b1111), Src::r(color, Src::XYZW), false);
        asm!(self).op_endif();

        let packed = self.push_temp(0);
        let pk = Src::r(packed, Src::XYZW);
        self.rov_pack_color(rt, result, packed);

        // Bits in the keep mask come from the old value.
        let keep = self.system_constant(SystemConstantIndex::EdramRtKeepMask, 8 * rt, Src::XYZW);
        let scratch = Dest::r(result, 0b0011);
        let sc = Src::r(result, Src::XYZW);
        asm!(self).op_xor(scratch, pk, o);
        asm!(self).op_and(scratch, sc, keep);
        asm!(self).op_xor(Dest::r(packed, 0b0011), pk, sc);

        asm!(self).op_if(true, st.select(3));
        asm!(self).op_store_raw(edram_dest(0b0011), s.select(0), pk);
        asm!(self).op_else();
        asm!(self).op_store_raw(edram_dest(0b0001), s.select(0), pk);
        asm!(self).op_endif();
        self.pop_temps(3);
    }

    /// Unpacks `packed.xy` in the format of `rt` into float `dest`. Missing
    /// components are 0, alpha 1.
    fn rov_unpack_color(&mut self, rt: u32, dest: u32, packed: u32) {
        let (d, dd) = (Src::r(dest, Src::XYZW), Dest::r(dest, 0b1111));
        let pk = Src::r(packed, Src::XYZW);
        let format = self.push_temp(0);
        let format_flags = self.system_constant_scalar(SystemConstantIndex::EdramRtFormatFlags, 4 * rt);
        asm!(self).op_and(Dest::r(format, 0b0001), format_flags, Src::lu(rt_format_flags::FORMAT_MASK));
        asm!(self).op_switch(Src::r(format, Src::XXXX));

        for gamma in [false, true] {
            let format = if gamma { Format::k_8_8_8_8_GAMMA } else { Format::k_8_8_8_8 };
            asm!(self).op_case(Src::lu(format as u32));
            asm!(self).op_ubfe(dd, Src::lu(8), Src::lu4(0, 8, 16, 24), pk.select(0));
            asm!(self).op_utof(dd, d);
            asm!(self).op_mul(dd, d, Src::lf(1.0 / 255.0), false);
            if gamma {
                self.emit_gamma(dest, false, false);
            }
            asm!(self).op_break();
        }

        asm!(self).op_case(Src::lu(Format::k_2_10_10_10 as u32));
        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_AS_10_10_10_10 as u32));
        asm!(self).op_ubfe(dd, Src::lu4(10, 10, 10, 2), Src::lu4(0, 10, 20, 30), pk.select(0));
        asm!(self).op_utof(dd, d);
        asm!(self).op_mul(
            dd,
            d,
            Src::lf4(1.0 / 1023.0, 1.0 / 1023.0, 1.0 / 1023.0, 1.0 / 3.0),
            false,
        );
        asm!(self).op_break();

        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_FLOAT as u32));
        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_FLOAT_AS_16_16_16_16 as u32));
        asm!(self).op_ubfe(dd, Src::lu4(10, 10, 10, 2), Src::lu4(0, 10, 20, 30), pk.select(0));
        self.emit_small_float_to_f32(dest, 0b0111, SmallFloat::F7e3, false);
        asm!(self).op_utof(Dest::r(dest, 0b1000), d);
        asm!(self).op_mul(Dest::r(dest, 0b1000), d, Src::lf(1.0 / 3.0), false);
        asm!(self).op_break();

        for (format, mask) in [(Format::k_16_16, 0b0011), (Format::k_16_16_16_16, 0b1111)] {
            asm!(self).op_case(Src::lu(format as u32));
            let md = Dest::r(dest, mask);
            asm!(self).op_ibfe(md, Src::lu(16), Src::lu4(0, 16, 0, 16), pk.swizzle(XXYY));
            asm!(self).op_itof(md, d);
            asm!(self).op_mul(md, d, Src::lf(32.0 / 32767.0), false);
            asm!(self).op_max(md, d, Src::lf(-32.0));
            if mask == 0b0011 {
                asm!(self).op_mov(Dest::r(dest, 0b1100), Src::lf4(0.0, 0.0, 0.0, 1.0), false);
            }
            asm!(self).op_break();
        }

        for (format, mask) in [(Format::k_16_16_FLOAT, 0b0011), (Format::k_16_16_16_16_FLOAT, 0b1111)] {
            asm!(self).op_case(Src::lu(format as u32));
            let md = Dest::r(dest, mask);
            asm!(self).op_ubfe(md, Src::lu(16), Src::lu4(0, 16, 0, 16), pk.swizzle(XXYY));
            asm!(self).op_f16tof32(md, d);
            if mask == 0b0011 {
                asm!(self).op_mov(Dest::r(dest, 0b1100), Src::lf4(0.0, 0.0, 0.0, 1.0), false);
            }
            asm!(self).op_break();
        }

        asm!(self).op_case(Src::lu(Format::k_32_FLOAT as u32));
        asm!(self).op_mov(Dest::r(dest, 0b0001), pk, false);
        asm!(self).op_mov(Dest::r(dest, 0b1110), Src::lf4(0.0, 0.0, 0.0, 1.0), false);
        asm!(self).op_break();

        asm!(self).op_case(Src::lu(Format::k_32_32_FLOAT as u32));
        asm!(self).op_mov(Dest::r(dest, 0b0011), pk, false);
        asm!(self).op_mov(Dest::r(dest, 0b1100), Src::lf4(0.0, 0.0, 0.0, 1.0), false);
        asm!(self).op_break();

        asm!(self).op_default();
        asm!(self).op_mov(dd, Src::lf4(0.0, 0.0, 0.0, 1.0), false);
        asm!(self).op_break();
        asm!(self).op_endswitch();
        self.pop_temp();
    }

    /// `result = src * src_factor (op) dst * dst_factor`, color and alpha
    /// separately, clamped like the source.
    fn rov_blend(&mut self, rt: u32, src: u32, dst: u32, result: u32) {
        let control = self.system_constant_scalar(SystemConstantIndex::EdramRtBlendFactorsOps, 4 * rt);
        let fields = self.push_temp(0);
        let src_factor = self.push_temp(0);
        let dst_factor = self.push_temp(0);
        let f = Src::r(fields, Src::XYZW);
        let (s, d) = (Src::r(src, Src::XYZW), Src::r(dst, Src::XYZW));
        let (sf, df) = (Src::r(src_factor, Src::XYZW), Src::r(dst_factor, Src::XYZW));

        for (mask, src_shift, op_shift, dest_shift) in [
            (
                0b0111,
                blend_control::COLOR_SRC_SHIFT,
                blend_control::COLOR_OP_SHIFT,
                blend_control::COLOR_DEST_SHIFT,
            ),
            (
                0b1000,
                blend_control::ALPHA_SRC_SHIFT,
                blend_control::ALPHA_OP_SHIFT,
                blend_control::ALPHA_DEST_SHIFT,
            ),
        ] {
            asm!(self).op_ubfe(
                Dest::r(fields, 0b0111),
                Src::lu4(5, 3, 5, 0),
                Src::lu4(src_shift, op_shift, dest_shift, 0),
                control,
            );
            self.rov_blend_factor(src_factor, mask, f.select(0), src, dst);
            self.rov_blend_factor(dst_factor, mask, f.select(2), src, dst);
            asm!(self).op_mul(Dest::r(src_factor, mask), s, sf, false);
            asm!(self).op_mul(Dest::r(dst_factor, mask), d, df, false);

            let rd = Dest::r(result, mask);
            asm!(self).op_switch(f.select(1));
            asm!(self).op_case(Src::lu(BlendOp::Subtract as u32));
            asm!(self).op_add(rd, sf, -df, false);
            asm!(self).op_break();
            // Min and max ignore the factors.
            asm!(self).op_case(Src::lu(BlendOp::Min as u32));
            asm!(self).op_min(rd, s, d);
            asm!(self).op_break();
            asm!(self).op_case(Src::lu(BlendOp::Max as u32));
            asm!(self).op_max(rd, s, d);
            asm!(self).op_break();
            asm!(self).op_case(Src::lu(BlendOp::RevSubtract as u32));
            asm!(self).op_add(rd, -sf, df, false);
            asm!(self).op_break();
            asm!(self).op_default();
            asm!(self).op_add(rd, sf, df, false);
            asm!(self).op_break();
            asm!(self).op_endswitch();
        }

        self.pop_temps(3);
        self.rov_clamp_color(rt, result);
    }

    /// One blend factor into the `mask` components of `dest`.
    fn rov_blend_factor(&mut self, dest: u32, mask: u32, factor: Src, src: u32, dst: u32) {
        let fd = Dest::r(dest, mask);
        let (s, d) = (Src::r(src, Src::XYZW), Src::r(dst, Src::XYZW));
        let constant = self.system_constant(SystemConstantIndex::EdramBlendConstant, 0, Src::XYZW);
        let one = Src::lf(1.0);

        asm!(self).op_switch(factor);
        for blend_factor in BlendFactor::ALL {
            asm!(self).op_case(Src::lu(blend_factor as u32));
            match blend_factor {
                BlendFactor::Zero => asm!(self).op_mov(fd, Src::lf(0.0), false),
                BlendFactor::One => asm!(self).op_mov(fd, one, false),
                BlendFactor::SrcColor => asm!(self).op_mov(fd, s, false),
                BlendFactor::OneMinusSrcColor => asm!(self).op_add(fd, one, -s, false),
                BlendFactor::SrcAlpha => asm!(self).op_mov(fd, s.select(3), false),
                BlendFactor::OneMinusSrcAlpha => asm!(self).op_add(fd, one, -s.select(3), false),
                BlendFactor::DstColor => asm!(self).op_mov(fd, d, false),
                BlendFactor::OneMinusDstColor => asm!(self).op_add(fd, one, -d, false),
                BlendFactor::DstAlpha => asm!(self).op_mov(fd, d.select(3), false),
                BlendFactor::OneMinusDstAlpha => asm!(self).op_add(fd, one, -d.select(3), false),
                BlendFactor::ConstantColor => asm!(self).op_mov(fd, constant, false),
                BlendFactor::OneMinusConstantColor => asm!(self).op_add(fd, one, -constant, false),
                BlendFactor::ConstantAlpha => asm!(self).op_mov(fd, constant.select_from_swizzled(3), false),
                BlendFactor::OneMinusConstantAlpha => {
                    asm!(self).op_add(fd, one, -constant.select_from_swizzled(3), false)
                }
                BlendFactor::SrcAlphaSaturate => {
                    if mask == 0b1000 {
                        asm!(self).op_mov(fd, one, false);
                    } else {
                        asm!(self).op_add(fd, one, -d.select(3), false);
                        asm!(self).op_min(fd, Src::r(dest, Src::XYZW), s.select(3));
                    }
                }
            }
            asm!(self).op_break();
        }
        asm!(self).op_default();
        asm!(self).op_mov(fd, Src::lf(0.0), false);
        asm!(self).op_break();
        asm!(self).op_endswitch();
    }

    /// Packs float `color` in the format of `rt` into `packed.xy`,
    /// clobbering `color`.
    fn rov_pack_color(&mut self, rt: u32, color: u32, packed: u32) {
        let (c, cd) = (Src::r(color, Src::XYZW), Dest::r(color, 0b1111));
        let format = self.push_temp(0);
        let format_flags = self.system_constant_scalar(SystemConstantIndex::EdramRtFormatFlags, 4 * rt);
        asm!(self).op_and(Dest::r(format, 0b0001), format_flags, Src::lu(rt_format_flags::FORMAT_MASK));
        asm!(self).op_mov(Dest::r(packed, 0b0011), Src::lu(0), false);
        asm!(self).op_switch(Src::r(format, Src::XXXX));

        for gamma in [false, true] {
            let format = if gamma { Format::k_8_8_8_8_GAMMA } else { Format::k_8_8_8_8 };
            asm!(self).op_case(Src::lu(format as u32));
            if gamma {
                self.emit_gamma(color, true, false);
            }
            asm!(self).op_mov(cd, c, true);
            asm!(self).op_mul(cd, c, Src::lf(255.0), false);
            asm!(self).op_add(cd, c, Src::lf(0.5), false);
            asm!(self).op_ftou(cd, c);
            self.emit_insert_fields(packed, 0, color, &[(0, 8, 0), (1, 8, 8), (2, 8, 16), (3, 8, 24)]);
            asm!(self).op_break();
        }

        const FIELDS_10_10_10_2: [(u32, u32, u32); 4] = [(0, 10, 0), (1, 10, 10), (2, 10, 20), (3, 2, 30)];
        asm!(self).op_case(Src::lu(Format::k_2_10_10_10 as u32));
        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_AS_10_10_10_10 as u32));
        asm!(self).op_mov(cd, c, true);
        asm!(self).op_mul(cd, c, Src::lf4(1023.0, 1023.0, 1023.0, 3.0), false);
        asm!(self).op_add(cd, c, Src::lf(0.5), false);
        asm!(self).op_ftou(cd, c);
        self.emit_insert_fields(packed, 0, color, &FIELDS_10_10_10_2);
        asm!(self).op_break();

        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_FLOAT as u32));
        asm!(self).op_case(Src::lu(Format::k_2_10_10_10_FLOAT_AS_16_16_16_16 as u32));
        self.emit_f32_to_small_float(color, 0b0111, SmallFloat::F7e3, Rounding::NearestEven, false);
        let alpha = Dest::r(color, 0b1000);
        asm!(self).op_mov(alpha, c, true);
        asm!(self).op_mul(alpha, c, Src::lf(3.0), false);
        asm!(self).op_add(alpha, c, Src::lf(0.5), false);
        asm!(self).op_ftou(alpha, c);
        self.emit_insert_fields(packed, 0, color, &FIELDS_10_10_10_2);
        asm!(self).op_break();

        for format in [Format::k_16_16, Format::k_16_16_16_16] {
            asm!(self).op_case(Src::lu(format as u32));
            asm!(self).op_max(cd, c, Src::lf(-32.0));
            asm!(self).op_min(cd, c, Src::lf(32.0));
            asm!(self).op_mul(cd, c, Src::lf(32767.0 / 32.0), false);
            asm!(self).op_round_ne(cd, c);
            asm!(self).op_ftoi(cd, c);
            self.emit_insert_fields(packed, 0, color, &[(0, 16, 0), (1, 16, 16)]);
            if format == Format::k_16_16_16_16 {
                self.emit_insert_fields(packed, 1, color, &[(2, 16, 0), (3, 16, 16)]);
            }
            asm!(self).op_break();
        }

        for format in [Format::k_16_16_FLOAT, Format::k_16_16_16_16_FLOAT] {
            asm!(self).op_case(Src::lu(format as u32));
            asm!(self).op_max(cd, c, Src::lf(-65504.0));
            asm!(self).op_min(cd, c, Src::lf(65504.0));
            asm!(self).op_f32tof16(cd, c);
            self.emit_insert_fields(packed, 0, color, &[(0, 16, 0), (1, 16, 16)]);
            if format == Format::k_16_16_16_16_FLOAT {
                self.emit_insert_fields(packed, 1, color, &[(2, 16, 0), (3, 16, 16)]);
            }
            asm!(self).op_break();
        }

        asm!(self).op_case(Src::lu(Format::k_32_FLOAT as u32));
        asm!(self).op_mov(Dest::r(packed, 0b0001), c, false);
        asm!(self).op_break();

        asm!(self).op_case(Src::lu(Format::k_32_32_FLOAT as u32));
        asm!(self).op_mov(Dest::r(packed, 0b0011), c, false);
        asm!(self).op_break();

        asm!(self).op_endswitch();
        self.pop_temp();
    }

    /// Builds `packed.component` from bit fields of `src`, each entry being
    /// the source component, the width and the offset.
    fn emit_insert_fields(&mut self, packed: u32, component: u32, src: u32, fields: &[(u32, u32, u32)]) {
        let pd = Dest::r(packed, 1 << component);
        let p = Src::r(packed, Src::XYZW).select(component);
        asm!(self).op_mov(pd, Src::lu(0), false);
        for &(from, width, offset) in fields {
            asm!(self).op_bfi(pd, Src::lu(width), Src::lu(offset), Src::r(src, Src::XYZW).select(from), p);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xenos_dxbc::test_utils::{decode_container_program, Interpreter, Outcome};

    use super::*;
    use crate::codec;
    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{CbufferRegister, ShaderInfo, ShaderStage, Translation};
    use crate::ucode::{
        ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction, Predication, ResultStorage,
        VectorAluInstruction, VectorOpcode,
    };
    use crate::xenos::{compare, stencil_func_ops};

    const ALWAYS: Flags = Flags::ALPHA_PASS_IF_LESS
        .union(Flags::ALPHA_PASS_IF_EQUAL)
        .union(Flags::ALPHA_PASS_IF_GREATER);
    const DEPTH_ALWAYS: Flags = Flags::ROV_DEPTH_PASS_IF_LESS
        .union(Flags::ROV_DEPTH_PASS_IF_EQUAL)
        .union(Flags::ROV_DEPTH_PASS_IF_GREATER);
    const PITCH: u32 = 2 * EDRAM_TILE_DWORDS;

    struct Shader {
        translation: Translation,
        rov_params: u32,
    }

    /// Copies interpolator 0 to color 0, and its x to depth if asked.
    fn translate(config: TranslatorConfig, depth: bool) -> Shader {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let copy = |storage, mask| {
            ParsedInstruction::VectorAlu(VectorAluInstruction {
                opcode: VectorOpcode::Max,
                predication: Predication::NONE,
                result: InstructionResult::new(storage, 0, mask),
                operands: vec![InstructionOperand::register(0), InstructionOperand::register(0)],
            })
        };
        let mut instructions = vec![ParsedInstruction::Exec(exec), copy(ResultStorage::Color, 0b1111)];
        if depth {
            instructions.push(copy(ResultStorage::Depth, 0b0001));
        }
        instructions.push(ParsedInstruction::ExecEnd(exec));

        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        info.writes_color_targets = 1;
        info.writes_depth = depth;
        let modification = Modification::from(Modification::default_pixel().pixel().with_interpolator_mask(1));
        let mut translator = Translator::new(config).unwrap();
        let translation = translator.translate(&instructions, &info, modification).unwrap();
        Shader {
            translation,
            rov_params: translator.sys.rov_params,
        }
    }

    fn rov() -> TranslatorConfig {
        TranslatorConfig {
            edram_rov_used: true,
            ..Default::default()
        }
    }

    fn set(interpreter: &mut Interpreter, index: SystemConstantIndex, offset: u32, value: u32) {
        let (vector, component) = index.location(offset);
        interpreter.set_constant(CbufferRegister::SystemConstants as u32, vector, component, value);
    }

    /// Runs a covered pixel at `position` with an 8888 target at dword 0, no
    /// blending and the alpha test passing.
    fn run(
        shader: &Shader,
        position: [f32; 4],
        color: [f32; 4],
        setup: impl FnOnce(&mut Interpreter),
    ) -> (Interpreter, Outcome) {
        let program = decode_container_program(&shader.translation.dxbc);
        let mut interpreter = Interpreter::new();
        interpreter.inputs = vec![color.map(f32::to_bits), position.map(f32::to_bits), [u32::MAX; 4]];
        interpreter.input_coverage = 1;
        set(&mut interpreter, SystemConstantIndex::Flags, 0, ALWAYS.bits());
        set(&mut interpreter, SystemConstantIndex::Edram32bppTilePitchDwordsScaled, 0, PITCH);
        set(&mut interpreter, SystemConstantIndex::ColorExpBias, 0, 1.0f32.to_bits());
        set(
            &mut interpreter,
            SystemConstantIndex::EdramRtFormatFlags,
            0,
            rt_format_flags::for_format(Format::k_8_8_8_8),
        );
        for (i, value) in [0.0f32, 0.0, 1.0, 1.0].into_iter().enumerate() {
            set(&mut interpreter, SystemConstantIndex::EdramRtClamp, 4 * i as u32, value.to_bits());
        }
        set(&mut interpreter, SystemConstantIndex::EdramRtBlendFactorsOps, 0, blend_control::DISABLED);
        setup(&mut interpreter);
        let outcome = interpreter.run(&program);
        (interpreter, outcome)
    }

    fn edram(state: &Interpreter, dword: u32) -> u32 {
        state
            .uavs
            .get(&uav::EDRAM)
            .and_then(|buffer| buffer.get(dword as usize))
            .copied()
            .unwrap_or(0)
    }

    fn with_edram(interpreter: &mut Interpreter, dword: u32, value: u32) {
        let buffer = interpreter.uavs.entry(uav::EDRAM).or_default();
        if buffer.len() <= dword as usize {
            buffer.resize(dword as usize + 1, 0);
        }
        buffer[dword as usize] = value;
    }

    #[test]
    fn coverage_is_remapped_to_guest_sample_positions() {
        for (msaa_2x_supported, log2, host, guest) in [
            (true, [0, 0], 0b0001, 0b0001),
            (true, [0, 1], 0b0001, 0b0100),
            (true, [0, 1], 0b0010, 0b0001),
            (false, [0, 1], 0b0100, 0b0100),
            (false, [0, 1], 0b0010, 0b0001),
            (true, [1, 1], 0b1010, 0b1010),
        ] {
            let config = TranslatorConfig {
                msaa_2x_supported,
                ..rov()
            };
            let shader = translate(config, false);
            let (state, _) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0; 4], |i| {
                i.input_coverage = host;
                set(i, SystemConstantIndex::SampleCountLog2, 0, log2[0]);
                set(i, SystemConstantIndex::SampleCountLog2, 4, log2[1]);
            });
            let params = state.temps[shader.rov_params as usize];
            assert_eq!(params[0] & 0b1111, guest, "{msaa_2x_supported} {log2:?} {host:#b}");
        }
    }

    #[test]
    fn edram_addresses_follow_the_tile_layout() {
        let shader = translate(rov(), false);
        let params = |position: [f32; 4], log2: u32, depth_base: u32| {
            let (state, _) = run(&shader, position, [1.0; 4], |i| {
                set(i, SystemConstantIndex::SampleCountLog2, 0, log2);
                set(i, SystemConstantIndex::SampleCountLog2, 4, log2);
                set(i, SystemConstantIndex::EdramDepthBaseDwordsScaled, 0, depth_base);
            });
            state.temps[shader.rov_params as usize]
        };
        // Tile (1, 1), sample (1, 1) within it.
        let p = params([81.5, 17.5, 0.0, 1.0], 0, 0);
        assert_eq!(p[2], PITCH + EDRAM_TILE_DWORDS + 80 + 1);
        assert_eq!(p[1], PITCH + EDRAM_TILE_DWORDS + 80 + 41);
        // 4x: tile (1, 1), sample (2, 2) within it.
        let p = params([41.5, 9.5, 0.0, 1.0], 1, 1000);
        assert_eq!(p[2], PITCH + EDRAM_TILE_DWORDS + 160 + 2);
        assert_eq!(p[1], PITCH + EDRAM_TILE_DWORDS + 160 + 42 + 1000);
        // Right half of the tile, and wrapping around the end.
        let p = params([60.5, 0.5, 0.0, 1.0], 0, EDRAM_DWORDS - 10);
        assert_eq!(p[2], 60);
        assert_eq!(p[1], 20 - 10);
    }

    #[test]
    fn color_is_packed_to_the_covered_samples() {
        let shader = translate(rov(), false);
        let (state, outcome) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0, 0.5, 0.0, 1.0], |i| {
            i.input_coverage = 0b0101;
            set(i, SystemConstantIndex::SampleCountLog2, 0, 1);
            set(i, SystemConstantIndex::SampleCountLog2, 4, 1);
        });
        assert_eq!(outcome, Outcome::Returned);
        assert_eq!(edram(&state, 0), 0xFF00_80FF);
        assert_eq!(edram(&state, 1), 0);
        assert_eq!(edram(&state, 80), 0xFF00_80FF);
        assert_eq!(edram(&state, 81), 0);
    }

    #[test]
    fn blending_mixes_with_the_old_value() {
        let shader = translate(rov(), false);
        let control = blend_control::pack(
            BlendFactor::SrcAlpha,
            BlendOp::Add,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::One,
            BlendOp::Add,
            BlendFactor::Zero,
        );
        let (state, _) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0, 0.0, 0.0, 0.5], |i| {
            set(i, SystemConstantIndex::EdramRtBlendFactorsOps, 0, control);
            with_edram(i, 0, 0x0066_0000);
        });
        // Red 0.5, blue 0.4 * 0.5, alpha 0.5.
        assert_eq!(edram(&state, 0), 0x8033_0080);
    }

    #[test]
    fn keep_mask_preserves_old_bits() {
        let shader = translate(rov(), false);
        let (state, _) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0; 4], |i| {
            set(i, SystemConstantIndex::EdramRtKeepMask, 0, 0xFF00_0000);
            with_edram(i, 0, 0x1122_3344);
        });
        assert_eq!(edram(&state, 0), 0x11FF_FFFF);

        // Nothing is written with every bit kept.
        let (state, _) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0; 4], |i| {
            set(i, SystemConstantIndex::EdramRtKeepMask, 0, u32::MAX);
            with_edram(i, 0, 0x1122_3344);
        });
        assert_eq!(edram(&state, 0), 0x1122_3344);
    }

    #[test]
    fn early_depth_test_drops_failing_pixels() {
        let shader = translate(rov(), false);
        let flags = ALWAYS | Flags::ROV_DEPTH_STENCIL | Flags::ROV_DEPTH_PASS_IF_LESS | Flags::ROV_DEPTH_WRITE;
        let depth = |old: u32| {
            run(&shader, [0.5, 0.5, 0.5, 1.0], [1.0; 4], |i| {
                set(i, SystemConstantIndex::Flags, 0, flags.bits());
                with_edram(i, 40, old);
            })
        };
        // 0.5 as unorm24 rounds to 0x800000.
        let (state, outcome) = depth(0xFFFF_FF12);
        assert_eq!(outcome, Outcome::Returned);
        assert_eq!(edram(&state, 40), 0x8000_0012);
        assert_eq!(edram(&state, 0), u32::MAX);

        let (state, _) = depth(0x1000_0012);
        assert_eq!(edram(&state, 40), 0x1000_0012);
        assert_eq!(edram(&state, 0), 0);
        assert_eq!(state.temps[shader.rov_params as usize][0] & 0b1111, 0);
    }

    #[test]
    fn float24_depth_uses_the_rounding_of_the_modification() {
        let shader = translate(rov(), false);
        let flags = ALWAYS | Flags::ROV_DEPTH_STENCIL | DEPTH_ALWAYS | Flags::ROV_DEPTH_WRITE | Flags::ROV_DEPTH_FLOAT24;
        let (state, _) = run(&shader, [0.5, 0.5, 0.3, 1.0], [1.0; 4], |i| {
            set(i, SystemConstantIndex::Flags, 0, flags.bits());
        });
        let expected = codec::f32_to_20e4(0.3, Rounding::TowardZero, false) << 8;
        assert_eq!(edram(&state, 40), expected);
    }

    #[test]
    fn late_depth_test_uses_the_shader_depth() {
        let shader = translate(rov(), true);
        let flags = ALWAYS | Flags::ROV_DEPTH_STENCIL | Flags::ROV_DEPTH_PASS_IF_LESS | Flags::ROV_DEPTH_WRITE;
        let (state, _) = run(&shader, [0.5, 0.5, 0.9, 1.0], [0.25, 1.0, 1.0, 1.0], |i| {
            set(i, SystemConstantIndex::Flags, 0, flags.bits());
            with_edram(i, 40, 0xFFFF_FF00);
        });
        // 0.25 as unorm24 rounds to 0x400000.
        assert_eq!(edram(&state, 40), 0x4000_0000);
        assert_eq!(edram(&state, 0), 0xFFFF_FF40);
    }

    #[test]
    fn stencil_operations_update_the_masked_bits() {
        let shader = translate(rov(), false);
        let flags = ALWAYS | Flags::ROV_DEPTH_STENCIL | DEPTH_ALWAYS | Flags::ROV_STENCIL_TEST;
        let all = compare::LESS | compare::EQUAL | compare::GREATER;
        let stencil = |compare: u32, op: StencilOp, write_mask: u32, old: u32| {
            let func_ops = stencil_func_ops::pack(compare, StencilOp::Zero, op, StencilOp::Keep);
            let (state, _) = run(&shader, [0.5, 0.5, 0.5, 1.0], [1.0; 4], |i| {
                set(i, SystemConstantIndex::Flags, 0, flags.bits());
                set(i, SystemConstantIndex::EdramStencil, 0, 5);
                set(i, SystemConstantIndex::EdramStencil, 4, 0xFF);
                set(i, SystemConstantIndex::EdramStencil, 8, write_mask);
                set(i, SystemConstantIndex::EdramStencil, 12, func_ops);
                with_edram(i, 40, 0x1234_5600 | old);
            });
            (edram(&state, 40), edram(&state, 0))
        };
        for (op, old, new) in [
            (StencilOp::Keep, 0x42, 0x42),
            (StencilOp::Replace, 0x00, 0x05),
            (StencilOp::IncrementClamp, 0xFF, 0xFF),
            (StencilOp::IncrementWrap, 0xFF, 0x00),
            (StencilOp::DecrementClamp, 0x00, 0x00),
            (StencilOp::DecrementWrap, 0x00, 0xFF),
            (StencilOp::Invert, 0x0F, 0xF0),
        ] {
            let (depth_stencil, color) = stencil(all, op, 0xFF, old);
            assert_eq!(depth_stencil, 0x1234_5600 | new, "{op:?}");
            assert_eq!(color, u32::MAX, "{op:?}");
        }
        // Only the write mask changes.
        assert_eq!(stencil(all, StencilOp::Replace, 0x0F, 0xA0).0, 0x1234_56A5);
        // A failing test applies the fail operation and drops the pixel.
        assert_eq!(stencil(0, StencilOp::Replace, 0xFF, 0x77), (0x1234_5600, 0));
        // 5 < 6 passes, 5 < 5 doesn't.
        assert_eq!(stencil(compare::LESS, StencilOp::Replace, 0xFF, 0x06).0, 0x1234_5605);
        assert_eq!(stencil(compare::LESS, StencilOp::Replace, 0xFF, 0x05).1, 0);
    }

    #[test]
    fn alpha_to_coverage_drops_samples_before_writing() {
        let shader = translate(rov(), false);
        let (state, outcome) = run(&shader, [0.5, 0.5, 0.0, 1.0], [1.0, 1.0, 1.0, 0.0], |i| {
            set(i, SystemConstantIndex::Flags, 0, (ALWAYS | Flags::ALPHA_TO_COVERAGE).bits());
        });
        assert_eq!(outcome, Outcome::Returned);
        assert_eq!(edram(&state, 0), 0);
    }
}
