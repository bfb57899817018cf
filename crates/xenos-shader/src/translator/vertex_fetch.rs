//! Vertex fetches from shared memory, and the byte swap shared with memory
//! export.

use xenos_dxbc::{Dest, Index, Src};

use super::{srv, uav, Translator};
use crate::error::DiagnosticKind;
use crate::system_constants::Flags;
use crate::ucode::{VertexFetchAttributes, VertexFetchInstruction};
use crate::xenos::{Endian, SignedRepeatingFractionMode, SurfaceFormat};

/// Bias added to the vertex index before flooring, so an index computed as
/// `n * (1 / d) * d` lands on `n` rather than `n - 1`.
const INDEX_FLOOR_BIAS: f32 = 1.0 / 4_194_304.0;

/// How the loaded dwords become components.
enum Unpack {
    /// `(width, offset)` bitfields, with the dword each component is in.
    Bitfields {
        widths: [u32; 4],
        offsets: [u32; 4],
        words: u32,
        half_float: bool,
    },
    /// One integer per dword.
    Integers,
    /// One float per dword.
    Floats,
}

fn vertex_format_unpack(format: SurfaceFormat) -> Option<Unpack> {
    const XXYY: u32 = 0b01_01_00_00;
    let packed = |layout: &[(u32, u32)]| {
        let mut widths = [0; 4];
        let mut offsets = [0; 4];
        for (i, (width, offset)) in layout.iter().enumerate() {
            widths[i] = *width;
            offsets[i] = *offset;
        }
        Unpack::Bitfields {
            widths,
            offsets,
            words: Src::XXXX,
            half_float: false,
        }
    };
    Some(match format {
        SurfaceFormat::k_8_8_8_8
        | SurfaceFormat::k_2_10_10_10
        | SurfaceFormat::k_10_11_11
        | SurfaceFormat::k_11_11_10
        | SurfaceFormat::k_16_16 => packed(format.packed_layout()?),
        SurfaceFormat::k_16_16_16_16 => Unpack::Bitfields {
            widths: [16; 4],
            offsets: [0, 16, 0, 16],
            words: XXYY,
            half_float: false,
        },
        SurfaceFormat::k_16_16_FLOAT => Unpack::Bitfields {
            widths: [16, 16, 0, 0],
            offsets: [0, 16, 0, 0],
            words: Src::XXXX,
            half_float: true,
        },
        SurfaceFormat::k_16_16_16_16_FLOAT => Unpack::Bitfields {
            widths: [16; 4],
            offsets: [0, 16, 0, 16],
            words: XXYY,
            half_float: true,
        },
        SurfaceFormat::k_32 | SurfaceFormat::k_32_32 | SurfaceFormat::k_32_32_32_32 => Unpack::Integers,
        SurfaceFormat::k_32_FLOAT
        | SurfaceFormat::k_32_32_FLOAT
        | SurfaceFormat::k_32_32_32_FLOAT
        | SurfaceFormat::k_32_32_32_32_FLOAT => Unpack::Floats,
        _ => return None,
    })
}

impl Translator {
    /// Swaps the bytes of the `mask` components of temp `value` per a
    /// runtime [`Endian`].
    ///
    /// 8-in-32 is 8-in-16 followed by 16-in-32. `endian` must not be in
    /// `value`.
    pub(super) fn emit_endian_swap(&mut self, value: u32, mask: u32, endian: Src) {
        let temp = self.push_temp(0);
        let value_dest = Dest::r(value, mask);
        let value_src = Src::r(value, Src::XYZW);
        let temp_src = Src::r(temp, Src::XYZW);

        for (first, second) in [
            (Endian::Swap8In16, Endian::Swap8In32),
            (Endian::Swap8In32, Endian::Swap16In32),
        ] {
            asm!(self).op_ieq(Dest::r(temp, 0b0001), endian, Src::lu(first as u32));
            asm!(self).op_ieq(Dest::r(temp, 0b0010), endian, Src::lu(second as u32));
            asm!(self).op_or(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY));
            asm!(self).op_if(true, Src::r(temp, Src::XXXX));
            if first == Endian::Swap8In16 {
                // ABCD -> BADC.
                asm!(self).op_and(Dest::r(temp, mask), value_src, Src::lu(0x00FF_00FF));
                asm!(self).op_ushr(value_dest, value_src, Src::lu(8));
                asm!(self).op_and(value_dest, value_src, Src::lu(0x00FF_00FF));
                asm!(self).op_umad(value_dest, temp_src, Src::lu(256), value_src);
            } else {
                // ABCD -> CDAB.
                asm!(self).op_ushr(Dest::r(temp, mask), value_src, Src::lu(16));
                asm!(self).op_bfi(value_dest, Src::lu(16), Src::lu(16), value_src, temp_src);
            }
            asm!(self).op_endif();
        }

        self.pop_temp();
    }

    /// Reads a dword of shared memory through the SRV, or through the UAV
    /// when memory export may have written it.
    ///
    /// `flag_temp` is clobbered and may be `dest`'s register.
    pub(super) fn emit_shared_memory_load(&mut self, dest: Dest, byte_address: Src, flag_temp: Dest, flag_src: Src) {
        self.shared_memory_srv_used = true;
        self.shared_memory_uav_used = true;
        let flags = self.flags();
        asm!(self).op_and(flag_temp, flags, Src::lu(Flags::SHARED_MEMORY_IS_UAV.bits()));
        asm!(self).op_if(true, flag_src);
        asm!(self).op_ld_raw(
            dest,
            byte_address,
            Src::u(uav::SHARED_MEMORY, Index::imm(uav::SHARED_MEMORY), Src::XYZW),
        );
        asm!(self).op_else();
        asm!(self).op_ld_raw(
            dest,
            byte_address,
            Src::t(srv::SHARED_MEMORY, Index::imm(srv::SHARED_MEMORY), Src::XYZW),
        );
        asm!(self).op_endif();
    }

    pub(super) fn process_vertex_fetch(&mut self, instr: &VertexFetchInstruction) {
        let attributes = &instr.attributes;
        let used = instr.result.used_result_components();
        if instr.is_mini_fetch && used == 0 {
            return;
        }
        self.update_instruction_predication(instr.predication);

        let address = self.sys.grad_v_vfetch_address;
        if !instr.is_mini_fetch {
            let index = self.load_operand(&instr.operand, 0b0001);
            let address_w = Dest::r(address, 0b1000);
            let address_w_src = Src::r(address, Src::WWWW);
            if attributes.is_index_rounded {
                asm!(self).op_round_ne(address_w, index.src.select(0));
            } else {
                asm!(self).op_add(address_w, index.src.select(0), Src::lf(INDEX_FLOOR_BIAS), false);
                asm!(self).op_round_ni(address_w, address_w_src);
            }
            self.release(index);
            asm!(self).op_ftoi(address_w, address_w_src);
            let base = self.vertex_fetch_constant_dword(instr.fetch_constant, 0);
            let temp = self.push_temp(0);
            asm!(self).op_ushr(Dest::r(temp, 0b0001), base, Src::lu(2));
            asm!(self).op_imad(
                address_w,
                address_w_src,
                Src::lu(attributes.stride),
                Src::r(temp, Src::XXXX),
            );
            self.pop_temp();
        }
        if used == 0 {
            return;
        }

        let Some(unpack) = vertex_format_unpack(attributes.format) else {
            self.report(
                DiagnosticKind::SpecificationViolation,
                format!("{:?} is not a vertex format", attributes.format),
            );
            self.store_result(&instr.result, Src::lf(0.0), false);
            return;
        };
        let component_count = attributes.format.component_count();
        let format_mask = (1u32 << component_count) - 1;
        let needed = used & format_mask;

        // Dwords to load, always starting from the first.
        let word_count = match unpack {
            Unpack::Bitfields { words, .. } => {
                (0..4)
                    .filter(|i| needed & (1 << i) != 0)
                    .map(|i| ((words >> (i * 2)) & 3) + 1)
                    .max()
                    .unwrap_or(0)
            }
            Unpack::Integers | Unpack::Floats => 32 - needed.leading_zeros(),
        };

        let data = self.push_temp(0);
        let data_src = Src::r(data, Src::XYZW);
        if word_count != 0 {
            let word_mask = (1 << word_count) - 1;
            let scratch = self.push_temp(0);
            asm!(self).op_iadd(
                Dest::r(scratch, 0b0001),
                Src::r(address, Src::WWWW),
                Src::li(attributes.offset),
            );
            asm!(self).op_ishl(Dest::r(scratch, 0b0001), Src::r(scratch, Src::XXXX), Src::lu(2));
            self.emit_shared_memory_load(
                Dest::r(data, word_mask),
                Src::r(scratch, Src::XXXX),
                Dest::r(scratch, 0b0010),
                Src::r(scratch, Src::YYYY),
            );
            let endian_dword = self.vertex_fetch_constant_dword(instr.fetch_constant, 1);
            asm!(self).op_and(
                Dest::r(scratch, 0b0100),
                endian_dword,
                Src::lu(crate::xenos::fetch::VERTEX_ENDIAN_MASK),
            );
            self.emit_endian_swap(data, word_mask, Src::r(scratch, Src::ZZZZ));
            self.pop_temp();
        }

        if needed != 0 {
            let dest = Dest::r(data, needed);
            match unpack {
                Unpack::Bitfields {
                    widths,
                    offsets,
                    words,
                    half_float,
                } => {
                    let [w0, w1, w2, w3] = widths;
                    let [o0, o1, o2, o3] = offsets;
                    let signed = attributes.is_signed && !half_float;
                    if signed {
                        asm!(self).op_ibfe(dest, Src::lu4(w0, w1, w2, w3), Src::lu4(o0, o1, o2, o3), data_src.swizzle(words));
                    } else {
                        asm!(self).op_ubfe(dest, Src::lu4(w0, w1, w2, w3), Src::lu4(o0, o1, o2, o3), data_src.swizzle(words));
                    }
                    if half_float {
                        asm!(self).op_f16tof32(dest, data_src);
                    } else {
                        self.emit_integer_to_float(data, needed, widths, attributes);
                    }
                }
                Unpack::Integers => self.emit_integer_to_float(data, needed, [32; 4], attributes),
                Unpack::Floats => {}
            }
        }

        // Missing components read as 0, 0, 0, 1.
        let missing = used & !format_mask;
        if missing & 0b0111 != 0 {
            asm!(self).op_mov(Dest::r(data, missing & 0b0111), Src::lf(0.0), false);
        }
        if missing & 0b1000 != 0 {
            asm!(self).op_mov(Dest::r(data, 0b1000), Src::lf(1.0), false);
        }

        if attributes.exp_adjust != 0 && needed != 0 {
            let scale = 2.0f32.powi(attributes.exp_adjust);
            asm!(self).op_mul(Dest::r(data, needed), data_src, Src::lf(scale), false);
        }

        self.store_result(&instr.result, data_src, false);
        self.pop_temp();
    }

    /// Converts extracted integers of the given widths to floats, normalizing
    /// unless the fetch is an integer one.
    fn emit_integer_to_float(&mut self, data: u32, mask: u32, widths: [u32; 4], attributes: &VertexFetchAttributes) {
        let is_signed = attributes.is_signed;
        let dest = Dest::r(data, mask);
        let src = Src::r(data, Src::XYZW);
        if is_signed {
            asm!(self).op_itof(dest, src);
        } else {
            asm!(self).op_utof(dest, src);
        }
        if attributes.is_integer {
            return;
        }
        let scale = |f: &dyn Fn(u32) -> f32| {
            let [x, y, z, w] = widths.map(|width| if width == 0 { 0.0 } else { f(width) });
            Src::lf4(x, y, z, w)
        };
        let max_unsigned = |width: u32| ((1u64 << width) - 1) as f32;
        if !is_signed {
            asm!(self).op_mul(dest, src, scale(&|width| 1.0 / max_unsigned(width)), false);
            return;
        }
        match attributes.signed_rf_mode {
            SignedRepeatingFractionMode::ClampNegativeOne => {
                // -128 and -127 are both -1 for 8 bits.
                let max_signed = |width: u32| ((1u64 << (width - 1)) - 1) as f32;
                asm!(self).op_mul(dest, src, scale(&|width| 1.0 / max_signed(width)), false);
                asm!(self).op_max(dest, src, Src::lf(-1.0));
            }
            SignedRepeatingFractionMode::NoZero => {
                asm!(self).op_mad(
                    dest,
                    src,
                    scale(&|width| 2.0 / max_unsigned(width)),
                    scale(&|width| 1.0 / max_unsigned(width)),
                    false,
                );
            }
        }
    }
}
