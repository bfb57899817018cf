//! Memory export.
//!
//! eA and eM writes land in temps while the guest code runs, and the whole
//! export is stored to shared memory once, after the main loop, so only the
//! last value written to each register matters. Elements are converted to
//! the format in eA.z here, then written with `store_raw`, or with a pair of
//! atomics for elements smaller than a dword.

use tracing::trace;
use xenos_dxbc::{Dest, Index, Src};

use super::{uav, Translator, MEMEXPORT_ALLOCS};
use crate::system_constants::Flags;
use crate::xenos::{memexport, Endian128, SurfaceFormat};

const ZYXW: u32 = 0b11_00_01_10;
const YXWZ: u32 = 0b10_11_00_01;
const WZYX: u32 = 0b00_01_10_11;
/// y and w into x and y.
const YWWW: u32 = 0b11_11_11_01;
/// x and z into x and y.
const XZZZ: u32 = 0b10_10_10_00;

/// How eM values are converted before being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packing {
    /// Fixed point components packed into x as `(width, offset)`.
    Fixed(&'static [(u32, u32)]),
    /// Four 16-bit fixed point components in xy.
    Fixed16x4,
    /// 1, 2 or 4 halves packed into x or xy.
    Half(u32),
    /// Stored as is.
    Float,
}

/// `None` for formats that can't be exported.
fn export_packing(format: SurfaceFormat) -> Option<Packing> {
    match format {
        SurfaceFormat::k_16_16_16_16 => Some(Packing::Fixed16x4),
        SurfaceFormat::k_16_FLOAT => Some(Packing::Half(1)),
        SurfaceFormat::k_16_16_FLOAT => Some(Packing::Half(2)),
        SurfaceFormat::k_16_16_16_16_FLOAT => Some(Packing::Half(4)),
        SurfaceFormat::k_32_FLOAT | SurfaceFormat::k_32_32_FLOAT | SurfaceFormat::k_32_32_32_32_FLOAT => {
            Some(Packing::Float)
        }
        _ => format.packed_layout().map(Packing::Fixed),
    }
}

impl Translator {
    pub(super) fn export_to_memory(&mut self) {
        let Some(written) = self.sys.memexport_written else {
            return;
        };
        let allocs: Vec<(u32, u32, Vec<(u32, u32)>)> = (0..MEMEXPORT_ALLOCS)
            .filter_map(|alloc| {
                let address = self.sys.memexport_address[alloc]?;
                let data: Vec<(u32, u32)> = self.sys.memexport_data[alloc]
                    .iter()
                    .enumerate()
                    .filter_map(|(index, register)| register.map(|register| (index as u32, register)))
                    .collect();
                (!data.is_empty()).then_some((alloc as u32, address, data))
            })
            .collect();
        if allocs.is_empty() {
            return;
        }
        trace!(allocs = allocs.len(), "exporting to memory");
        self.shared_memory_uav_used = true;

        let control = self.push_temp(0);
        let c = Src::r(control, Src::XYZW);
        let flags = self.flags();
        asm!(self).op_and(Dest::r(control, 0b0001), flags, Src::lu(Flags::SHARED_MEMORY_IS_UAV.bits()));
        asm!(self).op_if(true, c.select(0));
        let one_pixel_check = self.is_pixel_shader() && self.emit_export_pixel_check(control);

        for (alloc, address, data) in &allocs {
            self.emit_export_alloc(*alloc, *address, data, control, written);
        }

        if one_pixel_check {
            asm!(self).op_endif();
        }
        asm!(self).op_endif();
        self.pop_temp();
    }

    /// With resolution scaling, only one host pixel of each guest pixel
    /// exports, the one nearest to the center. Opens an `if` and returns
    /// true if scaling is enabled.
    fn emit_export_pixel_check(&mut self, control: u32) -> bool {
        let (scale_x, scale_y) = self.config.draw_resolution_scale();
        let scaled_axes = u32::from(scale_x > 1) | u32::from(scale_y > 1) << 1;
        if scaled_axes == 0 {
            return false;
        }
        let c = Src::r(control, Src::XYZW);
        let dest = Dest::r(control, scaled_axes);
        self.in_position_used |= scaled_axes;
        asm!(self).op_ftou(dest, Src::v(Index::imm(self.io.position), Src::XYZW));
        asm!(self).op_udiv(Dest::null(), dest, c, Src::lu4(scale_x, scale_y, 1, 1));
        asm!(self).op_ieq(dest, c, Src::lu4(scale_x >> 1, scale_y >> 1, 0, 0));
        if scaled_axes == 0b11 {
            asm!(self).op_and(Dest::r(control, 0b0001), c.select(0), c.select(1));
        }
        asm!(self).op_if(true, c.select(scaled_axes.trailing_zeros()));
        true
    }

    fn emit_export_alloc(&mut self, alloc: u32, address: u32, data: &[(u32, u32)], control: u32, written: u32) {
        let ea = Src::r(address, Src::XYZW);
        let c = Src::r(control, Src::XYZW);

        // x must be a float in [2, 4) for the export to happen.
        asm!(self).op_and(Dest::r(control, 0b0001), ea.select(0), Src::lu(memexport::ADDRESS_CHECK_MASK));
        asm!(self).op_ieq(Dest::r(control, 0b0001), c.select(0), Src::lu(memexport::ADDRESS_CHECK_VALUE));
        asm!(self).op_if(true, c.select(0));

        asm!(self).op_and(
            Dest::r(control, 0b0001),
            ea.select(2),
            Src::lu(1 << memexport::SWAP_RED_BLUE_SHIFT),
        );
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            asm!(self).op_movc(Dest::r(em, 0b0101), c.select(0), e.swizzle(ZYXW), e);
        }

        // x: element size in bytes, 0 for formats that can't be exported.
        asm!(self).op_mov(Dest::r(control, 0b0001), Src::lu(0), false);
        // y: signed, z: integer, w: format.
        let (format_width, format_offset) = memexport::FORMAT;
        asm!(self).op_ubfe(
            Dest::r(control, 0b1110),
            Src::lu4(0, 1, 1, format_width),
            Src::lu4(0, memexport::SIGNED_SHIFT, memexport::INTEGER_SHIFT, format_offset),
            ea.select(2),
        );
        let scratch = self.push_temp(0);
        asm!(self).op_switch(c.select(3));
        for &format in SurfaceFormat::ALL {
            let Some(packing) = export_packing(format) else {
                continue;
            };
            asm!(self).op_case(Src::lu(format as u32));
            asm!(self).op_mov(Dest::r(control, 0b0001), Src::lu(format.bits_per_element() >> 3), false);
            self.emit_export_packing(packing, data, control, scratch);
            asm!(self).op_break();
        }
        asm!(self).op_endswitch();

        asm!(self).op_if(true, c.select(0));
        self.emit_export_endian(address, data, control, scratch);

        // Byte address of eM0, and the number of elements left in the
        // stream.
        asm!(self).op_ishl(Dest::r(address, 0b0001), ea.select(0), Src::lu(2));
        asm!(self).op_and(Dest::r(address, 0b1010), ea, Src::lu(memexport::INDEX_MASK));
        asm!(self).op_iadd(Dest::r(control, 0b0100), ea.select(3), -ea.select(1));
        asm!(self).op_umad(Dest::r(address, 0b0001), ea.select(1), c.select(0), ea.select(0));

        let s = Src::r(scratch, Src::XYZW);
        let written_bits = Src::r(written, Src::XYZW).select(alloc >> 2);
        for &(index, em) in data {
            asm!(self).op_ilt(Dest::r(scratch, 0b0001), Src::lu(index), c.select(2));
            asm!(self).op_and(
                Dest::r(scratch, 0b0010),
                written_bits,
                Src::lu(1 << (index + ((alloc & 3) << 3))),
            );
            asm!(self).op_and(Dest::r(scratch, 0b0001), s.select(0), s.select(1));
            asm!(self).op_if(true, s.select(0));
            asm!(self).op_umad(Dest::r(scratch, 0b0001), Src::lu(index), c.select(0), ea.select(0));
            self.emit_export_store(em, control, scratch);
            asm!(self).op_endif();
        }

        asm!(self).op_endif();
        self.pop_temp();
        asm!(self).op_endif();
    }

    /// Converts the eM registers to the bits of one element, in x for up to
    /// 32 bits and xy for 64.
    fn emit_export_packing(&mut self, packing: Packing, data: &[(u32, u32)], control: u32, scratch: u32) {
        match packing {
            Packing::Fixed(layout) => {
                let widths: Vec<u32> = layout.iter().map(|&(width, _)| width).collect();
                self.emit_export_to_fixed(&widths, data, control, scratch);
                for &(_, em) in data {
                    let e = Src::r(em, Src::XYZW);
                    let x = Dest::r(em, 0b0001);
                    asm!(self).op_bfi(x, Src::lu(layout[0].0), Src::lu(0), e.select(0), Src::lu(0));
                    for (component, &(width, offset)) in layout.iter().enumerate().skip(1) {
                        asm!(self).op_bfi(
                            x,
                            Src::lu(width),
                            Src::lu(offset),
                            e.select(component as u32),
                            e.select(0),
                        );
                    }
                }
            }
            Packing::Fixed16x4 => {
                self.emit_export_to_fixed(&[16; 4], data, control, scratch);
                for &(_, em) in data {
                    let e = Src::r(em, Src::XYZW);
                    asm!(self).op_and(Dest::r(em, 0b0101), e, Src::lu(0xFFFF));
                    asm!(self).op_bfi(
                        Dest::r(em, 0b0011),
                        Src::lu(16),
                        Src::lu(16),
                        e.swizzle(YWWW),
                        e.swizzle(XZZZ),
                    );
                }
            }
            Packing::Half(count) => {
                for &(_, em) in data {
                    let e = Src::r(em, Src::XYZW);
                    asm!(self).op_f32tof16(Dest::r(em, (1 << count) - 1), e);
                    match count {
                        2 => asm!(self).op_bfi(Dest::r(em, 0b0001), Src::lu(16), Src::lu(16), e.select(1), e.select(0)),
                        4 => asm!(self).op_bfi(
                            Dest::r(em, 0b0011),
                            Src::lu(16),
                            Src::lu(16),
                            e.swizzle(YWWW),
                            e.swizzle(XZZZ),
                        ),
                        _ => {}
                    }
                }
            }
            Packing::Float => {}
        }
    }

    /// Rounds the eM components to fixed point, normalized unless the
    /// integer bit is set in `control.z`, signed if `control.y` is set.
    fn emit_export_to_fixed(&mut self, widths: &[u32], data: &[(u32, u32)], control: u32, scratch: u32) {
        let mask = (1u32 << widths.len()) - 1;
        let c = Src::r(control, Src::XYZW);
        let s = Src::r(scratch, Src::XYZW);
        let scale = |signed: bool| {
            let mut values = [0.0f32; 4];
            for (value, &width) in values.iter_mut().zip(widths) {
                *value = if signed {
                    ((1u32 << (width - 1)) - 1) as f32
                } else {
                    ((1u64 << width) - 1) as f32
                };
            }
            Src::lf4(values[0], values[1], values[2], values[3])
        };

        // NaN to 0.
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            asm!(self).op_eq(Dest::r(scratch, mask), e, e);
            asm!(self).op_and(Dest::r(em, mask), e, s);
        }

        asm!(self).op_if(true, c.select(1));
        asm!(self).op_if(false, c.select(2));
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            let dest = Dest::r(em, mask);
            asm!(self).op_max(dest, e, Src::lf(-1.0));
            asm!(self).op_min(dest, e, Src::lf(1.0));
            asm!(self).op_mul(dest, e, scale(true), false);
        }
        asm!(self).op_endif();
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            let dest = Dest::r(em, mask);
            asm!(self).op_lt(Dest::r(scratch, mask), e, Src::lf(0.0));
            asm!(self).op_movc(Dest::r(scratch, mask), s, Src::lf(-0.5), Src::lf(0.5));
            asm!(self).op_add(dest, e, s, false);
            asm!(self).op_ftoi(dest, e);
        }
        asm!(self).op_else();
        asm!(self).op_if(false, c.select(2));
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            let dest = Dest::r(em, mask);
            asm!(self).op_mov(dest, e, true);
            asm!(self).op_mul(dest, e, scale(false), false);
        }
        asm!(self).op_endif();
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            let dest = Dest::r(em, mask);
            asm!(self).op_add(dest, e, Src::lf(0.5), false);
            asm!(self).op_ftou(dest, e);
        }
        asm!(self).op_endif();
    }

    /// Byte swapping per eA.z. The 64 and 128-bit swaps reorder the dwords
    /// and then swap within each.
    fn emit_export_endian(&mut self, address: u32, data: &[(u32, u32)], control: u32, scratch: u32) {
        let c = Src::r(control, Src::XYZW);
        let s = Src::r(scratch, Src::XYZW);
        asm!(self).op_and(
            Dest::r(control, 0b0010),
            Src::r(address, Src::ZZZZ),
            Src::lu(memexport::ENDIAN_MASK),
        );
        for (endian, swizzle) in [(Endian128::Swap8In64, YXWZ), (Endian128::Swap8In128, WZYX)] {
            asm!(self).op_ieq(Dest::r(control, 0b0100), c.select(1), Src::lu(endian as u32));
            for &(_, em) in data {
                let e = Src::r(em, Src::XYZW);
                asm!(self).op_movc(Dest::r(em, 0b1111), c.select(2), e.swizzle(swizzle), e);
            }
            asm!(self).op_movc(
                Dest::r(control, 0b0010),
                c.select(2),
                Src::lu(Endian128::Swap8In32 as u32),
                c.select(1),
            );
        }

        asm!(self).op_switch(c.select(1));
        asm!(self).op_case(Src::lu(Endian128::Swap8In16 as u32));
        asm!(self).op_case(Src::lu(Endian128::Swap8In32 as u32));
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            let dest = Dest::r(em, 0b1111);
            asm!(self).op_and(Dest::r(scratch, 0b1111), e, Src::lu(0x00FF_00FF));
            asm!(self).op_ushr(dest, e, Src::lu(8));
            asm!(self).op_and(dest, e, Src::lu(0x00FF_00FF));
            asm!(self).op_umad(dest, s, Src::lu(256), e);
        }
        asm!(self).op_break();
        asm!(self).op_endswitch();

        asm!(self).op_switch(c.select(1));
        asm!(self).op_case(Src::lu(Endian128::Swap8In32 as u32));
        asm!(self).op_case(Src::lu(Endian128::Swap16In32 as u32));
        for &(_, em) in data {
            let e = Src::r(em, Src::XYZW);
            asm!(self).op_ushr(Dest::r(scratch, 0b1111), e, Src::lu(16));
            asm!(self).op_bfi(Dest::r(em, 0b1111), Src::lu(16), Src::lu(16), e, s);
        }
        asm!(self).op_break();
        asm!(self).op_endswitch();
    }

    /// Stores one element at the byte address in `scratch.x`, sized by
    /// `control.x`.
    fn emit_export_store(&mut self, em: u32, control: u32, scratch: u32) {
        let c = Src::r(control, Src::XYZW);
        let e = Src::r(em, Src::XYZW);
        let s = Src::r(scratch, Src::XYZW);
        let address = s.select(0);
        asm!(self).op_switch(c.select(0));
        for (size, value_mask) in [(1, 0xFF), (2, 0xFFFF)] {
            asm!(self).op_case(Src::lu(size));
            // y: bit offset in the dword, z: value, w: bits kept.
            asm!(self).op_and(Dest::r(scratch, 0b0010), address, Src::lu(3));
            asm!(self).op_ishl(Dest::r(scratch, 0b0010), s.select(1), Src::lu(3));
            asm!(self).op_and(Dest::r(scratch, 0b0001), address, Src::lu(!3));
            asm!(self).op_and(Dest::r(scratch, 0b0100), e.select(0), Src::lu(value_mask));
            asm!(self).op_ishl(Dest::r(scratch, 0b0100), s.select(2), s.select(1));
            asm!(self).op_ishl(Dest::r(scratch, 0b1000), Src::lu(value_mask), s.select(1));
            asm!(self).op_not(Dest::r(scratch, 0b1000), s.select(3));
            asm!(self).op_atomic_and(shared_memory(), address, 1, s.select(3));
            asm!(self).op_atomic_or(shared_memory(), address, 1, s.select(2));
            asm!(self).op_break();
        }
        for (size, mask) in [(4, 0b0001), (8, 0b0011), (16, 0b1111)] {
            asm!(self).op_case(Src::lu(size));
            asm!(self).op_store_raw(shared_memory().with_mask(mask), address, e);
            asm!(self).op_break();
        }
        asm!(self).op_endswitch();
    }
}

fn shared_memory() -> Dest {
    Dest::u(uav::SHARED_MEMORY, Index::imm(uav::SHARED_MEMORY), 0b0001)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xenos_dxbc::test_utils::{decode_container_program, Interpreter, Outcome};
    use xenos_dxbc::Opcode;

    use super::*;
    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{CbufferRegister, ShaderInfo, ShaderStage};
    use crate::system_constants::SystemConstantIndex;
    use crate::ucode::{
        AllocInstruction, AllocKind, ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction,
        Predication, ResultStorage, VectorAluInstruction, VectorOpcode,
    };

    const BASE_DWORDS: u32 = 16;

    fn mov(storage: ResultStorage, index: u32, constant: u32) -> ParsedInstruction {
        let c = InstructionOperand::float_constant(constant);
        ParsedInstruction::VectorAlu(VectorAluInstruction {
            opcode: VectorOpcode::Max,
            predication: Predication::NONE,
            result: InstructionResult::new(storage, index, 0b1111),
            operands: vec![c, c],
        })
    }

    /// eA from c0 and eM0 from c1.
    fn export_shader() -> (Vec<ParsedInstruction>, ShaderInfo) {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let instructions = vec![
            ParsedInstruction::Alloc(AllocInstruction {
                cf_index: 0,
                kind: AllocKind::Memory,
                count: 1,
            }),
            ParsedInstruction::Exec(exec),
            mov(ResultStorage::ExportAddress, 0, 0),
            mov(ResultStorage::ExportData, 0, 1),
            ParsedInstruction::ExecEnd(exec),
        ];
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        info.memexport_em_written = vec![0b1];
        info.constant_register_map.float_bitmap[0] = 0b11;
        (instructions, info)
    }

    fn integer_float(value: u32) -> u32 {
        0x4B00_0000 | value
    }

    /// eA for `count` elements of `format` starting at `index`.
    fn address(index: u32, count: u32, format: SurfaceFormat, flags: u32) -> [u32; 4] {
        [
            memexport::ADDRESS_CHECK_VALUE | BASE_DWORDS,
            integer_float(index),
            (format as u32) << memexport::FORMAT.1 | flags,
            integer_float(count),
        ]
    }

    fn run(ea: [u32; 4], em: [f32; 4], flags: Flags, memory: Vec<u32>) -> Vec<u32> {
        let (instructions, info) = export_shader();
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator
            .translate(&instructions, &info, Modification::default_vertex())
            .unwrap();
        assert!(translation.is_valid);
        let program = decode_container_program(&translation.dxbc);
        let mut interpreter = Interpreter::new();
        let (vector, component) = SystemConstantIndex::Flags.location(0);
        interpreter.set_constant(CbufferRegister::SystemConstants as u32, vector, component, flags.bits());
        let constants = CbufferRegister::FloatConstants as u32;
        for i in 0..4 {
            interpreter.set_constant(constants, 0, i, ea[i as usize]);
            interpreter.set_constant(constants, 1, i, em[i as usize].to_bits());
        }
        interpreter.uavs.insert(uav::SHARED_MEMORY, memory);
        assert_eq!(interpreter.run(&program), Outcome::Returned);
        interpreter.uavs.remove(&uav::SHARED_MEMORY).unwrap_or_default()
    }

    fn run_export(ea: [u32; 4], em: [f32; 4]) -> Vec<u32> {
        run(ea, em, Flags::SHARED_MEMORY_IS_UAV, vec![0; 64])
    }

    #[test]
    fn exportable_formats() {
        assert_eq!(export_packing(SurfaceFormat::k_16_16_16_16), Some(Packing::Fixed16x4));
        assert_eq!(export_packing(SurfaceFormat::k_32_32_FLOAT), Some(Packing::Float));
        assert!(matches!(export_packing(SurfaceFormat::k_2_10_10_10), Some(Packing::Fixed(layout)) if layout.len() == 4));
        assert_eq!(export_packing(SurfaceFormat::k_32), None);
        assert_eq!(export_packing(SurfaceFormat::k_32_32_32_FLOAT), None);
    }

    #[test]
    fn unorm_8_8_8_8_is_packed() {
        let memory = run_export(address(1, 2, SurfaceFormat::k_8_8_8_8, 0), [1.0, 0.5, 0.0, 0.25]);
        // 127.5 and 63.75 round to nearest.
        assert_eq!(memory[(BASE_DWORDS + 1) as usize], 0x4000_80FF);
        assert_eq!(memory.iter().filter(|dword| **dword != 0).count(), 1);
    }

    #[test]
    fn red_and_blue_can_be_swapped() {
        let flags = 1 << memexport::SWAP_RED_BLUE_SHIFT;
        let memory = run_export(address(0, 1, SurfaceFormat::k_8_8_8_8, flags), [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(memory[BASE_DWORDS as usize], 0x00FF_0000);
    }

    #[test]
    fn snorm_16_16_is_clamped_and_rounded() {
        let flags = 1 << memexport::SIGNED_SHIFT;
        let memory = run_export(address(0, 1, SurfaceFormat::k_16_16, flags), [-2.0, 0.5, 0.0, 0.0]);
        assert_eq!(memory[BASE_DWORDS as usize], 0x4000_8001);
    }

    #[test]
    fn integer_components_are_not_scaled() {
        let flags = 1 << memexport::INTEGER_SHIFT;
        let memory = run_export(address(0, 1, SurfaceFormat::k_8_8, flags), [3.0, 7.4, 0.0, 0.0]);
        assert_eq!(memory[BASE_DWORDS as usize], 0x0703);
    }

    #[test]
    fn nan_is_stored_as_zero() {
        let memory = run_export(address(0, 1, SurfaceFormat::k_8_8, 0), [f32::NAN, 1.0, 0.0, 0.0]);
        assert_eq!(memory[BASE_DWORDS as usize], 0xFF00);
    }

    #[test]
    fn floats_are_stored_with_the_endian_swap() {
        let flags = Endian128::Swap8In32 as u32;
        let memory = run_export(address(0, 1, SurfaceFormat::k_32_32_32_32_FLOAT, flags), [1.0, 2.0, -1.0, 0.5]);
        let base = BASE_DWORDS as usize;
        let expected = [1.0f32, 2.0, -1.0, 0.5].map(|v| v.to_bits().swap_bytes());
        assert_eq!(memory[base..base + 4], expected);
    }

    #[test]
    fn swap_8_in_64_reorders_dwords() {
        let flags = Endian128::Swap8In64 as u32;
        let memory = run_export(address(0, 1, SurfaceFormat::k_32_32_FLOAT, flags), [1.0, 2.0, 0.0, 0.0]);
        let base = BASE_DWORDS as usize;
        assert_eq!(memory[base], 2.0f32.to_bits().swap_bytes());
        assert_eq!(memory[base + 1], 1.0f32.to_bits().swap_bytes());
    }

    #[test]
    fn halves_are_packed_in_pairs() {
        let memory = run_export(address(0, 1, SurfaceFormat::k_16_16_16_16_FLOAT, 0), [1.0, 2.0, -2.0, 0.5]);
        let base = BASE_DWORDS as usize;
        assert_eq!(memory[base], 0x4000_3C00);
        assert_eq!(memory[base + 1], 0x3800_C000);
    }

    #[test]
    fn bytes_are_merged_into_memory() {
        let memory = run(
            address(1, 2, SurfaceFormat::k_8, 0),
            [0.5, 0.0, 0.0, 0.0],
            Flags::SHARED_MEMORY_IS_UAV,
            vec![0xFFFF_FFFF; 64],
        );
        assert_eq!(memory[BASE_DWORDS as usize], 0xFFFF_80FF);
        assert_eq!(memory[BASE_DWORDS as usize + 1], 0xFFFF_FFFF);
    }

    #[test]
    fn invalid_address_is_skipped() {
        let mut ea = address(0, 1, SurfaceFormat::k_8_8_8_8, 0);
        ea[0] = 0x3F80_0000 | BASE_DWORDS;
        assert!(run_export(ea, [1.0; 4]).iter().all(|dword| *dword == 0));
    }

    #[test]
    fn elements_past_the_stream_are_skipped() {
        let memory = run_export(address(3, 3, SurfaceFormat::k_8_8_8_8, 0), [1.0; 4]);
        assert!(memory.iter().all(|dword| *dword == 0));
    }

    #[test]
    fn unexportable_format_is_skipped() {
        let memory = run_export(address(0, 1, SurfaceFormat::k_32, 0), [1.0; 4]);
        assert!(memory.iter().all(|dword| *dword == 0));
    }

    #[test]
    fn nothing_is_stored_without_the_uav() {
        let memory = run(
            address(0, 1, SurfaceFormat::k_8_8_8_8, 0),
            [1.0; 4],
            Flags::empty(),
            vec![0; 64],
        );
        assert!(memory.iter().all(|dword| *dword == 0));
    }

    #[test]
    fn scaled_pixel_shaders_export_from_one_host_pixel() {
        let (instructions, mut info) = export_shader();
        info.stage = ShaderStage::Pixel;
        let config = TranslatorConfig {
            draw_resolution_scale_x: 2,
            draw_resolution_scale_y: 2,
            ..Default::default()
        };
        let mut translator = Translator::new(config).unwrap();
        let translation = translator
            .translate(&instructions, &info, Modification::default_pixel())
            .unwrap();
        let program = decode_container_program(&translation.dxbc);
        assert_eq!(program.count(Opcode::UDiv), 1);
        assert!(program.count(Opcode::StoreRaw) > 0);
        assert!(translator.temps.is_balanced());
    }
}
