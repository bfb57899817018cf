//! Vector and scalar ALU operations.
//!
//! The vector result is computed into `pv`, the scalar one into `ps`
//! (`ps_pc_p0_a0.x`), and then stored to the guest result. Multiplications
//! follow the guest rule that zero times anything, including infinity and
//! NaN, is zero: factors are compared against zero after the host has
//! flushed denormals, and the product is replaced with +0 when either one
//! is zero. This is skipped where both factors read the same value.

use xenos_dxbc::{Dest, Src};

use super::{LoadedOperand, Translator};
use crate::error::DiagnosticKind;
use crate::ucode::{InstructionOperand, ScalarAluInstruction, ScalarOpcode, VectorAluInstruction, VectorOpcode};

/// Largest finite float, what the clamping variants saturate to.
const FLT_MAX: f32 = f32::MAX;

impl Translator {
    /// `dest.mask = a * b`, with the components in `flush_mask` set to +0
    /// where either factor is zero.
    ///
    /// `dest` may be read by `a` or `b`.
    fn emit_flushed_mul(&mut self, dest: u32, mask: u32, flush_mask: u32, a: Src, b: Src) {
        let flush_mask = flush_mask & mask;
        if flush_mask == 0 {
            asm!(self).op_mul(Dest::r(dest, mask), a, b, false);
            return;
        }
        let zero = self.push_temp(0);
        asm!(self).op_min(Dest::r(zero, flush_mask), a.abs(), b.abs());
        asm!(self).op_eq(Dest::r(zero, flush_mask), Src::r(zero, Src::XYZW), Src::lf(0.0));
        asm!(self).op_mul(Dest::r(dest, mask), a, b, false);
        asm!(self).op_movc(
            Dest::r(dest, flush_mask),
            Src::r(zero, Src::XYZW),
            Src::lf(0.0),
            Src::r(dest, Src::XYZW),
        );
        self.pop_temp();
    }

    /// Components of `mask` where the two operands may differ.
    fn differing_components(mask: u32, a: &InstructionOperand, b: &InstructionOperand) -> u32 {
        (0..4)
            .filter(|i| mask & (1 << i) != 0 && !a.same_value_as(*i, b, *i))
            .fold(0, |flush, i| flush | (1 << i))
    }

    /// Loads ALU operands, sharing one load between identical operands.
    fn load_alu_operands(&mut self, operands: &[InstructionOperand], needed: &[u32]) -> Vec<LoadedOperand> {
        let mut loaded: Vec<LoadedOperand> = Vec::with_capacity(operands.len());
        for (i, operand) in operands.iter().enumerate() {
            if let Some(j) = (0..i).find(|j| operands[*j].is_identical(operand)) {
                loaded.push(LoadedOperand::immediate(loaded[j].src));
                continue;
            }
            let mask = (i..operands.len())
                .filter(|k| *k == i || operands[*k].is_identical(operand))
                .fold(0, |mask, k| mask | needed.get(k).copied().unwrap_or(0));
            loaded.push(self.load_operand(operand, mask));
        }
        loaded
    }

    fn release_alu_operands(&mut self, loaded: Vec<LoadedOperand>) {
        for operand in loaded.into_iter().rev() {
            self.release(operand);
        }
    }

    /// Converts `a0` from a float with the guest's rounding and range.
    fn emit_set_address_register(&mut self, value: Src, round_to_nearest: bool) {
        let temp = self.push_temp(0);
        if round_to_nearest {
            asm!(self).op_add(Dest::r(temp, 0b0001), value, Src::lf(0.5), false);
            asm!(self).op_round_ni(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX));
        } else {
            asm!(self).op_round_ni(Dest::r(temp, 0b0001), value);
        }
        asm!(self).op_max(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::lf(-256.0));
        asm!(self).op_min(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::lf(255.0));
        let a0 = self.sys.ps_pc_p0_a0;
        asm!(self).op_ftoi(Dest::r(a0, 0b1000), Src::r(temp, Src::XXXX));
        self.pop_temp();
    }

    /// Kills the pixel if `test.x` is nonzero.
    fn emit_kill(&mut self, test: Src) {
        if self.is_vertex_shader() {
            self.report(
                DiagnosticKind::SpecificationViolation,
                "pixel kill in a vertex shader".to_owned(),
            );
            return;
        }
        self.kills = true;
        if self.is_rov() {
            // Killed pixels write nothing to the EDRAM.
            asm!(self).op_retc(true, test);
        } else {
            asm!(self).op_discard(true, test);
        }
    }

    pub(super) fn process_vector_alu(&mut self, instr: &VectorAluInstruction) {
        self.update_instruction_predication(instr.predication);

        let opcode = instr.opcode;
        let result_mask = instr.result.used_result_components();
        let has_side_effects = opcode.writes_predicate() || opcode.is_kill() || opcode == VectorOpcode::MaxA;
        if result_mask == 0 && !has_side_effects {
            return;
        }
        if let VectorOpcode::Unknown(raw) = opcode {
            self.report(
                DiagnosticKind::UnsupportedOpcode,
                format!("unknown vector ALU opcode {raw}"),
            );
            let pv = self.sys.result;
            asm!(self).op_mov(Dest::r(pv, 0b1111), Src::lf(0.0), false);
            self.store_result(&instr.result, Src::r(pv, Src::XYZW), true);
            return;
        }
        let operand_count = opcode.operand_count() as usize;
        if instr.operands.len() < operand_count {
            self.report(
                DiagnosticKind::SpecificationViolation,
                format!(
                    "{} takes {operand_count} operands, {} given",
                    opcode.mnemonic(),
                    instr.operands.len()
                ),
            );
            return;
        }
        let operands = &instr.operands[..operand_count];

        let needed: Vec<u32> = match opcode {
            VectorOpcode::Dp4 | VectorOpcode::Max4 | VectorOpcode::KillEq | VectorOpcode::KillGt
            | VectorOpcode::KillGe | VectorOpcode::KillNe => vec![0b1111; operand_count],
            VectorOpcode::Dp3 => vec![0b0111; 2],
            VectorOpcode::Dp2Add => vec![0b0011, 0b0011, 0b0001],
            // The operand is the direction swizzled as zzxy.
            VectorOpcode::Cube => vec![0b1101, 0],
            VectorOpcode::SetpEqPush | VectorOpcode::SetpNePush | VectorOpcode::SetpGtPush
            | VectorOpcode::SetpGePush => vec![0b1001; 2],
            VectorOpcode::Dst => vec![0b0110, 0b1010],
            VectorOpcode::MaxA => vec![result_mask | 0b1000, result_mask],
            _ => vec![result_mask; operand_count],
        };

        let loaded = self.load_alu_operands(operands, &needed);
        let src: Vec<Src> = loaded.iter().map(|operand| operand.src).collect();
        let pv = self.sys.result;
        let out = Dest::r(pv, result_mask);
        let pv_src = Src::r(pv, Src::XYZW);

        match opcode {
            VectorOpcode::Add => asm!(self).op_add(out, src[0], src[1], false),
            VectorOpcode::Mul => {
                let flush = Self::differing_components(result_mask, &operands[0], &operands[1]);
                self.emit_flushed_mul(pv, result_mask, flush, src[0], src[1]);
            }
            VectorOpcode::Max | VectorOpcode::Min if operands[0].is_identical(&operands[1]) => {
                asm!(self).op_mov(out, src[0], false);
            }
            VectorOpcode::Max => asm!(self).op_max(out, src[0], src[1]),
            VectorOpcode::Min => asm!(self).op_min(out, src[0], src[1]),
            VectorOpcode::Seq | VectorOpcode::Sgt | VectorOpcode::Sge | VectorOpcode::Sne => {
                match opcode {
                    VectorOpcode::Seq => asm!(self).op_eq(out, src[0], src[1]),
                    VectorOpcode::Sgt => asm!(self).op_lt(out, src[1], src[0]),
                    VectorOpcode::Sge => asm!(self).op_ge(out, src[0], src[1]),
                    _ => asm!(self).op_ne(out, src[0], src[1]),
                }
                asm!(self).op_and(out, pv_src, Src::lf(1.0));
            }
            VectorOpcode::Frc => asm!(self).op_frc(out, src[0]),
            VectorOpcode::Trunc => asm!(self).op_round_z(out, src[0]),
            VectorOpcode::Floor => asm!(self).op_round_ni(out, src[0]),
            VectorOpcode::Mad => {
                // Separate so the product is flushed like a guest multiply.
                let flush = Self::differing_components(result_mask, &operands[0], &operands[1]);
                self.emit_flushed_mul(pv, result_mask, flush, src[0], src[1]);
                asm!(self).op_add(out, pv_src, src[2], false);
            }
            VectorOpcode::CndEq | VectorOpcode::CndGe | VectorOpcode::CndGt => {
                match opcode {
                    VectorOpcode::CndEq => asm!(self).op_eq(out, src[0], Src::lf(0.0)),
                    VectorOpcode::CndGe => asm!(self).op_ge(out, src[0], Src::lf(0.0)),
                    _ => asm!(self).op_lt(out, Src::lf(0.0), src[0]),
                }
                asm!(self).op_movc(out, pv_src, src[1], src[2]);
            }
            VectorOpcode::Dp4 | VectorOpcode::Dp3 | VectorOpcode::Dp2Add => {
                self.emit_dot_product(opcode, operands, &src, result_mask);
            }
            VectorOpcode::Cube => self.emit_cube(src[0]),
            VectorOpcode::Max4 => {
                let mut unique: Vec<u32> = Vec::with_capacity(4);
                for i in 0..4 {
                    let source = operands[0].component(i);
                    if (0..i).all(|j| operands[0].component(j) != source) {
                        unique.push(i);
                    }
                }
                let source = src[0];
                match unique.as_slice() {
                    [single] => asm!(self).op_mov(out, source.select_from_swizzled(*single), false),
                    [first, second, rest @ ..] => {
                        asm!(self).op_max(
                            out,
                            source.select_from_swizzled(*first),
                            source.select_from_swizzled(*second),
                        );
                        for i in rest {
                            asm!(self).op_max(out, pv_src, source.select_from_swizzled(*i));
                        }
                    }
                    [] => {}
                }
            }
            VectorOpcode::SetpEqPush | VectorOpcode::SetpNePush | VectorOpcode::SetpGtPush
            | VectorOpcode::SetpGePush => {
                // p0 = src0.w == 0 && src1.w op 0,
                // pv = src0.x == 0 && src1.x op 0 ? 0 : src0.x + 1.
                let test = self.push_temp(0);
                let other = self.push_temp(0);
                asm!(self).op_eq(Dest::r(test, 0b1001), src[0], Src::lf(0.0));
                let other_dest = Dest::r(other, 0b1001);
                match opcode {
                    VectorOpcode::SetpEqPush => asm!(self).op_eq(other_dest, src[1], Src::lf(0.0)),
                    VectorOpcode::SetpNePush => asm!(self).op_ne(other_dest, src[1], Src::lf(0.0)),
                    VectorOpcode::SetpGtPush => asm!(self).op_lt(other_dest, Src::lf(0.0), src[1]),
                    _ => asm!(self).op_ge(other_dest, src[1], Src::lf(0.0)),
                }
                asm!(self).op_and(Dest::r(test, 0b1001), Src::r(test, Src::XYZW), Src::r(other, Src::XYZW));
                self.pop_temp();
                let p0 = self.sys.ps_pc_p0_a0;
                asm!(self).op_mov(Dest::r(p0, 0b0100), Src::r(test, Src::WWWW), false);
                if result_mask != 0 {
                    asm!(self).op_add(out, src[0].select_from_swizzled(0), Src::lf(1.0), false);
                    asm!(self).op_movc(out, Src::r(test, Src::XXXX), Src::lf(0.0), pv_src);
                }
                self.pop_temp();
            }
            VectorOpcode::KillEq | VectorOpcode::KillGt | VectorOpcode::KillGe | VectorOpcode::KillNe => {
                let test = self.push_temp(0);
                let all = Dest::r(test, 0b1111);
                match opcode {
                    VectorOpcode::KillEq => asm!(self).op_eq(all, src[0], src[1]),
                    VectorOpcode::KillGt => asm!(self).op_lt(all, src[1], src[0]),
                    VectorOpcode::KillGe => asm!(self).op_ge(all, src[0], src[1]),
                    _ => asm!(self).op_ne(all, src[0], src[1]),
                }
                asm!(self).op_or(
                    Dest::r(test, 0b0011),
                    Src::r(test, Src::XYZW),
                    Src::r(test, 0b11_10_11_10),
                );
                asm!(self).op_or(Dest::r(test, 0b0001), Src::r(test, Src::XXXX), Src::r(test, Src::YYYY));
                if result_mask != 0 {
                    asm!(self).op_and(out, Src::r(test, Src::XXXX), Src::lf(1.0));
                }
                self.emit_kill(Src::r(test, Src::XXXX));
                self.pop_temp();
            }
            VectorOpcode::Dst => {
                // (1, src0.y * src1.y, src0.z, src1.w)
                if result_mask & 0b0001 != 0 {
                    asm!(self).op_mov(Dest::r(pv, 0b0001), Src::lf(1.0), false);
                }
                if result_mask & 0b0010 != 0 {
                    let flush = Self::differing_components(0b0010, &operands[0], &operands[1]);
                    self.emit_flushed_mul(pv, 0b0010, flush, src[0], src[1]);
                }
                if result_mask & 0b0100 != 0 {
                    asm!(self).op_mov(Dest::r(pv, 0b0100), src[0], false);
                }
                if result_mask & 0b1000 != 0 {
                    asm!(self).op_mov(Dest::r(pv, 0b1000), src[1], false);
                }
            }
            VectorOpcode::MaxA => {
                self.emit_set_address_register(src[0].select_from_swizzled(3), true);
                if result_mask != 0 {
                    if operands[0].is_identical(&operands[1]) {
                        asm!(self).op_mov(out, src[0], false);
                    } else {
                        asm!(self).op_max(out, src[0], src[1]);
                    }
                }
            }
            VectorOpcode::Unknown(_) => {}
        }

        self.release_alu_operands(loaded);
        self.store_result(&instr.result, pv_src, true);
        // The result is stored under the old predicate.
        if opcode.writes_predicate() {
            self.mark_predicate_written();
        }
    }

    /// Dot products are summed one product at a time, in order, with each
    /// product flushed like a guest multiply.
    fn emit_dot_product(&mut self, opcode: VectorOpcode, operands: &[InstructionOperand], src: &[Src], result_mask: u32) {
        let pv = self.sys.result;
        let component_count = match opcode {
            VectorOpcode::Dp4 => 4,
            VectorOpcode::Dp3 => 3,
            _ => 2,
        };
        let products_mask = (1u32 << component_count) - 1;
        let flush = Self::differing_components(products_mask, &operands[0], &operands[1]);
        if flush == 0 && opcode != VectorOpcode::Dp2Add {
            // Squared length, nothing to flush.
            let out = Dest::r(pv, result_mask);
            if component_count == 4 {
                asm!(self).op_dp4(out, src[0], src[1]);
            } else {
                asm!(self).op_dp3(out, src[0], src[1]);
            }
            return;
        }
        let products = self.push_temp(0);
        self.emit_flushed_mul(products, products_mask, flush, src[0], src[1]);
        asm!(self).op_add(Dest::r(products, 0b0001), Src::r(products, Src::XXXX), Src::r(products, Src::YYYY), false);
        for i in 2..component_count {
            asm!(self).op_add(
                Dest::r(products, 0b0001),
                Src::r(products, Src::XXXX),
                Src::r(products, Src::XYZW).select(i),
                false,
            );
        }
        if opcode == VectorOpcode::Dp2Add {
            asm!(self).op_add(
                Dest::r(products, 0b0001),
                Src::r(products, Src::XXXX),
                src[2].select_from_swizzled(0),
                false,
            );
        }
        asm!(self).op_mov(Dest::r(pv, result_mask), Src::r(products, Src::XXXX), false);
        self.pop_temp();
    }

    /// `cube`: (T, S, 2 * major axis, face index) of a direction given as
    /// zzxy.
    fn emit_cube(&mut self, operand: Src) {
        let pv = self.sys.result;
        let x = operand.select_from_swizzled(2);
        let y = operand.select_from_swizzled(3);
        let z = operand.select_from_swizzled(0);

        let temp = self.push_temp(0);
        let t = |swizzle| Src::r(temp, swizzle);
        // Z major if |z| >= |x| and |z| >= |y|.
        asm!(self).op_ge(Dest::r(temp, 0b0001), z.abs(), x.abs());
        asm!(self).op_ge(Dest::r(temp, 0b0010), z.abs(), y.abs());
        asm!(self).op_and(Dest::r(temp, 0b0001), t(Src::XXXX), t(Src::YYYY));
        // Otherwise Y major if |y| >= |x|.
        asm!(self).op_ge(Dest::r(temp, 0b0010), y.abs(), x.abs());

        let faces = [
            // (major, s, t, positive face, negative face)
            (z, x, -y, 4.0, 5.0),
            (y, x, z, 2.0, 3.0),
            (x, -z, -y, 0.0, 1.0),
        ];
        asm!(self).op_if(true, t(Src::XXXX));
        self.emit_cube_face(temp, faces[0], true);
        asm!(self).op_else();
        asm!(self).op_if(true, t(Src::YYYY));
        self.emit_cube_face(temp, faces[1], false);
        asm!(self).op_else();
        self.emit_cube_face(temp, faces[2], true);
        asm!(self).op_endif();
        asm!(self).op_endif();
        asm!(self).op_add(Dest::r(pv, 0b0100), Src::r(pv, Src::ZZZZ), Src::r(pv, Src::ZZZZ), false);
        self.pop_temp();
    }

    /// One major axis of `cube`. For X and Z major the S coordinate flips
    /// with the sign of the axis, for Y major the T coordinate does.
    fn emit_cube_face(&mut self, temp: u32, face: (Src, Src, Src, f32, f32), flips_s: bool) {
        let pv = self.sys.result;
        let (major, s, t, positive, negative) = face;
        asm!(self).op_lt(Dest::r(temp, 0b0100), major, Src::lf(0.0));
        let negative_major = Src::r(temp, Src::ZZZZ);
        if flips_s {
            asm!(self).op_movc(Dest::r(pv, 0b0010), negative_major, -s, s);
            asm!(self).op_mov(Dest::r(pv, 0b0001), t, false);
        } else {
            asm!(self).op_mov(Dest::r(pv, 0b0010), s, false);
            asm!(self).op_movc(Dest::r(pv, 0b0001), negative_major, -t, t);
        }
        asm!(self).op_mov(Dest::r(pv, 0b0100), major, false);
        asm!(self).op_movc(Dest::r(pv, 0b1000), negative_major, Src::lf(negative), Src::lf(positive));
    }

    pub(super) fn process_scalar_alu(&mut self, instr: &ScalarAluInstruction) {
        self.update_instruction_predication(instr.predication);

        let opcode = instr.opcode;
        let ps = self.sys.ps_pc_p0_a0;
        let out = Dest::r(ps, 0b0001);
        let ps_src = Src::r(ps, Src::XXXX);

        if let ScalarOpcode::Unknown(raw) = opcode {
            self.report(
                DiagnosticKind::UnsupportedOpcode,
                format!("unknown scalar ALU opcode {raw}"),
            );
            asm!(self).op_mov(out, Src::lf(0.0), false);
            self.store_result(&instr.result, ps_src, false);
            return;
        }
        if opcode == ScalarOpcode::RetainPrev {
            self.store_result(&instr.result, ps_src, false);
            return;
        }
        if opcode == ScalarOpcode::SetpClr {
            asm!(self).op_mov(Dest::r(ps, 0b0100), Src::lu(0), false);
            asm!(self).op_mov(out, Src::lf(FLT_MAX), false);
            self.store_result(&instr.result, ps_src, false);
            self.mark_predicate_written();
            return;
        }

        let (operand_count, needed): (usize, &[u32]) = if opcode.has_two_operands() {
            (2, &[0b0001, 0b0001][..])
        } else {
            match opcode {
                ScalarOpcode::Adds | ScalarOpcode::Muls | ScalarOpcode::MulsPrev2 | ScalarOpcode::Maxs
                | ScalarOpcode::Mins | ScalarOpcode::MaxAs | ScalarOpcode::MaxAsf | ScalarOpcode::Subs => {
                    (1, &[0b0011][..])
                }
                _ => (1, &[0b0001][..]),
            }
        };
        if instr.operands.len() < operand_count {
            self.report(
                DiagnosticKind::SpecificationViolation,
                format!(
                    "{} takes {operand_count} operands, {} given",
                    opcode.mnemonic(),
                    instr.operands.len()
                ),
            );
            return;
        }
        let operands = &instr.operands[..operand_count];
        let loaded = self.load_alu_operands(operands, needed);
        let a = loaded[0].src.select_from_swizzled(0);
        let b = if operand_count == 2 {
            loaded[1].src.select_from_swizzled(0)
        } else {
            loaded[0].src.select_from_swizzled(1)
        };
        // Whether the two factors of a multiplication read the same value.
        let same_factors = if operand_count == 2 {
            operands[0].same_value_as(0, &operands[1], 0)
        } else {
            operands[0].same_value_as(0, &operands[0], 1)
        };

        match opcode {
            ScalarOpcode::Adds | ScalarOpcode::AddsC0 | ScalarOpcode::AddsC1 => {
                asm!(self).op_add(out, a, b, false);
            }
            ScalarOpcode::AddsPrev => asm!(self).op_add(out, a, ps_src, false),
            ScalarOpcode::Muls | ScalarOpcode::MulsC0 | ScalarOpcode::MulsC1 => {
                let flush = if same_factors { 0 } else { 0b0001 };
                self.emit_flushed_mul(ps, 0b0001, flush, a, b);
            }
            ScalarOpcode::MulsPrev => self.emit_flushed_mul(ps, 0b0001, 0b0001, a, ps_src),
            ScalarOpcode::MulsPrev2 => {
                // -FLT_MAX if ps is -FLT_MAX or not finite, or src.y is not
                // finite or not positive, src.x * ps otherwise.
                let temp = self.push_temp(0);
                asm!(self).op_eq(Dest::r(temp, 0b0001), ps_src, Src::lf(-FLT_MAX));
                // |v| == inf catches infinities, v != v catches NaN.
                asm!(self).op_eq(Dest::r(temp, 0b0010), ps_src.abs(), Src::lf(f32::INFINITY));
                asm!(self).op_or(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY));
                asm!(self).op_ne(Dest::r(temp, 0b0010), ps_src, ps_src);
                asm!(self).op_or(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY));
                asm!(self).op_eq(Dest::r(temp, 0b0010), b.abs(), Src::lf(f32::INFINITY));
                asm!(self).op_or(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY));
                // Not greater than zero, which includes NaN.
                asm!(self).op_lt(Dest::r(temp, 0b0010), Src::lf(0.0), b);
                asm!(self).op_not(Dest::r(temp, 0b0010), Src::r(temp, Src::YYYY));
                asm!(self).op_or(Dest::r(temp, 0b0001), Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY));
                self.emit_flushed_mul(ps, 0b0001, 0b0001, a, ps_src);
                asm!(self).op_movc(out, Src::r(temp, Src::XXXX), Src::lf(-FLT_MAX), ps_src);
                self.pop_temp();
            }
            ScalarOpcode::Maxs | ScalarOpcode::Mins if same_factors => asm!(self).op_mov(out, a, false),
            ScalarOpcode::Maxs => asm!(self).op_max(out, a, b),
            ScalarOpcode::Mins => asm!(self).op_min(out, a, b),
            ScalarOpcode::Seqs | ScalarOpcode::Sgts | ScalarOpcode::Sges | ScalarOpcode::Snes => {
                match opcode {
                    ScalarOpcode::Seqs => asm!(self).op_eq(out, a, Src::lf(0.0)),
                    ScalarOpcode::Sgts => asm!(self).op_lt(out, Src::lf(0.0), a),
                    ScalarOpcode::Sges => asm!(self).op_ge(out, a, Src::lf(0.0)),
                    _ => asm!(self).op_ne(out, a, Src::lf(0.0)),
                }
                asm!(self).op_and(out, ps_src, Src::lf(1.0));
            }
            ScalarOpcode::Frcs => asm!(self).op_frc(out, a),
            ScalarOpcode::Truncs => asm!(self).op_round_z(out, a),
            ScalarOpcode::Floors => asm!(self).op_round_ni(out, a),
            ScalarOpcode::Exp => asm!(self).op_exp(out, a),
            ScalarOpcode::Log => asm!(self).op_log(out, a),
            ScalarOpcode::Logc => {
                asm!(self).op_log(out, a);
                asm!(self).op_max(out, ps_src, Src::lf(-FLT_MAX));
            }
            ScalarOpcode::Rcp | ScalarOpcode::Rcpc | ScalarOpcode::Rcpf => {
                asm!(self).op_rcp(out, a);
                self.emit_infinity_fixup(opcode == ScalarOpcode::Rcpc, opcode == ScalarOpcode::Rcpf);
            }
            ScalarOpcode::Rsq | ScalarOpcode::Rsqc | ScalarOpcode::Rsqf => {
                asm!(self).op_rsq(out, a);
                self.emit_infinity_fixup(opcode == ScalarOpcode::Rsqc, opcode == ScalarOpcode::Rsqf);
            }
            ScalarOpcode::MaxAs | ScalarOpcode::MaxAsf => {
                self.emit_set_address_register(a, opcode == ScalarOpcode::MaxAs);
                if same_factors {
                    asm!(self).op_mov(out, a, false);
                } else {
                    asm!(self).op_max(out, a, b);
                }
            }
            ScalarOpcode::Subs | ScalarOpcode::SubsC0 | ScalarOpcode::SubsC1 => {
                asm!(self).op_add(out, a, -b, false);
            }
            ScalarOpcode::SubsPrev => asm!(self).op_add(out, a, -ps_src, false),
            ScalarOpcode::SetpEq | ScalarOpcode::SetpNe | ScalarOpcode::SetpGt | ScalarOpcode::SetpGe => {
                let p0 = Dest::r(ps, 0b0100);
                match opcode {
                    ScalarOpcode::SetpEq => asm!(self).op_eq(p0, a, Src::lf(0.0)),
                    ScalarOpcode::SetpNe => asm!(self).op_ne(p0, a, Src::lf(0.0)),
                    ScalarOpcode::SetpGt => asm!(self).op_lt(p0, Src::lf(0.0), a),
                    _ => asm!(self).op_ge(p0, a, Src::lf(0.0)),
                }
                asm!(self).op_movc(out, Src::r(ps, Src::ZZZZ), Src::lf(0.0), Src::lf(1.0));
            }
            ScalarOpcode::SetpInv => {
                // p0 = src == 1, ps = p0 ? 0 : (src == 0 ? 1 : src).
                asm!(self).op_eq(Dest::r(ps, 0b0100), a, Src::lf(1.0));
                let temp = self.push_temp(0);
                asm!(self).op_eq(Dest::r(temp, 0b0001), a, Src::lf(0.0));
                asm!(self).op_movc(out, Src::r(temp, Src::XXXX), Src::lf(1.0), a);
                self.pop_temp();
                asm!(self).op_movc(out, Src::r(ps, Src::ZZZZ), Src::lf(0.0), ps_src);
            }
            ScalarOpcode::SetpPop => {
                // p0 = src - 1 <= 0, ps = p0 ? 0 : src - 1.
                asm!(self).op_add(out, a, Src::lf(-1.0), false);
                asm!(self).op_ge(Dest::r(ps, 0b0100), Src::lf(0.0), ps_src);
                asm!(self).op_movc(out, Src::r(ps, Src::ZZZZ), Src::lf(0.0), ps_src);
            }
            ScalarOpcode::SetpRstr => {
                asm!(self).op_eq(Dest::r(ps, 0b0100), a, Src::lf(0.0));
                asm!(self).op_mov(out, a, false);
            }
            ScalarOpcode::KillsEq | ScalarOpcode::KillsGt | ScalarOpcode::KillsGe | ScalarOpcode::KillsNe
            | ScalarOpcode::KillsOne => {
                let temp = self.push_temp(0);
                let test = Dest::r(temp, 0b0001);
                match opcode {
                    ScalarOpcode::KillsEq => asm!(self).op_eq(test, a, Src::lf(0.0)),
                    ScalarOpcode::KillsGt => asm!(self).op_lt(test, Src::lf(0.0), a),
                    ScalarOpcode::KillsGe => asm!(self).op_ge(test, a, Src::lf(0.0)),
                    ScalarOpcode::KillsNe => asm!(self).op_ne(test, a, Src::lf(0.0)),
                    _ => asm!(self).op_eq(test, a, Src::lf(1.0)),
                }
                asm!(self).op_and(out, Src::r(temp, Src::XXXX), Src::lf(1.0));
                self.emit_kill(Src::r(temp, Src::XXXX));
                self.pop_temp();
            }
            ScalarOpcode::Sqrt => asm!(self).op_sqrt(out, a),
            ScalarOpcode::Sin => asm!(self).op_sincos(out, Dest::null(), a),
            ScalarOpcode::Cos => asm!(self).op_sincos(Dest::null(), out, a),
            ScalarOpcode::SetpClr | ScalarOpcode::RetainPrev | ScalarOpcode::Unknown(_) => {}
        }

        self.release_alu_operands(loaded);
        self.store_result(&instr.result, ps_src, false);
        // The result is stored under the old predicate.
        if opcode.writes_predicate() {
            self.mark_predicate_written();
        }
    }

    /// Fixes up an infinite `ps` from `rcp` or `rsq`: clamped to the
    /// largest finite value, or replaced with a zero of the same sign.
    fn emit_infinity_fixup(&mut self, clamp: bool, flush: bool) {
        let ps = self.sys.ps_pc_p0_a0;
        let out = Dest::r(ps, 0b0001);
        let ps_src = Src::r(ps, Src::XXXX);
        if clamp {
            asm!(self).op_max(out, ps_src, Src::lf(-FLT_MAX));
            asm!(self).op_min(out, ps_src, Src::lf(FLT_MAX));
        } else if flush {
            let temp = self.push_temp(0);
            asm!(self).op_eq(Dest::r(temp, 0b0001), ps_src.abs(), Src::lf(f32::INFINITY));
            asm!(self).op_and(Dest::r(temp, 0b0010), ps_src, Src::lu(0x8000_0000));
            asm!(self).op_movc(out, Src::r(temp, Src::XXXX), Src::r(temp, Src::YYYY), ps_src);
            self.pop_temp();
        }
    }
}

#[cfg(test)]
mod tests {
    use xenos_dxbc::shex::ShexProgram;
    use xenos_dxbc::test_utils::decode_container_program;
    use xenos_dxbc::Opcode;

    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{ShaderInfo, ShaderStage};
    use crate::translator::Translator;
    use crate::ucode::{
        ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction, Predication, ResultStorage,
        ScalarAluInstruction, ScalarOpcode, SwizzleSource, VectorAluInstruction, VectorOpcode,
    };

    fn translate(body: Vec<ParsedInstruction>) -> ShexProgram {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let mut instructions = vec![ParsedInstruction::Exec(exec)];
        instructions.extend(body);
        instructions.push(ParsedInstruction::ExecEnd(exec));
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 4;
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator
            .translate(&instructions, &info, Modification::default_pixel())
            .unwrap();
        assert!(translation.is_valid);
        decode_container_program(&translation.dxbc)
    }

    fn vector(opcode: VectorOpcode, operands: Vec<InstructionOperand>) -> ParsedInstruction {
        ParsedInstruction::VectorAlu(VectorAluInstruction {
            opcode,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
            operands,
        })
    }

    fn scalar(opcode: ScalarOpcode, operands: Vec<InstructionOperand>) -> ParsedInstruction {
        ParsedInstruction::ScalarAlu(ScalarAluInstruction {
            opcode,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 0, 0b0001),
            operands,
        })
    }

    fn r(index: u32) -> InstructionOperand {
        InstructionOperand::register(index)
    }

    #[test]
    fn mad_is_never_fused() {
        let program = translate(vec![vector(VectorOpcode::Mad, vec![r(1), r(2), r(3)])]);
        assert_eq!(program.count(Opcode::Mad), 0);
        assert_eq!(program.count(Opcode::Mul), 1);
        // Product flushed against zero factors.
        assert_eq!(program.count(Opcode::MovC), 1);
    }

    #[test]
    fn squaring_skips_the_flush() {
        let program = translate(vec![vector(VectorOpcode::Mul, vec![r(1), r(1)])]);
        assert_eq!(program.count(Opcode::Mul), 1);
        assert_eq!(program.count(Opcode::MovC), 0);
        assert_eq!(program.count(Opcode::Eq), 0);
    }

    #[test]
    fn dp4_of_one_vector_uses_the_host_instruction() {
        let program = translate(vec![vector(VectorOpcode::Dp4, vec![r(1), r(1)])]);
        assert_eq!(program.count(Opcode::Dp4), 1);
        let program = translate(vec![vector(VectorOpcode::Dp4, vec![r(1), r(2)])]);
        assert_eq!(program.count(Opcode::Dp4), 0);
        assert_eq!(program.count(Opcode::Add), 3);
    }

    #[test]
    fn max4_compares_unique_components() {
        let splat = r(1).swizzled([SwizzleSource::X, SwizzleSource::X, SwizzleSource::Y, SwizzleSource::Y]);
        let program = translate(vec![vector(VectorOpcode::Max4, vec![splat])]);
        assert_eq!(program.count(Opcode::Max), 1);
    }

    #[test]
    fn setp_push_writes_the_predicate() {
        let program = translate(vec![
            vector(VectorOpcode::SetpEqPush, vec![r(1), r(2)]),
            vector(VectorOpcode::Max, vec![r(1), r(1)]),
        ]);
        assert!(program.count(Opcode::Eq) >= 2);
        assert!(program.count(Opcode::And) >= 1);
    }

    #[test]
    fn vector_kill_discards() {
        let program = translate(vec![vector(VectorOpcode::KillGe, vec![r(1), r(2)])]);
        assert_eq!(program.count(Opcode::Discard), 1);
        assert_eq!(program.count(Opcode::RetC), 0);
    }

    #[test]
    fn cube_selects_a_major_axis() {
        let zzxy = r(1).swizzled([SwizzleSource::Z, SwizzleSource::Z, SwizzleSource::X, SwizzleSource::Y]);
        let yxzz = r(1).swizzled([SwizzleSource::Y, SwizzleSource::X, SwizzleSource::Z, SwizzleSource::Z]);
        let program = translate(vec![vector(VectorOpcode::Cube, vec![zzxy, yxzz])]);
        assert_eq!(program.count(Opcode::If), 2);
        assert_eq!(program.count(Opcode::Else), 2);
    }

    #[test]
    fn scalar_ops_lower_to_host_instructions() {
        let x = r(1).scalar(SwizzleSource::X);
        let program = translate(vec![
            scalar(ScalarOpcode::Sqrt, vec![x]),
            scalar(ScalarOpcode::Sin, vec![x]),
            scalar(ScalarOpcode::Rcpc, vec![x]),
            scalar(ScalarOpcode::Rsqf, vec![x]),
        ]);
        assert_eq!(program.count(Opcode::Sqrt), 1);
        assert_eq!(program.count(Opcode::SinCos), 1);
        assert_eq!(program.count(Opcode::Rcp), 1);
        assert_eq!(program.count(Opcode::Rsq), 1);
    }

    #[test]
    fn maxas_sets_the_address_register() {
        let xy = r(1).swizzled([SwizzleSource::X, SwizzleSource::Y, SwizzleSource::Y, SwizzleSource::Y]);
        let program = translate(vec![scalar(ScalarOpcode::MaxAs, vec![xy])]);
        assert_eq!(program.count(Opcode::FToI), 1);
        assert_eq!(program.count(Opcode::RoundNi), 1);
    }

    #[test]
    fn unknown_scalar_opcode_is_reported_once() {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let instructions = [
            ParsedInstruction::Exec(exec),
            scalar(ScalarOpcode::Unknown(41), vec![r(0)]),
            ParsedInstruction::ExecEnd(exec),
        ];
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator
            .translate(&instructions, &info, Modification::default_vertex())
            .unwrap();
        assert!(!translation.is_valid);
        assert_eq!(translation.diagnostics.len(), 1);
    }
}
