//! Instruction emitter.
//!
//! [`Assembler`] appends SM5 tokens to a caller-owned `Vec<u32>` and keeps a
//! [`Statistics`] record in sync. One method per opcode; each takes operands
//! by value since [`Dest`] and [`Src`] are small `Copy` types.

use crate::opcode::{
    opcode_token, sample_controls_token, CbAccessPattern, CustomDataClass, GlobalFlags,
    InterpolationMode, Name, Opcode, ResourceDimension, SamplerMode, UavFlags,
    ALIGNMENT_PADDING, TEST_NONZERO_BIT,
};
use crate::operand::{Dest, OperandType, Src};
use crate::stats::Statistics;

#[derive(Clone, Copy)]
enum Counter {
    None,
    Float,
    Int,
    UInt,
    Conversion,
}

/// Appends shader model 5 instructions to a token buffer.
pub struct Assembler<'a> {
    code: &'a mut Vec<u32>,
    stat: &'a mut Statistics,
}

impl<'a> Assembler<'a> {
    /// Wraps a token buffer and its statistics.
    pub fn new(code: &'a mut Vec<u32>, stat: &'a mut Statistics) -> Self {
        Self { code, stat }
    }

    /// Current length of the token buffer in dwords.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    /// Read access to the statistics.
    pub fn stats(&self) -> &Statistics {
        self.stat
    }

    fn bump(&mut self, counter: Counter) {
        match counter {
            Counter::None => {}
            Counter::Float => self.stat.float_instruction_count += 1,
            Counter::Int => self.stat.int_instruction_count += 1,
            Counter::UInt => self.stat.uint_instruction_count += 1,
            Counter::Conversion => self.stat.conversion_instruction_count += 1,
        }
    }

    fn emit_alu(
        &mut self,
        opcode: Opcode,
        src_are_integer: u32,
        dests: &[Dest],
        srcs: &[Src],
        saturate: bool,
        counter: Counter,
    ) {
        let write_mask = dests.iter().fold(0, |m, d| m | d.mask(false));
        let operands_length = dests.iter().map(Dest::len).sum::<u32>()
            + srcs.iter().map(|s| s.len(write_mask, false)).sum::<u32>();
        self.code.reserve(1 + operands_length as usize);
        self.code
            .push(opcode_token(opcode, operands_length, saturate, 0));
        for dest in dests {
            dest.write(self.code, false);
        }
        for (i, src) in srcs.iter().enumerate() {
            src.write(self.code, src_are_integer & (1 << i) != 0, write_mask, false, false);
        }
        self.stat.instruction_count += 1;
        self.bump(counter);
    }

    fn emit_flow(&mut self, opcode: Opcode, srcs: &[Src], test: bool) {
        let operands_length = srcs.iter().map(|s| s.len(0, false)).sum::<u32>();
        self.code.push(
            opcode_token(opcode, operands_length, false, 0)
                | if test { TEST_NONZERO_BIT } else { 0 },
        );
        for src in srcs {
            src.write(self.code, true, 0, false, false);
        }
        self.stat.instruction_count += 1;
    }

    fn emit_bare(&mut self, opcode: Opcode) {
        self.code.push(opcode_token(opcode, 0, false, 0));
        self.stat.instruction_count += 1;
    }

    // Float arithmetic.

    /// `add`
    pub fn op_add(&mut self, dest: Dest, a: Src, b: Src, saturate: bool) {
        self.emit_alu(Opcode::Add, 0b00, &[dest], &[a, b], saturate, Counter::Float);
    }

    /// `div`
    pub fn op_div(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Div, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    fn emit_dp(&mut self, opcode: Opcode, mask: u32, dest: Dest, a: Src, b: Src) {
        let operands_length = dest.len() + a.len(mask, false) + b.len(mask, false);
        self.code
            .push(opcode_token(opcode, operands_length, false, 0));
        dest.write(self.code, false);
        a.write(self.code, false, mask, false, false);
        b.write(self.code, false, mask, false, false);
        self.stat.instruction_count += 1;
        self.stat.float_instruction_count += 1;
    }

    /// `dp2`
    pub fn op_dp2(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_dp(Opcode::Dp2, 0b0011, dest, a, b);
    }

    /// `dp3`
    pub fn op_dp3(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_dp(Opcode::Dp3, 0b0111, dest, a, b);
    }

    /// `dp4`
    pub fn op_dp4(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_dp(Opcode::Dp4, 0b1111, dest, a, b);
    }

    /// `eq`
    pub fn op_eq(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Eq, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `ne`
    pub fn op_ne(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Ne, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `lt`
    pub fn op_lt(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Lt, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `ge`
    pub fn op_ge(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Ge, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `exp` (base 2)
    pub fn op_exp(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Exp, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `log` (base 2)
    pub fn op_log(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Log, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `frc`
    pub fn op_frc(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Frc, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `mad`
    pub fn op_mad(&mut self, dest: Dest, a: Src, b: Src, c: Src, saturate: bool) {
        self.emit_alu(Opcode::Mad, 0b000, &[dest], &[a, b, c], saturate, Counter::Float);
    }

    /// `min`
    pub fn op_min(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Min, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `max`
    pub fn op_max(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Max, 0b00, &[dest], &[a, b], false, Counter::Float);
    }

    /// `mul`
    pub fn op_mul(&mut self, dest: Dest, a: Src, b: Src, saturate: bool) {
        self.emit_alu(Opcode::Mul, 0b00, &[dest], &[a, b], saturate, Counter::Float);
    }

    /// `mov`
    pub fn op_mov(&mut self, dest: Dest, src: Src, saturate: bool) {
        self.emit_alu(Opcode::Mov, 0, &[dest], &[src], saturate, Counter::None);
        if dest.address.ty == OperandType::IndexableTemp
            || src.address.ty == OperandType::IndexableTemp
        {
            self.stat.array_instruction_count += 1;
        } else {
            self.stat.mov_instruction_count += 1;
        }
    }

    /// `movc`
    pub fn op_movc(&mut self, dest: Dest, test: Src, nonzero: Src, zero: Src) {
        self.emit_alu(Opcode::MovC, 0b001, &[dest], &[test, nonzero, zero], false, Counter::None);
        self.stat.movc_instruction_count += 1;
    }

    /// `round_ne`
    pub fn op_round_ne(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::RoundNe, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `round_ni`
    pub fn op_round_ni(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::RoundNi, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `round_z`
    pub fn op_round_z(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::RoundZ, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `rsq`
    pub fn op_rsq(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Rsq, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `rcp`
    pub fn op_rcp(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Rcp, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `sqrt`
    pub fn op_sqrt(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Sqrt, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `sincos`
    pub fn op_sincos(&mut self, dest_sin: Dest, dest_cos: Dest, src: Src) {
        self.emit_alu(Opcode::SinCos, 0, &[dest_sin, dest_cos], &[src], false, Counter::Float);
    }

    /// `deriv_rtx_coarse`
    pub fn op_deriv_rtx_coarse(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::DerivRtxCoarse, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `deriv_rtx_fine`
    pub fn op_deriv_rtx_fine(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::DerivRtxFine, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `deriv_rty_coarse`
    pub fn op_deriv_rty_coarse(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::DerivRtyCoarse, 0, &[dest], &[src], false, Counter::Float);
    }

    /// `deriv_rty_fine`
    pub fn op_deriv_rty_fine(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::DerivRtyFine, 0, &[dest], &[src], false, Counter::Float);
    }

    // Integer arithmetic.

    /// `iadd`
    pub fn op_iadd(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IAdd, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `ieq`
    pub fn op_ieq(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IEq, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `ine`
    pub fn op_ine(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::INe, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `ige`
    pub fn op_ige(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IGe, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `ilt`
    pub fn op_ilt(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::ILt, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `imad`
    pub fn op_imad(&mut self, dest: Dest, a: Src, b: Src, c: Src) {
        self.emit_alu(Opcode::IMad, 0b111, &[dest], &[a, b, c], false, Counter::Int);
    }

    /// `imax`
    pub fn op_imax(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IMax, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `imin`
    pub fn op_imin(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IMin, 0b11, &[dest], &[a, b], false, Counter::Int);
    }

    /// `imul`
    pub fn op_imul(&mut self, dest_hi: Dest, dest_lo: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::IMul, 0b11, &[dest_hi, dest_lo], &[a, b], false, Counter::Int);
    }

    /// `ishl`
    pub fn op_ishl(&mut self, dest: Dest, value: Src, shift: Src) {
        self.emit_alu(Opcode::IShl, 0b11, &[dest], &[value, shift], false, Counter::Int);
    }

    /// `ibfe`
    pub fn op_ibfe(&mut self, dest: Dest, width: Src, offset: Src, src: Src) {
        self.emit_alu(Opcode::IBfe, 0b111, &[dest], &[width, offset, src], false, Counter::Int);
    }

    // Unsigned and bitwise.

    /// `and`
    pub fn op_and(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::And, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `or`
    pub fn op_or(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Or, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `xor`
    pub fn op_xor(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::Xor, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `not`
    pub fn op_not(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::Not, 0b1, &[dest], &[src], false, Counter::UInt);
    }

    /// `ult`
    pub fn op_ult(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::ULt, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `uge`
    pub fn op_uge(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::UGe, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `umul`
    pub fn op_umul(&mut self, dest_hi: Dest, dest_lo: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::UMul, 0b11, &[dest_hi, dest_lo], &[a, b], false, Counter::UInt);
    }

    /// `umad`
    pub fn op_umad(&mut self, dest: Dest, a: Src, b: Src, c: Src) {
        self.emit_alu(Opcode::UMad, 0b111, &[dest], &[a, b, c], false, Counter::UInt);
    }

    /// `umax`
    pub fn op_umax(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::UMax, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `umin`
    pub fn op_umin(&mut self, dest: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::UMin, 0b11, &[dest], &[a, b], false, Counter::UInt);
    }

    /// `ushr`
    pub fn op_ushr(&mut self, dest: Dest, value: Src, shift: Src) {
        self.emit_alu(Opcode::UShr, 0b11, &[dest], &[value, shift], false, Counter::UInt);
    }

    /// `udiv`
    pub fn op_udiv(&mut self, quotient: Dest, remainder: Dest, a: Src, b: Src) {
        self.emit_alu(Opcode::UDiv, 0b11, &[quotient, remainder], &[a, b], false, Counter::UInt);
    }

    /// `ubfe`
    pub fn op_ubfe(&mut self, dest: Dest, width: Src, offset: Src, src: Src) {
        self.emit_alu(Opcode::UBfe, 0b111, &[dest], &[width, offset, src], false, Counter::UInt);
    }

    /// `bfi`
    pub fn op_bfi(&mut self, dest: Dest, width: Src, offset: Src, from: Src, to: Src) {
        self.emit_alu(
            Opcode::Bfi,
            0b1111,
            &[dest],
            &[width, offset, from, to],
            false,
            Counter::UInt,
        );
    }

    /// `bfrev`
    pub fn op_bfrev(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::BfRev, 0b1, &[dest], &[src], false, Counter::UInt);
    }

    /// `firstbit_hi`
    pub fn op_firstbit_hi(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::FirstBitHi, 0b1, &[dest], &[src], false, Counter::UInt);
    }

    /// `firstbit_lo`
    pub fn op_firstbit_lo(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::FirstBitLo, 0b1, &[dest], &[src], false, Counter::UInt);
    }

    // Conversions.

    /// `ftoi`
    pub fn op_ftoi(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::FToI, 0, &[dest], &[src], false, Counter::Conversion);
    }

    /// `ftou`
    pub fn op_ftou(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::FToU, 0, &[dest], &[src], false, Counter::Conversion);
    }

    /// `itof`
    pub fn op_itof(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::IToF, 0b1, &[dest], &[src], false, Counter::Conversion);
    }

    /// `utof`
    pub fn op_utof(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::UToF, 0b1, &[dest], &[src], false, Counter::Conversion);
    }

    /// `f32tof16`
    pub fn op_f32tof16(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::F32ToF16, 0, &[dest], &[src], false, Counter::Conversion);
    }

    /// `f16tof32`
    pub fn op_f16tof32(&mut self, dest: Dest, src: Src) {
        self.emit_alu(Opcode::F16ToF32, 0b1, &[dest], &[src], false, Counter::Conversion);
    }

    // Flow control.

    /// `if_z` / `if_nz`
    pub fn op_if(&mut self, test: bool, src: Src) {
        self.emit_flow(Opcode::If, &[src], test);
        self.stat.dynamic_flow_control_count += 1;
    }

    /// `else`
    pub fn op_else(&mut self) {
        self.emit_bare(Opcode::Else);
    }

    /// `endif`
    pub fn op_endif(&mut self) {
        self.emit_bare(Opcode::EndIf);
    }

    /// `loop`
    pub fn op_loop(&mut self) {
        self.emit_bare(Opcode::Loop);
        self.stat.dynamic_flow_control_count += 1;
    }

    /// `endloop`
    pub fn op_endloop(&mut self) {
        self.emit_bare(Opcode::EndLoop);
    }

    /// `break`
    pub fn op_break(&mut self) {
        self.emit_bare(Opcode::Break);
    }

    /// `continue`
    pub fn op_continue(&mut self) {
        self.emit_bare(Opcode::Continue);
    }

    /// `switch`
    pub fn op_switch(&mut self, src: Src) {
        self.emit_flow(Opcode::Switch, &[src], false);
        self.stat.dynamic_flow_control_count += 1;
    }

    /// `case`
    pub fn op_case(&mut self, src: Src) {
        self.emit_flow(Opcode::Case, &[src], false);
        self.stat.static_flow_control_count += 1;
    }

    /// `default`
    pub fn op_default(&mut self) {
        self.emit_bare(Opcode::Default);
        self.stat.static_flow_control_count += 1;
    }

    /// `endswitch`
    pub fn op_endswitch(&mut self) {
        self.emit_bare(Opcode::EndSwitch);
    }

    /// `ret`
    pub fn op_ret(&mut self) {
        self.emit_bare(Opcode::Ret);
        self.stat.static_flow_control_count += 1;
    }

    /// `retc_z` / `retc_nz`
    pub fn op_retc(&mut self, test: bool, src: Src) {
        self.emit_flow(Opcode::RetC, &[src], test);
        self.stat.dynamic_flow_control_count += 1;
    }

    /// `discard_z` / `discard_nz`
    pub fn op_discard(&mut self, test: bool, src: Src) {
        self.emit_flow(Opcode::Discard, &[src], test);
    }

    /// `call`
    pub fn op_call(&mut self, label: Src) {
        self.emit_flow(Opcode::Call, &[label], false);
        self.stat.static_flow_control_count += 1;
    }

    /// `callc_z` / `callc_nz`
    pub fn op_callc(&mut self, test: bool, src: Src, label: Src) {
        self.emit_flow(Opcode::CallC, &[src, label], test);
        self.stat.dynamic_flow_control_count += 1;
    }

    /// `label`; not counted as an instruction.
    pub fn op_label(&mut self, label: Src) {
        let operands_length = label.len(0, false);
        self.code
            .push(opcode_token(Opcode::Label, operands_length, false, 0));
        label.write(self.code, true, 0, false, false);
    }

    // Resource access.

    fn push_sample_controls(&mut self, offsets: [i32; 3]) -> u32 {
        if offsets == [0; 3] {
            return 0;
        }
        self.code
            .push(sample_controls_token(offsets[0], offsets[1], offsets[2]));
        1
    }

    fn opcode_with_controls(&mut self, opcode: Opcode, operands_length: u32, offsets: [i32; 3]) {
        let extended = u32::from(offsets != [0; 3]);
        self.code
            .push(opcode_token(opcode, operands_length, false, extended));
        self.push_sample_controls(offsets);
    }

    /// `ld` with an optional immediate texel offset.
    pub fn op_ld(&mut self, dest: Dest, address: Src, address_mask: u32, resource: Src, offsets: [i32; 3]) {
        let write_mask = dest.mask(false);
        let operands_length =
            dest.len() + address.len(address_mask, true) + resource.len(write_mask, true);
        self.opcode_with_controls(Opcode::Ld, operands_length, offsets);
        dest.write(self.code, false);
        address.write(self.code, true, address_mask, true, false);
        resource.write(self.code, false, write_mask, true, false);
        self.stat.instruction_count += 1;
        self.stat.texture_load_instructions += 1;
    }

    /// `sample`, implicit LOD from derivatives.
    pub fn op_sample(
        &mut self,
        dest: Dest,
        address: Src,
        address_components: u32,
        resource: Src,
        sampler: Src,
        offsets: [i32; 3],
    ) {
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let operands_length = dest.len()
            + address.len(address_mask, false)
            + resource.len(write_mask, true)
            + sampler.len(0, false);
        self.opcode_with_controls(Opcode::Sample, operands_length, offsets);
        dest.write(self.code, false);
        address.write(self.code, false, address_mask, false, false);
        resource.write(self.code, false, write_mask, true, false);
        sampler.write(self.code, false, 0, false, false);
        self.stat.instruction_count += 1;
        self.stat.texture_normal_instructions += 1;
    }

    /// `sample_b`
    #[allow(clippy::too_many_arguments)]
    pub fn op_sample_b(
        &mut self,
        dest: Dest,
        address: Src,
        address_components: u32,
        resource: Src,
        sampler: Src,
        bias: Src,
        offsets: [i32; 3],
    ) {
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let operands_length = dest.len()
            + address.len(address_mask, false)
            + resource.len(write_mask, true)
            + sampler.len(0, false)
            + bias.len(0, false);
        self.opcode_with_controls(Opcode::SampleB, operands_length, offsets);
        dest.write(self.code, false);
        address.write(self.code, false, address_mask, false, false);
        resource.write(self.code, false, write_mask, true, false);
        sampler.write(self.code, false, 0, false, false);
        bias.write(self.code, false, 0, false, false);
        self.stat.instruction_count += 1;
        self.stat.texture_bias_instructions += 1;
    }

    /// `sample_l`
    #[allow(clippy::too_many_arguments)]
    pub fn op_sample_l(
        &mut self,
        dest: Dest,
        address: Src,
        address_components: u32,
        resource: Src,
        sampler: Src,
        lod: Src,
        offsets: [i32; 3],
    ) {
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let operands_length = dest.len()
            + address.len(address_mask, false)
            + resource.len(write_mask, true)
            + sampler.len(0, false)
            + lod.len(0, false);
        self.opcode_with_controls(Opcode::SampleL, operands_length, offsets);
        dest.write(self.code, false);
        address.write(self.code, false, address_mask, false, false);
        resource.write(self.code, false, write_mask, true, false);
        sampler.write(self.code, false, 0, false, false);
        lod.write(self.code, false, 0, false, false);
        self.stat.instruction_count += 1;
        self.stat.texture_normal_instructions += 1;
    }

    /// `sample_d`
    #[allow(clippy::too_many_arguments)]
    pub fn op_sample_d(
        &mut self,
        dest: Dest,
        address: Src,
        address_components: u32,
        resource: Src,
        sampler: Src,
        ddx: Src,
        ddy: Src,
        derivative_components: u32,
        offsets: [i32; 3],
    ) {
        debug_assert!(derivative_components <= address_components);
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let derivative_mask = (1 << derivative_components) - 1;
        let force_vector = address_components > 1;
        let operands_length = dest.len()
            + address.len(address_mask, false)
            + resource.len(write_mask, true)
            + sampler.len(0, false)
            + ddx.len(derivative_mask, force_vector)
            + ddy.len(derivative_mask, force_vector);
        self.opcode_with_controls(Opcode::SampleD, operands_length, offsets);
        dest.write(self.code, false);
        address.write(self.code, false, address_mask, false, false);
        resource.write(self.code, false, write_mask, true, false);
        sampler.write(self.code, false, 0, false, false);
        ddx.write(self.code, false, derivative_mask, force_vector, false);
        ddy.write(self.code, false, derivative_mask, force_vector, false);
        self.stat.instruction_count += 1;
        self.stat.texture_gradient_instructions += 1;
    }

    /// `lod`
    pub fn op_lod(&mut self, dest: Dest, address: Src, address_components: u32, resource: Src, sampler: Src) {
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let operands_length = dest.len()
            + address.len(address_mask, false)
            + resource.len(write_mask, false)
            + sampler.len(0, false);
        self.code
            .push(opcode_token(Opcode::Lod, operands_length, false, 0));
        dest.write(self.code, false);
        address.write(self.code, false, address_mask, false, false);
        resource.write(self.code, false, write_mask, false, false);
        sampler.write(self.code, false, 0, false, false);
        self.stat.instruction_count += 1;
        self.stat.lod_instructions += 1;
    }

    /// `ld_raw`: loads `popcount(dest mask)` dwords starting at a byte offset.
    pub fn op_ld_raw(&mut self, dest: Dest, byte_offset: Src, src: Src) {
        let write_mask = dest.mask(false);
        debug_assert!(matches!(
            write_mask,
            0b0001 | 0b0010 | 0b0100 | 0b1000 | 0b0011 | 0b0111 | 0b1111
        ));
        let src_mask = (1 << write_mask.count_ones()) - 1;
        let operands_length = dest.len() + byte_offset.len(0, false) + src.len(src_mask, true);
        self.code
            .push(opcode_token(Opcode::LdRaw, operands_length, false, 0));
        dest.write(self.code, false);
        byte_offset.write(self.code, true, 0, false, false);
        src.write(self.code, true, src_mask, true, false);
        self.stat.instruction_count += 1;
        self.stat.texture_load_instructions += 1;
    }

    /// `store_raw`
    pub fn op_store_raw(&mut self, dest: Dest, byte_offset: Src, value: Src) {
        let write_mask = dest.mask(false);
        debug_assert!(matches!(write_mask, 0b0001 | 0b0011 | 0b0111 | 0b1111));
        let operands_length =
            dest.len() + byte_offset.len(0, false) + value.len(write_mask, false);
        self.code
            .push(opcode_token(Opcode::StoreRaw, operands_length, false, 0));
        dest.write(self.code, false);
        byte_offset.write(self.code, true, 0, false, false);
        value.write(self.code, true, write_mask, false, false);
        self.stat.instruction_count += 1;
        self.stat.texture_store_instructions += 1;
    }

    /// `ld_uav_typed`
    pub fn op_ld_uav_typed(&mut self, dest: Dest, address: Src, address_components: u32, uav: Src) {
        let write_mask = dest.mask(false);
        let address_mask = (1 << address_components) - 1;
        let operands_length =
            dest.len() + address.len(address_mask, true) + uav.len(write_mask, true);
        self.code
            .push(opcode_token(Opcode::LdUavTyped, operands_length, false, 0));
        dest.write(self.code, false);
        address.write(self.code, true, address_mask, true, false);
        uav.write(self.code, false, write_mask, true, false);
        self.stat.instruction_count += 1;
        self.stat.texture_load_instructions += 1;
    }

    /// `store_uav_typed`
    pub fn op_store_uav_typed(&mut self, dest: Dest, address: Src, address_components: u32, value: Src) {
        let write_mask = dest.mask(false);
        debug_assert_eq!(write_mask, 0b1111);
        let address_mask = (1 << address_components) - 1;
        let operands_length =
            dest.len() + address.len(address_mask, true) + value.len(write_mask, false);
        self.code
            .push(opcode_token(Opcode::StoreUavTyped, operands_length, false, 0));
        dest.write(self.code, false);
        address.write(self.code, true, address_mask, true, false);
        value.write(self.code, false, write_mask, false, false);
        self.stat.instruction_count += 1;
        self.stat.texture_store_instructions += 1;
    }

    fn emit_atomic(&mut self, opcode: Opcode, dest: Dest, address: Src, address_components: u32, value: Src) {
        let address_mask = (1 << address_components) - 1;
        let operands_length =
            dest.len() + address.len(address_mask, false) + value.len(0b0001, false);
        self.code
            .push(opcode_token(opcode, operands_length, false, 0));
        dest.write(self.code, false);
        address.write(self.code, true, address_mask, false, false);
        value.write(self.code, true, 0b0001, false, false);
        self.stat.instruction_count += 1;
        self.stat.interlocked_instructions += 1;
    }

    /// `atomic_and` on a UAV.
    pub fn op_atomic_and(&mut self, dest: Dest, address: Src, address_components: u32, value: Src) {
        self.emit_atomic(Opcode::AtomicAnd, dest, address, address_components, value);
    }

    /// `atomic_or` on a UAV.
    pub fn op_atomic_or(&mut self, dest: Dest, address: Src, address_components: u32, value: Src) {
        self.emit_atomic(Opcode::AtomicOr, dest, address, address_components, value);
    }

    /// `eval_sample_index`
    pub fn op_eval_sample_index(&mut self, dest: Dest, value: Src, sample_index: Src) {
        let write_mask = dest.mask(false);
        let operands_length = dest.len() + value.len(write_mask, false) + sample_index.len(0, false);
        self.code
            .push(opcode_token(Opcode::EvalSampleIndex, operands_length, false, 0));
        dest.write(self.code, false);
        value.write(self.code, false, write_mask, false, false);
        sample_index.write(self.code, true, 0, false, false);
        self.stat.instruction_count += 1;
    }

    /// `eval_centroid`
    pub fn op_eval_centroid(&mut self, dest: Dest, value: Src) {
        let write_mask = dest.mask(false);
        let operands_length = dest.len() + value.len(write_mask, false);
        self.code
            .push(opcode_token(Opcode::EvalCentroid, operands_length, false, 0));
        dest.write(self.code, false);
        value.write(self.code, false, write_mask, false, false);
        self.stat.instruction_count += 1;
    }

    /// `customdata`; returns the payload dword range within the token buffer.
    pub fn op_custom_data(&mut self, class: CustomDataClass, payload: &[u8]) -> core::ops::Range<usize> {
        let aligned = payload.len().div_ceil(4) * 4;
        let total_dwords = aligned / 4 + 2;
        self.code
            .push(Opcode::CustomData as u32 | ((class as u32) << 11));
        self.code.push(total_dwords as u32);
        let start = self.code.len();
        let mut bytes = payload.to_vec();
        bytes.resize(aligned, ALIGNMENT_PADDING);
        self.code.extend(
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        start..self.code.len()
    }

    // Declarations.

    /// `dcl_resource`
    pub fn op_dcl_resource(&mut self, dimension: ResourceDimension, return_type_token: u32, operand: Src, space: u32) {
        let operands_length = operand.len(0b1111, false);
        self.code.push(
            opcode_token(Opcode::DclResource, 2 + operands_length, false, 0)
                | ((dimension as u32) << 11),
        );
        operand.write(self.code, false, 0b1111, false, true);
        self.code.push(return_type_token);
        self.code.push(space);
    }

    /// `dcl_resource_raw`
    pub fn op_dcl_resource_raw(&mut self, operand: Src, space: u32) {
        let operands_length = operand.len(0b1111, false);
        self.code
            .push(opcode_token(Opcode::DclResourceRaw, 1 + operands_length, false, 0));
        operand.write(self.code, true, 0b1111, false, true);
        self.code.push(space);
    }

    /// `dcl_constantbuffer`
    pub fn op_dcl_constant_buffer(&mut self, operand: Src, size_vectors: u32, access: CbAccessPattern, space: u32) {
        let operands_length = operand.len(0b1111, false);
        self.code.push(
            opcode_token(Opcode::DclConstantBuffer, 2 + operands_length, false, 0)
                | ((access as u32) << 11),
        );
        operand.write(self.code, false, 0b1111, false, true);
        self.code.push(size_vectors);
        self.code.push(space);
    }

    /// `dcl_sampler`
    pub fn op_dcl_sampler(&mut self, operand: Src, mode: SamplerMode, space: u32) {
        let operands_length = operand.len(0b1111, false);
        self.code.push(
            opcode_token(Opcode::DclSampler, 1 + operands_length, false, 0) | ((mode as u32) << 11),
        );
        operand.write(self.code, false, 0b1111, false, true);
        self.code.push(space);
    }

    /// `dcl_uav_typed`
    pub fn op_dcl_uav_typed(
        &mut self,
        dimension: ResourceDimension,
        flags: UavFlags,
        return_type_token: u32,
        operand: Src,
        space: u32,
    ) {
        let operands_length = operand.len(0b1111, false);
        self.code.push(
            opcode_token(Opcode::DclUavTyped, 2 + operands_length, false, 0)
                | ((dimension as u32) << 11)
                | flags.bits(),
        );
        operand.write(self.code, false, 0b1111, false, true);
        self.code.push(return_type_token);
        self.code.push(space);
    }

    /// `dcl_uav_raw`
    pub fn op_dcl_uav_raw(&mut self, flags: UavFlags, operand: Src, space: u32) {
        let operands_length = operand.len(0b1111, false);
        self.code.push(
            opcode_token(Opcode::DclUavRaw, 1 + operands_length, false, 0) | flags.bits(),
        );
        operand.write(self.code, true, 0b1111, false, true);
        self.code.push(space);
    }

    fn emit_dcl_io(&mut self, opcode: Opcode, extra_bits: u32, operand: Dest, name: Option<Name>) {
        let operands_length = operand.len() + u32::from(name.is_some());
        self.code
            .push(opcode_token(opcode, operands_length, false, 0) | extra_bits);
        operand.write(self.code, true);
        if let Some(name) = name {
            self.code.push(name as u32);
        }
        self.stat.dcl_count += 1;
    }

    /// `dcl_input`
    pub fn op_dcl_input(&mut self, operand: Dest) {
        self.emit_dcl_io(Opcode::DclInput, 0, operand, None);
    }

    /// `dcl_input_sgv`
    pub fn op_dcl_input_sgv(&mut self, operand: Dest, name: Name) {
        self.emit_dcl_io(Opcode::DclInputSgv, 0, operand, Some(name));
    }

    /// `dcl_input_siv`
    pub fn op_dcl_input_siv(&mut self, operand: Dest, name: Name) {
        self.emit_dcl_io(Opcode::DclInputSiv, 0, operand, Some(name));
    }

    /// `dcl_input_ps`
    pub fn op_dcl_input_ps(&mut self, mode: InterpolationMode, operand: Dest) {
        self.emit_dcl_io(Opcode::DclInputPs, (mode as u32) << 11, operand, None);
    }

    /// `dcl_input_ps_sgv` (always constant interpolation)
    pub fn op_dcl_input_ps_sgv(&mut self, operand: Dest, name: Name) {
        self.emit_dcl_io(
            Opcode::DclInputPsSgv,
            (InterpolationMode::Constant as u32) << 11,
            operand,
            Some(name),
        );
    }

    /// `dcl_input_ps_siv`
    pub fn op_dcl_input_ps_siv(&mut self, mode: InterpolationMode, operand: Dest, name: Name) {
        self.emit_dcl_io(Opcode::DclInputPsSiv, (mode as u32) << 11, operand, Some(name));
    }

    /// `dcl_output`
    pub fn op_dcl_output(&mut self, operand: Dest) {
        self.emit_dcl_io(Opcode::DclOutput, 0, operand, None);
    }

    /// `dcl_output_siv`
    pub fn op_dcl_output_siv(&mut self, operand: Dest, name: Name) {
        self.emit_dcl_io(Opcode::DclOutputSiv, 0, operand, Some(name));
    }

    /// `dcl_temps`; returns the position of the count so it can be patched.
    pub fn op_dcl_temps(&mut self, count: u32) -> usize {
        self.code
            .push(opcode_token(Opcode::DclTemps, 1, false, 0));
        self.code.push(count);
        self.stat.temp_register_count = count;
        self.code.len() - 1
    }

    /// `dcl_indexableTemp`
    pub fn op_dcl_indexable_temp(&mut self, index: u32, count: u32, components: u32) {
        self.code
            .push(opcode_token(Opcode::DclIndexableTemp, 3, false, 0));
        self.code.extend_from_slice(&[index, count, components]);
        self.stat.temp_array_count += count;
    }

    /// `dcl_globalFlags`
    pub fn op_dcl_global_flags(&mut self, flags: GlobalFlags) {
        self.code
            .push(opcode_token(Opcode::DclGlobalFlags, 0, false, 0) | flags.bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::Index;

    fn assemble(f: impl FnOnce(&mut Assembler<'_>)) -> (Vec<u32>, Statistics) {
        let mut code = Vec::new();
        let mut stat = Statistics::default();
        f(&mut Assembler::new(&mut code, &mut stat));
        (code, stat)
    }

    #[test]
    fn mov_scalar_immediate() {
        let (code, stat) = assemble(|a| a.op_mov(Dest::r(2, 0b0010), Src::lf(1.0), false));
        assert_eq!(
            code,
            vec![
                54 | (5 << 24),
                (1 << 20) | (2 << 4) | 2,
                2,
                // Scalar form because only one component is written.
                (4 << 12) | 1,
                1.0f32.to_bits(),
            ]
        );
        assert_eq!(stat.instruction_count, 1);
        assert_eq!(stat.mov_instruction_count, 1);
    }

    #[test]
    fn unused_swizzle_components_repeat_first_used() {
        let (code, _) = assemble(|a| {
            a.op_add(
                Dest::r(0, 0b1010),
                Src::r(1, Src::XYZW),
                Src::r(2, Src::XYZW),
                false,
            )
        });
        // y and w are written: x and z fall back to y.
        let swizzle = (code[3] >> 4) & 0xFF;
        assert_eq!(swizzle, 0b11_01_01_01);
    }

    #[test]
    fn negated_source_gets_extended_modifier_token() {
        let (code, _) = assemble(|a| {
            a.op_mul(Dest::r(0, 0b0001), -Src::r(1, Src::XXXX).abs(), Src::r(2, Src::XXXX), false)
        });
        assert_eq!(code[0] >> 24, 1 + 2 + 3 + 2);
        assert_ne!(code[3] & (1 << 31), 0);
        assert_eq!(code[4], 1 | (3 << 6));
    }

    #[test]
    fn flow_ops_set_test_bit() {
        let (code, stat) = assemble(|a| {
            a.op_if(true, Src::r(0, Src::XXXX));
            a.op_endif();
        });
        assert_ne!(code[0] & TEST_NONZERO_BIT, 0);
        assert_eq!(stat.instruction_count, 2);
        assert_eq!(stat.dynamic_flow_control_count, 1);
    }

    #[test]
    fn label_is_not_counted() {
        let (code, stat) = assemble(|a| a.op_label(Src::label(3)));
        assert_eq!(code.len(), 3);
        assert_eq!(stat.instruction_count, 0);
    }

    #[test]
    fn ld_raw_forces_vector_swizzle() {
        let (code, stat) = assemble(|a| {
            a.op_ld_raw(
                Dest::r(4, 0b0011),
                Src::r(1, Src::WWWW),
                Src::t(0, Index::imm(0), Src::XYZW),
            )
        });
        assert_eq!(code[0] & 0x7FF, Opcode::LdRaw as u32);
        assert_eq!(stat.texture_load_instructions, 1);
    }

    #[test]
    fn custom_data_pads_with_marker_byte() {
        let (code, _) = assemble(|a| {
            a.op_custom_data(CustomDataClass::Comment, b"abcde");
        });
        assert_eq!(code[1], 4);
        assert_eq!(code[3].to_le_bytes(), [b'e', 0xAB, 0xAB, 0xAB]);
    }

    #[test]
    fn dcl_temps_returns_patch_position() {
        let mut code = vec![0u32; 2];
        let mut stat = Statistics::default();
        let pos = Assembler::new(&mut code, &mut stat).op_dcl_temps(5);
        assert_eq!(pos, 3);
        assert_eq!(code[pos], 5);
        assert_eq!(stat.temp_register_count, 5);
    }
}
