//! Control flow, predication and the program counter.
//!
//! The shader body is `loop { switch (pc) { case 0: ... case L: ... } }`, or
//! with `if` chains `loop { if (pc == 0) { ... } if (L >= pc) { ... } }`.
//! Jumps set `pc` and `continue`, labels fall through into the next block.
//!
//! Exec conditions and instruction predicates become `if`s, kept open across
//! consecutive execs and instructions with the same condition when possible.

use tracing::trace;
use xenos_dxbc::{Dest, Src};

use super::Translator;
use crate::ucode::{
    AllocInstruction, AllocKind, ExecCondition, ExecInstruction, JumpInstruction, LoopEndInstruction,
    LoopStartInstruction, Predication,
};

/// `pc` value that matches no label.
const PC_END: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct ControlFlowState {
    /// Condition of the open exec `if`, `Unconditional` if none.
    exec: ExecCondition,
    /// `p0` was written since the exec `if` was opened.
    predicate_written: bool,
    /// Condition of the open instruction `if p0`.
    instruction_predicate: Option<bool>,
}

/// An exec `if` closed around derivative computations.
#[derive(Debug)]
#[must_use]
pub(super) struct SuspendedExec {
    condition: ExecCondition,
    /// Temp holding whether the exec was taken, when `p0` no longer tells.
    taken: Option<u32>,
}

impl Translator {
    fn pc(&self) -> Src {
        Src::r(self.sys.ps_pc_p0_a0, Src::YYYY)
    }

    fn p0(&self) -> Src {
        Src::r(self.sys.ps_pc_p0_a0, Src::ZZZZ)
    }

    /// Opens the `if` for an exec or jump condition, reusing the open one if
    /// it's known to have the same outcome.
    fn update_exec_conditionals(&mut self, condition: ExecCondition) {
        if self.config.merge_exec_conditionals {
            let merge = match condition {
                ExecCondition::Unconditional => self.cf.exec == ExecCondition::Unconditional,
                ExecCondition::BoolConstant { .. } => self.cf.exec == condition,
                ExecCondition::Predicate { .. } => !self.cf.predicate_written && self.cf.exec == condition,
            };
            if merge {
                self.emit_disassembly();
                return;
            }
        }

        self.close_exec_conditionals();
        self.emit_disassembly();
        match condition {
            ExecCondition::Unconditional => {}
            ExecCondition::BoolConstant { index, condition } => {
                let (bool_dword, bit) = self.bool_constant(index);
                let temp = self.push_temp(0);
                asm!(self).op_and(Dest::r(temp, 0b0001), bool_dword, Src::lu(bit));
                asm!(self).op_if(condition, Src::r(temp, Src::XXXX));
                self.pop_temp();
            }
            ExecCondition::Predicate { condition } => {
                let p0 = self.p0();
                asm!(self).op_if(condition, p0);
            }
        }
        trace!(condition = ?condition, "opened exec conditional");
        self.cf.exec = condition;
    }

    /// Closes the exec and instruction `if`s.
    pub(super) fn close_exec_conditionals(&mut self) {
        self.close_instruction_predication();
        if self.cf.exec != ExecCondition::Unconditional {
            asm!(self).op_endif();
        }
        self.cf.exec = ExecCondition::Unconditional;
        self.cf.predicate_written = false;
    }

    /// Opens the `if p0` of a predicated instruction unless the open exec or
    /// instruction `if` already has its condition. Also emits the
    /// disassembly, so call this before anything else for the instruction.
    pub(super) fn update_instruction_predication(&mut self, predication: Predication) {
        if !predication.is_predicated {
            self.close_instruction_predication();
            self.emit_disassembly();
            return;
        }
        if self.cf.instruction_predicate == Some(predication.condition) {
            self.emit_disassembly();
            return;
        }
        self.close_instruction_predication();
        self.emit_disassembly();
        if !self.cf.predicate_written
            && self.cf.exec
                == (ExecCondition::Predicate {
                    condition: predication.condition,
                })
        {
            return;
        }
        let p0 = self.p0();
        asm!(self).op_if(predication.condition, p0);
        self.cf.instruction_predicate = Some(predication.condition);
    }

    /// Leaves the exec and instruction `if`s, so code that takes
    /// derivatives runs for every lane of the quad. If `p0` was written since
    /// the exec was entered, whether the exec was taken is kept in a pushed
    /// temp, released by [`Self::end_unconditional`].
    pub(super) fn begin_unconditional(&mut self) -> SuspendedExec {
        self.emit_disassembly();
        self.close_instruction_predication();
        let condition = self.cf.exec;
        let mut taken = None;
        if matches!(condition, ExecCondition::Predicate { .. }) && self.cf.predicate_written {
            let temp = self.push_temp(0);
            asm!(self).op_mov(Dest::r(temp, 0b0001), Src::lu(u32::MAX), false);
            asm!(self).op_else();
            asm!(self).op_mov(Dest::r(temp, 0b0001), Src::lu(0), false);
            taken = Some(temp);
        }
        if condition != ExecCondition::Unconditional {
            asm!(self).op_endif();
        }
        self.cf.exec = ExecCondition::Unconditional;
        self.cf.predicate_written = false;
        SuspendedExec { condition, taken }
    }

    /// Re-enters the exec `if` left by [`Self::begin_unconditional`].
    pub(super) fn resume_conditionals(&mut self, suspended: &SuspendedExec) {
        match suspended.taken {
            Some(temp) => {
                asm!(self).op_if(true, Src::r(temp, Src::XXXX));
                self.cf.exec = suspended.condition;
                self.cf.predicate_written = true;
            }
            None => self.update_exec_conditionals(suspended.condition),
        }
    }

    pub(super) fn end_unconditional(&mut self, suspended: SuspendedExec) {
        if suspended.taken.is_some() {
            self.pop_temp();
        }
    }

    pub(super) fn close_instruction_predication(&mut self) {
        if self.cf.instruction_predicate.take().is_some() {
            asm!(self).op_endif();
        }
    }

    /// `p0` was just written: following predicated code must test it again.
    pub(super) fn mark_predicate_written(&mut self) {
        self.cf.predicate_written = true;
        self.close_instruction_predication();
    }

    fn jump_to_label(&mut self, address: u32) {
        let ps_pc_p0_a0 = self.sys.ps_pc_p0_a0;
        asm!(self).op_mov(Dest::r(ps_pc_p0_a0, 0b0010), Src::lu(address), false);
        asm!(self).op_continue();
    }

    pub(super) fn process_label(&mut self, cf_index: u32) {
        // Label 0 is opened in the prologue.
        if cf_index == 0 {
            return;
        }
        self.close_exec_conditionals();
        self.emit_disassembly();
        trace!(cf_index, "label");
        if self.config.use_switch() {
            // Fall through to the new case.
            self.jump_to_label(cf_index);
            asm!(self).op_break();
            asm!(self).op_case(Src::lu(cf_index));
        } else {
            asm!(self).op_endif();
            let pc = self.pc();
            let temp = self.push_temp(0);
            asm!(self).op_uge(Dest::r(temp, 0b0001), Src::lu(cf_index), pc);
            asm!(self).op_if(true, Src::r(temp, Src::XXXX));
            self.pop_temp();
        }
    }

    pub(super) fn process_exec_begin(&mut self, exec: &ExecInstruction) {
        self.update_exec_conditionals(exec.condition);
    }

    pub(super) fn process_exec_end(&mut self, exec: &ExecInstruction) {
        if exec.is_end {
            self.close_instruction_predication();
            if self.config.use_switch() {
                let ps_pc_p0_a0 = self.sys.ps_pc_p0_a0;
                asm!(self).op_mov(Dest::r(ps_pc_p0_a0, 0b0010), Src::lu(PC_END), false);
                asm!(self).op_continue();
            } else {
                asm!(self).op_break();
            }
        }
        if !self.config.merge_exec_conditionals {
            self.close_exec_conditionals();
        }
    }

    /// A jump is an exec `if` of its own, so it shares the open one when the
    /// conditions match. The instruction `if` is closed since the jump is on
    /// the flow control level.
    pub(super) fn process_jump(&mut self, jump: &JumpInstruction) {
        self.update_exec_conditionals(jump.condition);
        self.close_instruction_predication();
        self.jump_to_label(jump.target_address);
        trace!(target = jump.target_address, "jump");
    }

    pub(super) fn process_loop_start(&mut self, loop_start: &LoopStartInstruction) {
        self.close_exec_conditionals();
        self.emit_disassembly();

        let loop_constant = self.loop_constant(loop_start.loop_constant_index);
        let loop_count = self.sys.loop_count;
        let loop_address = self.sys.loop_address;

        let temp = self.push_temp(0);
        asm!(self).op_and(Dest::r(temp, 0b0001), loop_constant, Src::lu(0xFF));
        asm!(self).op_if(false, Src::r(temp, Src::XXXX));
        self.jump_to_label(loop_start.loop_skip_address);
        asm!(self).op_endif();
        // Push the count.
        asm!(self).op_mov(Dest::r(loop_count, 0b1110), Src::r(loop_count, 0b10_01_00_00), false);
        asm!(self).op_mov(Dest::r(loop_count, 0b0001), Src::r(temp, Src::XXXX), false);
        self.pop_temp();

        // Push aL, keeping the outer value for repeats.
        let mask = if loop_start.is_repeat { 0b1111 } else { 0b1110 };
        asm!(self).op_mov(Dest::r(loop_address, mask), Src::r(loop_address, 0b10_01_00_00), false);
        if !loop_start.is_repeat {
            asm!(self).op_ubfe(Dest::r(loop_address, 0b0001), Src::lu(8), Src::lu(8), loop_constant);
        }
        trace!(loop_constant = loop_start.loop_constant_index, "loop start");
    }

    pub(super) fn process_loop_end(&mut self, loop_end: &LoopEndInstruction) {
        self.close_exec_conditionals();
        self.emit_disassembly();

        let loop_count = self.sys.loop_count;
        let loop_address = self.sys.loop_address;

        asm!(self).op_iadd(Dest::r(loop_count, 0b0001), Src::r(loop_count, Src::XXXX), Src::li(-1));
        if loop_end.is_predicated_break {
            // Zero if the loop is exhausted or the break predicate passes.
            let p0 = self.p0();
            let count = Src::r(loop_count, Src::XXXX);
            let (pass, fail) = if loop_end.predicate_condition {
                (Src::lu(0), count)
            } else {
                (count, Src::lu(0))
            };
            let temp = self.push_temp(0);
            asm!(self).op_movc(Dest::r(temp, 0b0001), p0, pass, fail);
            asm!(self).op_if(false, Src::r(temp, Src::XXXX));
            self.pop_temp();
        } else {
            asm!(self).op_if(false, Src::r(loop_count, Src::XXXX));
        }
        {
            // Pop the stacks.
            asm!(self).op_mov(Dest::r(loop_count, 0b0111), Src::r(loop_count, 0b00_11_10_01), false);
            asm!(self).op_mov(Dest::r(loop_count, 0b1000), Src::lu(0), false);
            asm!(self).op_mov(Dest::r(loop_address, 0b0111), Src::r(loop_address, 0b00_11_10_01), false);
            asm!(self).op_mov(Dest::r(loop_address, 0b1000), Src::lu(0), false);
        }
        asm!(self).op_else();
        {
            let loop_constant = self.loop_constant(loop_end.loop_constant_index);
            let temp = self.push_temp(0);
            asm!(self).op_ibfe(Dest::r(temp, 0b0001), Src::lu(8), Src::lu(16), loop_constant);
            asm!(self).op_iadd(
                Dest::r(loop_address, 0b0001),
                Src::r(loop_address, Src::XXXX),
                Src::r(temp, Src::XXXX),
            );
            self.pop_temp();
            self.jump_to_label(loop_end.loop_body_address);
        }
        asm!(self).op_endif();
        trace!(loop_constant = loop_end.loop_constant_index, "loop end");
    }

    pub(super) fn process_alloc(&mut self, alloc: &AllocInstruction) {
        self.emit_disassembly();
        if alloc.kind == AllocKind::Memory {
            self.memexport_alloc_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use xenos_dxbc::opcode::Opcode;

    use crate::config::{TranslatorConfig, Vendor};
    use crate::modification::Modification;
    use crate::shader::{ShaderInfo, ShaderStage};
    use crate::translator::Translator;
    use crate::ucode::{
        ExecCondition, ExecInstruction, InstructionOperand, InstructionResult, JumpInstruction,
        ParsedInstruction, Predication, ResultStorage, VectorAluInstruction, VectorOpcode,
    };

    fn exec(condition: ExecCondition, is_end: bool) -> ExecInstruction {
        ExecInstruction {
            condition,
            is_end,
            ..Default::default()
        }
    }

    fn mov(predication: Predication) -> ParsedInstruction {
        ParsedInstruction::VectorAlu(VectorAluInstruction {
            opcode: VectorOpcode::Max,
            predication,
            result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
            operands: vec![InstructionOperand::register(1), InstructionOperand::register(1)],
        })
    }

    fn count_opcodes(config: TranslatorConfig, instructions: &[ParsedInstruction], opcode: Opcode) -> usize {
        let mut translator = Translator::new(config).unwrap();
        // No outputs, so the epilogue has no control flow of its own.
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 2;
        let translation = translator
            .translate(instructions, &info, Modification::default_pixel())
            .unwrap();
        xenos_dxbc::test_utils::decode_container_program(&translation.dxbc).count(opcode)
    }

    fn two_execs_same_bool() -> Vec<ParsedInstruction> {
        let condition = ExecCondition::BoolConstant {
            index: 5,
            condition: true,
        };
        let first = exec(condition, false);
        let second = exec(condition, true);
        vec![
            ParsedInstruction::Exec(first),
            mov(Predication::NONE),
            ParsedInstruction::ExecEnd(first),
            ParsedInstruction::Exec(second),
            mov(Predication::NONE),
            ParsedInstruction::ExecEnd(second),
        ]
    }

    #[test]
    fn same_bool_condition_execs_share_one_if() {
        let merged = count_opcodes(TranslatorConfig::default(), &two_execs_same_bool(), Opcode::If);
        let unmerged = count_opcodes(
            TranslatorConfig {
                merge_exec_conditionals: false,
                ..Default::default()
            },
            &two_execs_same_bool(),
            Opcode::If,
        );
        assert_eq!(merged, 1);
        assert_eq!(unmerged, 2);
    }

    #[test]
    fn jump_with_the_exec_condition_shares_its_if() {
        let condition = ExecCondition::BoolConstant {
            index: 5,
            condition: true,
        };
        let first = exec(condition, false);
        let last = exec(condition, true);
        let instructions = vec![
            ParsedInstruction::Exec(first),
            mov(Predication::NONE),
            ParsedInstruction::ExecEnd(first),
            ParsedInstruction::Jump(JumpInstruction {
                cf_index: 1,
                target_address: 3,
                condition,
            }),
            ParsedInstruction::Exec(last),
            mov(Predication::NONE),
            ParsedInstruction::ExecEnd(last),
        ];
        let merged = TranslatorConfig::default();
        assert_eq!(count_opcodes(merged, &instructions, Opcode::If), 1);
        assert_eq!(count_opcodes(merged, &instructions, Opcode::EndIf), 1);

        let unmerged = TranslatorConfig {
            merge_exec_conditionals: false,
            ..Default::default()
        };
        assert_eq!(count_opcodes(unmerged, &instructions, Opcode::If), 3);
        assert_eq!(count_opcodes(unmerged, &instructions, Opcode::EndIf), 3);
    }

    #[test]
    fn predicate_matching_the_exec_needs_no_instruction_if() {
        let condition = ExecCondition::Predicate { condition: true };
        let e = exec(condition, true);
        let instructions = vec![
            ParsedInstruction::Exec(e),
            mov(Predication::on(true)),
            mov(Predication::on(false)),
            mov(Predication::on(false)),
            ParsedInstruction::ExecEnd(e),
        ];
        // One for the exec, one for the two instructions with the opposite
        // condition.
        assert_eq!(count_opcodes(TranslatorConfig::default(), &instructions, Opcode::If), 2);
    }

    #[test]
    fn intel_uses_if_chains() {
        let e = exec(ExecCondition::Unconditional, true);
        let instructions = vec![
            ParsedInstruction::Exec(e),
            mov(Predication::NONE),
            ParsedInstruction::ExecEnd(e),
            ParsedInstruction::Label(1),
        ];
        let intel = TranslatorConfig {
            vendor: Vendor::Intel,
            ..Default::default()
        };
        assert_eq!(count_opcodes(intel, &instructions, Opcode::Switch), 0);
        assert_eq!(count_opcodes(intel, &instructions, Opcode::UGe), 1);
        assert_eq!(count_opcodes(TranslatorConfig::default(), &instructions, Opcode::Switch), 1);
        assert_eq!(count_opcodes(TranslatorConfig::default(), &instructions, Opcode::Case), 2);
    }
}
