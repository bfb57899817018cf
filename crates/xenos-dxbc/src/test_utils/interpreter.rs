//! A single-invocation interpreter for decoded `SHEX` programs.
//!
//! It understands the instructions the assembler emits, with DXBC semantics
//! where they matter for bit-exact checks (shift amounts masked to 5 bits,
//! `firstbit_hi` counted from the MSB, saturating float-to-integer
//! conversions, `min`/`max` preferring the non-NaN operand). Derivatives are
//! zero and every texture sampling instruction returns [`Interpreter::sample_value`].

use std::collections::BTreeMap;

use crate::opcode::Opcode;
use crate::operand::OperandType;
use crate::shex::{Components, DecodedIndex, DecodedInstruction, DecodedOperand, ShexProgram};

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `ret`, `retc` or the end of the program.
    Returned,
    /// `discard`.
    Discarded,
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Loop(usize),
    Switch(usize),
}

/// Register state of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    /// `r#`.
    pub temps: Vec<[u32; 4]>,
    /// `x#[]`, by array.
    pub indexable_temps: BTreeMap<u32, Vec<[u32; 4]>>,
    /// `v#`.
    pub inputs: Vec<[u32; 4]>,
    /// `o#`.
    pub outputs: Vec<[u32; 4]>,
    /// Constant buffers by range ID.
    pub constant_buffers: BTreeMap<u32, Vec<[u32; 4]>>,
    /// Raw SRVs by range ID, in dwords.
    pub resources: BTreeMap<u32, Vec<u32>>,
    /// Raw UAVs by range ID, in dwords.
    pub uavs: BTreeMap<u32, Vec<u32>>,
    /// `vCoverage`.
    pub input_coverage: u32,
    /// `oDepth` once written.
    pub output_depth: Option<u32>,
    /// `oMask` once written.
    pub output_coverage: Option<u32>,
    /// Result of every `sample*`, `ld` and `lod`.
    pub sample_value: [u32; 4],
    /// Executed instructions, excluding declarations.
    pub steps: usize,
    /// Abort after this many steps.
    pub step_limit: usize,
}

fn grow(registers: &mut Vec<[u32; 4]>, index: u32) -> &mut [u32; 4] {
    let index = index as usize;
    if registers.len() <= index {
        registers.resize(index + 1, [0; 4]);
    }
    &mut registers[index]
}

fn f(bits: u32) -> f32 {
    f32::from_bits(bits)
}

fn b(value: f32) -> u32 {
    value.to_bits()
}

fn mask_bool(value: bool) -> u32 {
    if value {
        u32::MAX
    } else {
        0
    }
}

fn saturate(value: f32) -> f32 {
    if value > 0.0 {
        value.min(1.0)
    } else {
        0.0
    }
}

/// `min`/`max` return the other operand when one is NaN.
fn float_min(a: f32, b: f32) -> f32 {
    a.min(b)
}

fn float_max(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Round-to-nearest-even `f32tof16`.
pub fn f32_to_f16_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    let sign = (bits >> 16) & 0x8000;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let mantissa = bits & 0x7F_FFFF;
    if exponent == 0xFF {
        return sign | 0x7C00 | if mantissa != 0 { 0x200 } else { 0 };
    }
    let half_exponent = exponent - 127 + 15;
    if half_exponent >= 0x1F {
        return sign | 0x7C00;
    }
    if half_exponent <= 0 {
        if half_exponent < -10 {
            return sign;
        }
        let full = mantissa | 0x80_0000;
        let shift = (14 - half_exponent) as u32;
        let mut half = full >> shift;
        let remainder = full & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        if remainder > halfway || (remainder == halfway && half & 1 != 0) {
            half += 1;
        }
        return sign | half;
    }
    let mut half = ((half_exponent as u32) << 10) | (mantissa >> 13);
    let remainder = mantissa & 0x1FFF;
    if remainder > 0x1000 || (remainder == 0x1000 && half & 1 != 0) {
        half += 1;
    }
    sign | half
}

/// `f16tof32` of the low 16 bits.
pub fn f16_bits_to_f32(value: u32) -> f32 {
    let sign = (value & 0x8000) << 16;
    let exponent = (value >> 10) & 0x1F;
    let mantissa = value & 0x3FF;
    let bits = match exponent {
        0 if mantissa == 0 => sign,
        0 => {
            let shift = mantissa.leading_zeros() - 21;
            let normalized = (mantissa << shift) & 0x3FF;
            sign | ((113 - shift) << 23) | (normalized << 13)
        }
        0x1F => sign | 0x7F80_0000 | (mantissa << 13),
        _ => sign | ((exponent + 112) << 23) | (mantissa << 13),
    };
    f32::from_bits(bits)
}

fn is_float_opcode(opcode: Opcode) -> bool {
    use Opcode::*;
    matches!(
        opcode,
        Add | Div
            | Dp2
            | Dp3
            | Dp4
            | Exp
            | Frc
            | Log
            | Mad
            | Min
            | Max
            | Mov
            | MovC
            | Mul
            | Rcp
            | Rsq
            | Sqrt
            | SinCos
            | RoundNe
            | RoundNi
            | RoundZ
            | Eq
            | Ge
            | Lt
            | Ne
            | FToI
            | FToU
            | F32ToF16
            | DerivRtxCoarse
            | DerivRtxFine
            | DerivRtyCoarse
            | DerivRtyFine
    )
}

impl Interpreter {
    /// An interpreter with zeroed state and a generous step limit.
    pub fn new() -> Self {
        Self {
            step_limit: 1_000_000,
            ..Default::default()
        }
    }

    /// Sets float constant buffer data from `f32` vectors.
    pub fn set_constant_buffer_f32(&mut self, id: u32, vectors: &[[f32; 4]]) {
        self.constant_buffers.insert(
            id,
            vectors.iter().map(|v| v.map(f32::to_bits)).collect(),
        );
    }

    /// Sets one dword of a constant buffer, growing it as needed.
    pub fn set_constant(&mut self, id: u32, vector: u32, component: u32, value: u32) {
        let buffer = self.constant_buffers.entry(id).or_default();
        grow(buffer, vector)[component as usize] = value;
    }

    fn index(&self, index: &DecodedIndex) -> u32 {
        let relative = index
            .relative
            .map(|(temp, component)| {
                self.temps
                    .get(temp as usize)
                    .map_or(0, |r| r[component as usize])
            })
            .unwrap_or(0);
        index.offset.wrapping_add(relative)
    }

    fn register_value(&self, operand: &DecodedOperand) -> [u32; 4] {
        let get = |registers: &Vec<[u32; 4]>, i: u32| registers.get(i as usize).copied().unwrap_or([0; 4]);
        match operand.ty {
            OperandType::Temp => get(&self.temps, self.index(&operand.indices[0])),
            OperandType::Input => get(&self.inputs, self.index(&operand.indices[0])),
            OperandType::Output => get(&self.outputs, self.index(&operand.indices[0])),
            OperandType::IndexableTemp => {
                let array = self.index(&operand.indices[0]);
                let element = self.index(&operand.indices[1]);
                self.indexable_temps
                    .get(&array)
                    .map_or([0; 4], |a| get(a, element))
            }
            OperandType::ConstantBuffer => {
                let id = self.index(&operand.indices[0]);
                let vector = match operand.indices.get(2) {
                    Some(index) => self.index(index),
                    None => self.index(&operand.indices[1]),
                };
                self.constant_buffers
                    .get(&id)
                    .map_or([0; 4], |cb| get(cb, vector))
            }
            OperandType::InputCoverageMask => [self.input_coverage; 4],
            other => panic!("unsupported source operand type {other:?}"),
        }
    }

    fn read(&self, operand: &DecodedOperand, float_modifiers: bool) -> [u32; 4] {
        if operand.ty == OperandType::Immediate32 {
            return match operand.immediate.as_slice() {
                [value] => [*value; 4],
                values => [values[0], values[1], values[2], values[3]],
            };
        }
        let base = self.register_value(operand);
        let mut out = [0; 4];
        for (i, value) in out.iter_mut().enumerate() {
            let c = match operand.components {
                Components::Swizzle(_) | Components::Select1(_) => {
                    operand.components.source_component(i as u32)
                }
                _ => 0,
            };
            let mut v = base[c as usize];
            if float_modifiers {
                if operand.absolute {
                    v &= 0x7FFF_FFFF;
                }
                if operand.negate {
                    v ^= 0x8000_0000;
                }
            } else {
                if operand.absolute {
                    v = (v as i32).wrapping_abs() as u32;
                }
                if operand.negate {
                    v = (v as i32).wrapping_neg() as u32;
                }
            }
            *value = v;
        }
        out
    }

    fn write(&mut self, operand: &DecodedOperand, values: [u32; 4], saturated: bool) {
        let mask = match operand.components {
            Components::Mask(mask) => mask,
            _ => 0b0001,
        };
        let values = if saturated {
            values.map(|v| b(saturate(f(v))))
        } else {
            values
        };
        let target = match operand.ty {
            OperandType::Null => return,
            OperandType::OutputDepth | OperandType::OutputDepthLessEqual => {
                self.output_depth = Some(values[0]);
                return;
            }
            OperandType::OutputCoverageMask => {
                self.output_coverage = Some(values[0]);
                return;
            }
            OperandType::Temp => {
                let i = self.index(&operand.indices[0]);
                grow(&mut self.temps, i)
            }
            OperandType::Output => {
                let i = self.index(&operand.indices[0]);
                grow(&mut self.outputs, i)
            }
            OperandType::IndexableTemp => {
                let array = self.index(&operand.indices[0]);
                let element = self.index(&operand.indices[1]);
                grow(self.indexable_temps.entry(array).or_default(), element)
            }
            other => panic!("unsupported destination operand type {other:?}"),
        };
        for (i, value) in values.iter().enumerate() {
            if mask & (1 << i) != 0 {
                target[i] = *value;
            }
        }
    }

    fn buffer(&mut self, operand: &DecodedOperand) -> &mut Vec<u32> {
        let id = operand.indices[0].offset;
        match operand.ty {
            OperandType::Resource => self.resources.entry(id).or_default(),
            OperandType::UnorderedAccessView => self.uavs.entry(id).or_default(),
            other => panic!("{other:?} is not a buffer"),
        }
    }

    fn load_dword(&mut self, operand: &DecodedOperand, byte_offset: u32) -> u32 {
        let buffer = self.buffer(operand);
        buffer.get((byte_offset >> 2) as usize).copied().unwrap_or(0)
    }

    fn store_dword(&mut self, operand: &DecodedOperand, byte_offset: u32, value: u32) {
        let buffer = self.buffer(operand);
        let index = (byte_offset >> 2) as usize;
        if buffer.len() <= index {
            buffer.resize(index + 1, 0);
        }
        buffer[index] = value;
    }

    /// Instruction index of the `else` or `endif` of the `if` at `at`.
    fn if_end(program: &ShexProgram, at: usize, stop_at_else: bool) -> usize {
        let mut depth = 0u32;
        for (i, instruction) in program.instructions.iter().enumerate().skip(at + 1) {
            match instruction.opcode {
                Opcode::If => depth += 1,
                Opcode::Else if depth == 0 && stop_at_else => return i,
                Opcode::EndIf if depth == 0 => return i,
                Opcode::EndIf => depth -= 1,
                _ => {}
            }
        }
        panic!("unterminated if at instruction {at}");
    }

    fn block_end(program: &ShexProgram, at: usize, open: Opcode, close: Opcode) -> usize {
        let mut depth = 0u32;
        for (i, instruction) in program.instructions.iter().enumerate().skip(at + 1) {
            if instruction.opcode == open {
                depth += 1;
            } else if instruction.opcode == close {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
        }
        panic!("unterminated {open:?} at instruction {at}");
    }

    fn test(&self, instruction: &DecodedInstruction, operand: &DecodedOperand) -> bool {
        (self.read(operand, false)[0] != 0) == instruction.test_nonzero()
    }

    /// Runs the program from the start.
    pub fn run(&mut self, program: &ShexProgram) -> Outcome {
        let mut frames: Vec<Frame> = Vec::new();
        let mut pc = 0;
        while let Some(instruction) = program.instructions.get(pc) {
            if instruction.opcode.is_declaration() || instruction.opcode == Opcode::CustomData {
                pc += 1;
                continue;
            }
            self.steps += 1;
            assert!(self.steps <= self.step_limit, "step limit exceeded");
            let ops = &instruction.operands;
            pc = match instruction.opcode {
                Opcode::If => {
                    if self.test(instruction, &ops[0]) {
                        pc + 1
                    } else {
                        Self::if_end(program, pc, true) + 1
                    }
                }
                Opcode::Else => Self::if_end(program, pc, false) + 1,
                Opcode::EndIf => pc + 1,
                Opcode::Loop => {
                    frames.push(Frame::Loop(pc));
                    pc + 1
                }
                Opcode::EndLoop => match frames.last() {
                    Some(Frame::Loop(start)) => start + 1,
                    _ => panic!("endloop outside a loop"),
                },
                Opcode::Break => match frames.pop() {
                    Some(Frame::Loop(start)) => Self::block_end(program, start, Opcode::Loop, Opcode::EndLoop) + 1,
                    Some(Frame::Switch(start)) => {
                        Self::block_end(program, start, Opcode::Switch, Opcode::EndSwitch) + 1
                    }
                    None => panic!("break outside a loop or switch"),
                },
                Opcode::Continue => loop {
                    match frames.last() {
                        Some(Frame::Loop(start)) => break start + 1,
                        Some(Frame::Switch(_)) => {
                            frames.pop();
                        }
                        None => panic!("continue outside a loop"),
                    }
                },
                Opcode::Switch => {
                    let selector = self.read(&ops[0], false)[0];
                    let end = Self::block_end(program, pc, Opcode::Switch, Opcode::EndSwitch);
                    let mut depth = 0u32;
                    let mut target = None;
                    let mut default = None;
                    for (i, candidate) in program.instructions.iter().enumerate().take(end).skip(pc + 1) {
                        match candidate.opcode {
                            Opcode::Switch => depth += 1,
                            Opcode::EndSwitch => depth -= 1,
                            Opcode::Case if depth == 0 && candidate.operands[0].immediate[0] == selector => {
                                target = Some(i);
                                break;
                            }
                            Opcode::Default if depth == 0 => default = Some(i),
                            _ => {}
                        }
                    }
                    match target.or(default) {
                        Some(i) => {
                            frames.push(Frame::Switch(pc));
                            i + 1
                        }
                        None => end + 1,
                    }
                }
                Opcode::Case | Opcode::Default => pc + 1,
                Opcode::EndSwitch => {
                    frames.pop();
                    pc + 1
                }
                Opcode::Ret => return Outcome::Returned,
                Opcode::RetC => {
                    if self.test(instruction, &ops[0]) {
                        return Outcome::Returned;
                    }
                    pc + 1
                }
                Opcode::Discard => {
                    if self.test(instruction, &ops[0]) {
                        return Outcome::Discarded;
                    }
                    pc + 1
                }
                _ => {
                    self.execute(instruction);
                    pc + 1
                }
            };
        }
        Outcome::Returned
    }

    fn execute(&mut self, instruction: &DecodedInstruction) {
        use Opcode::*;
        let ops = &instruction.operands;
        let float = is_float_opcode(instruction.opcode);
        let src = |i: usize| self.read(&ops[i], float);
        let sat = instruction.saturate();

        let per_component_f = |srcs: &[[u32; 4]], op: &dyn Fn(&[f32]) -> f32| {
            let mut out = [0; 4];
            for (i, value) in out.iter_mut().enumerate() {
                let args: Vec<f32> = srcs.iter().map(|s| f(s[i])).collect();
                *value = b(op(&args));
            }
            out
        };
        let per_component_u = |srcs: &[[u32; 4]], op: &dyn Fn(&[u32]) -> u32| {
            let mut out = [0; 4];
            for (i, value) in out.iter_mut().enumerate() {
                let args: Vec<u32> = srcs.iter().map(|s| s[i]).collect();
                *value = op(&args);
            }
            out
        };
        let dot = |a: [u32; 4], c: [u32; 4], n: usize| {
            let sum: f32 = (0..n).map(|i| f(a[i]) * f(c[i])).sum();
            [b(sum); 4]
        };

        let result = match instruction.opcode {
            Add => per_component_f(&[src(1), src(2)], &|a| a[0] + a[1]),
            Mul => per_component_f(&[src(1), src(2)], &|a| a[0] * a[1]),
            Div => per_component_f(&[src(1), src(2)], &|a| a[0] / a[1]),
            Mad => per_component_f(&[src(1), src(2), src(3)], &|a| a[0] * a[1] + a[2]),
            Min => per_component_f(&[src(1), src(2)], &|a| float_min(a[0], a[1])),
            Max => per_component_f(&[src(1), src(2)], &|a| float_max(a[0], a[1])),
            Dp2 => dot(src(1), src(2), 2),
            Dp3 => dot(src(1), src(2), 3),
            Dp4 => dot(src(1), src(2), 4),
            Exp => per_component_f(&[src(1)], &|a| a[0].exp2()),
            Log => per_component_f(&[src(1)], &|a| a[0].log2()),
            Frc => per_component_f(&[src(1)], &|a| a[0] - a[0].floor()),
            Rcp => per_component_f(&[src(1)], &|a| 1.0 / a[0]),
            Rsq => per_component_f(&[src(1)], &|a| 1.0 / a[0].sqrt()),
            Sqrt => per_component_f(&[src(1)], &|a| a[0].sqrt()),
            RoundNe => per_component_f(&[src(1)], &|a| a[0].round_ties_even()),
            RoundNi => per_component_f(&[src(1)], &|a| a[0].floor()),
            RoundZ => per_component_f(&[src(1)], &|a| a[0].trunc()),
            Mov => src(1),
            MovC => {
                let test = self.read(&ops[1], false);
                let (nonzero, zero) = (src(2), src(3));
                std::array::from_fn(|i| if test[i] != 0 { nonzero[i] } else { zero[i] })
            }
            Eq => per_component_u(&[src(1), src(2)], &|a| mask_bool(f(a[0]) == f(a[1]))),
            Ne => per_component_u(&[src(1), src(2)], &|a| mask_bool(f(a[0]) != f(a[1]))),
            Lt => per_component_u(&[src(1), src(2)], &|a| mask_bool(f(a[0]) < f(a[1]))),
            Ge => per_component_u(&[src(1), src(2)], &|a| mask_bool(f(a[0]) >= f(a[1]))),
            DerivRtxCoarse | DerivRtxFine | DerivRtyCoarse | DerivRtyFine => [0; 4],
            SinCos => {
                let value = src(2);
                self.write(&ops[0], value.map(|v| b(f(v).sin())), sat);
                self.write(&ops[1], value.map(|v| b(f(v).cos())), sat);
                return;
            }

            IAdd => per_component_u(&[src(1), src(2)], &|a| a[0].wrapping_add(a[1])),
            IMad => per_component_u(&[src(1), src(2), src(3)], &|a| {
                a[0].wrapping_mul(a[1]).wrapping_add(a[2])
            }),
            UMad => per_component_u(&[src(1), src(2), src(3)], &|a| {
                a[0].wrapping_mul(a[1]).wrapping_add(a[2])
            }),
            IMul | UMul => {
                let (a, c) = (src(2), src(3));
                let signed = instruction.opcode == IMul;
                let products: [u64; 4] = std::array::from_fn(|i| {
                    if signed {
                        (i64::from(a[i] as i32) * i64::from(c[i] as i32)) as u64
                    } else {
                        u64::from(a[i]) * u64::from(c[i])
                    }
                });
                self.write(&ops[0], products.map(|p| (p >> 32) as u32), false);
                self.write(&ops[1], products.map(|p| p as u32), false);
                return;
            }
            UDiv => {
                let (a, c) = (src(2), src(3));
                let q: [u32; 4] = std::array::from_fn(|i| a[i].checked_div(c[i]).unwrap_or(u32::MAX));
                let r: [u32; 4] = std::array::from_fn(|i| a[i].checked_rem(c[i]).unwrap_or(u32::MAX));
                self.write(&ops[0], q, false);
                self.write(&ops[1], r, false);
                return;
            }
            IShl => per_component_u(&[src(1), src(2)], &|a| a[0] << (a[1] & 31)),
            UShr => per_component_u(&[src(1), src(2)], &|a| a[0] >> (a[1] & 31)),
            And => per_component_u(&[src(1), src(2)], &|a| a[0] & a[1]),
            Or => per_component_u(&[src(1), src(2)], &|a| a[0] | a[1]),
            Xor => per_component_u(&[src(1), src(2)], &|a| a[0] ^ a[1]),
            Not => per_component_u(&[src(1)], &|a| !a[0]),
            IEq => per_component_u(&[src(1), src(2)], &|a| mask_bool(a[0] == a[1])),
            INe => per_component_u(&[src(1), src(2)], &|a| mask_bool(a[0] != a[1])),
            IGe => per_component_u(&[src(1), src(2)], &|a| mask_bool(a[0] as i32 >= a[1] as i32)),
            ILt => per_component_u(&[src(1), src(2)], &|a| mask_bool((a[0] as i32) < a[1] as i32)),
            UGe => per_component_u(&[src(1), src(2)], &|a| mask_bool(a[0] >= a[1])),
            ULt => per_component_u(&[src(1), src(2)], &|a| mask_bool(a[0] < a[1])),
            IMax => per_component_u(&[src(1), src(2)], &|a| (a[0] as i32).max(a[1] as i32) as u32),
            IMin => per_component_u(&[src(1), src(2)], &|a| (a[0] as i32).min(a[1] as i32) as u32),
            UMax => per_component_u(&[src(1), src(2)], &|a| a[0].max(a[1])),
            UMin => per_component_u(&[src(1), src(2)], &|a| a[0].min(a[1])),
            UBfe | IBfe => {
                let signed = instruction.opcode == IBfe;
                per_component_u(&[src(1), src(2), src(3)], &|a| {
                    let width = a[0] & 31;
                    let offset = a[1] & 31;
                    if width == 0 {
                        0
                    } else if width + offset < 32 {
                        let shifted = a[2] << (32 - width - offset);
                        if signed {
                            ((shifted as i32) >> (32 - width)) as u32
                        } else {
                            shifted >> (32 - width)
                        }
                    } else if signed {
                        ((a[2] as i32) >> offset) as u32
                    } else {
                        a[2] >> offset
                    }
                })
            }
            Bfi => per_component_u(&[src(1), src(2), src(3), src(4)], &|a| {
                let width = a[0] & 31;
                let offset = a[1] & 31;
                let mask = (((1u64 << width) - 1) as u32) << offset;
                ((a[2] << offset) & mask) | (a[3] & !mask)
            }),
            BfRev => per_component_u(&[src(1)], &|a| a[0].reverse_bits()),
            FirstBitHi => per_component_u(&[src(1)], &|a| {
                if a[0] == 0 {
                    u32::MAX
                } else {
                    a[0].leading_zeros()
                }
            }),
            FirstBitLo => per_component_u(&[src(1)], &|a| {
                if a[0] == 0 {
                    u32::MAX
                } else {
                    a[0].trailing_zeros()
                }
            }),
            FToI => per_component_u(&[src(1)], &|a| f(a[0]) as i32 as u32),
            FToU => per_component_u(&[src(1)], &|a| f(a[0]) as u32),
            IToF => per_component_u(&[src(1)], &|a| b(a[0] as i32 as f32)),
            UToF => per_component_u(&[src(1)], &|a| b(a[0] as f32)),
            F32ToF16 => per_component_u(&[src(1)], &|a| f32_to_f16_bits(f(a[0]))),
            F16ToF32 => per_component_u(&[src(1)], &|a| b(f16_bits_to_f32(a[0]))),

            LdRaw => {
                let offset = src(1)[0];
                let loaded: [u32; 4] = std::array::from_fn(|i| self.load_dword(&ops[2], offset + 4 * i as u32));
                let resource = &ops[2];
                std::array::from_fn(|i| loaded[resource.components.source_component(i as u32) as usize])
            }
            StoreRaw => {
                let offset = src(1)[0];
                let value = self.read(&ops[2], false);
                let mask = match ops[0].components {
                    Components::Mask(mask) => mask,
                    _ => 0b0001,
                };
                for i in 0..4 {
                    if mask & (1 << i) != 0 {
                        self.store_dword(&ops[0], offset + 4 * i, value[i as usize]);
                    }
                }
                return;
            }
            AtomicAnd | AtomicOr => {
                let offset = src(1)[0];
                let value = self.read(&ops[2], false)[0];
                let old = self.load_dword(&ops[0], offset);
                let new = if instruction.opcode == AtomicAnd {
                    old & value
                } else {
                    old | value
                };
                self.store_dword(&ops[0], offset, new);
                return;
            }
            Sample | SampleB | SampleL | SampleD | SampleC | SampleCLz | Ld | Lod | LdUavTyped => {
                self.sample_value
            }
            other => panic!("the interpreter does not implement {other:?}"),
        };
        self.write(&ops[0], result, sat && float);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Dest, Src};
    use crate::shex::decode_program;
    use crate::test_utils::assemble;

    fn run(f: impl FnOnce(&mut crate::Assembler<'_>)) -> Interpreter {
        let (code, _) = assemble(0x0005_0051, f);
        let program = decode_program(&code).unwrap();
        let mut interpreter = Interpreter::new();
        interpreter.run(&program);
        interpreter
    }

    #[test]
    fn integer_and_float_arithmetic() {
        let state = run(|a| {
            a.op_mov(Dest::r(0, 0b1111), Src::lf4(1.5, -2.0, 0.25, 8.0), false);
            a.op_mad(Dest::r(1, 0b0011), Src::r(0, Src::XYZW), Src::lf(2.0), Src::lf(1.0), false);
            a.op_ftoi(Dest::r(1, 0b0100), Src::r(0, Src::WWWW));
            a.op_ishl(Dest::r(1, 0b1000), Src::r(1, Src::ZZZZ), Src::lu(33));
        });
        assert_eq!(state.temps[1], [4.0f32.to_bits(), (-3.0f32).to_bits(), 8, 16]);
    }

    #[test]
    fn flow_control_follows_conditions() {
        let state = run(|a| {
            a.op_mov(Dest::r(0, 0b0001), Src::lu(0), false);
            a.op_loop();
            a.op_iadd(Dest::r(0, 0b0001), Src::r(0, Src::XXXX), Src::lu(1));
            a.op_ieq(Dest::r(1, 0b0001), Src::r(0, Src::XXXX), Src::lu(3));
            a.op_if(true, Src::r(1, Src::XXXX));
            a.op_break();
            a.op_endif();
            a.op_endloop();
            a.op_switch(Src::r(0, Src::XXXX));
            a.op_case(Src::lu(2));
            a.op_mov(Dest::r(2, 0b0001), Src::lu(20), false);
            a.op_break();
            a.op_case(Src::lu(3));
            a.op_mov(Dest::r(2, 0b0001), Src::lu(30), false);
            a.op_break();
            a.op_endswitch();
            a.op_ret();
        });
        assert_eq!(state.temps[0][0], 3);
        assert_eq!(state.temps[2][0], 30);
    }

    #[test]
    fn half_conversions_round_to_nearest_even() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3C00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xC000);
        assert_eq!(f32_to_f16_bits(65520.0), 0x7C00);
        assert_eq!(f32_to_f16_bits(1.0 + 1.0 / 4096.0), 0x3C00);
        assert_eq!(f16_bits_to_f32(0x3555), f16_bits_to_f32(f32_to_f16_bits(1.0 / 3.0)));
        assert_eq!(f16_bits_to_f32(0x0001), 2f32.powi(-24));
    }
}
