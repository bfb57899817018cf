//! Bounds-checked decoder for `SHEX` token streams.
//!
//! Only the encodings the [`Assembler`](crate::Assembler) produces are
//! understood: plain and immediate-plus-relative indices, the four-component
//! mask/swizzle/select1 modes, and the source modifier extended token.

use crate::error::DxbcError;
use crate::opcode::{opcode_token_length, Opcode, SATURATE_BIT, TEST_NONZERO_BIT};
use crate::operand::{OperandType, INDEX_IMMEDIATE32, INDEX_IMMEDIATE32_PLUS_RELATIVE, INDEX_RELATIVE};

/// Component selection of a decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Components {
    /// No component data (labels, samplers, `null`).
    None,
    /// One-component operand.
    Scalar,
    /// Destination write mask.
    Mask(u32),
    /// Source swizzle, 2 bits per component.
    Swizzle(u32),
    /// Source single-component select.
    Select1(u32),
}

impl Components {
    /// Register component read for destination component `i`.
    pub fn source_component(&self, i: u32) -> u32 {
        match *self {
            Components::Swizzle(swizzle) => (swizzle >> (i * 2)) & 3,
            Components::Select1(c) => c,
            _ => 0,
        }
    }
}

/// A decoded operand index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedIndex {
    /// Immediate part.
    pub offset: u32,
    /// `(temp, component)` when the index adds a temp register.
    pub relative: Option<(u32, u32)>,
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedOperand {
    /// Register file.
    pub ty: OperandType,
    /// Component selection.
    pub components: Components,
    /// Indices.
    pub indices: Vec<DecodedIndex>,
    /// `|x|`.
    pub absolute: bool,
    /// `-x`.
    pub negate: bool,
    /// One or four values for immediates.
    pub immediate: Vec<u32>,
}

impl DecodedOperand {
    /// The first index as an immediate, for plain `r#`/`o#`/`v#` references.
    pub fn register(&self) -> Option<u32> {
        self.indices.first().map(|i| i.offset)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Dword offset of the opcode token within the program body.
    pub offset: usize,
    /// Opcode.
    pub opcode: Opcode,
    /// The full opcode token.
    pub token: u32,
    /// Extended opcode tokens.
    pub extended: Vec<u32>,
    /// Operands in encoding order.
    pub operands: Vec<DecodedOperand>,
    /// Dwords after the operands (declaration payloads, custom data).
    pub trailing: Vec<u32>,
}

impl DecodedInstruction {
    /// `_sat`.
    pub fn saturate(&self) -> bool {
        self.token & SATURATE_BIT != 0
    }

    /// `_nz` for conditional flow control.
    pub fn test_nonzero(&self) -> bool {
        self.token & TEST_NONZERO_BIT != 0
    }

    /// Opcode-specific control bits 11..24.
    pub fn controls(&self) -> u32 {
        (self.token >> 11) & 0x1FFF
    }
}

/// A decoded `SHEX` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShexProgram {
    /// Version token.
    pub version: u32,
    /// Instructions in order.
    pub instructions: Vec<DecodedInstruction>,
}

impl ShexProgram {
    /// Program type field of the version token.
    pub fn program_type(&self) -> u32 {
        (self.version >> 16) & 0xFFFF
    }

    /// Iterates over instructions with the given opcode.
    pub fn with_opcode(&self, opcode: Opcode) -> impl Iterator<Item = &DecodedInstruction> + '_ {
        self.instructions.iter().filter(move |i| i.opcode == opcode)
    }

    /// Counts instructions with the given opcode.
    pub fn count(&self, opcode: Opcode) -> usize {
        self.with_opcode(opcode).count()
    }
}

struct Reader<'a> {
    tokens: &'a [u32],
    pos: usize,
    end: usize,
}

impl Reader<'_> {
    fn next(&mut self) -> Result<u32, DxbcError> {
        if self.pos >= self.end {
            return Err(DxbcError::invalid_chunk(format!(
                "instruction overruns its length at dword {}",
                self.pos
            )));
        }
        let token = self.tokens[self.pos];
        self.pos += 1;
        Ok(token)
    }
}

fn decode_operand(r: &mut Reader<'_>) -> Result<DecodedOperand, DxbcError> {
    let token = r.next()?;
    let ty_raw = (token >> 12) & 0xFF;
    let ty = OperandType::from_raw(ty_raw)
        .ok_or_else(|| DxbcError::invalid_chunk(format!("unknown operand type {ty_raw}")))?;
    let components = match token & 3 {
        0 => Components::None,
        1 => Components::Scalar,
        2 => {
            let selector = (token >> 4) & 0xFF;
            match (token >> 2) & 3 {
                0 => Components::Mask(selector & 0xF),
                1 => Components::Swizzle(selector),
                2 => Components::Select1(selector & 3),
                mode => {
                    return Err(DxbcError::invalid_chunk(format!(
                        "unknown selection mode {mode}"
                    )))
                }
            }
        }
        n => {
            return Err(DxbcError::invalid_chunk(format!(
                "unsupported component count encoding {n}"
            )))
        }
    };

    let (mut absolute, mut negate) = (false, false);
    if token & (1 << 31) != 0 {
        let ext = r.next()?;
        if ext & 0x3F == 1 {
            let modifier = (ext >> 6) & 0xFF;
            absolute = modifier & 2 != 0;
            negate = modifier & 1 != 0;
        }
    }

    let mut immediate = Vec::new();
    if ty == OperandType::Immediate32 {
        let count = match components {
            Components::Scalar => 1,
            _ => 4,
        };
        for _ in 0..count {
            immediate.push(r.next()?);
        }
    }

    let index_dimension = (token >> 20) & 3;
    let mut indices = Vec::with_capacity(index_dimension as usize);
    for i in 0..index_dimension {
        let representation = (token >> (22 + 3 * i)) & 7;
        let index = match representation {
            INDEX_IMMEDIATE32 => DecodedIndex {
                offset: r.next()?,
                relative: None,
            },
            INDEX_RELATIVE | INDEX_IMMEDIATE32_PLUS_RELATIVE => {
                let offset = if representation == INDEX_RELATIVE {
                    0
                } else {
                    r.next()?
                };
                let rel = decode_operand(r)?;
                let temp = rel.register().ok_or_else(|| {
                    DxbcError::invalid_chunk("relative index operand has no register")
                })?;
                DecodedIndex {
                    offset,
                    relative: Some((temp, rel.components.source_component(0))),
                }
            }
            other => {
                return Err(DxbcError::invalid_chunk(format!(
                    "unsupported index representation {other}"
                )))
            }
        };
        indices.push(index);
    }

    Ok(DecodedOperand {
        ty,
        components,
        indices,
        absolute,
        negate,
        immediate,
    })
}

/// Number of operands encoded before any trailing payload dwords.
fn declaration_operand_count(opcode: Opcode) -> usize {
    match opcode {
        Opcode::DclTemps | Opcode::DclIndexableTemp | Opcode::DclGlobalFlags => 0,
        _ => 1,
    }
}

/// Decodes the dwords of a `SHEX` chunk (version token, length, body).
pub fn decode_program(tokens: &[u32]) -> Result<ShexProgram, DxbcError> {
    if tokens.len() < 2 {
        return Err(DxbcError::invalid_chunk("SHEX chunk is missing its header"));
    }
    let declared = tokens[1] as usize;
    if declared != tokens.len() {
        return Err(DxbcError::invalid_chunk(format!(
            "SHEX declares {declared} dwords but has {}",
            tokens.len()
        )));
    }

    let mut instructions = Vec::new();
    let mut pos = 2;
    while pos < tokens.len() {
        let token = tokens[pos];
        let raw = token & 0x7FF;
        let opcode = Opcode::from_raw(raw)
            .ok_or_else(|| DxbcError::invalid_chunk(format!("unknown opcode {raw} at dword {pos}")))?;
        let length = if opcode == Opcode::CustomData {
            *tokens.get(pos + 1).ok_or_else(|| {
                DxbcError::invalid_chunk("customdata is missing its length")
            })? as usize
        } else {
            opcode_token_length(token) as usize
        };
        let end = pos + length;
        if length == 0 || end > tokens.len() {
            return Err(DxbcError::invalid_chunk(format!(
                "instruction at dword {pos} has bad length {length}"
            )));
        }

        let mut reader = Reader {
            tokens,
            pos: pos + 1,
            end,
        };
        let mut extended = Vec::new();
        let mut operands = Vec::new();
        if opcode == Opcode::CustomData {
            reader.next()?;
        } else {
            let mut more = token & (1 << 31) != 0;
            while more {
                let ext = reader.next()?;
                extended.push(ext);
                more = ext & (1 << 31) != 0;
            }
            let operand_limit = if opcode.is_declaration() {
                declaration_operand_count(opcode)
            } else {
                usize::MAX
            };
            while reader.pos < end && operands.len() < operand_limit {
                operands.push(decode_operand(&mut reader)?);
            }
        }
        let trailing = tokens[reader.pos..end].to_vec();

        instructions.push(DecodedInstruction {
            offset: pos - 2,
            opcode,
            token,
            extended,
            operands,
            trailing,
        });
        pos = end;
    }

    Ok(ShexProgram {
        version: tokens[0],
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::Assembler;
    use crate::operand::{Dest, Index, Src};
    use crate::stats::Statistics;

    fn program(f: impl FnOnce(&mut Assembler<'_>)) -> ShexProgram {
        let mut code = vec![0, 0];
        let mut stat = Statistics::default();
        f(&mut Assembler::new(&mut code, &mut stat));
        code[1] = code.len() as u32;
        decode_program(&code).unwrap()
    }

    #[test]
    fn decodes_relative_constant_buffer_read() {
        let p = program(|a| {
            a.op_mov(
                Dest::r(3, 0b1111),
                Src::cb(1, Index::imm(1), Index::relative(5, 3, 8), Src::XYZW),
                false,
            )
        });
        let mov = &p.instructions[0];
        assert_eq!(mov.opcode, Opcode::Mov);
        let src = &mov.operands[1];
        assert_eq!(src.ty, OperandType::ConstantBuffer);
        assert_eq!(
            src.indices[2],
            DecodedIndex {
                offset: 8,
                relative: Some((5, 3))
            }
        );
    }

    #[test]
    fn decodes_declaration_payload() {
        let p = program(|a| {
            a.op_dcl_temps(7);
            a.op_dcl_indexable_temp(0, 64, 4);
        });
        assert_eq!(p.instructions[0].trailing, vec![7]);
        assert_eq!(p.instructions[1].trailing, vec![0, 64, 4]);
    }

    #[test]
    fn rejects_length_mismatch() {
        assert!(decode_program(&[0, 5]).is_err());
    }
}
