//! A vertex shader combining a vertex fetch, a texture fetch, a guest `mad`
//! and a memory export, checked on the emitted DXBC.

use pretty_assertions::assert_eq;
use xenos_dxbc::test_utils::decode_container_program;
use xenos_dxbc::{Opcode, ShexProgram};
use xenos_shader::ucode::{
    AllocInstruction, AllocKind, ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction,
    Predication, ResultStorage, SwizzleSource, TextureFetchAttributes, TextureFetchInstruction, TextureFetchOpcode,
    VectorAluInstruction, VectorOpcode, VertexFetchAttributes, VertexFetchInstruction,
};
use xenos_shader::xenos::{memexport, SignedRepeatingFractionMode, SurfaceFormat, TextureDimension};
use xenos_shader::{Modification, ShaderInfo, ShaderStage, Translation, Translator, TranslatorConfig};

fn vfetch(is_mini_fetch: bool, register: u32, format: SurfaceFormat, offset: i32) -> ParsedInstruction {
    ParsedInstruction::VertexFetch(VertexFetchInstruction {
        is_mini_fetch,
        predication: Predication::NONE,
        result: InstructionResult::new(ResultStorage::Register, register, 0b1111),
        operand: InstructionOperand::register(0).scalar(SwizzleSource::X),
        fetch_constant: 95,
        attributes: VertexFetchAttributes {
            format,
            offset,
            // 16 bytes.
            stride: 4,
            exp_adjust: 0,
            is_index_rounded: false,
            is_signed: false,
            is_integer: false,
            signed_rf_mode: SignedRepeatingFractionMode::ClampNegativeOne,
        },
    })
}

fn vector(opcode: VectorOpcode, storage: ResultStorage, index: u32, operands: Vec<InstructionOperand>) -> ParsedInstruction {
    ParsedInstruction::VectorAlu(VectorAluInstruction {
        opcode,
        predication: Predication::NONE,
        result: InstructionResult::new(storage, index, 0b1111),
        operands,
    })
}

fn shader(with_mad: bool) -> (Vec<ParsedInstruction>, ShaderInfo) {
    let r = InstructionOperand::register;
    let c0 = InstructionOperand::float_constant(0);
    let exec = ExecInstruction {
        is_end: true,
        ..Default::default()
    };
    let mut instructions = vec![
        ParsedInstruction::Alloc(AllocInstruction {
            cf_index: 0,
            kind: AllocKind::Memory,
            count: 1,
        }),
        ParsedInstruction::Exec(exec),
        vfetch(false, 1, SurfaceFormat::k_8_8_8_8, 0),
        vfetch(true, 2, SurfaceFormat::k_2_10_10_10, 1),
        ParsedInstruction::TextureFetch(TextureFetchInstruction {
            opcode: TextureFetchOpcode::TextureFetch,
            dimension: TextureDimension::D2,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 3, 0b1111),
            operand: Some(r(1)),
            fetch_constant: 0,
            attributes: TextureFetchAttributes::default(),
        }),
    ];
    if with_mad {
        instructions.push(vector(VectorOpcode::Mad, ResultStorage::Register, 1, vec![r(1), r(2), r(3)]));
    }
    instructions.extend([
        vector(VectorOpcode::Max, ResultStorage::ExportAddress, 0, vec![c0, c0]),
        vector(VectorOpcode::Max, ResultStorage::ExportData, 0, vec![r(1), r(1)]),
        ParsedInstruction::ExecEnd(exec),
    ]);

    let mut info = ShaderInfo::new(ShaderStage::Vertex);
    info.register_count = 4;
    info.memexport_em_written = vec![0b1];
    info.constant_register_map.float_bitmap[0] = 0b1;
    (instructions, info)
}

fn translate(with_mad: bool) -> (Translation, ShexProgram) {
    let (instructions, info) = shader(with_mad);
    let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
    let translation = translator
        .translate(&instructions, &info, Modification::default_vertex())
        .unwrap();
    let program = decode_container_program(&translation.dxbc);
    (translation, program)
}

fn position(program: &ShexProgram, predicate: impl Fn(&xenos_dxbc::DecodedInstruction) -> bool) -> Option<usize> {
    program.instructions.iter().position(predicate)
}

#[test]
fn translation_is_clean() {
    let (translation, _) = translate(true);
    assert!(translation.is_valid);
    assert!(translation.diagnostics.is_empty());
    assert!(translation.uses_shared_memory_uav);
    assert!(translation.texture_bindings.iter().all(|binding| binding.fetch_constant == 0));
    assert!(!translation.texture_bindings.is_empty());
}

#[test]
fn vertex_fields_are_extracted_per_format() {
    let (_, program) = translate(true);
    let widths: Vec<Vec<u32>> = program
        .with_opcode(Opcode::UBfe)
        .map(|instruction| instruction.operands[1].immediate.clone())
        .collect();
    assert!(widths.contains(&vec![8, 8, 8, 8]), "{widths:?}");
    assert!(widths.contains(&vec![10, 10, 10, 2]), "{widths:?}");
}

#[test]
fn vertex_address_uses_the_stride_in_dwords() {
    let (_, program) = translate(true);
    assert!(program
        .with_opcode(Opcode::IMad)
        .any(|instruction| instruction.operands[2].immediate == vec![4]));
}

#[test]
fn guest_mad_is_not_fused() {
    let (_, with) = translate(true);
    let (_, without) = translate(false);
    assert_eq!(with.count(Opcode::Mad), without.count(Opcode::Mad));
    assert_eq!(with.count(Opcode::Mul), without.count(Opcode::Mul) + 1);
    assert_eq!(with.count(Opcode::Add), without.count(Opcode::Add) + 1);
}

#[test]
fn export_is_gated_by_the_address_check() {
    let (_, program) = translate(true);
    let check = position(&program, |instruction| {
        instruction.opcode == Opcode::IEq
            && instruction
                .operands
                .iter()
                .any(|operand| operand.immediate == vec![memexport::ADDRESS_CHECK_VALUE])
    })
    .unwrap();
    let first_store = position(&program, |instruction| {
        matches!(instruction.opcode, Opcode::StoreRaw | Opcode::AtomicAnd | Opcode::AtomicOr)
    })
    .unwrap();
    assert!(check < first_store);
    assert_eq!(program.instructions[check + 1].opcode, Opcode::If);
}

#[test]
fn export_packs_8_8_8_8() {
    let (_, program) = translate(true);
    let format = SurfaceFormat::k_8_8_8_8 as u32;
    let case = position(&program, |instruction| {
        instruction.opcode == Opcode::Case && instruction.operands[0].immediate == vec![format]
    });
    assert!(case.is_some());
    // Rounded to 8 bits and inserted at 0, 8, 16 and 24.
    assert!(program.with_opcode(Opcode::Bfi).count() >= 1);
}
