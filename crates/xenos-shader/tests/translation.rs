//! Whole-translation properties: determinism, translator reuse and a
//! well-formed container for arbitrary ALU programs.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use xenos_dxbc::test_utils::decode_container_program;
use xenos_dxbc::{DxbcFile, FourCC, Opcode};
use xenos_shader::ucode::{
    ExecCondition, ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction, Predication,
    ResultStorage, ScalarAluInstruction, ScalarOpcode, SwizzleSource, VectorAluInstruction, VectorOpcode,
};
use xenos_shader::{
    Modification, ShaderInfo, ShaderStage, Translation, TranslationCache, Translator, TranslatorConfig,
};

const REGISTERS: u32 = 4;

fn vector_opcode() -> impl Strategy<Value = VectorOpcode> {
    prop::sample::select(vec![
        VectorOpcode::Add,
        VectorOpcode::Mul,
        VectorOpcode::Max,
        VectorOpcode::Min,
        VectorOpcode::Seq,
        VectorOpcode::Sge,
        VectorOpcode::Frc,
        VectorOpcode::Floor,
        VectorOpcode::Mad,
        VectorOpcode::CndGt,
        VectorOpcode::Dp4,
        VectorOpcode::Dp3,
        VectorOpcode::Max4,
        VectorOpcode::SetpEqPush,
    ])
}

fn scalar_opcode() -> impl Strategy<Value = ScalarOpcode> {
    prop::sample::select(vec![
        ScalarOpcode::Adds,
        ScalarOpcode::MulsPrev,
        ScalarOpcode::Exp,
        ScalarOpcode::Log,
        ScalarOpcode::Rcp,
        ScalarOpcode::Rsq,
        ScalarOpcode::SetpGt,
        ScalarOpcode::SetpInv,
        ScalarOpcode::Sqrt,
        ScalarOpcode::Sin,
    ])
}

fn operand() -> impl Strategy<Value = InstructionOperand> {
    (0..REGISTERS, any::<bool>(), any::<bool>(), prop::array::uniform4(0u32..4)).prop_map(
        |(index, absolute, negated, swizzle)| {
            InstructionOperand::register(index)
                .modified(absolute, negated)
                .swizzled(swizzle.map(SwizzleSource::from_component))
        },
    )
}

fn predication() -> impl Strategy<Value = Predication> {
    prop_oneof![3 => Just(Predication::NONE), 1 => any::<bool>().prop_map(Predication::on)]
}

fn instruction() -> impl Strategy<Value = ParsedInstruction> {
    prop_oneof![
        (vector_opcode(), predication(), 0..REGISTERS, 1u32..16, prop::collection::vec(operand(), 3)).prop_map(
            |(opcode, predication, index, mask, mut operands)| {
                operands.truncate(opcode.operand_count() as usize);
                ParsedInstruction::VectorAlu(VectorAluInstruction {
                    opcode,
                    predication,
                    result: InstructionResult::new(ResultStorage::Register, index, mask),
                    operands,
                })
            }
        ),
        (scalar_opcode(), predication(), 0..REGISTERS, operand()).prop_map(|(opcode, predication, index, operand)| {
            let operand = if opcode.has_two_operands() {
                operand
            } else {
                operand.scalar(SwizzleSource::X)
            };
            ParsedInstruction::ScalarAlu(ScalarAluInstruction {
                opcode,
                predication,
                result: InstructionResult::new(ResultStorage::Register, index, 0b0001),
                operands: vec![operand],
            })
        }),
    ]
}

fn program() -> impl Strategy<Value = Vec<ParsedInstruction>> {
    prop::collection::vec(
        (
            prop_oneof![
                Just(ExecCondition::Unconditional),
                any::<bool>().prop_map(|condition| ExecCondition::Predicate { condition }),
                any::<bool>().prop_map(|condition| ExecCondition::BoolConstant { index: 7, condition }),
            ],
            prop::collection::vec(instruction(), 1..6),
        ),
        1..4,
    )
    .prop_map(|blocks| {
        let count = blocks.len();
        let mut instructions = Vec::new();
        for (i, (condition, body)) in blocks.into_iter().enumerate() {
            let exec = ExecInstruction {
                cf_index: i as u32,
                condition,
                is_end: i + 1 == count,
                ..Default::default()
            };
            instructions.push(ParsedInstruction::Exec(exec));
            instructions.extend(body);
            instructions.push(ParsedInstruction::ExecEnd(exec));
        }
        instructions
    })
}

fn info(stage: ShaderStage) -> ShaderInfo {
    let mut info = ShaderInfo::new(stage);
    info.register_count = REGISTERS;
    info
}

fn modification(stage: ShaderStage) -> Modification {
    match stage {
        ShaderStage::Vertex => Modification::default_vertex(),
        ShaderStage::Pixel => Modification::default_pixel(),
    }
}

/// Translator logs go to the test output when run with `--nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

fn translate(translator: &mut Translator, instructions: &[ParsedInstruction], stage: ShaderStage) -> Translation {
    translator
        .translate(instructions, &info(stage), modification(stage))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn translation_is_deterministic(instructions in program(), pixel in any::<bool>()) {
        let stage = if pixel { ShaderStage::Pixel } else { ShaderStage::Vertex };
        let first = translate(&mut Translator::new(TranslatorConfig::default()).unwrap(), &instructions, stage);
        let second = translate(&mut Translator::new(TranslatorConfig::default()).unwrap(), &instructions, stage);
        prop_assert_eq!(&first.dxbc, &second.dxbc);
        prop_assert!(first.is_valid);

        let file = DxbcFile::parse(&first.dxbc).unwrap();
        prop_assert!(file.get_rdef().unwrap().is_ok());
        prop_assert!(file.get_signature(FourCC::ISGN).unwrap().is_ok());
        prop_assert!(file.get_signature(FourCC::OSGN).unwrap().is_ok());

        let program = decode_container_program(&first.dxbc);
        let temps = program.with_opcode(Opcode::DclTemps).next().unwrap().trailing[0];
        prop_assert!(temps >= REGISTERS);
        // Every opened block is closed.
        prop_assert_eq!(program.count(Opcode::If), program.count(Opcode::EndIf));
        prop_assert_eq!(program.count(Opcode::Loop), program.count(Opcode::EndLoop));
        prop_assert_eq!(program.count(Opcode::Switch), program.count(Opcode::EndSwitch));
    }
}

#[test]
fn reused_translator_matches_a_fresh_one() {
    init_tracing();
    let exec = ExecInstruction {
        is_end: true,
        ..Default::default()
    };
    let mad = ParsedInstruction::VectorAlu(VectorAluInstruction {
        opcode: VectorOpcode::Mad,
        predication: Predication::on(true),
        result: InstructionResult::new(ResultStorage::Register, 0, 0b0111),
        operands: vec![
            InstructionOperand::register(1),
            InstructionOperand::register(2),
            InstructionOperand::register(3),
        ],
    });
    let instructions = vec![ParsedInstruction::Exec(exec), mad, ParsedInstruction::ExecEnd(exec)];

    let mut reused = Translator::new(TranslatorConfig::default()).unwrap();
    for stage in [ShaderStage::Pixel, ShaderStage::Vertex, ShaderStage::Pixel] {
        let again = translate(&mut reused, &instructions, stage);
        let fresh = translate(&mut Translator::new(TranslatorConfig::default()).unwrap(), &instructions, stage);
        assert_eq!(again.dxbc, fresh.dxbc);
        assert_eq!(again.constant_buffers, fresh.constant_buffers);
    }
}

#[test]
fn cache_returns_the_same_translation() {
    init_tracing();
    let exec = ExecInstruction {
        is_end: true,
        ..Default::default()
    };
    let instructions = vec![ParsedInstruction::Exec(exec), ParsedInstruction::ExecEnd(exec)];
    let ucode = [0x1234_5678, 0x9ABC_DEF0, 0];
    let stage = ShaderStage::Vertex;
    let mut cache = TranslationCache::new(Translator::new(TranslatorConfig::default()).unwrap());
    let first = cache
        .get_or_translate(&ucode, &instructions, &info(stage), modification(stage))
        .unwrap()
        .shared();
    let second = cache
        .get_or_translate(&ucode, &instructions, &info(stage), modification(stage))
        .unwrap()
        .shared();
    assert_eq!(first.dxbc, second.dxbc);
    assert_eq!(cache.len(), 1);
}

#[test]
fn translators_on_separate_threads_agree() {
    let exec = ExecInstruction {
        is_end: true,
        ..Default::default()
    };
    let add = ParsedInstruction::VectorAlu(VectorAluInstruction {
        opcode: VectorOpcode::Add,
        predication: Predication::NONE,
        result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
        operands: vec![InstructionOperand::register(1), InstructionOperand::register(2)],
    });
    let instructions = vec![ParsedInstruction::Exec(exec), add, ParsedInstruction::ExecEnd(exec)];

    let outputs: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = [ShaderStage::Vertex, ShaderStage::Pixel]
            .into_iter()
            .cycle()
            .take(4)
            .map(|stage| {
                let instructions = &instructions;
                scope.spawn(move || {
                    let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
                    translate(&mut translator, instructions, stage).dxbc
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert_eq!(outputs[0], outputs[2]);
    assert_eq!(outputs[1], outputs[3]);
    assert_ne!(outputs[0], outputs[1]);
}
