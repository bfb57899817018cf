#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
#[cfg(not(target_arch = "wasm32"))]
use xenos_shader::ucode::{
    AllocInstruction, AllocKind, ExecCondition, ExecInstruction, InstructionOperand, InstructionResult,
    ParsedInstruction, Predication, ResultStorage, SwizzleSource, TextureFetchAttributes, TextureFetchInstruction,
    TextureFetchOpcode, VectorAluInstruction, VectorOpcode, VertexFetchAttributes, VertexFetchInstruction,
};
#[cfg(not(target_arch = "wasm32"))]
use xenos_shader::xenos::{SignedRepeatingFractionMode, SurfaceFormat, TextureDimension};
#[cfg(not(target_arch = "wasm32"))]
use xenos_shader::{Modification, ShaderInfo, ShaderStage, TranslationCache, Translator, TranslatorConfig};

#[cfg(not(target_arch = "wasm32"))]
fn alu(opcode: VectorOpcode, storage: ResultStorage, index: u32, operands: Vec<InstructionOperand>) -> ParsedInstruction {
    ParsedInstruction::VectorAlu(VectorAluInstruction {
        opcode,
        predication: Predication::NONE,
        result: InstructionResult::new(storage, index, 0b1111),
        operands,
    })
}

/// Transforms a fetched position by a 4x4 matrix in c0-c3 and exports a
/// texture fetch result as the first interpolator.
#[cfg(not(target_arch = "wasm32"))]
fn vertex_shader() -> (Vec<ParsedInstruction>, ShaderInfo) {
    let r = InstructionOperand::register;
    let c = InstructionOperand::float_constant;
    let exec = ExecInstruction {
        is_end: true,
        ..Default::default()
    };
    let mut instructions = vec![
        ParsedInstruction::Alloc(AllocInstruction {
            cf_index: 0,
            kind: AllocKind::Position,
            count: 1,
        }),
        ParsedInstruction::Exec(exec),
        ParsedInstruction::VertexFetch(VertexFetchInstruction {
            is_mini_fetch: false,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 1, 0b1111),
            operand: r(0).scalar(SwizzleSource::X),
            fetch_constant: 95,
            attributes: VertexFetchAttributes {
                format: SurfaceFormat::k_32_32_32_FLOAT,
                offset: 0,
                stride: 5,
                exp_adjust: 0,
                is_index_rounded: false,
                is_signed: false,
                is_integer: false,
                signed_rf_mode: SignedRepeatingFractionMode::ClampNegativeOne,
            },
        }),
    ];
    for row in 0..4 {
        let x = r(1).scalar(SwizzleSource::from_component(row));
        let op = if row == 0 { VectorOpcode::Mul } else { VectorOpcode::Mad };
        let mut operands = vec![c(row), x];
        if row != 0 {
            operands.push(r(2));
        }
        instructions.push(alu(op, ResultStorage::Register, 2, operands));
    }
    instructions.extend([
        ParsedInstruction::TextureFetch(TextureFetchInstruction {
            opcode: TextureFetchOpcode::TextureFetch,
            dimension: TextureDimension::D2,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 3, 0b1111),
            operand: Some(r(1)),
            fetch_constant: 0,
            attributes: TextureFetchAttributes::default(),
        }),
        alu(VectorOpcode::Max, ResultStorage::Position, 0, vec![r(2), r(2)]),
        alu(VectorOpcode::Max, ResultStorage::Interpolator, 0, vec![r(3), r(3)]),
        ParsedInstruction::ExecEnd(exec),
    ]);

    let mut info = ShaderInfo::new(ShaderStage::Vertex);
    info.register_count = 4;
    info.constant_register_map.float_bitmap[0] = 0b1111;
    (instructions, info)
}

/// Predicated lighting-style arithmetic across several execs, written to
/// color 0.
#[cfg(not(target_arch = "wasm32"))]
fn pixel_shader() -> (Vec<ParsedInstruction>, ShaderInfo) {
    let r = InstructionOperand::register;
    let mut instructions = Vec::new();
    let conditions = [
        ExecCondition::Unconditional,
        ExecCondition::BoolConstant {
            index: 2,
            condition: true,
        },
        ExecCondition::Predicate { condition: true },
        ExecCondition::Unconditional,
    ];
    for (i, condition) in conditions.into_iter().enumerate() {
        let exec = ExecInstruction {
            cf_index: i as u32,
            condition,
            is_end: i + 1 == conditions.len(),
            ..Default::default()
        };
        instructions.push(ParsedInstruction::Exec(exec));
        instructions.push(alu(VectorOpcode::Dp3, ResultStorage::Register, 2, vec![r(0), r(1)]));
        instructions.push(alu(VectorOpcode::SetpGtPush, ResultStorage::Register, 3, vec![r(2), r(1)]));
        instructions.push(alu(VectorOpcode::Mad, ResultStorage::Register, 4, vec![r(2), r(0), r(4)]));
        instructions.push(ParsedInstruction::ExecEnd(exec));
    }
    let last = instructions.len() - 1;
    instructions.insert(last, alu(VectorOpcode::Max, ResultStorage::Color, 0, vec![r(4), r(4)]));

    let mut info = ShaderInfo::new(ShaderStage::Pixel);
    info.register_count = 5;
    info.writes_color_targets = 0b1;
    (instructions, info)
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_translation(c: &mut Criterion) {
    let shaders = [
        ("vertex", vertex_shader(), Modification::default_vertex()),
        ("pixel", pixel_shader(), Modification::default_pixel()),
    ];
    let configs = [
        ("bindful", TranslatorConfig::default()),
        (
            "rov_bindless",
            TranslatorConfig {
                edram_rov_used: true,
                bindless_resources_used: true,
                ..Default::default()
            },
        ),
    ];

    let mut group = c.benchmark_group("xenos_shader_translation");
    for (config_name, config) in configs {
        let mut translator = Translator::new(config).unwrap();
        for (name, (instructions, info), modification) in &shaders {
            group.bench_with_input(
                BenchmarkId::new(config_name, name),
                instructions,
                |b, instructions| {
                    b.iter(|| {
                        let translation = translator
                            .translate(black_box(instructions), info, *modification)
                            .unwrap();
                        black_box(translation.dxbc.len());
                    })
                },
            );
        }
    }

    let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
    group.bench_function("depth_only", |b| {
        b.iter(|| black_box(translator.create_depth_only_pixel_shader().dxbc.len()))
    });
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_cache(c: &mut Criterion) {
    let (instructions, info) = pixel_shader();
    let ucode: Vec<u32> = (0..96).collect();
    let modification = Modification::default_pixel();
    let mut cache = TranslationCache::new(Translator::new(TranslatorConfig::default()).unwrap());
    cache
        .get_or_translate(&ucode, &instructions, &info, modification)
        .unwrap();

    let mut group = c.benchmark_group("xenos_shader_cache");
    group.bench_function("key", |b| {
        b.iter(|| black_box(cache.key(black_box(&ucode), info.stage, modification)))
    });
    group.bench_function("lookup_hit", |b| {
        b.iter(|| {
            let lookup = cache
                .get_or_translate(black_box(&ucode), &instructions, &info, modification)
                .unwrap();
            black_box(lookup.source);
        })
    });
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_translation, bench_cache);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
