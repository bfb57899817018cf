use crate::{decode_program, Assembler, DxbcFile, ShexProgram, Statistics};

/// Executes decoded programs for behavioral tests.
pub mod interpreter;

pub use self::interpreter::{Interpreter, Outcome};

/// Runs `f` against a fresh assembler and returns a complete `SHEX` body
/// (version token and length included) plus the statistics.
pub fn assemble(version: u32, f: impl FnOnce(&mut Assembler<'_>)) -> (Vec<u32>, Statistics) {
    let mut code = vec![version, 0];
    let mut stat = Statistics::default();
    f(&mut Assembler::new(&mut code, &mut stat));
    code[1] = code.len() as u32;
    (code, stat)
}

/// Decodes a bare instruction body, without the version and length tokens.
pub fn decode_body(version: u32, body: &[u32]) -> ShexProgram {
    let mut tokens = Vec::with_capacity(body.len() + 2);
    tokens.push(version);
    tokens.push(body.len() as u32 + 2);
    tokens.extend_from_slice(body);
    decode_program(&tokens).expect("body should decode")
}

/// Parses a container and decodes its `SHEX` chunk.
pub fn decode_container_program(bytes: &[u8]) -> ShexProgram {
    let file = DxbcFile::parse(bytes).expect("container should parse");
    let tokens = file.shader_tokens().expect("container has no SHEX chunk");
    decode_program(&tokens).expect("SHEX should decode")
}
