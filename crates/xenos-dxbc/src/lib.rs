//! Shader model 5.1 bytecode (`DXBC`) encoder and a strict reader for the
//! same format.
//!
//! The encoder side is what the Xenos translator emits through:
//!
//! - [`Dest`]/[`Src`] operand values and the opcode-token helpers,
//! - the [`Assembler`], one method per instruction or declaration, which
//!   also keeps the [`Statistics`] (`STAT`) record up to date,
//! - writers for the `RDEF`, `ISGN`/`OSGN` chunks and the container itself.
//!
//! The reader side validates every offset and never panics on malformed
//! input. It is used by tests and by callers that inspect translated shaders.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod assembler;
mod container;
mod error;
mod fourcc;
/// Opcode numbers and declaration enums.
pub mod opcode;
/// Operand encoding.
pub mod operand;
/// `RDEF` writer and parser.
pub mod rdef;
/// `SHEX` token decoder.
pub mod shex;
/// `ISGN`/`OSGN` writer and parser.
pub mod signature;
mod stats;

/// Helpers for building and inspecting blobs in tests.
///
/// Available to this crate's own tests and behind the `test-utils` feature.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::assembler::Assembler;
pub use crate::container::{write_container, DxbcChunk, DxbcFile, DxbcHeader, CONTAINER_VERSION};
pub use crate::error::DxbcError;
pub use crate::fourcc::FourCC;
pub use crate::opcode::Opcode;
pub use crate::operand::{Dest, Index, OperandType, Src};
pub use crate::rdef::{parse_rdef_chunk, RdefBuilder, RdefChunk};
pub use crate::shex::{decode_program, DecodedInstruction, DecodedOperand, ShexProgram};
pub use crate::signature::{parse_signature_chunk, write_signature_chunk, SignatureChunk, SignatureEntry, SignatureParameter};
pub use crate::stats::Statistics;
