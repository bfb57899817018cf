//! Xenos (Xbox 360 GPU) shader microcode to Direct3D 12 shader model 5.1
//! translator.
//!
//! The input is an already-parsed guest shader ([`ParsedInstruction`]s plus
//! [`ShaderInfo`]) and a [`Modification`] key describing the host pipeline
//! state the shader is specialized for. The output is a DXBC container built
//! with [`xenos_dxbc`], along with the binding tables the host needs to set
//! up root signatures and descriptor heaps.
//!
//! Guest behavior the host fixed-function pipeline can't express is emulated
//! in the generated code: the control-flow program counter, predication,
//! vertex fetch unpacking, memory export, and, with
//! [`TranslatorConfig::edram_rov_used`], the whole output merger.

#![forbid(unsafe_code)]

pub mod bindings;
pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod modification;
pub mod regalloc;
pub mod shader;
pub mod system_constants;
pub mod translator;
pub mod ucode;
pub mod xenos;

pub use crate::bindings::{SamplerBinding, TextureBinding};
pub use crate::cache::{CacheLookup, LookupSource, TranslationCache};
pub use crate::config::{TranslatorConfig, Vendor};
pub use crate::error::{CacheError, Diagnostic, DiagnosticKind, TranslateError};
pub use crate::modification::{
    DepthStencilMode, HostVertexShaderType, Modification, PixelModification, VertexModification,
};
pub use crate::shader::{CbufferRegister, ConstantRegisterMap, ShaderInfo, ShaderStage, Translation};
pub use crate::system_constants::{SystemConstantIndex, SystemConstants, UsedSystemConstants};
pub use crate::translator::Translator;
pub use crate::ucode::ParsedInstruction;
