use std::fmt;

use thiserror::Error;

/// Category of a problem found while translating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// The opcode has no translation. A zero result was substituted and the
    /// translation is marked invalid.
    UnsupportedOpcode,
    /// The guest shader does something its hardware doesn't define, such as
    /// `getCompTexLOD` with explicit gradients. A substitute was emitted.
    SpecificationViolation,
    /// A binding table is full; the last slot was reused.
    ResourceBudgetExceeded,
}

/// A problem attached to a translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Index into the instruction stream, `None` for shader-wide problems.
    pub instruction_index: Option<usize>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instruction_index {
            Some(index) => write!(f, "{:?} at instruction {index}: {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Rejected inputs, reported before any code is emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("invalid translator config: {0}")]
    InvalidConfig(String),
    #[error("invalid shader info: {0}")]
    InvalidShaderInfo(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("instruction stream of {len} instructions exceeds maximum {max}")]
    TooLarge { len: usize, max: usize },
}
