use thiserror::Error;

/// Errors returned when parsing a `DXBC` container or one of its chunks.
///
/// Every variant carries a human-readable context string describing which
/// field or offset was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DxbcError {
    /// The fixed container header is missing, truncated or carries a bad magic.
    #[error("malformed DXBC header: {context}")]
    MalformedHeader {
        /// What was wrong.
        context: String,
    },
    /// The chunk offset table is inconsistent.
    #[error("malformed DXBC chunk offsets: {context}")]
    MalformedOffsets {
        /// What was wrong.
        context: String,
    },
    /// A declared range lies outside the buffer.
    #[error("DXBC data out of bounds: {context}")]
    OutOfBounds {
        /// What was wrong.
        context: String,
    },
    /// A chunk payload could not be decoded.
    #[error("invalid DXBC chunk: {context}")]
    InvalidChunk {
        /// What was wrong.
        context: String,
    },
}

impl DxbcError {
    /// Builds a [`DxbcError::MalformedHeader`].
    pub fn malformed_header(context: impl Into<String>) -> Self {
        Self::MalformedHeader {
            context: context.into(),
        }
    }

    /// Builds a [`DxbcError::MalformedOffsets`].
    pub fn malformed_offsets(context: impl Into<String>) -> Self {
        Self::MalformedOffsets {
            context: context.into(),
        }
    }

    /// Builds a [`DxbcError::OutOfBounds`].
    pub fn out_of_bounds(context: impl Into<String>) -> Self {
        Self::OutOfBounds {
            context: context.into(),
        }
    }

    /// Builds a [`DxbcError::InvalidChunk`].
    pub fn invalid_chunk(context: impl Into<String>) -> Self {
        Self::InvalidChunk {
            context: context.into(),
        }
    }

    /// Returns the context string without the variant prefix.
    pub fn context(&self) -> &str {
        match self {
            Self::MalformedHeader { context }
            | Self::MalformedOffsets { context }
            | Self::OutOfBounds { context }
            | Self::InvalidChunk { context } => context,
        }
    }
}
