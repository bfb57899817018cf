//! `ISGN`/`OSGN` signature chunks.
//!
//! The writer produces the 24-byte entry layout; the parser accepts the same
//! layout and validates every offset.

use crate::error::DxbcError;
use crate::opcode::ALIGNMENT_PADDING;

const SIGNATURE_HEADER_LEN: usize = 8;
const SIGNATURE_ENTRY_LEN: usize = 24;

/// `D3D_REGISTER_COMPONENT_TYPE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ComponentType {
    Unknown = 0,
    UInt32 = 1,
    SInt32 = 2,
    Float32 = 3,
}

/// `D3D_NAME` values used in signatures.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SystemValue {
    Undefined = 0,
    Position = 1,
    ClipDistance = 2,
    CullDistance = 3,
    VertexId = 6,
    IsFrontFace = 9,
    SampleIndex = 10,
    Target = 64,
    Depth = 65,
    Coverage = 66,
    DepthLessEqual = 69,
    StencilRef = 70,
}

/// One parameter to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParameter {
    /// Semantic name such as `TEXCOORD` or `SV_Position`.
    pub semantic_name: String,
    /// Semantic index.
    pub semantic_index: u32,
    /// System value.
    pub system_value: SystemValue,
    /// Component type.
    pub component_type: ComponentType,
    /// Register number, or `u32::MAX` for registerless outputs such as `SV_Depth`.
    pub register: u32,
    /// Components present.
    pub mask: u8,
    /// Components always read (inputs) or never written (outputs).
    pub rw_mask: u8,
}

impl SignatureParameter {
    /// A parameter with no system value.
    pub fn new(semantic_name: &str, semantic_index: u32, component_type: ComponentType, register: u32, mask: u8) -> Self {
        Self {
            semantic_name: semantic_name.to_owned(),
            semantic_index,
            system_value: SystemValue::Undefined,
            component_type,
            register,
            mask,
            rw_mask: 0,
        }
    }

    /// Sets the system value.
    #[must_use]
    pub fn system_value(mut self, system_value: SystemValue) -> Self {
        self.system_value = system_value;
        self
    }

    /// Sets the read/write mask.
    #[must_use]
    pub fn rw_mask(mut self, rw_mask: u8) -> Self {
        self.rw_mask = rw_mask;
        self
    }
}

/// Appends a string plus terminator padded to a dword boundary.
pub fn append_aligned_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(ALIGNMENT_PADDING);
    }
}

/// Serializes a signature chunk payload.
///
/// Identical semantic names share one string.
pub fn write_signature_chunk(parameters: &[SignatureParameter]) -> Vec<u8> {
    let names_start = SIGNATURE_HEADER_LEN + SIGNATURE_ENTRY_LEN * parameters.len();
    let mut names = Vec::new();
    let mut name_offsets: Vec<(&str, u32)> = Vec::new();
    let mut entries = Vec::with_capacity(names_start);
    entries.extend_from_slice(&(parameters.len() as u32).to_le_bytes());
    entries.extend_from_slice(&(SIGNATURE_HEADER_LEN as u32).to_le_bytes());
    for parameter in parameters {
        let name_offset = match name_offsets
            .iter()
            .find(|(name, _)| *name == parameter.semantic_name)
        {
            Some(&(_, offset)) => offset,
            None => {
                let offset = (names_start + names.len()) as u32;
                append_aligned_string(&mut names, &parameter.semantic_name);
                name_offsets.push((&parameter.semantic_name, offset));
                offset
            }
        };
        for dword in [
            name_offset,
            parameter.semantic_index,
            parameter.system_value as u32,
            parameter.component_type as u32,
            parameter.register,
            u32::from(parameter.mask) | (u32::from(parameter.rw_mask) << 8),
        ] {
            entries.extend_from_slice(&dword.to_le_bytes());
        }
    }
    entries.extend_from_slice(&names);
    entries
}

/// A parsed signature chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureChunk {
    /// Entries in file order.
    pub entries: Vec<SignatureEntry>,
}

/// A parsed signature entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    /// Semantic name.
    pub semantic_name: String,
    /// Semantic index.
    pub semantic_index: u32,
    /// Register index.
    pub register: u32,
    /// Raw `D3D_NAME`.
    pub system_value_type: u32,
    /// Raw `D3D_REGISTER_COMPONENT_TYPE`.
    pub component_type: u32,
    /// Component presence mask.
    pub mask: u8,
    /// Read/write mask.
    pub read_write_mask: u8,
}

/// Parses a signature chunk payload.
pub fn parse_signature_chunk(bytes: &[u8]) -> Result<SignatureChunk, DxbcError> {
    let count = dword_at(bytes, 0, "element count")? as usize;
    let table = dword_at(bytes, 4, "element offset")? as usize;
    if count == 0 {
        return Ok(SignatureChunk::default());
    }
    if table < SIGNATURE_HEADER_LEN || table % 4 != 0 {
        return Err(DxbcError::invalid_chunk(format!("element table at unaligned or header offset {table}")));
    }
    let table_end = count
        .checked_mul(SIGNATURE_ENTRY_LEN)
        .and_then(|len| len.checked_add(table))
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| {
            DxbcError::invalid_chunk(format!("{count} elements at {table} overrun {} bytes", bytes.len()))
        })?;

    let entries = (0..count)
        .map(|i| {
            let element = table + i * SIGNATURE_ENTRY_LEN;
            let field = |index: usize| dword_at(bytes, element + 4 * index, "element field");
            let name_offset = field(0)? as usize;
            if name_offset < SIGNATURE_HEADER_LEN || (table..table_end).contains(&name_offset) {
                return Err(DxbcError::invalid_chunk(format!(
                    "element {i} name at {name_offset} overlaps the element table"
                )));
            }
            let [mask, read_write_mask, _, _] = field(5)?.to_le_bytes();
            Ok(SignatureEntry {
                semantic_name: cstr_at(bytes, name_offset, "semantic name")?.to_owned(),
                semantic_index: field(1)?,
                system_value_type: field(2)?,
                component_type: field(3)?,
                register: field(4)?,
                mask,
                read_write_mask,
            })
        })
        .collect::<Result<Vec<_>, DxbcError>>()?;
    Ok(SignatureChunk { entries })
}

/// The little-endian dword at `offset`.
pub(crate) fn dword_at(bytes: &[u8], offset: usize, what: &str) -> Result<u32, DxbcError> {
    offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .map(|dword| u32::from_le_bytes([dword[0], dword[1], dword[2], dword[3]]))
        .ok_or_else(|| DxbcError::invalid_chunk(format!("{what} at {offset} is past the {}-byte chunk", bytes.len())))
}

/// The NUL-terminated UTF-8 string at `offset`.
pub(crate) fn cstr_at<'a>(bytes: &'a [u8], offset: usize, what: &str) -> Result<&'a str, DxbcError> {
    let tail = bytes.get(offset..).unwrap_or_default();
    let Some(len) = tail.iter().position(|&b| b == 0) else {
        return Err(DxbcError::invalid_chunk(format!("{what} at {offset} is not terminated")));
    };
    core::str::from_utf8(&tail[..len]).map_err(|_| DxbcError::invalid_chunk(format!("{what} at {offset} is not UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_semantic_names_are_stored_once() {
        let bytes = write_signature_chunk(&[
            SignatureParameter::new("TEXCOORD", 0, ComponentType::Float32, 0, 0b1111),
            SignatureParameter::new("TEXCOORD", 1, ComponentType::Float32, 1, 0b1111),
        ]);
        // Header, two entries, then "TEXCOORD\0" padded to 12 bytes.
        assert_eq!(bytes.len(), 8 + 2 * 24 + 12);
        assert_eq!(&bytes[bytes.len() - 3..], &[0xAB, 0xAB, 0xAB]);

        let parsed = parse_signature_chunk(&bytes).unwrap();
        assert_eq!(parsed.entries[1].semantic_name, "TEXCOORD");
        assert_eq!(parsed.entries[1].semantic_index, 1);
        assert_eq!(parsed.entries[1].register, 1);
    }

    #[test]
    fn name_pointing_into_table_is_rejected() {
        let mut bytes = write_signature_chunk(&[SignatureParameter::new(
            "SV_Target",
            0,
            ComponentType::Float32,
            0,
            0b1111,
        )]);
        bytes[8..12].copy_from_slice(&8u32.to_le_bytes());
        assert!(parse_signature_chunk(&bytes).is_err());
    }
}
