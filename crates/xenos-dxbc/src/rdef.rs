//! `RDEF` resource definition chunks.
//!
//! [`RdefBuilder`] writes the shader model 5.1 layout (15-dword header,
//! 40-byte bindings with register spaces). [`parse_rdef_chunk`] reads both
//! that layout and the older 7-dword one with 32-byte bindings.

use crate::error::DxbcError;
use crate::signature::{append_aligned_string, cstr_at, dword_at};

const HEADER_LEN_V50: usize = 7 * 4;
const HEADER_LEN_V51: usize = 15 * 4;
const CBUFFER_LEN: usize = 6 * 4;
const BINDING_LEN_V50: usize = 8 * 4;
const BINDING_LEN_V51: usize = 10 * 4;
const VARIABLE_LEN_V50: usize = 6 * 4;
const VARIABLE_LEN_V51: usize = 10 * 4;
const TYPE_LEN: usize = 9 * 4;
const MEMBER_LEN: usize = 3 * 4;

/// `RD11` marker in the 5.1 header (`"RD11"` with the shader model 5.1 bit pattern).
pub const RDEF_FOURCC_5_1: u32 = 0x2544_1313;

/// Pixel shader 5.1 target word.
pub const SHADER_MODEL_PS_5_1: u32 = 0xFFFF_0501;
/// Vertex shader 5.1 target word.
pub const SHADER_MODEL_VS_5_1: u32 = 0xFFFE_0501;

/// `D3D_SHADER_VARIABLE_FLAGS`: the variable is referenced by the code.
pub const VARIABLE_FLAG_USED: u32 = 1 << 1;
/// `D3D_SHADER_INPUT_FLAGS`: four-component return type.
pub const INPUT_FLAGS_TEXTURE_COMPONENTS_4: u32 = 3 << 2;

/// `D3D_SHADER_VARIABLE_CLASS`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VariableClass {
    Scalar = 0,
    Vector = 1,
    MatrixRows = 2,
    MatrixColumns = 3,
    Object = 4,
    Struct = 5,
}

/// `D3D_SHADER_VARIABLE_TYPE` subset.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum VariableType {
    Void = 0,
    Int = 2,
    Float = 3,
    UInt = 19,
}

/// `D3D_SHADER_INPUT_TYPE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InputType {
    Cbuffer = 0,
    Tbuffer = 1,
    Texture = 2,
    Sampler = 3,
    UavRwTyped = 4,
    Structured = 5,
    UavRwStructured = 6,
    ByteAddress = 7,
    UavRwByteAddress = 8,
}

/// `D3D_SRV_DIMENSION` subset used in bindings.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindingDimension {
    Unknown = 0,
    Buffer = 1,
    Texture2D = 4,
    Texture2DArray = 5,
    Texture3D = 8,
    TextureCube = 9,
}

/// `D3D_RESOURCE_RETURN_TYPE` in bindings (0 for non-texture inputs).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BindingReturnType {
    None = 0,
    UNorm = 1,
    SNorm = 2,
    SInt = 3,
    UInt = 4,
    Float = 5,
    Mixed = 6,
}

/// A type descriptor to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefTypeDesc {
    /// Type name; array types reuse the element type's name.
    pub name: String,
    /// Variable class.
    pub class: VariableClass,
    /// Scalar type.
    pub ty: VariableType,
    /// Rows.
    pub rows: u16,
    /// Columns.
    pub columns: u16,
    /// Array length, 0 for non-arrays.
    pub elements: u16,
}

impl RdefTypeDesc {
    /// A scalar or vector type.
    pub fn vector(name: &str, ty: VariableType, columns: u16) -> Self {
        Self {
            name: name.to_owned(),
            class: if columns == 1 {
                VariableClass::Scalar
            } else {
                VariableClass::Vector
            },
            ty,
            rows: 1,
            columns,
            elements: 0,
        }
    }

    /// An array of this type.
    #[must_use]
    pub fn array(&self, elements: u16) -> Self {
        Self {
            elements,
            ..self.clone()
        }
    }
}

/// A constant buffer member to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefVariableDesc {
    /// Member name.
    pub name: String,
    /// Offset from the start of the buffer.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
    /// Whether the code references it.
    pub used: bool,
    /// Index into the builder's type list.
    pub type_index: usize,
}

/// A constant buffer to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefCbufferDesc {
    /// Buffer name.
    pub name: String,
    /// Size rounded up to 16 bytes.
    pub size: u32,
    /// Members.
    pub variables: Vec<RdefVariableDesc>,
}

/// A resource binding to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefBindingDesc {
    /// Binding name.
    pub name: String,
    /// Input type.
    pub input_type: InputType,
    /// Texture return type.
    pub return_type: BindingReturnType,
    /// Dimension.
    pub dimension: BindingDimension,
    /// `u32::MAX` for non-multisampled textures, 0 otherwise.
    pub sample_count: u32,
    /// First register.
    pub bind_point: u32,
    /// Register count.
    pub bind_count: u32,
    /// `D3D_SHADER_INPUT_FLAGS`.
    pub flags: u32,
    /// Register space.
    pub space: u32,
    /// Range identifier used by shader model 5.1 operands.
    pub id: u32,
}

/// Collects reflection data and serializes an `RDEF` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefBuilder {
    /// Target word, such as [`SHADER_MODEL_PS_5_1`].
    pub shader_model: u32,
    /// Generator string.
    pub creator: String,
    /// Type table.
    pub types: Vec<RdefTypeDesc>,
    /// Constant buffers, in binding order.
    pub cbuffers: Vec<RdefCbufferDesc>,
    /// Bindings, in `s#`, `t#`, `u#`, `cb#` order.
    pub bindings: Vec<RdefBindingDesc>,
}

struct StringTable {
    base: usize,
    bytes: Vec<u8>,
    offsets: Vec<(String, u32)>,
}

impl StringTable {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some((_, offset)) = self.offsets.iter().find(|(name, _)| name == s) {
            return *offset;
        }
        let offset = (self.base + self.bytes.len()) as u32;
        append_aligned_string(&mut self.bytes, s);
        self.offsets.push((s.to_owned(), offset));
        offset
    }
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

impl RdefBuilder {
    /// An empty builder for the given target.
    pub fn new(shader_model: u32, creator: &str) -> Self {
        Self {
            shader_model,
            creator: creator.to_owned(),
            types: Vec::new(),
            cbuffers: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Adds a type and returns its index.
    pub fn add_type(&mut self, ty: RdefTypeDesc) -> usize {
        if let Some(index) = self.types.iter().position(|t| *t == ty) {
            return index;
        }
        self.types.push(ty);
        self.types.len() - 1
    }

    /// Serializes the chunk payload.
    pub fn build(&self) -> Vec<u8> {
        let variable_count: usize = self.cbuffers.iter().map(|cb| cb.variables.len()).sum();
        let types_start = HEADER_LEN_V51;
        let variables_start = types_start + TYPE_LEN * self.types.len();
        let cbuffers_start = variables_start + VARIABLE_LEN_V51 * variable_count;
        let bindings_start = cbuffers_start + CBUFFER_LEN * self.cbuffers.len();
        let strings_start = bindings_start + BINDING_LEN_V51 * self.bindings.len();
        let mut strings = StringTable {
            base: strings_start,
            bytes: Vec::new(),
            offsets: Vec::new(),
        };

        let mut out = Vec::with_capacity(strings_start);
        let creator_ptr = strings.intern(&self.creator);
        for dword in [
            self.cbuffers.len() as u32,
            if self.cbuffers.is_empty() { 0 } else { cbuffers_start as u32 },
            self.bindings.len() as u32,
            if self.bindings.is_empty() { 0 } else { bindings_start as u32 },
            self.shader_model,
            // D3DCOMPILE_NO_PRESHADER | D3DCOMPILE_IEEE_STRICTNESS | D3DCOMPILE_ALL_RESOURCES_BOUND.
            (1 << 8) | (1 << 13) | (1 << 21),
            creator_ptr,
            RDEF_FOURCC_5_1,
            HEADER_LEN_V51 as u32,
            CBUFFER_LEN as u32,
            BINDING_LEN_V51 as u32,
            VARIABLE_LEN_V51 as u32,
            TYPE_LEN as u32,
            MEMBER_LEN as u32,
            0,
        ] {
            push_u32(&mut out, dword);
        }

        for ty in &self.types {
            push_u16(&mut out, ty.class as u16);
            push_u16(&mut out, ty.ty as u16);
            push_u16(&mut out, ty.rows);
            push_u16(&mut out, ty.columns);
            push_u16(&mut out, ty.elements);
            push_u16(&mut out, 0); // member count
            push_u32(&mut out, 0); // members
            for _ in 0..4 {
                push_u32(&mut out, 0);
            }
            let name_ptr = strings.intern(&ty.name);
            push_u32(&mut out, name_ptr);
        }

        for variable in self.cbuffers.iter().flat_map(|cb| &cb.variables) {
            let name_ptr = strings.intern(&variable.name);
            for dword in [
                name_ptr,
                variable.offset,
                variable.size,
                if variable.used { VARIABLE_FLAG_USED } else { 0 },
                (types_start + TYPE_LEN * variable.type_index) as u32,
                0, // default value
                u32::MAX,
                0,
                u32::MAX,
                0,
            ] {
                push_u32(&mut out, dword);
            }
        }

        let mut variable_offset = variables_start;
        for cbuffer in &self.cbuffers {
            let name_ptr = strings.intern(&cbuffer.name);
            for dword in [
                name_ptr,
                cbuffer.variables.len() as u32,
                variable_offset as u32,
                cbuffer.size,
                0, // D3D_CT_CBUFFER
                0,
            ] {
                push_u32(&mut out, dword);
            }
            variable_offset += VARIABLE_LEN_V51 * cbuffer.variables.len();
        }

        for binding in &self.bindings {
            let name_ptr = strings.intern(&binding.name);
            for dword in [
                name_ptr,
                binding.input_type as u32,
                binding.return_type as u32,
                binding.dimension as u32,
                binding.sample_count,
                binding.bind_point,
                binding.bind_count,
                binding.flags,
                binding.space,
                binding.id,
            ] {
                push_u32(&mut out, dword);
            }
        }

        debug_assert_eq!(out.len(), strings_start);
        out.extend_from_slice(&strings.bytes);
        out
    }
}

/// A parsed `RDEF` chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefChunk {
    /// Target word.
    pub target: u32,
    /// Generator string.
    pub creator: Option<String>,
    /// Constant buffers in file order.
    pub constant_buffers: Vec<RdefConstantBuffer>,
    /// Bindings in file order.
    pub bound_resources: Vec<RdefResourceBinding>,
}

/// A parsed constant buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefConstantBuffer {
    /// Name.
    pub name: String,
    /// Size in bytes.
    pub size: u32,
    /// Members.
    pub variables: Vec<RdefVariable>,
}

/// A parsed constant buffer member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefVariable {
    /// Name.
    pub name: String,
    /// Offset in bytes.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
    /// Raw flags.
    pub flags: u32,
    /// Type name, when the type record is present.
    pub type_name: Option<String>,
    /// Array element count from the type record.
    pub elements: u16,
}

/// A parsed resource binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdefResourceBinding {
    /// Name.
    pub name: String,
    /// Raw `D3D_SHADER_INPUT_TYPE`.
    pub input_type: u32,
    /// Raw return type.
    pub return_type: u32,
    /// Raw dimension.
    pub dimension: u32,
    /// First register.
    pub bind_point: u32,
    /// Register count (0 for unbounded).
    pub bind_count: u32,
    /// Raw flags.
    pub flags: u32,
    /// Register space (0 for the older layout).
    pub space: u32,
    /// Range identifier (equals `bind_point` for the older layout).
    pub id: u32,
}

/// Parses an `RDEF` chunk payload.
pub fn parse_rdef_chunk(bytes: &[u8]) -> Result<RdefChunk, DxbcError> {
    if bytes.len() < HEADER_LEN_V50 {
        return Err(DxbcError::invalid_chunk(format!(
            "RDEF chunk is truncated: need {HEADER_LEN_V50} bytes for header, got {}",
            bytes.len()
        )));
    }
    let cb_count = dword_at(bytes, 0, "cb_count")? as usize;
    let cb_offset = dword_at(bytes, 4, "cb_offset")? as usize;
    let bind_count = dword_at(bytes, 8, "resource_count")? as usize;
    let bind_offset = dword_at(bytes, 12, "resource_offset")? as usize;
    let target = dword_at(bytes, 16, "target")?;
    let creator_offset = dword_at(bytes, 24, "creator_offset")? as usize;

    let is_v51 = bytes.len() >= HEADER_LEN_V51
        && dword_at(bytes, 28, "rd11_fourcc")? == RDEF_FOURCC_5_1;
    let (binding_len, variable_len) = if is_v51 {
        (
            dword_at(bytes, 40, "binding_size")? as usize,
            dword_at(bytes, 44, "variable_size")? as usize,
        )
    } else {
        (BINDING_LEN_V50, VARIABLE_LEN_V50)
    };
    if binding_len < BINDING_LEN_V50 || variable_len < VARIABLE_LEN_V50 {
        return Err(DxbcError::invalid_chunk(format!(
            "RDEF record sizes {binding_len}/{variable_len} are too small"
        )));
    }

    let creator = if creator_offset == 0 {
        None
    } else {
        Some(cstr_at(bytes, creator_offset, "creator")?.to_owned())
    };

    let mut bound_resources = Vec::new();
    for i in 0..bind_count {
        let start = i
            .checked_mul(binding_len)
            .and_then(|o| o.checked_add(bind_offset))
            .ok_or_else(|| DxbcError::invalid_chunk(format!("binding {i} offset overflows")))?;
        let field = |offset: usize, what: &'static str| {
            dword_at(bytes, start + offset, what)
                .map_err(|e| DxbcError::invalid_chunk(format!("binding {i} {what}: {}", e.context())))
        };
        let name_offset = field(0, "name_offset")? as usize;
        let bind_point = field(20, "bind_point")?;
        bound_resources.push(RdefResourceBinding {
            name: cstr_at(bytes, name_offset, "binding name")?.to_owned(),
            input_type: field(4, "input_type")?,
            return_type: field(8, "return_type")?,
            dimension: field(12, "dimension")?,
            bind_point,
            bind_count: field(24, "bind_count")?,
            flags: field(28, "flags")?,
            space: if is_v51 { field(32, "space")? } else { 0 },
            id: if is_v51 { field(36, "id")? } else { bind_point },
        });
    }

    let mut constant_buffers = Vec::new();
    for i in 0..cb_count {
        let start = i
            .checked_mul(CBUFFER_LEN)
            .and_then(|o| o.checked_add(cb_offset))
            .ok_or_else(|| DxbcError::invalid_chunk(format!("cbuffer {i} offset overflows")))?;
        let name_offset = dword_at(bytes, start, "cbuffer name")? as usize;
        let var_count = dword_at(bytes, start + 4, "cbuffer variable count")? as usize;
        let var_offset = dword_at(bytes, start + 8, "cbuffer variable offset")? as usize;
        let size = dword_at(bytes, start + 12, "cbuffer size")?;

        let mut variables = Vec::new();
        for v in 0..var_count {
            let vstart = v
                .checked_mul(variable_len)
                .and_then(|o| o.checked_add(var_offset))
                .ok_or_else(|| DxbcError::invalid_chunk(format!("cbuffer {i} variable {v} offset overflows")))?;
            let var_name = dword_at(bytes, vstart, "variable name")? as usize;
            let type_offset = dword_at(bytes, vstart + 16, "variable type")? as usize;
            let (type_name, elements) = if type_offset == 0 {
                (None, 0)
            } else {
                let packed = dword_at(bytes, type_offset + 8, "type elements")?;
                let name_ptr = dword_at(bytes, type_offset + 32, "type name")? as usize;
                (
                    Some(cstr_at(bytes, name_ptr, "type name")?.to_owned()),
                    (packed & 0xFFFF) as u16,
                )
            };
            variables.push(RdefVariable {
                name: cstr_at(bytes, var_name, "variable name")?.to_owned(),
                offset: dword_at(bytes, vstart + 4, "variable offset")?,
                size: dword_at(bytes, vstart + 8, "variable size")?,
                flags: dword_at(bytes, vstart + 12, "variable flags")?,
                type_name,
                elements,
            });
        }
        constant_buffers.push(RdefConstantBuffer {
            name: cstr_at(bytes, name_offset, "cbuffer name")?.to_owned(),
            size,
            variables,
        });
    }

    Ok(RdefChunk {
        target,
        creator,
        constant_buffers,
        bound_resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn parse_older_layout_binding() {
        let mut chunk = Vec::new();
        push_u32(&mut chunk, 0); // cb count
        push_u32(&mut chunk, 0); // cb offset
        push_u32(&mut chunk, 1); // resource count
        push_u32(&mut chunk, 28); // resource offset
        push_u32(&mut chunk, 0); // target
        push_u32(&mut chunk, 0); // flags
        push_u32(&mut chunk, 0); // creator offset
        push_u32(&mut chunk, 60); // name offset
        for v in [2, 5, 4, u32::MAX, 3, 1, 12] {
            push_u32(&mut chunk, v);
        }
        chunk.extend_from_slice(b"tex0\0");

        let rdef = parse_rdef_chunk(&chunk).unwrap();
        assert_eq!(rdef.creator, None);
        assert_eq!(rdef.bound_resources.len(), 1);
        assert_eq!(rdef.bound_resources[0].name, "tex0");
        assert_eq!(rdef.bound_resources[0].bind_point, 3);
        assert_eq!(rdef.bound_resources[0].id, 3);
        assert_eq!(rdef.bound_resources[0].space, 0);
    }

    #[test]
    fn built_chunk_parses_back() {
        let mut builder = RdefBuilder::new(SHADER_MODEL_PS_5_1, "Xenos");
        let uint4 = builder.add_type(RdefTypeDesc::vector("uint4", VariableType::UInt, 4));
        let array = builder.types[uint4].array(8);
        let uint4x8 = builder.add_type(array);
        builder.cbuffers.push(RdefCbufferDesc {
            name: "xe_bool_loop_cbuffer".into(),
            size: 160,
            variables: vec![
                RdefVariableDesc {
                    name: "xe_bool_constants".into(),
                    offset: 0,
                    size: 32,
                    used: true,
                    type_index: uint4,
                },
                RdefVariableDesc {
                    name: "xe_loop_constants".into(),
                    offset: 32,
                    size: 128,
                    used: false,
                    type_index: uint4x8,
                },
            ],
        });
        builder.bindings.push(RdefBindingDesc {
            name: "xe_bool_loop_cbuffer".into(),
            input_type: InputType::Cbuffer,
            return_type: BindingReturnType::None,
            dimension: BindingDimension::Unknown,
            sample_count: 0,
            bind_point: 2,
            bind_count: 1,
            flags: 0,
            space: 0,
            id: 0,
        });

        let bytes = builder.build();
        assert_eq!(bytes.len() % 4, 0);
        let rdef = parse_rdef_chunk(&bytes).unwrap();
        assert_eq!(rdef.target, SHADER_MODEL_PS_5_1);
        assert_eq!(rdef.creator.as_deref(), Some("Xenos"));
        let cb = &rdef.constant_buffers[0];
        assert_eq!(cb.size, 160);
        assert_eq!(cb.variables[1].name, "xe_loop_constants");
        assert_eq!(cb.variables[1].type_name.as_deref(), Some("uint4"));
        assert_eq!(cb.variables[1].elements, 8);
        assert_eq!(cb.variables[0].flags, VARIABLE_FLAG_USED);
        assert_eq!(rdef.bound_resources[0].bind_point, 2);
        assert_eq!(rdef.bound_resources[0].name, cb.name);
    }
}
