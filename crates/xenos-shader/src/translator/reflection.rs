//! Declarations, reflection and signatures.
//!
//! Everything here is derived from what the body recorded while it was
//! emitted, so it runs after the last instruction. The `SHEX` chunk is the
//! version and length tokens, the declarations, then the body.

use xenos_dxbc::opcode::{
    version_token, CbAccessPattern, GlobalFlags, InterpolationMode, Name, ProgramType, ResourceDimension,
    ReturnType, SamplerMode, ShaderFeatures, UavFlags,
};
use xenos_dxbc::rdef::{
    BindingDimension, BindingReturnType, InputType, RdefBindingDesc, RdefCbufferDesc, RdefTypeDesc,
    RdefVariableDesc, VariableType, INPUT_FLAGS_TEXTURE_COMPONENTS_4, SHADER_MODEL_PS_5_1, SHADER_MODEL_VS_5_1,
};
use xenos_dxbc::signature::{ComponentType, SystemValue};
use xenos_dxbc::{write_container, write_signature_chunk, Assembler, Dest, FourCC, RdefBuilder, SignatureParameter, Src};

use super::vertex::IN_VERTEX_ID;
use super::{srv, uav, Translator};
use crate::modification::DepthStencilMode;
use crate::shader::CbufferRegister;
use crate::system_constants::{SystemConstantIndex, SystemConstants};
use crate::xenos::{self, TextureDimension, MAX_COLOR_RENDER_TARGETS};

const CREATOR: &str = concat!("xenos-shader ", env!("CARGO_PKG_VERSION"));

/// Bool constants in two vectors, then loop constants in eight.
const BOOL_LOOP_CONSTANT_VECTORS: u32 = 2 + 8;
/// Six dwords per texture fetch constant.
const FETCH_CONSTANT_VECTORS: u32 =
    xenos::TEXTURE_FETCH_CONSTANT_COUNT * xenos::TEXTURE_FETCH_CONSTANT_DWORDS / 4;

/// Semantic of the point sprite coordinates.
const SPRITE_TEXCOORD: &str = "XESPRITETEXCOORD";
/// Semantic of the host point size output.
const POINT_SIZE: &str = "XEPSIZE";

const BINDLESS_TEXTURE_RANGES: [(u32, ResourceDimension, BindingDimension, &str); 3] = [
    (
        srv::BINDLESS_2D_ARRAY,
        ResourceDimension::Texture2DArray,
        BindingDimension::Texture2DArray,
        "xe_textures_bindless_2d",
    ),
    (
        srv::BINDLESS_3D,
        ResourceDimension::Texture3D,
        BindingDimension::Texture3D,
        "xe_textures_bindless_3d",
    ),
    (
        srv::BINDLESS_CUBE,
        ResourceDimension::TextureCube,
        BindingDimension::TextureCube,
        "xe_textures_bindless_cube",
    ),
];

fn texture_dimensions(dimension: TextureDimension) -> (ResourceDimension, BindingDimension) {
    match dimension {
        TextureDimension::D1 | TextureDimension::D2 => {
            (ResourceDimension::Texture2DArray, BindingDimension::Texture2DArray)
        }
        TextureDimension::D3 => (ResourceDimension::Texture3D, BindingDimension::Texture3D),
        TextureDimension::Cube => (ResourceDimension::TextureCube, BindingDimension::TextureCube),
    }
}

fn type_name(ty: VariableType, columns: u16) -> String {
    let scalar = match ty {
        VariableType::Float => "float",
        VariableType::UInt => "uint",
        VariableType::Int => "int",
        VariableType::Void => "void",
    };
    if columns > 1 {
        format!("{scalar}{columns}")
    } else {
        scalar.to_owned()
    }
}

/// A used member holding `elements` 4-component vectors.
fn vector_array(rdef: &mut RdefBuilder, name: &str, ty: VariableType, offset: u32, elements: u32) -> RdefVariableDesc {
    let vector = RdefTypeDesc::vector(&type_name(ty, 4), ty, 4);
    RdefVariableDesc {
        name: name.to_owned(),
        offset,
        size: elements * 16,
        used: true,
        type_index: rdef.add_type(vector.array(elements as u16)),
    }
}

fn cbuffer_binding(register: CbufferRegister) -> RdefBindingDesc {
    RdefBindingDesc {
        name: register.name().to_owned(),
        input_type: InputType::Cbuffer,
        return_type: BindingReturnType::None,
        dimension: BindingDimension::Unknown,
        sample_count: 0,
        bind_point: register as u32,
        bind_count: 1,
        flags: 0,
        space: 0,
        id: register as u32,
    }
}

/// Interpolator registers as `(guest index, packed index)`.
fn interpolators(mask: u32) -> impl Iterator<Item = (u32, u32)> {
    (0..xenos::MAX_INTERPOLATORS)
        .filter(move |i| mask & (1 << *i) != 0)
        .enumerate()
        .map(|(packed, guest)| (guest, packed as u32))
}

impl Translator {
    pub(super) fn write_container(&mut self) -> Vec<u8> {
        let shex: Vec<u8> = self
            .write_program()
            .iter()
            .flat_map(|token| token.to_le_bytes())
            .collect();
        let rdef = self.write_rdef().build();
        let isgn = write_signature_chunk(&self.input_signature());
        let osgn = write_signature_chunk(&self.output_signature());
        let sfi0 = u64::from(self.shader_features().bits()).to_le_bytes();
        write_container(&[
            (FourCC::RDEF, rdef.as_slice()),
            (FourCC::ISGN, isgn.as_slice()),
            (FourCC::OSGN, osgn.as_slice()),
            (FourCC::SHEX, shex.as_slice()),
            (FourCC::SFI0, sfi0.as_slice()),
            (FourCC::STAT, self.stat.as_bytes()),
        ])
    }

    fn shader_features(&self) -> ShaderFeatures {
        let mut features = ShaderFeatures::empty();
        if self.is_rov() {
            features |= ShaderFeatures::ROVS;
        }
        if self.is_vertex_shader() && self.shared_memory_uav_used {
            features |= ShaderFeatures::UAVS_AT_EVERY_STAGE;
        }
        features
    }

    /// Depth and stencil can be tested by the host before the shader runs.
    fn is_early_depth_stencil_forced(&self) -> bool {
        self.is_pixel_shader()
            && !self.depth_only
            && !self.config.edram_rov_used
            && self.depth_stencil_mode() == DepthStencilMode::EarlyHint
            && !self.info.writes_depth
            && !self.info.kills_pixels
            && !self.kills
            && !self.info.uses_memexport()
    }

    fn cbuffer_size_vectors(&self, register: CbufferRegister) -> u32 {
        match register {
            CbufferRegister::SystemConstants => SystemConstants::SIZE / 16,
            CbufferRegister::FloatConstants => self.info.constant_register_map.float_count().max(1),
            CbufferRegister::BoolLoopConstants => BOOL_LOOP_CONSTANT_VECTORS,
            CbufferRegister::FetchConstants => FETCH_CONSTANT_VECTORS,
            CbufferRegister::DescriptorIndices => self.bindings.descriptor_count.div_ceil(4).max(1),
        }
    }

    fn cbuffers_declared(&self) -> impl Iterator<Item = CbufferRegister> + '_ {
        CbufferRegister::ALL
            .into_iter()
            .filter(|register| self.cbuffers_used & (1 << *register as u32) != 0)
    }

    // SHEX.

    fn write_program(&mut self) -> Vec<u32> {
        let program_type = if self.is_pixel_shader() {
            ProgramType::Pixel
        } else {
            ProgramType::Vertex
        };
        let mut tokens = vec![version_token(program_type, 5, 1), 0];
        self.write_declarations(&mut tokens);
        tokens.extend_from_slice(&self.code);
        tokens[1] = tokens.len() as u32;
        tokens
    }

    fn write_declarations(&mut self, out: &mut Vec<u32>) {
        let mut global_flags = GlobalFlags::empty();
        if self.is_early_depth_stencil_forced() {
            global_flags |= GlobalFlags::FORCE_EARLY_DEPTH_STENCIL;
        }
        if !global_flags.is_empty() {
            Assembler::new(out, &mut self.stat).op_dcl_global_flags(global_flags);
        }

        let cbuffers: Vec<(CbufferRegister, u32)> = self
            .cbuffers_declared()
            .map(|register| (register, self.cbuffer_size_vectors(register)))
            .collect();
        let float_access = if self.info.constant_register_map.float_dynamic_addressing {
            CbAccessPattern::DynamicIndexed
        } else {
            CbAccessPattern::ImmediateIndexed
        };
        for (register, size) in cbuffers {
            let id = register as u32;
            let access = if register == CbufferRegister::FloatConstants {
                float_access
            } else {
                CbAccessPattern::ImmediateIndexed
            };
            Assembler::new(out, &mut self.stat).op_dcl_constant_buffer(Src::cb_dcl(id, id, id), size, access, 0);
        }

        self.write_resource_declarations(out);
        self.write_input_declarations(out);
        self.write_output_declarations(out);

        let temps = self.temps.declared_count();
        let indexable = self.uses_register_dynamic_addressing().then(|| self.register_count());
        let mut a = Assembler::new(out, &mut self.stat);
        if temps != 0 {
            a.op_dcl_temps(temps);
        }
        if let Some(registers) = indexable {
            a.op_dcl_indexable_temp(0, registers, 4);
        }
    }

    fn write_resource_declarations(&mut self, out: &mut Vec<u32>) {
        let bindless = self.config.bindless_resources_used;
        let rov = self.is_rov();
        let mut a = Assembler::new(out, &mut self.stat);

        if bindless {
            if self.bindless_samplers_used {
                a.op_dcl_sampler(Src::s_dcl(0, 0, u32::MAX), SamplerMode::Default, 0);
            }
        } else {
            for sampler in &self.bindings.samplers {
                let slot = sampler.slot;
                a.op_dcl_sampler(Src::s_dcl(slot, slot, slot), SamplerMode::Default, 0);
            }
        }

        if self.shared_memory_srv_used {
            let id = srv::SHARED_MEMORY;
            a.op_dcl_resource_raw(Src::t_dcl(id, id, id), 0);
        }
        if bindless {
            for (range, dimension, _, _) in BINDLESS_TEXTURE_RANGES {
                if self.bindless_srvs_used & (1 << range) != 0 {
                    a.op_dcl_resource(
                        dimension,
                        ReturnType::Float.x4_token(),
                        Src::t_dcl(range, 0, u32::MAX),
                        range,
                    );
                }
            }
        } else {
            for texture in &self.bindings.textures {
                let register = srv::FIRST_TEXTURE + texture.slot;
                let (dimension, _) = texture_dimensions(texture.dimension);
                a.op_dcl_resource(
                    dimension,
                    ReturnType::Float.x4_token(),
                    Src::t_dcl(register, register, register),
                    0,
                );
            }
        }

        if self.shared_memory_uav_used {
            let id = uav::SHARED_MEMORY;
            a.op_dcl_uav_raw(UavFlags::empty(), Src::u_dcl(id, id, id), 0);
        }
        if rov {
            let id = uav::EDRAM;
            a.op_dcl_uav_typed(
                ResourceDimension::Buffer,
                UavFlags::RASTERIZER_ORDERED,
                ReturnType::UInt.x4_token(),
                Src::u_dcl(id, id, id),
                0,
            );
        }
    }

    fn write_input_declarations(&mut self, out: &mut Vec<u32>) {
        if self.is_vertex_shader() {
            if self.is_vertex_id_used() {
                Assembler::new(out, &mut self.stat).op_dcl_input_sgv(Dest::v(IN_VERTEX_ID, 0b0001), Name::VertexId);
            }
            return;
        }

        let pixel = self.modification.pixel();
        let centroid = pixel.centroid_interpolator_mask();
        let first = self.io.interpolators;
        let point_coordinates = self.io.point_coordinates;
        let (position, front_face) = (self.io.position, self.io.front_face);
        let mut a = Assembler::new(out, &mut self.stat);
        for (guest, packed) in interpolators(pixel.interpolator_mask()) {
            let mode = if centroid & (1 << guest) != 0 {
                InterpolationMode::LinearCentroid
            } else {
                InterpolationMode::Linear
            };
            a.op_dcl_input_ps(mode, Dest::v(first + packed, 0b1111));
        }
        if let Some(point_coordinates) = point_coordinates {
            a.op_dcl_input_ps(InterpolationMode::Linear, Dest::v(point_coordinates, 0b0011));
        }
        if self.in_position_used != 0 {
            a.op_dcl_input_ps_siv(
                InterpolationMode::LinearNoPerspective,
                Dest::v(position, self.in_position_used),
                Name::Position,
            );
        }
        if self.in_front_face_used {
            a.op_dcl_input_ps_sgv(Dest::v(front_face, 0b0001), Name::IsFrontFace);
        }
        if self.in_coverage_used {
            a.op_dcl_input(Dest::vcoverage());
        }
    }

    fn write_output_declarations(&mut self, out: &mut Vec<u32>) {
        if self.is_vertex_shader() {
            let interpolator_count = self.modification.vertex().interpolator_mask().count_ones();
            let clip_cull = self.clip_cull_registers();
            let io = self.io;
            let mut a = Assembler::new(out, &mut self.stat);
            for i in 0..interpolator_count {
                a.op_dcl_output(Dest::o(io.interpolators + i, 0b1111));
            }
            if let Some(point_coordinates) = io.point_coordinates {
                a.op_dcl_output(Dest::o(point_coordinates, 0b1111));
            }
            a.op_dcl_output_siv(Dest::o(io.position, 0b1111), Name::Position);
            for (register, mask, name) in clip_cull {
                a.op_dcl_output_siv(Dest::o(register, mask), name);
            }
            if let Some(point_size) = io.point_size {
                a.op_dcl_output(Dest::o(point_size, 0b0001));
            }
            return;
        }

        let colors = self.writes_host_render_targets();
        let mut a = Assembler::new(out, &mut self.stat);
        if colors {
            for host in 0..MAX_COLOR_RENDER_TARGETS {
                a.op_dcl_output(Dest::o(host, 0b1111));
            }
        }
        if self.out_coverage_used {
            a.op_dcl_output(Dest::omask());
        }
        if self.out_depth_used {
            a.op_dcl_output(Dest::odepth());
        }
    }

    fn writes_host_render_targets(&self) -> bool {
        self.is_pixel_shader()
            && !self.depth_only
            && !self.config.edram_rov_used
            && self.sys.colors.iter().any(Option::is_some)
    }

    /// Registers holding clip and cull distances with the components of
    /// each kind, clip distances first.
    fn clip_cull_registers(&self) -> Vec<(u32, u32, Name)> {
        let Some(first) = self.io.clip_cull else {
            return Vec::new();
        };
        let (clip, cull) = self.clip_cull_distance_counts();
        let mut registers = Vec::new();
        for register in 0..(clip + cull).div_ceil(4) {
            let components = register * 4..register * 4 + 4;
            let mask_of = |range: std::ops::Range<u32>| {
                components
                    .clone()
                    .filter(|c| range.contains(c))
                    .fold(0, |mask, c| mask | 1 << (c & 3))
            };
            let clip_mask = mask_of(0..clip);
            let cull_mask = mask_of(clip..clip + cull);
            if clip_mask != 0 {
                registers.push((first + register, clip_mask, Name::ClipDistance));
            }
            if cull_mask != 0 {
                registers.push((first + register, cull_mask, Name::CullDistance));
            }
        }
        registers
    }

    // ISGN and OSGN.

    fn input_signature(&self) -> Vec<SignatureParameter> {
        let mut parameters = Vec::new();
        if self.is_vertex_shader() {
            if self.is_vertex_id_used() {
                parameters.push(
                    SignatureParameter::new("SV_VertexID", 0, ComponentType::UInt32, IN_VERTEX_ID, 0b0001)
                        .system_value(SystemValue::VertexId)
                        .rw_mask(0b0001),
                );
            }
            return parameters;
        }

        let pixel = self.modification.pixel();
        for (_, packed) in interpolators(pixel.interpolator_mask()) {
            parameters.push(
                SignatureParameter::new("TEXCOORD", packed, ComponentType::Float32, self.io.interpolators + packed, 0b1111)
                    .rw_mask(0b1111),
            );
        }
        if let Some(point_coordinates) = self.io.point_coordinates {
            parameters.push(
                SignatureParameter::new(SPRITE_TEXCOORD, 0, ComponentType::Float32, point_coordinates, 0b1111)
                    .rw_mask(0b0011),
            );
        }
        parameters.push(
            SignatureParameter::new("SV_Position", 0, ComponentType::Float32, self.io.position, 0b1111)
                .system_value(SystemValue::Position)
                .rw_mask(self.in_position_used as u8),
        );
        if self.in_front_face_used {
            parameters.push(
                SignatureParameter::new("SV_IsFrontFace", 0, ComponentType::UInt32, self.io.front_face, 0b0001)
                    .system_value(SystemValue::IsFrontFace)
                    .rw_mask(0b0001),
            );
        }
        parameters
    }

    fn output_signature(&self) -> Vec<SignatureParameter> {
        let mut parameters = Vec::new();
        if self.is_vertex_shader() {
            let count = self.modification.vertex().interpolator_mask().count_ones();
            for i in 0..count {
                parameters.push(SignatureParameter::new(
                    "TEXCOORD",
                    i,
                    ComponentType::Float32,
                    self.io.interpolators + i,
                    0b1111,
                ));
            }
            if let Some(point_coordinates) = self.io.point_coordinates {
                parameters.push(SignatureParameter::new(
                    SPRITE_TEXCOORD,
                    0,
                    ComponentType::Float32,
                    point_coordinates,
                    0b1111,
                ));
            }
            parameters.push(
                SignatureParameter::new("SV_Position", 0, ComponentType::Float32, self.io.position, 0b1111)
                    .system_value(SystemValue::Position),
            );
            let (mut clip_index, mut cull_index) = (0, 0);
            for (register, mask, name) in self.clip_cull_registers() {
                let (semantic, system_value, index) = match name {
                    Name::ClipDistance => ("SV_ClipDistance", SystemValue::ClipDistance, &mut clip_index),
                    _ => ("SV_CullDistance", SystemValue::CullDistance, &mut cull_index),
                };
                parameters.push(
                    SignatureParameter::new(semantic, *index, ComponentType::Float32, register, mask as u8)
                        .system_value(system_value),
                );
                *index += 1;
            }
            if let Some(point_size) = self.io.point_size {
                parameters.push(SignatureParameter::new(
                    POINT_SIZE,
                    0,
                    ComponentType::Float32,
                    point_size,
                    0b0001,
                ));
            }
            return parameters;
        }

        if self.writes_host_render_targets() {
            for host in 0..MAX_COLOR_RENDER_TARGETS {
                parameters.push(
                    SignatureParameter::new("SV_Target", host, ComponentType::Float32, host, 0b1111)
                        .system_value(SystemValue::Target),
                );
            }
        }
        if self.out_coverage_used {
            parameters.push(
                SignatureParameter::new("SV_Coverage", 0, ComponentType::UInt32, u32::MAX, 0b0001)
                    .system_value(SystemValue::Coverage)
                    .rw_mask(0b1110),
            );
        }
        if self.out_depth_used {
            parameters.push(
                SignatureParameter::new("SV_Depth", 0, ComponentType::Float32, u32::MAX, 0b0001)
                    .system_value(SystemValue::Depth)
                    .rw_mask(0b1110),
            );
        }
        parameters
    }

    // RDEF.

    fn write_rdef(&self) -> RdefBuilder {
        let shader_model = if self.is_pixel_shader() {
            SHADER_MODEL_PS_5_1
        } else {
            SHADER_MODEL_VS_5_1
        };
        let mut rdef = RdefBuilder::new(shader_model, CREATOR);
        for register in self.cbuffers_declared() {
            let cbuffer = self.rdef_cbuffer(&mut rdef, register);
            rdef.cbuffers.push(cbuffer);
        }

        // Samplers, SRVs, UAVs, then constant buffers.
        let bindless = self.config.bindless_resources_used;
        if bindless {
            if self.bindless_samplers_used {
                rdef.bindings.push(RdefBindingDesc {
                    name: "xe_samplers_bindless".to_owned(),
                    input_type: InputType::Sampler,
                    return_type: BindingReturnType::None,
                    dimension: BindingDimension::Unknown,
                    sample_count: 0,
                    bind_point: 0,
                    bind_count: 0,
                    flags: 0,
                    space: 0,
                    id: 0,
                });
            }
        } else {
            for sampler in &self.bindings.samplers {
                rdef.bindings.push(RdefBindingDesc {
                    name: sampler.name.clone(),
                    input_type: InputType::Sampler,
                    return_type: BindingReturnType::None,
                    dimension: BindingDimension::Unknown,
                    sample_count: 0,
                    bind_point: sampler.slot,
                    bind_count: 1,
                    flags: 0,
                    space: 0,
                    id: sampler.slot,
                });
            }
        }

        if self.shared_memory_srv_used {
            rdef.bindings.push(RdefBindingDesc {
                name: "xe_shared_memory_srv".to_owned(),
                input_type: InputType::ByteAddress,
                return_type: BindingReturnType::Mixed,
                dimension: BindingDimension::Buffer,
                sample_count: 0,
                bind_point: srv::SHARED_MEMORY,
                bind_count: 1,
                flags: 0,
                space: 0,
                id: srv::SHARED_MEMORY,
            });
        }
        if bindless {
            for (range, _, dimension, name) in BINDLESS_TEXTURE_RANGES {
                if self.bindless_srvs_used & (1 << range) == 0 {
                    continue;
                }
                rdef.bindings.push(RdefBindingDesc {
                    name: name.to_owned(),
                    input_type: InputType::Texture,
                    return_type: BindingReturnType::Float,
                    dimension,
                    sample_count: u32::MAX,
                    bind_point: 0,
                    bind_count: 0,
                    flags: INPUT_FLAGS_TEXTURE_COMPONENTS_4,
                    space: range,
                    id: range,
                });
            }
        } else {
            for texture in &self.bindings.textures {
                let register = srv::FIRST_TEXTURE + texture.slot;
                rdef.bindings.push(RdefBindingDesc {
                    name: texture.name.clone(),
                    input_type: InputType::Texture,
                    return_type: BindingReturnType::Float,
                    dimension: texture_dimensions(texture.dimension).1,
                    sample_count: u32::MAX,
                    bind_point: register,
                    bind_count: 1,
                    flags: INPUT_FLAGS_TEXTURE_COMPONENTS_4,
                    space: 0,
                    id: register,
                });
            }
        }

        if self.shared_memory_uav_used {
            rdef.bindings.push(RdefBindingDesc {
                name: "xe_shared_memory_uav".to_owned(),
                input_type: InputType::UavRwByteAddress,
                return_type: BindingReturnType::Mixed,
                dimension: BindingDimension::Buffer,
                sample_count: 0,
                bind_point: uav::SHARED_MEMORY,
                bind_count: 1,
                flags: 0,
                space: 0,
                id: uav::SHARED_MEMORY,
            });
        }
        if self.is_rov() {
            rdef.bindings.push(RdefBindingDesc {
                name: "xe_edram".to_owned(),
                input_type: InputType::UavRwTyped,
                return_type: BindingReturnType::UInt,
                dimension: BindingDimension::Buffer,
                sample_count: 0,
                bind_point: uav::EDRAM,
                bind_count: 1,
                flags: 0,
                space: 0,
                id: uav::EDRAM,
            });
        }

        for register in self.cbuffers_declared() {
            rdef.bindings.push(cbuffer_binding(register));
        }
        rdef
    }

    fn rdef_cbuffer(&self, rdef: &mut RdefBuilder, register: CbufferRegister) -> RdefCbufferDesc {
        let variables = match register {
            CbufferRegister::SystemConstants => {
                let mut variables = Vec::with_capacity(SystemConstantIndex::ALL.len());
                for &index in SystemConstantIndex::ALL {
                    let info = index.info();
                    let mut ty = RdefTypeDesc::vector(&type_name(info.ty, info.columns), info.ty, info.columns);
                    if info.elements != 0 {
                        ty = ty.array(info.elements);
                    }
                    variables.push(RdefVariableDesc {
                        name: info.name.to_owned(),
                        offset: info.offset,
                        size: info.size,
                        used: self.used_system_constants.contains(index),
                        type_index: rdef.add_type(ty),
                    });
                }
                variables
            }
            CbufferRegister::FloatConstants => {
                let count = self.cbuffer_size_vectors(register);
                vec![vector_array(rdef, "xe_float_constants", VariableType::Float, 0, count)]
            }
            CbufferRegister::BoolLoopConstants => vec![
                vector_array(rdef, "xe_bool_constants", VariableType::UInt, 0, 2),
                vector_array(rdef, "xe_loop_constants", VariableType::UInt, 32, BOOL_LOOP_CONSTANT_VECTORS - 2),
            ],
            CbufferRegister::FetchConstants => {
                vec![vector_array(rdef, "xe_fetch_constants", VariableType::UInt, 0, FETCH_CONSTANT_VECTORS)]
            }
            CbufferRegister::DescriptorIndices => {
                let count = self.cbuffer_size_vectors(register);
                vec![vector_array(rdef, "xe_descriptor_indices", VariableType::UInt, 0, count)]
            }
        };
        RdefCbufferDesc {
            name: register.name().to_owned(),
            size: self.cbuffer_size_vectors(register) * 16,
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xenos_dxbc::rdef::VARIABLE_FLAG_USED;
    use xenos_dxbc::test_utils::decode_container_program;
    use xenos_dxbc::{DxbcFile, Opcode, SignatureChunk};

    use super::*;
    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{ShaderInfo, ShaderStage, Translation};
    use crate::ucode::{
        ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction, Predication, ResultStorage,
        TextureFetchAttributes, TextureFetchInstruction, TextureFetchOpcode,
    };

    fn exec_end() -> Vec<ParsedInstruction> {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        vec![ParsedInstruction::Exec(exec), ParsedInstruction::ExecEnd(exec)]
    }

    fn translate(config: TranslatorConfig, info: &ShaderInfo, modification: Modification, body: Vec<ParsedInstruction>) -> Translation {
        let mut instructions = exec_end();
        instructions.splice(1..1, body);
        let mut translator = Translator::new(config).unwrap();
        translator.translate(&instructions, info, modification).unwrap()
    }

    fn signature(translation: &Translation, fourcc: FourCC) -> SignatureChunk {
        let file = DxbcFile::parse(&translation.dxbc).unwrap();
        file.get_signature(fourcc).unwrap().unwrap()
    }

    fn semantics(chunk: &SignatureChunk) -> Vec<(String, u32, u32)> {
        chunk
            .entries
            .iter()
            .map(|entry| (entry.semantic_name.clone(), entry.semantic_index, entry.register))
            .collect()
    }

    fn tfetch_2d() -> ParsedInstruction {
        ParsedInstruction::TextureFetch(TextureFetchInstruction {
            opcode: TextureFetchOpcode::TextureFetch,
            dimension: TextureDimension::D2,
            predication: Predication::NONE,
            result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
            operand: Some(InstructionOperand::register(0)),
            fetch_constant: 3,
            attributes: TextureFetchAttributes::default(),
        })
    }

    #[test]
    fn container_has_every_chunk() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let translation = translate(TranslatorConfig::default(), &info, Modification::default_vertex(), vec![]);
        let file = DxbcFile::parse(&translation.dxbc).unwrap();
        let chunks: Vec<FourCC> = file.chunks().map(|chunk| chunk.fourcc).collect();
        assert_eq!(
            chunks,
            vec![FourCC::RDEF, FourCC::ISGN, FourCC::OSGN, FourCC::SHEX, FourCC::SFI0, FourCC::STAT]
        );
        let rdef = file.get_rdef().unwrap().unwrap();
        assert_eq!(rdef.target, SHADER_MODEL_VS_5_1);
        assert_eq!(rdef.creator.as_deref(), Some(CREATOR));
    }

    #[test]
    fn vertex_signatures() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let modification = Modification::from(
            Modification::default_vertex()
                .vertex()
                .with_interpolator_mask(0b101)
                .with_user_clip_plane_count(5)
                .with_output_point_size(1),
        );
        let translation = translate(TranslatorConfig::default(), &info, modification, vec![]);
        assert_eq!(
            semantics(&signature(&translation, FourCC::ISGN)),
            vec![("SV_VertexID".to_owned(), 0, 0)]
        );
        let outputs = signature(&translation, FourCC::OSGN);
        assert_eq!(
            semantics(&outputs),
            vec![
                ("TEXCOORD".to_owned(), 0, 0),
                ("TEXCOORD".to_owned(), 1, 1),
                ("SV_Position".to_owned(), 0, 2),
                ("SV_ClipDistance".to_owned(), 0, 3),
                ("SV_ClipDistance".to_owned(), 1, 4),
                ("XEPSIZE".to_owned(), 0, 5),
            ]
        );
        assert_eq!(outputs.entries[3].mask, 0b1111);
        assert_eq!(outputs.entries[4].mask, 0b0001);
    }

    #[test]
    fn clip_and_cull_distances_share_registers() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let modification = Modification::from(
            Modification::default_vertex()
                .vertex()
                .with_interpolator_mask(0)
                .with_user_clip_plane_count(2)
                .with_vertex_kill_and(1),
        );
        let translation = translate(TranslatorConfig::default(), &info, modification, vec![]);
        let outputs = signature(&translation, FourCC::OSGN);
        let distances: Vec<_> = outputs
            .entries
            .iter()
            .filter(|entry| entry.semantic_name.ends_with("Distance"))
            .map(|entry| (entry.semantic_name.as_str(), entry.register, entry.mask))
            .collect();
        assert_eq!(
            distances,
            vec![("SV_ClipDistance", 1, 0b0011), ("SV_CullDistance", 1, 0b0100)]
        );
    }

    #[test]
    fn pixel_color_outputs_cover_every_host_target() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.writes_color_targets = 0b1;
        let translation = translate(TranslatorConfig::default(), &info, Modification::default_pixel(), vec![]);
        let outputs = semantics(&signature(&translation, FourCC::OSGN));
        assert_eq!(
            outputs,
            vec![
                ("SV_Target".to_owned(), 0, 0),
                ("SV_Target".to_owned(), 1, 1),
                ("SV_Target".to_owned(), 2, 2),
                ("SV_Target".to_owned(), 3, 3),
                ("SV_Coverage".to_owned(), 0, u32::MAX),
            ]
        );
        let program = decode_container_program(&translation.dxbc);
        assert_eq!(program.count(Opcode::DclOutput), 5);
    }

    #[test]
    fn centroid_interpolators_are_declared_so() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 2;
        let modification = Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_interpolator_mask(0b11)
                .with_centroid_interpolator_mask(0b10),
        );
        let translation = translate(TranslatorConfig::default(), &info, modification, vec![]);
        let program = decode_container_program(&translation.dxbc);
        let modes: Vec<u32> = program
            .with_opcode(Opcode::DclInputPs)
            .map(|dcl| (dcl.token >> 11) & 0xF)
            .collect();
        assert_eq!(
            modes,
            vec![InterpolationMode::Linear as u32, InterpolationMode::LinearCentroid as u32]
        );
        let inputs = semantics(&signature(&translation, FourCC::ISGN));
        assert_eq!(inputs[0], ("TEXCOORD".to_owned(), 0, 0));
        assert_eq!(inputs[2], ("SV_Position".to_owned(), 0, 2));
    }

    #[test]
    fn early_depth_is_forced_only_when_safe() {
        let info = ShaderInfo::new(ShaderStage::Pixel);
        let early = Modification::from(Modification::default_pixel().pixel().with_depth_stencil_mode_raw(1));
        let has_flag = |translation: &Translation| {
            decode_container_program(&translation.dxbc)
                .with_opcode(Opcode::DclGlobalFlags)
                .any(|dcl| dcl.token & GlobalFlags::FORCE_EARLY_DEPTH_STENCIL.bits() != 0)
        };
        assert!(has_flag(&translate(TranslatorConfig::default(), &info, early, vec![])));

        let mut writes_depth = info.clone();
        writes_depth.writes_depth = true;
        assert!(!has_flag(&translate(TranslatorConfig::default(), &writes_depth, early, vec![])));

        let rov = TranslatorConfig {
            edram_rov_used: true,
            ..Default::default()
        };
        assert!(!has_flag(&translate(rov, &info, early, vec![])));
    }

    #[test]
    fn rov_declares_the_edram_uav() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.writes_color_targets = 0b1;
        let config = TranslatorConfig {
            edram_rov_used: true,
            ..Default::default()
        };
        let translation = translate(config, &info, Modification::default_pixel(), vec![]);
        let file = DxbcFile::parse(&translation.dxbc).unwrap();
        let sfi0 = file.get_chunk(FourCC::SFI0).unwrap().data;
        assert_eq!(sfi0.len(), 8);
        let features = u32::from_le_bytes(sfi0[..4].try_into().unwrap());
        assert_eq!(features, ShaderFeatures::ROVS.bits());
        let rdef = file.get_rdef().unwrap().unwrap();
        let edram = rdef.bound_resources.iter().find(|b| b.name == "xe_edram").unwrap();
        assert_eq!((edram.bind_point, edram.id), (uav::EDRAM, uav::EDRAM));
        let program = decode_container_program(&translation.dxbc);
        let typed = program.with_opcode(Opcode::DclUavTyped).next().unwrap();
        assert_ne!(typed.token & UavFlags::RASTERIZER_ORDERED.bits(), 0);
        // Colors go to the EDRAM, not render targets.
        assert!(signature(&translation, FourCC::OSGN).entries.is_empty());
    }

    #[test]
    fn bindful_textures_follow_shared_memory() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        let translation = translate(TranslatorConfig::default(), &info, Modification::default_pixel(), vec![tfetch_2d()]);
        let rdef = DxbcFile::parse(&translation.dxbc).unwrap().get_rdef().unwrap().unwrap();
        let bindings: Vec<(String, u32, u32)> = rdef
            .bound_resources
            .iter()
            .map(|b| (b.name.clone(), b.input_type, b.bind_point))
            .collect();
        assert_eq!(
            bindings[..3],
            [
                (translation.sampler_bindings[0].name.clone(), InputType::Sampler as u32, 0),
                (translation.texture_bindings[0].name.clone(), InputType::Texture as u32, 1),
                (translation.texture_bindings[1].name.clone(), InputType::Texture as u32, 2),
            ]
        );
        let program = decode_container_program(&translation.dxbc);
        assert_eq!(program.count(Opcode::DclResource), 2);
        assert_eq!(program.count(Opcode::DclSampler), 1);
    }

    #[test]
    fn bindless_textures_are_unbounded_ranges() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        let config = TranslatorConfig {
            bindless_resources_used: true,
            ..Default::default()
        };
        let translation = translate(config, &info, Modification::default_pixel(), vec![tfetch_2d()]);
        let rdef = DxbcFile::parse(&translation.dxbc).unwrap().get_rdef().unwrap().unwrap();
        let textures = rdef
            .bound_resources
            .iter()
            .find(|b| b.name == "xe_textures_bindless_2d")
            .unwrap();
        assert_eq!((textures.bind_count, textures.space, textures.id), (0, srv::BINDLESS_2D_ARRAY, srv::BINDLESS_2D_ARRAY));
        assert!(rdef.bound_resources.iter().any(|b| b.name == "xe_samplers_bindless"));
        assert!(rdef
            .constant_buffers
            .iter()
            .any(|cb| cb.name == CbufferRegister::DescriptorIndices.name()));
    }

    #[test]
    fn unused_system_constants_are_not_flagged() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let translation = translate(TranslatorConfig::default(), &info, Modification::default_vertex(), vec![]);
        let rdef = DxbcFile::parse(&translation.dxbc).unwrap().get_rdef().unwrap().unwrap();
        let system = &rdef.constant_buffers[0];
        assert_eq!(system.name, "xe_system_cbuffer");
        assert_eq!(system.size, SystemConstants::SIZE);
        assert_eq!(system.variables.len(), SystemConstantIndex::ALL.len());
        let flags = |name: &str| system.variables.iter().find(|v| v.name == name).unwrap().flags;
        assert_ne!(flags("xe_vertex_index_endian") & VARIABLE_FLAG_USED, 0);
        assert_eq!(flags("xe_edram_blend_constant") & VARIABLE_FLAG_USED, 0);
        assert_eq!(
            system.variables.iter().find(|v| v.name == "xe_user_clip_planes").unwrap().elements,
            6
        );
    }

    #[test]
    fn declared_temps_cover_the_high_water_mark() {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 3;
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator
            .translate(&exec_end(), &info, Modification::default_vertex())
            .unwrap();
        let program = decode_container_program(&translation.dxbc);
        let dcl = program.with_opcode(Opcode::DclTemps).next().unwrap();
        assert_eq!(dcl.trailing, vec![translator.temps.declared_count()]);
        assert_eq!(translator.temps.declared_count(), 3 + translator.temps.high_water());
        assert!(translation.is_valid);
    }
}
