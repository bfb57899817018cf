//! The translator proper.
//!
//! A translation is one pass over the parsed instructions. Guest control flow
//! is emulated by an outer `loop` around a dispatch on the control-flow
//! address held in `ps_pc_p0_a0.y` (see [`control_flow`]), and every ALU or
//! fetch instruction is lowered in place into `code`. Declarations, the
//! reflection blob and the signatures are produced at the end from what the
//! body recorded (see [`reflection`]).

/// An [`xenos_dxbc::Assembler`] appending to the shader body.
///
/// Only fields are borrowed, so operands may read other fields of the
/// translator, but not call its methods.
macro_rules! asm {
    ($t:expr) => {
        xenos_dxbc::Assembler::new(&mut $t.code, &mut $t.stat)
    };
}

mod alu;
mod codec_emit;
mod control_flow;
mod memexport;
mod om;
mod pixel;
mod reflection;
mod rov;
mod texture_fetch;
mod vertex;
mod vertex_fetch;

use tracing::{debug, warn};
use xenos_dxbc::opcode::CustomDataClass;
use xenos_dxbc::{Dest, Index, Src, Statistics};

use crate::bindings::BindingTables;
use crate::config::TranslatorConfig;
use crate::error::{Diagnostic, DiagnosticKind, TranslateError};
use crate::modification::{DepthStencilMode, HostVertexShaderType, Modification};
use crate::regalloc::TempStack;
use crate::shader::{CbufferRegister, ShaderInfo, ShaderStage, Translation};
use crate::system_constants::{SystemConstantIndex, UsedSystemConstants};
use crate::ucode::{
    AddressingMode, InstructionOperand, InstructionResult, OperandStorage, ParsedInstruction,
    ResultStorage, SwizzleSource,
};
use crate::xenos::{self, MAX_COLOR_RENDER_TARGETS, MAX_INTERPOLATORS, MAX_MEMEXPORT_ALLOCS};

use self::control_flow::ControlFlowState;

const MEMEXPORT_ALLOCS: usize = MAX_MEMEXPORT_ALLOCS as usize;
const MEMEXPORT_DATA: usize = xenos::MEMEXPORT_DATA_REGISTERS as usize;

/// Shader resource view range IDs.
pub(crate) mod srv {
    /// Shared memory as a `ByteAddressBuffer`, `t0`.
    pub const SHARED_MEMORY: u32 = 0;
    /// First bindful texture, `t1` onwards.
    pub const FIRST_TEXTURE: u32 = 1;
    /// Bindless heap ranges, one space per view dimension.
    pub const BINDLESS_2D_ARRAY: u32 = 1;
    pub const BINDLESS_3D: u32 = 2;
    pub const BINDLESS_CUBE: u32 = 3;
}

/// Unordered access view range IDs.
pub(crate) mod uav {
    /// Shared memory as a `RWByteAddressBuffer`, `u0`.
    pub const SHARED_MEMORY: u32 = 0;
    /// The EDRAM buffer, `u1`, rasterizer ordered.
    pub const EDRAM: u32 = 1;
}

/// Input and output register numbers of the stage interface.
#[derive(Debug, Clone, Copy, Default)]
struct IoRegisters {
    /// First interpolator output (vertex) or input (pixel).
    interpolators: u32,
    /// Point sprite coordinates.
    point_coordinates: Option<u32>,
    /// `SV_Position`.
    position: u32,
    /// Vertex: clip or cull distances, one register per 4 planes.
    clip_cull: Option<u32>,
    /// Vertex: the point size output.
    point_size: Option<u32>,
    /// Pixel: `SV_IsFrontFace`.
    front_face: u32,
}

/// Temps that stay allocated for the whole shader.
#[derive(Debug, Clone, Default)]
struct SystemTemps {
    /// Vector ALU result, `pv`.
    result: u32,
    /// `ps` in x, the control-flow address in y, `p0` in z and `a0` in w.
    ps_pc_p0_a0: u32,
    /// `aL` stack, innermost in x.
    loop_address: u32,
    /// Loop counter stack, innermost in x.
    loop_count: u32,
    /// Horizontal gradients in xyz, register LOD in w.
    grad_h_lod: u32,
    /// Vertical gradients in xyz, vertex fetch address in w.
    grad_v_vfetch_address: u32,
    position: u32,
    point_size_edge_flag_kill_vertex: u32,
    /// ROV: sample coverage in x, EDRAM addresses in y and z, deferred
    /// depth/stencil writes in w.
    rov_params: u32,
    depth_stencil: Option<u32>,
    colors: [Option<u32>; MAX_COLOR_RENDER_TARGETS as usize],
    memexport_written: Option<u32>,
    memexport_address: [Option<u32>; MEMEXPORT_ALLOCS],
    memexport_data: [[Option<u32>; MEMEXPORT_DATA]; MEMEXPORT_ALLOCS],
}

/// A loaded source operand and the temps pushed to hold it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadedOperand {
    pub(crate) src: Src,
    temps: u32,
}

impl LoadedOperand {
    fn immediate(src: Src) -> Self {
        Self { src, temps: 0 }
    }
}

/// Translates Xenos shaders to DXBC.
///
/// One instance is reused for any number of translations; every translation
/// starts from a clean state.
pub struct Translator {
    config: TranslatorConfig,

    info: ShaderInfo,
    modification: Modification,
    depth_only: bool,

    code: Vec<u32>,
    stat: Statistics,
    temps: TempStack,
    bindings: BindingTables,
    used_system_constants: UsedSystemConstants,
    /// Bit per [`CbufferRegister`].
    cbuffers_used: u32,
    diagnostics: Vec<Diagnostic>,
    is_valid: bool,
    instruction_index: Option<usize>,
    /// Disassembly of the current instruction, waiting to be emitted.
    disassembly: Option<String>,

    io: IoRegisters,
    in_position_used: u32,
    in_front_face_used: bool,
    in_coverage_used: bool,
    out_depth_used: bool,
    out_coverage_used: bool,
    sys: SystemTemps,
    cf: ControlFlowState,
    memexport_alloc_count: u32,
    shared_memory_srv_used: bool,
    shared_memory_uav_used: bool,
    /// Bit per bindless SRV range.
    bindless_srvs_used: u32,
    bindless_samplers_used: bool,
    /// Discard or return on kill was emitted.
    kills: bool,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Result<Self, TranslateError> {
        config.validate()?;
        Ok(Self {
            config,
            info: ShaderInfo::new(ShaderStage::Vertex),
            modification: Modification::default(),
            depth_only: false,
            code: Vec::new(),
            stat: Statistics::default(),
            temps: TempStack::default(),
            bindings: BindingTables::default(),
            used_system_constants: UsedSystemConstants::default(),
            cbuffers_used: 0,
            diagnostics: Vec::new(),
            is_valid: true,
            instruction_index: None,
            disassembly: None,
            io: IoRegisters::default(),
            in_position_used: 0,
            in_front_face_used: false,
            in_coverage_used: false,
            out_depth_used: false,
            out_coverage_used: false,
            sys: SystemTemps::default(),
            cf: ControlFlowState::default(),
            memexport_alloc_count: 0,
            shared_memory_srv_used: false,
            shared_memory_uav_used: false,
            bindless_srvs_used: 0,
            bindless_samplers_used: false,
            kills: false,
        })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translates one shader.
    ///
    /// Errors are only returned for inconsistent `info` or `modification`,
    /// before anything is emitted. Problems in the instructions themselves are
    /// reported through [`Translation::diagnostics`].
    pub fn translate(
        &mut self,
        instructions: &[ParsedInstruction],
        info: &ShaderInfo,
        modification: Modification,
    ) -> Result<Translation, TranslateError> {
        info.validate()?;
        if info.is_vertex_shader() && modification.vertex().host_vertex_shader_type().is_none() {
            return Err(TranslateError::InvalidShaderInfo(format!(
                "unknown host vertex shader type {}",
                modification.vertex().host_vertex_shader_type_raw()
            )));
        }

        self.reset(info.clone(), modification, false);
        self.start_translation();
        for (index, instruction) in instructions.iter().enumerate() {
            self.instruction_index = Some(index);
            self.translate_instruction(instruction);
        }
        self.instruction_index = None;
        self.complete_shader_code();
        let translation = self.complete_translation();
        debug!(
            stage = ?translation.stage,
            instructions = instructions.len(),
            temps = self.temps.declared_count(),
            textures = translation.texture_bindings.len(),
            samplers = translation.sampler_bindings.len(),
            bytes = translation.dxbc.len(),
            valid = translation.is_valid,
            "translated shader"
        );
        Ok(translation)
    }

    /// A pixel shader with no guest code, for depth-only passes.
    ///
    /// With the EDRAM ROV it still performs the depth and stencil test and
    /// writes the result to the EDRAM.
    pub fn create_depth_only_pixel_shader(&mut self) -> Translation {
        self.reset(ShaderInfo::new(ShaderStage::Pixel), Modification(0), true);
        self.start_translation();
        self.complete_shader_code();
        let translation = self.complete_translation();
        debug!(rov = self.config.edram_rov_used, bytes = translation.dxbc.len(), "created depth-only pixel shader");
        translation
    }

    fn reset(&mut self, info: ShaderInfo, modification: Modification, depth_only: bool) {
        self.info = info;
        self.modification = modification;
        self.depth_only = depth_only;
        self.code.clear();
        self.stat = Statistics::default();
        let base = if depth_only || self.uses_register_dynamic_addressing() {
            0
        } else {
            self.info.register_count
        };
        self.temps.reset(base);
        self.bindings.clear();
        self.used_system_constants = UsedSystemConstants::default();
        // The system constants are bound even when unused.
        self.cbuffers_used = 1 << CbufferRegister::SystemConstants as u32;
        self.diagnostics.clear();
        self.is_valid = true;
        self.instruction_index = None;
        self.disassembly = None;
        self.in_position_used = 0;
        self.in_front_face_used = false;
        self.in_coverage_used = false;
        self.out_depth_used = false;
        self.out_coverage_used = false;
        self.sys = SystemTemps::default();
        self.cf = ControlFlowState::default();
        self.memexport_alloc_count = 0;
        self.shared_memory_srv_used = false;
        self.shared_memory_uav_used = false;
        self.bindless_srvs_used = 0;
        self.bindless_samplers_used = false;
        self.kills = false;
        self.io = self.assign_io_registers();
    }

    fn assign_io_registers(&self) -> IoRegisters {
        let mut io = IoRegisters::default();
        let mut next = 0;
        match self.info.stage {
            ShaderStage::Vertex => {
                let vertex = self.modification.vertex();
                io.interpolators = next;
                next += vertex.interpolator_mask().count_ones();
                if self.is_point_list_expansion() {
                    io.point_coordinates = Some(next);
                    next += 1;
                }
                io.position = next;
                next += 1;
                // Vertex kill with AND semantics takes a cull distance after
                // the planes.
                let distances = vertex.user_clip_plane_count().min(xenos::MAX_USER_CLIP_PLANES)
                    + vertex.vertex_kill_and();
                if distances != 0 {
                    io.clip_cull = Some(next);
                    next += distances.div_ceil(4);
                }
                if vertex.output_point_size() != 0 {
                    io.point_size = Some(next);
                }
            }
            ShaderStage::Pixel => {
                let pixel = self.modification.pixel();
                io.interpolators = next;
                next += pixel.interpolator_mask().count_ones();
                if pixel.param_gen_enable() != 0 && pixel.param_gen_point() != 0 {
                    io.point_coordinates = Some(next);
                    next += 1;
                }
                io.position = next;
                io.front_face = next + 1;
            }
        }
        io
    }

    fn complete_translation(&mut self) -> Translation {
        let dxbc = self.write_container();
        debug_assert!(self.temps.is_balanced(), "{} temps left live", self.temps.live());
        let constant_buffers = CbufferRegister::ALL
            .into_iter()
            .filter(|register| self.cbuffers_used & (1 << *register as u32) != 0)
            .collect();
        Translation {
            stage: self.info.stage,
            modification: self.modification,
            dxbc,
            texture_bindings: self.bindings.textures.clone(),
            sampler_bindings: self.bindings.samplers.clone(),
            used_system_constants: self.used_system_constants,
            constant_buffers,
            uses_shared_memory_uav: self.shared_memory_uav_used,
            uses_edram_rov: self.is_rov(),
            writes_depth: self.info.writes_depth,
            diagnostics: std::mem::take(&mut self.diagnostics),
            is_valid: self.is_valid,
        }
    }

    fn translate_instruction(&mut self, instruction: &ParsedInstruction) {
        if self.config.force_emit_source_map {
            self.disassembly = Some(instruction.to_string());
        }
        match instruction {
            ParsedInstruction::VectorAlu(alu) => self.process_vector_alu(alu),
            ParsedInstruction::ScalarAlu(alu) => self.process_scalar_alu(alu),
            ParsedInstruction::VertexFetch(fetch) => self.process_vertex_fetch(fetch),
            ParsedInstruction::TextureFetch(fetch) => self.process_texture_fetch(fetch),
            ParsedInstruction::Exec(exec) => self.process_exec_begin(exec),
            ParsedInstruction::ExecEnd(exec) => self.process_exec_end(exec),
            ParsedInstruction::Jump(jump) => self.process_jump(jump),
            ParsedInstruction::LoopStart(loop_start) => self.process_loop_start(loop_start),
            ParsedInstruction::LoopEnd(loop_end) => self.process_loop_end(loop_end),
            ParsedInstruction::Alloc(alloc) => self.process_alloc(alloc),
            ParsedInstruction::Label(cf_index) => self.process_label(*cf_index),
        }
        self.disassembly = None;
    }

    /// Emits the pending disassembly as a comment.
    fn emit_disassembly(&mut self) {
        let Some(disassembly) = self.disassembly.take() else {
            return;
        };
        let text = disassembly.trim_start_matches(' ').trim_end_matches('\n');
        if text.is_empty() {
            return;
        }
        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(0);
        asm!(self).op_custom_data(CustomDataClass::Comment, &payload);
    }

    /// Records a problem with the current instruction.
    fn report(&mut self, kind: DiagnosticKind, message: String) {
        warn!(
            kind = ?kind,
            instruction = ?self.instruction_index,
            stage = ?self.info.stage,
            %message,
            "translation diagnostic"
        );
        if kind == DiagnosticKind::UnsupportedOpcode {
            self.is_valid = false;
        }
        self.diagnostics.push(Diagnostic {
            kind,
            instruction_index: self.instruction_index,
            message,
        });
    }

    // Shader-wide predicates.

    fn is_vertex_shader(&self) -> bool {
        self.info.is_vertex_shader()
    }

    fn is_pixel_shader(&self) -> bool {
        self.info.is_pixel_shader()
    }

    fn is_rov(&self) -> bool {
        self.config.edram_rov_used && self.is_pixel_shader()
    }

    fn uses_register_dynamic_addressing(&self) -> bool {
        !self.depth_only && self.info.uses_register_dynamic_addressing
    }

    /// Guest registers the shader has, the size of `x0[]` with dynamic
    /// addressing.
    fn register_count(&self) -> u32 {
        if self.depth_only {
            return 0;
        }
        if self.info.uses_register_dynamic_addressing {
            let dynamic = match self.info.stage {
                ShaderStage::Vertex => self.modification.vertex().dynamic_addressable_register_count(),
                ShaderStage::Pixel => self.modification.pixel().dynamic_addressable_register_count(),
            };
            return dynamic.max(self.info.register_count).clamp(1, crate::shader::MAX_REGISTERS);
        }
        self.info.register_count
    }

    fn is_point_list_expansion(&self) -> bool {
        self.is_vertex_shader()
            && self.modification.vertex().host_vertex_shader_type()
                == Some(HostVertexShaderType::PointListAsTriangleStrip)
    }

    fn depth_stencil_mode(&self) -> DepthStencilMode {
        self.modification.pixel().depth_stencil_mode()
    }

    /// The host depth buffer is written with values converted to 20e4 and
    /// back.
    fn dsv_is_writing_float24_depth(&self) -> bool {
        !self.config.edram_rov_used
            && self.is_pixel_shader()
            && matches!(
                self.depth_stencil_mode(),
                DepthStencilMode::Float24Truncating | DepthStencilMode::Float24Rounding
            )
    }

    /// The depth and stencil test can run before the guest code.
    fn rov_is_depth_stencil_early(&self) -> bool {
        !self.depth_only && !self.info.writes_depth && !self.info.uses_memexport()
    }

    fn is_depth_stencil_temp_used(&self) -> bool {
        if self.config.edram_rov_used {
            return true;
        }
        self.info.writes_depth && self.dsv_is_writing_float24_depth()
    }

    // Scratch registers.

    /// Pushes one temp, zeroing the components in `zero_mask`.
    fn push_temp(&mut self, zero_mask: u32) -> u32 {
        self.push_temps(1, zero_mask)
    }

    fn push_temps(&mut self, count: u32, zero_mask: u32) -> u32 {
        let first = self.temps.push(count);
        if zero_mask & 0b1111 != 0 {
            for register in first..first + count {
                asm!(self).op_mov(Dest::r(register, zero_mask & 0b1111), Src::lu(0), false);
            }
        }
        first
    }

    fn pop_temp(&mut self) {
        self.temps.pop(1);
    }

    fn pop_temps(&mut self, count: u32) {
        self.temps.pop(count);
    }

    // Constant buffers.

    fn cbuffer_src(&mut self, register: CbufferRegister, vector: Index, swizzle: u32) -> Src {
        self.cbuffers_used |= 1 << register as u32;
        Src::cb(register as u32, Index::imm(register as u32), vector, swizzle)
    }

    /// A system constant, with `swizzle` relative to the first component of
    /// the dword `offset` bytes into the member.
    fn system_constant(&mut self, index: SystemConstantIndex, offset: u32, swizzle: u32) -> Src {
        self.used_system_constants.mark(index);
        let (vector, component) = index.location(offset);
        let mut shifted = 0;
        for i in 0..4 {
            let c = (((swizzle >> (i * 2)) & 3) + component).min(3);
            shifted |= c << (i * 2);
        }
        self.cbuffer_src(CbufferRegister::SystemConstants, Index::imm(vector), shifted)
    }

    /// One component of a system constant.
    fn system_constant_scalar(&mut self, index: SystemConstantIndex, offset: u32) -> Src {
        self.system_constant(index, offset, Src::XXXX)
    }

    fn flags(&mut self) -> Src {
        self.system_constant_scalar(SystemConstantIndex::Flags, 0)
    }

    /// Bool constant `index`'s dword, and the bit to test within it.
    fn bool_constant(&mut self, index: u32) -> (Src, u32) {
        let src = self
            .cbuffer_src(CbufferRegister::BoolLoopConstants, Index::imm(index >> 7), Src::XYZW)
            .select((index >> 5) & 3);
        (src, 1 << (index & 31))
    }

    /// Loop constant `index`: count in bits 0:7, start in 8:15 and step in
    /// 16:23.
    fn loop_constant(&mut self, index: u32) -> Src {
        self.cbuffer_src(CbufferRegister::BoolLoopConstants, Index::imm(2 + (index >> 2)), Src::XYZW)
            .select(index & 3)
    }

    fn texture_fetch_constant_dword(&mut self, fetch_constant: u32, dword: u32) -> Src {
        let (vector, component) = xenos::fetch::texture_dword(fetch_constant, dword);
        self.cbuffer_src(CbufferRegister::FetchConstants, Index::imm(vector), Src::XYZW)
            .select(component)
    }

    fn vertex_fetch_constant_dword(&mut self, fetch_constant: u32, dword: u32) -> Src {
        let (vector, component) = xenos::fetch::vertex_dword(fetch_constant, dword);
        self.cbuffer_src(CbufferRegister::FetchConstants, Index::imm(vector), Src::XYZW)
            .select(component)
    }

    // Guest registers and operands.

    fn address_index(&self, addressing: AddressingMode, offset: u32) -> Index {
        match addressing {
            AddressingMode::Absolute => Index::imm(offset),
            AddressingMode::AddressRelative => Index::relative(self.sys.ps_pc_p0_a0, 3, offset),
            AddressingMode::LoopRelative => Index::relative(self.sys.loop_address, 0, offset),
        }
    }

    /// Reads components `register_mask` of a guest register, through a
    /// pushed temp when registers live in `x0[]`.
    fn guest_register_src(&mut self, index: u32, addressing: AddressingMode, register_mask: u32) -> (Src, u32) {
        if !self.uses_register_dynamic_addressing() {
            return (Src::r(index, Src::XYZW), 0);
        }
        let temp = self.push_temp(0);
        let index = self.address_index(addressing, index);
        asm!(self).op_mov(Dest::r(temp, register_mask), Src::x(0, index, Src::XYZW), false);
        (Src::r(temp, Src::XYZW), 1)
    }

    fn guest_register_dest(&self, index: u32, addressing: AddressingMode, mask: u32) -> Dest {
        if self.uses_register_dynamic_addressing() {
            Dest::x(0, self.address_index(addressing, index), mask)
        } else {
            Dest::r(index, mask)
        }
    }

    /// Loads the `needed` components of an operand.
    ///
    /// Components that are not needed replicate the first needed one, so the
    /// result can be used with any write mask covering `needed`.
    pub(crate) fn load_operand(&mut self, operand: &InstructionOperand, needed: u32) -> LoadedOperand {
        let needed = needed & 0b1111;
        if needed == 0 {
            return LoadedOperand::immediate(Src::lf(0.0));
        }
        let first_needed = needed.trailing_zeros();

        let mut swizzle = 0;
        let mut constant_mask = 0;
        let mut constant_values = [0.0f32; 4];
        let mut register_mask = 0;
        for i in 0..4 {
            let from = if needed & (1 << i) != 0 { i } else { first_needed };
            match operand.component(from) {
                SwizzleSource::Zero | SwizzleSource::One => {
                    if needed & (1 << i) != 0 {
                        constant_mask |= 1 << i;
                        constant_values[i as usize] =
                            if operand.component(from) == SwizzleSource::One { 1.0 } else { 0.0 };
                    }
                }
                source => {
                    let c = source.component().unwrap_or(0);
                    swizzle |= c << (i * 2);
                    if needed & (1 << i) != 0 {
                        register_mask |= 1 << c;
                    }
                }
            }
        }

        let (base, mut temps) = match operand.storage {
            OperandStorage::Register => {
                if register_mask == 0 {
                    (Src::lf(0.0), 0)
                } else {
                    self.guest_register_src(operand.index, operand.addressing, register_mask)
                }
            }
            OperandStorage::FloatConstant => {
                let map = &self.info.constant_register_map;
                let vector = match operand.addressing {
                    AddressingMode::Absolute => map.packed_float_index(operand.index).map(Index::imm),
                    addressing if map.float_dynamic_addressing => {
                        Some(self.address_index(addressing, operand.index))
                    }
                    // Constants are packed, so the relative index can't be
                    // honored.
                    _ => map.packed_float_index(operand.index).map(Index::imm),
                };
                match vector {
                    Some(vector) => (
                        self.cbuffer_src(CbufferRegister::FloatConstants, vector, Src::XYZW),
                        0,
                    ),
                    None => (Src::lf(0.0), 0),
                }
            }
            OperandStorage::VertexFetchConstant | OperandStorage::TextureFetchConstant => {
                self.report(
                    DiagnosticKind::SpecificationViolation,
                    format!("fetch constant {} used as an ALU operand", operand.index),
                );
                (Src::lf(0.0), 0)
            }
        };

        let mut src = if base.is_immediate() { base } else { base.swizzle(swizzle) };
        if constant_mask != 0 {
            let temp = self.push_temp(0);
            temps += 1;
            let register_needed = needed & !constant_mask;
            if register_needed != 0 {
                asm!(self).op_mov(Dest::r(temp, register_needed), src, false);
            }
            let [x, y, z, w] = constant_values;
            asm!(self).op_mov(Dest::r(temp, constant_mask), Src::lf4(x, y, z, w), false);
            src = Src::r(temp, Src::XYZW);
        }
        LoadedOperand {
            src: src.with_modifiers(operand.is_absolute_value, operand.is_negated),
            temps,
        }
    }

    /// Releases the temps of a loaded operand.
    pub(crate) fn release(&mut self, operand: LoadedOperand) {
        if operand.temps != 0 {
            self.pop_temps(operand.temps);
        }
    }

    /// Stores `value` to a guest result, applying its swizzle, constant
    /// components and saturation.
    ///
    /// Export address writes are only honored from instructions that can
    /// produce one, ALU instructions writing the vector result.
    pub(crate) fn store_result(&mut self, result: &InstructionResult, value: Src, can_store_memexport_address: bool) {
        let used_write_mask = result.used_write_mask();
        if used_write_mask == 0 {
            return;
        }
        let mut is_clamped = result.is_clamped;

        let dest = match result.storage {
            ResultStorage::None => return,
            ResultStorage::Register => {
                self.guest_register_dest(result.index, result.addressing, 0b1111)
            }
            ResultStorage::Interpolator => {
                let mask = self.modification.vertex().interpolator_mask();
                if result.index >= MAX_INTERPOLATORS || mask & (1 << result.index) == 0 {
                    return;
                }
                let below = (mask & ((1 << result.index) - 1)).count_ones();
                Dest::o(self.io.interpolators + below, 0b1111)
            }
            ResultStorage::Position => Dest::r(self.sys.position, 0b1111),
            ResultStorage::PointSizeEdgeFlagKillVertex => {
                Dest::r(self.sys.point_size_edge_flag_kill_vertex, 0b1111)
            }
            ResultStorage::ExportAddress => {
                let alloc = self.memexport_alloc_count;
                if !can_store_memexport_address || alloc == 0 || alloc > MAX_MEMEXPORT_ALLOCS {
                    return;
                }
                match self.sys.memexport_address[alloc as usize - 1] {
                    Some(register) => Dest::r(register, 0b1111),
                    None => return,
                }
            }
            ResultStorage::ExportData => {
                let alloc = self.memexport_alloc_count;
                if alloc == 0 || alloc > MAX_MEMEXPORT_ALLOCS || result.index as usize >= MEMEXPORT_DATA {
                    return;
                }
                let Some(register) = self.sys.memexport_data[alloc as usize - 1][result.index as usize] else {
                    return;
                };
                let Some(written) = self.sys.memexport_written else {
                    return;
                };
                // 8 bits per alloc, 4 allocs per component.
                let n = alloc - 1;
                let component = n >> 2;
                let bit = 1u32 << (result.index + ((n & 3) << 3));
                asm!(self).op_or(
                    Dest::r(written, 1 << component),
                    Src::r(written, Src::XYZW).select(component),
                    Src::lu(bit),
                );
                Dest::r(register, 0b1111)
            }
            ResultStorage::Color => {
                let Some(register) = self
                    .sys
                    .colors
                    .get(result.index as usize)
                    .copied()
                    .flatten()
                else {
                    return;
                };
                if self.is_rov() {
                    // Mark the target as written for the output merger.
                    let rov_params = self.sys.rov_params;
                    asm!(self).op_or(
                        Dest::r(rov_params, 0b0001),
                        Src::r(rov_params, Src::XXXX),
                        Src::lu(1 << (8 + result.index)),
                    );
                }
                Dest::r(register, 0b1111)
            }
            ResultStorage::Depth => {
                is_clamped = true;
                match self.sys.depth_stencil {
                    Some(register) => Dest::r(register, 0b0001),
                    None => {
                        self.out_depth_used = true;
                        Dest::odepth()
                    }
                }
            }
        };

        let mut constant_mask = 0;
        let mut constant_values = [0.0f32; 4];
        let mut swizzle = 0;
        for i in 0..4 {
            if used_write_mask & (1 << i) == 0 {
                continue;
            }
            match result.components[i as usize] {
                SwizzleSource::Zero => constant_mask |= 1 << i,
                SwizzleSource::One => {
                    constant_mask |= 1 << i;
                    constant_values[i as usize] = 1.0;
                }
                source => swizzle |= source.component().unwrap_or(0) << (i * 2),
            }
        }

        let is_scalar_dest = result.storage == ResultStorage::Depth && self.sys.depth_stencil.is_none();
        let value_mask = used_write_mask & !constant_mask;
        if value_mask != 0 {
            let dest = if is_scalar_dest { dest } else { dest.with_mask(value_mask) };
            asm!(self).op_mov(dest, value.swizzle_swizzled(swizzle), is_clamped);
        }
        if constant_mask != 0 {
            let dest = if is_scalar_dest { dest } else { dest.with_mask(constant_mask) };
            let [x, y, z, w] = constant_values;
            asm!(self).op_mov(dest, Src::lf4(x, y, z, w), false);
        }

        if result.storage == ResultStorage::PointSizeEdgeFlagKillVertex && used_write_mask & 0b0001 != 0 {
            // Vertex point size is clamped to the range allowed for the draw.
            // Integer comparison of the bits sends negative values and -NaN
            // to the minimum and +NaN to the maximum.
            let pts = self.sys.point_size_edge_flag_kill_vertex;
            let min = self.system_constant_scalar(SystemConstantIndex::PointVertexDiameterMin, 0);
            let max = self.system_constant_scalar(SystemConstantIndex::PointVertexDiameterMax, 0);
            asm!(self).op_imax(Dest::r(pts, 0b0001), min, Src::r(pts, Src::XXXX));
            asm!(self).op_imin(Dest::r(pts, 0b0001), max, Src::r(pts, Src::XXXX));
        }
    }

    // Shader structure.

    fn start_translation(&mut self) {
        if self.is_vertex_shader() {
            self.sys.position = self.push_temp(0b1111);
            self.sys.point_size_edge_flag_kill_vertex = self.push_temp(0b0110);
            // A negative size means the point size from the constants.
            let pts = self.sys.point_size_edge_flag_kill_vertex;
            asm!(self).op_mov(Dest::r(pts, 0b0001), Src::lf(-1.0), false);
        } else {
            if self.config.edram_rov_used {
                self.sys.rov_params = self.push_temp(0);
            }
            if self.is_depth_stencil_temp_used() {
                let zero_mask = if self.info.writes_depth {
                    0b0001
                } else if self.is_rov() && self.rov_is_depth_stencil_early() {
                    0b1111
                } else {
                    0
                };
                self.sys.depth_stencil = Some(self.push_temp(zero_mask));
            }
            for i in 0..MAX_COLOR_RENDER_TARGETS {
                if self.info.writes_color_targets & (1 << i) != 0 {
                    self.sys.colors[i as usize] = Some(self.push_temp(0b1111));
                }
            }
        }

        if !self.depth_only {
            let mut any_memexport = false;
            for alloc in 0..self.info.memexport_em_written.len().min(MEMEXPORT_ALLOCS) {
                let em_written = self.info.memexport_em_written[alloc];
                if em_written == 0 {
                    continue;
                }
                any_memexport = true;
                self.sys.memexport_address[alloc] = Some(self.push_temp(0b1111));
                for em in 0..MEMEXPORT_DATA {
                    if em_written & (1 << em) != 0 {
                        self.sys.memexport_data[alloc][em] = Some(self.push_temp(0));
                    }
                }
            }
            if any_memexport {
                self.sys.memexport_written = Some(self.push_temp(0b1111));
            }

            // Guest-visible state is zeroed, pv is internal.
            self.sys.result = self.push_temp(0);
            self.sys.ps_pc_p0_a0 = self.push_temp(0b1111);
            self.sys.loop_address = self.push_temp(0b1111);
            self.sys.loop_count = self.push_temp(0b1111);
            self.sys.grad_h_lod = self.push_temp(0b1111);
            self.sys.grad_v_vfetch_address = self.push_temp(0b1111);
        }

        if self.is_vertex_shader() {
            self.start_vertex_shader();
        } else {
            self.start_pixel_shader();
        }

        if self.depth_only {
            return;
        }

        let pc = Src::r(self.sys.ps_pc_p0_a0, Src::YYYY);
        asm!(self).op_loop();
        if self.config.use_switch() {
            asm!(self).op_switch(pc);
            asm!(self).op_case(Src::lu(0));
        } else {
            asm!(self).op_if(false, pc);
        }
    }

    fn complete_shader_code(&mut self) {
        if !self.depth_only {
            self.close_exec_conditionals();
            if self.config.use_switch() {
                // The last exec always jumps out, this is only reached by
                // jumping past the end.
                asm!(self).op_break();
                asm!(self).op_endswitch();
            } else {
                asm!(self).op_endif();
            }
            asm!(self).op_break();
            asm!(self).op_endloop();
            self.pop_temps(6);

            self.export_to_memory();

            if self.sys.memexport_written.is_some() {
                self.pop_temp();
            }
            for alloc in (0..MEMEXPORT_ALLOCS).rev() {
                let data = self.sys.memexport_data[alloc].iter().flatten().count() as u32;
                if data != 0 {
                    self.pop_temps(data);
                }
                if self.sys.memexport_address[alloc].is_some() {
                    self.pop_temp();
                }
            }
        }

        if self.is_vertex_shader() {
            self.complete_vertex_shader();
            self.pop_temps(2);
        } else {
            self.complete_pixel_shader();
            for register in self.sys.colors.iter().rev() {
                if register.is_some() {
                    self.temps.pop(1);
                }
            }
            if self.sys.depth_stencil.is_some() {
                self.pop_temp();
            }
            if self.config.edram_rov_used {
                self.pop_temp();
            }
        }

        asm!(self).op_ret();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ucode::{Predication, VectorAluInstruction, VectorOpcode};

    fn exec_end() -> [ParsedInstruction; 2] {
        let exec = crate::ucode::ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        [ParsedInstruction::Exec(exec), ParsedInstruction::ExecEnd(exec)]
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TranslatorConfig {
            draw_resolution_scale_x: 0,
            ..Default::default()
        };
        assert!(Translator::new(config).is_err());
    }

    #[test]
    fn unknown_host_vertex_shader_type_is_rejected() {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let modification =
            Modification::from(Modification::default_vertex().vertex().with_host_vertex_shader_type_raw(7));
        let err = translator
            .translate(&exec_end(), &ShaderInfo::new(ShaderStage::Vertex), modification)
            .unwrap_err();
        assert!(matches!(err, TranslateError::InvalidShaderInfo(_)));
    }

    #[test]
    fn temps_balance_and_cover_guest_registers() {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 3;
        translator
            .translate(&exec_end(), &info, Modification::default_vertex())
            .unwrap();
        assert!(translator.temps.is_balanced());
        assert_eq!(translator.temps.base(), 3);
        assert!(translator.temps.declared_count() >= 3 + 8);
    }

    #[test]
    fn dynamic_addressing_moves_registers_to_an_array() {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 4;
        info.uses_register_dynamic_addressing = true;
        let modification =
            Modification::from(Modification::default_vertex().vertex().with_dynamic_addressable_register_count(9));
        translator.translate(&exec_end(), &info, modification).unwrap();
        assert_eq!(translator.temps.base(), 0);
        assert_eq!(translator.register_count(), 9);
    }

    #[test]
    fn unknown_opcode_invalidates_the_translation() {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let [exec, end] = exec_end();
        let instructions = [
            exec,
            ParsedInstruction::VectorAlu(VectorAluInstruction {
                opcode: VectorOpcode::Unknown(31),
                predication: Predication::NONE,
                result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
                operands: vec![InstructionOperand::register(0)],
            }),
            end,
        ];
        let translation = translator
            .translate(&instructions, &info, Modification::default_vertex())
            .unwrap();
        assert!(!translation.is_valid);
        assert_eq!(translation.diagnostics.len(), 1);
        assert_eq!(translation.diagnostics[0].kind, DiagnosticKind::UnsupportedOpcode);
        assert_eq!(translation.diagnostics[0].instruction_index, Some(1));
    }

    #[test]
    fn state_does_not_leak_between_translations() {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 1;
        let first = translator
            .translate(&exec_end(), &info, Modification::default_vertex())
            .unwrap();
        let mut pixel = ShaderInfo::new(ShaderStage::Pixel);
        pixel.writes_color_targets = 1;
        translator
            .translate(&exec_end(), &pixel, Modification::default_pixel())
            .unwrap();
        let again = translator
            .translate(&exec_end(), &info, Modification::default_vertex())
            .unwrap();
        assert_eq!(first.dxbc, again.dxbc);
    }
}
