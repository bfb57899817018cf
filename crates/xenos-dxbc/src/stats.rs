use bytemuck::{Pod, Zeroable};

/// Contents of the `STAT` chunk.
///
/// The assembler bumps the relevant counters as it emits instructions, the
/// same way the reference compiler fills them in.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct Statistics {
    pub instruction_count: u32,
    pub temp_register_count: u32,
    pub def_count: u32,
    pub dcl_count: u32,
    pub float_instruction_count: u32,
    pub int_instruction_count: u32,
    pub uint_instruction_count: u32,
    pub static_flow_control_count: u32,
    pub dynamic_flow_control_count: u32,
    pub macro_instruction_count: u32,
    pub temp_array_count: u32,
    pub array_instruction_count: u32,
    pub cut_instruction_count: u32,
    pub emit_instruction_count: u32,
    pub texture_normal_instructions: u32,
    pub texture_load_instructions: u32,
    pub texture_comp_instructions: u32,
    pub texture_bias_instructions: u32,
    pub texture_gradient_instructions: u32,
    pub mov_instruction_count: u32,
    pub movc_instruction_count: u32,
    pub conversion_instruction_count: u32,
    pub unknown_22: u32,
    pub input_primitive: u32,
    pub gs_output_topology: u32,
    pub gs_max_output_vertex_count: u32,
    pub unknown_26: u32,
    pub lod_instructions: u32,
    pub unknown_28: u32,
    pub unknown_29: u32,
    pub control_points: u32,
    pub hs_output_primitive: u32,
    pub hs_partitioning: u32,
    pub tessellator_domain: u32,
    pub barrier_instructions: u32,
    pub interlocked_instructions: u32,
    pub texture_store_instructions: u32,
}

impl Statistics {
    /// Size of the chunk payload in bytes.
    pub const SIZE_BYTES: usize = 37 * 4;

    /// The chunk payload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
