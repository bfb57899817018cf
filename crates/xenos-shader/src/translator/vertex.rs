//! Vertex shader prologue and epilogue.

use xenos_dxbc::{Dest, Index, Src};

use super::Translator;
use crate::modification::HostVertexShaderType;
use crate::system_constants::{Flags, SystemConstantIndex};
use crate::ucode::AddressingMode;
use crate::xenos;

/// `SV_VertexID` input register.
pub(super) const IN_VERTEX_ID: u32 = 0;

/// Host vertices per guest point when points are expanded to quads.
const POINT_EXPANSION_VERTICES_LOG2: u32 = 2;

impl Translator {
    /// `SV_VertexID` is read.
    pub(super) fn is_vertex_id_used(&self) -> bool {
        self.is_vertex_shader() && !self.depth_only && (self.register_count() >= 1 || self.is_point_list_expansion())
    }

    /// Clip and cull distance counts, clip distances come first.
    pub(super) fn clip_cull_distance_counts(&self) -> (u32, u32) {
        let vertex = self.modification.vertex();
        let planes = vertex.user_clip_plane_count().min(xenos::MAX_USER_CLIP_PLANES);
        let kill = vertex.vertex_kill_and();
        if vertex.user_clip_plane_cull() != 0 {
            (0, planes + kill)
        } else {
            (planes, kill)
        }
    }

    pub(super) fn start_vertex_shader(&mut self) {
        // Guest code may read registers it only writes conditionally.
        for register in 0..self.register_count() {
            let dest = self.guest_register_dest(register, AddressingMode::Absolute, 0b1111);
            asm!(self).op_mov(dest, Src::lf(0.0), false);
        }
        let interpolators = self.modification.vertex().interpolator_mask().count_ones();
        for i in 0..interpolators {
            asm!(self).op_mov(Dest::o(self.io.interpolators + i, 0b1111), Src::lf(0.0), false);
        }

        match self.modification.vertex().host_vertex_shader_type() {
            Some(HostVertexShaderType::Vertex | HostVertexShaderType::PointListAsTriangleStrip) => {
                self.load_vertex_index();
            }
            // Rejected before translation starts.
            None => {}
        }
    }

    /// Writes the guest vertex index to `r0.x` as a float.
    fn load_vertex_index(&mut self) {
        if self.register_count() < 1 {
            return;
        }
        let dynamic = self.uses_register_dynamic_addressing();
        let register = if dynamic { self.push_temp(0) } else { 0 };
        let index = Dest::r(register, 0b0001);
        let index_src = Src::r(register, Src::XXXX);

        let vertex_id = Src::v(Index::imm(IN_VERTEX_ID), Src::XXXX);
        let source = if self.is_point_list_expansion() {
            asm!(self).op_ushr(
                Dest::r(register, 0b0010),
                vertex_id,
                Src::lu(POINT_EXPANSION_VERTICES_LOG2),
            );
            Src::r(register, Src::YYYY)
        } else {
            vertex_id
        };

        // The closing vertex of a non-indexed line loop is vertex 0.
        let closing = self.system_constant_scalar(SystemConstantIndex::LineLoopClosingIndex, 0);
        asm!(self).op_ine(index, source, closing);
        asm!(self).op_and(index, source, index_src);

        let endian = self.system_constant_scalar(SystemConstantIndex::VertexIndexEndian, 0);
        self.emit_endian_swap(register, 0b0001, endian);
        if self.is_point_list_expansion() && !dynamic {
            asm!(self).op_mov(Dest::r(register, 0b0010), Src::lf(0.0), false);
        }

        self.remap_and_convert_vertex_index(index, index_src);

        if dynamic {
            asm!(self).op_mov(Dest::x(0, Index::imm(0), 0b0001), index_src, false);
            self.pop_temp();
        }
    }

    /// Applies the base vertex and the clamp, then converts to float.
    pub(super) fn remap_and_convert_vertex_index(&mut self, dest: Dest, src: Src) {
        let offset = self.system_constant_scalar(SystemConstantIndex::VertexIndexOffset, 0);
        let min = self.system_constant_scalar(SystemConstantIndex::VertexIndexMin, 0);
        let max = self.system_constant_scalar(SystemConstantIndex::VertexIndexMax, 0);
        asm!(self).op_iadd(dest, src, offset);
        // Only 24 bits of the index are used, after offsetting too.
        asm!(self).op_and(dest, src, Src::lu(xenos::VERTEX_INDEX_MASK));
        asm!(self).op_umax(dest, src, min);
        asm!(self).op_umin(dest, src, max);
        asm!(self).op_utof(dest, src);
    }

    pub(super) fn complete_vertex_shader(&mut self) {
        let temp = self.push_temp(0);
        let temp_x = Dest::r(temp, 0b0001);
        let temp_x_src = Src::r(temp, Src::XXXX);
        let position = self.sys.position;
        let pos = Src::r(position, Src::XYZW);
        let pos_w = Src::r(position, Src::WWWW);

        let flags = self.flags();
        asm!(self).op_and(temp_x, flags, Src::lu(Flags::W_NOT_RECIPROCAL.bits()));
        asm!(self).op_if(false, temp_x_src);
        asm!(self).op_div(Dest::r(position, 0b1000), Src::lf(1.0), pos_w);
        asm!(self).op_endif();

        asm!(self).op_and(temp_x, flags, Src::lu(Flags::XY_DIVIDED_BY_W.bits()));
        asm!(self).op_if(true, temp_x_src);
        asm!(self).op_mul(Dest::r(position, 0b0011), pos, pos_w, false);
        asm!(self).op_endif();

        asm!(self).op_and(temp_x, flags, Src::lu(Flags::Z_DIVIDED_BY_W.bits()));
        asm!(self).op_if(true, temp_x_src);
        asm!(self).op_mul(Dest::r(position, 0b0100), Src::r(position, Src::ZZZZ), pos_w, false);
        asm!(self).op_endif();

        let vertex = self.modification.vertex();
        let (clip_count, _) = self.clip_cull_distance_counts();
        let mut clip_next = 0;
        let mut cull_next = clip_count;
        let planes = vertex.user_clip_plane_count().min(xenos::MAX_USER_CLIP_PLANES);
        if let Some(clip_cull) = self.io.clip_cull {
            for plane in 0..planes {
                let next = if vertex.user_clip_plane_cull() != 0 {
                    &mut cull_next
                } else {
                    &mut clip_next
                };
                let component = *next;
                *next += 1;
                let plane_src = self.system_constant(SystemConstantIndex::UserClipPlanes, 16 * plane, Src::XYZW);
                asm!(self).op_dp4(
                    Dest::o(clip_cull + (component >> 2), 1 << (component & 3)),
                    pos,
                    plane_src,
                );
            }
        }

        // Guest to host clip space. Multipass shaders get NaN scale here to
        // drop every primitive.
        const XYZZ: u32 = 0b10_10_01_00;
        let ndc_scale = self.system_constant(SystemConstantIndex::NdcScale, 0, XYZZ);
        asm!(self).op_mul(Dest::r(position, 0b0111), pos, ndc_scale, false);
        let ndc_offset = self.system_constant(SystemConstantIndex::NdcOffset, 0, XYZZ);
        asm!(self).op_mad(Dest::r(position, 0b0111), ndc_offset, pos_w, pos, false);

        if self.is_point_list_expansion() {
            self.expand_point(temp);
        }

        // Bits 0:30 of the kill register: -0 keeps the vertex, denormals kill it.
        let pts = self.sys.point_size_edge_flag_kill_vertex;
        let writes_kill = self.info.writes_point_size_edge_flag_kill_vertex & 0b100 != 0;
        if writes_kill {
            asm!(self).op_and(temp_x, Src::r(pts, Src::ZZZZ), Src::lu(0x7FFF_FFFF));
        }
        if vertex.vertex_kill_and() != 0 {
            if let Some(clip_cull) = self.io.clip_cull {
                let dest = Dest::o(clip_cull + (cull_next >> 2), 1 << (cull_next & 3));
                if writes_kill {
                    asm!(self).op_movc(dest, temp_x_src, Src::lf(-1.0), Src::lf(0.0));
                } else {
                    asm!(self).op_mov(dest, Src::lf(0.0), false);
                }
            }
        } else if writes_kill {
            asm!(self).op_movc(Dest::r(position, 0b1000), temp_x_src, Src::lf(f32::NAN), pos_w);
        }

        asm!(self).op_mov(Dest::o(self.io.position, 0b1111), pos, false);
        if let Some(point_size) = self.io.point_size {
            asm!(self).op_mov(Dest::o(point_size, 0b0001), Src::r(pts, Src::XXXX), false);
        }

        self.pop_temp();
    }

    /// Moves the vertex to its corner of the point quad and writes the point
    /// coordinates.
    ///
    /// Corners go in strip order: top left, top right, bottom left, bottom
    /// right.
    fn expand_point(&mut self, temp: u32) {
        let position = self.sys.position;
        let pts = self.sys.point_size_edge_flag_kill_vertex;

        // Diameter from the shader if it wrote a non-negative one.
        let constant_diameter = self.system_constant(SystemConstantIndex::PointConstantDiameter, 0, Src::XYXY);
        asm!(self).op_ge(Dest::r(temp, 0b0001), Src::r(pts, Src::XXXX), Src::lf(0.0));
        asm!(self).op_movc(
            Dest::r(temp, 0b0011),
            Src::r(temp, Src::XXXX),
            Src::r(pts, Src::XXXX),
            constant_diameter,
        );
        let to_radius =
            self.system_constant(SystemConstantIndex::PointScreenDiameterToNdcRadius, 0, Src::XYXY);
        asm!(self).op_mul(Dest::r(temp, 0b0011), Src::r(temp, Src::XYZW), to_radius, false);

        // Corner direction in zw.
        let vertex_id = Src::v(Index::imm(IN_VERTEX_ID), Src::XXXX);
        asm!(self).op_and(Dest::r(temp, 0b1100), vertex_id, Src::lu4(0, 0, 1, 2));
        asm!(self).op_movc(
            Dest::r(temp, 0b1100),
            Src::r(temp, Src::XYZW),
            Src::lf4(0.0, 0.0, 1.0, -1.0),
            Src::lf4(0.0, 0.0, -1.0, 1.0),
        );

        const ZWZW: u32 = 0b11_10_11_10;
        if let Some(point_coordinates) = self.io.point_coordinates {
            asm!(self).op_mad(
                Dest::o(point_coordinates, 0b0011),
                Src::r(temp, ZWZW),
                Src::lf4(0.5, -0.5, 0.0, 0.0),
                Src::lf(0.5),
                false,
            );
            asm!(self).op_mov(Dest::o(point_coordinates, 0b1100), Src::lf(0.0), false);
        }

        asm!(self).op_mul(Dest::r(temp, 0b0011), Src::r(temp, Src::XYZW), Src::r(temp, ZWZW), false);
        asm!(self).op_mad(
            Dest::r(position, 0b0011),
            Src::r(temp, Src::XYZW),
            Src::r(position, Src::WWWW),
            Src::r(position, Src::XYZW),
            false,
        );
    }
}

#[cfg(test)]
mod tests {
    use xenos_dxbc::shex::ShexProgram;
    use xenos_dxbc::test_utils::decode_container_program;
    use xenos_dxbc::{Opcode, OperandType};

    use crate::config::TranslatorConfig;
    use crate::modification::{HostVertexShaderType, Modification};
    use crate::shader::{ShaderInfo, ShaderStage};
    use crate::translator::Translator;
    use crate::ucode::{ExecInstruction, ParsedInstruction};

    fn translate(info: &ShaderInfo, modification: Modification) -> ShexProgram {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let instructions = [ParsedInstruction::Exec(exec), ParsedInstruction::ExecEnd(exec)];
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator.translate(&instructions, info, modification).unwrap();
        decode_container_program(&translation.dxbc)
    }

    fn vertex_info(register_count: u32) -> ShaderInfo {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = register_count;
        info
    }

    #[test]
    fn vertex_index_is_remapped_and_converted() {
        let program = translate(&vertex_info(2), Modification::default_vertex());
        assert_eq!(program.count(Opcode::INe), 1);
        assert_eq!(program.count(Opcode::UMax), 1);
        assert_eq!(program.count(Opcode::UMin), 1);
        assert_eq!(program.count(Opcode::UToF), 1);
        // Endian swap is branchy, never a switch.
        assert_eq!(program.count(Opcode::Bfi), 1);
    }

    #[test]
    fn no_registers_means_no_vertex_index() {
        let program = translate(&vertex_info(0), Modification::default_vertex());
        assert_eq!(program.count(Opcode::UToF), 0);
        assert_eq!(program.count(Opcode::DclInputSgv), 0);
    }

    #[test]
    fn user_clip_planes_write_distances() {
        let modification = Modification::from(
            Modification::default_vertex()
                .vertex()
                .with_user_clip_plane_count(5)
                .with_vertex_kill_and(1),
        );
        let program = translate(&vertex_info(1), modification);
        assert_eq!(program.count(Opcode::Dp4), 5);
        // The sixth distance is the vertex kill cull distance, in the second
        // register.
        let kill = program
            .with_opcode(Opcode::Mov)
            .filter(|mov| mov.operands[0].ty == OperandType::Output)
            .filter(|mov| mov.operands[0].components == xenos_dxbc::shex::Components::Mask(0b0010))
            .count();
        assert_eq!(kill, 1);
    }

    #[test]
    fn epilogue_undoes_guest_divisions() {
        let program = translate(&vertex_info(0), Modification::default_vertex());
        assert_eq!(program.count(Opcode::Div), 1);
        // Three flag tests.
        assert_eq!(program.count(Opcode::If), 3);
    }

    #[test]
    fn point_expansion_outputs_coordinates() {
        let modification = Modification::from(
            Modification::default_vertex()
                .vertex()
                .with_host_vertex_shader_type_raw(HostVertexShaderType::PointListAsTriangleStrip as u32),
        );
        let program = translate(&vertex_info(0), modification);
        // The corner comes from the vertex ID even without guest registers.
        assert_eq!(program.count(Opcode::DclInputSgv), 1);
        assert_eq!(program.count(Opcode::Ge), 1);
        // NDC offset, point coordinates and the corner offset.
        assert_eq!(program.count(Opcode::Mad), 3);
    }
}
