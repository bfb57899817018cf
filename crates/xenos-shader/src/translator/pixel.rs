//! Pixel shader prologue.

use xenos_dxbc::{Dest, Index, Src};

use super::Translator;
use crate::system_constants::Flags;
use crate::ucode::AddressingMode;
use crate::xenos::MAX_INTERPOLATORS;

impl Translator {
    pub(super) fn start_pixel_shader(&mut self) {
        if self.config.edram_rov_used {
            self.rov_load_parameters();
            if self.rov_is_depth_stencil_early() {
                self.rov_depth_stencil_test();
            } else if !self.info.writes_depth {
                // Depth is linear within the primitive, so the derivatives
                // taken here give the per-sample depth and the slope for the
                // polygon offset later, whatever the guest code does.
                if let Some(depth) = self.sys.depth_stencil {
                    let z = Src::v(Index::imm(self.io.position), Src::ZZZZ);
                    self.in_position_used |= 0b0100;
                    asm!(self).op_deriv_rtx_coarse(Dest::r(depth, 0b0001), z);
                    asm!(self).op_deriv_rty_coarse(Dest::r(depth, 0b0010), z);
                }
            }
        }

        if self.depth_only {
            return;
        }

        let pixel = self.modification.pixel();
        let param_gen = (pixel.param_gen_enable() != 0
            && pixel.param_gen_interpolator() < self.register_count())
        .then(|| pixel.param_gen_interpolator());

        // Registers the guest only initializes conditionally must still not
        // hold garbage.
        let interpolator_mask = pixel.interpolator_mask();
        for i in 0..self.register_count() {
            if Some(i) == param_gen {
                continue;
            }
            let src = if i < MAX_INTERPOLATORS && interpolator_mask & (1 << i) != 0 {
                let below = (interpolator_mask & ((1 << i) - 1)).count_ones();
                Src::v(Index::imm(self.io.interpolators + below), Src::XYZW)
            } else {
                Src::lf(0.0)
            };
            let dest = self.guest_register_dest(i, AddressingMode::Absolute, 0b1111);
            asm!(self).op_mov(dest, src, false);
        }

        if let Some(interpolator) = param_gen {
            self.write_ps_param_gen(interpolator, pixel.param_gen_point() != 0);
        }
    }

    /// PsParamGen: the pixel position in xy, back-facing in the sign of x,
    /// point in the sign of y, point coordinates in zw for points and line in
    /// the sign of z otherwise.
    fn write_ps_param_gen(&mut self, interpolator: u32, is_point: bool) {
        let dynamic = self.uses_register_dynamic_addressing();
        let temp = if dynamic { self.push_temp(0) } else { interpolator };
        let t = Src::r(temp, Src::XYZW);

        // Guest pixel centers are at integers, host ones at .5.
        self.in_position_used |= 0b0011;
        asm!(self).op_round_ni(Dest::r(temp, 0b0011), Src::v(Index::imm(self.io.position), Src::XYZW));
        let (scale_x, scale_y) = self.config.draw_resolution_scale();
        let scaled_axes = u32::from(scale_x > 1) | u32::from(scale_y > 1) << 1;
        if scaled_axes != 0 {
            asm!(self).op_mul(
                Dest::r(temp, scaled_axes),
                t,
                Src::lf4(1.0 / scale_x as f32, 1.0 / scale_y as f32, 1.0, 1.0),
                false,
            );
        }

        match self.io.point_coordinates.filter(|_| is_point) {
            Some(point_coordinates) => {
                // Points are front-facing and not lines.
                asm!(self).op_mov(Dest::r(temp, 0b0001), t.select(0).abs(), false);
                asm!(self).op_mov(Dest::r(temp, 0b0010), -t.select(1).abs(), false);
                // Saturated, the center of the pixel may be outside the point.
                asm!(self).op_mov(
                    Dest::r(temp, 0b1100),
                    Src::v(Index::imm(point_coordinates), 0b01_00_00_00),
                    true,
                );
            }
            None => {
                asm!(self).op_mov(Dest::r(temp, 0b0011), t.abs(), false);
                let flags = self.flags();
                asm!(self).op_and(Dest::r(temp, 0b0100), flags, Src::lu(Flags::PRIMITIVE_POLYGONAL.bits()));
                asm!(self).op_if(true, t.select(2));
                self.in_front_face_used = true;
                // The negate modifier flips the sign of 0 too.
                asm!(self).op_movc(
                    Dest::r(temp, 0b0001),
                    Src::v(Index::imm(self.io.front_face), Src::XXXX),
                    t.select(0),
                    -t.select(0),
                );
                asm!(self).op_endif();
                let flags = self.flags();
                asm!(self).op_ubfe(Dest::r(temp, 0b0100), Src::lu(1), Src::lu(Flags::PRIMITIVE_LINE_SHIFT), flags);
                asm!(self).op_ishl(Dest::r(temp, 0b0100), t.select(2), Src::lu(31));
                asm!(self).op_mov(Dest::r(temp, 0b1000), Src::lf(0.0), false);
            }
        }

        if dynamic {
            let dest = self.guest_register_dest(interpolator, AddressingMode::Absolute, 0b1111);
            asm!(self).op_mov(dest, t, false);
            self.pop_temp();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xenos_dxbc::test_utils::{decode_container_program, Interpreter, Outcome};

    use super::*;
    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{CbufferRegister, ShaderInfo, ShaderStage};
    use crate::system_constants::SystemConstantIndex;
    use crate::ucode::{ExecInstruction, ParsedInstruction};

    fn exec_end() -> [ParsedInstruction; 2] {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        [ParsedInstruction::Exec(exec), ParsedInstruction::ExecEnd(exec)]
    }

    fn run(info: &ShaderInfo, modification: Modification, flags: Flags, inputs: Vec<[u32; 4]>) -> Interpreter {
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator.translate(&exec_end(), info, modification).unwrap();
        let program = decode_container_program(&translation.dxbc);
        let mut interpreter = Interpreter::new();
        let (vector, component) = SystemConstantIndex::Flags.location(0);
        interpreter.set_constant(CbufferRegister::SystemConstants as u32, vector, component, flags.bits());
        interpreter.inputs = inputs;
        assert_eq!(interpreter.run(&program), Outcome::Returned);
        interpreter
    }

    fn vector(values: [f32; 4]) -> [u32; 4] {
        values.map(f32::to_bits)
    }

    #[test]
    fn interpolators_are_copied_and_the_rest_zeroed() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 3;
        let modification = Modification::from(Modification::default_pixel().pixel().with_interpolator_mask(0b101));
        // v0 = interpolator 0, v1 = interpolator 2.
        let inputs = vec![vector([1.0, 2.0, 3.0, 4.0]), vector([5.0, 6.0, 7.0, 8.0])];
        let state = run(&info, modification, Flags::empty(), inputs);
        assert_eq!(state.temps[0], vector([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(state.temps[1], [0; 4]);
        assert_eq!(state.temps[2], vector([5.0, 6.0, 7.0, 8.0]));
    }

    #[test]
    fn param_gen_encodes_position_and_facing() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 2;
        let modification = Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_interpolator_mask(0b1)
                .with_param_gen_enable(1)
                .with_param_gen_interpolator(1),
        );
        // Interpolator 0, SV_Position, SV_IsFrontFace (back).
        let inputs = vec![vector([9.0; 4]), vector([10.5, 20.5, 0.25, 1.0]), [0; 4]];
        let state = run(&info, modification, Flags::PRIMITIVE_POLYGONAL, inputs);
        assert_eq!(state.temps[0], vector([9.0; 4]));
        assert_eq!(state.temps[1], vector([-10.0, 20.0, 0.0, 0.0]));
    }

    #[test]
    fn param_gen_flags_lines() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        let modification = Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_interpolator_mask(0)
                .with_param_gen_enable(1)
                .with_param_gen_interpolator(0),
        );
        let inputs = vec![vector([3.5, 4.5, 0.0, 1.0]), [u32::MAX; 4]];
        let state = run(&info, modification, Flags::PRIMITIVE_LINE, inputs);
        assert_eq!(state.temps[0], [3.0f32.to_bits(), 4.0f32.to_bits(), 0x8000_0000, 0]);
    }

    #[test]
    fn param_gen_for_points_carries_coordinates() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        let modification = Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_interpolator_mask(0)
                .with_param_gen_enable(1)
                .with_param_gen_interpolator(0)
                .with_param_gen_point(1),
        );
        // Point coordinates, then SV_Position.
        let inputs = vec![vector([0.25, 1.5, 0.0, 0.0]), vector([7.5, 8.5, 0.0, 1.0])];
        let state = run(&info, modification, Flags::empty(), inputs);
        assert_eq!(state.temps[0], vector([7.0, -8.0, 0.25, 1.0]));
    }

    #[test]
    fn out_of_range_param_gen_is_ignored() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        let modification = Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_param_gen_enable(1)
                .with_param_gen_interpolator(5),
        );
        let mut translator = Translator::new(TranslatorConfig::default()).unwrap();
        let translation = translator.translate(&exec_end(), &info, modification).unwrap();
        let program = decode_container_program(&translation.dxbc);
        assert_eq!(program.count(xenos_dxbc::Opcode::RoundNi), 0);
    }
}
