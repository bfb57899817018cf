//! Pixel shader epilogue for host render targets, and the parts shared with
//! the EDRAM output merger: the alpha test and alpha-to-coverage.

use xenos_dxbc::{Dest, Src};

use super::codec_emit::SmallFloat;
use super::Translator;
use crate::codec::Rounding;
use crate::modification::DepthStencilMode;
use crate::system_constants::{Flags, SystemConstantIndex};
use crate::xenos::{compare, MAX_COLOR_RENDER_TARGETS};

impl Translator {
    pub(super) fn complete_pixel_shader(&mut self) {
        if self.depth_only {
            if self.config.edram_rov_used {
                self.rov_complete();
            }
            return;
        }
        if let Some(color) = self.sys.colors[0] {
            self.emit_alpha_test(color);
        }
        if self.config.edram_rov_used {
            self.rov_complete();
        } else {
            self.complete_pixel_shader_rtv();
        }
    }

    /// Drops the pixel if the alpha of color 0 fails the comparison in the
    /// flags. Never passing is 0, always passing is 7.
    fn emit_alpha_test(&mut self, color: u32) {
        let temp = self.push_temp(0);
        let t = Src::r(temp, Src::XYZW);
        let flags = self.flags();
        asm!(self).op_ubfe(Dest::r(temp, 0b1000), Src::lu(3), Src::lu(Flags::ALPHA_PASS_SHIFT), flags);
        asm!(self).op_ine(
            Dest::r(temp, 0b0001),
            t.select(3),
            Src::lu(compare::LESS | compare::EQUAL | compare::GREATER),
        );
        asm!(self).op_if(true, t.select(0));

        let alpha = Src::r(color, Src::WWWW);
        let reference = self.system_constant_scalar(SystemConstantIndex::AlphaTestReference, 0);
        asm!(self).op_lt(Dest::r(temp, 0b0001), alpha, reference);
        asm!(self).op_eq(Dest::r(temp, 0b0010), alpha, reference);
        asm!(self).op_lt(Dest::r(temp, 0b0100), reference, alpha);
        asm!(self).op_and(
            Dest::r(temp, 0b0111),
            t,
            Src::lu4(compare::LESS, compare::EQUAL, compare::GREATER, 0),
        );
        asm!(self).op_or(Dest::r(temp, 0b0001), t.select(0), t.select(1));
        asm!(self).op_or(Dest::r(temp, 0b0001), t.select(0), t.select(2));
        asm!(self).op_and(Dest::r(temp, 0b0001), t.select(0), t.select(3));
        if self.is_rov() {
            asm!(self).op_retc(false, t.select(0));
        } else {
            asm!(self).op_discard(false, t.select(0));
        }
        self.kills = true;

        asm!(self).op_endif();
        self.pop_temp();
    }

    /// Samples covered by the alpha of color 0 into `mask.x`, bit `2y + x`
    /// for the sample at `(x, y)` of the pixel.
    ///
    /// Sample `i` is covered when alpha reaches `(offset_i + 0.5) / count`,
    /// with the 2-bit offsets of the dithering pattern in `alpha_to_mask`.
    pub(super) fn emit_alpha_to_coverage_mask(&mut self, mask: u32, color: u32) {
        let (m, md) = (Src::r(mask, Src::XYZW), Dest::r(mask, 0b1111));
        let count = self.push_temp(0);
        let c = Src::r(count, Src::XYZW);

        let offsets = self.system_constant_scalar(SystemConstantIndex::AlphaToMask, 0);
        asm!(self).op_ubfe(md, Src::lu(2), Src::lu4(0, 2, 4, 6), offsets);
        asm!(self).op_utof(md, m);
        let log2_x = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 0);
        let log2_y = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 4);
        asm!(self).op_iadd(Dest::r(count, 0b0001), log2_x, log2_y);
        asm!(self).op_ishl(Dest::r(count, 0b0001), Src::lu(1), c.select(0));
        asm!(self).op_utof(Dest::r(count, 0b0001), c.select(0));
        asm!(self).op_add(md, m, Src::lf(0.5), false);
        asm!(self).op_div(md, m, c.select(0));
        // NaN alpha covers nothing.
        asm!(self).op_ge(md, Src::r(color, Src::WWWW), m);

        // Only the samples that exist.
        asm!(self).op_movc(Dest::r(count, 0b1111), log2_y, Src::lu4(1, 0, 4, 0), Src::lu4(1, 0, 0, 0));
        asm!(self).op_movc(Dest::r(count, 0b1111), log2_x, Src::lu4(1, 2, 4, 8), c);
        asm!(self).op_and(md, m, c);
        asm!(self).op_or(Dest::r(mask, 0b0011), m, m.swizzle(0b11_10_11_10));
        asm!(self).op_or(Dest::r(mask, 0b0001), m.select(0), m.select(1));
        self.pop_temp();
    }

    /// Converts a mask of guest sample positions in `mask.x` to host sample
    /// indices, in place.
    ///
    /// Host 4x samples are in the same order. Host 2x samples are bottom
    /// then top; without 2x support, the guest samples are the top-right and
    /// bottom-left of 4x.
    fn emit_guest_to_host_samples(&mut self, mask: u32) {
        let m = Src::r(mask, Src::XXXX);
        let temp = self.push_temp(0);
        let t = Src::r(temp, Src::XYZW);
        asm!(self).op_ubfe(Dest::r(temp, 0b0011), Src::lu(1), Src::lu4(0, 2, 0, 0), m);
        if self.config.msaa_2x_supported {
            asm!(self).op_bfi(Dest::r(temp, 0b0001), Src::lu(1), Src::lu(1), t.select(0), t.select(1));
        } else {
            asm!(self).op_ishl(Dest::r(temp, 0b0001), t.select(0), Src::lu(1));
            asm!(self).op_ishl(Dest::r(temp, 0b0010), t.select(1), Src::lu(2));
            asm!(self).op_or(Dest::r(temp, 0b0001), t.select(0), t.select(1));
        }
        let log2_x = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 0);
        let log2_y = self.system_constant_scalar(SystemConstantIndex::SampleCountLog2, 4);
        asm!(self).op_movc(Dest::r(temp, 0b0001), log2_x, m, t.select(0));
        asm!(self).op_movc(Dest::r(mask, 0b0001), log2_y, t.select(0), m);
        self.pop_temp();
    }

    fn complete_pixel_shader_rtv(&mut self) {
        let written: Vec<(u32, u32)> = (0..MAX_COLOR_RENDER_TARGETS)
            .filter_map(|i| self.sys.colors[i as usize].map(|register| (i, register)))
            .collect();

        if let Some(color) = self.sys.colors[0] {
            // All samples unless alpha to coverage is on.
            self.out_coverage_used = true;
            asm!(self).op_mov(Dest::omask(), Src::lu(u32::MAX), false);
            let temp = self.push_temp(0);
            let flags = self.flags();
            asm!(self).op_and(Dest::r(temp, 0b0001), flags, Src::lu(Flags::ALPHA_TO_COVERAGE.bits()));
            asm!(self).op_if(true, Src::r(temp, Src::XXXX));
            self.emit_alpha_to_coverage_mask(temp, color);
            self.emit_guest_to_host_samples(temp);
            asm!(self).op_mov(Dest::omask(), Src::r(temp, Src::XXXX), false);
            asm!(self).op_endif();
            self.pop_temp();
        }

        for &(i, color) in &written {
            let c = Src::r(color, Src::XYZW);
            let bias = self.system_constant_scalar(SystemConstantIndex::ColorExpBias, 4 * i);
            asm!(self).op_mul(Dest::r(color, 0b1111), c, bias, false);

            let temp = self.push_temp(0);
            let flags = self.flags();
            asm!(self).op_and(
                Dest::r(temp, 0b0001),
                flags,
                Src::lu(1 << (Flags::COLOR_GAMMA_SHIFT + i)),
            );
            asm!(self).op_if(true, Src::r(temp, Src::XXXX));
            self.pop_temp();
            self.emit_gamma(color, true, self.config.gamma_render_target_as_srgb);
            asm!(self).op_endif();
        }

        if !written.is_empty() {
            // Every host target is written, with zero where no guest output
            // maps to it.
            let matches = self.push_temp(0);
            let value = self.push_temp(0);
            for host in 0..MAX_COLOR_RENDER_TARGETS {
                let map = self.system_constant(SystemConstantIndex::ColorOutputMap, 0, Src::XYZW);
                asm!(self).op_ieq(Dest::r(matches, 0b1111), map, Src::lu(host));
                asm!(self).op_mov(Dest::r(value, 0b1111), Src::lf(0.0), false);
                for &(guest, color) in &written {
                    asm!(self).op_movc(
                        Dest::r(value, 0b1111),
                        Src::r(matches, Src::XYZW).select(guest),
                        Src::r(color, Src::XYZW),
                        Src::r(value, Src::XYZW),
                    );
                }
                asm!(self).op_mov(Dest::o(host, 0b1111), Src::r(value, Src::XYZW), false);
            }
            self.pop_temps(2);
        }

        if self.info.writes_depth && self.dsv_is_writing_float24_depth() {
            if let Some(depth) = self.sys.depth_stencil {
                let rounding = if self.depth_stencil_mode() == DepthStencilMode::Float24Rounding {
                    Rounding::NearestEven
                } else {
                    Rounding::TowardZero
                };
                asm!(self).op_mov(Dest::r(depth, 0b0001), Src::r(depth, Src::XXXX), true);
                self.emit_f32_to_small_float(depth, 0b0001, SmallFloat::F20e4, rounding, false);
                self.emit_small_float_to_f32(depth, 0b0001, SmallFloat::F20e4, false);
                self.out_depth_used = true;
                asm!(self).op_mov(Dest::odepth(), Src::r(depth, Src::XXXX), false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xenos_dxbc::test_utils::{decode_container_program, Interpreter, Outcome};
    use xenos_dxbc::Opcode;

    use super::*;
    use crate::codec;
    use crate::config::TranslatorConfig;
    use crate::modification::Modification;
    use crate::shader::{CbufferRegister, ShaderInfo, ShaderStage, Translation};
    use crate::ucode::{
        ExecInstruction, InstructionOperand, InstructionResult, ParsedInstruction, Predication, ResultStorage,
        VectorAluInstruction, VectorOpcode,
    };

    /// Copies r0 to each color in `colors` and r0.x to depth if asked.
    fn translate(config: TranslatorConfig, colors: u32, depth: bool, modification: Modification) -> Translation {
        let exec = ExecInstruction {
            is_end: true,
            ..Default::default()
        };
        let copy = |storage, index, mask| {
            ParsedInstruction::VectorAlu(VectorAluInstruction {
                opcode: VectorOpcode::Max,
                predication: Predication::NONE,
                result: InstructionResult::new(storage, index, mask),
                operands: vec![InstructionOperand::register(0), InstructionOperand::register(0)],
            })
        };
        let mut instructions = vec![ParsedInstruction::Exec(exec)];
        for i in 0..4 {
            if colors & (1 << i) != 0 {
                instructions.push(copy(ResultStorage::Color, i, 0b1111));
            }
        }
        if depth {
            instructions.push(copy(ResultStorage::Depth, 0, 0b0001));
        }
        instructions.push(ParsedInstruction::ExecEnd(exec));

        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.register_count = 1;
        info.writes_color_targets = colors;
        info.writes_depth = depth;
        let mut translator = Translator::new(config).unwrap();
        translator.translate(&instructions, &info, modification).unwrap()
    }

    fn pixel(mode: DepthStencilMode) -> Modification {
        Modification::from(
            Modification::default_pixel()
                .pixel()
                .with_interpolator_mask(1)
                .with_depth_stencil_mode(mode),
        )
    }

    fn set(interpreter: &mut Interpreter, index: SystemConstantIndex, offset: u32, value: u32) {
        let (vector, component) = index.location(offset);
        interpreter.set_constant(CbufferRegister::SystemConstants as u32, vector, component, value);
    }

    /// Runs with r0 = `value` through interpolator 0 and the identity
    /// render target map.
    fn run(translation: &Translation, value: [f32; 4], setup: impl FnOnce(&mut Interpreter)) -> (Interpreter, Outcome) {
        let program = decode_container_program(&translation.dxbc);
        let mut interpreter = Interpreter::new();
        interpreter.inputs = vec![value.map(f32::to_bits), [0; 4], [u32::MAX; 4]];
        for i in 0..4 {
            set(&mut interpreter, SystemConstantIndex::ColorOutputMap, 4 * i, i);
            set(&mut interpreter, SystemConstantIndex::ColorExpBias, 4 * i, 1.0f32.to_bits());
        }
        setup(&mut interpreter);
        let outcome = interpreter.run(&program);
        (interpreter, outcome)
    }

    #[test]
    fn shader_without_outputs_has_an_empty_epilogue() {
        let translation = translate(TranslatorConfig::default(), 0, false, Modification::default_pixel());
        let program = decode_container_program(&translation.dxbc);
        for opcode in [Opcode::Discard, Opcode::MovC, Opcode::IEq, Opcode::Mul] {
            assert_eq!(program.count(opcode), 0, "{opcode:?}");
        }
    }

    #[test]
    fn alpha_test_discards_failing_pixels() {
        let translation = translate(TranslatorConfig::default(), 1, false, pixel(DepthStencilMode::NoModifiers));
        let greater = (Flags::ALPHA_PASS_IF_GREATER | Flags::ALPHA_PASS_IF_EQUAL).bits();
        let setup = |interpreter: &mut Interpreter| {
            set(interpreter, SystemConstantIndex::Flags, 0, greater);
            set(interpreter, SystemConstantIndex::AlphaTestReference, 0, 0.5f32.to_bits());
        };
        let (_, outcome) = run(&translation, [1.0, 1.0, 1.0, 0.25], setup);
        assert_eq!(outcome, Outcome::Discarded);
        let (_, outcome) = run(&translation, [1.0, 1.0, 1.0, 0.5], setup);
        assert_eq!(outcome, Outcome::Returned);
        // Never passing with all function bits clear, always passing with all
        // of them set.
        let (_, outcome) = run(&translation, [1.0; 4], |_| {});
        assert_eq!(outcome, Outcome::Discarded);
        let always = (Flags::ALPHA_PASS_IF_LESS | Flags::ALPHA_PASS_IF_EQUAL | Flags::ALPHA_PASS_IF_GREATER).bits();
        let (_, outcome) = run(&translation, [f32::NAN; 4], |i| set(i, SystemConstantIndex::Flags, 0, always));
        assert_eq!(outcome, Outcome::Returned);
    }

    const ALWAYS: Flags = Flags::ALPHA_PASS_IF_LESS
        .union(Flags::ALPHA_PASS_IF_EQUAL)
        .union(Flags::ALPHA_PASS_IF_GREATER);

    #[test]
    fn colors_are_biased_and_remapped() {
        let translation = translate(TranslatorConfig::default(), 0b0011, false, pixel(DepthStencilMode::NoModifiers));
        let (state, outcome) = run(&translation, [0.25, 0.5, 0.75, 1.0], |i| {
            set(i, SystemConstantIndex::Flags, 0, ALWAYS.bits());
            set(i, SystemConstantIndex::ColorExpBias, 4, 4.0f32.to_bits());
            // Guest 0 to host 2, guest 1 to host 0.
            set(i, SystemConstantIndex::ColorOutputMap, 0, 2);
            set(i, SystemConstantIndex::ColorOutputMap, 4, 0);
            set(i, SystemConstantIndex::ColorOutputMap, 8, u32::MAX);
            set(i, SystemConstantIndex::ColorOutputMap, 12, u32::MAX);
        });
        assert_eq!(outcome, Outcome::Returned);
        assert_eq!(state.outputs[0], [1.0f32, 2.0, 3.0, 4.0].map(f32::to_bits));
        assert_eq!(state.outputs[1], [0; 4]);
        assert_eq!(state.outputs[2], [0.25f32, 0.5, 0.75, 1.0].map(f32::to_bits));
        assert_eq!(state.outputs[3], [0; 4]);
        assert_eq!(state.output_coverage, Some(u32::MAX));
    }

    #[test]
    fn gamma_is_applied_per_target() {
        let translation = translate(TranslatorConfig::default(), 0b0011, false, pixel(DepthStencilMode::NoModifiers));
        let (state, _) = run(&translation, [0.1, 0.3, 0.8, 0.5], |i| {
            set(i, SystemConstantIndex::Flags, 0, (ALWAYS | Flags::COLOR_1_GAMMA).bits());
        });
        assert_eq!(state.outputs[0], [0.1f32, 0.3, 0.8, 0.5].map(f32::to_bits));
        let encoded = state.outputs[1].map(f32::from_bits);
        assert!((encoded[0] - 0.325).abs() < 1e-5, "{encoded:?}");
        assert!((encoded[1] - 0.55).abs() < 1e-5, "{encoded:?}");
        assert!((encoded[2] - 0.9).abs() < 1e-5, "{encoded:?}");
        assert_eq!(encoded[3], 0.5);
    }

    #[test]
    fn alpha_to_coverage_uses_the_dither_thresholds() {
        let translation = translate(TranslatorConfig::default(), 1, false, pixel(DepthStencilMode::NoModifiers));
        let flags = (ALWAYS | Flags::ALPHA_TO_COVERAGE).bits();
        // 4x with offsets 0, 1, 2, 3: thresholds 0.125, 0.375, 0.625, 0.875.
        let four = |alpha: f32| {
            run(&translation, [0.0, 0.0, 0.0, alpha], |i| {
                set(i, SystemConstantIndex::Flags, 0, flags);
                set(i, SystemConstantIndex::SampleCountLog2, 0, 1);
                set(i, SystemConstantIndex::SampleCountLog2, 4, 1);
                set(i, SystemConstantIndex::AlphaToMask, 0, 0b11_10_01_00);
            })
            .0
            .output_coverage
        };
        assert_eq!(four(0.1), Some(0));
        assert_eq!(four(0.4), Some(0b0011));
        assert_eq!(four(0.875), Some(0b1111));
        // 2x: only the top sample (host sample 1) at 0.25, both at 0.75.
        let two = |alpha: f32| {
            run(&translation, [0.0, 0.0, 0.0, alpha], |i| {
                set(i, SystemConstantIndex::Flags, 0, flags);
                set(i, SystemConstantIndex::SampleCountLog2, 4, 1);
                set(i, SystemConstantIndex::AlphaToMask, 0, 0b01_00_00);
            })
            .0
            .output_coverage
        };
        assert_eq!(two(0.3), Some(0b10));
        assert_eq!(two(0.8), Some(0b11));
    }

    #[test]
    fn alpha_to_coverage_without_host_2x_uses_4x_samples() {
        let config = TranslatorConfig {
            msaa_2x_supported: false,
            ..Default::default()
        };
        let translation = translate(config, 1, false, pixel(DepthStencilMode::NoModifiers));
        let (state, _) = run(&translation, [0.0, 0.0, 0.0, 1.0], |i| {
            set(i, SystemConstantIndex::Flags, 0, (ALWAYS | Flags::ALPHA_TO_COVERAGE).bits());
            set(i, SystemConstantIndex::SampleCountLog2, 4, 1);
        });
        assert_eq!(state.output_coverage, Some(0b0110));
    }

    #[test]
    fn float24_depth_is_round_tripped() {
        let value = 0.3f32;
        for (mode, rounding) in [
            (DepthStencilMode::Float24Truncating, Rounding::TowardZero),
            (DepthStencilMode::Float24Rounding, Rounding::NearestEven),
        ] {
            let translation = translate(TranslatorConfig::default(), 0, true, pixel(mode));
            let (state, _) = run(&translation, [value; 4], |_| {});
            let expected = codec::f20e4_to_f32(codec::f32_to_20e4(value, rounding, false), false);
            assert_eq!(state.output_depth, Some(expected.to_bits()), "{mode:?}");
        }
        let translation = translate(TranslatorConfig::default(), 0, true, pixel(DepthStencilMode::NoModifiers));
        let (state, _) = run(&translation, [value; 4], |_| {});
        assert_eq!(state.output_depth, Some(value.to_bits()));
    }
}
