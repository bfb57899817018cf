//! Texture fetches and the texture LOD and gradient registers.
//!
//! 1D and 2D textures are sampled through 2D array views. `tfetch3D` samples
//! the 3D view or the 2D array one depending on the dimension in the fetch
//! constant, since the guest can bind either. Cube coordinates arrive in the
//! layout the `cube` instruction produces and are turned back into a
//! direction.

use tracing::trace;
use xenos_dxbc::{Dest, Index, Src};

use super::{srv, Translator};
use crate::bindings::Lookup;
use crate::error::DiagnosticKind;
use crate::shader::CbufferRegister;
use crate::system_constants::SystemConstantIndex;
use crate::ucode::{InstructionOperand, TextureFetchAttributes, TextureFetchInstruction, TextureFetchOpcode};
use crate::xenos::{fetch, TextureDimension, TextureFilter, TextureSign};

/// A 2D array address with the layer in `w`.
const XYWW: u32 = 0b11_11_01_00;
const XXYY: u32 = 0b01_01_00_00;
const XYXY: u32 = 0b01_00_01_00;
/// Bits of 1.0.
const ONE_BITS: u32 = 0x3F80_0000;
/// Added to texel coordinates of sampling fetches so that coordinates exactly
/// between two texels pick the same one under point filtering as on the
/// guest. A quarter of a unit of subpixel precision, so rounding to fixed
/// point is unaffected.
const TEXEL_CENTER_EPSILON: f32 = 1.0 / 1024.0;

/// Where the mip level of a `tfetch` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LodSource {
    /// The derivatives of the coordinates.
    Computed,
    /// `setTexLOD`.
    Register,
    /// `setGradientH` and `setGradientV`.
    RegisterGradients,
    /// Only the bias.
    Bias,
}

fn lod_source(attributes: &TextureFetchAttributes, is_pixel_shader: bool) -> LodSource {
    if attributes.use_register_lod {
        LodSource::Register
    } else if attributes.use_register_gradients {
        LodSource::RegisterGradients
    } else if attributes.use_computed_lod && is_pixel_shader {
        LodSource::Computed
    } else {
        LodSource::Bias
    }
}

/// Operands selecting the mip level of a sampling instruction.
#[derive(Debug, Clone, Copy)]
enum Lod {
    Computed { bias: f32 },
    Explicit(Src),
    Gradients { ddx: Src, ddy: Src },
}

/// Whether the layers of a stacked texture are blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayerBlend {
    Never,
    Always,
    /// Per the volume filters in the fetch constant.
    FetchConstant,
}

fn layer_blend(attributes: &TextureFetchAttributes) -> LayerBlend {
    let filters = [attributes.vol_mag_filter, attributes.vol_min_filter];
    if filters.contains(&TextureFilter::Linear) {
        LayerBlend::Always
    } else if filters.contains(&TextureFilter::UseFetchConst) {
        LayerBlend::FetchConstant
    } else {
        LayerBlend::Never
    }
}

/// Components of the coordinates a dimension uses.
fn coordinate_mask(dimension: TextureDimension) -> u32 {
    match dimension {
        TextureDimension::D1 => 0b0001,
        TextureDimension::D2 => 0b0011,
        TextureDimension::D3 | TextureDimension::Cube => 0b0111,
    }
}

/// Components that are texel coordinates, and so are scaled by the size and
/// offset. The cube face is not.
fn texel_mask(dimension: TextureDimension) -> u32 {
    match dimension {
        TextureDimension::Cube => 0b0011,
        other => coordinate_mask(other),
    }
}

/// Coordinates the host derivatives of a view cover.
fn derivative_components(dimension: TextureDimension) -> u32 {
    match dimension {
        TextureDimension::D1 | TextureDimension::D2 => 2,
        TextureDimension::D3 | TextureDimension::Cube => 3,
    }
}

/// The unsigned and signed views of one texture dimension.
#[derive(Debug, Clone, Copy)]
struct Views {
    unsigned: Src,
    signed: Src,
}

/// Temps holding the per-component signedness of a fetch.
#[derive(Debug, Clone, Copy)]
struct Signs {
    /// [`TextureSign`] of each component.
    signs: u32,
    /// Components read from the signed view.
    is_signed: u32,
    /// Any component signed in x, all signed in y.
    any_all: u32,
    /// The value from the signed view, when merging.
    signed_value: u32,
}

/// Temp components receiving bindless descriptor indices.
#[derive(Debug)]
struct DescriptorSlots {
    first: u32,
    count: u32,
    next: u32,
}

impl DescriptorSlots {
    fn next(&mut self) -> (u32, u32) {
        let i = self.next;
        self.next += 1;
        debug_assert!(i < self.count * 4);
        (self.first + i / 4, i % 4)
    }
}

impl Translator {
    pub(super) fn process_texture_fetch(&mut self, instr: &TextureFetchInstruction) {
        trace!(
            opcode = ?instr.opcode,
            dimension = ?instr.dimension,
            fetch_constant = instr.fetch_constant,
            "texture fetch"
        );
        match instr.opcode {
            TextureFetchOpcode::SetTextureLod => {
                let temp = self.sys.grad_h_lod;
                return self.set_texture_register(instr, temp, 0b1000);
            }
            TextureFetchOpcode::SetGradientsHorz => {
                let temp = self.sys.grad_h_lod;
                return self.set_texture_register(instr, temp, 0b0111);
            }
            TextureFetchOpcode::SetGradientsVert => {
                let temp = self.sys.grad_v_vfetch_address;
                return self.set_texture_register(instr, temp, 0b0111);
            }
            TextureFetchOpcode::GetBorderColorFrac => {
                self.update_instruction_predication(instr.predication);
                self.report(
                    DiagnosticKind::SpecificationViolation,
                    format!("getBCF of tf{} is not supported, returning 0", instr.fetch_constant),
                );
                self.store_result(&instr.result, Src::lf(0.0), false);
                return;
            }
            _ => {}
        }

        let used = instr.result.used_result_components();
        let Some(operand) = instr.operand.as_ref().filter(|_| used != 0) else {
            self.update_instruction_predication(instr.predication);
            return;
        };

        let is_pixel_shader = self.is_pixel_shader();
        // Derivatives only exist in pixel shaders.
        if !is_pixel_shader
            && matches!(
                instr.opcode,
                TextureFetchOpcode::GetComputedTexLod | TextureFetchOpcode::GetGradients
            )
        {
            self.update_instruction_predication(instr.predication);
            self.store_result(&instr.result, Src::lf(0.0), false);
            return;
        }

        let attributes = &instr.attributes;
        if instr.opcode == TextureFetchOpcode::GetComputedTexLod
            && (attributes.use_register_lod || attributes.use_register_gradients)
        {
            self.report(
                DiagnosticKind::SpecificationViolation,
                "getCompTexLOD with an explicit LOD or gradients, using the computed one".to_owned(),
            );
        }

        let lod_source = lod_source(attributes, is_pixel_shader);
        let takes_derivatives = is_pixel_shader
            && match instr.opcode {
                TextureFetchOpcode::GetComputedTexLod | TextureFetchOpcode::GetGradients => true,
                TextureFetchOpcode::TextureFetch => lod_source == LodSource::Computed,
                _ => false,
            };
        // Helper lanes of the quad must run the derivative part even when the
        // instruction is predicated off for them.
        let suspended = if takes_derivatives {
            Some(self.begin_unconditional())
        } else {
            self.update_instruction_predication(instr.predication);
            None
        };

        let (value, pushed) = match instr.opcode {
            TextureFetchOpcode::GetGradients => self.emit_get_gradients(instr, operand),
            TextureFetchOpcode::GetWeights => self.emit_get_weights(instr, operand),
            TextureFetchOpcode::GetComputedTexLod => self.emit_get_computed_lod(instr, operand),
            _ => self.emit_texture_sample(instr, operand, lod_source),
        };

        if let Some(suspended) = &suspended {
            self.resume_conditionals(suspended);
            self.update_instruction_predication(instr.predication);
        }
        self.store_result(&instr.result, value, false);
        self.pop_temps(pushed);
        if let Some(suspended) = suspended {
            self.end_unconditional(suspended);
        }
    }

    /// `setTexLOD`, `setGradientH` and `setGradientV`.
    fn set_texture_register(&mut self, instr: &TextureFetchInstruction, temp: u32, mask: u32) {
        self.update_instruction_predication(instr.predication);
        let Some(operand) = &instr.operand else {
            return;
        };
        if mask == 0b1000 {
            let loaded = self.load_operand(operand, 0b0001);
            asm!(self).op_mov(Dest::r(temp, mask), loaded.src.select_from_swizzled(0), false);
            self.release(loaded);
        } else {
            let loaded = self.load_operand(operand, mask);
            asm!(self).op_mov(Dest::r(temp, mask), loaded.src, false);
            self.release(loaded);
        }
    }

    // Bindings.

    /// Pushes temps for `count` bindless descriptor indices.
    fn push_descriptor_slots(&mut self, count: u32) -> Option<DescriptorSlots> {
        if !self.config.bindless_resources_used {
            return None;
        }
        let temps = count.div_ceil(4);
        let first = self.push_temps(temps, 0);
        Some(DescriptorSlots {
            first,
            count: temps,
            next: 0,
        })
    }

    fn bind_texture(
        &mut self,
        fetch_constant: u32,
        dimension: TextureDimension,
        is_signed: bool,
        is_sign_required: bool,
        slots: &mut Option<DescriptorSlots>,
    ) -> Src {
        let lookup = self
            .bindings
            .find_or_add_texture(fetch_constant, dimension, is_signed, is_sign_required);
        if let Lookup::Clamped(slot) = lookup {
            self.report(
                DiagnosticKind::ResourceBudgetExceeded,
                format!("texture binding table is full, tf{fetch_constant} reuses slot {slot}"),
            );
        }
        let slot = lookup.slot();
        let Some(slots) = slots.as_mut() else {
            let register = srv::FIRST_TEXTURE + slot;
            return Src::t(register, Index::imm(register), Src::XYZW);
        };
        let descriptor_index = self.bindings.textures[slot as usize].descriptor_index;
        let (temp, component) = slots.next();
        let index = self
            .cbuffer_src(
                CbufferRegister::DescriptorIndices,
                Index::imm(descriptor_index >> 2),
                Src::XYZW,
            )
            .select(descriptor_index & 3);
        asm!(self).op_mov(Dest::r(temp, 1 << component), index, false);
        let range = match dimension {
            TextureDimension::D1 | TextureDimension::D2 => srv::BINDLESS_2D_ARRAY,
            TextureDimension::D3 => srv::BINDLESS_3D,
            TextureDimension::Cube => srv::BINDLESS_CUBE,
        };
        self.bindless_srvs_used |= 1 << range;
        Src::t(range, Index::relative(temp, component, 0), Src::XYZW)
    }

    fn bind_sampler(
        &mut self,
        fetch_constant: u32,
        attributes: &TextureFetchAttributes,
        slots: &mut Option<DescriptorSlots>,
    ) -> Src {
        let lookup = self.bindings.find_or_add_sampler(
            fetch_constant,
            attributes.mag_filter,
            attributes.min_filter,
            attributes.mip_filter,
            attributes.aniso_filter,
        );
        if let Lookup::Clamped(slot) = lookup {
            self.report(
                DiagnosticKind::ResourceBudgetExceeded,
                format!("sampler binding table is full, tf{fetch_constant} reuses slot {slot}"),
            );
        }
        let slot = lookup.slot();
        let Some(slots) = slots.as_mut() else {
            return Src::s(slot, Index::imm(slot));
        };
        let descriptor_index = self.bindings.samplers[slot as usize].descriptor_index;
        let (temp, component) = slots.next();
        let index = self
            .cbuffer_src(
                CbufferRegister::DescriptorIndices,
                Index::imm(descriptor_index >> 2),
                Src::XYZW,
            )
            .select(descriptor_index & 3);
        asm!(self).op_mov(Dest::r(temp, 1 << component), index, false);
        self.bindless_samplers_used = true;
        Src::s(0, Index::relative(temp, component, 0))
    }

    // Coordinates.

    /// Copies the `mask` components of the operand to `coord`, zeroing the
    /// rest.
    fn load_coordinates(&mut self, operand: &InstructionOperand, mask: u32, coord: u32) {
        let loaded = self.load_operand(operand, mask);
        asm!(self).op_mov(Dest::r(coord, mask), loaded.src, false);
        self.release(loaded);
        if mask != 0b1111 {
            asm!(self).op_mov(Dest::r(coord, 0b1111 & !mask), Src::lf(0.0), false);
        }
    }

    /// Texture size in texels to `size.xyz` as floats, 1 for the cube face.
    /// For 3D fetches `size.w` is whether the texture is 3D rather than
    /// stacked.
    fn emit_texture_size(&mut self, fetch_constant: u32, dimension: TextureDimension, size: u32) {
        let dword2 = self.texture_fetch_constant_dword(fetch_constant, 2);
        let size_src = Src::r(size, Src::XYZW);
        let (w2, h2, d2) = (fetch::SIZE_2D_WIDTH, fetch::SIZE_2D_HEIGHT, fetch::SIZE_2D_STACK_DEPTH);
        if dimension == TextureDimension::D3 {
            let dword5 = self.texture_fetch_constant_dword(fetch_constant, 5);
            asm!(self).op_ubfe(Dest::r(size, 0b1000), Src::lu(2), Src::lu(fetch::DIMENSION_SHIFT), dword5);
            asm!(self).op_ieq(
                Dest::r(size, 0b1000),
                size_src.select(3),
                Src::lu(TextureDimension::D3 as u32),
            );
            asm!(self).op_if(true, size_src.select(3));
            let (w3, h3, d3) = (fetch::SIZE_3D_WIDTH, fetch::SIZE_3D_HEIGHT, fetch::SIZE_3D_DEPTH);
            asm!(self).op_ubfe(
                Dest::r(size, 0b0111),
                Src::lu4(w3.0, h3.0, d3.0, 0),
                Src::lu4(w3.1, h3.1, d3.1, 0),
                dword2,
            );
            asm!(self).op_else();
            asm!(self).op_ubfe(
                Dest::r(size, 0b0111),
                Src::lu4(w2.0, h2.0, d2.0, 0),
                Src::lu4(w2.1, h2.1, d2.1, 0),
                dword2,
            );
            asm!(self).op_endif();
        } else {
            asm!(self).op_ubfe(
                Dest::r(size, 0b0011),
                Src::lu4(w2.0, h2.0, 0, 0),
                Src::lu4(w2.1, h2.1, 0, 0),
                dword2,
            );
            asm!(self).op_mov(Dest::r(size, 0b0100), Src::lu(0), false);
        }
        // Stored minus one.
        asm!(self).op_iadd(Dest::r(size, 0b0111), size_src, Src::lu(1));
        asm!(self).op_utof(Dest::r(size, 0b0111), size_src);
    }

    /// Applies the texel offsets and makes unnormalized coordinates
    /// normalized.
    fn emit_normalize_coordinates(&mut self, coord: u32, size: u32, mask: u32, unnormalized: bool, offsets: [f32; 3]) {
        let coord_src = Src::r(coord, Src::XYZW);
        let size_src = Src::r(size, Src::XYZW);
        let [ox, oy, oz] = offsets;
        let offset = Src::lf4(ox, oy, oz, 0.0);
        let has_offset = offsets != [0.0; 3];
        if unnormalized {
            if has_offset {
                asm!(self).op_add(Dest::r(coord, mask), coord_src, offset, false);
            }
            asm!(self).op_div(Dest::r(coord, mask), coord_src, size_src);
        } else if has_offset {
            let scratch = self.push_temp(0);
            asm!(self).op_div(Dest::r(scratch, mask), offset, size_src);
            asm!(self).op_add(Dest::r(coord, mask), coord_src, Src::r(scratch, Src::XYZW), false);
            self.pop_temp();
        }
    }

    /// Turns `(S, T, face)` in `coord.xyz`, with S and T in [0, 1], into a
    /// direction for sampling a cube view.
    ///
    /// Faces are +X, -X, +Y, -Y, +Z, -Z. With `m` being 1 or -1 for the
    /// sign of the major axis, the direction is `(m, -T, -S·m)` for X,
    /// `(S, m, T·m)` for Y and `(S·m, -T, m)` for Z.
    fn emit_cube_direction(&mut self, coord: u32) {
        let c = Src::r(coord, Src::XYZW);
        asm!(self).op_mad(Dest::r(coord, 0b0011), c, Src::lf(2.0), Src::lf(-1.0), false);
        asm!(self).op_max(Dest::r(coord, 0b0100), c.select(2), Src::lf(0.0));
        asm!(self).op_min(Dest::r(coord, 0b0100), c.select(2), Src::lf(5.0));

        let face = self.push_temp(0);
        let f = Src::r(face, Src::XYZW);
        asm!(self).op_ftou(Dest::r(face, 0b0001), c.select(2));
        // Major axis in x, negative in w.
        asm!(self).op_ubfe(Dest::r(face, 0b1001), Src::lu4(2, 0, 0, 1), Src::lu4(1, 0, 0, 0), f.select(0));
        asm!(self).op_ieq(Dest::r(face, 0b0111), f.select(0), Src::lu4(0, 1, 2, 0));
        asm!(self).op_movc(Dest::r(coord, 0b0100), f.select(3), Src::lf(-1.0), Src::lf(1.0));

        let products = self.push_temps(2, 0);
        let direction = products + 1;
        let p = Src::r(products, Src::XYZW);
        let d = Src::r(direction, Src::XYZW);
        asm!(self).op_mul(Dest::r(products, 0b0011), c, c.select(2), false);
        asm!(self).op_mov(Dest::r(direction, 0b0001), p.select(0), false);
        asm!(self).op_mov(Dest::r(direction, 0b0010), -c.select(1), false);
        asm!(self).op_mov(Dest::r(direction, 0b0100), c.select(2), false);
        // S and m in xy.
        asm!(self).op_movc(Dest::r(direction, 0b0011), f.select(1), Src::r(coord, 0b00_00_10_00), d);
        asm!(self).op_movc(Dest::r(direction, 0b0100), f.select(1), p.select(1), d);
        asm!(self).op_movc(Dest::r(direction, 0b0001), f.select(0), c.select(2), d);
        asm!(self).op_movc(Dest::r(direction, 0b0100), f.select(0), -p.select(0), d);
        asm!(self).op_mov(Dest::r(coord, 0b0111), d, false);
        self.pop_temps(3);
    }

    /// Loads and transforms the coordinates of a sampling fetch, returning
    /// the coordinate temp and the size temp, if the size was needed. Both
    /// are pushed, the coordinate one first.
    fn emit_fetch_coordinates(&mut self, instr: &TextureFetchInstruction, operand: &InstructionOperand) -> (u32, Option<u32>) {
        let attributes = &instr.attributes;
        let dimension = instr.dimension;
        let coord = self.push_temp(0);
        self.load_coordinates(operand, coordinate_mask(dimension), coord);

        let mask = texel_mask(dimension);
        let offsets: [f32; 3] = std::array::from_fn(|i| {
            if mask & (1 << i) != 0 {
                attributes.offset[i] + TEXEL_CENTER_EPSILON
            } else {
                0.0
            }
        });
        let needs_size = attributes.unnormalized_coordinates
            || offsets != [0.0; 3]
            || dimension == TextureDimension::D3;
        let size = needs_size.then(|| self.push_temp(0));
        if let Some(size) = size {
            self.emit_texture_size(instr.fetch_constant, dimension, size);
            self.emit_normalize_coordinates(coord, size, mask, attributes.unnormalized_coordinates, offsets);
        }

        match (dimension, size) {
            (TextureDimension::Cube, _) => self.emit_cube_direction(coord),
            (TextureDimension::D3, Some(size)) => {
                // The stacked layer with layer centers at integers.
                asm!(self).op_mad(
                    Dest::r(coord, 0b1000),
                    Src::r(coord, Src::ZZZZ),
                    Src::r(size, Src::ZZZZ),
                    Src::lf(-0.5),
                    false,
                );
            }
            _ => {}
        }
        (coord, size)
    }

    // Sampling.

    fn emit_sample(&mut self, dest: u32, address: Src, resource: Src, sampler: Src, lod: Lod, derivatives: u32) {
        let dest = Dest::r(dest, 0b1111);
        match lod {
            Lod::Computed { bias } if bias == 0.0 => {
                asm!(self).op_sample(dest, address, 3, resource, sampler, [0; 3]);
            }
            Lod::Computed { bias } => {
                asm!(self).op_sample_b(dest, address, 3, resource, sampler, Src::lf(bias), [0; 3]);
            }
            Lod::Explicit(lod) => {
                asm!(self).op_sample_l(dest, address, 3, resource, sampler, lod, [0; 3]);
            }
            Lod::Gradients { ddx, ddy } => {
                asm!(self).op_sample_d(dest, address, 3, resource, sampler, ddx, ddy, derivatives, [0; 3]);
            }
        }
    }

    /// Samples the views a fetch needs per the runtime signedness: only the
    /// unsigned one, only the signed one, or both merged per component.
    #[allow(clippy::too_many_arguments)]
    fn emit_signed_sample(
        &mut self,
        value: u32,
        address: Src,
        views: Views,
        sampler: Src,
        lod: Lod,
        derivatives: u32,
        signs: Signs,
    ) {
        let flags = Src::r(signs.any_all, Src::XYZW);
        asm!(self).op_if(true, flags.select(0));
        asm!(self).op_if(true, flags.select(1));
        self.emit_sample(value, address, views.signed, sampler, lod, derivatives);
        asm!(self).op_else();
        self.emit_sample(value, address, views.unsigned, sampler, lod, derivatives);
        self.emit_sample(signs.signed_value, address, views.signed, sampler, lod, derivatives);
        asm!(self).op_movc(
            Dest::r(value, 0b1111),
            Src::r(signs.is_signed, Src::XYZW),
            Src::r(signs.signed_value, Src::XYZW),
            Src::r(value, Src::XYZW),
        );
        asm!(self).op_endif();
        asm!(self).op_else();
        self.emit_sample(value, address, views.unsigned, sampler, lod, derivatives);
        asm!(self).op_endif();
    }

    /// Runs `fetch` on the view of the fetch dimension, or for 3D fetches on
    /// the 3D or the stacked view chosen by `size.w`.
    #[allow(clippy::too_many_arguments)]
    fn emit_dimension_fetch(
        &mut self,
        value: u32,
        coord: u32,
        size: Option<u32>,
        dimension: TextureDimension,
        primary: Views,
        stacked: Option<Views>,
        blend: LayerBlend,
        fetch_constant: u32,
        fetch: impl Fn(&mut Self, u32, Src, Views, u32),
    ) {
        let coord_src = Src::r(coord, Src::XYZW);
        let (Some(stacked), Some(size)) = (stacked, size) else {
            fetch(self, value, coord_src, primary, derivative_components(dimension));
            return;
        };
        asm!(self).op_if(true, Src::r(size, Src::WWWW));
        fetch(self, value, coord_src, primary, 3);
        asm!(self).op_else();

        let address = Src::r(coord, XYWW);
        if blend == LayerBlend::FetchConstant {
            let dword4 = self.texture_fetch_constant_dword(fetch_constant, 4);
            asm!(self).op_and(
                Dest::r(size, 0b1000),
                dword4,
                Src::lu(1 << fetch::VOL_MAG_FILTER_SHIFT | 1 << fetch::VOL_MIN_FILTER_SHIFT),
            );
            asm!(self).op_if(true, Src::r(size, Src::WWWW));
        }
        if blend == LayerBlend::Never {
            fetch(self, value, address, stacked, 2);
        } else {
            // Host arrays don't filter between layers.
            let weight = Src::r(size, Src::WWWW);
            asm!(self).op_frc(Dest::r(size, 0b1000), coord_src.select(3));
            asm!(self).op_add(Dest::r(coord, 0b1000), coord_src.select(3), -weight, false);
            fetch(self, value, address, stacked, 2);
            asm!(self).op_add(Dest::r(coord, 0b1000), coord_src.select(3), Src::lf(1.0), false);
            let next = self.push_temp(0);
            let next_src = Src::r(next, Src::XYZW);
            fetch(self, next, address, stacked, 2);
            asm!(self).op_add(Dest::r(next, 0b1111), next_src, -Src::r(value, Src::XYZW), false);
            asm!(self).op_mad(Dest::r(value, 0b1111), next_src, weight, Src::r(value, Src::XYZW), false);
            self.pop_temp();
        }
        if blend == LayerBlend::FetchConstant {
            asm!(self).op_else();
            fetch(self, value, address, stacked, 2);
            asm!(self).op_endif();
        }

        asm!(self).op_endif();
    }

    /// Pushes the sign temps and fills them from fetch constant dword 0.
    fn emit_sign_selection(&mut self, fetch_constant: u32) -> Signs {
        let first = self.push_temps(4, 0);
        let signs = Signs {
            signs: first,
            is_signed: first + 1,
            any_all: first + 2,
            signed_value: first + 3,
        };
        let dword0 = self.texture_fetch_constant_dword(fetch_constant, 0);
        let shift = fetch::SIGN_SHIFT;
        asm!(self).op_ubfe(
            Dest::r(signs.signs, 0b1111),
            Src::lu(2),
            Src::lu4(shift, shift + 2, shift + 4, shift + 6),
            dword0,
        );
        let is_signed = Src::r(signs.is_signed, Src::XYZW);
        let any_all = Src::r(signs.any_all, Src::XYZW);
        asm!(self).op_ieq(
            Dest::r(signs.is_signed, 0b1111),
            Src::r(signs.signs, Src::XYZW),
            Src::lu(TextureSign::Signed as u32),
        );
        asm!(self).op_and(Dest::r(signs.any_all, 0b1100), is_signed.swizzle(XYXY), is_signed);
        asm!(self).op_or(Dest::r(signs.any_all, 0b0011), is_signed, is_signed.swizzle(0b11_10_11_10));
        asm!(self).op_or(Dest::r(signs.any_all, 0b0001), any_all.select(0), any_all.select(1));
        asm!(self).op_and(Dest::r(signs.any_all, 0b0010), any_all.select(2), any_all.select(3));
        signs
    }

    /// Expands biased components to [-1, 1] and linearizes gamma ones.
    ///
    /// Gamma textures use the piecewise-linear curve, except ones resolved
    /// from a render target when gamma render targets are host sRGB.
    fn emit_sign_conversion(&mut self, fetch_constant: u32, value: u32, signs: Signs) {
        let value_src = Src::r(value, Src::XYZW);
        let signs_src = Src::r(signs.signs, Src::XYZW);
        let mask = Src::r(signs.is_signed, Src::XYZW);
        let scratch = signs.signed_value;
        let scratch_src = Src::r(scratch, Src::XYZW);

        asm!(self).op_ieq(
            Dest::r(signs.is_signed, 0b1111),
            signs_src,
            Src::lu(TextureSign::UnsignedBiased as u32),
        );
        asm!(self).op_mad(Dest::r(scratch, 0b1111), value_src, Src::lf(2.0), Src::lf(-1.0), false);
        asm!(self).op_movc(Dest::r(value, 0b1111), mask, scratch_src, value_src);

        asm!(self).op_ieq(Dest::r(signs.is_signed, 0b0111), signs_src, Src::lu(TextureSign::Gamma as u32));
        let any = Src::r(signs.any_all, Src::XXXX);
        asm!(self).op_or(Dest::r(signs.any_all, 0b0001), mask.select(0), mask.select(1));
        asm!(self).op_or(Dest::r(signs.any_all, 0b0001), any, mask.select(2));
        asm!(self).op_if(true, any);
        asm!(self).op_mov(Dest::r(scratch, 0b0111), value_src, false);
        if self.config.gamma_render_target_as_srgb {
            let resolved = self.system_constant_scalar(SystemConstantIndex::TexturesResolved, 0);
            asm!(self).op_and(Dest::r(signs.any_all, 0b0001), resolved, Src::lu(1 << fetch_constant));
            asm!(self).op_if(true, any);
            self.emit_gamma(scratch, false, true);
            asm!(self).op_else();
            self.emit_gamma(scratch, false, false);
            asm!(self).op_endif();
        } else {
            self.emit_gamma(scratch, false, false);
        }
        asm!(self).op_movc(Dest::r(value, 0b0111), mask, scratch_src, value_src);
        asm!(self).op_endif();
    }

    /// Multiplies `value` by 2 to the power of the exponent adjustment in
    /// the fetch constant.
    fn emit_exp_adjust(&mut self, fetch_constant: u32, value: u32) {
        let dword3 = self.texture_fetch_constant_dword(fetch_constant, 3);
        let scale = self.push_temp(0);
        let scale_src = Src::r(scale, Src::XXXX);
        let (width, offset) = fetch::EXP_ADJUST;
        asm!(self).op_ibfe(Dest::r(scale, 0b0001), Src::lu(width), Src::lu(offset), dword3);
        asm!(self).op_ishl(Dest::r(scale, 0b0001), scale_src, Src::lu(23));
        asm!(self).op_iadd(Dest::r(scale, 0b0001), scale_src, Src::lu(ONE_BITS));
        asm!(self).op_mul(Dest::r(value, 0b1111), Src::r(value, Src::XYZW), scale_src, false);
        self.pop_temp();
    }

    /// Gradients from `setGradientH` and `setGradientV`, in normalized
    /// coordinates and scaled for the LOD bias.
    fn emit_register_gradients(&mut self, size: Option<u32>, attributes: &TextureFetchAttributes, pushed: &mut u32) -> Lod {
        let ddx = Src::r(self.sys.grad_h_lod, Src::XYZW);
        let ddy = Src::r(self.sys.grad_v_vfetch_address, Src::XYZW);
        let size = size.filter(|_| attributes.unnormalized_coordinates);
        if size.is_none() && attributes.lod_bias == 0.0 {
            return Lod::Gradients { ddx, ddy };
        }
        let first = self.push_temps(2, 0);
        *pushed += 2;
        for (temp, src) in [(first, ddx), (first + 1, ddy)] {
            let temp_src = Src::r(temp, Src::XYZW);
            asm!(self).op_mov(Dest::r(temp, 0b0111), src, false);
            if let Some(size) = size {
                asm!(self).op_div(Dest::r(temp, 0b0111), temp_src, Src::r(size, Src::XYZW));
            }
            if attributes.lod_bias != 0.0 {
                // LOD is the log2 of the gradient length.
                asm!(self).op_mul(Dest::r(temp, 0b0111), temp_src, Src::lf(attributes.lod_bias.exp2()), false);
            }
        }
        Lod::Gradients {
            ddx: Src::r(first, Src::XYZW),
            ddy: Src::r(first + 1, Src::XYZW),
        }
    }

    /// `tfetch`. Returns the value and the number of temps to pop after
    /// storing it.
    fn emit_texture_sample(
        &mut self,
        instr: &TextureFetchInstruction,
        operand: &InstructionOperand,
        lod_source: LodSource,
    ) -> (Src, u32) {
        let attributes = &instr.attributes;
        let fetch_constant = instr.fetch_constant;
        let dimension = instr.dimension;
        let is_3d = dimension == TextureDimension::D3;

        let mut slots = self.push_descriptor_slots(if is_3d { 5 } else { 3 });
        let mut pushed = slots.as_ref().map_or(0, |slots| slots.count);
        let primary = Views {
            unsigned: self.bind_texture(fetch_constant, dimension, false, false, &mut slots),
            signed: self.bind_texture(fetch_constant, dimension, true, false, &mut slots),
        };
        let stacked = if is_3d {
            Some(Views {
                unsigned: self.bind_texture(fetch_constant, TextureDimension::D2, false, false, &mut slots),
                signed: self.bind_texture(fetch_constant, TextureDimension::D2, true, false, &mut slots),
            })
        } else {
            None
        };
        let sampler = self.bind_sampler(fetch_constant, attributes, &mut slots);

        let (coord, size) = self.emit_fetch_coordinates(instr, operand);
        pushed += 1 + u32::from(size.is_some());

        let lod = match lod_source {
            LodSource::Computed => Lod::Computed {
                bias: attributes.lod_bias,
            },
            LodSource::Bias => Lod::Explicit(Src::lf(attributes.lod_bias)),
            LodSource::Register => {
                let register = Src::r(self.sys.grad_h_lod, Src::WWWW);
                if attributes.lod_bias == 0.0 {
                    Lod::Explicit(register)
                } else {
                    let temp = self.push_temp(0);
                    pushed += 1;
                    asm!(self).op_add(Dest::r(temp, 0b0001), register, Src::lf(attributes.lod_bias), false);
                    Lod::Explicit(Src::r(temp, Src::XXXX))
                }
            }
            LodSource::RegisterGradients => self.emit_register_gradients(size, attributes, &mut pushed),
        };

        let value = self.push_temp(0);
        pushed += 1;
        let signs = self.emit_sign_selection(fetch_constant);
        self.emit_dimension_fetch(
            value,
            coord,
            size,
            dimension,
            primary,
            stacked,
            layer_blend(attributes),
            fetch_constant,
            move |translator, dest, address, views, derivatives| {
                translator.emit_signed_sample(dest, address, views, sampler, lod, derivatives, signs);
            },
        );
        self.emit_sign_conversion(fetch_constant, value, signs);
        self.pop_temps(4);
        self.emit_exp_adjust(fetch_constant, value);
        (Src::r(value, Src::XYZW), pushed)
    }

    /// `getCompTexLOD`: the unclamped LOD from the unsigned view.
    fn emit_get_computed_lod(&mut self, instr: &TextureFetchInstruction, operand: &InstructionOperand) -> (Src, u32) {
        let attributes = &instr.attributes;
        let fetch_constant = instr.fetch_constant;
        let dimension = instr.dimension;
        let is_3d = dimension == TextureDimension::D3;

        let mut slots = self.push_descriptor_slots(if is_3d { 3 } else { 2 });
        let mut pushed = slots.as_ref().map_or(0, |slots| slots.count);
        let unsigned = self.bind_texture(fetch_constant, dimension, false, true, &mut slots);
        let primary = Views {
            unsigned,
            signed: unsigned,
        };
        let stacked = if is_3d {
            let unsigned = self.bind_texture(fetch_constant, TextureDimension::D2, false, true, &mut slots);
            Some(Views {
                unsigned,
                signed: unsigned,
            })
        } else {
            None
        };
        let sampler = self.bind_sampler(fetch_constant, attributes, &mut slots);

        let (coord, size) = self.emit_fetch_coordinates(instr, operand);
        pushed += 1 + u32::from(size.is_some());
        let value = self.push_temp(0);
        pushed += 1;
        self.emit_dimension_fetch(
            value,
            coord,
            size,
            dimension,
            primary,
            stacked,
            LayerBlend::Never,
            fetch_constant,
            move |translator, dest, address, views, _| {
                asm!(translator).op_lod(Dest::r(dest, 0b0010), address, 3, views.unsigned, sampler);
            },
        );
        if attributes.lod_bias != 0.0 {
            asm!(self).op_add(
                Dest::r(value, 0b0010),
                Src::r(value, Src::YYYY),
                Src::lf(attributes.lod_bias),
                false,
            );
        }
        (Src::r(value, Src::YYYY), pushed)
    }

    /// `getWeights`: the bilinear filtering weights, `frac(coord · size)`.
    fn emit_get_weights(&mut self, instr: &TextureFetchInstruction, operand: &InstructionOperand) -> (Src, u32) {
        let attributes = &instr.attributes;
        let dimension = instr.dimension;
        let mask = texel_mask(dimension);
        let coord = self.push_temp(0);
        let coord_src = Src::r(coord, Src::XYZW);
        self.load_coordinates(operand, mask, coord);
        let size = self.push_temp(0);
        self.emit_texture_size(instr.fetch_constant, dimension, size);

        if !attributes.unnormalized_coordinates {
            asm!(self).op_mul(Dest::r(coord, mask), coord_src, Src::r(size, Src::XYZW), false);
        }
        let [ox, oy, oz] = attributes.offset;
        if attributes.offset != [0.0; 3] {
            asm!(self).op_add(Dest::r(coord, mask), coord_src, Src::lf4(ox, oy, oz, 0.0), false);
        }
        asm!(self).op_frc(Dest::r(coord, mask), coord_src);
        if dimension == TextureDimension::D3 {
            // Layers of stacked textures are not filtered.
            asm!(self).op_and(Dest::r(coord, 0b0100), coord_src.select(2), Src::r(size, Src::WWWW));
        }
        (coord_src, 2)
    }

    /// `getGradients`: `(ddx(s), ddy(s), ddx(t), ddy(t))`, scaled by the
    /// gradient exponent adjustments in the fetch constant.
    fn emit_get_gradients(&mut self, instr: &TextureFetchInstruction, operand: &InstructionOperand) -> (Src, u32) {
        let value = self.push_temp(0);
        let coord = self.push_temp(0);
        let coord_src = Src::r(coord, Src::XYZW);
        self.load_coordinates(operand, 0b0011, coord);
        asm!(self).op_deriv_rtx_coarse(Dest::r(value, 0b0101), coord_src.swizzle(XXYY));
        asm!(self).op_deriv_rty_coarse(Dest::r(value, 0b1010), coord_src.swizzle(XXYY));

        let dword4 = self.texture_fetch_constant_dword(instr.fetch_constant, 4);
        let (h, v) = (fetch::GRAD_EXP_ADJUST_H, fetch::GRAD_EXP_ADJUST_V);
        asm!(self).op_ibfe(Dest::r(coord, 0b0011), Src::lu4(h.0, v.0, 0, 0), Src::lu4(h.1, v.1, 0, 0), dword4);
        asm!(self).op_ishl(Dest::r(coord, 0b0011), coord_src, Src::lu(23));
        asm!(self).op_iadd(Dest::r(coord, 0b0011), coord_src, Src::lu(ONE_BITS));
        asm!(self).op_mul(
            Dest::r(value, 0b1111),
            Src::r(value, Src::XYZW),
            coord_src.swizzle(XYXY),
            false,
        );
        self.pop_temp();
        (Src::r(value, Src::XYZW), 1)
    }
}
