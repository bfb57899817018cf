//! Host-side state baked into a translation.
//!
//! A [`Modification`] is a packed `u64`. Changing any field requires a new
//! translation of the same guest shader, so the value is part of the
//! translation cache key along with [`Modification::VERSION`].

use crate::xenos::MAX_INTERPOLATORS;

/// The host stage a guest vertex shader runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostVertexShaderType {
    /// A regular vertex shader.
    #[default]
    Vertex = 0,
    /// Feeds point sprite expansion in a later stage, always outputs the
    /// point size.
    PointListAsTriangleStrip = 1,
}

impl HostVertexShaderType {
    /// Decodes the 3-bit field, `None` for values with no meaning.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Vertex),
            1 => Some(Self::PointListAsTriangleStrip),
            _ => None,
        }
    }
}

/// How a pixel shader's depth output is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthStencilMode {
    /// Pass the guest depth through.
    #[default]
    NoModifiers = 0,
    /// The shader doesn't write depth or kill pixels, request early Z.
    EarlyHint = 1,
    /// Convert the depth to 20e4 and back, truncating.
    Float24Truncating = 2,
    /// Convert the depth to 20e4 and back, rounding to nearest even.
    Float24Rounding = 3,
}

impl DepthStencilMode {
    const fn from_raw(raw: u32) -> Self {
        match raw & 3 {
            0 => Self::NoModifiers,
            1 => Self::EarlyHint,
            2 => Self::Float24Truncating,
            _ => Self::Float24Rounding,
        }
    }
}

const fn field(value: u64, shift: u32, width: u32) -> u32 {
    ((value >> shift) & ((1 << width) - 1)) as u32
}

const fn with_field(value: u64, shift: u32, width: u32, field: u32) -> u64 {
    let mask = ((1u64 << width) - 1) << shift;
    (value & !mask) | (((field as u64) << shift) & mask)
}

macro_rules! accessors {
    ($($(#[$meta:meta])* $get:ident / $set:ident : $shift:literal, $width:literal;)*) => {
        $(
            $(#[$meta])*
            pub const fn $get(self) -> u32 {
                field(self.0, $shift, $width)
            }

            #[doc = concat!("Replaces [`Self::", stringify!($get), "`].")]
            #[must_use]
            pub const fn $set(self, value: u32) -> Self {
                Self(with_field(self.0, $shift, $width, value))
            }
        )*
    };
}

/// Vertex shader view of a [`Modification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexModification(pub u64);

impl VertexModification {
    accessors! {
        /// Registers that are dynamically indexed, so live in `x0[]`.
        dynamic_addressable_register_count / with_dynamic_addressable_register_count: 0, 8;
        /// Raw [`HostVertexShaderType`].
        host_vertex_shader_type_raw / with_host_vertex_shader_type_raw: 8, 3;
        /// Interpolators the pixel shader consumes.
        interpolator_mask / with_interpolator_mask: 11, 16;
        /// Enabled user clip planes.
        user_clip_plane_count / with_user_clip_plane_count: 27, 3;
        /// Clip planes cull whole primitives instead of clipping.
        user_clip_plane_cull / with_user_clip_plane_cull: 30, 1;
        /// A primitive is killed if all of its vertices are killed rather than any.
        vertex_kill_and / with_vertex_kill_and: 31, 1;
        /// The host shader outputs the point size.
        output_point_size / with_output_point_size: 32, 1;
    }

    /// The host stage, `None` for an unknown encoding.
    pub const fn host_vertex_shader_type(self) -> Option<HostVertexShaderType> {
        HostVertexShaderType::from_raw(self.host_vertex_shader_type_raw())
    }
}

/// Pixel shader view of a [`Modification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelModification(pub u64);

impl PixelModification {
    accessors! {
        /// Registers that are dynamically indexed, so live in `x0[]`.
        dynamic_addressable_register_count / with_dynamic_addressable_register_count: 0, 8;
        /// Interpolators the vertex shader writes.
        interpolator_mask / with_interpolator_mask: 8, 16;
        /// Interpolators sampled at the centroid.
        centroid_interpolator_mask / with_centroid_interpolator_mask: 24, 16;
        /// Write PsParamGen into an interpolator register.
        param_gen_enable / with_param_gen_enable: 40, 1;
        /// Register receiving PsParamGen.
        param_gen_interpolator / with_param_gen_interpolator: 41, 4;
        /// The primitive is a point, so PsParamGen carries point coordinates.
        param_gen_point / with_param_gen_point: 45, 1;
        /// Raw [`DepthStencilMode`].
        depth_stencil_mode_raw / with_depth_stencil_mode_raw: 46, 2;
    }

    /// How depth output is produced.
    pub const fn depth_stencil_mode(self) -> DepthStencilMode {
        DepthStencilMode::from_raw(self.depth_stencil_mode_raw())
    }

    /// Sets how depth output is produced.
    pub const fn with_depth_stencil_mode(self, mode: DepthStencilMode) -> Self {
        self.with_depth_stencil_mode_raw(mode as u32)
    }
}

/// A translation key, interpreted per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modification(pub u64);

impl Modification {
    /// Bumped whenever a field moves.
    pub const VERSION: u32 = 1;

    const ALL_INTERPOLATORS: u32 = (1 << MAX_INTERPOLATORS) - 1;

    /// All interpolators, a plain host vertex shader and no clipping.
    pub const fn default_vertex() -> Self {
        Self(
            VertexModification(0)
                .with_interpolator_mask(Self::ALL_INTERPOLATORS)
                .0,
        )
    }

    /// All interpolators, no PsParamGen and no depth modifiers.
    pub const fn default_pixel() -> Self {
        Self(
            PixelModification(0)
                .with_interpolator_mask(Self::ALL_INTERPOLATORS)
                .0,
        )
    }

    /// The vertex fields.
    pub const fn vertex(self) -> VertexModification {
        VertexModification(self.0)
    }

    /// The pixel fields.
    pub const fn pixel(self) -> PixelModification {
        PixelModification(self.0)
    }
}

impl From<VertexModification> for Modification {
    fn from(value: VertexModification) -> Self {
        Self(value.0)
    }
}

impl From<PixelModification> for Modification {
    fn from(value: PixelModification) -> Self {
        Self(value.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_fields_do_not_overlap() {
        let m = VertexModification(0)
            .with_dynamic_addressable_register_count(0xFF)
            .with_interpolator_mask(0xFFFF)
            .with_user_clip_plane_count(6)
            .with_vertex_kill_and(1)
            .with_output_point_size(1);
        assert_eq!(m.dynamic_addressable_register_count(), 0xFF);
        assert_eq!(m.host_vertex_shader_type(), Some(HostVertexShaderType::Vertex));
        assert_eq!(m.interpolator_mask(), 0xFFFF);
        assert_eq!(m.user_clip_plane_count(), 6);
        assert_eq!(m.user_clip_plane_cull(), 0);
        assert_eq!(m.vertex_kill_and(), 1);
        assert_eq!(m.output_point_size(), 1);
        assert_eq!(m.0 >> 33, 0);
    }

    #[test]
    fn pixel_fields_do_not_overlap() {
        let m = PixelModification(0)
            .with_centroid_interpolator_mask(0x8001)
            .with_param_gen_enable(1)
            .with_param_gen_interpolator(15)
            .with_depth_stencil_mode_raw(DepthStencilMode::Float24Rounding as u32);
        assert_eq!(m.interpolator_mask(), 0);
        assert_eq!(m.centroid_interpolator_mask(), 0x8001);
        assert_eq!(m.param_gen_interpolator(), 15);
        assert_eq!(m.param_gen_point(), 0);
        assert_eq!(m.depth_stencil_mode(), DepthStencilMode::Float24Rounding);
        assert_eq!(m.0 >> 48, 0);
    }

    #[test]
    fn depth_stencil_mode_round_trips() {
        for mode in [
            DepthStencilMode::NoModifiers,
            DepthStencilMode::EarlyHint,
            DepthStencilMode::Float24Truncating,
            DepthStencilMode::Float24Rounding,
        ] {
            let m = PixelModification(0).with_interpolator_mask(0xFFFF).with_depth_stencil_mode(mode);
            assert_eq!(m.depth_stencil_mode(), mode);
            assert_eq!(m.interpolator_mask(), 0xFFFF);
        }
    }

    #[test]
    fn setters_truncate_to_width() {
        let m = VertexModification(0).with_user_clip_plane_count(0xF);
        assert_eq!(m.user_clip_plane_count(), 7);
        assert_eq!(m.user_clip_plane_cull(), 0);
    }

    #[test]
    fn defaults_enable_all_interpolators() {
        assert_eq!(Modification::default_vertex().vertex().interpolator_mask(), 0xFFFF);
        assert_eq!(Modification::default_pixel().pixel().interpolator_mask(), 0xFFFF);
        assert_eq!(
            Modification::default_pixel().pixel().depth_stencil_mode(),
            DepthStencilMode::NoModifiers
        );
    }
}
