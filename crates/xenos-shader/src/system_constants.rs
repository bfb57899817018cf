//! Constant buffer 0: host-computed state read by the generated prologues and
//! epilogues.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use xenos_dxbc::rdef::VariableType;

bitflags! {
    /// `xe_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Shared memory is bound as a UAV, reads also go through it.
        const SHARED_MEMORY_IS_UAV = 1 << 0;
        /// The guest vertex shader outputs XY already divided by W.
        const XY_DIVIDED_BY_W = 1 << 1;
        /// The guest vertex shader outputs Z already divided by W.
        const Z_DIVIDED_BY_W = 1 << 2;
        /// The guest vertex shader outputs W rather than 1/W.
        const W_NOT_RECIPROCAL = 1 << 3;
        const USER_CLIP_PLANE_0 = 1 << 4;
        const USER_CLIP_PLANE_1 = 1 << 5;
        const USER_CLIP_PLANE_2 = 1 << 6;
        const USER_CLIP_PLANE_3 = 1 << 7;
        const USER_CLIP_PLANE_4 = 1 << 8;
        const USER_CLIP_PLANE_5 = 1 << 9;
        /// Vertex kill with OR semantics instead of AND.
        const KILL_IF_ANY_VERTEX_KILLED = 1 << 10;
        /// The primitive has faces.
        const PRIMITIVE_POLYGONAL = 1 << 11;
        /// The primitive is a line.
        const PRIMITIVE_LINE = 1 << 12;
        const ALPHA_PASS_IF_LESS = 1 << 13;
        const ALPHA_PASS_IF_EQUAL = 1 << 14;
        const ALPHA_PASS_IF_GREATER = 1 << 15;
        const ALPHA_TO_COVERAGE = 1 << 16;
        const COLOR_0_GAMMA = 1 << 17;
        const COLOR_1_GAMMA = 1 << 18;
        const COLOR_2_GAMMA = 1 << 19;
        const COLOR_3_GAMMA = 1 << 20;
        /// A depth/stencil buffer is bound.
        const ROV_DEPTH_STENCIL = 1 << 21;
        /// The depth buffer is 20e4 rather than unorm24.
        const ROV_DEPTH_FLOAT24 = 1 << 22;
        const ROV_DEPTH_PASS_IF_LESS = 1 << 23;
        const ROV_DEPTH_PASS_IF_EQUAL = 1 << 24;
        const ROV_DEPTH_PASS_IF_GREATER = 1 << 25;
        /// Store the new depth when the test passes.
        const ROV_DEPTH_WRITE = 1 << 26;
        const ROV_STENCIL_TEST = 1 << 27;
        /// Write depth/stencil before running the shader body, even on a
        /// failed test that changed the stencil value.
        const ROV_DEPTH_STENCIL_EARLY_WRITE = 1 << 28;
    }
}

impl Flags {
    /// Bit of the first user clip plane.
    pub const USER_CLIP_PLANE_SHIFT: u32 = 4;
    /// Bit of [`Flags::PRIMITIVE_LINE`].
    pub const PRIMITIVE_LINE_SHIFT: u32 = 12;
    /// Bit of [`Flags::ALPHA_PASS_IF_LESS`]; equal and greater follow.
    pub const ALPHA_PASS_SHIFT: u32 = 13;
    /// Bit of [`Flags::COLOR_0_GAMMA`]; the other targets follow.
    pub const COLOR_GAMMA_SHIFT: u32 = 17;
    /// Bit of [`Flags::ROV_DEPTH_PASS_IF_LESS`]; equal and greater follow.
    pub const ROV_DEPTH_PASS_SHIFT: u32 = 23;
}

/// The constant buffer contents.
///
/// Every member is aligned so that no vector crosses a 16-byte row.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SystemConstants {
    pub flags: u32,
    pub line_loop_closing_index: u32,
    pub vertex_index_endian: u32,
    pub vertex_index_offset: i32,

    pub vertex_index_min: u32,
    pub vertex_index_max: u32,
    pub point_constant_diameter: [f32; 2],

    pub user_clip_planes: [[f32; 4]; 6],

    pub ndc_scale: [f32; 3],
    pub point_vertex_diameter_min: f32,

    pub ndc_offset: [f32; 3],
    pub point_vertex_diameter_max: f32,

    pub point_screen_diameter_to_ndc_radius: [f32; 2],
    /// Log2 of the sample count along X and Y.
    pub sample_count_log2: [u32; 2],

    pub alpha_test_reference: f32,
    /// Alpha-to-coverage threshold offsets, 2 bits per sample.
    pub alpha_to_mask: u32,
    pub edram_32bpp_tile_pitch_dwords_scaled: u32,
    pub edram_depth_base_dwords_scaled: u32,

    pub color_exp_bias: [f32; 4],

    /// Host render target for each guest color output, or `!0`.
    pub color_output_map: [u32; 4],

    /// Scale and offset.
    pub edram_poly_offset_front: [f32; 2],
    pub edram_poly_offset_back: [f32; 2],

    /// Front then back: reference, read mask, write mask, function and
    /// operations packed like [`crate::xenos::stencil_func_ops`].
    pub edram_stencil: [[u32; 4]; 2],

    pub edram_rt_base_dwords_scaled: [u32; 4],
    /// Format combined with [`crate::xenos::rt_format_flags`].
    pub edram_rt_format_flags: [u32; 4],
    /// Low color, low alpha, high color, high alpha.
    pub edram_rt_clamp: [[f32; 4]; 4],
    /// Bits of the packed color to keep from the old value, low and high dword.
    pub edram_rt_keep_mask: [[u32; 2]; 4],
    /// Blend control masked with [`crate::xenos::blend_control::MASK`].
    pub edram_rt_blend_factors_ops: [u32; 4],
    pub edram_blend_constant: [f32; 4],

    /// Bit per texture fetch constant, set when its texture was resolved
    /// from a render target.
    pub textures_resolved: u32,
    pub _padding: [u32; 3],
}

impl SystemConstants {
    /// Size in bytes, a multiple of 16.
    pub const SIZE: u32 = core::mem::size_of::<Self>() as u32;

    /// The bytes to upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Identifies a member of [`SystemConstants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SystemConstantIndex {
    Flags,
    LineLoopClosingIndex,
    VertexIndexEndian,
    VertexIndexOffset,
    VertexIndexMin,
    VertexIndexMax,
    PointConstantDiameter,
    UserClipPlanes,
    NdcScale,
    PointVertexDiameterMin,
    NdcOffset,
    PointVertexDiameterMax,
    PointScreenDiameterToNdcRadius,
    SampleCountLog2,
    AlphaTestReference,
    AlphaToMask,
    Edram32bppTilePitchDwordsScaled,
    EdramDepthBaseDwordsScaled,
    ColorExpBias,
    ColorOutputMap,
    EdramPolyOffsetFront,
    EdramPolyOffsetBack,
    EdramStencil,
    EdramRtBaseDwordsScaled,
    EdramRtFormatFlags,
    EdramRtClamp,
    EdramRtKeepMask,
    EdramRtBlendFactorsOps,
    EdramBlendConstant,
    TexturesResolved,
}

/// Reflection data of one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemConstantInfo {
    pub name: &'static str,
    pub offset: u32,
    pub size: u32,
    pub ty: VariableType,
    /// Vector width.
    pub columns: u16,
    /// Array length, 0 for non-arrays. Arrays are always of 4-component
    /// vectors.
    pub elements: u16,
}

macro_rules! system_constants {
    ($($variant:ident => $name:literal, $field:ident, $ty:ident, $columns:literal, $elements:literal;)*) => {
        impl SystemConstantIndex {
            /// Every member, in layout order.
            pub const ALL: &'static [SystemConstantIndex] = &[$(Self::$variant,)*];

            /// Reflection data.
            pub const fn info(self) -> SystemConstantInfo {
                match self {
                    $(Self::$variant => SystemConstantInfo {
                        name: $name,
                        offset: core::mem::offset_of!(SystemConstants, $field) as u32,
                        // Array elements are whole rows.
                        size: if $elements == 0 { $columns * 4 } else { 16 * $elements },
                        ty: VariableType::$ty,
                        columns: $columns,
                        elements: $elements,
                    },)*
                }
            }
        }
    };
}

system_constants! {
    Flags => "xe_flags", flags, UInt, 1, 0;
    LineLoopClosingIndex => "xe_line_loop_closing_index", line_loop_closing_index, UInt, 1, 0;
    VertexIndexEndian => "xe_vertex_index_endian", vertex_index_endian, UInt, 1, 0;
    VertexIndexOffset => "xe_vertex_index_offset", vertex_index_offset, Int, 1, 0;
    VertexIndexMin => "xe_vertex_index_min", vertex_index_min, UInt, 1, 0;
    VertexIndexMax => "xe_vertex_index_max", vertex_index_max, UInt, 1, 0;
    PointConstantDiameter => "xe_point_constant_diameter", point_constant_diameter, Float, 2, 0;
    UserClipPlanes => "xe_user_clip_planes", user_clip_planes, Float, 4, 6;
    NdcScale => "xe_ndc_scale", ndc_scale, Float, 3, 0;
    PointVertexDiameterMin => "xe_point_vertex_diameter_min", point_vertex_diameter_min, Float, 1, 0;
    NdcOffset => "xe_ndc_offset", ndc_offset, Float, 3, 0;
    PointVertexDiameterMax => "xe_point_vertex_diameter_max", point_vertex_diameter_max, Float, 1, 0;
    PointScreenDiameterToNdcRadius => "xe_point_screen_diameter_to_ndc_radius", point_screen_diameter_to_ndc_radius, Float, 2, 0;
    SampleCountLog2 => "xe_sample_count_log2", sample_count_log2, UInt, 2, 0;
    AlphaTestReference => "xe_alpha_test_reference", alpha_test_reference, Float, 1, 0;
    AlphaToMask => "xe_alpha_to_mask", alpha_to_mask, UInt, 1, 0;
    Edram32bppTilePitchDwordsScaled => "xe_edram_32bpp_tile_pitch_dwords_scaled", edram_32bpp_tile_pitch_dwords_scaled, UInt, 1, 0;
    EdramDepthBaseDwordsScaled => "xe_edram_depth_base_dwords_scaled", edram_depth_base_dwords_scaled, UInt, 1, 0;
    ColorExpBias => "xe_color_exp_bias", color_exp_bias, Float, 4, 0;
    ColorOutputMap => "xe_color_output_map", color_output_map, UInt, 4, 0;
    EdramPolyOffsetFront => "xe_edram_poly_offset_front", edram_poly_offset_front, Float, 2, 0;
    EdramPolyOffsetBack => "xe_edram_poly_offset_back", edram_poly_offset_back, Float, 2, 0;
    EdramStencil => "xe_edram_stencil", edram_stencil, UInt, 4, 2;
    EdramRtBaseDwordsScaled => "xe_edram_rt_base_dwords_scaled", edram_rt_base_dwords_scaled, UInt, 4, 0;
    EdramRtFormatFlags => "xe_edram_rt_format_flags", edram_rt_format_flags, UInt, 4, 0;
    EdramRtClamp => "xe_edram_rt_clamp", edram_rt_clamp, Float, 4, 4;
    EdramRtKeepMask => "xe_edram_rt_keep_mask", edram_rt_keep_mask, UInt, 4, 2;
    EdramRtBlendFactorsOps => "xe_edram_rt_blend_factors_ops", edram_rt_blend_factors_ops, UInt, 4, 0;
    EdramBlendConstant => "xe_edram_blend_constant", edram_blend_constant, Float, 4, 0;
    TexturesResolved => "xe_textures_resolved", textures_resolved, UInt, 1, 0;
}

impl SystemConstantIndex {
    /// Bit in the used mask.
    pub const fn bit(self) -> u64 {
        1 << self as u32
    }

    /// `(vector, component)` of the byte `offset_in_member` past the start of
    /// the member.
    pub const fn location(self, offset_in_member: u32) -> (u32, u32) {
        let offset = self.info().offset + offset_in_member;
        (offset >> 4, (offset >> 2) & 3)
    }
}

/// Members referenced by a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UsedSystemConstants(pub u64);

impl UsedSystemConstants {
    /// Marks `index` as referenced.
    pub fn mark(&mut self, index: SystemConstantIndex) {
        self.0 |= index.bit();
    }

    /// Whether `index` is referenced.
    pub const fn contains(self, index: SystemConstantIndex) -> bool {
        self.0 & index.bit() != 0
    }

    /// Referenced members in layout order.
    pub fn iter(self) -> impl Iterator<Item = SystemConstantIndex> {
        SystemConstantIndex::ALL
            .iter()
            .copied()
            .filter(move |index| self.contains(*index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_dense_and_row_aligned() {
        let mut end = 0;
        for &index in SystemConstantIndex::ALL {
            let info = index.info();
            assert_eq!(info.offset, end, "{}", info.name);
            if info.elements == 0 {
                assert!(info.offset % 16 + info.size <= 16, "{}", info.name);
            } else {
                assert_eq!(info.offset % 16, 0, "{}", info.name);
                assert_eq!(info.columns, 4, "{}", info.name);
            }
            end = info.offset + info.size;
        }
        // The last row is padded.
        assert_eq!(end.next_multiple_of(16), SystemConstants::SIZE);
        assert_eq!(SystemConstants::SIZE, 448);
        assert_eq!(SystemConstantIndex::EdramRtKeepMask.info().size, 32);
    }

    #[test]
    fn locations_point_at_members() {
        assert_eq!(SystemConstantIndex::Flags.location(0), (0, 0));
        assert_eq!(SystemConstantIndex::VertexIndexOffset.location(0), (0, 3));
        assert_eq!(SystemConstantIndex::UserClipPlanes.location(16 * 2), (4, 0));
        assert_eq!(SystemConstantIndex::PointVertexDiameterMax.location(0), (9, 3));
        assert_eq!(SystemConstantIndex::AlphaTestReference.location(0), (11, 0));
        assert_eq!(SystemConstantIndex::EdramStencil.location(16), (16, 0));
        assert_eq!(SystemConstantIndex::TexturesResolved.location(0), (27, 0));
    }

    #[test]
    fn used_mask_iterates_in_layout_order() {
        let mut used = UsedSystemConstants::default();
        used.mark(SystemConstantIndex::EdramBlendConstant);
        used.mark(SystemConstantIndex::Flags);
        let members: Vec<_> = used.iter().collect();
        assert_eq!(
            members,
            vec![SystemConstantIndex::Flags, SystemConstantIndex::EdramBlendConstant]
        );
        assert!(SystemConstantIndex::ALL.len() <= 64);
    }
}
