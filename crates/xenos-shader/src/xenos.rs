//! Guest GPU enums and register-field layouts the translator needs.
//!
//! Numeric values match the hardware encodings, so they can be compared
//! against fields extracted from fetch constants and system constants at
//! shader runtime.

/// Interpolators (guest registers passed from VS to PS).
pub const MAX_INTERPOLATORS: u32 = 16;

/// Color render targets.
pub const MAX_COLOR_RENDER_TARGETS: u32 = 4;

/// User clip planes.
pub const MAX_USER_CLIP_PLANES: u32 = 6;

/// Texture fetch constants; every one of them can also be read as three
/// vertex fetch constants.
pub const TEXTURE_FETCH_CONSTANT_COUNT: u32 = 32;

/// Dwords of one texture fetch constant.
pub const TEXTURE_FETCH_CONSTANT_DWORDS: u32 = 6;

/// Guest float constants visible to one stage.
pub const FLOAT_CONSTANTS_PER_STAGE: u32 = 256;

/// Bool constants, as 8 vectors of 32 bits.
pub const BOOL_CONSTANT_COUNT: u32 = 256;

/// Loop constants, following the bool constants in their buffer.
pub const LOOP_CONSTANT_COUNT: u32 = 32;

/// Width of an EDRAM tile in samples.
pub const EDRAM_TILE_WIDTH_SAMPLES: u32 = 80;

/// Height of an EDRAM tile in samples.
pub const EDRAM_TILE_HEIGHT_SAMPLES: u32 = 16;

/// Tiles in the 10 MB EDRAM.
pub const EDRAM_TILE_COUNT: u32 = 2048;

/// Dwords of one 32bpp EDRAM tile.
pub const EDRAM_TILE_DWORDS: u32 = EDRAM_TILE_WIDTH_SAMPLES * EDRAM_TILE_HEIGHT_SAMPLES;

/// Vertex indices are 24-bit.
pub const VERTEX_INDEX_MASK: u32 = 0xFF_FFFF;

/// Memory export allocs tracked per shader. The "written" bitmask keeps 8
/// bits per alloc in 4 components of one register.
pub const MAX_MEMEXPORT_ALLOCS: u32 = 16;

/// eM registers per memory export.
pub const MEMEXPORT_DATA_REGISTERS: u32 = 5;

/// Byte order of vertex and export data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Endian {
    #[default]
    None = 0,
    Swap8In16 = 1,
    Swap8In32 = 2,
    Swap16In32 = 3,
}

impl Endian {
    /// Decodes the 2-bit field.
    pub const fn from_raw(raw: u32) -> Self {
        match raw & 3 {
            0 => Self::None,
            1 => Self::Swap8In16,
            2 => Self::Swap8In32,
            _ => Self::Swap16In32,
        }
    }
}

/// Byte order of memory exports, which can also swap whole 64 and 128-bit
/// elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Endian128 {
    #[default]
    None = 0,
    Swap8In16 = 1,
    Swap8In32 = 2,
    Swap16In32 = 3,
    Swap8In64 = 4,
    Swap8In128 = 5,
}

/// Texture, vertex and export data formats.
#[allow(non_camel_case_types, missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SurfaceFormat {
    k_8 = 2,
    k_1_5_5_5 = 3,
    k_5_6_5 = 4,
    k_6_5_5 = 5,
    k_8_8_8_8 = 6,
    k_2_10_10_10 = 7,
    k_8_A = 8,
    k_8_B = 9,
    k_8_8 = 10,
    k_8_8_8_8_A = 14,
    k_4_4_4_4 = 15,
    k_10_11_11 = 16,
    k_11_11_10 = 17,
    k_16 = 24,
    k_16_16 = 25,
    k_16_16_16_16 = 26,
    k_16_FLOAT = 30,
    k_16_16_FLOAT = 31,
    k_16_16_16_16_FLOAT = 32,
    k_32 = 33,
    k_32_32 = 34,
    k_32_32_32_32 = 35,
    k_32_FLOAT = 36,
    k_32_32_FLOAT = 37,
    k_32_32_32_32_FLOAT = 38,
    k_32_32_32_FLOAT = 57,
}

impl SurfaceFormat {
    /// Every format listed, for runtime `switch` generation.
    pub const ALL: &'static [SurfaceFormat] = &[
        Self::k_8,
        Self::k_1_5_5_5,
        Self::k_5_6_5,
        Self::k_6_5_5,
        Self::k_8_8_8_8,
        Self::k_2_10_10_10,
        Self::k_8_A,
        Self::k_8_B,
        Self::k_8_8,
        Self::k_8_8_8_8_A,
        Self::k_4_4_4_4,
        Self::k_10_11_11,
        Self::k_11_11_10,
        Self::k_16,
        Self::k_16_16,
        Self::k_16_16_16_16,
        Self::k_16_FLOAT,
        Self::k_16_16_FLOAT,
        Self::k_16_16_16_16_FLOAT,
        Self::k_32,
        Self::k_32_32,
        Self::k_32_32_32_32,
        Self::k_32_FLOAT,
        Self::k_32_32_FLOAT,
        Self::k_32_32_32_32_FLOAT,
        Self::k_32_32_32_FLOAT,
    ];

    /// Decodes a 6-bit format field.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| *f as u32 == raw)
    }

    /// Bits per element.
    pub const fn bits_per_element(self) -> u32 {
        match self {
            Self::k_8 | Self::k_8_A | Self::k_8_B => 8,
            Self::k_1_5_5_5
            | Self::k_5_6_5
            | Self::k_6_5_5
            | Self::k_8_8
            | Self::k_4_4_4_4
            | Self::k_16
            | Self::k_16_FLOAT => 16,
            Self::k_8_8_8_8
            | Self::k_2_10_10_10
            | Self::k_8_8_8_8_A
            | Self::k_10_11_11
            | Self::k_11_11_10
            | Self::k_16_16
            | Self::k_16_16_FLOAT
            | Self::k_32
            | Self::k_32_FLOAT => 32,
            Self::k_16_16_16_16
            | Self::k_16_16_16_16_FLOAT
            | Self::k_32_32
            | Self::k_32_32_FLOAT => 64,
            Self::k_32_32_32_FLOAT => 96,
            Self::k_32_32_32_32 | Self::k_32_32_32_32_FLOAT => 128,
        }
    }

    /// Number of components.
    pub const fn component_count(self) -> u32 {
        match self {
            Self::k_8
            | Self::k_8_A
            | Self::k_8_B
            | Self::k_16
            | Self::k_16_FLOAT
            | Self::k_32
            | Self::k_32_FLOAT => 1,
            Self::k_8_8 | Self::k_16_16 | Self::k_16_16_FLOAT | Self::k_32_32 | Self::k_32_32_FLOAT => 2,
            Self::k_5_6_5
            | Self::k_6_5_5
            | Self::k_10_11_11
            | Self::k_11_11_10
            | Self::k_32_32_32_FLOAT => 3,
            _ => 4,
        }
    }

    /// `(width, offset)` of each packed component, for formats whose
    /// components are not whole dwords.
    pub const fn packed_layout(self) -> Option<&'static [(u32, u32)]> {
        let layout: &'static [(u32, u32)] = match self {
            Self::k_8 | Self::k_8_A | Self::k_8_B => &[(8, 0)],
            Self::k_1_5_5_5 => &[(5, 0), (5, 5), (5, 10), (1, 15)],
            Self::k_5_6_5 => &[(5, 0), (6, 5), (5, 11)],
            Self::k_6_5_5 => &[(5, 0), (5, 5), (6, 10)],
            Self::k_8_8 => &[(8, 0), (8, 8)],
            Self::k_8_8_8_8 | Self::k_8_8_8_8_A => &[(8, 0), (8, 8), (8, 16), (8, 24)],
            Self::k_2_10_10_10 => &[(10, 0), (10, 10), (10, 20), (2, 30)],
            Self::k_4_4_4_4 => &[(4, 0), (4, 4), (4, 8), (4, 12)],
            Self::k_10_11_11 => &[(11, 0), (11, 11), (10, 22)],
            Self::k_11_11_10 => &[(10, 0), (11, 10), (11, 21)],
            Self::k_16 => &[(16, 0)],
            Self::k_16_16 => &[(16, 0), (16, 16)],
            _ => return None,
        };
        Some(layout)
    }
}

/// How signed normalized values are converted to floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignedRepeatingFractionMode {
    /// `max(x / (2^(n-1) - 1), -1)`, the Direct3D convention.
    #[default]
    ClampNegativeOne,
    /// `(2x + 1) / (2^n - 1)`, no exact zero.
    NoZero,
}

/// Texture filter of a fetch instruction or fetch constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureFilter {
    Point = 0,
    Linear = 1,
    /// Mip filter only: sample the base level.
    BaseMap = 2,
    /// Take the filter from the fetch constant.
    #[default]
    UseFetchConst = 3,
}

impl TextureFilter {
    /// Decodes a 2-bit field.
    pub const fn from_raw(raw: u32) -> Self {
        match raw & 3 {
            0 => Self::Point,
            1 => Self::Linear,
            2 => Self::BaseMap,
            _ => Self::UseFetchConst,
        }
    }
}

/// Anisotropic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u32)]
pub enum AnisoFilter {
    Disabled = 0,
    Max1To1 = 1,
    Max2To1 = 2,
    Max4To1 = 3,
    Max8To1 = 4,
    Max16To1 = 5,
    #[default]
    UseFetchConst = 7,
}

/// Fetch dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureDimension {
    D1 = 0,
    D2 = 1,
    /// 3D, or a stacked 2D array selected at runtime.
    D3 = 2,
    Cube = 3,
}

/// Per-component texture signedness in fetch constant dword 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureSign {
    Unsigned = 0,
    Signed = 1,
    /// `2x - 1`.
    UnsignedBiased = 2,
    Gamma = 3,
}

/// Color render target formats.
#[allow(non_camel_case_types, missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ColorRenderTargetFormat {
    k_8_8_8_8 = 0,
    k_8_8_8_8_GAMMA = 1,
    k_2_10_10_10 = 2,
    k_2_10_10_10_FLOAT = 3,
    k_16_16 = 4,
    k_16_16_16_16 = 5,
    k_16_16_FLOAT = 6,
    k_16_16_16_16_FLOAT = 7,
    k_2_10_10_10_AS_10_10_10_10 = 10,
    k_2_10_10_10_FLOAT_AS_16_16_16_16 = 12,
    k_32_FLOAT = 14,
    k_32_32_FLOAT = 15,
}

impl ColorRenderTargetFormat {
    /// Whether a pixel takes 64 bits.
    pub const fn is_64bpp(self) -> bool {
        matches!(
            self,
            Self::k_16_16_16_16 | Self::k_16_16_16_16_FLOAT | Self::k_32_32_FLOAT
        )
    }
}

/// Depth render target formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DepthRenderTargetFormat {
    /// 24-bit unorm depth.
    D24S8 = 0,
    /// 20e4 float depth.
    D24FS8 = 1,
}

/// Stencil operation, as stored in `RB_DEPTHCONTROL` and the ROV stencil
/// constants.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StencilOp {
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementClamp = 3,
    DecrementClamp = 4,
    Invert = 5,
    IncrementWrap = 6,
    DecrementWrap = 7,
}

impl StencilOp {
    /// All operations in encoding order.
    pub const ALL: [StencilOp; 8] = [
        Self::Keep,
        Self::Zero,
        Self::Replace,
        Self::IncrementClamp,
        Self::DecrementClamp,
        Self::Invert,
        Self::IncrementWrap,
        Self::DecrementWrap,
    ];
}

/// Comparison function bits, combined into a 3-bit field.
pub mod compare {
    /// Passes if less.
    pub const LESS: u32 = 1;
    /// Passes if equal.
    pub const EQUAL: u32 = 2;
    /// Passes if greater.
    pub const GREATER: u32 = 4;
}

/// Blend factors (`RB_BLENDCONTROL`).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcColor = 4,
    OneMinusSrcColor = 5,
    SrcAlpha = 6,
    OneMinusSrcAlpha = 7,
    DstColor = 8,
    OneMinusDstColor = 9,
    DstAlpha = 10,
    OneMinusDstAlpha = 11,
    ConstantColor = 12,
    OneMinusConstantColor = 13,
    ConstantAlpha = 14,
    OneMinusConstantAlpha = 15,
    SrcAlphaSaturate = 16,
}

impl BlendFactor {
    /// Every factor in encoding order.
    pub const ALL: [BlendFactor; 15] = [
        Self::Zero,
        Self::One,
        Self::SrcColor,
        Self::OneMinusSrcColor,
        Self::SrcAlpha,
        Self::OneMinusSrcAlpha,
        Self::DstColor,
        Self::OneMinusDstColor,
        Self::DstAlpha,
        Self::OneMinusDstAlpha,
        Self::ConstantColor,
        Self::OneMinusConstantColor,
        Self::ConstantAlpha,
        Self::OneMinusConstantAlpha,
        Self::SrcAlphaSaturate,
    ];
}

/// Blend equations.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlendOp {
    Add = 0,
    Subtract = 1,
    Min = 2,
    Max = 3,
    RevSubtract = 4,
}

/// Field layout of `RB_BLENDCONTROL` as uploaded in the ROV blend constants.
pub mod blend_control {
    /// Color source factor.
    pub const COLOR_SRC_SHIFT: u32 = 0;
    /// Color blend operation.
    pub const COLOR_OP_SHIFT: u32 = 5;
    /// Color destination factor.
    pub const COLOR_DEST_SHIFT: u32 = 8;
    /// Alpha source factor.
    pub const ALPHA_SRC_SHIFT: u32 = 16;
    /// Alpha blend operation.
    pub const ALPHA_OP_SHIFT: u32 = 21;
    /// Alpha destination factor.
    pub const ALPHA_DEST_SHIFT: u32 = 24;
    /// `1 * src + 0 * dst` for both color and alpha.
    pub const DISABLED: u32 = 0x0001_0001;
    /// The meaningful bits.
    pub const MASK: u32 = 0x1FFF_1FFF;

    /// Packs a blend control value.
    pub const fn pack(
        color_src: super::BlendFactor,
        color_op: super::BlendOp,
        color_dest: super::BlendFactor,
        alpha_src: super::BlendFactor,
        alpha_op: super::BlendOp,
        alpha_dest: super::BlendFactor,
    ) -> u32 {
        ((color_src as u32) << COLOR_SRC_SHIFT)
            | ((color_op as u32) << COLOR_OP_SHIFT)
            | ((color_dest as u32) << COLOR_DEST_SHIFT)
            | ((alpha_src as u32) << ALPHA_SRC_SHIFT)
            | ((alpha_op as u32) << ALPHA_OP_SHIFT)
            | ((alpha_dest as u32) << ALPHA_DEST_SHIFT)
    }
}

/// Flags appended above the 4-bit format in the ROV render target format
/// constants.
pub mod rt_format_flags {
    /// 64 bits per pixel.
    pub const BPP64: u32 = 1 << 4;
    /// Color is fixed-point: clamp blend inputs.
    pub const FIXED_POINT_COLOR: u32 = 1 << 5;
    /// Alpha is fixed-point.
    pub const FIXED_POINT_ALPHA: u32 = 1 << 6;
    /// The format itself.
    pub const FORMAT_MASK: u32 = 0xF;

    /// The format with its flags, as the render target format constant
    /// expects it.
    pub const fn for_format(format: super::ColorRenderTargetFormat) -> u32 {
        use super::ColorRenderTargetFormat as F;
        let mut flags = format as u32 & FORMAT_MASK;
        if format.is_64bpp() {
            flags |= BPP64;
        }
        match format {
            F::k_8_8_8_8
            | F::k_8_8_8_8_GAMMA
            | F::k_2_10_10_10
            | F::k_2_10_10_10_AS_10_10_10_10
            | F::k_16_16
            | F::k_16_16_16_16 => flags |= FIXED_POINT_COLOR | FIXED_POINT_ALPHA,
            F::k_2_10_10_10_FLOAT | F::k_2_10_10_10_FLOAT_AS_16_16_16_16 => {
                flags |= FIXED_POINT_ALPHA
            }
            _ => {}
        }
        flags
    }
}

/// Stencil function/operation field layout in the ROV stencil constants.
pub mod stencil_func_ops {
    /// 3-bit comparison.
    pub const COMPARE_SHIFT: u32 = 0;
    /// Operation on stencil test failure.
    pub const FAIL_SHIFT: u32 = 3;
    /// Operation on both tests passing.
    pub const PASS_SHIFT: u32 = 6;
    /// Operation on depth test failure.
    pub const DEPTH_FAIL_SHIFT: u32 = 9;

    /// Packs a stencil function and its operations.
    pub const fn pack(
        compare: u32,
        fail: super::StencilOp,
        pass: super::StencilOp,
        depth_fail: super::StencilOp,
    ) -> u32 {
        (compare << COMPARE_SHIFT)
            | ((fail as u32) << FAIL_SHIFT)
            | ((pass as u32) << PASS_SHIFT)
            | ((depth_fail as u32) << DEPTH_FAIL_SHIFT)
    }
}

/// Bit fields of the texture and vertex fetch constants.
pub mod fetch {
    /// Location of a dword of a fetch constant in the fetch constant buffer,
    /// as `(vector, component)`.
    ///
    /// Texture fetch constants are 6 dwords packed back to back:
    /// `tf0[0..4]`, `tf0[4..6] tf1[0..2]`, `tf1[2..6]`, ...
    pub const fn texture_dword(fetch_constant: u32, dword: u32) -> (u32, u32) {
        let linear = fetch_constant * super::TEXTURE_FETCH_CONSTANT_DWORDS + dword;
        (linear >> 2, linear & 3)
    }

    /// Location of a dword of a vertex fetch constant (2 dwords each, 3 per
    /// texture fetch constant slot).
    pub const fn vertex_dword(fetch_constant: u32, dword: u32) -> (u32, u32) {
        let linear = fetch_constant * 2 + dword;
        (linear >> 2, linear & 3)
    }

    /// Vertex dword 0: base address in dwords, in bits 2:31 as a byte
    /// address with the low bits holding the type.
    pub const VERTEX_ADDRESS_MASK: u32 = !3;
    /// Vertex dword 1: endianness.
    pub const VERTEX_ENDIAN_MASK: u32 = 3;

    /// Texture dword 0: per-component signedness, 2 bits each.
    pub const SIGN_SHIFT: u32 = 2;
    /// Texture dword 0: signed repeating fraction mode.
    pub const SIGNED_RF_MODE_SHIFT: u32 = 19;
    /// Texture dword 2: 2D width minus 1.
    pub const SIZE_2D_WIDTH: (u32, u32) = (13, 0);
    /// Texture dword 2: 2D height minus 1.
    pub const SIZE_2D_HEIGHT: (u32, u32) = (13, 13);
    /// Texture dword 2: stack depth minus 1.
    pub const SIZE_2D_STACK_DEPTH: (u32, u32) = (6, 26);
    /// Texture dword 2: 3D width minus 1.
    pub const SIZE_3D_WIDTH: (u32, u32) = (11, 0);
    /// Texture dword 2: 3D height minus 1.
    pub const SIZE_3D_HEIGHT: (u32, u32) = (11, 11);
    /// Texture dword 2: 3D depth minus 1.
    pub const SIZE_3D_DEPTH: (u32, u32) = (10, 22);
    /// Texture dword 3: exponent adjustment, signed.
    pub const EXP_ADJUST: (u32, u32) = (6, 13);
    /// Texture dword 4: volume mag filter.
    pub const VOL_MAG_FILTER_SHIFT: u32 = 0;
    /// Texture dword 4: volume min filter.
    pub const VOL_MIN_FILTER_SHIFT: u32 = 1;
    /// Texture dword 4: horizontal gradient exponent adjustment.
    pub const GRAD_EXP_ADJUST_H: (u32, u32) = (5, 22);
    /// Texture dword 4: vertical gradient exponent adjustment.
    pub const GRAD_EXP_ADJUST_V: (u32, u32) = (5, 27);
    /// Texture dword 4: LOD bias, signed 4.6 fixed point.
    pub const LOD_BIAS: (u32, u32) = (10, 12);
    /// Texture dword 5: dimension.
    pub const DIMENSION_SHIFT: u32 = 9;
    /// Texture dword 5 bit set for 3D rather than stacked textures.
    pub const DIMENSION_3D_BITS: u32 = (super::TextureDimension::D3 as u32) << DIMENSION_SHIFT;
}

/// Layout of the eA memory export address register.
///
/// x is the stream base in dwords and y the element index, both as float
/// bits with the integer in the mantissa. z holds the format and w the
/// number of elements in the stream.
pub mod memexport {
    /// Bits of x checked for a valid address.
    pub const ADDRESS_CHECK_MASK: u32 = 0xC000_0000;
    /// Expected value of [`ADDRESS_CHECK_MASK`] bits, a positive float with
    /// the base in the mantissa.
    pub const ADDRESS_CHECK_VALUE: u32 = 0x4000_0000;
    /// Integer bits of the index and count.
    pub const INDEX_MASK: u32 = (1 << 23) - 1;
    /// z: [`super::Endian128`].
    pub const ENDIAN_MASK: u32 = 0b111;
    /// z: [`super::SurfaceFormat`], 6 bits.
    pub const FORMAT: (u32, u32) = (6, 8);
    /// z: fixed point components are signed.
    pub const SIGNED_SHIFT: u32 = 16;
    /// z: fixed point components are integers rather than normalized.
    pub const INTEGER_SHIFT: u32 = 17;
    /// z: red and blue are swapped.
    pub const SWAP_RED_BLUE_SHIFT: u32 = 19;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_constant_dwords_pack_across_vectors() {
        assert_eq!(fetch::texture_dword(0, 5), (1, 1));
        assert_eq!(fetch::texture_dword(1, 0), (1, 2));
        assert_eq!(fetch::texture_dword(1, 2), (2, 0));
        // Vertex fetch constant 3 shares the slot of texture fetch constant 1.
        assert_eq!(fetch::vertex_dword(3, 0), fetch::texture_dword(1, 0));
        assert_eq!(fetch::vertex_dword(95, 1), (47, 3));
    }

    #[test]
    fn surface_format_sizes() {
        assert_eq!(SurfaceFormat::k_8_8_8_8.bits_per_element(), 32);
        assert_eq!(SurfaceFormat::k_32_32_32_FLOAT.bits_per_element(), 96);
        assert_eq!(SurfaceFormat::from_raw(57), Some(SurfaceFormat::k_32_32_32_FLOAT));
        assert_eq!(SurfaceFormat::from_raw(1), None);
        let widths: Vec<u32> = SurfaceFormat::k_2_10_10_10
            .packed_layout()
            .unwrap()
            .iter()
            .map(|(w, _)| *w)
            .collect();
        assert_eq!(widths, vec![10, 10, 10, 2]);
    }

    #[test]
    fn rt_format_flags_mark_fixed_point_and_64bpp() {
        let flags = rt_format_flags::for_format(ColorRenderTargetFormat::k_16_16_16_16);
        assert_eq!(flags & rt_format_flags::FORMAT_MASK, 5);
        assert_ne!(flags & rt_format_flags::BPP64, 0);
        assert_ne!(flags & rt_format_flags::FIXED_POINT_COLOR, 0);
        let float = rt_format_flags::for_format(ColorRenderTargetFormat::k_2_10_10_10_FLOAT);
        assert_eq!(
            float & (rt_format_flags::FIXED_POINT_COLOR | rt_format_flags::FIXED_POINT_ALPHA),
            rt_format_flags::FIXED_POINT_ALPHA
        );
        assert_eq!(
            rt_format_flags::for_format(ColorRenderTargetFormat::k_32_FLOAT),
            14
        );
    }

    #[test]
    fn blend_control_disabled_is_one_zero() {
        let packed = blend_control::pack(
            BlendFactor::One,
            BlendOp::Add,
            BlendFactor::Zero,
            BlendFactor::One,
            BlendOp::Add,
            BlendFactor::Zero,
        );
        assert_eq!(packed, blend_control::DISABLED);
    }
}
