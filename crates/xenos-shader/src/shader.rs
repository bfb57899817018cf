//! Shader-wide inputs and the translation result.

use crate::bindings::{SamplerBinding, TextureBinding};
use crate::error::{Diagnostic, TranslateError};
use crate::modification::Modification;
use crate::system_constants::UsedSystemConstants;
use crate::xenos::{MAX_COLOR_RENDER_TARGETS, MAX_INTERPOLATORS, MAX_MEMEXPORT_ALLOCS};

/// Guest general purpose registers available to one thread.
pub const MAX_REGISTERS: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Constant buffer registers (`b#`), in space 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CbufferRegister {
    SystemConstants = 0,
    FloatConstants = 1,
    BoolLoopConstants = 2,
    FetchConstants = 3,
    /// Bindless only.
    DescriptorIndices = 4,
}

impl CbufferRegister {
    pub const ALL: [CbufferRegister; 5] = [
        Self::SystemConstants,
        Self::FloatConstants,
        Self::BoolLoopConstants,
        Self::FetchConstants,
        Self::DescriptorIndices,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::SystemConstants => "xe_system_cbuffer",
            Self::FloatConstants => "xe_float_constants",
            Self::BoolLoopConstants => "xe_bool_loop_constants",
            Self::FetchConstants => "xe_fetch_constants",
            Self::DescriptorIndices => "xe_descriptor_indices",
        }
    }
}

/// Guest constants the shader reads.
///
/// Float constants that are not dynamically indexed are uploaded packed, in
/// the order of the bits set in `float_bitmap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstantRegisterMap {
    pub float_bitmap: [u64; 4],
    /// `c#[a0]` or `c#[aL]` is used, so all 256 constants are uploaded
    /// unpacked.
    pub float_dynamic_addressing: bool,
    pub bool_bitmap: [u32; 8],
    pub loop_bitmap: u32,
}

impl ConstantRegisterMap {
    /// Float constant vectors in the buffer.
    pub fn float_count(&self) -> u32 {
        if self.float_dynamic_addressing {
            return crate::xenos::FLOAT_CONSTANTS_PER_STAGE;
        }
        self.float_bitmap.iter().map(|bits| bits.count_ones()).sum()
    }

    /// Vector of the buffer holding guest constant `index`, `None` if it's
    /// not uploaded.
    pub fn packed_float_index(&self, index: u32) -> Option<u32> {
        if self.float_dynamic_addressing {
            return Some(index);
        }
        let word = self.float_bitmap.get((index >> 6) as usize)?;
        let bit = 1u64 << (index & 63);
        if word & bit == 0 {
            return None;
        }
        let below: u32 = self.float_bitmap[..(index >> 6) as usize]
            .iter()
            .map(|bits| bits.count_ones())
            .sum();
        Some(below + (word & (bit - 1)).count_ones())
    }
}

/// Facts about the whole guest shader, gathered by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderInfo {
    pub stage: ShaderStage,
    /// Guest registers used, `r0` to `r<register_count - 1>`.
    pub register_count: u32,
    /// Registers are indexed with `a0` or `aL`, so they must live in an
    /// indexable temp array.
    pub uses_register_dynamic_addressing: bool,
    pub constant_register_map: ConstantRegisterMap,
    /// Bit per color render target written (pixel shaders).
    pub writes_color_targets: u32,
    pub writes_depth: bool,
    /// Components of `oPts` written: point size, edge flag, vertex kill.
    pub writes_point_size_edge_flag_kill_vertex: u32,
    /// Float constants used as export addresses.
    pub memexport_stream_constants: Vec<u32>,
    /// Mask of `eM#` registers written per memory export alloc.
    pub memexport_em_written: Vec<u8>,
    /// Registers that are interpolators in pixel shaders.
    pub interpolator_count: u32,
    pub kills_pixels: bool,
    /// Control-flow labels.
    pub label_count: u32,
}

impl ShaderInfo {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            register_count: 0,
            uses_register_dynamic_addressing: false,
            constant_register_map: ConstantRegisterMap::default(),
            writes_color_targets: 0,
            writes_depth: false,
            writes_point_size_edge_flag_kill_vertex: 0,
            memexport_stream_constants: Vec::new(),
            memexport_em_written: Vec::new(),
            interpolator_count: 0,
            kills_pixels: false,
            label_count: 0,
        }
    }

    pub fn is_vertex_shader(&self) -> bool {
        self.stage == ShaderStage::Vertex
    }

    pub fn is_pixel_shader(&self) -> bool {
        self.stage == ShaderStage::Pixel
    }

    pub fn uses_memexport(&self) -> bool {
        self.memexport_em_written.iter().any(|mask| *mask != 0)
    }

    pub fn validate(&self) -> Result<(), TranslateError> {
        let invalid = |msg: String| Err(TranslateError::InvalidShaderInfo(msg));
        if self.register_count > MAX_REGISTERS {
            return invalid(format!(
                "register count {} exceeds {MAX_REGISTERS}",
                self.register_count
            ));
        }
        if self.writes_color_targets >> MAX_COLOR_RENDER_TARGETS != 0 {
            return invalid(format!(
                "color target mask {:#x} names more than {MAX_COLOR_RENDER_TARGETS} targets",
                self.writes_color_targets
            ));
        }
        if self.interpolator_count > MAX_INTERPOLATORS {
            return invalid(format!(
                "interpolator count {} exceeds {MAX_INTERPOLATORS}",
                self.interpolator_count
            ));
        }
        if self.memexport_em_written.len() > MAX_MEMEXPORT_ALLOCS as usize {
            return invalid(format!(
                "{} memory export allocs exceed {MAX_MEMEXPORT_ALLOCS}",
                self.memexport_em_written.len()
            ));
        }
        if let Some(mask) = self.memexport_em_written.iter().find(|mask| **mask >> 5 != 0) {
            return invalid(format!("eM mask {mask:#x} names more than 5 registers"));
        }
        if self.is_vertex_shader() && (self.writes_color_targets != 0 || self.writes_depth) {
            return invalid("vertex shaders can't write colors or depth".to_owned());
        }
        Ok(())
    }
}

/// Output of a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub stage: ShaderStage,
    pub modification: Modification,
    /// The DXBC container.
    pub dxbc: Vec<u8>,
    pub texture_bindings: Vec<TextureBinding>,
    pub sampler_bindings: Vec<SamplerBinding>,
    pub used_system_constants: UsedSystemConstants,
    /// Constant buffers declared, the range ID is the register number.
    pub constant_buffers: Vec<CbufferRegister>,
    pub uses_shared_memory_uav: bool,
    pub uses_edram_rov: bool,
    /// The shader writes depth, so early depth testing is not possible.
    pub writes_depth: bool,
    pub diagnostics: Vec<Diagnostic>,
    /// False if any guest operation could not be translated.
    pub is_valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_float_index_counts_lower_bits() {
        let map = ConstantRegisterMap {
            float_bitmap: [0b1011, 0, 1 << 3, 0],
            ..Default::default()
        };
        assert_eq!(map.float_count(), 4);
        assert_eq!(map.packed_float_index(0), Some(0));
        assert_eq!(map.packed_float_index(1), Some(1));
        assert_eq!(map.packed_float_index(2), None);
        assert_eq!(map.packed_float_index(3), Some(2));
        assert_eq!(map.packed_float_index(131), Some(3));
        assert_eq!(map.packed_float_index(300), None);
    }

    #[test]
    fn dynamic_addressing_uploads_everything() {
        let map = ConstantRegisterMap {
            float_dynamic_addressing: true,
            ..Default::default()
        };
        assert_eq!(map.float_count(), 256);
        assert_eq!(map.packed_float_index(77), Some(77));
    }

    #[test]
    fn validation_rejects_bad_masks() {
        let mut info = ShaderInfo::new(ShaderStage::Pixel);
        info.writes_color_targets = 0b1_0001;
        assert!(info.validate().is_err());
        info.writes_color_targets = 0b0001;
        assert!(info.validate().is_ok());
        info.memexport_em_written = vec![0b10_0000];
        assert!(info.validate().is_err());

        let mut vertex = ShaderInfo::new(ShaderStage::Vertex);
        vertex.writes_depth = true;
        assert!(vertex.validate().is_err());
    }
}
