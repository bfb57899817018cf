//! Host capabilities and policies fixed for the lifetime of a [`crate::Translator`].

use crate::error::TranslateError;

/// Host GPU vendor, for workarounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Vendor {
    #[default]
    Amd,
    Nvidia,
    /// Large `switch` statements miscompile, control flow uses `if` chains.
    Intel,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TranslatorConfig {
    pub vendor: Vendor,
    /// Textures and samplers are accessed through descriptor heaps indexed by
    /// the descriptor indices constant buffer instead of per-binding slots.
    pub bindless_resources_used: bool,
    /// Output merging is done in the pixel shader through the EDRAM ROV.
    pub edram_rov_used: bool,
    /// Gamma render targets are host sRGB, so gamma conversion uses the sRGB
    /// curve rather than the piecewise-linear one.
    pub gamma_render_target_as_srgb: bool,
    /// The host supports 2x MSAA, so guest 2x samples map to host samples 0
    /// and 1 instead of 1 and 2 of 4x.
    pub msaa_2x_supported: bool,
    pub draw_resolution_scale_x: u32,
    pub draw_resolution_scale_y: u32,
    /// Emit a comment with the guest disassembly before each instruction.
    pub force_emit_source_map: bool,
    /// Dispatch labels with `switch` rather than an `if` chain. Ignored on
    /// [`Vendor::Intel`].
    pub use_switch_for_control_flow: bool,
    /// Keep exec conditionals open across execs with the same condition.
    pub merge_exec_conditionals: bool,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            vendor: Vendor::Amd,
            bindless_resources_used: false,
            edram_rov_used: false,
            gamma_render_target_as_srgb: false,
            msaa_2x_supported: true,
            draw_resolution_scale_x: 1,
            draw_resolution_scale_y: 1,
            force_emit_source_map: false,
            use_switch_for_control_flow: true,
            merge_exec_conditionals: true,
        }
    }
}

/// Largest resolution scale the EDRAM addressing supports on one axis.
pub const MAX_DRAW_RESOLUTION_SCALE: u32 = 7;

impl TranslatorConfig {
    pub fn validate(&self) -> Result<(), TranslateError> {
        for (axis, scale) in [
            ("x", self.draw_resolution_scale_x),
            ("y", self.draw_resolution_scale_y),
        ] {
            if scale == 0 {
                return Err(TranslateError::InvalidConfig(format!(
                    "draw resolution scale {axis} must be non-zero"
                )));
            }
            if scale > MAX_DRAW_RESOLUTION_SCALE {
                return Err(TranslateError::InvalidConfig(format!(
                    "draw resolution scale {axis} is {scale}, maximum is {MAX_DRAW_RESOLUTION_SCALE}"
                )));
            }
        }
        Ok(())
    }

    /// Whether control flow dispatch uses `switch`.
    pub fn use_switch(&self) -> bool {
        self.use_switch_for_control_flow && self.vendor != Vendor::Intel
    }

    pub fn draw_resolution_scale(&self) -> (u32, u32) {
        (
            self.draw_resolution_scale_x.max(1),
            self.draw_resolution_scale_y.max(1),
        )
    }

    /// Stable byte encoding for cache keys.
    pub(crate) fn key_bytes(&self) -> [u8; 16] {
        let flags = u32::from(self.bindless_resources_used)
            | u32::from(self.edram_rov_used) << 1
            | u32::from(self.gamma_render_target_as_srgb) << 2
            | u32::from(self.msaa_2x_supported) << 3
            | u32::from(self.force_emit_source_map) << 4
            | u32::from(self.use_switch_for_control_flow) << 5
            | u32::from(self.merge_exec_conditionals) << 6;
        let mut out = [0; 16];
        out[0..4].copy_from_slice(&(self.vendor as u32).to_le_bytes());
        out[4..8].copy_from_slice(&flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.draw_resolution_scale_x.to_le_bytes());
        out[12..16].copy_from_slice(&self.draw_resolution_scale_y.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(TranslatorConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let config = TranslatorConfig {
            draw_resolution_scale_y: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TranslateError::InvalidConfig(msg)) if msg.contains("scale y")
        ));
    }

    #[test]
    fn intel_disables_switch() {
        let config = TranslatorConfig {
            vendor: Vendor::Intel,
            ..Default::default()
        };
        assert!(!config.use_switch());
        assert!(TranslatorConfig::default().use_switch());
    }

    #[test]
    fn key_bytes_differ_per_field() {
        let base = TranslatorConfig::default();
        let rov = TranslatorConfig {
            edram_rov_used: true,
            ..base
        };
        let scaled = TranslatorConfig {
            draw_resolution_scale_x: 2,
            ..base
        };
        assert_ne!(base.key_bytes(), rov.key_bytes());
        assert_ne!(base.key_bytes(), scaled.key_bytes());
        assert_eq!(base.key_bytes(), TranslatorConfig::default().key_bytes());
    }
}
