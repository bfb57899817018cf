//! Texture and sampler binding tables built up while translating fetches.

use crate::xenos::{AnisoFilter, TextureDimension, TextureFilter};

/// Most texture SRVs one shader may reference.
pub const MAX_TEXTURE_BINDINGS: usize = 255;
/// Most samplers one shader may reference.
pub const MAX_SAMPLER_BINDINGS: usize = 127;

/// A texture view referenced by the shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    pub fetch_constant: u32,
    /// 1D is folded into 2D.
    pub dimension: TextureDimension,
    /// Whether this is the signed view of the texture.
    pub is_signed: bool,
    /// The view must be bound even if no component has this signedness,
    /// because `getCompTexLOD` reads it.
    pub is_sign_required: bool,
    /// Index into the table, the `t#` register is this plus one in bindful
    /// mode.
    pub slot: u32,
    /// Element of the descriptor indices buffer holding the heap index of
    /// this view, in bindless mode.
    pub descriptor_index: u32,
    pub name: String,
}

/// A sampler referenced by the shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplerBinding {
    pub fetch_constant: u32,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub mip_filter: TextureFilter,
    pub aniso_filter: AnisoFilter,
    pub slot: u32,
    /// Element of the descriptor indices buffer, in bindless mode.
    pub descriptor_index: u32,
    pub name: String,
}

/// Outcome of a find-or-add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Existing(u32),
    Added(u32),
    /// The table is full, the last slot is returned.
    Clamped(u32),
}

impl Lookup {
    pub fn slot(self) -> u32 {
        match self {
            Self::Existing(slot) | Self::Added(slot) | Self::Clamped(slot) => slot,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BindingTables {
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    /// Descriptor indices handed out, shared by textures and samplers.
    pub descriptor_count: u32,
}

impl BindingTables {
    pub fn clear(&mut self) {
        self.textures.clear();
        self.samplers.clear();
        self.descriptor_count = 0;
    }

    fn next_descriptor_index(&mut self) -> u32 {
        self.descriptor_count += 1;
        self.descriptor_count - 1
    }

    pub fn find_or_add_texture(
        &mut self,
        fetch_constant: u32,
        dimension: TextureDimension,
        is_signed: bool,
        is_sign_required: bool,
    ) -> Lookup {
        let dimension = match dimension {
            TextureDimension::D1 => TextureDimension::D2,
            other => other,
        };
        if let Some(existing) = self.textures.iter_mut().find(|binding| {
            binding.fetch_constant == fetch_constant
                && binding.dimension == dimension
                && binding.is_signed == is_signed
        }) {
            existing.is_sign_required |= is_sign_required;
            return Lookup::Existing(existing.slot);
        }
        if self.textures.len() >= MAX_TEXTURE_BINDINGS {
            return Lookup::Clamped(MAX_TEXTURE_BINDINGS as u32 - 1);
        }
        let slot = self.textures.len() as u32;
        let descriptor_index = self.next_descriptor_index();
        let dimension_name = match dimension {
            TextureDimension::D3 => "3d",
            TextureDimension::Cube => "cube",
            TextureDimension::D1 | TextureDimension::D2 => "2d",
        };
        self.textures.push(TextureBinding {
            fetch_constant,
            dimension,
            is_signed,
            is_sign_required,
            slot,
            descriptor_index,
            name: format!(
                "xe_texture{fetch_constant}_{dimension_name}_{}",
                if is_signed { 's' } else { 'u' }
            ),
        });
        Lookup::Added(slot)
    }

    pub fn find_or_add_sampler(
        &mut self,
        fetch_constant: u32,
        mut mag_filter: TextureFilter,
        mut min_filter: TextureFilter,
        mut mip_filter: TextureFilter,
        mut aniso_filter: AnisoFilter,
    ) -> Lookup {
        // Host anisotropic filtering implies linear filtering.
        if !matches!(aniso_filter, AnisoFilter::Disabled | AnisoFilter::UseFetchConst) {
            mag_filter = TextureFilter::Linear;
            min_filter = TextureFilter::Linear;
            mip_filter = TextureFilter::Linear;
            aniso_filter = aniso_filter.min(AnisoFilter::Max16To1);
        }
        if let Some(existing) = self.samplers.iter().find(|binding| {
            binding.fetch_constant == fetch_constant
                && binding.mag_filter == mag_filter
                && binding.min_filter == min_filter
                && binding.mip_filter == mip_filter
                && binding.aniso_filter == aniso_filter
        }) {
            return Lookup::Existing(existing.slot);
        }
        if self.samplers.len() >= MAX_SAMPLER_BINDINGS {
            return Lookup::Clamped(MAX_SAMPLER_BINDINGS as u32 - 1);
        }

        let mut name = format!("xe_sampler{fetch_constant}");
        match aniso_filter {
            AnisoFilter::UseFetchConst => {}
            AnisoFilter::Disabled => name.push_str("_a0"),
            other => name.push_str(&format!("_a{}", 1u32 << (other as u32 - 1))),
        }
        if matches!(aniso_filter, AnisoFilter::Disabled | AnisoFilter::UseFetchConst) {
            const SUFFIXES: [char; 4] = ['p', 'l', 'b', 'f'];
            name.push('_');
            for filter in [mag_filter, min_filter, mip_filter] {
                name.push(SUFFIXES[filter as usize]);
            }
        }

        let slot = self.samplers.len() as u32;
        let descriptor_index = self.next_descriptor_index();
        self.samplers.push(SamplerBinding {
            fetch_constant,
            mag_filter,
            min_filter,
            mip_filter,
            aniso_filter,
            slot,
            descriptor_index,
            name,
        });
        Lookup::Added(slot)
    }
}
