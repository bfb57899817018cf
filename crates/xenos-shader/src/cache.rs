//! In-memory translation cache keyed by a hash of everything that affects the
//! output.

use std::sync::Arc;

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use tracing::debug;

use crate::config::TranslatorConfig;
use crate::error::CacheError;
use crate::modification::Modification;
use crate::shader::{ShaderInfo, ShaderStage, Translation};
use crate::translator::Translator;
use crate::ucode::ParsedInstruction;

/// Longest instruction stream accepted, control-flow items included.
pub const MAX_INSTRUCTIONS: usize = 16384;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// The translation was already cached.
    Memory,
    /// The translator ran and the output was inserted.
    Translated,
}

#[derive(Debug)]
pub struct CacheLookup<'a> {
    pub source: LookupSource,
    translation: &'a Arc<Translation>,
}

impl CacheLookup<'_> {
    /// A shared handle that outlives the cache borrow.
    pub fn shared(&self) -> Arc<Translation> {
        Arc::clone(self.translation)
    }
}

impl std::ops::Deref for CacheLookup<'_> {
    type Target = Translation;

    fn deref(&self) -> &Self::Target {
        self.translation
    }
}

/// Owns a [`Translator`] and remembers its outputs.
pub struct TranslationCache {
    map: HashMap<blake3::Hash, Arc<Translation>>,
    translator: Translator,
}

impl TranslationCache {
    pub fn new(translator: Translator) -> Self {
        Self {
            map: HashMap::new(),
            translator,
        }
    }

    pub fn config(&self) -> TranslatorConfig {
        *self.translator.config()
    }

    /// Replaces the translator, dropping every cached translation if the
    /// configuration changed.
    pub fn set_translator(&mut self, translator: Translator) {
        if *translator.config() != *self.translator.config() {
            self.map.clear();
        }
        self.translator = translator;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Cache key of one translation.
    ///
    /// `ucode` is the raw guest microcode the instructions were parsed from.
    pub fn key(&self, ucode: &[u32], stage: ShaderStage, modification: Modification) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&Modification::VERSION.to_le_bytes());
        hasher.update(&self.translator.config().key_bytes());
        hasher.update(&[stage as u8]);
        hasher.update(&modification.0.to_le_bytes());
        hasher.update(bytemuck::cast_slice(ucode));
        hasher.finalize()
    }

    pub fn get_or_translate(
        &mut self,
        ucode: &[u32],
        instructions: &[ParsedInstruction],
        info: &ShaderInfo,
        modification: Modification,
    ) -> Result<CacheLookup<'_>, CacheError> {
        if instructions.len() > MAX_INSTRUCTIONS {
            return Err(CacheError::TooLarge {
                len: instructions.len(),
                max: MAX_INSTRUCTIONS,
            });
        }

        let hash = self.key(ucode, info.stage, modification);
        match self.map.entry(hash) {
            Entry::Occupied(e) => Ok(CacheLookup {
                source: LookupSource::Memory,
                translation: e.into_mut(),
            }),
            Entry::Vacant(e) => {
                let translated = self.translator.translate(instructions, info, modification)?;
                debug!(stage = ?info.stage, hash = %hash, "cached new translation");
                Ok(CacheLookup {
                    source: LookupSource::Translated,
                    translation: e.insert(Arc::new(translated)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ucode::{
        ExecCondition, ExecInstruction, InstructionOperand, InstructionResult, Predication,
        ResultStorage, VectorAluInstruction, VectorOpcode,
    };

    fn program() -> Vec<ParsedInstruction> {
        let exec = ExecInstruction {
            cf_index: 0,
            instruction_address: 0,
            instruction_count: 1,
            condition: ExecCondition::Unconditional,
            is_end: true,
        };
        vec![
            ParsedInstruction::Exec(exec),
            ParsedInstruction::VectorAlu(VectorAluInstruction {
                opcode: VectorOpcode::Add,
                predication: Predication::NONE,
                result: InstructionResult::new(ResultStorage::Register, 0, 0b1111),
                operands: vec![InstructionOperand::register(0), InstructionOperand::register(1)],
            }),
            ParsedInstruction::ExecEnd(exec),
        ]
    }

    fn info() -> ShaderInfo {
        let mut info = ShaderInfo::new(ShaderStage::Vertex);
        info.register_count = 2;
        info
    }

    #[test]
    fn second_lookup_hits_memory() {
        let translator = Translator::new(TranslatorConfig::default()).unwrap();
        let mut cache = TranslationCache::new(translator);
        let ucode = [1u32, 2, 3, 4, 5, 6];
        let modification = Modification::default_vertex();

        let first = cache
            .get_or_translate(&ucode, &program(), &info(), modification)
            .unwrap();
        assert_eq!(first.source, LookupSource::Translated);
        let dxbc = first.dxbc.clone();

        let second = cache
            .get_or_translate(&ucode, &program(), &info(), modification)
            .unwrap();
        assert_eq!(second.source, LookupSource::Memory);
        assert_eq!(second.dxbc, dxbc);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn key_depends_on_modification_and_ucode() {
        let cache = TranslationCache::new(Translator::new(TranslatorConfig::default()).unwrap());
        let a = cache.key(&[1, 2], ShaderStage::Vertex, Modification::default_vertex());
        let b = cache.key(&[1, 3], ShaderStage::Vertex, Modification::default_vertex());
        let c = cache.key(
            &[1, 2],
            ShaderStage::Vertex,
            Modification(Modification::default_vertex().0 ^ 1),
        );
        let d = cache.key(&[1, 2], ShaderStage::Pixel, Modification::default_vertex());
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn config_change_clears_entries() {
        let mut cache = TranslationCache::new(Translator::new(TranslatorConfig::default()).unwrap());
        cache
            .get_or_translate(&[7], &program(), &info(), Modification::default_vertex())
            .unwrap();
        assert_eq!(cache.len(), 1);

        cache.set_translator(Translator::new(TranslatorConfig::default()).unwrap());
        assert_eq!(cache.len(), 1);

        let config = TranslatorConfig {
            force_emit_source_map: true,
            ..Default::default()
        };
        cache.set_translator(Translator::new(config).unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn oversized_streams_are_rejected() {
        let mut cache = TranslationCache::new(Translator::new(TranslatorConfig::default()).unwrap());
        let instructions = vec![ParsedInstruction::Label(1); MAX_INSTRUCTIONS + 1];
        let err = cache
            .get_or_translate(&[], &instructions, &info(), Modification::default_vertex())
            .unwrap_err();
        assert_eq!(
            err,
            CacheError::TooLarge {
                len: MAX_INSTRUCTIONS + 1,
                max: MAX_INSTRUCTIONS
            }
        );
    }
}
