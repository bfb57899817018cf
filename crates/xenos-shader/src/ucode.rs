//! Parsed guest microcode, the translator's input.
//!
//! The decoder that produces these lives outside this crate. Everything here
//! is plain data; [`fmt::Display`] gives the one-line disassembly used by the
//! source map.

use std::fmt;

use crate::xenos::{AnisoFilter, SignedRepeatingFractionMode, SurfaceFormat, TextureDimension, TextureFilter};

/// Source of one operand or result component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SwizzleSource {
    #[default]
    X,
    Y,
    Z,
    W,
    Zero,
    One,
}

impl SwizzleSource {
    /// The standard `xyzw` swizzle.
    pub const XYZW: [SwizzleSource; 4] = [Self::X, Self::Y, Self::Z, Self::W];

    /// Register component, or `None` for the constants.
    pub const fn component(self) -> Option<u32> {
        match self {
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
            Self::W => Some(3),
            Self::Zero | Self::One => None,
        }
    }

    /// The source reading register component `component & 3`.
    pub const fn from_component(component: u32) -> Self {
        match component & 3 {
            0 => Self::X,
            1 => Self::Y,
            2 => Self::Z,
            _ => Self::W,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::X => 'x',
            Self::Y => 'y',
            Self::Z => 'z',
            Self::W => 'w',
            Self::Zero => '0',
            Self::One => '1',
        }
    }
}

/// Where an operand is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandStorage {
    Register,
    FloatConstant,
    VertexFetchConstant,
    TextureFetchConstant,
}

/// How the storage index is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressingMode {
    #[default]
    Absolute,
    /// Index plus `a0`.
    AddressRelative,
    /// Index plus `aL`.
    LoopRelative,
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionOperand {
    pub storage: OperandStorage,
    pub index: u32,
    pub addressing: AddressingMode,
    pub is_absolute_value: bool,
    pub is_negated: bool,
    /// 1 to 4. Components past the count repeat the last one.
    pub component_count: u32,
    pub components: [SwizzleSource; 4],
}

impl InstructionOperand {
    /// Guest register `r<index>.xyzw`.
    pub const fn register(index: u32) -> Self {
        Self {
            storage: OperandStorage::Register,
            index,
            addressing: AddressingMode::Absolute,
            is_absolute_value: false,
            is_negated: false,
            component_count: 4,
            components: SwizzleSource::XYZW,
        }
    }

    /// Float constant `c<index>.xyzw`.
    pub const fn float_constant(index: u32) -> Self {
        let mut operand = Self::register(index);
        operand.storage = OperandStorage::FloatConstant;
        operand
    }

    /// Replaces the swizzle.
    #[must_use]
    pub const fn swizzled(mut self, components: [SwizzleSource; 4]) -> Self {
        self.components = components;
        self.component_count = 4;
        self
    }

    /// Makes this a scalar operand reading `component`.
    #[must_use]
    pub const fn scalar(mut self, component: SwizzleSource) -> Self {
        self.components = [component; 4];
        self.component_count = 1;
        self
    }

    /// Sets the addressing mode.
    #[must_use]
    pub const fn addressed(mut self, addressing: AddressingMode) -> Self {
        self.addressing = addressing;
        self
    }

    /// Sets the modifiers.
    #[must_use]
    pub const fn modified(mut self, absolute: bool, negated: bool) -> Self {
        self.is_absolute_value = absolute;
        self.is_negated = negated;
        self
    }

    /// The source of component `i`, repeating the last one past the count.
    pub fn component(&self, i: u32) -> SwizzleSource {
        let last = self.component_count.clamp(1, 4) - 1;
        self.components[i.min(last) as usize]
    }

    /// Register components read when `needed_mask` components of the operand
    /// are used.
    pub fn used_components(&self, needed_mask: u32) -> u32 {
        (0..4)
            .filter(|i| needed_mask & (1 << i) != 0)
            .filter_map(|i| self.component(i).component())
            .fold(0, |mask, c| mask | (1 << c))
    }

    /// Whether component `i` of `self` and component `j` of `other` always
    /// hold the same value, ignoring negation.
    pub fn same_value_as(&self, i: u32, other: &Self, j: u32) -> bool {
        self.storage == other.storage
            && self.index == other.index
            && self.addressing == other.addressing
            && self.is_absolute_value == other.is_absolute_value
            && self.component(i) == other.component(j)
    }

    /// Whether every component reads the same register.
    pub fn is_identical(&self, other: &Self) -> bool {
        (0..4).all(|i| self.same_value_as(i, other, i)) && self.is_negated == other.is_negated
    }
}

/// Where a result is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultStorage {
    #[default]
    None,
    Register,
    Interpolator,
    Position,
    /// `oPts.x` point size, `.y` edge flag, `.z` vertex kill.
    PointSizeEdgeFlagKillVertex,
    ExportAddress,
    ExportData,
    Color,
    Depth,
}

/// An instruction result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstructionResult {
    pub storage: ResultStorage,
    pub index: u32,
    pub addressing: AddressingMode,
    pub original_write_mask: u32,
    pub components: [SwizzleSource; 4],
    /// Saturate.
    pub is_clamped: bool,
}

impl InstructionResult {
    /// Writes `mask` of `target<index>` with the standard swizzle.
    pub const fn new(storage: ResultStorage, index: u32, mask: u32) -> Self {
        Self {
            storage,
            index,
            addressing: AddressingMode::Absolute,
            original_write_mask: mask,
            components: SwizzleSource::XYZW,
            is_clamped: false,
        }
    }

    /// Replaces the swizzle.
    #[must_use]
    pub const fn swizzled(mut self, components: [SwizzleSource; 4]) -> Self {
        self.components = components;
        self
    }

    /// Sets saturation.
    #[must_use]
    pub const fn clamped(mut self, is_clamped: bool) -> Self {
        self.is_clamped = is_clamped;
        self
    }

    /// The write mask limited to the components the target has.
    pub const fn used_write_mask(&self) -> u32 {
        match self.storage {
            ResultStorage::None => 0,
            ResultStorage::PointSizeEdgeFlagKillVertex => self.original_write_mask & 0b0111,
            ResultStorage::Depth => self.original_write_mask & 0b0001,
            _ => self.original_write_mask & 0b1111,
        }
    }

    /// Components of the computed value that end up stored.
    pub fn used_result_components(&self) -> u32 {
        let write_mask = self.used_write_mask();
        (0..4)
            .filter(|i| write_mask & (1 << i) != 0)
            .filter_map(|i| self.components[i].component())
            .fold(0, |mask, c| mask | (1 << c))
    }

    /// Whether the stored components are taken in place.
    pub fn is_standard_swizzle(&self) -> bool {
        let write_mask = self.used_write_mask();
        (0..4).all(|i| write_mask & (1 << i) == 0 || self.components[i] == SwizzleSource::XYZW[i])
    }
}

macro_rules! opcodes {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal => $mnemonic:literal,)* }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)*
            /// An encoding with no known meaning.
            Unknown(u32),
        }

        impl $name {
            /// Decodes the raw opcode field.
            pub const fn from_raw(raw: u32) -> Self {
                match raw {
                    $($value => Self::$variant,)*
                    other => Self::Unknown(other),
                }
            }

            /// The raw opcode field.
            pub const fn raw(self) -> u32 {
                match self {
                    $(Self::$variant => $value,)*
                    Self::Unknown(raw) => raw,
                }
            }

            /// Assembler mnemonic.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$variant => $mnemonic,)*
                    Self::Unknown(_) => "unknown",
                }
            }
        }
    };
}

opcodes! {
    /// Vector ALU opcodes.
    VectorOpcode {
        Add = 0 => "add",
        Mul = 1 => "mul",
        Max = 2 => "max",
        Min = 3 => "min",
        Seq = 4 => "seq",
        Sgt = 5 => "sgt",
        Sge = 6 => "sge",
        Sne = 7 => "sne",
        Frc = 8 => "frc",
        Trunc = 9 => "trunc",
        Floor = 10 => "floor",
        Mad = 11 => "mad",
        CndEq = 12 => "cndeq",
        CndGe = 13 => "cndge",
        CndGt = 14 => "cndgt",
        Dp4 = 15 => "dp4",
        Dp3 = 16 => "dp3",
        Dp2Add = 17 => "dp2add",
        Cube = 18 => "cube",
        Max4 = 19 => "max4",
        SetpEqPush = 20 => "setp_eq_push",
        SetpNePush = 21 => "setp_ne_push",
        SetpGtPush = 22 => "setp_gt_push",
        SetpGePush = 23 => "setp_ge_push",
        KillEq = 24 => "kill_eq",
        KillGt = 25 => "kill_gt",
        KillGe = 26 => "kill_ge",
        KillNe = 27 => "kill_ne",
        Dst = 28 => "dst",
        MaxA = 29 => "maxa",
    }
}

opcodes! {
    /// Scalar ALU opcodes.
    ScalarOpcode {
        Adds = 0 => "adds",
        AddsPrev = 1 => "adds_prev",
        Muls = 2 => "muls",
        MulsPrev = 3 => "muls_prev",
        MulsPrev2 = 4 => "muls_prev2",
        Maxs = 5 => "maxs",
        Mins = 6 => "mins",
        Seqs = 7 => "seqs",
        Sgts = 8 => "sgts",
        Sges = 9 => "sges",
        Snes = 10 => "snes",
        Frcs = 11 => "frcs",
        Truncs = 12 => "truncs",
        Floors = 13 => "floors",
        Exp = 14 => "exp",
        Logc = 15 => "logc",
        Log = 16 => "log",
        Rcpc = 17 => "rcpc",
        Rcpf = 18 => "rcpf",
        Rcp = 19 => "rcp",
        Rsqc = 20 => "rsqc",
        Rsqf = 21 => "rsqf",
        Rsq = 22 => "rsq",
        MaxAs = 23 => "maxas",
        MaxAsf = 24 => "maxasf",
        Subs = 25 => "subs",
        SubsPrev = 26 => "subs_prev",
        SetpEq = 27 => "setp_eq",
        SetpNe = 28 => "setp_ne",
        SetpGt = 29 => "setp_gt",
        SetpGe = 30 => "setp_ge",
        SetpInv = 31 => "setp_inv",
        SetpPop = 32 => "setp_pop",
        SetpClr = 33 => "setp_clr",
        SetpRstr = 34 => "setp_rstr",
        KillsEq = 35 => "kills_eq",
        KillsGt = 36 => "kills_gt",
        KillsGe = 37 => "kills_ge",
        KillsNe = 38 => "kills_ne",
        KillsOne = 39 => "kills_one",
        Sqrt = 40 => "sqrt",
        MulsC0 = 42 => "mulsc",
        MulsC1 = 43 => "mulsc",
        AddsC0 = 44 => "addsc",
        AddsC1 = 45 => "addsc",
        SubsC0 = 46 => "subsc",
        SubsC1 = 47 => "subsc",
        Sin = 48 => "sin",
        Cos = 49 => "cos",
        RetainPrev = 50 => "retain_prev",
    }
}

impl VectorOpcode {
    /// Number of operands.
    pub const fn operand_count(self) -> u32 {
        match self {
            Self::Frc | Self::Trunc | Self::Floor | Self::Max4 => 1,
            Self::Mad | Self::CndEq | Self::CndGe | Self::CndGt | Self::Dp2Add => 3,
            _ => 2,
        }
    }

    /// Whether the op writes the predicate.
    pub const fn writes_predicate(self) -> bool {
        matches!(
            self,
            Self::SetpEqPush | Self::SetpNePush | Self::SetpGtPush | Self::SetpGePush
        )
    }

    /// Whether the op can kill the pixel.
    pub const fn is_kill(self) -> bool {
        matches!(self, Self::KillEq | Self::KillGt | Self::KillGe | Self::KillNe)
    }
}

impl ScalarOpcode {
    /// Whether the op writes the predicate.
    pub const fn writes_predicate(self) -> bool {
        matches!(
            self,
            Self::SetpEq
                | Self::SetpNe
                | Self::SetpGt
                | Self::SetpGe
                | Self::SetpInv
                | Self::SetpPop
                | Self::SetpClr
                | Self::SetpRstr
        )
    }

    /// Whether the op can kill the pixel.
    pub const fn is_kill(self) -> bool {
        matches!(
            self,
            Self::KillsEq | Self::KillsGt | Self::KillsGe | Self::KillsNe | Self::KillsOne
        )
    }

    /// Whether the op takes two constant operands (`c0`/`c1` forms).
    pub const fn has_two_operands(self) -> bool {
        matches!(
            self,
            Self::MulsC0 | Self::MulsC1 | Self::AddsC0 | Self::AddsC1 | Self::SubsC0 | Self::SubsC1
        )
    }
}

/// Instruction-level predication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Predication {
    pub is_predicated: bool,
    /// Executes when `p0 == condition`.
    pub condition: bool,
}

impl Predication {
    /// Always executes.
    pub const NONE: Self = Self {
        is_predicated: false,
        condition: false,
    };

    /// Executes when `p0 == condition`.
    pub const fn on(condition: bool) -> Self {
        Self {
            is_predicated: true,
            condition,
        }
    }
}

/// A vector ALU operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorAluInstruction {
    pub opcode: VectorOpcode,
    pub predication: Predication,
    pub result: InstructionResult,
    pub operands: Vec<InstructionOperand>,
}

/// A scalar ALU operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarAluInstruction {
    pub opcode: ScalarOpcode,
    pub predication: Predication,
    pub result: InstructionResult,
    pub operands: Vec<InstructionOperand>,
}

/// Vertex fetch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexFetchAttributes {
    pub format: SurfaceFormat,
    /// Offset of the element within the vertex, in dwords.
    pub offset: i32,
    /// Vertex stride in dwords.
    pub stride: u32,
    /// Power of two the result is multiplied by.
    pub exp_adjust: i32,
    /// Round the index to nearest instead of flooring it.
    pub is_index_rounded: bool,
    pub is_signed: bool,
    /// Convert integers without normalization.
    pub is_integer: bool,
    pub signed_rf_mode: SignedRepeatingFractionMode,
}

/// A vertex fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexFetchInstruction {
    /// Reuses the address of the previous full fetch.
    pub is_mini_fetch: bool,
    pub predication: Predication,
    pub result: InstructionResult,
    /// Vertex index, `.x` is used.
    pub operand: InstructionOperand,
    pub fetch_constant: u32,
    pub attributes: VertexFetchAttributes,
}

/// Texture fetch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFetchOpcode {
    TextureFetch,
    GetBorderColorFrac,
    GetComputedTexLod,
    GetGradients,
    GetWeights,
    SetTextureLod,
    SetGradientsHorz,
    SetGradientsVert,
}

impl TextureFetchOpcode {
    /// Assembler mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::TextureFetch => "tfetch",
            Self::GetBorderColorFrac => "getBCF",
            Self::GetComputedTexLod => "getCompTexLOD",
            Self::GetGradients => "getGradients",
            Self::GetWeights => "getWeights",
            Self::SetTextureLod => "setTexLOD",
            Self::SetGradientsHorz => "setGradientH",
            Self::SetGradientsVert => "setGradientV",
        }
    }

    /// Whether the op writes a result register.
    pub const fn has_result(self) -> bool {
        !matches!(
            self,
            Self::SetTextureLod | Self::SetGradientsHorz | Self::SetGradientsVert
        )
    }
}

/// Texture fetch parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureFetchAttributes {
    pub fetch_valid_only: bool,
    pub unnormalized_coordinates: bool,
    pub mag_filter: TextureFilter,
    pub min_filter: TextureFilter,
    pub mip_filter: TextureFilter,
    pub aniso_filter: AnisoFilter,
    pub vol_mag_filter: TextureFilter,
    pub vol_min_filter: TextureFilter,
    pub use_computed_lod: bool,
    pub use_register_lod: bool,
    pub use_register_gradients: bool,
    pub lod_bias: f32,
    /// Texel offsets, in 0.5 steps.
    pub offset: [f32; 3],
}

impl Default for TextureFetchAttributes {
    fn default() -> Self {
        Self {
            fetch_valid_only: true,
            unnormalized_coordinates: false,
            mag_filter: TextureFilter::UseFetchConst,
            min_filter: TextureFilter::UseFetchConst,
            mip_filter: TextureFilter::UseFetchConst,
            aniso_filter: AnisoFilter::UseFetchConst,
            vol_mag_filter: TextureFilter::UseFetchConst,
            vol_min_filter: TextureFilter::UseFetchConst,
            use_computed_lod: true,
            use_register_lod: false,
            use_register_gradients: false,
            lod_bias: 0.0,
            offset: [0.0; 3],
        }
    }
}

/// A texture fetch or texture state operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureFetchInstruction {
    pub opcode: TextureFetchOpcode,
    pub dimension: TextureDimension,
    pub predication: Predication,
    pub result: InstructionResult,
    /// Coordinates or LOD/gradient source, absent for ops without one.
    pub operand: Option<InstructionOperand>,
    pub fetch_constant: u32,
    pub attributes: TextureFetchAttributes,
}

/// Condition of an exec or jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecCondition {
    #[default]
    Unconditional,
    /// Runs when bool constant `index` equals `condition`.
    BoolConstant { index: u32, condition: bool },
    /// Runs when `p0` equals `condition`.
    Predicate { condition: bool },
}

/// An exec block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExecInstruction {
    /// Control-flow instruction index.
    pub cf_index: u32,
    /// Address of the first ALU/fetch instruction.
    pub instruction_address: u32,
    pub instruction_count: u32,
    pub condition: ExecCondition,
    /// `exece`: the shader ends after this block.
    pub is_end: bool,
}

/// A jump to a control-flow address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JumpInstruction {
    pub cf_index: u32,
    pub target_address: u32,
    pub condition: ExecCondition,
}

/// `loop il<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopStartInstruction {
    pub cf_index: u32,
    pub loop_constant_index: u32,
    /// Keep `aL` from the enclosing loop.
    pub is_repeat: bool,
    /// Where to go when the count is zero.
    pub loop_skip_address: u32,
}

/// `endloop il<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopEndInstruction {
    pub cf_index: u32,
    pub loop_constant_index: u32,
    /// Leave early when `p0 == predicate_condition`.
    pub is_predicated_break: bool,
    pub predicate_condition: bool,
    /// First instruction of the body.
    pub loop_body_address: u32,
}

/// Export allocation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    None,
    /// Vertex position or pixel colors.
    Position,
    Interpolators,
    Memory,
}

/// `alloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocInstruction {
    pub cf_index: u32,
    pub kind: AllocKind,
    pub count: u32,
}

/// One translator input item, in program order.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedInstruction {
    VectorAlu(VectorAluInstruction),
    ScalarAlu(ScalarAluInstruction),
    VertexFetch(VertexFetchInstruction),
    TextureFetch(TextureFetchInstruction),
    /// Start of an exec block; its ALU and fetch instructions follow.
    Exec(ExecInstruction),
    /// End of the exec block started by the matching [`ParsedInstruction::Exec`].
    ExecEnd(ExecInstruction),
    Jump(JumpInstruction),
    LoopStart(LoopStartInstruction),
    LoopEnd(LoopEndInstruction),
    Alloc(AllocInstruction),
    /// A control-flow address that jumps and loops can target.
    Label(u32),
}

impl ParsedInstruction {
    /// The predication of ALU and fetch instructions.
    pub fn predication(&self) -> Predication {
        match self {
            Self::VectorAlu(i) => i.predication,
            Self::ScalarAlu(i) => i.predication,
            Self::VertexFetch(i) => i.predication,
            Self::TextureFetch(i) => i.predication,
            _ => Predication::NONE,
        }
    }
}

struct DisplayOperand<'a>(&'a InstructionOperand);

impl fmt::Display for DisplayOperand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operand = self.0;
        if operand.is_negated {
            f.write_str("-")?;
        }
        if operand.is_absolute_value {
            f.write_str("|")?;
        }
        let prefix = match operand.storage {
            OperandStorage::Register => "r",
            OperandStorage::FloatConstant => "c",
            OperandStorage::VertexFetchConstant => "vf",
            OperandStorage::TextureFetchConstant => "tf",
        };
        match operand.addressing {
            AddressingMode::Absolute => write!(f, "{prefix}{}", operand.index)?,
            AddressingMode::AddressRelative => write!(f, "{prefix}[{}+a0]", operand.index)?,
            AddressingMode::LoopRelative => write!(f, "{prefix}[{}+aL]", operand.index)?,
        }
        if operand.is_absolute_value {
            f.write_str("|")?;
        }
        if operand.components[..operand.component_count.clamp(1, 4) as usize] != SwizzleSource::XYZW
        {
            f.write_str(".")?;
            for i in 0..operand.component_count.clamp(1, 4) {
                write!(f, "{}", operand.component(i).as_char())?;
            }
        }
        Ok(())
    }
}

struct DisplayResult<'a>(&'a InstructionResult);

impl fmt::Display for DisplayResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        match result.storage {
            ResultStorage::None => return f.write_str("_"),
            ResultStorage::Register => match result.addressing {
                AddressingMode::Absolute => write!(f, "r{}", result.index)?,
                AddressingMode::AddressRelative => write!(f, "r[{}+a0]", result.index)?,
                AddressingMode::LoopRelative => write!(f, "r[{}+aL]", result.index)?,
            },
            ResultStorage::Interpolator => write!(f, "o{}", result.index)?,
            ResultStorage::Position => f.write_str("oPos")?,
            ResultStorage::PointSizeEdgeFlagKillVertex => f.write_str("oPts")?,
            ResultStorage::ExportAddress => f.write_str("eA")?,
            ResultStorage::ExportData => write!(f, "eM{}", result.index)?,
            ResultStorage::Color => write!(f, "oC{}", result.index)?,
            ResultStorage::Depth => f.write_str("oDepth")?,
        }
        f.write_str(".")?;
        for i in 0..4 {
            if result.original_write_mask & (1 << i) != 0 {
                write!(f, "{}", result.components[i].as_char())?;
            } else {
                f.write_str("_")?;
            }
        }
        Ok(())
    }
}

fn write_predicate(f: &mut fmt::Formatter<'_>, predication: Predication) -> fmt::Result {
    if predication.is_predicated {
        f.write_str(if predication.condition { "(p0) " } else { "(!p0) " })?;
    }
    Ok(())
}

fn write_condition(f: &mut fmt::Formatter<'_>, condition: ExecCondition) -> fmt::Result {
    match condition {
        ExecCondition::Unconditional => Ok(()),
        ExecCondition::BoolConstant { index, condition } => {
            write!(f, " {}b{index}", if condition { "" } else { "!" })
        }
        ExecCondition::Predicate { condition } => {
            f.write_str(if condition { " p0" } else { " !p0" })
        }
    }
}

fn write_operands(f: &mut fmt::Formatter<'_>, operands: &[InstructionOperand]) -> fmt::Result {
    for operand in operands {
        write!(f, ", {}", DisplayOperand(operand))?;
    }
    Ok(())
}

impl fmt::Display for ParsedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VectorAlu(i) => {
                write_predicate(f, i.predication)?;
                write!(f, "{}{} {}", i.opcode.mnemonic(), if i.result.is_clamped { "_sat" } else { "" }, DisplayResult(&i.result))?;
                write_operands(f, &i.operands)
            }
            Self::ScalarAlu(i) => {
                write_predicate(f, i.predication)?;
                write!(f, "{}{} {}", i.opcode.mnemonic(), if i.result.is_clamped { "_sat" } else { "" }, DisplayResult(&i.result))?;
                write_operands(f, &i.operands)
            }
            Self::VertexFetch(i) => {
                write_predicate(f, i.predication)?;
                write!(
                    f,
                    "{} {}, {}, vf{} format={:?} offset={} stride={}",
                    if i.is_mini_fetch { "vfetch_mini" } else { "vfetch_full" },
                    DisplayResult(&i.result),
                    DisplayOperand(&i.operand),
                    i.fetch_constant,
                    i.attributes.format,
                    i.attributes.offset,
                    i.attributes.stride
                )
            }
            Self::TextureFetch(i) => {
                write_predicate(f, i.predication)?;
                let dimension = match i.dimension {
                    TextureDimension::D1 => "1D",
                    TextureDimension::D2 => "2D",
                    TextureDimension::D3 => "3D",
                    TextureDimension::Cube => "Cube",
                };
                write!(f, "{}{dimension} {}", i.opcode.mnemonic(), DisplayResult(&i.result))?;
                if let Some(operand) = &i.operand {
                    write!(f, ", {}", DisplayOperand(operand))?;
                }
                write!(f, ", tf{}", i.fetch_constant)
            }
            Self::Exec(i) => {
                let mnemonic = match (i.condition, i.is_end) {
                    (ExecCondition::Unconditional, false) => "exec",
                    (ExecCondition::Unconditional, true) => "exece",
                    (ExecCondition::BoolConstant { .. }, false) => "cexec",
                    (ExecCondition::BoolConstant { .. }, true) => "cexece",
                    (ExecCondition::Predicate { .. }, false) => "exec_p",
                    (ExecCondition::Predicate { .. }, true) => "exece_p",
                };
                write!(f, "{mnemonic}")?;
                write_condition(f, i.condition)?;
                write!(f, " @{} x{}", i.instruction_address, i.instruction_count)
            }
            Self::ExecEnd(i) => write!(f, "; end of exec @{}", i.instruction_address),
            Self::Jump(i) => {
                f.write_str("jmp")?;
                write_condition(f, i.condition)?;
                write!(f, " L{}", i.target_address)
            }
            Self::LoopStart(i) => write!(
                f,
                "loop{} i{}, L{}",
                if i.is_repeat { "_rep" } else { "" },
                i.loop_constant_index,
                i.loop_skip_address
            ),
            Self::LoopEnd(i) => {
                f.write_str("endloop")?;
                if i.is_predicated_break {
                    f.write_str(if i.predicate_condition { " p0" } else { " !p0" })?;
                }
                write!(f, " i{}, L{}", i.loop_constant_index, i.loop_body_address)
            }
            Self::Alloc(i) => {
                let kind = match i.kind {
                    AllocKind::None => "none",
                    AllocKind::Position => "position",
                    AllocKind::Interpolators => "interpolators",
                    AllocKind::Memory => "export",
                };
                write!(f, "alloc {kind} = {}", i.count)
            }
            Self::Label(cf_index) => write!(f, "label L{cf_index}"),
        }
    }
}
