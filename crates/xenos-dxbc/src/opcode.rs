//! Shader model 5 opcode numbers, opcode-token helpers and the small
//! enumerations carried inside declaration tokens.

use bitflags::bitflags;

/// Shader model 5 instruction opcodes (`D3D10_SB_OPCODE_TYPE` subset).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Add = 0,
    And = 1,
    Break = 2,
    Call = 4,
    CallC = 5,
    Case = 6,
    Continue = 7,
    Default = 10,
    Discard = 13,
    Div = 14,
    Dp2 = 15,
    Dp3 = 16,
    Dp4 = 17,
    Else = 18,
    EndIf = 21,
    EndLoop = 22,
    EndSwitch = 23,
    Eq = 24,
    Exp = 25,
    Frc = 26,
    FToI = 27,
    FToU = 28,
    Ge = 29,
    IAdd = 30,
    If = 31,
    IEq = 32,
    IGe = 33,
    ILt = 34,
    IMad = 35,
    IMax = 36,
    IMin = 37,
    IMul = 38,
    INe = 39,
    IShl = 41,
    IToF = 43,
    Label = 44,
    Ld = 45,
    LdMs = 46,
    Log = 47,
    Loop = 48,
    Lt = 49,
    Mad = 50,
    Min = 51,
    Max = 52,
    CustomData = 53,
    Mov = 54,
    MovC = 55,
    Mul = 56,
    Ne = 57,
    Not = 59,
    Or = 60,
    ResInfo = 61,
    Ret = 62,
    RetC = 63,
    RoundNe = 64,
    RoundNi = 65,
    RoundZ = 67,
    Rsq = 68,
    Sample = 69,
    SampleC = 70,
    SampleCLz = 71,
    SampleL = 72,
    SampleD = 73,
    SampleB = 74,
    Sqrt = 75,
    Switch = 76,
    SinCos = 77,
    UDiv = 78,
    ULt = 79,
    UGe = 80,
    UMul = 81,
    UMad = 82,
    UMax = 83,
    UMin = 84,
    UShr = 85,
    UToF = 86,
    Xor = 87,
    DclResource = 88,
    DclConstantBuffer = 89,
    DclSampler = 90,
    DclInput = 95,
    DclInputSgv = 96,
    DclInputSiv = 97,
    DclInputPs = 98,
    DclInputPsSgv = 99,
    DclInputPsSiv = 100,
    DclOutput = 101,
    DclOutputSiv = 103,
    DclTemps = 104,
    DclIndexableTemp = 105,
    DclGlobalFlags = 106,
    Lod = 108,
    SamplePos = 110,
    SampleInfo = 111,
    DerivRtxCoarse = 122,
    DerivRtxFine = 123,
    DerivRtyCoarse = 124,
    DerivRtyFine = 125,
    Rcp = 129,
    F32ToF16 = 130,
    F16ToF32 = 131,
    FirstBitHi = 135,
    FirstBitLo = 136,
    UBfe = 138,
    IBfe = 139,
    Bfi = 140,
    BfRev = 141,
    DclUavTyped = 156,
    DclUavRaw = 157,
    DclResourceRaw = 161,
    LdUavTyped = 163,
    StoreUavTyped = 164,
    LdRaw = 165,
    StoreRaw = 166,
    AtomicAnd = 169,
    AtomicOr = 170,
    EvalSampleIndex = 204,
    EvalCentroid = 205,
}

impl Opcode {
    /// Every opcode this crate knows about, in numeric order.
    pub const ALL: &'static [Opcode] = &[
        Opcode::Add,
        Opcode::And,
        Opcode::Break,
        Opcode::Call,
        Opcode::CallC,
        Opcode::Case,
        Opcode::Continue,
        Opcode::Default,
        Opcode::Discard,
        Opcode::Div,
        Opcode::Dp2,
        Opcode::Dp3,
        Opcode::Dp4,
        Opcode::Else,
        Opcode::EndIf,
        Opcode::EndLoop,
        Opcode::EndSwitch,
        Opcode::Eq,
        Opcode::Exp,
        Opcode::Frc,
        Opcode::FToI,
        Opcode::FToU,
        Opcode::Ge,
        Opcode::IAdd,
        Opcode::If,
        Opcode::IEq,
        Opcode::IGe,
        Opcode::ILt,
        Opcode::IMad,
        Opcode::IMax,
        Opcode::IMin,
        Opcode::IMul,
        Opcode::INe,
        Opcode::IShl,
        Opcode::IToF,
        Opcode::Label,
        Opcode::Ld,
        Opcode::LdMs,
        Opcode::Log,
        Opcode::Loop,
        Opcode::Lt,
        Opcode::Mad,
        Opcode::Min,
        Opcode::Max,
        Opcode::CustomData,
        Opcode::Mov,
        Opcode::MovC,
        Opcode::Mul,
        Opcode::Ne,
        Opcode::Not,
        Opcode::Or,
        Opcode::ResInfo,
        Opcode::Ret,
        Opcode::RetC,
        Opcode::RoundNe,
        Opcode::RoundNi,
        Opcode::RoundZ,
        Opcode::Rsq,
        Opcode::Sample,
        Opcode::SampleC,
        Opcode::SampleCLz,
        Opcode::SampleL,
        Opcode::SampleD,
        Opcode::SampleB,
        Opcode::Sqrt,
        Opcode::Switch,
        Opcode::SinCos,
        Opcode::UDiv,
        Opcode::ULt,
        Opcode::UGe,
        Opcode::UMul,
        Opcode::UMad,
        Opcode::UMax,
        Opcode::UMin,
        Opcode::UShr,
        Opcode::UToF,
        Opcode::Xor,
        Opcode::DclResource,
        Opcode::DclConstantBuffer,
        Opcode::DclSampler,
        Opcode::DclInput,
        Opcode::DclInputSgv,
        Opcode::DclInputSiv,
        Opcode::DclInputPs,
        Opcode::DclInputPsSgv,
        Opcode::DclInputPsSiv,
        Opcode::DclOutput,
        Opcode::DclOutputSiv,
        Opcode::DclTemps,
        Opcode::DclIndexableTemp,
        Opcode::DclGlobalFlags,
        Opcode::Lod,
        Opcode::SamplePos,
        Opcode::SampleInfo,
        Opcode::DerivRtxCoarse,
        Opcode::DerivRtxFine,
        Opcode::DerivRtyCoarse,
        Opcode::DerivRtyFine,
        Opcode::Rcp,
        Opcode::F32ToF16,
        Opcode::F16ToF32,
        Opcode::FirstBitHi,
        Opcode::FirstBitLo,
        Opcode::UBfe,
        Opcode::IBfe,
        Opcode::Bfi,
        Opcode::BfRev,
        Opcode::DclUavTyped,
        Opcode::DclUavRaw,
        Opcode::DclResourceRaw,
        Opcode::LdUavTyped,
        Opcode::StoreUavTyped,
        Opcode::LdRaw,
        Opcode::StoreRaw,
        Opcode::AtomicAnd,
        Opcode::AtomicOr,
        Opcode::EvalSampleIndex,
        Opcode::EvalCentroid,
    ];

    /// Looks up an opcode from the low 11 bits of an opcode token.
    pub fn from_raw(raw: u32) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| *op as u32 == raw)
    }

    /// Whether this opcode is a declaration (its operands are written in
    /// declaration form and it does not count as an instruction).
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            Opcode::DclResource
                | Opcode::DclConstantBuffer
                | Opcode::DclSampler
                | Opcode::DclInput
                | Opcode::DclInputSgv
                | Opcode::DclInputSiv
                | Opcode::DclInputPs
                | Opcode::DclInputPsSgv
                | Opcode::DclInputPsSiv
                | Opcode::DclOutput
                | Opcode::DclOutputSiv
                | Opcode::DclTemps
                | Opcode::DclIndexableTemp
                | Opcode::DclGlobalFlags
                | Opcode::DclUavTyped
                | Opcode::DclUavRaw
                | Opcode::DclResourceRaw
                | Opcode::CustomData
        )
    }
}

/// Bit 13 of an opcode token.
pub const SATURATE_BIT: u32 = 1 << 13;
/// Bit 18 of a flow-control opcode token: the test is "nonzero".
pub const TEST_NONZERO_BIT: u32 = 1 << 18;
/// Byte used to pad strings and custom data to a dword boundary.
pub const ALIGNMENT_PADDING: u8 = 0xAB;

/// Builds an opcode token.
///
/// `operands_length` counts the dwords after the opcode token and its
/// extended tokens.
pub const fn opcode_token(
    opcode: Opcode,
    operands_length: u32,
    saturate: bool,
    extended_count: u32,
) -> u32 {
    opcode as u32
        | if saturate { SATURATE_BIT } else { 0 }
        | ((1 + extended_count + operands_length) << 24)
        | if extended_count != 0 { 1 << 31 } else { 0 }
}

/// Instruction length in dwords stored in an opcode token.
pub const fn opcode_token_length(token: u32) -> u32 {
    (token >> 24) & 0x7F
}

/// Sample-controls extended opcode token carrying immediate texel offsets.
pub const fn sample_controls_token(u: i32, v: i32, w: i32) -> u32 {
    1 | ((u as u32 & 0xF) << 9) | ((v as u32 & 0xF) << 13) | ((w as u32 & 0xF) << 17)
}

/// `D3D10_SB_RESOURCE_RETURN_TYPE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReturnType {
    Void = 0,
    UNorm = 1,
    SNorm = 2,
    SInt = 3,
    UInt = 4,
    Float = 5,
    Mixed = 6,
}

impl ReturnType {
    /// The same return type replicated into all four nibbles.
    pub const fn x4_token(self) -> u32 {
        let x = self as u32;
        x | (x << 4) | (x << 8) | (x << 12)
    }
}

/// `D3D10_SB_RESOURCE_DIMENSION`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ResourceDimension {
    Unknown = 0,
    Buffer = 1,
    Texture1D = 2,
    Texture2D = 3,
    Texture2DMs = 4,
    Texture3D = 5,
    TextureCube = 6,
    Texture1DArray = 7,
    Texture2DArray = 8,
    Texture2DMsArray = 9,
    TextureCubeArray = 10,
    RawBuffer = 11,
    StructuredBuffer = 12,
}

/// `D3D10_SB_INTERPOLATION_MODE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InterpolationMode {
    Undefined = 0,
    Constant = 1,
    Linear = 2,
    LinearCentroid = 3,
    LinearNoPerspective = 4,
    LinearNoPerspectiveCentroid = 5,
    LinearSample = 6,
    LinearNoPerspectiveSample = 7,
}

/// System-value names (`D3D10_SB_NAME`).
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Name {
    Undefined = 0,
    Position = 1,
    ClipDistance = 2,
    CullDistance = 3,
    VertexId = 6,
    IsFrontFace = 9,
    SampleIndex = 10,
}

/// `D3D10_SB_SAMPLER_MODE`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SamplerMode {
    #[default]
    Default = 0,
    Comparison = 1,
}

/// `D3D10_SB_CONSTANT_BUFFER_ACCESS_PATTERN`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CbAccessPattern {
    #[default]
    ImmediateIndexed = 0,
    DynamicIndexed = 1,
}

/// Program type stored in the version token.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProgramType {
    Pixel = 0,
    Vertex = 1,
    Geometry = 2,
    Hull = 3,
    Domain = 4,
    Compute = 5,
}

/// Builds the version token at the start of an `SHEX` chunk.
pub const fn version_token(program_type: ProgramType, major: u32, minor: u32) -> u32 {
    ((program_type as u32) << 16) | (major << 4) | minor
}

/// Class of a `customdata` block.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CustomDataClass {
    Comment = 0,
    DebugInfo = 1,
    Opaque = 2,
    ImmediateConstantBuffer = 3,
}

bitflags! {
    /// `D3D10_SB_GLOBAL_FLAGS_MASK`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GlobalFlags: u32 {
        /// Allow the driver to reorder arithmetic.
        const REFACTORING_ALLOWED = 1 << 11;
        /// Run depth/stencil before the shader.
        const FORCE_EARLY_DEPTH_STENCIL = 1 << 13;
        /// Every declared resource is bound (D3D12).
        const ALL_RESOURCES_BOUND = 1 << 19;
    }
}

bitflags! {
    /// Flags in a UAV declaration token.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UavFlags: u32 {
        /// `globallycoherent`.
        const GLOBALLY_COHERENT = 1 << 16;
        /// Rasterizer-ordered view.
        const RASTERIZER_ORDERED = 1 << 17;
    }
}

bitflags! {
    /// First dword of the `SFI0` chunk.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFeatures: u32 {
        /// UAVs in non-compute, non-pixel stages.
        const UAVS_AT_EVERY_STAGE = 1 << 2;
        /// Stencil reference output.
        const STENCIL_REF = 1 << 9;
        /// Rasterizer-ordered views.
        const ROVS = 1 << 12;
    }
}
