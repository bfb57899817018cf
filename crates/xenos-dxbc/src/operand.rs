//! Operand encoding.
//!
//! [`Dest`] and [`Src`] are small `Copy` values describing a register
//! reference. They are turned into tokens only when an instruction is
//! written, because the encoding of a source depends on the write mask of the
//! instruction consuming it (scalar `select_1` vs. four-component swizzle,
//! one vs. four immediate values).

use core::ops::Neg;

/// `D3D10_SB_OPERAND_TYPE` subset.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OperandType {
    Temp = 0,
    Input = 1,
    Output = 2,
    IndexableTemp = 3,
    Immediate32 = 4,
    Sampler = 6,
    Resource = 7,
    ConstantBuffer = 8,
    Label = 10,
    InputPrimitiveId = 11,
    OutputDepth = 12,
    Null = 13,
    OutputCoverageMask = 15,
    UnorderedAccessView = 30,
    InputCoverageMask = 35,
    OutputDepthLessEqual = 39,
    OutputStencilRef = 41,
}

impl OperandType {
    /// Decodes bits 12..20 of an operand token.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Temp,
            1 => Self::Input,
            2 => Self::Output,
            3 => Self::IndexableTemp,
            4 => Self::Immediate32,
            6 => Self::Sampler,
            7 => Self::Resource,
            8 => Self::ConstantBuffer,
            10 => Self::Label,
            11 => Self::InputPrimitiveId,
            12 => Self::OutputDepth,
            13 => Self::Null,
            15 => Self::OutputCoverageMask,
            30 => Self::UnorderedAccessView,
            35 => Self::InputCoverageMask,
            39 => Self::OutputDepthLessEqual,
            41 => Self::OutputStencilRef,
            _ => return None,
        })
    }

    /// Number of components the operand type carries in the given context.
    pub const fn dimension(self, in_dcl: bool) -> OperandDimension {
        match self {
            Self::Sampler => {
                if in_dcl {
                    OperandDimension::Vector
                } else {
                    OperandDimension::NoData
                }
            }
            Self::Label | Self::Null => OperandDimension::NoData,
            Self::InputPrimitiveId
            | Self::OutputDepth
            | Self::OutputCoverageMask
            | Self::OutputDepthLessEqual
            | Self::OutputStencilRef => OperandDimension::Scalar,
            Self::InputCoverageMask => {
                if in_dcl {
                    OperandDimension::Scalar
                } else {
                    OperandDimension::Vector
                }
            }
            _ => OperandDimension::Vector,
        }
    }
}

/// `D3D10_SB_OPERAND_NUM_COMPONENTS`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OperandDimension {
    NoData = 0,
    Scalar = 1,
    Vector = 2,
}

const SELECTION_MASK: u32 = 0;
const SELECTION_SWIZZLE: u32 = 1;
const SELECTION_SELECT1: u32 = 2;

/// Index representation: plain immediate.
pub const INDEX_IMMEDIATE32: u32 = 0;
/// Index representation: a temp component only.
pub const INDEX_RELATIVE: u32 = 2;
/// Index representation: immediate plus a temp component.
pub const INDEX_IMMEDIATE32_PLUS_RELATIVE: u32 = 3;

/// A temp register component used as a dynamic index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeIndex {
    /// The `r#` register.
    pub temp: u32,
    /// Which component of the register (0..=3).
    pub component: u32,
}

/// One dimension of an operand address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Index {
    /// Immediate part.
    pub offset: u32,
    /// Optional `r#.c` added to the immediate part.
    pub relative: Option<RelativeIndex>,
}

impl Index {
    /// An absolute index.
    pub const fn imm(offset: u32) -> Self {
        Self {
            offset,
            relative: None,
        }
    }

    /// `r<temp>.<component> + offset`.
    pub const fn relative(temp: u32, component: u32, offset: u32) -> Self {
        Self {
            offset,
            relative: Some(RelativeIndex { temp, component }),
        }
    }

    /// The representation field for the operand token.
    pub const fn representation(&self) -> u32 {
        match self.relative {
            Some(_) if self.offset != 0 => INDEX_IMMEDIATE32_PLUS_RELATIVE,
            Some(_) => INDEX_RELATIVE,
            None => INDEX_IMMEDIATE32,
        }
    }

    /// Encoded length in dwords.
    pub const fn len(&self) -> u32 {
        match self.relative {
            Some(_) if self.offset != 0 => 3,
            Some(_) => 2,
            None => 1,
        }
    }

    fn write(&self, code: &mut Vec<u32>) {
        if self.relative.is_none() || self.offset != 0 {
            code.push(self.offset);
        }
        if let Some(rel) = self.relative {
            code.push(
                OperandDimension::Vector as u32
                    | (SELECTION_SELECT1 << 2)
                    | ((rel.component & 3) << 4)
                    | ((OperandType::Temp as u32) << 12)
                    | (1 << 20)
                    | (INDEX_IMMEDIATE32 << 22),
            );
            code.push(rel.temp);
        }
    }
}

impl From<u32> for Index {
    fn from(offset: u32) -> Self {
        Self::imm(offset)
    }
}

/// Operand type plus zero to three index dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperandAddress {
    /// Register file.
    pub ty: OperandType,
    /// Number of used entries in `indices`.
    pub index_dimension: u32,
    /// Index per dimension.
    pub indices: [Index; 3],
}

impl OperandAddress {
    /// An address without indices.
    pub const fn new(ty: OperandType) -> Self {
        Self {
            ty,
            index_dimension: 0,
            indices: [Index::imm(0); 3],
        }
    }

    /// A one-dimensional address.
    pub const fn new_1d(ty: OperandType, i0: Index) -> Self {
        Self {
            ty,
            index_dimension: 1,
            indices: [i0, Index::imm(0), Index::imm(0)],
        }
    }

    /// A two-dimensional address.
    pub const fn new_2d(ty: OperandType, i0: Index, i1: Index) -> Self {
        Self {
            ty,
            index_dimension: 2,
            indices: [i0, i1, Index::imm(0)],
        }
    }

    /// A three-dimensional address.
    pub const fn new_3d(ty: OperandType, i0: Index, i1: Index, i2: Index) -> Self {
        Self {
            ty,
            index_dimension: 3,
            indices: [i0, i1, i2],
        }
    }

    /// Operand token bits for the type and index layout.
    pub fn type_and_index_bits(&self) -> u32 {
        let mut token = ((self.ty as u32) << 12) | (self.index_dimension << 20);
        for (i, index) in self.used_indices().iter().enumerate() {
            token |= index.representation() << (22 + 3 * i as u32);
        }
        token
    }

    /// Length of the index part in dwords.
    pub fn indices_len(&self) -> u32 {
        self.used_indices().iter().map(Index::len).sum()
    }

    /// The indices that are actually encoded.
    pub fn used_indices(&self) -> &[Index] {
        &self.indices[..self.index_dimension as usize]
    }

    fn write_indices(&self, code: &mut Vec<u32>) {
        for index in self.used_indices() {
            index.write(code);
        }
    }
}

/// Returns the component index when `mask` selects exactly one component.
pub fn mask_single_component(mask: u32) -> Option<u32> {
    if mask == 0 {
        return None;
    }
    let component = mask.trailing_zeros();
    (mask >> component == 1).then_some(component)
}

/// A destination operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dest {
    /// Register reference.
    pub address: OperandAddress,
    /// Write mask, ignored for scalar and component-less operand types.
    pub write_mask: u32,
}

impl Dest {
    const fn with(address: OperandAddress, write_mask: u32) -> Self {
        Self {
            address,
            write_mask,
        }
    }

    /// `r#`.
    pub const fn r(index: u32, write_mask: u32) -> Self {
        Self::with(
            OperandAddress::new_1d(OperandType::Temp, Index::imm(index)),
            write_mask,
        )
    }

    /// `v#` (declarations only).
    pub const fn v(index: u32, read_mask: u32) -> Self {
        Self::with(
            OperandAddress::new_1d(OperandType::Input, Index::imm(index)),
            read_mask,
        )
    }

    /// `o#`.
    pub const fn o(index: u32, write_mask: u32) -> Self {
        Self::with(
            OperandAddress::new_1d(OperandType::Output, Index::imm(index)),
            write_mask,
        )
    }

    /// `x#[index]`.
    pub const fn x(array: u32, index: Index, write_mask: u32) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::IndexableTemp, Index::imm(array), index),
            write_mask,
        )
    }

    /// `u#[index]`.
    pub const fn u(id: u32, index: Index, write_mask: u32) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::UnorderedAccessView, Index::imm(id), index),
            write_mask,
        )
    }

    /// `vPrim` (declarations only).
    pub const fn vprim() -> Self {
        Self::with(OperandAddress::new(OperandType::InputPrimitiveId), 0b0001)
    }

    /// `vCoverage` (declarations only).
    pub const fn vcoverage() -> Self {
        Self::with(OperandAddress::new(OperandType::InputCoverageMask), 0b0001)
    }

    /// `oDepth`.
    pub const fn odepth() -> Self {
        Self::with(OperandAddress::new(OperandType::OutputDepth), 0b0001)
    }

    /// `oDepthLE`.
    pub const fn odepth_le() -> Self {
        Self::with(OperandAddress::new(OperandType::OutputDepthLessEqual), 0b0001)
    }

    /// `oMask`.
    pub const fn omask() -> Self {
        Self::with(OperandAddress::new(OperandType::OutputCoverageMask), 0b0001)
    }

    /// `oStencilRef`.
    pub const fn ostencil_ref() -> Self {
        Self::with(OperandAddress::new(OperandType::OutputStencilRef), 0b0001)
    }

    /// `null`.
    pub const fn null() -> Self {
        Self::with(OperandAddress::new(OperandType::Null), 0)
    }

    /// The effective mask for the operand's dimension.
    pub const fn mask(&self, in_dcl: bool) -> u32 {
        match self.address.ty.dimension(in_dcl) {
            OperandDimension::NoData => 0,
            OperandDimension::Scalar => 0b0001,
            OperandDimension::Vector => self.write_mask,
        }
    }

    /// Replaces the write mask.
    #[must_use]
    pub const fn with_mask(mut self, write_mask: u32) -> Self {
        self.write_mask = write_mask;
        self
    }

    /// Intersects the write mask.
    #[must_use]
    pub const fn masked(mut self, write_mask: u32) -> Self {
        self.write_mask &= write_mask;
        self
    }

    /// Encoded length in dwords.
    pub fn len(&self) -> u32 {
        1 + self.address.indices_len()
    }

    /// Appends the operand tokens.
    pub fn write(&self, code: &mut Vec<u32>, in_dcl: bool) {
        let dimension = self.address.ty.dimension(in_dcl);
        let mut token = self.address.type_and_index_bits() | dimension as u32;
        if dimension == OperandDimension::Vector {
            debug_assert!(self.write_mask != 0 && self.write_mask <= 0b1111);
            token |= (SELECTION_MASK << 2) | (self.write_mask << 4);
        }
        code.push(token);
        self.address.write_indices(code);
    }
}

/// A source operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Src {
    /// Register reference.
    pub address: OperandAddress,
    /// 2-bit component selectors for x, y, z and w.
    pub swizzle: u32,
    /// `|src|`.
    pub absolute: bool,
    /// `-src`.
    pub negate: bool,
    /// Values for [`OperandType::Immediate32`].
    pub immediate: [u32; 4],
}

impl Src {
    /// `.xyzw`
    pub const XYZW: u32 = 0b11_10_01_00;
    /// `.xxxx`
    pub const XXXX: u32 = 0b00_00_00_00;
    /// `.yyyy`
    pub const YYYY: u32 = 0b01_01_01_01;
    /// `.zzzz`
    pub const ZZZZ: u32 = 0b10_10_10_10;
    /// `.wwww`
    pub const WWWW: u32 = 0b11_11_11_11;
    /// `.xyxy`
    pub const XYXY: u32 = 0b01_00_01_00;

    const fn with(address: OperandAddress, swizzle: u32) -> Self {
        Self {
            address,
            swizzle,
            absolute: false,
            negate: false,
            immediate: [0; 4],
        }
    }

    /// `r#`.
    pub const fn r(index: u32, swizzle: u32) -> Self {
        Self::with(
            OperandAddress::new_1d(OperandType::Temp, Index::imm(index)),
            swizzle,
        )
    }

    /// `v#`.
    pub const fn v(index: Index, swizzle: u32) -> Self {
        Self::with(OperandAddress::new_1d(OperandType::Input, index), swizzle)
    }

    /// `x#[index]`.
    pub const fn x(array: u32, index: Index, swizzle: u32) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::IndexableTemp, Index::imm(array), index),
            swizzle,
        )
    }

    /// `l(x, y, z, w)` from raw bits.
    pub const fn lu4(x: u32, y: u32, z: u32, w: u32) -> Self {
        let mut src = Self::with(OperandAddress::new(OperandType::Immediate32), Self::XYZW);
        src.immediate = [x, y, z, w];
        src
    }

    /// `l(x)` from raw bits, replicated.
    pub const fn lu(x: u32) -> Self {
        Self::lu4(x, x, x, x)
    }

    /// Signed integer immediate.
    pub const fn li4(x: i32, y: i32, z: i32, w: i32) -> Self {
        Self::lu4(x as u32, y as u32, z as u32, w as u32)
    }

    /// Signed integer immediate, replicated.
    pub const fn li(x: i32) -> Self {
        Self::lu(x as u32)
    }

    /// Float immediate.
    pub fn lf4(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self::lu4(x.to_bits(), y.to_bits(), z.to_bits(), w.to_bits())
    }

    /// Float immediate, replicated.
    pub fn lf(x: f32) -> Self {
        Self::lu(x.to_bits())
    }

    /// `s#[index]`.
    pub const fn s(id: u32, index: Index) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::Sampler, Index::imm(id), index),
            Self::XXXX,
        )
    }

    /// Sampler range for declarations: `s<id>[lower:upper]`.
    pub const fn s_dcl(id: u32, lower: u32, upper: u32) -> Self {
        Self::with(
            OperandAddress::new_3d(
                OperandType::Sampler,
                Index::imm(id),
                Index::imm(lower),
                Index::imm(upper),
            ),
            Self::XYZW,
        )
    }

    /// `t#[index]`.
    pub const fn t(id: u32, index: Index, swizzle: u32) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::Resource, Index::imm(id), index),
            swizzle,
        )
    }

    /// Resource range for declarations.
    pub const fn t_dcl(id: u32, lower: u32, upper: u32) -> Self {
        Self::with(
            OperandAddress::new_3d(
                OperandType::Resource,
                Index::imm(id),
                Index::imm(lower),
                Index::imm(upper),
            ),
            Self::XYZW,
        )
    }

    /// `cb<id>[index][location]`.
    pub const fn cb(id: u32, index: Index, location: Index, swizzle: u32) -> Self {
        Self::with(
            OperandAddress::new_3d(OperandType::ConstantBuffer, Index::imm(id), index, location),
            swizzle,
        )
    }

    /// Constant buffer range for declarations.
    pub const fn cb_dcl(id: u32, lower: u32, upper: u32) -> Self {
        Self::with(
            OperandAddress::new_3d(
                OperandType::ConstantBuffer,
                Index::imm(id),
                Index::imm(lower),
                Index::imm(upper),
            ),
            Self::XYZW,
        )
    }

    /// `u#[index]`.
    pub const fn u(id: u32, index: Index, swizzle: u32) -> Self {
        Self::with(
            OperandAddress::new_2d(OperandType::UnorderedAccessView, Index::imm(id), index),
            swizzle,
        )
    }

    /// UAV range for declarations.
    pub const fn u_dcl(id: u32, lower: u32, upper: u32) -> Self {
        Self::with(
            OperandAddress::new_3d(
                OperandType::UnorderedAccessView,
                Index::imm(id),
                Index::imm(lower),
                Index::imm(upper),
            ),
            Self::XYZW,
        )
    }

    /// `l#` label reference.
    pub const fn label(index: u32) -> Self {
        Self::with(
            OperandAddress::new_1d(OperandType::Label, Index::imm(index)),
            Self::XXXX,
        )
    }

    /// `vCoverage`.
    pub const fn vcoverage() -> Self {
        Self::with(OperandAddress::new(OperandType::InputCoverageMask), Self::XXXX)
    }

    /// `vPrim`.
    pub const fn vprim() -> Self {
        Self::with(OperandAddress::new(OperandType::InputPrimitiveId), Self::XXXX)
    }

    /// Replaces both modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, absolute: bool, negate: bool) -> Self {
        self.absolute = absolute;
        self.negate = negate;
        self
    }

    /// Replaces the absolute modifier.
    #[must_use]
    pub const fn with_abs(self, absolute: bool) -> Self {
        let negate = self.negate;
        self.with_modifiers(absolute, negate)
    }

    /// Replaces the negate modifier.
    #[must_use]
    pub const fn with_neg(self, negate: bool) -> Self {
        let absolute = self.absolute;
        self.with_modifiers(absolute, negate)
    }

    /// `|src|`, dropping any negation.
    #[must_use]
    pub const fn abs(self) -> Self {
        self.with_modifiers(true, false)
    }

    /// Replaces the swizzle.
    #[must_use]
    pub const fn swizzle(mut self, swizzle: u32) -> Self {
        self.swizzle = swizzle;
        self
    }

    /// Applies `swizzle` on top of the current one.
    #[must_use]
    pub const fn swizzle_swizzled(mut self, swizzle: u32) -> Self {
        let mut out = 0;
        let mut i = 0;
        while i < 4 {
            let from = (swizzle >> (i * 2)) & 3;
            out |= ((self.swizzle >> (from * 2)) & 3) << (i * 2);
            i += 1;
        }
        self.swizzle = out;
        self
    }

    /// Replicates one register component.
    #[must_use]
    pub const fn select(mut self, component: u32) -> Self {
        self.swizzle = component * 0b01_01_01_01;
        self
    }

    /// Replicates the component currently selected for `component`.
    #[must_use]
    pub const fn select_from_swizzled(mut self, component: u32) -> Self {
        self.swizzle = ((self.swizzle >> (component * 2)) & 3) * 0b01_01_01_01;
        self
    }

    /// Register component selected for destination component `i`.
    pub const fn component(&self, i: u32) -> u32 {
        (self.swizzle >> (i * 2)) & 3
    }

    /// Whether this is an immediate.
    pub const fn is_immediate(&self) -> bool {
        matches!(self.address.ty, OperandType::Immediate32)
    }

    fn is_vector(mask: u32, force_vector: bool) -> bool {
        force_vector || (mask != 0 && mask_single_component(mask).is_none())
    }

    /// Encoded length in dwords for an instruction writing `mask`.
    pub fn len(&self, mask: u32, force_vector: bool) -> u32 {
        let is_vector = Self::is_vector(mask, force_vector);
        if self.is_immediate() {
            return if is_vector { 5 } else { 2 };
        }
        let modifier = if self.absolute || self.negate { 2 } else { 1 };
        modifier + self.address.indices_len()
    }

    /// Applies integer or float modifiers to an immediate value.
    pub const fn modified_immediate(value: u32, is_integer: bool, absolute: bool, negate: bool) -> u32 {
        let mut value = value;
        if is_integer {
            if absolute {
                value = (value as i32).wrapping_abs() as u32;
            }
            if negate {
                value = (value as i32).wrapping_neg() as u32;
            }
        } else {
            if absolute {
                value &= 0x7FFF_FFFF;
            }
            if negate {
                value ^= 0x8000_0000;
            }
        }
        value
    }

    fn immediate_for(&self, component: u32, is_integer: bool) -> u32 {
        Self::modified_immediate(
            self.immediate[self.component(component) as usize],
            is_integer,
            self.absolute,
            self.negate,
        )
    }

    /// Appends the operand tokens.
    ///
    /// `mask` is the write mask of the consuming instruction: unused
    /// components are redirected to the first used one so no uninitialized
    /// register component is referenced.
    pub fn write(
        &self,
        code: &mut Vec<u32>,
        is_integer: bool,
        mask: u32,
        force_vector: bool,
        in_dcl: bool,
    ) {
        let mut token = self.address.type_and_index_bits();
        let single = mask_single_component(mask);
        let select_component = single.unwrap_or(0);
        let is_vector = Self::is_vector(mask, force_vector);

        if self.is_immediate() {
            if is_vector {
                token |= OperandDimension::Vector as u32
                    | (SELECTION_SWIZZLE << 2)
                    | (Self::XYZW << 4);
            } else {
                token |= OperandDimension::Scalar as u32;
            }
            code.push(token);
            if is_vector {
                for i in 0..4 {
                    code.push(if mask & (1 << i) != 0 {
                        self.immediate_for(i, is_integer)
                    } else {
                        0
                    });
                }
            } else {
                code.push(self.immediate_for(select_component, is_integer));
            }
            return;
        }

        match self.address.ty.dimension(in_dcl) {
            OperandDimension::Scalar => {
                if is_vector {
                    token |= OperandDimension::Vector as u32
                        | (SELECTION_SWIZZLE << 2)
                        | (Self::XXXX << 4);
                } else {
                    token |= OperandDimension::Scalar as u32;
                }
            }
            OperandDimension::Vector => {
                token |= OperandDimension::Vector as u32;
                if is_vector {
                    token |= SELECTION_SWIZZLE << 2;
                    let used = if mask != 0 { mask.trailing_zeros() } else { 0 };
                    for i in 0..4 {
                        let from = if mask & (1 << i) != 0 { i } else { used };
                        token |= self.component(from) << (4 + i * 2);
                    }
                } else {
                    token |= (SELECTION_SELECT1 << 2) | (self.component(select_component) << 4);
                }
            }
            OperandDimension::NoData => {}
        }

        let modifier = match (self.absolute, self.negate) {
            (true, true) => 3,
            (true, false) => 2,
            (false, true) => 1,
            (false, false) => 0,
        };
        if modifier != 0 {
            token |= 1 << 31;
        }
        code.push(token);
        if modifier != 0 {
            code.push(1 | (modifier << 6));
        }
        self.address.write_indices(code);
    }
}

impl Neg for Src {
    type Output = Src;

    fn neg(self) -> Src {
        let negate = !self.negate;
        self.with_neg(negate)
    }
}
