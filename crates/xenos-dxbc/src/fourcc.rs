use core::fmt;

/// A four-character code identifying a container or chunk (`DXBC`, `SHEX`, ...).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Container magic.
    pub const DXBC: FourCC = FourCC(*b"DXBC");
    /// Resource definitions.
    pub const RDEF: FourCC = FourCC(*b"RDEF");
    /// Input signature.
    pub const ISGN: FourCC = FourCC(*b"ISGN");
    /// Output signature.
    pub const OSGN: FourCC = FourCC(*b"OSGN");
    /// Shader model 5 bytecode.
    pub const SHEX: FourCC = FourCC(*b"SHEX");
    /// Shader feature info.
    pub const SFI0: FourCC = FourCC(*b"SFI0");
    /// Statistics.
    pub const STAT: FourCC = FourCC(*b"STAT");

    /// The little-endian `u32` form stored in files.
    pub const fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}
