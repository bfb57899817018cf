use core::fmt;

use crate::error::DxbcError;
use crate::fourcc::FourCC;
use crate::rdef::{parse_rdef_chunk, RdefChunk};
use crate::signature::{parse_signature_chunk, SignatureChunk};

/// Magic, hash, version, total size and chunk count.
const HEADER_BYTES: usize = 32;
/// FourCC and payload size in front of every chunk.
const CHUNK_HEADER_BYTES: usize = 8;
const CHUNK_LIMIT: usize = 4096;

/// Version dword stored after the checksum.
pub const CONTAINER_VERSION: u32 = 1;

/// The fixed header of a `DXBC` container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DxbcHeader {
    /// Must be [`FourCC::DXBC`].
    pub magic: FourCC,
    /// The 16-byte hash slot. Containers written by this crate leave it zeroed.
    pub checksum: [u8; 16],
    /// Major/minor version dword.
    pub version: u32,
    /// Declared total size, in bytes, of the container.
    pub total_size: u32,
    /// Number of chunks.
    pub chunk_count: u32,
}

/// Serializes a container from chunk payloads, in the given order.
///
/// Payloads must already be dword-aligned in length; the hash is left as
/// zeros for the runtime to ignore or fill in.
pub fn write_container(chunks: &[(FourCC, &[u8])]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(chunks.len());
    let mut next = HEADER_BYTES + 4 * chunks.len();
    for (fourcc, data) in chunks {
        debug_assert_eq!(data.len() % 4, 0, "{fourcc} payload is not dword-aligned");
        offsets.push(next as u32);
        next += CHUNK_HEADER_BYTES + data.len();
    }

    let mut out = Vec::with_capacity(next);
    out.extend_from_slice(&FourCC::DXBC.0);
    out.extend_from_slice(&[0; 16]);
    for dword in [CONTAINER_VERSION, next as u32, chunks.len() as u32].into_iter().chain(offsets) {
        out.extend_from_slice(&dword.to_le_bytes());
    }
    for (fourcc, data) in chunks {
        out.extend_from_slice(&fourcc.0);
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// A single chunk within a `DXBC` container.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct DxbcChunk<'a> {
    /// The chunk identifier.
    pub fourcc: FourCC,
    /// Raw payload bytes.
    pub data: &'a [u8],
}

impl fmt::Debug for DxbcChunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.fourcc, self.data.len())
    }
}

/// Little-endian dword reads that fail instead of panicking.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn slice(&self, start: usize, len: usize, what: &str) -> Result<&'a [u8], DxbcError> {
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or_else(|| {
                DxbcError::out_of_bounds(format!(
                    "{what}: {len} bytes at {start} do not fit in {} bytes",
                    self.bytes.len()
                ))
            })
    }

    fn dword(&self, offset: usize, what: &str) -> Result<u32, DxbcError> {
        let bytes = self.slice(offset, 4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn fourcc(&self, offset: usize, what: &str) -> Result<FourCC, DxbcError> {
        let bytes = self.slice(offset, 4, what)?;
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// A parsed `DXBC` container.
///
/// The chunk table is resolved while parsing, so every chunk slice is
/// already known to lie within `total_size`.
#[derive(Debug, Clone)]
pub struct DxbcFile<'a> {
    bytes: &'a [u8],
    header: DxbcHeader,
    chunks: Vec<DxbcChunk<'a>>,
}

impl<'a> DxbcFile<'a> {
    /// Parses a `DXBC` container from `bytes`.
    pub fn parse(bytes: &'a [u8]) -> Result<DxbcFile<'a>, DxbcError> {
        if bytes.len() < HEADER_BYTES {
            return Err(DxbcError::malformed_header(format!(
                "{} bytes is shorter than the {HEADER_BYTES}-byte header",
                bytes.len()
            )));
        }
        let reader = Reader { bytes };
        let magic = reader.fourcc(0, "magic")?;
        if magic != FourCC::DXBC {
            return Err(DxbcError::malformed_header(format!("bad magic {magic:?}")));
        }
        let mut checksum = [0; 16];
        checksum.copy_from_slice(reader.slice(4, 16, "checksum")?);
        let header = DxbcHeader {
            magic,
            checksum,
            version: reader.dword(20, "version")?,
            total_size: reader.dword(24, "total size")?,
            chunk_count: reader.dword(28, "chunk count")?,
        };

        let total_size = header.total_size as usize;
        if total_size < HEADER_BYTES {
            return Err(DxbcError::malformed_header(format!(
                "total size {total_size} does not cover the header"
            )));
        }
        if total_size > bytes.len() {
            return Err(DxbcError::out_of_bounds(format!(
                "total size {total_size} but only {} bytes given",
                bytes.len()
            )));
        }
        let count = header.chunk_count as usize;
        if count > CHUNK_LIMIT {
            return Err(DxbcError::malformed_offsets(format!("{count} chunks")));
        }

        let reader = Reader {
            bytes: &bytes[..total_size],
        };
        let table_end = HEADER_BYTES + 4 * count;
        if table_end > total_size {
            return Err(DxbcError::malformed_offsets(format!(
                "offset table of {count} chunks runs past total size {total_size}"
            )));
        }
        let mut chunks = Vec::with_capacity(count);
        for i in 0..count {
            let offset = reader.dword(HEADER_BYTES + 4 * i, "chunk offset")? as usize;
            if offset < table_end {
                return Err(DxbcError::malformed_offsets(format!(
                    "chunk {i} at {offset} overlaps the header, which ends at {table_end}"
                )));
            }
            let fourcc = reader.fourcc(offset, "chunk fourcc")?;
            let size = reader.dword(offset + 4, "chunk size")? as usize;
            let data = reader.slice(offset + CHUNK_HEADER_BYTES, size, "chunk data")?;
            chunks.push(DxbcChunk { fourcc, data });
        }

        Ok(DxbcFile {
            bytes: reader.bytes,
            header,
            chunks,
        })
    }

    /// The parsed header.
    pub fn header(&self) -> &DxbcHeader {
        &self.header
    }

    /// The bytes covered by `total_size`.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// All chunks in file order.
    pub fn chunks(&self) -> impl Iterator<Item = DxbcChunk<'a>> + '_ {
        self.chunks.iter().copied()
    }

    /// The first chunk matching `fourcc`.
    pub fn get_chunk(&self, fourcc: FourCC) -> Option<DxbcChunk<'a>> {
        self.chunks().find(|chunk| chunk.fourcc == fourcc)
    }

    /// Parses the first `ISGN` or `OSGN` chunk.
    pub fn get_signature(&self, kind: FourCC) -> Option<Result<SignatureChunk, DxbcError>> {
        let data = self.get_chunk(kind)?.data;
        Some(parse_signature_chunk(data).map_err(|e| DxbcError::invalid_chunk(format!("{kind}: {}", e.context()))))
    }

    /// Parses the `RDEF` chunk.
    pub fn get_rdef(&self) -> Option<Result<RdefChunk, DxbcError>> {
        let data = self.get_chunk(FourCC::RDEF)?.data;
        Some(parse_rdef_chunk(data).map_err(|e| DxbcError::invalid_chunk(format!("RDEF: {}", e.context()))))
    }

    /// The `SHEX` payload as dwords.
    pub fn shader_tokens(&self) -> Option<Vec<u32>> {
        let data = self.get_chunk(FourCC::SHEX)?.data;
        Some(
            data.chunks_exact(4)
                .map(|dword| u32::from_le_bytes([dword[0], dword[1], dword[2], dword[3]]))
                .collect(),
        )
    }
}

/// One line for the header, then one per chunk.
impl fmt::Display for DxbcFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} {} bytes, {} chunks",
            self.header.magic, self.header.version, self.header.total_size, self.header.chunk_count
        )?;
        for (i, chunk) in self.chunks.iter().enumerate() {
            write!(f, "\n  {i}: {chunk:?}")?;
        }
        Ok(())
    }
}
