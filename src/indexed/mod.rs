//! Megatron-LM compatible indexed dataset of token sequences
//!
//! A dataset with prefix `p` is stored as two files:
//!
//! - `p.bin` holds the concatenated token ids of all sequences, as raw little
//!   endian values of a single element type.
//! - `p.idx` describes where each sequence starts and how long it is, along
//!   with the document boundaries:
//!
//! ```text
//! magic           9 bytes   "MMIDIDX\0\0"
//! version         u64       1
//! dtype           u8        see DType::code()
//! sequence count  u64
//! document count  u64
//! lengths         i32 x sequence count
//! pointers        i64 x sequence count (byte offsets into the .bin file)
//! documents       i64 x document count (sequence index of each boundary)
//! ```
//!
//! All integers are little endian.

pub mod builder;
pub mod reader;

pub use builder::IndexedDatasetBuilder;
pub use reader::IndexedDataset;

use crate::error::{Error, Result};
use std::{ffi::OsString, path::{Path, PathBuf}};

/// Magic bytes at the start of every index file
pub const INDEX_MAGIC: &[u8; 9] = b"MMIDIDX\x00\x00";

/// Index format version that we read and write
pub const INDEX_VERSION: u64 = 1;

/// Location of the token blob associated with a dataset prefix
pub fn data_file_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".bin")
}

/// Location of the index file associated with a dataset prefix
pub fn index_file_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, ".idx")
}

/// Append a suffix to a path without treating dots in the prefix as an
/// extension
fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    path.into()
}

/// Element type of the token blob
///
/// Variant order follows the on-disk type codes.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, clap::ValueEnum)]
pub enum DType {
    U8,
    I8,
    I16,
    I32,
    I64,
    F64,
    F32,
    U16,
}
//
impl DType {
    /// Type code, as stored in the index header
    pub fn code(self) -> u8 {
        match self {
            Self::U8 => 1,
            Self::I8 => 2,
            Self::I16 => 3,
            Self::I32 => 4,
            Self::I64 => 5,
            Self::F64 => 6,
            Self::F32 => 7,
            Self::U16 => 8,
        }
    }

    /// Decode a type code from an index header
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::U8,
            2 => Self::I8,
            3 => Self::I16,
            4 => Self::I32,
            5 => Self::I64,
            6 => Self::F64,
            7 => Self::F32,
            8 => Self::U16,
            _ => return None,
        })
    }

    /// Size of one element in bytes
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Human-readable name, numpy style
    pub fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::F64 => "float64",
            Self::F32 => "float32",
            Self::U16 => "uint16",
        }
    }

    /// Append the little endian encoding of a token id to `out`
    ///
    /// Fails without writing anything if the id cannot be represented
    /// exactly by this element type.
    pub fn encode(self, id: u32, out: &mut Vec<u8>) -> Result<()> {
        let out_of_range = || Error::TokenOutOfRange {
            id: i64::from(id),
            dtype: self.name(),
        };
        match self {
            Self::U8 => out.push(u8::try_from(id).map_err(|_| out_of_range())?),
            Self::I8 => out.extend(i8::try_from(id).map_err(|_| out_of_range())?.to_le_bytes()),
            Self::I16 => out.extend(i16::try_from(id).map_err(|_| out_of_range())?.to_le_bytes()),
            Self::U16 => out.extend(u16::try_from(id).map_err(|_| out_of_range())?.to_le_bytes()),
            Self::I32 => out.extend(i32::try_from(id).map_err(|_| out_of_range())?.to_le_bytes()),
            Self::I64 => out.extend(i64::from(id).to_le_bytes()),
            // f32 has a 24-bit mantissa, anything above can't round-trip
            Self::F32 => {
                if id > (1 << f32::MANTISSA_DIGITS) {
                    return Err(out_of_range());
                }
                out.extend((id as f32).to_le_bytes())
            }
            Self::F64 => out.extend(f64::from(id).to_le_bytes()),
        }
        Ok(())
    }

    /// Decode one element, which must be exactly [`size()`](Self::size)
    /// bytes long
    pub fn decode(self, bytes: &[u8]) -> i64 {
        debug_assert_eq!(bytes.len(), self.size());
        match self {
            Self::U8 => i64::from(bytes[0]),
            Self::I8 => i64::from(bytes[0] as i8),
            Self::I16 => i64::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            Self::U16 => i64::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::I32 => i64::from(i32::from_le_bytes(array(bytes))),
            Self::I64 => i64::from_le_bytes(array(bytes)),
            Self::F32 => f32::from_le_bytes(array(bytes)) as i64,
            Self::F64 => f64::from_le_bytes(array(bytes)) as i64,
        }
    }
}
//
impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Copy a byte slice whose length has already been checked into an array
fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(bytes);
    out
}
