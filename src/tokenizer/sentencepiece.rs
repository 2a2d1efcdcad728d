//! Just enough of the SentencePiece model format to list its vocabulary
//!
//! A `tokenizer.model` file is a protobuf-encoded `ModelProto`, whose field 1
//! is the repeated list of `SentencePiece` messages. In each of those, field 1
//! is the piece's text.

use crate::error::{Error, Result};
use std::path::Path;

/// Protobuf wire types
const VARINT: u64 = 0;
const FIXED64: u64 = 1;
const LENGTH_DELIMITED: u64 = 2;
const FIXED32: u64 = 5;

/// Read the pieces of a SentencePiece model, in id order
pub fn read_pieces(path: &Path) -> Result<Vec<String>> {
    let bytes =
        std::fs::read(path).map_err(Error::io(format!("reading {}", path.display())))?;
    let invalid = |reason: &str| {
        Error::Tokenizer(format!("{} is not a SentencePiece model: {reason}", path.display()))
    };
    let mut pieces = Vec::new();
    for field in Fields(&bytes) {
        let (number, value) = field.map_err(invalid)?;
        if let (1, Value::Bytes(message)) = (number, value) {
            let piece = Fields(message)
                .find_map(|field| match field {
                    Ok((1, Value::Bytes(text))) => {
                        Some(Ok(String::from_utf8_lossy(text).into_owned()))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
                .unwrap_or(Ok(String::new()))
                .map_err(invalid)?;
            pieces.push(piece);
        }
    }
    Ok(pieces)
}

/// Value of a protobuf field, only decoded as far as we need
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Value<'bytes> {
    /// Numeric value, whose interpretation we don't care about
    Scalar,

    /// String, bytes or sub-message
    Bytes(&'bytes [u8]),
}

/// Iterator over the top-level fields of a protobuf message
struct Fields<'bytes>(&'bytes [u8]);
//
impl<'bytes> Fields<'bytes> {
    /// Decode a base-128 varint
    fn varint(&mut self) -> Result<u64, &'static str> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let bytes = self.0;
            let (&byte, rest) = bytes.split_first().ok_or("truncated varint")?;
            self.0 = rest;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err("varint is too long")
    }

    /// Skip a number of bytes, returning them
    fn take(&mut self, len: u64) -> Result<&'bytes [u8], &'static str> {
        let len = usize::try_from(len).map_err(|_| "field is too long")?;
        if self.0.len() < len {
            return Err("truncated field");
        }
        let bytes = self.0;
        let (head, tail) = bytes.split_at(len);
        self.0 = tail;
        Ok(head)
    }
}
//
impl<'bytes> Iterator for Fields<'bytes> {
    type Item = Result<(u64, Value<'bytes>), &'static str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.is_empty() {
            return None;
        }
        let mut decode = || -> Result<(u64, Value<'bytes>), &'static str> {
            let key = self.varint()?;
            let value = match key & 0x7 {
                VARINT => self.varint().map(|_| Value::Scalar)?,
                FIXED64 => self.take(8).map(|_| Value::Scalar)?,
                LENGTH_DELIMITED => {
                    let len = self.varint()?;
                    Value::Bytes(self.take(len)?)
                }
                FIXED32 => self.take(4).map(|_| Value::Scalar)?,
                _ => return Err("unsupported wire type"),
            };
            Ok((key >> 3, value))
        };
        let result = decode();
        if result.is_err() {
            // Don't keep decoding garbage
            self.0 = &[];
        }
        Some(result)
    }
}
