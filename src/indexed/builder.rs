//! Incremental construction of an indexed dataset

use super::{DType, INDEX_MAGIC, INDEX_VERSION};
use crate::error::{Error, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Writer for the `.bin` half of an indexed dataset, which keeps track of the
/// index in memory until [`finalize()`](Self::finalize) is called
///
/// Finalization consumes the builder, so an index can only be written once.
#[derive(Debug)]
pub struct IndexedDatasetBuilder {
    /// Location of the token blob
    bin_path: PathBuf,

    /// Buffered writer to the token blob
    data: BufWriter<File>,

    /// Element type of the token blob
    dtype: DType,

    /// Length of each sequence added so far
    sequence_lengths: Vec<i32>,

    /// Sequence index at each document boundary, starting with 0
    document_indices: Vec<i64>,

    /// Reusable encoding buffer
    scratch: Vec<u8>,
}
//
impl IndexedDatasetBuilder {
    /// Start a new dataset, truncating any previous token blob at `bin_path`
    pub fn new(bin_path: impl Into<PathBuf>, dtype: DType) -> Result<Self> {
        let bin_path = bin_path.into();
        let file = File::create(&bin_path)
            .map_err(Error::io(format!("creating {}", bin_path.display())))?;
        log::debug!("Started indexed dataset {} with {dtype} tokens", bin_path.display());
        Ok(Self {
            bin_path,
            data: BufWriter::new(file),
            dtype,
            sequence_lengths: Vec::new(),
            document_indices: vec![0],
            scratch: Vec::new(),
        })
    }

    /// Number of sequences added so far
    pub fn num_sequences(&self) -> usize {
        self.sequence_lengths.len()
    }

    /// Append one token sequence
    ///
    /// The sequence is encoded in full before anything is written, so a token
    /// that does not fit the element type leaves the dataset untouched.
    pub fn add_item(&mut self, tokens: &[u32]) -> Result<()> {
        let length = i32::try_from(tokens.len()).map_err(|_| Error::InvalidIndex {
            path: self.bin_path.clone(),
            reason: format!("sequence of {} tokens is too long to be indexed", tokens.len()),
        })?;
        self.scratch.clear();
        self.scratch.reserve(tokens.len() * self.dtype.size());
        for &id in tokens {
            self.dtype.encode(id, &mut self.scratch)?;
        }
        self.data
            .write_all(&self.scratch)
            .map_err(Error::io(format!("appending to {}", self.bin_path.display())))?;
        self.sequence_lengths.push(length);
        Ok(())
    }

    /// Mark the end of a document made of all sequences added since the
    /// previous document boundary
    pub fn end_document(&mut self) {
        self.document_indices.push(self.sequence_lengths.len() as i64);
    }

    /// Flush the token blob and write the index to `idx_path`
    pub fn finalize(mut self, idx_path: &Path) -> Result<()> {
        self.data
            .flush()
            .and_then(|()| self.data.get_ref().sync_all())
            .map_err(Error::io(format!("flushing {}", self.bin_path.display())))?;
        let index = encode_index(self.dtype, &self.sequence_lengths, &self.document_indices);
        std::fs::write(idx_path, index)
            .map_err(Error::io(format!("writing {}", idx_path.display())))?;
        log::info!(
            "Finalized indexed dataset {} with {} sequences in {} documents",
            idx_path.display(),
            self.sequence_lengths.len(),
            self.document_indices.len() - 1,
        );
        Ok(())
    }
}

/// Serialize the index of a dataset
fn encode_index(dtype: DType, sequence_lengths: &[i32], document_indices: &[i64]) -> Vec<u8> {
    let header_len = INDEX_MAGIC.len() + 8 + 1 + 8 + 8;
    let mut out = Vec::with_capacity(
        header_len + sequence_lengths.len() * 12 + document_indices.len() * 8,
    );
    out.extend_from_slice(INDEX_MAGIC);
    out.extend(INDEX_VERSION.to_le_bytes());
    out.push(dtype.code());
    out.extend((sequence_lengths.len() as u64).to_le_bytes());
    out.extend((document_indices.len() as u64).to_le_bytes());
    for length in sequence_lengths {
        out.extend(length.to_le_bytes());
    }
    let mut pointer = 0i64;
    for &length in sequence_lengths {
        out.extend(pointer.to_le_bytes());
        pointer += i64::from(length) * dtype.size() as i64;
    }
    for index in document_indices {
        out.extend(index.to_le_bytes());
    }
    out
}
