//! Random access to a finalized indexed dataset

use super::{data_file_path, index_file_path, DType, INDEX_MAGIC, INDEX_VERSION};
use crate::error::{Error, Result};
use memmap2::Mmap;
use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Finalized indexed dataset, with the index in memory and the token blob
/// memory-mapped
#[derive(Debug)]
pub struct IndexedDataset {
    /// Element type of the token blob
    dtype: DType,

    /// Length of each sequence, in elements
    sequence_lengths: Box<[i32]>,

    /// Byte offset of each sequence in the token blob
    sequence_pointers: Box<[i64]>,

    /// Sequence index at each document boundary
    document_indices: Box<[i64]>,

    /// Token blob, if not empty (empty files cannot be mapped everywhere)
    data: Option<Mmap>,
}
//
impl IndexedDataset {
    /// Open the `.idx`/`.bin` pair with the given path prefix
    pub fn open(prefix: &Path) -> Result<Self> {
        // Load and decode the index
        let idx_path = index_file_path(prefix);
        let index = std::fs::read(&idx_path).map_err(|e| not_found_or(e, &idx_path, "reading"))?;
        let mut header = IndexCursor::new(&idx_path, &index);
        if header.take(INDEX_MAGIC.len())? != INDEX_MAGIC {
            return Err(header.invalid("bad magic, not an MMIDIDX index"));
        }
        let version = header.u64()?;
        if version != INDEX_VERSION {
            return Err(header.invalid(format!("unsupported index version {version}")));
        }
        let code = header.take(1)?[0];
        let dtype = DType::from_code(code)
            .ok_or_else(|| header.invalid(format!("unknown dtype code {code}")))?;
        let sequence_count = header.count()?;
        let document_count = header.count()?;
        let sequence_lengths = header.array(sequence_count, 4, |b| {
            i32::from_le_bytes([b[0], b[1], b[2], b[3]])
        })?;
        let sequence_pointers = header.array(sequence_count, 8, i64_from_le)?;
        let document_indices = header.array(document_count, 8, i64_from_le)?;

        // Map the token blob
        let bin_path = data_file_path(prefix);
        let file = File::open(&bin_path).map_err(|e| not_found_or(e, &bin_path, "opening"))?;
        let len = file
            .metadata()
            .map_err(Error::io(format!("inspecting {}", bin_path.display())))?
            .len();
        // SAFETY: The blob is only read, and the tools never modify a
        //         finalized dataset while it is being read.
        let data = if len > 0 {
            let map = unsafe { Mmap::map(&file) };
            Some(map.map_err(Error::io(format!("mapping {}", bin_path.display())))?)
        } else {
            None
        };

        // Check that every sequence lies within the blob
        let sequences = sequence_lengths.iter().zip(&*sequence_pointers);
        for (idx, (&length, &pointer)) in sequences.enumerate() {
            let end = i64::from(length)
                .checked_mul(dtype.size() as i64)
                .and_then(|bytes| bytes.checked_add(pointer));
            let in_bounds = length >= 0
                && pointer >= 0
                && end.is_some_and(|end| u64::try_from(end).is_ok_and(|end| end <= len));
            if !in_bounds {
                return Err(Error::InvalidIndex {
                    path: bin_path,
                    reason: format!("sequence {idx} lies outside of the {len}-byte token blob"),
                });
            }
        }
        log::debug!(
            "Opened indexed dataset {} with {sequence_count} sequences of {dtype}",
            prefix.display()
        );
        Ok(Self {
            dtype,
            sequence_lengths,
            sequence_pointers,
            document_indices,
            data,
        })
    }

    /// Element type of the token blob
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Number of sequences
    pub fn len(&self) -> usize {
        self.sequence_lengths.len()
    }

    /// Truth that the dataset holds no sequence
    pub fn is_empty(&self) -> bool {
        self.sequence_lengths.is_empty()
    }

    /// Number of documents, i.e. of document boundaries past the initial one
    pub fn num_documents(&self) -> usize {
        self.document_indices.len().saturating_sub(1)
    }

    /// Sequence index at each document boundary
    pub fn document_indices(&self) -> &[i64] {
        &self.document_indices
    }

    /// Turn a possibly negative sequence index into a position in the
    /// dataset, where negative indices count from the end
    pub fn position(&self, index: isize) -> Result<usize> {
        let position = if index < 0 {
            self.len().checked_sub(index.unsigned_abs())
        } else {
            Some(index.unsigned_abs())
        };
        position
            .filter(|&position| position < self.len())
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Fetch the token ids of one sequence
    pub fn get(&self, index: usize) -> Result<Vec<i64>> {
        let (Some(&length), Some(&pointer)) =
            (self.sequence_lengths.get(index), self.sequence_pointers.get(index))
        else {
            return Err(Error::IndexOutOfRange {
                index: isize::try_from(index).unwrap_or(isize::MAX),
                len: self.len(),
            });
        };
        let size = self.dtype.size();
        let start = pointer as usize;
        let end = start + length as usize * size;
        let bytes = match &self.data {
            Some(data) => &data[start..end],
            None => &[][..],
        };
        Ok(bytes
            .chunks_exact(size)
            .map(|element| self.dtype.decode(element))
            .collect())
    }
}

/// Decode a little endian i64 from an 8-byte slice
fn i64_from_le(b: &[u8]) -> i64 {
    i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Translate file opening errors, keeping missing files recognizable
fn not_found_or(e: std::io::Error, path: &Path, what: &str) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::MissingFile(path.to_owned())
    } else {
        Error::io(format!("{what} {}", path.display()))(e)
    }
}

/// Bounds-checked sequential decoder over the bytes of an index file
struct IndexCursor<'bytes> {
    /// Index file being decoded, for error reporting
    path: &'bytes Path,

    /// Bytes that have not been decoded yet
    remaining: &'bytes [u8],
}
//
impl<'bytes> IndexCursor<'bytes> {
    /// Start decoding an index file
    fn new(path: &'bytes Path, bytes: &'bytes [u8]) -> Self {
        Self {
            path,
            remaining: bytes,
        }
    }

    /// Build an error about this index file
    fn invalid(&self, reason: impl Into<String>) -> Error {
        Error::InvalidIndex {
            path: PathBuf::from(self.path),
            reason: reason.into(),
        }
    }

    /// Consume a number of bytes
    fn take(&mut self, len: usize) -> Result<&'bytes [u8]> {
        if self.remaining.len() < len {
            return Err(self.invalid("index file is truncated"));
        }
        let remaining = self.remaining;
        let (head, tail) = remaining.split_at(len);
        self.remaining = tail;
        Ok(head)
    }

    /// Consume a little endian u64
    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(i64_from_le(bytes) as u64)
    }

    /// Consume a u64 element count
    fn count(&mut self) -> Result<usize> {
        let count = self.u64()?;
        usize::try_from(count)
            .map_err(|_| self.invalid(format!("element count {count} is too large")))
    }

    /// Consume an array of fixed-size elements
    fn array<T>(
        &mut self,
        count: usize,
        element_size: usize,
        decode: impl Fn(&[u8]) -> T,
    ) -> Result<Box<[T]>> {
        let len = count
            .checked_mul(element_size)
            .ok_or_else(|| self.invalid(format!("array of {count} elements is too large")))?;
        let bytes = self.take(len)?;
        Ok(bytes.chunks_exact(element_size).map(decode).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexed::IndexedDatasetBuilder;

    fn build(prefix: &Path, dtype: DType, sequences: &[&[u32]]) {
        let mut builder = IndexedDatasetBuilder::new(data_file_path(prefix), dtype).unwrap();
        for sequence in sequences {
            builder.add_item(sequence).unwrap();
        }
        builder.end_document();
        builder.finalize(&index_file_path(prefix)).unwrap();
    }

    #[test]
    fn fetch_by_position() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("tokens");
        build(&prefix, DType::I32, &[&[10, 20, 30], &[70_000], &[1, 2]]);

        let dataset = IndexedDataset::open(&prefix).unwrap();
        assert_eq!(dataset.dtype(), DType::I32);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.num_documents(), 1);
        assert_eq!(dataset.document_indices(), &[0, 3]);
        assert_eq!(dataset.get(0).unwrap(), vec![10, 20, 30]);
        assert_eq!(dataset.get(1).unwrap(), vec![70_000]);
        assert_eq!(dataset.get(2).unwrap(), vec![1, 2]);
        assert!(matches!(
            dataset.get(5),
            Err(Error::IndexOutOfRange { index: 5, len: 3 })
        ));
    }

    #[test]
    fn negative_positions_count_from_the_end() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("tokens");
        build(&prefix, DType::U16, &[&[1], &[2, 2], &[3, 3, 3]]);
        let dataset = IndexedDataset::open(&prefix).unwrap();

        assert_eq!(dataset.position(0).unwrap(), 0);
        assert_eq!(dataset.position(2).unwrap(), 2);
        assert_eq!(dataset.position(-1).unwrap(), 2);
        assert_eq!(dataset.position(-3).unwrap(), 0);
        assert_eq!(dataset.get(dataset.position(-1).unwrap()).unwrap(), [3, 3, 3]);
        for index in [3, -4, isize::MIN] {
            assert!(matches!(
                dataset.position(index),
                Err(Error::IndexOutOfRange { index: i, len: 3 }) if i == index
            ));
        }
    }

    #[test]
    fn empty_dataset_opens() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("empty");
        build(&prefix, DType::U16, &[]);
        let dataset = IndexedDataset::open(&prefix).unwrap();
        assert!(dataset.is_empty());
        assert!(matches!(dataset.get(0), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn missing_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        assert!(matches!(IndexedDataset::open(&prefix), Err(Error::MissingFile(_))));

        let prefix = dir.path().join("corrupt");
        std::fs::write(index_file_path(&prefix), b"NOTANINDEX").unwrap();
        std::fs::write(data_file_path(&prefix), b"").unwrap();
        assert!(matches!(IndexedDataset::open(&prefix), Err(Error::InvalidIndex { .. })));

        // Index pointing past the end of the blob
        let prefix = dir.path().join("truncated");
        build(&prefix, DType::I64, &[&[1, 2, 3]]);
        std::fs::write(data_file_path(&prefix), [0u8; 8]).unwrap();
        assert!(matches!(IndexedDataset::open(&prefix), Err(Error::InvalidIndex { .. })));
    }
}
