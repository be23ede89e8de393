//! File identities and fixed-size block partitioning.
//!
//! A remote object is cut into file-aligned blocks of `block_size` bytes; the
//! last block may be shorter. Blocks are the unit the cache stores and evicts,
//! so partitioning must be deterministic: the same request always yields the
//! same blocks in the same order, whichever reader, slice or clone asks.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::error::{StoreError, StoreResult};

/// Identity of a remote object as obtained from a listing.
///
/// Two identities are equal iff they name the same object with the same size.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity {
    /// Store location (bucket).
    pub location: String,
    /// Object key.
    pub key: String,
    /// Object size in bytes.
    pub size: u64,
}

impl FileIdentity {
    /// Create a new identity.
    pub fn new(location: impl Into<String>, key: impl Into<String>, size: u64) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
            size,
        }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({} bytes)", self.location, self.key, self.size)
    }
}

/// A file-aligned chunk of a remote object.
///
/// Equality and hashing use `(file, index)`; ordering is by offset.
#[derive(Clone, Debug)]
pub struct Block {
    /// Object the block belongs to.
    pub file: Arc<FileIdentity>,
    /// Block number within the object.
    pub index: u64,
    /// Byte offset of the first byte: `index * block_size`.
    pub offset: u64,
    /// Byte length: `min(block_size, file.size - offset)`.
    pub length: u64,
}

impl Block {
    /// Create the block with the given index.
    pub fn new(file: Arc<FileIdentity>, index: u64, block_size: u64) -> Self {
        let offset = index * block_size;
        let length = block_size.min(file.size.saturating_sub(offset));
        Self {
            file,
            index,
            offset,
            length,
        }
    }

    /// Offset one past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.file == other.file
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.file.hash(state);
        self.index.hash(state);
    }
}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset
            .cmp(&other.offset)
            .then_with(|| self.index.cmp(&other.index))
            .then_with(|| self.file.cmp(&other.file))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{}+{}",
            self.file.key, self.index, self.offset, self.length
        )
    }
}

/// Maps byte ranges of a file onto the blocks that cover them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockPartitioner {
    block_size: u64,
}

impl BlockPartitioner {
    /// Create a partitioner. A zero `block_size` makes every partition fail.
    pub fn new(block_size: u64) -> Self {
        Self { block_size }
    }

    /// The partition granularity.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Blocks covering `[offset, offset + length)` of `file`, in ascending order.
    ///
    /// A zero-length request covers no blocks.
    ///
    /// # Errors
    ///
    /// `InvalidRange` if the range extends past the end of the file, `Config`
    /// if the block size is zero.
    pub fn partition(
        &self,
        file: &Arc<FileIdentity>,
        offset: u64,
        length: u64,
    ) -> StoreResult<Vec<Block>> {
        if self.block_size == 0 {
            return Err(StoreError::config("block_size must be positive"));
        }
        let end = offset
            .checked_add(length)
            .filter(|end| *end <= file.size)
            .ok_or_else(|| StoreError::invalid_range(&file.key, offset, length, file.size))?;

        if length == 0 {
            return Ok(Vec::new());
        }

        let first = offset / self.block_size;
        let last = (end - 1) / self.block_size;
        Ok((first..=last)
            .map(|index| Block::new(file.clone(), index, self.block_size))
            .collect())
    }
}
