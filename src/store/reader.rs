//! Random-access readers over index files.
//!
//! [`RandomAccessReader`] is the contract the search library consumes. One
//! generic implementation, [`BufferedReader`], owns the cursor, the sequential
//! read buffer, slicing and cloning; a [`RangeSource`] supplies the bytes of an
//! absolute range. [`RemoteSource`] serves ranges through the shared block
//! cache and coalesced S3 range requests.
//!
//! ## Read Flow (remote)
//!
//! ```text
//! 1. Partition the absolute range into blocks
//! 2. Look every block up in the cache
//! 3. Misses? → one range request spanning first..last missed block
//! 4. Split the response into blocks and cache each missed block
//! 5. Copy the overlap of each block with the range into the caller's buffer
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use super::block::{Block, BlockPartitioner, FileIdentity};
use super::cache::BlockCache;
use super::client::ObjectStoreClient;
use super::config::{DEFAULT_BUFFER_BYTES, MIN_BUFFER_BYTES};
use super::error::{StoreError, StoreResult};
use super::stats::ReadStats;

/// Seekable, sliceable, cloneable view over a byte range of an index file.
///
/// Positions are relative to the start of the view.
#[async_trait]
pub trait RandomAccessReader: Send + Sync + fmt::Debug {
    /// Human-readable name used in errors and logs.
    fn description(&self) -> &str;

    /// Length of the view in bytes.
    fn length(&self) -> u64;

    /// Current cursor position.
    fn position(&self) -> u64;

    /// Move the cursor.
    ///
    /// # Errors
    ///
    /// `EndOfFile` if `pos > length()`.
    fn seek(&mut self, pos: u64) -> StoreResult<()>;

    /// Fill `dst` from the cursor and advance it.
    ///
    /// # Errors
    ///
    /// `EndOfFile` if fewer than `dst.len()` bytes remain.
    async fn read(&mut self, dst: &mut [u8]) -> StoreResult<()>;

    /// Read one byte.
    async fn read_byte(&mut self) -> StoreResult<u8> {
        let mut byte = [0u8; 1];
        self.read(&mut byte).await?;
        Ok(byte[0])
    }

    /// New reader over `[offset, offset + length)` of this view, with its own
    /// cursor at 0 and its own buffer.
    ///
    /// # Errors
    ///
    /// `InvalidRange` if the window does not fit inside this view.
    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Box<dyn RandomAccessReader>>;

    /// Independent copy positioned where this reader is.
    fn box_clone(&self) -> Box<dyn RandomAccessReader>;
}

impl Clone for Box<dyn RandomAccessReader> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Supplier of absolute byte ranges for a [`BufferedReader`].
#[async_trait]
pub trait RangeSource: Clone + Send + Sync + 'static {
    /// Fill `dst` with the bytes starting at absolute offset `start`.
    async fn read_range(&self, start: u64, dst: &mut [u8]) -> StoreResult<()>;
}

/// Bounds for a reader's default buffer size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferSizing {
    /// Smallest default buffer.
    pub min_bytes: usize,
    /// Largest default buffer.
    pub default_bytes: usize,
}

impl BufferSizing {
    /// Buffer size for a view of `length` bytes:
    /// `min(max(length, min_bytes), default_bytes)`.
    pub fn for_length(&self, length: u64) -> usize {
        length
            .max(self.min_bytes as u64)
            .min(self.default_bytes as u64) as usize
    }
}

impl Default for BufferSizing {
    fn default() -> Self {
        Self {
            min_bytes: MIN_BUFFER_BYTES,
            default_bytes: DEFAULT_BUFFER_BYTES,
        }
    }
}

/// Buffered reader over `[base, base + len)` of a range source.
///
/// Reads smaller than the buffer refill it from the cursor; larger reads go
/// straight to the source. Clones copy the buffer and cursor; slices start
/// empty.
#[derive(Clone)]
pub struct BufferedReader<S> {
    source: S,
    description: String,
    base: u64,
    len: u64,
    sizing: BufferSizing,
    buffer_size: usize,
    buffer: Vec<u8>,
    /// View-relative position of `buffer[0]`.
    buffer_start: u64,
    buffer_pos: usize,
}

impl<S: RangeSource> BufferedReader<S> {
    /// Create a reader over `[base, base + len)` of `source`.
    pub fn new(
        source: S,
        description: impl Into<String>,
        base: u64,
        len: u64,
        sizing: BufferSizing,
    ) -> Self {
        let description = description.into();
        let buffer_size = sizing.for_length(len).max(1);
        trace!(%description, base, len, buffer_size, "Opened reader");
        Self {
            source,
            description,
            base,
            len,
            sizing,
            buffer_size,
            buffer: Vec::new(),
            buffer_start: 0,
            buffer_pos: 0,
        }
    }

    /// Override the buffer size. Buffered bytes are dropped.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        let pos = self.position();
        self.buffer_size = buffer_size.max(1);
        self.buffer = Vec::new();
        self.buffer_start = pos;
        self.buffer_pos = 0;
        self
    }

    /// Size of the sequential read buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Typed variant of [`RandomAccessReader::slice`].
    pub fn slice_reader(&self, description: &str, offset: u64, length: u64) -> StoreResult<Self> {
        let fits = offset
            .checked_add(length)
            .is_some_and(|end| end <= self.len);
        if !fits {
            return Err(StoreError::invalid_range(
                format!("{} [slice={}]", self.description, description),
                offset,
                length,
                self.len,
            ));
        }

        trace!(
            parent = %self.description,
            slice = description,
            offset,
            length,
            "Sliced reader"
        );
        Ok(Self::new(
            self.source.clone(),
            format!("{} [slice={}]", self.description, description),
            self.base + offset,
            length,
            self.sizing,
        ))
    }

    fn eof(&self, position: u64) -> StoreError {
        StoreError::EndOfFile {
            key: self.description.clone(),
            position,
            length: self.len,
        }
    }

    async fn refill(&mut self) -> StoreResult<()> {
        let start = self.position();
        let n = (self.len - start).min(self.buffer_size as u64) as usize;

        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.clear();
        buffer.resize(n, 0);
        self.buffer_start = start;
        self.buffer_pos = 0;

        match self.source.read_range(self.base + start, &mut buffer).await {
            Ok(()) => {
                self.buffer = buffer;
                Ok(())
            }
            Err(e) => {
                buffer.clear();
                self.buffer = buffer;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<S: RangeSource> RandomAccessReader for BufferedReader<S> {
    fn description(&self) -> &str {
        &self.description
    }

    fn length(&self) -> u64 {
        self.len
    }

    fn position(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    fn seek(&mut self, pos: u64) -> StoreResult<()> {
        if pos > self.len {
            return Err(self.eof(pos));
        }

        let buffer_end = self.buffer_start + self.buffer.len() as u64;
        if pos >= self.buffer_start && pos < buffer_end {
            self.buffer_pos = (pos - self.buffer_start) as usize;
        } else {
            self.buffer.clear();
            self.buffer_start = pos;
            self.buffer_pos = 0;
        }
        Ok(())
    }

    async fn read(&mut self, dst: &mut [u8]) -> StoreResult<()> {
        let pos = self.position();
        let end = pos.saturating_add(dst.len() as u64);
        if end > self.len {
            return Err(self.eof(end));
        }

        let mut filled = 0;
        while filled < dst.len() {
            let available = self.buffer.len() - self.buffer_pos;
            if available > 0 {
                let n = available.min(dst.len() - filled);
                dst[filled..filled + n]
                    .copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + n]);
                self.buffer_pos += n;
                filled += n;
                continue;
            }

            let remaining = dst.len() - filled;
            if remaining >= self.buffer_size {
                let start = self.position();
                self.source
                    .read_range(self.base + start, &mut dst[filled..])
                    .await?;
                self.buffer.clear();
                self.buffer_start = start + remaining as u64;
                self.buffer_pos = 0;
                filled = dst.len();
            } else {
                self.refill().await?;
            }
        }
        Ok(())
    }

    fn slice(
        &self,
        description: &str,
        offset: u64,
        length: u64,
    ) -> StoreResult<Box<dyn RandomAccessReader>> {
        Ok(Box::new(self.slice_reader(description, offset, length)?))
    }

    fn box_clone(&self) -> Box<dyn RandomAccessReader> {
        trace!(description = %self.description, pos = self.position(), "Cloned reader");
        Box::new(self.clone())
    }
}

impl<S> fmt::Debug for BufferedReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedReader")
            .field("description", &self.description)
            .field("base", &self.base)
            .field("len", &self.len)
            .field("buffer_size", &self.buffer_size)
            .field("position", &(self.buffer_start + self.buffer_pos as u64))
            .finish()
    }
}

/// Reader over a remote object.
pub type RemoteReader = BufferedReader<RemoteSource>;

/// Range source backed by the block cache and an object store client.
#[derive(Clone)]
pub struct RemoteSource {
    client: Arc<dyn ObjectStoreClient>,
    cache: Arc<BlockCache>,
    stats: Arc<ReadStats>,
    file: Arc<FileIdentity>,
    partitioner: BlockPartitioner,
}

impl RemoteSource {
    /// Create a source for `file`.
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        cache: Arc<BlockCache>,
        stats: Arc<ReadStats>,
        file: Arc<FileIdentity>,
        block_size: u64,
    ) -> Self {
        Self {
            client,
            cache,
            stats,
            file,
            partitioner: BlockPartitioner::new(block_size),
        }
    }

    /// Fetch every block of `blocks` whose slot is empty with one range request
    /// spanning all of them, cache them, and fill their slots.
    ///
    /// `blocks` must be contiguous, with the first and last slots empty.
    async fn fetch_span(&self, blocks: &[Block], slots: &mut [Option<Bytes>]) -> StoreResult<()> {
        let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
            return Ok(());
        };
        let span_start = first.offset;
        let span_end = last.end().min(self.file.size);
        let span_len = span_end - span_start;

        debug!(
            key = %self.file.key,
            offset = span_start,
            length = span_len,
            blocks = blocks.len(),
            "Fetching range from S3"
        );
        let data = self
            .client
            .get_range(&self.file.key, span_start..span_end)
            .await?;
        self.stats.record_fetch(data.len() as u64);

        if (data.len() as u64) < span_len {
            return Err(StoreError::incomplete_read(
                &self.file.key,
                span_len,
                data.len() as u64,
            ));
        }

        for (block, slot) in blocks.iter().zip(slots.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let from = (block.offset - span_start) as usize;
            let to = from + block.length as usize;
            let bytes = if from == 0 && to == data.len() {
                data.clone()
            } else {
                Bytes::copy_from_slice(&data[from..to])
            };
            self.cache.put(block.clone(), bytes.clone());
            *slot = Some(bytes);
        }
        Ok(())
    }
}

#[async_trait]
impl RangeSource for RemoteSource {
    async fn read_range(&self, start: u64, dst: &mut [u8]) -> StoreResult<()> {
        let length = dst.len() as u64;
        let end = start + length;
        let blocks = self.partitioner.partition(&self.file, start, length)?;
        trace!(key = %self.file.key, offset = start, length, "Reading range");

        let mut slots: Vec<Option<Bytes>> = blocks.iter().map(|b| self.cache.get(b)).collect();
        let first_miss = slots.iter().position(Option::is_none);
        let last_miss = slots.iter().rposition(Option::is_none);
        if let (Some(first), Some(last)) = (first_miss, last_miss) {
            self.fetch_span(&blocks[first..=last], &mut slots[first..=last])
                .await?;
        }

        let mut copied = 0usize;
        for (block, slot) in blocks.iter().zip(&slots) {
            let from = start.max(block.offset);
            let to = end.min(block.end());
            let src_from = (from - block.offset) as usize;
            let src_to = (to - block.offset) as usize;
            let Some(bytes) = slot.as_ref().filter(|b| b.len() >= src_to) else {
                return Err(StoreError::incomplete_read(
                    &self.file.key,
                    length,
                    copied as u64,
                ));
            };
            let n = src_to - src_from;
            dst[copied..copied + n].copy_from_slice(&bytes[src_from..src_to]);
            copied += n;
        }

        if copied != dst.len() {
            return Err(StoreError::incomplete_read(
                &self.file.key,
                length,
                copied as u64,
            ));
        }
        self.stats.record_read(copied as u64);
        Ok(())
    }
}
