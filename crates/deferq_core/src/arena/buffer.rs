//! Shared fixed-capacity arena and growable per-thread staging buffers.

use std::mem;

use deferq_shared::ObjectId;

use super::record::{self, Record, RecordSummary, Request};
use crate::error::{QueueError, QueueResult};

/// Fixed-capacity record arena with an append-only write cursor.
///
/// Records live between the read head and the write cursor. Capacity is set
/// once; exceeding it is an error, never a resize.
///
/// # Thread Safety
///
/// Not synchronized. The queue keeps it behind its administrative lock.
///
/// # Example
///
/// ```rust,ignore
/// let mut arena = Arena::new(64 * 1024);
/// arena.push(ObjectId::new(42), &Request::Notification { code: 10 })?;
/// while let Some(record) = arena.take_next() {
///     // dispatch...
/// }
/// arena.clear();
/// ```
pub struct Arena {
    /// Backing storage. Never reallocated.
    storage: Box<[u8]>,
    /// Start of the first live record.
    head: usize,
    /// End of the last record.
    cursor: usize,
}

impl Arena {
    /// Creates an arena of `capacity` bytes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            cursor: 0,
        }
    }

    /// Total capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes written since the last clear, including already-taken records.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.cursor
    }

    /// Returns true if no live records remain.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == self.cursor
    }

    /// Reserves `n` bytes at the cursor. The cursor must stay strictly below
    /// capacity; on failure nothing changes.
    fn reserve(&mut self, n: usize) -> QueueResult<&mut [u8]> {
        let end = self.cursor.saturating_add(n);
        if end >= self.capacity() {
            return Err(QueueError::OutOfCapacity {
                needed: n,
                used: self.cursor,
                capacity: self.capacity(),
            });
        }
        let start = self.cursor;
        self.cursor = end;
        Ok(&mut self.storage[start..end])
    }

    /// Encodes `request` for `target` at the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfCapacity`] if the record does not fit. The
    /// cursor is left unchanged.
    pub fn push(&mut self, target: ObjectId, request: &Request<'_>) -> QueueResult<()> {
        let slot = self.reserve(request.footprint())?;
        record::encode(slot, target, request);
        Ok(())
    }

    /// Appends every record of `staged` verbatim, as one contiguous block.
    ///
    /// On success `staged` is left empty and its records belong to this
    /// arena. On failure both are unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfCapacity`] if the block does not fit.
    pub fn merge(&mut self, staged: &mut StagingBuffer) -> QueueResult<()> {
        if staged.is_empty() {
            return Ok(());
        }
        let slot = self.reserve(staged.len())?;
        slot.copy_from_slice(&staged.data);
        // The bitwise copy now owns the payloads; forget the originals.
        staged.data.clear();
        Ok(())
    }

    /// Moves the next live record out, advancing the read head past it.
    ///
    /// The head advances before the caller sees the record, so pushes made
    /// while the record is being processed land behind it.
    pub fn take_next(&mut self) -> Option<Record> {
        if self.head >= self.cursor {
            return None;
        }
        // SAFETY: `head` is the start of a live record; advancing it below
        // marks the record dead.
        let (record, size) = unsafe { record::take(&mut self.storage[self.head..self.cursor]) };
        self.head += size;
        Some(record)
    }

    /// Iterates over live records without consuming them.
    #[must_use]
    pub fn summaries(&self) -> Summaries<'_> {
        Summaries { bytes: &self.storage[self.head..self.cursor] }
    }

    /// Destroys any live records and resets both head and cursor to zero.
    ///
    /// Returns the number of records destroyed. The bytes are not wiped.
    pub fn clear(&mut self) -> usize {
        // SAFETY: everything between head and cursor is live.
        let destroyed = unsafe { record::destroy_all(&mut self.storage[self.head..self.cursor]) };
        self.head = 0;
        self.cursor = 0;
        destroyed
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Iterator over live records of an [`Arena`].
pub struct Summaries<'a> {
    bytes: &'a [u8],
}

impl Iterator for Summaries<'_> {
    type Item = RecordSummary;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        // SAFETY: `bytes` is a suffix of an arena's live region starting on a
        // record boundary; peeking does not take ownership.
        let summary = unsafe { record::peek(self.bytes) };
        self.bytes = &self.bytes[summary.size..];
        Some(summary)
    }
}

/// Growable per-thread record buffer with no capacity ceiling.
///
/// Records stay here until merged into the shared [`Arena`]. Dropping the
/// buffer destroys anything not merged.
#[derive(Default)]
pub struct StagingBuffer {
    data: Vec<u8>,
}

impl StagingBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Bytes of staged records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is staged.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encodes `request` for `target` at the end of the buffer.
    pub fn push(&mut self, target: ObjectId, request: &Request<'_>) {
        let start = self.data.len();
        self.data.resize(start + request.footprint(), 0);
        record::encode(&mut self.data[start..], target, request);
    }

    /// Number of staged records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        let mut pos = 0;
        let mut count = 0;
        while pos < self.data.len() {
            pos += record::record_size(&self.data[pos..]);
            count += 1;
        }
        count
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        let mut data = mem::take(&mut self.data);
        // SAFETY: the buffer only ever holds whole, live records.
        unsafe { record::destroy_all(&mut data) };
    }
}

impl std::fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingBuffer").field("len", &self.data.len()).finish()
    }
}
