//! # Thread-Staging Registry
//!
//! Threads producing bursts of deferred work can opt into accumulating it in
//! a private [`StagingBuffer`] instead of the shared arena. The buffer is
//! merged into the arena as one block when the thread's last enable is
//! balanced by a disable.
//!
//! Enables nest: each one bumps a per-thread user count.

use std::collections::HashMap;
use std::thread::ThreadId;

use crate::arena::StagingBuffer;

/// Outcome of disabling accumulation for a thread.
#[derive(Debug)]
pub enum Release {
    /// Other enables are still outstanding; nothing to merge yet.
    Nested {
        /// Remaining user count.
        users: u32,
    },
    /// The last enable was released; the staged records must be merged.
    Merge(StagingBuffer),
}

#[derive(Debug, Default)]
struct StagingEntry {
    buffer: StagingBuffer,
    users: u32,
}

/// Map from thread identity to that thread's staging buffer.
///
/// An entry exists exactly while its thread has outstanding enables.
#[derive(Debug, Default)]
pub struct ThreadStaging {
    entries: HashMap<ThreadId, StagingEntry>,
}

impl ThreadStaging {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffer `thread` should write to, if it is accumulating.
    pub fn active_mut(&mut self, thread: ThreadId) -> Option<&mut StagingBuffer> {
        self.entries.get_mut(&thread).map(|entry| &mut entry.buffer)
    }

    /// Returns true if `thread` is accumulating.
    #[must_use]
    pub fn is_active(&self, thread: ThreadId) -> bool {
        self.entries.contains_key(&thread)
    }

    /// Registers one enable for `thread`. Returns the new user count.
    pub fn enable(&mut self, thread: ThreadId) -> u32 {
        let entry = self.entries.entry(thread).or_default();
        entry.users += 1;
        entry.users
    }

    /// Releases one enable for `thread`.
    ///
    /// Returns `None` if `thread` has no outstanding enable.
    pub fn disable(&mut self, thread: ThreadId) -> Option<Release> {
        let entry = self.entries.get_mut(&thread)?;
        entry.users -= 1;
        if entry.users > 0 {
            return Some(Release::Nested { users: entry.users });
        }
        self.entries.remove(&thread).map(|entry| Release::Merge(entry.buffer))
    }

    /// Number of threads currently accumulating.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no thread is accumulating.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held across all staging buffers.
    #[must_use]
    pub fn staged_bytes(&self) -> usize {
        self.entries.values().map(|entry| entry.buffer.len()).sum()
    }
}
