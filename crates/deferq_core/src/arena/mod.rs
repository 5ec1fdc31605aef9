//! # Record Arenas
//!
//! Byte buffers holding deferred records in place.
//!
//! ## Safety Note
//!
//! This is the only module that touches raw memory. Selectors and argument
//! values are written into byte slots with `write_unaligned` and moved back
//! out with `read_unaligned`. The rest of the crate only sees safe
//! operations: push a request, take the next record, peek summaries, merge a
//! staging buffer, clear.
//!
//! ## Layout
//!
//! ```text
//!   0                 24              24+S          24+S+V         24+S+nV
//!   ┌─────────────────┬───────────────┬─────────────┬─ ─ ─ ─ ─ ─ ─ ─┐
//!   │  RecordHeader   │ Selector slot │  Value[0]   │ ...  Value[n-1] │
//!   │ (Pod, 24 bytes) │  (S bytes)    │  (V bytes)  │                 │
//!   └─────────────────┴───────────────┴─────────────┴─ ─ ─ ─ ─ ─ ─ ─┘
//! ```
//!
//! Notifications have no selector slot and no values. The footprint of any
//! record is computable from its header alone.
//!
//! ## Ownership
//!
//! Bytes between an arena's read head and its write cursor are live records
//! that own their selector and values. Taking a record moves its payload out
//! and advances the head past it; dropping an arena or staging buffer
//! destroys whatever is still live.

#![allow(unsafe_code)]

mod buffer;
mod record;

pub use buffer::{Arena, StagingBuffer, Summaries};
pub use record::{
    call_footprint, notification_footprint, property_set_footprint, Operation, Record,
    RecordKind, RecordSummary, Request, HEADER_SIZE, SELECTOR_SLOT_SIZE, VALUE_SLOT_SIZE,
};
