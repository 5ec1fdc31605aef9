//! # DEFERQ Core
//!
//! Deferred-invocation queue: any thread schedules a method call, a property
//! assignment or a notification against an object handle, and a designated
//! thread executes them later in FIFO order.
//!
//! ## Architecture Rules
//!
//! 1. **Fixed capacity** - The shared arena is allocated once; overflow is
//!    an error, never a resize
//! 2. **In-place records** - Header and payload live inside the arena bytes
//! 3. **Reverse locking** - The lock is released around every dispatch so
//!    dispatched code can schedule more work
//! 4. **One unsafe module** - Raw slot access lives in [`arena`] only
//!
//! ## Example
//!
//! ```rust,ignore
//! use deferq_core::{DeferredQueue, QueueConfig};
//! use deferq_shared::{ObjectId, Selector, Value};
//!
//! let queue = DeferredQueue::new(&QueueConfig::from_env()?, registry, dispatcher)?;
//! queue.enqueue_property_set(ObjectId::new(42), &Selector::new("visible"), &Value::Bool(false))?;
//! queue.enqueue_call(ObjectId::new(42), &Selector::new("queue_redraw"), &[], false)?;
//! queue.flush();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod arena;
pub mod config;
pub mod error;
pub mod global;
pub mod queue;
pub mod staging;
pub mod stats;

pub use arena::{call_footprint, notification_footprint, property_set_footprint, Arena, RecordKind, StagingBuffer};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use global::QueueOwner;
pub use queue::{DeferredQueue, DrainState};
pub use stats::QueueStatistics;
