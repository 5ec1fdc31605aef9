//! # Deferred Invocation Queue
//!
//! Any thread schedules calls, property sets and notifications against
//! object handles; one designated thread drains them with [`DeferredQueue::flush`].
//!
//! ## Architecture
//!
//! ```text
//!   Thread 1 ──┐                         ┌──────────────────────────┐
//!   Thread 2 ──┼── enqueue_* ──(lock)──> │  Arena (fixed capacity)  │
//!   Thread N ──┘        │                └────────────┬─────────────┘
//!                       │ accumulating?               │ flush (drain thread)
//!                       ▼                             ▼
//!              ┌─────────────────┐        take_next ─(unlock)─ resolve ─ dispatch
//!              │ StagingBuffer   │──merge on          ▲                      │
//!              │ (per thread)    │  last disable      └────────(relock)──────┘
//!              └─────────────────┘
//! ```
//!
//! ## Locking
//!
//! One administrative lock guards the arena cursor, the staging registry and
//! the drain state. It is held for bookkeeping only: never across a dispatch,
//! a registry lookup or diagnostic formatting. Dispatched code may therefore
//! enqueue more work, which the running flush drains before it returns.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use deferq_shared::{Dispatcher, ObjectId, ObjectRegistry, Selector, Value};
use parking_lot::{Mutex, MutexGuard};

use crate::arena::{Arena, Operation, Record, RecordKind, Request};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::staging::{Release, ThreadStaging};
use crate::stats::QueueStatistics;

/// Drain state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainState {
    /// No flush in progress.
    Idle,
    /// A flush is running; further flushes are contract violations.
    Draining,
}

struct QueueState {
    arena: Arena,
    staging: ThreadStaging,
    drain: DrainState,
    peak_usage: usize,
}

/// Process-wide buffer of deferred operations.
///
/// # Thread Safety
///
/// All methods take `&self`. Enqueue from any thread; flush from the thread
/// that created the queue (or any single thread at a time).
///
/// # Example
///
/// ```rust,ignore
/// let queue = DeferredQueue::new(&QueueConfig::default(), registry, dispatcher)?;
///
/// queue.enqueue_property_set(id, &Selector::new("visible"), &Value::Bool(false))?;
/// queue.enqueue_call(id, &Selector::new("queue_redraw"), &[], false)?;
///
/// // Later, on the main thread:
/// queue.flush();
/// ```
pub struct DeferredQueue {
    state: Mutex<QueueState>,
    registry: Arc<dyn ObjectRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    drain_thread: ThreadId,
}

impl DeferredQueue {
    /// Creates a queue sized from `config`.
    ///
    /// The calling thread becomes the drain thread: it never accumulates.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConfig`] if `config` fails validation.
    pub fn new(
        config: &QueueConfig,
        registry: Arc<dyn ObjectRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> QueueResult<Self> {
        config.validate()?;
        Ok(Self::with_capacity(config.capacity_bytes(), registry, dispatcher))
    }

    /// Creates a queue whose shared arena holds `capacity` bytes.
    #[must_use]
    pub fn with_capacity(
        capacity: usize,
        registry: Arc<dyn ObjectRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        tracing::debug!(capacity, "message queue created");
        Self {
            state: Mutex::new(QueueState {
                arena: Arena::new(capacity),
                staging: ThreadStaging::new(),
                drain: DrainState::Idle,
                peak_usage: 0,
            }),
            registry,
            dispatcher,
            drain_thread: thread::current().id(),
        }
    }

    /// Thread that drains the queue and never accumulates.
    #[must_use]
    pub const fn drain_thread(&self) -> ThreadId {
        self.drain_thread
    }

    /// Schedules a call of `method` on `target` with a copy of `args`.
    ///
    /// If `report_errors` is set, a failed call is logged as a warning when
    /// drained; otherwise it is dropped silently.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfCapacity`] if the shared arena is full.
    pub fn enqueue_call(
        &self,
        target: ObjectId,
        method: &Selector,
        args: &[Value],
        report_errors: bool,
    ) -> QueueResult<()> {
        self.push(target, &Request::Call { method, args, report_errors })
    }

    /// Schedules a call without error reporting.
    ///
    /// # Errors
    ///
    /// Same as [`enqueue_call`](Self::enqueue_call).
    pub fn call_deferred(&self, target: ObjectId, method: &Selector, args: &[Value]) -> QueueResult<()> {
        self.enqueue_call(target, method, args, false)
    }

    /// Schedules `property = value` on `target`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfCapacity`] if the shared arena is full.
    pub fn enqueue_property_set(&self, target: ObjectId, property: &Selector, value: &Value) -> QueueResult<()> {
        self.push(target, &Request::PropertySet { property, value })
    }

    /// Schedules delivery of notification `code` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidArgument`] for a negative code, without
    /// touching the arena, or [`QueueError::OutOfCapacity`] if it is full.
    pub fn enqueue_notification(&self, target: ObjectId, code: i32) -> QueueResult<()> {
        if code < 0 {
            return Err(QueueError::InvalidArgument(format!("notification code {code} is negative")));
        }
        self.push(target, &Request::Notification { code })
    }

    fn push(&self, target: ObjectId, request: &Request<'_>) -> QueueResult<()> {
        let caller = thread::current().id();
        let mut state = self.state.lock();

        if let Some(staged) = state.staging.active_mut(caller) {
            staged.push(target, request);
            return Ok(());
        }

        let Err(err) = state.arena.push(target, request) else {
            return Ok(());
        };
        drop(state);

        let what = match request.kind() {
            RecordKind::Call => "method",
            RecordKind::PropertySet => "set",
            RecordKind::Notification => {
                tracing::error!("Failed notification: {} target ID: {target}: {err}", request.describe());
                self.dump_statistics();
                return Err(err);
            }
        };
        let class = self.registry.class_name(target).unwrap_or_default();
        tracing::error!(
            "Failed {what}: {class}:{} target ID: {target}: {err}",
            request.describe()
        );
        self.dump_statistics();
        Err(err)
    }

    /// Turns per-thread accumulation on or off for the calling thread.
    ///
    /// While enabled, the thread's pushes go to a private buffer with no
    /// capacity ceiling. Enables nest; when the last one is released the
    /// buffer is appended to the shared arena as one block. Calls from the
    /// drain thread are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::OutOfCapacity`] if the merge does not fit. The
    /// staged records are destroyed in that case.
    ///
    /// # Panics
    ///
    /// Panics when disabling without a matching enable.
    pub fn set_accumulation_enabled(&self, enabled: bool) -> QueueResult<()> {
        let caller = thread::current().id();
        if caller == self.drain_thread {
            return Ok(());
        }

        let mut state = self.state.lock();

        if enabled {
            let users = state.staging.enable(caller);
            tracing::trace!(thread = ?caller, users, "thread accumulation enabled");
            return Ok(());
        }

        let Some(release) = state.staging.disable(caller) else {
            drop(state);
            tracing::error!(thread = ?caller, "accumulation disabled without a matching enable");
            panic!("unbalanced accumulation disable on thread {caller:?}");
        };

        let mut staged = match release {
            Release::Nested { users } => {
                tracing::trace!(thread = ?caller, users, "thread accumulation released");
                return Ok(());
            }
            Release::Merge(staged) => staged,
        };

        let merged = state.arena.merge(&mut staged);
        drop(state);

        if let Err(err) = merged {
            let lost = staged.record_count();
            tracing::error!(thread = ?caller, lost, "Failed flushing of queue for thread: {err}");
            self.dump_statistics();
            // Destroy the staged records outside the lock.
            drop(staged);
            return Err(err);
        }
        Ok(())
    }

    /// Drains every record, including records pushed while draining.
    ///
    /// Each record is taken under the lock, then resolved, dispatched and
    /// destroyed with the lock released. Records whose target is gone are
    /// destroyed without dispatch.
    ///
    /// A panic raised by a dispatched callback propagates to the caller. The
    /// queue still returns to [`DrainState::Idle`] and the records behind the
    /// failed one are drained by the next flush.
    ///
    /// # Panics
    ///
    /// Panics if a flush is already in progress.
    pub fn flush(&self) {
        let mut state = self.state.lock();

        if state.drain == DrainState::Draining {
            drop(state);
            tracing::error!("message queue flush called while already flushing");
            panic!("message queue flush re-entered while already draining");
        }

        let used = state.arena.used();
        if used > state.peak_usage {
            state.peak_usage = used;
        }
        state.drain = DrainState::Draining;

        let mut drain = DrainGuard { state };
        let mut drained = 0usize;
        while let Some(record) = drain.state.arena.take_next() {
            MutexGuard::unlocked(&mut drain.state, || self.dispatch(record));
            drained += 1;
        }
        drop(drain);

        if drained > 0 {
            tracing::trace!(drained, "message queue flushed");
        }
    }

    /// Resolves and runs one record. Dropping it destroys its payload.
    fn dispatch(&self, record: Record) {
        let Some(object) = self.registry.resolve(record.target) else {
            tracing::debug!(
                object_id = %record.target,
                kind = ?record.kind(),
                "deferred target no longer exists; skipping"
            );
            return;
        };

        match &record.op {
            Operation::Call { method, args, report_errors } => {
                if let Err(err) = self.dispatcher.call(&object, method, args) {
                    if *report_errors {
                        let class = self.registry.class_name(record.target).unwrap_or_default();
                        let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
                        tracing::warn!(
                            "Error calling deferred method: {class}::{method}({}): {err}",
                            rendered.join(", ")
                        );
                    }
                }
            }
            Operation::PropertySet { property, value } => {
                self.dispatcher.set_property(&object, property, value);
            }
            Operation::Notification { code } => self.dispatcher.notify(&object, *code),
        }
    }

    /// Returns true while a flush is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.state.lock().drain == DrainState::Draining
    }

    /// Current drain state.
    #[must_use]
    pub fn drain_state(&self) -> DrainState {
        self.state.lock().drain
    }

    /// Highest shared-arena usage seen at the start of a flush, in bytes.
    #[must_use]
    pub fn peak_usage_bytes(&self) -> usize {
        self.state.lock().peak_usage
    }

    /// Shared arena capacity in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.state.lock().arena.capacity()
    }

    /// Bytes written to the shared arena since the last flush.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.state.lock().arena.used()
    }

    /// Snapshot of the records waiting in the shared arena.
    ///
    /// Read-only: nothing is dispatched or destroyed. Targets are resolved
    /// after the lock is released.
    #[must_use]
    pub fn statistics(&self) -> QueueStatistics {
        let (total_bytes, records) = {
            let state = self.state.lock();
            (state.arena.used(), state.arena.summaries().collect::<Vec<_>>())
        };
        QueueStatistics::tally(total_bytes, records, self.registry.as_ref())
    }

    /// Logs [`statistics`](Self::statistics).
    pub fn dump_statistics(&self) {
        let stats = self.statistics();
        tracing::info!("message queue statistics:\n{stats}");
    }
}

impl Drop for DeferredQueue {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let pending = state.arena.summaries().count();
        let staged_threads = state.staging.len();
        if pending > 0 || staged_threads > 0 {
            tracing::debug!(
                pending,
                staged_threads,
                staged_bytes = state.staging.staged_bytes(),
                "discarding undrained deferred records"
            );
        }
        state.arena.clear();
        // Unmerged staging buffers destroy their records when dropped.
    }
}

/// Ends a drain on every exit path, including a panicking dispatch.
///
/// Records still behind the read head stay live for the next flush; the
/// cursor is only rewound once the arena is fully drained.
struct DrainGuard<'a> {
    state: MutexGuard<'a, QueueState>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.state.arena.is_empty() {
            self.state.arena.clear();
        }
        self.state.drain = DrainState::Idle;
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeferredQueue")
            .field("arena", &state.arena)
            .field("staging", &state.staging)
            .field("drain", &state.drain)
            .field("peak_usage", &state.peak_usage)
            .finish_non_exhaustive()
    }
}
