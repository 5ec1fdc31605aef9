//! # Process-Wide Queue
//!
//! The host's composition root calls [`init`] once and keeps the returned
//! [`QueueOwner`] for the lifetime of the process. Anything else reaches the
//! queue through [`get`].
//!
//! Only one owner can exist at a time: a second [`init`] fails until the
//! first owner is shut down.
//!
//! ```rust,ignore
//! let owner = deferq_core::global::init(&QueueConfig::from_env()?, registry, dispatcher)?;
//!
//! // Anywhere, any thread:
//! if let Some(queue) = deferq_core::global::get() {
//!     queue.enqueue_notification(id, NOTIFICATION_READY)?;
//! }
//!
//! // Main loop, drain thread:
//! owner.flush();
//!
//! owner.shutdown();
//! ```

use std::ops::Deref;
use std::sync::Arc;

use deferq_shared::{Dispatcher, ObjectRegistry};
use parking_lot::RwLock;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::queue::DeferredQueue;

static INSTANCE: RwLock<Option<Arc<DeferredQueue>>> = parking_lot::const_rwlock(None);

/// Sole owner of the process-wide queue.
///
/// Dropping it (or calling [`shutdown`](Self::shutdown)) uninstalls the
/// queue. Undrained records are destroyed once the last outstanding
/// reference from [`get`] is gone.
#[derive(Debug)]
pub struct QueueOwner {
    queue: Arc<DeferredQueue>,
}

/// Creates and installs the process-wide queue.
///
/// The calling thread becomes the drain thread.
///
/// # Errors
///
/// Returns [`QueueError::AlreadyInitialized`] while another owner is alive,
/// or [`QueueError::InvalidConfig`] if `config` fails validation.
pub fn init(
    config: &QueueConfig,
    registry: Arc<dyn ObjectRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
) -> QueueResult<QueueOwner> {
    let mut slot = INSTANCE.write();
    if slot.is_some() {
        return Err(QueueError::AlreadyInitialized);
    }
    let queue = Arc::new(DeferredQueue::new(config, registry, dispatcher)?);
    *slot = Some(Arc::clone(&queue));
    tracing::info!(max_size_kb = config.max_size_kb, "message queue initialized");
    Ok(QueueOwner { queue })
}

/// Returns the installed queue, if any.
#[must_use]
pub fn get() -> Option<Arc<DeferredQueue>> {
    INSTANCE.read().clone()
}

impl QueueOwner {
    /// The owned queue.
    #[must_use]
    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }

    /// Uninstalls the queue.
    pub fn shutdown(self) {}
}

impl Deref for QueueOwner {
    type Target = DeferredQueue;

    fn deref(&self) -> &Self::Target {
        &self.queue
    }
}

impl Drop for QueueOwner {
    fn drop(&mut self) {
        let mut slot = INSTANCE.write();
        if slot.as_ref().is_some_and(|installed| Arc::ptr_eq(installed, &self.queue)) {
            *slot = None;
            tracing::info!("message queue shut down");
        }
    }
}
