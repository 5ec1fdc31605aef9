//! # Dispatch Contracts
//!
//! The two seams the queue calls out through when it drains:
//!
//! - [`ObjectRegistry`] turns a handle into a live object, or reports it gone.
//! - [`Dispatcher`] performs the named call, property set or notification.
//!
//! Both are implemented by the host. Implementations may schedule more
//! deferred work from inside any of these methods.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

use crate::id::ObjectId;
use crate::selector::Selector;
use crate::value::Value;

/// A resolved, live object.
///
/// The queue treats it as opaque and only hands it back to the [`Dispatcher`].
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

/// Reasons a deferred call could not be performed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The target has no method with this name.
    #[error("method not found")]
    InvalidMethod,

    /// More arguments were supplied than the method takes.
    #[error("too many arguments: expected {expected}, given {given}")]
    TooManyArguments {
        /// Arguments the method takes.
        expected: usize,
        /// Arguments supplied.
        given: usize,
    },

    /// Fewer arguments were supplied than the method takes.
    #[error("too few arguments: expected {expected}, given {given}")]
    TooFewArguments {
        /// Arguments the method takes.
        expected: usize,
        /// Arguments supplied.
        given: usize,
    },

    /// An argument has the wrong type.
    #[error("cannot convert argument {index} to {expected}")]
    InvalidArgument {
        /// Zero-based argument index.
        index: usize,
        /// Name of the expected type.
        expected: &'static str,
    },

    /// The resolved instance refused the call.
    #[error("instance is null")]
    InstanceIsNull,
}

/// Resolves handles to live objects.
pub trait ObjectRegistry: Send + Sync {
    /// Returns the live object for `id`, or `None` if it has been destroyed.
    fn resolve(&self, id: ObjectId) -> Option<ObjectRef>;

    /// Returns a class name for `id`, used when logging failures.
    fn class_name(&self, _id: ObjectId) -> Option<String> {
        None
    }
}

/// Performs deferred work on a resolved object.
pub trait Dispatcher: Send + Sync {
    /// Invokes `method` with `args`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] if the call could not be performed.
    fn call(&self, target: &ObjectRef, method: &Selector, args: &[Value]) -> Result<(), DispatchError>;

    /// Assigns `value` to `property`.
    fn set_property(&self, target: &ObjectRef, property: &Selector, value: &Value);

    /// Delivers notification `code`.
    fn notify(&self, target: &ObjectRef, code: i32);
}
