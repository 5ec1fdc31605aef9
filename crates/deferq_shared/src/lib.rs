//! # DEFERQ Shared
//!
//! Common types used by the deferred-invocation queue and by the host that
//! owns the objects it targets.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on `deferq_core`. Hosts implement
//! [`ObjectRegistry`] and [`Dispatcher`] against these types only.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod dispatch;
pub mod id;
pub mod selector;
pub mod value;

pub use dispatch::{DispatchError, Dispatcher, ObjectRef, ObjectRegistry};
pub use id::ObjectId;
pub use selector::Selector;
pub use value::Value;
