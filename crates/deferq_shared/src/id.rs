//! Stable object handles.

use std::fmt;

/// Opaque, stable identifier for a live object.
///
/// The queue never dereferences a handle when work is scheduled; it is
/// resolved through an [`ObjectRegistry`](crate::ObjectRegistry) only when
/// the work is drained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// The null handle. Never resolves.
    pub const NULL: Self = Self(0);

    /// Creates a handle from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true for the null handle.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::new(42).is_null());
        assert_eq!(ObjectId::from(7).raw(), 7);
        assert_eq!(ObjectId::new(42).to_string(), "42");
    }
}
