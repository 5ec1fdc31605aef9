//! # Queue Diagnostics
//!
//! Tallies of the records waiting in the shared arena, for operators
//! chasing an overflowing queue.
//!
//! Staged records that have not been merged yet are not counted.

use std::collections::BTreeMap;
use std::fmt;

use deferq_shared::{ObjectRegistry, Selector};

use crate::arena::{RecordKind, RecordSummary};

/// Snapshot of the shared arena's contents.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStatistics {
    /// Bytes written to the shared arena since the last flush.
    pub total_bytes: usize,
    /// Records whose target no longer resolves.
    pub null_count: usize,
    /// Pending property sets per property.
    pub set_count: BTreeMap<Selector, usize>,
    /// Pending calls per method.
    pub call_count: BTreeMap<Selector, usize>,
    /// Pending notifications per code.
    pub notify_count: BTreeMap<i32, usize>,
}

impl QueueStatistics {
    /// Builds a snapshot from record summaries, resolving each target.
    ///
    /// Records with a vanished target count towards `null_count` only.
    pub fn tally<I>(total_bytes: usize, records: I, registry: &dyn ObjectRegistry) -> Self
    where
        I: IntoIterator<Item = RecordSummary>,
    {
        let mut stats = Self { total_bytes, ..Self::default() };

        for record in records {
            if registry.resolve(record.target).is_none() {
                tracing::debug!(object_id = %record.target, "object was deleted while awaiting a callback");
                stats.null_count += 1;
                continue;
            }
            match (record.kind, record.selector) {
                (RecordKind::Call, Some(method)) => *stats.call_count.entry(method).or_insert(0) += 1,
                (RecordKind::PropertySet, Some(property)) => {
                    *stats.set_count.entry(property).or_insert(0) += 1;
                }
                (RecordKind::Notification, _) => *stats.notify_count.entry(record.code).or_insert(0) += 1,
                (_, None) => {}
            }
        }

        stats
    }

    /// Records counted, live or not.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.null_count
            + self.set_count.values().sum::<usize>()
            + self.call_count.values().sum::<usize>()
            + self.notify_count.values().sum::<usize>()
    }
}

impl fmt::Display for QueueStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TOTAL BYTES: {}", self.total_bytes)?;
        write!(f, "NULL count: {}", self.null_count)?;
        for (property, count) in &self.set_count {
            write!(f, "\nSET {property}: {count}")?;
        }
        for (method, count) in &self.call_count {
            write!(f, "\nCALL {method}: {count}")?;
        }
        for (code, count) in &self.notify_count {
            write!(f, "\nNOTIFY {code}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferq_shared::{ObjectId, ObjectRef};
    use std::sync::Arc;

    struct OnlyEven;

    impl ObjectRegistry for OnlyEven {
        fn resolve(&self, id: ObjectId) -> Option<ObjectRef> {
            (id.raw() % 2 == 0).then(|| Arc::new(()) as ObjectRef)
        }
    }

    fn summary(target: u64, kind: RecordKind, selector: Option<&str>, code: i32) -> RecordSummary {
        RecordSummary {
            target: ObjectId::new(target),
            kind,
            selector: selector.map(Selector::new),
            code,
            arg_count: 0,
            size: 0,
        }
    }

    #[test]
    fn test_tally() {
        let records = vec![
            summary(2, RecordKind::Call, Some("queue_redraw"), 0),
            summary(4, RecordKind::Call, Some("queue_redraw"), 0),
            summary(2, RecordKind::PropertySet, Some("visible"), 0),
            summary(2, RecordKind::Notification, None, 10),
            summary(3, RecordKind::Call, Some("queue_redraw"), 0),
        ];
        let stats = QueueStatistics::tally(512, records, &OnlyEven);

        assert_eq!(stats.total_bytes, 512);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.call_count.get("queue_redraw"), Some(&2));
        assert_eq!(stats.set_count.get("visible"), Some(&1));
        assert_eq!(stats.notify_count.get(&10), Some(&1));
        assert_eq!(stats.record_count(), 5);
    }

    #[test]
    fn test_display() {
        let records = vec![
            summary(2, RecordKind::PropertySet, Some("visible"), 0),
            summary(2, RecordKind::Notification, None, 7),
        ];
        let text = QueueStatistics::tally(100, records, &OnlyEven).to_string();
        assert_eq!(text, "TOTAL BYTES: 100\nNULL count: 0\nSET visible: 1\nNOTIFY 7: 1");
    }
}
