//! Record codec: header layout, footprints, slot construction and teardown.

use std::mem::{self, ManuallyDrop};
use std::ptr;

use bytemuck::{Pod, Zeroable};
use deferq_shared::{ObjectId, Selector, Value};

/// Kind of deferred operation stored in a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordKind {
    /// Method call with 0..N arguments.
    Call = 1,
    /// Property assignment with exactly one value.
    PropertySet = 2,
    /// Integer notification, no selector, no values.
    Notification = 3,
}

const KIND_MASK: u8 = 0x0F;
const FLAG_REPORT_ERRORS: u8 = 0x80;

/// Fixed record header. Plain old data, read and written unaligned.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
struct RecordHeader {
    target: u64,
    /// Notification code; zero for other kinds.
    code: i32,
    arg_count: u32,
    kind_flags: u8,
    _pad: [u8; 7],
}

/// Size of the record header in bytes.
pub const HEADER_SIZE: usize = mem::size_of::<RecordHeader>();

/// Size of the in-place selector slot in bytes.
pub const SELECTOR_SLOT_SIZE: usize = mem::size_of::<Selector>();

/// Size of one in-place argument value slot in bytes.
pub const VALUE_SLOT_SIZE: usize = mem::size_of::<Value>();

/// Bytes occupied by a record of `kind` carrying `arg_count` values.
#[inline]
#[must_use]
const fn footprint(kind: RecordKind, arg_count: usize) -> usize {
    match kind {
        RecordKind::Notification => HEADER_SIZE,
        RecordKind::Call | RecordKind::PropertySet => {
            HEADER_SIZE + SELECTOR_SLOT_SIZE + arg_count * VALUE_SLOT_SIZE
        }
    }
}

/// Bytes occupied by a call record with `arg_count` arguments.
#[inline]
#[must_use]
pub const fn call_footprint(arg_count: usize) -> usize {
    footprint(RecordKind::Call, arg_count)
}

/// Bytes occupied by a property-set record.
#[inline]
#[must_use]
pub const fn property_set_footprint() -> usize {
    footprint(RecordKind::PropertySet, 1)
}

/// Bytes occupied by a notification record.
#[inline]
#[must_use]
pub const fn notification_footprint() -> usize {
    footprint(RecordKind::Notification, 0)
}

impl RecordHeader {
    fn new(target: ObjectId, kind: RecordKind, arg_count: usize, code: i32, report_errors: bool) -> Self {
        let mut kind_flags = kind as u8;
        if report_errors {
            kind_flags |= FLAG_REPORT_ERRORS;
        }
        Self {
            target: target.raw(),
            code,
            arg_count: arg_count as u32,
            kind_flags,
            _pad: [0; 7],
        }
    }

    fn read(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE])
    }

    fn kind(&self) -> RecordKind {
        match self.kind_flags & KIND_MASK {
            1 => RecordKind::Call,
            2 => RecordKind::PropertySet,
            3 => RecordKind::Notification,
            // Headers are only ever produced by `RecordHeader::new`.
            other => panic!("corrupt deferred record header: kind {other}"),
        }
    }

    const fn report_errors(&self) -> bool {
        self.kind_flags & FLAG_REPORT_ERRORS != 0
    }

    fn arg_count(&self) -> usize {
        match self.kind() {
            RecordKind::Notification => 0,
            _ => self.arg_count as usize,
        }
    }

    fn footprint(&self) -> usize {
        footprint(self.kind(), self.arg_count())
    }
}

/// A borrowed request, encoded into an arena by copying its payload.
#[derive(Clone, Copy, Debug)]
pub enum Request<'a> {
    /// Invoke `method` with `args`.
    Call {
        /// Method to invoke.
        method: &'a Selector,
        /// Arguments, cloned into the record.
        args: &'a [Value],
        /// Log a warning if the call fails at drain time.
        report_errors: bool,
    },
    /// Assign `value` to `property`.
    PropertySet {
        /// Property to assign.
        property: &'a Selector,
        /// Value, cloned into the record.
        value: &'a Value,
    },
    /// Deliver notification `code`.
    Notification {
        /// Notification code; never negative once validated.
        code: i32,
    },
}

impl Request<'_> {
    /// Kind of record this request produces.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Call { .. } => RecordKind::Call,
            Self::PropertySet { .. } => RecordKind::PropertySet,
            Self::Notification { .. } => RecordKind::Notification,
        }
    }

    /// Bytes this request occupies once encoded.
    #[must_use]
    pub const fn footprint(&self) -> usize {
        match self {
            Self::Call { args, .. } => call_footprint(args.len()),
            Self::PropertySet { .. } => property_set_footprint(),
            Self::Notification { .. } => notification_footprint(),
        }
    }

    /// Selector name for logging, or the code for notifications.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Call { method, .. } => method.to_string(),
            Self::PropertySet { property, .. } => property.to_string(),
            Self::Notification { code } => code.to_string(),
        }
    }
}

/// A deferred operation moved out of an arena.
///
/// Owns its selector and values; dropping it is what destroys them.
#[derive(Debug)]
pub struct Record {
    /// Handle of the target object.
    pub target: ObjectId,
    /// What to do with the target.
    pub op: Operation,
}

/// Payload of a [`Record`].
#[derive(Debug)]
pub enum Operation {
    /// Method call.
    Call {
        /// Method to invoke.
        method: Selector,
        /// Arguments.
        args: Vec<Value>,
        /// Log a warning if the call fails.
        report_errors: bool,
    },
    /// Property assignment.
    PropertySet {
        /// Property to assign.
        property: Selector,
        /// New value.
        value: Value,
    },
    /// Notification.
    Notification {
        /// Notification code.
        code: i32,
    },
}

impl Record {
    /// Kind of this record.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self.op {
            Operation::Call { .. } => RecordKind::Call,
            Operation::PropertySet { .. } => RecordKind::PropertySet,
            Operation::Notification { .. } => RecordKind::Notification,
        }
    }
}

/// Read-only view of a live record, used by diagnostics.
#[derive(Clone, Debug)]
pub struct RecordSummary {
    /// Handle of the target object.
    pub target: ObjectId,
    /// Record kind.
    pub kind: RecordKind,
    /// Method or property; `None` for notifications.
    pub selector: Option<Selector>,
    /// Notification code; zero for other kinds.
    pub code: i32,
    /// Number of argument values.
    pub arg_count: usize,
    /// Bytes occupied in the arena.
    pub size: usize,
}

/// Writes `value` into a slot of exactly `size_of::<T>()` bytes.
///
/// Whatever the slot held before is overwritten, not dropped.
fn write_slot<T>(slot: &mut [u8], value: T) {
    assert_eq!(slot.len(), mem::size_of::<T>());
    // SAFETY: `slot` is exactly `size_of::<T>()` writable bytes and
    // `write_unaligned` places no alignment requirement on the destination.
    unsafe { ptr::write_unaligned(slot.as_mut_ptr().cast::<T>(), value) }
}

/// Moves a `T` out of a slot.
///
/// # Safety
///
/// The slot must hold a `T` written by `write_slot` that has not been taken
/// since. After this call the slot bytes are dead.
unsafe fn take_slot<T>(slot: &mut [u8]) -> T {
    debug_assert_eq!(slot.len(), mem::size_of::<T>());
    // SAFETY: upheld by the caller.
    unsafe { ptr::read_unaligned(slot.as_ptr().cast::<T>()) }
}

/// Clones the `T` in a slot without taking ownership of it.
///
/// # Safety
///
/// Same as [`take_slot`]; the slot stays live.
unsafe fn clone_slot<T: Clone>(slot: &[u8]) -> T {
    debug_assert_eq!(slot.len(), mem::size_of::<T>());
    // SAFETY: upheld by the caller. The bitwise copy is never dropped, so
    // ownership stays with the slot.
    let shadow = ManuallyDrop::new(unsafe { ptr::read_unaligned(slot.as_ptr().cast::<T>()) });
    T::clone(&shadow)
}

/// Encodes `request` for `target` into `dst`, which must be exactly
/// `request.footprint()` bytes.
///
/// Selector and values are cloned in; the caller keeps its originals.
pub(super) fn encode(dst: &mut [u8], target: ObjectId, request: &Request<'_>) {
    assert_eq!(dst.len(), request.footprint(), "record slot size mismatch");

    let (header, rest) = dst.split_at_mut(HEADER_SIZE);
    match *request {
        Request::Call { method, args, report_errors } => {
            let h = RecordHeader::new(target, RecordKind::Call, args.len(), 0, report_errors);
            header.copy_from_slice(bytemuck::bytes_of(&h));
            let (sel, values) = rest.split_at_mut(SELECTOR_SLOT_SIZE);
            write_slot(sel, method.clone());
            for (slot, arg) in values.chunks_exact_mut(VALUE_SLOT_SIZE).zip(args) {
                write_slot(slot, arg.clone());
            }
        }
        Request::PropertySet { property, value } => {
            let h = RecordHeader::new(target, RecordKind::PropertySet, 1, 0, false);
            header.copy_from_slice(bytemuck::bytes_of(&h));
            let (sel, values) = rest.split_at_mut(SELECTOR_SLOT_SIZE);
            write_slot(sel, property.clone());
            write_slot(values, value.clone());
        }
        Request::Notification { code } => {
            let h = RecordHeader::new(target, RecordKind::Notification, 0, code, false);
            header.copy_from_slice(bytemuck::bytes_of(&h));
        }
    }
}

/// Footprint of the live record starting at `bytes[0]`.
pub(super) fn record_size(bytes: &[u8]) -> usize {
    RecordHeader::read(bytes).footprint()
}

/// Moves the record at the start of `bytes` out. Returns it with its size.
///
/// # Safety
///
/// `bytes` must start with a live record produced by [`encode`]. The record
/// is dead afterwards.
pub(super) unsafe fn take(bytes: &mut [u8]) -> (Record, usize) {
    let header = RecordHeader::read(bytes);
    let size = header.footprint();
    let target = ObjectId::new(header.target);
    let rest = &mut bytes[HEADER_SIZE..size];

    // SAFETY: every slot below was written by `encode` for this header and
    // the caller guarantees none of them has been taken.
    let op = unsafe {
        match header.kind() {
            RecordKind::Call => {
                let (sel, values) = rest.split_at_mut(SELECTOR_SLOT_SIZE);
                let method = take_slot::<Selector>(sel);
                let args = values
                    .chunks_exact_mut(VALUE_SLOT_SIZE)
                    .map(|slot| take_slot::<Value>(slot))
                    .collect();
                Operation::Call { method, args, report_errors: header.report_errors() }
            }
            RecordKind::PropertySet => {
                let (sel, values) = rest.split_at_mut(SELECTOR_SLOT_SIZE);
                Operation::PropertySet {
                    property: take_slot::<Selector>(sel),
                    value: take_slot::<Value>(values),
                }
            }
            RecordKind::Notification => Operation::Notification { code: header.code },
        }
    };

    (Record { target, op }, size)
}

/// Summarizes the record at the start of `bytes` without consuming it.
///
/// # Safety
///
/// `bytes` must start with a live record produced by [`encode`].
pub(super) unsafe fn peek(bytes: &[u8]) -> RecordSummary {
    let header = RecordHeader::read(bytes);
    let kind = header.kind();
    let selector = match kind {
        RecordKind::Notification => None,
        // SAFETY: the selector slot of a live call/set record holds a Selector.
        _ => Some(unsafe { clone_slot::<Selector>(&bytes[HEADER_SIZE..HEADER_SIZE + SELECTOR_SLOT_SIZE]) }),
    };
    RecordSummary {
        target: ObjectId::new(header.target),
        kind,
        selector,
        code: header.code,
        arg_count: header.arg_count(),
        size: header.footprint(),
    }
}

/// Destroys every live record in `bytes`, which must hold whole records
/// back to back. Returns how many were destroyed.
///
/// # Safety
///
/// Every record in `bytes` must be live.
pub(super) unsafe fn destroy_all(bytes: &mut [u8]) -> usize {
    let mut pos = 0;
    let mut count = 0;
    while pos < bytes.len() {
        // SAFETY: upheld by the caller; `pos` always lands on a record start.
        let (record, size) = unsafe { take(&mut bytes[pos..]) };
        drop(record);
        pos += size;
        count += 1;
    }
    count
}
