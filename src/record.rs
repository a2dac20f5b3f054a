//! Allocation records.
//!
//! Every tracked payload is described by an [`AllocRecord`] kept on a
//! doubly-linked list headed by the collector state. Records are separate
//! raw allocations, never embedded in the payload they describe, and each
//! begins with a fixed ASCII tag. The tags let the scan engine recognise
//! the collector's own bookkeeping when it walks heap regions and step
//! over it; without that, the `ptr` field of every record would read as a
//! reference to its payload and nothing would ever be swept.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr;

/// Length of the self-identifying tags.
pub(crate) const TAG_LEN: usize = 16;

/// Tag leading every allocation record.
pub(crate) const RECORD_TAG: [u8; TAG_LEN] = *b"<<MS:RECORD:01>>";

/// Tag leading the collector state.
pub(crate) const STATE_TAG: [u8; TAG_LEN] = *b"<<MS::STATE:01>>";

/// Bookkeeping for one tracked allocation.
///
/// The tag is the first field and `repr(C)` pins it to offset zero, so a
/// pointer-aligned read at the record's base always sees the tag bytes.
#[repr(C)]
pub(crate) struct AllocRecord {
    /// Self-identifying tag, [`RECORD_TAG`] for the record's whole life.
    pub tag: [u8; TAG_LEN],
    /// User-visible payload base.
    pub ptr: *mut u8,
    /// Requested payload length in bytes.
    pub size: usize,
    /// Set during a collection cycle; unspecified outside one.
    pub reachable: bool,
    /// Address of the word that marked this record, 0 for a register hit
    /// or when unset.
    pub reach_addr: usize,
    /// Next record in the list.
    pub next: *mut AllocRecord,
    /// Previous record in the list, null at the head.
    pub prev: *mut AllocRecord,
}

/// Allocate and initialise a record for `(ptr, size)`.
///
/// Returns null if the backing allocation fails; the caller then unwinds
/// the payload allocation.
pub(crate) fn alloc_record(ptr: *mut u8, size: usize) -> *mut AllocRecord {
    unsafe {
        let record = alloc(Layout::new::<AllocRecord>()) as *mut AllocRecord;
        if record.is_null() {
            return record;
        }
        record.write(AllocRecord {
            tag: RECORD_TAG,
            ptr,
            size,
            reachable: false,
            reach_addr: 0,
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        });
        record
    }
}

/// Release a record's backing allocation.
///
/// # Safety
///
/// `record` must have come from [`alloc_record`] and must already be
/// unlinked.
pub(crate) unsafe fn free_record(record: *mut AllocRecord) {
    dealloc(record as *mut u8, Layout::new::<AllocRecord>());
}

/// Push `record` at the head of the list.
///
/// # Safety
///
/// `record` must be valid and not currently linked anywhere.
pub(crate) unsafe fn push(head: &mut *mut AllocRecord, record: *mut AllocRecord) {
    (*record).prev = ptr::null_mut();
    (*record).next = *head;
    if !(*head).is_null() {
        (**head).prev = record;
    }
    *head = record;
}

/// Unlink `record` from the list in both directions.
///
/// # Safety
///
/// `record` must currently be linked into the list headed by `head`.
pub(crate) unsafe fn unlink(head: &mut *mut AllocRecord, record: *mut AllocRecord) {
    if !(*record).prev.is_null() {
        (*(*record).prev).next = (*record).next;
    } else {
        *head = (*record).next;
    }
    if !(*record).next.is_null() {
        (*(*record).next).prev = (*record).prev;
    }
    (*record).next = ptr::null_mut();
    (*record).prev = ptr::null_mut();
}

/// Find the record whose payload base equals `ptr`.
///
/// Matching is exact base equality; interior pointers are not recognised.
///
/// # Safety
///
/// `head` must be a valid list head.
pub(crate) unsafe fn find(head: *mut AllocRecord, ptr: *mut u8) -> *mut AllocRecord {
    let mut record = head;
    while !record.is_null() {
        if (*record).ptr == ptr {
            return record;
        }
        record = (*record).next;
    }
    ptr::null_mut()
}
