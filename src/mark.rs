//! Mark engine.
//!
//! Walks untyped memory at pointer-size stride, treating every word whose
//! bit pattern equals a tracked payload base as a reference to it. A hit
//! flags the record and recurses into the payload, since client data may
//! itself hold further tracked bases; the recursion only descends through
//! newly-flagged records, which bounds it on cyclic graphs.
//!
//! When a scanned region is a heap region, the collector's own state and
//! records are in it. Both begin with a fixed tag, and the scan steps
//! over a tagged structure in one move instead of reading its fields;
//! otherwise every record's `ptr` field would keep its own payload alive
//! forever.

use crate::collector::GcState;
use crate::log::trace_log;
use crate::record::{AllocRecord, RECORD_TAG, STATE_TAG, TAG_LEN};

/// Natural pointer size; every scan read is aligned to it.
pub(crate) const WORD: usize = std::mem::size_of::<usize>();

/// Round `addr` up to a multiple of `align` (a power of two).
pub(crate) fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// True if the `TAG_LEN` bytes at `addr` equal `tag`.
unsafe fn tag_at(addr: usize, tag: &[u8; TAG_LEN]) -> bool {
    std::slice::from_raw_parts(addr as *const u8, TAG_LEN) == tag
}

/// Flag every not-yet-reachable record whose base equals `value`, then
/// scan its payload.
///
/// `found_at` records where the sighting happened; 0 means the register
/// snapshot.
///
/// # Safety
///
/// `state` must point to a live collector state.
pub(crate) unsafe fn mark_value(state: *mut GcState, value: usize, found_at: usize) {
    if value == 0 {
        return;
    }
    let mut record = (*state).head;
    while !record.is_null() {
        if !(*record).reachable && (*record).ptr as usize == value {
            (*record).reachable = true;
            (*record).reach_addr = found_at;
            if found_at == 0 {
                trace_log!("{:p} reachable from registers", (*record).ptr);
            } else {
                trace_log!("{:p} reachable from {:#x}", (*record).ptr, found_at);
            }
            let base = (*record).ptr as usize;
            mark_region(state, base, base + (*record).size, true);
        }
        record = (*record).next;
    }
}

/// Conservatively scan `[lo, hi)` for tracked payload bases.
///
/// With `check_tags` set, tagged collector structures found in the region
/// are stepped over whole; this must be set whenever the region may hold
/// the collector's own bookkeeping, i.e. for heap regions and payloads.
///
/// # Safety
///
/// `state` must point to a live collector state and `[lo, hi)` must be
/// readable memory.
pub(crate) unsafe fn mark_region(state: *mut GcState, lo: usize, hi: usize, check_tags: bool) {
    if lo == 0 || hi < WORD {
        return;
    }
    let mut p = align_up(lo, WORD);
    let last = hi - WORD;
    while p <= last {
        if check_tags && p + TAG_LEN <= hi {
            if tag_at(p, &STATE_TAG) {
                p += std::mem::size_of::<GcState>();
                continue;
            }
            if tag_at(p, &RECORD_TAG) {
                p += std::mem::size_of::<AllocRecord>();
                continue;
            }
        }
        let value = (p as *const usize).read_volatile();
        mark_value(state, value, p);
        p += WORD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use std::ptr;

    /// A state with no probed roots, suitable for driving the scan
    /// directly over test buffers.
    fn test_state() -> Box<GcState> {
        Box::new(GcState {
            tag: STATE_TAG,
            stack_base: 0,
            data: crate::platform::MemoryRegion::NULL,
            bss: crate::platform::MemoryRegion::NULL,
            head: ptr::null_mut(),
            threshold: 0,
            policy: crate::ScanPolicy::NONE,
            stats: crate::CollectorStats::default(),
        })
    }

    unsafe fn reachable(record: *mut AllocRecord) -> bool {
        (*record).reachable
    }

    #[test]
    fn align_up_rounds_to_word() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(8, 8), 8);
        assert_eq!(align_up(9, 8), 16);
    }

    #[test]
    fn direct_sighting_marks_record() {
        unsafe {
            let mut state = test_state();
            let payload = Box::into_raw(Box::new([0usize; 4])) as *mut u8;
            let rec = record::alloc_record(payload, 32);
            record::push(&mut state.head, rec);

            let roots = [0usize, payload as usize, 0xdead_beef];
            let lo = roots.as_ptr() as usize;
            mark_region(&mut *state, lo, lo + std::mem::size_of_val(&roots), false);

            assert!(reachable(rec));
            assert_eq!((*rec).reach_addr, lo + WORD);

            record::unlink(&mut state.head, rec);
            record::free_record(rec);
            drop(Box::from_raw(payload as *mut [usize; 4]));
        }
    }

    #[test]
    fn sighting_recurses_through_payload() {
        unsafe {
            let mut state = test_state();
            let inner = Box::into_raw(Box::new([47usize; 2])) as *mut u8;
            let outer = Box::into_raw(Box::new([0usize; 2])) as *mut u8;
            // The outer payload holds the inner base.
            (outer as *mut usize).write(inner as usize);

            let rec_inner = record::alloc_record(inner, 16);
            let rec_outer = record::alloc_record(outer, 16);
            record::push(&mut state.head, rec_inner);
            record::push(&mut state.head, rec_outer);

            let roots = [outer as usize];
            let lo = roots.as_ptr() as usize;
            mark_region(&mut *state, lo, lo + WORD, false);

            assert!(reachable(rec_outer));
            assert!(reachable(rec_inner));
            assert_eq!((*rec_inner).reach_addr, outer as usize);

            for rec in [rec_outer, rec_inner] {
                record::unlink(&mut state.head, rec);
                record::free_record(rec);
            }
            drop(Box::from_raw(outer as *mut [usize; 2]));
            drop(Box::from_raw(inner as *mut [usize; 2]));
        }
    }

    #[test]
    fn cycle_terminates_and_marks_both() {
        unsafe {
            let mut state = test_state();
            let a = Box::into_raw(Box::new([0usize; 2])) as *mut u8;
            let b = Box::into_raw(Box::new([0usize; 2])) as *mut u8;
            (a as *mut usize).write(b as usize);
            (b as *mut usize).write(a as usize);

            let rec_a = record::alloc_record(a, 16);
            let rec_b = record::alloc_record(b, 16);
            record::push(&mut state.head, rec_a);
            record::push(&mut state.head, rec_b);

            let roots = [a as usize];
            let lo = roots.as_ptr() as usize;
            mark_region(&mut *state, lo, lo + WORD, false);

            assert!(reachable(rec_a));
            assert!(reachable(rec_b));

            for rec in [rec_a, rec_b] {
                record::unlink(&mut state.head, rec);
                record::free_record(rec);
            }
            drop(Box::from_raw(a as *mut [usize; 2]));
            drop(Box::from_raw(b as *mut [usize; 2]));
        }
    }

    #[test]
    fn tagged_record_is_stepped_over() {
        // A record structure embedded in a scanned region must not have
        // its fields read as client words.
        #[repr(C)]
        struct Embedded {
            rec: AllocRecord,
            after: usize,
        }

        unsafe {
            let mut state = test_state();
            let payload = Box::into_raw(Box::new([0usize; 2])) as *mut u8;
            let tracked = record::alloc_record(payload, 16);
            record::push(&mut state.head, tracked);

            let embedded = Box::into_raw(Box::new(Embedded {
                rec: AllocRecord {
                    tag: RECORD_TAG,
                    ptr: payload,
                    size: 16,
                    reachable: false,
                    reach_addr: 0,
                    next: ptr::null_mut(),
                    prev: ptr::null_mut(),
                },
                after: 0,
            }));
            let lo = embedded as usize;
            let hi = lo + std::mem::size_of::<Embedded>();

            // With tag checking the embedded record is skipped whole.
            mark_region(&mut *state, lo, hi, true);
            assert!(!reachable(tracked));

            // Without it, the ptr field reads as a sighting.
            mark_region(&mut *state, lo, hi, false);
            assert!(reachable(tracked));

            record::unlink(&mut state.head, tracked);
            record::free_record(tracked);
            drop(Box::from_raw(embedded));
            drop(Box::from_raw(payload as *mut [usize; 2]));
        }
    }

    #[test]
    fn already_reachable_records_are_not_rescanned() {
        unsafe {
            let mut state = test_state();
            let payload = Box::into_raw(Box::new([0usize; 2])) as *mut u8;
            let rec = record::alloc_record(payload, 16);
            (*rec).reachable = true;
            (*rec).reach_addr = 0x1234;
            record::push(&mut state.head, rec);

            let roots = [payload as usize];
            let lo = roots.as_ptr() as usize;
            mark_region(&mut *state, lo, lo + WORD, false);

            // The earlier sighting is preserved.
            assert_eq!((*rec).reach_addr, 0x1234);

            record::unlink(&mut state.head, rec);
            record::free_record(rec);
            drop(Box::from_raw(payload as *mut [usize; 2]));
        }
    }
}
