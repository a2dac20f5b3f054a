//! Collector state and lifecycle.
//!
//! A [`Collector`] owns the tag-prefixed state record, the allocation
//! registry, and the collection driver. Allocation goes through the
//! facade ([`alloc`](Collector::alloc) / [`resize`](Collector::resize) /
//! [`dealloc`](Collector::dealloc)), which mirrors every operation into
//! the registry; a collection cycle resets reachability, assembles the
//! root set according to the configured [`ScanPolicy`], marks, and sweeps
//! whatever stayed unflagged.
//!
//! The collector belongs to the thread that created it: the stack base is
//! probed once at construction and the register snapshot buffer is
//! process-global, so the handle is neither `Send` nor `Sync`.

use std::alloc::{alloc, alloc_zeroed, dealloc, realloc, Layout};
use std::io::Write;
use std::ptr::{self, NonNull};

use crate::config::GcConfig;
use crate::log::{debug_log, info_log, warn_log};
use crate::mark;
use crate::platform::{self, regs, MemoryRegion};
use crate::policy::ScanPolicy;
use crate::record::{self, AllocRecord, STATE_TAG, TAG_LEN};
use crate::stats::CollectorStats;

/// Alignment of every payload; matches what a general-purpose allocator
/// guarantees, and keeps payload words aligned for the scan.
const PAYLOAD_ALIGN: usize = 16;

fn payload_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), PAYLOAD_ALIGN).ok()
}

/// The collector's own bookkeeping, one raw heap allocation per
/// collector.
///
/// Lives behind a raw pointer rather than inline in [`Collector`] so the
/// state sits in a heap region at a stable address with its tag at offset
/// zero, where a heap scan can recognise and step over it.
#[repr(C)]
pub(crate) struct GcState {
    /// Self-identifying tag, [`STATE_TAG`] for the state's whole life.
    pub tag: [u8; TAG_LEN],
    /// High address of the owning thread's stack; 0 when unknown.
    pub stack_base: usize,
    /// Initialised static-data section, null range when unknown.
    pub data: MemoryRegion,
    /// Zero-initialised static-data section, null range when unknown.
    pub bss: MemoryRegion,
    /// Head of the allocation-record list.
    pub head: *mut AllocRecord,
    /// Allocations between triggered collections; 0 disables triggering.
    pub threshold: usize,
    /// Root regions scanned by each cycle.
    pub policy: ScanPolicy,
    /// Lifetime counters.
    pub stats: CollectorStats,
}

/// A conservative stop-the-world mark-and-sweep collector.
///
/// Created with [`Collector::new`] or [`Collector::with_config`]; dropped
/// collectors free every payload still tracked. All memory the collector
/// should manage must come from the facade methods, and collection runs
/// on the owning thread only.
///
/// # Example
///
/// ```rust,ignore
/// use marksweep::{collect, Collector, ScanPolicy};
///
/// let mut gc = Collector::new(ScanPolicy::EVERYTHING_EXCEPT_HEAPS).unwrap();
/// let p = gc.alloc(64, true);
/// assert!(!p.is_null());
/// collect!(gc); // p is still referenced by this frame and survives
/// ```
pub struct Collector {
    state: NonNull<GcState>,
}

impl Collector {
    /// Create a collector scanning the regions selected by `policy`, with
    /// the default trigger threshold.
    ///
    /// Returns `None` if the state allocation fails.
    pub fn new(policy: ScanPolicy) -> Option<Self> {
        let mut config = GcConfig::default();
        config.policy = policy;
        Self::with_config(config)
    }

    /// Create a collector from a full configuration.
    ///
    /// Probes the stack base and the static-section ranges once; a probe
    /// that is unavailable on this platform leaves the corresponding root
    /// region empty and collection proceeds without it.
    pub fn with_config(config: GcConfig) -> Option<Self> {
        crate::log::set_level(config.log_level);

        let stack_base = platform::stack_base().unwrap_or(0);
        if stack_base == 0 && config.policy.contains(ScanPolicy::STACK) {
            warn_log!("stack metadata unavailable; the stack root will be skipped");
        }
        let data = platform::data_section();
        let bss = platform::bss_section();

        unsafe {
            let state = alloc(Layout::new::<GcState>()) as *mut GcState;
            if state.is_null() {
                return None;
            }
            state.write(GcState {
                tag: STATE_TAG,
                stack_base,
                data,
                bss,
                head: ptr::null_mut(),
                threshold: config.threshold,
                policy: config.policy,
                stats: CollectorStats::default(),
            });
            info_log!(
                "collector up: policy {:?}, threshold {}, stack base {:#x}, data {:#x}..{:#x}, bss {:#x}..{:#x}",
                config.policy,
                config.threshold,
                stack_base,
                data.start,
                data.end,
                bss.start,
                bss.end
            );
            Some(Self {
                state: NonNull::new_unchecked(state),
            })
        }
    }

    /// Allocate `size` bytes of tracked memory, optionally zeroed.
    ///
    /// Returns null on allocation failure; if the bookkeeping record
    /// cannot be allocated the payload is released again, so a null
    /// return never leaks. Every `threshold` allocations a collection
    /// cycle runs before this returns.
    pub fn alloc(&mut self, size: usize, zeroed: bool) -> *mut u8 {
        let Some(layout) = payload_layout(size) else {
            return ptr::null_mut();
        };
        let payload = unsafe {
            if zeroed {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        if payload.is_null() {
            return payload;
        }
        let new_record = record::alloc_record(payload, size);
        if new_record.is_null() {
            unsafe { dealloc(payload, layout) };
            return ptr::null_mut();
        }

        let state = self.state.as_ptr();
        let trigger = unsafe {
            record::push(&mut (*state).head, new_record);
            (*state).stats.allocations += 1;
            (*state).stats.live_records += 1;
            (*state).stats.live_bytes += size as u64;
            (*state).threshold > 0
                && (*state).stats.allocations % (*state).threshold as u64 == 0
        };
        if trigger {
            crate::snapshot_registers!();
            self.run_collection();
        }
        payload
    }

    /// Resize the tracked allocation at `ptr` to `new_size` bytes.
    ///
    /// A null `ptr` behaves as [`alloc`](Self::alloc); a zero `new_size`
    /// behaves as [`dealloc`](Self::dealloc) and returns null. Pointers
    /// not obtained from this collector's facade return null with the
    /// registry unchanged.
    pub fn resize(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.alloc(new_size, false);
        }
        if new_size == 0 {
            self.dealloc(ptr);
            return ptr::null_mut();
        }
        if payload_layout(new_size).is_none() {
            return ptr::null_mut();
        }

        let state = self.state.as_ptr();
        unsafe {
            let found = record::find((*state).head, ptr);
            if found.is_null() {
                return ptr::null_mut();
            }
            let old_size = (*found).size;
            let Some(old_layout) = payload_layout(old_size) else {
                return ptr::null_mut();
            };
            let moved = realloc(ptr, old_layout, new_size.max(1));
            if moved.is_null() {
                // The original allocation is intact and still tracked.
                return ptr::null_mut();
            }
            (*found).ptr = moved;
            (*found).size = new_size;
            (*state).stats.live_bytes =
                (*state).stats.live_bytes - old_size as u64 + new_size as u64;
            moved
        }
    }

    /// Release the tracked allocation at `ptr` immediately.
    ///
    /// Null and untracked pointers are silent no-ops.
    pub fn dealloc(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let state = self.state.as_ptr();
        unsafe {
            let mut current = (*state).head;
            while !current.is_null() {
                let next = (*current).next;
                if (*current).ptr == ptr {
                    self.release(current);
                }
                current = next;
            }
        }
    }

    /// Run a mark-and-sweep cycle over the configured root regions.
    ///
    /// This is the inner entry point: it scans whatever the register
    /// snapshot buffer currently holds. Use [`collect!`](crate::collect)
    /// to pair the cycle with a fresh register capture at the call site;
    /// calling this directly is only complete when the register root is
    /// not in the policy.
    pub fn run_collection(&mut self) {
        let state = self.state.as_ptr();
        unsafe {
            (*state).stats.collections += 1;
            let policy = (*state).policy;
            debug_log!(
                "cycle {}: policy {:?}, {} records tracked",
                (*state).stats.collections,
                policy,
                (*state).stats.live_records
            );

            // Reachability carries no meaning between cycles; reset it
            // for every record before any root is walked.
            let mut current = (*state).head;
            while !current.is_null() {
                (*current).reachable = false;
                (*current).reach_addr = 0;
                current = (*current).next;
            }

            // Register pre-pass. A base held solely in a callee-saved
            // register at the call site is only ever seen here.
            if policy.contains(ScanPolicy::REGISTERS) {
                for i in 0..regs::word_count() {
                    mark::mark_value(state, regs::word(i), 0);
                }
            }

            if policy.contains(ScanPolicy::STACK) {
                let base = (*state).stack_base;
                let top = platform::current_stack_top();
                if base != 0 && top != 0 && top < base {
                    mark::mark_region(state, top, base, false);
                }
            }

            if policy.contains(ScanPolicy::DATA) && !(*state).data.is_empty() {
                mark::mark_region(state, (*state).data.start, (*state).data.end, false);
            }
            if policy.contains(ScanPolicy::BSS) && !(*state).bss.is_empty() {
                mark::mark_region(state, (*state).bss.start, (*state).bss.end, false);
            }

            if policy.contains(ScanPolicy::HEAPS) {
                let regions = platform::heap_regions();
                // Thread stacks show up as unnamed anonymous mappings.
                // When the stack root is enabled it already covers the
                // collecting thread's stack with live bounds, so its
                // whole mapping (dead frames included) is not rescanned
                // here. With the stack root disabled, every enumerated
                // region is scanned as-is.
                let own_stack = if policy.contains(ScanPolicy::STACK) && (*state).stack_base != 0 {
                    (*state).stack_base - 1
                } else {
                    0
                };
                for region in &regions {
                    if own_stack != 0 && own_stack >= region.start && own_stack < region.end {
                        continue;
                    }
                    mark::mark_region(state, region.start, region.end, true);
                }
            }
        }
        self.sweep();
    }

    /// Free every record left unflagged by the mark phase.
    fn sweep(&mut self) {
        let state = self.state.as_ptr();
        unsafe {
            let mut current = (*state).head;
            while !current.is_null() {
                let next = (*current).next;
                if !(*current).reachable {
                    self.release(current);
                }
                current = next;
            }
            debug_log!(
                "cycle {} done: {} records live",
                (*state).stats.collections,
                (*state).stats.live_records
            );
        }
    }

    /// Unlink `record`, free its payload and its backing storage, and
    /// account for the removal.
    ///
    /// # Safety
    ///
    /// `record` must be linked into this collector's registry.
    unsafe fn release(&mut self, record: *mut AllocRecord) {
        let state = self.state.as_ptr();
        let size = (*record).size;
        crate::log::trace_log!("releasing {:p} ({} bytes)", (*record).ptr, size);
        record::unlink(&mut (*state).head, record);
        if let Some(layout) = payload_layout(size) {
            dealloc((*record).ptr, layout);
        }
        (*state).stats.live_records -= 1;
        (*state).stats.live_bytes -= size as u64;
        (*state).stats.records_swept += 1;
        (*state).stats.bytes_swept += size as u64;
        record::free_record(record);
    }

    /// A copy of the lifetime counters.
    pub fn stats(&self) -> CollectorStats {
        unsafe { (*self.state.as_ptr()).stats }
    }

    /// Write the collector state and every tracked record to stderr.
    pub fn dump_state(&self) {
        let state = self.state.as_ptr();
        let mut err = std::io::stderr().lock();
        unsafe {
            let stats = (*state).stats;
            let _ = writeln!(
                err,
                "collector @ {:p}: policy {:?}, threshold {}, stack base {:#x}",
                state,
                (*state).policy,
                (*state).threshold,
                (*state).stack_base
            );
            let _ = writeln!(
                err,
                "  data {:#x}..{:#x}, bss {:#x}..{:#x}",
                (*state).data.start,
                (*state).data.end,
                (*state).bss.start,
                (*state).bss.end
            );
            let _ = writeln!(
                err,
                "  {} allocations, {} cycles, {} records swept ({} bytes)",
                stats.allocations, stats.collections, stats.records_swept, stats.bytes_swept
            );
            let mut current = (*state).head;
            while !current.is_null() {
                let _ = writeln!(
                    err,
                    "  record {:p}: {} bytes, reachable {}, seen at {:#x}",
                    (*current).ptr,
                    (*current).size,
                    (*current).reachable,
                    (*current).reach_addr
                );
                current = (*current).next;
            }
        }
    }
}

impl Drop for Collector {
    /// Tear down the collector, freeing every remaining payload, every
    /// record, and the state itself.
    fn drop(&mut self) {
        let state = self.state.as_ptr();
        unsafe {
            let mut current = (*state).head;
            while !current.is_null() {
                let next = (*current).next;
                if let Some(layout) = payload_layout((*current).size) {
                    dealloc((*current).ptr, layout);
                }
                record::free_record(current);
                current = next;
            }
            info_log!(
                "collector down: {} allocations over {} cycles",
                (*state).stats.allocations,
                (*state).stats.collections
            );
            dealloc(state as *mut u8, Layout::new::<GcState>());
        }
    }
}
