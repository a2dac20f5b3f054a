//! # marksweep
//!
//! An embeddable, conservative, stop-the-world mark-and-sweep garbage
//! collector. The host program allocates through the collector's facade
//! instead of the platform allocator; on collection the process's own
//! memory — CPU registers, the calling thread's stack, the static-data
//! sections, optionally every writable heap region — is scanned for bit
//! patterns equal to tracked allocation bases, and whatever is never
//! sighted is freed.
//!
//! The scan is conservative: a word that merely happens to equal a
//! tracked base keeps the allocation alive. It never frees memory that is
//! still referenced through a scanned root; it may retain memory whose
//! last reference is a coincidence or a stale copy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          MARKSWEEP                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Facade    │  │  Mark engine │  │    Sweep     │           │
//! │  │(collector.rs)│  │  (mark.rs)   │  │(collector.rs)│           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Registry   │  │   Platform   │  │   Snapshot   │           │
//! │  │ (record.rs)  │  │ (platform/)  │  │  (regs.rs)   │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use marksweep::{collect, Collector, ScanPolicy};
//!
//! let mut gc = Collector::new(ScanPolicy::EVERYTHING_EXCEPT_HEAPS).unwrap();
//!
//! let p = gc.alloc(std::mem::size_of::<u64>(), true) as *mut u64;
//! unsafe { *p = 47 };
//!
//! collect!(gc);                 // p is on this frame's stack: survives
//! assert_eq!(unsafe { *p }, 47);
//! ```
//!
//! ## Ownership and threading
//!
//! A [`Collector`] belongs to the thread that created it. Collection is
//! synchronous and stop-the-world in the single-threaded sense: nothing
//! else may mutate scanned roots while a cycle runs, and the register
//! snapshot buffer is process-global, so concurrent collection from two
//! threads is not supported.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod log;
pub mod platform;
pub mod policy;
pub mod stats;

mod collector;
mod mark;
mod record;

pub use collector::Collector;
pub use config::{ConfigError, GcConfig, GcConfigBuilder};
pub use log::LogLevel;
pub use policy::ScanPolicy;
pub use stats::CollectorStats;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capture the caller's registers into the process-global snapshot
/// buffer, then run a collection cycle.
///
/// The capture must expand at the call site: entering an ordinary
/// function first would spill and repurpose argument registers, hiding
/// exactly the values the register root needs. This macro is the complete
/// form of collection; [`Collector::run_collection`] alone reuses
/// whatever the snapshot buffer already holds.
///
/// # Example
///
/// ```rust,ignore
/// use marksweep::{collect, Collector, ScanPolicy};
///
/// let mut gc = Collector::new(ScanPolicy::EVERYTHING).unwrap();
/// collect!(gc);
/// ```
#[macro_export]
macro_rules! collect {
    ($collector:expr) => {{
        $crate::snapshot_registers!();
        ($collector).run_collection();
    }};
}

/// Create a collector scanning the regions selected by `policy`.
///
/// Convenience wrapper over [`Collector::new`].
pub fn init(policy: ScanPolicy) -> Option<Collector> {
    Collector::new(policy)
}

/// Create a collector from a full configuration.
///
/// Convenience wrapper over [`Collector::with_config`].
pub fn init_with_config(config: GcConfig) -> Option<Collector> {
    Collector::with_config(config)
}
