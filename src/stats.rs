//! Collector statistics.

/// Counters describing the work a collector has performed.
///
/// A copy is returned by [`Collector::stats`](crate::Collector::stats).
/// All counters are cumulative except `live_records` and `live_bytes`,
/// which track the current registry contents. The collector is owned by a
/// single thread, so the counters are plain integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Allocations ever made through the facade.
    pub allocations: u64,
    /// Records currently tracked in the registry.
    pub live_records: u64,
    /// Requested bytes currently tracked in the registry.
    pub live_bytes: u64,
    /// Collection cycles run, whether triggered or explicit.
    pub collections: u64,
    /// Records reclaimed by sweeps over the collector's lifetime.
    pub records_swept: u64,
    /// Requested bytes reclaimed by sweeps over the collector's lifetime.
    pub bytes_swept: u64,
}
