//! Heap-region enumeration: the writable, private memory mappings of the
//! current process that may hold client data.

use super::MemoryRegion;

/// Enumerate the heap-like regions of the current process.
///
/// The returned vector is freshly built on every call; platforms without
/// an enumeration facility report no regions, and the heap root scan is
/// skipped.
pub(crate) fn heap_regions() -> Vec<MemoryRegion> {
    imp::heap_regions()
}

#[cfg(target_os = "linux")]
mod imp {
    use super::{parse_maps, MemoryRegion};

    const PROC_MAPS: &str = "/proc/self/maps";

    pub(crate) fn heap_regions() -> Vec<MemoryRegion> {
        match std::fs::read_to_string(PROC_MAPS) {
            Ok(text) => parse_maps(&text),
            Err(err) => {
                crate::log::warn_log!("cannot read {}: {}", PROC_MAPS, err);
                Vec::new()
            }
        }
    }
}

/// Parse `/proc/self/maps`-style text into heap-like regions.
///
/// A line qualifies iff the mapping is readable, writable and private
/// (`rw?p`) and its pathname is `[heap]`, empty, or a bracketed anonymous
/// entry. Named files, shared mappings and special regions such as
/// `[stack]` and `[vvar]` are excluded.
#[cfg(any(target_os = "linux", test))]
fn parse_maps(text: &str) -> Vec<MemoryRegion> {
    text.lines().filter_map(parse_maps_line).collect()
}

#[cfg(any(target_os = "linux", test))]
fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?.as_bytes();
    let _offset = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    let path = fields.next().unwrap_or("");

    if perms.len() < 4 || perms[0] != b'r' || perms[1] != b'w' || perms[3] != b'p' {
        return None;
    }

    let heap_like =
        path == "[heap]" || path.is_empty() || (path.starts_with('[') && path.contains("anon"));
    if !heap_like {
        return None;
    }

    let (lo, hi) = range.split_once('-')?;
    let start = usize::from_str_radix(lo, 16).ok()?;
    let end = usize::from_str_radix(hi, 16).ok()?;
    (start < end).then_some(MemoryRegion { start, end })
}

#[cfg(target_os = "macos")]
mod imp {
    use super::MemoryRegion;

    type KernReturn = i32;
    type MachPort = u32;
    type NaturalT = u32;

    const KERN_SUCCESS: KernReturn = 0;
    const VM_PROT_WRITE: i32 = 0x02;
    const SM_PRIVATE: u8 = 2;

    /// Layout of `vm_region_submap_info_data_64_t`.
    #[repr(C)]
    struct VmRegionSubmapInfo64 {
        protection: i32,
        max_protection: i32,
        inheritance: u32,
        offset: u64,
        user_tag: u32,
        pages_resident: u32,
        pages_shared_now_private: u32,
        pages_swapped_out: u32,
        pages_dirtied: u32,
        ref_count: u32,
        shadow_depth: u16,
        external_pager: u8,
        share_mode: u8,
        is_submap: i32,
        behavior: i32,
        object_id: u32,
        user_wired_count: u16,
        pages_reusable: u32,
        object_id_full: u64,
    }

    const SUBMAP_INFO_COUNT_64: u32 =
        (std::mem::size_of::<VmRegionSubmapInfo64>() / std::mem::size_of::<NaturalT>()) as u32;

    extern "C" {
        static mach_task_self_: MachPort;
        fn mach_vm_region_recurse(
            target_task: MachPort,
            address: *mut u64,
            size: *mut u64,
            nesting_depth: *mut NaturalT,
            info: *mut i32,
            info_count: *mut u32,
        ) -> KernReturn;
    }

    pub(crate) fn heap_regions() -> Vec<MemoryRegion> {
        let mut regions = Vec::new();
        let task = unsafe { mach_task_self_ };
        let mut address: u64 = 0;
        let mut size: u64 = 0;
        let mut depth: NaturalT = 0;

        loop {
            let mut info: VmRegionSubmapInfo64 = unsafe { std::mem::zeroed() };
            let mut count = SUBMAP_INFO_COUNT_64;
            let kr = unsafe {
                mach_vm_region_recurse(
                    task,
                    &mut address,
                    &mut size,
                    &mut depth,
                    &mut info as *mut VmRegionSubmapInfo64 as *mut i32,
                    &mut count,
                )
            };
            if kr != KERN_SUCCESS {
                break;
            }

            // Writable, private, and not a submap.
            if info.protection & VM_PROT_WRITE != 0
                && info.share_mode == SM_PRIVATE
                && info.is_submap == 0
            {
                regions.push(MemoryRegion {
                    start: address as usize,
                    end: (address + size) as usize,
                });
            }

            address += size;
        }

        regions
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod imp {
    use super::MemoryRegion;

    pub(crate) fn heap_regions() -> Vec<MemoryRegion> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
55f0a1c00000-55f0a1c21000 rw-p 00000000 00:00 0 [heap]
55f0a1c21000-55f0a1c42000 r--p 00000000 08:01 131  /usr/lib/libc.so.6
7f2b40000000-7f2b40200000 rw-p 00000000 00:00 0
7f2b40200000-7f2b40201000 rw-s 00000000 00:05 42  /dev/shm/x
7f2b40300000-7f2b40400000 rw-p 00000000 00:00 0  [anon:scudo]
7f2b40400000-7f2b40500000 r-xp 00000000 00:00 0
7ffc6e000000-7ffc6e021000 rw-p 00000000 00:00 0  [stack]
7ffc6e021000-7ffc6e023000 r--p 00000000 00:00 0  [vvar]";

    #[test]
    fn parses_heap_like_lines_only() {
        let regions = parse_maps(SAMPLE);
        assert_eq!(
            regions,
            vec![
                MemoryRegion {
                    start: 0x55f0a1c00000,
                    end: 0x55f0a1c21000
                },
                MemoryRegion {
                    start: 0x7f2b40000000,
                    end: 0x7f2b40200000
                },
                MemoryRegion {
                    start: 0x7f2b40300000,
                    end: 0x7f2b40400000
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_maps_line(""), None);
        assert_eq!(parse_maps_line("not a maps line"), None);
        assert_eq!(parse_maps_line("zzzz-yyyy rw-p 0 00:00 0"), None);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn live_enumeration_contains_known_allocation() {
        // A fresh Vec's buffer must land inside some enumerated region.
        let buf = vec![0u8; 4096];
        let addr = buf.as_ptr() as usize;
        let regions = heap_regions();
        assert!(regions.iter().any(|r| addr >= r.start && addr < r.end));
    }
}
