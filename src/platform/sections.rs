//! Static-section probes: address ranges of the initialised (`data`) and
//! zero-initialised (`bss`) sections of the executable.

use super::MemoryRegion;

#[cfg(target_os = "linux")]
mod imp {
    use super::MemoryRegion;

    // Boundary symbols placed by the linker around the static sections.
    extern "C" {
        static __data_start: u8;
        static _edata: u8;
        static __bss_start: u8;
        static _end: u8;
    }

    pub(crate) fn data_section() -> MemoryRegion {
        unsafe {
            MemoryRegion {
                start: std::ptr::addr_of!(__data_start) as usize,
                end: std::ptr::addr_of!(_edata) as usize,
            }
        }
    }

    pub(crate) fn bss_section() -> MemoryRegion {
        unsafe {
            MemoryRegion {
                start: std::ptr::addr_of!(__bss_start) as usize,
                end: std::ptr::addr_of!(_end) as usize,
            }
        }
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use std::ffi::{c_char, c_ulong, CStr};

    use super::MemoryRegion;

    #[repr(C)]
    struct MachHeader64 {
        _opaque: [u8; 0],
    }

    extern "C" {
        fn _dyld_get_image_header(image_index: u32) -> *const MachHeader64;
        fn getsectiondata(
            mhp: *const MachHeader64,
            segname: *const c_char,
            sectname: *const c_char,
            size: *mut c_ulong,
        ) -> *mut u8;
    }

    fn data_segment_section(name: &CStr) -> MemoryRegion {
        unsafe {
            // Image 0 is the main executable.
            let header = _dyld_get_image_header(0);
            if header.is_null() {
                return MemoryRegion::NULL;
            }
            let mut size: c_ulong = 0;
            let start = getsectiondata(header, c"__DATA".as_ptr(), name.as_ptr(), &mut size);
            if start.is_null() {
                MemoryRegion::NULL
            } else {
                MemoryRegion {
                    start: start as usize,
                    end: start as usize + size as usize,
                }
            }
        }
    }

    pub(crate) fn data_section() -> MemoryRegion {
        data_segment_section(c"__data")
    }

    pub(crate) fn bss_section() -> MemoryRegion {
        data_segment_section(c"__bss")
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod imp {
    use super::MemoryRegion;

    pub(crate) fn data_section() -> MemoryRegion {
        MemoryRegion::NULL
    }

    pub(crate) fn bss_section() -> MemoryRegion {
        MemoryRegion::NULL
    }
}

/// `[start, end)` of the initialised static-data section, or the null
/// range where the layout cannot be inspected.
pub(crate) fn data_section() -> MemoryRegion {
    imp::data_section()
}

/// `[start, end)` of the zero-initialised static-data section, or the
/// null range where the layout cannot be inspected.
pub(crate) fn bss_section() -> MemoryRegion {
    imp::bss_section()
}
