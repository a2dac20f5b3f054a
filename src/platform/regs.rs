//! Register snapshot.
//!
//! [`snapshot_registers!`](crate::snapshot_registers) writes the calling
//! thread's general-purpose registers into a process-global buffer. The
//! expansion happens at the call site: wrapping the capture in an ordinary
//! function call would spill and repurpose argument registers before the
//! snapshot runs, losing exactly the values the scan needs to see.
//!
//! Addressing the buffer must not itself consume one of the captured
//! registers. On x86-64 the buffer is addressed RIP-relative, so no
//! register is touched at all. On the other architectures the buffer
//! address is staged into a single compiler-chosen register; that
//! register's captured slot holds the buffer address instead of its
//! previous value, a harmless extra root.
//!
//! The buffer is static storage shared by every collector in the process;
//! two threads must not capture concurrently.

use std::cell::UnsafeCell;

/// General-purpose register snapshot, 64-bit x86.
#[cfg(target_arch = "x86_64")]
#[repr(C)]
pub struct RegisterFile {
    pub(crate) rax: u64,
    pub(crate) rbx: u64,
    pub(crate) rcx: u64,
    pub(crate) rdx: u64,
    pub(crate) rsi: u64,
    pub(crate) rdi: u64,
    pub(crate) rbp: u64,
    pub(crate) rsp: u64,
    pub(crate) r8: u64,
    pub(crate) r9: u64,
    pub(crate) r10: u64,
    pub(crate) r11: u64,
    pub(crate) r12: u64,
    pub(crate) r13: u64,
    pub(crate) r14: u64,
    pub(crate) r15: u64,
}

#[cfg(target_arch = "x86_64")]
impl RegisterFile {
    const ZEROED: Self = Self {
        rax: 0,
        rbx: 0,
        rcx: 0,
        rdx: 0,
        rsi: 0,
        rdi: 0,
        rbp: 0,
        rsp: 0,
        r8: 0,
        r9: 0,
        r10: 0,
        r11: 0,
        r12: 0,
        r13: 0,
        r14: 0,
        r15: 0,
    };
}

/// General-purpose register snapshot, 32-bit x86.
#[cfg(target_arch = "x86")]
#[repr(C)]
pub struct RegisterFile {
    pub(crate) eax: u32,
    pub(crate) ebx: u32,
    pub(crate) ecx: u32,
    pub(crate) edx: u32,
    pub(crate) esi: u32,
    pub(crate) edi: u32,
    pub(crate) ebp: u32,
    pub(crate) esp: u32,
}

#[cfg(target_arch = "x86")]
impl RegisterFile {
    const ZEROED: Self = Self {
        eax: 0,
        ebx: 0,
        ecx: 0,
        edx: 0,
        esi: 0,
        edi: 0,
        ebp: 0,
        esp: 0,
    };
}

/// General-purpose register snapshot, 64-bit ARM.
#[cfg(target_arch = "aarch64")]
#[repr(C)]
pub struct RegisterFile {
    pub(crate) x: [u64; 29],
    /// Frame pointer (x29).
    pub(crate) fp: u64,
    /// Link register (x30).
    pub(crate) lr: u64,
    pub(crate) sp: u64,
}

#[cfg(target_arch = "aarch64")]
impl RegisterFile {
    const ZEROED: Self = Self {
        x: [0; 29],
        fp: 0,
        lr: 0,
        sp: 0,
    };
}

/// General-purpose register snapshot, 32-bit ARM.
#[cfg(target_arch = "arm")]
#[repr(C)]
pub struct RegisterFile {
    pub(crate) r: [u32; 13],
    pub(crate) sp: u32,
    /// Link register (r14).
    pub(crate) lr: u32,
}

#[cfg(target_arch = "arm")]
impl RegisterFile {
    const ZEROED: Self = Self {
        r: [0; 13],
        sp: 0,
        lr: 0,
    };
}

/// Empty snapshot on architectures without a capture sequence; the
/// register scan degrades to a no-op.
#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
#[repr(C)]
pub struct RegisterFile {}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
impl RegisterFile {
    const ZEROED: Self = Self {};
}

/// Interior-mutable wrapper so the snapshot buffer can live in immutable
/// static storage while inline assembly writes through it.
#[repr(transparent)]
pub struct RegisterBuffer(UnsafeCell<RegisterFile>);

// The buffer itself is plain memory; exclusive use during capture and scan
// is the caller's single-threaded obligation.
unsafe impl Sync for RegisterBuffer {}

impl RegisterBuffer {
    /// Raw pointer to the snapshot storage.
    pub const fn as_ptr(&self) -> *mut RegisterFile {
        self.0.get()
    }
}

/// Process-global snapshot buffer written by [`snapshot_registers!`](crate::snapshot_registers).
#[doc(hidden)]
pub static REGISTER_FILE: RegisterBuffer = RegisterBuffer(UnsafeCell::new(RegisterFile::ZEROED));

/// Capture the calling thread's general-purpose registers into the
/// process-global snapshot buffer.
///
/// Expands inline at the call site. Prefer [`collect!`](crate::collect),
/// which pairs the capture with the collection it feeds.
#[macro_export]
macro_rules! snapshot_registers {
    () => {{
        #[cfg(target_arch = "x86_64")]
        unsafe {
            ::core::arch::asm!(
                "mov qword ptr [rip + {regs}], rax",
                "mov qword ptr [rip + {regs} + 8], rbx",
                "mov qword ptr [rip + {regs} + 16], rcx",
                "mov qword ptr [rip + {regs} + 24], rdx",
                "mov qword ptr [rip + {regs} + 32], rsi",
                "mov qword ptr [rip + {regs} + 40], rdi",
                "mov qword ptr [rip + {regs} + 48], rbp",
                "mov qword ptr [rip + {regs} + 56], rsp",
                "mov qword ptr [rip + {regs} + 64], r8",
                "mov qword ptr [rip + {regs} + 72], r9",
                "mov qword ptr [rip + {regs} + 80], r10",
                "mov qword ptr [rip + {regs} + 88], r11",
                "mov qword ptr [rip + {regs} + 96], r12",
                "mov qword ptr [rip + {regs} + 104], r13",
                "mov qword ptr [rip + {regs} + 112], r14",
                "mov qword ptr [rip + {regs} + 120], r15",
                regs = sym $crate::platform::regs::REGISTER_FILE,
                options(nostack, preserves_flags),
            );
        }
        #[cfg(target_arch = "x86")]
        unsafe {
            ::core::arch::asm!(
                "mov [{base}], eax",
                "mov [{base} + 4], ebx",
                "mov [{base} + 8], ecx",
                "mov [{base} + 12], edx",
                "mov [{base} + 16], esi",
                "mov [{base} + 20], edi",
                "mov [{base} + 24], ebp",
                "mov [{base} + 28], esp",
                base = in(reg) $crate::platform::regs::REGISTER_FILE.as_ptr(),
                options(nostack, preserves_flags),
            );
        }
        #[cfg(target_arch = "aarch64")]
        unsafe {
            ::core::arch::asm!(
                "str x0, [{base}, #0]",
                "str x1, [{base}, #8]",
                "str x2, [{base}, #16]",
                "str x3, [{base}, #24]",
                "str x4, [{base}, #32]",
                "str x5, [{base}, #40]",
                "str x6, [{base}, #48]",
                "str x7, [{base}, #56]",
                "str x8, [{base}, #64]",
                "str x9, [{base}, #72]",
                "str x10, [{base}, #80]",
                "str x11, [{base}, #88]",
                "str x12, [{base}, #96]",
                "str x13, [{base}, #104]",
                "str x14, [{base}, #112]",
                "str x15, [{base}, #120]",
                "str x16, [{base}, #128]",
                "str x17, [{base}, #136]",
                "str x18, [{base}, #144]",
                "str x19, [{base}, #152]",
                "str x20, [{base}, #160]",
                "str x21, [{base}, #168]",
                "str x22, [{base}, #176]",
                "str x23, [{base}, #184]",
                "str x24, [{base}, #192]",
                "str x25, [{base}, #200]",
                "str x26, [{base}, #208]",
                "str x27, [{base}, #216]",
                "str x28, [{base}, #224]",
                "str x29, [{base}, #232]",
                "str x30, [{base}, #240]",
                "mov {scratch}, sp",
                "str {scratch}, [{base}, #248]",
                base = in(reg) $crate::platform::regs::REGISTER_FILE.as_ptr(),
                scratch = out(reg) _,
                options(nostack, preserves_flags),
            );
        }
        #[cfg(target_arch = "arm")]
        unsafe {
            ::core::arch::asm!(
                "str r0, [{base}, #0]",
                "str r1, [{base}, #4]",
                "str r2, [{base}, #8]",
                "str r3, [{base}, #12]",
                "str r4, [{base}, #16]",
                "str r5, [{base}, #20]",
                "str r6, [{base}, #24]",
                "str r7, [{base}, #28]",
                "str r8, [{base}, #32]",
                "str r9, [{base}, #36]",
                "str r10, [{base}, #40]",
                "str r11, [{base}, #44]",
                "str r12, [{base}, #48]",
                "str sp, [{base}, #52]",
                "str lr, [{base}, #56]",
                base = in(reg) $crate::platform::regs::REGISTER_FILE.as_ptr(),
                options(nostack, preserves_flags),
            );
        }
    }};
}

/// Number of pointer-sized words in the snapshot buffer.
pub(crate) const fn word_count() -> usize {
    std::mem::size_of::<RegisterFile>() / std::mem::size_of::<usize>()
}

/// Read one pointer-sized word from the snapshot buffer.
///
/// # Safety
///
/// `index` must be below [`word_count`], and no capture may be running
/// concurrently.
pub(crate) unsafe fn word(index: usize) -> usize {
    (REGISTER_FILE.as_ptr() as *const usize).add(index).read()
}

/// The stack pointer recorded by the most recent capture, or 0 if no
/// capture has run.
#[cfg(target_arch = "x86_64")]
pub(crate) fn saved_stack_pointer() -> usize {
    unsafe { (*REGISTER_FILE.as_ptr()).rsp as usize }
}

#[cfg(target_arch = "x86")]
pub(crate) fn saved_stack_pointer() -> usize {
    unsafe { (*REGISTER_FILE.as_ptr()).esp as usize }
}

#[cfg(any(target_arch = "aarch64", target_arch = "arm"))]
pub(crate) fn saved_stack_pointer() -> usize {
    unsafe { (*REGISTER_FILE.as_ptr()).sp as usize }
}

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
pub(crate) fn saved_stack_pointer() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_word_shaped() {
        assert_eq!(
            std::mem::size_of::<RegisterFile>() % std::mem::size_of::<usize>(),
            0
        );
        assert_eq!(
            word_count() * std::mem::size_of::<usize>(),
            std::mem::size_of::<RegisterFile>()
        );
    }

    #[test]
    fn capture_records_stack_pointer() {
        crate::snapshot_registers!();
        let sp = saved_stack_pointer();
        if word_count() > 0 {
            let here = &sp as *const usize as usize;
            // The captured stack pointer is below (or at) any local of this
            // frame and within a few pages of it.
            assert!(sp <= here);
            assert!(here - sp < 64 * 1024);
        }
    }
}
