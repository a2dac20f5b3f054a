//! Stack probes: where the calling thread's stack begins and where it
//! currently ends.

/// High address of the calling thread's stack, one past the oldest frame.
///
/// Returns `None` where no per-thread stack metadata is available; the
/// scan engine then skips the stack root entirely.
#[cfg(target_os = "linux")]
pub(crate) fn stack_base() -> Option<usize> {
    use nix::libc;

    unsafe {
        let mut attr: libc::pthread_attr_t = std::mem::zeroed();
        if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
            return None;
        }
        let mut addr: *mut libc::c_void = std::ptr::null_mut();
        let mut size: libc::size_t = 0;
        let rc = libc::pthread_attr_getstack(&attr, &mut addr, &mut size);
        libc::pthread_attr_destroy(&mut attr);
        if rc != 0 || addr.is_null() {
            return None;
        }
        Some(addr as usize + size)
    }
}

/// High address of the calling thread's stack, one past the oldest frame.
#[cfg(target_os = "macos")]
pub(crate) fn stack_base() -> Option<usize> {
    use nix::libc;

    // Darwin reports the high end of the stack directly.
    let addr = unsafe { libc::pthread_get_stackaddr_np(libc::pthread_self()) };
    if addr.is_null() {
        None
    } else {
        Some(addr as usize)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub(crate) fn stack_base() -> Option<usize> {
    None
}

/// Current value of the stack pointer, used as the low bound of the stack
/// scan.
///
/// Must observe the frame of the collection it feeds: the function is
/// forced inline so no extra prologue sits between the caller and the
/// read. On 64-bit ARM the stack pointer is not a general-purpose register
/// and is read with a dedicated instruction; everywhere else the value
/// comes from the register snapshot taken at the collection call site.
/// Returns 0 when no snapshot has been captured.
#[inline(always)]
pub(crate) fn current_stack_top() -> usize {
    #[cfg(target_arch = "aarch64")]
    {
        let sp: usize;
        unsafe {
            core::arch::asm!("mov {sp}, sp", sp = out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        crate::platform::regs::saved_stack_pointer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    fn stack_base_is_above_locals() {
        let base = stack_base().expect("stack metadata available");
        let local = 0usize;
        assert!((&local as *const usize as usize) < base);
    }
}
