//! Capture of the callee-saved register file.
//!
//! A value can be reachable only through a pointer that an ancestor frame
//! keeps in a callee-saved register for the whole duration of a collection.
//! Such a pointer is invisible to the stack scan until it is materialized
//! into stack memory. [`capture`] copies the callee-saved registers into an
//! ordinary local array; the caller keeps that array alive on its own stack
//! frame across the scan, which places every register-resident candidate
//! inside the scanned address range.
//!
//! Platform notes: the capture is implemented with inline assembly on
//! x86-64 (rbx, rbp, r12-r15) and aarch64 (x19-x29, plus x30). On other
//! architectures the register file is empty and only values the compiler has
//! already spilled across the opaque call boundary in
//! [`mark`](crate::Collector::mark) are visible to the scan; conservative
//! register discovery is a documented platform precondition there.

/// A stack-resident copy of the callee-saved registers. The collector never
/// reads the fields directly; the array only has to occupy scanned stack
/// memory while [`mark_stack`](crate::Collector::mark_stack) runs.
#[repr(C)]
pub(crate) struct RegisterFile(pub [usize; CALLEE_SAVED_REGISTERS]);

#[cfg(target_arch = "x86_64")]
pub(crate) const CALLEE_SAVED_REGISTERS: usize = 6;
#[cfg(target_arch = "aarch64")]
pub(crate) const CALLEE_SAVED_REGISTERS: usize = 12;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) const CALLEE_SAVED_REGISTERS: usize = 0;

/// Copy the callee-saved register file into a fresh [`RegisterFile`].
///
/// `#[inline(never)]` matters: the call boundary itself forces the compiler
/// to treat every caller-saved register as clobbered, so caller-saved
/// candidates are spilled to (scanned) stack memory at the call site.
#[cfg(target_arch = "x86_64")]
#[inline(never)]
pub(crate) fn capture() -> RegisterFile {
    let mut file = RegisterFile([0; CALLEE_SAVED_REGISTERS]);
    unsafe {
        core::arch::asm!(
            // The base pointer is pinned to a caller-saved register so it
            // cannot alias one of the registers being captured.
            "mov [rax + 0x00], rbx",
            "mov [rax + 0x08], rbp",
            "mov [rax + 0x10], r12",
            "mov [rax + 0x18], r13",
            "mov [rax + 0x20], r14",
            "mov [rax + 0x28], r15",
            in("rax") file.0.as_mut_ptr(),
            options(nostack),
        );
    }
    file
}

/// Copy the callee-saved register file into a fresh [`RegisterFile`].
///
/// `#[inline(never)]` matters: the call boundary itself forces the compiler
/// to treat every caller-saved register as clobbered, so caller-saved
/// candidates are spilled to (scanned) stack memory at the call site.
#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub(crate) fn capture() -> RegisterFile {
    let mut file = RegisterFile([0; CALLEE_SAVED_REGISTERS]);
    unsafe {
        core::arch::asm!(
            // The base pointer is pinned to a caller-saved register so it
            // cannot alias one of the registers being captured.
            "stp x19, x20, [x9, #0]",
            "stp x21, x22, [x9, #16]",
            "stp x23, x24, [x9, #32]",
            "stp x25, x26, [x9, #48]",
            "stp x27, x28, [x9, #64]",
            "stp x29, x30, [x9, #80]",
            in("x9") file.0.as_mut_ptr(),
            options(nostack),
        );
    }
    file
}

/// Fallback for architectures without an inline-assembly capture. The file
/// is empty; the `#[inline(never)]` call boundary still spills the
/// caller-saved registers.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline(never)]
pub(crate) fn capture() -> RegisterFile {
    RegisterFile([0; CALLEE_SAVED_REGISTERS])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_returns_a_full_file() {
        // Nothing meaningful can be asserted about the captured values
        // themselves; this exercises the asm path for crashes and checks the
        // file has the advertised shape.
        let file = capture();
        assert_eq!(file.0.len(), CALLEE_SAVED_REGISTERS);
    }
}
