//! # Synchronization Primitives
//!
//! Preemption-safe critical section for the thread library. All scheduler
//! state must be accessed within a critical section so that the quantum
//! timer's handler never observes it half-updated.
//!
//! The section is provided through the `critical-section` crate. This crate
//! supplies its implementation: entering masks `SIGVTALRM` for the native
//! thread, leaving restores the mask recorded on entry. Sections therefore
//! nest, and a section entered from inside the preemption handler (where
//! the signal is already masked) never unmasks it early.
//!
//! A section may span a context switch. The outgoing thread is suspended
//! with preemption masked; whichever thread runs next leaves its own
//! section and unmasks. Freshly spawned threads start masked and unmask
//! once their first section is over.

use critical_section::{CriticalSection, RawRestoreState};

use crate::arch;
use crate::error::fatal;

/// Execute a closure within a critical section (preemption masked).
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access scheduler state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

struct SignalMaskSection;
critical_section::set_impl!(SignalMaskSection);

unsafe impl critical_section::Impl for SignalMaskSection {
    unsafe fn acquire() -> RawRestoreState {
        match arch::mask_preemption() {
            Ok(was_masked) => was_masked,
            Err(err) => fatal(err),
        }
    }

    unsafe fn release(was_masked: RawRestoreState) {
        if !was_masked {
            if let Err(err) = arch::unmask_preemption() {
                fatal(err);
            }
        }
    }
}
