//! # Linux Port Layer
//!
//! Host-specific code for Linux with glibc. Implements context switching
//! via the `ucontext` family, the quantum timer via `ITIMER_VIRTUAL`, and
//! preemption masking via `SIGVTALRM`.
//!
//! ## Context Switch Mechanism
//!
//! Each spawned thread gets a `ucontext_t` prepared by `makecontext` on its
//! own stack, entering an `extern "C"` trampoline with `SIGVTALRM`
//! masked. Switches go through `swapcontext`, which also saves and restores
//! the signal mask: a thread suspended inside a critical section (preemption
//! masked) comes back with preemption still masked and unmasks it itself
//! when it leaves the section.
//!
//! ## Quantum Timer
//!
//! `ITIMER_VIRTUAL` counts user CPU time consumed by the process, so time
//! the process spends descheduled by the OS does not eat into a quantum.
//! Every expiry raises `SIGVTALRM`, whose handler only forwards to
//! [`kernel::preempt`](crate::kernel::preempt).

use core::ptr;

use nix::errno::Errno;
use nix::sys::signal::{sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};

use crate::error::{Error, Result};

/// The signal delivered on quantum expiry.
const PREEMPTION_SIGNAL: Signal = Signal::SIGVTALRM;

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

/// Saved execution state of one thread.
///
/// The `ucontext_t` is boxed because glibc stores pointers into the
/// structure itself (the floating-point save area); it must never move
/// once captured.
pub struct Context {
    uc: Box<libc::ucontext_t>,
}

impl Context {
    /// A blank context, filled in by the first [`switch`] away from it.
    /// Used for the main thread, which runs on the process stack.
    pub fn blank() -> Self {
        // SAFETY: ucontext_t is plain old data; all-zero is a valid value.
        Self {
            uc: Box::new(unsafe { core::mem::zeroed() }),
        }
    }

    /// Prepare a context that starts executing `entry` on `stack` the first
    /// time it is switched to. The stack must outlive the context.
    ///
    /// The context starts with preemption masked. `entry` must unmask it
    /// once the switch into it is complete.
    pub fn new(stack: &mut [u8], entry: extern "C" fn()) -> Result<Self> {
        let mut ctx = Self::blank();
        let uc = ctx.as_mut_ptr();

        // SAFETY: `uc` points to a live, pinned ucontext_t. The stack region
        // is owned by the caller's TCB and is only released after this
        // context can no longer be resumed.
        unsafe {
            Errno::result(libc::getcontext(uc)).map_err(|e| Error::system("getcontext", e))?;

            (*uc).uc_stack.ss_sp = stack.as_mut_ptr().cast();
            (*uc).uc_stack.ss_size = stack.len();
            (*uc).uc_stack.ss_flags = 0;
            (*uc).uc_link = ptr::null_mut();
            let mask = ptr::addr_of_mut!((*uc).uc_sigmask);
            libc::sigemptyset(mask);
            libc::sigaddset(mask, PREEMPTION_SIGNAL as libc::c_int);
            libc::makecontext(uc, entry, 0);
        }
        Ok(ctx)
    }

    fn as_mut_ptr(&mut self) -> *mut libc::ucontext_t {
        &mut *self.uc
    }

    fn as_ptr(&self) -> *const libc::ucontext_t {
        &*self.uc
    }
}

/// Save the running context into `save` and resume `resume`.
///
/// Returns once some later switch resumes `save`.
///
/// # Safety
/// Both pointers must reference live contexts that stay alive (and at the
/// same address) until they are resumed. Preemption must be masked.
pub unsafe fn switch(save: *mut Context, resume: *const Context) -> Result<()> {
    let save = (*save).as_mut_ptr();
    let resume = (*resume).as_ptr();
    Errno::result(libc::swapcontext(save, resume))
        .map(drop)
        .map_err(|e| Error::system("swapcontext", e))
}

/// Resume `resume` without saving the running context.
///
/// Only returns if the primitive fails.
///
/// # Safety
/// Same requirements as [`switch`]. The running context is abandoned.
pub unsafe fn jump(resume: *const Context) -> Error {
    let resume = (*resume).as_ptr();
    match Errno::result(libc::setcontext(resume)) {
        Err(e) => Error::system("setcontext", e),
        Ok(_) => Error::ImpossibleState("setcontext returned"),
    }
}

// ---------------------------------------------------------------------------
// Quantum timer
// ---------------------------------------------------------------------------

fn quantum_interval(quantum_usecs: u32) -> libc::timeval {
    libc::timeval {
        tv_sec: (quantum_usecs / 1_000_000) as libc::time_t,
        tv_usec: (quantum_usecs % 1_000_000) as libc::suseconds_t,
    }
}

fn set_virtual_timer(interval: libc::timeval) -> Result<()> {
    let timer = libc::itimerval {
        it_interval: interval,
        it_value: interval,
    };
    // SAFETY: `timer` is a valid itimerval; the old value is not requested.
    Errno::result(unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) })
        .map(drop)
        .map_err(|e| Error::system("setitimer", e))
}

/// Start (or restart) the recurring quantum timer. The first expiry is a
/// full quantum from now.
pub fn arm_quantum_timer(quantum_usecs: u32) -> Result<()> {
    set_virtual_timer(quantum_interval(quantum_usecs))
}

/// Stop the quantum timer.
pub fn disarm_quantum_timer() -> Result<()> {
    set_virtual_timer(quantum_interval(0))
}

// ---------------------------------------------------------------------------
// Preemption interrupt
// ---------------------------------------------------------------------------

/// `SIGVTALRM` handler: the quantum of the running thread is over.
///
/// Runs with `SIGVTALRM` masked by the kernel. It does nothing but hand
/// over to the same dispatch path a voluntary yield takes; `errno` is
/// preserved for the interrupted code.
extern "C" fn on_quantum_expired(_signo: libc::c_int) {
    // SAFETY: __errno_location always returns the calling thread's errno.
    let saved_errno = unsafe { *libc::__errno_location() };
    crate::kernel::preempt();
    // SAFETY: as above; by now this thread has been switched back in.
    unsafe { *libc::__errno_location() = saved_errno };
}

/// Install the quantum expiry handler.
pub fn install_preemption_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_quantum_expired),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only calls into the scheduler's dispatch path,
    // which never allocates and never logs.
    unsafe { sigaction(PREEMPTION_SIGNAL, &action) }
        .map(drop)
        .map_err(|e| Error::system("sigaction", e))
}

fn preemption_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(PREEMPTION_SIGNAL);
    set
}

/// Mask the preemption interrupt. Returns whether it was already masked.
pub fn mask_preemption() -> Result<bool> {
    let mut previous = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&preemption_set()), Some(&mut previous))
        .map_err(|e| Error::system("sigprocmask", e))?;
    Ok(previous.contains(PREEMPTION_SIGNAL))
}

/// Unmask the preemption interrupt. A pending expiry is delivered at once.
pub fn unmask_preemption() -> Result<()> {
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&preemption_set()), None)
        .map_err(|e| Error::system("sigprocmask", e))
}
