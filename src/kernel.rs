//! # Kernel
//!
//! Public API of the thread library.
//!
//! The kernel owns the installed scheduler, provides the thread lifecycle
//! operations, and carries out the context switches the scheduler plans.
//! Every public function runs inside a critical section, so the quantum
//! timer never preempts a half-finished update.
//!
//! ## Startup Sequence
//!
//! ```text
//! main()
//!   ├─► kernel::init(quantum)  ← Install scheduler, signal handler, timer
//!   ├─► kernel::spawn(f)       ← Register threads (×N)
//!   └─► ...                    ← Main thread keeps running as thread 0
//!         └─► SIGVTALRM every quantum of CPU time
//!               └─► kernel::preempt() → dispatch(Scheduling)
//! ```
//!
//! ## Switching
//!
//! An operation that reaches a scheduling point borrows the scheduler,
//! gets a [`Switch`] plan and the two contexts it names, releases the
//! borrow and only then switches. The call returns in the outgoing thread
//! once that thread is dispatched again.

use core::cell::UnsafeCell;

use critical_section::CriticalSection;

use crate::arch;
use crate::config::MAIN_TID;
use crate::error::{escalate, fatal, Error, Result};
use crate::scheduler::{Action, Scheduler, Switch};
use crate::sync::critical_section;
use crate::thread::Tid;

// ---------------------------------------------------------------------------
// Installed runtime
// ---------------------------------------------------------------------------

/// Everything `init` sets up.
struct Runtime {
    scheduler: Scheduler,
    quantum_usecs: u32,
}

/// The runtime installed by `init`.
///
/// It has to be reachable from the `SIGVTALRM` handler, hence the static.
/// All access goes through [`with_runtime`], which requires a critical
/// section token.
struct RuntimeCell(UnsafeCell<Option<Runtime>>);

// SAFETY: the library runs on a single native thread, and every access is
// made with preemption masked.
unsafe impl Sync for RuntimeCell {}

static RUNTIME: RuntimeCell = RuntimeCell(UnsafeCell::new(None));

/// Borrow the runtime for the duration of `f`.
///
/// The borrow must end before any context switch, so that the next thread
/// to borrow it holds the only reference.
fn with_runtime<R>(_cs: CriticalSection<'_>, f: impl FnOnce(&mut Runtime) -> Result<R>) -> Result<R> {
    // SAFETY: preemption is masked and callers never nest borrows.
    let runtime = unsafe { (*RUNTIME.0.get()).as_mut() }.ok_or(Error::NotInitialized)?;
    f(runtime)
}

fn with_scheduler<R>(cs: CriticalSection<'_>, f: impl FnOnce(&mut Scheduler) -> Result<R>) -> Result<R> {
    with_runtime(cs, |runtime| f(&mut runtime.scheduler))
}

/// Run a public operation: release any parked thread first, then `op`.
fn enter<R>(cs: CriticalSection<'_>, op: impl FnOnce(&mut Scheduler) -> Result<R>) -> Result<R> {
    with_scheduler(cs, |sched| {
        sched.reap();
        op(sched)
    })
}

// ---------------------------------------------------------------------------
// Context switching
// ---------------------------------------------------------------------------

/// Run a scheduler operation that may reach a scheduling point and carry
/// out the resulting switch.
///
/// When `voluntary`, a scheduling point restarts the quantum timer so the
/// incoming thread gets a full quantum. Preemption leaves the periodic
/// timer alone.
fn reschedule(
    cs: CriticalSection<'_>,
    voluntary: bool,
    op: impl FnOnce(&mut Scheduler) -> Result<Option<Switch>>,
) -> Result<()> {
    let planned = with_runtime(cs, |runtime| {
        let sched = &mut runtime.scheduler;
        if voluntary {
            sched.reap();
        }
        let before = sched.total_quantums();
        let switch = op(sched)?;
        if voluntary && sched.total_quantums() != before {
            arch::arm_quantum_timer(runtime.quantum_usecs)?;
        }
        match switch {
            Some(switch) => Ok(Some(runtime.scheduler.contexts(&switch)?)),
            None => Ok(None),
        }
    })?;

    let Some((save, resume)) = planned else {
        return Ok(());
    };

    // SAFETY: both contexts belong to boxed TCBs (or the reaper slot) that
    // outlive the switch, and preemption is masked.
    unsafe {
        match save {
            Some(save) => arch::switch(save, resume),
            None => Err(arch::jump(resume)),
        }
    }
}

/// Quantum expiry. Called by the preemption handler only.
///
/// Forces the running thread through the same dispatch path as a
/// voluntary yield and does nothing else: no logging, no allocation.
pub(crate) fn preempt() {
    critical_section(|cs| {
        if let Err(err) = reschedule(cs, false, |sched| sched.dispatch(Action::Scheduling)) {
            if err.is_fatal() {
                fatal(err);
            }
        }
    })
}

/// Every spawned thread starts here, on its own stack, with preemption
/// still masked from the switch that dispatched it.
extern "C" fn thread_entry() {
    let entry = critical_section(|cs| {
        with_scheduler(cs, |sched| {
            sched
                .take_entry()
                .ok_or(Error::ImpossibleState("dispatched thread has no entry"))
        })
    });
    // The section above found the signal masked and left it so.
    if let Err(err) = arch::unmask_preemption() {
        fatal(err);
    }
    match entry {
        Ok(entry) => entry(),
        Err(err) => fatal(err),
    }

    // The body returned: the thread ends itself.
    if let Err(err) = terminate(get_tid()) {
        fatal(err);
    }
    fatal(Error::ImpossibleState("terminated thread was resumed"))
}

/// Release every thread and end the process successfully.
fn shutdown(_cs: CriticalSection<'_>) -> ! {
    if let Err(err) = arch::disarm_quantum_timer() {
        fatal(err);
    }
    // SAFETY: preemption is masked and no borrow of the runtime is live.
    let runtime = unsafe { (*RUNTIME.0.get()).take() };
    if let Some(runtime) = runtime {
        log::debug!(
            "shutting down after {} quantums",
            runtime.scheduler.total_quantums()
        );
        // The running thread's stack is the one executing this code.
        core::mem::forget(runtime.scheduler.shutdown());
    }
    std::process::exit(0)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Initialize the thread library.
///
/// Must be called exactly once, before any other function. The calling
/// context becomes thread 0 (the main thread), already running its first
/// quantum. `quantum_usecs` is the quantum length in microseconds of
/// consumed CPU time.
///
/// # Errors
/// - [`Error::InvalidArgument`] if `quantum_usecs` is 0.
/// - [`Error::AlreadyInitialized`] on a second call.
pub fn init(quantum_usecs: u32) -> Result<()> {
    critical_section(|_cs| escalate(install(quantum_usecs)))
}

/// Body of [`init`]; runs with preemption masked.
fn install(quantum_usecs: u32) -> Result<()> {
    if quantum_usecs == 0 {
        return Err(Error::InvalidArgument("quantum length must be positive"));
    }
    // SAFETY: preemption is masked and no borrow of the runtime is live.
    let slot = unsafe { &mut *RUNTIME.0.get() };
    if slot.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    *slot = Some(Runtime {
        scheduler: Scheduler::new(),
        quantum_usecs,
    });

    arch::install_preemption_handler()?;
    arch::arm_quantum_timer(quantum_usecs)?;
    log::debug!("initialized with a {quantum_usecs}us quantum");
    Ok(())
}

/// Create a thread running `entry` and queue it at the ready tail.
///
/// Returns the new thread's id, the smallest one not in use. If `entry`
/// returns, the thread terminates itself.
///
/// # Errors
/// - [`Error::CapacityExceeded`] if `MAX_THREAD_NUM` threads are alive.
///
/// # Example
/// ```ignore
/// kernel::init(100_000)?;
/// let tid = kernel::spawn(|| loop { work() })?;
/// ```
pub fn spawn<F>(entry: F) -> Result<Tid>
where
    F: FnOnce() + 'static,
{
    critical_section(|cs| {
        escalate(enter(cs, |sched| {
            let tid = sched.spawn(Box::new(entry), thread_entry)?;
            log::debug!("spawned thread {tid}");
            Ok(tid)
        }))
    })
}

/// Terminate thread `tid` and release its resources.
///
/// Terminating thread 0 releases every thread and exits the process with
/// status 0. Terminating the calling thread switches to the next ready
/// thread. Neither returns.
///
/// # Errors
/// - [`Error::InvalidId`] if no thread `tid` exists.
pub fn terminate(tid: Tid) -> Result<()> {
    critical_section(|cs| escalate({
        if tid == MAIN_TID {
            shutdown(cs);
        }
        reschedule(cs, true, |sched| {
            let switch = sched.terminate(tid)?;
            log::debug!("terminated thread {tid}");
            Ok(switch)
        })
    }))
}

/// Block thread `tid` until it is resumed. Blocking an already blocked
/// thread has no effect; a thread blocking itself gives up the CPU.
///
/// # Errors
/// - [`Error::MainThread`] if `tid` is 0.
/// - [`Error::InvalidId`] if no thread `tid` exists.
pub fn block(tid: Tid) -> Result<()> {
    critical_section(|cs| {
        escalate(reschedule(cs, true, |sched| {
            let switch = sched.block(tid)?;
            log::debug!("blocked thread {tid}");
            Ok(switch)
        }))
    })
}

/// Resume thread `tid`.
///
/// A blocked thread becomes ready; a sleeping thread is woken early; a
/// thread that was blocked while asleep goes back to plain sleeping.
/// Running and ready threads are unaffected.
///
/// # Errors
/// - [`Error::InvalidId`] if no thread `tid` exists.
pub fn resume(tid: Tid) -> Result<()> {
    critical_section(|cs| {
        escalate(enter(cs, |sched| {
            sched.resume(tid)?;
            log::debug!("resumed thread {tid}");
            Ok(())
        }))
    })
}

/// Put the calling thread to sleep for `num_quantums` scheduling points.
/// The current quantum does not count. On expiry the thread rejoins the
/// ready tail.
///
/// # Errors
/// - [`Error::MainThread`] if called by thread 0.
/// - [`Error::InvalidArgument`] if `num_quantums` is 0.
pub fn sleep(num_quantums: u32) -> Result<()> {
    critical_section(|cs| {
        escalate(reschedule(cs, true, |sched| {
            let sleeper = sched.current();
            let switch = sched.sleep(num_quantums)?;
            log::debug!("thread {sleeper} sleeping for {num_quantums} quantums");
            Ok(switch)
        }))
    })
}

/// Give up the rest of the current quantum to the next ready thread.
/// With no other thread ready, the caller continues in a new quantum.
pub fn yield_now() -> Result<()> {
    critical_section(|cs| escalate({
        log::trace!("yield");
        reschedule(cs, true, |sched| sched.dispatch(Action::Scheduling))
    }))
}

/// Id of the calling thread. Before `init` this is the main thread's id.
pub fn get_tid() -> Tid {
    critical_section(|cs| with_scheduler(cs, |sched| Ok(sched.current()))).unwrap_or(MAIN_TID)
}

/// Quantums started since `init`, including the current one. 0 before
/// `init`.
pub fn get_total_quantums() -> u64 {
    critical_section(|cs| with_scheduler(cs, |sched| Ok(sched.total_quantums()))).unwrap_or(0)
}

/// Quantums thread `tid` has started in the running state, including the
/// current one if it is running.
///
/// # Errors
/// - [`Error::InvalidId`] if no thread `tid` exists.
pub fn get_quantums(tid: Tid) -> Result<u64> {
    critical_section(|cs| escalate(with_scheduler(cs, |sched| sched.quantums(tid))))
}
