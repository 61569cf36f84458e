//! # uthreads — User-Level Threads
//!
//! A green-thread library that multiplexes many logical threads onto a
//! single native thread, with cooperative operations and CPU-time driven
//! preemption.
//!
//! ## Overview
//!
//! The calling context becomes thread 0 at [`init`]. Threads created by
//! [`spawn`] each own a fixed-size stack and take turns on the CPU in
//! strict FIFO round robin. A thread gives up the CPU when it:
//!
//! - **Yields** ([`yield_now`]) or is **preempted** after one quantum of
//!   consumed CPU time
//! - **Blocks** itself ([`block`]) until another thread resumes it
//! - **Sleeps** ([`sleep`]) for a number of scheduling points
//! - **Terminates** itself ([`terminate`])
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Threads                  │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init · spawn · terminate · block · resume · sleep    │
//! ├──────────────────────────────┬─────────────────────────┤
//! │  Scheduler (scheduler.rs)    │  Sync (sync.rs)         │
//! │  ─ dispatch()                │  ─ critical_section     │
//! │  ─ ready queue · sleep set   │                         │
//! ├──────────────────────────────┴─────────────────────────┤
//! │              Thread Model (thread.rs)                   │
//! │        TCB · ThreadState · Stack · quantum counters    │
//! ├────────────────────────────────────────────────────────┤
//! │             Arch Port (arch/linux.rs)                   │
//! │   ucontext switch · ITIMER_VIRTUAL · SIGVTALRM mask    │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quantums
//!
//! A *scheduling point* is any moment the scheduler picks the thread to
//! run next: a yield, block, sleep, self-termination or preemption. Each
//! one starts a new quantum. [`get_total_quantums`] counts them (1 right
//! after `init`), and [`get_quantums`] counts those at which a given thread
//! was dispatched.
//!
//! ## Caveats
//!
//! - All threads share one native thread. Calling into the library from
//!   another native thread is not supported.
//! - Preemption can interrupt a thread anywhere, including inside the
//!   allocator or while holding a lock. Code shared between threads must
//!   tolerate that.
//! - A panic in a spawned thread aborts the process.
//!
//! ## Example
//!
//! ```no_run
//! use uthreads::{init, spawn, terminate, yield_now};
//!
//! init(100_000).unwrap();
//! spawn(|| loop {
//!     yield_now().unwrap();
//! })
//! .unwrap();
//! yield_now().unwrap();
//! terminate(0).unwrap();
//! ```

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod scheduler;
pub mod sync;
pub mod thread;

pub use config::{MAX_THREAD_NUM, STACK_SIZE};
pub use error::{Error, Result};
pub use kernel::{
    block, get_quantums, get_tid, get_total_quantums, init, resume, sleep, spawn, terminate,
    yield_now,
};
pub use thread::{ThreadState, Tid};
