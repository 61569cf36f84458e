//! # uthreads Configuration
//!
//! Compile-time constants governing the thread library.
//! The only runtime parameter is the quantum length passed to
//! [`kernel::init`](crate::kernel::init).

/// Maximum number of threads that may be alive at the same time,
/// including the main thread. Thread ids are drawn from
/// `0..MAX_THREAD_NUM`.
pub const MAX_THREAD_NUM: usize = 100;

/// Per-thread stack size in bytes. Every spawned thread owns exactly one
/// buffer of this size for its whole lifetime. The main thread keeps
/// running on the process stack.
pub const STACK_SIZE: usize = 64 * 1024;

/// Id of the main thread, created implicitly by `init`.
pub const MAIN_TID: usize = 0;

/// Alignment applied to the top of every thread stack (System V ABI).
pub const STACK_ALIGN: usize = 16;
