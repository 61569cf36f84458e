//! # Thread Control Block
//!
//! Defines the thread model: identity, state machine, saved execution
//! context, owned stack, and the per-thread counters the scheduler keeps.

use crate::arch::Context;
use crate::config::{MAIN_TID, STACK_ALIGN, STACK_SIZE};
use crate::error::Result;

/// Thread identifier, in `0..MAX_THREAD_NUM`.
pub type Tid = usize;

/// A spawned thread's body.
pub type Entry = Box<dyn FnOnce() + 'static>;

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

/// Execution state of a thread.
///
/// ```text
///   Ready ──── dispatch ─────► Running ── yield/preempt ──► Ready
///   Running ── block() ──────► Blocked ── resume() ───────► Ready
///   Ready ──── block() ──────► Blocked
///   Running ── sleep(n) ─────► Sleeping ── expiry/resume() ► Ready
///   Sleeping ─ block() ──────► SleepingBlocked
///   SleepingBlocked ─ resume() ► Sleeping
///   SleepingBlocked ─ expiry ──► Blocked
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Runnable, waiting in the ready queue.
    Ready,
    /// Currently executing.
    Running,
    /// Suspended until an explicit resume.
    Blocked,
    /// Suspended for a bounded number of scheduling points.
    Sleeping,
    /// Blocked while asleep: the countdown keeps running, but expiry leads
    /// to `Blocked` instead of `Ready`.
    SleepingBlocked,
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// A fixed-capacity execution stack, exclusively owned by one thread and
/// released when the thread is dropped.
pub struct Stack {
    buf: Box<[u8]>,
}

impl Stack {
    /// Allocate a zeroed stack of `STACK_SIZE` bytes.
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; STACK_SIZE].into_boxed_slice(),
        }
    }

    /// The usable region: base and length trimmed to `STACK_ALIGN`.
    pub fn region(&mut self) -> &mut [u8] {
        let base = self.buf.as_ptr() as usize;
        let start = base.next_multiple_of(STACK_ALIGN) - base;
        let len = (self.buf.len() - start) & !(STACK_ALIGN - 1);
        &mut self.buf[start..start + len]
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Thread Control Block
// ---------------------------------------------------------------------------

/// Thread Control Block (TCB).
///
/// Every field is mutated only inside a critical section. The context is
/// captured at the thread's last suspension and points into `stack`, so
/// the two are dropped together.
pub struct Thread {
    /// Unique id while the thread is alive.
    pub id: Tid,

    /// Current execution state.
    pub state: ThreadState,

    /// Number of scheduling points at which this thread was dispatched.
    pub quantum_count: u64,

    /// Scheduling points left before an active sleep expires. Meaningful
    /// only in `Sleeping` / `SleepingBlocked`.
    pub sleep_remaining: u32,

    pub(crate) context: Context,

    /// Body not yet started. Taken by the trampoline on first dispatch.
    entry: Option<Entry>,

    /// `None` for the main thread, which runs on the process stack.
    stack: Option<Stack>,
}

impl Thread {
    /// The main thread, created running by `init`. Its first quantum is the
    /// one that starts at initialization.
    pub fn main() -> Self {
        Self {
            id: MAIN_TID,
            state: ThreadState::Running,
            quantum_count: 1,
            sleep_remaining: 0,
            context: Context::blank(),
            entry: None,
            stack: None,
        }
    }

    /// A new `Ready` thread whose context enters `trampoline` on its own
    /// stack the first time it is dispatched.
    pub fn new(id: Tid, entry: Entry, trampoline: extern "C" fn()) -> Result<Self> {
        let mut stack = Stack::new();
        let context = Context::new(stack.region(), trampoline)?;
        Ok(Self {
            id,
            state: ThreadState::Ready,
            quantum_count: 0,
            sleep_remaining: 0,
            context,
            entry: Some(entry),
            stack: Some(stack),
        })
    }

    /// Whether this thread executes on a stack owned by its TCB.
    pub fn owns_stack(&self) -> bool {
        self.stack.is_some()
    }

    /// Hand out the body; `None` once started.
    pub fn take_entry(&mut self) -> Option<Entry> {
        self.entry.take()
    }

    /// Asleep, blocked or not.
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        matches!(self.state, ThreadState::Sleeping | ThreadState::SleepingBlocked)
    }

    /// Blocked, asleep or not.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        matches!(self.state, ThreadState::Blocked | ThreadState::SleepingBlocked)
    }

    /// Transition into `Running`, counting the new quantum.
    pub fn mark_running(&mut self) {
        self.state = ThreadState::Running;
        self.quantum_count += 1;
    }

    /// Arm the sleep countdown. The state change happens at dispatch.
    pub fn begin_sleep(&mut self, num_quantums: u32) {
        self.sleep_remaining = num_quantums;
    }

    /// Advance the sleep countdown by one scheduling point.
    ///
    /// Returns the state the thread woke into (`Ready` or `Blocked`), or
    /// `None` while it is still asleep.
    pub fn tick_sleep(&mut self) -> Option<ThreadState> {
        self.sleep_remaining = self.sleep_remaining.saturating_sub(1);
        if self.sleep_remaining > 0 {
            return None;
        }
        self.state = match self.state {
            ThreadState::SleepingBlocked => ThreadState::Blocked,
            _ => ThreadState::Ready,
        };
        Some(self.state)
    }
}
