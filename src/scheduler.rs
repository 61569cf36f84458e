//! # Scheduler
//!
//! Core scheduling logic. Implements strict FIFO round robin over the ready
//! queue, a sleep set counted in scheduling points, and the state-transition
//! policy for block / resume / sleep / terminate.
//!
//! ## Scheduling Algorithm
//!
//! Every scheduling point goes through [`Scheduler::dispatch`]:
//! 1. **Advance sleepers**: every sleeping thread's countdown drops by one;
//!    expired `Sleeping` threads join the ready queue tail, expired
//!    `SleepingBlocked` threads become `Blocked`
//! 2. **Select next thread**: the ready queue head. If the queue is empty
//!    the running thread keeps the CPU (the point still counts)
//! 3. **Dispose of the outgoing thread** according to the [`Action`]
//! 4. **Account**: the incoming thread's quantum count and the global
//!    quantum count both advance by one
//!
//! The scheduler never switches contexts itself. `dispatch` returns a
//! [`Switch`] plan which the kernel carries out after its borrow of the
//! scheduler has ended.
//!
//! ## Allocation
//!
//! The ready queue and sleep set are preallocated to `MAX_THREAD_NUM`, so
//! `dispatch` never touches the allocator. It runs from the preemption
//! handler, which may have interrupted the allocator itself.

use std::collections::{BTreeSet, VecDeque};

use crate::arch::Context;
use crate::config::{MAIN_TID, MAX_THREAD_NUM};
use crate::error::{Error, Result};
use crate::thread::{Entry, Thread, ThreadState, Tid};

// ---------------------------------------------------------------------------
// Dispatch plan
// ---------------------------------------------------------------------------

/// What happens to the outgoing thread at a scheduling point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Already removed from every container by the caller.
    Terminating,
    /// Becomes `Blocked`.
    Blocking,
    /// Enters the sleep set with its countdown already armed.
    Sleeping,
    /// Voluntary yield or preemption: back to the ready queue tail.
    Scheduling,
}

/// A context switch decided by [`Scheduler::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Thread giving up the CPU.
    pub from: Tid,
    /// Thread taking the CPU, already marked `Running`.
    pub to: Tid,
    /// Whether the outgoing context must be saved (false when terminating).
    pub save: bool,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state.
///
/// ## Design Notes
///
/// - `threads` is the identity map, indexed by id; a slot is `Some` exactly
///   while that id is alive
/// - `free_ids` holds every id in `1..MAX_THREAD_NUM` with no live thread;
///   the main thread's id is never in it
/// - `ready` holds exactly the `Ready` threads, oldest first
/// - `sleeping` holds exactly the `Sleeping` / `SleepingBlocked` threads
/// - `reaper` parks a self-terminated thread whose stack was still in use
///   when it left; it is dropped from another thread's stack
pub struct Scheduler {
    threads: Vec<Option<Box<Thread>>>,
    free_ids: BTreeSet<Tid>,
    ready: VecDeque<Tid>,
    sleeping: Vec<Tid>,
    current: Tid,
    total_quantums: u64,
    reaper: Option<Box<Thread>>,
}

impl Scheduler {
    /// Create a scheduler whose only thread is the running main thread.
    /// The global quantum count starts at 1.
    pub fn new() -> Self {
        let mut threads: Vec<Option<Box<Thread>>> = Vec::with_capacity(MAX_THREAD_NUM);
        threads.resize_with(MAX_THREAD_NUM, || None);
        threads[MAIN_TID] = Some(Box::new(Thread::main()));

        Self {
            threads,
            free_ids: (0..MAX_THREAD_NUM).filter(|&id| id != MAIN_TID).collect(),
            ready: VecDeque::with_capacity(MAX_THREAD_NUM),
            sleeping: Vec::with_capacity(MAX_THREAD_NUM),
            current: MAIN_TID,
            total_quantums: 1,
            reaper: None,
        }
    }

    fn thread(&self, tid: Tid) -> Result<&Thread> {
        self.threads
            .get(tid)
            .and_then(|slot| slot.as_deref())
            .ok_or(Error::InvalidId(tid))
    }

    fn thread_mut(&mut self, tid: Tid) -> Result<&mut Thread> {
        self.threads
            .get_mut(tid)
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(Error::InvalidId(tid))
    }

    /// Lookup for threads the bookkeeping says must exist.
    fn tracked_mut(&mut self, tid: Tid) -> Result<&mut Thread> {
        self.thread_mut(tid)
            .map_err(|_| Error::ImpossibleState("tracked thread missing from identity map"))
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Id of the running thread.
    pub fn current(&self) -> Tid {
        self.current
    }

    /// Scheduling points since initialization, including the current one.
    pub fn total_quantums(&self) -> u64 {
        self.total_quantums
    }

    /// Number of quantums `tid` has started in `Running`.
    pub fn quantums(&self, tid: Tid) -> Result<u64> {
        self.thread(tid).map(|t| t.quantum_count)
    }

    /// State of a live thread.
    pub fn state(&self, tid: Tid) -> Result<ThreadState> {
        self.thread(tid).map(|t| t.state)
    }

    /// Remaining countdown of a sleeping thread.
    pub fn sleep_remaining(&self, tid: Tid) -> Result<Option<u32>> {
        self.thread(tid)
            .map(|t| t.is_sleeping().then_some(t.sleep_remaining))
    }

    /// The ready queue, head first.
    pub fn ready_queue(&self) -> impl Iterator<Item = Tid> + '_ {
        self.ready.iter().copied()
    }

    /// Number of live threads, main thread included.
    pub fn live_threads(&self) -> usize {
        MAX_THREAD_NUM - self.free_ids.len()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Create a thread with the smallest free id and queue it at the ready
    /// tail. Its context enters `trampoline` on first dispatch.
    pub fn spawn(&mut self, entry: Entry, trampoline: extern "C" fn()) -> Result<Tid> {
        let tid = *self.free_ids.first().ok_or(Error::CapacityExceeded)?;
        let thread = Thread::new(tid, entry, trampoline)?;

        self.free_ids.remove(&tid);
        self.threads[tid] = Some(Box::new(thread));
        self.ready.push_back(tid);
        Ok(tid)
    }

    /// Terminate a thread other than the main thread.
    ///
    /// Terminating another thread frees it at once and returns `None`.
    /// Self-termination parks the TCB in the reaper slot and returns the
    /// switch that abandons it.
    pub fn terminate(&mut self, tid: Tid) -> Result<Option<Switch>> {
        if tid == MAIN_TID {
            return Err(Error::MainThread);
        }
        let thread = self
            .threads
            .get_mut(tid)
            .and_then(Option::take)
            .ok_or(Error::InvalidId(tid))?;
        self.free_ids.insert(tid);

        match thread.state {
            ThreadState::Running => {
                self.reap();
                self.reaper = Some(thread);
                self.dispatch(Action::Terminating)
            }
            ThreadState::Ready => {
                self.ready.retain(|&id| id != tid);
                Ok(None)
            }
            ThreadState::Sleeping | ThreadState::SleepingBlocked => {
                self.sleeping.retain(|&id| id != tid);
                Ok(None)
            }
            ThreadState::Blocked => Ok(None),
        }
    }

    /// Drop a parked self-terminated thread, releasing its stack.
    ///
    /// Must not run on the parked thread's stack; every caller is a thread
    /// that was dispatched after the parked one left.
    pub fn reap(&mut self) {
        self.reaper = None;
    }

    /// Tear down every thread. Returns the running thread if its stack is
    /// the one currently executing; the caller must not drop it.
    pub fn shutdown(mut self) -> Option<Box<Thread>> {
        let running = self.threads[self.current].take();
        drop(self);
        running.filter(|t| t.owns_stack())
    }

    /// Take the running thread's body. Called once by its trampoline.
    pub fn take_entry(&mut self) -> Option<Entry> {
        let current = self.current;
        self.thread_mut(current).ok()?.take_entry()
    }

    // -----------------------------------------------------------------------
    // Block / resume / sleep
    // -----------------------------------------------------------------------

    /// Block `tid`. Blocking the running thread is a scheduling point.
    pub fn block(&mut self, tid: Tid) -> Result<Option<Switch>> {
        if tid == MAIN_TID {
            return Err(Error::MainThread);
        }
        let thread = self.thread_mut(tid)?;
        if thread.is_blocked() {
            return Ok(None);
        }
        match thread.state {
            ThreadState::Sleeping => {
                thread.state = ThreadState::SleepingBlocked;
                Ok(None)
            }
            ThreadState::Ready => {
                thread.state = ThreadState::Blocked;
                self.ready.retain(|&id| id != tid);
                Ok(None)
            }
            _ => self.dispatch(Action::Blocking),
        }
    }

    /// Resume `tid`. A sleeping thread is woken early; a blocked sleeper
    /// only loses its blocked flag and keeps sleeping.
    pub fn resume(&mut self, tid: Tid) -> Result<()> {
        let thread = self.thread_mut(tid)?;
        match thread.state {
            ThreadState::Running | ThreadState::Ready => {}
            ThreadState::SleepingBlocked => thread.state = ThreadState::Sleeping,
            ThreadState::Blocked => {
                thread.state = ThreadState::Ready;
                self.ready.push_back(tid);
            }
            ThreadState::Sleeping => {
                thread.state = ThreadState::Ready;
                thread.sleep_remaining = 0;
                self.sleeping.retain(|&id| id != tid);
                self.ready.push_back(tid);
            }
        }
        Ok(())
    }

    /// Put the running thread to sleep for `num_quantums` scheduling points,
    /// not counting the current one.
    pub fn sleep(&mut self, num_quantums: u32) -> Result<Option<Switch>> {
        if self.current == MAIN_TID {
            return Err(Error::MainThread);
        }
        if num_quantums == 0 {
            return Err(Error::InvalidArgument("sleep duration must be positive"));
        }
        let current = self.current;
        self.tracked_mut(current)?.begin_sleep(num_quantums);
        self.dispatch(Action::Sleeping)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Advance every sleeper's countdown by one scheduling point.
    fn wake_sleepers(&mut self) {
        let threads = &mut self.threads;
        let ready = &mut self.ready;
        self.sleeping.retain(|&tid| {
            let Some(thread) = threads[tid].as_deref_mut() else {
                return false;
            };
            match thread.tick_sleep() {
                None => true,
                Some(ThreadState::Ready) => {
                    ready.push_back(tid);
                    false
                }
                Some(_) => false,
            }
        });
    }

    /// Perform one scheduling point.
    ///
    /// Returns the switch to carry out, or `None` when the running thread
    /// keeps the CPU because nothing else is runnable.
    pub fn dispatch(&mut self, action: Action) -> Result<Option<Switch>> {
        let outgoing = self.current;
        self.wake_sleepers();

        let Some(incoming) = self.ready.pop_front() else {
            if action != Action::Scheduling {
                return Err(Error::ImpossibleState("no runnable thread"));
            }
            self.tracked_mut(outgoing)?.quantum_count += 1;
            self.total_quantums += 1;
            return Ok(None);
        };

        match action {
            Action::Terminating => {}
            Action::Blocking => self.tracked_mut(outgoing)?.state = ThreadState::Blocked,
            Action::Sleeping => {
                self.tracked_mut(outgoing)?.state = ThreadState::Sleeping;
                self.sleeping.push(outgoing);
            }
            Action::Scheduling => {
                self.tracked_mut(outgoing)?.state = ThreadState::Ready;
                self.ready.push_back(outgoing);
            }
        }

        self.tracked_mut(incoming)?.mark_running();
        self.current = incoming;
        self.total_quantums += 1;

        Ok(Some(Switch {
            from: outgoing,
            to: incoming,
            save: action != Action::Terminating,
        }))
    }

    /// Resolve a switch into the contexts to save and resume.
    ///
    /// The pointers stay valid until the owning threads are dropped: TCBs
    /// are boxed and the contexts box their register state.
    pub fn contexts(&mut self, switch: &Switch) -> Result<(Option<*mut Context>, *const Context)> {
        let save = if switch.save {
            Some(&mut self.tracked_mut(switch.from)?.context as *mut Context)
        } else {
            None
        };
        let resume = &self.tracked_mut(switch.to)?.context as *const Context;
        Ok((save, resume))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn idle_trampoline() {}

    fn spawn_n(sched: &mut Scheduler, n: usize) -> Vec<Tid> {
        (0..n)
            .map(|_| sched.spawn(Box::new(|| {}), idle_trampoline).unwrap())
            .collect()
    }

    /// Yield `points` times, recording who runs after each point.
    fn rotate(sched: &mut Scheduler, points: usize) -> Vec<Tid> {
        (0..points)
            .map(|_| {
                sched.dispatch(Action::Scheduling).unwrap();
                sched.current()
            })
            .collect()
    }

    /// Container membership must mirror thread states exactly.
    fn assert_consistent(sched: &Scheduler) {
        let mut running = 0;
        for (tid, slot) in sched.threads.iter().enumerate() {
            let Some(thread) = slot.as_deref() else {
                assert!(tid != MAIN_TID && sched.free_ids.contains(&tid));
                continue;
            };
            assert_eq!(thread.id, tid);
            assert!(!sched.free_ids.contains(&tid));
            assert_eq!(
                sched.ready.contains(&tid),
                thread.state == ThreadState::Ready
            );
            assert_eq!(sched.sleeping.contains(&tid), thread.is_sleeping());
            if thread.state == ThreadState::Running {
                running += 1;
                assert_eq!(sched.current, tid);
            }
        }
        assert_eq!(running, 1);
        assert!(!sched.free_ids.contains(&MAIN_TID));
    }

    #[test]
    fn test_initial_state() {
        let sched = Scheduler::new();
        assert_eq!(sched.current(), MAIN_TID);
        assert_eq!(sched.total_quantums(), 1);
        assert_eq!(sched.quantums(MAIN_TID).unwrap(), 1);
        assert_eq!(sched.state(MAIN_TID).unwrap(), ThreadState::Running);
        assert_eq!(sched.live_threads(), 1);
        assert_consistent(&sched);
    }

    #[test]
    fn test_spawn_uses_smallest_free_id() {
        let mut sched = Scheduler::new();
        assert_eq!(spawn_n(&mut sched, 3), vec![1, 2, 3]);
        sched.terminate(2).unwrap();
        assert_eq!(spawn_n(&mut sched, 2), vec![2, 4]);
        assert_eq!(sched.ready_queue().collect::<Vec<_>>(), vec![1, 3, 2, 4]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_spawn_capacity() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, MAX_THREAD_NUM - 1);
        assert_eq!(sched.live_threads(), MAX_THREAD_NUM);
        let err = sched.spawn(Box::new(|| {}), idle_trampoline).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded));
        assert_eq!(sched.ready_queue().count(), MAX_THREAD_NUM - 1);
        assert_consistent(&sched);
    }

    #[test]
    fn test_round_robin_order() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 3);
        assert_eq!(rotate(&mut sched, 8), vec![1, 2, 3, 0, 1, 2, 3, 0]);
        assert_eq!(sched.total_quantums(), 9);
        assert_eq!(sched.quantums(MAIN_TID).unwrap(), 3);
        for tid in 1..=3 {
            assert_eq!(sched.quantums(tid).unwrap(), 2);
        }
        assert_consistent(&sched);
    }

    #[test]
    fn test_dispatch_plan() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        let switch = sched.dispatch(Action::Scheduling).unwrap().unwrap();
        assert_eq!(
            switch,
            Switch {
                from: 0,
                to: 1,
                save: true
            }
        );
        let (save, resume) = sched.contexts(&switch).unwrap();
        assert!(save.is_some());
        assert!(!resume.is_null());
    }

    #[test]
    fn test_lone_thread_keeps_cpu_but_counts() {
        let mut sched = Scheduler::new();
        assert!(sched.dispatch(Action::Scheduling).unwrap().is_none());
        assert!(sched.dispatch(Action::Scheduling).unwrap().is_none());
        assert_eq!(sched.current(), MAIN_TID);
        assert_eq!(sched.total_quantums(), 3);
        assert_eq!(sched.quantums(MAIN_TID).unwrap(), 3);
        assert_consistent(&sched);
    }

    #[test]
    fn test_sleep_skips_exactly_n_points() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 2);
        rotate(&mut sched, 1);
        assert_eq!(sched.current(), 1);

        let switch = sched.sleep(3).unwrap().unwrap();
        assert_eq!(switch.from, 1);
        assert_eq!(sched.state(1).unwrap(), ThreadState::Sleeping);
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(3));

        // Thread 2 and main share the CPU for the next two points.
        assert_eq!(rotate(&mut sched, 2), vec![0, 2]);
        assert!(!sched.ready_queue().any(|tid| tid == 1));
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(1));

        // The third point wakes it onto the ready tail.
        assert_eq!(rotate(&mut sched, 1), vec![0]);
        assert_eq!(sched.state(1).unwrap(), ThreadState::Ready);
        assert_eq!(sched.ready_queue().collect::<Vec<_>>(), vec![1, 2]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_sleep_rejected_for_main_and_zero() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        assert!(matches!(sched.sleep(2), Err(Error::MainThread)));
        rotate(&mut sched, 1);
        assert!(matches!(sched.sleep(0), Err(Error::InvalidArgument(_))));
        assert_eq!(sched.total_quantums(), 2);
        assert_consistent(&sched);
    }

    #[test]
    fn test_block_ready_thread_leaves_rotation() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 3);
        assert!(sched.block(2).unwrap().is_none());
        assert_eq!(sched.state(2).unwrap(), ThreadState::Blocked);
        assert_eq!(rotate(&mut sched, 6), vec![1, 3, 0, 1, 3, 0]);

        sched.resume(2).unwrap();
        assert_eq!(sched.ready_queue().collect::<Vec<_>>(), vec![1, 3, 2]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_block_is_idempotent() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        sched.block(1).unwrap();
        let quantums = sched.total_quantums();
        assert!(sched.block(1).unwrap().is_none());
        assert_eq!(sched.state(1).unwrap(), ThreadState::Blocked);
        assert_eq!(sched.total_quantums(), quantums);
    }

    #[test]
    fn test_block_blocked_sleeper_is_idempotent() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        sched.sleep(4).unwrap();
        sched.block(1).unwrap();
        let quantums = sched.total_quantums();

        assert!(sched.block(1).unwrap().is_none());
        assert_eq!(sched.state(1).unwrap(), ThreadState::SleepingBlocked);
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(4));
        assert_eq!(sched.total_quantums(), quantums);
        assert_consistent(&sched);
    }

    #[test]
    fn test_block_self_switches_away() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        let switch = sched.block(1).unwrap().unwrap();
        assert_eq!((switch.from, switch.to, switch.save), (1, 0, true));
        assert_eq!(sched.state(1).unwrap(), ThreadState::Blocked);
        assert_eq!(sched.total_quantums(), 3);
        assert_consistent(&sched);
    }

    #[test]
    fn test_block_main_and_unknown_rejected() {
        let mut sched = Scheduler::new();
        assert!(matches!(sched.block(MAIN_TID), Err(Error::MainThread)));
        assert!(matches!(sched.block(5), Err(Error::InvalidId(5))));
        assert!(matches!(sched.block(MAX_THREAD_NUM + 7), Err(Error::InvalidId(_))));
        assert!(matches!(sched.resume(5), Err(Error::InvalidId(5))));
        assert!(matches!(sched.quantums(5), Err(Error::InvalidId(5))));
    }

    #[test]
    fn test_blocked_sleeper_expires_into_blocked() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        sched.sleep(2).unwrap();
        sched.block(1).unwrap();
        assert_eq!(sched.state(1).unwrap(), ThreadState::SleepingBlocked);

        rotate(&mut sched, 2);
        assert_eq!(sched.state(1).unwrap(), ThreadState::Blocked);
        assert_eq!(sched.ready_queue().count(), 0);

        sched.resume(1).unwrap();
        assert_eq!(sched.state(1).unwrap(), ThreadState::Ready);
        assert_eq!(rotate(&mut sched, 1), vec![1]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_resume_blocked_sleeper_keeps_sleeping() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        sched.sleep(3).unwrap();
        sched.block(1).unwrap();
        sched.resume(1).unwrap();
        assert_eq!(sched.state(1).unwrap(), ThreadState::Sleeping);
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(3));

        rotate(&mut sched, 2);
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(1));
        assert_eq!(rotate(&mut sched, 1), vec![1]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_resume_sleeper_wakes_early() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        sched.sleep(50).unwrap();
        sched.resume(1).unwrap();
        assert_eq!(sched.state(1).unwrap(), ThreadState::Ready);
        assert_eq!(sched.sleep_remaining(1).unwrap(), None);
        assert_eq!(rotate(&mut sched, 1), vec![1]);
        assert_consistent(&sched);
    }

    #[test]
    fn test_resume_running_or_ready_is_noop() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 2);
        sched.resume(MAIN_TID).unwrap();
        sched.resume(1).unwrap();
        assert_eq!(sched.ready_queue().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sched.state(MAIN_TID).unwrap(), ThreadState::Running);
    }

    #[test]
    fn test_terminate_self_parks_and_switches() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 2);
        rotate(&mut sched, 1);

        let switch = sched.terminate(1).unwrap().unwrap();
        assert_eq!((switch.from, switch.to, switch.save), (1, 2, false));
        assert!(sched.reaper.is_some());
        assert!(matches!(sched.quantums(1), Err(Error::InvalidId(1))));
        assert_eq!(sched.live_threads(), 2);

        let (save, _) = sched.contexts(&switch).unwrap();
        assert!(save.is_none());

        sched.reap();
        assert!(sched.reaper.is_none());
        assert_consistent(&sched);
    }

    #[test]
    fn test_terminate_last_spawned_thread_returns_to_main() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        rotate(&mut sched, 1);
        let switch = sched.terminate(1).unwrap().unwrap();
        assert_eq!(switch.to, MAIN_TID);
        assert_eq!(sched.current(), MAIN_TID);
        assert_eq!(sched.live_threads(), 1);
        assert_consistent(&sched);
    }

    #[test]
    fn test_terminate_other_threads() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 3);
        rotate(&mut sched, 1);
        sched.sleep(4).unwrap();
        sched.block(3).unwrap();
        assert_eq!(sched.current(), 2);

        // A sleeping victim and a blocked one.
        assert!(sched.terminate(1).unwrap().is_none());
        assert!(sched.terminate(3).unwrap().is_none());
        assert!(sched.sleeping.is_empty());
        assert_eq!(sched.live_threads(), 2);
        assert!(matches!(sched.terminate(3), Err(Error::InvalidId(3))));
        assert!(matches!(sched.terminate(MAIN_TID), Err(Error::MainThread)));
        assert_consistent(&sched);
    }

    #[test]
    fn test_every_point_advances_sleepers() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 3);
        rotate(&mut sched, 1);
        sched.sleep(3).unwrap(); // point 1: thread 1 asleep, thread 2 runs
        sched.block(2).unwrap(); // point 2: block self
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(2));
        sched.dispatch(Action::Scheduling).unwrap(); // point 3: preemption
        assert_eq!(sched.sleep_remaining(1).unwrap(), Some(1));
        sched.dispatch(Action::Scheduling).unwrap(); // point 4: expiry
        assert_eq!(sched.state(1).unwrap(), ThreadState::Ready);
        assert_consistent(&sched);
    }

    #[test]
    fn test_take_entry_once() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 1);
        assert!(sched.take_entry().is_none());
        rotate(&mut sched, 1);
        assert!(sched.take_entry().is_some());
        assert!(sched.take_entry().is_none());
    }

    #[test]
    fn test_shutdown_keeps_running_stack() {
        let mut sched = Scheduler::new();
        spawn_n(&mut sched, 2);
        assert!(Scheduler::new().shutdown().is_none());

        rotate(&mut sched, 1);
        let running = sched.shutdown().unwrap();
        assert_eq!(running.id, 1);
    }
}
