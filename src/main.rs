//! # uthreads Demo
//!
//! Two worker threads and the main thread share the CPU:
//!
//! | Thread | Behavior |
//! |--------|----------|
//! | `busy_worker` | Spins without yielding; only preemption moves it off the CPU |
//! | `sleepy_worker` | Spins for a while, then sleeps for 10 quantums, repeatedly |
//! | main | Spins until every thread has run a few quantums, then reports |
//!
//! Workers only touch atomics: preemption may strike anywhere, so they
//! stay away from locks the main thread might need.

use std::hint::spin_loop;
use std::sync::atomic::{AtomicU64, Ordering};

use uthreads::{get_quantums, get_tid, get_total_quantums, init, sleep, spawn, terminate, Tid};

/// Quantum length in microseconds of CPU time.
const QUANTUM_USECS: u32 = 10_000;

/// Quantums each thread should get before the demo ends.
const TARGET_QUANTUMS: u64 = 5;

static BUSY_SPINS: AtomicU64 = AtomicU64::new(0);
static SLEEPY_NAPS: AtomicU64 = AtomicU64::new(0);

/// **Busy worker**: never gives up the CPU voluntarily.
fn busy_worker() {
    loop {
        BUSY_SPINS.fetch_add(1, Ordering::Relaxed);
        spin_loop();
    }
}

/// **Sleepy worker**: burns a little CPU, then naps.
fn sleepy_worker() {
    loop {
        for _ in 0..1_000_000 {
            spin_loop();
        }
        SLEEPY_NAPS.fetch_add(1, Ordering::Relaxed);
        if sleep(10).is_err() {
            return;
        }
    }
}

fn quantums_of(tid: Tid) -> u64 {
    get_quantums(tid).unwrap_or(0)
}

fn main() {
    if let Err(err) = init(QUANTUM_USECS) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let (busy, sleepy) = match (spawn(busy_worker), spawn(sleepy_worker)) {
        (Ok(busy), Ok(sleepy)) => (busy, sleepy),
        _ => {
            eprintln!("could not spawn the demo workers");
            std::process::exit(1);
        }
    };

    // Preemption is the only way the workers get the CPU from here on.
    while [get_tid(), busy, sleepy]
        .iter()
        .any(|&tid| quantums_of(tid) < TARGET_QUANTUMS)
    {
        spin_loop();
    }

    println!("total quantums: {}", get_total_quantums());
    println!("main:   {} quantums", quantums_of(get_tid()));
    println!(
        "busy:   {} quantums, {} spins",
        quantums_of(busy),
        BUSY_SPINS.load(Ordering::Relaxed)
    );
    println!(
        "sleepy: {} quantums, {} naps",
        quantums_of(sleepy),
        SLEEPY_NAPS.load(Ordering::Relaxed)
    );

    if let Err(err) = terminate(0) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
