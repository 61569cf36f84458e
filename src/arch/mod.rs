//! # Architecture Abstraction Layer
//!
//! Provides the platform boundary for the scheduler: execution context
//! capture/restore on caller-owned stacks, the CPU-time quantum timer, and
//! masking of the preemption interrupt. Currently implements the
//! Linux/glibc port; other platforms add sibling modules.

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub mod linux;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use linux::{
    arm_quantum_timer, disarm_quantum_timer, install_preemption_handler, jump,
    mask_preemption, switch, unmask_preemption, Context,
};
