//! Board-agnostic control core for the fornetto dual-zone pizza oven
//!
//! This crate contains all oven logic that does not depend on specific
//! hardware implementations:
//!
//! - Hardware abstraction traits (probes, switch outputs, settings store)
//! - Per-zone closed-loop controller (PID, relay autotune, soak, wear,
//!   runaway detection, time-proportional output)
//! - Wall-power budget allocation between the two zones
//! - Oven-level supervisor state machine
//! - Persisted settings block and its write-back policy
//! - Rotary-input routing and confirmation prompts
//! - Serial telemetry formatting
//!
//! The crate is driven from a single cooperative loop: poll input, run the
//! 1 Hz control tick, drive the outputs every iteration, commit settings
//! when eligible. Time is a monotonic `u32` millisecond counter supplied by
//! the caller.

#![no_std]
#![deny(unsafe_code)]

pub mod clock;
pub mod config;
pub mod input;
pub mod oven;
pub mod persist;
pub mod power;
pub mod settings;
pub mod state;
pub mod telemetry;
pub mod traits;
pub mod zone;
