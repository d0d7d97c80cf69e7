//! Pulse timing module
//!
//! This module turns raw sensor triggers into RPM values:
//! - Interrupt-side trigger recording with debounce ([`trigger`])
//! - Per-channel RPM computation, timeout and averaging ([`tracker`])
//! - Shared activity stamp and the stabilization gate ([`activity`])

pub mod activity;
pub mod tracker;
pub mod trigger;
