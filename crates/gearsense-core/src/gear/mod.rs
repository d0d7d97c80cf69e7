//! Gear estimation module
//!
//! - Fixed-capacity tooth tables ([`table`])
//! - Nearest-ratio search with a confidence gate ([`estimator`])

pub mod estimator;
pub mod table;
