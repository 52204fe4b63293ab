//! Core domain models for provisioning runs
//!
//! This module defines the run parameters, steps, the fixed step sequence
//! and the state a run moves through.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
