//! ---
//! fops_section: "01-core-functionality"
//! fops_subsection: "module"
//! fops_type: "source"
//! fops_scope: "code"
//! fops_description: "Runtime helpers supporting the simulation scheduler."
//! fops_version: "v0.0.0-prealpha"
//! fops_owner: "tbd"
//! ---
//! Periodic scheduling helpers for the simulator runtime.

pub mod scheduling;

pub use scheduling::{RateLimiter, TaskSet};
