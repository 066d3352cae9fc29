//! Core domain types
//!
//! These types are shared between the store (persistence), the job
//! daemon (polling and plugins) and the CLI (producers and operators).

pub mod job;
pub mod outcome;
pub mod toolshed;
