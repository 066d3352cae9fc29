//! Data Transfer Objects
//!
//! Lightweight request types used when creating or querying jobs.

pub mod job;
