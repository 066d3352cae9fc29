//! Galaxy Core
//!
//! Core types shared by the Galaxy background job services.
//!
//! This crate contains:
//! - Domain types: jobs, their kinds and states, plugin outcomes
//! - DTOs: requests used by producers and operators to create or filter jobs

pub mod domain;
pub mod dto;
