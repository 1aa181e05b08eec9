//! Core domain models for pipelines
//!
//! This module defines the task graph, its validation, and the records
//! produced while a pipeline runs.

pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod state;

pub use error::*;
pub use pipeline::*;
pub use state::*;
