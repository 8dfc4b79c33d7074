//! Core module - shared infrastructure for Roundtable
//!
//! This module contains foundational types, configuration, memory and error
//! handling used throughout the crate.

pub mod config;
pub mod error;
pub mod memory;
pub mod types;

pub use config::Config;
pub use error::{Result, RoundtableError};
pub use memory::LongTermMemory;
pub use types::*;
