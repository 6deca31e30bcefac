// src/lib.rs

pub mod candidates;
pub mod config;
pub mod core;
pub mod error;
pub mod fuzzy;
pub mod persistence;
pub mod sources;
pub mod spi;

pub use crate::config::LinkerConfig;
pub use crate::core::engine::Linker;
pub use crate::core::types::Resolution;
pub use crate::error::{Error, Result};
