// src/core/mod.rs
pub mod builder;
pub mod context;
pub mod cost;
pub mod edit;
pub mod engine;
pub mod minigraph;
pub mod relation;
pub mod search;
pub mod types;
