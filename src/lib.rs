// src/lib.rs

#[macro_use]
pub mod macros;

pub mod adapters;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod model;
pub mod progress;
pub mod sync;

#[cfg(feature = "cli")]
pub mod cli;
