//! Shared types, adapter traits, and core utilities for the Screensync engine.
//!
//! This crate contains the foundational types that are shared between the
//! engine crate and all adapter implementations. Extracting these into a
//! separate crate allows adapter crates to compile in parallel with the
//! engine's feature modules.

pub mod cache_adapter;
pub mod error;
pub mod lock_adapter;
pub mod prelude;
pub mod types;
pub mod utils;

// vim: ts=4
