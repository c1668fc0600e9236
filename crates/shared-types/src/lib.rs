//! # Shared Types
//!
//! Primitive types (`Hash`, `Address`) shared by every crate in the
//! workspace. Kept deliberately thin: anything consensus-critical
//! (account records, headers) lives in `chain-state` and `chain-block`,
//! which own the byte layout those types are normative over.

pub mod entities;

pub use entities::*;
