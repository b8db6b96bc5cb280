//! Coral Bay Core - Shared types library.
//!
//! This crate provides common types used across all Coral Bay components:
//! - `reactors` - Document-change reaction service (counters, mirroring, gateways)
//! - `cli` - Command-line tools for migrations and reconciliation
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money amounts, and statuses
//! - [`documents`] - Entity documents as stored in the primary document store
//! - [`counts`] - Denormalized counts documents and their arithmetic

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod counts;
pub mod documents;
pub mod types;

pub use counts::*;
pub use documents::*;
pub use types::*;
