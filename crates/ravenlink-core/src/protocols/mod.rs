//! Protocol decoding modules.
//!
//! Each protocol follows a layered structure:
//! - `layout`: tag names, prefixes and numeric constants (source of truth)
//! - `reader`: safe text access and protocol conventions
//! - `parser`: domain-level decoding (no direct character scanning)
//! - `error`: explicit, actionable errors
//!
//! Parsers are pure and contain no I/O; sources and the collector handle
//! device access and batching.

pub(crate) mod common;
pub mod demand;
