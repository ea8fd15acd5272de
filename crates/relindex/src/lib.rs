//! # relindex
//!
//! Autonomous index advisor and executor for a relational database: watches
//! query telemetry, proposes indexes backed by a multi-signal scoring
//! ensemble, and safely creates or rolls them back under a constraint
//! optimizer and a production safety gate.
//!
//! This crate is a thin umbrella over [`relindex_core`], re-exporting the
//! pieces most callers need without requiring a `relindex_core::` prefix.
//! Application wiring (connection pool construction, config loading, the
//! background loops that drive the pipeline end to end) lives here; the
//! decision logic itself lives in `relindex-core`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod runtime;

pub use relindex_core::{audit, candidates, config, db, executor, interceptor, optimizer, safety, schema, scoring, switches, telemetry, types};
pub use relindex_error::{ErrorContext, Result, RuntimeError};

/// Version of the relindex crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version, kept in sync with `workspace.package.rust-version`.
pub const MSRV: &str = "1.80";
