//! # relindex-core
//!
//! Core decision-and-execution pipeline for an autonomous index advisor.
//!
//! ## Architecture
//!
//! ```text
//! query execution → telemetry sample → buffer → persistent stats
//!     → candidate generator → scoring ensemble → constraint optimizer
//!     → safety gate → mutation executor → audit log / index versions
//!
//! (in parallel) every query → interceptor → allow | block
//! (request-driven) schema evolution → impact analysis → safe DDL → rollback plan
//! ```
//!
//! ### Key components
//!
//! - **advisor**: threads one telemetry window through candidates, scoring, the
//!   optimizer, and the safety gate into runnable DDL changes (§§4.2-4.6)
//! - **telemetry**: buffered, high-frequency query timing samples (§4.1)
//! - **candidates**: sliding-window aggregation into `(table, field, query_type)` candidates (§4.2)
//! - **scoring**: five-signal utility ensemble, cost/benefit, CERT, QPG, Cortex, predictive (§4.3)
//! - **optimizer**: multi-objective constraint solver (§4.4)
//! - **safety**: maintenance window, rate limiters, CPU throttle, storage/write budgets (§4.5)
//! - **executor**: DDL execution with retry, versioning, keyed mutual exclusion (§4.6)
//! - **interceptor**: pre-execution query safety net with a plan-analysis cache (§4.7)
//! - **schema**: safe column evolution with impact analysis and rollback plans (§4.8)
//! - **switches**: process-wide feature flags and bypass switches (§3)
//! - **audit**: append-only mutation log
//! - **db**: PostgreSQL connection pooling
//! - **config**: hierarchical TOML + environment configuration

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]

pub mod advisor;
pub mod audit;
pub mod candidates;
pub mod config;
pub mod db;
pub mod executor;
pub mod interceptor;
pub mod optimizer;
pub mod safety;
pub mod schema;
pub mod scoring;
pub mod switches;
pub mod telemetry;
pub mod types;

pub use relindex_error::{ErrorContext, Result, RuntimeError};

/// Version of the relindex-core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
