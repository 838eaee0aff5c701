//! # GitHub organization secrets reconciler
//!
//! Reconciles a declarative list of organization and repository secrets and
//! variables against GitHub's REST API.
//!
//! This library provides functionality to:
//! - Decode tabular rows into typed items and validate them before any request
//! - Seal secret values with each target's public key
//! - Apply rows as idempotent upserts with per-row failure isolation
//! - Fetch existing items back into the same row shape
//!
//! ## Modules
//!
//! - [`engine`] - Reconciliation engine (apply and fetch)
//! - [`item`] - Items, rows and their decoding
//! - [`visibility`] - Organization visibility normalization
//! - [`sealer`] - Sealed-box encryption of secret values
//! - [`key_cache`] - Per-target public key cache
//! - [`rate_limit`] - Retrying, rate-limit aware HTTP client
//! - [`github`] - Typed GitHub Actions secrets/variables endpoints
//! - [`config`] - Configuration file parsing and resolution
//! - [`errors`] - Structured error types

pub mod app;
pub mod app_deps;
pub mod cli;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod errors;
pub mod github;
pub mod item;
pub mod key_cache;
pub mod paths;
pub mod rate_limit;
pub mod sealer;
pub mod validation;
pub mod visibility;
