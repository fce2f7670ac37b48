//! Marketplace resource API.
//!
//! Request parameters are turned into validated query statements by
//! per-entity filters, and results are served through a single-flight cache
//! with a fixed max-age.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
