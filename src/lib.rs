//! eLife article metrics from Google Analytics.
//!
//! This library exposes the core modules for use by the binary, benchmarks and tests.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
