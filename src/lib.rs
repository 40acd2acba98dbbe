//! kopek - cost-aware chat proxy for OpenRouter
//!
//! This library provides the core functionality for the kopek proxy:
//! configuration, pricing and cost accounting, and the buffered and
//! streaming relay paths.

pub mod config;
pub mod error;
pub mod pricing;
pub mod prompt;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
