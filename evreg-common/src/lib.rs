//! # evreg Common Library
//!
//! Shared code for the event-registration services:
//! - Database schema initialization and row models
//! - Bootstrap configuration loading
//! - API request signing primitives
//! - Common error type

pub mod api;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
