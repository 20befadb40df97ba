//! db-preflight - pre-execution safety analysis for MySQL schema changes
//! and bulk writes.
//!
//! This library exposes the core modules for use in integration tests.

pub mod analyze;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod render;
pub mod topology;
