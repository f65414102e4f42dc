// ABOUTME: Library root for skiff - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod build;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod output;
pub mod ssh;
pub mod transport;
pub mod types;
