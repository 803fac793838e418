// ABOUTME: Library root for chatclaw — re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod app;
pub mod backend;
pub mod commands;
pub mod config;
pub mod identity;
pub mod session;
