//! `webread` library surface.
//!
//! The `webread` binary (CLI + MCP stdio) is the main entrypoint. This module
//! re-exports the reader stack for embedding.

pub use webread_core as core;
pub use webread_local as local;
