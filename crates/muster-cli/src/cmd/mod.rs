//! CLI command handlers.

pub mod cache_cmd;
pub mod fetch;
pub mod replay;
