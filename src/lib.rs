//! Shelf application library
//!
//! Book, review and account modules plus the bootstrap that wires them into
//! the shelf kernel.

#![recursion_limit = "256"]

pub mod app;
pub mod context;
pub mod modules;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{build_registry, run};
pub use context::AppContext;
