//! Shelf application library
//!
//! Wires the book catalogue module into the kernel registry and HTTP server.

pub mod app;
pub mod modules;

pub use app::{build_registry, migrate, serve};
