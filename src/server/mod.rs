//! Minimal host server: accept loop and prefix routing.

pub mod listener;
pub mod router;

pub use router::Router;
