//! Limelight Proxy - reverse proxy for a Limelight vision camera
//!
//! Forwards dashboard requests under `/dash/limelight/*` to the camera on
//! its private address, streaming the MJPEG feed and buffering API calls.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
