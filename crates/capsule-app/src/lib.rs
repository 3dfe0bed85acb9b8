//! Entry point for the presentation layer: configuration, logging and a
//! single service object wiring the store, reconciler and refresh loop.

pub mod config;
pub mod service;
pub mod telemetry;

pub use config::Config;
pub use service::{CapsuleService, Dashboard};
