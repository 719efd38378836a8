//! Socket-activated TCP relay.
//!
//! Accepts connections on a listening socket provided at startup, dials a
//! fixed destination for each one and copies bytes both ways until either
//! side closes or the service shuts down.
//!
//! ```text
//! shutdown signal ──▶ Service ──▶ acceptor ──▶ forwarder ──▶ bridge
//!                                  (per conn)   dial once     copy ×2, close ×2
//! ```

pub mod activation;
pub mod config;
pub mod error;
pub mod group;
pub mod proxy;
pub mod service;

pub use config::Config;
pub use error::{Error, ErrorSet, Result};
pub use service::{Service, ServiceState};
