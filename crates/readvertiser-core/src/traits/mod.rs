//! Core traits for the readvertiser system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Resolver`]: Resolve a DNS name to candidate addresses
//! - [`TunnelControl`]: Read a tunnel device and write one peer's endpoint

pub mod resolver;
pub mod tunnel_control;

pub use resolver::Resolver;
pub use tunnel_control::TunnelControl;
