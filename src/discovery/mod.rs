//! Control-plane discovery
//!
//! This module handles:
//! - Fetching candidate endpoints for a service class from the bootstrap registry
//! - Health-probing every candidate and measuring round-trip time
//! - Selecting the fastest healthy instance

mod resolver;

pub use resolver::{DiscoveryConfig, Endpoint, Resolver};
