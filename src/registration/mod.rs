//! Device registration against the control plane

mod client;

pub use client::{RegistrationClient, RegistrationConfig};
