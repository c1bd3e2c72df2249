//! Command execution for the field device
//!
//! This module handles:
//! - Decoding inbound command frames and filtering them by topic
//! - Running accepted commands through the shell, bounded in concurrency
//! - Building correlated result frames and handing them to the bus session

mod executor;
mod runner;

pub use executor::{Dispatcher, DispatcherConfig};
pub use runner::ShellRunner;
