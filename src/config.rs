//! Command-line flags and resolved agent configuration

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
use crate::command::DispatcherConfig;
use crate::discovery::DiscoveryConfig;
use crate::registration::RegistrationConfig;

/// uDPU field device agent
#[derive(Debug, Clone, Parser)]
#[command(name = "udpu-agent", version, about)]
pub struct Cli {
    /// The discovery server host
    #[arg(long, env = "UDPU_DISCOVERY_HOST")]
    pub discovery_host: String,

    /// The discovery server port
    #[arg(long, env = "UDPU_DISCOVERY_PORT")]
    pub discovery_port: u16,

    /// Service class of the control plane
    #[arg(long, env = "UDPU_SERVICE_CLASS", default_value = "server")]
    pub service_class: String,

    /// Service class of the package repository (resolved and logged when set)
    #[arg(long, env = "UDPU_REPO_CLASS")]
    pub repo_class: Option<String>,

    /// Local device database
    #[arg(long, env = "UDPU_DB_PATH", default_value = "./client.db")]
    pub db_path: PathBuf,

    /// Network interface whose hardware address identifies this device
    #[arg(long, env = "UDPU_INTERFACE", default_value = "br-lan")]
    pub interface: String,

    /// Explicit device identity, bypassing the interface lookup
    #[arg(long, env = "UDPU_IDENTITY")]
    pub identity: Option<String>,

    /// Upper bound on commands executing at once
    #[arg(long, env = "UDPU_MAX_CONCURRENT_COMMANDS", default_value_t = 16)]
    pub max_concurrent_commands: usize,

    /// Per-command execution timeout
    #[arg(long, env = "UDPU_COMMAND_TIMEOUT_SECS", default_value_t = 300)]
    pub command_timeout_secs: u64,

    /// Delay between retries of discovery, registration and bus connect
    #[arg(long, env = "UDPU_RETRY_DELAY_SECS", default_value_t = 5)]
    pub retry_delay_secs: u64,

    /// Switch retries to doubling delays capped at this value
    #[arg(long, env = "UDPU_MAX_RETRY_DELAY_SECS")]
    pub max_retry_delay_secs: Option<u64>,
}

/// Fully resolved agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub discovery: DiscoveryConfig,
    pub registration: RegistrationConfig,
    pub dispatcher: DispatcherConfig,
    pub service_class: String,
    pub repo_class: Option<String>,
    pub db_path: PathBuf,
    pub interface: String,
    pub identity: Option<String>,
    pub retry_delay: Duration,
    pub max_retry_delay: Option<Duration>,
}

impl AgentConfig {
    /// Build a fresh retry policy for one retry loop
    pub fn backoff(&self) -> Box<dyn Backoff> {
        match self.max_retry_delay {
            Some(max) => Box::new(ExponentialBackoff::new(self.retry_delay, max)),
            None => Box::new(ConstantBackoff::new(self.retry_delay)),
        }
    }
}

impl From<Cli> for AgentConfig {
    fn from(cli: Cli) -> Self {
        let max_concurrent = cli.max_concurrent_commands.max(1);

        Self {
            discovery: DiscoveryConfig {
                bootstrap_host: cli.discovery_host,
                bootstrap_port: cli.discovery_port,
                ..Default::default()
            },
            registration: RegistrationConfig::default(),
            dispatcher: DispatcherConfig {
                max_concurrent,
                command_timeout: Duration::from_secs(cli.command_timeout_secs),
                ..Default::default()
            },
            service_class: cli.service_class,
            repo_class: cli.repo_class.filter(|c| !c.is_empty()),
            db_path: cli.db_path,
            interface: cli.interface,
            identity: cli.identity,
            retry_delay: Duration::from_secs(cli.retry_delay_secs),
            max_retry_delay: cli.max_retry_delay_secs.map(Duration::from_secs),
        }
    }
}
