mod backoff;
mod command;
mod config;
mod connection;
mod discovery;
mod error;
mod identity;
mod registration;
mod storage;
mod transport;

use anyhow::Context;
use clap::Parser;
use command::{Dispatcher, ShellRunner};
use config::{AgentConfig, Cli};
use connection::{BusSession, ConnectionConfig, ConnectionEvent};
use discovery::Resolver;
use registration::RegistrationClient;
use std::sync::Arc;
use storage::{upsert_subscriber, RedbStore};
use transport::WsConnector;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = AgentConfig::from(Cli::parse());

    info!("uDPU agent starting");
    info!(
        "  Discovery: {}:{}",
        config.discovery.bootstrap_host, config.discovery.bootstrap_port
    );
    info!("  Database: {}", config.db_path.display());

    // Local storage first: nothing else is worth doing without it
    let store = RedbStore::open(&config.db_path)
        .with_context(|| format!("Can't open database {}", config.db_path.display()))?;

    let resolver = Resolver::new(config.discovery.clone())?;
    let mut backoff = config.backoff();
    let server = resolver
        .resolve_until_found(&config.service_class, backoff.as_mut())
        .await;

    if let Some(repo_class) = &config.repo_class {
        let mut backoff = config.backoff();
        let repo = resolver
            .resolve_until_found(repo_class, backoff.as_mut())
            .await;
        info!("Package repository: {}", repo);
    }

    let identity = identity::resolve_identity(config.identity.as_deref(), &config.interface)
        .await
        .context("Can't determine device identity")?;
    info!("Device identity: {}", identity);

    let registration = RegistrationClient::new(config.registration.clone())?;
    let mut backoff = config.backoff();
    let record = registration
        .register_until_assigned(&server, &identity, backoff.as_mut())
        .await;

    upsert_subscriber(&store, &record).context("Can't persist client record")?;

    let connector = WsConnector::new(&server);
    info!("  Bus: {}", connector.url());

    let mut session = BusSession::new(
        ConnectionConfig {
            subscriber_id: record.subscriber_uid.clone(),
            ..Default::default()
        },
        connector,
        config.backoff(),
    );
    let handle = session.handle();

    let runner = Arc::new(ShellRunner::new(config.dispatcher.command_timeout));
    let dispatcher = Arc::new(Dispatcher::new(
        session.subscriber_id().to_string(),
        runner,
        config.dispatcher.clone(),
    ));

    // Main event loop
    loop {
        match session.recv().await {
            Some(ConnectionEvent::Connected { transport }) => {
                info!("Connected via {}", transport);
            }
            Some(ConnectionEvent::Disconnected { reason }) => {
                warn!("Disconnected: {}", reason);
            }
            Some(ConnectionEvent::Received(raw)) => {
                dispatcher.dispatch(&raw, handle.clone());
            }
            None => {
                error!("Bus session closed");
                break;
            }
        }
    }

    Ok(())
}
