//! `tether run`: wire every component together and drive the orchestrator.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::auth::{
    AuthorizationFlow, CredentialStore, FileCredentialStore, OAuthClient, OAuthSettings,
    TokenManager,
};
use crate::beacon::LogBroadcaster;
use crate::bus::{event_bus, Event};
use crate::config::DeviceConfig;
use crate::device::{
    app_version, parse_hardware_id, read_interface_hardware_id, DeviceIdentity, LogHandler,
};
use crate::orchestrator::Orchestrator;
use crate::relay::{ConnectivityManager, TransportSink, WsConnector};
use crate::schedule::{HttpUpdateChecker, LogInstaller, Scheduler};

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tether=info")),
        )
        .try_init();
}

/// Handle `tether run`.
pub async fn handle_run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = DeviceConfig::load(config_path)?;
    let version = app_version();
    match resolve_identity(&config) {
        Some(identity) => tracing::info!(
            app = version.name,
            version = version.version,
            device = %identity,
            "starting"
        ),
        None => tracing::info!(app = version.name, version = version.version, "starting"),
    }

    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(config.store_dir()));
    let client = Arc::new(OAuthClient::new(OAuthSettings::from(&config)));
    let tokens = TokenManager::load(store, client.clone());
    let flow = Arc::new(
        AuthorizationFlow::new(client, Arc::new(LogBroadcaster)).with_policy(config.poll_policy()),
    );

    let (events, receiver) = event_bus(config.bus_capacity_bytes, config.publish_timeout());
    let relay = ConnectivityManager::new(
        Arc::new(WsConnector::new(config.heartbeat_interval())),
        TransportSink::new(events.clone()),
        config.relay_url_template.clone(),
    )
    .with_send_timeout(config.send_timeout());

    let shutdown = CancellationToken::new();
    let updater = Arc::new(HttpUpdateChecker::new(
        config.update_image_url.clone(),
        Arc::new(LogInstaller),
    ));
    let timers = Scheduler::new(config.token_refresh_period(), config.update_check_period())
        .spawn(events.clone(), updater, shutdown.clone());

    let orchestrator = Orchestrator::new(
        tokens,
        relay,
        flow,
        Arc::new(LogHandler),
        (events.clone(), receiver),
    )
    .with_consume_timeout(config.consume_timeout());

    if !events.publish(Event::Started).await.is_delivered() {
        return Err("could not queue the start event".into());
    }

    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        interrupt.cancel();
    });

    orchestrator.run(shutdown).await;
    timers.join().await;
    Ok(())
}

fn resolve_identity(config: &DeviceConfig) -> Option<DeviceIdentity> {
    let hardware_id = match &config.hardware_id {
        Some(raw) => parse_hardware_id(raw),
        None => read_interface_hardware_id(&config.network_interface),
    };
    match hardware_id {
        Ok(id) => Some(DeviceIdentity::from_hardware_id(id)),
        Err(err) => {
            tracing::warn!(error = %err, "hardware id unavailable, device identity unknown");
            None
        }
    }
}
