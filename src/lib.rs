//! Tether: the connectivity core of a cloud-controlled device.
//!
//! A single [`orchestrator::Orchestrator`] consumes a bounded [`bus`] of
//! device events and reacts to them: it runs the OAuth device-code login
//! ([`auth`]), keeps the token pair fresh, and holds one persistent relay
//! connection ([`relay`]) through which the cloud reaches the device.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::auth::{AuthorizationFlow, MemoryCredentialStore, OAuthClient, OAuthSettings, TokenManager};
//! use tether::beacon::LogBroadcaster;
//! use tether::bus::{event_bus, Event};
//! use tether::config::DeviceConfig;
//! use tether::device::LogHandler;
//! use tether::orchestrator::Orchestrator;
//! use tether::relay::{ConnectivityManager, TransportSink, WsConnector};
//!
//! # async fn example() {
//! let config = DeviceConfig::default();
//! let client = Arc::new(OAuthClient::new(OAuthSettings::from(&config)));
//! let tokens = TokenManager::load(Arc::new(MemoryCredentialStore::new()), client.clone());
//! let flow = Arc::new(AuthorizationFlow::new(client, Arc::new(LogBroadcaster)));
//! let (events, receiver) = event_bus(1000, config.publish_timeout());
//! let relay = ConnectivityManager::new(
//!     Arc::new(WsConnector::default()),
//!     TransportSink::new(events.clone()),
//!     config.relay_url_template.clone(),
//! );
//! let orchestrator = Orchestrator::new(tokens, relay, flow, Arc::new(LogHandler), (events.clone(), receiver));
//! let _ = events.publish(Event::Started).await;
//! orchestrator.run(tokio_util::sync::CancellationToken::new()).await;
//! # }
//! ```

pub mod auth;
pub mod beacon;
pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod relay;
pub mod schedule;

#[cfg(feature = "cli")]
pub mod cli;
