//! WebSocket relay transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{RelayConnector, RelayLink, TransportNotice, TransportSink};
use crate::error::TetherError;

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type RelayWriter = Arc<Mutex<SplitSink<RelaySocket, Message>>>;

const CLOSE_GRACE: Duration = Duration::from_millis(100);

/// Connects to the relay with tokio-tungstenite and pings on a fixed period.
#[derive(Debug, Clone)]
pub struct WsConnector {
    heartbeat_interval: Duration,
}

impl WsConnector {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        sink: TransportSink,
    ) -> Result<Box<dyn RelayLink>, TetherError> {
        let (socket, _) = connect_async(url).await.map_err(map_connect_error)?;
        let (write, read) = socket.split();
        let writer: RelayWriter = Arc::new(Mutex::new(write));
        let connected = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let _ = sink.notify(TransportNotice::Connected).await;
        let task = tokio::spawn(run_reader(
            read,
            writer.clone(),
            sink,
            shutdown_rx,
            connected.clone(),
            self.heartbeat_interval,
        ));

        Ok(Box::new(WsLink {
            writer,
            connected,
            shutdown_tx,
            task: Some(task),
        }))
    }
}

struct WsLink {
    writer: RelayWriter,
    connected: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl RelayLink for WsLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn send_text(&mut self, text: &str) -> Result<(), TetherError> {
        if !self.is_connected() {
            return Err(TetherError::Transport("relay link is closed".to_string()));
        }
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| TetherError::Transport(format!("relay send failed: {error}")))
    }

    async fn close(&mut self) -> Result<(), TetherError> {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
        if let Some(mut task) = self.task.take() {
            if time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        Ok(())
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = self.shutdown_tx.send(true);
            task.abort();
        }
    }
}

async fn run_reader(
    mut read: SplitStream<RelaySocket>,
    writer: RelayWriter,
    sink: TransportSink,
    mut shutdown_rx: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    heartbeat_interval: Duration,
) {
    let mut heartbeat = time::interval(heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = writer.lock().await.send(Message::Close(None)).await;
                    return;
                }
            }
            _ = heartbeat.tick() => {
                if let Err(error) = writer.lock().await.send(Message::Ping(Default::default())).await {
                    let _ = sink.notify(TransportNotice::Error(format!("heartbeat failed: {error}"))).await;
                }
            }
            frame = read.next() => {
                let notice = match frame {
                    Some(Ok(Message::Text(text))) => TransportNotice::Text(text.to_string()),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|frame| u16::from(frame.code));
                        tracing::info!(code = ?code, "relay closed the connection");
                        connected.store(false, Ordering::Release);
                        let _ = sink.notify(TransportNotice::Closed { code }).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(error)) => {
                        connected.store(false, Ordering::Release);
                        let _ = sink.notify(TransportNotice::Error(error.to_string())).await;
                        return;
                    }
                    None => {
                        connected.store(false, Ordering::Release);
                        let _ = sink.notify(TransportNotice::Closed { code: None }).await;
                        return;
                    }
                };
                let _ = sink.notify(notice).await;
            }
        }
    }
}

fn map_connect_error(error: WsError) -> TetherError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            TetherError::http(status, format!("relay handshake failed with status {status}"))
        }
        WsError::Io(error) => TetherError::Io(error),
        WsError::Url(error) => TetherError::Configuration(format!("invalid relay url: {error}")),
        other => TetherError::Transport(format!("relay connect failed: {other}")),
    }
}
