//! WebSocket Stream Server
//!
//! Async WebSocket server for stream subscribers.
//! Each connection owns at most one active stream and can read or append
//! to the shared dataset.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::config::ServerConfig;
use crate::network::protocol::{AddValuesRequest, ClientMessage, ErrorCode, MultiplierInput, ServerMessage};
use crate::stats::summarize;
use crate::store::{add_crash, JsonFileStore, SampleStore, WEB_LABEL};
use crate::stream::{start_stream, StreamEvent, StreamHandle};

/// Messages buffered per connection before the sender task.
const OUTBOUND_BUFFER: usize = 64;

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Id of the active stream, if any.
    stream_id: Option<String>,
}

type ClientMap = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The stream server.
pub struct CrashServer {
    /// Server configuration.
    config: ServerConfig,
    /// Shared dataset.
    store: Arc<dyn SampleStore>,
    /// Connected clients.
    clients: ClientMap,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl CrashServer {
    /// Create a server over `store`.
    pub fn new(config: ServerConfig, store: Arc<dyn SampleStore>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            store,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Create a server over the JSON dataset in the configured data directory.
    pub fn with_json_store(config: ServerConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(config.data.data_dir.clone()));
        Self::new(config, store)
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Crash stream server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                tokio::spawn(async move {
                                    if let Err(e) = reject_connection(stream).await {
                                        debug!("Rejecting {} failed: {}", addr, e);
                                    }
                                });
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let store = self.store.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    connected_at: Instant::now(),
                    stream_id: None,
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            let mut active: Option<StreamHandle> = None;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    addr,
                                    client_msg,
                                    &mut active,
                                    &clients,
                                    &store,
                                    &config,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    event = next_stream_event(&mut active) => {
                        match event {
                            Some(event) => {
                                if msg_tx.send(ServerMessage::Event { event }).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                debug!("Stream for {} ended", addr);
                                active = None;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            if let Some(handle) = active.take() {
                handle.cancel().await;
            }
            drop(msg_tx);
            let _ = sender_task.await;

            let connected_for = {
                let mut clients = clients.write().await;
                clients.remove(&addr).map(|c| c.connected_at.elapsed())
            };

            info!("Client {} cleaned up after {:?}", addr, connected_for.unwrap_or_default());
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        active: &mut Option<StreamHandle>,
        clients: &ClientMap,
        store: &Arc<dyn SampleStore>,
        config: &ServerConfig,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::Subscribe { stream } => {
                if let Some(previous) = active.take() {
                    previous.cancel().await;
                }

                let reply = match stream.into_config(&config.stream) {
                    Ok(stream_config) => {
                        *active = Some(start_stream(&stream_config, store.clone()));
                        let stream_id = stream_config.stream_id.to_string();
                        Self::set_stream_id(clients, addr, Some(stream_id.clone())).await;
                        ServerMessage::Subscribed {
                            stream_id,
                            flavor: stream_config.flavor,
                        }
                    }
                    Err(e) => {
                        debug!("Rejected stream request from {}: {}", addr, e);
                        Self::set_stream_id(clients, addr, None).await;
                        ServerMessage::Event {
                            event: StreamEvent::error(e.to_string()),
                        }
                    }
                };
                let _ = sender.send(reply).await;
            }
            ClientMessage::Unsubscribe => {
                if let Some(previous) = active.take() {
                    previous.cancel().await;
                }
                Self::set_stream_id(clients, addr, None).await;
                let _ = sender.send(ServerMessage::Unsubscribed).await;
            }
            ClientMessage::AddCrash { value } => {
                let _ = sender.send(add_crash_reply(store.as_ref(), &value)).await;
            }
            ClientMessage::AddValues(request) => {
                let _ = sender.send(add_values_reply(store.as_ref(), &request)).await;
            }
            ClientMessage::Summary => {
                let stats = summarize(&store.load_sample());
                let _ = sender.send(ServerMessage::Summary(stats)).await;
            }
            ClientMessage::ListDatasets => {
                let _ = sender.send(ServerMessage::Datasets(store.list_datasets())).await;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64,
                }).await;
            }
        }
    }

    async fn set_stream_id(clients: &ClientMap, addr: SocketAddr, stream_id: Option<String>) {
        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(&addr) {
            client.stream_id = stream_id;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get the number of connections with an active stream.
    pub async fn stream_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.stream_id.is_some())
            .count()
    }
}

/// Next event of the active stream; pending forever when there is none.
async fn next_stream_event(active: &mut Option<StreamHandle>) -> Option<StreamEvent> {
    match active {
        Some(handle) => handle.next_event().await,
        None => std::future::pending().await,
    }
}

/// Complete the handshake only to tell the client the server is full.
async fn reject_connection(stream: TcpStream) -> Result<(), ServerError> {
    let mut ws = accept_async(stream).await?;
    let msg = ServerMessage::error(
        ErrorCode::ServerOverloaded,
        ServerError::ConnectionLimitReached.to_string(),
    );
    if let Ok(text) = msg.to_json() {
        ws.send(Message::Text(text)).await?;
    }
    ws.close(None).await?;
    Ok(())
}

/// Reply to a manual crash entry.
fn add_crash_reply(store: &dyn SampleStore, value: &MultiplierInput) -> ServerMessage {
    let value = match value.parse() {
        Ok(v) => v,
        Err(e) => return ServerMessage::error(ErrorCode::InvalidMultiplier, e.to_string()),
    };
    match add_crash(store, value) {
        Ok(_) => ServerMessage::Added {
            added: 1,
            file: None,
            main: store.list_datasets().main,
        },
        Err(e) => {
            warn!("Failed to record manual crash {}: {}", value, e);
            ServerMessage::error(ErrorCode::StorageFault, e.to_string())
        }
    }
}

/// Reply to a bulk append.
fn add_values_reply(store: &dyn SampleStore, request: &AddValuesRequest) -> ServerMessage {
    let Some(values) = request.candidates() else {
        return ServerMessage::error(ErrorCode::InvalidInput, "Provide values or text");
    };
    let label = request
        .session
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(WEB_LABEL);

    match store.append_batch(&values, label) {
        Ok(receipt) => ServerMessage::Added {
            added: receipt.added,
            file: receipt.file,
            main: store.list_datasets().main,
        },
        Err(e) => {
            warn!("Failed to append {} values: {}", values.len(), e);
            ServerMessage::error(ErrorCode::StorageFault, e.to_string())
        }
    }
}
