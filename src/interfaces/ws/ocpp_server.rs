//! OCPP 1.6 WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/.../{station_id}`
//! (the station ID is the last non-empty path segment). The handshake
//! negotiates the `ocpp1.6` subprotocol (`ocpp1.6.1` also accepted) and
//! rejects upgrades without a station ID or a mutually-supported protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::commands::SharedCommandSender;
use crate::config::AppConfig;
use crate::ocpp::{OcppContext, OcppHandler};
use crate::session::connection::{
    CLOSE_GOING_AWAY, CLOSE_OVERLOADED, CLOSE_PROTOCOL_ERROR, CLOSE_UNSUPPORTED_DATA,
};
use crate::session::{Outbound, SendError, SharedSessionRegistry};
use crate::support::shutdown::ShutdownSignal;

/// Subprotocols this Central System accepts, in preference order.
const SUBPROTOCOLS: [&str; 2] = ["ocpp1.6", "ocpp1.6.1"];

/// OCPP WebSocket server
pub struct OcppServer {
    config: AppConfig,
    ctx: Arc<OcppContext>,
    sessions: SharedSessionRegistry,
    command_sender: SharedCommandSender,
    shutdown_signal: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(
        config: AppConfig,
        ctx: Arc<OcppContext>,
        sessions: SharedSessionRegistry,
        command_sender: SharedCommandSender,
    ) -> Self {
        Self {
            config,
            ctx,
            sessions,
            command_sender,
            shutdown_signal: None,
        }
    }

    /// Set the shutdown signal for graceful shutdown
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown_signal = Some(signal);
        self
    }

    /// Start the WebSocket server
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.server.listen_addr();
        let listener = TcpListener::bind(&addr).await?;

        info!("🔌 OCPP 1.6 Central System listening on ws://{}", addr);
        info!("   Charge points connect to: ws://{}/{{station_id}}", addr);

        if let Some(ref shutdown) = self.shutdown_signal {
            self.run_with_shutdown(listener, shutdown.clone()).await
        } else {
            self.run_loop(listener).await
        }
    }

    async fn run_loop(
        &self,
        listener: TcpListener,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        while let Ok((stream, addr)) = listener.accept().await {
            self.spawn_connection(stream, addr);
        }
        Ok(())
    }

    async fn run_with_shutdown(
        &self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.spawn_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown.notified().wait() => {
                    info!("🛑 OCPP server received shutdown signal");
                    self.graceful_shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let ctx = self.ctx.clone();
        let sessions = self.sessions.clone();
        let command_sender = self.command_sender.clone();
        let shutdown = self.shutdown_signal.clone();
        let ping_interval = self.config.ocpp.ping_interval;
        let queue_capacity = self.config.ocpp.max_outbound_queue;

        tokio::spawn(async move {
            if let Err(e) = handle_connection(
                stream,
                addr,
                ctx,
                sessions,
                command_sender,
                shutdown,
                ping_interval,
                queue_capacity,
            )
            .await
            {
                warn!("Connection error from {}: {}", addr, e);
            }
        });
    }

    async fn graceful_shutdown(&self) {
        let connected = self.sessions.connected_ids();
        if !connected.is_empty() {
            info!("Closing {} charge point connections...", connected.len());
            for station_id in &connected {
                self.sessions
                    .request_close(station_id, CLOSE_GOING_AWAY, "server shutting down");
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        self.command_sender.cancel_all();
        info!("✅ OCPP server shutdown complete");
    }
}

/// Last non-empty path segment, the station ID.
fn extract_station_id(path: &str) -> Option<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Pick the subprotocol to echo, `ocpp1.6` preferred.
fn negotiate_subprotocol(offered: &str) -> Option<&'static str> {
    let requested: Vec<&str> = offered.split(',').map(str::trim).collect();
    SUBPROTOCOLS
        .iter()
        .copied()
        .find(|candidate| requested.iter().any(|p| p == candidate))
}

fn reject(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}

/// Handle a single charge point connection
#[allow(clippy::too_many_arguments)]
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: Arc<OcppContext>,
    sessions: SharedSessionRegistry,
    command_sender: SharedCommandSender,
    shutdown: Option<ShutdownSignal>,
    ping_interval: u64,
    queue_capacity: usize,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut station_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();
            debug!("WebSocket handshake from {}, path: {}", addr, path);

            let Some(id) = extract_station_id(path) else {
                warn!("Rejecting {}: no station ID in path {}", addr, path);
                return Err(reject(StatusCode::BAD_REQUEST, "station ID missing in path"));
            };

            let offered = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            let Some(protocol) = negotiate_subprotocol(offered) else {
                warn!(
                    "Rejecting {}: no mutual subprotocol (offered: {:?})",
                    addr, offered
                );
                return Err(reject(
                    StatusCode::BAD_REQUEST,
                    "Sec-WebSocket-Protocol must include ocpp1.6",
                ));
            };

            // Echo the negotiated subprotocol
            response.headers_mut().insert(
                "Sec-WebSocket-Protocol",
                protocol.parse().expect("static subprotocol is a valid header value"),
            );

            station_id = Some(id);
            Ok(response)
        },
    )
    .await?;

    let Some(station_id) = station_id else {
        // Unreachable: a successful handshake always set the ID.
        return Ok(());
    };

    info!("[{}] Connected from {}", station_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<Outbound>(queue_capacity);
    let alive = Arc::new(AtomicBool::new(true));

    let registration = sessions.register(&station_id, tx.clone(), alive.clone(), Utc::now());
    ctx.charge_points.mark_connected(&station_id, true);

    let handler = OcppHandler::new(station_id.clone(), ctx.clone(), command_sender.clone());

    // Outgoing sender task: the only writer, so frames never interleave.
    let send_station = station_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(msg) => {
                    debug!("[{}] -> {}", send_station, msg);
                    if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                        warn!("[{}] Send error: {}", send_station, e);
                        break;
                    }
                }
                Outbound::Ping => {
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    info!("[{}] Closing connection: {} ({})", send_station, code, reason);
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: code.into(),
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Liveness: queue a ping each tick; a tick without an interleaving
    // pong terminates the connection.
    let ping_tx = tx.clone();
    let ping_alive = alive.clone();
    let ping_station = station_id.clone();
    let ping_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(ping_interval.max(1)));
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            if !ping_alive.swap(false, Ordering::SeqCst) {
                warn!("[{}] Missed pong, terminating", ping_station);
                let _ = ping_tx.try_send(Outbound::Close {
                    code: CLOSE_GOING_AWAY,
                    reason: "ping timeout",
                });
                break;
            }
            if ping_tx.try_send(Outbound::Ping).is_err() {
                break;
            }
        }
    });

    // Receive loop: frames are processed in arrival order; replies go out
    // on this connection's own queue.
    let recv_station = station_id.clone();
    let recv_alive = alive.clone();
    let recv_tx = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!("[{}] <- {}", recv_station, text);
                    match handler.handle(&text).await {
                        Ok(Some(reply)) => {
                            match recv_tx.try_send(Outbound::Frame(reply)) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    // A response must not be dropped; the
                                    // slow consumer loses the connection.
                                    error!(
                                        "[{}] Outbound queue overflow ({})",
                                        recv_station,
                                        SendError::QueueFull
                                    );
                                    let _ = recv_tx.try_send(Outbound::Close {
                                        code: CLOSE_OVERLOADED,
                                        reason: "outbound queue overflow",
                                    });
                                    break;
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => break,
                            }
                        }
                        Ok(None) => {}
                        Err(frame_error) => {
                            warn!("[{}] Framing violation: {}", recv_station, frame_error);
                            let _ = recv_tx.try_send(Outbound::Close {
                                code: CLOSE_PROTOCOL_ERROR,
                                reason: "malformed OCPP frame",
                            });
                            break;
                        }
                    }
                }
                Ok(Message::Binary(data)) => {
                    warn!("[{}] Binary frame ({} bytes), closing", recv_station, data.len());
                    let _ = recv_tx.try_send(Outbound::Close {
                        code: CLOSE_UNSUPPORTED_DATA,
                        reason: "binary frames not supported",
                    });
                    break;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is queued automatically by tungstenite
                }
                Ok(Message::Pong(_)) => {
                    recv_alive.store(true, Ordering::SeqCst);
                }
                Ok(Message::Close(frame)) => {
                    info!("[{}] Close frame received: {:?}", recv_station, frame);
                    break;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!("[{}] WebSocket error: {}", recv_station, e);
                    break;
                }
            }
        }
    });

    // Wait for either pump to finish, or shutdown.
    if let Some(shutdown) = shutdown {
        tokio::select! {
            _ = &mut send_task => {},
            _ = &mut recv_task => {},
            _ = shutdown.notified().wait() => {
                info!("[{}] Connection closing due to server shutdown", station_id);
            }
        }
    } else {
        tokio::select! {
            _ = &mut send_task => {},
            _ = &mut recv_task => {},
        }
    }

    // Closing the connection cancels its receive, send and liveness tasks.
    send_task.abort();
    recv_task.abort();
    ping_task.abort();
    drop(tx);

    // Guarded against takeover: an evicted connection's cleanup must not
    // tear down its successor or cancel its pending calls.
    if sessions.unregister_if(&station_id, registration.seq) {
        ctx.charge_points.mark_connected(&station_id, false);
        command_sender.cancel_for_station(&station_id);
    }

    info!("[{}] Disconnected", station_id);

    Ok(())
}
