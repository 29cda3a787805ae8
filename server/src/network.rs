//! Server network layer handling WebSocket transports and the session loop

use crate::config::ServerConfig;
use crate::connection_registry::{ConnectionId, OUTBOUND_QUEUE_CAPACITY};
use crate::error::ServerError;
use crate::session::Session;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// How long a single outbound write may stall before the peer is dropped
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait for the peer's reply once the server has sent a close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Events sent from connection tasks to the session loop
#[derive(Debug)]
pub enum SessionEvent {
    Opened {
        connection_id: ConnectionId,
        addr: SocketAddr,
        sender: mpsc::Sender<Message>,
    },
    Frame {
        connection_id: ConnectionId,
        text: String,
    },
    /// Inbound traffic that carries no message, kept for idle detection
    Heartbeat {
        connection_id: ConnectionId,
    },
    Closed {
        connection_id: ConnectionId,
    },
}

/// Relay server: accepts WebSocket clients and runs the session loop
///
/// Connection tasks only move frames; every state change happens on the
/// task running [`Server::run`], one event at a time.
pub struct Server {
    listener: Arc<TcpListener>,
    config: ServerConfig,
    session: Session,

    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        info!(
            "Server listening on {} (path {})",
            listener.local_addr()?,
            config.path
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Arc::new(listener),
            session: Session::new(config.max_clients),
            config,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns task that accepts TCP connections and hands each one its own task
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let event_tx = self.event_tx.clone();
        let path: Arc<str> = Arc::from(self.config.path.as_str());

        tokio::spawn(async move {
            let mut next_connection_id: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let connection_id = next_connection_id;
                        next_connection_id += 1;

                        let event_tx = event_tx.clone();
                        let path = Arc::clone(&path);
                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, addr, connection_id, path, event_tx).await
                            {
                                warn!("Connection {} from {} failed: {}", connection_id, addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened {
                connection_id,
                addr,
                sender,
            } => {
                self.session.open(connection_id, addr, sender);
            }
            SessionEvent::Frame {
                connection_id,
                text,
            } => {
                self.session.handle_text(connection_id, &text);
            }
            SessionEvent::Heartbeat { connection_id } => {
                self.session.touch(connection_id);
            }
            SessionEvent::Closed { connection_id } => {
                self.session.close(connection_id);
            }
        }
    }

    /// Main server loop applying events in arrival order
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();

        let idle_timeout = self.config.idle_timeout;
        let mut sweep_interval = interval(Duration::from_secs(1));
        sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = sweep_interval.tick(), if idle_timeout.is_some() => {
                    if let Some(timeout) = idle_timeout {
                        let evicted = self.session.evict_idle(timeout);
                        if !evicted.is_empty() {
                            debug!("Evicted {} idle connections", evicted.len());
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Runs one client from handshake to close
///
/// Inbound text frames are forwarded to the session loop untouched. Outbound
/// frames arrive on a per-connection queue drained by a writer task; the
/// writer stops once the session drops its end of that queue, after a close
/// frame, or when the peer stops accepting writes. When the writer stops
/// first the peer gets [`CLOSE_GRACE`] to answer, then the socket is dropped.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    path: Arc<str>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
) -> Result<(), ServerError> {
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        if request.uri().path() == &*path {
            Ok(response)
        } else {
            debug!(
                "Rejecting upgrade from {} for path {}",
                addr,
                request.uri().path()
            );
            let mut rejection: ErrorResponse =
                ErrorResponse::new(Some(format!("No endpoint at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    })
    .await?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);

    event_tx
        .send(SessionEvent::Opened {
            connection_id,
            addr,
            sender: out_tx,
        })
        .map_err(|_| ServerError::SessionClosed)?;

    let mut writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let closing = message.is_close();
            match timeout(WRITE_TIMEOUT, ws_sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to connection {} failed: {}", connection_id, e);
                    break;
                }
                Err(_) => {
                    warn!(
                        "Connection {} stopped reading for {:?}, dropping it",
                        connection_id, WRITE_TIMEOUT
                    );
                    break;
                }
            }
            if closing {
                break;
            }
        }
        let _ = timeout(CLOSE_GRACE, ws_sender.close()).await;
    });

    let mut writer_finished = false;
    loop {
        let frame = tokio::select! {
            frame = ws_receiver.next() => frame,
            _ = &mut writer => {
                writer_finished = true;
                break;
            }
        };

        let event = match frame {
            Some(Ok(Message::Text(text))) => SessionEvent::Frame {
                connection_id,
                text: text.as_str().to_owned(),
            },
            Some(Ok(Message::Binary(data))) => {
                warn!(
                    "Dropping {} byte binary frame from connection {}",
                    data.len(),
                    connection_id
                );
                SessionEvent::Heartbeat { connection_id }
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                SessionEvent::Heartbeat { connection_id }
            }
            Some(Ok(Message::Close(_))) => {
                debug!("Client {} requested close", connection_id);
                break;
            }
            Some(Ok(Message::Frame(_))) => continue,
            Some(Err(e)) => {
                debug!("Read from connection {} failed: {}", connection_id, e);
                break;
            }
            None => break,
        };

        if event_tx.send(event).is_err() {
            break;
        }
    }

    if writer_finished {
        let answered = timeout(CLOSE_GRACE, async {
            while let Some(Ok(frame)) = ws_receiver.next().await {
                if frame.is_close() {
                    break;
                }
            }
        })
        .await;
        if answered.is_err() {
            debug!(
                "Connection {} did not answer close within {:?}",
                connection_id, CLOSE_GRACE
            );
        }
    }

    let _ = event_tx.send(SessionEvent::Closed { connection_id });
    if !writer_finished {
        let _ = writer.await;
    }
    Ok(())
}
