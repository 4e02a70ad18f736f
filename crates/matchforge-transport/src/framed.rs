//! Framed TCP server.
//!
//! Listens for raw TCP connections and splits each stream into
//! length-prefixed frames. Every accepted socket gets a reader task and a
//! writer task; decoded frame bodies flow to the owner over a single
//! event channel.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::{SessionHandle, SessionId, TransportError};

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Events delivered to the server's owner.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection was accepted.
    Connected(SessionHandle),
    /// A complete frame body (marker + opcode + payload) arrived.
    Frame { session: SessionId, body: Vec<u8> },
    /// The session is gone. Emitted exactly once per session.
    Disconnected(SessionId),
}

/// Cloneable control handle for a running [`FramedServer`].
#[derive(Clone)]
pub struct ServerHandle {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn session(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sends a frame to every open session except `exclude`.
    ///
    /// Iterates over a snapshot so sessions may connect or drop while the
    /// broadcast is in flight.
    pub fn broadcast(&self, frame: &[u8], exclude: Option<SessionId>) {
        let targets: Vec<SessionHandle> = self
            .sessions
            .iter()
            .filter(|entry| Some(*entry.key()) != exclude)
            .map(|entry| entry.value().clone())
            .collect();
        for session in targets {
            session.send(frame.to_vec());
        }
    }

    /// Stops accepting, closes every session, and lets `run` drain.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop.notify_one();
        for entry in self.sessions.iter() {
            entry.value().close();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// TCP listener producing framed sessions.
pub struct FramedServer {
    listener: TcpListener,
    events: mpsc::UnboundedSender<ServerEvent>,
    handle: ServerHandle,
}

impl FramedServer {
    /// Binds to the given address. Returns the server and the receiving
    /// end of its event channel.
    pub async fn bind(
        addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerEvent>), TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "listening");
        let (events, events_rx) = mpsc::unbounded_channel();
        let server = Self {
            listener,
            events,
            handle: ServerHandle {
                sessions: Arc::new(DashMap::new()),
                stop: Arc::new(Notify::new()),
                stopped: Arc::new(AtomicBool::new(false)),
            },
        };
        Ok((server, events_rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Bind)
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Accept loop. Runs until [`ServerHandle::shutdown`], then closes
    /// every session and awaits all per-connection tasks.
    pub async fn run(self) -> Result<(), TransportError> {
        let mut tasks = JoinSet::new();
        loop {
            let stop = self.handle.stop.notified();
            tokio::pin!(stop);
            if self.handle.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = &mut stop => break,
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(TransportError::Accept)?;
                    self.spawn_session(stream, peer, &mut tasks);
                }
            }
        }
        self.handle.shutdown();
        while tasks.join_next().await.is_some() {}
        tracing::info!("listener stopped");
        Ok(())
    }

    fn spawn_session(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        tasks: &mut JoinSet<()>,
    ) {
        let id = SessionId::new(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        let (session, outbound) = SessionHandle::new(id, Some(peer));
        self.handle.sessions.insert(id, session.clone());
        tracing::debug!(%id, %peer, "accepted connection");
        let _ = self.events.send(ServerEvent::Connected(session.clone()));

        let (read_half, write_half) = stream.into_split();
        tasks.spawn(write_loop(write_half, outbound, session.clone()));
        tasks.spawn(read_loop(
            read_half,
            session,
            Arc::clone(&self.handle.sessions),
            self.events.clone(),
        ));
    }
}

/// Drains the session's outbound queue into the socket. A write fault
/// closes the session; the reader task then reports the disconnect.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    session: SessionHandle,
) {
    loop {
        let shutdown = session.shared.shutdown.notified();
        tokio::pin!(shutdown);
        if session.is_closed() {
            break;
        }
        tokio::select! {
            _ = &mut shutdown => break,
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(error) = writer.write_all(&frame).await {
                        tracing::debug!(id = %session.id(), %error, "write fault");
                        session.close();
                        break;
                    }
                }
                None => break,
            },
        }
    }
    let _ = writer.shutdown().await;
}

/// Receive loop: the only suspension point per connection is waiting for
/// the next frame. Emits `Disconnected` exactly once on exit.
async fn read_loop(
    mut reader: OwnedReadHalf,
    session: SessionHandle,
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
    events: mpsc::UnboundedSender<ServerEvent>,
) {
    let id = session.id();
    loop {
        let shutdown = session.shared.shutdown.notified();
        tokio::pin!(shutdown);
        if session.is_closed() {
            break;
        }
        tokio::select! {
            _ = &mut shutdown => break,
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(body)) => {
                    let _ = events.send(ServerEvent::Frame { session: id, body });
                }
                Ok(None) => {
                    tracing::debug!(%id, "peer closed connection");
                    break;
                }
                Err(TransportError::FrameTooShort(declared)) => {
                    tracing::warn!(%id, declared, "frame length below minimum, closing");
                    break;
                }
                Err(error) => {
                    tracing::debug!(%id, %error, "receive fault");
                    break;
                }
            },
        }
    }
    session.close();
    sessions.remove(&id);
    let _ = events.send(ServerEvent::Disconnected(id));
}

/// Reads one frame. `Ok(None)` means the peer closed the stream at a
/// frame boundary.
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>, TransportError> {
    let mut prefix = [0u8; 2];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(TransportError::Receive(e)),
    }
    let declared = u16::from_le_bytes(prefix);
    if declared < 2 {
        return Err(TransportError::FrameTooShort(declared));
    }
    let mut body = vec![0u8; usize::from(declared) - 2];
    reader
        .read_exact(&mut body)
        .await
        .map_err(TransportError::Receive)?;
    Ok(Some(body))
}
