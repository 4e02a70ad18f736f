//! Per-connection send handle.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Notify;

use crate::SessionId;

pub(crate) struct SessionShared {
    pub(crate) id: SessionId,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) outbound: mpsc::UnboundedSender<Vec<u8>>,
    pub(crate) closed: AtomicBool,
    pub(crate) shutdown: Notify,
}

/// Cheap cloneable handle to one live session.
///
/// `send` is synchronous: frames are queued on an unbounded channel and
/// drained by the session's writer task, so callers may send while
/// holding locks. After [`close`](SessionHandle::close) every send is a
/// silent no-op.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: SessionId,
        peer: Option<SocketAddr>,
    ) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            shared: Arc::new(SessionShared {
                id,
                peer,
                outbound: tx,
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        };
        (handle, rx)
    }

    /// A handle backed by an in-process pipe instead of a socket.
    ///
    /// Frames sent through the handle appear on the returned receiver.
    /// Used by services and tests that need session plumbing without
    /// networking.
    pub fn piped(id: SessionId) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        Self::new(id, None)
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.peer
    }

    /// Queues a frame for delivery. No-op once the session is closed.
    pub fn send(&self, frame: Vec<u8>) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        // The writer task only stops after `closed` is set, so a failed
        // send here just means we raced a close.
        let _ = self.shared.outbound.send(frame);
    }

    /// Closes the session. Safe to call any number of times; only the
    /// first call has an effect.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.shutdown.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
