//! Transport session abstraction for the realtime service.
//!
//! A transport is a bidirectional channel: encoded frames go out, events
//! come back over a crossbeam channel. Exactly one terminal event
//! (`Closed` or `Failed`) is delivered per session, never both, and no
//! event follows it.

use crate::config::SessionConfig;
use crate::error::Result;
use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Events delivered by a transport session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished; the session is live.
    Opened,
    /// One inbound PCM16 payload at the playback rate.
    Audio(Vec<u8>),
    /// The service finished a response turn.
    TurnComplete,
    /// The service announced it will close the connection.
    GoAway { reason: String },
    /// Terminal: the session closed cleanly.
    Closed,
    /// Terminal: the session failed. No further events follow.
    Failed(String),
}

impl TransportEvent {
    /// True for events that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed | TransportEvent::Failed(_))
    }
}

/// Factory for transport sessions.
pub trait Transport: Send + Sync {
    /// Establish a session, delivering events to `events`.
    ///
    /// # Errors
    /// Returns `VoxlinkError::Connection` when authentication or network
    /// setup fails.
    fn connect(
        &self,
        config: &SessionConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>>;
}

/// One live bidirectional session.
pub trait TransportSession: Send + Sync {
    /// Queue one encoded frame for sending.
    ///
    /// Fire-and-forget: there is no backpressure signal, and frames are
    /// dropped when the send queue is saturated.
    fn send_frame(&self, frame: &[u8]);

    /// Close the session. Idempotent: closing an already-closed session
    /// is a no-op.
    fn close(&self);

    /// True until the session is closed or has failed.
    fn is_open(&self) -> bool;
}

/// Shared state behind the mock transport and its sessions.
#[derive(Debug)]
struct MockTransportState {
    fail_connect: bool,
    auto_open: bool,
    sent: Mutex<Vec<Vec<u8>>>,
    events: Mutex<Option<Sender<TransportEvent>>>,
    open: AtomicBool,
    terminal_sent: AtomicBool,
    close_count: AtomicUsize,
}

impl MockTransportState {
    fn emit(&self, event: TransportEvent) {
        if self.terminal_sent.load(Ordering::SeqCst) {
            return;
        }
        if event.is_terminal() {
            if self.terminal_sent.swap(true, Ordering::SeqCst) {
                return;
            }
            self.open.store(false, Ordering::SeqCst);
        }
        if let Ok(guard) = self.events.lock()
            && let Some(tx) = guard.as_ref()
        {
            let _send_result = tx.send(event);
        }
    }
}

/// Mock transport for testing.
///
/// Emits `Opened` on connect by default; tests drive further inbound
/// events through the [`MockTransportHandle`] and inspect what was sent.
pub struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockTransportState {
                fail_connect: false,
                auto_open: true,
                sent: Mutex::new(Vec::new()),
                events: Mutex::new(None),
                open: AtomicBool::new(false),
                terminal_sent: AtomicBool::new(false),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Configure `connect` to fail.
    pub fn with_connect_failure(self) -> Self {
        Self {
            state: Arc::new(MockTransportState {
                fail_connect: true,
                auto_open: false,
                sent: Mutex::new(Vec::new()),
                events: Mutex::new(None),
                open: AtomicBool::new(false),
                terminal_sent: AtomicBool::new(false),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Suppress the automatic `Opened` event, keeping the session in its
    /// connecting phase until the test opens it explicitly.
    pub fn without_auto_open(self) -> Self {
        Self {
            state: Arc::new(MockTransportState {
                fail_connect: false,
                auto_open: false,
                sent: Mutex::new(Vec::new()),
                events: Mutex::new(None),
                open: AtomicBool::new(false),
                terminal_sent: AtomicBool::new(false),
                close_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Handle for driving and inspecting the transport from a test.
    pub fn handle(&self) -> MockTransportHandle {
        MockTransportHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn connect(
        &self,
        _config: &SessionConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>> {
        if self.state.fail_connect {
            return Err(crate::error::VoxlinkError::Connection {
                message: "mock connect failure".to_string(),
            });
        }

        if let Ok(mut guard) = self.state.events.lock() {
            *guard = Some(events);
        }
        self.state.open.store(true, Ordering::SeqCst);
        self.state.terminal_sent.store(false, Ordering::SeqCst);

        if self.state.auto_open {
            self.state.emit(TransportEvent::Opened);
        }

        Ok(Box::new(MockTransportSession {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Driving/inspection handle for a [`MockTransport`].
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<MockTransportState>,
}

impl MockTransportHandle {
    /// Deliver an inbound event, honoring the at-most-once terminal rule.
    pub fn emit(&self, event: TransportEvent) {
        self.state.emit(event);
    }

    /// Frames sent so far, in capture order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state
            .sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Number of close() calls observed across sessions.
    pub fn close_count(&self) -> usize {
        self.state.close_count.load(Ordering::SeqCst)
    }

    /// True while the current session is open.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}

struct MockTransportSession {
    state: Arc<MockTransportState>,
}

impl TransportSession for MockTransportSession {
    fn send_frame(&self, frame: &[u8]) {
        if !self.state.open.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut sent) = self.state.sent.lock() {
            sent.push(frame.to_vec());
        }
    }

    fn close(&self) {
        self.state.close_count.fetch_add(1, Ordering::SeqCst);
        if self.state.open.swap(false, Ordering::SeqCst) {
            self.state.emit(TransportEvent::Closed);
        }
    }

    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::SeqCst)
    }
}
