//! Session lifecycle: capture → encode → transport, transport → decode →
//! playback.
//!
//! One controller owns at most one live session. All mutable session state
//! (transport handle, scheduler cursor, worker threads) hangs off the
//! controller instance; nothing is process-global.

use crate::audio::pcm::{decode_frame, encode_frame};
use crate::audio::source::AudioSource;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::defaults::{EVENT_BUFFER, TEARDOWN_DEADLINE};
use crate::error::{Result, VoxlinkError};
use crate::playback::output::AudioSink;
use crate::playback::scheduler::PlaybackScheduler;
use crate::report::{ErrorReporter, LogReporter};
use crate::transport::session::{Transport, TransportEvent, TransportSession};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle states of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No resources held.
    Idle,
    /// Capture acquired, transport handshake in flight.
    Connecting,
    /// Session live: frames flowing both ways.
    Open,
    /// Teardown in progress.
    Closing,
}

/// Non-terminal session notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessage {
    /// The service finished a response turn.
    TurnComplete,
    /// The service announced it will close the connection.
    GoAway { reason: String },
}

/// Notifications delivered to the host over its event channel.
///
/// Exactly one terminal event (`Closed` or `Error`) is delivered per
/// session; an `Error` never follows a `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The session handshake completed.
    Opened,
    /// A non-audio message from the service.
    Message(SessionMessage),
    /// Terminal: the session ended cleanly.
    Closed,
    /// Terminal: the session ended with a failure.
    Error(String),
}

/// Resources of one live session.
struct LiveSession {
    running: Arc<AtomicBool>,
    transport: Arc<dyn TransportSession>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    threads: Vec<JoinHandle<()>>,
}

/// Owns the session lifecycle: `Idle → Connecting → Open → Closing → Idle`,
/// with a direct drop to `Idle` when the transport fails.
pub struct SessionController {
    config: Config,
    transport: Box<dyn Transport>,
    event_tx: Option<Sender<BridgeEvent>>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SessionState>>,
    terminal_sent: Arc<AtomicBool>,
    live: Option<LiveSession>,
}

impl SessionController {
    /// Creates an idle controller over the given transport.
    pub fn new(config: Config, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            event_tx: None,
            reporter: Arc::new(LogReporter),
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            terminal_sent: Arc::new(AtomicBool::new(false)),
            live: None,
        }
    }

    /// Sets the channel host notifications are delivered on.
    pub fn with_event_sender(mut self, events: Sender<BridgeEvent>) -> Self {
        self.event_tx = Some(events);
        self
    }

    /// Sets a custom error reporter for worker-thread problems.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Sets a custom clock (for deterministic testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(SessionState::Idle)
    }

    /// Start a session: acquire capture, connect the transport and wire
    /// both directions.
    ///
    /// Acquiring the capture device is visible to the user (the OS
    /// microphone indicator); that is inherent, not suppressible.
    ///
    /// # Errors
    /// - `AlreadyActive` when a session is live; the running session is
    ///   unaffected and no event is emitted.
    /// - `AudioCapture`/`AudioDeviceNotFound` when the capture device
    ///   cannot be acquired.
    /// - `Connection` when the transport handshake fails. Partially
    ///   acquired resources are released before returning.
    pub fn start(
        &mut self,
        mut source: Box<dyn AudioSource>,
        sink: Box<dyn AudioSink>,
    ) -> Result<()> {
        if self.state() != SessionState::Idle {
            return Err(VoxlinkError::AlreadyActive);
        }
        self.reap();
        self.config.validate()?;

        self.terminal_sent.store(false, Ordering::SeqCst);
        self.set_state(SessionState::Connecting);

        if let Err(e) = source.start() {
            self.set_state(SessionState::Idle);
            self.emit_terminal(BridgeEvent::Error(e.to_string()));
            return Err(e);
        }

        let (transport_tx, transport_rx) = bounded(EVENT_BUFFER);
        let session = match self.transport.connect(&self.config.session, transport_tx) {
            Ok(session) => session,
            Err(e) => {
                if let Err(stop_err) = source.stop() {
                    self.reporter.report("capture", &stop_err);
                }
                self.set_state(SessionState::Idle);
                self.emit_terminal(BridgeEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        let session: Arc<dyn TransportSession> = Arc::from(session);

        let scheduler = Arc::new(Mutex::new(PlaybackScheduler::new(
            sink,
            Arc::clone(&self.clock),
        )));
        let running = Arc::new(AtomicBool::new(true));

        let capture_handle = self.spawn_capture(source, Arc::clone(&session), Arc::clone(&running));
        let pump_handle = self.spawn_pump(
            transport_rx,
            Arc::clone(&session),
            Arc::clone(&scheduler),
            Arc::clone(&running),
        );

        self.live = Some(LiveSession {
            running,
            transport: session,
            scheduler,
            threads: vec![capture_handle, pump_handle],
        });
        Ok(())
    }

    /// Stop the session and release every resource.
    ///
    /// Valid in any state; when `Idle` it is a no-op and no event fires.
    /// Safe to call mid-connect. Teardown is best-effort: each release
    /// step runs even if an earlier one failed.
    pub fn stop(&mut self) {
        if self.state() == SessionState::Idle {
            // A transport-initiated teardown may have left finished worker
            // threads behind; collect them, fire nothing.
            self.reap();
            return;
        }
        self.set_state(SessionState::Closing);

        let Some(live) = self.live.take() else {
            self.set_state(SessionState::Idle);
            return;
        };

        live.running.store(false, Ordering::SeqCst);
        live.transport.close();

        join_with_deadline(live.threads, TEARDOWN_DEADLINE);

        if let Ok(mut scheduler) = live.scheduler.lock() {
            scheduler.stop_all();
        }

        self.set_state(SessionState::Idle);
        self.emit_terminal(BridgeEvent::Closed);
    }

    /// Capture poll loop: read a chunk, encode it, hand it to the
    /// transport. Runs until stopped or the source is exhausted, then
    /// releases the device.
    fn spawn_capture(
        &self,
        mut source: Box<dyn AudioSource>,
        session: Arc<dyn TransportSession>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let poll_interval = Duration::from_millis(self.config.audio.poll_interval_ms);
        let reporter = Arc::clone(&self.reporter);

        thread::spawn(move || {
            const MAX_CONSECUTIVE_ERRORS: u32 = 10;
            let mut consecutive_errors: u32 = 0;
            let source_is_finite = source.is_finite();

            while running.load(Ordering::SeqCst) {
                let samples = match source.read_samples() {
                    Ok(samples) => {
                        consecutive_errors = 0;
                        samples
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            reporter.report("capture", &e);
                            break;
                        }
                        thread::sleep(poll_interval);
                        continue;
                    }
                };

                if samples.is_empty() {
                    if source_is_finite {
                        // File source exhausted; the session stays up for
                        // inbound audio.
                        break;
                    }
                    // Live microphone: empty reads are normal while the
                    // device spins up.
                    thread::sleep(poll_interval);
                    continue;
                }

                // Synchronous per chunk, in capture order.
                session.send_frame(&encode_frame(&samples));
                thread::sleep(poll_interval);
            }

            if let Err(e) = source.stop() {
                reporter.report("capture", &e);
            }
        })
    }

    /// Single consumer of the transport event channel: decodes inbound
    /// audio into the scheduler and relays session signals to the host.
    fn spawn_pump(
        &self,
        transport_rx: Receiver<TransportEvent>,
        session: Arc<dyn TransportSession>,
        scheduler: Arc<Mutex<PlaybackScheduler>>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let events = self.event_tx.clone();
        let reporter = Arc::clone(&self.reporter);
        let state = Arc::clone(&self.state);
        let terminal_sent = Arc::clone(&self.terminal_sent);

        thread::spawn(move || {
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let event = match transport_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                match event {
                    TransportEvent::Opened => {
                        set_state_in(&state, SessionState::Open);
                        emit(&events, BridgeEvent::Opened);
                    }
                    TransportEvent::Audio(pcm) => {
                        let samples = decode_frame(&pcm);
                        if let Ok(mut scheduler) = scheduler.lock()
                            && let Err(e) = scheduler.schedule(samples)
                        {
                            reporter.report("playback", &e);
                        }
                    }
                    TransportEvent::TurnComplete => {
                        emit(
                            &events,
                            BridgeEvent::Message(SessionMessage::TurnComplete),
                        );
                    }
                    TransportEvent::GoAway { reason } => {
                        emit(
                            &events,
                            BridgeEvent::Message(SessionMessage::GoAway { reason }),
                        );
                    }
                    TransportEvent::Failed(message) => {
                        // Same teardown path as stop(), surfaced as an
                        // error instead of a clean close.
                        running.store(false, Ordering::SeqCst);
                        session.close();
                        if let Ok(mut scheduler) = scheduler.lock() {
                            scheduler.stop_all();
                        }
                        set_state_in(&state, SessionState::Idle);
                        emit_terminal(&events, &terminal_sent, BridgeEvent::Error(message));
                        break;
                    }
                    TransportEvent::Closed => {
                        // Remote close, or the echo of a local close()
                        // racing the stop path; the session is over either
                        // way.
                        running.store(false, Ordering::SeqCst);
                        if let Ok(mut scheduler) = scheduler.lock() {
                            scheduler.stop_all();
                        }
                        set_state_in(&state, SessionState::Idle);
                        emit_terminal(&events, &terminal_sent, BridgeEvent::Closed);
                        break;
                    }
                }
            }
        })
    }

    /// Collect worker threads left over from a finished session.
    fn reap(&mut self) {
        if let Some(live) = self.live.take() {
            live.running.store(false, Ordering::SeqCst);
            for handle in live.threads {
                if handle.join().is_err() {
                    eprintln!("voxlink: session thread panicked");
                }
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        set_state_in(&self.state, next);
    }

    fn emit_terminal(&self, event: BridgeEvent) {
        emit_terminal(&self.event_tx, &self.terminal_sent, event);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
        self.reap();
    }
}

fn set_state_in(state: &Mutex<SessionState>, next: SessionState) {
    if let Ok(mut guard) = state.lock() {
        *guard = next;
    }
}

fn emit(events: &Option<Sender<BridgeEvent>>, event: BridgeEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Deliver a terminal event at most once per session.
fn emit_terminal(
    events: &Option<Sender<BridgeEvent>>,
    terminal_sent: &AtomicBool,
    event: BridgeEvent,
) {
    if terminal_sent.swap(true, Ordering::SeqCst) {
        return;
    }
    emit(events, event);
}

/// Join threads until the deadline, then detach whatever is left.
fn join_with_deadline(mut threads: Vec<JoinHandle<()>>, deadline_in: Duration) {
    let deadline = Instant::now() + deadline_in;
    let poll_interval = Duration::from_millis(10);

    loop {
        let mut remaining = Vec::new();
        for handle in threads.drain(..) {
            if handle.is_finished() {
                if let Err(panic_info) = handle.join() {
                    let msg = panic_info
                        .downcast_ref::<&str>()
                        .copied()
                        .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                        .unwrap_or("unknown panic");
                    eprintln!("voxlink: session thread panicked: {msg}");
                }
            } else {
                remaining.push(handle);
            }
        }
        threads = remaining;

        if threads.is_empty() {
            break;
        }

        if Instant::now() >= deadline {
            eprintln!(
                "voxlink: teardown timeout — {} thread(s) still running, detaching",
                threads.len()
            );
            break;
        }

        thread::sleep(poll_interval);
    }
}
