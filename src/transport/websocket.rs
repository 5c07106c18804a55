//! WebSocket transport speaking the realtime JSON protocol.
//!
//! A dedicated worker thread owns the socket: it drains queued outbound
//! frames, then polls the socket with a short read timeout so a stop
//! request is noticed promptly. The worker is the only event emitter,
//! which makes the at-most-once terminal guarantee structural.

use crate::config::SessionConfig;
use crate::defaults::TRANSPORT_READ_TIMEOUT;
use crate::error::{Result, VoxlinkError};
use crate::transport::protocol::{ClientMessage, ServerMessage};
use crate::transport::session::{Transport, TransportEvent, TransportSession};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::{HeaderValue, Request};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message as WsMessage, WebSocket, connect as websocket_connect};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Transport backed by a blocking WebSocket connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn connect(
        &self,
        config: &SessionConfig,
        events: Sender<TransportEvent>,
    ) -> Result<Box<dyn TransportSession>> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| VoxlinkError::Connection {
                message: "no endpoint configured".to_string(),
            })?;
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| VoxlinkError::Connection {
                message: format!("API key not set in ${}", config.api_key_env),
            })?;

        let request = build_request(&endpoint, &api_key)?;
        let (mut socket, _response) =
            websocket_connect(request).map_err(|e| VoxlinkError::Connection {
                message: format!("failed to connect realtime websocket: {}", e),
            })?;
        set_read_timeout(&mut socket, TRANSPORT_READ_TIMEOUT);

        let setup = ClientMessage::Setup {
            model: config.model.clone(),
        };
        send_json(&mut socket, &setup).map_err(|e| VoxlinkError::Connection {
            message: format!("failed to send session setup: {}", e),
        })?;

        let (commands_tx, commands_rx) = bounded(config.send_queue);
        let stop = Arc::new(AtomicBool::new(false));
        let open = Arc::new(AtomicBool::new(true));

        let worker = SocketWorker {
            socket,
            commands: commands_rx,
            events,
            stop: Arc::clone(&stop),
            open: Arc::clone(&open),
        };
        let handle = thread::Builder::new()
            .name("voxlink-transport".to_string())
            .spawn(move || worker.run())
            .map_err(|e| VoxlinkError::Connection {
                message: format!("failed to spawn transport thread: {}", e),
            })?;

        Ok(Box::new(WebSocketSession {
            commands_tx,
            stop,
            open,
            worker: Mutex::new(Some(handle)),
        }))
    }
}

enum WorkerCommand {
    Frame(Vec<u8>),
    Close,
}

struct WebSocketSession {
    commands_tx: Sender<WorkerCommand>,
    stop: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession for WebSocketSession {
    fn send_frame(&self, frame: &[u8]) {
        if !self.is_open() {
            return;
        }
        // try_send: a saturated queue drops the frame rather than blocking
        // the capture path.
        self.commands_tx
            .try_send(WorkerCommand::Frame(frame.to_vec()))
            .ok();
    }

    fn close(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            self.commands_tx.try_send(WorkerCommand::Close).ok();
        }
        if let Ok(mut guard) = self.worker.lock()
            && let Some(handle) = guard.take()
            && handle.join().is_err()
        {
            eprintln!("voxlink: transport worker panicked");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.stop.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketSession {
    fn drop(&mut self) {
        self.close();
    }
}

struct SocketWorker {
    socket: Socket,
    commands: Receiver<WorkerCommand>,
    events: Sender<TransportEvent>,
    stop: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
}

impl SocketWorker {
    fn run(mut self) {
        let mut opened = false;
        let mut terminal: Option<TransportEvent> = None;

        'session: while !self.stop.load(Ordering::SeqCst) {
            // Drain queued outbound frames before blocking on the socket.
            while let Ok(command) = self.commands.try_recv() {
                match command {
                    WorkerCommand::Frame(pcm) => {
                        let message = ClientMessage::audio_frame(&pcm);
                        if let Err(e) = send_json(&mut self.socket, &message) {
                            terminal = Some(TransportEvent::Failed(e.to_string()));
                            break 'session;
                        }
                    }
                    WorkerCommand::Close => {
                        break 'session;
                    }
                }
            }

            match self.socket.read() {
                Ok(WsMessage::Text(text)) => match ServerMessage::from_json(text.as_str()) {
                    Ok(message) => {
                        if let Some(event) = self.handle_message(message, &mut opened) {
                            terminal = Some(event);
                            break 'session;
                        }
                    }
                    Err(e) => {
                        eprintln!("voxlink: ignoring malformed server message: {}", e);
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    terminal = Some(TransportEvent::Closed);
                    break 'session;
                }
                Ok(_) => {} // binary/ping/pong frames carry nothing for us
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                ) => {
                    terminal = Some(TransportEvent::Closed);
                    break 'session;
                }
                Err(e) => {
                    terminal = Some(TransportEvent::Failed(format!(
                        "realtime read failed: {}",
                        e
                    )));
                    break 'session;
                }
            }
        }

        self.open.store(false, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);

        let event = match terminal {
            Some(event) => event,
            None => {
                // Local close: best-effort end-of-session notice and
                // close handshake.
                send_json(&mut self.socket, &ClientMessage::End).ok();
                self.socket.close(None).ok();
                TransportEvent::Closed
            }
        };
        self.events.send(event).ok();
    }

    /// Map one server message to an event; returns the terminal event when
    /// the message ends the session.
    fn handle_message(
        &self,
        message: ServerMessage,
        opened: &mut bool,
    ) -> Option<TransportEvent> {
        match message {
            ServerMessage::SetupComplete => {
                if !*opened {
                    *opened = true;
                    self.events.send(TransportEvent::Opened).ok();
                }
                None
            }
            ServerMessage::Audio { data } => {
                match ServerMessage::decode_audio(&data) {
                    Ok(pcm) => {
                        self.events.send(TransportEvent::Audio(pcm)).ok();
                    }
                    Err(e) => {
                        // One bad payload should not end the session.
                        eprintln!("voxlink: dropping undecodable audio frame: {}", e);
                    }
                }
                None
            }
            ServerMessage::TurnComplete => {
                self.events.send(TransportEvent::TurnComplete).ok();
                None
            }
            ServerMessage::GoAway { reason } => {
                self.events.send(TransportEvent::GoAway { reason }).ok();
                None
            }
            ServerMessage::Error { message } => Some(TransportEvent::Failed(message)),
        }
    }
}

fn build_request(endpoint: &str, api_key: &str) -> Result<Request<()>> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| VoxlinkError::Connection {
            message: format!("invalid endpoint {}: {}", endpoint, e),
        })?;
    let auth =
        HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|_| {
            VoxlinkError::Connection {
                message: "API key is not a valid header value".to_string(),
            }
        })?;
    request.headers_mut().insert("Authorization", auth);
    Ok(request)
}

fn send_json(socket: &mut Socket, message: &ClientMessage) -> Result<()> {
    let raw = message.to_json()?;
    socket
        .send(WsMessage::Text(raw.into()))
        .map_err(|e| VoxlinkError::Transport {
            message: format!("failed to send realtime payload: {}", e),
        })
}

fn set_read_timeout(socket: &mut Socket, timeout: std::time::Duration) {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => {
            stream.set_read_timeout(Some(timeout)).ok();
        }
        MaybeTlsStream::Rustls(stream) => {
            stream.get_mut().set_read_timeout(Some(timeout)).ok();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::Mutex as StdMutex;

    static ENV_LOCK: StdMutex<()> = StdMutex::new(());

    // SAFETY: only used with ENV_LOCK held.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    #[test]
    fn test_build_request_sets_bearer_auth() {
        let request = build_request("wss://example.test/live", "secret-key").unwrap();
        let auth = request.headers().get("Authorization").unwrap();
        assert_eq!(auth, "Bearer secret-key");
    }

    #[test]
    fn test_build_request_rejects_invalid_endpoint() {
        match build_request("not a url", "key") {
            Err(VoxlinkError::Connection { message }) => {
                assert!(message.contains("invalid endpoint"));
            }
            _ => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_build_request_rejects_invalid_key() {
        assert!(build_request("wss://example.test/live", "bad\nkey").is_err());
    }

    #[test]
    fn test_connect_without_endpoint_is_connection_error() {
        let transport = WebSocketTransport::new();
        let (tx, _rx) = unbounded();

        match transport.connect(&SessionConfig::default(), tx) {
            Err(VoxlinkError::Connection { message }) => {
                assert!(message.contains("no endpoint"));
            }
            _ => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_connect_without_api_key_is_connection_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        remove_env("VOXLINK_TEST_MISSING_KEY");

        let config = SessionConfig {
            endpoint: Some("wss://example.test/live".to_string()),
            api_key_env: "VOXLINK_TEST_MISSING_KEY".to_string(),
            ..Default::default()
        };
        let transport = WebSocketTransport::new();
        let (tx, _rx) = unbounded();

        match transport.connect(&config, tx) {
            Err(VoxlinkError::Connection { message }) => {
                assert!(message.contains("VOXLINK_TEST_MISSING_KEY"));
            }
            _ => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_connect_to_unreachable_endpoint_is_connection_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        set_env("VOXLINK_TEST_PRESENT_KEY", "key");

        // Discard port on loopback: refused immediately, never a live
        // service.
        let config = SessionConfig {
            endpoint: Some("ws://127.0.0.1:9".to_string()),
            api_key_env: "VOXLINK_TEST_PRESENT_KEY".to_string(),
            ..Default::default()
        };
        let transport = WebSocketTransport::new();
        let (tx, _rx) = unbounded();

        assert!(matches!(
            transport.connect(&config, tx),
            Err(VoxlinkError::Connection { .. })
        ));

        remove_env("VOXLINK_TEST_PRESENT_KEY");
    }
}
