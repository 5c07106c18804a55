//! voxlink - Live voice bridge for realtime generative-AI sessions
//!
//! Captures microphone audio, streams it to a realtime voice service as
//! 16-bit PCM frames, and schedules the service's audio replies for
//! gapless playback. Host applications drive it through
//! [`SessionController`] and receive lifecycle notifications over a
//! channel.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod playback;
pub mod report;
pub mod session;
pub mod transport;

// Core traits (source → encode → transport → decode → playback)
pub use audio::source::{AudioSource, MockAudioSource};
pub use playback::output::{AudioSink, MockAudioSink, SourceHandle};
pub use transport::session::{MockTransport, Transport, TransportEvent, TransportSession};

// Frame conversion
pub use audio::pcm::{decode_frame, encode_frame};

// Session lifecycle
pub use session::{BridgeEvent, SessionController, SessionMessage, SessionState};

// Playback scheduling
pub use clock::{Clock, MockClock, SystemClock};
pub use playback::scheduler::PlaybackScheduler;

// Transports
pub use transport::websocket::WebSocketTransport;

// Error handling
pub use error::{Result, VoxlinkError};

// Config
pub use config::{AudioConfig, Config, PlaybackConfig, SessionConfig};

// Worker error reporting
pub use report::{ErrorReporter, LogReporter};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
