//! JSON wire protocol for the realtime voice service.
//!
//! Audio payloads travel base64-encoded inside text frames: 16kHz mono
//! 16-bit PCM upstream, 24kHz mono 16-bit PCM downstream.

use crate::error::{Result, VoxlinkError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// Messages sent by the client to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open the session and pick a model.
    Setup { model: String },
    /// One capture frame, base64 PCM16 at the capture rate.
    Audio { data: String },
    /// The client is winding the session down.
    End,
}

impl ClientMessage {
    /// Wrap an encoded PCM frame for the wire.
    pub fn audio_frame(pcm: &[u8]) -> Self {
        ClientMessage::Audio {
            data: BASE64.encode(pcm),
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VoxlinkError::Protocol {
            message: format!("Failed to serialize client message: {}", e),
        })
    }
}

/// Messages delivered by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Setup acknowledged; the session is live.
    SetupComplete,
    /// One reply frame, base64 PCM16 at the playback rate.
    Audio { data: String },
    /// The service finished a response turn.
    TurnComplete,
    /// The service will close the connection shortly.
    GoAway { reason: String },
    /// Server-side failure; the session is over.
    Error { message: String },
}

impl ServerMessage {
    /// Deserialize from a JSON string.
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| VoxlinkError::Protocol {
            message: format!("Failed to parse server message: {}", e),
        })
    }

    /// Decode the PCM payload of an `Audio` message.
    pub fn decode_audio(data: &str) -> Result<Vec<u8>> {
        BASE64.decode(data).map_err(|e| VoxlinkError::Protocol {
            message: format!("Invalid base64 audio payload: {}", e),
        })
    }
}
