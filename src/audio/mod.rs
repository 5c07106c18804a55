//! Audio capture sources and PCM conversion.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod pcm;
pub mod source;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::{CpalAudioSource, list_devices};
pub use pcm::{decode_frame, duration_of, encode_frame};
pub use source::{AudioSource, MockAudioSource, MockSourceProbe};
pub use wav::WavAudioSource;
