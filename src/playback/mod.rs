//! Playback scheduling and audio output.

#[cfg(feature = "cpal-audio")]
pub mod device;
pub mod output;
pub mod scheduler;

#[cfg(feature = "cpal-audio")]
pub use device::CpalAudioSink;
pub use output::{AudioSink, MockAudioSink, MockSinkProbe, ScheduledCall, SourceHandle};
pub use scheduler::PlaybackScheduler;
