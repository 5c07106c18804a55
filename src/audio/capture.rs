//! Microphone capture using CPAL (Cross-Platform Audio Library).
//!
//! Captures mono float samples at the configured rate. Acquiring the device
//! is visible to the user through the OS microphone indicator; that is
//! inherent to opening an input stream and not suppressible.

use crate::audio::source::AudioSource;
use crate::audio::wav::resample;
use crate::config::AudioConfig;
use crate::defaults::PCM_SCALE;
use crate::error::{Result, VoxlinkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers while
/// probing audio backends.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device names preferred on GNOME/PipeWire desktops: these respect the
/// system's input-device selection instead of binding a raw ALSA card.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "pulseaudio"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "hdmi",
    "s/pdif",
    "digital output",
];

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|pref| lower.contains(pref))
}

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

/// List available audio input devices, filtering out unusable ones.
///
/// Preferred devices (PipeWire/PulseAudio) are listed first.
///
/// # Errors
/// Returns `VoxlinkError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect::<Vec<_>>())
    })
    .map_err(|e| VoxlinkError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names: Vec<String> = devices
        .into_iter()
        .filter(|name| !should_filter_device(name))
        .collect();
    names.sort_by_key(|name| !is_preferred_device(name));

    Ok(names)
}

/// Find the capture device: by name when configured, otherwise the best
/// default (PipeWire/Pulse preferred, system default as fallback).
fn find_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host.input_devices().map_err(|e| VoxlinkError::AudioCapture {
                message: format!("Failed to enumerate devices: {}", e),
            })?;

            for device in devices {
                if device.name().is_ok_and(|n| n == name) {
                    return Ok(device);
                }
            }

            return Err(VoxlinkError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if device.name().is_ok_and(|n| is_preferred_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| VoxlinkError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only accessed with the surrounding Mutex held, so
/// its methods never run concurrently from two threads.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone capture source backed by CPAL.
///
/// Tries a mono float stream at the configured rate first; falls back to
/// the device's native config with software channel-mixing and resampling
/// for backends that refuse non-native formats.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Create a capture source for the configured device and rate.
    ///
    /// # Errors
    /// Returns `AudioDeviceNotFound` when the named device does not exist
    /// and `AudioCapture` when enumeration fails.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let device = find_device(config.device.as_deref())?;

        Ok(Self {
            device,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: config.sample_rate,
        })
    }

    /// Build a stream at the preferred config (f32, mono, capture rate),
    /// falling back to i16 for devices that only expose integer formats.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("voxlink: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(|&s| s as f32 / PCM_SCALE));
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Build a stream at the device's native config, converting in software.
    ///
    /// Some PipeWire-ALSA setups accept non-native configs but never fire
    /// the data callback; capturing natively and converting is the reliable
    /// path there.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        eprintln!(
            "voxlink: using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            eprintln!("voxlink: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted =
                            convert_to_mono(data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let float_data: Vec<f32> =
                            data.iter().map(|&s| s as f32 / PCM_SCALE).collect();
                        let converted =
                            convert_to_mono(&float_data, native_channels, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            fmt => Err(VoxlinkError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. Try a different capture device.",
                    fmt
                ),
            }),
        }
    }
}

/// Mix multi-channel audio to mono and resample to the target rate.
fn convert_to_mono(samples: &[f32], channels: usize, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let mono: Vec<f32> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    resample(&mono, source_rate, target_rate)
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Check that the callback actually fires; some PipeWire-ALSA setups
        // accept the preferred config but never deliver data.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }

            let native_stream = self.build_stream_native()?;
            native_stream
                .play()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to start native audio stream: {}", e),
                })?;
            native_stream
        } else {
            stream
        };

        let mut stream_guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| VoxlinkError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = self.buffer.lock().map_err(|e| VoxlinkError::AudioCapture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;

        Ok(std::mem::take(&mut *buffer))
    }
}
