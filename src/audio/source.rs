use crate::error::{Result, VoxlinkError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Trait for audio capture sources.
///
/// This trait allows swapping implementations (real audio device vs mock).
/// Sources yield mono float samples in `[-1.0, 1.0]` at the capture rate.
pub trait AudioSource: Send + Sync {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Drain the samples accumulated since the previous read.
    ///
    /// An empty result from a live source means no data yet; from a finite
    /// source it means exhaustion.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    /// Returns true when the source runs out (file/pipe) rather than
    /// capturing live.
    fn is_finite(&self) -> bool {
        false
    }
}

/// Shared state behind a [`MockAudioSource`], inspectable from tests while
/// the source itself has been moved into a session.
#[derive(Debug, Default)]
struct MockSourceState {
    started: AtomicBool,
    stop_count: AtomicUsize,
    read_count: AtomicUsize,
}

/// Inspection handle for a [`MockAudioSource`] that outlives the source.
#[derive(Debug, Clone)]
pub struct MockSourceProbe {
    state: Arc<MockSourceState>,
}

impl MockSourceProbe {
    /// True while the source is between `start()` and `stop()`.
    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Number of times `stop()` succeeded.
    pub fn stop_count(&self) -> usize {
        self.state.stop_count.load(Ordering::SeqCst)
    }

    /// Number of `read_samples()` calls observed.
    pub fn read_count(&self) -> usize {
        self.state.read_count.load(Ordering::SeqCst)
    }
}

/// Mock audio source for testing.
///
/// Yields a scripted sequence of chunks, then empty reads. Finite by
/// default so pipelines drain deterministically; `as_live_source()` keeps
/// it polling like a microphone.
pub struct MockAudioSource {
    chunks: Mutex<Vec<Vec<f32>>>,
    position: AtomicUsize,
    live: bool,
    should_fail_start: bool,
    should_fail_stop: bool,
    should_fail_read: bool,
    error_message: String,
    state: Arc<MockSourceState>,
}

impl MockAudioSource {
    /// Create a new mock source with a single chunk of silence.
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(vec![vec![0.0f32; 160]]),
            position: AtomicUsize::new(0),
            live: false,
            should_fail_start: false,
            should_fail_stop: false,
            should_fail_read: false,
            error_message: "mock audio error".to_string(),
            state: Arc::new(MockSourceState::default()),
        }
    }

    /// Configure the scripted chunk sequence.
    pub fn with_chunks(self, chunks: Vec<Vec<f32>>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
            ..self
        }
    }

    /// Treat the source as live: exhaustion yields empty reads forever
    /// instead of signalling end-of-input.
    pub fn as_live_source(mut self) -> Self {
        self.live = true;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on stop.
    pub fn with_stop_failure(mut self) -> Self {
        self.should_fail_stop = true;
        self
    }

    /// Configure the mock to fail on read.
    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Configure the error message for failures.
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    /// Inspection handle that survives moving the source into a session.
    pub fn probe(&self) -> MockSourceProbe {
        MockSourceProbe {
            state: Arc::clone(&self.state),
        }
    }

    fn failure(&self) -> VoxlinkError {
        VoxlinkError::AudioCapture {
            message: self.error_message.clone(),
        }
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(self.failure());
        }
        self.state.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.should_fail_stop {
            return Err(self.failure());
        }
        self.state.started.store(false, Ordering::SeqCst);
        self.state.stop_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        self.state.read_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_read {
            return Err(self.failure());
        }

        let index = self.position.fetch_add(1, Ordering::SeqCst);
        let chunks = self
            .chunks
            .lock()
            .map_err(|_| VoxlinkError::AudioCapture {
                message: "mock chunk lock poisoned".to_string(),
            })?;
        Ok(chunks.get(index).cloned().unwrap_or_default())
    }

    fn is_finite(&self) -> bool {
        !self.live
    }
}
