//! Audio output sinks for scheduled playback.
//!
//! A sink renders segments handed to it at explicit timeline positions.
//! The scheduler decides *when*; the sink only honors the start offset and
//! the cancellation flag on each segment's handle.

use crate::audio::pcm::duration_of;
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Handle to one scheduled playback segment.
///
/// Cloning shares the underlying cancellation flag.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    end_at: Duration,
}

impl SourceHandle {
    pub(crate) fn new(id: u64, end_at: Duration) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
            end_at,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop this segment immediately; queued samples are discarded.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Timeline position where this segment ends.
    pub fn end_at(&self) -> Duration {
        self.end_at
    }

    /// True once the segment has played out (or was cancelled).
    pub fn is_finished(&self, playhead: Duration) -> bool {
        self.is_cancelled() || playhead >= self.end_at
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }
}

/// Trait for audio output backends.
///
/// This trait allows swapping implementations (real output device vs mock).
pub trait AudioSink: Send {
    /// Schedule mono float samples at the sink's rate to begin at
    /// `start_at` on the playback timeline.
    fn play_at(&mut self, samples: Vec<f32>, start_at: Duration) -> Result<SourceHandle>;

    /// The sink's output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}

/// One `play_at` call recorded by the mock sink.
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub start_at: Duration,
    pub duration: Duration,
    pub handle: SourceHandle,
}

#[derive(Debug, Default)]
struct MockSinkState {
    scheduled: Mutex<Vec<ScheduledCall>>,
}

/// Inspection handle for a [`MockAudioSink`] that outlives the sink.
#[derive(Debug, Clone, Default)]
pub struct MockSinkProbe {
    state: Arc<MockSinkState>,
}

impl MockSinkProbe {
    /// All calls recorded so far, in arrival order.
    pub fn scheduled(&self) -> Vec<ScheduledCall> {
        self.state
            .scheduled
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Start offsets of all recorded calls.
    pub fn start_times(&self) -> Vec<Duration> {
        self.scheduled().iter().map(|call| call.start_at).collect()
    }

    /// Number of recorded segments whose handle was cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.scheduled()
            .iter()
            .filter(|call| call.handle.is_cancelled())
            .count()
    }
}

/// Mock sink for testing: records schedule calls instead of playing.
pub struct MockAudioSink {
    state: Arc<MockSinkState>,
    sample_rate: u32,
    fail_play: bool,
    next_id: AtomicU64,
}

impl MockAudioSink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(MockSinkState::default()),
            sample_rate,
            fail_play: false,
            next_id: AtomicU64::new(0),
        }
    }

    /// Configure every `play_at` call to fail.
    pub fn with_play_failure(mut self) -> Self {
        self.fail_play = true;
        self
    }

    /// Inspection handle that survives moving the sink into a scheduler.
    pub fn probe(&self) -> MockSinkProbe {
        MockSinkProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl AudioSink for MockAudioSink {
    fn play_at(&mut self, samples: Vec<f32>, start_at: Duration) -> Result<SourceHandle> {
        if self.fail_play {
            return Err(crate::error::VoxlinkError::Playback {
                message: "mock playback failure".to_string(),
            });
        }

        let duration = duration_of(samples.len(), self.sample_rate);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = SourceHandle::new(id, start_at + duration);

        if let Ok(mut scheduled) = self.state.scheduled.lock() {
            scheduled.push(ScheduledCall {
                start_at,
                duration,
                handle: handle.clone(),
            });
        }
        Ok(handle)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Segment queued for the output callback.
struct QueuedSegment {
    cancelled: Arc<AtomicBool>,
    samples: VecDeque<f32>,
}

/// Shared queue and counters between `play_at` and the output callback.
pub(crate) struct SinkShared {
    queue: Mutex<VecDeque<QueuedSegment>>,
    /// Samples consumed by the output callback, silence included.
    played: AtomicU64,
    /// Timeline position (in samples) where the queue currently ends.
    queue_end: AtomicU64,
}

impl SinkShared {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            played: AtomicU64::new(0),
            queue_end: AtomicU64::new(0),
        }
    }

    /// Append a segment, padding with silence when `start_sample` lies past
    /// the current queue end.
    pub(crate) fn push(&self, cancelled: Arc<AtomicBool>, samples: Vec<f32>, start_sample: u64) {
        let played = self.played.load(Ordering::SeqCst);
        let end = self.queue_end.load(Ordering::SeqCst).max(played);
        let gap = start_sample.saturating_sub(end) as usize;

        let mut queued = VecDeque::with_capacity(gap + samples.len());
        queued.extend(std::iter::repeat_n(0.0f32, gap));
        queued.extend(samples);
        let total = queued.len() as u64;

        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(QueuedSegment {
                cancelled,
                samples: queued,
            });
            self.queue_end.store(end + total, Ordering::SeqCst);
        }
    }

    /// Fill an output buffer; silence on underrun. Cancelled segments are
    /// discarded and the queue-end marker pulled back by what they held.
    pub(crate) fn fill(&self, data: &mut [f32]) {
        let mut queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(_) => {
                data.fill(0.0);
                return;
            }
        };

        for sample in data.iter_mut() {
            loop {
                match queue.front_mut() {
                    Some(segment) if segment.cancelled.load(Ordering::Relaxed) => {
                        let remaining = segment.samples.len() as u64;
                        self.queue_end.fetch_sub(remaining, Ordering::SeqCst);
                        queue.pop_front();
                    }
                    Some(segment) => match segment.samples.pop_front() {
                        Some(value) => {
                            *sample = value;
                            break;
                        }
                        None => {
                            queue.pop_front();
                        }
                    },
                    None => {
                        *sample = 0.0; // underrun
                        break;
                    }
                }
            }
        }
        self.played.fetch_add(data.len() as u64, Ordering::SeqCst);
    }
}
