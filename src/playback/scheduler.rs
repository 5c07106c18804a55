//! Gapless scheduling of inbound audio segments.
//!
//! The scheduler owns a single cursor, the next available start time, and
//! the set of segments scheduled but not yet finished. Segments are
//! scheduled strictly in arrival order; the service's ordering is trusted,
//! not corrected.

use crate::audio::pcm::duration_of;
use crate::clock::Clock;
use crate::error::Result;
use crate::playback::output::{AudioSink, SourceHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Schedules decoded segments for sequential, non-overlapping playback.
pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    next_start: Duration,
    active: Vec<SourceHandle>,
}

impl PlaybackScheduler {
    /// Creates a scheduler over the given sink; the playback clock starts
    /// at zero now.
    pub fn new(sink: Box<dyn AudioSink>, clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            sink,
            clock,
            epoch,
            next_start: Duration::ZERO,
            active: Vec::new(),
        }
    }

    /// Current position of the playback clock.
    pub fn playhead(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.epoch)
    }

    /// Schedule one decoded segment.
    ///
    /// The segment starts at the cursor, or at the current clock position
    /// when the cursor has fallen behind: a late first segment plays now
    /// instead of against a stale cursor, so no artificial lag accumulates.
    /// Returns the chosen start time.
    pub fn schedule(&mut self, samples: Vec<f32>) -> Result<Duration> {
        if samples.is_empty() {
            return Ok(self.next_start);
        }

        let now = self.playhead();
        let duration = duration_of(samples.len(), self.sink.sample_rate());
        let start_at = self.next_start.max(now);

        let handle = self.sink.play_at(samples, start_at)?;
        self.next_start = start_at + duration;

        self.active.retain(|h| !h.is_finished(now));
        self.active.push(handle);

        Ok(start_at)
    }

    /// Stop every in-flight segment, clear the active set and reset the
    /// cursor so a future session starts clean.
    pub fn stop_all(&mut self) {
        for handle in self.active.drain(..) {
            handle.cancel();
        }
        self.next_start = Duration::ZERO;
        self.epoch = self.clock.now();
    }

    /// Segments scheduled but not yet finished at the last bookkeeping
    /// point.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// The cursor: where the next segment will start at the earliest.
    pub fn next_start(&self) -> Duration {
        self.next_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::playback::output::{MockAudioSink, MockSinkProbe};

    const RATE: u32 = 24_000;

    fn make_scheduler(clock: &MockClock) -> (PlaybackScheduler, MockSinkProbe) {
        let sink = MockAudioSink::new(RATE);
        let probe = sink.probe();
        let scheduler = PlaybackScheduler::new(Box::new(sink), Arc::new(clock.clone()));
        (scheduler, probe)
    }

    /// One second of samples at the playback rate.
    fn second_of_audio() -> Vec<f32> {
        vec![0.1f32; RATE as usize]
    }

    #[test]
    fn test_segments_schedule_back_to_back() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        // Three 1s segments arriving instantly: 0s, 1s, 2s
        for _ in 0..3 {
            scheduler.schedule(second_of_audio()).unwrap();
        }

        assert_eq!(
            probe.start_times(),
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
        assert_eq!(scheduler.next_start(), Duration::from_secs(3));
    }

    #[test]
    fn test_start_times_never_overlap() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        // Mixed durations with jittered arrival
        for (millis, advance) in [(250usize, 100u64), (500, 0), (100, 700), (400, 50)] {
            let samples = vec![0.0f32; RATE as usize * millis / 1000];
            scheduler.schedule(samples).unwrap();
            clock.advance(Duration::from_millis(advance));
        }

        let calls = probe.scheduled();
        for pair in calls.windows(2) {
            assert!(
                pair[1].start_at >= pair[0].start_at + pair[0].duration,
                "segment starting at {:?} overlaps previous ending at {:?}",
                pair[1].start_at,
                pair[0].start_at + pair[0].duration
            );
        }
    }

    #[test]
    fn test_late_first_segment_starts_at_clock_not_cursor() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        // Clock has advanced past the zero cursor before anything arrives
        clock.advance(Duration::from_secs(5));

        let start = scheduler.schedule(second_of_audio()).unwrap();

        assert_eq!(start, Duration::from_secs(5));
        assert_eq!(probe.start_times(), vec![Duration::from_secs(5)]);
        assert_eq!(scheduler.next_start(), Duration::from_secs(6));
    }

    #[test]
    fn test_gap_between_turns_snaps_to_clock() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        scheduler.schedule(second_of_audio()).unwrap();
        // Long pause: playback finished long before the next turn arrives
        clock.advance(Duration::from_secs(10));
        scheduler.schedule(second_of_audio()).unwrap();

        assert_eq!(
            probe.start_times(),
            vec![Duration::ZERO, Duration::from_secs(10)]
        );
    }

    #[test]
    fn test_fast_arrivals_absorb_scheduling_slack() {
        let clock = MockClock::new();
        let (mut scheduler, _probe) = make_scheduler(&clock);

        // Second segment arrives mid-playback of the first: queued at the
        // cursor, not at the clock.
        scheduler.schedule(second_of_audio()).unwrap();
        clock.advance(Duration::from_millis(300));
        let start = scheduler.schedule(second_of_audio()).unwrap();

        assert_eq!(start, Duration::from_secs(1));
    }

    #[test]
    fn test_empty_segment_is_a_no_op() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        scheduler.schedule(Vec::new()).unwrap();

        assert!(probe.scheduled().is_empty());
        assert_eq!(scheduler.next_start(), Duration::ZERO);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_active_set_tracks_unfinished_segments() {
        let clock = MockClock::new();
        let (mut scheduler, _probe) = make_scheduler(&clock);

        scheduler.schedule(second_of_audio()).unwrap();
        scheduler.schedule(second_of_audio()).unwrap();
        assert_eq!(scheduler.active_count(), 2);

        // First segment finishes; pruning happens on the next schedule call
        clock.advance(Duration::from_millis(1500));
        scheduler.schedule(second_of_audio()).unwrap();
        assert_eq!(scheduler.active_count(), 2);
    }

    #[test]
    fn test_stop_all_cancels_and_resets() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        scheduler.schedule(second_of_audio()).unwrap();
        scheduler.schedule(second_of_audio()).unwrap();
        clock.advance(Duration::from_millis(100));

        scheduler.stop_all();

        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_start(), Duration::ZERO);
        assert_eq!(probe.cancelled_count(), 2);
    }

    #[test]
    fn test_scheduling_after_stop_all_starts_clean() {
        let clock = MockClock::new();
        let (mut scheduler, probe) = make_scheduler(&clock);

        scheduler.schedule(second_of_audio()).unwrap();
        clock.advance(Duration::from_secs(30));
        scheduler.stop_all();

        // A fresh segment starts at the reset clock, not 30s in
        let start = scheduler.schedule(second_of_audio()).unwrap();
        assert_eq!(start, Duration::ZERO);

        let calls = probe.scheduled();
        assert_eq!(calls.len(), 2);
        assert!(!calls[1].handle.is_cancelled());
    }

    #[test]
    fn test_sink_failure_propagates_and_keeps_cursor() {
        let clock = MockClock::new();
        let sink = MockAudioSink::new(RATE).with_play_failure();
        let mut scheduler = PlaybackScheduler::new(Box::new(sink), Arc::new(clock));

        assert!(scheduler.schedule(second_of_audio()).is_err());
        // A failed schedule reserves nothing
        assert_eq!(scheduler.next_start(), Duration::ZERO);
        assert_eq!(scheduler.active_count(), 0);
    }
}
