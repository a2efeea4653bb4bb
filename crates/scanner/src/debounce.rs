//! Recognition debouncer.
//!
//! A single frame can spuriously match an unrelated or half-read code, so a
//! payload is only reported once it has been seen more than `threshold` times.
//! After every report the counter starts over and a cooldown suppresses new
//! reports for the same code still held in front of the camera.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use barcode_core::Detection;
use thiserror::Error;
use tracing::{debug, info};

use crate::telemetry;

pub const DEFAULT_THRESHOLD: usize = 10;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DebounceError {
    #[error("no detections observed since the last reset")]
    EmptyCounter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebounceConfig {
    /// A payload is recognized once its count is strictly greater than this.
    pub threshold: usize,
    pub cooldown: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

type RecognizedSink = Box<dyn Fn(String) + Send + Sync>;

#[derive(Clone, Copy, Debug)]
struct Tally {
    count: usize,
    first_seen: u64,
    crossed_at: Option<u64>,
}

#[derive(Default)]
struct CounterState {
    tallies: HashMap<String, Tally>,
    next_ordinal: u64,
    cooldown_until: Option<Instant>,
}

impl CounterState {
    fn clear(&mut self) {
        self.tallies.clear();
        self.next_ordinal = 0;
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Highest count above threshold among `in_view`; ties go to the payload
    /// that crossed first.
    fn leader_over_threshold(&self, in_view: &HashSet<&str>) -> Option<(&str, usize)> {
        self.tallies
            .iter()
            .filter(|(payload, _)| in_view.contains(payload.as_str()))
            .filter_map(|(payload, tally)| tally.crossed_at.map(|at| (payload, tally.count, at)))
            .min_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)))
            .map(|(payload, count, _)| (payload.as_str(), count))
    }
}

/// Majority vote over a stream of detection batches.
pub struct Debouncer {
    config: DebounceConfig,
    state: Mutex<CounterState>,
    sink: Option<RecognizedSink>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CounterState::default()),
            sink: None,
        }
    }

    /// Register the callback invoked with every recognized payload.
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> DebounceConfig {
        self.config
    }

    /// Fold one frame's detections into the counter.
    ///
    /// Returns the recognized payload when a payload in this batch is over the
    /// threshold outside the cooldown window. Codes that left the view never
    /// fire, however high their count. The sink runs on the calling
    /// thread after the counter lock has been released.
    pub fn observe(&self, detections: &[Detection]) -> Option<String> {
        let recognized = {
            let mut state = self.lock();
            let threshold = self.config.threshold;
            for detection in detections {
                let ordinal = state.next_ordinal;
                state.next_ordinal += 1;
                let tally = state
                    .tallies
                    .entry(detection.payload().to_owned())
                    .or_insert(Tally {
                        count: 0,
                        first_seen: ordinal,
                        crossed_at: None,
                    });
                tally.count += 1;
                if tally.count > threshold && tally.crossed_at.is_none() {
                    tally.crossed_at = Some(ordinal);
                }
            }

            let now = Instant::now();
            if state.in_cooldown(now) {
                None
            } else {
                let in_view: HashSet<&str> = detections.iter().map(Detection::payload).collect();
                let leader = state
                    .leader_over_threshold(&in_view)
                    .map(|(payload, count)| (payload.to_owned(), count));
                match leader {
                    Some((payload, count)) => {
                        debug!(payload = %payload, count, threshold, "payload crossed threshold");
                        state.clear();
                        state.cooldown_until = Some(now + self.config.cooldown);
                        Some(payload)
                    }
                    None => None,
                }
            }
        };

        if let Some(payload) = recognized.as_ref() {
            info!(payload = %payload, "code recognized");
            metrics::counter!(telemetry::RECOGNITIONS_TOTAL).increment(1);
            if let Some(sink) = self.sink.as_ref() {
                sink(payload.clone());
            }
        }
        recognized
    }

    /// Payload with the highest count; ties go to the payload seen first.
    pub fn most_common(&self) -> Result<(String, usize), DebounceError> {
        let state = self.lock();
        state
            .tallies
            .iter()
            .min_by(|a, b| b.1.count.cmp(&a.1.count).then(a.1.first_seen.cmp(&b.1.first_seen)))
            .map(|(payload, tally)| (payload.clone(), tally.count))
            .ok_or(DebounceError::EmptyCounter)
    }

    pub fn count(&self, payload: &str) -> usize {
        self.lock().tallies.get(payload).map_or(0, |tally| tally.count)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tallies.is_empty()
    }

    pub fn in_cooldown(&self) -> bool {
        self.lock().in_cooldown(Instant::now())
    }

    /// Forget all counts. A running cooldown is kept.
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DebounceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use super::*;

    fn code(kind: &str, payload: &str) -> Detection {
        Detection::new(kind, payload, Vec::new())
    }

    fn recording(config: DebounceConfig) -> (Debouncer, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let debouncer = Debouncer::new(config).with_sink(move |payload| {
            sink_seen.lock().expect("sink lock").push(payload);
        });
        (debouncer, seen)
    }

    #[test]
    fn default_threshold_fires_on_eleventh_observation() {
        let (debouncer, seen) = recording(DebounceConfig::default());
        let batch = [code("QR", "X")];
        for call in 1..=10 {
            assert_eq!(debouncer.observe(&batch), None, "fired early on call {call}");
        }
        assert_eq!(debouncer.observe(&batch), Some("X".to_string()));
        assert_eq!(*seen.lock().expect("lock"), vec!["X".to_string()]);
        assert!(debouncer.is_empty());
    }

    #[test]
    fn three_quick_reads_fire_once_on_the_third() {
        let (debouncer, seen) = recording(DebounceConfig {
            threshold: 2,
            cooldown: Duration::from_secs(1),
        });
        let batch = [code("EAN", "123")];
        assert_eq!(debouncer.observe(&batch), None);
        assert_eq!(debouncer.observe(&batch), None);
        assert_eq!(debouncer.observe(&batch), Some("123".to_string()));
        assert_eq!(seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn cooldown_suppresses_refire_until_elapsed() {
        let (debouncer, seen) = recording(DebounceConfig {
            threshold: 2,
            cooldown: Duration::from_millis(150),
        });
        let batch = [code("EAN", "123")];
        for _ in 0..3 {
            debouncer.observe(&batch);
        }
        assert!(debouncer.in_cooldown());

        for _ in 0..5 {
            assert_eq!(debouncer.observe(&batch), None);
        }
        assert_eq!(debouncer.count("123"), 5);

        thread::sleep(Duration::from_millis(250));
        assert!(!debouncer.in_cooldown());
        assert_eq!(debouncer.observe(&batch), Some("123".to_string()));
        assert_eq!(seen.lock().expect("lock").len(), 2);
    }

    #[test]
    fn strictly_higher_count_beats_earlier_crossing() {
        let debouncer = Debouncer::new(DebounceConfig {
            threshold: 2,
            cooldown: Duration::from_millis(100),
        });
        for _ in 0..3 {
            debouncer.observe(&[code("QR", "warmup")]);
        }
        assert!(debouncer.in_cooldown());

        // Both cross while cooling down: "first" crosses earlier, "busy" ends higher.
        for _ in 0..3 {
            assert_eq!(debouncer.observe(&[code("QR", "first")]), None);
        }
        for _ in 0..5 {
            assert_eq!(debouncer.observe(&[code("QR", "busy")]), None);
        }

        thread::sleep(Duration::from_millis(200));
        assert_eq!(
            debouncer.observe(&[code("QR", "first"), code("QR", "busy")]),
            Some("busy".to_string())
        );
    }

    #[test]
    fn code_out_of_view_does_not_fire_after_cooldown() {
        let (debouncer, seen) = recording(DebounceConfig {
            threshold: 2,
            cooldown: Duration::from_millis(200),
        });
        for _ in 0..3 {
            debouncer.observe(&[code("QR", "A")]);
        }
        for _ in 0..3 {
            assert_eq!(debouncer.observe(&[code("QR", "B")]), None);
        }

        thread::sleep(Duration::from_millis(300));
        assert_eq!(debouncer.observe(&[]), None);
        assert_eq!(debouncer.observe(&[code("QR", "C")]), None);
        assert_eq!(*seen.lock().expect("lock"), vec!["A".to_string()]);

        // Back in view, the accumulated count fires straight away.
        assert_eq!(debouncer.observe(&[code("QR", "B")]), Some("B".to_string()));
    }

    #[test]
    fn tie_goes_to_first_payload_to_cross() {
        let debouncer = Debouncer::new(DebounceConfig {
            threshold: 2,
            cooldown: Duration::ZERO,
        });
        debouncer.observe(&[code("QR", "late"), code("QR", "early")]);
        debouncer.observe(&[code("QR", "late"), code("QR", "early")]);
        // Both reach 3 in this batch; "early" is folded first.
        assert_eq!(
            debouncer.observe(&[code("QR", "early"), code("QR", "late")]),
            Some("early".to_string())
        );
    }

    #[test]
    fn most_common_on_empty_counter_is_an_error() {
        let debouncer = Debouncer::default();
        assert_eq!(debouncer.most_common(), Err(DebounceError::EmptyCounter));
        debouncer.observe(&[code("QR", "a"), code("QR", "b")]);
        debouncer.observe(&[code("QR", "b")]);
        assert_eq!(debouncer.most_common(), Ok(("b".to_string(), 2)));
        debouncer.reset();
        assert_eq!(debouncer.most_common(), Err(DebounceError::EmptyCounter));
    }

    #[test]
    fn most_common_tie_prefers_first_seen() {
        let debouncer = Debouncer::default();
        debouncer.observe(&[code("QR", "first"), code("QR", "second")]);
        assert_eq!(debouncer.most_common(), Ok(("first".to_string(), 1)));
    }

    #[test]
    fn leader_can_be_read_from_another_thread() {
        let debouncer = Arc::new(Debouncer::default());
        debouncer.observe(&[code("QR", "diag")]);
        let reader = debouncer.clone();
        let leader = thread::spawn(move || reader.most_common())
            .join()
            .expect("reader thread");
        assert_eq!(leader, Ok(("diag".to_string(), 1)));
    }
}
