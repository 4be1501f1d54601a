//! Two-stage frame pipeline.
//!
//! An ingestion thread pulls frames from a [`FrameSource`] into a bounded
//! FIFO hand-off; a processing thread pops them in capture order, classifies
//! every spot, applies the readings to the shared [`SpotRegistry`], and
//! offers one telemetry payload per frame to the sink.
//!
//! Shutdown:
//! - End of stream or a read error closes the hand-off. Processing drains
//!   whatever is still buffered, then trips the stop token.
//! - [`MonitorSession::stop`] trips the token directly. Both stages notice
//!   within one poll interval and exit without draining.
//!
//! Either way every spot is marked offline once processing has exited.

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crate::config::PipelineSettings;
use crate::detect::OccupancyClassifier;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::occupancy::OccupancyTracker;
use crate::registry::{Rect, SpotRegistry};
use crate::telemetry::{encode, TelemetrySink};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Calling it again has no further effect.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one monitoring session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub frames_ingested: u64,
    pub frames_processed: u64,
    pub readings: u64,
    pub transitions: u64,
    pub telemetry_sent: u64,
    pub telemetry_skipped: u64,
    pub classifier_errors: u64,
    /// Set when ingestion ended on a source error rather than end of stream.
    pub source_error: Option<String>,
}

struct IngestOutcome {
    frames_ingested: u64,
    source_error: Option<String>,
}

#[derive(Default)]
struct ProcessOutcome {
    frames_processed: u64,
    readings: u64,
    transitions: u64,
    telemetry_sent: u64,
    telemetry_skipped: u64,
    classifier_errors: u64,
}

/// A running monitor: one ingestion thread and one processing thread.
pub struct MonitorSession {
    stop: StopToken,
    ingest: Option<JoinHandle<IngestOutcome>>,
    process: Option<JoinHandle<ProcessOutcome>>,
}

impl MonitorSession {
    /// Spawn both stages. Regions are read from `registry` once, here.
    pub fn start(
        source: Box<dyn FrameSource>,
        classifier: Box<dyn OccupancyClassifier>,
        sink: Option<Box<dyn TelemetrySink>>,
        registry: Arc<Mutex<SpotRegistry>>,
        settings: PipelineSettings,
    ) -> Result<Self> {
        if settings.handoff_capacity == 0 {
            return Err(anyhow!("frame hand-off capacity must be greater than zero"));
        }
        let spots: Vec<(usize, u32, Rect)> = lock_registry(&registry)?
            .snapshot()
            .iter()
            .enumerate()
            .map(|(index, spot)| (index, spot.slot_id(), spot.region()))
            .collect();
        log::info!(
            "starting monitor session: {} spots, hand-off capacity {}",
            spots.len(),
            settings.handoff_capacity
        );

        let stop = StopToken::new();
        let (tx, rx) = crossbeam_channel::bounded::<Frame>(settings.handoff_capacity);
        let poll = settings.poll_interval;

        let ingest_stop = stop.clone();
        let ingest = std::thread::Builder::new()
            .name("spark-ingest".to_string())
            .spawn(move || run_ingestion(source, tx, ingest_stop, poll))
            .map_err(|e| anyhow!("failed to spawn ingestion thread: {}", e))?;

        let process_stop = stop.clone();
        let process = std::thread::Builder::new()
            .name("spark-process".to_string())
            .spawn(move || {
                run_processing(rx, spots, classifier, sink, registry, process_stop, poll)
            });
        let process = match process {
            Ok(handle) => handle,
            Err(err) => {
                stop.cancel();
                let _ = ingest.join();
                return Err(anyhow!("failed to spawn processing thread: {}", err));
            }
        };

        Ok(Self {
            stop,
            ingest: Some(ingest),
            process: Some(process),
        })
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Ask both stages to exit. Safe to call any number of times.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// True once both stages have exited.
    pub fn is_finished(&self) -> bool {
        stage_finished(&self.ingest) && stage_finished(&self.process)
    }

    /// Wait for both stages and collect the session counters.
    pub fn join(mut self) -> Result<SessionReport> {
        let process = match self.process.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("processing thread panicked"))?,
            None => ProcessOutcome::default(),
        };
        // Processing trips the token on exit, so ingestion is already winding down.
        self.stop.cancel();
        let ingest = match self.ingest.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("ingestion thread panicked"))?,
            None => IngestOutcome {
                frames_ingested: 0,
                source_error: None,
            },
        };

        Ok(SessionReport {
            frames_ingested: ingest.frames_ingested,
            frames_processed: process.frames_processed,
            readings: process.readings,
            transitions: process.transitions,
            telemetry_sent: process.telemetry_sent,
            telemetry_skipped: process.telemetry_skipped,
            classifier_errors: process.classifier_errors,
            source_error: ingest.source_error,
        })
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

// ----------------------------------------------------------------------------
// Ingestion stage
// ----------------------------------------------------------------------------

fn run_ingestion(
    mut source: Box<dyn FrameSource>,
    tx: Sender<Frame>,
    stop: StopToken,
    poll: Duration,
) -> IngestOutcome {
    let mut outcome = IngestOutcome {
        frames_ingested: 0,
        source_error: None,
    };
    if let Err(err) = source.connect() {
        log::error!("frame source failed to connect: {:#}", err);
        outcome.source_error = Some(format!("{:#}", err));
        return outcome;
    }

    'frames: while !stop.is_cancelled() {
        let mut pending = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source reached end of stream");
                break;
            }
            Err(err) => {
                log::error!("frame source read failed: {:#}", err);
                outcome.source_error = Some(format!("{:#}", err));
                break;
            }
        };
        loop {
            match tx.send_timeout(pending, poll) {
                Ok(()) => {
                    outcome.frames_ingested += 1;
                    break;
                }
                Err(SendTimeoutError::Timeout(frame)) => {
                    if stop.is_cancelled() {
                        break 'frames;
                    }
                    pending = frame;
                }
                Err(SendTimeoutError::Disconnected(_)) => break 'frames,
            }
        }
    }

    let stats = source.stats();
    log::info!(
        "ingestion stopped: {} frames captured from {}",
        stats.frames_captured,
        stats.uri
    );
    // Dropping `tx` here closes the hand-off.
    outcome
}

// ----------------------------------------------------------------------------
// Processing stage
// ----------------------------------------------------------------------------

fn run_processing(
    rx: Receiver<Frame>,
    spots: Vec<(usize, u32, Rect)>,
    mut classifier: Box<dyn OccupancyClassifier>,
    mut sink: Option<Box<dyn TelemetrySink>>,
    registry: Arc<Mutex<SpotRegistry>>,
    stop: StopToken,
    poll: Duration,
) -> ProcessOutcome {
    let mut outcome = ProcessOutcome::default();
    let mut tracker = OccupancyTracker::new();
    let patch_size = classifier.input_size();
    let mut readings: Vec<(usize, bool)> = Vec::with_capacity(spots.len());

    while !stop.is_cancelled() {
        let frame = match rx.recv_timeout(poll) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        readings.clear();
        for (index, slot_id, region) in &spots {
            let scores = frame
                .patch_tensor(region, patch_size)
                .and_then(|tensor| classifier.classify(&tensor));
            match scores {
                Ok(scores) => readings.push((*index, scores.is_occupied())),
                Err(err) => {
                    outcome.classifier_errors += 1;
                    log::warn!(
                        "frame {}: slot {} not classified: {:#}",
                        frame.sequence,
                        slot_id,
                        err
                    );
                }
            }
        }

        let payload = {
            let mut registry = match lock_registry(&registry) {
                Ok(registry) => registry,
                Err(err) => {
                    log::error!("processing stopped: {}", err);
                    break;
                }
            };
            let now = SystemTime::now();
            for (index, occupied) in readings.iter().copied() {
                if let Some(spot) = registry.get_mut(index) {
                    tracker.apply_reading(spot, occupied, now);
                }
            }
            encode(registry.snapshot())
        };
        outcome.frames_processed += 1;

        if let Some(sink) = sink.as_mut() {
            if sink.try_send(&payload) {
                outcome.telemetry_sent += 1;
            } else {
                outcome.telemetry_skipped += 1;
            }
        }
    }

    stop.cancel();
    match lock_registry(&registry) {
        Ok(mut registry) => registry.mark_all_offline(),
        Err(err) => log::error!("could not mark spots offline: {}", err),
    }
    outcome.readings = tracker.readings();
    outcome.transitions = tracker.transitions();
    log::info!(
        "processing stopped: {} frames, {} transitions",
        outcome.frames_processed,
        outcome.transitions
    );
    outcome
}

fn stage_finished<T>(handle: &Option<JoinHandle<T>>) -> bool {
    handle.as_ref().map_or(true, |handle| handle.is_finished())
}

fn lock_registry(registry: &Mutex<SpotRegistry>) -> Result<MutexGuard<'_, SpotRegistry>> {
    registry
        .lock()
        .map_err(|_| anyhow!("spot registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ClassScores;
    use crate::frame::PatchSize;
    use crate::ingest::SourceStats;
    use crate::telemetry::Payload;

    /// Emits `count` uniform 4x4 frames; odd sequence numbers are bright.
    struct CountingSource {
        count: u64,
        emitted: u64,
    }

    impl FrameSource for CountingSource {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.emitted >= self.count {
                return Ok(None);
            }
            self.emitted += 1;
            let shade = if self.emitted % 2 == 1 { 250 } else { 5 };
            Frame::new(vec![shade; 4 * 4 * 3], 4, 4, self.emitted).map(Some)
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.emitted,
                uri: "test://counting".to_string(),
            }
        }
    }

    struct BrightnessClassifier;

    impl OccupancyClassifier for BrightnessClassifier {
        fn name(&self) -> &'static str {
            "brightness"
        }

        fn input_size(&self) -> PatchSize {
            PatchSize::new(2, 2)
        }

        fn classify(&mut self, tensor: &[f32]) -> Result<ClassScores> {
            Ok(ClassScores::new(0.5, tensor[0]))
        }
    }

    struct CountingSink(Arc<Mutex<Vec<Payload>>>);

    impl TelemetrySink for CountingSink {
        fn try_send(&mut self, payload: &Payload) -> bool {
            self.0.lock().unwrap().push(*payload);
            true
        }
    }

    fn registry_with(regions: &[Rect]) -> Arc<Mutex<SpotRegistry>> {
        Arc::new(Mutex::new(
            SpotRegistry::from_regions(regions.iter().copied()).unwrap(),
        ))
    }

    fn settings(capacity: usize) -> PipelineSettings {
        PipelineSettings {
            handoff_capacity: capacity,
            poll_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn stop_token_is_shared_and_idempotent() {
        let token = StopToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn drains_every_frame_after_end_of_stream() {
        let registry = registry_with(&[Rect::new(0, 0, 4, 4)]);
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let session = MonitorSession::start(
            Box::new(CountingSource {
                count: 9,
                emitted: 0,
            }),
            Box::new(BrightnessClassifier),
            Some(Box::new(CountingSink(payloads.clone()))),
            registry.clone(),
            settings(2),
        )
        .unwrap();
        let report = session.join().unwrap();

        assert_eq!(report.frames_ingested, 9);
        assert_eq!(report.frames_processed, 9);
        assert_eq!(report.readings, 9);
        // bright, dark, bright, ... flips on every frame
        assert_eq!(report.transitions, 9);
        assert_eq!(report.telemetry_sent, 9);
        assert!(report.source_error.is_none());

        let taken: Vec<usize> = payloads.lock().unwrap().iter().map(|p| p.taken).collect();
        assert_eq!(taken, vec![1, 0, 1, 0, 1, 0, 1, 0, 1]);
        let registry = registry.lock().unwrap();
        assert!(registry.snapshot().iter().all(|spot| !spot.is_online()));
    }

    #[test]
    fn empty_registry_still_processes_frames() {
        let session = MonitorSession::start(
            Box::new(CountingSource {
                count: 3,
                emitted: 0,
            }),
            Box::new(BrightnessClassifier),
            None,
            registry_with(&[]),
            settings(1),
        )
        .unwrap();
        let report = session.join().unwrap();
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.readings, 0);
        assert_eq!(report.telemetry_sent + report.telemetry_skipped, 0);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let result = MonitorSession::start(
            Box::new(CountingSource {
                count: 1,
                emitted: 0,
            }),
            Box::new(BrightnessClassifier),
            None,
            registry_with(&[]),
            settings(0),
        );
        assert!(result.is_err());
    }
}
