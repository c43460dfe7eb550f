//! Synthesis scheduling
//!
//! Takes one run's utterance segments in order, keeps at most
//! `max_in_flight` synthesis calls running for the session and releases the
//! resulting audio strictly in sequence order. Segments beyond the limit
//! wait in a FIFO queue. Segments of a superseded run are never released:
//! the run is checked right before and right after waiting for room in the
//! output channel.

use crate::adapter::EngineAdapter;
use crate::config::{SchedulerConfig, VoiceConfig};
use crate::error::SpeechError;
use crate::reorder::ReorderBuffer;
use futures::{FutureExt, Stream, StreamExt};
use metrics::counter;
use persona_core::{AudioFormat, AudioSegment, RunGuard, RunId, UtteranceSegment};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Outcome of one scheduler run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Segments handed to the output channel, silent ones included
    pub released: usize,
    /// Released segments that carry silence because synthesis failed
    pub silenced: usize,
    /// Segments dropped because their run was superseded
    pub stale_dropped: usize,
    /// The run was interrupted before all segments were released
    pub cancelled: bool,
}

enum Release {
    Sent,
    Stop,
}

pub struct SynthesisScheduler {
    adapter: Arc<EngineAdapter>,
    config: SchedulerConfig,
    format: AudioFormat,
}

impl SynthesisScheduler {
    pub fn new(adapter: Arc<EngineAdapter>, config: SchedulerConfig) -> Self {
        let format = adapter.format();
        Self { adapter, config, format }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Drive one generation run to completion.
    ///
    /// Returns once every segment has been released, or as soon as `cancel`
    /// fires or `guard` moves past `run`. In-flight synthesis calls are
    /// aborted on return. Fails only if the receiving side of `sink` is gone.
    pub async fn run<S, T>(
        &self,
        segments: S,
        voice: VoiceConfig,
        guard: RunGuard,
        run: RunId,
        cancel: CancellationToken,
        sink: mpsc::Sender<T>,
    ) -> Result<SchedulerReport, SpeechError>
    where
        S: Stream<Item = UtteranceSegment> + Send,
        T: From<AudioSegment> + Send,
    {
        let mut segments = std::pin::pin!(segments);
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut tasks: JoinSet<(u64, AudioSegment)> = JoinSet::new();
        let mut waiting: VecDeque<(u64, UtteranceSegment)> = VecDeque::new();
        // Keyed by arrival order; segments arrive in sequence order
        let mut ready: ReorderBuffer<AudioSegment> = ReorderBuffer::new();
        let mut arrivals = 0u64;
        let mut upstream_done = false;
        let mut report = SchedulerReport::default();

        'outer: loop {
            if cancel.is_cancelled() || !guard.is_current(run) {
                report.cancelled = true;
                break;
            }

            while !waiting.is_empty() {
                let permit = match permits.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                if let Some((slot, segment)) = waiting.pop_front() {
                    self.dispatch(&mut tasks, slot, segment, &voice, permit);
                }
            }

            while let Some(audio) = ready.pop_ready() {
                match self.release(audio, &guard, run, &cancel, &sink, &mut report).await? {
                    Release::Sent => {}
                    Release::Stop => {
                        report.cancelled = true;
                        break 'outer;
                    }
                }
            }

            if upstream_done && waiting.is_empty() && tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok((slot, audio)) => {
                            ready.insert(slot, audio);
                        }
                        Err(e) => {
                            // Tasks are only aborted on return, so this is unexpected
                            warn!("Synthesis task for {} ended abnormally: {}", run, e);
                        }
                    }
                }

                next = segments.next(), if !upstream_done => {
                    match next {
                        Some(segment) if segment.run != run => {
                            debug!("Dropping segment {} of superseded {}", segment.sequence, segment.run);
                            report.stale_dropped += 1;
                            counter!("persona_segments_stale_total").increment(1);
                        }
                        Some(segment) => {
                            waiting.push_back((arrivals, segment));
                            arrivals += 1;
                        }
                        None => upstream_done = true,
                    }
                }
            }
        }

        if report.cancelled {
            let dropped = ready.buffered() + waiting.len() + tasks.len();
            if dropped > 0 {
                debug!("{} interrupted: discarding {} pending segments", run, dropped);
                report.stale_dropped += dropped;
                counter!("persona_segments_stale_total").increment(dropped as u64);
            }
        }
        tasks.abort_all();

        debug!(
            "{} scheduler finished: released={} silenced={} stale={} cancelled={}",
            run, report.released, report.silenced, report.stale_dropped, report.cancelled
        );
        Ok(report)
    }

    fn dispatch(
        &self,
        tasks: &mut JoinSet<(u64, AudioSegment)>,
        slot: u64,
        segment: UtteranceSegment,
        voice: &VoiceConfig,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let adapter = self.adapter.clone();
        let voice = voice.clone();
        let format = self.format;
        let silence = self.config.silence_on_failure();

        tasks.spawn(async move {
            let _permit = permit;
            let outcome = AssertUnwindSafe(adapter.synthesize(&segment.text, &voice))
                .catch_unwind()
                .await;

            let audio = match outcome {
                Ok(Ok(bytes)) => AudioSegment::new(segment.sequence, segment.run, bytes, &format),
                Ok(Err(e)) => {
                    warn!("Segment {} of {} replaced by silence: {}", segment.sequence, segment.run, e);
                    AudioSegment::silence(segment.sequence, segment.run, silence, &format)
                }
                Err(_) => {
                    warn!("Synthesis panicked for segment {} of {}", segment.sequence, segment.run);
                    AudioSegment::silence(segment.sequence, segment.run, silence, &format)
                }
            };
            (slot, audio)
        });
    }

    async fn release<T>(
        &self,
        audio: AudioSegment,
        guard: &RunGuard,
        run: RunId,
        cancel: &CancellationToken,
        sink: &mpsc::Sender<T>,
        report: &mut SchedulerReport,
    ) -> Result<Release, SpeechError>
    where
        T: From<AudioSegment>,
    {
        if !guard.is_current(run) {
            report.stale_dropped += 1;
            counter!("persona_segments_stale_total").increment(1);
            return Ok(Release::Stop);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                report.stale_dropped += 1;
                return Ok(Release::Stop);
            }
            permit = sink.reserve() => permit.map_err(|_| SpeechError::Cancelled)?,
        };

        // The run may have been superseded while waiting for room
        if !guard.is_current(run) {
            report.stale_dropped += 1;
            counter!("persona_segments_stale_total").increment(1);
            return Ok(Release::Stop);
        }

        report.released += 1;
        if audio.silent {
            report.silenced += 1;
        }
        counter!("persona_segments_released_total").increment(1);
        permit.send(T::from(audio));
        Ok(Release::Sent)
    }
}
