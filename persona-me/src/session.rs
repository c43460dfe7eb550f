//! One connected user's live interaction
//!
//! A session runs these tasks:
//! - control: owns the state machine, handles commands and starts turns
//! - pacing: ticks the frame clock and moves audio into the frame buffer
//! - sender: renders buffered chunks and writes everything to the sink
//! - transcripts: hands records to the transcript sink in order
//!
//! Each turn runs in its own task (recognize, generate, segment,
//! synthesize). Interrupts advance the session's run, which makes every
//! piece of in-flight work for the old run stale wherever it is checked.

use crate::config::AvatarConfig;
use crate::dialogue::{EchoGenerator, GenerationRequest, TextGenerator, TracingTranscriptSink, TranscriptSink};
use crate::error::AvatarError;
use crate::frame_clock::{FrameBuffer, FrameChunk, FrameClock, PlaybackQueue};
use crate::providers::VisemeRenderer;
use crate::renderer::{AvatarHandle, AvatarRenderer, VideoFrame};
use crate::state::{SessionEvent, SessionState};
use crate::transport::{FrameSink, MediaFrame, SessionUpdate};
use bytes::{Bytes, BytesMut};
use futures::{future, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use persona_core::{AudioSegment, Role, RunGuard, RunId, SessionId, TranscriptRecord};
use persona_spk::{segment_stream, EngineAdapter, SpeechConfig, SpeechError, SynthesisScheduler, VoiceConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Control messages accepted by a session
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Text(String),
    StartRecording,
    /// PCM in the adapter's format; only kept while recording
    AudioInput(Bytes),
    StopRecording,
    /// Select the synthesis voice for subsequent turns
    SetAudioType(String),
    Interrupt,
    Close,
}

/// Everything a session needs from the process, shared across sessions
#[derive(Clone)]
pub struct SessionResources {
    pub adapter: Arc<EngineAdapter>,
    pub speech: Arc<SpeechConfig>,
    pub avatar: Arc<AvatarConfig>,
    pub renderer: Arc<dyn AvatarRenderer>,
    pub generator: Arc<dyn TextGenerator>,
    pub transcripts: Arc<dyn TranscriptSink>,
}

impl SessionResources {
    /// Resources with the built-in renderer, echo generator and logging transcript sink
    pub fn new(adapter: Arc<EngineAdapter>, speech: SpeechConfig, avatar: AvatarConfig) -> Self {
        let renderer = Arc::new(VisemeRenderer::new(avatar.frame_width, avatar.frame_height));
        Self {
            adapter,
            speech: Arc::new(speech),
            avatar: Arc::new(avatar),
            renderer,
            generator: Arc::new(EchoGenerator::new()),
            transcripts: Arc::new(TracingTranscriptSink),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn AvatarRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_transcripts(mut self, transcripts: Arc<dyn TranscriptSink>) -> Self {
        self.transcripts = transcripts;
        self
    }
}

/// Items on the scheduler-to-playback channel
#[derive(Debug)]
enum PlaybackItem {
    Segment(AudioSegment),
    /// No more segments will follow for this run
    EndOfRun(RunId),
}

impl From<AudioSegment> for PlaybackItem {
    fn from(segment: AudioSegment) -> Self {
        PlaybackItem::Segment(segment)
    }
}

/// Reports from the pacing and sender tasks to the control task
#[derive(Debug)]
enum Notice {
    PlaybackStarted(RunId),
    PlaybackDrained(RunId),
    TransportLost,
}

pub struct Session {
    id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    guard: RunGuard,
    buffer: Arc<FrameBuffer>,
    last_activity: Mutex<Instant>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Acquire the avatar and start the session's tasks
    pub async fn start(
        id: SessionId,
        resources: SessionResources,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self, AvatarError> {
        let format = resources.adapter.format();
        resources.avatar.validate_for(&format).map_err(AvatarError::Config)?;
        let clock = FrameClock::new(resources.avatar.frame_rate, &format)?;

        let handle = resources.renderer.acquire(resources.avatar.avatar_id.as_deref()).await?;

        let (command_tx, command_rx) = mpsc::channel(resources.avatar.command_queue_depth);
        let (playback_tx, playback_rx) = mpsc::channel(resources.avatar.audio_queue_depth);
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let buffer = Arc::new(FrameBuffer::new(resources.avatar.max_buffered_frames));
        let guard = RunGuard::new();
        let shutdown = CancellationToken::new();
        let transcripts = spawn_transcript_writer(id, resources.transcripts.clone());

        let pacing = PacingLoop {
            id,
            clock,
            playback: PlaybackQueue::new(),
            items: playback_rx,
            guard: guard.clone(),
            buffer: buffer.clone(),
            notices: notice_tx.clone(),
            last_started: None,
            shutdown: shutdown.clone(),
        };

        let sender = SenderLoop {
            id,
            renderer: resources.renderer.clone(),
            handle,
            sink,
            guard: guard.clone(),
            buffer: buffer.clone(),
            updates: update_rx,
            notices: notice_tx,
            render_timeout: resources.avatar.render_timeout(),
            last_frame: VideoFrame::blank(resources.avatar.frame_width, resources.avatar.frame_height),
            render_failures: 0,
            shutdown: shutdown.clone(),
        };

        let control = ControlLoop {
            id,
            scheduler: Arc::new(SynthesisScheduler::new(
                resources.adapter.clone(),
                resources.speech.scheduler.clone(),
            )),
            voice: resources.speech.voice.clone(),
            resources,
            state: SessionState::Idle,
            state_tx,
            updates: update_tx,
            transcripts,
            guard: guard.clone(),
            playback_tx,
            recording: None,
            turn: None,
            shutdown: shutdown.clone(),
        };

        let tasks = vec![
            tokio::spawn(pacing.run()),
            tokio::spawn(sender.run()),
            tokio::spawn(control.run(command_rx, notice_rx)),
        ];

        info!(session = %id, "Session started");
        Ok(Self {
            id,
            commands: command_tx,
            state: state_rx,
            guard,
            buffer,
            last_activity: Mutex::new(Instant::now()),
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a command for the control task
    pub async fn send(&self, command: SessionCommand) -> Result<(), AvatarError> {
        *self.last_activity.lock() = Instant::now();
        self.commands
            .send(command)
            .await
            .map_err(|_| AvatarError::SessionClosed)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn current_run(&self) -> RunId {
        self.guard.current()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.buffer.dropped()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    /// Time since the last command from the client
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// True once the session has stopped, on request or because the transport went away
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop all tasks and release the avatar. Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(session = %self.id, "Session task ended abnormally: {}", e);
            }
        }
        debug!(session = %self.id, "Session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum TurnInput {
    Text(String),
    Audio(Bytes),
}

struct Turn {
    run: RunId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct ControlLoop {
    id: SessionId,
    resources: SessionResources,
    scheduler: Arc<SynthesisScheduler>,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    transcripts: mpsc::Sender<TranscriptRecord>,
    guard: RunGuard,
    playback_tx: mpsc::Sender<PlaybackItem>,
    voice: VoiceConfig,
    recording: Option<BytesMut>,
    turn: Option<Turn>,
    shutdown: CancellationToken,
}

impl ControlLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut notices: mpsc::UnboundedReceiver<Notice>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                Some(notice) = notices.recv() => self.on_notice(notice),

                command = commands.recv() => match command {
                    Some(SessionCommand::Close) | None => break,
                    Some(command) => self.on_command(command),
                },
            }
        }

        self.stop_turn();
        self.shutdown.cancel();
        debug!(session = %self.id, "Control loop stopped");
    }

    fn on_command(&mut self, command: SessionCommand) {
        debug!(session = %self.id, state = %self.state, "Command: {:?}", CommandKind(&command));
        match command {
            SessionCommand::Text(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    self.report_error("Text input cannot be empty");
                    return;
                }
                self.begin_input();
                self.recording = None;
                self.apply(SessionEvent::InputCaptured);
                self.start_turn(TurnInput::Text(text));
            }
            SessionCommand::StartRecording => {
                self.begin_input();
                self.recording = Some(BytesMut::new());
            }
            SessionCommand::AudioInput(audio) => {
                let limit = self.resources.avatar.max_recording_bytes;
                let Some(buffer) = self.recording.as_mut() else {
                    debug!(session = %self.id, "Audio outside of a recording ignored");
                    return;
                };
                if buffer.len() + audio.len() > limit {
                    warn!(session = %self.id, "Recording limit reached, dropping {} bytes", audio.len());
                    self.report_error("Recording too long");
                } else {
                    buffer.extend_from_slice(&audio);
                }
            }
            SessionCommand::StopRecording => match self.recording.take() {
                Some(audio) if !audio.is_empty() && self.state == SessionState::Listening => {
                    self.apply(SessionEvent::InputCaptured);
                    self.start_turn(TurnInput::Audio(audio.freeze()));
                }
                Some(_) => {
                    debug!(session = %self.id, "Empty recording discarded");
                    if self.state == SessionState::Listening {
                        self.apply(SessionEvent::Reset);
                    }
                }
                None => debug!(session = %self.id, "stopRecording without startRecording"),
            },
            SessionCommand::SetAudioType(name) => {
                let voice = self.voice.with_name(name);
                match voice.validate() {
                    Ok(()) => {
                        info!(session = %self.id, "Voice set to {:?}", voice.name);
                        self.voice = voice;
                    }
                    Err(e) => self.report_error(&e),
                }
            }
            SessionCommand::Interrupt => {
                if self.state.is_busy() {
                    self.interrupt();
                } else {
                    debug!(session = %self.id, "Nothing to interrupt in state {}", self.state);
                }
            }
            // Handled by the loop
            SessionCommand::Close => {}
        }
    }

    fn on_notice(&mut self, notice: Notice) {
        match notice {
            Notice::PlaybackStarted(run) => {
                if self.guard.is_current(run) && self.state == SessionState::Thinking {
                    self.apply(SessionEvent::AudioStarted);
                }
            }
            Notice::PlaybackDrained(run) => {
                if self.guard.is_current(run) && self.state.is_busy() {
                    self.apply(SessionEvent::PlaybackDrained);
                    self.turn = None;
                }
            }
            Notice::TransportLost => {
                warn!(session = %self.id, "Transport lost, closing session");
                self.shutdown.cancel();
            }
        }
    }

    /// Interrupt a running turn, then move to Listening
    fn begin_input(&mut self) {
        if self.state.is_busy() {
            self.interrupt();
        }
        if self.state == SessionState::Idle {
            self.apply(SessionEvent::UserInput);
        }
    }

    fn interrupt(&mut self) {
        let run = self.guard.advance();
        self.stop_turn();
        self.apply(SessionEvent::Interrupt);
        self.apply(SessionEvent::Reset);
        info!(session = %self.id, "Interrupted, now on {}", run);
    }

    fn stop_turn(&mut self) {
        if let Some(turn) = self.turn.take() {
            debug!(session = %self.id, "Stopping turn {}", turn.run);
            turn.cancel.cancel();
            turn.task.abort();
        }
    }

    fn start_turn(&mut self, input: TurnInput) {
        self.stop_turn();
        let run = self.guard.advance();
        let cancel = self.shutdown.child_token();

        let context = TurnContext {
            session_id: self.id,
            resources: self.resources.clone(),
            scheduler: self.scheduler.clone(),
            voice: self.voice.clone(),
            guard: self.guard.clone(),
            playback_tx: self.playback_tx.clone(),
            updates: self.updates.clone(),
            transcripts: self.transcripts.clone(),
        };
        let task = tokio::spawn(context.run(input, run, cancel.clone()));
        self.turn = Some(Turn { run, cancel, task });
    }

    fn apply(&mut self, event: SessionEvent) {
        match self.state.transition(event) {
            Ok(next) => {
                debug!(session = %self.id, "{} -> {} on {:?}", self.state, next, event);
                self.state = next;
                self.state_tx.send_replace(next);
                let _ = self.updates.send(SessionUpdate::State(next));
            }
            Err(e) => warn!(session = %self.id, "{}", e),
        }
    }

    fn report_error(&self, message: &str) {
        let _ = self.updates.send(SessionUpdate::Error(message.to_string()));
    }
}

/// Debug view of a command that leaves out audio payloads and user text
struct CommandKind<'a>(&'a SessionCommand);

impl std::fmt::Debug for CommandKind<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            SessionCommand::Text(text) => write!(f, "Text({} chars)", text.chars().count()),
            SessionCommand::AudioInput(audio) => write!(f, "AudioInput({} bytes)", audio.len()),
            other => write!(f, "{:?}", other),
        }
    }
}

struct TurnContext {
    session_id: SessionId,
    resources: SessionResources,
    scheduler: Arc<SynthesisScheduler>,
    voice: VoiceConfig,
    guard: RunGuard,
    playback_tx: mpsc::Sender<PlaybackItem>,
    updates: mpsc::UnboundedSender<SessionUpdate>,
    transcripts: mpsc::Sender<TranscriptRecord>,
}

impl TurnContext {
    async fn run(self, input: TurnInput, run: RunId, cancel: CancellationToken) {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(session = %self.session_id, "Turn {} cancelled", run);
                return;
            }
            result = self.execute(input, run, &cancel) => result,
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session = %self.session_id, "Turn {} failed: {}", run, e);
                let _ = self.updates.send(SessionUpdate::Error(e.to_string()));
                None
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = self.playback_tx.send(PlaybackItem::EndOfRun(run)) => {}
        }

        if let Some(reply) = reply {
            self.record(Role::Assistant, &reply);
        }
    }

    /// Runs the turn up to the last released segment and returns the reply to record
    async fn execute(
        &self,
        input: TurnInput,
        run: RunId,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AvatarError> {
        let text = match input {
            TurnInput::Text(text) => text,
            TurnInput::Audio(audio) => {
                let format = self.resources.adapter.format();
                let text = self.resources.adapter.recognize(&audio, &format).await?;
                if text.trim().is_empty() {
                    return Err(SpeechError::InvalidInput("No speech recognized".to_string()).into());
                }
                text
            }
        };
        self.record(Role::User, &text);

        let fragments = self
            .resources
            .generator
            .generate(GenerationRequest {
                session_id: self.session_id,
                run,
                text,
            })
            .await?;

        let mut reply = String::new();
        let session_id = self.session_id;
        let fragments = fragments
            .inspect(move |fragment| {
                if let Err(e) = fragment {
                    warn!(session = %session_id, "Text generation stopped: {}", e);
                }
            })
            .take_while(|fragment| future::ready(fragment.is_ok()))
            .filter_map(|fragment| future::ready(fragment.ok()))
            .inspect(|fragment| reply.push_str(fragment));

        let segments = segment_stream(fragments, self.resources.speech.segmenter.clone(), run);
        let report = self
            .scheduler
            .run(
                segments,
                self.voice.clone(),
                self.guard.clone(),
                run,
                cancel.clone(),
                self.playback_tx.clone(),
            )
            .await?;

        debug!(
            session = %self.session_id,
            "Turn {} synthesized: released={} silenced={} stale={}",
            run, report.released, report.silenced, report.stale_dropped
        );
        let reply = reply.trim();
        if report.cancelled || reply.is_empty() {
            return Ok(None);
        }
        Ok(Some(reply.to_string()))
    }

    /// Hand a record to the session's writer without waiting on storage
    fn record(&self, role: Role, text: &str) {
        let record = TranscriptRecord::new(self.session_id, role, text);
        if let Err(e) = self.transcripts.try_send(record.clone()) {
            warn!(session = %self.session_id, "Transcript record dropped: {}", e);
        }
        let _ = self.updates.send(SessionUpdate::Transcript(record));
    }
}

/// Records waiting for a slow sink before new ones are dropped
const TRANSCRIPT_QUEUE_DEPTH: usize = 64;

/// Writes transcript records in order on their own task. The task ends once
/// every sender is gone, after the records already queued are written.
fn spawn_transcript_writer(id: SessionId, sink: Arc<dyn TranscriptSink>) -> mpsc::Sender<TranscriptRecord> {
    let (tx, mut rx) = mpsc::channel::<TranscriptRecord>(TRANSCRIPT_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            if let Err(e) = sink.record(record).await {
                warn!(session = %id, "Transcript sink failed: {}", e);
            }
        }
        debug!(session = %id, "Transcript writer stopped");
    });
    tx
}

struct PacingLoop {
    id: SessionId,
    clock: FrameClock,
    playback: PlaybackQueue,
    items: mpsc::Receiver<PlaybackItem>,
    guard: RunGuard,
    buffer: Arc<FrameBuffer>,
    notices: mpsc::UnboundedSender<Notice>,
    last_started: Option<RunId>,
    shutdown: CancellationToken,
}

impl PacingLoop {
    async fn run(mut self) {
        let mut interval = tokio::time::interval(self.clock.period());
        // Late ticks are caught up rather than skipped
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            self.refill();
            let chunk = self.clock.tick(&mut self.playback);
            if self.buffer.push(chunk) {
                counter!("persona_frames_dropped_total").increment(1);
            }
        }

        self.buffer.close();
        debug!(session = %self.id, "Pacing stopped after {} ticks", self.clock.ticks());
    }

    /// Pull the next playable segment when nothing is playing
    fn refill(&mut self) {
        if let Some(run) = self.playback.current_run() {
            if !self.guard.is_current(run) {
                debug!(session = %self.id, "Cutting playback of superseded {}", run);
                self.playback.clear();
            }
        }

        while self.playback.is_idle() {
            match self.items.try_recv() {
                Ok(PlaybackItem::Segment(segment)) => {
                    if !self.guard.is_current(segment.run) {
                        counter!("persona_segments_stale_total").increment(1);
                        continue;
                    }
                    if self.last_started != Some(segment.run) {
                        self.last_started = Some(segment.run);
                        let _ = self.notices.send(Notice::PlaybackStarted(segment.run));
                    }
                    self.playback.start(segment);
                }
                Ok(PlaybackItem::EndOfRun(run)) => {
                    if self.guard.is_current(run) {
                        let _ = self.notices.send(Notice::PlaybackDrained(run));
                    }
                }
                Err(_) => break,
            }
        }
    }
}

enum Outgoing {
    Update(SessionUpdate),
    Media(FrameChunk),
}

struct SenderLoop {
    id: SessionId,
    renderer: Arc<dyn AvatarRenderer>,
    handle: AvatarHandle,
    sink: Arc<dyn FrameSink>,
    guard: RunGuard,
    buffer: Arc<FrameBuffer>,
    updates: mpsc::UnboundedReceiver<SessionUpdate>,
    notices: mpsc::UnboundedSender<Notice>,
    render_timeout: Duration,
    last_frame: VideoFrame,
    render_failures: u64,
    shutdown: CancellationToken,
}

impl SenderLoop {
    async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        loop {
            let outgoing = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(update) = self.updates.recv() => Outgoing::Update(update),
                chunk = self.buffer.pop() => match chunk {
                    Some(chunk) => Outgoing::Media(chunk),
                    None => break,
                },
            };

            // A stalled transport must not keep the session from closing
            let sent = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = self.deliver(outgoing) => sent,
            };

            if let Err(e) = sent {
                debug!(session = %self.id, "Send failed: {}", e);
                let _ = self.notices.send(Notice::TransportLost);
                break;
            }
        }

        let SenderLoop { id, renderer, handle, .. } = self;
        if let Err(e) = renderer.release(handle).await {
            warn!(session = %id, "Failed to release avatar: {}", e);
        }
    }

    async fn deliver(&mut self, outgoing: Outgoing) -> Result<(), AvatarError> {
        match outgoing {
            Outgoing::Update(update) => self.sink.send_event(update).await,
            Outgoing::Media(mut chunk) => {
                // Paced before an interrupt but not yet sent
                if chunk.run.is_some_and(|run| !self.guard.is_current(run)) {
                    chunk.mute();
                }
                let video = self.render(&chunk).await;
                self.sink.send_media(MediaFrame { chunk, video }).await
            }
        }
    }

    /// Render `chunk`, repeating the last good frame on failure or timeout
    async fn render(&mut self, chunk: &FrameChunk) -> VideoFrame {
        let outcome = tokio::time::timeout(self.render_timeout, self.renderer.render_frame(&self.handle, chunk)).await;
        match outcome {
            Ok(Ok(frame)) => {
                if self.render_failures > 0 {
                    debug!(session = %self.id, "Renderer recovered after {} failures", self.render_failures);
                    self.render_failures = 0;
                }
                self.last_frame = frame.clone();
                frame
            }
            Ok(Err(e)) => {
                self.note_render_failure(&e.to_string());
                self.last_frame.clone()
            }
            Err(_) => {
                self.note_render_failure("timed out");
                self.last_frame.clone()
            }
        }
    }

    fn note_render_failure(&mut self, reason: &str) {
        self.render_failures += 1;
        if self.render_failures == 1 {
            warn!(session = %self.id, "Frame render failed ({}), repeating last frame", reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_kind_hides_payloads() {
        let text = format!("{:?}", CommandKind(&SessionCommand::Text("secret words".into())));
        assert_eq!(text, "Text(12 chars)");
        let audio = format!("{:?}", CommandKind(&SessionCommand::AudioInput(Bytes::from(vec![0u8; 64]))));
        assert_eq!(audio, "AudioInput(64 bytes)");
        assert_eq!(format!("{:?}", CommandKind(&SessionCommand::Interrupt)), "Interrupt");
    }

    #[test]
    fn test_playback_item_from_segment() {
        let segment = AudioSegment::new(4, RunId(2), Bytes::new(), &persona_core::AudioFormat::default());
        assert!(matches!(PlaybackItem::from(segment), PlaybackItem::Segment(s) if s.sequence == 4));
    }
}
