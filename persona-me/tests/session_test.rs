//! Session lifecycle tests: turns, interrupts, barge-in and slow transports

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use persona_core::{AudioFormat, Role, RunId, TranscriptRecord};
use persona_me::{
    AvatarConfig, AvatarError, AvatarRenderer, ChannelSink, EchoGenerator, MemoryTranscriptSink, Outbound, Session,
    SessionCommand, SessionResources, SessionState, SessionUpdate, TranscriptSink, VisemeRenderer,
};
use persona_spk::engines::custom::CustomAsrEngine;
use persona_spk::engines::tone::ToneTtsEngine;
use persona_spk::{EngineAdapter, SpeechConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};

fn adapter() -> Arc<EngineAdapter> {
    Arc::new(
        EngineAdapter::builder()
            .with_tts(Arc::new(ToneTtsEngine::new("tone", 50, AudioFormat::default())), 1)
            .with_asr(
                Arc::new(CustomAsrEngine::new("fixed", |_: &[u8], _: &AudioFormat| {
                    Ok("hello from audio".to_string())
                })),
                1,
            )
            .build()
            .unwrap(),
    )
}

fn resources(transcripts: Arc<MemoryTranscriptSink>, word_delay: Duration) -> SessionResources {
    SessionResources::new(adapter(), SpeechConfig::default(), AvatarConfig::default())
        .with_generator(Arc::new(EchoGenerator::new().with_delay(word_delay)))
        .with_transcripts(transcripts)
}

/// What a consumer saw on the outbound channel, in order
#[derive(Default)]
struct Seen {
    states: Vec<SessionState>,
    /// (run, is_silence) per media frame
    media: Vec<(Option<RunId>, bool)>,
    errors: Vec<String>,
}

fn drain(mut rx: mpsc::Receiver<Outbound>, delay: Duration) -> Arc<Mutex<Seen>> {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let out = seen.clone();
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            {
                let mut seen = out.lock();
                match item {
                    Outbound::Media(frame) => seen.media.push((frame.chunk.run, frame.chunk.is_silence)),
                    Outbound::Update(SessionUpdate::State(state)) => seen.states.push(state),
                    Outbound::Update(SessionUpdate::Error(e)) => seen.errors.push(e),
                    Outbound::Update(SessionUpdate::Transcript(_)) => {}
                }
            }
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    });
    seen
}

async fn wait_for(state: &mut watch::Receiver<SessionState>, target: SessionState, within: Duration) {
    timeout(within, state.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("state {} not reached", target))
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_text_turn_runs_full_cycle() {
    let transcripts = Arc::new(MemoryTranscriptSink::new());
    let (sink, rx) = ChannelSink::new(64);
    let seen = drain(rx, Duration::ZERO);
    let session = Session::start(persona_core::SessionId::new(), resources(transcripts.clone(), Duration::from_millis(10)), Arc::new(sink))
        .await
        .unwrap();
    let mut state = session.subscribe_state();

    session.send(SessionCommand::Text("Good morning. How are you today?".into())).await.unwrap();
    wait_for(&mut state, SessionState::Speaking, Duration::from_secs(5)).await;
    wait_for(&mut state, SessionState::Idle, Duration::from_secs(30)).await;

    // Let the sender flush the last state update
    tokio::time::sleep(Duration::from_millis(100)).await;
    let run = session.current_run();
    {
        let seen = seen.lock();
        assert_eq!(
            seen.states,
            vec![SessionState::Listening, SessionState::Thinking, SessionState::Speaking, SessionState::Idle]
        );
        assert!(seen.media.iter().any(|(r, silent)| *r == Some(run) && !silent));
        assert!(seen.errors.is_empty());
    }

    let records = transcripts.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].role, Role::User);
    assert_eq!(records[0].text, "Good morning. How are you today?");
    assert_eq!(records[1].role, Role::Assistant);
    assert_eq!(records[1].text, "You said: Good morning. How are you today?");

    session.close().await;
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_silences_old_run_immediately() {
    let transcripts = Arc::new(MemoryTranscriptSink::new());
    let (sink, rx) = ChannelSink::new(1);
    let seen = drain(rx, Duration::ZERO);
    let session = Session::start(persona_core::SessionId::new(), resources(transcripts.clone(), Duration::from_millis(100)), Arc::new(sink))
        .await
        .unwrap();
    let mut state = session.subscribe_state();

    let long = "This is a long answer that keeps going. It has several sentences in it. \
                Each one takes a while to speak aloud. There is more after that too.";
    session.send(SessionCommand::Text(long.into())).await.unwrap();
    wait_for(&mut state, SessionState::Speaking, Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let speaking_run = session.current_run();
    session.send(SessionCommand::Interrupt).await.unwrap();
    // Idle again within one frame period
    wait_for(&mut state, SessionState::Idle, Duration::from_millis(20)).await;
    assert!(session.current_run() > speaking_run);
    let mark = seen.lock().media.len();

    tokio::time::sleep(Duration::from_secs(3)).await;
    {
        let seen = seen.lock();
        // One frame may sit in the channel and one in the sender's hands
        let ghosts = seen.media[(mark + 2).min(seen.media.len())..]
            .iter()
            .filter(|(run, silent)| *run == Some(speaking_run) && !silent)
            .count();
        assert_eq!(ghosts, 0);
        assert!(seen.media.len() > mark + 100);
        assert!(seen.states.ends_with(&[SessionState::Interrupted, SessionState::Idle]));
    }
    assert_eq!(session.state(), SessionState::Idle);

    // No assistant transcript for the interrupted run
    assert!(transcripts.records().iter().all(|r| r.role == Role::User));
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_barge_in_replaces_current_turn() {
    let transcripts = Arc::new(MemoryTranscriptSink::new());
    let (sink, rx) = ChannelSink::new(64);
    let _seen = drain(rx, Duration::ZERO);
    let session = Session::start(persona_core::SessionId::new(), resources(transcripts.clone(), Duration::from_millis(200)), Arc::new(sink))
        .await
        .unwrap();
    let mut state = session.subscribe_state();

    session
        .send(SessionCommand::Text("first question goes here. and it has a long tail of words".into()))
        .await
        .unwrap();
    wait_for(&mut state, SessionState::Speaking, Duration::from_secs(10)).await;
    let first_run = session.current_run();

    session.send(SessionCommand::Text("second question".into())).await.unwrap();

    let finished = timeout(Duration::from_secs(60), async {
        loop {
            if transcripts.records().iter().any(|r| r.role == Role::Assistant) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(finished.is_ok());
    wait_for(&mut state, SessionState::Idle, Duration::from_secs(30)).await;

    assert!(session.current_run() > first_run);
    let records = transcripts.records();
    let users: Vec<&str> = records.iter().filter(|r| r.role == Role::User).map(|r| r.text.as_str()).collect();
    let replies: Vec<&str> = records.iter().filter(|r| r.role == Role::Assistant).map(|r| r.text.as_str()).collect();
    assert_eq!(users, vec!["first question goes here. and it has a long tail of words", "second question"]);
    assert_eq!(replies, vec!["You said: second question"]);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_keeps_buffer_bounded() {
    let transcripts = Arc::new(MemoryTranscriptSink::new());
    let (sink, rx) = ChannelSink::new(1);
    // Consumer takes 100ms per message while the clock produces one every 20ms
    let seen = drain(rx, Duration::from_millis(100));
    let config = AvatarConfig::default();
    let capacity = config.max_buffered_frames;
    let session = Session::start(
        persona_core::SessionId::new(),
        SessionResources::new(adapter(), SpeechConfig::default(), config)
            .with_generator(Arc::new(EchoGenerator::new().with_delay(Duration::ZERO)))
            .with_transcripts(transcripts),
        Arc::new(sink),
    )
    .await
    .unwrap();
    let mut state = session.subscribe_state();

    session
        .send(SessionCommand::Text("Keep talking for a good while so the consumer falls behind.".into()))
        .await
        .unwrap();

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.buffered_frames() <= capacity);
    }

    assert!(session.frames_dropped() > 0);
    assert!(seen.lock().media.len() < 150);
    // The control path still works while the transport lags
    wait_for(&mut state, SessionState::Idle, Duration::from_secs(30)).await;
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_recorded_audio_becomes_a_turn() {
    let transcripts = Arc::new(MemoryTranscriptSink::new());
    let (sink, rx) = ChannelSink::new(64);
    let _seen = drain(rx, Duration::ZERO);
    let session = Session::start(persona_core::SessionId::new(), resources(transcripts.clone(), Duration::ZERO), Arc::new(sink))
        .await
        .unwrap();
    let mut state = session.subscribe_state();

    session.send(SessionCommand::StartRecording).await.unwrap();
    wait_for(&mut state, SessionState::Listening, Duration::from_secs(1)).await;
    session.send(SessionCommand::AudioInput(Bytes::from(vec![0u8; 3_200]))).await.unwrap();
    session.send(SessionCommand::AudioInput(Bytes::from(vec![0u8; 3_200]))).await.unwrap();
    session.send(SessionCommand::StopRecording).await.unwrap();

    wait_for(&mut state, SessionState::Speaking, Duration::from_secs(5)).await;
    wait_for(&mut state, SessionState::Idle, Duration::from_secs(30)).await;

    let records = transcripts.records();
    assert_eq!(records[0].text, "hello from audio");
    assert_eq!(records[1].text, "You said: hello from audio");
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_recording_returns_to_idle() {
    let (sink, rx) = ChannelSink::new(64);
    let _seen = drain(rx, Duration::ZERO);
    let session = Session::start(
        persona_core::SessionId::new(),
        resources(Arc::new(MemoryTranscriptSink::new()), Duration::ZERO),
        Arc::new(sink),
    )
    .await
    .unwrap();
    let mut state = session.subscribe_state();

    session.send(SessionCommand::StartRecording).await.unwrap();
    wait_for(&mut state, SessionState::Listening, Duration::from_secs(1)).await;
    session.send(SessionCommand::StopRecording).await.unwrap();
    wait_for(&mut state, SessionState::Idle, Duration::from_secs(1)).await;
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_empty_text_reports_error() {
    let (sink, rx) = ChannelSink::new(64);
    let seen = drain(rx, Duration::ZERO);
    let session = Session::start(
        persona_core::SessionId::new(),
        resources(Arc::new(MemoryTranscriptSink::new()), Duration::ZERO),
        Arc::new(sink),
    )
    .await
    .unwrap();

    session.send(SessionCommand::Text("   ".into())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().errors.len(), 1);
    assert_eq!(session.state(), SessionState::Idle);
    session.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_close_releases_avatar() {
    let renderer = Arc::new(VisemeRenderer::with_capacity(8, 8, 1));
    let make = |renderer: Arc<VisemeRenderer>| {
        SessionResources::new(adapter(), SpeechConfig::default(), AvatarConfig::default())
            .with_renderer(renderer as Arc<dyn AvatarRenderer>)
    };

    let (sink, _rx) = ChannelSink::new(8);
    let first = Session::start(persona_core::SessionId::new(), make(renderer.clone()), Arc::new(sink.clone()))
        .await
        .unwrap();
    assert!(Session::start(persona_core::SessionId::new(), make(renderer.clone()), Arc::new(sink.clone()))
        .await
        .is_err());

    first.close().await;
    assert_eq!(renderer.active_handles(), 0);
    let second = Session::start(persona_core::SessionId::new(), make(renderer.clone()), Arc::new(sink))
        .await
        .unwrap();
    second.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_transport_closes_session() {
    let (sink, rx) = ChannelSink::new(1);
    let session = Session::start(
        persona_core::SessionId::new(),
        resources(Arc::new(MemoryTranscriptSink::new()), Duration::ZERO),
        Arc::new(sink),
    )
    .await
    .unwrap();

    drop(rx);
    let closed = timeout(Duration::from_secs(1), async {
        while !session.is_closed() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(closed.is_ok());

    session.close().await;
    assert!(matches!(
        session.send(SessionCommand::Interrupt).await,
        Err(persona_me::AvatarError::SessionClosed)
    ));
}

/// Storage that takes ten seconds per record
struct SlowTranscriptSink {
    inner: MemoryTranscriptSink,
}

#[async_trait]
impl TranscriptSink for SlowTranscriptSink {
    async fn record(&self, record: TranscriptRecord) -> Result<(), AvatarError> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        self.inner.record(record).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_transcript_storage_does_not_hold_the_turn() {
    let storage = Arc::new(SlowTranscriptSink {
        inner: MemoryTranscriptSink::new(),
    });
    let (sink, mut rx) = ChannelSink::new(64);
    let last_audio = Arc::new(Mutex::new(None::<Instant>));
    let seen = last_audio.clone();
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if let Outbound::Media(frame) = item {
                if frame.chunk.run.is_some() && !frame.chunk.is_silence {
                    *seen.lock() = Some(Instant::now());
                }
            }
        }
    });

    let config = AvatarConfig::default();
    let period = Duration::from_secs(1) / config.frame_rate;
    let session = Session::start(
        persona_core::SessionId::new(),
        SessionResources::new(adapter(), SpeechConfig::default(), config)
            .with_generator(Arc::new(EchoGenerator::new().with_delay(Duration::ZERO)))
            .with_transcripts(storage.clone()),
        Arc::new(sink),
    )
    .await
    .unwrap();
    let mut state = session.subscribe_state();

    let started = Instant::now();
    session.send(SessionCommand::Text("Hi there.".into())).await.unwrap();
    wait_for(&mut state, SessionState::Speaking, Duration::from_secs(1)).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    wait_for(&mut state, SessionState::Idle, Duration::from_secs(5)).await;
    let idle_at = Instant::now();
    let last = (*last_audio.lock()).expect("reply audio was sent");
    // The drained notice lands on the tick after the last chunk
    assert!(idle_at.duration_since(last) <= period);

    // Both records still reach storage, in order
    tokio::time::sleep(Duration::from_secs(25)).await;
    let records = storage.inner.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].role, Role::User);
    assert_eq!(records[1].text, "You said: Hi there.");
    session.close().await;
}
