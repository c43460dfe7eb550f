//! Synthesis scheduler ordering, concurrency and interruption tests

use bytes::Bytes;
use futures::{stream, FutureExt};
use persona_core::{AudioSegment, RunGuard, RunId, UtteranceSegment};
use persona_spk::engines::custom::CustomTtsEngine;
use persona_spk::{AdapterConfig, EngineAdapter, SchedulerConfig, SynthesisScheduler, VoiceConfig};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn adapter(engine: CustomTtsEngine) -> Arc<EngineAdapter> {
    Arc::new(
        EngineAdapter::builder()
            .config(AdapterConfig {
                enable_cache: false,
                synthesis_timeout_ms: 60_000,
                ..Default::default()
            })
            .with_tts(Arc::new(engine), 0)
            .build()
            .unwrap(),
    )
}

fn numbered(run: RunId, count: usize) -> Vec<UtteranceSegment> {
    (0..count)
        .map(|i| UtteranceSegment {
            sequence: i as u64,
            text: format!("seg {}", i),
            run,
        })
        .collect()
}

/// Engine whose latency for "seg N" is `delays[N]` milliseconds
fn delayed(delays: Vec<u64>) -> CustomTtsEngine {
    let delays = Arc::new(delays);
    CustomTtsEngine::from_async("delayed", move |text: String, _voice| {
        let index: usize = text.trim_start_matches("seg ").parse().unwrap_or(0);
        let delay = delays.get(index).copied().unwrap_or(0);
        async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(Bytes::from(vec![0u8; 640]))
        }
        .boxed()
    })
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_release_order_independent_of_completion_order(
        delays in proptest::collection::vec(0u64..50, 1..16),
        max_in_flight in 1usize..8,
    ) {
        let count = delays.len();
        let received = paused_runtime().block_on(async move {
            let scheduler = SynthesisScheduler::new(
                adapter(delayed(delays)),
                SchedulerConfig { max_in_flight, ..Default::default() },
            );
            let guard = RunGuard::new();
            let run = guard.advance();
            let (tx, mut rx) = mpsc::channel::<AudioSegment>(count);

            let report = scheduler
                .run(stream::iter(numbered(run, count)), VoiceConfig::default(), guard, run, CancellationToken::new(), tx)
                .await
                .unwrap();
            assert_eq!(report.released, count);

            let mut received = Vec::new();
            while let Some(segment) = rx.recv().await {
                received.push(segment.sequence);
            }
            received
        });
        prop_assert_eq!(received, (0..count as u64).collect::<Vec<_>>());
    }
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_limit_respected() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (c, p) = (current.clone(), peak.clone());
    let engine = CustomTtsEngine::from_async("tracked", move |_text, _voice| {
        let (c, p) = (c.clone(), p.clone());
        async move {
            let now = c.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            c.fetch_sub(1, Ordering::SeqCst);
            Ok(Bytes::from(vec![0u8; 64]))
        }
        .boxed()
    });

    let scheduler = SynthesisScheduler::new(
        adapter(engine),
        SchedulerConfig {
            max_in_flight: 3,
            ..Default::default()
        },
    );
    let guard = RunGuard::new();
    let run = guard.advance();
    let (tx, mut rx) = mpsc::channel::<AudioSegment>(32);

    let report = scheduler
        .run(stream::iter(numbered(run, 20)), VoiceConfig::default(), guard, run, CancellationToken::new(), tx)
        .await
        .unwrap();

    assert_eq!(report.released, 20);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    let mut count = 0;
    while rx.recv().await.is_some() {
        count += 1;
    }
    assert_eq!(count, 20);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_room_releases_nothing_more() {
    let scheduler = Arc::new(SynthesisScheduler::new(adapter(delayed(vec![0; 8])), SchedulerConfig::default()));
    let guard = RunGuard::new();
    let run = guard.advance();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<AudioSegment>(1);

    let handle = {
        let (scheduler, guard, cancel) = (scheduler.clone(), guard.clone(), cancel.clone());
        tokio::spawn(async move {
            scheduler
                .run(stream::iter(numbered(run, 8)), VoiceConfig::default(), guard, run, cancel, tx)
                .await
        })
    };

    // Let the scheduler fill the channel and block on the second segment
    tokio::time::sleep(Duration::from_millis(100)).await;
    guard.advance();
    cancel.cancel();

    let report = handle.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.released, 1);
    assert!(report.stale_dropped >= 1);

    assert_eq!(rx.recv().await.map(|s| s.sequence), Some(0));
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_superseded_while_waiting_for_room() {
    let scheduler = Arc::new(SynthesisScheduler::new(adapter(delayed(vec![0; 4])), SchedulerConfig::default()));
    let guard = RunGuard::new();
    let run = guard.advance();
    let (tx, mut rx) = mpsc::channel::<AudioSegment>(1);

    let handle = {
        let (scheduler, guard) = (scheduler.clone(), guard.clone());
        tokio::spawn(async move {
            scheduler
                .run(stream::iter(numbered(run, 4)), VoiceConfig::default(), guard, run, CancellationToken::new(), tx)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Interrupt without the token: room frees up, but the run check after the wait stops release
    guard.advance();
    assert_eq!(rx.recv().await.map(|s| s.sequence), Some(0));

    let report = handle.await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.released, 1);
    assert!(rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_segments_do_not_block_later_synthesis() {
    // Segment 0 is slow; the rest finish first but must wait for it
    let scheduler = SynthesisScheduler::new(adapter(delayed(vec![200, 1, 1, 1])), SchedulerConfig::default());
    let guard = RunGuard::new();
    let run = guard.advance();
    let (tx, mut rx) = mpsc::channel::<AudioSegment>(8);

    let started = tokio::time::Instant::now();
    scheduler
        .run(stream::iter(numbered(run, 4)), VoiceConfig::default(), guard, run, CancellationToken::new(), tx)
        .await
        .unwrap();
    // All four ran concurrently
    assert!(started.elapsed() < Duration::from_millis(250));

    let mut order = Vec::new();
    while let Some(segment) = rx.recv().await {
        order.push(segment.sequence);
    }
    assert_eq!(order, vec![0, 1, 2, 3]);
}
