//! Engine adapter fallback, health and timeout tests

use bytes::Bytes;
use futures::FutureExt;
use persona_spk::engines::custom::{CustomAsrEngine, CustomTtsEngine};
use persona_spk::{AdapterConfig, EngineAdapter, HealthStatus, SpeechError, VoiceConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config() -> AdapterConfig {
    AdapterConfig {
        degrade_after: 2,
        unavailable_after: 4,
        cooldown_secs: 30,
        enable_cache: false,
        ..Default::default()
    }
}

/// Engine that counts calls and either fails or returns its name as audio
fn counting(name: &'static str, fail: bool, calls: Arc<AtomicUsize>) -> Arc<CustomTtsEngine> {
    Arc::new(CustomTtsEngine::new(name, move |_: &str, _: &VoiceConfig| {
        calls.fetch_add(1, Ordering::SeqCst);
        if fail {
            Err(SpeechError::engine(name, "simulated failure"))
        } else {
            Ok(Bytes::from_static(name.as_bytes()))
        }
    }))
}

#[tokio::test]
async fn test_third_engine_serves_when_first_two_fail() {
    let (a, b, c) = (Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
    let adapter = EngineAdapter::builder()
        .config(config())
        .with_tts(counting("first", true, a.clone()), 1)
        .with_tts(counting("second", true, b.clone()), 2)
        .with_tts(counting("third", false, c.clone()), 3)
        .build()
        .unwrap();

    let voice = VoiceConfig::default();
    for _ in 0..2 {
        let audio = adapter.synthesize("hello", &voice).await.unwrap();
        assert_eq!(&audio[..], b"third");
    }
    assert_eq!(a.load(Ordering::SeqCst), 2);
    assert_eq!(b.load(Ordering::SeqCst), 2);

    // Threshold reached: the failing engines are skipped without being called
    for _ in 0..3 {
        let audio = adapter.synthesize("hello again", &voice).await.unwrap();
        assert_eq!(&audio[..], b"third");
    }
    assert_eq!(a.load(Ordering::SeqCst), 2);
    assert_eq!(b.load(Ordering::SeqCst), 2);
    assert_eq!(c.load(Ordering::SeqCst), 5);

    let report = adapter.health_report();
    assert_eq!(report[0].name, "first");
    assert_eq!(report[0].status, HealthStatus::Degraded);
    assert_eq!(report[2].status, HealthStatus::Available);
}

#[tokio::test]
async fn test_degraded_engine_retried_after_cooldown() {
    let calls = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let counter = calls.clone();
    let flaky = Arc::new(CustomTtsEngine::new("flaky", move |_: &str, _: &VoiceConfig| {
        counter.fetch_add(1, Ordering::SeqCst);
        if flag.load(Ordering::SeqCst) {
            Ok(Bytes::from_static(b"flaky"))
        } else {
            Err(SpeechError::engine("flaky", "down"))
        }
    }));

    let adapter = EngineAdapter::builder()
        .config(AdapterConfig {
            cooldown_secs: 1,
            ..config()
        })
        .with_tts(flaky, 1)
        .with_tts(counting("backup", false, Arc::new(AtomicUsize::new(0))), 2)
        .build()
        .unwrap();

    let voice = VoiceConfig::default();
    adapter.synthesize("one", &voice).await.unwrap();
    adapter.synthesize("two", &voice).await.unwrap();
    adapter.synthesize("three", &voice).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let audio = adapter.synthesize("four", &voice).await.unwrap();
    assert_eq!(&audio[..], b"flaky");
    assert_eq!(adapter.health_report()[0].status, HealthStatus::Available);
}

#[tokio::test]
async fn test_all_engines_failing_is_exhausted() {
    let adapter = EngineAdapter::builder()
        .config(config())
        .with_tts(counting("a", true, Arc::new(AtomicUsize::new(0))), 1)
        .with_tts(counting("b", true, Arc::new(AtomicUsize::new(0))), 2)
        .build()
        .unwrap();

    match adapter.synthesize("hello", &VoiceConfig::default()).await {
        Err(SpeechError::EngineExhausted { attempted }) => assert_eq!(attempted, vec!["a", "b"]),
        other => panic!("expected exhaustion, got {:?}", other.map(|b| b.len())),
    }
}

#[tokio::test]
async fn test_timeout_counts_as_failure_and_falls_through() {
    let slow = Arc::new(CustomTtsEngine::from_async("slow", |_text, _voice| {
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Bytes::from_static(b"slow"))
        }
        .boxed()
    }));

    let adapter = EngineAdapter::builder()
        .config(AdapterConfig {
            synthesis_timeout_ms: 50,
            ..config()
        })
        .with_tts(slow, 1)
        .with_tts(counting("fast", false, Arc::new(AtomicUsize::new(0))), 2)
        .build()
        .unwrap();

    let audio = adapter.synthesize("hello", &VoiceConfig::default()).await.unwrap();
    assert_eq!(&audio[..], b"fast");

    let slow_report = &adapter.health_report()[0];
    assert_eq!(slow_report.consecutive_failures, 1);
    assert!(slow_report.last_error.as_deref().unwrap_or_default().contains("timed out"));
}

#[tokio::test]
async fn test_probe_restores_unavailable_engine() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let engine = Arc::new(
        CustomTtsEngine::new("probed", |_: &str, _: &VoiceConfig| Err(SpeechError::engine("probed", "down")))
            .with_health(move || flag.load(Ordering::SeqCst)),
    );

    let adapter = EngineAdapter::builder()
        .config(AdapterConfig {
            degrade_after: 1,
            unavailable_after: 1,
            ..config()
        })
        .with_tts(engine, 1)
        .build()
        .unwrap();

    assert!(adapter.synthesize("hello", &VoiceConfig::default()).await.is_err());
    assert_eq!(adapter.health_report()[0].status, HealthStatus::Unavailable);
    assert!(!adapter.is_healthy());

    assert_eq!(adapter.probe().await, 0);
    healthy.store(true, Ordering::SeqCst);
    assert_eq!(adapter.probe().await, 1);
    assert_eq!(adapter.health_report()[0].status, HealthStatus::Available);
}

#[tokio::test]
async fn test_recognition_falls_back() {
    let adapter = EngineAdapter::builder()
        .config(config())
        .with_asr(
            Arc::new(CustomAsrEngine::new("broken", |_: &[u8], _| Err(SpeechError::engine("broken", "down")))),
            1,
        )
        .with_asr(Arc::new(CustomAsrEngine::new("ok", |audio: &[u8], _| Ok(format!("{} bytes", audio.len())))), 2)
        .build()
        .unwrap();

    let text = adapter
        .recognize(&[0u8; 640], &persona_core::AudioFormat::default())
        .await
        .unwrap();
    assert_eq!(text, "640 bytes");
}

#[tokio::test]
async fn test_cache_serves_repeated_text() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adapter = EngineAdapter::builder()
        .config(AdapterConfig {
            enable_cache: true,
            ..config()
        })
        .with_tts(counting("cached", false, calls.clone()), 1)
        .build()
        .unwrap();

    let voice = VoiceConfig::default();
    adapter.synthesize("same text", &voice).await.unwrap();
    adapter.synthesize("same text", &voice).await.unwrap();
    adapter.synthesize("same text", &voice.with_name("other")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(adapter.cached_bytes() > 0);
}
