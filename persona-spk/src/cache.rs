//! Synthesized audio cache keyed by voice and text

use crate::config::VoiceConfig;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Entries larger than this are never cached
const MAX_ENTRY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
struct CachedAudio {
    audio: Bytes,
    /// Insertion order, oldest first
    stamp: u64,
}

pub struct SynthesisCache {
    entries: RwLock<HashMap<String, CachedAudio>>,
    max_bytes: usize,
    clock: AtomicU64,
}

impl SynthesisCache {
    pub fn new(max_cache_size_mb: u64) -> Self {
        let max_bytes = max_cache_size_mb
            .checked_mul(1024 * 1024)
            .and_then(|b| usize::try_from(b).ok())
            .unwrap_or(usize::MAX);
        Self {
            entries: RwLock::new(HashMap::new()),
            max_bytes,
            clock: AtomicU64::new(0),
        }
    }

    pub fn key(text: &str, voice: &VoiceConfig) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(voice.language.as_bytes());
        if let Some(ref name) = voice.name {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let hit = self.entries.read().get(key).map(|c| c.audio.clone());
        if hit.is_some() {
            debug!("Synthesis cache hit");
        }
        hit
    }

    pub fn insert(&self, key: String, audio: Bytes) {
        if audio.len() > MAX_ENTRY_BYTES || audio.len() > self.max_bytes {
            debug!("Audio too large to cache ({} bytes)", audio.len());
            return;
        }
        self.entries.write().insert(
            key,
            CachedAudio {
                audio,
                stamp: self.clock.fetch_add(1, Ordering::Relaxed),
            },
        );
        self.cleanup();
    }

    pub fn size_bytes(&self) -> usize {
        self.entries.read().values().map(|c| c.audio.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict oldest entries until the cache is back under 80% of its budget
    fn cleanup(&self) {
        let mut entries = self.entries.write();
        let total: usize = entries.values().map(|c| c.audio.len()).sum();
        if total <= self.max_bytes {
            return;
        }

        let target = self.max_bytes / 100 * 80;
        let mut by_age: Vec<(String, u64, usize)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.stamp, v.audio.len()))
            .collect();
        by_age.sort_by_key(|(_, stamp, _)| *stamp);

        let mut remaining = total;
        let mut removed = 0;
        for (key, _, size) in by_age {
            if remaining <= target {
                break;
            }
            entries.remove(&key);
            remaining -= size;
            removed += 1;
        }
        info!("Cleaned up synthesis cache: removed {} entries", removed);
    }
}
