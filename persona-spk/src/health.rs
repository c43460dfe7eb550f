//! Per-engine health tracking
//!
//! Every engine starts `Available`. Consecutive failures move it to
//! `Degraded` (skipped until the cooldown elapses, then retried) and then
//! to `Unavailable` (skipped until the background probe succeeds). Any
//! success resets the consecutive count.

use crate::config::AdapterConfig;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Available,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Synthesis,
    Recognition,
}

/// Thresholds for moving between health states
#[derive(Debug, Clone, Copy)]
pub struct HealthPolicy {
    pub degrade_after: u32,
    pub unavailable_after: u32,
    pub cooldown: Duration,
}

impl HealthPolicy {
    pub fn from_config(config: &AdapterConfig) -> Self {
        Self {
            degrade_after: config.degrade_after,
            unavailable_after: config.unavailable_after,
            cooldown: config.cooldown(),
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from_config(&AdapterConfig::default())
    }
}

#[derive(Debug, Clone)]
struct HealthRecord {
    status: HealthStatus,
    last_failure: Option<Instant>,
    consecutive_failures: u32,
    total_failures: u64,
    total_calls: u64,
    last_error: Option<String>,
}

/// Health report entry, as exposed over the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealthSnapshot {
    pub name: String,
    pub kind: EngineKind,
    pub priority: u32,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_calls: u64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct EngineHealth {
    record: RwLock<HealthRecord>,
}

impl Default for EngineHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineHealth {
    pub fn new() -> Self {
        Self {
            record: RwLock::new(HealthRecord {
                status: HealthStatus::Available,
                last_failure: None,
                consecutive_failures: 0,
                total_failures: 0,
                total_calls: 0,
                last_error: None,
            }),
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.record.read().status
    }

    /// Whether the adapter may route a call to this engine at `now`
    pub fn is_selectable(&self, now: Instant, cooldown: Duration) -> bool {
        let record = self.record.read();
        match record.status {
            HealthStatus::Available => true,
            HealthStatus::Degraded => record
                .last_failure
                .map_or(true, |at| now.saturating_duration_since(at) >= cooldown),
            HealthStatus::Unavailable => false,
        }
    }

    pub fn record_success(&self) {
        let mut record = self.record.write();
        record.total_calls += 1;
        record.consecutive_failures = 0;
        record.status = HealthStatus::Available;
    }

    /// Count a failure; returns the status after the update
    pub fn record_failure(&self, policy: &HealthPolicy, error: &str) -> HealthStatus {
        self.record_failure_at(policy, error, Instant::now())
    }

    pub(crate) fn record_failure_at(&self, policy: &HealthPolicy, error: &str, now: Instant) -> HealthStatus {
        let mut record = self.record.write();
        record.total_calls += 1;
        record.total_failures += 1;
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.last_failure = Some(now);
        record.last_error = Some(error.chars().take(256).collect());

        record.status = if record.consecutive_failures >= policy.unavailable_after {
            HealthStatus::Unavailable
        } else if record.consecutive_failures >= policy.degrade_after {
            HealthStatus::Degraded
        } else {
            // Below threshold the engine stays where it was, unless it was
            // marked available again by a probe
            record.status.min_available()
        };
        record.status
    }

    /// Operator override or successful probe
    pub fn mark_available(&self) {
        let mut record = self.record.write();
        record.status = HealthStatus::Available;
        record.consecutive_failures = 0;
    }

    pub fn snapshot(&self, name: &str, kind: EngineKind, priority: u32) -> EngineHealthSnapshot {
        let record = self.record.read();
        EngineHealthSnapshot {
            name: name.to_string(),
            kind,
            priority,
            status: record.status,
            consecutive_failures: record.consecutive_failures,
            total_failures: record.total_failures,
            total_calls: record.total_calls,
            last_error: record.last_error.clone(),
        }
    }
}

impl HealthStatus {
    fn min_available(self) -> Self {
        match self {
            HealthStatus::Unavailable => HealthStatus::Unavailable,
            _ => HealthStatus::Available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HealthPolicy {
        HealthPolicy {
            degrade_after: 3,
            unavailable_after: 5,
            cooldown: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_degrades_after_threshold() {
        let health = EngineHealth::new();
        let now = Instant::now();
        for _ in 0..2 {
            assert_eq!(health.record_failure_at(&policy(), "boom", now), HealthStatus::Available);
        }
        assert_eq!(health.record_failure_at(&policy(), "boom", now), HealthStatus::Degraded);
        assert!(!health.is_selectable(now, policy().cooldown));
    }

    #[test]
    fn test_degraded_retried_after_cooldown() {
        let health = EngineHealth::new();
        let now = Instant::now();
        for _ in 0..3 {
            health.record_failure_at(&policy(), "boom", now);
        }
        assert!(!health.is_selectable(now + Duration::from_secs(29), policy().cooldown));
        assert!(health.is_selectable(now + Duration::from_secs(30), policy().cooldown));
    }

    #[test]
    fn test_unavailable_until_marked() {
        let health = EngineHealth::new();
        let now = Instant::now();
        for _ in 0..5 {
            health.record_failure_at(&policy(), "boom", now);
        }
        assert_eq!(health.status(), HealthStatus::Unavailable);
        assert!(!health.is_selectable(now + Duration::from_secs(3600), policy().cooldown));

        health.mark_available();
        assert!(health.is_selectable(now, policy().cooldown));
    }

    #[test]
    fn test_success_resets_consecutive_count() {
        let health = EngineHealth::new();
        health.record_failure(&policy(), "a");
        health.record_failure(&policy(), "b");
        health.record_success();
        health.record_failure(&policy(), "c");
        let snap = health.snapshot("e", EngineKind::Synthesis, 0);
        assert_eq!(snap.status, HealthStatus::Available);
        assert_eq!(snap.consecutive_failures, 1);
        assert_eq!(snap.total_failures, 3);
        assert_eq!(snap.total_calls, 4);
        assert_eq!(snap.last_error.as_deref(), Some("c"));
    }
}
