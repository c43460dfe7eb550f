use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide session counters, mirrored into the `metrics` facade
pub struct Metrics {
    sessions_total: AtomicU64,
    sessions_active: AtomicU64,
    sessions_rejected: AtomicU64,
    control_messages_total: AtomicU64,
    malformed_messages_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
            control_messages_total: AtomicU64::new(0),
            malformed_messages_total: AtomicU64::new(0),
        }
    }

    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        let active = self.sessions_active.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("persona_sessions_total").increment(1);
        gauge!("persona_sessions_active").set(active as f64);
    }

    pub fn session_closed(&self) {
        let active = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)))
            .map(|prev| prev.saturating_sub(1))
            .unwrap_or(0);
        gauge!("persona_sessions_active").set(active as f64);
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("persona_sessions_rejected_total").increment(1);
    }

    pub fn control_message(&self, malformed: bool) {
        self.control_messages_total.fetch_add(1, Ordering::Relaxed);
        if malformed {
            self.malformed_messages_total.fetch_add(1, Ordering::Relaxed);
            counter!("persona_control_messages_malformed_total").increment(1);
        }
        counter!("persona_control_messages_total").increment(1);
    }

    pub fn sessions_active(&self) -> u64 {
        self.sessions_active.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of the counters above
    pub fn render_prometheus(&self) -> String {
        format!(
            "# HELP persona_sessions_total Sessions opened since start\n\
             # TYPE persona_sessions_total counter\n\
             persona_sessions_total {}\n\
             # HELP persona_sessions_active Sessions currently open\n\
             # TYPE persona_sessions_active gauge\n\
             persona_sessions_active {}\n\
             # HELP persona_sessions_rejected_total Connections refused at capacity or negotiation\n\
             # TYPE persona_sessions_rejected_total counter\n\
             persona_sessions_rejected_total {}\n\
             # HELP persona_control_messages_total Control messages received\n\
             # TYPE persona_control_messages_total counter\n\
             persona_control_messages_total {}\n\
             # HELP persona_control_messages_malformed_total Control messages rejected as malformed\n\
             # TYPE persona_control_messages_malformed_total counter\n\
             persona_control_messages_malformed_total {}\n",
            self.sessions_total.load(Ordering::Relaxed),
            self.sessions_active.load(Ordering::Relaxed),
            self.sessions_rejected.load(Ordering::Relaxed),
            self.control_messages_total.load(Ordering::Relaxed),
            self.malformed_messages_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
