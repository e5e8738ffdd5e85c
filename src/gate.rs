//! Reply gate — the combined hourly-ceiling + minimum-interval rate
//! limiter guarding outbound reply dispatch.
//!
//! One gate per process: a single bot identity shares a single reply
//! budget. `can_reply` is checked before any generation attempt;
//! `record_reply` runs only after a dispatch succeeds, so failed
//! dispatches never consume budget.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Timelike, Utc};
use serde::Serialize;
use tracing::debug;

#[derive(Debug)]
struct GateState {
    /// Start of the clock hour the counter belongs to.
    hour_bucket: DateTime<Utc>,
    /// Replies dispatched within `hour_bucket`.
    hourly_count: u32,
    /// Timestamp of the last reply dispatched, across all sources.
    last_reply_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the gate for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct GateSnapshot {
    pub hourly_count: u32,
    pub max_replies_per_hour: u32,
    /// Seconds until the cooldown expires; 0 when already clear.
    pub cooldown_remaining_secs: u64,
}

/// Process-wide reply rate limiter.
pub struct ReplyGate {
    max_per_hour: u32,
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl ReplyGate {
    pub fn new(max_per_hour: u32, min_interval: Duration) -> Self {
        Self {
            max_per_hour,
            min_interval,
            state: Mutex::new(GateState {
                hour_bucket: truncate_to_hour(Utc::now()),
                hourly_count: 0,
                last_reply_at: None,
            }),
        }
    }

    /// Whether a reply may be dispatched right now.
    pub fn can_reply(&self) -> bool {
        self.can_reply_at(Utc::now())
    }

    /// Record a successfully dispatched reply.
    pub fn record_reply(&self) {
        self.record_reply_at(Utc::now());
    }

    /// Clock-injected variant of [`can_reply`](Self::can_reply).
    ///
    /// The hour bucket rolls over lazily here: the first call in a new
    /// wall-clock hour resets the counter. No timer involved.
    pub fn can_reply_at(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        roll_bucket(&mut state, now);

        if let Some(last) = state.last_reply_at {
            let since_last = (now - last).to_std().unwrap_or(Duration::ZERO);
            if since_last < self.min_interval {
                debug!(?since_last, "Reply gate closed: within cooldown");
                return false;
            }
        }

        if state.hourly_count >= self.max_per_hour {
            debug!(count = state.hourly_count, "Reply gate closed: hourly ceiling reached");
            return false;
        }

        true
    }

    /// Clock-injected variant of [`record_reply`](Self::record_reply).
    /// Counter increment and last-reply stamp happen under one lock.
    pub fn record_reply_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        roll_bucket(&mut state, now);
        state.hourly_count += 1;
        state.last_reply_at = Some(now);
        debug!(count = state.hourly_count, "Reply recorded");
    }

    pub fn snapshot(&self) -> GateSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> GateSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        roll_bucket(&mut state, now);

        let cooldown_remaining = match state.last_reply_at {
            Some(last) => {
                let since_last = (now - last).to_std().unwrap_or(Duration::ZERO);
                self.min_interval.saturating_sub(since_last)
            }
            None => Duration::ZERO,
        };

        GateSnapshot {
            hourly_count: state.hourly_count,
            max_replies_per_hour: self.max_per_hour,
            cooldown_remaining_secs: cooldown_remaining.as_secs(),
        }
    }
}

/// Reset the counter when the wall-clock hour has changed.
fn roll_bucket(state: &mut GateState, now: DateTime<Utc>) {
    let bucket = truncate_to_hour(now);
    if bucket != state.hour_bucket {
        state.hour_bucket = bucket;
        state.hourly_count = 0;
        debug!("Hourly reply counter reset");
    }
}

fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(chrono::Duration::hours(1))
        .unwrap_or_else(|_| t.with_minute(0).and_then(|t| t.with_second(0)).unwrap_or(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, h, m, s).unwrap()
    }

    fn gate(max: u32, interval_secs: u64) -> ReplyGate {
        ReplyGate::new(max, Duration::from_secs(interval_secs))
    }

    #[test]
    fn open_when_idle() {
        let gate = gate(3, 600);
        assert!(gate.can_reply_at(at(10, 0, 0)));
    }

    #[test]
    fn cooldown_blocks_second_reply() {
        let gate = gate(3, 600);
        gate.record_reply_at(at(10, 0, 0));
        // 5 minutes later: ceiling not reached, but cooldown still holds.
        assert!(!gate.can_reply_at(at(10, 5, 0)));
        assert!(gate.can_reply_at(at(10, 10, 0)));
    }

    #[test]
    fn hourly_ceiling_blocks_regardless_of_cooldown() {
        let gate = gate(3, 1);
        gate.record_reply_at(at(10, 0, 0));
        gate.record_reply_at(at(10, 10, 0));
        gate.record_reply_at(at(10, 20, 0));
        // Cooldown long past, but three replies already this hour.
        assert!(!gate.can_reply_at(at(10, 40, 0)));
    }

    #[test]
    fn bucket_rollover_resets_counter() {
        let gate = gate(3, 1);
        gate.record_reply_at(at(10, 0, 0));
        gate.record_reply_at(at(10, 10, 0));
        gate.record_reply_at(at(10, 20, 0));
        assert!(!gate.can_reply_at(at(10, 59, 59)));
        // New wall-clock hour: counter resets lazily on the next check.
        assert!(gate.can_reply_at(at(11, 0, 1)));
    }

    #[test]
    fn cooldown_spans_bucket_rollover() {
        let gate = gate(3, 600);
        gate.record_reply_at(at(10, 58, 0));
        // New hour resets the counter, but the global cooldown still applies.
        assert!(!gate.can_reply_at(at(11, 2, 0)));
        assert!(gate.can_reply_at(at(11, 8, 0)));
    }

    #[test]
    fn record_consumes_budget_exactly() {
        let gate = gate(2, 1);
        assert!(gate.can_reply_at(at(9, 0, 0)));
        gate.record_reply_at(at(9, 0, 0));
        gate.record_reply_at(at(9, 10, 0));
        let snap = gate.snapshot_at(at(9, 20, 0));
        assert_eq!(snap.hourly_count, 2);
        assert!(!gate.can_reply_at(at(9, 20, 0)));
    }

    #[test]
    fn snapshot_reports_cooldown_remaining() {
        let gate = gate(3, 600);
        gate.record_reply_at(at(12, 0, 0));
        let snap = gate.snapshot_at(at(12, 4, 0));
        assert_eq!(snap.cooldown_remaining_secs, 360);

        let clear = gate.snapshot_at(at(12, 15, 0));
        assert_eq!(clear.cooldown_remaining_secs, 0);
    }

    #[test]
    fn snapshot_rolls_bucket() {
        let gate = gate(3, 1);
        gate.record_reply_at(at(14, 30, 0));
        let snap = gate.snapshot_at(at(15, 0, 1));
        assert_eq!(snap.hourly_count, 0);
    }
}
