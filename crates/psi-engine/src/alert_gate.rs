//! Escalation gate: one notification per regime change, not per poll.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sentinel_core::Tier;

use crate::store::{AlertStateStore, StoreError};

/// Durable per-ticker notification high-water mark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub ticker: String,
    pub last_notified_tier: Tier,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl AlertState {
    pub fn fresh(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            last_notified_tier: Tier::Normal,
            last_notified_at: None,
            cooldown_until: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    /// No prior state and the ticker is at Watch or above
    FirstSighting,
    /// Strictly above the last notified tier
    Escalation,
    /// Still Critical after the cooldown elapsed
    CriticalReminder,
    /// Same or lower tier, or Critical inside the cooldown
    Suppressed,
    /// Dropped below Watch; high-water mark reset to Normal
    Reset,
}

impl GateReason {
    pub fn notifies(&self) -> bool {
        matches!(
            self,
            GateReason::FirstSighting | GateReason::Escalation | GateReason::CriticalReminder
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateReason::FirstSighting => "first_sighting",
            GateReason::Escalation => "escalation",
            GateReason::CriticalReminder => "critical_reminder",
            GateReason::Suppressed => "suppressed",
            GateReason::Reset => "reset",
        }
    }
}

/// Pure gate decision. Returns the reason and the state to persist, if any.
pub fn decide(
    ticker: &str,
    previous: Option<&AlertState>,
    new_tier: Tier,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> (GateReason, Option<AlertState>) {
    let notified = |reason: GateReason| {
        let state = AlertState {
            ticker: ticker.to_string(),
            last_notified_tier: new_tier,
            last_notified_at: Some(now),
            cooldown_until: Some(now.checked_add_signed(cooldown).unwrap_or(DateTime::<Utc>::MAX_UTC)),
        };
        (reason, Some(state))
    };

    let Some(prev) = previous else {
        return if new_tier >= Tier::Watch {
            notified(GateReason::FirstSighting)
        } else {
            (GateReason::Suppressed, None)
        };
    };

    if new_tier < Tier::Watch {
        if prev.last_notified_tier == Tier::Normal {
            return (GateReason::Suppressed, None);
        }
        let reset = AlertState {
            last_notified_tier: Tier::Normal,
            ..prev.clone()
        };
        return (GateReason::Reset, Some(reset));
    }

    if new_tier > prev.last_notified_tier {
        return notified(GateReason::Escalation);
    }

    if new_tier == Tier::Critical && prev.cooldown_until.map_or(true, |until| now >= until) {
        return notified(GateReason::CriticalReminder);
    }

    (GateReason::Suppressed, None)
}

#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub notify: bool,
    pub reason: GateReason,
    /// Last notified tier before this decision, if the ticker had state
    pub previous_tier: Option<Tier>,
}

/// Store-backed gate. State is written at decision time, before delivery.
#[derive(Clone)]
pub struct AlertGate {
    store: Arc<dyn AlertStateStore>,
    cooldown: Duration,
}

impl AlertGate {
    pub fn new(store: Arc<dyn AlertStateStore>, cooldown_minutes: i64) -> Self {
        Self {
            store,
            cooldown: Duration::try_minutes(cooldown_minutes).unwrap_or(Duration::MAX),
        }
    }

    pub async fn check(
        &self,
        ticker: &str,
        new_tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<GateOutcome, StoreError> {
        let previous = self.store.get_alert_state(ticker).await?;
        let (reason, next) = decide(ticker, previous.as_ref(), new_tier, now, self.cooldown);

        if let Some(state) = next {
            self.store.put_alert_state(&state).await?;
        }

        tracing::debug!(
            ticker = %ticker,
            tier = %new_tier,
            reason = reason.as_str(),
            "Alert gate decision"
        );

        Ok(GateOutcome {
            notify: reason.notifies(),
            reason,
            previous_tier: previous.map(|p| p.last_notified_tier),
        })
    }

    pub async fn should_notify(
        &self,
        ticker: &str,
        new_tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self.check(ticker, new_tier, now).await?.notify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn gate(cooldown_minutes: i64) -> (AlertGate, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AlertGate::new(store.clone(), cooldown_minutes), store)
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-13T14:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_huge_cooldown_saturates_instead_of_overflowing() {
        let (gate, store) = gate(1_000_000_000_000);
        assert!(gate.should_notify("AMAT", Tier::Critical, t0()).await.unwrap());
        let state = store.get_alert_state("AMAT").await.unwrap().unwrap();
        assert_eq!(state.cooldown_until, Some(DateTime::<Utc>::MAX_UTC));

        let later = t0() + Duration::days(365);
        assert!(!gate.should_notify("AMAT", Tier::Critical, later).await.unwrap());
    }

    #[tokio::test]
    async fn test_escalation_sequence_notifies_three_times() {
        let (gate, _) = gate(120);
        let tiers = [
            Tier::Watch,
            Tier::Watch,
            Tier::Alert,
            Tier::Alert,
            Tier::Critical,
            Tier::Critical,
        ];
        let mut fired = Vec::new();
        for (i, tier) in tiers.iter().enumerate() {
            let now = t0() + Duration::minutes(15 * i as i64);
            if gate.should_notify("AMAT", *tier, now).await.unwrap() {
                fired.push(i);
            }
        }
        assert_eq!(fired, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_normal_first_sighting_is_silent() {
        let (gate, store) = gate(120);
        assert!(!gate.should_notify("AMAT", Tier::Normal, t0()).await.unwrap());
        assert!(store.get_alert_state("AMAT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_critical_reminder_after_cooldown() {
        let (gate, _) = gate(120);
        assert!(gate.should_notify("AMAT", Tier::Critical, t0()).await.unwrap());
        assert!(!gate
            .should_notify("AMAT", Tier::Critical, t0() + Duration::minutes(119))
            .await
            .unwrap());
        let outcome = gate
            .check("AMAT", Tier::Critical, t0() + Duration::minutes(120))
            .await
            .unwrap();
        assert!(outcome.notify);
        assert_eq!(outcome.reason, GateReason::CriticalReminder);
        assert_eq!(outcome.previous_tier, Some(Tier::Critical));
    }

    #[tokio::test]
    async fn test_downgrade_is_silent_and_alert_never_reminds() {
        let (gate, _) = gate(30);
        assert!(gate.should_notify("AMAT", Tier::Critical, t0()).await.unwrap());
        assert!(!gate
            .should_notify("AMAT", Tier::Alert, t0() + Duration::hours(5))
            .await
            .unwrap());
        assert!(!gate
            .should_notify("AMAT", Tier::Watch, t0() + Duration::hours(6))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_reset_below_watch_allows_fresh_escalation() {
        let (gate, store) = gate(120);
        assert!(gate.should_notify("AMAT", Tier::Alert, t0()).await.unwrap());

        let outcome = gate
            .check("AMAT", Tier::Normal, t0() + Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(outcome.reason, GateReason::Reset);
        assert!(!outcome.notify);
        let state = store.get_alert_state("AMAT").await.unwrap().unwrap();
        assert_eq!(state.last_notified_tier, Tier::Normal);

        // re-escalation inside the old cooldown still fires
        assert!(gate
            .should_notify("AMAT", Tier::Watch, t0() + Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_state_updated_on_notify() {
        let (gate, store) = gate(120);
        gate.should_notify("AMAT", Tier::Alert, t0()).await.unwrap();
        let state = store.get_alert_state("AMAT").await.unwrap().unwrap();
        assert_eq!(state.last_notified_tier, Tier::Alert);
        assert_eq!(state.last_notified_at, Some(t0()));
        assert_eq!(state.cooldown_until, Some(t0() + Duration::minutes(120)));
    }

    #[test]
    fn test_decide_is_per_ticker() {
        let prev = AlertState {
            ticker: "AMAT".to_string(),
            last_notified_tier: Tier::Critical,
            last_notified_at: Some(t0()),
            cooldown_until: Some(t0() + Duration::hours(2)),
        };
        let (reason, _) = decide("AMAT", Some(&prev), Tier::Critical, t0(), Duration::hours(2));
        assert_eq!(reason, GateReason::Suppressed);
        let (reason, _) = decide("LRCX", None, Tier::Critical, t0(), Duration::hours(2));
        assert_eq!(reason, GateReason::FirstSighting);
    }
}
