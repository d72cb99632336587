use std::time::Instant;

use crate::runner::CycleReport;

/// Scan counters, persisted between runs through the scanner state table.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    pub cycles_run: u64,
    pub tickers_scored: u64,
    pub tickers_skipped: u64,
    pub tickers_failed: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub notifications_failed: u64,
    pub failure_notices_sent: u64,

    pub last_cycle_duration_ms: u64,
    log_interval_cycles: u64,
}

impl ScanMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            log_interval_cycles,
            ..Self::default()
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.tickers_scored += report.scored() as u64;
        self.tickers_skipped += report.skipped() as u64;
        self.tickers_failed += report.failed() as u64;
        self.alerts_sent += report.alerts_sent as u64;
        self.alerts_suppressed += report.alerts_suppressed as u64;
        self.notifications_failed += report.notifications_failed as u64;
        self.failure_notices_sent += report.failure_notices_sent as u64;
    }

    pub fn finish_cycle(&mut self, cycle_start: Instant) {
        self.last_cycle_duration_ms = cycle_start.elapsed().as_millis() as u64;
        self.cycles_run += 1;

        if self.log_interval_cycles > 0 && self.cycles_run % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    /// Emit structured telemetry via tracing
    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            tickers_scored = self.tickers_scored,
            tickers_skipped = self.tickers_skipped,
            tickers_failed = self.tickers_failed,
            alerts_sent = self.alerts_sent,
            alerts_suppressed = self.alerts_suppressed,
            notifications_failed = self.notifications_failed,
            failure_notices_sent = self.failure_notices_sent,
            last_cycle_ms = self.last_cycle_duration_ms,
            "Scan metrics summary"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "tickers_scored": self.tickers_scored,
            "tickers_skipped": self.tickers_skipped,
            "tickers_failed": self.tickers_failed,
            "alerts_sent": self.alerts_sent,
            "alerts_suppressed": self.alerts_suppressed,
            "notifications_failed": self.notifications_failed,
            "failure_notices_sent": self.failure_notices_sent,
        })
    }

    /// Restore counters from persisted JSON; unknown or missing keys are ignored
    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        let fields: [(&str, &mut u64); 8] = [
            ("cycles_run", &mut self.cycles_run),
            ("tickers_scored", &mut self.tickers_scored),
            ("tickers_skipped", &mut self.tickers_skipped),
            ("tickers_failed", &mut self.tickers_failed),
            ("alerts_sent", &mut self.alerts_sent),
            ("alerts_suppressed", &mut self.alerts_suppressed),
            ("notifications_failed", &mut self.notifications_failed),
            ("failure_notices_sent", &mut self.failure_notices_sent),
        ];
        for (key, slot) in fields {
            if let Some(v) = json.get(key).and_then(|v| v.as_u64()) {
                *slot = v;
            }
        }
        tracing::info!(
            "Restored metrics from persisted state (cycles={})",
            self.cycles_run
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_restores_counters() {
        let mut m = ScanMetrics::new(0);
        m.cycles_run = 7;
        m.tickers_failed = 2;
        m.alerts_sent = 3;

        let mut restored = ScanMetrics::new(0);
        restored.restore_from_json(&m.to_json());
        assert_eq!(restored.cycles_run, 7);
        assert_eq!(restored.tickers_failed, 2);
        assert_eq!(restored.alerts_sent, 3);
    }

    #[test]
    fn test_restore_ignores_garbage() {
        let mut m = ScanMetrics::new(0);
        m.restore_from_json(&serde_json::json!({"cycles_run": "seven", "alerts_sent": 4}));
        assert_eq!(m.cycles_run, 0);
        assert_eq!(m.alerts_sent, 4);
    }

    #[test]
    fn test_finish_cycle_counts() {
        let mut m = ScanMetrics::new(1);
        m.finish_cycle(ScanMetrics::start_timer());
        m.finish_cycle(ScanMetrics::start_timer());
        assert_eq!(m.cycles_run, 2);
    }
}
