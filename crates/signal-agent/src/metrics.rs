use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use signal_core::{CycleRecord, CycleStatus, MetricsSnapshot};

/// Agent telemetry. Counters are atomics so the scheduler, the cycle runner
/// and the dashboard can share one instance without locking.
pub struct AgentMetrics {
    cycles_run: AtomicU64,
    cycles_ok: AtomicU64,
    cycles_partial: AtomicU64,
    cycles_failed: AtomicU64,
    alerts_emitted: AtomicU64,
    persist_failures: AtomicU64,
    missed_ticks: AtomicU64,
    last_cycle_ms: AtomicU64,
    log_interval_cycles: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: AtomicU64::new(0),
            cycles_ok: AtomicU64::new(0),
            cycles_partial: AtomicU64::new(0),
            cycles_failed: AtomicU64::new(0),
            alerts_emitted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            missed_ticks: AtomicU64::new(0),
            last_cycle_ms: AtomicU64::new(0),
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_missed_tick(&self) {
        self.missed_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish_cycle(&self, record: &CycleRecord, cycle_start: Instant) {
        self.last_cycle_ms
            .store(cycle_start.elapsed().as_millis() as u64, Ordering::Relaxed);
        self.alerts_emitted
            .fetch_add(record.alerts.len() as u64, Ordering::Relaxed);
        let counter = match record.status {
            CycleStatus::Ok => &self.cycles_ok,
            CycleStatus::Partial => &self.cycles_partial,
            CycleStatus::Failed => &self.cycles_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let cycles = self.cycles_run.fetch_add(1, Ordering::Relaxed) + 1;

        // Emit structured metrics periodically
        if self.log_interval_cycles > 0 && cycles % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_ok: self.cycles_ok.load(Ordering::Relaxed),
            cycles_partial: self.cycles_partial.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            missed_ticks: self.missed_ticks.load(Ordering::Relaxed),
            last_cycle_ms: self.last_cycle_ms.load(Ordering::Relaxed),
        }
    }

    /// Share of cycles that finished OK (0-100%)
    pub fn ok_rate(&self) -> f64 {
        let s = self.snapshot();
        if s.cycles_run == 0 {
            return 0.0;
        }
        (s.cycles_ok as f64 / s.cycles_run as f64) * 100.0
    }

    /// Emit structured telemetry via tracing
    pub fn log_metrics(&self) {
        let s = self.snapshot();
        tracing::info!(
            cycles = s.cycles_run,
            cycles_ok = s.cycles_ok,
            cycles_partial = s.cycles_partial,
            cycles_failed = s.cycles_failed,
            ok_rate = format!("{:.1}%", self.ok_rate()),
            alerts_emitted = s.alerts_emitted,
            persist_failures = s.persist_failures,
            missed_ticks = s.missed_ticks,
            last_cycle_ms = s.last_cycle_ms,
            "Agent metrics summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use signal_core::{CycleTrigger, PendingCycle};

    #[test]
    fn test_cycle_counters() {
        let metrics = AgentMetrics::new(0);
        let failed = PendingCycle::start(1, Utc::now(), CycleTrigger::Scheduled).finalize();
        metrics.finish_cycle(&failed, AgentMetrics::start_timer());
        metrics.record_missed_tick();

        let s = metrics.snapshot();
        assert_eq!(s.cycles_run, 1);
        assert_eq!(s.cycles_failed, 1);
        assert_eq!(s.missed_ticks, 1);
        assert_eq!(metrics.ok_rate(), 0.0);
    }
}
