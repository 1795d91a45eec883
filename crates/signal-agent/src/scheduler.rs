use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use signal_core::{CycleRecord, CycleStatus, CycleTrigger, OracleSource, SignalResult, TaskState, TaskStatus};
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::metrics::AgentMetrics;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Refreshed(OracleSource),
    Cycle(Box<CycleRecord>),
}

impl TaskOutcome {
    /// A cycle that could not decide counts as a failed run.
    fn failure(&self) -> Option<String> {
        match self {
            TaskOutcome::Cycle(record) if record.status == CycleStatus::Failed => {
                Some(format!("cycle {} produced no decision", record.cycle_id))
            }
            _ => None,
        }
    }
}

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, trigger: CycleTrigger) -> SignalResult<TaskOutcome>;
}

struct TaskSlot {
    task: Arc<dyn PeriodicTask>,
    interval: Duration,
    gate: Arc<Mutex<()>>,
    status: RwLock<TaskStatus>,
}

impl TaskSlot {
    /// Run while holding the task's gate so invocations never overlap.
    async fn execute(&self, trigger: CycleTrigger, _gate: OwnedMutexGuard<()>) -> SignalResult<TaskOutcome> {
        self.status.write().await.mark_started(Utc::now());

        let result = self.task.run(trigger).await;
        let error = match &result {
            Ok(outcome) => outcome.failure(),
            Err(e) => Some(e.to_string()),
        };
        if let Some(e) = &error {
            tracing::warn!("Task {} failed: {}", self.task.name(), e);
        }

        self.status.write().await.mark_finished(Utc::now(), error);
        result
    }

    async fn record_missed_tick(&self) {
        let mut status = self.status.write().await;
        status.missed_ticks += 1;
        tracing::warn!(
            "Task {} still running at tick; skipped (missed ticks: {})",
            status.name,
            status.missed_ticks
        );
    }
}

/// Cloneable entry point for on-demand runs of one task.
#[derive(Clone)]
pub struct TaskHandle {
    slot: Arc<TaskSlot>,
}

impl TaskHandle {
    /// Waits for any in-flight run of the same task, then runs it.
    pub async fn run_now(&self) -> SignalResult<TaskOutcome> {
        let gate = self.slot.gate.clone().lock_owned().await;
        self.slot.execute(CycleTrigger::Manual, gate).await
    }

    pub async fn status(&self) -> TaskStatus {
        self.slot.status.read().await.clone()
    }
}

/// Fixed-interval driver for periodic tasks with skip-on-overlap.
pub struct TaskScheduler {
    slots: Vec<Arc<TaskSlot>>,
    metrics: Arc<AgentMetrics>,
}

impl TaskScheduler {
    pub fn new(metrics: Arc<AgentMetrics>) -> Self {
        Self {
            slots: Vec::new(),
            metrics,
        }
    }

    pub fn register(&mut self, task: Arc<dyn PeriodicTask>, interval: Duration) -> TaskHandle {
        let status = TaskStatus::new(task.name(), interval.as_secs());
        let slot = Arc::new(TaskSlot {
            task,
            interval,
            gate: Arc::new(Mutex::new(())),
            status: RwLock::new(status),
        });
        self.slots.push(slot.clone());
        TaskHandle { slot }
    }

    pub async fn statuses(&self) -> Vec<TaskStatus> {
        let mut statuses = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            statuses.push(slot.status.read().await.clone());
        }
        statuses
    }

    /// Spawn one driver per task. Drivers stop ticking and abort in-flight
    /// runs once `shutdown` flips to `true`.
    pub fn start(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.slots
            .iter()
            .map(|slot| {
                tracing::info!(
                    "Scheduling {} every {}s",
                    slot.task.name(),
                    slot.interval.as_secs()
                );
                tokio::spawn(drive(slot.clone(), self.metrics.clone(), shutdown.clone()))
            })
            .collect()
    }
}

async fn drive(slot: Arc<TaskSlot>, metrics: Arc<AgentMetrics>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(slot.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                while in_flight.try_join_next().is_some() {}

                match slot.gate.clone().try_lock_owned() {
                    Ok(gate) => {
                        let slot = slot.clone();
                        in_flight.spawn(async move {
                            // Outcome is recorded in the task status.
                            let _ = slot.execute(CycleTrigger::Scheduled, gate).await;
                        });
                    }
                    Err(_) => {
                        slot.record_missed_tick().await;
                        metrics.record_missed_tick();
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    in_flight.shutdown().await;
    let mut status = slot.status.write().await;
    if status.state == TaskState::Running {
        tracing::info!("Task {} aborted mid-run", status.name);
        status.mark_aborted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowTask {
        duration: Duration,
        starts: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl SlowTask {
        fn new(duration: Duration) -> Arc<Self> {
            Arc::new(Self {
                duration,
                starts: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PeriodicTask for SlowTask {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, _trigger: CycleTrigger) -> SignalResult<TaskOutcome> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(TaskOutcome::Refreshed(OracleSource::Price))
        }
    }

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(Arc::new(AgentMetrics::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_skips_ticks_instead_of_queueing() {
        let task = SlowTask::new(Duration::from_secs(250));
        let mut scheduler = scheduler();
        let handle = scheduler.register(task.clone(), Duration::from_secs(100));
        let (_tx, rx) = watch::channel(false);
        let _drivers = scheduler.start(rx);

        // ticks at 0 (runs until 250), 100 and 200 (skipped), 300 (runs)
        tokio::time::sleep(Duration::from_secs(350)).await;

        let status = handle.status().await;
        assert_eq!(task.starts.load(Ordering::SeqCst), 2);
        assert_eq!(status.runs, 1);
        assert_eq!(status.missed_ticks, 2);
        assert_eq!(status.state, TaskState::Running);
        assert_eq!(task.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.metrics.snapshot().missed_ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_run_waits_for_in_flight_run() {
        let task = SlowTask::new(Duration::from_secs(50));
        let mut scheduler = scheduler();
        let handle = scheduler.register(task.clone(), Duration::from_secs(1000));
        let (_tx, rx) = watch::channel(false);
        let _drivers = scheduler.start(rx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.status().await.state, TaskState::Running);

        handle.run_now().await.unwrap();
        let status = handle.status().await;
        assert_eq!(status.runs, 2);
        assert_eq!(status.state, TaskState::Idle);
        assert_eq!(task.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_in_flight_run() {
        let task = SlowTask::new(Duration::from_secs(500));
        let mut scheduler = scheduler();
        let handle = scheduler.register(task.clone(), Duration::from_secs(100));
        let (tx, rx) = watch::channel(false);
        let drivers = scheduler.start(rx);

        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        for driver in drivers {
            driver.await.unwrap();
        }

        let status = handle.status().await;
        assert_eq!(status.state, TaskState::Idle);
        assert_eq!(status.runs, 0);
        assert_eq!(task.starts.load(Ordering::SeqCst), 1);
    }
}
