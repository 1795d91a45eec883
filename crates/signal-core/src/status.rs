use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed,
    Failed,
}

/// Observable state of one periodic task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub name: String,
    pub interval_seconds: u64,
    pub state: TaskState,
    pub last_outcome: Option<RunOutcome>,
    pub last_error: Option<String>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub runs: u64,
    pub failures: u64,
    pub missed_ticks: u64,
}

impl TaskStatus {
    pub fn new(name: impl Into<String>, interval_seconds: u64) -> Self {
        Self {
            name: name.into(),
            interval_seconds,
            state: TaskState::Idle,
            last_outcome: None,
            last_error: None,
            last_started: None,
            last_finished: None,
            runs: 0,
            failures: 0,
            missed_ticks: 0,
        }
    }

    pub fn mark_started(&mut self, at: DateTime<Utc>) {
        self.state = TaskState::Running;
        self.last_started = Some(at);
    }

    /// RUNNING -> COMPLETED | FAILED -> IDLE.
    pub fn mark_finished(&mut self, at: DateTime<Utc>, error: Option<String>) {
        self.state = TaskState::Idle;
        self.last_finished = Some(at);
        self.runs += 1;
        match error {
            None => {
                self.last_outcome = Some(RunOutcome::Completed);
                self.last_error = None;
            }
            Some(e) => {
                self.failures += 1;
                self.last_outcome = Some(RunOutcome::Failed);
                self.last_error = Some(e);
            }
        }
    }

    /// An aborted run never finishes; put the task back to IDLE without
    /// counting it.
    pub fn mark_aborted(&mut self) {
        self.state = TaskState::Idle;
    }
}

/// Counters published by the agent alongside task status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cycles_run: u64,
    pub cycles_ok: u64,
    pub cycles_partial: u64,
    pub cycles_failed: u64,
    pub alerts_emitted: u64,
    pub persist_failures: u64,
    pub missed_ticks: u64,
    pub last_cycle_ms: u64,
}

/// Everything `/api/status` reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub tasks: Vec<TaskStatus>,
    pub metrics: MetricsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle_counts() {
        let now = Utc::now();
        let mut status = TaskStatus::new("prediction", 300);
        status.mark_started(now);
        assert_eq!(status.state, TaskState::Running);

        status.mark_finished(now, Some("oracle down".to_string()));
        assert_eq!(status.state, TaskState::Idle);
        assert_eq!(status.last_outcome, Some(RunOutcome::Failed));
        assert_eq!((status.runs, status.failures), (1, 1));

        status.mark_started(now);
        status.mark_finished(now, None);
        assert_eq!(status.last_outcome, Some(RunOutcome::Completed));
        assert_eq!(status.last_error, None);
        assert_eq!((status.runs, status.failures), (2, 1));
    }
}
