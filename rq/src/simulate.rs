//! Synthetic workload for observing scheduler behaviour from the CLI

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::Priority;
use crate::scheduler::{QueueOptions, Scheduler, SchedulerError, SchedulerStats};

/// Shape of a simulated workload
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// Number of tasks to submit
    pub tasks: usize,
    /// How long each task runs
    pub work: Duration,
    /// Every n-th task (1-based) fails as soon as it starts
    pub fail_every: Option<usize>,
    pub priority: Priority,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            tasks: 8,
            work: Duration::from_millis(50),
            fail_every: None,
            priority: Priority::Normal,
        }
    }
}

#[derive(Debug, Error)]
#[error("simulated failure in task {0}")]
pub struct SimulatedFailure(pub usize);

/// Timeline of one simulated task, offsets relative to submission
///
/// Both offsets are taken inside the task. A task the scheduler never ran
/// has no start, and finishes when its handle settled.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub index: usize,
    pub started_ms: Option<u64>,
    pub finished_ms: u64,
    pub outcome: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub options: QueueOptions,
    pub tasks: Vec<TaskRecord>,
    pub total_ms: u64,
    pub failed: usize,
    pub stats: SchedulerStats,
}

fn millis_since(origin: Instant) -> u64 {
    origin.elapsed().as_millis() as u64
}

/// Run `plan` through a fresh scheduler built from `options`
pub async fn run_simulation(options: QueueOptions, plan: SimulationPlan) -> Result<SimulationReport, SchedulerError> {
    debug!(?options, ?plan, "run_simulation: called");
    let scheduler = Scheduler::new(options)?;
    let origin = Instant::now();

    let handles: Vec<_> = (1..=plan.tasks)
        .map(|index| {
            let work = plan.work;
            let fails = plan.fail_every.is_some_and(|n| n > 0 && index % n == 0);
            scheduler.enqueue_with_priority(
                move || async move {
                    let started_ms = millis_since(origin);
                    if fails {
                        return (started_ms, millis_since(origin), Err(SimulatedFailure(index)));
                    }
                    tokio::time::sleep(work).await;
                    (started_ms, millis_since(origin), Ok(()))
                },
                plan.priority,
            )
        })
        .collect();

    let mut tasks = Vec::with_capacity(handles.len());
    for (index, handle) in (1..).zip(handles) {
        let record = match handle.await {
            Ok((started_ms, finished_ms, Ok(()))) => TaskRecord {
                index,
                started_ms: Some(started_ms),
                finished_ms,
                outcome: "ok".to_string(),
                ok: true,
            },
            Ok((started_ms, finished_ms, Err(failure))) => TaskRecord {
                index,
                started_ms: Some(started_ms),
                finished_ms,
                outcome: failure.to_string(),
                ok: false,
            },
            Err(e) => TaskRecord {
                index,
                started_ms: None,
                finished_ms: millis_since(origin),
                outcome: e.to_string(),
                ok: false,
            },
        };
        tasks.push(record);
    }

    let total_ms = millis_since(origin);
    let state = scheduler.state().await?;
    let failed = tasks.iter().filter(|t| !t.ok).count();

    Ok(SimulationReport {
        options: state.options,
        tasks,
        total_ms,
        failed,
        stats: state.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_simulation_reports_batches_and_failures() {
        let report = run_simulation(
            QueueOptions {
                concurrency: 2,
                ..Default::default()
            },
            SimulationPlan {
                tasks: 4,
                work: Duration::from_millis(50),
                fail_every: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(report.tasks.len(), 4);
        assert_eq!(report.failed, 2);
        assert!(!report.tasks[1].ok);
        assert_eq!(report.tasks[1].outcome, "simulated failure in task 2");
        assert_eq!(report.stats.peak_concurrent, 2);
        assert_eq!(report.stats.total_completed, 4);

        // Task 2 fails at once, so task 3 takes its slot at 0 and task 4 starts at 50
        let timeline: Vec<_> = report.tasks.iter().map(|t| (t.started_ms, t.finished_ms)).collect();
        assert_eq!(
            timeline,
            vec![(Some(0), 50), (Some(0), 0), (Some(0), 50), (Some(50), 50)]
        );
        assert_eq!(report.total_ms, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_batches_without_failures() {
        let report = run_simulation(
            QueueOptions {
                concurrency: 2,
                ..Default::default()
            },
            SimulationPlan {
                tasks: 4,
                work: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(report.tasks[2].started_ms, Some(50));
        assert_eq!(report.tasks[3].finished_ms, 100);
        assert_eq!(report.total_ms, 100);
    }

    #[tokio::test]
    async fn test_simulation_rejects_bad_options() {
        let result = run_simulation(
            QueueOptions {
                interval_cap: 0,
                ..Default::default()
            },
            SimulationPlan::default(),
        )
        .await;
        assert!(matches!(result, Err(SchedulerError::InvalidOptions(_))));
    }
}
