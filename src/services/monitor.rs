//! Stalled-task monitor.
//!
//! A periodic sweeper that scans the ledger for tasks that have
//! overstayed a claimed state and applies the configured escalation
//! policy. Running more than one instance is safe but redundant: every
//! action is compare-and-set guarded, so a second sweeper just loses the
//! races.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::CoordinationResult;
use crate::domain::models::{
    CoordinationEvent, EventType, MonitorConfig, StallPolicy, Task, TaskPriority, TaskSpec,
    TaskStatus,
};
use crate::domain::ports::{StatusPayload, TaskLedger};
use crate::services::channel::CoordinationChannel;

/// Capability required of agents that pick up escalation tasks.
pub const ESCALATION_CAPABILITY: &str = "ops.escalation.review";

/// Kind discriminator for escalation tasks spawned by the monitor.
pub const ESCALATION_KIND: &str = "ops.escalation";

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    /// Tasks found past the stall threshold
    pub stalled: usize,
    /// Stalled tasks returned to the pending pool
    pub reassigned: usize,
    /// Stalled tasks marked and left for escalation
    pub escalated: usize,
    /// Stalled tasks failed after exhausting their claim budget
    pub abandoned: usize,
    /// Failed tasks reset for another attempt
    pub retried: usize,
    /// Claimed tasks with no attempt record (executor crashed before
    /// recording, or a write bypassed the claim path)
    pub anomalies: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Live counters for a running monitor.
#[derive(Debug, Clone, Default)]
pub struct MonitorStatus {
    pub running: bool,
    pub total_sweeps: u64,
    pub successful_sweeps: u64,
    pub failed_sweeps: u64,
    pub last_sweep: Option<Instant>,
    pub total_reassigned: u64,
    pub total_escalated: u64,
}

/// Handle to control a running monitor.
pub struct MonitorHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<MonitorStatus>>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub async fn status(&self) -> MonitorStatus {
        self.status.read().await.clone()
    }
}

pub struct StalledTaskMonitor {
    ledger: Arc<dyn TaskLedger>,
    channel: Arc<CoordinationChannel>,
    config: MonitorConfig,
    status: Arc<RwLock<MonitorStatus>>,
    stop_flag: Arc<AtomicBool>,
}

impl StalledTaskMonitor {
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        channel: Arc<CoordinationChannel>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            ledger,
            channel,
            config,
            status: Arc::new(RwLock::new(MonitorStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            stop_flag: self.stop_flag.clone(),
            status: self.status.clone(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run the sweep loop until stopped or too many consecutive failures.
    pub async fn run(&self) {
        {
            let mut status = self.status.write().await;
            status.running = true;
        }

        let mut consecutive_failures = 0u32;
        let mut timer = interval(Duration::from_secs(self.config.sweep_interval_secs));

        if self.config.run_on_startup {
            self.sweep_cycle(&mut consecutive_failures).await;
        }

        loop {
            timer.tick().await;
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            self.sweep_cycle(&mut consecutive_failures).await;

            if consecutive_failures >= self.config.max_consecutive_failures {
                error!(
                    failures = consecutive_failures,
                    "Monitor stopping after repeated sweep failures"
                );
                break;
            }
        }

        let mut status = self.status.write().await;
        status.running = false;
        info!("Monitor stopped");
    }

    async fn sweep_cycle(&self, consecutive_failures: &mut u32) {
        {
            let mut status = self.status.write().await;
            status.total_sweeps += 1;
        }

        match self.run_once().await {
            Ok(report) => {
                *consecutive_failures = 0;
                let mut status = self.status.write().await;
                status.successful_sweeps += 1;
                status.last_sweep = Some(Instant::now());
                status.total_reassigned += (report.reassigned + report.retried) as u64;
                status.total_escalated += report.escalated as u64;
            }
            Err(e) => {
                *consecutive_failures += 1;
                let mut status = self.status.write().await;
                status.failed_sweeps += 1;
                warn!("Sweep failed: {e}");
            }
        }
    }

    /// Run a single sweep. Public for tests and manual invocation.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> CoordinationResult<SweepReport> {
        let threshold = chrono::Duration::minutes(
            i64::try_from(self.config.stall_threshold_mins).unwrap_or(i64::MAX),
        );
        let mut report = SweepReport::default();

        let overdue = self
            .ledger
            .overdue(&[TaskStatus::Claimed, TaskStatus::InProgress], threshold)
            .await?;

        for task in overdue {
            report.stalled += 1;
            self.handle_stalled(&task, &mut report).await?;
        }

        self.retry_failed(&mut report).await?;

        if !report.is_empty() {
            info!(?report, "Sweep acted on tasks");
        } else {
            debug!("Sweep found nothing to do");
        }

        self.channel
            .publish(
                CoordinationEvent::new(EventType::MonitorSweepCompleted)
                    .with_detail(serde_json::to_value(&report)?),
            )
            .await;

        Ok(report)
    }

    async fn handle_stalled(
        &self,
        task: &Task,
        report: &mut SweepReport,
    ) -> CoordinationResult<()> {
        let attempts = self.ledger.attempt_count(task.id).await?;

        // A claimed task with no attempt record means the executor died
        // between the claim write and the attempt append, or something
        // bypassed the claim path entirely. Reassigned regardless of
        // policy so the task cannot silently starve.
        if attempts == 0 {
            error!(
                task_id = %task.id,
                status = %task.status,
                "Stalled task has no attempt history; forcing reassignment"
            );
            report.anomalies += 1;
            if self.ledger.reassign(task.id, task.status).await? {
                report.reassigned += 1;
                self.publish_reassigned(task, "missing_attempt_history").await;
            }
            return Ok(());
        }

        match self.config.policy {
            StallPolicy::LogOnly => {
                warn!(
                    task_id = %task.id,
                    claimed_by = task.claimed_by.as_deref().unwrap_or("-"),
                    "Task stalled past threshold"
                );
                self.channel
                    .publish(
                        CoordinationEvent::new(EventType::TaskStalled)
                            .with_task(task.id)
                            .with_detail(serde_json::json!({
                                "policy": "log_only",
                                "attempts": attempts,
                            })),
                    )
                    .await;
            }
            StallPolicy::Reassign => {
                if attempts >= task.max_attempts {
                    self.abandon(task, attempts, report).await?;
                } else if self.ledger.reassign(task.id, task.status).await? {
                    report.reassigned += 1;
                    self.publish_reassigned(task, "stall_threshold_exceeded").await;
                }
            }
            StallPolicy::Escalate => {
                if self.ledger.mark_stalled(task.id, task.status).await? {
                    report.escalated += 1;
                    self.spawn_escalation(task).await?;
                }
            }
        }

        Ok(())
    }

    /// Budget exhausted: Stalled, then Failed. Two CAS steps so a racing
    /// agent write is observed rather than clobbered.
    async fn abandon(
        &self,
        task: &Task,
        attempts: u32,
        report: &mut SweepReport,
    ) -> CoordinationResult<()> {
        if !self.ledger.mark_stalled(task.id, task.status).await? {
            return Ok(());
        }
        let failed = self
            .ledger
            .update_status(
                task.id,
                TaskStatus::Stalled,
                TaskStatus::Failed,
                StatusPayload::error(format!("Abandoned after {attempts} stalled attempts")),
            )
            .await?;
        if failed {
            report.abandoned += 1;
            self.channel
                .publish(
                    CoordinationEvent::new(EventType::TaskFailed)
                        .with_task(task.id)
                        .with_detail(serde_json::json!({
                            "reason": "abandoned",
                            "attempts": attempts,
                        })),
                )
                .await;
        }
        Ok(())
    }

    async fn spawn_escalation(&self, task: &Task) -> CoordinationResult<()> {
        let mut spec = TaskSpec::new(ESCALATION_KIND);
        spec.escalated_from = Some(task.id);
        spec.priority = TaskPriority::High;
        spec.tags = vec!["escalation".to_string()];
        spec.required_capabilities = {
            let mut caps = task.required_capabilities.clone();
            caps.push(ESCALATION_CAPABILITY.to_string());
            caps
        };
        spec.payload = serde_json::json!({
            "original_task_id": task.id,
            "original_kind": task.kind,
            "stalled_agent": task.claimed_by,
            "stalled_status": task.status.as_str(),
        });

        let escalation_id = self.ledger.submit(spec).await?;
        warn!(
            task_id = %task.id,
            escalation_id = %escalation_id,
            "Stalled task escalated for review"
        );
        self.channel
            .publish(
                CoordinationEvent::new(EventType::TaskEscalated)
                    .with_task(task.id)
                    .with_detail(serde_json::json!({ "escalation_task_id": escalation_id })),
            )
            .await;
        Ok(())
    }

    /// Failed tasks with claim budget remaining go back to the pool.
    /// The retry decision lives here, not in the executor: "this attempt
    /// failed" is not "this task is abandoned".
    async fn retry_failed(&self, report: &mut SweepReport) -> CoordinationResult<()> {
        let failed = self
            .ledger
            .list(crate::domain::ports::TaskQuery {
                status: Some(TaskStatus::Failed),
                ..Default::default()
            })
            .await?;

        for task in failed {
            let attempts = self.ledger.attempt_count(task.id).await?;
            if attempts >= task.max_attempts {
                continue;
            }
            if self.ledger.reassign(task.id, TaskStatus::Failed).await? {
                report.retried += 1;
                info!(
                    task_id = %task.id,
                    attempts,
                    max_attempts = task.max_attempts,
                    "Failed task reset for retry"
                );
                self.publish_reassigned(&task, "retry_budget_remaining").await;
            }
        }
        Ok(())
    }

    async fn publish_reassigned(&self, task: &Task, reason: &str) {
        self.channel
            .publish(
                CoordinationEvent::new(EventType::TaskReassigned)
                    .with_task(task.id)
                    .with_detail(serde_json::json!({
                        "reason": reason,
                        "previous_agent": task.claimed_by,
                    })),
            )
            .await;
    }
}
