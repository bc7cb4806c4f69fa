use std::{collections::BTreeSet, fmt::Display};

use tokio_util::sync::CancellationToken;

use crate::{
    console::Mark,
    exec::{Executor, StepFailure},
    plan::{
        step::{FailurePolicy, Step},
        Entry, Plan,
    },
    resource::{ResourceLeak, ResourceRecord, ResourceState, ResourceTracker},
    store::KeyValueStore,
};

/// Why a run stopped before the end of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    StepFailed { description: String },
    Cancelled,
    UnknownResource { id: String },
    ResourceConflict { id: String },
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::StepFailed { description } => write!(f, "step \"{description}\" failed"),
            AbortReason::Cancelled => write!(f, "cancelled"),
            AbortReason::UnknownResource { id } => {
                write!(f, "plan releases unknown resource `{id}`")
            }
            AbortReason::ResourceConflict { id } => {
                write!(f, "resource `{id}` was acquired while already open")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub executed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub abort: Option<AbortReason>,
    /// Ids of released resources, in release order.
    pub released: Vec<String>,
    pub leaked: Vec<ResourceLeak>,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.failed == 0 && self.abort.is_none() && self.leaked.is_empty()
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} executed, {} failed, {} skipped, {} released, {} leaked",
            self.executed,
            self.failed,
            self.skipped,
            self.released.len(),
            self.leaked.len()
        )?;
        if let Some(abort) = &self.abort {
            write!(f, " (aborted: {abort})")?;
        }
        Ok(())
    }
}

/// Runs a [`Plan`] stage by stage and guarantees that every resource it acquires gets a
/// release attempt, whichever way the run ends.
pub struct Orchestrator<'a> {
    executor: &'a Executor,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self {
            executor,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, plan: &Plan, store: &mut KeyValueStore) -> RunReport {
        let declared = plan.resource_ids();
        let mut tracker = ResourceTracker::new();
        let mut report = RunReport::default();

        tracing::info!("Running plan \"{}\"", plan.name);

        'stages: for stage in &plan.stages {
            self.executor.console().rule(&stage.title);
            tracing::info!("Stage: {}", stage.title);

            for entry in &stage.entries {
                if self.cancel.is_cancelled() {
                    report.abort = Some(AbortReason::Cancelled);
                    break 'stages;
                }
                let abort = match entry {
                    Entry::Step(step) => self.run_step(step, store, &mut tracker, &mut report).await,
                    Entry::Release(release) => {
                        self.release_entry(&release.release, &declared, store, &mut tracker, &mut report)
                            .await
                    }
                };
                if let Some(reason) = abort {
                    report.abort = Some(reason);
                    break 'stages;
                }
            }
        }

        if let Some(reason) = &report.abort {
            tracing::error!("Run aborted: {reason}");
        }
        self.release_all(store, &mut tracker, &mut report).await;

        tracing::info!("Plan \"{}\" finished: {report}", plan.name);
        report
    }

    async fn run_step(
        &self,
        step: &Step,
        store: &mut KeyValueStore,
        tracker: &mut ResourceTracker,
        report: &mut RunReport,
    ) -> Option<AbortReason> {
        let description = display_text(store, &step.description);

        if let Some(condition) = &step.when {
            if !condition.holds(store) {
                self.executor.console().finish(&description, Mark::Skipped);
                tracing::debug!("Skipped: {description}");
                report.skipped += 1;
                return None;
            }
        }

        let outcome = self
            .executor
            .execute_with_cancel(step, store, &self.cancel)
            .await;
        report.executed += 1;

        if outcome.success {
            let Some(resource) = &step.acquire else {
                return None;
            };
            return match tracker.acquire(ResourceRecord::new(resource, description)) {
                Ok(()) => None,
                Err(error) => {
                    tracing::error!("{error}");
                    report.failed += 1;
                    Some(AbortReason::ResourceConflict {
                        id: resource.id.clone(),
                    })
                }
            };
        }

        report.failed += 1;
        if outcome.is_interrupted() {
            return Some(match outcome.failure {
                Some(StepFailure::Cancelled) => AbortReason::Cancelled,
                _ => AbortReason::StepFailed { description },
            });
        }
        match step.on_failure {
            FailurePolicy::Abort => Some(AbortReason::StepFailed { description }),
            FailurePolicy::Continue => {
                tracing::warn!("Continuing after failed step: {description}");
                None
            }
        }
    }

    async fn release_entry(
        &self,
        id: &str,
        declared: &BTreeSet<&str>,
        store: &mut KeyValueStore,
        tracker: &mut ResourceTracker,
        report: &mut RunReport,
    ) -> Option<AbortReason> {
        if !declared.contains(id) {
            tracing::error!("Plan releases resource `{id}` which no step acquires");
            return Some(AbortReason::UnknownResource { id: id.to_owned() });
        }
        let record = match tracker.take(id) {
            Ok(record) => record,
            Err(_) => {
                match tracker.state(id) {
                    ResourceState::Released | ResourceState::Leaked => {
                        tracing::warn!("Resource `{id}` was already closed, not releasing it again")
                    }
                    // The acquiring step was skipped or failed with `continue`.
                    _ => tracing::debug!("Resource `{id}` was never acquired, nothing to release"),
                }
                report.skipped += 1;
                return None;
            }
        };

        let policy = record.release.on_failure;
        let description = display_text(store, &record.release.description);
        report.executed += 1;
        match self.release(record, store, tracker).await {
            Ok(id) => {
                report.released.push(id);
                None
            }
            Err(leak) => {
                self.executor.console().critical(&leak.to_string());
                report.leaked.push(leak);
                report.failed += 1;
                match policy {
                    FailurePolicy::Abort => Some(AbortReason::StepFailed { description }),
                    FailurePolicy::Continue => None,
                }
            }
        }
    }

    /// Release what is still open, most recent first.
    async fn release_all(
        &self,
        store: &mut KeyValueStore,
        tracker: &mut ResourceTracker,
        report: &mut RunReport,
    ) {
        if !tracker.has_open() {
            return;
        }
        self.executor.console().rule("Releasing resources");
        while let Some(record) = tracker.take_last() {
            tracing::info!("Releasing {} `{}` ({})", record.kind, record.id, record.label);
            match self.release(record, store, tracker).await {
                Ok(id) => report.released.push(id),
                Err(leak) => {
                    self.executor.console().critical(&leak.to_string());
                    report.leaked.push(leak);
                }
            }
        }
    }

    /// Run the release step of `record`. Cleanup is never cancelled, only bounded by
    /// the step timeout.
    async fn release(
        &self,
        record: ResourceRecord,
        store: &mut KeyValueStore,
        tracker: &mut ResourceTracker,
    ) -> Result<String, ResourceLeak> {
        let outcome = self
            .executor
            .execute_with_cancel(&record.release, store, &CancellationToken::new())
            .await;
        if outcome.success {
            let id = record.id.clone();
            tracker.mark_released(record);
            return Ok(id);
        }

        let command = display_text(store, &record.release.command);
        let reason = outcome
            .failure
            .map(|failure| failure.to_string())
            .unwrap_or_else(|| "release step failed".to_owned());
        Err(tracker.mark_leaked(record, command, reason))
    }
}

/// Substitute text for display, falling back to the raw template when it refers to a
/// secret.
fn display_text(store: &KeyValueStore, text: &str) -> String {
    store
        .substitute_public(text)
        .unwrap_or_else(|_| text.to_owned())
}
