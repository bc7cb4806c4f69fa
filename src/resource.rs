//! Bookkeeping for resources that a run opens and must close again: opened encrypted
//! volumes, mounted filesystems and the like.
//!
//! Every resource goes `Unacquired -> Acquired -> Released`, or ends up `Leaked` when
//! its release step could not be performed. The tracker only records state; running
//! the release steps is the orchestrator's job.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plan::step::Step;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    EncryptedVolume,
    Mount,
    Other,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(serde_variant::to_variant_name(self).unwrap_or("<unknown>"))
    }
}

/// Declared on the step that opens a resource, together with the step that closes it.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub id: String,

    pub kind: ResourceKind,

    pub release: Box<Step>,
}

impl ResourceSpec {
    pub fn new(id: impl Into<String>, kind: ResourceKind, release: Step) -> Self {
        Self {
            id: id.into(),
            kind,
            release: Box::new(release),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unacquired,
    Acquired,
    Released,
    Leaked,
}

#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: String,
    pub kind: ResourceKind,
    /// Substituted description of the step that acquired the resource.
    pub label: String,
    pub release: Step,
    pub state: ResourceState,
}

impl ResourceRecord {
    pub fn new(spec: &ResourceSpec, label: impl Into<String>) -> Self {
        Self {
            id: spec.id.clone(),
            kind: spec.kind,
            label: label.into(),
            release: (*spec.release).clone(),
            state: ResourceState::Acquired,
        }
    }
}

/// A resource that was acquired and could not be released. Needs operator action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} `{id}` ({label}) is still open: {reason}. Release it manually with `{release_command}`")]
pub struct ResourceLeak {
    pub id: String,
    pub kind: ResourceKind,
    pub label: String,
    pub release_command: String,
    pub reason: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("resource `{0}` is already open")]
    AlreadyOpen(String),

    #[error("resource `{0}` is not open")]
    NotOpen(String),
}

#[derive(Debug, Default)]
pub struct ResourceTracker {
    open: Vec<ResourceRecord>,
    closed: Vec<ResourceRecord>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, record: ResourceRecord) -> Result<(), TrackerError> {
        if self.open.iter().any(|open| open.id == record.id) {
            return Err(TrackerError::AlreadyOpen(record.id));
        }
        tracing::debug!("Resource `{}` ({}) acquired", record.id, record.kind);
        self.open.push(ResourceRecord {
            state: ResourceState::Acquired,
            ..record
        });
        Ok(())
    }

    pub fn has_open(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn state(&self, id: &str) -> ResourceState {
        if self.open.iter().any(|open| open.id == id) {
            return ResourceState::Acquired;
        }
        self.closed
            .iter()
            .rev()
            .find(|closed| closed.id == id)
            .map_or(ResourceState::Unacquired, |closed| closed.state)
    }

    /// Remove a specific open resource so it can be released.
    pub fn take(&mut self, id: &str) -> Result<ResourceRecord, TrackerError> {
        let index = self
            .open
            .iter()
            .position(|open| open.id == id)
            .ok_or_else(|| TrackerError::NotOpen(id.to_owned()))?;
        Ok(self.open.remove(index))
    }

    /// Remove the most recently acquired open resource.
    pub fn take_last(&mut self) -> Option<ResourceRecord> {
        self.open.pop()
    }

    pub fn mark_released(&mut self, record: ResourceRecord) {
        tracing::debug!("Resource `{}` ({}) released", record.id, record.kind);
        self.closed.push(ResourceRecord {
            state: ResourceState::Released,
            ..record
        });
    }

    pub fn mark_leaked(
        &mut self,
        record: ResourceRecord,
        release_command: impl Into<String>,
        reason: impl Into<String>,
    ) -> ResourceLeak {
        let leak = ResourceLeak {
            id: record.id.clone(),
            kind: record.kind,
            label: record.label.clone(),
            release_command: release_command.into(),
            reason: reason.into(),
        };
        tracing::error!(target: "secure_usb::leak", "{leak}");
        self.closed.push(ResourceRecord {
            state: ResourceState::Leaked,
            ..record
        });
        leak
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        for record in self.open.iter().rev() {
            tracing::error!(
                target: "secure_usb::leak",
                "{} `{}` ({}) was never released. Release it manually with `{}`",
                record.kind,
                record.id,
                record.label,
                record.release.command
            );
        }
    }
}
