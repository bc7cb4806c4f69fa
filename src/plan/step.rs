use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{resource::ResourceSpec, store::KeyValueStore};

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// What the orchestrator does when a step fails.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and release everything acquired so far.
    #[default]
    Abort,
    /// Record the failure and go on with the next step.
    Continue,
}

/// A guard on a step, evaluated against the store right before the step would run.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub var: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<String>,
}

impl Condition {
    /// Secret variables never satisfy a condition; unset variables compare as empty.
    pub fn holds(&self, store: &KeyValueStore) -> bool {
        if store.is_secret(&self.var) {
            return false;
        }
        let value = store.get(&self.var).unwrap_or_default();
        let equals = self.equals.as_deref().map_or(true, |expected| value == expected);
        let not_equals = self
            .not_equals
            .as_deref()
            .map_or(true, |unexpected| value != unexpected);
        equals && not_equals
    }
}

/// One described, substitutable and executable unit of work.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Label printed on the console. May contain `{VAR}` placeholders.
    pub description: String,

    /// Command line run by the shell. May contain `{VAR}` placeholders, except secret ones.
    pub command: String,

    /// Text piped to the command's standard input. The only place secrets may be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub check_returncode: bool,

    /// Run with `set -euo pipefail`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub strict: bool,

    /// Variable receiving the trimmed standard output when the step succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_var: Option<String>,

    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Seconds before the step is killed. Overrides `[run] step_timeout_secs`; 0 means
    /// no limit for this step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,

    /// Resource opened by this step. Its release step is guaranteed to be attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquire: Option<ResourceSpec>,
}

impl Step {
    pub fn new(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
            input: None,
            check_returncode: true,
            strict: false,
            output_var: None,
            on_failure: FailurePolicy::default(),
            timeout_secs: None,
            when: None,
            acquire: None,
        }
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn output_var(mut self, name: impl Into<String>) -> Self {
        self.output_var = Some(name.into());
        self
    }

    pub fn ignore_returncode(mut self) -> Self {
        self.check_returncode = false;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn best_effort(mut self) -> Self {
        self.on_failure = FailurePolicy::Continue;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.when = Some(condition);
        self
    }

    pub fn acquire(mut self, resource: ResourceSpec) -> Self {
        self.acquire = Some(resource);
        self
    }

    /// The time limit of this step, given the executor's default.
    pub fn timeout_duration(&self, default: Option<Duration>) -> Option<Duration> {
        match self.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default,
        }
    }
}
