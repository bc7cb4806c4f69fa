use std::time::Duration;

use thiserror::Error;

/// Why a step did not succeed.
///
/// A non-zero exit with return code checking disabled is not a failure: the outcome is
/// successful and [`ExecutionOutcome::ignored_exit`] is set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("failed to launch command: {0}")]
    LaunchFailure(String),

    #[error("command exited with return code {code}")]
    NonZeroExit { code: i32 },

    #[error("command was terminated by a signal")]
    Signalled,

    #[error("command timed out after {after:?}")]
    TimedOut { after: Duration },

    #[error("command was cancelled")]
    Cancelled,

    #[error("secret variable `{key}` may only be used in a step input")]
    SecretExposure { key: String },

    #[error("failed to store command output: {0}")]
    OutputCapture(String),
}

/// Result of running one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Captured standard output, trimmed.
    pub stdout: String,
    /// Captured standard error, trimmed.
    pub stderr: String,
    pub ignored_exit: bool,
    pub failure: Option<StepFailure>,
}

impl ExecutionOutcome {
    pub fn failed(failure: StepFailure) -> Self {
        Self {
            success: false,
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// The command was stopped by the executor rather than finishing on its own.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self.failure,
            Some(StepFailure::Cancelled) | Some(StepFailure::TimedOut { .. })
        )
    }
}
