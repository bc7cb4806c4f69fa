use std::{
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use nix::{
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use tokio::{io::AsyncWriteExt as _, process::Command};
use tokio_util::sync::CancellationToken;

use super::outcome::{ExecutionOutcome, StepFailure};
use crate::{
    console::{Console, Mark},
    plan::step::Step,
    store::{KeyValueStore, StoreError},
    types::Secret,
};

pub const DEFAULT_SHELL: &str = "/bin/bash";

const STRICT_PREFIX: &str = "set -euo pipefail;";

/// Runs one [`Step`] at a time through the shell.
///
/// The executor never returns an error: whatever happens to the command ends up in the
/// [`ExecutionOutcome`], on the console and in the log.
#[derive(Clone)]
pub struct Executor {
    shell: PathBuf,
    console: Console,
    debug: bool,
    default_timeout: Option<Duration>,
}

impl Executor {
    pub fn new(console: Console) -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            console,
            debug: false,
            default_timeout: None,
        }
    }

    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Print the substituted command and its output as panels.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Timeout for steps that do not set their own.
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub async fn execute(&self, step: &Step, store: &mut KeyValueStore) -> ExecutionOutcome {
        self.execute_with_cancel(step, store, &CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        step: &Step,
        store: &mut KeyValueStore,
        cancel: &CancellationToken,
    ) -> ExecutionOutcome {
        let (description, command) = match public_text(store, &step.description)
            .and_then(|description| Ok((description, public_text(store, &step.command)?)))
        {
            Ok(texts) => texts,
            Err(failure) => {
                // Only the template is shown, never a substituted secret.
                self.console.finish(&step.description, Mark::Failure);
                tracing::error!("Command rejected: {}: {failure}", step.command);
                return ExecutionOutcome::failed(failure);
            }
        };
        let input = step
            .input
            .as_deref()
            .map(|input| store.substitute_secret(input));

        self.console.pending(&description);
        if self.debug {
            self.console.panel("Command", &store.redact(&command));
        }

        let line = if step.strict {
            format!("{STRICT_PREFIX}{command}")
        } else {
            command.clone()
        };
        let timeout = step.timeout_duration(self.default_timeout);

        let output = match run_line(&self.shell, &line, input.as_ref(), timeout, cancel).await {
            Ok(output) => output,
            Err(failure) => {
                self.console.finish(&description, Mark::Failure);
                match &failure {
                    StepFailure::Cancelled => tracing::warn!("Command cancelled: {command}"),
                    StepFailure::TimedOut { after } => {
                        tracing::error!("Command timed out after {}s: {command}", after.as_secs())
                    }
                    _ => tracing::error!("Exception while executing command: {command}: {failure}"),
                }
                return ExecutionOutcome::failed(failure);
            }
        };
        drop(input);

        let exit_code = output.status.code();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

        if self.debug && (!stdout.is_empty() || !stderr.is_empty()) {
            self.console.panel(
                "Output",
                &store.redact(&format!("STDOUT:\n{stdout}\n\nSTDERR:\n{stderr}")),
            );
        }

        let exited_cleanly = exit_code == Some(0);
        if step.check_returncode && !exited_cleanly {
            self.console.finish(&description, Mark::Failure);
            tracing::error!("Command failed: {command}");
            match exit_code {
                Some(code) => tracing::error!("Return code: {code}"),
                None => tracing::error!("Return code: none (terminated by signal)"),
            }
            tracing::error!("Stdout: {}", store.redact(&stdout));
            tracing::error!("Stderr: {}", store.redact(&stderr));

            let failure = match exit_code {
                Some(code) => StepFailure::NonZeroExit { code },
                None => StepFailure::Signalled,
            };
            return ExecutionOutcome {
                success: false,
                exit_code,
                stdout,
                stderr,
                ignored_exit: false,
                failure: Some(failure),
            };
        }

        if let Some(output_var) = &step.output_var {
            if let Err(error) = store.set(output_var.as_str(), stdout.as_str()) {
                self.console.finish(&description, Mark::Failure);
                tracing::error!("Cannot store output of command: {command}: {error}");
                let failure = match error {
                    StoreError::SecretOverwrite(key) => StepFailure::SecretExposure { key },
                    other => StepFailure::OutputCapture(other.to_string()),
                };
                return ExecutionOutcome {
                    exit_code,
                    stdout,
                    stderr,
                    ..ExecutionOutcome::failed(failure)
                };
            }
            tracing::debug!("Stored output in variable '{output_var}'");
        }

        let ignored_exit = !exited_cleanly;
        self.console.finish(
            &description,
            if ignored_exit {
                Mark::IgnoredExit
            } else {
                Mark::Success
            },
        );
        tracing::info!("Command executed successfully: {command}");

        ExecutionOutcome {
            success: true,
            exit_code,
            stdout,
            stderr,
            ignored_exit,
            failure: None,
        }
    }
}

fn public_text(store: &KeyValueStore, text: &str) -> Result<String, StepFailure> {
    store.substitute_public(text).map_err(|error| match error {
        StoreError::SecretReference(key) => StepFailure::SecretExposure { key },
        other => StepFailure::LaunchFailure(other.to_string()),
    })
}

async fn run_line(
    shell: &Path,
    line: &str,
    input: Option<&Secret>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<Output, StepFailure> {
    if cancel.is_cancelled() {
        return Err(StepFailure::Cancelled);
    }

    let mut child = Command::new(shell)
        .arg("-c")
        .arg(line)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| StepFailure::LaunchFailure(format!("{}: {error}", shell.display())))?;

    let pid = child.id();
    let stdin = child.stdin.take();

    let feed = async move {
        if let (Some(mut stdin), Some(input)) = (stdin, input) {
            // The command may exit without reading all of it.
            if let Err(error) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!("Failed to write command input: {error}");
            }
        }
    };
    let wait = async move {
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        output
    };
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;

        output = wait => output.map_err(|error| StepFailure::LaunchFailure(error.to_string())),
        _ = cancel.cancelled() => {
            kill_process_group(pid);
            Err(StepFailure::Cancelled)
        }
        _ = deadline => {
            kill_process_group(pid);
            Err(StepFailure::TimedOut {
                after: timeout.unwrap_or_default(),
            })
        }
    }
}

fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(errno) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!("Failed to kill process group {pid}: {errno}");
    }
}

#[cfg(test)]
pub mod tests {
    use std::time::Instant;

    use anyhow::Result;
    use rstest::rstest;

    use super::*;
    use crate::logging::tests::capture_logs;

    fn executor() -> Executor {
        Executor::new(Console::hidden())
    }

    #[tokio::test]
    async fn test_output_var_receives_trimmed_stdout() -> Result<()> {
        let mut store = KeyValueStore::new();
        let step = Step::new("Greeting", "echo hello").output_var("GREETING");

        let outcome = executor().execute(&step, &mut store).await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(store.get("GREETING"), Some("hello"));
        Ok(())
    }

    #[tokio::test]
    async fn test_ignored_return_code_is_success() {
        let mut store = KeyValueStore::new();
        let step = Step::new("Exit 1", "exit 1").ignore_returncode();

        let outcome = executor().execute(&step, &mut store).await;
        assert!(outcome.success);
        assert!(outcome.ignored_exit);
        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(outcome.failure, None);
    }

    #[tokio::test]
    async fn test_failure_logs_code_and_streams() {
        let (logs, _guard) = capture_logs();
        let mut store = KeyValueStore::new();
        let step = Step::new("Fail", "echo out; echo err >&2; exit 3").output_var("NEVER");

        let outcome = executor().execute(&step, &mut store).await;
        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(StepFailure::NonZeroExit { code: 3 }));
        assert_eq!(outcome.stdout, "out");
        assert_eq!(outcome.stderr, "err");
        assert!(!store.contains_key("NEVER"));

        let logs = logs.contents();
        assert!(logs.contains("Command failed: echo out; echo err >&2; exit 3"));
        assert!(logs.contains("Return code: 3"));
        assert!(logs.contains("Stdout: out"));
        assert!(logs.contains("Stderr: err"));
    }

    #[tokio::test]
    async fn test_substitutes_command_and_keeps_shell_variables() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.set("NAME", "usb0")?;
        let step = Step::new("Formatting {NAME}", "X=1; echo {NAME}-$X").output_var("OUT");

        let outcome = executor().execute(&step, &mut store).await;
        assert!(outcome.success);
        assert_eq!(store.get("OUT"), Some("usb0-1"));
        Ok(())
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_outcome() {
        let mut store = KeyValueStore::new();
        let step = Step::new("Anything", "true");

        let outcome = executor()
            .shell("/nonexistent/shell")
            .execute(&step, &mut store)
            .await;
        assert!(!outcome.success);
        assert!(matches!(outcome.failure, Some(StepFailure::LaunchFailure(_))));
    }

    #[rstest]
    #[case::lenient(false, true)]
    #[case::strict(true, false)]
    #[tokio::test]
    async fn test_strict_mode(#[case] strict: bool, #[case] success: bool) {
        let mut store = KeyValueStore::new();
        let mut step = Step::new("Pipeline", "false | true; false && true; echo done");
        step.strict = strict;

        let outcome = executor().execute(&step, &mut store).await;
        assert_eq!(outcome.success, success);
    }

    #[tokio::test]
    async fn test_input_is_piped() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.set("USER_NAME", "alice")?;
        let step = Step::new("Read input", "cat").input("{USER_NAME}:x\n").output_var("READ");

        let outcome = executor().execute(&step, &mut store).await;
        assert!(outcome.success);
        assert_eq!(store.get("READ"), Some("alice:x"));
        Ok(())
    }

    #[tokio::test]
    async fn test_secret_in_command_is_rejected_before_launch() -> Result<()> {
        let (logs, _guard) = capture_logs();
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("ran");

        let mut store = KeyValueStore::new();
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;
        let step = Step::new(
            "Leak",
            format!("echo {{USER_PASS}} > {}", marker.display()),
        );

        let outcome = executor().execute(&step, &mut store).await;
        assert_eq!(
            outcome.failure,
            Some(StepFailure::SecretExposure {
                key: "USER_PASS".into()
            })
        );
        assert!(!marker.exists());

        let logs = logs.contents();
        assert!(logs.contains("USER_PASS"));
        assert!(!logs.contains("hunter2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_secret_echoed_by_command_is_redacted_in_log() -> Result<()> {
        let (logs, _guard) = capture_logs();
        let mut store = KeyValueStore::new();
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;
        let step = Step::new("Echo input", "cat; exit 1").input("{USER_PASS}");

        let outcome = executor().execute(&step, &mut store).await;
        assert!(!outcome.success);

        let logs = logs.contents();
        assert!(logs.contains("Stdout: ***"));
        assert!(!logs.contains("hunter2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_output_var_cannot_overwrite_secret() -> Result<()> {
        let mut store = KeyValueStore::new();
        store.insert_secret("USER_PASS", Secret::from("hunter2"))?;
        let step = Step::new("Overwrite", "echo plain").output_var("USER_PASS");

        let outcome = executor().execute(&step, &mut store).await;
        assert_eq!(
            outcome.failure,
            Some(StepFailure::SecretExposure {
                key: "USER_PASS".into()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let mut store = KeyValueStore::new();
        let step = Step::new("Hang", "sleep 30").timeout(Duration::from_secs(1));

        let started = Instant::now();
        let outcome = executor().execute(&step, &mut store).await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            outcome.failure,
            Some(StepFailure::TimedOut {
                after: Duration::from_secs(1)
            })
        );
        assert!(outcome.is_interrupted());
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let mut store = KeyValueStore::new();
        let step = Step::new("Hang", "sleep 30");

        let outcome = executor()
            .default_timeout(Some(Duration::from_secs(1)))
            .execute(&step, &mut store)
            .await;
        assert!(matches!(outcome.failure, Some(StepFailure::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_zero_step_timeout_lifts_default() {
        let mut store = KeyValueStore::new();
        let mut step = Step::new("Slow", "sleep 2");
        step.timeout_secs = Some(0);

        let outcome = executor()
            .default_timeout(Some(Duration::from_secs(1)))
            .execute(&step, &mut store)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.failure, None);
    }

    #[tokio::test]
    async fn test_cancel_stops_command() {
        let mut store = KeyValueStore::new();
        let step = Step::new("Hang", "sleep 30");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = executor()
            .execute_with_cancel(&step, &mut store, &cancel)
            .await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.failure, Some(StepFailure::Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_launch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("ran");
        let mut store = KeyValueStore::new();
        let step = Step::new("Touch", format!("touch {}", marker.display()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = executor()
            .execute_with_cancel(&step, &mut store, &cancel)
            .await;
        assert_eq!(outcome.failure, Some(StepFailure::Cancelled));
        assert!(!marker.exists());
        Ok(())
    }
}
