//! Helpers for the read-only host queries (`lsblk`, `lscpu`, ...).
//!
//! Plan steps go through the [`Executor`](super::Executor) instead; these helpers are
//! for small, argument-vector commands whose output the installer parses itself.

use std::{
    marker::{Send, Sync},
    process::Stdio,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[async_trait]
pub trait CheckCommandOutput {
    /// Run the command and return its stdout as text, failing on a non-zero exit.
    async fn run(&mut self) -> Result<String>;

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl for<'s> Fn(i32, &'s str, &'s str) -> Result<R> + Send + Sync,
    ) -> Result<R>;
}

#[async_trait]
impl CheckCommandOutput for Command {
    async fn run(&mut self) -> Result<String> {
        self.run_with_status_checker(|code, stdout, _| {
            if code != 0 {
                bail!("Bad exit code")
            } else {
                Ok(stdout.to_owned())
            }
        })
        .await
    }

    async fn run_with_status_checker<R>(
        &mut self,
        f: impl for<'s> Fn(i32, &'s str, &'s str) -> Result<R> + Send + Sync,
    ) -> Result<R> {
        // Parsers below expect untranslated tool output
        self.env("LC_ALL", "C");

        tracing::trace!(cmd=?self.as_std(), "run external cmd");

        let output = self
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("cmd: {:?}", self.as_std()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code();

        match code {
            Some(code) => f(code, &stdout, &stderr),
            None => Err(anyhow!("killed by signal")),
        }
        .with_context(|| {
            format!(
                "\ncmd: {:?}\nexit code: {}\nstdout: {}\nstderr: {}",
                self.as_std(),
                code.map(|code| code.to_string())
                    .unwrap_or("unknown".to_string()),
                stdout.trim(),
                stderr.trim(),
            )
        })
        .context("Failed to execute external command")
    }
}
