use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};
use zeroize::Zeroize as _;

use crate::{store::SecretRegistry, types::Secret};

pub mod config;
pub mod info;
pub mod install;
pub mod plan;
pub mod run;

#[async_trait]
pub trait Command {
    async fn run(&self) -> Result<()>;
}

/// What the command line and `global.toml` decided for this process.
#[derive(Clone, Default)]
pub struct Session {
    /// Shared with the install log writer.
    pub registry: SecretRegistry,
    pub debug: bool,
    pub log_file: Option<PathBuf>,
}

pub trait IntoCommand {
    fn into_command(self, session: Session) -> Box<dyn Command>;
}

impl IntoCommand for crate::cli::Command {
    fn into_command(self, session: Session) -> Box<dyn Command> {
        match self {
            crate::cli::Command::Install(install_options) => Box::new(install::InstallCommand {
                install_options,
                session,
            }),
            crate::cli::Command::Run(run_options) => {
                Box::new(run::RunCommand { run_options, session })
            }
            crate::cli::Command::Plan(plan_subcommand) => plan_subcommand.into_command(session),
            crate::cli::Command::Config(config_subcommand) => {
                config_subcommand.into_command(session)
            }
            crate::cli::Command::Info => Box::new(info::InfoCommand {}),
        }
    }
}

/// Read a secret from the first line of stdin, without the line break.
pub(crate) async fn read_secret_from_stdin() -> Result<Secret> {
    read_secret(BufReader::new(tokio::io::stdin())).await
}

async fn read_secret(mut reader: impl AsyncBufRead + Unpin) -> Result<Secret> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    let secret = Secret::from(line.trim_end_matches(['\r', '\n']));
    line.zeroize();
    if secret.is_empty() {
        bail!("Got an empty secret from stdin");
    }
    Ok(secret)
}
