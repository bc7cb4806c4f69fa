pub mod cli;
pub mod cmd;
pub mod config;
pub mod console;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod prompt;
pub mod resource;
pub mod sequencer;
pub mod store;
pub mod system;
pub mod types;

use std::path::Path;

use anyhow::{bail, Result};
use clap::Parser as _;
use cmd::{IntoCommand as _, Session};
use config::source::fs::FileSystemConfigSource;
use shadow_rs::shadow;
use store::SecretRegistry;

shadow!(build);

pub async fn run() -> Result<()> {
    let args = cli::Cli::parse();

    // Set to the given config dir from command line, or use the default one.
    if let Some(config_dir) = &args.config_dir {
        if !Path::new(config_dir).is_dir() {
            bail!("Config dir {config_dir} does not exist or not a directory")
        }
        config::source::set_config_source(FileSystemConfigSource::new(config_dir)).await;
    }

    let session = session_for(&args).await?;
    logging::init(
        session.log_file.as_deref(),
        session.debug,
        session.registry.clone(),
    )?;

    tracing::info!(
        "secure-usb version: v{}  commit: {}  buildtime: {}",
        build::PKG_VERSION,
        build::COMMIT_HASH,
        build::BUILD_TIME
    );
    tracing::debug!(
        "Using config source from {:?}",
        config::source::get_config_source()
            .await
            .source_debug_string()
    );

    // Handle the command
    args.command.into_command(session).run().await?;

    Ok(())
}

/// Only the commands that run a plan write the install log, and only they read the log
/// settings from global.toml.
async fn session_for(args: &cli::Cli) -> Result<Session> {
    let mut session = Session {
        registry: SecretRegistry::new(),
        debug: args.debug,
        log_file: None,
    };
    if matches!(args.command, cli::Command::Install(_) | cli::Command::Run(_)) {
        let global_config = config::source::get_config_source()
            .await
            .get_global_config()
            .await?;
        session.debug |= global_config.log.debug;
        session.log_file = Some(
            args.log_file
                .clone()
                .unwrap_or_else(|| global_config.log.file.clone()),
        );
    }
    Ok(session)
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

    #[cfg(test)]
    #[ctor::ctor]
    fn init() {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "debug".into());
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
