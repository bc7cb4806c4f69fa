use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use dialoguer::console::Term;

use super::Session;
use crate::{
    cli::InstallOptions,
    config::{answers::Answers, PROVIDED_KEYS, SECRET_KEYS},
    console::Console,
    prompt::{self, Prompter, Selections},
    store::KeyValueStore,
};

pub struct InstallCommand {
    pub install_options: InstallOptions,
    pub session: Session,
}

#[async_trait]
impl super::Command for InstallCommand {
    async fn run(&self) -> Result<()> {
        crate::system::check_root()?;
        if !crate::system::is_uefi() {
            tracing::warn!("This host was not booted with UEFI, installing the boot loader may fail");
        }
        crate::system::check_tools(crate::system::REQUIRED_TOOLS)?;

        let config_source = crate::config::source::get_config_source().await;
        tracing::info!("Load config from {}", config_source.source_debug_string());
        let global_config = config_source.get_global_config().await?;
        let answers = config_source.get_answers().await?;
        let plan = config_source.get_plan().await?;
        drop(config_source);
        super::run::ensure_runnable(
            &plan,
            PROVIDED_KEYS.iter().copied(),
            SECRET_KEYS.iter().copied(),
        )?;

        let console = Console::stdout();
        let Some(Selections { answers, password }) = self.select(&console, &answers).await?
        else {
            console.line("Operation canceled");
            return Ok(());
        };

        let packages = global_config
            .linux
            .resolve_packages()
            .await
            .context("Failed to get the package list")?;

        let mut store = KeyValueStore::with_registry(self.session.registry.clone());
        global_config
            .export(&packages, &mut store)
            .context("Failed to export settings")?;
        answers
            .export(&mut store)
            .context("Failed to export answers")?;
        store
            .insert_secret(SECRET_KEYS[0], password)
            .context("Failed to store the password")?;

        tracing::info!(
            "Installing to {} as \"{}\"",
            store.get("DEVICE").unwrap_or_default(),
            store.get("DEVICE_NAME").unwrap_or_default()
        );
        super::run::execute_plan(&plan, &mut store, &global_config, &self.session).await
    }
}

impl InstallCommand {
    /// Complete the answers interactively and get the password. `None` means the user
    /// backed out.
    async fn select(&self, console: &Console, given: &Answers) -> Result<Option<Selections>> {
        let interactive = Term::stderr().is_term();

        let mut selections = if self.install_options.password_stdin {
            let missing = missing_answers(given);
            if !missing.is_empty() {
                bail!(
                    "With '--password-stdin' every answer must be in answers.toml, missing: {}",
                    missing.join(", ")
                );
            }
            Selections {
                answers: given.clone(),
                password: super::read_secret_from_stdin().await?,
            }
        } else {
            if !interactive {
                bail!("Standard error is not a terminal. Please use '--password-stdin' with a complete answers.toml in non-interactive mode.");
            }
            match Prompter::new(console.clone()).collect(given).await? {
                Some(selections) => selections,
                None => return Ok(None),
            }
        };

        let answers = &mut selections.answers;
        answers
            .device_name
            .get_or_insert_with(|| prompt::DEFAULT_HOSTNAME.to_owned());
        answers.wipe.get_or_insert(false);
        check_answers(answers)?;

        prompt::summary(console, &selections.answers);

        if !self.install_options.yes {
            if !interactive {
                bail!("Standard error is not a terminal. Please use '--yes' to confirm the operation in non-interactive mode.");
            }
            if !Prompter::new(console.clone()).confirm_install()? {
                return Ok(None);
            }
        }
        Ok(Some(selections))
    }
}

/// Refuse answers the prompts would not accept, whether they came from the prompts or
/// from answers.toml.
pub fn check_answers(answers: &Answers) -> Result<()> {
    let problems = prompt::answer_problems(answers);
    if !problems.is_empty() {
        bail!("Invalid answers, see 'config check': {}", problems.join("; "));
    }
    Ok(())
}

/// Names of the answers that are not given.
pub fn missing_answers(answers: &Answers) -> Vec<&'static str> {
    let mut missing = vec![];
    if answers.device.is_none() {
        missing.push("device");
    }
    if answers.user_name.is_none() {
        missing.push("user_name");
    }
    if answers.locale.is_none() {
        missing.push("locale");
    }
    if answers.keyboard.is_none() {
        missing.push("keyboard");
    }
    if answers.timezone.is_none() {
        missing.push("timezone");
    }
    missing
}
