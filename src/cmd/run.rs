use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use dialoguer::{console::Term, Confirm};
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::{
    cli::RunOptions,
    config::global::GlobalConfig,
    console::Console,
    exec::Executor,
    orchestrator::{Orchestrator, RunReport},
    plan::{
        check::{PlanChecker, Severity},
        Plan,
    },
    store::KeyValueStore,
};

pub struct RunCommand {
    pub run_options: RunOptions,
    pub session: Session,
}

#[async_trait]
impl super::Command for RunCommand {
    async fn run(&self) -> Result<()> {
        crate::system::check_root()?;

        let plan = Plan::load(&self.run_options.plan).await?;
        let global_config = crate::config::source::get_config_source()
            .await
            .get_global_config()
            .await?;

        let mut store = KeyValueStore::with_registry(self.session.registry.clone());
        for (key, value) in &self.run_options.set {
            store
                .set(key.as_str(), value.as_str())
                .with_context(|| format!("Failed to set variable {key}"))?;
        }
        let mut secrets = vec![];
        if let Some(key) = &self.run_options.secret_stdin {
            let secret = super::read_secret_from_stdin().await?;
            store
                .insert_secret(key.as_str(), secret)
                .with_context(|| format!("Failed to set secret variable {key}"))?;
            secrets.push(key.as_str());
        }

        let provided: Vec<String> = store.keys().map(str::to_owned).collect();
        ensure_runnable(&plan, provided, secrets)?;

        if !self.run_options.yes {
            if !Term::stderr().is_term() {
                bail!("Standard error is not a terminal. Please use '--yes' to confirm the operation in non-interactive mode.");
            }
            if !Confirm::new()
                .with_prompt(format!(
                    "Run the {} steps of plan \"{}\"?",
                    plan.steps().count(),
                    plan.name
                ))
                .default(false)
                .interact()?
            {
                Console::stdout().line("Operation canceled");
                return Ok(());
            }
        }

        execute_plan(&plan, &mut store, &global_config, &self.session).await
    }
}

/// Log the issues of `plan` and refuse it if any is an error.
pub(crate) fn ensure_runnable<P, S>(plan: &Plan, provided: P, secrets: S) -> Result<()>
where
    P: IntoIterator,
    P::Item: Into<String>,
    S: IntoIterator,
    S::Item: Into<String>,
{
    let issues = PlanChecker::new()
        .provided(provided)
        .secrets(secrets)
        .check(plan);
    for issue in &issues {
        match issue.severity {
            Severity::Error => tracing::error!("{issue}"),
            Severity::Warning => tracing::warn!("{issue}"),
        }
    }
    let errors = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count();
    if errors > 0 {
        bail!(
            "Plan \"{}\" has {errors} error(s), refusing to run it",
            plan.name
        );
    }
    Ok(())
}

/// Run `plan` with Ctrl-C wired to cancellation, and turn the report into the command
/// result.
pub(crate) async fn execute_plan(
    plan: &Plan,
    store: &mut KeyValueStore,
    global_config: &GlobalConfig,
    session: &Session,
) -> Result<()> {
    let console = Console::stdout();
    let executor = Executor::new(console.clone())
        .shell(&global_config.run.shell)
        .debug(session.debug)
        .default_timeout(global_config.run.step_timeout());

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the running step and cleaning up");
                cancel.cancel();
            }
        }
    });

    let report = Orchestrator::new(&executor)
        .with_cancel(cancel)
        .run(plan, store)
        .await;
    interrupt.abort();

    conclude(&console, &report, session)
}

fn conclude(console: &Console, report: &RunReport, session: &Session) -> Result<()> {
    let log_hint = session
        .log_file
        .as_ref()
        .map(|path| format!(", see {path:?} for details"))
        .unwrap_or_default();

    let scrubbed = session.registry.scrubbed_count();
    if scrubbed > 0 {
        let message = format!(
            "A secret showed up in {scrubbed} log record(s) and was masked. Check the commands that print it"
        );
        tracing::warn!("{message}");
        console.warn(&message);
    }

    if !report.leaked.is_empty() {
        console.rule("Resources left open");
        for leak in &report.leaked {
            console.critical(&format!("{}: {}", leak.id, leak.release_command));
        }
        let ids: Vec<&str> = report.leaked.iter().map(|leak| leak.id.as_str()).collect();
        bail!(
            "Resources left open: {}. Release them manually before using the device{log_hint}",
            ids.join(", ")
        );
    }
    if let Some(abort) = &report.abort {
        console.rule("Aborted");
        bail!("Run aborted: {abort}{log_hint}");
    }

    console.rule("Done");
    if report.failed > 0 {
        console.warn(&format!(
            "{} best-effort step(s) failed{log_hint}",
            report.failed
        ));
    }
    tracing::info!("Run finished: {report}");
    Ok(())
}
