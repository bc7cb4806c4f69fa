use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::{
    cli::PlanCheckOptions,
    config::{PROVIDED_KEYS, SECRET_KEYS},
    console::Console,
    plan::check::{PlanChecker, PlanIssue, Severity},
};

pub struct PlanCheckCommand {
    pub plan_check_options: PlanCheckOptions,
}

#[async_trait]
impl crate::cmd::Command for PlanCheckCommand {
    async fn run(&self) -> Result<()> {
        let plan = super::load_plan(self.plan_check_options.plan.as_deref()).await?;
        let issues = PlanChecker::new()
            .provided(PROVIDED_KEYS.iter().copied())
            .secrets(SECRET_KEYS.iter().copied())
            .check(&plan);

        report_issues(&Console::stdout(), &issues);

        let errors = issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .count();
        if errors > 0 {
            bail!("Plan \"{}\" has {errors} error(s)", plan.name)
        }
        Console::stdout().line(&format!(
            "Plan \"{}\" is valid: {} stage(s), {} step(s), {} resource(s), {} warning(s)",
            plan.name,
            plan.stages.len(),
            plan.steps().count(),
            plan.resource_ids().len(),
            issues.len()
        ));
        Ok(())
    }
}

pub fn report_issues(console: &Console, issues: &[PlanIssue]) {
    for issue in issues {
        match issue.severity {
            Severity::Error => console.critical(&format!("error: {issue}")),
            Severity::Warning => console.warn(&format!("warning: {issue}")),
        }
    }
}
