//! Static checks run on a plan before anything is executed.

use std::{collections::BTreeSet, fmt::Display};

use super::{step::Step, Entry, Plan};
use crate::store::substitute::{is_identifier, placeholders};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanIssue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl Display for PlanIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Checks a plan against the variables the caller will provide.
#[derive(Debug, Default)]
pub struct PlanChecker {
    provided: BTreeSet<String>,
    secrets: BTreeSet<String>,
}

impl PlanChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables set before the plan starts.
    pub fn provided<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provided.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Variables that will hold secrets. They count as provided.
    pub fn secrets<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secrets.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn check(&self, plan: &Plan) -> Vec<PlanIssue> {
        let mut run = CheckRun {
            checker: self,
            issues: Vec::new(),
            captured: BTreeSet::new(),
            open: Vec::new(),
            declared: plan.resource_ids().into_iter().map(str::to_owned).collect(),
        };

        if plan.entry_count() == 0 {
            run.error(format!("plan `{}`", plan.name), "plan has no steps");
        }

        for stage in &plan.stages {
            if stage.entries.is_empty() {
                run.warning(format!("stage \"{}\"", stage.title), "stage has no steps");
            }
            for (index, entry) in stage.entries.iter().enumerate() {
                let location = format!("stage \"{}\", entry {}", stage.title, index + 1);
                match entry {
                    Entry::Step(step) => run.check_step(&location, step),
                    Entry::Release(release) => run.check_release(&location, &release.release),
                }
            }
        }

        run.issues.sort_by(|a, b| b.severity.cmp(&a.severity));
        run.issues
    }
}

struct CheckRun<'a> {
    checker: &'a PlanChecker,
    issues: Vec<PlanIssue>,
    /// Variables captured by earlier steps.
    captured: BTreeSet<String>,
    /// Resources acquired and not yet released explicitly, ignoring `when`.
    open: Vec<String>,
    declared: BTreeSet<String>,
}

impl CheckRun<'_> {
    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Error, location, message);
    }

    fn warning(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.push(Severity::Warning, location, message);
    }

    fn push(&mut self, severity: Severity, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(PlanIssue {
            severity,
            location: location.into(),
            message: message.into(),
        });
    }

    fn is_known(&self, key: &str) -> bool {
        self.checker.provided.contains(key)
            || self.checker.secrets.contains(key)
            || self.captured.contains(key)
    }

    fn check_texts(&mut self, location: &str, step: &Step) {
        for (field, text) in [
            ("description", Some(&step.description)),
            ("command", Some(&step.command)),
            ("input", step.input.as_ref()),
        ] {
            let Some(text) = text else { continue };
            for key in placeholders(text) {
                if field != "input" && self.checker.secrets.contains(key) {
                    self.error(
                        location,
                        format!("secret variable `{key}` is referenced from the {field}; only the input may use it"),
                    );
                } else if !self.is_known(key) {
                    self.warning(
                        location,
                        format!("variable `{key}` in the {field} is never set and will be empty"),
                    );
                }
            }
        }
        if step.command.trim().is_empty() {
            self.error(location, "command is empty");
        }
    }

    fn check_step(&mut self, location: &str, step: &Step) {
        let location = format!("{location} \"{}\"", step.description);
        self.check_texts(&location, step);

        if let Some(condition) = &step.when {
            if self.checker.secrets.contains(&condition.var) {
                self.error(&location, format!("condition on secret variable `{}`", condition.var));
            }
            if condition.equals.is_none() && condition.not_equals.is_none() {
                self.warning(&location, "condition has neither `equals` nor `not_equals` and always holds");
            }
        }

        if let Some(output_var) = &step.output_var {
            if !is_identifier(output_var) {
                self.error(&location, format!("`{output_var}` is not a valid variable name"));
            } else if self.checker.secrets.contains(output_var) {
                self.error(&location, format!("output would overwrite secret variable `{output_var}`"));
            } else {
                self.captured.insert(output_var.to_owned());
            }
        }

        if let Some(resource) = &step.acquire {
            if self.open.contains(&resource.id) {
                self.error(
                    &location,
                    format!("resource `{}` is acquired again before being released", resource.id),
                );
            } else {
                self.open.push(resource.id.clone());
            }

            let release = &resource.release;
            let release_location = format!("{location}, release of `{}`", resource.id);
            self.check_texts(&release_location, release);
            if release.acquire.is_some() {
                self.error(&release_location, "a release step cannot acquire a resource");
            }
            if release.output_var.is_some() {
                self.error(&release_location, "a release step cannot capture output");
            }
            if release.when.is_some() {
                self.warning(&release_location, "`when` is ignored on release steps");
            }
        }
    }

    fn check_release(&mut self, location: &str, id: &str) {
        let location = format!("{location} (release \"{id}\")");
        if !self.declared.contains(id) {
            self.error(location, format!("resource `{id}` is never acquired"));
        } else if let Some(index) = self.open.iter().position(|open| open == id) {
            self.open.remove(index);
        } else {
            self.error(location, format!("resource `{id}` is released before it is acquired"));
        }
    }
}
