use anyhow::{Context as _, Result};
use async_trait::async_trait;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, ContentArrangement, Table,
};

use crate::{
    cli::PlanShowOptions,
    plan::{
        step::{FailurePolicy, Step},
        Entry, Plan,
    },
};

pub struct PlanShowCommand {
    pub plan_show_options: PlanShowOptions,
}

#[async_trait]
impl crate::cmd::Command for PlanShowCommand {
    async fn run(&self) -> Result<()> {
        let plan = super::load_plan(self.plan_show_options.plan.as_deref()).await?;

        if self.plan_show_options.json {
            let json =
                serde_json::to_string_pretty(&plan).context("Failed to serialize plan as JSON")?;
            println!("{json}");
        } else {
            println!("{}", plan_table(&plan));
        }
        Ok(())
    }
}

pub fn plan_table(plan: &Plan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["#", "Stage", "Description", "Command", "Options"]);

    let mut number = 0;
    for stage in &plan.stages {
        for entry in &stage.entries {
            number += 1;
            match entry {
                Entry::Step(step) => {
                    table.add_row(vec![
                        Cell::new(number),
                        Cell::new(&stage.title),
                        Cell::new(&step.description),
                        Cell::new(&step.command),
                        options_cell(step),
                    ]);
                }
                Entry::Release(release) => {
                    table.add_row(vec![
                        Cell::new(number),
                        Cell::new(&stage.title),
                        Cell::new(format!("Release `{}`", release.release)).fg(Color::Cyan),
                        Cell::new("<release step of the resource>").fg(Color::DarkGrey),
                        Cell::new(""),
                    ]);
                }
            }
        }
    }
    table
}

/// Everything about a step besides description and command, one item per line.
pub fn step_options(step: &Step) -> Vec<String> {
    let mut options = vec![];
    if step.input.is_some() {
        options.push("input".to_owned());
    }
    if step.strict {
        options.push("strict".to_owned());
    }
    if !step.check_returncode {
        options.push("ignore return code".to_owned());
    }
    if step.on_failure == FailurePolicy::Continue {
        options.push("continue on failure".to_owned());
    }
    if let Some(var) = &step.output_var {
        options.push(format!("output -> {var}"));
    }
    match step.timeout_secs {
        Some(0) => options.push("no timeout".to_owned()),
        Some(timeout) => options.push(format!("timeout {timeout}s")),
        None => {}
    }
    if let Some(condition) = &step.when {
        let mut text = format!("when {}", condition.var);
        if let Some(expected) = &condition.equals {
            text.push_str(&format!(" == {expected:?}"));
        }
        if let Some(unexpected) = &condition.not_equals {
            text.push_str(&format!(" != {unexpected:?}"));
        }
        options.push(text);
    }
    if let Some(resource) = &step.acquire {
        options.push(format!("acquires {} `{}`", resource.kind, resource.id));
    }
    options
}

fn options_cell(step: &Step) -> Cell {
    let options = step_options(step);
    if options.is_empty() {
        Cell::new("<none>").fg(Color::DarkGrey)
    } else if step.acquire.is_some() {
        Cell::new(options.join("\n")).fg(Color::Green)
    } else {
        Cell::new(options.join("\n"))
    }
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;
    use crate::{
        plan::step::Condition,
        resource::{ResourceKind, ResourceSpec},
    };

    #[test]
    fn test_step_options() {
        assert!(step_options(&Step::new("a", "true")).is_empty());

        let step = Step::new("Open", "cryptsetup open")
            .input("{USER_PASS}")
            .strict()
            .best_effort()
            .when(Condition {
                var: "PART4_FORMAT".into(),
                equals: Some("BTRFS".into()),
                not_equals: None,
            })
            .acquire(ResourceSpec::new(
                "vol",
                ResourceKind::EncryptedVolume,
                Step::new("Close", "cryptsetup close"),
            ));
        assert_eq!(
            step_options(&step),
            vec![
                "input",
                "strict",
                "continue on failure",
                "when PART4_FORMAT == \"BTRFS\"",
                "acquires encrypted-volume `vol`",
            ]
        );
    }

    #[test]
    fn test_builtin_plan_table() -> Result<()> {
        let plan = crate::plan::builtin::secure_usb()?;
        let rendered = plan_table(&plan).to_string();
        assert!(rendered.contains("Partitioning USB Device"));
        assert!(rendered.contains("Release `linux-volume`"));
        Ok(())
    }
}
