use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::{
    cli::ConfigCheckOptions,
    config::{answers::Answers, global::GlobalConfig, PROVIDED_KEYS, SECRET_KEYS},
    console::Console,
    plan::{
        check::{PlanChecker, Severity},
        Plan,
    },
    prompt::{self, catalog},
};

/// FAT32 volume labels are at most 11 characters.
const FAT_LABEL_MAX: usize = 11;

pub struct ConfigCheckCommand {
    pub config_check_options: ConfigCheckOptions,
}

#[async_trait]
impl super::super::Command for ConfigCheckCommand {
    async fn run(&self) -> Result<()> {
        let mut is_error = false;

        macro_rules! continue_or_throw {
            ($error:expr) => ({
                is_error = true;
                if self.config_check_options.keep_checking {
                    tracing::error!("{:#}", $error);
                } else {
                    anyhow::bail!($error);
                }
            });
            ($($arg:tt)*) => ({
                is_error = true;

                if self.config_check_options.keep_checking {
                    tracing::error!($($arg)*);
                } else {
                    anyhow::bail!($($arg)*);
                }
            });
        }

        let console = Console::stdout();
        let config_source = crate::config::source::get_config_source().await;

        // Check if config can be loaded
        console.line(&format!(
            "Load config from {}",
            config_source.source_debug_string()
        ));
        let config = config_source
            .get_config()
            .await
            .context("Load config failed")?;

        let global_config = config.global.unwrap_or_default();
        let answers = config.answers.unwrap_or_default();
        let plan = match config.plan {
            Some(plan) => plan,
            None => crate::plan::builtin::secure_usb()?,
        };

        console.rule("global.toml");
        for message in global_problems(&global_config) {
            continue_or_throw!("{}", message);
        }
        if let Err(error) = global_config
            .linux
            .resolve_packages()
            .await
            .and_then(|packages| {
                if packages.is_empty() {
                    bail!("The package list is empty")
                }
                Ok(packages)
            })
        {
            continue_or_throw!(error);
        }

        console.rule("answers.toml");
        for message in prompt::answer_problems(&answers) {
            continue_or_throw!("{}", message);
        }
        for message in answer_catalog_problems(&answers).await {
            tracing::warn!("{message}");
        }

        console.rule(&format!("plan \"{}\"", plan.name));
        if let Some(message) = plan_problem(&plan) {
            continue_or_throw!("{}", message);
        }

        if is_error {
            bail!("Config check failed, please check the errors above")
        } else {
            console.line("Config check passed")
        }

        Ok(())
    }
}

/// Mistakes in the settings that would make the plan fail.
pub fn global_problems(global_config: &GlobalConfig) -> Vec<String> {
    let mut problems = vec![];
    let device = &global_config.device;

    for (name, label) in [
        ("part1_label", &device.part1_label),
        ("part2_label", &device.part2_label),
    ] {
        if label.is_empty() || label.len() > FAT_LABEL_MAX {
            problems.push(format!(
                "[device] {name} \"{label}\" must be 1 to {FAT_LABEL_MAX} characters, it labels a FAT32 file system"
            ));
        }
    }
    for (name, label) in [
        ("part3_label", &device.part3_label),
        ("part4_label", &device.part4_label),
    ] {
        if label.is_empty() || label.contains(char::is_whitespace) {
            problems.push(format!(
                "[device] {name} \"{label}\" must be non-empty without whitespace"
            ));
        }
    }
    let labels = [
        &device.part1_label,
        &device.part2_label,
        &device.part3_label,
        &device.part4_label,
    ];
    for (index, label) in labels.iter().enumerate() {
        if labels[..index].contains(label) {
            problems.push(format!("[device] label \"{label}\" is used twice"));
        }
    }
    if device.linux_part_size.trim().is_empty() {
        problems.push("[device] linux_part_size is empty".to_owned());
    }
    if device.swap_size.trim().is_empty() {
        problems.push("[device] swap_size is empty".to_owned());
    }
    if !device.readme_file.is_file() {
        problems.push(format!(
            "[device] readme_file {:?} does not exist",
            device.readme_file
        ));
    }

    let shell = &global_config.run.shell;
    if !shell.is_file() {
        problems.push(format!("[run] shell {shell:?} does not exist"));
    }
    if global_config.linux.suite.trim().is_empty() {
        problems.push("[linux] suite is empty".to_owned());
    }
    if !global_config.linux.mirror.contains("://") {
        problems.push(format!(
            "[linux] mirror \"{}\" is not a URL",
            global_config.linux.mirror
        ));
    }
    problems
}

/// Answers not offered by this host. Only warnings: the host may differ from the one
/// the install runs on.
async fn answer_catalog_problems(answers: &Answers) -> Vec<String> {
    let mut problems = vec![];
    if let Some(device) = &answers.device {
        if !Path::new(device).exists() {
            problems.push(format!("device {device} is not connected"));
        }
    }
    if let Some(locale) = &answers.locale {
        if let Ok(locales) = catalog::locales(catalog::SUPPORTED_LOCALES).await {
            if !locales.contains(locale) {
                problems.push(format!("locale \"{locale}\" is not in {}", catalog::SUPPORTED_LOCALES));
            }
        }
    }
    if let Some(keyboard) = &answers.keyboard {
        if let Ok(layouts) = catalog::keyboard_layouts(catalog::KEYMAP_DIRS) {
            if !layouts.is_empty() && !layouts.contains(keyboard) {
                problems.push(format!("keyboard layout \"{keyboard}\" is unknown"));
            }
        }
    }
    if let Some(timezone) = &answers.timezone {
        if !Path::new(catalog::ZONEINFO_DIR).join(timezone).is_file() {
            problems.push(format!("timezone \"{timezone}\" is unknown"));
        }
    }
    problems
}

fn plan_problem(plan: &Plan) -> Option<String> {
    let issues = PlanChecker::new()
        .provided(PROVIDED_KEYS.iter().copied())
        .secrets(SECRET_KEYS.iter().copied())
        .check(plan);
    for issue in issues.iter().filter(|issue| issue.severity == Severity::Warning) {
        tracing::warn!("{issue}");
    }
    let errors: Vec<String> = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .map(ToString::to_string)
        .collect();
    (!errors.is_empty()).then(|| format!("Plan \"{}\" has errors: {}", plan.name, errors.join("; ")))
}
