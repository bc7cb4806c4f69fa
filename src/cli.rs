use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::build::CLAP_LONG_VERSION;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[clap(long_version = CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(long, short = 'c')]
    /// Path to the root directory where to load configuration files. Default value is /etc/secure-usb.
    pub config_dir: Option<String>,

    /// Log at DEBUG level and show every command and its output on the console.
    #[clap(long, short = 'd', default_value = "false")]
    pub debug: bool,

    /// File the install log is appended to. Overrides `[log] file` from global.toml.
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision a USB device with the configured plan.
    #[command(name = "install")]
    Install(InstallOptions),

    /// Run the steps of a plan file.
    #[command(name = "run")]
    Run(RunOptions),

    /// Inspect the plan.
    #[command(name = "plan", subcommand)]
    Plan(PlanSubcommand),

    /// Commands for managing the configuration files.
    #[command(name = "config", subcommand)]
    Config(ConfigSubcommand),

    /// Show facts about this host.
    #[command(name = "info")]
    Info,
}

#[derive(Parser, Debug)]
pub struct InstallOptions {
    /// Skip the confirmation prompt.
    #[clap(long, short = 'y', default_value = "false")]
    pub yes: bool,

    /// Read the user password from the first line of stdin instead of prompting.
    #[clap(long, default_value = "false")]
    pub password_stdin: bool,
}

#[derive(Parser, Debug)]
pub struct RunOptions {
    /// Path to the plan file (TOML).
    pub plan: PathBuf,

    /// Set a variable before the run, e.g. `--set DEVICE=/dev/sdb`. Can be repeated.
    #[clap(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Read the value of the secret variable KEY from the first line of stdin.
    #[clap(long, value_name = "KEY")]
    pub secret_stdin: Option<String>,

    /// Skip the confirmation prompt.
    #[clap(long, short = 'y', default_value = "false")]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum PlanSubcommand {
    /// Print the stages and steps of the plan.
    #[command(name = "show")]
    Show(PlanShowOptions),

    /// Check the plan for mistakes without running it.
    #[command(name = "check")]
    Check(PlanCheckOptions),
}

#[derive(Parser, Debug)]
pub struct PlanShowOptions {
    /// Plan file to show instead of the configured plan.
    pub plan: Option<PathBuf>,

    /// Print the plan as JSON.
    #[clap(long, default_value = "false")]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct PlanCheckOptions {
    /// Plan file to check instead of the configured plan.
    pub plan: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Check the configuration files.
    #[command(name = "check")]
    Check(ConfigCheckOptions),

    /// Print a commented example of a configuration file.
    #[command(name = "template")]
    Template(ConfigTemplateOptions),
}

#[derive(Parser, Debug)]
pub struct ConfigCheckOptions {
    /// Keep checking after the first error.
    #[clap(long, default_value = "false")]
    pub keep_checking: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigTemplateOptions {
    /// The file to print an example of.
    #[arg(value_enum, default_value_t = TemplateFile::Global)]
    pub file: TemplateFile,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemplateFile {
    /// global.toml with all default values.
    Global,
    /// answers.toml for an unattended install.
    Answers,
}

fn parse_key_value(text: &str) -> Result<(String, String), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{text}`"))?;
    if !crate::store::substitute::is_identifier(key) {
        return Err(format!("`{key}` is not a valid variable name"));
    }
    Ok((key.to_owned(), value.to_owned()))
}

#[cfg(test)]
pub mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "secure-usb",
            "--debug",
            "run",
            "plan.toml",
            "--set",
            "DEVICE=/dev/sdz",
            "--set",
            "EMPTY=",
            "--secret-stdin",
            "USER_PASS",
        ]);
        assert!(cli.debug);
        let Command::Run(options) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(options.plan, PathBuf::from("plan.toml"));
        assert_eq!(
            options.set,
            vec![
                ("DEVICE".to_owned(), "/dev/sdz".to_owned()),
                ("EMPTY".to_owned(), String::new())
            ]
        );
        assert_eq!(options.secret_stdin.as_deref(), Some("USER_PASS"));
    }

    #[test]
    fn test_reject_bad_set() {
        assert!(Cli::try_parse_from(["secure-usb", "run", "p.toml", "--set", "NOVALUE"]).is_err());
        assert!(Cli::try_parse_from(["secure-usb", "run", "p.toml", "--set", "1X=a"]).is_err());
    }

    #[test]
    fn test_parse_config_template() {
        let cli = Cli::parse_from(["secure-usb", "config", "template"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigSubcommand::Template(ConfigTemplateOptions {
                file: TemplateFile::Global
            }))
        ));
        let cli = Cli::parse_from(["secure-usb", "config", "template", "answers"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigSubcommand::Template(ConfigTemplateOptions {
                file: TemplateFile::Answers
            }))
        ));
    }

    #[test]
    fn test_parse_plan_show() {
        let cli = Cli::parse_from(["secure-usb", "plan", "show", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Plan(PlanSubcommand::Show(PlanShowOptions {
                plan: None,
                json: true
            }))
        ));
    }
}
