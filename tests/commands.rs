// Commands against an in-memory config source

use anyhow::Result;
use async_trait::async_trait;
use secure_usb::{
    cli::{ConfigCheckOptions, PlanCheckOptions, PlanShowOptions},
    cmd::{
        config::check::ConfigCheckCommand,
        plan::{check::PlanCheckCommand, show::PlanShowCommand},
        Command as _,
    },
    config::{
        answers::Answers,
        global::GlobalConfig,
        source::{set_config_source, ConfigSource},
        ConfigBundle,
    },
    plan::Plan,
};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

struct InMemoryConfigSource {
    config: ConfigBundle,
}

#[async_trait]
impl ConfigSource for InMemoryConfigSource {
    fn source_debug_string(&self) -> String {
        "in-memory test config".to_owned()
    }

    async fn get_config(&self) -> Result<ConfigBundle> {
        Ok(self.config.clone())
    }
}

const BROKEN_PLAN: &str = r#"
name = "broken"

[[stage]]
title = "Only"

[[stage.step]]
description = "Leak the password"
command = "echo {USER_PASS}"

[[stage.step]]
release = "nothing"
"#;

// The config source is process-wide, so the scenarios run in one test.
#[tokio::test]
async fn test_commands_use_config_source() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let readme = dir.path().join("README.org");
    tokio::fs::write(&readme, "Found this device? Please return it.").await?;

    let mut global = GlobalConfig::default();
    global.device.readme_file = readme;
    global.run.shell = "/bin/sh".into();
    set_config_source(InMemoryConfigSource {
        config: ConfigBundle {
            global: Some(global.clone()),
            answers: Some(Answers {
                device_name: Some("usb0".into()),
                user_name: Some("alice".into()),
                ..Default::default()
            }),
            plan: None,
        },
    })
    .await;

    // The built-in plan is used and passes.
    PlanCheckCommand {
        plan_check_options: PlanCheckOptions { plan: None },
    }
    .run()
    .await?;
    PlanShowCommand {
        plan_show_options: PlanShowOptions {
            plan: None,
            json: true,
        },
    }
    .run()
    .await?;
    ConfigCheckCommand {
        config_check_options: ConfigCheckOptions {
            keep_checking: false,
        },
    }
    .run()
    .await?;

    // A broken plan fails both checks.
    set_config_source(InMemoryConfigSource {
        config: ConfigBundle {
            global: Some(global),
            answers: None,
            plan: Some(Plan::from_toml(BROKEN_PLAN)?),
        },
    })
    .await;

    let error = PlanCheckCommand {
        plan_check_options: PlanCheckOptions { plan: None },
    }
    .run()
    .await
    .expect_err("plan with errors must fail the check");
    assert!(error.to_string().contains("2 error(s)"));

    let error = ConfigCheckCommand {
        config_check_options: ConfigCheckOptions {
            keep_checking: true,
        },
    }
    .run()
    .await
    .expect_err("config with a broken plan must fail the check");
    assert!(error.to_string().contains("Config check failed"));

    Ok(())
}

#[tokio::test]
async fn test_plan_check_of_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("plan.toml");
    tokio::fs::write(&path, BROKEN_PLAN).await?;

    let result = PlanCheckCommand {
        plan_check_options: PlanCheckOptions { plan: Some(path) },
    }
    .run()
    .await;
    assert!(result.is_err());
    Ok(())
}
