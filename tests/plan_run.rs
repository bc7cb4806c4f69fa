// Runs small plans end to end: load from TOML, execute, release, report

use std::path::Path;

use anyhow::Result;
use rstest::rstest;
use secure_usb::{
    console::Console,
    exec::Executor,
    orchestrator::{AbortReason, Orchestrator},
    plan::{
        check::{PlanChecker, Severity},
        Plan,
    },
    resource::ResourceKind,
    store::KeyValueStore,
    types::Secret,
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

/// Opens a "volume" and a "mount" below `{DIR}`, writes through them and releases both.
const MOUNT_PLAN: &str = r#"
name = "mount-test"

[[stage]]
title = "Open"

[[stage.step]]
description = "Open volume"
command = "mkdir {DIR}/volume && cat > {DIR}/volume/key"
input = "{PASS}"
acquire = { id = "volume", kind = "encrypted-volume", release = { description = "Close volume", command = "rm -r {DIR}/volume && echo volume >> {DIR}/released" } }

[[stage.step]]
description = "Find mount point"
command = "echo {DIR}/volume/mnt"
output_var = "MNT"

[[stage.step]]
description = "Mount {MNT}"
command = "mkdir {MNT}"
acquire = { id = "mount", kind = "mount", release = { description = "Umount {MNT}", command = "rmdir {MNT} && echo mount >> {DIR}/released" } }

[[stage]]
title = "Use"

[[stage.step]]
description = "Write data"
command = "echo data > {DIR}/data"

[[stage.step]]
description = "Fail on purpose"
command = "{FAIL}"
on_failure = "{POLICY}"

[[stage]]
title = "Cleanup"

[[stage.step]]
release = "mount"

[[stage.step]]
release = "volume"
"#;

fn mount_plan(fail: &str, policy: &str) -> Result<Plan> {
    Plan::from_toml(
        &MOUNT_PLAN
            .replace("{FAIL}", fail)
            .replace("{POLICY}", policy),
    )
}

fn store_for(dir: &Path) -> Result<KeyValueStore> {
    let mut store = KeyValueStore::new();
    store.set("DIR", dir.to_string_lossy())?;
    store.insert_secret("PASS", Secret::from("correct horse battery staple"))?;
    Ok(store)
}

fn released(dir: &Path) -> Result<Vec<String>> {
    Ok(std::fs::read_to_string(dir.join("released"))?
        .lines()
        .map(str::to_owned)
        .collect())
}

#[test]
fn test_plan_passes_check() -> Result<()> {
    let issues = PlanChecker::new()
        .provided(["DIR"])
        .secrets(["PASS"])
        .check(&mount_plan("true", "abort")?);
    assert!(
        issues.iter().all(|issue| issue.severity == Severity::Warning),
        "{issues:?}"
    );
    Ok(())
}

#[rstest]
#[case("true", "abort")]
#[case("false", "continue")]
#[tokio::test]
async fn test_completed_run_releases_in_plan_order(
    #[case] fail: &str,
    #[case] policy: &str,
) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = Executor::new(Console::hidden());
    let mut store = store_for(dir.path())?;

    let report = Orchestrator::new(&executor)
        .run(&mount_plan(fail, policy)?, &mut store)
        .await;

    assert_eq!(report.abort, None);
    assert!(report.leaked.is_empty());
    assert_eq!(report.released, vec!["mount", "volume"]);
    assert_eq!(released(dir.path())?, vec!["mount", "volume"]);
    assert_eq!(report.success(), fail == "true");
    assert!(dir.path().join("data").exists());
    assert!(!dir.path().join("volume").exists());
    Ok(())
}

#[tokio::test]
async fn test_aborted_run_still_releases() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = Executor::new(Console::hidden());
    let mut store = store_for(dir.path())?;

    let report = Orchestrator::new(&executor)
        .run(&mount_plan("exit 3", "abort")?, &mut store)
        .await;

    assert_eq!(
        report.abort,
        Some(AbortReason::StepFailed {
            description: "Fail on purpose".into()
        })
    );
    assert_eq!(report.released, vec!["mount", "volume"]);
    assert_eq!(released(dir.path())?, vec!["mount", "volume"]);
    assert!(!dir.path().join("volume").exists());
    Ok(())
}

#[tokio::test]
async fn test_failed_release_is_reported_as_leak() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = Executor::new(Console::hidden());
    let mut store = store_for(dir.path())?;

    // A file in the mount point makes `rmdir` fail.
    let plan = mount_plan("touch {MNT}/busy && false", "abort")?;
    let report = Orchestrator::new(&executor).run(&plan, &mut store).await;

    assert!(!report.success());
    assert_eq!(report.leaked.len(), 1);
    let leak = &report.leaked[0];
    assert_eq!(leak.id, "mount");
    assert_eq!(leak.kind, ResourceKind::Mount);
    assert!(leak.release_command.starts_with("rmdir "));
    assert!(leak.to_string().contains("Release it manually"));
    // The volume below the leaked mount is still released.
    assert_eq!(report.released, vec!["volume"]);
    Ok(())
}

#[tokio::test]
async fn test_secret_only_reaches_stdin() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let executor = Executor::new(Console::hidden());
    let mut store = store_for(dir.path())?;

    // Keep the volume directory around to look at the key.
    let plan = Plan::from_toml(
        &MOUNT_PLAN
            .replace("rm -r {DIR}/volume && ", "")
            .replace("{FAIL}", "true")
            .replace("{POLICY}", "abort"),
    )?;
    let report = Orchestrator::new(&executor).run(&plan, &mut store).await;

    assert!(report.success(), "{report}");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("volume/key"))?,
        "correct horse battery staple"
    );
    Ok(())
}
