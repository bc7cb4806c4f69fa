use crate::{exec::Executor, plan::step::Step, store::KeyValueStore};

/// Runs a flat list of steps, best effort.
///
/// Every step is executed even after a failure; `on_failure`, `when` and `acquire` are
/// not looked at. Use the [`Orchestrator`](crate::orchestrator::Orchestrator) for plans
/// that hold resources.
pub struct Sequencer<'a> {
    executor: &'a Executor,
}

impl<'a> Sequencer<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Returns `true` only if every step succeeded.
    pub async fn run_all(&self, steps: &[Step], store: &mut KeyValueStore) -> bool {
        let mut all_successful = true;
        for step in steps {
            if !self.executor.execute(step, store).await.success {
                all_successful = false;
            }
        }
        all_successful
    }
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;
    use crate::console::Console;

    #[tokio::test]
    async fn test_runs_past_failures() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let executor = Executor::new(Console::hidden());
        let mut store = KeyValueStore::new();
        store.set("DIR", dir.path().to_string_lossy())?;

        let steps = vec![
            Step::new("First", "touch {DIR}/first"),
            Step::new("Broken", "exit 2"),
            Step::new("Third", "touch {DIR}/third"),
            Step::new("Fourth", "touch {DIR}/fourth"),
        ];

        assert!(!Sequencer::new(&executor).run_all(&steps, &mut store).await);
        assert!(dir.path().join("first").exists());
        assert!(dir.path().join("third").exists());
        assert!(dir.path().join("fourth").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_all_successful() -> Result<()> {
        let executor = Executor::new(Console::hidden());
        let mut store = KeyValueStore::new();

        let steps = vec![
            Step::new("Name", "echo usb0").output_var("NAME"),
            Step::new("Use name", "test {NAME} = usb0"),
            Step::new("Ignored", "exit 1").ignore_returncode(),
        ];

        assert!(Sequencer::new(&executor).run_all(&steps, &mut store).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_sequence_succeeds() {
        let executor = Executor::new(Console::hidden());
        let mut store = KeyValueStore::new();
        assert!(Sequencer::new(&executor).run_all(&[], &mut store).await);
    }
}
