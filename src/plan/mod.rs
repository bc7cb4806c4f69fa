pub mod builtin;
pub mod check;
pub mod step;

use std::{collections::BTreeSet, path::Path};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use step::Step;

/// An ordered list of stages, loaded from TOML.
///
/// ```toml
/// name = "example"
///
/// [[stage]]
/// title = "Mount"
///
/// [[stage.step]]
/// description = "Mount {PART1}"
/// command = "mount {PART1} /mnt"
/// acquire = { id = "mnt", kind = "mount", release = { description = "Umount", command = "umount /mnt" } }
///
/// [[stage.step]]
/// release = "mnt"
/// ```
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub name: String,

    #[serde(default, rename = "stage")]
    pub stages: Vec<Stage>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    /// Printed as a rule on the console before the stage runs.
    pub title: String,

    #[serde(default, rename = "step")]
    pub entries: Vec<Entry>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(untagged)]
pub enum Entry {
    Release(ReleaseEntry),
    Step(Step),
}

/// Release a previously acquired resource at this point of the plan.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReleaseEntry {
    pub release: String,
}

impl Plan {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse plan as TOML")
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading plan from: {path:?}");
        tokio::fs::read_to_string(path)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|content| Self::from_toml(&content))
            .with_context(|| format!("Failed to load plan from: {path:?}"))
    }

    /// All plan steps in execution order, with their stage. Release entries are left out.
    pub fn steps(&self) -> impl Iterator<Item = (&Stage, &Step)> {
        self.stages.iter().flat_map(|stage| {
            stage.entries.iter().filter_map(move |entry| match entry {
                Entry::Step(step) => Some((stage, step)),
                Entry::Release(_) => None,
            })
        })
    }

    pub fn entry_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.entries.len()).sum()
    }

    /// Ids of every resource some step of the plan may acquire.
    pub fn resource_ids(&self) -> BTreeSet<&str> {
        self.steps()
            .filter_map(|(_, step)| step.acquire.as_ref())
            .map(|resource| resource.id.as_str())
            .collect()
    }
}
