use std::path::PathBuf;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::ConfigSource;
use crate::{
    config::{answers::Answers, global::GlobalConfig, ConfigBundle},
    plan::Plan,
};

pub const SECURE_USB_CONFIG_DIR_DEFAULT: &str = "/etc/secure-usb";

pub struct FileSystemConfigSource {
    config_dir: PathBuf,
}

impl FileSystemConfigSource {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn new_with_default_config_dir() -> Self {
        Self::new(PathBuf::from(SECURE_USB_CONFIG_DIR_DEFAULT))
    }

    /// Load `file_name` from the config dir, or `None` if there is no such file.
    async fn load_toml<T: DeserializeOwned>(&self, file_name: &str, what: &str) -> Result<Option<T>> {
        let config_path = self.config_dir.join(file_name);

        if !config_path.exists() {
            tracing::debug!("{what} not found, skip: {config_path:?}");
            return Ok(None);
        }
        tracing::debug!("Loading {what} from: {config_path:?}");

        let config = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|content| {
                toml::from_str::<T>(&content).context("Failed to parse content as TOML")
            })
            .with_context(|| format!("Failed to load {what} from: {config_path:?}"))?;

        Ok(Some(config))
    }
}

#[async_trait]
impl ConfigSource for FileSystemConfigSource {
    fn source_debug_string(&self) -> String {
        format!("filesystem: {:?}", self.config_dir)
    }

    async fn get_config(&self) -> Result<ConfigBundle> {
        Ok(ConfigBundle {
            global: self
                .load_toml::<GlobalConfig>("global.toml", "global config")
                .await?,
            answers: self.load_toml::<Answers>("answers.toml", "answers").await?,
            plan: self.load_toml::<Plan>("plan.toml", "plan").await?,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;

    #[tokio::test]
    async fn test_empty_config_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = FileSystemConfigSource::new(dir.path());

        let config = source.get_config().await?;
        assert_eq!(config, ConfigBundle::default());
        assert_eq!(source.get_global_config().await?, GlobalConfig::default());
        assert_eq!(source.get_plan().await?.name, "secure-usb");
        Ok(())
    }

    #[tokio::test]
    async fn test_load_config_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(
            dir.path().join("global.toml"),
            "[run]\nstep_timeout_secs = 60\n",
        )
        .await?;
        tokio::fs::write(dir.path().join("answers.toml"), "device = \"/dev/sdz\"\n").await?;
        tokio::fs::write(
            dir.path().join("plan.toml"),
            "name = \"custom\"\n\n[[stage]]\ntitle = \"Only\"\n\n[[stage.step]]\ndescription = \"x\"\ncommand = \"true\"\n",
        )
        .await?;

        let source = FileSystemConfigSource::new(dir.path());
        assert_eq!(source.get_global_config().await?.run.step_timeout_secs, 60);
        assert_eq!(source.get_answers().await?.device.as_deref(), Some("/dev/sdz"));
        assert_eq!(source.get_plan().await?.name, "custom");
        Ok(())
    }

    #[tokio::test]
    async fn test_broken_file_names_path() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("answers.toml"), "user_pass = \"x\"\n").await?;

        let error = FileSystemConfigSource::new(dir.path())
            .get_config()
            .await
            .expect_err("unknown field must be rejected");
        assert!(format!("{error:#}").contains("answers.toml"));
        Ok(())
    }
}
