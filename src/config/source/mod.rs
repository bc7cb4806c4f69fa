pub mod fs;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use fs::FileSystemConfigSource;
use lazy_static::lazy_static;
use tokio::sync::{RwLock, RwLockReadGuard};

use super::{answers::Answers, global::GlobalConfig, ConfigBundle};
use crate::plan::{builtin, Plan};

#[async_trait]
pub trait ConfigSource {
    fn source_debug_string(&self) -> String;

    async fn get_config(&self) -> Result<ConfigBundle>;

    async fn get_global_config(&self) -> Result<GlobalConfig> {
        self.get_config()
            .await
            .map(|config| config.global.unwrap_or_default())
            .context("Failed to get global config")
    }

    async fn get_answers(&self) -> Result<Answers> {
        self.get_config()
            .await
            .map(|config| config.answers.unwrap_or_default())
            .context("Failed to get answers")
    }

    /// The configured plan, or the built-in one.
    async fn get_plan(&self) -> Result<Plan> {
        match self.get_config().await.context("Failed to get plan")?.plan {
            Some(plan) => Ok(plan),
            None => builtin::secure_usb(),
        }
    }
}

lazy_static! {
    static ref SECURE_USB_CONFIG_SOURCE: RwLock<Box<dyn ConfigSource + Send + Sync>> =
        RwLock::new(Box::new(FileSystemConfigSource::new_with_default_config_dir())
            as Box<dyn ConfigSource + Send + Sync>);
}

pub async fn set_config_source(config_source: impl ConfigSource + Send + Sync + 'static) {
    *(SECURE_USB_CONFIG_SOURCE.write().await) =
        Box::new(config_source) as Box<dyn ConfigSource + Send + Sync>;
}

pub async fn get_config_source() -> RwLockReadGuard<'static, Box<dyn ConfigSource + Send + Sync>> {
    SECURE_USB_CONFIG_SOURCE.read().await
}
