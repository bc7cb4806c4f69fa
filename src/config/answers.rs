use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, StoreError};

/// Pre-filled answers to the install prompts. This is the `/etc/secure-usb/answers.toml` file.
///
/// Every answer given here is not asked again. The user password can never be stored here.
#[derive(
    Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default, Documented, DocumentedFields,
)]
#[serde(deny_unknown_fields)]
pub struct Answers {
    /// Block device to install to, e.g. "/dev/sdb". Everything on it is destroyed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Host name of the installed system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,

    /// Overwrite the whole device with random data first. This takes a long time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wipe: Option<bool>,

    /// Name of the user created on the installed system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Locale line from /usr/share/i18n/SUPPORTED, e.g. "en_US.UTF-8 UTF-8".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    /// Console keymap, e.g. "us".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<String>,

    /// Time zone below /usr/share/zoneinfo, e.g. "Europe/Amsterdam".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Answers {
    /// Put every non-empty answer into the store.
    pub fn export(&self, store: &mut KeyValueStore) -> Result<(), StoreError> {
        let texts = [
            ("DEVICE", &self.device),
            ("DEVICE_NAME", &self.device_name),
            ("USER_NAME", &self.user_name),
            ("SYSTEM_LOCALE", &self.locale),
            ("SYSTEM_KEYB", &self.keyboard),
            ("SYSTEM_TIMEZONE", &self.timezone),
        ];
        for (key, value) in texts {
            if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                store.set(key, value)?;
            }
        }
        if let Some(wipe) = self.wipe {
            store.set("DEVICE_WIPE", if wipe { "yes" } else { "no" })?;
        }
        Ok(())
    }
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_deserialize_answers() -> Result<()> {
        let answers: Answers = toml::from_str("")?;
        assert_eq!(answers, Answers::default());

        let raw = r#"
        device = "/dev/sdb"
        wipe = false
        user_name = "alice"
        timezone = "Europe/Amsterdam"
        "#;
        let answers: Answers = toml::from_str(raw)?;
        assert_eq!(answers.device.as_deref(), Some("/dev/sdb"));
        assert_eq!(answers.wipe, Some(false));
        Ok(())
    }

    #[test]
    fn test_password_is_not_accepted() {
        assert!(toml::from_str::<Answers>("user_pass = \"hunter2\"").is_err());
    }

    #[test]
    fn test_export_skips_empty_answers() -> Result<()> {
        let answers = Answers {
            device: Some("/dev/sdb".into()),
            device_name: Some("  ".into()),
            wipe: Some(true),
            ..Default::default()
        };
        let mut store = KeyValueStore::new();
        answers.export(&mut store)?;

        assert_eq!(store.get("DEVICE"), Some("/dev/sdb"));
        assert_eq!(store.get("DEVICE_WIPE"), Some("yes"));
        assert!(!store.contains_key("DEVICE_NAME"));
        assert!(!store.contains_key("USER_NAME"));
        Ok(())
    }
}
