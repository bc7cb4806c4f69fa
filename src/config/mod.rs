pub mod answers;
pub mod global;
pub mod source;
pub mod template;

use answers::Answers;
use global::GlobalConfig;
use serde::{Deserialize, Serialize};

use crate::plan::Plan;

/// Variables plans may use that are filled from the configuration and the prompts before
/// a run starts.
pub const PROVIDED_KEYS: &[&str] = &[
    "DEVICE",
    "DEVICE_NAME",
    "DEVICE_WIPE",
    "USER_NAME",
    "SYSTEM_LOCALE",
    "SYSTEM_KEYB",
    "SYSTEM_TIMEZONE",
    "PART1_LABEL",
    "PART2_LABEL",
    "PART3_LABEL",
    "PART4_LABEL",
    "PART4_FORMAT",
    "LINUX_ENV",
    "LINUX_PKGS",
    "LINUX_PART_SIZE",
    "SWAP_SIZE",
    "DEBIAN_SUITE",
    "DEBIAN_MIRROR",
    "README_FILE",
];

/// Variables holding secrets. They may only be used in step inputs.
pub const SECRET_KEYS: &[&str] = &["USER_PASS"];

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigBundle {
    /// Installer settings. This is the same as the `/etc/secure-usb/global.toml` file.
    pub global: Option<GlobalConfig>,

    /// Pre-filled prompt answers. This is the same as the `/etc/secure-usb/answers.toml` file.
    pub answers: Option<Answers>,

    /// Replacement for the built-in plan. This is the same as the `/etc/secure-usb/plan.toml` file.
    pub plan: Option<Plan>,
}
