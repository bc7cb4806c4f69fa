use std::path::PathBuf;

use anyhow::Result;
use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};

use crate::{
    exec::executor::DEFAULT_SHELL,
    logging::DEFAULT_LOG_FILE,
    store::{KeyValueStore, StoreError},
};

/// Settings of the installer. This is the `/etc/secure-usb/global.toml` file.
#[derive(
    Serialize, Deserialize, Debug, PartialEq, Clone, Default, Documented, DocumentedFields,
)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Logging of the installer.
    #[serde(default)]
    pub log: LogConfig,

    /// How plan steps are run.
    #[serde(default)]
    pub run: RunConfig,

    /// Partition layout of the USB device.
    #[serde(default)]
    pub device: DeviceConfig,

    /// The Debian system installed on the encrypted system partition.
    #[serde(default)]
    pub linux: LinuxConfig,
}

/// Logging of the installer.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Documented, DocumentedFields)]
#[serde(deny_unknown_fields, default)]
pub struct LogConfig {
    /// File the install log is appended to. Relative paths are relative to the working directory.
    pub file: PathBuf,

    /// Log at DEBUG level and print every command and its output on the console.
    pub debug: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_LOG_FILE),
            debug: false,
        }
    }
}

/// How plan steps are run.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Documented, DocumentedFields)]
#[serde(deny_unknown_fields, default)]
pub struct RunConfig {
    /// Seconds a step may run before its process group is killed. Steps can set their own `timeout_secs`. 0 means no limit.
    pub step_timeout_secs: u64,

    /// Shell used to run step commands, as `<shell> -c <command>`.
    pub shell: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 0,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl RunConfig {
    pub fn step_timeout(&self) -> Option<std::time::Duration> {
        (self.step_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.step_timeout_secs))
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    #[default]
    Btrfs,
    Ext4,
}

impl StorageFormat {
    /// The value plans compare `PART4_FORMAT` against.
    pub fn as_store_value(&self) -> &'static str {
        match self {
            StorageFormat::Btrfs => "BTRFS",
            StorageFormat::Ext4 => "EXT4",
        }
    }
}

/// Partition layout of the USB device.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Documented, DocumentedFields)]
#[serde(deny_unknown_fields, default)]
pub struct DeviceConfig {
    /// Label of the FAT32 partition holding the README.
    pub part1_label: String,

    /// Label of the EFI system partition.
    pub part2_label: String,

    /// Label of the encrypted system partition.
    pub part3_label: String,

    /// Label of the encrypted storage partition.
    pub part4_label: String,

    /// File system of the storage partition: "btrfs" (with an `@snapshots` subvolume) or "ext4".
    pub part4_format: StorageFormat,

    /// Size of the system partition, in sgdisk notation. The storage partition takes the rest of the device.
    pub linux_part_size: String,

    /// Size of the swap file created in the installed system, in fallocate notation.
    pub swap_size: String,

    /// File copied to the README partition, so a finder of the device can return it.
    pub readme_file: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            part1_label: "README".into(),
            part2_label: "EFI".into(),
            part3_label: "LINUX".into(),
            part4_label: "STORAGE".into(),
            part4_format: StorageFormat::default(),
            linux_part_size: "10GiB".into(),
            swap_size: "1G".into(),
            readme_file: PathBuf::from("README.org"),
        }
    }
}

/// The Debian system installed on the encrypted system partition.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Documented, DocumentedFields)]
#[serde(deny_unknown_fields, default)]
pub struct LinuxConfig {
    /// Environment prefixed to commands run inside the chroot.
    pub env: String,

    /// Packages installed with apt-get.
    pub packages: Vec<String>,

    /// File with one package per line, `#` starts a comment. Replaces `packages` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages_file: Option<PathBuf>,

    /// Debian suite passed to debootstrap.
    pub suite: String,

    /// Debian mirror passed to debootstrap.
    pub mirror: String,
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            env: "LANG=en_US.UTF-8 LC_ALL=en_US.UTF-8 KEYMAP=us DEBIAN_FRONTEND=noninteractive TERM=xterm-color".into(),
            packages: [
                "linux-image-amd64",
                "firmware-linux",
                "firmware-iwlwifi",
                "zstd",
                "grub-efi",
                "cryptsetup",
                "cryptsetup-initramfs",
                "btrfs-progs",
                "fdisk",
                "gdisk",
                "sudo",
                "network-manager",
                "xserver-xorg",
                "xinit",
                "lightdm",
                "xfce4",
                "dbus-x11",
                "thunar",
                "xfce4-terminal",
                "firefox-esr",
                "keepassxc",
                "network-manager-gnome",
                "mg",
            ]
            .into_iter()
            .map(Into::into)
            .collect(),
            packages_file: None,
            suite: "stable".into(),
            mirror: "http://ftp.us.debian.org/debian".into(),
        }
    }
}

impl LinuxConfig {
    /// The package list, read from `packages_file` when one is configured.
    pub async fn resolve_packages(&self) -> Result<Vec<String>> {
        match &self.packages_file {
            Some(path) => crate::system::packages::read_packages_file(path).await,
            None => Ok(self.packages.clone()),
        }
    }
}

impl GlobalConfig {
    /// Put the settings into the store under the names plans refer to.
    pub fn export(&self, packages: &[String], store: &mut KeyValueStore) -> Result<(), StoreError> {
        let device = &self.device;
        store.set("PART1_LABEL", device.part1_label.as_str())?;
        store.set("PART2_LABEL", device.part2_label.as_str())?;
        store.set("PART3_LABEL", device.part3_label.as_str())?;
        store.set("PART4_LABEL", device.part4_label.as_str())?;
        store.set("PART4_FORMAT", device.part4_format.as_store_value())?;
        store.set("LINUX_PART_SIZE", device.linux_part_size.as_str())?;
        store.set("SWAP_SIZE", device.swap_size.as_str())?;
        store.set("README_FILE", device.readme_file.to_string_lossy())?;

        let linux = &self.linux;
        store.set("LINUX_ENV", linux.env.as_str())?;
        store.set("LINUX_PKGS", packages.join(" "))?;
        store.set("DEBIAN_SUITE", linux.suite.as_str())?;
        store.set("DEBIAN_MIRROR", linux.mirror.as_str())?;
        Ok(())
    }
}
