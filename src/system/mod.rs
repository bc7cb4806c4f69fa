//! Facts about the host the installer runs on.

pub mod packages;
pub mod probe;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

const EFI_FIRMWARE_DIR: &str = "/sys/firmware/efi";

/// Tools the built-in plan runs on the host.
pub const REQUIRED_TOOLS: &[&str] = &[
    "bash",
    "dd",
    "wipefs",
    "sgdisk",
    "udevadm",
    "lsblk",
    "mkfs.vfat",
    "mkfs.ext4",
    "mkfs.btrfs",
    "btrfs",
    "cryptsetup",
    "mount",
    "umount",
    "debootstrap",
    "chroot",
    "fallocate",
    "mkswap",
];

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub fn check_root() -> Result<()> {
    if !is_root() {
        bail!("This command must be run as root (try again with sudo)");
    }
    tracing::debug!("Running with root privileges");
    Ok(())
}

pub fn is_uefi() -> bool {
    Path::new(EFI_FIRMWARE_DIR).exists()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub name: String,
    pub path: Option<PathBuf>,
}

pub fn tool_status(tools: &[&str]) -> Vec<ToolStatus> {
    tools
        .iter()
        .map(|name| ToolStatus {
            name: (*name).to_owned(),
            path: which::which(name).ok(),
        })
        .collect()
}

/// Fail with the list of `tools` that are not on `PATH`.
pub fn check_tools(tools: &[&str]) -> Result<()> {
    let missing: Vec<String> = tool_status(tools)
        .into_iter()
        .filter(|status| status.path.is_none())
        .map(|status| status.name)
        .collect();
    if !missing.is_empty() {
        bail!("Required tools are missing: {}", missing.join(", "));
    }
    Ok(())
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_tool_status() {
        let status = tool_status(&["sh", "surely-not-a-real-tool-4711"]);
        assert!(status[0].path.is_some());
        assert_eq!(status[1].path, None);
    }

    #[test]
    fn test_check_tools() {
        assert!(check_tools(&["sh"]).is_ok());
        let error = check_tools(&["sh", "surely-not-a-real-tool-4711"])
            .expect_err("missing tool must fail");
        assert!(error.to_string().contains("surely-not-a-real-tool-4711"));
    }

    #[test]
    fn test_check_root_matches_euid() {
        assert_eq!(check_root().is_ok(), is_root());
    }
}
