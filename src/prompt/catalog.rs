//! The choices offered by the install prompts, read from the host.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};
use tokio::process::Command;

use crate::exec::cmd::CheckCommandOutput as _;

pub const SUPPORTED_LOCALES: &str = "/usr/share/i18n/SUPPORTED";
pub const KEYMAP_DIRS: &[&str] = &["/usr/share/kbd/keymaps", "/usr/share/keymaps"];
pub const ZONEINFO_DIR: &str = "/usr/share/zoneinfo";

const KEYMAP_SUFFIXES: &[&str] = &[".kmap.gz", ".map.gz", ".kmap", ".map"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drive {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub model: Option<String>,
}

impl Drive {
    pub fn path(&self) -> String {
        format!("/dev/{}", self.name)
    }

    /// `sdb - SanDisk Ultra (28.64 GB)`
    pub fn label(&self) -> String {
        let size = match self.size_bytes {
            Some(bytes) => format!("{:.2} GB", bytes as f64 / (1u64 << 30) as f64),
            None => "Unknown".to_owned(),
        };
        format!(
            "{} - {} ({size})",
            self.name,
            self.model.as_deref().unwrap_or("Unknown")
        )
    }
}

/// Parse `lsblk -dn -b -o NAME,SIZE,MODEL`, skipping loop devices.
pub fn parse_lsblk(output: &str) -> Vec<Drive> {
    output
        .lines()
        .filter_map(|line| {
            // Columns are padded, and the model may contain spaces itself
            let (name, rest) = next_column(line)?;
            if name.starts_with("loop") {
                return None;
            }
            let (size, model) = next_column(rest).unwrap_or_default();
            let size_bytes = size.parse().ok();
            let model = Some(model.trim())
                .filter(|model| !model.is_empty())
                .map(str::to_owned);
            Some(Drive {
                name: name.to_owned(),
                size_bytes,
                model,
            })
        })
        .collect()
}

/// Split off the first whitespace separated column, returning it and the rest.
fn next_column(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    Some(
        text.split_once(char::is_whitespace)
            .map(|(column, rest)| (column, rest.trim_start()))
            .unwrap_or((text, "")),
    )
}

pub async fn drives() -> Result<Vec<Drive>> {
    let output = Command::new("lsblk")
        .args(["-dn", "-b", "-o", "NAME,SIZE,MODEL"])
        .run()
        .await
        .context("Failed to list block devices")?;
    Ok(parse_lsblk(&output))
}

pub fn parse_locales(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

pub async fn locales(supported: impl AsRef<Path>) -> Result<Vec<String>> {
    let supported = supported.as_ref();
    let content = tokio::fs::read_to_string(supported)
        .await
        .with_context(|| format!("Failed to read locales from {supported:?}"))?;
    Ok(parse_locales(&content))
}

/// `de-latin1.map.gz` -> `de-latin1`
pub fn keymap_name(file_name: &str) -> Option<&str> {
    KEYMAP_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .filter(|name| !name.is_empty())
}

/// Sorted, de-duplicated keymap names found below `dirs`. Missing dirs are skipped.
pub fn keyboard_layouts(dirs: &[impl AsRef<Path>]) -> Result<Vec<String>> {
    let mut layouts = BTreeSet::new();
    for dir in dirs {
        for path in files_below(dir.as_ref())? {
            if let Some(name) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(keymap_name)
            {
                layouts.insert(name.to_owned());
            }
        }
    }
    Ok(layouts.into_iter().collect())
}

/// Time zone names below `zoneinfo`, e.g. `Europe/Amsterdam`.
///
/// The `posix/` and `right/` trees and the tzdata index files are left out.
pub fn timezones(zoneinfo: impl AsRef<Path>) -> Result<Vec<String>> {
    let zoneinfo = zoneinfo.as_ref();
    let mut zones = BTreeSet::new();
    for path in files_below(zoneinfo)? {
        let Ok(relative) = path.strip_prefix(zoneinfo) else {
            continue;
        };
        let Some(zone) = relative.to_str() else {
            continue;
        };
        let is_index = relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains('.') || name == "posixrules" || name == "SECURITY");
        if zone.starts_with("posix/") || zone.starts_with("right/") || is_index {
            continue;
        }
        zones.insert(zone.to_owned());
    }
    Ok(zones.into_iter().collect())
}

fn files_below(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::debug!("{dir:?} does not exist, skip");
        return Ok(vec![]);
    }
    let pattern = dir.join("**").join("*");
    let pattern = pattern
        .to_str()
        .with_context(|| format!("not a valid string: {pattern:?}"))?;
    Ok(glob::glob(pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect())
}

/// Case-insensitive substring filter. An empty needle keeps everything.
pub fn filter<'a>(items: &'a [String], needle: &str) -> Vec<&'a String> {
    let needle = needle.trim().to_lowercase();
    items
        .iter()
        .filter(|item| item.to_lowercase().contains(&needle))
        .collect()
}
