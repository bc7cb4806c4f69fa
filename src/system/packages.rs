use std::path::Path;

use anyhow::{Context as _, Result};

/// Package names from a list with one package per line. `#` starts a comment, both on
/// its own line and after a name.
pub fn parse_packages(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(name, _)| name).trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

pub async fn read_packages_file(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read package list from: {path:?}"))?;
    Ok(parse_packages(&content))
}

#[cfg(test)]
pub mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_parse_packages() {
        let content = "\
# Kernel and firmware
linux-image-amd64
firmware-linux   # non-free
   zstd

#grub-pc
grub-efi#bootloader
";
        assert_eq!(
            parse_packages(content),
            vec!["linux-image-amd64", "firmware-linux", "zstd", "grub-efi"]
        );
        assert!(parse_packages("").is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let error = read_packages_file(dir.path().join("packages.txt"))
            .await
            .expect_err("missing file must fail");
        assert!(format!("{error:#}").contains("packages.txt"));
        Ok(())
    }
}
