use tokio::process::Command;

use crate::exec::cmd::CheckCommandOutput as _;

pub const UNKNOWN: &str = "Unknown";

/// Brand of the CPU as reported by `lscpu`.
pub async fn cpu_brand() -> String {
    match Command::new("lscpu").run().await {
        Ok(stdout) => parse_cpu_brand(&stdout).unwrap_or_else(|| UNKNOWN.to_owned()),
        Err(error) => {
            tracing::debug!("Could not determine CPU brand: {error:#}");
            UNKNOWN.to_owned()
        }
    }
}

pub fn parse_cpu_brand(lscpu: &str) -> Option<String> {
    let field = |name: &str| {
        lscpu.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == name).then(|| value.trim().to_owned())
        })
    };

    let vendor = field("Vendor ID")?;
    Some(match vendor.as_str() {
        "GenuineIntel" => "Intel".to_owned(),
        "AuthenticAMD" => "AMD".to_owned(),
        _ => field("Model name")
            .filter(|model| !model.is_empty())
            .unwrap_or(vendor),
    })
}

/// Brand of the first VGA controller as reported by `lspci`.
pub async fn gpu_brand() -> String {
    match Command::new("lspci").args(["-vnn", "-d", "::0300"]).run().await {
        Ok(stdout) => parse_gpu_brand(&stdout).unwrap_or_else(|| UNKNOWN.to_owned()),
        Err(error) => {
            tracing::debug!("Could not determine graphics card brand: {error:#}");
            UNKNOWN.to_owned()
        }
    }
}

pub fn parse_gpu_brand(lspci: &str) -> Option<String> {
    const MARKER: &str = "VGA compatible controller";

    let line = lspci.lines().find(|line| line.contains(MARKER))?;
    let (_, device) = line.split_once(MARKER)?;
    let device = device.trim();

    let brand = if device.contains("Intel") {
        "Intel"
    } else if device.contains("NVIDIA") {
        "NVIDIA"
    } else if device.contains("AMD") || device.contains("ATI") {
        "AMD"
    } else if device.contains("VMware") {
        "VMware"
    } else if device.contains("Oracle") {
        "VirtualBox"
    } else {
        device
    };
    Some(brand.to_owned())
}

/// Name of the virtualizer from `systemd-detect-virt`, `"none"` on bare metal.
pub async fn virtualizer() -> String {
    // Exits with 1 and prints "none" on bare metal
    let detected = Command::new("systemd-detect-virt")
        .run_with_status_checker(|code, stdout, _| match code {
            0 | 1 => Ok(stdout.trim().to_owned()),
            _ => anyhow::bail!("Bad exit code"),
        })
        .await;

    match detected {
        Ok(name) if name.is_empty() => "none".to_owned(),
        Ok(name) => name,
        Err(error) => {
            tracing::debug!("Could not determine virtualizer: {error:#}");
            UNKNOWN.to_owned()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub root: bool,
    pub uefi: bool,
    pub cpu: String,
    pub gpu: String,
    pub virtualizer: String,
}

impl HostInfo {
    pub async fn probe() -> Self {
        let (cpu, gpu, virtualizer) = tokio::join!(cpu_brand(), gpu_brand(), virtualizer());
        Self {
            root: super::is_root(),
            uefi: super::is_uefi(),
            cpu,
            gpu,
            virtualizer,
        }
    }
}
