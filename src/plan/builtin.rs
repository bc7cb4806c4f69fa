use anyhow::{Context as _, Result};

use super::Plan;

/// The Secure-USB provisioning plan shipped with the binary.
pub const SECURE_USB_PLAN: &str = include_str!("../../plans/secure-usb.toml");

pub fn secure_usb() -> Result<Plan> {
    Plan::from_toml(SECURE_USB_PLAN).context("Failed to load the built-in Secure-USB plan")
}
