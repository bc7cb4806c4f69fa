use anyhow::Result;
use async_trait::async_trait;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Cell, Color, ContentArrangement, Table,
};

use crate::{
    build,
    system::{probe::HostInfo, tool_status, ToolStatus, REQUIRED_TOOLS},
};

pub struct InfoCommand {}

#[async_trait]
impl super::Command for InfoCommand {
    async fn run(&self) -> Result<()> {
        let host = HostInfo::probe().await;
        let tools = tool_status(REQUIRED_TOOLS);
        println!("{}", host_table(&host));
        println!("{}", tools_table(&tools));
        Ok(())
    }
}

fn yes_no(value: bool, good: bool) -> Cell {
    let cell = Cell::new(if value { "Yes" } else { "No" });
    if value == good {
        cell.fg(Color::Green)
    } else {
        cell.fg(Color::Yellow)
    }
}

pub fn host_table(host: &HostInfo) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Host", ""]);
    table.add_row(vec![
        Cell::new("secure-usb"),
        Cell::new(format!(
            "v{} ({}, built {})",
            build::PKG_VERSION,
            build::SHORT_COMMIT,
            build::BUILD_TIME
        )),
    ]);
    table.add_row(vec![Cell::new("Running as root"), yes_no(host.root, true)]);
    table.add_row(vec![Cell::new("Booted with UEFI"), yes_no(host.uefi, true)]);
    table.add_row(vec![Cell::new("CPU"), Cell::new(&host.cpu)]);
    table.add_row(vec![Cell::new("Graphics"), Cell::new(&host.gpu)]);
    table.add_row(vec![Cell::new("Virtualizer"), Cell::new(&host.virtualizer)]);
    table
}

pub fn tools_table(tools: &[ToolStatus]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Tool", "Path"]);
    for tool in tools {
        table.add_row(vec![
            Cell::new(&tool.name),
            match &tool.path {
                Some(path) => Cell::new(path.display()).fg(Color::Green),
                None => Cell::new("<missing>").fg(Color::Red),
            },
        ]);
    }
    table
}
