use anyhow::Result;

use crate::chat::derive::LiveResource;
use crate::chat::ledger::{LedgerStore, LedgerView};
use crate::chat::paths::resolve_paths;
use crate::commands::CommandReport;

pub fn describe(resource: &LiveResource) -> String {
    let mut line = format!("Type: {}, ID: {}", resource.kind.as_str(), resource.id);
    if let Some(path) = &resource.source_path {
        line.push_str(&format!(", File Path: {path}"));
    }
    line
}

pub fn run_on(view: &LedgerView) -> Result<CommandReport> {
    let mut report = CommandReport::new("objects");
    let live = view.live_resources()?;
    if live.is_empty() {
        report.detail("no live resources");
    }
    for resource in &live {
        report.detail(describe(resource));
    }
    Ok(report)
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    run_on(&LedgerStore::from_paths(&paths).view())
}
