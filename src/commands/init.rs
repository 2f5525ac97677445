use anyhow::Result;
use serde_json::{Value, json};
use std::path::Path;

use crate::chat::ledger::{LedgerStore, Operation};
use crate::chat::paths::{ChatPaths, resolve_paths};
use crate::chat::project::ConfigStore;
use crate::chat::transcript;
use crate::commands::CommandReport;

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub name: Option<String>,
    pub chat: Option<String>,
}

pub fn run_on(paths: &ChatPaths, opts: &InitOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("init");
    let config = ConfigStore::from_paths(paths);

    if let Some(name) = opts.name.as_deref().map(str::trim) {
        if name.is_empty() {
            report.issue("project name cannot be empty");
            return Ok(report);
        }
        LedgerStore::from_paths(paths).truncate_and_append(
            Operation::SetProjectName,
            json!({ "name": name }),
            Value::Null,
        )?;
        config.set_name(name)?;
        report.detail(format!("project name set to {name}; ledger reset"));
    }

    if let Some(chat) = opts.chat.as_deref().map(str::trim) {
        let path = paths.resolve_in_workdir(Path::new(chat));
        if transcript::ensure_exists(&path)? {
            report.detail(format!("created transcript {}", path.display()));
        }
        let stored = paths.relative_to_workdir(&path).to_string_lossy().to_string();
        config.set_default_transcript_path(&stored)?;
        report.detail(format!("default transcript set to {stored}"));
    }

    if opts.name.is_none() && opts.chat.is_none() {
        let current = config.load()?;
        report.detail(format!("config={}", config.path().display()));
        report.detail(format!("name={}", current.name.as_deref().unwrap_or("(unset)")));
        report.detail(format!(
            "chat_file={}",
            current.chat_file.as_deref().unwrap_or("(unset)")
        ));
    }
    Ok(report)
}

pub fn run(opts: &InitOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    run_on(&paths, opts)
}
