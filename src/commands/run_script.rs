use anyhow::Result;

use crate::chat::paths::resolve_paths;
use crate::commands::{CommandReport, resolve_transcript};
use crate::provider::script;

pub fn run(name: &str, chat: Option<&str>, ids: &[String]) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("run");
    let transcript_path = resolve_transcript(&paths, chat, &mut report)?;
    let run = script::run_script(
        &paths.workdir,
        &paths.commands_dir,
        name,
        &transcript_path,
        ids,
    )?;
    report.detail(format!("script={}", run.script.display()));
    for line in run.stdout.lines() {
        report.detail(line.to_string());
    }
    Ok(report)
}
