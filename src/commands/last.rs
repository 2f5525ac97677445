use anyhow::Result;
use std::path::Path;

use crate::chat::paths::resolve_paths;
use crate::chat::transcript;
use crate::commands::{CommandReport, lookup_transcript};

pub fn run_on(path: &Path, strip: bool, report: &mut CommandReport) -> Result<()> {
    let text = transcript::read(path)?;
    match transcript::last_answer(&text, strip) {
        Some(answer) => report.detail(answer),
        None => report.issue(format!("no answer in {}", path.display())),
    }
    Ok(())
}

pub fn run(chat: Option<&str>, strip: bool) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let path = lookup_transcript(&paths, chat)?;
    let mut report = CommandReport::new("last");
    run_on(&path, strip, &mut report)?;
    Ok(report)
}
