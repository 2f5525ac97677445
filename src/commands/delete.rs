use anyhow::Result;

use crate::chat::paths::{ChatPaths, resolve_paths};
use crate::chat::session::Session;
use crate::chat::settings::{ChatSettings, load_settings};
use crate::commands::{CommandReport, resource_ref};
use crate::provider::AiService;
use crate::provider::openai::OpenAiAssistants;

pub fn run_with(
    paths: &ChatPaths,
    settings: &ChatSettings,
    ai: &dyn AiService,
    pattern: &str,
) -> Result<CommandReport> {
    let mut report = CommandReport::new("delete");
    if pattern.trim().is_empty() {
        report.issue("pattern cannot be empty");
        return Ok(report);
    }

    let session = Session::new(paths, settings, ai);
    let view = session.ledger.view();
    let matches: Vec<_> = view
        .live_resources()?
        .into_iter()
        .filter(|r| {
            r.id.contains(pattern)
                || r.source_path
                    .as_deref()
                    .is_some_and(|path| path.contains(pattern))
        })
        .collect();
    if matches.is_empty() {
        report.issue(format!("no live resource matches `{pattern}`"));
        return Ok(report);
    }

    for resource in &matches {
        let Some(target) = resource_ref(&view, resource) else {
            report.issue(format!("cannot delete {} {}", resource.kind.as_str(), resource.id));
            continue;
        };
        let outcome = session.delete(&target);
        report.delete_outcome(&target, &outcome);
    }
    Ok(report)
}

pub fn run(pattern: &str) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let settings = load_settings()?;
    let ai = OpenAiAssistants::from_env(&settings.remote)?;
    run_with(&paths, &settings, &ai, pattern)
}
