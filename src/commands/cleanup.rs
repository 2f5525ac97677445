use anyhow::Result;

use crate::chat::ledger::Operation;
use crate::chat::paths::{ChatPaths, resolve_paths};
use crate::chat::session::Session;
use crate::chat::settings::{ChatSettings, load_settings};
use crate::commands::{CommandReport, resource_ref};
use crate::provider::AiService;
use crate::provider::openai::OpenAiAssistants;

/// A failed deletion keeps the ledger so the survivors stay tracked.
pub fn run_with(
    paths: &ChatPaths,
    settings: &ChatSettings,
    ai: &dyn AiService,
) -> Result<CommandReport> {
    let mut report = CommandReport::new("cleanup");
    let session = Session::new(paths, settings, ai);
    let view = session.ledger.view();

    let mut failed = 0usize;
    for resource in view.live_resources()? {
        if !matches!(
            resource.kind,
            Operation::CreateVectorStore | Operation::CreateAssistant
        ) {
            continue;
        }
        if let Some(target) = resource_ref(&view, &resource) {
            let outcome = session.delete(&target);
            if !outcome.deleted {
                failed += 1;
            }
            report.delete_outcome(&target, &outcome);
        }
    }

    if failed > 0 {
        report.issue(format!("ledger kept: {failed} resource(s) could not be deleted"));
        return Ok(report);
    }
    session.ledger.reset()?;
    report.detail(format!("ledger reset: {}", session.ledger.path().display()));
    Ok(report)
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let settings = load_settings()?;
    let ai = OpenAiAssistants::from_env(&settings.remote)?;
    run_with(&paths, &settings, &ai)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResourceRef;
    use crate::provider::fake::FakeAi;
    use tempfile::tempdir;

    #[test]
    fn deletes_stores_and_assistants_then_resets() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let settings = ChatSettings::default();
        let ai = FakeAi::default();
        Session::new(&paths, &settings, &ai)
            .ensure_conversation(None)
            .expect("conversation");

        let report = run_with(&paths, &settings, &ai).expect("cleanup");
        assert!(report.ok, "{:?}", report.issues);
        let deleted = ai.deleted.borrow();
        assert_eq!(deleted.len(), 2);
        assert!(matches!(deleted[0], ResourceRef::VectorStore(_)));
        assert!(matches!(deleted[1], ResourceRef::Assistant(_)));
        assert!(!paths.ledger_file.exists());
    }

    #[test]
    fn failed_delete_keeps_ledger_and_survivors() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let settings = ChatSettings::default();
        let ai = FakeAi {
            fail_deletes: true,
            ..FakeAi::default()
        };
        let conversation = Session::new(&paths, &settings, &ai)
            .ensure_conversation(None)
            .expect("conversation");

        let report = run_with(&paths, &settings, &ai).expect("cleanup");
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.starts_with("ledger kept")));

        let live = Session::new(&paths, &settings, &ai)
            .ledger
            .view()
            .live_resources()
            .expect("live");
        let ids: Vec<&str> = live.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&conversation.vector_store.id.as_str()));
        assert!(ids.contains(&conversation.assistant.id.as_str()));
    }
}
