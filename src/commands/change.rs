use anyhow::Result;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::chat::changes;
use crate::chat::ledger::AskContext;
use crate::chat::paths::{ChatPaths, resolve_paths};
use crate::chat::session::Session;
use crate::chat::settings::{ChatSettings, load_settings};
use crate::commands::ask::interrupt_flag;
use crate::commands::{CommandReport, resolve_transcript};
use crate::provider::AiService;
use crate::provider::openai::OpenAiAssistants;

#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    pub chat: Option<String>,
    pub write: bool,
    pub apply_last: bool,
}

fn apply(
    paths: &ChatPaths,
    session: &Session<'_>,
    batch_id: &str,
    report: &mut CommandReport,
) -> Result<()> {
    let written = changes::apply_batch(paths, &session.ledger.view(), batch_id)?;
    for path in &written {
        report.detail(format!("wrote {}", paths.relative_to_workdir(path).display()));
    }
    if written.is_empty() {
        report.issue(format!("batch {batch_id} has no files to write"));
    }
    Ok(())
}

pub fn run_with(
    paths: &ChatPaths,
    settings: &ChatSettings,
    ai: &dyn AiService,
    transcript_path: &Path,
    opts: &ChangeOptions,
    interrupt: &AtomicBool,
    report: &mut CommandReport,
) -> Result<()> {
    let session = Session::new(paths, settings, ai);
    if opts.apply_last {
        let Some(batch_id) = session.ledger.view().latest_batch_id() else {
            report.issue("no change batch recorded");
            return Ok(());
        };
        report.detail(format!("batch={batch_id}"));
        if let Some(listing) = session
            .ledger
            .view()
            .latest_answer_where(|context| matches!(context, AskContext::FileList))
        {
            report.detail(format!("planned {}", listing.lines().collect::<Vec<_>>().join(", ")));
        }
        return apply(paths, &session, &batch_id, report);
    }

    let Some(plan) = changes::request_changes(&session, transcript_path, interrupt)? else {
        report.detail("no new question");
        return Ok(());
    };
    report.detail(format!("batch={}", plan.batch_id));
    report.detail(format!("answer #{} appended", plan.answer_index));
    for file in &plan.files {
        report.detail(format!("planned {file}"));
    }
    if opts.write {
        apply(paths, &session, &plan.batch_id, report)?;
    }
    Ok(())
}

pub fn run(opts: &ChangeOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("change");
    let transcript_path = resolve_transcript(&paths, opts.chat.as_deref(), &mut report)?;
    let settings = load_settings()?;
    let ai = OpenAiAssistants::from_env(&settings.remote)?;
    let interrupt = interrupt_flag()?;
    run_with(
        &paths,
        &settings,
        &ai,
        &transcript_path,
        opts,
        &interrupt,
        &mut report,
    )?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::FakeAi;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn apply_last_writes_previous_batch_without_asking() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let settings = ChatSettings::default();
        let chat = tmp.path().join("chat.txt");
        fs::write(&chat, "add notes").expect("seed");

        let planner = FakeAi::with_replies(&["NOTES.md", "remember this"]);
        let mut first = CommandReport::new("change");
        run_with(
            &paths,
            &settings,
            &planner,
            &chat,
            &ChangeOptions::default(),
            &AtomicBool::new(false),
            &mut first,
        )
        .expect("plan");
        assert!(!tmp.path().join("NOTES.md").exists());

        let idle = FakeAi::default();
        let mut second = CommandReport::new("change");
        run_with(
            &paths,
            &settings,
            &idle,
            &chat,
            &ChangeOptions {
                apply_last: true,
                ..ChangeOptions::default()
            },
            &AtomicBool::new(false),
            &mut second,
        )
        .expect("apply");
        assert!(second.ok, "{:?}", second.issues);
        assert!(idle.asked.borrow().is_empty());
        assert_eq!(
            fs::read_to_string(tmp.path().join("NOTES.md")).expect("read"),
            "remember this\n"
        );
    }
}
