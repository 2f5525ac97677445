use anyhow::{Context, Result};
use signal_hook::consts::SIGINT;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::chat::paths::{ChatPaths, resolve_paths};
use crate::chat::session::Session;
use crate::chat::settings::{ChatSettings, load_settings};
use crate::chat::transcript;
use crate::commands::{CommandReport, resolve_transcript};
use crate::provider::brave::BraveSearch;
use crate::provider::openai::OpenAiAssistants;
use crate::provider::{AiService, ReplyStatus, SearchService};

#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub chat: Option<String>,
    pub search: bool,
    pub attachments: Vec<String>,
    pub check: bool,
}

/// The first SIGINT raises the flag so a streamed answer can be flushed; a
/// second one exits at once.
pub fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register_conditional_shutdown(SIGINT, 1, Arc::clone(&flag))
        .context("failed to install Ctrl+C handler")?;
    signal_hook::flag::register(SIGINT, Arc::clone(&flag))
        .context("failed to install Ctrl+C handler")?;
    Ok(flag)
}

fn pending_question(path: &Path) -> Result<(Option<String>, usize)> {
    let text = transcript::read(path)?;
    let state = transcript::parse(&text);
    let answered = transcript::turns(&text).len();
    Ok(((!state.remainder.is_empty()).then_some(state.remainder), answered))
}

#[allow(clippy::too_many_arguments)]
pub fn run_with(
    paths: &ChatPaths,
    settings: &ChatSettings,
    ai: &dyn AiService,
    search: Option<&dyn SearchService>,
    transcript_path: &Path,
    attachments: &[String],
    interrupt: &AtomicBool,
    report: &mut CommandReport,
) -> Result<()> {
    let session = Session::new(paths, settings, ai);
    let Some(outcome) =
        session.answer_pending(transcript_path, search, attachments, interrupt)?
    else {
        report.detail("no new question");
        return Ok(());
    };

    report.detail(format!("answer #{} appended", outcome.index));
    report.detail(format!("thread={}", outcome.thread_id));
    for file_id in &outcome.attachments {
        report.detail(format!("attached={file_id}"));
    }
    if outcome.status == ReplyStatus::Interrupted {
        report.issue("interrupted; partial answer saved to transcript");
    }
    Ok(())
}

pub fn run(opts: &AskOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("ask");
    let transcript_path = resolve_transcript(&paths, opts.chat.as_deref(), &mut report)?;
    report.detail(format!("transcript={}", transcript_path.display()));

    let (pending, answered) = pending_question(&transcript_path)?;
    if opts.check {
        report.detail(format!("answered_turns={answered}"));
        report.detail(format!("pending_question={}", pending.is_some()));
        return Ok(report);
    }
    if pending.is_none() {
        report.detail("no new question");
        return Ok(report);
    }

    let settings = load_settings()?;
    let ai = OpenAiAssistants::from_env(&settings.remote)?;
    let brave = if opts.search {
        Some(BraveSearch::from_env(&settings.search)?)
    } else {
        None
    };
    let interrupt = interrupt_flag()?;

    run_with(
        &paths,
        &settings,
        &ai,
        brave.as_ref().map(|b| b as &dyn SearchService),
        &transcript_path,
        &opts.attachments,
        &interrupt,
        &mut report,
    )?;
    Ok(report)
}
