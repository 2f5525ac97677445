use crate::chat::ledger::{AskContext, LedgerView};
use crate::chat::paths::ChatPaths;
use crate::chat::prompts::{file_list_prompt, full_content_prompt, is_clarification};
use crate::chat::session::{Conversation, Session};
use crate::chat::transcript;
use crate::chat::warn::{self, WarnEvent};
use crate::error::{ChatLedgerError, WarnCode};
use crate::provider::ReplyStatus;
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePlan {
    pub batch_id: String,
    pub files: Vec<String>,
    pub answer_index: u64,
}

pub fn new_batch_id() -> String {
    format!("batch-{}", Local::now().format("%Y%m%d%H%M%S%3f"))
}

pub fn parse_file_list(reply: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in transcript::strip_fences(reply).lines() {
        let name = line
            .trim()
            .trim_start_matches(['-', '*'])
            .trim()
            .trim_matches('`');
        if name.is_empty() || out.iter().any(|seen| seen == name) {
            continue;
        }
        out.push(name.to_string());
    }
    out
}

/// Relative path with no `..`, root or prefix components.
fn contained_path(workdir: &Path, file: &str) -> Option<PathBuf> {
    let rel = Path::new(file);
    let mut saw_normal = false;
    for component in rel.components() {
        match component {
            Component::Normal(_) => saw_normal = true,
            Component::CurDir => {}
            _ => return None,
        }
    }
    saw_normal.then(|| workdir.join(rel))
}

fn ask_checked(
    session: &Session<'_>,
    conversation: &Conversation,
    file: &str,
    question: &str,
    context: AskContext,
    interrupt: &AtomicBool,
) -> Result<String> {
    let reply = session.ask(conversation, question, context, &[], interrupt)?;
    if reply.status == ReplyStatus::Interrupted {
        return Err(ChatLedgerError::Interrupted {
            stage: format!("waiting for {file}"),
        }
        .into());
    }
    if is_clarification(&reply.text) {
        return Err(ChatLedgerError::ClarificationRequested {
            file: file.to_string(),
            reply: reply.text,
        }
        .into());
    }
    Ok(reply.text)
}

pub fn request_changes(
    session: &Session<'_>,
    transcript_path: &Path,
    interrupt: &AtomicBool,
) -> Result<Option<ChangePlan>> {
    let text = transcript::read(transcript_path)?;
    let state = transcript::parse(&text);
    if state.remainder.is_empty() {
        return Ok(None);
    }

    let conversation = session.ensure_conversation(state.last_thread_id.as_deref())?;
    let listing = ask_checked(
        session,
        &conversation,
        "file list",
        &file_list_prompt(&state.remainder),
        AskContext::FileList,
        interrupt,
    )?;
    let files = parse_file_list(&listing);
    if files.is_empty() {
        anyhow::bail!("assistant listed no files to change");
    }

    let batch_id = new_batch_id();
    for file in &files {
        let current = contained_path(&session.paths.workdir, file)
            .and_then(|path| fs::read_to_string(path).ok());
        ask_checked(
            session,
            &conversation,
            file,
            &full_content_prompt(file, current.as_deref()),
            AskContext::FileContent {
                file_name: file.clone(),
                batch_id: Some(batch_id.clone()),
            },
            interrupt,
        )?;
    }

    let answer_index = transcript::append_answer(
        transcript_path,
        &files.join("\n"),
        &conversation.thread.id,
        state.last_answer_index,
    )?;
    Ok(Some(ChangePlan {
        batch_id,
        files,
        answer_index,
    }))
}

pub fn apply_batch(paths: &ChatPaths, view: &LedgerView, batch_id: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (file, answer) in view.batch_answers(batch_id) {
        let Some(target) = contained_path(&paths.workdir, &file) else {
            warn::emit(WarnEvent {
                code: WarnCode::W006SkippedFile,
                stage: "change",
                action: "write",
                target: &file,
                reason: "path escapes workdir",
                err: "",
            });
            continue;
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut body = transcript::strip_fences(&answer);
        body.push('\n');
        fs::write(&target, body).with_context(|| format!("failed to write {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}
