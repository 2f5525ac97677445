pub mod ask;
pub mod change;
pub mod cleanup;
pub mod codebase;
pub mod delete;
pub mod init;
pub mod last;
pub mod objects;
pub mod run_script;
pub mod show;

use crate::chat::derive::LiveResource;
use crate::chat::ledger::{LedgerView, Operation};
use crate::chat::paths::ChatPaths;
use crate::chat::project::ConfigStore;
use crate::chat::transcript;
use crate::provider::{DeleteOutcome, ResourceRef};
use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn delete_outcome(&mut self, target: &ResourceRef, outcome: &DeleteOutcome) {
        let op = target.operation();
        if outcome.deleted {
            self.detail(format!("{}: {} deleted", op.as_str(), target.id()));
        } else {
            self.issue(format!(
                "{}: {} not deleted: {}",
                op.as_str(),
                target.id(),
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
}

fn config_path_for(paths: &ChatPaths, path: &Path) -> String {
    paths.relative_to_workdir(path).to_string_lossy().to_string()
}

pub fn lookup_transcript(paths: &ChatPaths, chat: Option<&str>) -> Result<PathBuf> {
    let configured = ConfigStore::from_paths(paths).load()?.chat_file;
    let Some(raw) = chat.map(str::to_string).or(configured) else {
        anyhow::bail!("no transcript: pass --chat <file> or run `chatledger init --chat <file>`");
    };
    Ok(paths.resolve_in_workdir(Path::new(raw.trim())))
}

pub fn resolve_transcript(
    paths: &ChatPaths,
    chat: Option<&str>,
    report: &mut CommandReport,
) -> Result<PathBuf> {
    let config = ConfigStore::from_paths(paths);
    let configured = config.load()?.chat_file;
    let path = lookup_transcript(paths, chat)?;
    if transcript::ensure_exists(&path)? {
        report.detail(format!("created transcript {}", path.display()));
    }
    let stored = config_path_for(paths, &path);
    if chat.is_some() && configured.as_deref() != Some(stored.as_str()) {
        config.set_default_transcript_path(&stored)?;
        report.detail(format!("default transcript set to {stored}"));
    }
    Ok(path)
}

pub fn resource_ref(view: &LedgerView, resource: &LiveResource) -> Option<ResourceRef> {
    let id = resource.id.clone();
    match resource.kind {
        Operation::CreateVectorStore => Some(ResourceRef::VectorStore(id)),
        Operation::CreateAssistant => Some(ResourceRef::Assistant(id)),
        Operation::CreateThread => Some(ResourceRef::Thread(id)),
        Operation::UploadFileToStorage => Some(ResourceRef::StorageFile(id)),
        Operation::UploadFilesToVectorStore => {
            let vector_store_id = view.upload_vector_store_id(&id)?;
            Some(ResourceRef::VectorStoreFile {
                vector_store_id,
                file_id: id,
            })
        }
        _ => None,
    }
}
