use anyhow::Result;

use crate::chat::codebase;
use crate::chat::paths::resolve_paths;
use crate::chat::session::Session;
use crate::chat::settings::load_settings;
use crate::commands::CommandReport;
use crate::provider::git;
use crate::provider::openai::OpenAiAssistants;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodebaseAction {
    Upload,
    Delete,
}

pub fn run(action: CodebaseAction) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let settings = load_settings()?;
    let ai = OpenAiAssistants::from_env(&settings.remote)?;
    let session = Session::new(&paths, &settings, &ai);
    let mut report = CommandReport::new(match action {
        CodebaseAction::Upload => "codebase-upload",
        CodebaseAction::Delete => "codebase-delete",
    });

    match action {
        CodebaseAction::Upload => {
            let files = git::tracked_files(&paths.workdir)?;
            let commit = git::head_commit(&paths.workdir);
            let upload = codebase::upload(&session, &files, commit.as_deref())?;
            report.detail(format!("snapshot={}", upload.snapshot.logical_path));
            report.detail(format!(
                "files_included={} files_skipped={}",
                upload.snapshot.included,
                upload.snapshot.skipped.len()
            ));
            report.detail(format!("vector_store={}", upload.vector_store_id));
            report.detail(format!("file={}", upload.file_id));
            match &upload.assistant_id {
                Some(id) => report.detail(format!("attached to assistant {id}")),
                None => report.detail("no live assistant; store will be used on next ask"),
            }
        }
        CodebaseAction::Delete => {
            for (target, outcome) in codebase::delete(&session)? {
                report.delete_outcome(&target, &outcome);
            }
        }
    }
    Ok(report)
}
