use crate::chat::ledger::Operation;
use crate::chat::paths::ChatPaths;
use crate::chat::session::Session;
use crate::chat::warn::{self, WarnEvent};
use crate::error::WarnCode;
use crate::provider::{DeleteOutcome, ResourceRef, ResourceSpec};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

pub const CODEBASE_FRAGMENT: &str = "codebase";

const SKIPPED_NAMES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodebaseSnapshot {
    pub path: PathBuf,
    pub logical_path: String,
    pub tag: String,
    pub fingerprint: String,
    pub included: usize,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodebaseUpload {
    pub snapshot: CodebaseSnapshot,
    pub vector_store_id: String,
    pub file_id: String,
    pub assistant_id: Option<String>,
}

fn is_skipped_name(file: &str) -> bool {
    let name = file.rsplit('/').next().unwrap_or(file);
    SKIPPED_NAMES.contains(&name)
}

fn skip(file: &str, reason: &str, err: &str) {
    warn::emit(WarnEvent {
        code: WarnCode::W006SkippedFile,
        stage: "codebase",
        action: "collect",
        target: file,
        reason,
        err,
    });
}

pub fn build_snapshot(
    paths: &ChatPaths,
    files: &[String],
    commit: Option<&str>,
) -> Result<CodebaseSnapshot> {
    let mut body = String::new();
    let mut included = 0usize;
    let mut skipped = Vec::new();
    for file in files {
        if is_skipped_name(file) {
            skipped.push(file.clone());
            continue;
        }
        let bytes = match fs::read(paths.workdir.join(file)) {
            Ok(bytes) => bytes,
            Err(err) => {
                skip(file, "unreadable", &err.to_string());
                skipped.push(file.clone());
                continue;
            }
        };
        if bytes.contains(&0) {
            skipped.push(file.clone());
            continue;
        }
        let Ok(text) = String::from_utf8(bytes) else {
            skip(file, "not utf-8", "");
            skipped.push(file.clone());
            continue;
        };
        body.push_str(&format!("// {file}\n{text}\n\n"));
        included += 1;
    }
    if included == 0 {
        anyhow::bail!("no readable tracked files to upload");
    }

    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    let fingerprint = format!("{:x}", hasher.finalize());
    let tag: String = commit
        .unwrap_or(&fingerprint)
        .chars()
        .take(8)
        .collect();

    fs::create_dir_all(&paths.tmp_dir)
        .with_context(|| format!("failed to create {}", paths.tmp_dir.display()))?;
    let path = paths.tmp_dir.join(format!("codebase-{tag}.txt"));
    fs::write(&path, &body).with_context(|| format!("failed to write {}", path.display()))?;
    let logical_path = paths.relative_to_workdir(&path).to_string_lossy().to_string();

    Ok(CodebaseSnapshot {
        path,
        logical_path,
        tag,
        fingerprint,
        included,
        skipped,
    })
}

pub fn upload(session: &Session<'_>, files: &[String], commit: Option<&str>) -> Result<CodebaseUpload> {
    let snapshot = build_snapshot(session.paths, files, commit)?;
    let vector_store_id = session.create(&ResourceSpec::VectorStore {
        name: format!("{CODEBASE_FRAGMENT}_{}", snapshot.tag),
    })?;
    let file_id = session.create(&ResourceSpec::VectorStoreFile {
        vector_store_id: vector_store_id.clone(),
        path: snapshot.path.clone(),
        logical_path: snapshot.logical_path.clone(),
        metadata: json!({ "commit": commit, "fingerprint": snapshot.fingerprint }),
    })?;

    // Re-derive so a provider answer that broke the one-file contract fails here.
    let view = session.ledger.view();
    if let Some(recorded) = view.find_file_id_by_path_fragment(&snapshot.logical_path)?
        && recorded != file_id
    {
        anyhow::bail!("ledger recorded {recorded} for {} but upload returned {file_id}", snapshot.logical_path);
    }

    let assistant_id = view.latest_live_id(&Operation::CreateAssistant)?;
    if let Some(assistant_id) = &assistant_id {
        session.attach_vector_stores(assistant_id, std::slice::from_ref(&vector_store_id))?;
    }

    Ok(CodebaseUpload {
        snapshot,
        vector_store_id,
        file_id,
        assistant_id,
    })
}

pub fn delete(session: &Session<'_>) -> Result<Vec<(ResourceRef, DeleteOutcome)>> {
    let view = session.ledger.view();
    let Some(file_id) = view.find_file_id_by_path_fragment(CODEBASE_FRAGMENT)? else {
        anyhow::bail!("no live codebase upload recorded in the ledger");
    };
    let vector_store_id = view
        .upload_vector_store_id(&file_id)
        .context("codebase upload entry has no vectorStoreId")?;

    let targets = [
        ResourceRef::VectorStoreFile {
            vector_store_id,
            file_id: file_id.clone(),
        },
        ResourceRef::StorageFile(file_id),
    ];
    Ok(targets
        .into_iter()
        .map(|target| {
            let outcome = session.delete(&target);
            (target, outcome)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::settings::ChatSettings;
    use crate::provider::fake::FakeAi;
    use std::path::Path;
    use tempfile::tempdir;

    fn seed(root: &Path) -> Vec<String> {
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/main.rs"), "fn main() {}\n").expect("main");
        fs::write(root.join("package-lock.json"), "{}").expect("lock");
        fs::write(root.join("logo.png"), [0x89u8, 0x50, 0x00, 0x47]).expect("png");
        vec![
            "src/main.rs".to_string(),
            "package-lock.json".to_string(),
            "logo.png".to_string(),
            "gone.txt".to_string(),
        ]
    }

    #[test]
    fn snapshot_concatenates_text_files_with_headers() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let files = seed(tmp.path());

        let snap = build_snapshot(&paths, &files, Some("0123456789abcdef")).expect("snapshot");
        assert_eq!(snap.tag, "01234567");
        assert_eq!(snap.logical_path, ".tmp/codebase-01234567.txt");
        assert_eq!(snap.included, 1);
        assert_eq!(snap.skipped.len(), 3);
        let body = fs::read_to_string(&snap.path).expect("read");
        assert!(body.starts_with("// src/main.rs\nfn main() {}\n"));
    }

    #[test]
    fn snapshot_without_commit_is_tagged_by_content_hash() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let files = seed(tmp.path());
        let snap = build_snapshot(&paths, &files, None).expect("snapshot");
        assert_eq!(snap.tag, snap.fingerprint[..8]);
    }

    #[test]
    fn upload_attaches_store_to_live_assistant_and_delete_retires_it() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let settings = ChatSettings::default();
        let ai = FakeAi::default();
        let session = Session::new(&paths, &settings, &ai);
        session.ensure_conversation(None).expect("conversation");
        let files = seed(tmp.path());

        let up = upload(&session, &files, Some("deadbeefcafe")).expect("upload");
        assert!(up.assistant_id.is_some());
        let view = session.ledger.view();
        assert_eq!(
            view.find_file_id_by_path_fragment(CODEBASE_FRAGMENT).expect("find"),
            Some(up.file_id.clone())
        );
        assert!(view
            .entries()
            .iter()
            .any(|e| e.operation == Operation::UpdateAssistantVectorStores));

        let outcomes = delete(&session).expect("delete");
        assert!(outcomes.iter().all(|(_, o)| o.deleted));
        assert_eq!(
            session
                .ledger
                .view()
                .find_file_id_by_path_fragment(CODEBASE_FRAGMENT)
                .expect("find"),
            None
        );
    }

    #[test]
    fn delete_without_upload_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let paths = ChatPaths::rooted_at(tmp.path());
        let settings = ChatSettings::default();
        let ai = FakeAi::default();
        let session = Session::new(&paths, &settings, &ai);
        assert!(delete(&session).is_err());
    }
}
