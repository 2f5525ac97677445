use crate::chat::ledger::{
    AskContext, LedgerEntry, LedgerView, Operation, OperationCategory, Tombstone,
};
use crate::chat::prompts::ORIGINAL_QUESTION_DELIMITER;
use crate::error::ChatLedgerError;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

type DeriveResult<T> = Result<T, ChatLedgerError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveResource {
    pub kind: Operation,
    pub id: String,
    pub source_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalQuestion {
    pub text: String,
    pub position_from_end: usize,
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn single_file_batch(entry: &LedgerEntry) -> DeriveResult<(String, String)> {
    let paths = entry.argument_paths();
    let ids = entry.result_ids();
    if paths.len() != 1 || ids.len() != 1 {
        return Err(ChatLedgerError::BatchUploadMismatch { paths, ids });
    }
    Ok((paths[0].clone(), ids[0].clone()))
}

fn display_question(text: &str) -> String {
    let segments: Vec<&str> = text.split(ORIGINAL_QUESTION_DELIMITER).collect();
    if segments.len() >= 3 {
        segments[1].trim().to_string()
    } else {
        text.to_string()
    }
}

impl LedgerView {
    fn ask_entries_newest_first(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries()
            .iter()
            .rev()
            .filter(|entry| entry.operation == Operation::AskQuestion)
    }

    pub fn tombstones(&self) -> DeriveResult<Vec<Tombstone>> {
        let mut out = Vec::new();
        for entry in self.entries() {
            if let Some(tombstone) = entry.tombstone()? {
                out.push(tombstone);
            }
        }
        Ok(out)
    }

    pub fn tombstoned_ids(&self) -> DeriveResult<BTreeSet<String>> {
        Ok(self.tombstones()?.into_iter().map(|t| t.id).collect())
    }

    pub fn is_tombstoned(&self, id: &str) -> DeriveResult<bool> {
        Ok(self.tombstoned_ids()?.contains(id))
    }

    pub fn latest_live_id(&self, operation: &Operation) -> DeriveResult<Option<String>> {
        let retired = self.tombstoned_ids()?;
        for entry in self.entries().iter().rev() {
            if &entry.operation != operation {
                continue;
            }
            if let Some(id) = entry
                .result_ids()
                .into_iter()
                .rev()
                .find(|id| !retired.contains(id))
            {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn find_file_id_by_path_fragment(&self, fragment: &str) -> DeriveResult<Option<String>> {
        let Some(entry) = self.entries().iter().rev().find(|entry| {
            entry.operation == Operation::UploadFilesToVectorStore
                && entry
                    .argument_paths()
                    .iter()
                    .any(|path| path.contains(fragment))
        }) else {
            return Ok(None);
        };

        let (_, id) = single_file_batch(entry)?;
        if self.is_tombstoned(&id)? {
            return Ok(None);
        }
        Ok(Some(id))
    }

    pub fn upload_vector_store_id(&self, file_id: &str) -> Option<String> {
        self.entries()
            .iter()
            .rev()
            .find(|entry| {
                entry.operation == Operation::UploadFilesToVectorStore
                    && entry.result_ids().iter().any(|id| id == file_id)
            })
            .and_then(|entry| entry.argument_str("vectorStoreId"))
            .map(ToOwned::to_owned)
    }

    pub fn live_resources(&self) -> DeriveResult<Vec<LiveResource>> {
        let retired = self.tombstoned_ids()?;
        let mut out = Vec::new();
        for entry in self.entries() {
            if entry.operation.category() != OperationCategory::Creation {
                continue;
            }
            match entry.operation {
                Operation::UploadFilesToVectorStore => {
                    let (path, id) = single_file_batch(entry)?;
                    if !retired.contains(&id) {
                        out.push(LiveResource {
                            kind: entry.operation.clone(),
                            id,
                            source_path: Some(path),
                        });
                    }
                }
                _ => {
                    let source_path = entry.argument_str("filePath").map(ToOwned::to_owned);
                    for id in entry.result_ids() {
                        if retired.contains(&id) {
                            continue;
                        }
                        out.push(LiveResource {
                            kind: entry.operation.clone(),
                            id,
                            source_path: source_path.clone(),
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn question_at(&self, offset: usize) -> Option<String> {
        let entry = self.ask_entries_newest_first().nth(offset)?;
        let question = entry.arguments.get("question").unwrap_or(&entry.arguments);
        Some(render_value(question))
    }

    pub fn answer_at(&self, offset: usize) -> Option<String> {
        let entry = self.ask_entries_newest_first().nth(offset)?;
        Some(render_value(&entry.result))
    }

    pub fn original_question_at(&self, offset: usize) -> Option<OriginalQuestion> {
        self.ask_entries_newest_first()
            .enumerate()
            .filter_map(|(position_from_end, entry)| {
                let text = render_value(entry.arguments.get("question")?);
                let wrapped = text.contains(ORIGINAL_QUESTION_DELIMITER);
                if !wrapped && entry.context().is_internal() {
                    return None;
                }
                Some(OriginalQuestion {
                    text: display_question(&text),
                    position_from_end,
                })
            })
            .nth(offset)
    }

    pub fn latest_answer_where(&self, pred: impl Fn(&AskContext) -> bool) -> Option<String> {
        self.ask_entries_newest_first()
            .find(|entry| pred(&entry.context()))
            .map(|entry| render_value(&entry.result))
    }

    pub fn batch_answers(&self, batch_id: &str) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for entry in self.entries() {
            if entry.operation != Operation::AskQuestion {
                continue;
            }
            let AskContext::FileContent {
                file_name,
                batch_id: Some(entry_batch),
            } = entry.context()
            else {
                continue;
            };
            if entry_batch != batch_id {
                continue;
            }
            let answer = render_value(&entry.result);
            match out.iter_mut().find(|(name, _)| *name == file_name) {
                Some(slot) => slot.1 = answer,
                None => out.push((file_name, answer)),
            }
        }
        out
    }

    pub fn latest_batch_id(&self) -> Option<String> {
        self.ask_entries_newest_first()
            .find_map(|entry| match entry.context() {
                AskContext::FileContent { batch_id, .. } => batch_id,
                _ => None,
            })
    }

    pub fn project_name(&self) -> Option<String> {
        self.entries()
            .iter()
            .rev()
            .find(|entry| entry.operation == Operation::SetProjectName)
            .and_then(|entry| entry.argument_str("name"))
            .map(ToOwned::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(op: Operation, args: Value, result: Value) -> LedgerEntry {
        LedgerEntry {
            operation: op,
            arguments: args,
            result,
            recorded_at: None,
        }
    }

    fn ask(question: &str, answer: &str, context: Option<Value>) -> LedgerEntry {
        let mut args = json!({"assistantId": "asst_1", "threadId": "thread_1", "question": question});
        if let Some(ctx) = context {
            args["context"] = ctx;
        }
        entry(Operation::AskQuestion, args, json!(answer))
    }

    #[test]
    fn latest_live_id_skips_tombstoned_and_falls_back() {
        let mut entries = vec![
            entry(Operation::CreateVectorStore, json!({"name": "p"}), json!({"id": "vs_1"})),
            entry(Operation::CreateVectorStore, json!({"name": "p"}), json!({"id": "vs_2"})),
        ];
        let view = LedgerView::new(entries.clone());
        assert_eq!(
            view.latest_live_id(&Operation::CreateVectorStore).expect("derive"),
            Some("vs_2".to_string())
        );

        entries.push(entry(
            Operation::DeleteVectorStore,
            json!({"vectorStoreId": "vs_2"}),
            json!({"deleted": true}),
        ));
        let view = LedgerView::new(entries.clone());
        assert_eq!(
            view.latest_live_id(&Operation::CreateVectorStore).expect("derive"),
            Some("vs_1".to_string())
        );

        entries.push(entry(
            Operation::DeleteVectorStore,
            json!({"vectorStoreId": "vs_1"}),
            json!({"deleted": true}),
        ));
        let view = LedgerView::new(entries);
        assert_eq!(
            view.latest_live_id(&Operation::CreateVectorStore).expect("derive"),
            None
        );
    }

    #[test]
    fn empty_ledger_has_no_live_ids() {
        let view = LedgerView::default();
        assert_eq!(
            view.latest_live_id(&Operation::CreateVectorStore).expect("derive"),
            None
        );
        assert!(view.live_resources().expect("derive").is_empty());
    }

    #[test]
    fn deleted_thread_is_no_longer_latest() {
        let view = LedgerView::new(vec![
            entry(Operation::CreateThread, json!({}), json!({"id": "t1"})),
            entry(Operation::DeleteThread, json!({"threadId": "t1"}), json!({"deleted": true})),
        ]);
        assert_eq!(view.latest_live_id(&Operation::CreateThread).expect("derive"), None);
        assert!(view.is_tombstoned("t1").expect("derive"));
        assert!(!view.is_tombstoned("t2").expect("derive"));
    }

    #[test]
    fn tombstones_cover_every_deletion_kind() {
        let view = LedgerView::new(vec![
            entry(Operation::DeleteThread, json!({"threadId": "t"}), Value::Null),
            entry(Operation::DeleteAssistant, json!({"assistantId": "a"}), Value::Null),
            entry(Operation::DeleteVectorStore, json!({"vectorStoreId": "v"}), Value::Null),
            entry(
                Operation::DeleteVectorStoreFile,
                json!({"vectorStoreId": "v", "fileId": "f"}),
                Value::Null,
            ),
            entry(Operation::DeleteFile, json!({"fileId": "g"}), Value::Null),
        ]);
        let ids = view.tombstoned_ids().expect("derive");
        let want: BTreeSet<String> = ["t", "a", "v", "f", "g"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids, want);
    }

    #[test]
    fn deletion_without_identifier_is_an_integrity_error() {
        let view = LedgerView::new(vec![
            entry(Operation::CreateThread, json!({}), json!({"id": "t1"})),
            entry(Operation::DeleteThread, json!({"id": "t1"}), Value::Null),
        ]);
        assert!(matches!(
            view.latest_live_id(&Operation::CreateThread),
            Err(ChatLedgerError::TombstoneMissingId { .. })
        ));
    }

    #[test]
    fn batch_upload_with_two_paths_and_one_id_fails_listing() {
        let view = LedgerView::new(vec![entry(
            Operation::UploadFilesToVectorStore,
            json!({"vectorStoreId": "vs_1", "filePaths": ["a.txt", "b.txt"]}),
            json!(["file-1"]),
        )]);
        assert!(matches!(
            view.live_resources(),
            Err(ChatLedgerError::BatchUploadMismatch { .. })
        ));
    }

    #[test]
    fn find_file_id_by_fragment_maps_path_to_id() {
        let view = LedgerView::new(vec![
            entry(
                Operation::UploadFilesToVectorStore,
                json!({"vectorStoreId": "vs_1", "filePaths": [".tmp/codebase-aaaa.txt"]}),
                json!(["file-old"]),
            ),
            entry(
                Operation::UploadFilesToVectorStore,
                json!({"vectorStoreId": "vs_1", "filePaths": [".tmp/brave-search.txt"]}),
                json!(["file-web"]),
            ),
            entry(
                Operation::UploadFilesToVectorStore,
                json!({"vectorStoreId": "vs_2", "filePaths": [".tmp/codebase-bbbb.txt"]}),
                json!(["file-new"]),
            ),
        ]);
        assert_eq!(
            view.find_file_id_by_path_fragment("codebase").expect("derive"),
            Some("file-new".to_string())
        );
        assert_eq!(view.find_file_id_by_path_fragment("missing").expect("derive"), None);
    }

    #[test]
    fn find_file_id_by_fragment_hides_deleted_file() {
        let view = LedgerView::new(vec![
            entry(
                Operation::UploadFilesToVectorStore,
                json!({"vectorStoreId": "vs_1", "filePaths": [".tmp/codebase-aaaa.txt"]}),
                json!(["file-1"]),
            ),
            entry(
                Operation::DeleteVectorStoreFile,
                json!({"vectorStoreId": "vs_1", "fileId": "file-1"}),
                json!({"deleted": true}),
            ),
        ]);
        assert_eq!(view.find_file_id_by_path_fragment("codebase").expect("derive"), None);
    }

    #[test]
    fn live_resources_keep_creation_order_and_source_paths() {
        let view = LedgerView::new(vec![
            entry(Operation::CreateVectorStore, json!({"name": "p"}), json!({"id": "vs_1"})),
            entry(Operation::CreateAssistant, json!({"name": "a"}), json!({"id": "asst_1"})),
            entry(Operation::CreateThread, json!({}), json!({"id": "thread_1"})),
            entry(
                Operation::UploadFileToStorage,
                json!({"filePath": ".tmp/web.txt"}),
                json!({"id": "file-s"}),
            ),
            entry(
                Operation::UploadFilesToVectorStore,
                json!({"vectorStoreId": "vs_1", "filePaths": ["code.txt"]}),
                json!(["file-v"]),
            ),
            entry(Operation::DeleteThread, json!({"threadId": "thread_1"}), Value::Null),
            ask("q", "a", None),
        ]);
        let live = view.live_resources().expect("derive");
        let got: Vec<(&str, &str, Option<&str>)> = live
            .iter()
            .map(|r| (r.kind.as_str(), r.id.as_str(), r.source_path.as_deref()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("createVectorStore", "vs_1", None),
                ("createAssistant", "asst_1", None),
                ("uploadFileToStorage", "file-s", Some(".tmp/web.txt")),
                ("uploadFilesToVectorStore", "file-v", Some("code.txt")),
            ]
        );
    }

    #[test]
    fn question_and_answer_offsets_walk_backward() {
        let view = LedgerView::new(vec![
            ask("first?", "one", None),
            entry(Operation::CreateThread, json!({}), json!({"id": "t"})),
            ask("second?", "two", None),
        ]);
        assert_eq!(view.question_at(0).as_deref(), Some("second?"));
        assert_eq!(view.question_at(1).as_deref(), Some("first?"));
        assert_eq!(view.question_at(2), None);
        assert_eq!(view.answer_at(0).as_deref(), Some("two"));
        assert_eq!(view.answer_at(1).as_deref(), Some("one"));
    }

    #[test]
    fn structured_answers_render_pretty() {
        let view = LedgerView::new(vec![entry(
            Operation::AskQuestion,
            json!({"question": "q"}),
            json!({"k": 1}),
        )]);
        assert_eq!(view.answer_at(0).as_deref(), Some("{\n  \"k\": 1\n}"));
    }

    #[test]
    fn original_question_skips_internal_prompts_and_unwraps_delimited() {
        let wrapped = format!(
            "generated preamble{d}What changed in v2?{d}generated suffix",
            d = ORIGINAL_QUESTION_DELIMITER
        );
        let view = LedgerView::new(vec![
            ask("plain question", "a0", None),
            ask(&wrapped, "a1", Some(json!({"action": "fileList"}))),
            ask("give me src/a.rs", "a2", Some(json!({"action": "fileContent", "fileName": "src/a.rs"}))),
            ask("give me src/b.rs", "a3", Some(json!({"action": "fileContent", "fileName": "src/b.rs"}))),
        ]);

        let latest = view.original_question_at(0).expect("original");
        assert_eq!(latest.text, "What changed in v2?");
        assert_eq!(latest.position_from_end, 2);

        let older = view.original_question_at(1).expect("original");
        assert_eq!(older.text, "plain question");
        assert_eq!(older.position_from_end, 3);

        assert_eq!(view.original_question_at(2), None);
    }

    #[test]
    fn batch_answers_group_by_correlation_id() {
        let view = LedgerView::new(vec![
            ask("q", "list", Some(json!({"action": "fileList"}))),
            ask("q", "old a", Some(json!({"action": "fileContent", "fileName": "a.rs", "batchId": "b0"}))),
            ask("q", "new a", Some(json!({"action": "fileContent", "fileName": "a.rs", "batchId": "b1"}))),
            ask("q", "new b", Some(json!({"action": "fileContent", "fileName": "b.rs", "batchId": "b1"}))),
        ]);
        assert_eq!(
            view.batch_answers("b1"),
            vec![
                ("a.rs".to_string(), "new a".to_string()),
                ("b.rs".to_string(), "new b".to_string())
            ]
        );
        assert_eq!(view.latest_batch_id().as_deref(), Some("b1"));
        assert_eq!(
            view.latest_answer_where(|ctx| *ctx == AskContext::FileList).as_deref(),
            Some("list")
        );
    }

    #[test]
    fn project_name_reads_latest_naming_entry() {
        let view = LedgerView::new(vec![entry(
            Operation::SetProjectName,
            json!({"name": "demo"}),
            Value::Null,
        )]);
        assert_eq!(view.project_name().as_deref(), Some("demo"));
    }
}
