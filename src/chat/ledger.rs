use crate::chat::paths::ChatPaths;
use crate::chat::util::{now_epoch_secs, with_file_lock, write_atomic};
use crate::chat::warn::{self, WarnEvent};
use crate::error::{ChatLedgerError, WarnCode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    CreateVectorStore,
    CreateAssistant,
    CreateThread,
    UploadFileToStorage,
    UploadFilesToVectorStore,
    DeleteVectorStore,
    DeleteAssistant,
    DeleteThread,
    DeleteVectorStoreFile,
    DeleteFile,
    UpdateAssistantVectorStores,
    AskQuestion,
    SetProjectName,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCategory {
    Creation,
    Deletion,
    Interaction,
    Naming,
    Update,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TombstoneKind {
    ThreadDeleted,
    FileDeleted,
    VectorStoreDeleted,
    AssistantDeleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub kind: TombstoneKind,
    pub id: String,
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateVectorStore => "createVectorStore",
            Self::CreateAssistant => "createAssistant",
            Self::CreateThread => "createThread",
            Self::UploadFileToStorage => "uploadFileToStorage",
            Self::UploadFilesToVectorStore => "uploadFilesToVectorStore",
            Self::DeleteVectorStore => "deleteVectorStore",
            Self::DeleteAssistant => "deleteAssistant",
            Self::DeleteThread => "deleteThread",
            Self::DeleteVectorStoreFile => "deleteVectorStoreFile",
            Self::DeleteFile => "deleteFile",
            Self::UpdateAssistantVectorStores => "updateAssistantVectorStores",
            Self::AskQuestion => "askQuestion",
            Self::SetProjectName => "setProjectName",
            Self::Other(name) => name,
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "createVectorStore" => Self::CreateVectorStore,
            "createAssistant" => Self::CreateAssistant,
            "createThread" => Self::CreateThread,
            "uploadFileToStorage" => Self::UploadFileToStorage,
            "uploadFilesToVectorStore" => Self::UploadFilesToVectorStore,
            "deleteVectorStore" => Self::DeleteVectorStore,
            "deleteAssistant" => Self::DeleteAssistant,
            "deleteThread" => Self::DeleteThread,
            "deleteVectorStoreFile" => Self::DeleteVectorStoreFile,
            "deleteFile" => Self::DeleteFile,
            "updateAssistantVectorStores" => Self::UpdateAssistantVectorStores,
            "askQuestion" => Self::AskQuestion,
            "setProjectName" => Self::SetProjectName,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn category(&self) -> OperationCategory {
        match self {
            Self::CreateVectorStore
            | Self::CreateAssistant
            | Self::CreateThread
            | Self::UploadFileToStorage
            | Self::UploadFilesToVectorStore => OperationCategory::Creation,
            Self::DeleteVectorStore
            | Self::DeleteAssistant
            | Self::DeleteThread
            | Self::DeleteVectorStoreFile
            | Self::DeleteFile => OperationCategory::Deletion,
            Self::AskQuestion => OperationCategory::Interaction,
            Self::SetProjectName => OperationCategory::Naming,
            Self::UpdateAssistantVectorStores => OperationCategory::Update,
            Self::Other(_) => OperationCategory::Unknown,
        }
    }

    pub fn tombstone_field(&self) -> Option<(TombstoneKind, &'static str)> {
        match self {
            Self::DeleteThread => Some((TombstoneKind::ThreadDeleted, "threadId")),
            Self::DeleteAssistant => Some((TombstoneKind::AssistantDeleted, "assistantId")),
            Self::DeleteVectorStore => Some((TombstoneKind::VectorStoreDeleted, "vectorStoreId")),
            Self::DeleteVectorStoreFile | Self::DeleteFile => {
                Some((TombstoneKind::FileDeleted, "fileId"))
            }
            _ => None,
        }
    }
}

impl From<String> for Operation {
    fn from(raw: String) -> Self {
        Operation::parse(&raw)
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AskContext {
    #[default]
    Chat,
    FileList,
    #[serde(rename_all = "camelCase")]
    FileContent {
        file_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<String>,
    },
    SearchQuery,
}

impl AskContext {
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::FileList | Self::FileContent { .. } | Self::SearchQuery)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(rename = "funcName")]
    pub operation: Operation,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<u64>,
}

fn ids_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::String(id) if !id.trim().is_empty() => vec![id.clone()],
        Value::Object(map) => map
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .map(|id| vec![id.to_string()])
            .unwrap_or_default(),
        Value::Array(items) => items.iter().flat_map(ids_from_value).collect(),
        _ => Vec::new(),
    }
}

impl LedgerEntry {
    pub fn new(operation: Operation, arguments: Value, result: Value) -> Self {
        Self {
            operation,
            arguments,
            result,
            recorded_at: now_epoch_secs().ok(),
        }
    }

    pub fn result_ids(&self) -> Vec<String> {
        ids_from_value(&self.result)
    }

    pub fn argument_str(&self, field: &str) -> Option<&str> {
        self.arguments.get(field).and_then(Value::as_str)
    }

    pub fn argument_paths(&self) -> Vec<String> {
        self.arguments
            .get("filePaths")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToOwned::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tombstone(&self) -> Result<Option<Tombstone>, ChatLedgerError> {
        let Some((kind, field)) = self.operation.tombstone_field() else {
            return Ok(None);
        };
        match self.argument_str(field) {
            Some(id) if !id.trim().is_empty() => Ok(Some(Tombstone {
                kind,
                id: id.to_string(),
            })),
            _ => Err(ChatLedgerError::TombstoneMissingId {
                operation: self.operation.as_str().to_string(),
            }),
        }
    }

    pub fn context(&self) -> AskContext {
        self.arguments
            .get("context")
            .cloned()
            .and_then(|raw| serde_json::from_value(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerView {
    entries: Vec<LedgerEntry>,
}

impl LedgerView {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_paths(paths: &ChatPaths) -> Self {
        Self::new(paths.ledger_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_entries(&self, entries: &[LedgerEntry]) -> Result<()> {
        let data = serde_json::to_string_pretty(entries)?;
        write_atomic(&self.path, &format!("{data}\n"))
    }

    fn try_append(&self, entry: LedgerEntry) -> Result<()> {
        with_file_lock(&self.path, || {
            let mut entries = read_entries(&self.path)?;
            entries.push(entry);
            self.write_entries(&entries)
        })
    }

    /// Record an operation. Best-effort: the remote side effect already
    /// happened, so a failed write is reported and swallowed.
    pub fn append(&self, operation: Operation, arguments: Value, result: Value) {
        let action = operation.as_str().to_string();
        let entry = LedgerEntry::new(operation, arguments, result);
        if let Err(err) = self.try_append(entry) {
            warn::emit(WarnEvent {
                code: WarnCode::W001LedgerWrite,
                stage: "ledger",
                action: &action,
                target: &self.path.display().to_string(),
                reason: "ledger append failed",
                err: &format!("{err:#}"),
            });
        }
    }

    pub fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }

    pub fn truncate_and_append(
        &self,
        operation: Operation,
        arguments: Value,
        result: Value,
    ) -> Result<()> {
        self.reset()?;
        self.append(operation, arguments, result);
        Ok(())
    }

    pub fn view(&self) -> LedgerView {
        match read_entries(&self.path) {
            Ok(entries) => LedgerView::new(entries),
            Err(err) => {
                warn::emit(WarnEvent {
                    code: WarnCode::W002LedgerRead,
                    stage: "derive",
                    action: "load",
                    target: &self.path.display().to_string(),
                    reason: "ledger unreadable; using empty ledger",
                    err: &format!("{err:#}"),
                });
                LedgerView::default()
            }
        }
    }
}
