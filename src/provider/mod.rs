pub mod brave;
pub mod git;
pub mod openai;
pub mod script;

use crate::chat::ledger::Operation;
use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    VectorStore {
        name: String,
    },
    Assistant {
        name: String,
        instructions: String,
        model: String,
        vector_store_ids: Vec<String>,
    },
    Thread,
    StorageFile {
        path: PathBuf,
        logical_path: String,
    },
    VectorStoreFile {
        vector_store_id: String,
        path: PathBuf,
        logical_path: String,
        metadata: Value,
    },
}

impl ResourceSpec {
    pub fn operation(&self) -> Operation {
        match self {
            Self::VectorStore { .. } => Operation::CreateVectorStore,
            Self::Assistant { .. } => Operation::CreateAssistant,
            Self::Thread => Operation::CreateThread,
            Self::StorageFile { .. } => Operation::UploadFileToStorage,
            Self::VectorStoreFile { .. } => Operation::UploadFilesToVectorStore,
        }
    }

    pub fn ledger_arguments(&self) -> Value {
        match self {
            Self::VectorStore { name } => json!({ "name": name }),
            Self::Assistant {
                name,
                instructions,
                model,
                vector_store_ids,
            } => json!({
                "name": name,
                "instructions": instructions,
                "model": model,
                "vectorStoreIds": vector_store_ids,
            }),
            Self::Thread => json!({}),
            Self::StorageFile { logical_path, .. } => json!({ "filePath": logical_path }),
            Self::VectorStoreFile {
                vector_store_id,
                logical_path,
                metadata,
                ..
            } => json!({
                "vectorStoreId": vector_store_id,
                "filePaths": [logical_path],
                "metadata": metadata,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    VectorStore(String),
    Assistant(String),
    Thread(String),
    StorageFile(String),
    VectorStoreFile {
        vector_store_id: String,
        file_id: String,
    },
}

impl ResourceRef {
    pub fn operation(&self) -> Operation {
        match self {
            Self::VectorStore(_) => Operation::DeleteVectorStore,
            Self::Assistant(_) => Operation::DeleteAssistant,
            Self::Thread(_) => Operation::DeleteThread,
            Self::StorageFile(_) => Operation::DeleteFile,
            Self::VectorStoreFile { .. } => Operation::DeleteVectorStoreFile,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::VectorStore(id)
            | Self::Assistant(id)
            | Self::Thread(id)
            | Self::StorageFile(id) => id,
            Self::VectorStoreFile { file_id, .. } => file_id,
        }
    }

    pub fn ledger_arguments(&self) -> Value {
        match self {
            Self::VectorStore(id) => json!({ "vectorStoreId": id }),
            Self::Assistant(id) => json!({ "assistantId": id }),
            Self::Thread(id) => json!({ "threadId": id }),
            Self::StorageFile(id) => json!({ "fileId": id }),
            Self::VectorStoreFile {
                vector_store_id,
                file_id,
            } => json!({ "vectorStoreId": vector_store_id, "fileId": file_id }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub id: String,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteOutcome {
    pub fn ok() -> Self {
        Self {
            deleted: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            deleted: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskRequest<'a> {
    pub assistant_id: &'a str,
    pub thread_id: &'a str,
    pub question: &'a str,
    pub attachments: &'a [String],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub status: ReplyStatus,
}

pub trait AiService {
    fn create_resource(&self, spec: &ResourceSpec) -> Result<Created>;
    fn delete_resource(&self, target: &ResourceRef) -> DeleteOutcome;
    fn update_assistant_vector_stores(
        &self,
        assistant_id: &str,
        vector_store_ids: &[String],
    ) -> Result<Value>;
    /// Ask and wait for the reply. When `interrupt` is raised mid-answer the
    /// text received so far comes back as `ReplyStatus::Interrupted`.
    fn ask(&self, request: &AskRequest<'_>, interrupt: &AtomicBool) -> Result<Reply>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchDocument {
    pub url: String,
    pub text: String,
}

pub trait SearchService {
    fn search(&self, query: &str) -> Result<Vec<SearchDocument>>;
}
