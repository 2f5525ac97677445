use crate::chat::ledger::{AskContext, LedgerStore, Operation};
use crate::chat::paths::ChatPaths;
use crate::chat::project::ConfigStore;
use crate::chat::prompts::search_query_prompt;
use crate::chat::settings::ChatSettings;
use crate::chat::transcript;
use crate::chat::warn::{self, WarnEvent};
use crate::error::{ChatLedgerError, WarnCode};
use crate::provider::{
    AiService, AskRequest, DeleteOutcome, Reply, ReplyStatus, ResourceRef, ResourceSpec,
    SearchDocument, SearchService,
};
use anyhow::{Context, Result};
use chrono::Local;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub vector_store: Ensured,
    pub assistant: Ensured,
    pub thread: Ensured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub index: u64,
    pub thread_id: String,
    pub status: ReplyStatus,
    pub attachments: Vec<String>,
}

pub struct Session<'a> {
    pub paths: &'a ChatPaths,
    pub settings: &'a ChatSettings,
    pub ledger: LedgerStore,
    pub config: ConfigStore,
    ai: &'a dyn AiService,
}

impl<'a> Session<'a> {
    pub fn new(paths: &'a ChatPaths, settings: &'a ChatSettings, ai: &'a dyn AiService) -> Self {
        Self {
            paths,
            settings,
            ledger: LedgerStore::from_paths(paths),
            config: ConfigStore::from_paths(paths),
            ai,
        }
    }

    pub fn create(&self, spec: &ResourceSpec) -> Result<String> {
        let created = self.ai.create_resource(spec)?;
        self.ledger
            .append(spec.operation(), spec.ledger_arguments(), created.raw);
        Ok(created.id)
    }

    /// Delete a remote resource. Only a confirmed deletion writes a tombstone.
    pub fn delete(&self, target: &ResourceRef) -> DeleteOutcome {
        let outcome = self.ai.delete_resource(target);
        if outcome.deleted {
            self.ledger.append(
                target.operation(),
                target.ledger_arguments(),
                json!({ "deleted": true }),
            );
        } else {
            warn::emit(WarnEvent {
                code: WarnCode::W003DeleteFailed,
                stage: "delete",
                action: target.operation().as_str(),
                target: target.id(),
                reason: "remote deletion failed",
                err: outcome.error.as_deref().unwrap_or("unknown"),
            });
        }
        outcome
    }

    pub fn attach_vector_stores(&self, assistant_id: &str, vector_store_ids: &[String]) -> Result<()> {
        let result = self
            .ai
            .update_assistant_vector_stores(assistant_id, vector_store_ids)?;
        self.ledger.append(
            Operation::UpdateAssistantVectorStores,
            json!({ "assistantId": assistant_id, "vectorStoreIds": vector_store_ids }),
            result,
        );
        Ok(())
    }

    pub fn project_name(&self) -> Result<String> {
        if let Some(name) = self.config.load()?.name.filter(|n| !n.trim().is_empty()) {
            return Ok(name);
        }
        if let Some(name) = self.ledger.view().project_name() {
            return Ok(name);
        }
        Ok(self
            .paths
            .workdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string()))
    }

    fn reuse_or_create(
        &self,
        operation: &Operation,
        spec: impl FnOnce() -> Result<ResourceSpec>,
    ) -> Result<Ensured> {
        if let Some(id) = self.ledger.view().latest_live_id(operation)? {
            return Ok(Ensured { id, created: false });
        }
        let id = self.create(&spec()?)?;
        Ok(Ensured { id, created: true })
    }

    pub fn ensure_vector_store(&self) -> Result<Ensured> {
        self.reuse_or_create(&Operation::CreateVectorStore, || {
            Ok(ResourceSpec::VectorStore {
                name: self.project_name()?,
            })
        })
    }

    pub fn ensure_assistant(&self, vector_store_id: &str) -> Result<Ensured> {
        let assistant = &self.settings.assistant;
        self.reuse_or_create(&Operation::CreateAssistant, || {
            Ok(ResourceSpec::Assistant {
                name: assistant.name.clone(),
                instructions: assistant.instructions.clone(),
                model: assistant.model.clone(),
                vector_store_ids: vec![vector_store_id.to_string()],
            })
        })
    }

    pub fn ensure_thread(&self, transcript_thread: Option<&str>) -> Result<Ensured> {
        if let Some(id) = transcript_thread
            && !self.ledger.view().is_tombstoned(id)?
        {
            return Ok(Ensured {
                id: id.to_string(),
                created: false,
            });
        }
        self.reuse_or_create(&Operation::CreateThread, || Ok(ResourceSpec::Thread))
    }

    pub fn ensure_conversation(&self, transcript_thread: Option<&str>) -> Result<Conversation> {
        let vector_store = self.ensure_vector_store()?;
        let assistant = self.ensure_assistant(&vector_store.id)?;
        let thread = self.ensure_thread(transcript_thread)?;
        Ok(Conversation {
            vector_store,
            assistant,
            thread,
        })
    }

    pub fn ask(
        &self,
        conversation: &Conversation,
        question: &str,
        context: AskContext,
        attachments: &[String],
        interrupt: &AtomicBool,
    ) -> Result<Reply> {
        let request = AskRequest {
            assistant_id: &conversation.assistant.id,
            thread_id: &conversation.thread.id,
            question,
            attachments,
        };
        let reply = self.ai.ask(&request, interrupt)?;
        let text = transcript::strip_citations(&reply.text);

        let mut arguments = json!({
            "assistantId": conversation.assistant.id,
            "threadId": conversation.thread.id,
            "question": question,
            "context": serde_json::to_value(&context)?,
        });
        if !attachments.is_empty() {
            arguments["attachments"] = json!(attachments);
        }
        if reply.status == ReplyStatus::Interrupted {
            arguments["interrupted"] = Value::Bool(true);
        }
        self.ledger
            .append(Operation::AskQuestion, arguments, Value::String(text.clone()));
        Ok(Reply {
            text,
            status: reply.status,
        })
    }

    pub fn search_attachment(
        &self,
        conversation: &Conversation,
        search: &dyn SearchService,
        question: &str,
        interrupt: &AtomicBool,
    ) -> Result<Option<String>> {
        let reply = self.ask(
            conversation,
            &search_query_prompt(question),
            AskContext::SearchQuery,
            &[],
            interrupt,
        )?;
        if reply.status == ReplyStatus::Interrupted {
            return Err(interrupted("search query"));
        }
        let query = reply.text.trim().to_string();
        if query.is_empty() {
            skip_search("assistant returned an empty query", "");
            return Ok(None);
        }

        let documents = search.search(&query)?;
        if interrupt.load(Ordering::SeqCst) {
            return Err(interrupted("web search"));
        }
        if documents.is_empty() {
            skip_search("no search results", &query);
            return Ok(None);
        }

        let path = self.write_search_results(&query, &documents)?;
        let logical_path = self.paths.relative_to_workdir(&path);
        let id = self.create(&ResourceSpec::StorageFile {
            logical_path: logical_path.to_string_lossy().to_string(),
            path,
        })?;
        Ok(Some(id))
    }

    fn write_search_results(&self, query: &str, documents: &[SearchDocument]) -> Result<PathBuf> {
        fs::create_dir_all(&self.paths.tmp_dir)
            .with_context(|| format!("failed to create {}", self.paths.tmp_dir.display()))?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let path = self.paths.tmp_dir.join(format!("brave-search-{stamp}.txt"));
        fs::write(&path, render_search_results(query, documents))
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn answer_pending(
        &self,
        transcript_path: &Path,
        search: Option<&dyn SearchService>,
        extra_attachments: &[String],
        interrupt: &AtomicBool,
    ) -> Result<Option<TurnOutcome>> {
        let text = transcript::read(transcript_path)?;
        let state = transcript::parse(&text);
        if state.remainder.is_empty() {
            return Ok(None);
        }

        let conversation = self.ensure_conversation(state.last_thread_id.as_deref())?;
        let mut attachments = extra_attachments.to_vec();
        if let Some(search) = search
            && let Some(file_id) =
                self.search_attachment(&conversation, search, &state.remainder, interrupt)?
        {
            attachments.push(file_id);
        }

        let reply = self.ask(
            &conversation,
            &state.remainder,
            AskContext::Chat,
            &attachments,
            interrupt,
        )?;
        let thread_id = conversation.thread.id.clone();
        let index = if reply.text.trim().is_empty() {
            state.last_answer_index
        } else {
            transcript::append_answer(
                transcript_path,
                &reply.text,
                &thread_id,
                state.last_answer_index,
            )?
        };
        if reply.status == ReplyStatus::Interrupted {
            warn::emit(WarnEvent {
                code: WarnCode::W005PartialAnswer,
                stage: "ask",
                action: "interrupt",
                target: &transcript_path.display().to_string(),
                reason: "interrupted; partial answer flushed",
                err: "",
            });
        }

        Ok(Some(TurnOutcome {
            index,
            thread_id,
            status: reply.status,
            attachments,
        }))
    }
}

fn interrupted(stage: &str) -> anyhow::Error {
    ChatLedgerError::Interrupted {
        stage: stage.to_string(),
    }
    .into()
}

fn skip_search(reason: &str, query: &str) {
    warn::emit(WarnEvent {
        code: WarnCode::W004SearchSkipped,
        stage: "search",
        action: "attach",
        target: query,
        reason,
        err: "",
    });
}

fn render_search_results(query: &str, documents: &[SearchDocument]) -> String {
    let mut out = format!("Web search results for: {query}\n");
    for (idx, doc) in documents.iter().enumerate() {
        out.push_str(&format!("\n## Result {}: {}\n\n{}\n", idx + 1, doc.url, doc.text));
    }
    out
}
