use crate::chat::settings::RemoteSettings;
use crate::chat::warn::{self, WarnEvent};
use crate::error::{ChatLedgerError, WarnCode};
use crate::provider::{
    AiService, AskRequest, Created, DeleteOutcome, Reply, ReplyStatus, ResourceRef, ResourceSpec,
};
use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde_json::{Value, json};
use std::env;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const INDEX_POLL_ATTEMPTS: u32 = 120;
const INDEX_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct OpenAiAssistants {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiAssistants {
    pub fn new(api_key: String, remote: &RemoteSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(remote.request_timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_env(remote: &RemoteSettings) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("OPENAI_API_KEY is required")?;
        Self::new(api_key.trim().to_string(), remote)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    fn checked(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ChatLedgerError::RemoteCall {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }

    fn post_json(&self, operation: &str, path: &str, payload: &Value) -> Result<Value> {
        let response = self
            .authed(self.client.post(self.url(path)))
            .json(payload)
            .send()
            .with_context(|| format!("{operation} request failed"))?;
        Ok(Self::checked(operation, response)?.json()?)
    }

    fn get_json(&self, operation: &str, path: &str) -> Result<Value> {
        let response = self
            .authed(self.client.get(self.url(path)))
            .send()
            .with_context(|| format!("{operation} request failed"))?;
        Ok(Self::checked(operation, response)?.json()?)
    }

    fn upload(&self, path: &std::path::Path) -> Result<Value> {
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .file("file", path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let response = self
            .authed(self.client.post(self.url("files")))
            .multipart(form)
            .send()
            .context("file upload request failed")?;
        Ok(Self::checked("uploadFile", response)?.json()?)
    }

    fn wait_until_indexed(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        let path = format!("vector_stores/{vector_store_id}/files/{file_id}");
        for _ in 0..INDEX_POLL_ATTEMPTS {
            let status = self.get_json("getVectorStoreFile", &path)?;
            match status.get("status").and_then(Value::as_str) {
                Some("completed") => return Ok(()),
                Some("in_progress") | None => thread::sleep(INDEX_POLL_INTERVAL),
                Some(other) => anyhow::bail!(
                    "vector store file {file_id} ended with status {other}: {}",
                    status.get("last_error").cloned().unwrap_or(Value::Null)
                ),
            }
        }
        anyhow::bail!("vector store file {file_id} was not indexed in time")
    }

    fn cancel_run(&self, thread_id: &str, run_id: &str) {
        let _ = self
            .authed(
                self.client
                    .post(self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel"))),
            )
            .send();
    }
}

fn id_of(raw: &Value, operation: &str) -> Result<String> {
    raw.get("id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .with_context(|| format!("{operation} response missing id"))
}

fn discard_on_error(
    result: Result<()>,
    file_id: &str,
    discard: impl FnOnce() -> DeleteOutcome,
) -> Result<()> {
    let Err(err) = result else {
        return Ok(());
    };
    let outcome = discard();
    if outcome.deleted {
        return Err(err.context(format!("uploaded file {file_id} was removed again")));
    }
    let reason = outcome.error.unwrap_or_else(|| "unknown".to_string());
    warn::emit(WarnEvent {
        code: WarnCode::W003DeleteFailed,
        stage: "upload",
        action: "discard",
        target: file_id,
        reason: "attach failed and the uploaded file could not be removed",
        err: &reason,
    });
    Err(err.context(format!(
        "uploaded file {file_id} could not be removed ({reason}); delete it by hand"
    )))
}

fn delta_text(data: &Value) -> String {
    data.get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text")?.get("value")?.as_str())
                .collect()
        })
        .unwrap_or_default()
}

impl AiService for OpenAiAssistants {
    fn create_resource(&self, spec: &ResourceSpec) -> Result<Created> {
        let operation = spec.operation();
        let op = operation.as_str();
        match spec {
            ResourceSpec::VectorStore { name } => {
                let raw = self.post_json(op, "vector_stores", &json!({ "name": name }))?;
                Ok(Created {
                    id: id_of(&raw, op)?,
                    raw,
                })
            }
            ResourceSpec::Assistant {
                name,
                instructions,
                model,
                vector_store_ids,
            } => {
                let payload = json!({
                    "name": name,
                    "instructions": instructions,
                    "model": model,
                    "tools": [{ "type": "file_search" }],
                    "tool_resources": { "file_search": { "vector_store_ids": vector_store_ids } },
                });
                let raw = self.post_json(op, "assistants", &payload)?;
                Ok(Created {
                    id: id_of(&raw, op)?,
                    raw,
                })
            }
            ResourceSpec::Thread => {
                let raw = self.post_json(op, "threads", &json!({}))?;
                Ok(Created {
                    id: id_of(&raw, op)?,
                    raw,
                })
            }
            ResourceSpec::StorageFile { path, .. } => {
                let raw = self.upload(path)?;
                Ok(Created {
                    id: id_of(&raw, op)?,
                    raw,
                })
            }
            ResourceSpec::VectorStoreFile {
                vector_store_id,
                path,
                ..
            } => {
                let file = self.upload(path)?;
                let file_id = id_of(&file, op)?;
                let indexed = self
                    .post_json(
                        op,
                        &format!("vector_stores/{vector_store_id}/files"),
                        &json!({ "file_id": file_id }),
                    )
                    .and_then(|_| self.wait_until_indexed(vector_store_id, &file_id));
                discard_on_error(indexed, &file_id, || {
                    self.delete_resource(&ResourceRef::StorageFile(file_id.clone()))
                })?;
                Ok(Created {
                    raw: json!([file_id]),
                    id: file_id,
                })
            }
        }
    }

    fn delete_resource(&self, target: &ResourceRef) -> DeleteOutcome {
        let path = match target {
            ResourceRef::VectorStore(id) => format!("vector_stores/{id}"),
            ResourceRef::Assistant(id) => format!("assistants/{id}"),
            ResourceRef::Thread(id) => format!("threads/{id}"),
            ResourceRef::StorageFile(id) => format!("files/{id}"),
            ResourceRef::VectorStoreFile {
                vector_store_id,
                file_id,
            } => format!("vector_stores/{vector_store_id}/files/{file_id}"),
        };
        let response = match self.authed(self.client.delete(self.url(&path))).send() {
            Ok(response) => response,
            Err(err) => return DeleteOutcome::failed(err.to_string()),
        };
        match Self::checked(target.operation().as_str(), response) {
            Ok(_) => DeleteOutcome::ok(),
            Err(err) => DeleteOutcome::failed(format!("{err:#}")),
        }
    }

    fn update_assistant_vector_stores(
        &self,
        assistant_id: &str,
        vector_store_ids: &[String],
    ) -> Result<Value> {
        self.post_json(
            "updateAssistantVectorStores",
            &format!("assistants/{assistant_id}"),
            &json!({
                "tool_resources": { "file_search": { "vector_store_ids": vector_store_ids } },
            }),
        )
    }

    fn ask(&self, request: &AskRequest<'_>, interrupt: &AtomicBool) -> Result<Reply> {
        if interrupt.load(Ordering::SeqCst) {
            return Ok(Reply {
                text: String::new(),
                status: ReplyStatus::Interrupted,
            });
        }
        let attachments: Vec<Value> = request
            .attachments
            .iter()
            .map(|file_id| json!({ "file_id": file_id, "tools": [{ "type": "file_search" }] }))
            .collect();
        let mut message = json!({ "role": "user", "content": request.question });
        if !attachments.is_empty() {
            message["attachments"] = Value::Array(attachments);
        }
        self.post_json(
            "createMessage",
            &format!("threads/{}/messages", request.thread_id),
            &message,
        )?;

        let response = self
            .authed(
                self.client
                    .post(self.url(&format!("threads/{}/runs", request.thread_id))),
            )
            .json(&json!({ "assistant_id": request.assistant_id, "stream": true }))
            .send()
            .context("run request failed")?;
        let response = Self::checked("createRun", response)?;

        let streamed = read_run_stream(BufReader::new(response), interrupt)?;
        if !streamed.interrupted {
            return Ok(Reply {
                text: streamed.text,
                status: ReplyStatus::Completed,
            });
        }
        if let Some(run_id) = &streamed.run_id {
            self.cancel_run(request.thread_id, run_id);
        }
        Ok(Reply {
            text: streamed.text,
            status: ReplyStatus::Interrupted,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct RunStream {
    text: String,
    run_id: Option<String>,
    interrupted: bool,
}

/// Read SSE events until `[DONE]`, end of stream, or an interrupt. An
/// interrupt only stops the read once the run id is known, so the run can
/// be cancelled.
fn read_run_stream(reader: impl BufRead, interrupt: &AtomicBool) -> Result<RunStream> {
    let mut out = RunStream::default();
    let mut event = String::new();
    for line in reader.lines() {
        if out.run_id.is_some() && interrupt.load(Ordering::SeqCst) {
            out.interrupted = true;
            return Ok(out);
        }
        let line = line.context("failed to read run stream")?;
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim().to_string();
            continue;
        }
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(_) => continue,
        };
        match event.as_str() {
            "thread.run.created" => {
                out.run_id = payload.get("id").and_then(Value::as_str).map(ToOwned::to_owned);
            }
            "thread.message.delta" => out.text.push_str(&delta_text(&payload)),
            "thread.run.failed" | "thread.run.expired" | "error" => {
                let reason = payload
                    .get("last_error")
                    .or_else(|| payload.get("message"))
                    .cloned()
                    .unwrap_or(payload.clone());
                anyhow::bail!("assistant run {event}: {reason}");
            }
            _ => {}
        }
    }
    Ok(out)
}
