use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSettings {
    pub model: String,
    pub name: String,
    pub instructions: String,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            name: "Helpful Assistant".to_string(),
            instructions: "You are a helpful assistant.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    pub max_links: u64,
    pub fetch_timeout_secs: u64,
    pub max_page_chars: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_links: 20,
            fetch_timeout_secs: 5,
            max_page_chars: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            request_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatSettings {
    pub assistant: AssistantSettings,
    pub search: SearchSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialChatSettings {
    assistant: Option<AssistantSettings>,
    search: Option<SearchSettings>,
    remote: Option<RemoteSettings>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &ChatSettings) -> Result<()> {
    if cfg.assistant.model.trim().is_empty() {
        return Err(anyhow!("invalid assistant model: cannot be empty"));
    }
    if !(1..=20).contains(&cfg.search.max_links) {
        return Err(anyhow!("invalid search max links: require 1 <= max_links <= 20"));
    }
    if cfg.search.fetch_timeout_secs == 0 {
        return Err(anyhow!("invalid search fetch timeout: must be >= 1 second"));
    }
    if cfg.remote.request_timeout_secs == 0 {
        return Err(anyhow!("invalid request timeout: must be >= 1 second"));
    }
    if cfg.remote.base_url.trim().is_empty() {
        return Err(anyhow!("invalid remote base url: cannot be empty"));
    }
    Ok(())
}

fn resolve_settings_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATLEDGER_SETTINGS_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".config").join("chatledger").join("settings.toml"))
}

fn merge_toml(base: &mut ChatSettings, raw: &str) -> Result<()> {
    let parsed: PartialChatSettings = toml::from_str(raw)?;
    if let Some(assistant) = parsed.assistant {
        base.assistant = assistant;
    }
    if let Some(search) = parsed.search {
        base.search = search;
    }
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    Ok(())
}

fn merge_file_settings(base: &mut ChatSettings) -> Result<()> {
    let Some(path) = resolve_settings_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse settings {}: {err}", path.display()))
}

pub fn load_settings() -> Result<ChatSettings> {
    let mut cfg = ChatSettings::default();
    merge_file_settings(&mut cfg)?;

    cfg.assistant.model = env_or_string("CHATLEDGER_MODEL", &cfg.assistant.model);
    cfg.assistant.name = env_or_string("CHATLEDGER_ASSISTANT_NAME", &cfg.assistant.name);
    cfg.assistant.instructions =
        env_or_string("CHATLEDGER_INSTRUCTIONS", &cfg.assistant.instructions);
    cfg.search.max_links = env_or_u64("CHATLEDGER_SEARCH_MAX_LINKS", cfg.search.max_links);
    cfg.search.fetch_timeout_secs = env_or_u64(
        "CHATLEDGER_SEARCH_FETCH_TIMEOUT_SECS",
        cfg.search.fetch_timeout_secs,
    );
    cfg.remote.request_timeout_secs = env_or_u64(
        "CHATLEDGER_REQUEST_TIMEOUT_SECS",
        cfg.remote.request_timeout_secs,
    );
    cfg.remote.base_url = env_or_string("CHATLEDGER_OPENAI_BASE_URL", &cfg.remote.base_url);

    validate(&cfg)?;
    Ok(cfg)
}
