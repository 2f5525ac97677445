use crate::chat::paths::ChatPaths;
use crate::chat::util::{with_file_lock, write_atomic};
use crate::error::ChatLedgerError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

static WRITE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_file: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_paths(paths: &ChatPaths) -> Self {
        Self::new(paths.config_file.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<ProjectConfig> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(ProjectConfig::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        if raw.trim().is_empty() {
            return Ok(ProjectConfig::default());
        }
        serde_json::from_str(&raw).map_err(|err| {
            ChatLedgerError::InvalidConfig(format!("{}: {err}", self.path.display())).into()
        })
    }

    fn update(&self, apply: impl FnOnce(&mut ProjectConfig)) -> Result<ProjectConfig> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        with_file_lock(&self.path, || {
            let mut config = self.load()?;
            apply(&mut config);
            let data = serde_json::to_string_pretty(&config)?;
            write_atomic(&self.path, &format!("{data}\n"))?;
            Ok(config)
        })
    }

    pub fn set_name(&self, name: &str) -> Result<ProjectConfig> {
        let name = name.trim().to_string();
        self.update(|config| config.name = Some(name))
    }

    pub fn set_default_transcript_path(&self, path: &str) -> Result<ProjectConfig> {
        let path = path.trim().to_string();
        self.update(|config| config.chat_file = Some(path))
    }
}
