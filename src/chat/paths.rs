use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ChatPaths {
    pub workdir: PathBuf,
    pub ledger_file: PathBuf,
    pub config_file: PathBuf,
    pub tmp_dir: PathBuf,
    pub commands_dir: PathBuf,
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

impl ChatPaths {
    pub fn rooted_at(workdir: &Path) -> Self {
        Self {
            workdir: workdir.to_path_buf(),
            ledger_file: workdir.join("log").join("ai.json"),
            config_file: workdir.join("assistant.config.json"),
            tmp_dir: workdir.join(".tmp"),
            commands_dir: workdir.join("commands"),
        }
    }

    pub fn relative_to_workdir(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.workdir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn resolve_in_workdir(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}

pub fn resolve_paths() -> Result<ChatPaths> {
    let cwd = env::current_dir().context("current directory could not be resolved")?;
    let workdir = env_or_default_path("CHATLEDGER_HOME", cwd);
    let defaults = ChatPaths::rooted_at(&workdir);

    Ok(ChatPaths {
        ledger_file: env_or_default_path("CHATLEDGER_LEDGER_FILE", defaults.ledger_file),
        config_file: env_or_default_path("CHATLEDGER_CONFIG_FILE", defaults.config_file),
        tmp_dir: env_or_default_path("CHATLEDGER_TMP_DIR", defaults.tmp_dir),
        commands_dir: env_or_default_path("CHATLEDGER_COMMANDS_DIR", defaults.commands_dir),
        workdir,
    })
}

#[cfg(test)]
mod tests {
    use super::ChatPaths;
    use std::path::{Path, PathBuf};

    #[test]
    fn rooted_layout_places_ledger_under_log_dir() {
        let paths = ChatPaths::rooted_at(Path::new("/work"));
        assert_eq!(paths.ledger_file, PathBuf::from("/work/log/ai.json"));
        assert_eq!(
            paths.config_file,
            PathBuf::from("/work/assistant.config.json")
        );
    }

    #[test]
    fn relative_to_workdir_strips_prefix_only_when_nested() {
        let paths = ChatPaths::rooted_at(Path::new("/work"));
        assert_eq!(
            paths.relative_to_workdir(Path::new("/work/chats/a.txt")),
            PathBuf::from("chats/a.txt")
        );
        assert_eq!(
            paths.relative_to_workdir(Path::new("/elsewhere/a.txt")),
            PathBuf::from("/elsewhere/a.txt")
        );
    }
}
