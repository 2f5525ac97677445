use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRun {
    pub script: PathBuf,
    pub stdout: String,
    pub stderr: String,
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        anyhow::bail!("invalid script name `{name}`: use letters, digits, `-` and `_` only");
    }
    Ok(())
}

pub fn script_path(commands_dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    let path = commands_dir.join(format!("{name}.sh"));
    if !path.is_file() {
        anyhow::bail!("script not found: {}", path.display());
    }
    Ok(path)
}

pub fn run_script(
    workdir: &Path,
    commands_dir: &Path,
    name: &str,
    transcript: &Path,
    ids: &[String],
) -> Result<ScriptRun> {
    let script = script_path(commands_dir, name)?;
    let bash = which::which("bash").context("bash not found in PATH")?;
    let out = Command::new(&bash)
        .arg(&script)
        .arg(transcript)
        .args(ids)
        .current_dir(workdir)
        .output()
        .with_context(|| format!("failed to run `bash {}`", script.display()))?;
    let run = ScriptRun {
        stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        script,
    };
    if !out.status.success() {
        anyhow::bail!(
            "script {} failed with {}\nstdout: {}\nstderr: {}",
            run.script.display(),
            out.status,
            run.stdout.trim(),
            run.stderr.trim()
        );
    }
    Ok(run)
}
