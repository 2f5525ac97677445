use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, Output};

fn run_git(workdir: &Path, args: &[&str]) -> Result<Output> {
    let bin = which::which("git").context("git binary not found in PATH")?;
    let out = Command::new(&bin)
        .args(args)
        .current_dir(workdir)
        .output()
        .with_context(|| format!("failed to run `git {}`", args.join(" ")))?;
    if !out.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(out)
}

pub fn tracked_files(workdir: &Path) -> Result<Vec<String>> {
    let out = run_git(workdir, &["ls-files", "-z"])?;
    Ok(out
        .stdout
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect())
}

pub fn head_commit(workdir: &Path) -> Option<String> {
    let out = run_git(workdir, &["rev-parse", "HEAD"]).ok()?;
    let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}
