use std::{path::Path, process::Command};

use crate::errors::ReplayError;

/// Placeholder revision for repositories that were not provided.
pub const UNKNOWN_REVISION: &str = "unknown";

/// Commit checked out in the git repository at `repo_dir`.
pub fn git_head(repo_dir: &Path) -> Result<String, ReplayError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(["rev-parse", "HEAD"])
        .output()?;
    if !output.status.success() {
        return Err(ReplayError::Bundle(format!(
            "git rev-parse HEAD failed in {}: {}",
            repo_dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like [`git_head`], but tolerates a missing repository.
pub fn resolve(repo_dir: Option<&Path>) -> Result<String, ReplayError> {
    match repo_dir {
        Some(dir) => git_head(dir),
        None => Ok(UNKNOWN_REVISION.to_string()),
    }
}
