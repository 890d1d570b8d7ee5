//! Read-only git inspection for workspace snapshots.
//!
//! Snapshots must capture repository state without mutating it, so this
//! wrapper exposes only observation commands. Nothing here writes to the
//! repository.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Read-only view of a git working tree.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current branch name, or `HEAD` when detached.
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Current HEAD commit SHA.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Paths tracked at HEAD plus untracked non-ignored files, sorted and
    /// deduplicated.
    #[instrument(skip_all)]
    pub fn inventory_paths(&self) -> Result<Vec<String>> {
        let tracked = self.run_capture(&["ls-files"])?;
        let mut paths: Vec<String> = tracked
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        for entry in self.status_porcelain()? {
            if entry.code == "??" {
                paths.push(entry.path);
            }
        }
        paths.sort();
        paths.dedup();
        debug!(count = paths.len(), "workspace inventory");
        Ok(paths)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let entry = parse_status_line("?? notes.txt").expect("parse");
        assert_eq!(entry.code, "??");
        assert_eq!(entry.path, "notes.txt");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let entry = parse_status_line("R  old.ls -> new.ls").expect("parse");
        assert_eq!(entry.path, "new.ls");
    }

    #[test]
    fn inventory_includes_tracked_and_untracked() {
        let repo = TestRepo::new().expect("repo");
        repo.write_file("untracked.txt", "later\n").expect("write");

        let workspace = Workspace::new(repo.root());
        let paths = workspace.inventory_paths().expect("inventory");
        assert!(paths.contains(&"src/release.ls".to_string()));
        assert!(paths.contains(&"untracked.txt".to_string()));
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn head_sha_and_branch_are_reported() {
        let repo = TestRepo::new().expect("repo");
        let workspace = Workspace::new(repo.root());
        let sha = workspace.head_sha().expect("sha");
        assert_eq!(sha.len(), 40);
        let branch = workspace.current_branch().expect("branch");
        assert!(!branch.is_empty());
    }
}
