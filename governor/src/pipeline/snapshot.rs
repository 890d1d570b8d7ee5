//! Workspace snapshot stage: pure capture, no decision field.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use tracing::{debug, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::io::workspace::Workspace;
use crate::pipeline::envelope::{Envelope, StageContext, family};

/// Repository head state at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadState {
    pub branch: String,
    pub commit: String,
    pub dirty: bool,
}

/// One file of the workspace inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub size_bytes: u64,
    pub content_hash: String,
}

/// The three surface-language declaration kinds the snapshot indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Goal,
    Policy,
    Capability,
}

/// Source line range of a declaration (1-indexed, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub start_line: u32,
    pub end_line: u32,
}

/// A declaration found in structured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub path: String,
    pub span: LineSpan,
}

/// Snapshot payload: repository state, hashed inventory, declaration index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub head: HeadState,
    pub files: Vec<FileRecord>,
    /// Hash over the ordered `path:content_hash` inventory.
    pub inventory_hash: String,
    pub declarations: Vec<Declaration>,
}

/// Capture the workspace: head/dirty state, deterministic content hashes, and
/// the declaration index. Read-only; the repository is never mutated.
#[instrument(skip_all, fields(run_id = %ctx.run_id))]
pub fn take_snapshot(root: &Path, ctx: &StageContext) -> Result<Envelope<SnapshotPayload>> {
    let workspace = Workspace::new(root);
    let branch = workspace.current_branch()?;
    let commit = workspace.head_sha()?;
    let dirty = !workspace.status_porcelain()?.is_empty();

    let mut files = Vec::new();
    let mut declarations = Vec::new();
    for path in workspace.inventory_paths()? {
        let full = root.join(&path);
        let contents =
            fs::read(&full).with_context(|| format!("read {}", full.display()))?;
        files.push(FileRecord {
            path: path.clone(),
            size_bytes: contents.len() as u64,
            content_hash: format!("{:016x}", xxh3_64(&contents)),
        });
        if path.ends_with(".ls") {
            let text = String::from_utf8_lossy(&contents);
            declarations.extend(scan_declarations(&path, &text));
        }
    }

    let inventory = files
        .iter()
        .map(|file| format!("{}:{}", file.path, file.content_hash))
        .collect::<Vec<_>>()
        .join("\n");
    let inventory_hash = format!("{:016x}", xxh3_64(inventory.as_bytes()));
    debug!(files = files.len(), declarations = declarations.len(), "snapshot captured");

    let payload = SnapshotPayload {
        head: HeadState {
            branch,
            commit,
            dirty,
        },
        files,
        inventory_hash,
        declarations,
    };
    Ok(ctx.envelope(
        family::WORKSPACE_SNAPSHOT,
        Vec::new(),
        json!({ "stage": "workspace_snapshot" }),
        payload,
    ))
}

/// Line scan for the three declaration kinds.
///
/// This is deliberately not a parser: the surface-language grammar lives with
/// its own lexer/parser. The snapshot only needs declaration names and
/// positions for symbol lookup.
fn scan_declarations(path: &str, text: &str) -> Vec<Declaration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"^\s*(goal|policy|capability)\s+(?:"([^"]+)"|([A-Za-z_][A-Za-z0-9_-]*))"#)
            .expect("declaration pattern compiles")
    });

    let mut declarations = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let Some(captures) = pattern.captures(line) else {
            continue;
        };
        let kind = match &captures[1] {
            "goal" => DeclarationKind::Goal,
            "policy" => DeclarationKind::Policy,
            _ => DeclarationKind::Capability,
        };
        let name = captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let line_no = (idx + 1) as u32;
        declarations.push(Declaration {
            name,
            kind,
            path: path.to_string(),
            span: LineSpan {
                start_line: line_no,
                end_line: line_no,
            },
        });
    }
    declarations
}
