// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source file discovery and the raw-read allow-list.
//!
//! A workspace directory holds the agent's memory sources in a fixed layout:
//! `MEMORY.md` (the long-term note), `memory/` (dated daily notes, `*.md`),
//! and `sessions/` (append-only conversation transcripts, `*.jsonl`).
//! Config `extra_paths` add files or directories on top. The same layout
//! drives both indexing and the `memory_get` allow-list.

use std::path::{Path, PathBuf};

use tracing::warn;

use recall_config::MemoryConfig;
use recall_core::types::SourceKind;

/// A file found on disk during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: SourceKind,
}

/// The set of locations one agent's memory is read from.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    note_file: PathBuf,
    notes_dir: PathBuf,
    sessions_dir: PathBuf,
    extra_paths: Vec<PathBuf>,
    include_notes: bool,
    include_sessions: bool,
}

impl SourceLayout {
    pub fn from_config(workspace: &Path, config: &MemoryConfig) -> Self {
        Self {
            note_file: workspace.join("MEMORY.md"),
            notes_dir: workspace.join("memory"),
            sessions_dir: workspace.join("sessions"),
            extra_paths: config.extra_paths.iter().map(PathBuf::from).collect(),
            include_notes: config.sources.iter().any(|s| s == "notes"),
            include_sessions: config.sources.iter().any(|s| s == "sessions"),
        }
    }

    /// All directories a filesystem watcher should observe.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if self.include_notes {
            if self.note_file.exists() {
                roots.push(self.note_file.clone());
            }
            if self.notes_dir.is_dir() {
                roots.push(self.notes_dir.clone());
            }
        }
        if self.include_sessions && self.sessions_dir.is_dir() {
            roots.push(self.sessions_dir.clone());
        }
        for extra in &self.extra_paths {
            if extra.exists() {
                roots.push(extra.clone());
            }
        }
        roots
    }

    /// Enumerate every indexable file currently on disk.
    ///
    /// Unreadable directories are logged and skipped; discovery never fails
    /// as a whole.
    pub fn discover(&self) -> Vec<DiscoveredFile> {
        let mut found = Vec::new();

        if self.include_notes {
            if self.note_file.is_file() {
                found.push(DiscoveredFile {
                    path: self.note_file.clone(),
                    kind: SourceKind::Note,
                });
            }
            collect_dir(&self.notes_dir, "md", SourceKind::Note, &mut found);
        }
        if self.include_sessions {
            collect_dir(&self.sessions_dir, "jsonl", SourceKind::Session, &mut found);
        }
        for extra in &self.extra_paths {
            if extra.is_file() {
                found.push(DiscoveredFile {
                    path: extra.clone(),
                    kind: SourceKind::Note,
                });
            } else if extra.is_dir() {
                collect_dir(extra, "md", SourceKind::Note, &mut found);
            }
        }

        found.sort_by(|a, b| a.path.cmp(&b.path));
        found.dedup_by(|a, b| a.path == b.path);
        found
    }

    /// Whether `memory_get` may read this path.
    ///
    /// Paths are canonicalized before comparison so `..` segments cannot
    /// escape an allowed directory. Nonexistent paths are never allowed.
    pub fn is_allowed(&self, path: &Path) -> bool {
        let Ok(resolved) = path.canonicalize() else {
            return false;
        };
        if let Ok(note) = self.note_file.canonicalize() {
            if resolved == note {
                return true;
            }
        }
        for dir in [&self.notes_dir, &self.sessions_dir] {
            if let Ok(root) = dir.canonicalize() {
                if resolved.starts_with(&root) {
                    return true;
                }
            }
        }
        for extra in &self.extra_paths {
            if let Ok(root) = extra.canonicalize() {
                if resolved == root || resolved.starts_with(&root) {
                    return true;
                }
            }
        }
        false
    }
}

/// Recursively collect files with the given extension under `dir`.
fn collect_dir(dir: &Path, extension: &str, kind: SourceKind, out: &mut Vec<DiscoveredFile>) {
    if !dir.is_dir() {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "skipping unreadable source directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_dir(&path, extension, kind, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            out.push(DiscoveredFile { path, kind });
        }
    }
}
