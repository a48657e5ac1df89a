//! File tier of the retention store.
//!
//! Chunks of one report are written as JSON lines to
//! `<chunks_dir>/<team>/<report_id>.jsonl`. After each write the team
//! directory is pruned to the most recently modified files, as many as the
//! [`RetentionPolicy`] keeps.

use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

use allure_rag_core::models::Chunk;
use allure_rag_core::retention::RetentionPolicy;
use allure_rag_core::{RagError, Result};

const EXTENSION: &str = "jsonl";

pub struct ChunkFileStore {
    root: PathBuf,
    policy: RetentionPolicy,
}

impl ChunkFileStore {
    pub fn new(root: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    /// Directory of `team`. Separators in the name are percent-encoded, so
    /// `web/api` lives in `web%2Fapi`.
    pub fn team_dir(&self, team: &str) -> PathBuf {
        self.root.join(safe_file_name(team))
    }

    /// Write the chunk file for `(team, report_id)` and evict stale files.
    ///
    /// Writing an existing report id overwrites its file, which also makes it
    /// the most recent one. Returns the path of the written file.
    pub fn persist_and_evict(&self, chunks: &[Chunk], team: &str, report_id: &str) -> Result<PathBuf> {
        check_path_component("team", team, true)?;
        check_path_component("report id", report_id, false)?;

        let dir = self.team_dir(team);
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.{}", report_id, EXTENSION));
        write_chunks(&path, chunks)?;
        tracing::debug!(path = %path.display(), chunks = chunks.len(), "wrote chunk file");

        for evicted in self.evict(team)? {
            tracing::info!(team, path = %evicted.display(), "evicted chunk file");
        }
        Ok(path)
    }

    /// Delete every chunk file of `team` beyond the retention window.
    pub fn evict(&self, team: &str) -> Result<Vec<PathBuf>> {
        let files = self.report_files(team)?;
        let (_, evicted) = self.policy.split(files, |(path, mtime)| (*mtime, path.clone()));

        let mut removed = Vec::with_capacity(evicted.len());
        for (path, _) in evicted {
            fs::remove_file(&path)?;
            removed.push(path);
        }
        Ok(removed)
    }

    /// Report ids currently stored for `team`, newest first.
    pub fn report_ids(&self, team: &str) -> Result<Vec<String>> {
        let mut files = self.report_files(team)?;
        files.sort_by(|a, b| (b.1, &b.0).cmp(&(a.1, &a.0)));
        Ok(files
            .into_iter()
            .filter_map(|(path, _)| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .collect())
    }

    fn report_files(&self, team: &str) -> Result<Vec<(PathBuf, SystemTime)>> {
        let dir = self.team_dir(team);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let metadata = entry.metadata()?;
            if metadata.is_file() && is_chunk_file(&path) {
                files.push((path, metadata.modified()?));
            }
        }
        Ok(files)
    }
}

/// Reject values that cannot name a file of their own: empty, `.` and `..`.
///
/// With `allow_separators` unset, `/` and `\` are rejected too.
pub fn check_path_component(what: &str, value: &str, allow_separators: bool) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RagError::validation(format!("{} must not be empty", what)));
    }
    if value == "." || value == ".." || (!allow_separators && value.contains(['/', '\\'])) {
        return Err(RagError::validation(format!(
            "{} is not a valid file name: {}",
            what, value
        )));
    }
    Ok(())
}

/// Single path component for `value`: `%`, `/`, `\` and control characters
/// are percent-encoded, so distinct values never map to the same name and
/// the result never leaves its parent directory.
pub fn safe_file_name(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' | '/' | '\\' | '\0'..='\x1f' => out.push_str(&format!("%{:02X}", c as u32)),
            _ => out.push(c),
        }
    }
    match out.as_str() {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => out,
    }
}

fn is_chunk_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(EXTENSION)
}

fn write_chunks(path: &Path, chunks: &[Chunk]) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for chunk in chunks {
        serde_json::to_writer(&mut writer, chunk)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn read_chunk_file(path: &Path, out: &mut Vec<Chunk>) -> Result<()> {
    let reader = BufReader::new(fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(())
}

/// Load chunks from a single chunk file or from every `*.jsonl` file under a
/// directory, visited in sorted path order.
pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    if !path.is_dir() {
        read_chunk_file(path, &mut chunks)?;
        return Ok(chunks);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_chunk_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(RagError::validation(format!(
            "no .{} files found in {}",
            EXTENSION,
            path.display()
        )));
    }

    for file in &files {
        read_chunk_file(file, &mut chunks)?;
    }
    Ok(chunks)
}
