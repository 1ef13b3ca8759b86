//! Manuscript discovery and segmentation
//!
//! Splitting is paragraph-aware: blank-line-delimited paragraphs are atomic
//! units, and a configurable character overlap is carried from the tail of
//! each chunk into the head of the next so cross-boundary context survives
//! segmentation. Lengths are measured in characters, not bytes.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::analysis::types::ChunkPayload;

/// Chunks built from a set of manuscript files, plus per-file read errors
///
/// An unreadable file is recorded here and does not abort the run; the
/// remaining files are still segmented.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub chunks: Vec<ChunkPayload>,
    pub errors: Vec<String>,
}

/// Return the sorted list of `.txt` files under `directory`, recursively
pub fn read_text_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_text_files(directory, &mut files)
        .with_context(|| format!("Failed to scan directory: {}", directory.display()))?;
    files.sort();
    Ok(files)
}

fn collect_text_files(directory: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_text_files(&path, files)?;
        } else if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("txt") {
            files.push(path);
        }
    }
    Ok(())
}

/// Split `text` into chunks of at most `max_chars` characters on paragraph
/// boundaries, carrying `overlap` characters between consecutive chunks.
///
/// A single paragraph longer than `max_chars` is emitted as its own chunk.
/// Deterministic: the same input always yields the same boundaries. Empty
/// input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    // Overlap carried from the previous chunk; counts toward the limit
    let mut carry = String::new();
    let mut current_len = 0usize;

    for paragraph in text.split("\n\n") {
        let paragraph_len = paragraph.chars().count();
        if current_len + paragraph_len + 2 > max_chars && !buffer.is_empty() {
            let chunk = assemble_chunk(&carry, &buffer);
            carry = tail_chars(&chunk, overlap).to_string();
            chunks.push(chunk);

            buffer.clear();
            buffer.push(paragraph);
            current_len = carry_len(&carry) + paragraph_len;
        } else {
            buffer.push(paragraph);
            current_len += paragraph_len + 2;
        }
    }

    if !buffer.is_empty() {
        chunks.push(assemble_chunk(&carry, &buffer));
    }

    chunks
}

fn assemble_chunk(carry: &str, paragraphs: &[&str]) -> String {
    let body = paragraphs.join("\n\n");
    if carry.is_empty() {
        body
    } else {
        format!("{}\n\n{}", carry, body)
    }
}

fn carry_len(carry: &str) -> usize {
    if carry.is_empty() {
        0
    } else {
        carry.chars().count() + 2
    }
}

/// Last `n` characters of `s`, on a char boundary
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Read and segment every file, skipping unreadable ones
pub fn build_chunks(paths: &[PathBuf], max_chars: usize, overlap: usize) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    for path in paths {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                outcome.errors.push(format!("{}: {}", path.display(), e));
                continue;
            }
        };

        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("chunk");

        for (order, piece) in chunk_text(&text, max_chars, overlap).into_iter().enumerate() {
            let suffix = Uuid::new_v4().simple().to_string();
            outcome.chunks.push(ChunkPayload {
                identifier: format!("{}-{}-{}", stem, order, &suffix[..6]),
                source_path: path.clone(),
                order,
                text: piece,
            });
        }
    }

    outcome
}
