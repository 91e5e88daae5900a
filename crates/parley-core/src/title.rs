//! Best-effort conversation titles.
//!
//! The agent runtime persists conversation logs as JSONL under a fixed
//! subpath of each session home. A title is the first user-authored text
//! message found there, trimmed and truncated. Extraction is cosmetic:
//! every failure mode collapses to `None`, never an error.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

/// Where the runtime keeps conversation logs, relative to a session home.
/// The core never creates or manages this tree; it only reads it.
const CONVERSATION_LOG_SUBPATH: &str = ".claude/projects";

const TITLE_MAX_CHARS: usize = 80;

/// Derive a title from the persisted conversation log for
/// `remote_session_id` under `home_dir`. Returns `None` on any I/O error,
/// missing file, or absence of a textual first message.
pub fn extract_title(home_dir: &Path, remote_session_id: &str) -> Option<String> {
    // The id comes from the runtime; refuse anything that could name a
    // path outside the log tree.
    if remote_session_id.is_empty()
        || !remote_session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return None;
    }

    let root = home_dir.join(CONVERSATION_LOG_SUBPATH);
    let log_path = find_session_log(&root, remote_session_id)?;
    first_user_text(&log_path)
}

/// A fallback title for sessions whose log yields nothing.
pub fn fallback_title(created_at: DateTime<Utc>) -> String {
    format!("Conversation from {}", created_at.format("%Y-%m-%d %H:%M"))
}

/// Logs live one level down, in a per-project subdirectory we do not know
/// the name of; scan for `{id}.jsonl`.
fn find_session_log(root: &Path, remote_session_id: &str) -> Option<PathBuf> {
    let file_name = format!("{remote_session_id}.jsonl");
    for entry in fs::read_dir(root).ok()?.flatten() {
        let candidate = entry.path().join(&file_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn first_user_text(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    let reader = BufReader::new(file);

    for line in reader.lines() {
        let line = line.ok()?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        if value.get("type").and_then(|v| v.as_str()) != Some("user") {
            continue;
        }
        if let Some(text) = message_text(&value) {
            let text = text.trim();
            if !text.is_empty() {
                return Some(truncate_chars(text, TITLE_MAX_CHARS));
            }
        }
    }

    None
}

/// User message content is either a plain string or a list of content
/// blocks; take the first text block in the latter case.
fn message_text(value: &serde_json::Value) -> Option<String> {
    let content = value.get("message")?.get("content")?;
    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => blocks.iter().find_map(|block| {
            if block.get("type").and_then(|v| v.as_str()) == Some("text") {
                block
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            } else {
                None
            }
        }),
        _ => None,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
