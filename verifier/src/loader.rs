//! Session log discovery and loading. Each session's stream lives in a
//! file whose stem is the session id (`SENDER_TARGET`), in whatever log
//! framing the scanner tolerates.

use crate::error::VerifyResult;
use crate::filter::MsgTypeFilter;
use fixlab_common::scan::Scanner;
use fixlab_common::types::entry::number_entries;
use fixlab_common::{LogEntry, SessionKey};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Union of session keys found across the given directories, sorted by
/// ascending id. Directories that do not exist contribute nothing; files
/// whose stem is not a `SENDER_TARGET` id are ignored.
pub fn discover_sessions<'a>(
    dirs: impl IntoIterator<Item = &'a Path>,
) -> VerifyResult<Vec<SessionKey>> {
    let mut keys = BTreeSet::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = SessionKey::from_id(stem) {
                keys.insert(key);
            }
        }
    }
    let mut keys: Vec<SessionKey> = keys.into_iter().collect();
    keys.sort_by_key(SessionKey::id);
    Ok(keys)
}

/// The file holding one session's stream inside `dir`, if present.
pub fn session_file(dir: &Path, key: &SessionKey) -> VerifyResult<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let id = key.id();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.file_stem().and_then(|s| s.to_str()) == Some(id.as_str()) {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Scan, parse and filter one stream, assigning dense line numbers.
pub fn load_entries(
    path: &Path,
    scanner: &Scanner,
    filter: &MsgTypeFilter,
) -> VerifyResult<Vec<LogEntry>> {
    let mut messages = Vec::new();
    for raw in scanner.scan_file(path)? {
        let message = raw?.to_message();
        if filter.accepts(&message) {
            messages.push(message);
        }
    }
    let entries = number_entries(messages);
    debug!(path = %path.display(), count = entries.len(), "Loaded session stream");
    Ok(entries)
}

/// Load a session's stream from `dir`, or an empty stream when the
/// session has no file there.
pub fn load_session(
    dir: &Path,
    key: &SessionKey,
    scanner: &Scanner,
    filter: &MsgTypeFilter,
) -> VerifyResult<Vec<LogEntry>> {
    match session_file(dir, key)? {
        Some(path) => load_entries(&path, scanner, filter),
        None => Ok(Vec::new()),
    }
}
