//! Output history reader
//!
//! Presents the outputs directory as a newest-first listing: flat files plus
//! one level of date-named subdirectories. Creation time comes from the
//! `YYYY-MM-DD_HH-MM-SS` filename prefix the worker stamps on outputs,
//! falling back to filesystem mtime. A sidecar `metadata.db` (a sled tree
//! keyed by filename, values JSON) is joined in when present; any failure to
//! read it degrades to `metadata: null` without affecting the item set.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Sidecar store name inside the outputs directory
const METADATA_DB: &str = "metadata.db";

/// Filename prefix layout carrying the creation time
const TIMESTAMP_PREFIX: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_PREFIX_LEN: usize = 19;

/// One historical output
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub filename: String,
    pub relative_path: String,
    pub created_epoch_seconds: i64,
    pub metadata: Option<Value>,
}

/// One page of history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryEntry>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub page: usize,
    pub total_pages: usize,
}

/// Filesystem-backed history
pub struct HistoryReader {
    outputs_dir: PathBuf,
}

impl HistoryReader {
    pub fn new(outputs_dir: PathBuf) -> Self {
        Self { outputs_dir }
    }

    /// List outputs newest-first. The limit is clamped to at least 1; the
    /// offset pages through the full set.
    pub fn load(&self, limit: usize, offset: usize) -> HistoryPage {
        let limit = limit.max(1);
        let mut entries = self.scan();
        entries.sort_by(|a, b| {
            b.created_epoch_seconds
                .cmp(&a.created_epoch_seconds)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        let total = entries.len();
        let total_pages = total.div_ceil(limit).max(1);
        let page = offset / limit + 1;

        let mut items: Vec<HistoryEntry> =
            entries.into_iter().skip(offset).take(limit).collect();
        self.join_metadata(&mut items);

        HistoryPage {
            items,
            total,
            limit,
            offset,
            page,
            total_pages,
        }
    }

    /// Walk the outputs root: flat files plus files one level down in
    /// date-named subdirectories.
    fn scan(&self) -> Vec<HistoryEntry> {
        let mut entries = Vec::new();
        let Ok(root) = std::fs::read_dir(&self.outputs_dir) else {
            return entries;
        };
        for item in root.flatten() {
            let path = item.path();
            if path.is_file() {
                push_entry(&mut entries, &path, None);
            } else if path.is_dir() {
                let dir_name = item.file_name();
                let Some(dir_name) = dir_name.to_str() else {
                    continue;
                };
                if !is_date_dir(dir_name) {
                    continue;
                }
                let Ok(children) = std::fs::read_dir(&path) else {
                    continue;
                };
                for child in children.flatten() {
                    let child_path = child.path();
                    if child_path.is_file() {
                        push_entry(&mut entries, &child_path, Some(dir_name));
                    }
                }
            }
        }
        entries
    }

    /// Fill in metadata for the selected page. A missing or unreadable store
    /// leaves every entry at null.
    fn join_metadata(&self, items: &mut [HistoryEntry]) {
        let db_path = self.outputs_dir.join(METADATA_DB);
        if !db_path.exists() {
            return;
        }
        let db = match sled::open(&db_path) {
            Ok(db) => db,
            Err(e) => {
                tracing::warn!(path = %db_path.display(), error = %e, "metadata store unreadable");
                return;
            }
        };
        for item in items {
            item.metadata = match db.get(item.filename.as_bytes()) {
                Ok(Some(raw)) => serde_json::from_slice(&raw).ok(),
                Ok(None) => None,
                Err(e) => {
                    tracing::debug!(filename = %item.filename, error = %e, "metadata row unreadable");
                    None
                }
            };
        }
    }
}

fn push_entry(entries: &mut Vec<HistoryEntry>, path: &Path, subdir: Option<&str>) {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    if filename.starts_with('.') || filename == METADATA_DB {
        return;
    }
    let relative_path = match subdir {
        Some(dir) => format!("{}/{}", dir, filename),
        None => filename.to_string(),
    };
    entries.push(HistoryEntry {
        filename: filename.to_string(),
        relative_path,
        created_epoch_seconds: creation_time(path, filename),
        metadata: None,
    });
}

/// `YYYY-MM-DD`, the layout the worker uses for daily output directories
fn is_date_dir(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

/// Parse the timestamp prefix, else fall back to the file's mtime
fn creation_time(path: &Path, filename: &str) -> i64 {
    if filename.len() >= TIMESTAMP_PREFIX_LEN {
        if let Ok(stamp) =
            NaiveDateTime::parse_from_str(&filename[..TIMESTAMP_PREFIX_LEN], TIMESTAMP_PREFIX)
        {
            return stamp.and_utc().timestamp();
        }
    }
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
