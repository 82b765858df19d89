//! Working directory for spreadsheets in flight.
//!
//! Files are addressed by a *handle*: a bare file name of the form
//! `<uuid>_<sanitized original name>`, optionally prefixed with `processed_`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::{Result, SheetmailError};
use crate::sheet::patcher::OUTPUT_PREFIX;

/// A file created in the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFile {
    pub handle: String,
    pub path: PathBuf,
    /// Attachment name as it appeared in the message.
    pub original_name: String,
}

/// Root of the working storage.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    /// Use `root` as the working directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| SheetmailError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` under a fresh, collision-free name derived from `original_name`.
    pub fn write_new(&self, original_name: &str, data: &[u8]) -> Result<WorkFile> {
        let handle = format!(
            "{}_{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(original_name, 150)
        );
        let path = self.root.join(&handle);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| SheetmailError::io(&path, e))?;
        let written = file.write_all(data).and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(SheetmailError::io(&path, e));
        }

        tracing::debug!(handle = %handle, bytes = data.len(), "Stored working file");
        Ok(WorkFile {
            handle,
            path,
            original_name: original_name.to_string(),
        })
    }

    /// Path for `handle` if the handle is well formed. The file may not exist.
    pub fn path_for(&self, handle: &str) -> Result<PathBuf> {
        let bad = handle.is_empty()
            || handle.contains(['/', '\\', '\0'])
            || handle.contains("..");
        if bad {
            return Err(SheetmailError::NotFound(format!("no working file '{handle}'")));
        }
        Ok(self.root.join(handle))
    }

    /// Path of an existing working file.
    pub fn resolve(&self, handle: &str) -> Result<PathBuf> {
        let path = self.path_for(handle)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(SheetmailError::NotFound(format!("no working file '{handle}'")))
        }
    }

    /// Handle of a path inside this directory.
    pub fn handle_of(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(|p| p.to_str())
            .filter(|s| !s.contains(['/', '\\']))
            .map(str::to_string)
    }

    /// Delete a working file. Returns `false` if it was already gone.
    pub fn remove(&self, handle: &str) -> Result<bool> {
        let path = self.path_for(handle)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SheetmailError::io(&path, e)),
        }
    }

    /// Delete working files last modified more than `max_age` ago.
    ///
    /// Returns the number of files removed. Files that vanish mid-sweep are ignored.
    pub fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let entries = std::fs::read_dir(&self.root).map_err(|e| SheetmailError::io(&self.root, e))?;
        let mut removed = 0;

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to sweep working file");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, dir = %self.root.display(), "Swept stale working files");
        }
        Ok(removed)
    }
}

/// User-facing file name for a handle: the uuid segment is dropped.
///
/// `3f2a…_WS-12.xlsx` → `WS-12.xlsx`, `processed_3f2a…_WS-12.xlsx` → `processed_WS-12.xlsx`.
pub fn display_name(handle: &str) -> String {
    let (prefix, rest) = match handle.strip_prefix(OUTPUT_PREFIX) {
        Some(rest) => (OUTPUT_PREFIX, rest),
        None => ("", handle),
    };
    let name = match rest.split_once('_') {
        Some((id, name)) if id.len() == 32 && id.bytes().all(|b| b.is_ascii_hexdigit()) => name,
        _ => rest,
    };
    format!("{prefix}{name}")
}

/// Media type to announce for a spreadsheet file name.
pub fn spreadsheet_media_type(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".xlsm") {
        "application/vnd.ms-excel.sheet.macroEnabled.12"
    } else if lower.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else {
        "application/octet-stream"
    }
}

/// Sanitize a string for use as a file name.
///
/// Replaces invalid characters with `_`, collapses runs of dots and
/// truncates to `max_len` characters.
pub fn sanitize_file_name(s: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_len));
    let mut prev_dot = false;
    for c in s.chars() {
        let c = if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
            c
        } else {
            '_'
        };
        if c == '.' && prev_dot {
            continue;
        }
        prev_dot = c == '.';
        out.push(c);
        if out.chars().count() >= max_len {
            break;
        }
    }

    if out.is_empty() || out == "." {
        "attachment".to_string()
    } else {
        out
    }
}
