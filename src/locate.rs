//! Resource discovery in a scaffold folder and file-name parsing.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::FileSplitter;
use crate::error::ApplyError;

/// A file found under a resource-kind folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub path: PathBuf,
    pub file_name: String,
}

impl ResourceFile {
    pub fn stem(&self) -> &str {
        file_stem(&self.file_name)
    }

    pub fn read(&self) -> Result<Vec<u8>, ApplyError> {
        std::fs::read(&self.path).map_err(|e| ApplyError::io(&self.path, e))
    }

    /// Read as UTF-8 text; invalid UTF-8 is an `Io` error.
    pub fn read_to_string(&self) -> Result<String, ApplyError> {
        std::fs::read_to_string(&self.path).map_err(|e| ApplyError::io(&self.path, e))
    }
}

/// Pattern for the JSON-definition resource kinds.
pub fn is_json_file(file_name: &str) -> bool {
    file_name.len() > ".json".len() && file_name.ends_with(".json")
}

/// Recursively collect files under `folder` whose base name satisfies `matches`.
///
/// Returns `Ok(None)` when `folder` is missing or not a directory: the caller
/// treats the whole kind as absent. Entries are visited in lexical order per
/// directory. Symlinked directories are not followed.
pub fn locate_files<F>(folder: &Path, matches: F) -> Result<Option<Vec<ResourceFile>>, ApplyError>
where
    F: Fn(&str) -> bool,
{
    match std::fs::metadata(folder) {
        Ok(meta) if meta.is_dir() => {}
        _ => {
            debug!(folder = %folder.display(), "Folder absent, nothing to locate");
            return Ok(None);
        }
    }

    fn visit_dir<F>(dir: &Path, matches: &F, results: &mut Vec<ResourceFile>) -> Result<(), ApplyError>
    where
        F: Fn(&str) -> bool,
    {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| ApplyError::io(dir, e))? {
            let entry = entry.map_err(|e| ApplyError::io(dir, e))?;
            // file_type does not follow symlinks, so linked directories are never entered
            let file_type = entry.file_type().map_err(|e| ApplyError::io(entry.path(), e))?;
            entries.push((entry.path(), file_type.is_dir()));
        }
        entries.sort();

        for (path, is_dir) in entries {
            if is_dir {
                visit_dir(&path, matches, results)?;
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if matches(&file_name) {
                debug!(path = %path.display(), "Located resource file");
                results.push(ResourceFile { path, file_name });
            }
        }
        Ok(())
    }

    let mut results = Vec::new();
    visit_dir(folder, &matches, &mut results)?;
    Ok(Some(results))
}

/// File name without its final extension.
pub fn file_stem(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

/// Split a two-part identifier such as `name__version`.
///
/// Returns `None` unless the split yields exactly two segments.
pub fn split_identifier(stem: &str, splitter: FileSplitter) -> Option<(String, String)> {
    let parts: Vec<&str> = stem.split(splitter.token()).collect();
    match parts.as_slice() {
        [first, second] => Some((first.to_string(), second.to_string())),
        _ => None,
    }
}
