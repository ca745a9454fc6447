use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};

pub const SUPPORTED_EXT: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Dependency caches are never worth scanning for user images.
const SKIP_DIRS: &[&str] = &["node_modules", "target"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXT.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden_or_skipped(entry: &DirEntry) -> bool {
    match entry.file_name().to_str() {
        Some(name) => {
            name.starts_with('.') || (entry.file_type().is_dir() && SKIP_DIRS.contains(&name))
        }
        None => false,
    }
}

/// Resolves user-selected files and directories into a flat list of supported
/// image files. Directories are walked recursively; hidden entries and
/// dependency-cache directories are skipped; per-entry walk errors are logged
/// and the scan continues. Fails only when a non-empty selection yields not a
/// single resolvable input path. Result ordering is unspecified.
pub async fn expand_selection(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || expand_selection_blocking(&paths))
        .await
        .map_err(|e| Error::Selection(format!("scan task failed: {e}")))?
}

fn expand_selection_blocking(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut resolved = 0usize;

    for path in paths {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) => {
                log::warn!("Cannot stat {}: {e}", path.display());
                continue;
            }
        };
        resolved += 1;

        if meta.is_file() {
            if is_supported_image(path) {
                found.push(path.clone());
            }
            continue;
        }

        for entry in WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_or_skipped(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {e}", path.display());
                    continue;
                }
            };
            if entry.file_type().is_file() && is_supported_image(entry.path()) {
                found.push(entry.into_path());
            }
        }
    }

    if resolved == 0 && !paths.is_empty() {
        return Err(Error::Selection(
            "none of the selected paths could be read".to_string(),
        ));
    }
    Ok(found)
}
