use crate::models::Format;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No valid .mzML or .msz files found in the given paths")]
    NoInputs,
}

/// Expands files and directories into a sorted, de-duplicated list of
/// sendable files. Directories are scanned one level deep unless
/// `recursive` is set. Unsupported files and missing paths are skipped
/// with a warning.
pub fn resolve_inputs(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>, DiscoveryError> {
    let mut found = BTreeSet::new();

    for path in paths {
        if path.is_file() {
            if Format::from_path(path).is_some() {
                found.insert(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            let entries = WalkDir::new(path)
                .min_depth(1)
                .max_depth(max_depth)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| match e {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!("Skipping unreadable entry: {}", err);
                        None
                    }
                })
                .filter(is_sendable);

            for entry in entries {
                found.insert(entry.into_path());
            }
        } else {
            warn!("Path does not exist: {}", path.display());
        }
    }

    if found.is_empty() {
        return Err(DiscoveryError::NoInputs);
    }
    Ok(found.into_iter().collect())
}

fn is_sendable(entry: &DirEntry) -> bool {
    entry.file_type().is_file() && Format::from_path(entry.path()).is_some()
}
