//! Release archive validation, extraction and binary lookup.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{ManagerError, Result};

/// Checks that `path` is a non-empty, readable zip with at least one entry
/// and returns the entry names.
pub fn validate_archive(path: &Path) -> Result<Vec<String>> {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(ManagerError::Archive(format!(
            "{} is missing or empty",
            path.display()
        )));
    }

    let archive = open(path)?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    if names.is_empty() {
        return Err(ManagerError::Archive(format!(
            "{} contains no entries",
            path.display()
        )));
    }
    Ok(names)
}

fn open(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path)?;
    zip::ZipArchive::new(file)
        .map_err(|e| ManagerError::Archive(format!("{} is corrupt: {e}", path.display())))
}

/// Extracts `archive` into a freshly recreated `target` and deletes the
/// archive afterwards. On failure the archive is deleted as well, so a bad
/// download is never picked up again.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<Vec<String>> {
    let result = extract_into(archive, target);
    if result.is_err() {
        let _ = fs::remove_file(archive);
    }
    result
}

fn extract_into(archive: &Path, target: &Path) -> Result<Vec<String>> {
    let names = validate_archive(archive)?;

    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::create_dir_all(target)?;

    {
        let mut zip = open(archive)?;
        zip.extract(target)
            .map_err(|e| ManagerError::Archive(format!("extraction failed: {e}")))?;
    }

    fs::remove_file(archive)?;
    Ok(names)
}

/// The single file under `root` named `<prefix>...<suffix>`.
pub fn locate_binary(root: &Path, prefix: &str, suffix: &str) -> Result<PathBuf> {
    let mut found = Vec::new();
    collect_matches(root, prefix, suffix, &mut found)?;

    match found.len() {
        0 => Err(ManagerError::Archive(format!(
            "no {prefix}*{suffix} found in {}",
            root.display()
        ))),
        1 => Ok(found.remove(0)),
        n => Err(ManagerError::Archive(format!(
            "{n} candidates for {prefix}*{suffix} found in {}",
            root.display()
        ))),
    }
}

fn collect_matches(dir: &Path, prefix: &str, suffix: &str, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_matches(&path, prefix, suffix, found)?;
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(suffix) {
            found.push(path);
        }
    }
    Ok(())
}
