use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Copies `source` to `destination`, creating parent directories as needed.
pub fn copy_file(source: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        ensure_directory(parent)?;
    }
    fs::copy(source, destination).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            destination.display()
        )
    })?;
    Ok(())
}

pub fn copy_tree(source: &Path, destination: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .with_context(|| format!("path outside of {}", source.display()))?;
        copy_file(entry.path(), &destination.join(relative))?;
        copied += 1;
    }
    Ok(copied)
}

/// Regular files below `root` matching the relative glob `pattern`, sorted.
/// Hidden entries are only matched by patterns that name the leading dot.
pub fn glob_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped_root = glob::Pattern::escape(&root.display().to_string());
    let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), pattern);

    let mut files = Vec::new();
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };
    for entry in glob::glob_with(&full_pattern, options)
        .with_context(|| format!("invalid file glob: {full_pattern}"))?
    {
        let path = entry.with_context(|| format!("failed to expand {full_pattern}"))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn csv_line<S: AsRef<str>>(cells: &[S]) -> String {
    cells
        .iter()
        .map(|cell| escape_csv_cell(cell.as_ref()))
        .collect::<Vec<String>>()
        .join(",")
}

fn escape_csv_cell(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
