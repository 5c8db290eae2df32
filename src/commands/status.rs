use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::config::RunContext;
use crate::report::assemble::OVERVIEW_FILE;
use crate::util::sha256_file;

pub fn run(args: StatusArgs) -> Result<()> {
    let context = RunContext::resolve(&args.common)?;
    let layout = &context.layout;

    info!(workdir = %layout.workdir.display(), "status requested");

    report_dir_entries(&layout.submission_files_dir(), "submission groups")?;
    report_dir_entries(&layout.pdf_submission_files_dir(), "pdf submission groups")?;
    report_dir_entries(&layout.org_starter_files_dir(), "starter file groups")?;

    match context.moss_report_url.as_deref() {
        Some(url) => info!(url, "moss report url"),
        None => warn!(path = %layout.report_url_file().display(), "moss report url missing"),
    }

    if layout.report_index().is_file() {
        let pages = count_entries(&layout.report_download_dir())?;
        info!(path = %layout.report_download_dir().display(), pages, "moss report downloaded");
    } else {
        warn!(path = %layout.report_download_dir().display(), "moss report not downloaded");
    }

    let Some(assignment) = context.assignment.as_deref() else {
        warn!("no assignment configured, skipping final report status");
        return Ok(());
    };
    let report_dir = layout.assignment_report_dir(assignment);
    if !report_dir.is_dir() {
        warn!(path = %report_dir.display(), "final report missing");
        return Ok(());
    }

    let cases = fs::read_dir(&report_dir)
        .with_context(|| format!("failed to read {}", report_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("case_"))
        .filter(|entry| entry.path().is_dir())
        .count();

    let overview_path = report_dir.join(OVERVIEW_FILE);
    if overview_path.is_file() {
        let raw = fs::read_to_string(&overview_path)
            .with_context(|| format!("failed to read {}", overview_path.display()))?;
        info!(
            path = %overview_path.display(),
            case_dirs = cases,
            overview_rows = raw.lines().count().saturating_sub(1),
            sha256 = %sha256_file(&overview_path)?,
            "final report status"
        );
    } else {
        warn!(path = %overview_path.display(), case_dirs = cases, "overview missing");
    }

    Ok(())
}

fn report_dir_entries(path: &Path, label: &str) -> Result<()> {
    if path.is_dir() {
        info!(path = %path.display(), count = count_entries(path)?, "{label}");
    } else {
        warn!(path = %path.display(), "{label} missing");
    }
    Ok(())
}

fn count_entries(path: &Path) -> Result<usize> {
    Ok(fs::read_dir(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .filter_map(|entry| entry.ok())
        .count())
}
