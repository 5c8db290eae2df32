use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::{RunContext, STARTER_FILES_DIR};
use crate::error::ReportError;
use crate::model::{MatchRecord, OverviewRow, case_id};
use crate::render::pdf_rendition_path;
use crate::report::merge::merge_case;
use crate::util::{copy_file, copy_tree, csv_line, ensure_directory, glob_files};

pub const MERGED_REPORT_FILE: &str = "moss.html";
pub const OVERVIEW_FILE: &str = "case_overview.csv";
pub const MEMBERSHIP_FILE: &str = "group_data.csv";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssemblySummary {
    pub assembled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Builds one `case_<n>` directory per match record below the assignment's
/// report directory and keeps `case_overview.csv` in step with it.
pub struct CaseAssembler<'a> {
    context: &'a RunContext,
    report_dir: PathBuf,
}

impl<'a> CaseAssembler<'a> {
    pub fn new(context: &'a RunContext) -> Result<Self> {
        let report_dir = context
            .layout
            .assignment_report_dir(context.assignment()?);
        Ok(Self {
            context,
            report_dir,
        })
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// Assembles cases in record order. A failing case is logged and left out
    /// of the overview; a malformed record aborts the run.
    pub fn assemble<I>(&self, records: I) -> Result<AssemblySummary>
    where
        I: IntoIterator<Item = Result<MatchRecord, ReportError>>,
    {
        ensure_directory(&self.report_dir)?;
        self.copy_starter_files()?;

        let mut overview =
            OverviewWriter::open(&self.report_dir.join(OVERVIEW_FILE), self.context.force)?;
        let mut summary = AssemblySummary::default();

        for (index, record) in records.into_iter().enumerate() {
            let position = index + 1;
            let record = record.context("moss index no longer matches the expected format")?;
            let case = case_id(position);
            let case_dir = self.report_dir.join(&case);

            if case_dir.exists() && !self.context.force {
                debug!(case = %case, "case directory exists, skipping");
                summary.skipped += 1;
                continue;
            }

            info!(
                case = %case,
                group_a = %record.group_a,
                group_b = %record.group_b,
                similarity = record.similarity_percent,
                "creating case report"
            );

            match self.assemble_case(&record, &case_dir) {
                Ok(()) => {
                    overview.append(&OverviewRow::for_case(position, &record))?;
                    summary.assembled += 1;
                }
                Err(err) => {
                    error!(case = %case, error = %err, "case assembly failed");
                    for cause in err.chain().skip(1) {
                        error!(case = %case, cause = %cause, "caused by");
                    }
                    summary.failed += 1;
                }
            }
        }

        info!(
            assembled = summary.assembled,
            skipped = summary.skipped,
            failed = summary.failed,
            report_dir = %self.report_dir.display(),
            "final report assembled"
        );

        Ok(summary)
    }

    fn assemble_case(&self, record: &MatchRecord, case_dir: &Path) -> Result<()> {
        ensure_directory(case_dir)?;

        let match_ref = record
            .match_ref()
            .with_context(|| format!("invalid match file: {}", record.match_file.display()))?;
        let download_dir = record.match_file.parent().with_context(|| {
            format!(
                "match file has no directory: {}",
                record.match_file.display()
            )
        })?;
        merge_case(download_dir, match_ref, &case_dir.join(MERGED_REPORT_FILE))
            .with_context(|| format!("failed to merge report for {match_ref}"))?;

        for group in record.groups() {
            self.copy_submission_files(group, case_dir)?;
            self.context
                .roster
                .write_group_csv(group, &case_dir.join(group).join(MEMBERSHIP_FILE))?;
        }

        Ok(())
    }

    fn copy_submission_files(&self, group: &str, case_dir: &Path) -> Result<()> {
        let layout = &self.context.layout;
        let group_dir = layout.submission_files_dir().join(group);
        let pdf_dir = layout.pdf_submission_files_dir().join(group);
        let destination = case_dir.join(group);

        if !group_dir.is_dir() {
            warn!(group, path = %group_dir.display(), "no submission files for group");
            return Ok(());
        }

        for source in glob_files(&group_dir, &self.context.file_glob)? {
            let relative = source
                .strip_prefix(&group_dir)
                .with_context(|| format!("path outside of {}", group_dir.display()))?;
            copy_file(&source, &destination.join("org").join(relative))?;

            let pdf_relative = pdf_rendition_path(relative);
            let pdf_source = pdf_dir.join(&pdf_relative);
            if pdf_source.is_file() {
                copy_file(&pdf_source, &destination.join("pdf").join(&pdf_relative))?;
            } else {
                warn!(group, path = %pdf_source.display(), "pdf rendition missing");
            }
        }

        Ok(())
    }

    fn copy_starter_files(&self) -> Result<()> {
        let source = self.context.layout.starter_files_dir();
        if !source.is_dir() {
            return Ok(());
        }
        let destination = self.report_dir.join(STARTER_FILES_DIR);
        if destination.exists() && !self.context.force {
            return Ok(());
        }
        let copied = copy_tree(&source, &destination)?;
        info!(files = copied, dest = %destination.display(), "copied starter files");
        Ok(())
    }
}

/// `case_overview.csv`, opened once per run. Rows are written through as each
/// case completes so an interrupted run keeps what it finished.
struct OverviewWriter {
    path: PathBuf,
    file: File,
}

impl OverviewWriter {
    fn open(path: &Path, truncate: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(path)
            .with_context(|| format!("failed to open overview {}", path.display()))?;
        let is_empty = file
            .metadata()
            .with_context(|| format!("failed to inspect {}", path.display()))?
            .len()
            == 0;

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
        };
        if is_empty {
            writer.write_line(&OverviewRow::HEADER)?;
        }
        Ok(writer)
    }

    fn append(&mut self, row: &OverviewRow) -> Result<()> {
        self.write_line(&row.cells())
    }

    fn write_line<S: AsRef<str>>(&mut self, cells: &[S]) -> Result<()> {
        writeln!(self.file, "{}", csv_line(cells))
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("failed to flush {}", self.path.display()))
    }
}
