use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cli::{CommonArgs, Stage};
use crate::roster::Roster;

pub const SUBMISSION_FILES_DIR: &str = "submission_files";
pub const PDF_SUBMISSION_FILES_DIR: &str = "pdf_submission_files";
pub const STARTER_FILES_DIR: &str = "starter_files";
pub const MOSS_REPORT_DIR: &str = "moss_report";
pub const MOSS_REPORT_URL_FILE: &str = "report_url.txt";
pub const MOSS_REPORT_DOWNLOAD_DIR: &str = "report";
pub const FINAL_REPORT_DIR: &str = "final_report";
pub const ROSTER_FILE: &str = "group_data.json";
pub const DEFAULT_FILE_GLOB: &str = "**/*";

/// Options accepted from the TOML config file; every key is optional and
/// only fills in what the command line left unset.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub workdir: Option<PathBuf>,
    pub assignment: Option<String>,
    pub moss_report_url: Option<String>,
    pub language: Option<String>,
    pub file_glob: Option<String>,
    pub groups: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            debug!(path = %path.display(), "no config file, using command-line options only");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }
}

/// Fixed locations inside the working directory shared by every stage.
#[derive(Debug, Clone)]
pub struct Layout {
    pub workdir: PathBuf,
}

impl Layout {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn submission_files_dir(&self) -> PathBuf {
        self.workdir.join(SUBMISSION_FILES_DIR)
    }

    pub fn pdf_submission_files_dir(&self) -> PathBuf {
        self.workdir.join(PDF_SUBMISSION_FILES_DIR)
    }

    pub fn starter_files_dir(&self) -> PathBuf {
        self.workdir.join(STARTER_FILES_DIR)
    }

    pub fn org_starter_files_dir(&self) -> PathBuf {
        self.starter_files_dir().join("org")
    }

    pub fn pdf_starter_files_dir(&self) -> PathBuf {
        self.starter_files_dir().join("pdf")
    }

    pub fn moss_report_dir(&self) -> PathBuf {
        self.workdir.join(MOSS_REPORT_DIR)
    }

    pub fn report_url_file(&self) -> PathBuf {
        self.moss_report_dir().join(MOSS_REPORT_URL_FILE)
    }

    pub fn report_download_dir(&self) -> PathBuf {
        self.moss_report_dir().join(MOSS_REPORT_DOWNLOAD_DIR)
    }

    pub fn report_index(&self) -> PathBuf {
        self.report_download_dir().join("index.html")
    }

    pub fn final_report_dir(&self) -> PathBuf {
        self.workdir.join(FINAL_REPORT_DIR)
    }

    pub fn assignment_report_dir(&self, assignment: &str) -> PathBuf {
        self.final_report_dir().join(assignment)
    }

    pub fn roster_file(&self) -> PathBuf {
        self.workdir.join(ROSTER_FILE)
    }
}

/// Everything a run needs, resolved once before any stage executes.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub layout: Layout,
    pub assignment: Option<String>,
    pub moss_report_url: Option<String>,
    pub language: Option<String>,
    pub file_glob: String,
    pub groups: Vec<String>,
    pub force: bool,
    pub roster: Roster,
}

impl RunContext {
    pub fn resolve(args: &CommonArgs) -> Result<Self> {
        let file_config = FileConfig::load(&args.config)?;

        let workdir = match args.workdir.clone().or(file_config.workdir) {
            Some(workdir) => workdir,
            None => std::env::current_dir().context("failed to resolve current directory")?,
        };
        let layout = Layout::new(workdir);

        let groups = if args.groups.is_empty() {
            file_config.groups.unwrap_or_default()
        } else {
            args.groups.clone()
        };

        let moss_report_url = match args.moss_report_url.clone().or(file_config.moss_report_url) {
            Some(url) => Some(url),
            None => read_report_url(&layout.report_url_file())?,
        };

        let roster = Roster::load(&layout.roster_file(), &groups)?;

        let context = Self {
            layout,
            assignment: args.assignment.clone().or(file_config.assignment),
            moss_report_url,
            language: args.language.clone().or(file_config.language),
            file_glob: args
                .file_glob
                .clone()
                .or(file_config.file_glob)
                .unwrap_or_else(|| DEFAULT_FILE_GLOB.to_string()),
            groups,
            force: args.force,
            roster,
        };

        info!(
            workdir = %context.layout.workdir.display(),
            file_glob = %context.file_glob,
            groups = context.groups.len(),
            force = context.force,
            "resolved run context"
        );

        Ok(context)
    }

    /// Checks stage prerequisites up front so a run never stops halfway on
    /// a missing option.
    pub fn validate_for(&self, stages: &[Stage]) -> Result<()> {
        for stage in stages {
            match stage {
                Stage::Pdf => {
                    self.language()?;
                }
                Stage::Fetch => {
                    self.report_url()?;
                }
                Stage::Assemble => {
                    self.assignment()?;
                }
            }
        }
        Ok(())
    }

    pub fn assignment(&self) -> Result<&str> {
        match self.assignment.as_deref() {
            Some(assignment) if !assignment.trim().is_empty() => Ok(assignment),
            _ => bail!("assignment is required to perform this action"),
        }
    }

    pub fn language(&self) -> Result<&str> {
        match self.language.as_deref() {
            Some(language) if !language.trim().is_empty() => Ok(language),
            _ => bail!("language is required to perform this action"),
        }
    }

    pub fn report_url(&self) -> Result<&str> {
        match self.moss_report_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => bail!(
                "moss_report_url is required to perform this action (or {})",
                self.layout.report_url_file().display()
            ),
        }
    }
}

fn read_report_url(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        return Ok(None);
    }
    debug!(path = %path.display(), "reading moss report url");
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let url = raw.trim();
    Ok((!url.is_empty()).then(|| url.to_string()))
}
