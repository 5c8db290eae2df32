use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::config::RunContext;
use crate::util::{ensure_directory, glob_files};

const PANDOC: &str = "pandoc";
/// Overrides the pandoc executable, e.g. a wrapper script or a non-PATH install.
const PANDOC_ENV: &str = "MARKUSMOSS_PANDOC";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// `main.c` -> `main.c.pdf`
pub fn pdf_rendition_path(relative: &Path) -> PathBuf {
    let mut name = relative.as_os_str().to_os_string();
    name.push(".pdf");
    PathBuf::from(name)
}

/// Renders every submission and starter file to a line-numbered PDF with pandoc.
pub fn render_pdfs(context: &RunContext) -> Result<RenderSummary> {
    let program = std::env::var_os(PANDOC_ENV).unwrap_or_else(|| OsString::from(PANDOC));
    render_pdfs_with(context, Path::new(&program))
}

pub fn render_pdfs_with(context: &RunContext, program: &Path) -> Result<RenderSummary> {
    let language = context.language()?;
    let pandoc = Pandoc::locate(program)?;
    info!(pandoc = %pandoc.version, language, "rendering pdf copies");

    let layout = &context.layout;
    let mut summary = RenderSummary::default();
    pandoc.render_tree(
        context,
        language,
        &layout.submission_files_dir(),
        &layout.pdf_submission_files_dir(),
        &mut summary,
    )?;
    pandoc.render_tree(
        context,
        language,
        &layout.org_starter_files_dir(),
        &layout.pdf_starter_files_dir(),
        &mut summary,
    )?;

    info!(
        rendered = summary.rendered,
        skipped = summary.skipped,
        failed = summary.failed,
        "pdf rendering complete"
    );
    Ok(summary)
}

struct Pandoc {
    program: PathBuf,
    version: String,
}

impl Pandoc {
    fn locate(program: &Path) -> Result<Self> {
        let output = Command::new(program)
            .arg("--version")
            .output()
            .with_context(|| {
                format!(
                    "no '{}' executable found; it is required to render pdfs",
                    program.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} --version failed: {}", program.display(), stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout
            .lines()
            .next()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self {
            program: program.to_path_buf(),
            version,
        })
    }

    fn render_tree(
        &self,
        context: &RunContext,
        language: &str,
        source_dir: &Path,
        dest_dir: &Path,
        summary: &mut RenderSummary,
    ) -> Result<()> {
        if !source_dir.is_dir() {
            debug!(path = %source_dir.display(), "nothing to render");
            return Ok(());
        }

        // One directory level per group (or starter group) below the source root.
        let pattern = format!("*/{}", context.file_glob);
        for source in glob_files(source_dir, &pattern)? {
            let relative = source
                .strip_prefix(source_dir)
                .with_context(|| format!("path outside of {}", source_dir.display()))?;
            let destination = dest_dir.join(pdf_rendition_path(relative));

            if destination.is_file() && !context.force {
                summary.skipped += 1;
                continue;
            }

            info!(source = %relative.display(), "converting to pdf");
            match self.render_file(&source, &destination, language) {
                Ok(()) => summary.rendered += 1,
                Err(err) => {
                    warn!(source = %source.display(), error = %err, "pdf rendering failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(())
    }

    fn render_file(&self, source: &Path, destination: &Path, language: &str) -> Result<()> {
        if let Some(parent) = destination.parent() {
            ensure_directory(parent)?;
        }

        let content = std::fs::read(source)
            .with_context(|| format!("failed to read {}", source.display()))?;
        let program = self.program.display();

        let mut child = Command::new(&self.program)
            .arg("-V")
            .arg("geometry:margin=1cm")
            .arg("-o")
            .arg(destination)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to execute {program} for {}", source.display()))?;

        {
            let mut stdin = child.stdin.take().context("pandoc stdin was not captured")?;
            stdin
                .write_all(&code_block(language, &content))
                .with_context(|| format!("failed to stream {} to {program}", source.display()))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for {program}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{program} returned non-zero exit status for {}: {}",
                source.display(),
                stderr.trim()
            );
        }

        Ok(())
    }
}

/// Markdown fenced block pandoc renders with line numbers and highlighting.
fn code_block(language: &str, content: &[u8]) -> Vec<u8> {
    let mut block = format!("```{{.{language} .numberLines}}\n").into_bytes();
    block.extend_from_slice(content);
    block.extend_from_slice(b"\n```");
    block
}
