use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{RunArgs, Stage};
use crate::config::{RunContext, SUBMISSION_FILES_DIR};
use crate::render::render_pdfs;
use crate::report::{CaseAssembler, HttpFetcher, MatchIndex, download_report};
use crate::util::now_utc_string;

pub fn run(args: RunArgs) -> Result<()> {
    let context = RunContext::resolve(&args.common)?;
    let stages = Stage::plan(&args.stages);
    context.validate_for(&stages)?;

    info!(
        started_at = %now_utc_string(),
        stages = %stages.iter().map(|stage| stage.as_str()).collect::<Vec<_>>().join(","),
        "starting run"
    );

    for stage in stages {
        info!(stage = stage.as_str(), "running stage");
        match stage {
            Stage::Pdf => {
                render_pdfs(&context)?;
            }
            Stage::Fetch => fetch_report(&context)?,
            Stage::Assemble => assemble_report(&context)?,
        }
    }

    info!(finished_at = %now_utc_string(), "run completed");
    Ok(())
}

fn fetch_report(context: &RunContext) -> Result<()> {
    let dest = context.layout.report_download_dir();
    if dest.is_dir() && !context.force {
        info!(path = %dest.display(), "moss report already downloaded, skipping");
        return Ok(());
    }

    let report_url = context.report_url()?;
    info!(url = report_url, "downloading moss report");
    let fetcher = HttpFetcher::new()?;
    download_report(&fetcher, report_url, &dest)
        .with_context(|| format!("failed to download moss report from {report_url}"))?;
    Ok(())
}

fn assemble_report(context: &RunContext) -> Result<()> {
    let layout = &context.layout;
    let index = MatchIndex::load(
        &layout.report_index(),
        &layout.report_download_dir(),
        SUBMISSION_FILES_DIR,
    )
    .context("failed to load moss index; run the fetch stage first")?;
    if index.is_empty() {
        warn!(path = %layout.report_index().display(), "moss index lists no matches");
    }
    info!(matches = index.len(), "parsed moss index");

    let assembler = CaseAssembler::new(context)?;
    let summary = assembler.assemble(index.records())?;
    if summary.assembled == 0 && summary.failed == 0 {
        info!(
            report_dir = %assembler.report_dir().display(),
            "no new cases"
        );
    }
    Ok(())
}
