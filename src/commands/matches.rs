use anyhow::{Context, Result};
use tracing::info;

use crate::cli::MatchesArgs;
use crate::config::{RunContext, SUBMISSION_FILES_DIR};
use crate::model::{MatchRecord, OverviewRow, case_id};
use crate::report::MatchIndex;
use crate::util::csv_line;

pub fn run(args: MatchesArgs) -> Result<()> {
    let context = RunContext::resolve(&args.common)?;
    let layout = &context.layout;

    let index = MatchIndex::load(
        &layout.report_index(),
        &layout.report_download_dir(),
        SUBMISSION_FILES_DIR,
    )?;
    let records = index
        .records()
        .collect::<Result<Vec<MatchRecord>, _>>()
        .context("moss index no longer matches the expected format")?;

    if args.json {
        let numbered: Vec<serde_json::Value> = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::json!({
                    "case": case_id(index + 1),
                    "match": record,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&numbered)?);
    } else {
        println!("{}", csv_line(&OverviewRow::HEADER));
        for (index, record) in records.iter().enumerate() {
            println!("{}", csv_line(&OverviewRow::for_case(index + 1, record).cells()));
        }
    }

    info!(matches = records.len(), "listed match records");
    Ok(())
}
