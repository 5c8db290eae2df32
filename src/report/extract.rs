use std::path::{Path, PathBuf};

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink;
use regex::Regex;
use tracing::debug;

use crate::error::ReportError;
use crate::model::MatchRecord;

/// The `<submissionsRoot>/<group>/<relativePath> (<percent>%)` label MOSS puts
/// in each index cell. Kept in one place so a markup change touches only this.
#[derive(Debug, Clone)]
pub struct LabelGrammar {
    pattern: Regex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLabel {
    pub group: String,
    pub relative_path: String,
    pub percent: u8,
}

impl LabelGrammar {
    pub fn new(submissions_root: &str) -> Result<Self, regex::Error> {
        let pattern = format!(
            r"^{}/([^/]+)/(.*)\s\((\d+)%\)",
            regex::escape(submissions_root.trim_end_matches('/'))
        );
        Ok(Self {
            pattern: Regex::new(&pattern)?,
        })
    }

    pub fn parse(&self, label: &str) -> Option<SubmissionLabel> {
        let captures = self.pattern.captures(label.trim())?;
        let group = captures.get(1)?.as_str();
        if group == "." || group == ".." {
            return None;
        }
        let percent = captures.get(3)?.as_str().parse::<u8>().ok()?;
        Some(SubmissionLabel {
            group: group.to_string(),
            relative_path: captures.get(2)?.as_str().to_string(),
            percent,
        })
    }
}

/// The results table of a downloaded MOSS index page.
///
/// Rows are kept as DOM nodes and only turned into [`MatchRecord`]s while
/// iterating, so [`MatchIndex::records`] is lazy and may be restarted.
pub struct MatchIndex {
    source_name: String,
    rows: Vec<(usize, NodeRef)>,
    download_dir: PathBuf,
    grammar: LabelGrammar,
}

impl MatchIndex {
    pub fn load(
        index_path: &Path,
        download_dir: &Path,
        submissions_root: &str,
    ) -> Result<Self, ReportError> {
        let html = ReportError::read_to_string(index_path)?;
        Self::parse(
            &html,
            &index_path.display().to_string(),
            download_dir,
            submissions_root,
        )
    }

    pub fn parse(
        html: &str,
        source_name: &str,
        download_dir: &Path,
        submissions_root: &str,
    ) -> Result<Self, ReportError> {
        let document = kuchiki::parse_html().one(html);
        let table = document
            .select_first("table")
            .map_err(|()| ReportError::format(source_name, "no results table"))?;

        let rows = table
            .as_node()
            .select("tr")
            .map_err(|()| ReportError::format(source_name, "invalid row selector"))?
            .enumerate()
            .filter(|(_, row)| row.as_node().select_first("th").is_err())
            .map(|(position, row)| (position + 1, row.as_node().clone()))
            .collect();

        Ok(Self {
            source_name: source_name.to_string(),
            rows,
            download_dir: download_dir.to_path_buf(),
            grammar: LabelGrammar::new(submissions_root)
                .map_err(|err| ReportError::format(source_name, err.to_string()))?,
        })
    }

    /// Number of data rows (header rows excluded).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Result<MatchRecord, ReportError>> + '_ {
        self.rows
            .iter()
            .map(move |(row_number, row)| self.parse_row(*row_number, row))
    }

    fn parse_row(&self, row_number: usize, row: &NodeRef) -> Result<MatchRecord, ReportError> {
        let row_error = |detail: String| {
            ReportError::format(format!("{} row {row_number}", self.source_name), detail)
        };

        let cells: Vec<NodeRef> = row
            .children()
            .filter(|child| {
                child
                    .as_element()
                    .is_some_and(|element| &*element.name.local == "td")
            })
            .collect();
        if cells.len() != 3 {
            return Err(row_error(format!("expected 3 cells, found {}", cells.len())));
        }

        let (href_a, label_a) = cell_link(&cells[0]).ok_or_else(|| {
            row_error("first submission cell has no link".to_string())
        })?;
        let (_, label_b) = cell_link(&cells[1]).ok_or_else(|| {
            row_error("second submission cell has no link".to_string())
        })?;

        let submission_a = self
            .grammar
            .parse(&label_a)
            .ok_or_else(|| row_error(format!("unrecognized submission label: {label_a:?}")))?;
        // Only the group is kept from B; MOSS reports the same percentage on both sides.
        let submission_b = self
            .grammar
            .parse(&label_b)
            .ok_or_else(|| row_error(format!("unrecognized submission label: {label_b:?}")))?;

        let lines_text = cells[2].text_contents();
        let matched_lines = lines_text
            .trim()
            .parse::<u32>()
            .map_err(|_| row_error(format!("invalid matched line count: {lines_text:?}")))?;

        debug!(
            row = row_number,
            file_a = %submission_a.relative_path,
            file_b = %submission_b.relative_path,
            "parsed match row"
        );

        let basename = href_a
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| row_error(format!("link has no file name: {href_a:?}")))?;

        Ok(MatchRecord {
            match_file: self.download_dir.join(basename),
            group_a: submission_a.group,
            group_b: submission_b.group,
            similarity_percent: submission_a.percent,
            matched_lines,
        })
    }
}

fn cell_link(cell: &NodeRef) -> Option<(String, String)> {
    let link = cell.select_first("a").ok()?;
    let href = link.attributes.borrow().get("href")?.to_string();
    Some((href, link.as_node().text_contents()))
}
