use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use kuchiki::traits::TendrilSink;
use regex::Regex;
use walkdir::WalkDir;

use super::assemble::{self, AssemblySummary};
use super::{CaseAssembler, MatchIndex};
use crate::config::{Layout, RunContext, SUBMISSION_FILES_DIR};
use crate::model::GroupEntry;
use crate::roster::Roster;

/// Writes the four pages MOSS serves for one match into `dir`.
pub(crate) fn write_match_frames(dir: &Path, match_ref: &str) {
    fs::create_dir_all(dir).expect("create frame dir");
    let write = |suffix: &str, body: String| {
        fs::write(dir.join(format!("{match_ref}{suffix}.html")), body).expect("write frame");
    };

    write(
        "",
        format!(
            "<html><head><title>Matches for submission_files/teamA/main.c and \
             submission_files/teamB/main.c</title></head>\
             <frameset rows=\"150,*\"><frameset cols=\"1000,*\">\
             <frame src=\"{match_ref}-top.html\" name=\"top\"></frameset>\
             <frameset cols=\"50%,50%\"><frame src=\"{match_ref}-0.html\" name=\"0\">\
             <frame src=\"{match_ref}-1.html\" name=\"1\"></frameset></frameset></html>"
        ),
    );
    write(
        "-top",
        format!(
            "<html><head><title>Top</title></head><body><center><table border=\"1\">\
             <tr><th>submission_files/teamA/main.c (83%)</th><th></th>\
             <th>submission_files/teamB/main.c (83%)</th><th></th></tr>\
             <tr><td><a href=\"{match_ref}-0.html#0\" name=\"0\" target=\"0\">1-20</a></td>\
             <td><a href=\"{match_ref}-1.html#0\" name=\"0\" target=\"1\">3-22</a></td></tr>\
             <tr><td><a href=\"{match_ref}-0.html#1\" name=\"1\" target=\"0\">30-41</a></td>\
             <td><a href=\"{match_ref}-1.html#1\" name=\"1\" target=\"1\">35-46</a></td></tr>\
             </table></center></body></html>"
        ),
    );
    for (side, other, marker) in [(0, 1, "A"), (1, 0, "B")] {
        write(
            &format!("-{side}"),
            format!(
                "<html><body bgcolor=\"white\"><hr>submission_files/team{marker}/main.c<p><pre>\n\
                 <a name=\"0\"></a><font color=\"#FF0000\">\
                 <a href=\"{match_ref}-{other}.html#0\" target=\"{other}\">\
                 <img src=\"../bitmaps/tm_0_83.gif\" alt=\"other\"></a>\n\
                 int main(void) /* {marker} */\n</font>\n\
                 <a name=\"1\"></a><font color=\"#00FF00\">\
                 <a href=\"{match_ref}-{other}.html#1\" target=\"{other}\">\
                 <img src=\"../bitmaps/tm_1_83.gif\" alt=\"other\"></a>\n\
                 return 0;\n</font></pre></body></html>"
            ),
        );
    }
}

/// `(side, match index)` of every link in `html` whose target matches `pattern`.
pub(crate) fn navigation_pairs(html: &str, pattern: &str) -> Vec<(u8, u32)> {
    let pattern = Regex::new(pattern).expect("pair pattern");
    let document = kuchiki::parse_html().one(html);
    document
        .select("a[href]")
        .expect("selector")
        .filter_map(|link| {
            let href = link.attributes.borrow().get("href")?.to_string();
            let captures = pattern.captures(&href)?;
            Some((captures[1].parse().ok()?, captures[2].parse().ok()?))
        })
        .collect()
}

fn index_row(group_a: &str, group_b: &str, percent: u8, match_ref: &str, lines: u32) -> String {
    format!(
        "<tr><td><a href=\"http://moss.example/results/7/{match_ref}.html\">\
         {SUBMISSION_FILES_DIR}/{group_a}/main.c ({percent}%)</a></td>\
         <td><a href=\"http://moss.example/results/7/{match_ref}.html\">\
         {SUBMISSION_FILES_DIR}/{group_b}/main.c ({percent}%)</a></td>\
         <td align=\"right\">{lines}\n</td></tr>"
    )
}

/// A working directory as left behind by the download stages.
struct Workdir {
    _dir: tempfile::TempDir,
    context: RunContext,
}

impl Workdir {
    fn new(rows: &[String]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout::new(dir.path());

        for group in ["teamA", "teamB", "teamC"] {
            let group_dir = layout.submission_files_dir().join(group);
            fs::create_dir_all(&group_dir).expect("mkdir");
            fs::write(
                group_dir.join("main.c"),
                format!("int main(void) /* {group} */"),
            )
            .expect("write");
        }
        let pdf_dir = layout.pdf_submission_files_dir().join("teamA");
        fs::create_dir_all(&pdf_dir).expect("mkdir");
        fs::write(pdf_dir.join("main.c.pdf"), b"%PDF-1.4 teamA").expect("write");

        let starter_dir = layout.org_starter_files_dir().join("1");
        fs::create_dir_all(&starter_dir).expect("mkdir");
        fs::write(starter_dir.join("starter.c"), "/* given */").expect("write");

        let download_dir = layout.report_download_dir();
        fs::create_dir_all(&download_dir).expect("mkdir");
        fs::write(
            download_dir.join("index.html"),
            format!(
                "<html><body><table>\
                 <tr><th>File 1</th><th>File 2</th><th>Lines Matched</th></tr>{}\
                 </table></body></html>",
                rows.concat()
            ),
        )
        .expect("write index");
        write_match_frames(&download_dir, "match0");

        let entries: Vec<GroupEntry> = serde_json::from_str(
            r#"[{"group_name": "teamA", "members": [{"user_name": "c5alice",
                 "first_name": "Alice", "last_name": "Liddell",
                 "email": "alice@example.edu", "id_number": "1001"}]}]"#,
        )
        .expect("roster");

        let context = RunContext {
            layout,
            assignment: Some("A1".to_string()),
            moss_report_url: None,
            language: Some("c".to_string()),
            file_glob: "**/*".to_string(),
            groups: Vec::new(),
            force: false,
            roster: Roster::from_entries(entries, &[]),
        };

        Self { _dir: dir, context }
    }

    fn assemble(&self) -> anyhow::Result<AssemblySummary> {
        let layout = &self.context.layout;
        let index = MatchIndex::load(
            &layout.report_index(),
            &layout.report_download_dir(),
            SUBMISSION_FILES_DIR,
        )?;
        CaseAssembler::new(&self.context)?.assemble(index.records())
    }

    fn report_dir(&self) -> PathBuf {
        self.context.layout.assignment_report_dir("A1")
    }

    fn overview(&self) -> Vec<String> {
        fs::read_to_string(self.report_dir().join(assemble::OVERVIEW_FILE))
            .expect("overview")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.expect("walk"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).expect("prefix").to_path_buf();
            (relative, fs::read(entry.path()).expect("read"))
        })
        .collect()
}

const HEADER: &str = "case,groups,similarity (%),matched_lines";

#[test]
fn single_match_produces_a_complete_case() {
    let workdir = Workdir::new(&[index_row("teamA", "teamB", 83, "match0", 47)]);

    let summary = workdir.assemble().expect("assemble");
    assert_eq!(
        summary,
        AssemblySummary {
            assembled: 1,
            skipped: 0,
            failed: 0
        }
    );

    let case_dir = workdir.report_dir().join("case_1");
    assert!(case_dir.join("moss.html").is_file());
    assert_eq!(
        fs::read_to_string(case_dir.join("teamA/org/main.c")).expect("copied"),
        "int main(void) /* teamA */"
    );
    assert!(case_dir.join("teamB/org/main.c").is_file());
    assert!(case_dir.join("teamA/pdf/main.c.pdf").is_file());
    assert!(!case_dir.join("teamB/pdf/main.c.pdf").exists());

    let members = fs::read_to_string(case_dir.join("teamA/group_data.csv")).expect("members");
    assert!(members.contains("teamA,c5alice,Alice,Liddell,alice@example.edu,1001"));
    let empty_members = fs::read_to_string(case_dir.join("teamB/group_data.csv")).expect("members");
    assert_eq!(empty_members.lines().count(), 1);

    assert!(
        workdir
            .report_dir()
            .join("starter_files/org/1/starter.c")
            .is_file()
    );
    assert_eq!(workdir.overview(), vec![HEADER, "case_1,teamA;teamB,83,47"]);
}

#[test]
fn rerun_without_force_leaves_existing_cases_untouched() {
    let workdir = Workdir::new(&[index_row("teamA", "teamB", 83, "match0", 47)]);
    workdir.assemble().expect("first run");
    let before = snapshot(&workdir.report_dir());

    let summary = workdir.assemble().expect("second run");
    assert_eq!(summary.assembled, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(snapshot(&workdir.report_dir()), before);
}

#[test]
fn force_rebuilds_cases_and_rewrites_the_overview() {
    let mut workdir = Workdir::new(&[index_row("teamA", "teamB", 83, "match0", 47)]);
    workdir.assemble().expect("first run");

    workdir.context.force = true;
    let summary = workdir.assemble().expect("forced run");
    assert_eq!(summary.assembled, 1);
    assert_eq!(workdir.overview(), vec![HEADER, "case_1,teamA;teamB,83,47"]);
}

#[test]
fn failed_case_is_left_out_of_the_overview_and_later_cases_continue() {
    let workdir = Workdir::new(&[
        index_row("teamA", "teamB", 83, "match0", 47),
        index_row("teamC", "teamA", 40, "match1", 12),
        index_row("teamB", "teamC", 35, "match0", 9),
    ]);

    let summary = workdir.assemble().expect("run continues past a failed case");
    assert_eq!(summary.assembled, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(
        workdir.overview(),
        vec![
            HEADER,
            "case_1,teamA;teamB,83,47",
            "case_3,teamB;teamC,35,9"
        ]
    );
    // The failed case stays partially populated.
    assert!(workdir.report_dir().join("case_2").is_dir());
    assert!(!workdir.report_dir().join("case_2/moss.html").exists());
}

#[test]
fn malformed_index_row_aborts_the_run() {
    let workdir = Workdir::new(&[
        index_row("teamA", "teamB", 83, "match0", 47),
        "<tr><td>broken</td></tr>".to_string(),
        index_row("teamB", "teamC", 35, "match0", 9),
    ]);

    let err = workdir.assemble().expect_err("format change must stop the run");
    assert!(err.chain().any(|cause| cause.to_string().contains("expected 3 cells")));
    assert_eq!(workdir.overview(), vec![HEADER, "case_1,teamA;teamB,83,47"]);
    assert!(!workdir.report_dir().join("case_2").exists());
    assert!(!workdir.report_dir().join("case_3").exists());
}

#[test]
fn file_glob_limits_copied_sources() {
    let mut workdir = Workdir::new(&[index_row("teamA", "teamB", 83, "match0", 47)]);
    let notes = workdir.context.layout.submission_files_dir().join("teamA/notes.txt");
    fs::write(&notes, "not code").expect("write");
    workdir.context.file_glob = "**/*.c".to_string();

    workdir.assemble().expect("assemble");
    let case_dir = workdir.report_dir().join("case_1");
    assert!(case_dir.join("teamA/org/main.c").is_file());
    assert!(!case_dir.join("teamA/org/notes.txt").exists());
}
