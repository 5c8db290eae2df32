use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One flagged pair of submissions as reported by the similarity index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRecord {
    pub match_file: PathBuf,
    pub group_a: String,
    pub group_b: String,
    pub similarity_percent: u8,
    pub matched_lines: u32,
}

impl MatchRecord {
    /// Base name of the detail pages (`match0` for `match0.html`).
    pub fn match_ref(&self) -> Option<&str> {
        self.match_file.file_stem().and_then(|stem| stem.to_str())
    }

    pub fn groups(&self) -> [&str; 2] {
        [self.group_a.as_str(), self.group_b.as_str()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewRow {
    pub case_id: String,
    pub groups: String,
    pub similarity_percent: u8,
    pub matched_lines: u32,
}

impl OverviewRow {
    pub const HEADER: [&'static str; 4] = ["case", "groups", "similarity (%)", "matched_lines"];

    pub fn for_case(position: usize, record: &MatchRecord) -> Self {
        Self {
            case_id: case_id(position),
            groups: record.groups().join(";"),
            similarity_percent: record.similarity_percent,
            matched_lines: record.matched_lines,
        }
    }

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.case_id.clone(),
            self.groups.clone(),
            self.similarity_percent.to_string(),
            self.matched_lines.to_string(),
        ]
    }
}

pub fn case_id(position: usize) -> String {
    format!("case_{position}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    #[serde(default)]
    pub group_name: String,
    pub user_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub id_number: String,
}

impl MemberInfo {
    pub const COLUMNS: [&'static str; 6] = [
        "group_name",
        "user_name",
        "first_name",
        "last_name",
        "email",
        "id_number",
    ];

    pub fn cells(&self) -> [&str; 6] {
        [
            &self.group_name,
            &self.user_name,
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.id_number,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupEntry {
    pub group_name: String,
    #[serde(default)]
    pub members: Vec<MemberInfo>,
}
