use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::model::{GroupEntry, MemberInfo};
use crate::util::{csv_line, ensure_directory};

/// Group memberships as exported from MarkUs, keyed by group name.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    groups: BTreeMap<String, Vec<MemberInfo>>,
}

impl Roster {
    /// Loads the roster snapshot, keeping only `only_groups` when non-empty.
    /// A missing snapshot is not fatal: listings are then written header-only.
    pub fn load(path: &Path, only_groups: &[String]) -> Result<Self> {
        if !path.is_file() {
            warn!(path = %path.display(), "group membership snapshot missing");
            return Ok(Self::default());
        }

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let entries: Vec<GroupEntry> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let roster = Self::from_entries(entries, only_groups);
        info!(
            path = %path.display(),
            groups = roster.groups.len(),
            "loaded group membership snapshot"
        );
        Ok(roster)
    }

    pub fn from_entries(entries: Vec<GroupEntry>, only_groups: &[String]) -> Self {
        let mut groups: BTreeMap<String, Vec<MemberInfo>> = BTreeMap::new();
        for entry in entries {
            if !only_groups.is_empty() && !only_groups.contains(&entry.group_name) {
                continue;
            }
            let members = groups.entry(entry.group_name.clone()).or_default();
            for mut member in entry.members {
                member.group_name = entry.group_name.clone();
                members.push(member);
            }
        }
        Self { groups }
    }

    pub fn members(&self, group: &str) -> &[MemberInfo] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn write_group_csv(&self, group: &str, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }

        let file = File::create(path)
            .with_context(|| format!("failed to create membership file {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "{}", csv_line(&MemberInfo::COLUMNS))
            .with_context(|| format!("failed to write {}", path.display()))?;
        for member in self.members(group) {
            writeln!(writer, "{}", csv_line(&member.cells()))
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;

        Ok(())
    }
}
