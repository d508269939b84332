//! System-journal subsystem: `[Journal]` disk caps in `journald.conf`.
//!
//! Edits are line-based so comments, ordering and unrelated sections are
//! kept exactly as the distribution shipped them.

use serde::Serialize;

use super::Rendered;
use crate::policy::retention::RetentionParameters;

const SECTION: &str = "[Journal]";

pub const MAX_USE_KEY: &str = "SystemMaxUse";
pub const KEEP_FREE_KEY: &str = "SystemKeepFree";
pub const MAX_FILE_SIZE_KEY: &str = "SystemMaxFileSize";

/// Journal caps currently active in `journald.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JournalSettings {
    pub max_use: Option<String>,
    pub keep_free: Option<String>,
    pub max_file_size: Option<String>,
}

impl JournalSettings {
    /// Whether these settings already enforce `params`.
    #[must_use]
    pub fn matches(&self, params: &RetentionParameters) -> bool {
        self.max_use.as_deref() == Some(params.journal_max_use)
            && self.keep_free.as_deref() == Some(params.journal_keep_free)
            && self.max_file_size.as_deref() == Some(params.journal_max_file_size)
    }
}

/// A `Key=value` line, possibly commented out.
struct Assignment<'a> {
    key: &'a str,
    value: &'a str,
    commented: bool,
}

fn parse_assignment(line: &str) -> Option<Assignment<'_>> {
    let trimmed = line.trim_start();
    let commented = trimmed.starts_with(['#', ';']);
    let body = trimmed.trim_start_matches(['#', ';']).trim_start();
    let (key, value) = body.split_once('=')?;
    let key = key.trim_end();
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(Assignment {
        key,
        value: value.trim(),
        commented,
    })
}

fn is_section_header(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('[') && t.ends_with(']')
}

/// Half-open line range of the first `[Journal]` section body.
fn journal_section(lines: &[String]) -> Option<(usize, usize)> {
    let header = lines.iter().position(|l| l.trim() == SECTION)?;
    let end = lines[header + 1..]
        .iter()
        .position(|l| is_section_header(l))
        .map_or(lines.len(), |offset| header + 1 + offset);
    Some((header + 1, end))
}

/// Set the three managed keys inside `[Journal]`.
///
/// Active assignments are rewritten in place; otherwise the first
/// commented-out default is uncommented; otherwise the key is appended to
/// the section. A missing section is appended to the file.
pub fn render(current: Option<&str>, params: &RetentionParameters) -> Result<Rendered, String> {
    let original: Vec<String> = current
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    let mut lines = original.clone();

    let (start, mut end) = if let Some(range) = journal_section(&lines) {
        range
    } else {
        if lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(SECTION.to_string());
        (lines.len(), lines.len())
    };

    for (key, value) in [
        (MAX_USE_KEY, params.journal_max_use),
        (KEEP_FREE_KEY, params.journal_keep_free),
        (MAX_FILE_SIZE_KEY, params.journal_max_file_size),
    ] {
        let wanted = format!("{key}={value}");
        let matching: Vec<(usize, bool)> = (start..end)
            .filter_map(|i| {
                parse_assignment(&lines[i])
                    .filter(|a| a.key == key)
                    .map(|a| (i, a.commented))
            })
            .collect();

        let active: Vec<usize> = matching
            .iter()
            .filter(|(_, commented)| !commented)
            .map(|(i, _)| *i)
            .collect();

        if !active.is_empty() {
            for i in active {
                lines[i].clone_from(&wanted);
            }
        } else if let Some((i, _)) = matching.first() {
            lines[*i].clone_from(&wanted);
        } else {
            let insert_at = (start..end)
                .rev()
                .find(|&i| !lines[i].trim().is_empty())
                .map_or(start, |i| i + 1);
            lines.insert(insert_at, wanted);
            end += 1;
        }
    }

    let changed = current.is_none() || lines != original;
    let mut contents = lines.join("\n");
    contents.push('\n');
    Ok(Rendered { contents, changed })
}

/// Effective values of the managed keys (last active assignment wins).
#[must_use]
pub fn read_settings(raw: &str) -> JournalSettings {
    let lines: Vec<String> = raw.lines().map(str::to_string).collect();
    let mut settings = JournalSettings::default();
    let Some((start, end)) = journal_section(&lines) else {
        return settings;
    };
    for line in &lines[start..end] {
        let Some(a) = parse_assignment(line).filter(|a| !a.commented) else {
            continue;
        };
        let slot = match a.key {
            MAX_USE_KEY => &mut settings.max_use,
            KEEP_FREE_KEY => &mut settings.keep_free,
            MAX_FILE_SIZE_KEY => &mut settings.max_file_size,
            _ => continue,
        };
        *slot = Some(a.value.to_string());
    }
    settings
}
