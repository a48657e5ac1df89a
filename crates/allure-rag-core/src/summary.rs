//! Human-readable summary of a single report.
//!
//! Prepended to the generated analysis before delivery: report date, one
//! line per status count, team, initiators, Jira links and duplicated test
//! names. Lines are joined with `<br>` for the downstream HTML renderer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::DateTime;

use crate::decompose::{PARENT_SUITE, SUITE};
use crate::models::{TestCase, TestStatus};

const NONE_RU: &str = "нет";
const INITIATOR_LABELS: [&str; 3] = ["owner", "user", "initiator"];

/// Facts collected from a report before formatting.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportInfo {
    /// Earliest start time, in unix seconds.
    pub timestamp: i64,
    pub team: String,
    /// Counts for passed, failed, broken, skipped, in that order.
    pub status_counts: [usize; 4],
    pub initiators: Vec<String>,
    pub jira_links: Vec<String>,
    pub duplicates: Vec<String>,
}

impl ReportInfo {
    pub fn total(&self) -> usize {
        self.status_counts.iter().sum()
    }
}

/// Millisecond timestamps are converted to seconds.
fn normalize_timestamp(ts: f64) -> i64 {
    if ts > 1e10 {
        (ts / 1000.0) as i64
    } else {
        ts as i64
    }
}

fn format_date(ts: i64) -> String {
    DateTime::from_timestamp(ts.max(0), 0)
        .unwrap_or_default()
        .format("%d.%m.%Y (%H:%M)")
        .to_string()
}

pub fn extract_report_info(cases: &[&TestCase], fallback_timestamp: i64) -> ReportInfo {
    let mut earliest: Option<f64> = None;
    let mut teams = BTreeSet::new();
    let mut counts = [0usize; 4];
    let mut initiators = BTreeSet::new();
    let mut jira = BTreeSet::new();
    let mut names: BTreeMap<&str, usize> = BTreeMap::new();

    for case in cases {
        if let Some(ts) = case.timestamp {
            earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
        }

        let team = case
            .label(PARENT_SUITE)
            .filter(|v| !v.is_empty())
            .or_else(|| case.label(SUITE).filter(|v| !v.is_empty()));
        if let Some(team) = team {
            teams.insert(team.to_string());
        }

        for label in &case.labels {
            if INITIATOR_LABELS.contains(&label.name.as_str()) && !label.value.is_empty() {
                initiators.insert(label.value.clone());
            }
        }

        if let Some(status) = &case.status {
            if let Some(i) = TestStatus::COUNTED.iter().position(|s| s == status) {
                counts[i] += 1;
            }
        }

        for link in &case.links {
            let kind = link
                .kind
                .as_deref()
                .or(link.name.as_deref())
                .unwrap_or("")
                .to_lowercase();
            if kind.contains("jira") {
                if let Some(url) = link.url.as_deref().filter(|u| !u.is_empty()) {
                    jira.insert(url.to_string());
                }
            }
        }
        jira.extend(case.jira.iter().cloned());

        if let Some(name) = case.name.as_deref().filter(|n| !n.is_empty()) {
            *names.entry(name).or_default() += 1;
        }
    }

    let timestamp = earliest
        .map(normalize_timestamp)
        .unwrap_or(fallback_timestamp);

    ReportInfo {
        timestamp,
        team: teams.into_iter().collect::<Vec<_>>().join("_"),
        status_counts: counts,
        initiators: initiators.into_iter().collect(),
        jira_links: jira.into_iter().collect(),
        duplicates: names
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name.to_string())
            .collect(),
    }
}

fn status_color(status: &str) -> Option<&'static str> {
    match status {
        "passed" => Some("green"),
        "failed" => Some("red"),
        "broken" => Some("orange"),
        "skipped" => Some("gray"),
        "total" => Some("blue"),
        _ => None,
    }
}

fn format_status(status: &str, count: usize, color: bool) -> String {
    match status_color(status).filter(|_| color) {
        Some(c) => format!(r#"<span style="color:{};">{}={}</span>"#, c, status, count),
        None => format!("{}={}", status, count),
    }
}

/// Render the summary of a report.
pub fn format_report_summary(cases: &[&TestCase], color: bool, fallback_timestamp: i64) -> String {
    let info = extract_report_info(cases, fallback_timestamp);

    let mut lines = vec![format!("**{}**:", format_date(info.timestamp))];
    for (status, count) in TestStatus::COUNTED.iter().zip(info.status_counts) {
        lines.push(format_status(status.as_str(), count, color));
    }
    lines.push(format_status("total", info.total(), color));

    if !info.team.is_empty() {
        lines.push(format!("**Команда**: {}", info.team));
    }

    let initiators = if info.initiators.is_empty() {
        NONE_RU.to_string()
    } else {
        info.initiators.join(", ")
    };
    lines.push(format!("**Инициаторы**: {}", initiators));

    for link in &info.jira_links {
        lines.push(format!("**jira**: {}", link));
    }

    let duplicates = if info.duplicates.is_empty() {
        NONE_RU.to_string()
    } else {
        info.duplicates.join(", ")
    };
    lines.push(format!("**Дубликаты**: {}", duplicates));

    lines.join("<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::extract_cases;
    use crate::models::Report;
    use serde_json::json;

    fn report() -> Report {
        Report::from_json(&json!([
            {
                "uid": "1", "name": "a", "status": "passed",
                "time": {"start": 1_700_000_000_000i64},
                "labels": [{"name": "parentSuite", "value": "TeamA"}, {"name": "owner", "value": "bob"}],
                "links": [{"type": "jira", "url": "https://jira/X-1"}]
            },
            {
                "uid": "2", "name": "a", "status": "FAILED",
                "timestamp": 1_600_000_000,
                "labels": [{"name": "suite", "value": "TeamB"}, {"name": "initiator", "value": "amy"}],
                "jira": ["X-2", {"id": "X-3"}]
            },
            {"uid": "3", "name": "b", "status": "unknown-status"}
        ]))
    }

    #[test]
    fn test_extract_report_info() {
        let report = report();
        let cases = extract_cases(&report.root);
        let info = extract_report_info(&cases, 0);
        assert_eq!(info.timestamp, 1_600_000_000);
        assert_eq!(info.team, "TeamA_TeamB");
        assert_eq!(info.status_counts, [1, 1, 0, 0]);
        assert_eq!(info.initiators, vec!["amy", "bob"]);
        assert_eq!(info.jira_links, vec!["X-2", "X-3", "https://jira/X-1"]);
        assert_eq!(info.duplicates, vec!["a"]);
    }

    #[test]
    fn test_plain_summary_layout() {
        let report = report();
        let cases = extract_cases(&report.root);
        let summary = format_report_summary(&cases, false, 0);
        let lines: Vec<&str> = summary.split("<br>").collect();
        assert_eq!(lines[0], "**13.09.2020 (12:26)**:");
        assert_eq!(
            &lines[1..6],
            &["passed=1", "failed=1", "broken=0", "skipped=0", "total=2"]
        );
        assert_eq!(lines[6], "**Команда**: TeamA_TeamB");
        assert_eq!(lines[7], "**Инициаторы**: amy, bob");
        assert_eq!(lines.last().copied(), Some("**Дубликаты**: a"));
    }

    #[test]
    fn test_colored_and_empty_report() {
        let summary = format_report_summary(&[], true, 0);
        assert!(summary.starts_with("**01.01.1970 (00:00)**:"));
        assert!(summary.contains(r#"<span style="color:blue;">total=0</span>"#));
        assert!(summary.contains("**Инициаторы**: нет"));
        assert!(summary.ends_with("**Дубликаты**: нет"));
        assert!(!summary.contains("Команда"));
    }
}
