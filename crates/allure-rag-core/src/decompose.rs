//! Report decomposition: nested Allure tree → flat [`Chunk`] records.
//!
//! The walk is depth-first pre-order, so chunk order (and therefore the
//! `{index}` part of every vector point id) is stable for a given report.
//! Every chunk carries a `rag_text` built from a fixed template; missing
//! labels render as `"unknown"` so the line layout never shifts.

use crate::error::{RagError, Result};
use crate::models::{Chunk, Report, ReportNode, TestCase, UNKNOWN};

/// Label names copied into every chunk.
pub const PARENT_SUITE: &str = "parentSuite";
pub const SUITE: &str = "suite";
pub const OWNER: &str = "owner";
pub const SEVERITY: &str = "severity";
pub const FEATURE: &str = "feature";
pub const HOST: &str = "host";

/// Collect every test case under `node`, in depth-first pre-order.
pub fn extract_cases(node: &ReportNode) -> Vec<&TestCase> {
    let mut out = Vec::new();
    walk(node, &mut out);
    out
}

fn walk<'a>(node: &'a ReportNode, out: &mut Vec<&'a TestCase>) {
    match node {
        ReportNode::Case { case, children } => {
            out.push(case);
            for child in children {
                walk(child, out);
            }
        }
        ReportNode::Branch { children, .. } => {
            for child in children {
                walk(child, out);
            }
        }
    }
}

/// Build the chunk for one test case.
pub fn build_chunk(case: &TestCase, report_uuid: &str) -> Chunk {
    let label = |name: &str| case.label(name).unwrap_or(UNKNOWN).to_string();

    let mut chunk = Chunk {
        uid: case.uid.clone(),
        name: case.name.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        parent_suite: label(PARENT_SUITE),
        suite: label(SUITE),
        owner: label(OWNER),
        severity: label(SEVERITY),
        feature: label(FEATURE),
        host: label(HOST),
        status: case
            .status
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        status_message: case.status_message.as_deref().unwrap_or("").trim().to_string(),
        status_trace: case.status_trace.as_deref().unwrap_or("").trim().to_string(),
        rag_text: String::new(),
        report_uuid: report_uuid.to_string(),
    };
    chunk.rag_text = rag_text(&chunk);
    chunk
}

/// Render the retrievable text of a chunk.
///
/// Line order and labels are part of the stored format; existing indexes
/// depend on them byte for byte.
pub fn rag_text(chunk: &Chunk) -> String {
    format!(
        "Название теста: {}\n\
         Команда: {}\n\
         Модуль: {}\n\
         Владелец: {}\n\
         Серьёзность: {}\n\
         Фича: {}\n\
         Хост: {}\n\
         Статус: {}\n\
         Сообщение: {}\n\
         Трейс: {}",
        chunk.name,
        chunk.parent_suite,
        chunk.suite,
        chunk.owner,
        chunk.severity,
        chunk.feature,
        chunk.host,
        chunk.status,
        chunk.status_message,
        chunk.status_trace,
    )
}

/// Decompose a whole report into chunks.
///
/// `report_uuid` falls back to the root `uuid` field, then to `"unknown"`.
/// A report without test cases yields an empty vector, not an error.
pub fn decompose(report: &Report, report_uuid: Option<&str>) -> Vec<Chunk> {
    let report_uuid = report_uuid
        .map(str::to_string)
        .or_else(|| report.uuid.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    extract_cases(&report.root)
        .into_iter()
        .map(|case| build_chunk(case, &report_uuid))
        .collect()
}

/// Derive the team name of a report.
///
/// Uses the first `parentSuite` label found in pre-order over every node,
/// groups included, falling back to the first `suite` label.
pub fn extract_team(report: &Report) -> Result<String> {
    first_label(&report.root, PARENT_SUITE)
        .or_else(|| first_label(&report.root, SUITE))
        .map(str::to_string)
        .ok_or_else(|| RagError::validation("team name (parentSuite) not found in report"))
}

fn first_label<'a>(node: &'a ReportNode, name: &str) -> Option<&'a str> {
    node.labels()
        .iter()
        .find(|l| l.name == name && !l.value.is_empty())
        .map(|l| l.value.as_str())
        .or_else(|| node.children().iter().find_map(|c| first_label(c, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_report() -> Report {
        Report::from_json(&json!({
            "uuid": "r-1",
            "children": [
                {
                    "name": "group",
                    "children": [
                        {
                            "uid": "a",
                            "name": "login works",
                            "status": "passed",
                            "labels": [
                                {"name": "parentSuite", "value": "TeamA"},
                                {"name": "suite", "value": "auth"},
                                {"name": "owner", "value": "ivan"}
                            ],
                            "statusMessage": "  ok  \n"
                        },
                        {
                            "uid": "b",
                            "name": "logout works",
                            "status": "failed",
                            "labels": [{"name": "parentSuite", "value": "TeamA"}],
                            "statusTrace": null,
                            "children": [{"uid": "c", "name": "nested"}]
                        }
                    ]
                },
                [{"uid": "d", "name": "in a list"}],
                42
            ]
        }))
    }

    #[test]
    fn test_extract_cases_preorder() {
        let report = sample_report();
        let uids: Vec<&str> = extract_cases(&report.root)
            .iter()
            .map(|c| c.uid.as_str())
            .collect();
        assert_eq!(uids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_missing_labels_render_unknown() {
        let report = sample_report();
        let chunks = decompose(&report, None);
        let c = &chunks[2];
        assert_eq!(c.parent_suite, "unknown");
        assert_eq!(c.status, "unknown");
        assert!(c.rag_text.contains("Команда: unknown"));
        assert!(c.rag_text.contains("Хост: unknown"));
        assert_eq!(c.rag_text.lines().count(), 10);
    }

    #[test]
    fn test_status_message_trimmed_and_null_is_empty() {
        let chunks = decompose(&sample_report(), Some("given"));
        assert_eq!(chunks[0].status_message, "ok");
        assert_eq!(chunks[1].status_trace, "");
        assert!(chunks.iter().all(|c| c.report_uuid == "given"));
    }

    #[test]
    fn test_report_uuid_fallbacks() {
        let chunks = decompose(&sample_report(), None);
        assert_eq!(chunks[0].report_uuid, "r-1");

        let bare = Report::from_json(&json!([{"uid": "x", "name": "t"}]));
        assert_eq!(decompose(&bare, None)[0].report_uuid, "unknown");
    }

    #[test]
    fn test_rag_text_exact_layout() {
        let chunks = decompose(&sample_report(), None);
        assert_eq!(
            chunks[0].rag_text,
            "Название теста: login works\nКоманда: TeamA\nМодуль: auth\nВладелец: ivan\n\
             Серьёзность: unknown\nФича: unknown\nХост: unknown\nСтатус: passed\n\
             Сообщение: ok\nТрейс: "
        );
    }

    #[test]
    fn test_first_matching_label_wins() {
        let report = Report::from_json(&json!([{
            "uid": "x",
            "name": "dup",
            "labels": [
                {"name": "owner", "value": "first"},
                {"name": "owner", "value": "second"}
            ]
        }]));
        assert_eq!(decompose(&report, None)[0].owner, "first");
    }

    #[test]
    fn test_empty_report_yields_no_chunks() {
        let report = Report::from_json(&json!({"children": []}));
        assert!(decompose(&report, Some("r")).is_empty());
    }

    #[test]
    fn test_extract_team() {
        assert_eq!(extract_team(&sample_report()).unwrap(), "TeamA");

        let suite_only = Report::from_json(&json!([
            {"uid": "x", "labels": [{"name": "suite", "value": "Fallback"}]}
        ]));
        assert_eq!(extract_team(&suite_only).unwrap(), "Fallback");

        let group_only = Report::from_json(&json!({
            "name": "root",
            "children": [{
                "name": "web/api",
                "labels": [{"name": "parentSuite", "value": "GroupTeam"}],
                "children": [{"uid": "x", "labels": [{"name": "suite", "value": "auth"}]}]
            }]
        }));
        assert_eq!(extract_team(&group_only).unwrap(), "GroupTeam");

        let none = Report::from_json(&json!([{"uid": "x"}]));
        assert!(matches!(extract_team(&none), Err(RagError::Validation(_))));
    }
}
