//! Core data models used throughout allure-rag.
//!
//! A [`Report`] is the parsed Allure result tree, a [`Chunk`] is the flat
//! retrievable record derived from one test case, and a [`VectorPoint`] is
//! the indexed form of a chunk inside the vector store.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder rendered for any field missing from the source node.
pub const UNKNOWN: &str = "unknown";

/// A `(name, value)` label attached to a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

/// Outcome of a single test case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestStatus {
    Passed,
    Failed,
    Broken,
    Skipped,
    Other(String),
}

impl TestStatus {
    /// Statuses counted in report summaries, in display order.
    pub const COUNTED: [TestStatus; 4] = [
        TestStatus::Passed,
        TestStatus::Failed,
        TestStatus::Broken,
        TestStatus::Skipped,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Broken => "broken",
            TestStatus::Skipped => "skipped",
            TestStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for TestStatus {
    fn from(raw: String) -> Self {
        match raw.to_lowercase().as_str() {
            "passed" => TestStatus::Passed,
            "failed" => TestStatus::Failed,
            "broken" => TestStatus::Broken,
            "skipped" => TestStatus::Skipped,
            _ => TestStatus::Other(raw),
        }
    }
}

impl From<TestStatus> for String {
    fn from(status: TestStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external link attached to a test case (issue tracker, TMS, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
}

/// One executed test case: a report node carrying a `uid`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TestCase {
    pub uid: String,
    pub name: Option<String>,
    pub labels: Vec<Label>,
    pub status: Option<TestStatus>,
    pub status_message: Option<String>,
    pub status_trace: Option<String>,
    /// Start time as reported (`time.start`, else `timestamp`); seconds or millis.
    pub timestamp: Option<f64>,
    pub links: Vec<Link>,
    /// Raw values of the `jira` field (string or list entries).
    pub jira: Vec<String>,
}

impl TestCase {
    /// Value of the first label called `name`, if any.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    /// Parse a case from a JSON object. Returns `None` when the object has no `uid`.
    pub fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        let uid = obj.get("uid")?;
        let uid = match uid {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let labels = parse_labels(obj);

        let timestamp = obj
            .get("time")
            .and_then(|t| t.get("start"))
            .and_then(Value::as_f64)
            .or_else(|| obj.get("timestamp").and_then(Value::as_f64));

        let links = obj
            .get("links")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|l| Link {
                        kind: string_field(l, "type"),
                        name: string_field(l, "name"),
                        url: string_field(l, "url"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            uid,
            name: string_field(obj, "name"),
            labels,
            status: string_field(obj, "status").map(TestStatus::from),
            status_message: string_field(obj, "statusMessage"),
            status_trace: string_field(obj, "statusTrace"),
            timestamp,
            links,
            jira: parse_jira(obj.get("jira")),
        })
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_labels(obj: &Map<String, Value>) -> Vec<Label> {
    obj.get("labels")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_label).collect())
        .unwrap_or_default()
}

fn parse_label(value: &Value) -> Option<Label> {
    let obj = value.as_object()?;
    let name = obj.get("name")?.as_str()?.to_string();
    let value = match obj.get("value")? {
        Value::String(s) => s.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    Some(Label { name, value })
}

fn parse_jira(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => ["url", "id", "name"]
                    .iter()
                    .find_map(|k| o.get(*k).filter(|v| !v.is_null()))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// A node of the report tree.
///
/// Allure nests groups under `children`; any object that carries a `uid` is a
/// test case. A case may itself have children, which are visited after it.
/// Groups keep their own labels, which take part in team detection.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportNode {
    Case {
        case: TestCase,
        children: Vec<ReportNode>,
    },
    Branch {
        labels: Vec<Label>,
        children: Vec<ReportNode>,
    },
}

impl ReportNode {
    /// Convert an arbitrary JSON value into a report tree.
    ///
    /// Scalars become empty branches so malformed leaves are skipped rather
    /// than rejected.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(obj) => {
                let children = obj
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(ReportNode::from_json).collect())
                    .unwrap_or_default();
                match TestCase::from_object(obj) {
                    Some(case) => ReportNode::Case { case, children },
                    None => ReportNode::Branch {
                        labels: parse_labels(obj),
                        children,
                    },
                }
            }
            Value::Array(items) => ReportNode::Branch {
                labels: Vec::new(),
                children: items.iter().map(ReportNode::from_json).collect(),
            },
            _ => ReportNode::Branch {
                labels: Vec::new(),
                children: Vec::new(),
            },
        }
    }

    /// Labels attached to this node itself.
    pub fn labels(&self) -> &[Label] {
        match self {
            ReportNode::Case { case, .. } => &case.labels,
            ReportNode::Branch { labels, .. } => labels,
        }
    }

    pub fn children(&self) -> &[ReportNode] {
        match self {
            ReportNode::Case { children, .. } | ReportNode::Branch { children, .. } => children,
        }
    }
}

/// A parsed report: the tree plus the identifier found at its root, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub uuid: Option<String>,
    pub root: ReportNode,
}

impl Report {
    pub fn from_json(value: &Value) -> Self {
        let uuid = value.get("uuid").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        Self {
            uuid,
            root: ReportNode::from_json(value),
        }
    }
}

/// One retrievable record derived from a single test case.
///
/// Serialized field names match the chunk files written by the file tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub uid: String,
    pub name: String,
    #[serde(rename = "parentSuite")]
    pub parent_suite: String,
    pub suite: String,
    pub owner: String,
    pub severity: String,
    pub feature: String,
    pub host: String,
    pub status: String,
    #[serde(rename = "statusMessage")]
    pub status_message: String,
    #[serde(rename = "statusTrace")]
    pub status_trace: String,
    pub rag_text: String,
    pub report_uuid: String,
}

/// Payload stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub rag_text: String,
    pub name: String,
    pub status: String,
    pub suite: String,
    pub uid: String,
    pub team: String,
    pub report_uuid: String,
    /// Unix millis at which the owning report was indexed.
    #[serde(default)]
    pub ingested_at: i64,
}

/// A vector ready to be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    /// Deterministic logical id: `"{team}_{report_id}_{index}"`.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

impl VectorPoint {
    pub fn point_id(team: &str, report_id: &str, index: usize) -> String {
        format!("{}_{}_{}", team, report_id, index)
    }
}

/// A point read back from the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPoint {
    pub id: String,
    pub payload: PointPayload,
    /// Similarity score for search results; `None` for scrolled points.
    pub score: Option<f32>,
}

/// Natural-language analysis produced for a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub team: String,
    pub analysis: String,
}
