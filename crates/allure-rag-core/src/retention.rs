//! Per-team retention window: keep the N most recent reports, evict the rest.
//!
//! The same [`RetentionPolicy`] drives both storage tiers. The file tier
//! orders whole files by modification time; the vector tier groups points by
//! their `report_uuid` payload and orders groups by an injectable
//! [`EvictionOrder`].

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::StoredPoint;

/// Reports kept per team in each tier.
pub const DEFAULT_RETAINED_REPORTS: usize = 3;

/// How vector-tier report groups are ranked by recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionOrder {
    /// Latest `ingested_at` payload value in the group; ties broken by report id.
    #[default]
    IngestedAt,
    /// Lexicographic report id. Only meaningful when ids grow with time.
    ReportId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub keep: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep: DEFAULT_RETAINED_REPORTS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(keep: usize) -> Self {
        Self { keep: keep.max(1) }
    }

    /// Split `items` into the `keep` most recent (newest first) and the rest.
    ///
    /// Used after a unit has been written: the new unit competes with the
    /// existing ones.
    pub fn split<T, K: Ord>(&self, items: Vec<T>, recency: impl Fn(&T) -> K) -> (Vec<T>, Vec<T>) {
        split_newest(items, self.keep, recency)
    }

    /// Plan vector-tier eviction for an incoming report, before it is inserted.
    ///
    /// Groups other than `incoming` are ranked oldest to newest; when at least
    /// `keep` of them exist, the oldest are evicted until `keep - 1` remain,
    /// leaving room for the incoming group. Points already stored under
    /// `incoming` are returned separately so the caller can replace them.
    pub fn plan_vector_eviction(
        &self,
        points: Vec<StoredPoint>,
        incoming: &str,
        order: EvictionOrder,
    ) -> EvictionPlan {
        let mut groups = group_by_report(points);
        let replaced = groups
            .iter()
            .position(|g| g.report_uuid == incoming)
            .map(|i| groups.remove(i));

        let (kept, evicted) = if groups.len() >= self.keep {
            split_newest(groups, self.keep.saturating_sub(1), |g| {
                g.recency_key(order)
            })
        } else {
            (groups, Vec::new())
        };

        EvictionPlan {
            kept,
            evicted,
            replaced,
        }
    }
}

/// Points of one report inside the vector tier.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportGroup {
    pub report_uuid: String,
    pub point_ids: Vec<String>,
    pub ingested_at: i64,
}

impl ReportGroup {
    fn recency_key(&self, order: EvictionOrder) -> (i64, String) {
        match order {
            EvictionOrder::IngestedAt => (self.ingested_at, self.report_uuid.clone()),
            EvictionOrder::ReportId => (0, self.report_uuid.clone()),
        }
    }
}

/// Outcome of [`RetentionPolicy::plan_vector_eviction`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvictionPlan {
    /// Surviving groups, newest first.
    pub kept: Vec<ReportGroup>,
    /// Groups to delete, newest first.
    pub evicted: Vec<ReportGroup>,
    /// Existing points of the incoming report, to be replaced.
    pub replaced: Option<ReportGroup>,
}

impl EvictionPlan {
    /// Every point id that must be deleted before the incoming report is inserted.
    pub fn ids_to_delete(&self) -> Vec<String> {
        self.evicted
            .iter()
            .chain(self.replaced.iter())
            .flat_map(|g| g.point_ids.iter().cloned())
            .collect()
    }
}

/// Group stored points by their `report_uuid` payload, sorted by report id.
pub fn group_by_report(points: Vec<StoredPoint>) -> Vec<ReportGroup> {
    let mut by_report: BTreeMap<String, ReportGroup> = BTreeMap::new();
    for point in points {
        let group = by_report
            .entry(point.payload.report_uuid.clone())
            .or_insert_with(|| ReportGroup {
                report_uuid: point.payload.report_uuid.clone(),
                point_ids: Vec::new(),
                ingested_at: i64::MIN,
            });
        group.ingested_at = group.ingested_at.max(point.payload.ingested_at);
        group.point_ids.push(point.id);
    }
    by_report.into_values().collect()
}

fn split_newest<T, K: Ord>(
    mut items: Vec<T>,
    keep: usize,
    recency: impl Fn(&T) -> K,
) -> (Vec<T>, Vec<T>) {
    items.sort_by(|a, b| recency(b).cmp(&recency(a)));
    let evicted = if items.len() > keep {
        items.split_off(keep)
    } else {
        Vec::new()
    };
    (items, evicted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointPayload;

    fn point(report: &str, index: usize, ingested_at: i64) -> StoredPoint {
        StoredPoint {
            id: format!("T_{}_{}", report, index),
            payload: PointPayload {
                rag_text: String::new(),
                name: String::new(),
                status: String::new(),
                suite: String::new(),
                uid: String::new(),
                team: "T".to_string(),
                report_uuid: report.to_string(),
                ingested_at,
            },
            score: None,
        }
    }

    #[test]
    fn test_split_keeps_newest() {
        let policy = RetentionPolicy::default();
        let (kept, evicted) = policy.split(vec![1, 5, 3, 4, 2], |v| *v);
        assert_eq!(kept, vec![5, 4, 3]);
        assert_eq!(evicted, vec![2, 1]);
    }

    #[test]
    fn test_no_eviction_below_window() {
        let policy = RetentionPolicy::default();
        let points = vec![point("a", 0, 1), point("b", 0, 2)];
        let plan = policy.plan_vector_eviction(points, "c", EvictionOrder::IngestedAt);
        assert!(plan.evicted.is_empty());
        assert!(plan.ids_to_delete().is_empty());
    }

    #[test]
    fn test_three_groups_evicted_down_to_two() {
        let policy = RetentionPolicy::default();
        let points = vec![
            point("zzz", 0, 100),
            point("zzz", 1, 100),
            point("mmm", 0, 300),
            point("aaa", 0, 200),
        ];
        let plan = policy.plan_vector_eviction(points, "new", EvictionOrder::IngestedAt);
        let kept: Vec<&str> = plan.kept.iter().map(|g| g.report_uuid.as_str()).collect();
        assert_eq!(kept, vec!["mmm", "aaa"]);
        assert_eq!(plan.ids_to_delete(), vec!["T_zzz_0", "T_zzz_1"]);
    }

    #[test]
    fn test_report_id_order_is_lexicographic() {
        let policy = RetentionPolicy::default();
        let points = vec![point("b", 0, 1), point("c", 0, 1), point("a", 0, 99)];
        let plan = policy.plan_vector_eviction(points, "d", EvictionOrder::ReportId);
        assert_eq!(plan.evicted.len(), 1);
        assert_eq!(plan.evicted[0].report_uuid, "a");
    }

    #[test]
    fn test_reingest_is_not_double_counted() {
        let policy = RetentionPolicy::default();
        let points = vec![
            point("a", 0, 1),
            point("b", 0, 2),
            point("c", 0, 3),
            point("c", 1, 3),
        ];
        let plan = policy.plan_vector_eviction(points, "c", EvictionOrder::IngestedAt);
        assert!(plan.evicted.is_empty());
        let replaced = plan.replaced.as_ref().unwrap();
        assert_eq!(replaced.point_ids.len(), 2);
        assert_eq!(plan.ids_to_delete(), vec!["T_c_0", "T_c_1"]);
    }
}
