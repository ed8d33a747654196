use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-batch statistics. Accumulated totals are the element-wise sum of
/// these across all completed batches, and every mutation of the
/// checkpoint ledger must preserve that equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchStats {
    #[serde(default)]
    pub commits: u64,
    #[serde(default)]
    pub sessions: u64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub entities_created: u64,
    #[serde(default)]
    pub entities_updated: u64,
    #[serde(default)]
    pub relations_added: u64,
    /// Optional sub-results keyed by operator name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub per_operator: BTreeMap<String, OperatorStats>,
}

/// Counts contributed by a single pipeline operator within one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OperatorStats {
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub entities_created: u64,
    #[serde(default)]
    pub entities_updated: u64,
    #[serde(default)]
    pub relations_added: u64,
}

impl OperatorStats {
    fn add(&mut self, other: &OperatorStats) {
        self.tokens_used += other.tokens_used;
        self.entities_created += other.entities_created;
        self.entities_updated += other.entities_updated;
        self.relations_added += other.relations_added;
    }

    fn subtract_clamped(&mut self, other: &OperatorStats) {
        self.tokens_used = self.tokens_used.saturating_sub(other.tokens_used);
        self.entities_created = self.entities_created.saturating_sub(other.entities_created);
        self.entities_updated = self.entities_updated.saturating_sub(other.entities_updated);
        self.relations_added = self.relations_added.saturating_sub(other.relations_added);
    }

    fn is_zero(&self) -> bool {
        self.tokens_used == 0
            && self.entities_created == 0
            && self.entities_updated == 0
            && self.relations_added == 0
    }
}

impl BatchStats {
    /// Element-wise addition, including per-operator sub-results.
    pub fn add(&mut self, other: &BatchStats) {
        self.commits += other.commits;
        self.sessions += other.sessions;
        self.tokens_used += other.tokens_used;
        self.entities_created += other.entities_created;
        self.entities_updated += other.entities_updated;
        self.relations_added += other.relations_added;
        for (name, op) in &other.per_operator {
            self.per_operator.entry(name.clone()).or_default().add(op);
        }
    }

    /// Element-wise subtraction, clamped at zero so bookkeeping errors can
    /// never drive totals negative. Operator entries that reach all-zero
    /// are dropped.
    pub fn subtract_clamped(&mut self, other: &BatchStats) {
        self.commits = self.commits.saturating_sub(other.commits);
        self.sessions = self.sessions.saturating_sub(other.sessions);
        self.tokens_used = self.tokens_used.saturating_sub(other.tokens_used);
        self.entities_created = self.entities_created.saturating_sub(other.entities_created);
        self.entities_updated = self.entities_updated.saturating_sub(other.entities_updated);
        self.relations_added = self.relations_added.saturating_sub(other.relations_added);
        for (name, op) in &other.per_operator {
            if let Some(mine) = self.per_operator.get_mut(name) {
                mine.subtract_clamped(op);
            }
        }
        self.per_operator.retain(|_, op| !op.is_zero());
    }

    /// Sum a sequence of stats into a fresh total.
    pub fn sum<'a>(all: impl IntoIterator<Item = &'a BatchStats>) -> BatchStats {
        let mut total = BatchStats::default();
        for s in all {
            total.add(s);
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.commits == 0
            && self.sessions == 0
            && self.tokens_used == 0
            && self.entities_created == 0
            && self.entities_updated == 0
            && self.relations_added == 0
            && self.per_operator.is_empty()
    }
}
