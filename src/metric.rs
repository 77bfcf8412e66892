//! Flattened metric model shared by every statistics parser and renderer.
//!
//! A `Metric` is one timestamped numeric observation. Its tag list encodes
//! the nesting it was found under, outermost scope first.

use chrono::{DateTime, Utc};

/// One level of hierarchical context (view, zone, record-type category, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Build a tag, replacing `.` in the value with `_` so zone names and
    /// addresses cannot split a dotted metric path.
    pub fn new(key: impl Into<String>, value: impl AsRef<str>) -> Self {
        Self {
            key: key.into(),
            value: value.as_ref().replace('.', "_"),
        }
    }
}

/// A single flattened statistic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    pub name: String,
    pub value: i64,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<Tag>,
}

#[cfg(test)]
impl Metric {
    /// Value of the innermost tag with the given key, if any.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.timestamp, self.name, self.value)
    }
}

/// Accumulates metrics for one snapshot.
///
/// Every metric recorded through a batch shares the snapshot timestamp and
/// gets a copy of the caller's fully-built tag scope, so no metric is touched
/// again once it has been pushed.
#[derive(Debug)]
pub struct MetricBatch {
    timestamp: DateTime<Utc>,
    metrics: Vec<Metric>,
}

impl MetricBatch {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            metrics: Vec::new(),
        }
    }

    /// Append one metric tagged with `scope`. Unnamed leaves are skipped.
    pub fn record(&mut self, name: &str, value: i64, scope: &[Tag]) {
        let name = name.trim();
        if name.is_empty() {
            tracing::debug!(value, "skipping unnamed statistic");
            return;
        }
        self.metrics.push(Metric {
            name: name.to_string(),
            value,
            timestamp: self.timestamp,
            tags: scope.to_vec(),
        });
    }

    pub fn into_metrics(self) -> Vec<Metric> {
        self.metrics
    }
}

/// Extend a parent scope with additional inner tags.
pub fn scope(parent: &[Tag], inner: impl IntoIterator<Item = Tag>) -> Vec<Tag> {
    let mut tags = parent.to_vec();
    tags.extend(inner);
    tags
}
