//! Graphite plaintext protocol: `<path> <value> <unix seconds>`.
//!
//! The path is the prefix, then one `key_value` segment per tag from the
//! innermost tag outwards, then the metric name with its dots replaced.

use super::Renderer;
use crate::metric::Metric;

pub const DEFAULT_PREFIX: &str = "bind.dns";

#[derive(Debug, Clone)]
pub struct GraphiteRenderer {
    prefix: String,
}

impl GraphiteRenderer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn path(&self, metric: &Metric) -> String {
        let mut path = self.prefix.clone();
        for tag in metric.tags.iter().rev() {
            path.push('.');
            path.push_str(&segment(&format!("{}_{}", tag.key, tag.value)));
        }
        path.push('.');
        path.push_str(&segment(&metric.name).replace('.', "_"));
        path
    }
}

impl Default for GraphiteRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Renderer for GraphiteRenderer {
    fn name(&self) -> &str {
        "graphite"
    }

    fn render(&self, metrics: &[Metric]) -> Vec<String> {
        metrics
            .iter()
            .map(|m| {
                format!(
                    "{} {} {}",
                    self.path(m),
                    m.value,
                    m.timestamp.timestamp()
                )
            })
            .collect()
    }
}

/// Whitespace would split the plaintext line, so it becomes `_`.
fn segment(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}
