//! Output renderers. Each turns the parsed metric list into printable lines
//! without touching the metrics themselves.

pub mod graphite;
pub mod prometheus;

use crate::config::OutputFormat;
use crate::metric::Metric;

pub use graphite::GraphiteRenderer;
pub use prometheus::PrometheusRenderer;

/// Renders a metric list into output lines.
pub trait Renderer {
    /// Short format name, used in logs.
    fn name(&self) -> &str;

    /// Render every metric this format supports, in input order.
    fn render(&self, metrics: &[Metric]) -> Vec<String>;
}

/// Build the renderer for an output format.
pub fn renderer_for(format: OutputFormat, graphite_prefix: &str) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Graphite => Box::new(GraphiteRenderer::new(graphite_prefix)),
        OutputFormat::Prometheus => Box::new(PrometheusRenderer),
    }
}
