//! Prometheus text exposition.
//!
//! Metrics are grouped by the tag values that are not their own name, so
//! every query type counted under the same view and category lands in one
//! `<group>_total` family with a `name` label per member.

use super::Renderer;
use crate::metric::Metric;

/// Category tag values that make a metric a Prometheus counter.
const CATEGORIES: &[&str] = &[
    "qtype",
    "rcode",
    "nsstat",
    "zonestat",
    "resstats",
    "cache",
    "adbstat",
    "gluecache",
    "cachestats",
    "opcodes",
    "request-size",
    "response-size",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusRenderer;

impl Renderer for PrometheusRenderer {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn render(&self, metrics: &[Metric]) -> Vec<String> {
        // (family, member lines) in first-seen order
        let mut families: Vec<(String, Vec<String>)> = Vec::new();
        let mut dropped = 0usize;

        for metric in metrics {
            if !is_counter(metric) {
                dropped += 1;
                continue;
            }
            let family = family_name(metric);
            let line = sample(&family, metric);
            match families.iter_mut().find(|(name, _)| *name == family) {
                Some((_, lines)) => lines.push(line),
                None => families.push((family, vec![line])),
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "metrics without a counter category not rendered");
        }

        let mut out = Vec::new();
        for (family, lines) in families {
            out.push(format!("# HELP {family}_total BIND nameserver statistics counter"));
            out.push(format!("# TYPE {family}_total counter"));
            out.extend(lines);
        }
        out
    }
}

fn is_counter(metric: &Metric) -> bool {
    metric
        .tags
        .iter()
        .any(|t| CATEGORIES.contains(&t.value.as_str()))
}

/// `bind_` followed by every tag value except the metric's own name.
fn family_name(metric: &Metric) -> String {
    let mut family = String::from("bind");
    for tag in &metric.tags {
        if tag.value == metric.name {
            continue;
        }
        let value = if tag.key == "view" {
            tag.value.trim_start_matches('_')
        } else {
            tag.value.as_str()
        };
        if value.is_empty() {
            continue;
        }
        family.push('_');
        family.push_str(value);
    }
    sanitize(&family)
}

fn sample(family: &str, metric: &Metric) -> String {
    let mut labels: Vec<String> = metric
        .tags
        .iter()
        .map(|t| format!("{}=\"{}\"", sanitize(&t.key), escape(&t.value)))
        .collect();
    labels.push(format!("name=\"{}\"", escape(&metric.name)));
    format!(
        "{family}_total{{{}}} {} {}",
        labels.join(","),
        metric.value,
        metric.timestamp.timestamp_millis()
    )
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn escape(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Tag;
    use chrono::DateTime;

    fn metric(name: &str, value: i64, tags: Vec<Tag>) -> Metric {
        Metric {
            name: name.into(),
            value,
            timestamp: DateTime::from_timestamp(1000, 0).unwrap(),
            tags,
        }
    }

    fn qtype(name: &str, value: i64) -> Metric {
        metric(
            name,
            value,
            vec![Tag::new("view", "_default"), Tag::new("type", "qtype")],
        )
    }

    #[test]
    fn shared_tags_form_one_family_with_one_header() {
        let lines = PrometheusRenderer.render(&[qtype("A", 42), qtype("AAAA", 7)]);
        assert_eq!(
            lines,
            vec![
                "# HELP bind_default_qtype_total BIND nameserver statistics counter",
                "# TYPE bind_default_qtype_total counter",
                r#"bind_default_qtype_total{view="_default",type="qtype",name="A"} 42 1000000"#,
                r#"bind_default_qtype_total{view="_default",type="qtype",name="AAAA"} 7 1000000"#,
            ]
        );
    }

    #[test]
    fn families_keep_first_seen_order() {
        let rcode = metric("NOERROR", 5, vec![Tag::new("server", "rcode")]);
        let lines = PrometheusRenderer.render(&[qtype("A", 1), rcode, qtype("MX", 2)]);
        let headers: Vec<_> = lines.iter().filter(|l| l.starts_with("# TYPE")).collect();
        assert_eq!(
            headers,
            vec![
                "# TYPE bind_default_qtype_total counter",
                "# TYPE bind_rcode_total counter"
            ]
        );
        assert!(lines[3].contains(r#"name="MX""#));
    }

    #[test]
    fn metrics_outside_categories_are_dropped() {
        let socket = metric(
            "udp4",
            1,
            vec![Tag::new("server", "socketmgr"), Tag::new("type", "udp")],
        );
        assert!(PrometheusRenderer.render(&[socket]).is_empty());
    }

    #[test]
    fn traffic_sizes_are_counters_with_sanitized_labels() {
        let bucket = metric(
            "96-111",
            7,
            vec![
                Tag::new("ipver", "ipv6"),
                Tag::new("protocol", "tcp"),
                Tag::new("type", "response-size"),
            ],
        );
        let lines = PrometheusRenderer.render(&[bucket]);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[2],
            r#"bind_ipv6_tcp_response_size_total{ipver="ipv6",protocol="tcp",type="response-size",name="96-111"} 7 1000000"#
        );
    }

    #[test]
    fn repeated_keys_and_dashed_keys() {
        let m = metric(
            "QrySuccess",
            17,
            vec![
                Tag::new("view", "_default"),
                Tag::new("zone", "example.com"),
                Tag::new("type", "primary"),
                Tag::new("type", "rcode"),
                Tag::new("local-address", "x"),
            ],
        );
        let lines = PrometheusRenderer.render(&[m]);
        assert_eq!(
            lines[2],
            r#"bind_default_example_com_primary_rcode_x_total{view="_default",zone="example_com",type="primary",type="rcode",local_address="x",name="QrySuccess"} 17 1000000"#
        );
    }

    #[test]
    fn tag_equal_to_name_is_left_out_of_family() {
        let m = metric("cache", 3, vec![Tag::new("type", "cache")]);
        let lines = PrometheusRenderer.render(&[m]);
        assert_eq!(lines[1], "# TYPE bind_total counter");
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape(r#"a"b\c"#), r#"a\"b\\c"#);
    }
}
