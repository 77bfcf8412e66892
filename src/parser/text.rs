//! Parser for the `named.stats` text dump (`rndc stats`).
//!
//! The dump is a flat sequence of lines. Section headers (`++ name ++`) reset
//! context; bracketed headers (`[View: x]`, `[zone]`, ...) narrow it for every
//! following metric line until the next section header. Headers are never
//! popped individually.

use super::ParseError;
use crate::metric::{Metric, MetricBatch, Tag};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static DUMP_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]{3} Statistics Dump [-+]{3} \((?P<unixtime>[0-9]*)\)$").unwrap()
});
static SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+\+ (?P<section>[a-zA-Z0-9_/ ]+) \+\+$").unwrap());
static METRIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<value>[0-9]+) (?P<name>[-a-zA-Z0-9_/!#()<> ]+)\s*$").unwrap()
});
static VIEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[View: (?P<view>[a-zA-Z0-9_/ ]+)\]$").unwrap());
static VIEW_CACHE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[View: (?P<view>[a-zA-Z0-9_/ ]+) \(Cache: (?P<cache>[a-zA-Z0-9_/ ]+)\)\]$")
        .unwrap()
});
static SUBSECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(?P<subsection>[-a-zA-Z0-9_/!#()<>]+)\]$").unwrap());
static ZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(?P<zone>\.|[a-zA-Z0-9_-]+(?:\.[a-zA-Z0-9_-]+)+\.?|(?:[0-9A-Fa-f]+\.)*(?:IN-ADDR|IP6|HOME|EMPTY\.AS112)\.ARPA)\]$",
    )
    .unwrap()
});
static BIND_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(?P<bind_var>[a-z.]+) \(view: _bind\)\]$").unwrap());

/// Classification of a single dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineKind<'a> {
    /// `--- Statistics Dump --- (<unixtime>)`; `None` when the time is blank.
    DumpMarker(Option<i64>),
    Section(&'a str),
    Metric { value: i64, name: &'a str },
    View(&'a str),
    ViewCache { view: &'a str, cache: &'a str },
    Subsection(&'a str),
    Zone(&'a str),
    BindVar(&'a str),
    Blank,
    Unrecognized,
}

/// Classify a line. Matchers run in a fixed priority order because some
/// patterns would also accept lines meant for a later one.
fn classify(line: &str) -> LineKind<'_> {
    if let Some(c) = DUMP_MARKER.captures(line) {
        let unixtime = c.name("unixtime").and_then(|m| m.as_str().parse().ok());
        return LineKind::DumpMarker(unixtime);
    }
    if let Some(c) = SECTION.captures(line) {
        return LineKind::Section(c.name("section").map_or("", |m| m.as_str()));
    }
    if let Some(c) = METRIC.captures(line) {
        let value = c
            .name("value")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let name = c.name("name").map_or("", |m| m.as_str().trim());
        return LineKind::Metric { value, name };
    }
    if let Some(c) = VIEW.captures(line) {
        return LineKind::View(c.name("view").map_or("", |m| m.as_str()));
    }
    if let Some(c) = VIEW_CACHE.captures(line) {
        return LineKind::ViewCache {
            view: c.name("view").map_or("", |m| m.as_str()),
            cache: c.name("cache").map_or("", |m| m.as_str()),
        };
    }
    if let Some(c) = SUBSECTION.captures(line) {
        return LineKind::Subsection(c.name("subsection").map_or("", |m| m.as_str()));
    }
    if let Some(c) = ZONE.captures(line) {
        return LineKind::Zone(c.name("zone").map_or("", |m| m.as_str()));
    }
    if let Some(c) = BIND_VAR.captures(line) {
        return LineKind::BindVar(c.name("bind_var").map_or("", |m| m.as_str()));
    }
    if line.trim().is_empty() {
        return LineKind::Blank;
    }
    LineKind::Unrecognized
}

/// A metric line seen before the snapshot time is known.
struct PendingMetric {
    name: String,
    value: i64,
    tags: Vec<Tag>,
}

/// Parse a text statistics dump.
pub fn parse(data: &[u8]) -> Result<Vec<Metric>, ParseError> {
    let text = std::str::from_utf8(data).map_err(ParseError::Encoding)?;

    let mut snapshot: Option<DateTime<Utc>> = None;
    let mut section = "";
    let mut tags: Vec<Tag> = Vec::new();
    let mut pending: Vec<PendingMetric> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        match classify(line) {
            LineKind::DumpMarker(unixtime) => {
                if snapshot.is_none() {
                    snapshot = unixtime.and_then(|secs| DateTime::from_timestamp(secs, 0));
                }
            }
            LineKind::Section(name) => {
                tracing::trace!(section = name, "entering section");
                section = name;
                tags.clear();
            }
            LineKind::Metric { value, name } => pending.push(PendingMetric {
                name: name.to_string(),
                value,
                tags: tags.clone(),
            }),
            LineKind::View(view) => tags.push(Tag::new("view", view)),
            LineKind::ViewCache { view, cache } => {
                tags.push(Tag::new("view", view));
                tags.push(Tag::new("cache", cache));
            }
            LineKind::Subsection(name) => tags.push(Tag::new("subsection", name)),
            LineKind::Zone(zone) => tags.push(Tag::new("zone", zone)),
            LineKind::BindVar(var) => {
                tags.push(Tag::new("bind_var", var));
                tags.push(Tag::new("view", "_bind"));
            }
            LineKind::Blank => {}
            LineKind::Unrecognized => {
                tracing::debug!(line = lineno + 1, section, "skipping unrecognized line");
            }
        }
    }

    let timestamp = snapshot.ok_or(ParseError::MissingTimestamp)?;
    let mut batch = MetricBatch::new(timestamp);
    for m in &pending {
        batch.record(&m.name, m.value, &m.tags);
    }
    Ok(batch.into_metrics())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../../tests/fixtures/named.stats");

    fn tags_of(m: &Metric) -> Vec<(&str, &str)> {
        m.tags
            .iter()
            .map(|t| (t.key.as_str(), t.value.as_str()))
            .collect()
    }

    #[test]
    fn classify_priority_order() {
        assert_eq!(
            classify("+++ Statistics Dump +++ (1714641247)"),
            LineKind::DumpMarker(Some(1_714_641_247))
        );
        assert_eq!(
            classify("--- Statistics Dump --- ()"),
            LineKind::DumpMarker(None)
        );
        assert_eq!(
            classify("++ Incoming Requests ++"),
            LineKind::Section("Incoming Requests")
        );
        assert_eq!(
            classify("                  42 QrySuccess"),
            LineKind::Metric {
                value: 42,
                name: "QrySuccess"
            }
        );
        assert_eq!(classify("[View: _default]"), LineKind::View("_default"));
        assert_eq!(
            classify("[View: _default (Cache: _default)]"),
            LineKind::ViewCache {
                view: "_default",
                cache: "_default"
            }
        );
        assert_eq!(classify("[Common]"), LineKind::Subsection("Common"));
        assert_eq!(classify("[example.com]"), LineKind::Zone("example.com"));
        assert_eq!(classify("[.]"), LineKind::Zone("."));
        assert_eq!(
            classify("[0.0.127.IN-ADDR.ARPA]"),
            LineKind::Zone("0.0.127.IN-ADDR.ARPA")
        );
        assert_eq!(
            classify("[authors.bind (view: _bind)]"),
            LineKind::BindVar("authors.bind")
        );
        assert_eq!(classify("   "), LineKind::Blank);
        assert_eq!(
            classify("some future header: 12"),
            LineKind::Unrecognized
        );
    }

    #[test]
    fn metric_name_keeps_inner_spaces() {
        assert_eq!(
            classify("                 123 queries resulted in successful answer  "),
            LineKind::Metric {
                value: 123,
                name: "queries resulted in successful answer"
            }
        );
    }

    #[test]
    fn view_header_tags_following_metrics() {
        let dump = "+++ Statistics Dump +++ (1000)\n\
                    ++ Name Server Statistics ++\n\
                    [View: _default]\n\
                    42 QrySuccess\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "QrySuccess");
        assert_eq!(metrics[0].value, 42);
        assert_eq!(metrics[0].timestamp.timestamp(), 1000);
        assert_eq!(tags_of(&metrics[0]), vec![("view", "_default")]);
    }

    #[test]
    fn headers_accumulate_until_next_section() {
        let dump = "+++ Statistics Dump +++ (1000)\n\
                    ++ Cache DB RRsets ++\n\
                    [View: _default (Cache: _default)]\n\
                    1 A\n\
                    [View: _bind (Cache: _bind)]\n\
                    2 NS\n\
                    ++ Socket I/O Statistics ++\n\
                    3 UDP/IPv4 sockets opened\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics.len(), 3);
        assert_eq!(
            tags_of(&metrics[0]),
            vec![("view", "_default"), ("cache", "_default")]
        );
        // Second header is pushed on top of the first, not swapped in.
        assert_eq!(
            tags_of(&metrics[1]),
            vec![
                ("view", "_default"),
                ("cache", "_default"),
                ("view", "_bind"),
                ("cache", "_bind")
            ]
        );
        assert!(metrics[2].tags.is_empty());
        assert_eq!(metrics[2].name, "UDP/IPv4 sockets opened");
    }

    #[test]
    fn bind_var_pushes_two_tags() {
        let dump = "--- Statistics Dump --- (1000)\n\
                    ++ Per Zone Query Statistics ++\n\
                    [authors.bind (view: _bind)]\n\
                    7 QrySuccess\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(
            tags_of(&metrics[0]),
            vec![("bind_var", "authors_bind"), ("view", "_bind")]
        );
    }

    #[test]
    fn first_marker_wins() {
        let dump = "+++ Statistics Dump +++ (1000)\n\
                    ++ Incoming Requests ++\n\
                    5 QUERY\n\
                    --- Statistics Dump --- (2000)\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics[0].timestamp.timestamp(), 1000);
    }

    #[test]
    fn metrics_before_marker_get_snapshot_time() {
        let dump = "++ Incoming Requests ++\n\
                    5 QUERY\n\
                    +++ Statistics Dump +++ (1500)\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].timestamp.timestamp(), 1500);
    }

    #[test]
    fn missing_marker_is_fatal() {
        let dump = "++ Incoming Requests ++\n5 QUERY\n";
        assert!(matches!(
            parse(dump.as_bytes()),
            Err(ParseError::MissingTimestamp)
        ));
    }

    #[test]
    fn blank_marker_time_is_not_a_timestamp() {
        let dump = "+++ Statistics Dump +++ ()\n++ Incoming Requests ++\n5 QUERY\n";
        assert!(matches!(
            parse(dump.as_bytes()),
            Err(ParseError::MissingTimestamp)
        ));
    }

    #[test]
    fn unrecognized_and_blank_lines_are_skipped() {
        let dump = "+++ Statistics Dump +++ (1000)\n\
                    \n\
                    ++ Incoming Requests ++\n\
                    this line means nothing\n\
                    5 QUERY\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics.len(), 1);
    }

    #[test]
    fn crlf_line_endings() {
        let dump = "+++ Statistics Dump +++ (1000)\r\n++ Incoming Requests ++\r\n5 QUERY\r\n";
        let metrics = parse(dump.as_bytes()).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "QUERY");
    }

    #[test]
    fn fixture_counts_every_metric_line() {
        let metrics = parse(FIXTURE.as_bytes()).unwrap();
        let metric_lines = FIXTURE
            .lines()
            .filter(|l| matches!(classify(l), LineKind::Metric { .. }))
            .count();
        assert_eq!(metrics.len(), metric_lines);
        assert_eq!(metrics.len(), 25);
        assert!(metrics.iter().all(|m| m.timestamp.timestamp() == 1_714_641_247));
    }

    #[test]
    fn fixture_zone_tags() {
        let metrics = parse(FIXTURE.as_bytes()).unwrap();
        let zone = metrics
            .iter()
            .find(|m| m.tags.iter().any(|t| t.key == "zone"))
            .unwrap();
        assert_eq!(zone.tag("zone"), Some("example_com"));
    }

    #[test]
    fn reparse_is_identical() {
        let a = parse(FIXTURE.as_bytes()).unwrap();
        let b = parse(FIXTURE.as_bytes()).unwrap();
        assert_eq!(a, b);
    }
}
