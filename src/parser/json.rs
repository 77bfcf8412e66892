//! Parser for the statistics-channel JSON document (`/json/v1`).
//!
//! The document is parsed once into a `serde_json::Value` with object key
//! order preserved. Fixed-schema groups are decoded against static key lists
//! by [`record_group`]; the schema-free maps (traffic histograms, per-zone
//! DNSSEC counters) go through [`ordered_leaves`].

use super::{parse_snapshot_time, ParseError};
use crate::metric::{scope, Metric, MetricBatch, Tag};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static TRAFFIC_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^dns-(udp|tcp|tcp6|udp6)-((?:requests|responses)-sizes)-(?:received|sent)-(ipv4|ipv6)$",
    )
    .unwrap()
});

const OPCODES: &[&str] = &[
    "QUERY",
    "IQUERY",
    "STATUS",
    "RESERVED3",
    "NOTIFY",
    "UPDATE",
    "RESERVED6",
    "RESERVED7",
    "RESERVED8",
    "RESERVED9",
    "RESERVED10",
    "RESERVED11",
    "RESERVED12",
    "RESERVED13",
    "RESERVED14",
    "RESERVED15",
];

const RCODES: &[&str] = &[
    "NOERROR",
    "FORMERR",
    "SERVFAIL",
    "NXDOMAIN",
    "NOTIMP",
    "REFUSED",
    "YXDOMAIN",
    "YXRRSET",
    "NXRRSET",
    "NOTAUTH",
    "NOTZONE",
    "RESERVED11",
    "RESERVED12",
    "RESERVED13",
    "RESERVED14",
    "RESERVED15",
    "BADVERS",
    "17",
    "18",
    "19",
    "20",
    "21",
    "22",
    "BADCOOKIE",
];

/// Per-zone `rcodes` also carry the zone's query outcome counters.
const ZONE_RCODES: &[&str] = &[
    "QryAuthAns",
    "QryNXDOMAIN",
    "QryNxrrset",
    "QrySuccess",
    "QryTCP",
    "QryUDP",
    "RecQryRej",
    "AuthQryRej",
    "UpdateDone",
    "XfrRej",
    "XfrReqDone",
];

const QTYPES: &[&str] = &[
    "Others",
    "A",
    "NS",
    "CNAME",
    "SOA",
    "PTR",
    "MX",
    "TXT",
    "AFSDB",
    "AAAA",
    "SRV",
    "NAPTR",
    "DNAME",
    "DS",
    "RRSIG",
    "DNSKEY",
    "NSEC3PARAM",
    "TLSA",
    "CDS",
    "CDNSKEY",
    "ZONEMD",
    "SVCB",
    "HTTPS",
    "SPF",
    "ANY",
];

const NSSTATS: &[&str] = &[
    "Requestv4",
    "Requestv6",
    "ReqEdns0",
    "ReqTCP",
    "TCPConnHighWater",
    "AuthQryRej",
    "RecQryRej",
    "Response",
    "TruncatedResp",
    "RespEDNS0",
    "QrySuccess",
    "QryAuthAns",
    "QryNoauthAns",
    "QryReferral",
    "QryNxrrset",
    "QryNXDOMAIN",
    "QryFailure",
    "QryUDP",
    "QryTCP",
    "CookieIn",
    "CookieNew",
    "CookieMatch",
    "ECSOpt",
];

const ZONESTATS: &[&str] = &[
    "NotifyInv4",
    "SOAOutv4",
    "AXFRReqv4",
    "IXFRReqv4",
    "XfrSuccess",
];

const SOCKSTATS: &[&str] = &[
    "UDP4Open",
    "UDP6Open",
    "TCP4Open",
    "TCP6Open",
    "RawOpen",
    "UDP4Close",
    "UDP6Close",
    "TCP4Close",
    "TCP6Close",
    "UDP6Conn",
    "TCP4Conn",
    "TCP6Conn",
    "TCP4Accept",
    "TCP6Accept",
    "TCP4RecvErr",
    "UDP4Active",
    "UDP6Active",
    "TCP4Active",
    "TCP6Active",
    "RawActive",
];

const RESOLVER_STATS: &[&str] = &[
    "Queryv6",
    "Responsev6",
    "NXDOMAIN",
    "Truncated",
    "Retry",
    "ValAttempt",
    "ValOk",
    "ValNegOk",
    "QryRTT100",
    "QryRTT500",
    "BucketSize",
    "ClientCookieOut",
    "ServerCookieOut",
    "CookieIn",
    "CookieClientOk",
    "Priming",
];

const CACHESTATS: &[&str] = &[
    "CacheHits",
    "CacheMisses",
    "QueryHits",
    "QueryMisses",
    "DeleteLRU",
    "DeleteTTL",
    "CacheNodes",
    "CacheBuckets",
    "TreeMemTotal",
    "TreeMemInUse",
    "TreeMemMax",
    "HeapMemTotal",
    "HeapMemInUse",
    "HeapMemMax",
];

const ADB: &[&str] = &["nentries", "entriescnt", "nnames", "namescnt"];

const MEMORY_SUMMARY: &[&str] = &[
    "TotalUse",
    "InUse",
    "Malloced",
    "BlockSize",
    "ContextSize",
    "Lost",
];

const THREAD_MODEL: &[&str] = &[
    "worker-threads",
    "default-quantum",
    "tasks-running",
    "tasks-ready",
];

/// Memory context fields as `(document key, metric name)`.
const CONTEXT_FIELDS: &[(&str, &str)] = &[
    ("references", "References"),
    ("total", "Total"),
    ("inuse", "InUse"),
    ("maxinuse", "Maxinuse"),
    ("malloced", "Malloced"),
    ("maxmalloced", "Maxmalloced"),
    ("blocksize", "Blocksize"),
    ("pools", "Pools"),
    ("hiwater", "Hiwater"),
    ("lowater", "Lowater"),
];

/// Parse a JSON statistics document.
pub fn parse(data: &[u8]) -> Result<Vec<Metric>, ParseError> {
    let root: Value = serde_json::from_slice(data).map_err(ParseError::Json)?;
    let timestamp = parse_snapshot_time(root.get("current-time").and_then(Value::as_str))?;

    let mut batch = MetricBatch::new(timestamp);
    record_server(&mut batch, &root);
    if let Some(views) = root.get("views").and_then(Value::as_object) {
        for (name, view) in views {
            record_view(&mut batch, name, view);
        }
    }
    if let Some(socketmgr) = root.get("socketmgr") {
        record_sockets(&mut batch, socketmgr);
    }
    if let Some(taskmgr) = root.get("taskmgr") {
        record_tasks(&mut batch, taskmgr);
    }
    if let Some(memory) = root.get("memory") {
        record_memory(&mut batch, memory);
    }
    if let Some(traffic) = root.get("traffic").and_then(Value::as_object) {
        record_traffic(&mut batch, traffic);
    }
    Ok(batch.into_metrics())
}

/// Integer value of a JSON leaf. Anything that is not an integer (floats,
/// non-numeric strings, objects) counts as zero.
fn leaf_number(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// First member of `parent` present under any of the given spellings.
fn get_any<'a>(parent: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| parent.get(*key))
}

/// Decode a fixed-schema group: one metric per schema key present in the
/// object, in schema order.
fn record_group(batch: &mut MetricBatch, tags: &[Tag], group: Option<&Value>, keys: &[&str]) {
    let Some(group) = group.and_then(Value::as_object) else {
        return;
    };
    for key in keys {
        if let Some(value) = group.get(*key) {
            batch.record(key, leaf_number(value), tags);
        }
    }
}

/// Flatten a schema-free object into `(key, value)` leaves in document order.
/// Nested objects contribute their keys joined with `_`.
fn ordered_leaves(value: &Value) -> Vec<(String, i64)> {
    fn walk(value: &Value, prefix: Option<&str>, out: &mut Vec<(String, i64)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let path = match prefix {
                        Some(prefix) => format!("{prefix}_{key}"),
                        None => key.clone(),
                    };
                    walk(child, Some(&path), out);
                }
            }
            Value::Array(_) | Value::Null => {
                tracing::debug!(key = ?prefix, "skipping non-numeric leaf");
            }
            leaf => {
                if let Some(key) = prefix {
                    out.push((key.to_string(), leaf_number(leaf)));
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(value, None, &mut out);
    out
}

fn record_server(batch: &mut MetricBatch, root: &Value) {
    let groups: [(&str, &[&str], &[&str]); 6] = [
        ("opcodes", &["opcodes"], OPCODES),
        ("rcode", &["rcodes"], RCODES),
        ("qtype", &["qtypes"], QTYPES),
        ("nsstat", &["nsstats"], NSSTATS),
        ("zonestat", &["zonestats"], ZONESTATS),
        ("sockstats", &["sockstats", "socketstats"], SOCKSTATS),
    ];
    for (server, spellings, keys) in groups {
        record_group(
            batch,
            &[Tag::new("server", server)],
            get_any(root, spellings),
            keys,
        );
    }
}

fn record_view(batch: &mut MetricBatch, name: &str, view: &Value) {
    let view_tags = [Tag::new("view", name)];

    if let Some(zones) = view.get("zones").and_then(Value::as_array) {
        for zone in zones {
            record_zone(batch, &view_tags, zone);
        }
    }

    let Some(resolver) = view.get("resolver") else {
        return;
    };
    let groups: [(&str, &[&str], &[&str]); 5] = [
        ("resstats", &["stats"], RESOLVER_STATS),
        ("resqtype", &["qtypes"], QTYPES),
        ("cache", &["cache"], QTYPES),
        ("cachestats", &["cachestats", "cache-stats"], CACHESTATS),
        ("adbstat", &["adb"], ADB),
    ];
    for (kind, spellings, keys) in groups {
        let tags = scope(&view_tags, [Tag::new("type", kind)]);
        record_group(batch, &tags, get_any(resolver, spellings), keys);
    }
}

fn record_zone(batch: &mut MetricBatch, view_tags: &[Tag], zone: &Value) {
    let field = |key: &str| zone.get(key).and_then(Value::as_str).unwrap_or_default();
    let zone_tags = scope(
        view_tags,
        [
            Tag::new("zone", field("name")),
            Tag::new("class", field("class")),
            Tag::new("type", field("type")),
        ],
    );

    if let Some(serial) = zone.get("serial") {
        batch.record("serial", leaf_number(serial), &zone_tags);
    }

    let rcodes = zone.get("rcodes");
    let rcode_tags = scope(&zone_tags, [Tag::new("type", "rcode")]);
    record_group(batch, &rcode_tags, rcodes, RCODES);
    record_group(batch, &rcode_tags, rcodes, ZONE_RCODES);

    let qtype_tags = scope(&zone_tags, [Tag::new("type", "qtype")]);
    record_group(batch, &qtype_tags, zone.get("qtypes"), QTYPES);

    for kind in ["dnssec-sign", "dnssec-refresh"] {
        let Some(counters) = zone.get(kind) else {
            continue;
        };
        let tags = scope(&zone_tags, [Tag::new("type", kind)]);
        for (key, value) in ordered_leaves(counters) {
            batch.record(&key, value, &tags);
        }
    }
}

fn record_sockets(batch: &mut MetricBatch, socketmgr: &Value) {
    let Some(sockets) = socketmgr.get("sockets").and_then(Value::as_array) else {
        return;
    };
    for socket in sockets {
        let Some(name) = socket.get("name").and_then(Value::as_str) else {
            continue;
        };
        let address = |key: &str| {
            socket
                .get(key)
                .and_then(Value::as_str)
                .filter(|a| !a.is_empty())
                .map(|a| Tag::new(key, a))
        };
        let mut tags = vec![Tag::new("server", "socketmgr")];
        tags.extend(address("local-address"));
        tags.extend(address("peer-address"));
        let kind = socket.get("type").and_then(Value::as_str).unwrap_or_default();
        tags.push(Tag::new("type", kind));

        let references = socket.get("references").map(leaf_number).unwrap_or(0);
        batch.record(name, references, &tags);
    }
}

fn record_tasks(batch: &mut MetricBatch, taskmgr: &Value) {
    let model_tags = [
        Tag::new("server", "taskmgr"),
        Tag::new("type", "thread-model"),
    ];
    record_group(batch, &model_tags, Some(taskmgr), THREAD_MODEL);

    let Some(tasks) = taskmgr.get("tasks").and_then(Value::as_array) else {
        return;
    };
    for task in tasks {
        let Some(name) = task.get("name").and_then(Value::as_str) else {
            continue;
        };
        let id = task.get("id").and_then(Value::as_str).unwrap_or_default();
        let tags = [Tag::new("server", "taskmgr"), Tag::new("task_id", id)];
        let events = task.get("events").map(leaf_number).unwrap_or(0);
        batch.record(name, events, &tags);
    }
}

fn record_memory(batch: &mut MetricBatch, memory: &Value) {
    if let Some(contexts) = get_any(memory, &["contexts", "Contexts"]).and_then(Value::as_array) {
        for context in contexts {
            let text = |key: &str| context.get(key).and_then(Value::as_str).unwrap_or_default();
            let tags = [
                Tag::new("server", "context"),
                Tag::new("context", text("name")),
                Tag::new("context_id", text("id")),
            ];
            for (key, name) in CONTEXT_FIELDS {
                if let Some(value) = context.get(*key) {
                    batch.record(name, leaf_number(value), &tags);
                }
            }
        }
    }

    record_group(
        batch,
        &[Tag::new("server", "memory")],
        Some(memory),
        MEMORY_SUMMARY,
    );
}

fn record_traffic(batch: &mut MetricBatch, traffic: &Map<String, Value>) {
    for (key, histogram) in traffic {
        let Some(caps) = TRAFFIC_KEY.captures(key) else {
            tracing::debug!(key = %key, "skipping unrecognized traffic histogram");
            continue;
        };
        let tags = [
            Tag::new("ipver", &caps[3]),
            Tag::new("protocol", &caps[1]),
            Tag::new("type", caps[2].replace("s-sizes", "-size")),
        ];
        for (bucket, value) in ordered_leaves(histogram) {
            batch.record(&bucket, value, &tags);
        }
    }
}
