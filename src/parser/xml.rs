//! Parser for the statistics-channel XML document (`/xml/v3`).
//!
//! The document is deserialized into a typed tree, then walked top down:
//! memory, server counters, socket manager, task manager, traffic, views.
//! Every `<counters type="...">` node, whatever its scope, goes through
//! [`record_counters`].

use super::{leaf_value, parse_snapshot_time, ParseError};
use crate::metric::{scope, Metric, MetricBatch, Tag};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlStatistics {
    server: XmlServer,
    views: Option<XmlViews>,
    socketmgr: Option<XmlSocketMgr>,
    taskmgr: Option<XmlTaskMgr>,
    memory: Option<XmlMemory>,
    traffic: Option<XmlTraffic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlServer {
    #[serde(rename = "current-time")]
    current_time: Option<String>,
    counters: Vec<XmlCounters>,
}

/// A typed group of name/value leaves, e.g. `<counters type="rcode">`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCounters {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "counter")]
    counters: Vec<XmlCounter>,
}

impl XmlCounters {
    /// The group's category tag. `opcode` is reported as `opcodes`, the name
    /// the JSON document and the Prometheus counter categories use.
    fn category(&self) -> &str {
        match self.kind.as_str() {
            "opcode" => "opcodes",
            kind => kind,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCounter {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlViews {
    view: Vec<XmlView>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlView {
    #[serde(rename = "@name")]
    name: String,
    zones: Option<XmlZones>,
    counters: Vec<XmlCounters>,
    cache: Option<XmlCache>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlZones {
    zone: Vec<XmlZone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlZone {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@rdataclass")]
    rdataclass: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    serial: Option<String>,
    counters: Vec<XmlCounters>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlCache {
    rrset: Vec<XmlRrset>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlRrset {
    name: String,
    counter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlSocketMgr {
    sockets: XmlSockets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlSockets {
    socket: Vec<XmlSocket>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlSocket {
    name: Option<String>,
    references: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "local-address")]
    local_address: Option<String>,
    #[serde(rename = "peer-address")]
    peer_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTaskMgr {
    #[serde(rename = "thread-model")]
    thread_model: Option<XmlThreadModel>,
    tasks: XmlTasks,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlThreadModel {
    #[serde(rename = "worker-threads")]
    worker_threads: Option<String>,
    #[serde(rename = "default-quantum")]
    default_quantum: Option<String>,
    #[serde(rename = "tasks-running")]
    tasks_running: Option<String>,
    #[serde(rename = "tasks-ready")]
    tasks_ready: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTasks {
    task: Vec<XmlTask>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTask {
    id: String,
    name: Option<String>,
    events: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlMemory {
    contexts: XmlContexts,
    summary: Option<XmlMemorySummary>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlContexts {
    context: Vec<XmlContext>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlContext {
    id: String,
    name: String,
    references: Option<String>,
    total: Option<String>,
    inuse: Option<String>,
    maxinuse: Option<String>,
    malloced: Option<String>,
    maxmalloced: Option<String>,
    blocksize: Option<String>,
    pools: Option<String>,
    hiwater: Option<String>,
    lowater: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlMemorySummary {
    #[serde(rename = "TotalUse")]
    total_use: Option<String>,
    #[serde(rename = "InUse")]
    in_use: Option<String>,
    #[serde(rename = "Malloced")]
    malloced: Option<String>,
    #[serde(rename = "BlockSize")]
    block_size: Option<String>,
    #[serde(rename = "ContextSize")]
    context_size: Option<String>,
    #[serde(rename = "Lost")]
    lost: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTraffic {
    ipv4: Option<XmlIpTraffic>,
    ipv6: Option<XmlIpTraffic>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlIpTraffic {
    udp: Option<XmlTransport>,
    tcp: Option<XmlTransport>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct XmlTransport {
    counters: Vec<XmlCounters>,
}

/// Parse an XML statistics document.
pub fn parse(data: &[u8]) -> Result<Vec<Metric>, ParseError> {
    let text = std::str::from_utf8(data).map_err(ParseError::Encoding)?;
    let stats: XmlStatistics = quick_xml::de::from_str(text).map_err(ParseError::Xml)?;
    let timestamp = parse_snapshot_time(stats.server.current_time.as_deref())?;

    let mut batch = MetricBatch::new(timestamp);
    if let Some(memory) = &stats.memory {
        record_memory(&mut batch, memory);
    }
    for group in &stats.server.counters {
        record_counters(&mut batch, &[], group);
    }
    if let Some(socketmgr) = &stats.socketmgr {
        record_sockets(&mut batch, socketmgr);
    }
    if let Some(taskmgr) = &stats.taskmgr {
        record_tasks(&mut batch, taskmgr);
    }
    if let Some(traffic) = &stats.traffic {
        record_traffic(&mut batch, traffic);
    }
    if let Some(views) = &stats.views {
        for view in &views.view {
            record_view(&mut batch, view);
        }
    }
    Ok(batch.into_metrics())
}

/// Decode one counter group under `parent`, adding the group's `type` tag.
fn record_counters(batch: &mut MetricBatch, parent: &[Tag], group: &XmlCounters) {
    let tags = scope(parent, [Tag::new("type", group.category())]);
    for counter in &group.counters {
        batch.record(&counter.name, leaf_value(counter.value.as_deref()), &tags);
    }
}

/// Record the leaves of a fixed field list, skipping fields absent from the
/// document.
fn record_fields(batch: &mut MetricBatch, tags: &[Tag], fields: &[(&str, &Option<String>)]) {
    for (name, value) in fields {
        if let Some(value) = value {
            batch.record(name, leaf_value(Some(value.as_str())), tags);
        }
    }
}

fn record_memory(batch: &mut MetricBatch, memory: &XmlMemory) {
    for context in &memory.contexts.context {
        let tags = [
            Tag::new("server", "context"),
            Tag::new("context", &context.name),
            Tag::new("context_id", &context.id),
        ];
        record_fields(
            batch,
            &tags,
            &[
                ("References", &context.references),
                ("Total", &context.total),
                ("InUse", &context.inuse),
                ("Maxinuse", &context.maxinuse),
                ("Malloced", &context.malloced),
                ("Maxmalloced", &context.maxmalloced),
                ("Blocksize", &context.blocksize),
                ("Pools", &context.pools),
                ("Hiwater", &context.hiwater),
                ("Lowater", &context.lowater),
            ],
        );
    }

    if let Some(summary) = &memory.summary {
        record_fields(
            batch,
            &[Tag::new("server", "memory")],
            &[
                ("TotalUse", &summary.total_use),
                ("InUse", &summary.in_use),
                ("Malloced", &summary.malloced),
                ("BlockSize", &summary.block_size),
                ("ContextSize", &summary.context_size),
                ("Lost", &summary.lost),
            ],
        );
    }
}

fn record_sockets(batch: &mut MetricBatch, socketmgr: &XmlSocketMgr) {
    for socket in &socketmgr.sockets.socket {
        let Some(name) = socket.name.as_deref() else {
            continue;
        };
        let mut tags = vec![Tag::new("server", "socketmgr")];
        if let Some(local) = socket.local_address.as_deref() {
            tags.push(Tag::new("local-address", local));
        }
        if let Some(peer) = socket.peer_address.as_deref().filter(|p| !p.is_empty()) {
            tags.push(Tag::new("peer-address", peer));
        }
        tags.push(Tag::new("type", &socket.kind));
        batch.record(name, leaf_value(socket.references.as_deref()), &tags);
    }
}

fn record_tasks(batch: &mut MetricBatch, taskmgr: &XmlTaskMgr) {
    if let Some(model) = &taskmgr.thread_model {
        record_fields(
            batch,
            &[
                Tag::new("server", "taskmgr"),
                Tag::new("type", "thread-model"),
            ],
            &[
                ("worker-threads", &model.worker_threads),
                ("default-quantum", &model.default_quantum),
                ("tasks-running", &model.tasks_running),
                ("tasks-ready", &model.tasks_ready),
            ],
        );
    }

    for task in &taskmgr.tasks.task {
        let Some(name) = task.name.as_deref() else {
            continue;
        };
        let tags = [Tag::new("server", "taskmgr"), Tag::new("task_id", &task.id)];
        batch.record(name, leaf_value(task.events.as_deref()), &tags);
    }
}

fn record_traffic(batch: &mut MetricBatch, traffic: &XmlTraffic) {
    for (ipver, ip) in [("ipv4", &traffic.ipv4), ("ipv6", &traffic.ipv6)] {
        let Some(ip) = ip else {
            continue;
        };
        for (protocol, transport) in [("udp", &ip.udp), ("tcp", &ip.tcp)] {
            let Some(transport) = transport else {
                continue;
            };
            let tags = [Tag::new("ipver", ipver), Tag::new("protocol", protocol)];
            for group in &transport.counters {
                record_counters(batch, &tags, group);
            }
        }
    }
}

fn record_view(batch: &mut MetricBatch, view: &XmlView) {
    let view_tags = [Tag::new("view", &view.name)];

    if let Some(cache) = &view.cache {
        let tags = scope(&view_tags, [Tag::new("type", "cache")]);
        for rrset in &cache.rrset {
            batch.record(&rrset.name, leaf_value(rrset.counter.as_deref()), &tags);
        }
    }

    for group in &view.counters {
        record_counters(batch, &view_tags, group);
    }

    let Some(zones) = &view.zones else {
        return;
    };
    for zone in &zones.zone {
        let zone_tags = scope(
            &view_tags,
            [
                Tag::new("zone", &zone.name),
                Tag::new("class", &zone.rdataclass),
                Tag::new("type", zone.kind.as_deref().unwrap_or_default()),
            ],
        );
        if let Some(serial) = zone.serial.as_deref() {
            batch.record("serial", leaf_value(Some(serial)), &zone_tags);
        }
        for group in &zone.counters {
            record_counters(batch, &zone_tags, group);
        }
    }
}
