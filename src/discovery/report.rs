//! Console report for a discovery run.

use std::fmt::Write;

use crate::statistics::{DestinationKind, StatsMap};

use super::DiscoveryResults;

const RULE_WIDTH: usize = 80;

/// Identity fields repeated in every response; never worth printing as metrics.
const IDENTITY_KEYS: [&str; 3] = ["destinationName", "brokerId", "brokerName"];

const QUEUE_METRICS: [(&str, &str); 5] = [
    ("size", "Queue Size (Pending)"),
    ("enqueueCount", "Total Enqueued"),
    ("dequeueCount", "Total Dequeued"),
    ("consumerCount", "Active Consumers"),
    ("producerCount", "Active Producers"),
];

const TOPIC_METRICS: [(&str, &str); 7] = [
    ("enqueueCount", "Total Enqueued"),
    ("dequeueCount", "Total Dequeued"),
    ("consumerCount", "Active Consumers"),
    ("producerCount", "Active Producers"),
    ("dispatchCount", "Dispatched"),
    ("averageEnqueueTime", "Avg Enqueue Time (ms)"),
    ("averageMessageSize", "Avg Message Size (bytes)"),
];

fn rule(ch: char) -> String {
    std::iter::repeat(ch).take(RULE_WIDTH).collect()
}

pub fn render(results: &DiscoveryResults) -> String {
    let mut out = String::new();
    let catalog = &results.catalog;

    let _ = writeln!(out, "\n{}", rule('='));
    let _ = writeln!(out, "QUEUE & TOPIC STATISTICS");
    let _ = writeln!(out, "{}", rule('='));

    render_section(&mut out, results, DestinationKind::Queue);
    render_section(&mut out, results, DestinationKind::Topic);

    let nothing_visible = catalog.visible_count(DestinationKind::Queue) == 0
        && catalog.visible_count(DestinationKind::Topic) == 0;
    if nothing_visible {
        let _ = writeln!(out, "\n⚠️  No destinations discovered.");
        let _ = writeln!(out, "\nPossible reasons:");
        let _ = writeln!(out, "  1. StatisticsBrokerPlugin may not be enabled on the broker");
        let _ = writeln!(out, "  2. User lacks permissions to send to ActiveMQ.Statistics.* destinations");
        let _ = writeln!(out, "  3. No destinations have been created yet");
        let _ = writeln!(out, "  4. Broker didn't respond to statistics request");
    }

    let _ = writeln!(out, "\n{}", rule('='));
    out
}

fn render_section(out: &mut String, results: &DiscoveryResults, kind: DestinationKind) {
    let (title, icon, label, key_metrics, width): (&str, &str, &str, &[(&str, &str)], usize) = match kind {
        DestinationKind::Queue => ("QUEUES", "📋", "Queue", &QUEUE_METRICS, 35),
        DestinationKind::Topic => ("TOPICS", "📡", "Topic", &TOPIC_METRICS, 40),
    };

    let count = results.catalog.visible_count(kind);
    if count == 0 {
        let _ = writeln!(out, "\n[INFO] No {} discovered.", title.to_lowercase());
        return;
    }

    let _ = writeln!(out, "\n{} {} ({} found):", icon, title, count);
    let _ = writeln!(out, "{}", rule('='));

    for (name, stats) in results.catalog.visible(kind) {
        let _ = writeln!(out, "\n🔹 {}: {}", label, name);
        let _ = writeln!(out, "{}", rule('-'));
        render_metrics(out, stats, key_metrics, width);
    }
}

fn render_metrics(out: &mut String, stats: &StatsMap, key_metrics: &[(&str, &str)], width: usize) {
    for (key, label) in key_metrics {
        if let Some(value) = stats.get(*key) {
            let _ = writeln!(out, "  {:.<width$} {}", label, value, width = width);
        }
    }

    let others: Vec<(&String, &String)> = stats
        .iter()
        .filter(|(k, _)| !key_metrics.iter().any(|(key, _)| key == k))
        .filter(|(k, _)| !IDENTITY_KEYS.contains(&k.as_str()))
        .collect();

    if others.is_empty() {
        return;
    }

    let _ = writeln!(out, "\n  Other Metrics:");
    for (key, value) in others {
        let _ = writeln!(out, "    {}: {}", key, value);
    }
}
