//! Buckets decoded statistics by destination type and name.
//!
//! Two response shapes are in the wild:
//! - destination-scoped: one response per destination, identified by a
//!   `destinationName` entry valued `queue://<name>` or `topic://<name>`
//! - flat keys: `queue.<name>.<metric>` / `topic.<name>.<metric>` entries

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::parser::StatsMap;

pub type DestinationStats = BTreeMap<String, StatsMap>;

pub const DESTINATION_NAME_KEY: &str = "destinationName";
pub const ADVISORY_PREFIX: &str = "ActiveMQ.";

const QUEUE_SCHEME: &str = "queue://";
const TOPIC_SCHEME: &str = "topic://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DestinationKind {
    Queue,
    Topic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// A `destinationName` entry scopes the whole response.
    DestinationScoped,
    /// Per-entry dotted keys.
    FlatKeys,
    /// Neither shape, e.g. broker-level totals.
    Unscoped,
}

/// Names under `ActiveMQ.` are advisory/internal and never listed to users.
pub fn is_advisory(name: &str) -> bool {
    name.starts_with(ADVISORY_PREFIX)
}

pub fn detect_shape(stats: &StatsMap) -> PayloadShape {
    if stats.contains_key(DESTINATION_NAME_KEY) {
        PayloadShape::DestinationScoped
    } else if stats.keys().any(|k| split_flat_key(k).is_some()) {
        PayloadShape::FlatKeys
    } else {
        PayloadShape::Unscoped
    }
}

/// `queue.orders.size` -> (Queue, "orders", "size"). Splits on the first two dots.
pub fn split_flat_key(key: &str) -> Option<(DestinationKind, &str, &str)> {
    let mut parts = key.splitn(3, '.');
    let kind = match parts.next()? {
        "queue" => DestinationKind::Queue,
        "topic" => DestinationKind::Topic,
        _ => return None,
    };
    let name = parts.next().filter(|n| !n.is_empty())?;
    let metric = parts.next().filter(|m| !m.is_empty())?;
    Some((kind, name, metric))
}

/// `queue://orders` -> (Queue, "orders").
pub fn split_destination_name(value: &str) -> Option<(DestinationKind, &str)> {
    if let Some(name) = value.strip_prefix(QUEUE_SCHEME) {
        Some((DestinationKind::Queue, name))
    } else {
        value
            .strip_prefix(TOPIC_SCHEME)
            .map(|name| (DestinationKind::Topic, name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DestinationCatalog {
    pub queues: DestinationStats,
    pub topics: DestinationStats,
}

impl DestinationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty() && self.topics.is_empty()
    }

    pub fn bucket(&self, kind: DestinationKind) -> &DestinationStats {
        match kind {
            DestinationKind::Queue => &self.queues,
            DestinationKind::Topic => &self.topics,
        }
    }

    fn bucket_mut(&mut self, kind: DestinationKind) -> &mut DestinationStats {
        match kind {
            DestinationKind::Queue => &mut self.queues,
            DestinationKind::Topic => &mut self.topics,
        }
    }

    /// Destinations of `kind` that are not advisory, in name order.
    pub fn visible(&self, kind: DestinationKind) -> impl Iterator<Item = (&String, &StatsMap)> + '_ {
        self.bucket(kind).iter().filter(|(name, _)| !is_advisory(name))
    }

    pub fn visible_count(&self, kind: DestinationKind) -> usize {
        self.visible(kind).count()
    }

    fn fold_flat_keys(&mut self, stats: &StatsMap) {
        for (key, value) in stats {
            if let Some((kind, name, metric)) = split_flat_key(key) {
                self.bucket_mut(kind)
                    .entry(name.to_string())
                    .or_default()
                    .insert(metric.to_string(), value.clone());
            }
        }
    }

    /// Folds one decoded response into the catalog and reports which shape it had.
    pub fn fold(&mut self, stats: &StatsMap) -> PayloadShape {
        let shape = detect_shape(stats);
        match shape {
            PayloadShape::DestinationScoped => {
                let raw = &stats[DESTINATION_NAME_KEY];
                match split_destination_name(raw) {
                    Some((kind, name)) => {
                        let metrics: StatsMap = stats
                            .iter()
                            .filter(|(k, _)| k.as_str() != DESTINATION_NAME_KEY)
                            .filter(|(k, _)| split_flat_key(k).is_none())
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        debug!("Found {:?} {} with {} metrics", kind, name, metrics.len());
                        self.bucket_mut(kind).insert(name.to_string(), metrics);
                    }
                    None => debug!("Unrecognised destinationName '{}'", raw),
                }
                // Dotted keys riding along belong to their own destinations.
                self.fold_flat_keys(stats);
            }
            PayloadShape::FlatKeys => self.fold_flat_keys(stats),
            PayloadShape::Unscoped => {}
        }
        shape
    }
}
