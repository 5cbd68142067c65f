//! Statistics Response Parser
//!
//! The Statistics Broker Plugin answers with a JMS MapMessage which the broker
//! renders as XML (`transformation: jms-map-xml`):
//!
//! ```xml
//! <map>
//!   <entry><string>destinationName</string><string>queue://orders</string></entry>
//!   <entry><string>size</string><long>42</long></entry>
//! </map>
//! ```
//!
//! The first child of each entry is the key, the second is a typed value whose
//! text is kept verbatim.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

pub type StatsMap = BTreeMap<String, String>;

const ROOT_TAG: &str = "map";
const ENTRY_TAG: &str = "entry";
const KEY_TAG: &str = "string";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("empty payload")]
    Empty,

    #[error("payload is not UTF-8")]
    NotUtf8,

    #[error("invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("expected <map> root, found <{0}>")]
    NotAMap(String),
}

/// Decodes every well-formed entry, in document order.
pub fn parse_entries(payload: &[u8]) -> Result<Vec<StatisticsEntry>, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::NotUtf8)?;
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if !root.has_tag_name(ROOT_TAG) {
        return Err(ParseError::NotAMap(root.tag_name().name().to_string()));
    }

    let entries = root
        .descendants()
        .filter(|node| node.is_element() && node.has_tag_name(ENTRY_TAG))
        .filter_map(|entry| {
            let mut children = entry.children().filter(|c| c.is_element());
            let key = children.next()?;
            let value = children.next()?;
            if !key.has_tag_name(KEY_TAG) {
                return None;
            }
            let key = key.text().filter(|k| !k.is_empty())?;
            Some(StatisticsEntry {
                key: key.to_string(),
                value: value.text().unwrap_or_default().to_string(),
            })
        })
        .collect();

    Ok(entries)
}

/// Tolerant variant: any decoding failure is logged and yields an empty map.
pub fn parse(payload: &[u8]) -> StatsMap {
    match parse_entries(payload) {
        Ok(entries) => entries.into_iter().map(|e| (e.key, e.value)).collect(),
        Err(err) => {
            warn!("Skipping statistics payload: {}", err);
            StatsMap::new()
        }
    }
}
