use tokio::time::Instant;
use tracing::{debug, info};

use crate::statistics::{self, DestinationCatalog, DestinationKind, PayloadShape};
use crate::stomp::Message;

/// Transient state for one discovery run.
#[derive(Debug, Default)]
pub struct DiscoverySession {
    pub catalog: DestinationCatalog,
    pub last_response: Option<Instant>,
    pub any_response: bool,
    pub data_response: bool,
    pub responses: usize,
}

impl DiscoverySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one reply and folds it into the catalog. Undecodable bodies are skipped.
    pub fn record(&mut self, message: &Message) -> PayloadShape {
        self.responses += 1;
        self.any_response = true;
        self.last_response = Some(Instant::now());

        let stats = statistics::parse(&message.body);
        if stats.is_empty() {
            debug!("Reply #{} carried no statistics", self.responses);
            return PayloadShape::Unscoped;
        }

        let shape = self.catalog.fold(&stats);
        if shape != PayloadShape::Unscoped {
            self.data_response = true;
        }
        info!(
            "Received statistics response #{} ({:?}, {} metrics)",
            self.responses,
            shape,
            stats.len()
        );
        shape
    }

    pub fn has_destinations(&self) -> bool {
        !self.catalog.is_empty()
    }

    pub fn progress(&self) -> (usize, usize) {
        (
            self.catalog.bucket(DestinationKind::Queue).len(),
            self.catalog.bucket(DestinationKind::Topic).len(),
        )
    }
}
