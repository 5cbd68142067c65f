//! Discovery Orchestrator: asks the Statistics Broker Plugin for per-destination
//! statistics over a request/reply exchange.
//!
//! DISCONNECTED -> CONNECTING -> SUBSCRIBED -> REQUESTING -> COLLECTING -> DONE
//! (FAILED is reachable from any state)

pub mod collector;
pub mod report;
pub mod session;

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{BrokerError, BrokerSession, Connector, FailoverConnector, FailoverError};
use crate::statistics::DestinationCatalog;
use crate::stomp::frame::HDR_REPLY_TO;
use crate::stomp::{AckMode, SubscribeOptions};

pub use collector::{collect_responses, CollectOutcome, QuiescencePolicy, StopReason};
pub use session::DiscoverySession;

/// Wildcard over every destination first, broker-level totals as fallback.
pub const STATISTICS_DESTINATIONS: [&str; 2] = [
    "ActiveMQ.Statistics.Destination.>",
    "ActiveMQ.Statistics.Broker",
];

pub const REPLY_PREFIX: &str = "/temp-queue/stats.reply.";

/// Makes the broker render MapMessage replies as XML.
pub const MAP_TRANSFORMATION: (&str, &str) = ("transformation", "jms-map-xml");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Disconnected,
    Connecting,
    Subscribed,
    Requesting,
    Collecting,
    Done,
    Failed,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryState::Disconnected => "DISCONNECTED",
            DiscoveryState::Connecting => "CONNECTING",
            DiscoveryState::Subscribed => "SUBSCRIBED",
            DiscoveryState::Requesting => "REQUESTING",
            DiscoveryState::Collecting => "COLLECTING",
            DiscoveryState::Done => "DONE",
            DiscoveryState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub policy: QuiescencePolicy,
    pub request_destinations: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            policy: QuiescencePolicy::default(),
            request_destinations: STATISTICS_DESTINATIONS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendFailure {
    pub destination: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryResults {
    pub catalog: DestinationCatalog,
    pub reply_to: String,
    /// Request address whose replies produced the catalog.
    pub answered_by: Option<String>,
    pub any_response: bool,
    pub responses: usize,
    pub send_failures: Vec<SendFailure>,
}

impl DiscoveryResults {
    /// Nothing came back at all: not an error, but worth a warning.
    pub fn no_response(&self) -> bool {
        !self.any_response
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Connection(#[from] FailoverError),

    #[error("could not subscribe to reply address: {0}")]
    Subscribe(#[source] BrokerError),
}

pub fn reply_address() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}{}", REPLY_PREFIX, &suffix[..8])
}

struct StateTracker(DiscoveryState);

impl StateTracker {
    fn advance(&mut self, next: DiscoveryState) {
        debug!("Discovery {} -> {}", self.0, next);
        self.0 = next;
    }
}

pub async fn discover_destinations<C: Connector>(
    failover: &FailoverConnector<C>,
    options: &DiscoveryOptions,
) -> Result<DiscoveryResults, DiscoveryError> {
    let mut state = StateTracker(DiscoveryState::Disconnected);

    state.advance(DiscoveryState::Connecting);
    let conn = match failover.connect().await {
        Ok(conn) => conn,
        Err(err) => {
            state.advance(DiscoveryState::Failed);
            return Err(err.into());
        }
    };

    let result = run_exchange(&conn, options, &mut state).await;

    if let Err(err) = conn.disconnect().await {
        debug!("Disconnect after discovery failed: {}", err);
    }

    result
}

async fn run_exchange<S: BrokerSession>(
    conn: &S,
    options: &DiscoveryOptions,
    state: &mut StateTracker,
) -> Result<DiscoveryResults, DiscoveryError> {
    let reply_to = reply_address();
    info!("Created reply queue: {}", reply_to);

    // Subscribe before the first request so no reply can outrun the subscription.
    let subscribe = SubscribeOptions::default()
        .ack(AckMode::Auto)
        .header(MAP_TRANSFORMATION.0, MAP_TRANSFORMATION.1);
    let mut replies = match conn.subscribe(&reply_to, subscribe).await {
        Ok(sub) => sub,
        Err(err) => {
            state.advance(DiscoveryState::Failed);
            return Err(DiscoveryError::Subscribe(err));
        }
    };
    state.advance(DiscoveryState::Subscribed);

    let mut session = DiscoverySession::new();
    let mut results = DiscoveryResults {
        reply_to: reply_to.clone(),
        ..DiscoveryResults::default()
    };
    let headers = vec![(HDR_REPLY_TO.to_string(), reply_to.clone())];
    let total = options.request_destinations.len();

    for (idx, destination) in options.request_destinations.iter().enumerate() {
        state.advance(DiscoveryState::Requesting);
        info!("Attempt {}/{}: statistics request to {}", idx + 1, total, destination);

        if let Err(err) = conn.send(destination, Bytes::new(), &headers).await {
            warn!("Failed to send statistics request to {}: {}", destination, err);
            warn!("  The user may lack write permission on ActiveMQ.Statistics.* or the destination is not accessible");
            results.send_failures.push(SendFailure {
                destination: destination.clone(),
                error: err.to_string(),
            });
            continue;
        }

        state.advance(DiscoveryState::Collecting);
        let outcome = collect_responses(&mut replies, &mut session, options.policy).await;
        debug!(
            "Collected {} replies from {} in {:?} ({:?})",
            outcome.received, destination, outcome.elapsed, outcome.reason
        );

        if session.has_destinations() {
            let (queues, topics) = session.progress();
            info!("Found {} queues and {} topics using: {}", queues, topics, destination);
            results.answered_by = Some(destination.clone());
            break;
        }

        if outcome.reason == StopReason::Closed {
            warn!("Reply subscription closed; connection to broker lost");
            break;
        }

        warn!("No destination statistics from {}", destination);
    }

    if session.any_response && !session.data_response {
        warn!("Replies carried only broker-level statistics, no per-destination data");
    }

    if !session.any_response {
        warn!("No response received within timeout period");
        warn!("Troubleshooting:");
        warn!("  1. Verify StatisticsBrokerPlugin is enabled in broker configuration");
        warn!("  2. Check user permissions for ActiveMQ.Statistics.* destinations");
        warn!("  3. Ensure broker is accessible and responsive");
    }

    state.advance(DiscoveryState::Done);

    results.any_response = session.any_response;
    results.responses = session.responses;
    results.catalog = session.catalog;
    Ok(results)
}
