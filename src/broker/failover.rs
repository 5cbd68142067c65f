//! Failover Connector: tries candidate brokers in order and remembers the first one
//! that accepts a session.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use super::{BrokerHost, Connector};

/// Process-wide memory of the broker that last accepted a connection.
#[derive(Debug, Clone, Default)]
pub struct WorkingBroker {
    inner: Arc<Mutex<Option<BrokerHost>>>,
}

impl WorkingBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<BrokerHost> {
        self.inner.lock().clone()
    }

    pub fn set(&self, host: BrokerHost) {
        *self.inner.lock() = Some(host);
    }

    /// Forgets the cached broker; the next connect walks the full candidate list again.
    pub fn invalidate(&self) -> Option<BrokerHost> {
        self.inner.lock().take()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectAttempt {
    pub host: BrokerHost,
    pub error: String,
}

impl fmt::Display for ConnectAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.host, self.error)
    }
}

#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("no broker available after {} attempt(s): {}", .attempts.len(), format_attempts(.attempts))]
    NoBrokerAvailable { attempts: Vec<ConnectAttempt> },
}

impl FailoverError {
    pub fn attempts(&self) -> &[ConnectAttempt] {
        match self {
            FailoverError::NoBrokerAvailable { attempts } => attempts,
        }
    }
}

fn format_attempts(attempts: &[ConnectAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidates configured".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct FailoverConnector<C> {
    candidates: Vec<BrokerHost>,
    connector: C,
    working: WorkingBroker,
}

impl<C: Connector> FailoverConnector<C> {
    pub fn new(candidates: Vec<BrokerHost>, connector: C) -> Self {
        Self::with_working_broker(candidates, connector, WorkingBroker::new())
    }

    pub fn with_working_broker(candidates: Vec<BrokerHost>, connector: C, working: WorkingBroker) -> Self {
        Self {
            candidates,
            connector,
            working,
        }
    }

    pub fn candidates(&self) -> &[BrokerHost] {
        &self.candidates
    }

    pub fn working_broker(&self) -> &WorkingBroker {
        &self.working
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Connects to the cached broker if one is known, otherwise to the first candidate
    /// that accepts. A failure against the cached broker clears the cache.
    pub async fn connect(&self) -> Result<C::Session, FailoverError> {
        if let Some(host) = self.working.get() {
            info!("Connecting to known working broker: {}", host);
            return match self.connector.connect(&host).await {
                Ok(session) => Ok(session),
                Err(err) => {
                    warn!("Working broker {} failed: {}; cache cleared", host, err);
                    self.working.invalidate();
                    Err(FailoverError::NoBrokerAvailable {
                        attempts: vec![ConnectAttempt {
                            host,
                            error: err.to_string(),
                        }],
                    })
                }
            };
        }

        info!("Discovering working broker among {} candidate(s)", self.candidates.len());

        let mut attempts = Vec::with_capacity(self.candidates.len());
        for host in &self.candidates {
            info!("Trying broker: {}", host);
            match self.connector.connect(host).await {
                Ok(session) => {
                    info!("Discovered working broker: {}", host);
                    self.working.set(host.clone());
                    return Ok(session);
                }
                Err(err) => {
                    warn!("Broker {} failed, trying next: {}", host, err);
                    attempts.push(ConnectAttempt {
                        host: host.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        Err(FailoverError::NoBrokerAvailable { attempts })
    }
}
