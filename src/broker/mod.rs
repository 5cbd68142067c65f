//! Broker seam: what the tools need from a broker connection, and how one is obtained.
//! Discovery, publisher and consumer only talk to these traits.

pub mod failover;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::stomp::{ConnectOptions, Message, StompConnection, StompError, SubscribeOptions, Subscription};

pub use failover::{ConnectAttempt, FailoverConnector, FailoverError, WorkingBroker};

// ========================================
// BROKER HOST
// ========================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BrokerHost {
    pub host: String,
    pub port: u16,
}

impl BrokerHost {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ========================================
// ERRORS
// ========================================

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: BrokerHost,
        #[source]
        source: StompError,
    },

    #[error("send to {destination} failed: {source}")]
    Send {
        destination: String,
        #[source]
        source: StompError,
    },

    #[error("subscribe to {destination} failed: {source}")]
    Subscribe {
        destination: String,
        #[source]
        source: StompError,
    },

    #[error(transparent)]
    Stomp(#[from] StompError),
}

// ========================================
// TRAITS
// ========================================

/// A live, authenticated broker session.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    async fn send(
        &self,
        destination: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<(), BrokerError>;

    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BrokerError>;

    async fn ack(&self, message: &Message) -> Result<(), BrokerError>;

    async fn disconnect(&self) -> Result<(), BrokerError>;
}

/// Opens one session against one host. Credentials and TLS live in the implementor.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: BrokerSession + 'static;

    async fn connect(&self, host: &BrokerHost) -> Result<Self::Session, BrokerError>;
}

// ========================================
// STOMP IMPLEMENTATION
// ========================================

#[async_trait]
impl BrokerSession for StompConnection {
    async fn send(
        &self,
        destination: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<(), BrokerError> {
        StompConnection::send(self, destination, body, headers)
            .await
            .map_err(|source| BrokerError::Send {
                destination: destination.to_string(),
                source,
            })
    }

    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BrokerError> {
        StompConnection::subscribe(self, destination, options)
            .await
            .map_err(|source| BrokerError::Subscribe {
                destination: destination.to_string(),
                source,
            })
    }

    async fn ack(&self, message: &Message) -> Result<(), BrokerError> {
        Ok(StompConnection::ack(self, message).await?)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Ok(StompConnection::disconnect(self).await?)
    }
}

#[derive(Debug, Clone)]
pub struct StompConnector {
    options: ConnectOptions,
}

impl StompConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }
}

#[async_trait]
impl Connector for StompConnector {
    type Session = StompConnection;

    async fn connect(&self, host: &BrokerHost) -> Result<StompConnection, BrokerError> {
        StompConnection::connect(&host.host, host.port, &self.options)
            .await
            .map_err(|source| BrokerError::Connect {
                host: host.clone(),
                source,
            })
    }
}
