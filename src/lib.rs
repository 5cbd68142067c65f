//! Client-side tooling for ActiveMQ-compatible brokers over STOMP: destination
//! discovery through the Statistics Broker Plugin, a web publisher and a
//! reconnecting consumer.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod discovery;
pub mod logging;
pub mod publisher;
pub mod statistics;
pub mod stomp;

use crate::broker::{FailoverConnector, StompConnector};
use crate::config::BrokerConfig;

/// Failover connector over real STOMP sessions for the configured host list.
pub fn stomp_failover(broker: &BrokerConfig) -> FailoverConnector<StompConnector> {
    FailoverConnector::new(broker.hosts(), StompConnector::new(broker.connect_options()))
}
