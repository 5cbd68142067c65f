//! Consumer with reconnect: connect, subscribe with a prefetch of one, consume until
//! the connection drops, wait a fixed backoff, start over. Forever.

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::broker::{BrokerError, BrokerSession, Connector, FailoverConnector, FailoverError};
use crate::stomp::{AckMode, Message, SubscribeOptions};

pub const PREFETCH_HEADER: &str = "activemq.prefetchSize";

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub destination: String,
    pub prefetch: u32,
    pub retry_backoff: Duration,
}

impl ConsumerOptions {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            prefetch: 1,
            retry_backoff: Duration::from_secs(3),
        }
    }

    fn subscribe_options(&self) -> SubscribeOptions {
        // Client-individual acks keep at most `prefetch` messages unacknowledged.
        SubscribeOptions::default()
            .ack(AckMode::ClientIndividual)
            .header(PREFETCH_HEADER, self.prefetch.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Connection(#[from] FailoverError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// One connect-and-subscribe cycle. Returns how many messages were handled before
/// the subscription ended.
pub async fn consume_cycle<C, F>(
    failover: &FailoverConnector<C>,
    options: &ConsumerOptions,
    handler: &mut F,
) -> Result<usize, ConsumerError>
where
    C: Connector,
    F: FnMut(&Message) + Send,
{
    let conn = failover.connect().await?;

    let mut subscription = match conn.subscribe(&options.destination, options.subscribe_options()).await {
        Ok(sub) => sub,
        Err(err) => {
            let _ = conn.disconnect().await;
            return Err(err.into());
        }
    };
    info!("Successfully subscribed to {} ({})", subscription.destination(), subscription.id());

    let mut handled = 0;
    while let Some(message) = subscription.next().await {
        handler(&message);
        handled += 1;
        if let Err(err) = conn.ack(&message).await {
            warn!("Ack failed, dropping connection: {}", err);
            let _ = conn.disconnect().await;
            return Err(err.into());
        }
    }

    Ok(handled)
}

/// Runs consume cycles forever with a fixed pause between them. Never returns.
pub async fn run_consumer<C, F>(failover: &FailoverConnector<C>, options: &ConsumerOptions, mut handler: F)
where
    C: Connector,
    F: FnMut(&Message) + Send,
{
    loop {
        match consume_cycle(failover, options, &mut handler).await {
            Ok(handled) => info!("Connection lost after {} message(s), will retry", handled),
            Err(err) => warn!("[RETRY] Connection failed: {}", err),
        }
        info!("Retrying in {:?}...", options.retry_backoff);
        tokio::time::sleep(options.retry_backoff).await;
    }
}

/// Default handler used by the binary.
pub fn log_message(message: &Message) {
    info!("[CONSUMED] {}", message.body_text());
}
