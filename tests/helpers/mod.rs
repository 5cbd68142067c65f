#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use amqprobe::broker::{BrokerError, BrokerHost, BrokerSession, Connector, FailoverConnector};
use amqprobe::stomp::{Message, StompError, SubscribeOptions, Subscription};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const WILDCARD: &str = "ActiveMQ.Statistics.Destination.>";
pub const BROKER_STATS: &str = "ActiveMQ.Statistics.Broker";

// ========================================
// RECORDED EVENTS
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Subscribed {
        host: BrokerHost,
        destination: String,
        headers: Vec<(String, String)>,
        ack: &'static str,
    },
    Sent {
        host: BrokerHost,
        destination: String,
        body: Bytes,
        headers: Vec<(String, String)>,
    },
    Acked(String),
    Disconnected(BrokerHost),
}

// ========================================
// SCRIPTED BROKER
// ========================================

/// In-memory stand-in for a broker cluster. Hosts are reachable by name; statistics
/// requests answer with scripted replies on the `reply-to` destination.
#[derive(Default)]
pub struct FakeBroker {
    reachable: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<BrokerHost>>,
    events: Mutex<Vec<Event>>,
    /// request destination -> [(delay before reply, XML body)]
    replies: Mutex<HashMap<String, Vec<(Duration, String)>>>,
    denied: Mutex<HashSet<String>>,
    /// destination -> bodies delivered right after SUBSCRIBE, then the connection drops
    feeds: Mutex<HashMap<String, Vec<String>>>,
}

impl FakeBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_reachable(&self, host: &str, up: bool) {
        let mut reachable = self.reachable.lock();
        if up {
            reachable.insert(host.to_string());
        } else {
            reachable.remove(host);
        }
    }

    pub fn reply_to(&self, request: &str, replies: Vec<(Duration, String)>) {
        self.replies.lock().insert(request.to_string(), replies);
    }

    pub fn deny(&self, destination: &str) {
        self.denied.lock().insert(destination.to_string());
    }

    pub fn feed(&self, destination: &str, bodies: &[&str]) {
        self.feeds.lock().insert(
            destination.to_string(),
            bodies.iter().map(|b| b.to_string()).collect(),
        );
    }

    pub fn attempts(&self) -> Vec<BrokerHost> {
        self.attempts.lock().clone()
    }

    pub fn attempted_hosts(&self) -> Vec<String> {
        self.attempts.lock().iter().map(|h| h.host.clone()).collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Sent { destination, .. } => Some(destination),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    pub broker: Arc<FakeBroker>,
}

impl FakeConnector {
    pub fn new(broker: Arc<FakeBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, host: &BrokerHost) -> Result<FakeSession, BrokerError> {
        self.broker.attempts.lock().push(host.clone());
        if !self.broker.reachable.lock().contains(&host.host) {
            return Err(BrokerError::Connect {
                host: host.clone(),
                source: StompError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )),
            });
        }
        Ok(FakeSession {
            host: host.clone(),
            broker: self.broker.clone(),
            subscribers: Mutex::new(HashMap::new()),
            next_ack: Mutex::new(0),
        })
    }
}

pub struct FakeSession {
    pub host: BrokerHost,
    broker: Arc<FakeBroker>,
    subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
    next_ack: Mutex<u64>,
}

impl FakeSession {
    fn message(&self, destination: &str, body: &str) -> Message {
        let mut next = self.next_ack.lock();
        *next += 1;
        let mut msg = Message::new(destination, body.to_string());
        msg.message_id = Some(format!("ID:fake-{}", *next));
        msg.ack_id = Some(format!("ack-{}", *next));
        msg
    }
}

#[async_trait]
impl BrokerSession for FakeSession {
    async fn send(
        &self,
        destination: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<(), BrokerError> {
        self.broker.record(Event::Sent {
            host: self.host.clone(),
            destination: destination.to_string(),
            body,
            headers: headers.to_vec(),
        });

        if self.broker.denied.lock().contains(destination) {
            return Err(BrokerError::Send {
                destination: destination.to_string(),
                source: StompError::Broker {
                    message: "User monitor is not authorized to write to ActiveMQ.Statistics".into(),
                    details: String::new(),
                },
            });
        }

        let reply_to = headers
            .iter()
            .find(|(k, _)| k == "reply-to")
            .map(|(_, v)| v.clone());
        let script = self.broker.replies.lock().get(destination).cloned();

        if let (Some(reply_to), Some(script)) = (reply_to, script) {
            // Replies to an address nobody subscribed to are lost, as on a real broker.
            if let Some(tx) = self.subscribers.lock().get(&reply_to).cloned() {
                let messages: Vec<(Duration, Message)> = script
                    .iter()
                    .map(|(delay, body)| (*delay, self.message(&reply_to, body)))
                    .collect();
                tokio::spawn(async move {
                    for (delay, msg) in messages {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(msg);
                    }
                });
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        destination: &str,
        options: SubscribeOptions,
    ) -> Result<Subscription, BrokerError> {
        self.broker.record(Event::Subscribed {
            host: self.host.clone(),
            destination: destination.to_string(),
            headers: options.headers.clone(),
            ack: options.ack.as_str(),
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let feed = self.broker.feeds.lock().get(destination).cloned();
        match feed {
            Some(bodies) => {
                for body in bodies {
                    let _ = tx.send(self.message(destination, &body));
                }
                // Sender dropped here: the stream ends like a lost connection.
            }
            None => {
                self.subscribers.lock().insert(destination.to_string(), tx);
            }
        }
        Ok(Subscription::new("sub-1", destination, rx))
    }

    async fn ack(&self, message: &Message) -> Result<(), BrokerError> {
        self.broker
            .record(Event::Acked(message.ack_id.clone().unwrap_or_default()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.subscribers.lock().clear();
        self.broker.record(Event::Disconnected(self.host.clone()));
        Ok(())
    }
}

// ========================================
// BUILDERS
// ========================================

pub fn hosts(names: &[&str]) -> Vec<BrokerHost> {
    names.iter().map(|n| BrokerHost::new(*n, 61614)).collect()
}

pub fn failover(broker: &Arc<FakeBroker>, names: &[&str]) -> FailoverConnector<FakeConnector> {
    FailoverConnector::new(hosts(names), FakeConnector::new(broker.clone()))
}

/// Destination-scoped statistics reply.
pub fn scoped_reply(destination: &str, metrics: &[(&str, &str)]) -> String {
    let mut xml = String::from("<map>");
    xml.push_str(&format!(
        "<entry><string>destinationName</string><string>{}</string></entry>",
        destination
    ));
    for (k, v) in metrics {
        xml.push_str(&format!("<entry><string>{}</string><long>{}</long></entry>", k, v));
    }
    xml.push_str("</map>");
    xml
}

/// Flat dotted-key statistics reply.
pub fn flat_reply(entries: &[(&str, &str)]) -> String {
    let mut xml = String::from("<map>");
    for (k, v) in entries {
        xml.push_str(&format!("<entry><string>{}</string><string>{}</string></entry>", k, v));
    }
    xml.push_str("</map>");
    xml
}
