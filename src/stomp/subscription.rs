use bytes::Bytes;
use tokio::sync::mpsc;

use super::frame::{Frame, HDR_ACK, HDR_DESTINATION, HDR_MESSAGE_ID};

/// A MESSAGE frame delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub destination: String,
    pub message_id: Option<String>,
    /// Value of the `ack` header; required to ACK in client modes.
    pub ack_id: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Message {
    pub fn new(destination: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            destination: destination.into(),
            message_id: None,
            ack_id: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn from_frame(frame: Frame) -> Self {
        let destination = frame.get_header(HDR_DESTINATION).unwrap_or_default().to_string();
        let message_id = frame.get_header(HDR_MESSAGE_ID).map(str::to_string);
        let ack_id = frame.get_header(HDR_ACK).map(str::to_string);
        Self {
            destination,
            message_id,
            ack_id,
            headers: frame.headers,
            body: frame.body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    #[default]
    Auto,
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub ack: AckMode,
    /// Broker-specific extras, e.g. `activemq.prefetchSize` or `transformation`.
    pub headers: Vec<(String, String)>,
}

impl SubscribeOptions {
    pub fn ack(mut self, ack: AckMode) -> Self {
        self.ack = ack;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Receiving side of a subscription. Yields `None` once the connection is gone.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    destination: String,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        destination: impl Into<String>,
        rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            rx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub async fn next(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}
