//! Web publisher: a single page with a button, and `POST /publish` which sends one
//! numbered message to the configured destination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use rust_embed::RustEmbed;
use serde::Serialize;
use thiserror::Error;
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

use crate::broker::{BrokerError, BrokerHost, BrokerSession, Connector, FailoverConnector, FailoverError};

#[derive(RustEmbed)]
#[folder = "web/"]
struct Assets;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Connection(#[from] FailoverError),

    #[error(transparent)]
    Send(#[from] BrokerError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishReceipt {
    pub status: &'static str,
    pub message: String,
    pub counter: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublishFailure {
    pub status: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Health {
    pub status: &'static str,
    pub broker: Option<BrokerHost>,
}

pub struct Publisher<C> {
    failover: FailoverConnector<C>,
    destination: String,
    counter: AtomicU64,
}

impl<C: Connector> Publisher<C> {
    pub fn new(failover: FailoverConnector<C>, destination: impl Into<String>) -> Self {
        Self {
            failover,
            destination: destination.into(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn published(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Connect, send `Message #<n>`, disconnect. The counter advances even when the
    /// publish fails.
    pub async fn publish_next(&self) -> Result<PublishReceipt, PublishError> {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let message = format!("Message #{}", counter);

        let conn = self.failover.connect().await?;
        let sent = conn
            .send(&self.destination, Bytes::from(message.clone()), &[])
            .await;
        if let Err(err) = conn.disconnect().await {
            tracing::debug!("Disconnect after publish failed: {}", err);
        }
        sent?;

        info!("Published '{}' to {}", message, self.destination);
        Ok(PublishReceipt {
            status: "success",
            message: format!("Published: {}", message),
            counter,
        })
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            broker: self.failover.working_broker().get(),
        }
    }
}

pub fn router<C: Connector + 'static>(publisher: Arc<Publisher<C>>) -> Router {
    Router::new()
        .route("/publish", post(publish::<C>))
        .route("/health", get(health::<C>))
        .layer(CompressionLayer::new())
        .fallback(static_handler)
        .with_state(publisher)
}

pub async fn serve<C: Connector + 'static>(
    publisher: Arc<Publisher<C>>,
    addr: &str,
) -> std::io::Result<()> {
    let app = router(publisher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Publisher available at http://{}", addr);
    axum::serve(listener, app).await
}

async fn publish<C: Connector + 'static>(State(publisher): State<Arc<Publisher<C>>>) -> Response {
    match publisher.publish_next().await {
        Ok(receipt) => Json(receipt).into_response(),
        Err(err) => {
            error!("Publish to {} failed: {}", publisher.destination(), err);
            let body = PublishFailure {
                status: "error",
                message: err.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

async fn health<C: Connector + 'static>(State(publisher): State<Arc<Publisher<C>>>) -> impl IntoResponse {
    Json(publisher.health())
}

async fn static_handler(uri: Uri) -> impl IntoResponse {
    let mut path = uri.path().trim_start_matches('/').to_string();

    if path.is_empty() {
        path = "index.html".to_string();
    }

    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            ([(header::CONTENT_TYPE, mime.as_ref())], Body::from(content.data)).into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
