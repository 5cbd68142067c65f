use std::sync::Arc;

use amqprobe::publisher::{router, Publisher};
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use serde_json::Value;
use tower::ServiceExt;

mod helpers;
use helpers::{failover, Event, FakeBroker, FakeConnector};

const DESTINATION: &str = "/queue/test-queue";

fn app(broker: &Arc<FakeBroker>, hosts: &[&str]) -> (Router, Arc<Publisher<FakeConnector>>) {
    let publisher = Arc::new(Publisher::new(failover(broker, hosts), DESTINATION));
    (router(publisher.clone()), publisher)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Option<String>, Bytes) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body)
}

fn json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[cfg(test)]
mod publisher_tests {
    use super::*;

    // =========================================================================================
    // 1. FEATURE TESTS
    // =========================================================================================

    mod features {
        use super::*;

        #[tokio::test]
        async fn test_publish_sends_numbered_message() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-1", true);
            let (app, publisher) = app(&broker, &["b-1"]);

            let (status, _, body) = call(&app, "POST", "/publish").await;
            assert_eq!(status, StatusCode::OK);
            let reply = json(&body);
            assert_eq!(reply["status"], "success");
            assert_eq!(reply["message"], "Published: Message #1");
            assert_eq!(reply["counter"], 1);

            let (_, _, body) = call(&app, "POST", "/publish").await;
            assert_eq!(json(&body)["message"], "Published: Message #2");
            assert_eq!(publisher.published(), 2);
        }

        #[tokio::test]
        async fn test_each_publish_is_a_short_lived_session() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-1", true);
            let (app, _) = app(&broker, &["b-1"]);

            call(&app, "POST", "/publish").await;

            let events = broker.events();
            assert_eq!(events.len(), 2);
            match &events[0] {
                Event::Sent { destination, body, .. } => {
                    assert_eq!(destination, DESTINATION);
                    assert_eq!(body, &Bytes::from("Message #1"));
                }
                other => panic!("expected SEND, got {:?}", other),
            }
            assert!(matches!(events[1], Event::Disconnected(_)));
        }

        #[tokio::test]
        async fn test_index_page_is_served() {
            let broker = FakeBroker::new();
            let (app, _) = app(&broker, &["b-1"]);

            let (status, content_type, body) = call(&app, "GET", "/").await;
            assert_eq!(status, StatusCode::OK);
            assert!(content_type.unwrap_or_default().starts_with("text/html"));
            assert!(String::from_utf8_lossy(&body).contains("ActiveMQ Publisher"));
        }

        #[tokio::test]
        async fn test_unknown_asset_is_not_found() {
            let broker = FakeBroker::new();
            let (app, _) = app(&broker, &["b-1"]);

            let (status, _, _) = call(&app, "GET", "/missing.js").await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        #[tokio::test]
        async fn test_health_reports_working_broker() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-2", true);
            let (app, _) = app(&broker, &["b-1", "b-2"]);

            let (_, _, body) = call(&app, "GET", "/health").await;
            let before = json(&body);
            assert_eq!(before["status"], "ok");
            assert!(before["broker"].is_null());

            call(&app, "POST", "/publish").await;

            let (_, _, body) = call(&app, "GET", "/health").await;
            assert_eq!(json(&body)["broker"]["host"], "b-2");
        }
    }

    // =========================================================================================
    // 2. FAILURE TESTS
    // =========================================================================================

    mod failures {
        use super::*;

        #[tokio::test]
        async fn test_unreachable_broker_returns_500_json() {
            let broker = FakeBroker::new();
            let (app, publisher) = app(&broker, &["b-1"]);

            let (status, _, body) = call(&app, "POST", "/publish").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            let reply = json(&body);
            assert_eq!(reply["status"], "error");
            assert!(reply["message"].as_str().unwrap().contains("no broker available"));

            // Counter still advanced
            assert_eq!(publisher.published(), 1);
        }

        #[tokio::test]
        async fn test_rejected_send_returns_500_and_disconnects() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-1", true);
            broker.deny(DESTINATION);
            let (app, _) = app(&broker, &["b-1"]);

            let (status, _, body) = call(&app, "POST", "/publish").await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(json(&body)["message"].as_str().unwrap().contains("not authorized"));
            assert!(matches!(broker.events().last(), Some(Event::Disconnected(_))));
        }
    }
}
