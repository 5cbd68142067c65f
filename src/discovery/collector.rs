//! Reply collection with a quiescence rule.
//!
//! A wildcard statistics request triggers an unknown number of replies, so the
//! collector waits up to a hard ceiling but stops early once `quiet_period`
//! passes without a new reply after the most recent one.

use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::session::DiscoverySession;
use crate::stomp::Subscription;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescencePolicy {
    pub ceiling: Duration,
    pub quiet_period: Duration,
}

impl Default for QuiescencePolicy {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(15),
            quiet_period: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Nothing new for the quiet period after at least one reply.
    Quiet,
    /// The hard ceiling elapsed.
    Ceiling,
    /// The subscription ended (connection lost).
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectOutcome {
    pub received: usize,
    pub reason: StopReason,
    pub elapsed: Duration,
}

pub async fn collect_responses(
    subscription: &mut Subscription,
    session: &mut DiscoverySession,
    policy: QuiescencePolicy,
) -> CollectOutcome {
    let started = Instant::now();
    let deadline = started + policy.ceiling;
    let mut received = 0;

    let reason = loop {
        // Replies from an earlier request address do not count towards this quiet period.
        let last_reply = session.last_response.filter(|at| *at >= started);
        let wake = match last_reply {
            Some(at) => (at + policy.quiet_period).min(deadline),
            None => deadline,
        };

        match timeout_at(wake, subscription.next()).await {
            Ok(Some(message)) => {
                session.record(&message);
                received += 1;
                let (queues, topics) = session.progress();
                debug!("Waiting for more replies (queues: {}, topics: {})", queues, topics);
            }
            Ok(None) => break StopReason::Closed,
            Err(_) if Instant::now() >= deadline => break StopReason::Ceiling,
            Err(_) => break StopReason::Quiet,
        }
    };

    CollectOutcome {
        received,
        reason,
        elapsed: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stomp::Message;
    use tokio::sync::mpsc;

    fn reply(name: &str) -> Message {
        Message::new(
            "/temp-queue/stats.reply.test",
            format!(
                "<map><entry><string>destinationName</string><string>queue://{}</string></entry>\
                 <entry><string>size</string><long>1</long></entry></map>",
                name
            ),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_quiet_period_following_last_reply() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("sub-1", "/temp-queue/stats.reply.test", rx);
        let mut session = DiscoverySession::new();

        tokio::spawn(async move {
            for (i, name) in ["a", "b", "c"].iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                let _ = tx.send(reply(name));
            }
            // Keep the channel open well past the ceiling.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let outcome = collect_responses(&mut subscription, &mut session, QuiescencePolicy::default()).await;

        assert_eq!(outcome.reason, StopReason::Quiet);
        assert_eq!(outcome.received, 3);
        assert!(outcome.elapsed >= Duration::from_secs(5));
        assert!(outcome.elapsed < Duration::from_secs(6));
        assert_eq!(session.catalog.queues.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_full_ceiling_when_nothing_arrives() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("sub-1", "/temp-queue/stats.reply.test", rx);
        let mut session = DiscoverySession::new();

        let outcome = collect_responses(&mut subscription, &mut session, QuiescencePolicy::default()).await;

        assert_eq!(outcome.reason, StopReason::Ceiling);
        assert_eq!(outcome.received, 0);
        assert!(outcome.elapsed >= Duration::from_secs(15));
        assert!(outcome.elapsed < Duration::from_secs(16));
        assert!(!session.any_response);
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_caps_a_steady_stream() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("sub-1", "/temp-queue/stats.reply.test", rx);
        let mut session = DiscoverySession::new();

        tokio::spawn(async move {
            for i in 0..30 {
                let _ = tx.send(reply(&format!("q{}", i)));
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        let outcome = collect_responses(&mut subscription, &mut session, QuiescencePolicy::default()).await;

        assert_eq!(outcome.reason, StopReason::Ceiling);
        assert!(outcome.elapsed >= Duration::from_secs(15));
        assert!(outcome.elapsed < Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn earlier_replies_do_not_shorten_the_next_collection() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("sub-1", "/temp-queue/stats.reply.test", rx);
        let mut session = DiscoverySession::new();
        session.record(&reply("orders"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let outcome = collect_responses(&mut subscription, &mut session, QuiescencePolicy::default()).await;

        assert_eq!(outcome.reason, StopReason::Ceiling);
        assert!(outcome.elapsed >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn closed_subscription_ends_collection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscription = Subscription::new("sub-1", "/temp-queue/stats.reply.test", rx);
        let mut session = DiscoverySession::new();

        tx.send(reply("orders")).unwrap();
        drop(tx);

        let outcome = collect_responses(&mut subscription, &mut session, QuiescencePolicy::default()).await;

        assert_eq!(outcome.reason, StopReason::Closed);
        assert_eq!(outcome.received, 1);
        assert!(session.catalog.queues.contains_key("orders"));
    }
}
