use amqprobe::broker::{BrokerHost, FailoverError};

mod helpers;
use helpers::{failover, FakeBroker};

#[cfg(test)]
mod failover_tests {
    use super::*;

    // =========================================================================================
    // 1. FEATURE TESTS
    // =========================================================================================

    mod features {
        use super::*;

        #[tokio::test]
        async fn test_candidates_tried_in_order_until_one_accepts() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-2", true);
            let failover = failover(&broker, &["b-1", "b-2"]);

            let session = failover.connect().await.expect("secondary should accept");
            assert_eq!(session.host, BrokerHost::new("b-2", 61614));
            assert_eq!(broker.attempted_hosts(), vec!["b-1", "b-2"]);
            assert_eq!(failover.working_broker().get(), Some(BrokerHost::new("b-2", 61614)));
        }

        #[tokio::test]
        async fn test_cached_broker_is_tried_alone() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-2", true);
            let failover = failover(&broker, &["b-1", "b-2"]);

            failover.connect().await.unwrap();
            failover.connect().await.unwrap();

            // Second call skips b-1 entirely
            assert_eq!(broker.attempted_hosts(), vec!["b-1", "b-2", "b-2"]);
        }

        #[tokio::test]
        async fn test_primary_wins_when_both_accept() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-1", true);
            broker.set_reachable("b-2", true);
            let failover = failover(&broker, &["b-1", "b-2"]);

            let session = failover.connect().await.unwrap();
            assert_eq!(session.host.host, "b-1");
            assert_eq!(broker.attempted_hosts(), vec!["b-1"]);
        }
    }

    // =========================================================================================
    // 2. FAILURE TESTS
    // =========================================================================================

    mod failures {
        use super::*;

        #[tokio::test]
        async fn test_exhaustion_reports_every_attempt() {
            let broker = FakeBroker::new();
            let failover = failover(&broker, &["b-1", "b-2"]);

            let err = match failover.connect().await {
                Err(err) => err,
                Ok(_) => panic!("no broker is reachable"),
            };
            let FailoverError::NoBrokerAvailable { attempts } = &err;
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].host.host, "b-1");
            assert_eq!(attempts[1].host.host, "b-2");
            assert!(err.to_string().contains("2 attempt(s)"));
            assert!(failover.working_broker().get().is_none());
        }

        #[tokio::test]
        async fn test_cached_broker_failure_clears_cache() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-2", true);
            let failover = failover(&broker, &["b-1", "b-2"]);
            failover.connect().await.unwrap();

            // 1. Cached broker goes away: exactly one attempt, cache cleared
            broker.set_reachable("b-2", false);
            let err = match failover.connect().await {
                Err(err) => err,
                Ok(_) => panic!("cached broker is down"),
            };
            assert_eq!(err.attempts().len(), 1);
            assert!(failover.working_broker().get().is_none());

            // 2. Next call rescans from the primary
            broker.set_reachable("b-1", true);
            let session = failover.connect().await.unwrap();
            assert_eq!(session.host.host, "b-1");
            assert_eq!(broker.attempted_hosts(), vec!["b-1", "b-2", "b-2", "b-1"]);
        }

        #[tokio::test]
        async fn test_explicit_invalidate_forces_rescan() {
            let broker = FakeBroker::new();
            broker.set_reachable("b-1", true);
            broker.set_reachable("b-2", true);
            let failover = failover(&broker, &["b-2", "b-1"]);
            failover.connect().await.unwrap();

            assert_eq!(
                failover.working_broker().invalidate(),
                Some(BrokerHost::new("b-2", 61614))
            );
            failover.connect().await.unwrap();
            assert_eq!(broker.attempted_hosts(), vec!["b-2", "b-2"]);
        }

        #[tokio::test]
        async fn test_no_candidates_is_an_error() {
            let broker = FakeBroker::new();
            let failover = failover(&broker, &[]);

            let err = match failover.connect().await {
                Err(err) => err,
                Ok(_) => panic!("nothing to connect to"),
            };
            assert!(err.attempts().is_empty());
            assert!(err.to_string().contains("no candidates configured"));
        }
    }
}
