use std::process::ExitCode;
use std::sync::Arc;

use amqprobe::config::Config;
use amqprobe::logging::init_tracing;
use amqprobe::publisher::{self, Publisher};
use amqprobe::stomp_failover;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log.level);

    tracing::info!(
        "Publishing to {} via {:?} (SSL: {})",
        config.broker.destination,
        config.broker.hosts(),
        config.broker.use_tls
    );

    let publisher = Arc::new(Publisher::new(
        stomp_failover(&config.broker),
        config.broker.destination.clone(),
    ));

    if let Err(e) = publisher::serve(publisher, &config.publisher.addr()).await {
        tracing::error!("Publisher server stopped: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
