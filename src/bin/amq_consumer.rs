use std::process::ExitCode;

use amqprobe::config::Config;
use amqprobe::consumer::{log_message, run_consumer};
use amqprobe::logging::init_tracing;
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

    let failover = stomp_failover(&config.broker);
    let options = config.consumer.options(&config.broker.destination);

    tracing::info!("Broker hosts configured: {:?}", failover.candidates());
    tracing::info!("Queue: {} (SSL: {})", options.destination, config.broker.use_tls);

    tokio::select! {
        _ = run_consumer(&failover, &options, log_message) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down consumer");
        }
    }
    ExitCode::SUCCESS
}
