use std::process::ExitCode;

use amqprobe::config::Config;
use amqprobe::discovery::{discover_destinations, report};
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

    println!("\n{}", "=".repeat(80));
    println!("AWS MQ / ActiveMQ Queue Discovery Tool");
    println!("(Using StatisticsBrokerPlugin Request/Response Pattern)");
    println!("{}", "=".repeat(80));

    let failover = stomp_failover(&config.broker);
    let brokers = failover
        .candidates()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    tracing::info!("Starting destination discovery (SSL: {})", config.broker.use_tls);
    tracing::info!("Broker(s): {}", brokers);
    tracing::info!("Using credentials for user: {}", config.broker.username);

    match discover_destinations(&failover, &config.discovery.options()).await {
        Ok(results) => {
            println!("{}", report::render(&results));
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to connect to broker: {}", e);
            ExitCode::FAILURE
        }
    }
}
