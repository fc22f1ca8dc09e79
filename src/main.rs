//! CLI for mqgate
//!
//! Subcommands:
//! - `server`: run the HTTP publish gateway
//! - `publish`: forward a single message through a fresh pool (useful for smoke tests)

use std::sync::Arc;

use clap::Parser;
use mqgate::broker::RumqttConnector;
use mqgate::config::{Settings, load_config};
use mqgate::pool::{ConnectionPool, DEFAULT_HOST, DEFAULT_PORT, PublishRequest};
use mqgate::transport::{start_http_server, wait_for_shutdown};
use mqgate::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mqgate")]
enum Command {
    /// Start the HTTP gateway
    Server,
    /// Publish one message and exit
    Publish {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long, requires = "username")]
        password: Option<String>,
        #[arg(long, default_value = "")]
        payload: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.log.level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Publish {
            topic,
            host,
            port,
            username,
            password,
            payload,
        } => {
            let request = PublishRequest {
                host,
                port,
                username,
                password,
                topic: Some(topic),
                payload,
            };
            run_publish(settings, request).await
        }
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn new_pool(settings: &Settings) -> ConnectionPool {
    ConnectionPool::new(Arc::new(RumqttConnector::default()), settings.pool.clone())
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let pool = new_pool(&settings);

    let shutdown = wait_for_shutdown(tokio::signal::ctrl_c());
    start_http_server(&addr, pool.clone(), shutdown).await?;

    pool.shutdown().await;
    Ok(())
}

async fn run_publish(
    settings: Settings,
    request: PublishRequest,
) -> Result<(), Box<dyn std::error::Error>> {
    let pool = new_pool(&settings);
    let result = pool.publish(&request).await;
    pool.shutdown().await;
    result?;

    info!(endpoint = %request.endpoint(), "message published");
    Ok(())
}
