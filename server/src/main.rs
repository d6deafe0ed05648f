use clap::Parser;
use log::info;
use server::network::{Server, ServerError};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence after which a client is dropped
    #[arg(short, long, default_value = "5")]
    idle_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    info!("Starting server at {} ticks per second", tick_rate);

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(
        &address,
        Duration::from_secs_f64(1.0 / tick_rate as f64),
        args.max_clients,
        Duration::from_secs(args.idle_timeout),
    )
    .await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}
