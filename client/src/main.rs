use clap::Parser;
use client::input::Autopilot;
use client::network::{Client, ClientError};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:2156")]
    server: String,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Stop after this many seconds instead of running until the server goes away
    #[arg(short, long)]
    duration: Option<u64>,

    /// Also simulate scenery a renderer would draw
    #[arg(long)]
    rendered: bool,

    /// Autopilot: thrust for half of every cycle
    #[arg(long)]
    thrust: bool,

    /// Autopilot: turn left, then right, every cycle
    #[arg(long)]
    steer: bool,

    /// Autopilot: keep the trigger held
    #[arg(long)]
    fire: bool,
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let autopilot = Autopilot::new(args.thrust, args.steer, args.fire);
    let mut client = Client::connect(
        &args.server,
        Duration::from_secs_f64(1.0 / tick_rate as f64),
        args.rendered,
        autopilot,
    )
    .await?;

    let result = client.run(args.duration.map(Duration::from_secs)).await;
    client.shutdown().await;
    result?;

    Ok(())
}
