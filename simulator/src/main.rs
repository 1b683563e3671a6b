use clap::Parser;
use irrigation_simulator::{SimConfig, DEMO_EMAIL, DEMO_PASSWORD};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "irrigation-simulator")]
#[command(about = "Development backend for the irrigation dashboard", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, env = "SIM_ADDR", default_value = "0.0.0.0:3710")]
    addr: String,

    /// Machine ids to simulate
    #[arg(short, long, value_delimiter = ',', default_value = "m-1,m-2")]
    machines: Vec<String>,

    /// Milliseconds between readings
    #[arg(short, long, default_value = "2000")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = SimConfig {
        machines: args.machines,
        sample_every: Duration::from_millis(args.interval_ms.max(1)),
    };

    log::info!("demo account: {DEMO_EMAIL} / {DEMO_PASSWORD}");
    log::info!("machines: {}", config.machines.join(", "));

    let (local, _state, server) = irrigation_simulator::spawn(&args.addr, config).await?;
    log::info!("listening on {local}");
    server.await?;
    Ok(())
}
