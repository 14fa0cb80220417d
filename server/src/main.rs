use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use server::host;
use server::settings::Settings;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,
    /// Path to the JSON settings file
    #[clap(short, long, default_value = "settings.json")]
    settings: PathBuf,
    /// Override the tick length from the settings file
    #[clap(long)]
    tick_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut settings = if args.settings.exists() {
        Settings::load(&args.settings)?
    } else {
        warn!(
            "Settings file {} not found, using defaults",
            args.settings.display()
        );
        Settings::default()
    };
    if let Some(tick_ms) = args.tick_ms {
        settings.ms_per_frame = tick_ms;
        settings.validate()?;
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let server = host::start(&settings, addr)?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    server.shutdown();

    Ok(())
}
