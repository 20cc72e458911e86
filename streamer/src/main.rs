use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use workflow::config::{Overrides, StreamerConfig};
use workflow::runner::Runner;

mod device;
mod generator;
mod http_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Streams a tactile sensor as a live contact map")]
struct Args {
    /// Load a streamer config from YAML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Serial port of the sensor
    #[arg(long)]
    port: Option<String>,
    #[arg(long)]
    baud: Option<u32>,
    /// Replay a captured line log instead of a live device
    #[arg(long, conflicts_with = "synthetic")]
    replay: Option<PathBuf>,
    /// Run against the built-in synthetic sensor
    #[arg(long, default_value_t = false)]
    synthetic: bool,
    /// Address for the HTTP bridge
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Per-client output frame rate
    #[arg(long)]
    fps: Option<f32>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => StreamerConfig::load(path)?,
        None => StreamerConfig::default(),
    };
    config.apply(Overrides {
        port: args.port,
        baud: args.baud,
        replay: args.replay,
        synthetic: args.synthetic,
        bind: args.bind,
        fps: args.fps,
    });

    Runner::new(config).execute()
}
