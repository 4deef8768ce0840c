use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

use groundgate::FrameCodec;

/// Sends files to a data channel, one frame per file.
#[derive(Parser, Debug)]
#[command(name = "frame-sender", version)]
struct Args {
    /// Data channel address, e.g. 127.0.0.1:5000
    address: String,

    /// Files to send, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!("Connecting to {}", args.address);
    let mut stream = TcpStream::connect(&args.address)
        .await
        .with_context(|| format!("Couldn't connect to {}", args.address))?;

    let codec = FrameCodec::new();
    let count = args.files.len();
    for (index, path) in args.files.iter().enumerate() {
        let number = index + 1;
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Couldn't load file {number}/{count}: {}", path.display()))?;
        codec
            .write_frame(&mut stream, &data)
            .await
            .with_context(|| format!("Couldn't send file {number}/{count}: {}", path.display()))?;
        info!(length = data.len(), "Sent file {}/{}: {}", number, count, path.display());
    }

    stream.shutdown().await.context("Couldn't close connection")?;
    info!("Sent {} files", count);
    Ok(())
}
