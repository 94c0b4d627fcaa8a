//! Ghostwire CLI

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use bytes::Bytes;
use ghostwire::{Config, RecorderBuilder};
use hyper::Request;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Ghostwire v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: ghostwire [--config <file>] <url>...");
    eprintln!();
    eprintln!("Fetches each URL through a recorder and prints the recorded history.");
    eprintln!("Set RUST_LOG to control log output (default: ghostwire=info).");
    process::exit(1);
}

fn parse_args(args: &[String]) -> anyhow::Result<(Option<PathBuf>, Vec<String>)> {
    let mut config = None;
    let mut urls = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = iter.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => usage(),
            flag if flag.starts_with('-') => bail!("Unknown option: {flag}"),
            url => urls.push(url.to_string()),
        }
    }

    Ok((config, urls))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ghostwire=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, urls) = parse_args(&args)?;
    if urls.is_empty() {
        usage();
    }

    let config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    let recorder = RecorderBuilder::from_config(&config)?.build()?;

    for url in &urls {
        let request = Request::get(url.as_str())
            .body(Bytes::new())
            .with_context(|| format!("invalid URL: {url}"))?;

        match recorder.round_trip(Some(request)).await {
            Ok(response) => info!("{} -> {}", url, response.status()),
            Err(e) => error!("{} failed: {}", url, e),
        }
    }

    print!("{recorder}");

    Ok(())
}
