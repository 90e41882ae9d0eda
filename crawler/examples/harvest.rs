//! Example of running the DHT infohash crawler.

use clap::Parser;
use dht_harvest_crawler::{CrawlerBuilder, CrawlerMessage};
use log::LevelFilter;
use std::net::SocketAddr;
use std::time::Duration;

/// Well-known stable routers used to join the network.
const DEFAULT_BOOTSTRAP: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address and port to bind the UDP socket to.
    #[arg(short, long, default_value = "0.0.0.0:6881")]
    listen: SocketAddr,

    /// Bootstrap nodes (host:port), resolved at startup.
    #[arg(short, long)]
    bootstrap: Vec<String>,

    /// Milliseconds between crawl cycles.
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,

    /// Routing table capacity.
    #[arg(short, long, default_value = "128")]
    capacity: usize,

    /// Disable BEP51 infohash sampling (passive harvesting only).
    #[arg(long)]
    no_sampling: bool,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    // Configure fern logger
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] {} - {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    let names: Vec<String> = if args.bootstrap.is_empty() {
        DEFAULT_BOOTSTRAP.iter().map(|s| s.to_string()).collect()
    } else {
        args.bootstrap.clone()
    };

    let mut bootstrap = Vec::new();
    for name in &names {
        match tokio::net::lookup_host(name.as_str()).await {
            Ok(addrs) => bootstrap.extend(addrs.filter(SocketAddr::is_ipv4)),
            Err(err) => log::warn!("could not resolve bootstrap node {name}: {err}"),
        }
    }

    let crawler = CrawlerBuilder::new(bootstrap)
        .with_listen_address(args.listen)
        .with_crawl_interval(Duration::from_millis(args.interval_ms))
        .with_table_capacity(args.capacity)
        .with_sampling(!args.no_sampling)
        .build()?;

    let mut events = crawler.crawl().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(CrawlerMessage::Infohashes { hashes, peer, .. }) => {
                    for hash in hashes {
                        log::info!("{hash} from {peer}");
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}
