use std::{error::Error, net::IpAddr, net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use log::info;
use netblk::protocol::{BlockServer, ServerConfig};

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Parser)]
#[command(version, about = "Serve a file as a network block volume", long_about = None)]
struct Cli {
    /// Port to listen on
    port: u16,
    /// Path to the backing storage file; created if missing
    storage: PathBuf,
    /// Advertised capacity in MiB; the file is resized to match
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    size_mb: u64,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
    /// Serve connections from a fixed pool of worker threads instead of one
    /// thread per connection
    #[arg(long)]
    workers: Option<NonZeroUsize>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let capacity = cli
        .size_mb
        .checked_mul(MIB)
        .ok_or("storage size does not fit in 64 bits")?;

    let mut config = ServerConfig::new(SocketAddr::new(cli.bind, cli.port), cli.storage, capacity);
    config.workers = cli.workers;

    let server = BlockServer::bind(config)?;
    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("received shutdown signal");
        handle.shutdown();
    })?;

    server.listen();
    info!("server stopped");
    Ok(())
}
