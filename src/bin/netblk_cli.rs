use std::{error::Error, io};

use clap::Parser;
use netblk::{
    cli::{PromptError, execute, prompt},
    client::{DEFAULT_PORT, Device, DeviceConfig, Endpoint},
};

const MIB: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(version, about = "Interactive client for a netblk server", long_about = None)]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Volume size in MiB, as served
    #[arg(long, default_value_t = 100)]
    size_mb: u64,
    /// Connect before showing the prompt
    #[arg(long)]
    connect: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let size = cli
        .size_mb
        .checked_mul(MIB)
        .ok_or("volume size does not fit in 64 bits")?;
    let device = Device::new(DeviceConfig::new(Endpoint::new(cli.host, cli.port)?, size));

    let stdin = io::stdin();
    let stdout = io::stdout();

    if cli.connect {
        execute(&device, netblk::Command::Connect, stdout.lock())?;
    }

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(cmd) => cmd,
            Err(PromptError::Eof) => break,
            Err(PromptError::Io(e)) => return Err(e.into()),
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if !execute(&device, cmd, stdout.lock())? {
            break;
        }
    }

    device.shutdown();
    Ok(())
}
