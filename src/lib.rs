pub mod cli;
pub mod client;
pub mod command;
pub mod protocol;
pub mod storage;

pub use client::{ClientError, ConnectionState, Device, DeviceConfig, Stats};
pub use command::Command;
pub use protocol::{BlockServer, ServerConfig};
