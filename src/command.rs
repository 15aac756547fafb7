//! Control commands for a [`Device`](crate::client::Device).
//!
//! This module defines the [`Command`] enum, the parsed form of one line typed into the
//! `netblk_cli` shell. Each command maps onto one operation of the client surface: changing
//! the endpoint, connecting and disconnecting, inspecting state and statistics, and issuing
//! reads and writes.
//!
//! # Syntax
//!
//! | input                          | command                          |
//! |--------------------------------|----------------------------------|
//! | `.exit`                        | [`Command::Exit`]                |
//! | `help`                         | [`Command::Help`]                |
//! | `connect` / `disconnect`       | [`Command::Connect`] / [`Command::Disconnect`] |
//! | `state` / `stats`              | [`Command::State`] / [`Command::Stats`] |
//! | `endpoint <host> <port>`       | [`Command::Endpoint`]            |
//! | `read <sector> <length>`       | [`Command::Read`]                |
//! | `write <sector> <byte> <length>` | [`Command::Write`], fills `length` bytes with `byte` |
//!
//! Numbers are decimal, or hexadecimal with a `0x` prefix.
//!
//! # Example
//! ```rust
//! use netblk::Command;
//!
//! let cmd: Command = "write 0 0xAA 512".try_into().unwrap();
//! assert_eq!(cmd, Command::Write { sector: 0, byte: 0xAA, length: 512 });
//! ```
use thiserror::Error;

/// List of possible errors when parsing a command.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("no command provided")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Disconnect and leave the shell.
    Exit,
    Help,
    Connect,
    Disconnect,
    State,
    Stats,
    Endpoint {
        host: String,
        port: u16,
    },
    Read {
        sector: u64,
        length: u32,
    },
    /// Writes `length` copies of `byte`.
    Write {
        sector: u64,
        byte: u8,
        length: u32,
    },
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let parts = value.split_whitespace().collect::<Vec<&str>>();
        let Some((name, args)) = parts.split_first() else {
            return Err(CommandError::Empty);
        };

        let command = match name.to_lowercase().as_str() {
            ".exit" => Command::Exit,
            "help" => Command::Help,
            "connect" => Command::Connect,
            "disconnect" => Command::Disconnect,
            "state" => Command::State,
            "stats" => Command::Stats,
            "endpoint" => {
                let [host, port] =
                    expect_args::<2>(name, args, "Example: endpoint 10.0.0.2 10809")?;
                Command::Endpoint {
                    host: host.to_string(),
                    port: number(name, "port", port)?,
                }
            }
            "read" => {
                let [sector, length] = expect_args::<2>(name, args, "Example: read 0 512")?;
                Command::Read {
                    sector: number(name, "sector", sector)?,
                    length: number(name, "length", length)?,
                }
            }
            "write" => {
                let [sector, byte, length] =
                    expect_args::<3>(name, args, "Example: write 0 0xAA 512")?;
                Command::Write {
                    sector: number(name, "sector", sector)?,
                    byte: number(name, "byte", byte)?,
                    length: number(name, "length", length)?,
                }
            }
            _ => return Err(CommandError::UnrecognizedCommand(value.trim().to_string())),
        };

        if matches!(
            command,
            Command::Exit
                | Command::Help
                | Command::Connect
                | Command::Disconnect
                | Command::State
                | Command::Stats
        ) && !args.is_empty()
        {
            return Err(CommandError::InvalidCommandArguments {
                command: name.to_string(),
                reason: String::from("takes no arguments"),
            });
        }

        Ok(command)
    }
}

fn expect_args<'a, const N: usize>(
    name: &str,
    args: &[&'a str],
    example: &str,
) -> Result<[&'a str; N], CommandError> {
    <[&str; N]>::try_from(args).map_err(|_| CommandError::InvalidCommandArguments {
        command: name.to_string(),
        reason: format!("requires {N} arguments. {example}"),
    })
}

fn number<T: TryFrom<u64>>(command: &str, field: &str, raw: &str) -> Result<T, CommandError> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };

    parsed
        .ok()
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| CommandError::InvalidCommandArguments {
            command: command.to_string(),
            reason: format!("'{raw}' is not a valid {field}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_string() {
        let inputs = vec![
            (".exit", Command::Exit),
            ("help", Command::Help),
            ("connect", Command::Connect),
            ("DISCONNECT", Command::Disconnect),
            ("state", Command::State),
            ("  stats  ", Command::Stats),
            (
                "endpoint 192.168.1.22 10809",
                Command::Endpoint {
                    host: String::from("192.168.1.22"),
                    port: 10809,
                },
            ),
            (
                "read 2048 512",
                Command::Read {
                    sector: 2048,
                    length: 512,
                },
            ),
            (
                "write 0x10 0xaa 4096",
                Command::Write {
                    sector: 16,
                    byte: 0xAA,
                    length: 4096,
                },
            ),
        ];

        for (cmd, expected) in inputs {
            let command: Command = cmd.try_into().unwrap();
            assert_eq!(command, expected);
        }
    }

    #[test]
    fn empty_command() {
        assert_eq!(Command::try_from("   "), Err(CommandError::Empty));
    }

    #[test]
    fn unrecognized_command() {
        assert_eq!(
            Command::try_from("format"),
            Err(CommandError::UnrecognizedCommand(String::from("format")))
        );
    }

    #[test]
    #[should_panic(expected = "requires 2 arguments")]
    fn read_missing_length() {
        Command::try_from("read 0").unwrap();
    }

    #[test]
    #[should_panic(expected = "'256' is not a valid byte")]
    fn write_byte_out_of_range() {
        Command::try_from("write 0 256 512").unwrap();
    }

    #[test]
    #[should_panic(expected = "'70000' is not a valid port")]
    fn endpoint_port_out_of_range() {
        Command::try_from("endpoint localhost 70000").unwrap();
    }

    #[test]
    fn extra_arguments_rejected() {
        assert!(matches!(
            Command::try_from("state now"),
            Err(CommandError::InvalidCommandArguments { .. })
        ));
    }
}
