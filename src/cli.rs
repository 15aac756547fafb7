//! Shell utilities for netblk.
//!
//! The utilities present in this module drive a [`Device`] from an interactive prompt.
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::{
    client::{ClientError, Device},
    command::{Command, CommandError},
    protocol::{SECTOR_SIZE, allocate},
};

const HELP: &str = "\
commands:
  connect                          open the connection now
  disconnect                       close the connection
  state                            show the connection state
  stats                            show I/O counters
  endpoint <host> <port>           set the server address
  read <sector> <length>           read and hex dump a range
  write <sector> <byte> <length>   fill a range with one byte value
  .exit                            leave the shell
";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("terminal io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("end of input")]
    Eof,
}

/// Prompt user for a valid shell command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, PromptError>
where
    R: BufRead,
    W: Write,
{
    write!(&mut writer, "> ")?;
    writer.flush()?;

    let mut s = String::default();
    if reader.read_line(&mut s)? == 0 {
        return Err(PromptError::Eof);
    }

    Ok(s.as_str().try_into()?)
}

/// Runs `command` against `device` and prints the outcome. Returns `false`
/// once the shell should exit.
pub fn execute<W: Write>(device: &Device, command: Command, mut out: W) -> io::Result<bool> {
    let outcome: Result<String, ClientError> = match command {
        Command::Exit => return Ok(false),
        Command::Help => Ok(HELP.to_string()),
        Command::Connect => device
            .connect()
            .map(|_| format!("connected to {}", device.endpoint())),
        Command::Disconnect => {
            device.disconnect();
            Ok(String::from("disconnected"))
        }
        Command::State => Ok(device.state().to_string()),
        Command::Stats => Ok(device.stats().to_string()),
        Command::Endpoint { host, port } => device
            .set_endpoint(&host, port)
            .map(|_| format!("endpoint set to {}", device.endpoint())),
        Command::Read { sector, length } => device
            .read(sector, length)
            .map(|data| hexdump(sector.saturating_mul(SECTOR_SIZE), &data)),
        Command::Write {
            sector,
            byte,
            length,
        } => device
            .check_range(sector, length)
            .and_then(|_| {
                allocate(length as usize).ok_or(ClientError::Allocation(length as usize))
            })
            .and_then(|mut data| {
                data.fill(byte);
                device.write(sector, &data)
            })
            .map(|_| format!("wrote {length} bytes at sector {sector}")),
    };

    match outcome {
        Ok(msg) => writeln!(out, "{}", msg.trim_end())?,
        Err(e) => writeln!(out, "error: {e}")?,
    }
    Ok(true)
}

/// Classic 16-bytes-per-line dump, offsets starting at `base`.
pub fn hexdump(base: u64, data: &[u8]) -> String {
    let mut out = String::new();

    for (i, chunk) in data.chunks(16).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ");
        let ascii = chunk
            .iter()
            .map(|b| {
                if b.is_ascii_graphic() || *b == b' ' {
                    *b as char
                } else {
                    '.'
                }
            })
            .collect::<String>();

        out.push_str(&format!(
            "{:08x}  {hex:<47}  |{ascii}|\n",
            base + (i as u64) * 16
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DeviceConfig;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_commands() {
        let input = b"read 4 1024\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(
            Command::Read {
                sector: 4,
                length: 1024
            },
            res
        );
    }

    #[test]
    fn prompt_end_of_input() {
        let mut output = Vec::new();

        assert!(matches!(
            prompt(&b""[..], &mut output),
            Err(PromptError::Eof)
        ));
    }

    #[test]
    #[should_panic(expected = "UnrecognizedCommand")]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();
    }

    #[test]
    fn hexdump_lines() {
        let mut data = b"netblk".to_vec();
        data.extend_from_slice(&[0; 12]);

        let dump = hexdump(512, &data);
        let lines = dump.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000200  6e 65 74 62 6c 6b 00"));
        assert!(lines[0].ends_with("|netblk..........|"));
        assert!(lines[1].starts_with("00000210  00 00"));
        assert!(lines[1].ends_with("|..|"));
    }

    #[test]
    fn execute_local_commands() {
        let device = Device::new(DeviceConfig::default());
        let mut out = Vec::new();

        assert!(execute(&device, Command::State, &mut out).unwrap());
        assert!(execute(&device, Command::Stats, &mut out).unwrap());
        assert!(
            execute(
                &device,
                Command::Read {
                    sector: u64::MAX,
                    length: 512
                },
                &mut out
            )
            .unwrap()
        );
        assert!(!execute(&device, Command::Exit, &mut out).unwrap());

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("disconnected\nread_bytes:  0\n"));
        assert!(out.contains("error: 512 bytes at sector"));
    }

    #[test]
    fn execute_oversized_write_fails_locally() {
        let device = Device::new(DeviceConfig::default());
        let mut out = Vec::new();

        let command = Command::try_from("write 0 1 4294967295").unwrap();
        assert!(execute(&device, command, &mut out).unwrap());

        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("error: 4294967295 bytes at sector 0 is beyond"));
        assert_eq!(device.stats().errors, 0);
        assert_eq!(device.state().as_str(), "disconnected");
    }
}
