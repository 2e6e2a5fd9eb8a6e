//! Command line interface for the `framelink` demo binary.
//!
//! `listen` runs an echo server; `send` dials it, sends a message and
//! prints what comes back.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// Default address for both subcommands.
pub const DEFAULT_ADDR: &str = "127.0.0.1:7777";

/// Command line arguments for the `framelink` binary.
#[derive(Debug, Parser)]
#[command(name = "framelink", version, about = "Length-prefixed packet echo demo")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Echo every packet back to its sender until Ctrl-C.
    Listen {
        /// Address to listen on.
        #[arg(short, long, default_value = DEFAULT_ADDR)]
        addr: SocketAddr,
    },
    /// Send a message to an echo server and print the replies.
    Send {
        /// Address of the echo server.
        #[arg(short, long, default_value = DEFAULT_ADDR)]
        addr: SocketAddr,
        /// Text to send.
        #[arg(short, long)]
        message: String,
        /// How many times to send it.
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command, DEFAULT_ADDR};

    #[test]
    fn listen_defaults_address() {
        let cli = Cli::parse_from(["framelink", "listen"]);
        let Command::Listen { addr } = cli.command else {
            panic!("expected listen");
        };
        assert_eq!(addr.to_string(), DEFAULT_ADDR);
    }

    #[test]
    fn parses_send_options() {
        let cli = Cli::parse_from([
            "framelink",
            "send",
            "--addr",
            "10.0.0.1:9000",
            "--message",
            "hi",
            "--count",
            "3",
        ]);
        let Command::Send {
            addr,
            message,
            count,
        } = cli.command
        else {
            panic!("expected send");
        };
        assert_eq!(addr.to_string(), "10.0.0.1:9000");
        assert_eq!(message, "hi");
        assert_eq!(count, 3);
    }

    #[test]
    fn send_requires_message() {
        assert!(Cli::try_parse_from(["framelink", "send"]).is_err());
    }
}
