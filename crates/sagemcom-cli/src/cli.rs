//! Command-line interface definitions for the `sagemcom` tool.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::{Parser, Subcommand};
use sagemcom_core::Protocol;
use std::path::PathBuf;

/// Manage port forwards on a Sagemcom router.
///
/// The router password is taken from `SAGEMCOM_MODEM_PASSWORD` or, failing
/// that, looked up in 1Password with the `op` CLI.
#[derive(Parser, Debug)]
#[command(name = "sagemcom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Operation to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Router host name or IP address.
    ///
    /// Overrides the config file and `SAGEMCOM_MODEM_IP`.
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// Path to the config file.
    ///
    /// Defaults to `sagemcom/config.toml` in the user config directory.
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// 1Password item holding the router password.
    #[arg(long = "onepassword-item", global = true, value_name = "ITEM")]
    pub onepassword_item: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Subcommands for `sagemcom`.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Forward an external port to a host on the LAN.
    Open {
        /// Label for the rule; must be unique.
        #[arg(short, long)]
        name: String,

        /// LAN host: a full IPv4 address or just its last octet.
        #[arg(short = 'a', long = "local-address", value_name = "ADDRESS")]
        local_address: String,

        /// Port on the LAN host.
        #[arg(short = 'l', long = "local-port", value_parser = clap::value_parser!(u16).range(1..))]
        local_port: u16,

        /// Port exposed on the router.
        #[arg(short = 'e', long = "external-port", value_parser = clap::value_parser!(u16).range(1..))]
        external_port: u16,

        /// tcp, udp or tcp_udp. Defaults to both.
        #[arg(short, long, value_parser = parse_protocol)]
        protocol: Option<Protocol>,
    },

    /// Remove the forward on an external port.
    Close {
        /// External port of the rule to remove.
        #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,
    },

    /// List active port forwards.
    List,

    /// Open the router's admin page in a browser.
    Browser,
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    value.parse().map_err(|e: sagemcom_core::Error| e.to_string())
}
