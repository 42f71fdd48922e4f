//! Command-line argument parsing and SSH-derived server address defaulting.

use clap::Parser;
use std::env;
use std::net::IpAddr;

const DEFAULT_PORT: u16 = 5900;

/// RFB/VNC client that mirrors a remote desktop onto this e-ink tablet.
#[derive(Parser, Debug)]
#[command(name = "einkrfb", about, disable_version_flag = true)]
pub struct Args {
    /// Print version information.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    pub version: (),

    /// Server address. Defaults to the client half of `SSH_CONNECTION` (the
    /// machine this tablet is SSHed from), with any `::ffff:` IPv4-mapped
    /// prefix stripped.
    pub ip: Option<String>,

    /// Server port.
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Disable the physical button handler.
    #[arg(long)]
    pub no_buttons: bool,

    /// Disable the pen digitizer handler.
    #[arg(long)]
    pub no_pen: bool,

    /// Disable the touchscreen handler.
    #[arg(long)]
    pub no_touch: bool,

    /// Increase log verbosity (can be repeated: --verbose --verbose). `-v`
    /// is reserved for `--version`, matching this client's documented CLI.
    #[arg(long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Silence all logging below error level.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(
        "no server IP given and SSH_CONNECTION is not set; pass an IP \
         explicitly or run this over an SSH session"
    )]
    NoSshConnection,
    #[error("SSH_CONNECTION has an unexpected format: {0:?}")]
    MalformedSshConnection(String),
}

/// Resolves the server IP: the explicit argument if given, otherwise the
/// client half of `SSH_CONNECTION`.
pub fn resolve_ip(explicit: Option<&str>) -> Result<String, CliError> {
    if let Some(ip) = explicit {
        return Ok(ip.to_string());
    }

    let conn = env::var("SSH_CONNECTION").map_err(|_| CliError::NoSshConnection)?;
    let client_ip = conn
        .split_whitespace()
        .next()
        .ok_or_else(|| CliError::MalformedSshConnection(conn.clone()))?;

    Ok(strip_ipv4_mapped_prefix(client_ip))
}

/// Strips the `::ffff:` IPv4-mapped-IPv6 prefix some SSH servers report.
fn strip_ipv4_mapped_prefix(addr: &str) -> String {
    const PREFIX: &str = "::ffff:";
    if let Some(rest) = addr.strip_prefix(PREFIX) {
        if rest.parse::<IpAddr>().is_ok() {
            return rest.to_string();
        }
    }
    addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ipv4_mapped_prefix() {
        assert_eq!(strip_ipv4_mapped_prefix("::ffff:192.168.1.5"), "192.168.1.5");
    }

    #[test]
    fn leaves_plain_ipv4_untouched() {
        assert_eq!(strip_ipv4_mapped_prefix("192.168.1.5"), "192.168.1.5");
    }

    #[test]
    fn leaves_plain_ipv6_untouched() {
        assert_eq!(strip_ipv4_mapped_prefix("fe80::1"), "fe80::1");
    }

    #[test]
    fn explicit_ip_bypasses_ssh_connection() {
        assert_eq!(resolve_ip(Some("10.0.0.1")).unwrap(), "10.0.0.1");
    }
}
