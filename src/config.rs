//! Assembles the CLI-parsed arguments into the plain configuration struct
//! the rest of the crate consumes. No file-based configuration exists in
//! this crate: every setting comes from the command line or the
//! environment (`SSH_CONNECTION`), matching spec.md's Non-goals around
//! configuration UX.

use crate::cli::{resolve_ip, Args, CliError};

/// Fully resolved startup configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub enable_buttons: bool,
    pub enable_pen: bool,
    pub enable_touch: bool,
}

impl AppConfig {
    pub fn from_args(args: &Args) -> Result<Self, CliError> {
        Ok(Self {
            host: resolve_ip(args.ip.as_deref())?,
            port: args.port,
            enable_buttons: !args.no_buttons,
            enable_pen: !args.no_pen,
            enable_touch: !args.no_touch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_source_flows_through() {
        let args = Args {
            version: (),
            ip: Some("10.0.0.1".to_string()),
            port: 5901,
            no_buttons: true,
            no_pen: false,
            no_touch: false,
            verbose: 0,
            quiet: false,
        };
        let config = AppConfig::from_args(&args).unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 5901);
        assert!(!config.enable_buttons);
        assert!(config.enable_pen);
        assert!(config.enable_touch);
    }
}
