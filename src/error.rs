//! Error kinds produced by the core input/output loop.
//!
//! Every variant here is fatal except [`CoreError::ConnectionClosed`], which
//! unwinds the event loop with a distinct exit status so the caller can tell
//! a server-initiated hangup apart from a user-initiated quit.

/// Top-level error type propagated out of the event loop.
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// A requested hardware device could not be opened.
    #[error("failed to open {device} device at {path}: {source}")]
    DeviceOpen {
        /// Which logical device failed (`"touch"`, `"pen"`, `"buttons"`, `"panel"`, ...).
        device: &'static str,
        /// Path that was opened.
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The RFB handshake with the server failed.
    #[error("RFB handshake failed: {0}")]
    ProtocolInit(String),

    /// The server's framebuffer geometry does not fit the panel.
    #[error(
        "server uses an unsupported resolution ({server_w}x{server_h}); \
         this client needs exactly {panel_w} pixels of width and at most \
         {panel_h} pixels of height"
    )]
    UnsupportedServerGeometry {
        server_w: u16,
        server_h: u16,
        panel_w: u32,
        panel_h: u32,
    },

    /// An ioctl (or message-queue send) to the e-ink panel failed.
    #[error("panel update failed: {0}")]
    PanelIo(#[source] nix::Error),

    /// Reading from an input device failed with a non-transient error.
    #[error("read from {device} input device failed: {source}")]
    InputRead {
        device: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The RFB server closed the connection. Not a bug; terminates the loop
    /// with a distinct, non-zero exit status.
    #[error("server closed the connection")]
    ConnectionClosed,
}

impl CoreError {
    /// Process exit code to use when this error reaches `main`.
    ///
    /// [`CoreError::ConnectionClosed`] gets its own code so scripts driving
    /// this client can distinguish "server hung up" from other failures.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::ConnectionClosed => 2,
            _ => 1,
        }
    }
}

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;
