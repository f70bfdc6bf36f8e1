//! Error taxonomy shared across the crate
//!
//! Construction-path failures abort and unwind; steady-state failures
//! during device release are downgraded to warnings at the call site.

use thiserror::Error;

/// Errors surfaced by session and device arbitration.
#[derive(Debug, Error)]
pub enum Error {
    /// No primary adapter, no session/seat for this process, or a device
    /// path that does not resolve to a character device.
    #[error("not found: {0}")]
    NotFound(String),

    /// A broker RPC failed; carries the broker's message.
    #[error("broker call failed: {0}")]
    Broker(#[from] zbus::Error),

    /// stat/open/close failure on a device path or descriptor.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// VT numbers are 1-based; anything below never names a terminal.
    #[error("invalid VT number {0}")]
    InvalidVt(i8),

    /// The renderer handoff was started twice.
    #[error("renderer already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
