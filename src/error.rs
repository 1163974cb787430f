use std::time::Duration;

use thiserror::Error;

/// Error kinds surfaced by the driver.
#[derive(Debug, Error)]
pub enum Error {
    /// Initial connect to the controller failed.
    #[error("connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Transport kept failing after reconnect attempts.
    #[error("communication failed after {attempts} attempts: {message}")]
    Communication { attempts: u32, message: String },

    /// A sub-protocol handshake did not complete in time.
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        after: Duration,
        waiting_for: &'static str,
    },

    /// Modbus exception response or malformed reply.
    #[error("modbus protocol error: {0}")]
    Protocol(String),

    /// Write attempted on an input or discrete channel.
    #[error("write to read-only {kind} channel at address {address:#06x}")]
    WriteToReadOnly { kind: &'static str, address: u16 },

    /// Out-of-range parameter or wrong channel kind for the conversion.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Identification word not in the catalogue. Non-fatal during discovery;
    /// the module stays in the chain as a zero-channel placeholder.
    #[error("unknown module identifier {0:#06x}")]
    UnknownModule(u16),
}

pub type Result<T> = std::result::Result<T, Error>;
