use std::fmt;

pub mod error;
pub mod hub;
pub mod modbus;
pub mod modules;
pub mod settings;
mod util;

pub use error::{Error, Result};
pub use hub::{ControllerInfo, Hub};
pub use settings::HubConfig;

/// Error reported by a raw Modbus client call.
///
/// `Disconnected` means the transport broke underneath the request and the
/// call may be retried after a reconnect. `Protocol` means the server replied
/// with a Modbus exception or a malformed frame; retrying will not help.
#[derive(Debug)]
pub enum ClientError {
    Disconnected(String),
    Protocol(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Disconnected(msg) => write!(f, "transport disconnected: {}", msg),
            ClientError::Protocol(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Contract for the Modbus/TCP client the driver talks through.
///
/// Addresses are raw wire addresses; the process image cache applies the
/// controller's 0x0200 base for the holding and coil spaces before calling in
/// here.
pub trait ModbusClient: Send {
    fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>>;
    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>>;
    fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>>;
    fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>>;

    fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()>;
    fn write_multiple_coils(&mut self, address: u16, values: &[bool]) -> ClientResult<()>;
    fn write_single_register(&mut self, address: u16, value: u16) -> ClientResult<()>;
    fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> ClientResult<()>;

    /// Close and reopen the underlying transport.
    fn reconnect(&mut self) -> ClientResult<()>;
}
