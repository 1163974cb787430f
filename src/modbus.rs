pub mod channel;
pub mod connection;
pub mod registers;
pub mod tcp;

pub use channel::ModbusChannel;
pub use connection::{
    ChannelKind, ChannelRef, ChannelSpec, ChannelValue, ModbusConnection, PollIntervals,
};
pub use registers::{Bits, Register, Words};
pub use tcp::TcpModbusClient;
