pub mod channel;
pub mod commands;
pub mod communication;

pub use channel::DaliChannel;
pub use commands::DaliCommands;
pub use communication::{DaliCommunicationRegister, DaliInputMessage, DaliOutputMessage};
