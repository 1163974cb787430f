//! DALI gateway message framing and the transmit/ack handshake.
//!
//! The gateway carries a request/response protocol inside three holding
//! words (outbound) and three input words (inbound). A message is committed
//! by flipping the transmit_request bit; the gateway mirrors it on the
//! status byte's transmit_ack once the bus transaction finished.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use packed_struct::derive::PackedStruct;
use packed_struct::PackedStruct;

use crate::error::{Error, Result};
use crate::modbus::connection::SharedState;

pub const TRANSMIT_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Low byte of the first holding word.
#[derive(PackedStruct, Clone, Copy, Default, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct DaliControlByte {
    #[packed_field(bits = "0")]
    pub transmit_request: bool,

    #[packed_field(bits = "1")]
    pub command: bool, // 0: direct arc power, 1: DALI command

    #[packed_field(bits = "2")]
    pub extended: bool, // Gateway macro selected by the extension byte
}

/// Low byte of the first input word.
#[derive(PackedStruct, Clone, Copy, Default, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct DaliStatusByte {
    #[packed_field(bits = "0")]
    pub transmit_ack: bool,
}

/// Outbound message. Word 0 high carries the DALI address, or the extension
/// selector for gateway macros; word 1 carries the command code or the two
/// parameters; word 2 the brightness level for direct arc power.
#[derive(Clone, Copy, Debug, Default)]
pub struct DaliOutputMessage {
    pub dali_address: Option<u8>,
    pub command_code: Option<u8>,
    pub command_extension: Option<u8>,
    pub parameter_1: Option<u8>,
    pub parameter_2: Option<u8>,
    pub brightness: Option<u8>,
}

impl DaliOutputMessage {
    pub fn command(dali_address: u8, command_code: u8) -> Self {
        DaliOutputMessage {
            dali_address: Some(dali_address),
            command_code: Some(command_code),
            ..Default::default()
        }
    }

    pub fn extension(command_extension: u8) -> Self {
        DaliOutputMessage {
            command_extension: Some(command_extension),
            ..Default::default()
        }
    }

    pub fn extension_with_parameters(
        command_extension: u8,
        parameter_1: Option<u8>,
        parameter_2: Option<u8>,
    ) -> Self {
        DaliOutputMessage {
            command_extension: Some(command_extension),
            parameter_1,
            parameter_2,
            ..Default::default()
        }
    }

    pub fn brightness(dali_address: u8, brightness: u8) -> Self {
        DaliOutputMessage {
            dali_address: Some(dali_address),
            brightness: Some(brightness),
            ..Default::default()
        }
    }

    /// Encode into the three holding words. The extension selector displaces
    /// the address in word 0; an address sent alongside an extension rides in
    /// the parameter_2 slot.
    pub(crate) fn encode(&self, transmit_request: bool) -> [u16; 3] {
        let control = DaliControlByte {
            transmit_request,
            command: self.command_code.is_some(),
            extended: self.command_extension.is_some(),
        };
        let selector = self.command_extension.or(self.dali_address).unwrap_or(0);
        let low_1 = self.command_code.or(self.parameter_1).unwrap_or(0);
        let high_1 = self
            .parameter_2
            .or(if self.command_extension.is_some() {
                self.dali_address
            } else {
                None
            })
            .unwrap_or(0);
        [
            (selector as u16) << 8 | control.pack().unwrap()[0] as u16,
            (high_1 as u16) << 8 | low_1 as u16,
            self.brightness.unwrap_or(0) as u16,
        ]
    }
}

/// Decoded view of the three input words at one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DaliInputMessage {
    pub transmit_ack: bool,
    /// Response byte, word 0 high.
    pub dali_response: u8,
    /// Additional response data in little order: word 1 low/high, word 2 low.
    pub message_3: u8,
    pub message_2: u8,
    pub message_1: u8,
}

impl DaliInputMessage {
    pub(crate) fn decode(words: [u16; 3]) -> Self {
        let status = DaliStatusByte::unpack(&[(words[0] & 0x00FF) as u8]).unwrap();
        DaliInputMessage {
            transmit_ack: status.transmit_ack,
            dali_response: (words[0] >> 8) as u8,
            message_3: (words[1] & 0x00FF) as u8,
            message_2: (words[1] >> 8) as u8,
            message_1: (words[2] & 0x00FF) as u8,
        }
    }

    /// Response bytes in ascending bit-offset order for multi-channel
    /// queries: byte n covers channels 8n..8n+7 of the queried half.
    pub fn response_bytes(&self) -> [u8; 4] {
        [
            self.dali_response,
            self.message_3,
            self.message_2,
            self.message_1,
        ]
    }
}

/// The gateway's three input and three holding words, bound to the cache.
#[derive(Clone)]
pub struct DaliCommunicationRegister {
    state: SharedState,
    input_base: u16,
    holding_base: u16,
}

impl DaliCommunicationRegister {
    pub(crate) fn new(state: SharedState, input_base: u16, holding_base: u16) -> Self {
        DaliCommunicationRegister {
            state,
            input_base,
            holding_base,
        }
    }

    pub(crate) fn state(&self) -> &SharedState {
        &self.state
    }

    pub(crate) fn input_base(&self) -> u16 {
        self.input_base
    }

    /// Fresh snapshot of the input words.
    pub fn read(&self) -> Result<DaliInputMessage> {
        let mut state = self.state.lock().unwrap();
        state.update_input_state(Some(self.input_base), Some(3))?;
        let words = state.read_input_registers(self.input_base, 3, false)?;
        Ok(DaliInputMessage::decode([
            words.get(0),
            words.get(1),
            words.get(2),
        ]))
    }

    fn wait_for_ack(&self, expected: bool, timeout: Duration) -> Result<DaliInputMessage> {
        let deadline = Instant::now() + timeout;
        loop {
            let message = self.read()?;
            if message.transmit_ack == expected {
                return Ok(message);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    after: timeout,
                    waiting_for: "DALI transmit acknowledgement",
                });
            }
            thread::sleep(ACK_POLL_INTERVAL);
        }
    }

    /// Run one transmit cycle and return the input snapshot taken when the
    /// acknowledgement appeared.
    fn transmit(&self, message: &DaliOutputMessage, timeout: Duration) -> Result<DaliInputMessage> {
        debug!("DALI transmit: {:?}", message);
        {
            let mut state = self.state.lock().unwrap();
            state.write_registers(self.holding_base, &message.encode(true))?;
        }
        let response = self.wait_for_ack(true, timeout)?;

        // Handshake completion: release the request and wait for the mirror
        {
            let mut state = self.state.lock().unwrap();
            let words = message.encode(false);
            state.write_registers(self.holding_base, &words[..1])?;
        }
        self.wait_for_ack(false, timeout)?;
        Ok(response)
    }

    /// Send a message that expects no response.
    pub fn send(&self, message: &DaliOutputMessage, timeout: Duration) -> Result<()> {
        self.transmit(message, timeout)?;
        Ok(())
    }

    /// Send a message and return the gateway's response.
    pub fn request(
        &self,
        message: &DaliOutputMessage,
        timeout: Duration,
    ) -> Result<DaliInputMessage> {
        self.transmit(message, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_message_layout() {
        let words = DaliOutputMessage::command(0x12, 0x90).encode(true);
        // control byte: transmit_request + command class
        assert_eq!(words[0], 0x1203);
        assert_eq!(words[1], 0x0090);
        assert_eq!(words[2], 0x0000);
    }

    #[test]
    fn extension_selector_displaces_address() {
        let words = DaliOutputMessage::extension_with_parameters(0x10, Some(0x44), None)
            .encode(true);
        assert_eq!(words[0], 0x1005);
        assert_eq!(words[1], 0x0044);
    }

    #[test]
    fn brightness_message_layout() {
        let words = DaliOutputMessage::brightness(0x3F, 200).encode(true);
        assert_eq!(words[0], 0x3F01);
        assert_eq!(words[1], 0x0000);
        assert_eq!(words[2], 200);
    }

    #[test]
    fn clearing_request_keeps_fields() {
        let message = DaliOutputMessage::command(0x01, 0x05);
        let raised = message.encode(true);
        let cleared = message.encode(false);
        assert_eq!(raised[0] & 0x0001, 1);
        assert_eq!(cleared[0] & 0x0001, 0);
        assert_eq!(raised[0] & 0xFF00, cleared[0] & 0xFF00);
    }

    #[test]
    fn input_message_decode() {
        let message = DaliInputMessage::decode([0x8401, 0x2444, 0x0014]);
        assert!(message.transmit_ack);
        assert_eq!(message.dali_response, 0x84);
        assert_eq!(message.message_3, 0x44);
        assert_eq!(message.message_2, 0x24);
        assert_eq!(message.message_1, 0x14);
        assert_eq!(message.response_bytes(), [0x84, 0x44, 0x24, 0x14]);
    }
}
