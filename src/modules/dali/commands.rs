//! Gateway-wide macro commands driven by the command-extension byte.

use crate::error::Result;
use crate::modules::dali::communication::{
    DaliCommunicationRegister, DaliInputMessage, DaliOutputMessage, TRANSMIT_TIMEOUT,
};
use crate::util::{check_value_range, iterate_bits};

/// Commands addressing the gateway itself rather than a single ballast.
pub struct DaliCommands {
    register: DaliCommunicationRegister,
}

impl DaliCommands {
    pub fn new(register: DaliCommunicationRegister) -> Self {
        DaliCommands { register }
    }

    fn presence_half(&self, command_extension: u8, offset: u8) -> Result<Vec<u8>> {
        let response = self.register.request(
            &DaliOutputMessage::extension(command_extension),
            TRANSMIT_TIMEOUT,
        )?;
        Ok(response_to_channel_list(&response, offset))
    }

    // 6./7. Query short address present [0-31] / [32-63]
    pub fn query_short_address_present(&self) -> Result<Vec<u8>> {
        let mut channels = self.presence_half(0x06, 0)?;
        channels.extend(self.presence_half(0x07, 32)?);
        channels.sort_unstable();
        Ok(channels)
    }

    // 8./9. Query ballast status [0-31] / [32-63]
    pub fn query_status_psu(&self) -> Result<Vec<u8>> {
        let mut channels = self.presence_half(0x08, 0)?;
        channels.extend(self.presence_half(0x09, 32)?);
        channels.sort_unstable();
        Ok(channels)
    }

    // 10./11. Query lamp failure [0-31] / [32-63]
    pub fn query_lamp_failure(&self) -> Result<Vec<u8>> {
        let mut channels = self.presence_half(0x0A, 0)?;
        channels.extend(self.presence_half(0x0B, 32)?);
        channels.sort_unstable();
        Ok(channels)
    }

    // 12./13. Query lamp power on [0-31] / [32-63]
    pub fn query_lamp_power_on(&self) -> Result<Vec<u8>> {
        let mut channels = self.presence_half(0x0C, 0)?;
        channels.extend(self.presence_half(0x0D, 32)?);
        channels.sort_unstable();
        Ok(channels)
    }

    // 14. Set DALI/DSI mode and polling
    pub fn set_dali_dsi_mode(&self) -> Result<()> {
        self.register.send(
            &DaliOutputMessage::extension_with_parameters(0x0E, Some(0x01), None),
            TRANSMIT_TIMEOUT,
        )
    }

    // 15. Reset the gateway
    pub fn reset_gateway(&self) -> Result<()> {
        self.register
            .send(&DaliOutputMessage::extension(0x0F), TRANSMIT_TIMEOUT)
    }

    // 16. Save scene value
    pub fn save_scene_value(&self, scene_value: u8) -> Result<()> {
        check_value_range(scene_value as i64, 0, 0xBF, "scene value")?;
        self.register.send(
            &DaliOutputMessage::extension_with_parameters(0x10, Some(scene_value + 0x40), None),
            TRANSMIT_TIMEOUT,
        )
    }

    // 17. Disable automatic polling
    pub fn disable_auto_polling(&self) -> Result<()> {
        self.register.send(
            &DaliOutputMessage::extension_with_parameters(0x11, Some(0xFF), Some(0xFF)),
            TRANSMIT_TIMEOUT,
        )
    }

    // 17. Enable automatic polling
    pub fn enable_auto_polling(&self) -> Result<()> {
        self.register.send(
            &DaliOutputMessage::extension_with_parameters(0x11, Some(0xE8), Some(0x03)),
            TRANSMIT_TIMEOUT,
        )
    }

    // 23. Query hardware and software version
    pub fn query_hw_sw_version(&self) -> Result<DaliInputMessage> {
        self.register
            .request(&DaliOutputMessage::extension(0x17), TRANSMIT_TIMEOUT)
    }

    // 36. Query network status
    pub fn query_network_status(&self) -> Result<DaliInputMessage> {
        self.register
            .request(&DaliOutputMessage::extension(0x36), TRANSMIT_TIMEOUT)
    }
}

/// Expand the four response bytes of a multi-channel query into the list of
/// set positions. The response byte covers the lowest eight channels, the
/// data bytes the following three groups of eight.
pub(crate) fn response_to_channel_list(response: &DaliInputMessage, offset: u8) -> Vec<u8> {
    let mut channels = Vec::new();
    for (byte_index, &byte) in response.response_bytes().iter().enumerate() {
        for (set, bit) in iterate_bits(byte) {
            if set {
                channels.push(offset + byte_index as u8 * 8 + bit);
            }
        }
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(bytes: [u8; 4]) -> DaliInputMessage {
        DaliInputMessage {
            transmit_ack: true,
            dali_response: bytes[0],
            message_3: bytes[1],
            message_2: bytes[2],
            message_1: bytes[3],
        }
    }

    #[test]
    fn channel_list_from_response_bytes() {
        let channels = response_to_channel_list(&response([0x84, 0x44, 0x24, 0x14]), 0);
        assert_eq!(channels, vec![2, 7, 10, 14, 18, 21, 26, 28]);
    }

    #[test]
    fn channel_list_applies_offset() {
        let channels = response_to_channel_list(&response([0x11, 0x21, 0x41, 0x81]), 32);
        assert_eq!(channels, vec![32, 36, 40, 45, 48, 54, 56, 63]);
    }

    #[test]
    fn empty_response_yields_no_channels() {
        assert!(response_to_channel_list(&response([0, 0, 0, 0]), 0).is_empty());
    }
}
