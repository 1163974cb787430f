//! Per-ballast command set, DIN IEC 60929.
//!
//! A channel addresses one short address, one group (0x40..0x4F) or the whole
//! bus (0x3F). Config commands (codes 32..=127) are committed by the gateway
//! only when received twice back-to-back.

use std::time::Duration;

use crate::error::Result;
use crate::modbus::connection::{ChannelKind, ChannelRef, ChannelValue};
use crate::modules::dali::communication::{
    DaliCommunicationRegister, DaliOutputMessage, TRANSMIT_TIMEOUT,
};
use crate::util::{check_value_range, iterate_bits};

pub const BROADCAST_ADDRESS: u8 = 0x3F;
pub const GROUP_ADDRESS_BASE: u8 = 0x40;

/// One addressable light point (or group / broadcast) behind the gateway.
#[derive(Clone)]
pub struct DaliChannel {
    dali_address: u8,
    register: DaliCommunicationRegister,
    index: usize,
    name: Option<String>,
}

impl DaliChannel {
    pub(crate) fn new(dali_address: u8, register: DaliCommunicationRegister, index: usize) -> Self {
        DaliChannel {
            dali_address,
            register,
            index,
            name: None,
        }
    }

    pub fn dali_address(&self) -> u8 {
        self.dali_address
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn send_command(&self, command_code: u8) -> Result<()> {
        self.register.send(
            &DaliOutputMessage::command(self.dali_address, command_code),
            TRANSMIT_TIMEOUT,
        )
    }

    // The gateway requires the duplicate for commit
    fn send_config_command(&self, command_code: u8) -> Result<()> {
        self.send_command(command_code)?;
        self.send_command(command_code)
    }

    fn query(&self, command_code: u8) -> Result<u8> {
        let response = self.register.request(
            &DaliOutputMessage::command(self.dali_address, command_code),
            TRANSMIT_TIMEOUT,
        )?;
        Ok(response.dali_response)
    }

    fn send_extended_command(
        &self,
        command_extension: u8,
        parameter_1: Option<u8>,
        timeout: Duration,
    ) -> Result<()> {
        let message = DaliOutputMessage {
            dali_address: Some(self.dali_address),
            command_extension: Some(command_extension),
            parameter_1,
            ..Default::default()
        };
        self.register.send(&message, timeout)
    }

    // Direct arc power control

    pub fn set_brightness(&self, brightness: u8) -> Result<()> {
        check_value_range(brightness as i64, 0, 254, "brightness")?;
        self.register.send(
            &DaliOutputMessage::brightness(self.dali_address, brightness),
            TRANSMIT_TIMEOUT,
        )
    }

    pub fn brightness(&self) -> Result<u8> {
        self.query_current_value()
    }

    // 0. Power off
    pub fn power_off(&self) -> Result<()> {
        self.send_command(0b0000_0000)
    }

    // 1. Increase brightness
    pub fn increase_brightness(&self) -> Result<()> {
        self.send_command(0b0000_0001)
    }

    // 2. Decrease brightness
    pub fn decrease_brightness(&self) -> Result<()> {
        self.send_command(0b0000_0010)
    }

    // 3. Increase brightness one step
    pub fn increase_brightness_step(&self) -> Result<()> {
        self.send_command(0b0000_0011)
    }

    // 4. Decrease brightness one step
    pub fn decrease_brightness_step(&self) -> Result<()> {
        self.send_command(0b0000_0100)
    }

    // 7. Decrease brightness and power off
    pub fn decrease_brightness_and_power_off(&self) -> Result<()> {
        self.send_command(0b0000_0111)
    }

    // 8. Power on and increase brightness
    pub fn power_on_and_increase_brightness(&self) -> Result<()> {
        self.send_command(0b0000_1000)
    }

    // 16-31. Go to scene
    pub fn go_to_scene(&self, scene: u8) -> Result<()> {
        check_value_range(scene as i64, 1, 16, "scene")?;
        self.send_command(0b0001_0000 + scene)
    }

    // 32. Reset
    pub fn reset(&self) -> Result<()> {
        self.send_config_command(0b0010_0000)
    }

    // 33. Save current value to DTR
    pub fn save_current_value_to_dtr(&self) -> Result<()> {
        self.send_config_command(0b0010_0001)
    }

    // 42. Save DTR to max value
    pub fn save_dtr_to_max_value(&self) -> Result<()> {
        self.send_config_command(0b0010_1010)
    }

    // 43. Save DTR to min value
    pub fn save_dtr_to_min_value(&self) -> Result<()> {
        self.send_config_command(0b0010_1011)
    }

    // 44. Save DTR to system error value
    pub fn save_dtr_to_system_error_value(&self) -> Result<()> {
        self.send_config_command(0b0010_1100)
    }

    // 45. Save DTR to power on value
    pub fn save_dtr_to_power_on_value(&self) -> Result<()> {
        self.send_config_command(0b0010_1101)
    }

    // 46. Save DTR to step time
    pub fn save_dtr_to_step_time(&self) -> Result<()> {
        self.send_config_command(0b0010_1110)
    }

    // 47. Save DTR to step speed
    pub fn save_dtr_to_step_speed(&self) -> Result<()> {
        self.send_config_command(0b0010_1111)
    }

    // 64-79. Save DTR to scene
    pub fn save_dtr_to_scene(&self, scene: u8) -> Result<()> {
        check_value_range(scene as i64, 1, 16, "scene")?;
        self.send_config_command(0b0100_0000 + scene)
    }

    // 80-95. Remove from scene
    pub fn remove_from_scene(&self, scene: u8) -> Result<()> {
        check_value_range(scene as i64, 1, 16, "scene")?;
        self.send_config_command(0b0101_0000 + scene)
    }

    // 96-111. Add to group
    pub fn add_to_group(&self, group: u8) -> Result<()> {
        check_value_range(group as i64, 1, 16, "group")?;
        self.send_config_command(0b0110_0000 + group)
    }

    // 112-127. Remove from group
    pub fn remove_from_group(&self, group: u8) -> Result<()> {
        check_value_range(group as i64, 1, 16, "group")?;
        self.send_config_command(0b0111_0000 + group)
    }

    // 128. Save DTR as short address
    pub fn save_dtr_as_short_address(&self) -> Result<()> {
        self.send_config_command(0b1000_0000)
    }

    // 144. Query status
    pub fn query_status(&self) -> Result<u8> {
        self.query(0b1001_0000)
    }

    // 145. Query power supply
    pub fn query_power_supply(&self) -> Result<u8> {
        self.query(0b1001_0001)
    }

    // 146. Query lamp failure
    pub fn query_lamp_failure(&self) -> Result<u8> {
        self.query(0b1001_0010)
    }

    // 147. Query power supply lamp on
    pub fn query_power_supply_lamp_on(&self) -> Result<u8> {
        self.query(0b1001_0011)
    }

    // 148. Query limit error
    pub fn query_limit_error(&self) -> Result<u8> {
        self.query(0b1001_0100)
    }

    // 149. Query reset status
    pub fn query_reset_status(&self) -> Result<u8> {
        self.query(0b1001_0101)
    }

    // 150. Query short address missing
    pub fn query_short_address_missing(&self) -> Result<u8> {
        self.query(0b1001_0110)
    }

    // 151. Query version number
    pub fn query_version(&self) -> Result<u8> {
        self.query(0b1001_0111)
    }

    // 152. Query DTR content
    pub fn query_dtr_content(&self) -> Result<u8> {
        self.query(0b1001_1000)
    }

    // 153. Query device type
    pub fn query_device_type(&self) -> Result<u8> {
        self.query(0b1001_1001)
    }

    // 154. Query physical min value
    pub fn query_physical_min_value(&self) -> Result<u8> {
        self.query(0b1001_1010)
    }

    // 155. Query power supply error
    pub fn query_power_supply_error(&self) -> Result<u8> {
        self.query(0b1001_1011)
    }

    // 160. Query current value
    pub fn query_current_value(&self) -> Result<u8> {
        self.query(0b1010_0000)
    }

    // 161. Query max value
    pub fn query_max_value(&self) -> Result<u8> {
        self.query(0b1010_0001)
    }

    // 162. Query min value
    pub fn query_min_value(&self) -> Result<u8> {
        self.query(0b1010_0010)
    }

    // 163. Query power on value
    pub fn query_power_on_value(&self) -> Result<u8> {
        self.query(0b1010_0011)
    }

    // 164. Query system error value
    pub fn query_system_error_value(&self) -> Result<u8> {
        self.query(0b1010_0100)
    }

    // 165. Query step time and speed
    pub fn query_step_time_and_speed(&self) -> Result<u8> {
        self.query(0b1010_0101)
    }

    // 176-191. Query scene value
    pub fn query_scene_value(&self, scene: u8) -> Result<u8> {
        check_value_range(scene as i64, 0, 15, "scene")?;
        self.query(0b1011_0000 + scene)
    }

    // 192-193. Query group membership, merged into group numbers 1..=16
    pub fn query_groups(&self) -> Result<Vec<u8>> {
        let mut groups: Vec<u8> = iterate_bits(self.query(0b1100_0000)?)
            .filter(|(bit, _)| *bit)
            .map(|(_, i)| i + 1)
            .collect();
        groups.extend(
            iterate_bits(self.query(0b1100_0001)?)
                .filter(|(bit, _)| *bit)
                .map(|(_, i)| i + 9),
        );
        Ok(groups)
    }

    // 194-196. Query direct address, three bytes merged high to low
    pub fn query_direct_address(&self) -> Result<u32> {
        let high = self.query(0b1100_0010)? as u32;
        let middle = self.query(0b1100_0011)? as u32;
        let low = self.query(0b1100_0100)? as u32;
        Ok(high << 16 | middle << 8 | low)
    }

    // Channel-scoped gateway macros

    // 1. Save scene/parameter
    pub fn save_scene_parameter(&self) -> Result<()> {
        self.send_extended_command(0x01, None, TRANSMIT_TIMEOUT)
    }

    // 2. Reassign short address
    pub fn reassign_short_address(&self) -> Result<()> {
        self.send_extended_command(0x02, None, TRANSMIT_TIMEOUT)
    }

    // 3. Delete short address
    pub fn delete_short_address(&self) -> Result<()> {
        self.send_extended_command(0x03, None, TRANSMIT_TIMEOUT)
    }

    // 4. Replace short address
    pub fn replace_short_address(&self) -> Result<()> {
        self.send_extended_command(0x04, None, TRANSMIT_TIMEOUT)
    }

    // 5. Blink to show the address for the given number of seconds
    pub fn blink_show_address(&self, seconds: u8) -> Result<()> {
        let timeout = Duration::from_secs(seconds as u64 + 1);
        self.send_extended_command(0x05, Some(seconds), timeout)
    }

    /// Register a change listener on the gateway's response word.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(ChannelValue, ChannelRef) + Send + 'static,
    {
        let channel = ChannelRef {
            kind: ChannelKind::Input,
            address: self.register.input_base(),
        };
        self.register
            .state()
            .lock()
            .unwrap()
            .register_listener(channel, Box::new(listener));
    }

    pub fn clear_on_change(&self) {
        let channel = ChannelRef {
            kind: ChannelKind::Input,
            address: self.register.input_base(),
        };
        self.register
            .state()
            .lock()
            .unwrap()
            .unregister_listener(&channel);
    }
}
