//! Counter module sub-protocol: control/status byte plus value cells.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use packed_struct::derive::PackedStruct;
use packed_struct::PackedStruct;

use crate::error::{Error, Result};
use crate::modbus::connection::{ChannelKind, ChannelRef, ChannelValue, SharedState};

pub const SET_ACK_TIMEOUT: Duration = Duration::from_secs(5);
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Low byte of the first holding word.
#[derive(PackedStruct, Clone, Copy, Default, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct CounterControl {
    #[packed_field(bits = "2")]
    pub set_do1: bool,

    #[packed_field(bits = "3")]
    pub set_do2: bool,

    #[packed_field(bits = "4")]
    pub lock: bool,

    #[packed_field(bits = "5")]
    pub set_counter: bool,
}

/// Low byte of the first input word.
#[derive(PackedStruct, Clone, Copy, Default, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "1")]
pub struct CounterStatus {
    #[packed_field(bits = "0")]
    pub clock_level: bool,

    #[packed_field(bits = "1")]
    pub ud_level: bool,

    #[packed_field(bits = "2")]
    pub do1_level: bool,

    #[packed_field(bits = "3")]
    pub do2_level: bool,

    #[packed_field(bits = "4")]
    pub locked: bool,

    #[packed_field(bits = "5")]
    pub ack_set_counter: bool,
}

/// Communication cells of one counter: word 0 carries the control/status
/// byte, the following `value_words` cells the value in little-word order.
#[derive(Clone)]
pub struct CounterCommunicationRegister {
    state: SharedState,
    input_base: u16,
    holding_base: u16,
    value_words: u16,
}

impl CounterCommunicationRegister {
    pub(crate) fn new(
        state: SharedState,
        input_base: u16,
        holding_base: u16,
        value_words: u16,
    ) -> Self {
        CounterCommunicationRegister {
            state,
            input_base,
            holding_base,
            value_words,
        }
    }

    pub fn status(&self, update: bool) -> Result<CounterStatus> {
        let mut state = self.state.lock().unwrap();
        if update {
            state.update_input_state(Some(self.input_base), Some(1 + self.value_words))?;
        }
        let word = state.read_input_register(self.input_base, false)?;
        Ok(CounterStatus::unpack(&[(word & 0x00FF) as u8]).unwrap())
    }

    fn control(&self) -> Result<CounterControl> {
        let mut state = self.state.lock().unwrap();
        let word = state.read_holding_register(self.holding_base, false)?;
        Ok(CounterControl::unpack(&[(word & 0x00FF) as u8]).unwrap())
    }

    fn write_control(&self, control: CounterControl) -> Result<()> {
        let byte = control.pack().unwrap()[0];
        let mut state = self.state.lock().unwrap();
        let current = state.read_holding_register(self.holding_base, true)?;
        state.write_register(self.holding_base, (current & 0xFF00) | byte as u16)
    }

    /// Current counter value from the cached input cells.
    pub fn value(&self) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        let words = state.read_input_registers(self.input_base + 1, self.value_words, false)?;
        Ok(words.to_int() as u32)
    }

    /// Load a value: write the value cells, raise set_counter and hold it
    /// until the module acknowledges, then release it.
    pub fn set_value(&self, value: u32, timeout: Duration) -> Result<()> {
        debug!(
            "Setting counter at input {:#06x} to {:#010x}",
            self.input_base, value
        );
        let words: Vec<u16> = (0..self.value_words)
            .map(|i| (value >> (16 * i)) as u16)
            .collect();
        {
            let mut state = self.state.lock().unwrap();
            state.write_registers(self.holding_base + 1, &words)?;
        }
        let mut control = self.control()?;
        control.set_counter = true;
        self.write_control(control)?;

        let deadline = Instant::now() + timeout;
        while !self.status(true)?.ack_set_counter {
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    after: timeout,
                    waiting_for: "counter set acknowledgement",
                });
            }
            thread::sleep(ACK_POLL_INTERVAL);
        }
        self.clear()
    }

    pub fn reset(&self, timeout: Duration) -> Result<()> {
        self.set_value(0, timeout)
    }

    pub fn lock(&self) -> Result<()> {
        let mut control = self.control()?;
        control.lock = true;
        self.write_control(control)
    }

    pub fn unlock(&self) -> Result<()> {
        let mut control = self.control()?;
        control.lock = false;
        self.write_control(control)
    }

    /// Release set_counter without waiting for an acknowledgement.
    pub fn clear(&self) -> Result<()> {
        let mut control = self.control()?;
        control.set_counter = false;
        self.write_control(control)
    }

    fn value_ref(&self) -> ChannelRef {
        ChannelRef {
            kind: ChannelKind::Input,
            address: self.input_base + 1,
        }
    }
}

/// 32-bit up/down counter (two value words).
pub struct Counter32 {
    register: CounterCommunicationRegister,
    index: usize,
    name: Option<String>,
}

impl Counter32 {
    pub(crate) fn new(register: CounterCommunicationRegister, index: usize) -> Self {
        Counter32 {
            register,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<u32> {
        self.register.value()
    }

    pub fn set(&self, value: u32) -> Result<()> {
        self.register.set_value(value, SET_ACK_TIMEOUT)
    }

    pub fn reset(&self) -> Result<()> {
        self.set(0)
    }

    pub fn lock(&self) -> Result<()> {
        self.register.lock()
    }

    pub fn unlock(&self) -> Result<()> {
        self.register.unlock()
    }

    pub fn clear(&self) -> Result<()> {
        self.register.clear()
    }

    pub fn status(&self) -> Result<CounterStatus> {
        self.register.status(true)
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

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(ChannelValue, ChannelRef) + Send + 'static,
    {
        let register = &self.register;
        register
            .state
            .lock()
            .unwrap()
            .register_listener(register.value_ref(), Box::new(listener));
    }

    pub fn clear_on_change(&self) {
        let register = &self.register;
        register
            .state
            .lock()
            .unwrap()
            .unregister_listener(&register.value_ref());
    }
}

/// 16-bit counter (one value word).
pub struct Counter16 {
    register: CounterCommunicationRegister,
    index: usize,
    name: Option<String>,
}

impl Counter16 {
    pub(crate) fn new(register: CounterCommunicationRegister, index: usize) -> Self {
        Counter16 {
            register,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<u16> {
        Ok(self.register.value()? as u16)
    }

    pub fn set(&self, value: u16) -> Result<()> {
        self.register.set_value(value as u32, SET_ACK_TIMEOUT)
    }

    pub fn reset(&self) -> Result<()> {
        self.set(0)
    }

    pub fn lock(&self) -> Result<()> {
        self.register.lock()
    }

    pub fn unlock(&self) -> Result<()> {
        self.register.unlock()
    }

    pub fn clear(&self) -> Result<()> {
        self.register.clear()
    }

    pub fn status(&self) -> Result<CounterStatus> {
        self.register.status(true)
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

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(ChannelValue, ChannelRef) + Send + 'static,
    {
        let register = &self.register;
        register
            .state
            .lock()
            .unwrap()
            .register_listener(register.value_ref(), Box::new(listener));
    }

    pub fn clear_on_change(&self) {
        let register = &self.register;
        register
            .state
            .lock()
            .unwrap()
            .unregister_listener(&register.value_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_byte_bit_layout() {
        let control = CounterControl {
            set_do1: true,
            set_do2: false,
            lock: true,
            set_counter: true,
        };
        assert_eq!(control.pack().unwrap(), [0b0011_0100]);
    }

    #[test]
    fn status_byte_bit_layout() {
        let status = CounterStatus::unpack(&[0b0010_0101]).unwrap();
        assert!(status.clock_level);
        assert!(!status.ud_level);
        assert!(status.do1_level);
        assert!(!status.do2_level);
        assert!(!status.locked);
        assert!(status.ack_set_counter);
    }
}
