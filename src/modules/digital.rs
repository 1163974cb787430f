//! Digital input and output channels.

use crate::error::Result;
use crate::modbus::channel::ModbusChannel;
use crate::modbus::connection::{ChannelRef, ChannelValue};

/// One discrete input bit.
pub struct DigitalIn {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl DigitalIn {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        DigitalIn {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<bool> {
        self.channel.read_bit()
    }

    pub fn address(&self) -> u16 {
        self.channel.address()
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
        self.channel.register_callback(Box::new(listener));
    }

    pub fn clear_on_change(&self) {
        self.channel.unregister_callback();
    }
}

/// One coil output bit.
pub struct DigitalOut {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl DigitalOut {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        DigitalOut {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<bool> {
        self.channel.read_bit()
    }

    pub fn write(&self, value: bool) -> Result<()> {
        self.channel.write_bit(value)
    }

    pub fn toggle(&self) -> Result<()> {
        let current = self.read()?;
        self.write(!current)
    }

    pub fn address(&self) -> u16 {
        self.channel.address()
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
        self.channel.register_callback(Box::new(listener));
    }

    pub fn clear_on_change(&self) {
        self.channel.unregister_callback();
    }
}
