//! Typed view onto a single cell of the process image.

use std::fmt;

use crate::error::{Error, Result};
use crate::modbus::connection::{
    ChangeListener, ChannelKind, ChannelRef, ChannelValue, SharedState,
};

/// One cell in one of the four address spaces, bound to the shared cache.
/// Reads come from the cache; writes go through to the wire and refresh the
/// affected region.
#[derive(Clone)]
pub struct ModbusChannel {
    kind: ChannelKind,
    address: u16,
    state: SharedState,
}

impl ModbusChannel {
    pub(crate) fn new(kind: ChannelKind, address: u16, state: SharedState) -> Self {
        ModbusChannel {
            kind,
            address,
            state,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn channel_ref(&self) -> ChannelRef {
        ChannelRef {
            kind: self.kind,
            address: self.address,
        }
    }

    fn wrong_kind(&self, wanted: &str) -> Error {
        Error::InvalidArgument(format!(
            "{} channel at {:#06x} does not support {}",
            self.kind, self.address, wanted
        ))
    }

    pub fn read_bit(&self) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        match self.kind {
            ChannelKind::Coil => state.read_coil(self.address, false),
            ChannelKind::Discrete => state.read_discrete_input(self.address, false),
            _ => Err(self.wrong_kind("bit reads")),
        }
    }

    pub fn read_word(&self) -> Result<u16> {
        let mut state = self.state.lock().unwrap();
        match self.kind {
            ChannelKind::Holding => state.read_holding_register(self.address, false),
            ChannelKind::Input => state.read_input_register(self.address, false),
            _ => Err(self.wrong_kind("word reads")),
        }
    }

    pub fn read_lsb(&self) -> Result<u8> {
        Ok((self.read_word()? & 0x00FF) as u8)
    }

    pub fn read_msb(&self) -> Result<u8> {
        Ok((self.read_word()? >> 8) as u8)
    }

    /// Current cell value as a tagged variant.
    pub fn read_value(&self) -> Result<ChannelValue> {
        match self.kind {
            ChannelKind::Coil | ChannelKind::Discrete => Ok(ChannelValue::Bit(self.read_bit()?)),
            ChannelKind::Holding | ChannelKind::Input => Ok(ChannelValue::Word(self.read_word()?)),
        }
    }

    pub fn write_bit(&self, value: bool) -> Result<()> {
        match self.kind {
            ChannelKind::Coil => self.state.lock().unwrap().write_coil(self.address, value),
            ChannelKind::Discrete => Err(Error::WriteToReadOnly {
                kind: self.kind.name(),
                address: self.address,
            }),
            _ => Err(self.wrong_kind("bit writes")),
        }
    }

    pub fn write_word(&self, value: u16) -> Result<()> {
        match self.kind {
            ChannelKind::Holding => self
                .state
                .lock()
                .unwrap()
                .write_register(self.address, value),
            ChannelKind::Input => Err(Error::WriteToReadOnly {
                kind: self.kind.name(),
                address: self.address,
            }),
            _ => Err(self.wrong_kind("word writes")),
        }
    }

    /// Replace the low byte. The current word is fetched fresh from the wire
    /// before the combined value is written back.
    pub fn write_lsb(&self, value: u8) -> Result<()> {
        self.check_word_writable()?;
        let mut state = self.state.lock().unwrap();
        let current = state.read_holding_register(self.address, true)?;
        state.write_register(self.address, (current & 0xFF00) | value as u16)
    }

    /// Replace the high byte, read-modify-write like [`write_lsb`].
    ///
    /// [`write_lsb`]: ModbusChannel::write_lsb
    pub fn write_msb(&self, value: u8) -> Result<()> {
        self.check_word_writable()?;
        let mut state = self.state.lock().unwrap();
        let current = state.read_holding_register(self.address, true)?;
        state.write_register(self.address, (current & 0x00FF) | (value as u16) << 8)
    }

    fn check_word_writable(&self) -> Result<()> {
        match self.kind {
            ChannelKind::Holding => Ok(()),
            ChannelKind::Input => Err(Error::WriteToReadOnly {
                kind: self.kind.name(),
                address: self.address,
            }),
            _ => Err(self.wrong_kind("byte writes")),
        }
    }

    /// Replace the change listener for this cell.
    pub fn register_callback(&self, listener: ChangeListener) {
        self.state
            .lock()
            .unwrap()
            .register_listener(self.channel_ref(), listener);
    }

    pub fn unregister_callback(&self) {
        self.state
            .lock()
            .unwrap()
            .unregister_listener(&self.channel_ref());
    }
}

impl fmt::Debug for ModbusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusChannel")
            .field("kind", &self.kind)
            .field("address", &self.address)
            .finish()
    }
}
