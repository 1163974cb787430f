//! High-level channels built on top of the typed process-image cells.

use std::fmt;

use crate::error::{Error, Result};
use crate::modbus::connection::{ChannelRef, ChannelValue};
use crate::modules::analog::{Float16In, Float16Out, Int16In, Int16Out, Int8In, Int8Out};
use crate::modules::counter::{Counter16, Counter32};
use crate::modules::dali::channel::DaliChannel;
use crate::modules::digital::{DigitalIn, DigitalOut};

/// Semantic channel types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WagoChannelType {
    DigitalIn,
    DigitalOut,
    Counter16,
    Counter32,
    Int8In,
    Int8Out,
    Int16In,
    Int16Out,
    Float16In,
    Float16Out,
    Dali,
}

impl WagoChannelType {
    pub fn as_str(self) -> &'static str {
        match self {
            WagoChannelType::DigitalIn => "Digital In",
            WagoChannelType::DigitalOut => "Digital Out",
            WagoChannelType::Counter16 => "Counter 16Bit",
            WagoChannelType::Counter32 => "Counter 32Bit",
            WagoChannelType::Int8In => "Int8 In",
            WagoChannelType::Int8Out => "Int8 Out",
            WagoChannelType::Int16In => "Int16 In",
            WagoChannelType::Int16Out => "Int16 Out",
            WagoChannelType::Float16In => "Float16 In",
            WagoChannelType::Float16Out => "Float16 Out",
            WagoChannelType::Dali => "Dali",
        }
    }
}

impl fmt::Display for WagoChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value read from or written to a high-level channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IoValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    I16(i16),
    U32(u32),
    F32(f32),
}

impl fmt::Display for IoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoValue::Bool(v) => write!(f, "{}", v),
            IoValue::U8(v) => write!(f, "{}", v),
            IoValue::I8(v) => write!(f, "{}", v),
            IoValue::I16(v) => write!(f, "{}", v),
            IoValue::U32(v) => write!(f, "{}", v),
            IoValue::F32(v) => write!(f, "{}", v),
        }
    }
}

/// Tagged variant over every high-level channel a module can expose.
pub enum IoChannel {
    DigitalIn(DigitalIn),
    DigitalOut(DigitalOut),
    Counter16(Counter16),
    Counter32(Counter32),
    Int8In(Int8In),
    Int8Out(Int8Out),
    Int16In(Int16In),
    Int16Out(Int16Out),
    Float16In(Float16In),
    Float16Out(Float16Out),
    Dali(DaliChannel),
}

impl IoChannel {
    pub fn channel_type(&self) -> WagoChannelType {
        match self {
            IoChannel::DigitalIn(_) => WagoChannelType::DigitalIn,
            IoChannel::DigitalOut(_) => WagoChannelType::DigitalOut,
            IoChannel::Counter16(_) => WagoChannelType::Counter16,
            IoChannel::Counter32(_) => WagoChannelType::Counter32,
            IoChannel::Int8In(_) => WagoChannelType::Int8In,
            IoChannel::Int8Out(_) => WagoChannelType::Int8Out,
            IoChannel::Int16In(_) => WagoChannelType::Int16In,
            IoChannel::Int16Out(_) => WagoChannelType::Int16Out,
            IoChannel::Float16In(_) => WagoChannelType::Float16In,
            IoChannel::Float16Out(_) => WagoChannelType::Float16Out,
            IoChannel::Dali(_) => WagoChannelType::Dali,
        }
    }

    /// Position of the channel within its module.
    pub fn index(&self) -> usize {
        match self {
            IoChannel::DigitalIn(c) => c.index(),
            IoChannel::DigitalOut(c) => c.index(),
            IoChannel::Counter16(c) => c.index(),
            IoChannel::Counter32(c) => c.index(),
            IoChannel::Int8In(c) => c.index(),
            IoChannel::Int8Out(c) => c.index(),
            IoChannel::Int16In(c) => c.index(),
            IoChannel::Int16Out(c) => c.index(),
            IoChannel::Float16In(c) => c.index(),
            IoChannel::Float16Out(c) => c.index(),
            IoChannel::Dali(c) => c.index(),
        }
    }

    pub fn name(&self) -> String {
        let configured = match self {
            IoChannel::DigitalIn(c) => c.name(),
            IoChannel::DigitalOut(c) => c.name(),
            IoChannel::Counter16(c) => c.name(),
            IoChannel::Counter32(c) => c.name(),
            IoChannel::Int8In(c) => c.name(),
            IoChannel::Int8Out(c) => c.name(),
            IoChannel::Int16In(c) => c.name(),
            IoChannel::Int16Out(c) => c.name(),
            IoChannel::Float16In(c) => c.name(),
            IoChannel::Float16Out(c) => c.name(),
            IoChannel::Dali(c) => c.name(),
        };
        match configured {
            Some(name) => name.to_string(),
            None => format!("{} {}", self.channel_type(), self.index()),
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            IoChannel::DigitalIn(c) => c.set_name(name),
            IoChannel::DigitalOut(c) => c.set_name(name),
            IoChannel::Counter16(c) => c.set_name(name),
            IoChannel::Counter32(c) => c.set_name(name),
            IoChannel::Int8In(c) => c.set_name(name),
            IoChannel::Int8Out(c) => c.set_name(name),
            IoChannel::Int16In(c) => c.set_name(name),
            IoChannel::Int16Out(c) => c.set_name(name),
            IoChannel::Float16In(c) => c.set_name(name),
            IoChannel::Float16Out(c) => c.set_name(name),
            IoChannel::Dali(c) => c.set_name(name),
        }
    }

    /// Read the current value through the cache.
    pub fn read(&self) -> Result<IoValue> {
        match self {
            IoChannel::DigitalIn(c) => Ok(IoValue::Bool(c.read()?)),
            IoChannel::DigitalOut(c) => Ok(IoValue::Bool(c.read()?)),
            IoChannel::Counter16(c) => Ok(IoValue::U32(c.read()? as u32)),
            IoChannel::Counter32(c) => Ok(IoValue::U32(c.read()?)),
            IoChannel::Int8In(c) => Ok(IoValue::I8(c.read()?)),
            IoChannel::Int8Out(c) => Ok(IoValue::I8(c.read()?)),
            IoChannel::Int16In(c) => Ok(IoValue::I16(c.read()?)),
            IoChannel::Int16Out(c) => Ok(IoValue::I16(c.read()?)),
            IoChannel::Float16In(c) => Ok(IoValue::F32(c.read()?)),
            IoChannel::Float16Out(c) => Ok(IoValue::F32(c.read()?)),
            IoChannel::Dali(c) => Ok(IoValue::U8(c.brightness()?)),
        }
    }

    /// Write a value; the variant must match the channel type.
    pub fn write(&self, value: IoValue) -> Result<()> {
        match (self, value) {
            (IoChannel::DigitalOut(c), IoValue::Bool(v)) => c.write(v),
            (IoChannel::Counter16(c), IoValue::U32(v)) => c.set(v as u16),
            (IoChannel::Counter32(c), IoValue::U32(v)) => c.set(v),
            (IoChannel::Int8Out(c), IoValue::I8(v)) => c.write(v),
            (IoChannel::Int16Out(c), IoValue::I16(v)) => c.write(v),
            (IoChannel::Float16Out(c), IoValue::F32(v)) => c.write(v),
            (IoChannel::Dali(c), IoValue::U8(v)) => c.set_brightness(v),
            (IoChannel::DigitalIn(c), _) => Err(Error::WriteToReadOnly {
                kind: "discrete",
                address: c.address(),
            }),
            (IoChannel::Int8In(c), _) => Err(Error::WriteToReadOnly {
                kind: "input",
                address: c.address(),
            }),
            (IoChannel::Int16In(c), _) => Err(Error::WriteToReadOnly {
                kind: "input",
                address: c.address(),
            }),
            (IoChannel::Float16In(c), _) => Err(Error::WriteToReadOnly {
                kind: "input",
                address: c.address(),
            }),
            _ => Err(Error::InvalidArgument(format!(
                "value {:?} does not match channel type {}",
                value,
                self.channel_type()
            ))),
        }
    }

    /// Register a change listener on the channel's primary cell. The listener
    /// runs on the poller context and must not block.
    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(ChannelValue, ChannelRef) + Send + 'static,
    {
        match self {
            IoChannel::DigitalIn(c) => c.on_change(listener),
            IoChannel::DigitalOut(c) => c.on_change(listener),
            IoChannel::Counter16(c) => c.on_change(listener),
            IoChannel::Counter32(c) => c.on_change(listener),
            IoChannel::Int8In(c) => c.on_change(listener),
            IoChannel::Int8Out(c) => c.on_change(listener),
            IoChannel::Int16In(c) => c.on_change(listener),
            IoChannel::Int16Out(c) => c.on_change(listener),
            IoChannel::Float16In(c) => c.on_change(listener),
            IoChannel::Float16Out(c) => c.on_change(listener),
            IoChannel::Dali(c) => c.on_change(listener),
        }
    }

    pub fn clear_on_change(&self) {
        match self {
            IoChannel::DigitalIn(c) => c.clear_on_change(),
            IoChannel::DigitalOut(c) => c.clear_on_change(),
            IoChannel::Counter16(c) => c.clear_on_change(),
            IoChannel::Counter32(c) => c.clear_on_change(),
            IoChannel::Int8In(c) => c.clear_on_change(),
            IoChannel::Int8Out(c) => c.clear_on_change(),
            IoChannel::Int16In(c) => c.clear_on_change(),
            IoChannel::Int16Out(c) => c.clear_on_change(),
            IoChannel::Float16In(c) => c.clear_on_change(),
            IoChannel::Float16Out(c) => c.clear_on_change(),
            IoChannel::Dali(c) => c.clear_on_change(),
        }
    }
}

impl fmt::Debug for IoChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
