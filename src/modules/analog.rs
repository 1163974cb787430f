//! Analog channels: 16-bit words, byte-half pairs and half-precision floats.

use crate::error::Result;
use crate::modbus::channel::ModbusChannel;
use crate::modbus::connection::{ChannelRef, ChannelValue};

/// Which half of the backing word an 8-bit channel occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteHalf {
    Low,
    High,
}

macro_rules! channel_common {
    () => {
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
    };
}

/// 16-bit analog input word.
pub struct Int16In {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl Int16In {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        Int16In {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<i16> {
        Ok(self.channel.read_word()? as i16)
    }

    pub fn read_raw(&self) -> Result<u16> {
        self.channel.read_word()
    }

    channel_common!();
}

/// 16-bit analog output word.
pub struct Int16Out {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl Int16Out {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        Int16Out {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<i16> {
        Ok(self.channel.read_word()? as i16)
    }

    pub fn write(&self, value: i16) -> Result<()> {
        self.channel.write_word(value as u16)
    }

    channel_common!();
}

/// 8-bit analog input occupying one byte half of a word.
pub struct Int8In {
    channel: ModbusChannel,
    half: ByteHalf,
    index: usize,
    name: Option<String>,
}

impl Int8In {
    pub(crate) fn new(channel: ModbusChannel, half: ByteHalf, index: usize) -> Self {
        Int8In {
            channel,
            half,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<i8> {
        let byte = match self.half {
            ByteHalf::Low => self.channel.read_lsb()?,
            ByteHalf::High => self.channel.read_msb()?,
        };
        Ok(byte as i8)
    }

    pub fn half(&self) -> ByteHalf {
        self.half
    }

    channel_common!();
}

/// 8-bit analog output occupying one byte half of a word.
pub struct Int8Out {
    channel: ModbusChannel,
    half: ByteHalf,
    index: usize,
    name: Option<String>,
}

impl Int8Out {
    pub(crate) fn new(channel: ModbusChannel, half: ByteHalf, index: usize) -> Self {
        Int8Out {
            channel,
            half,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<i8> {
        let byte = match self.half {
            ByteHalf::Low => self.channel.read_lsb()?,
            ByteHalf::High => self.channel.read_msb()?,
        };
        Ok(byte as i8)
    }

    pub fn write(&self, value: i8) -> Result<()> {
        match self.half {
            ByteHalf::Low => self.channel.write_lsb(value as u8),
            ByteHalf::High => self.channel.write_msb(value as u8),
        }
    }

    pub fn half(&self) -> ByteHalf {
        self.half
    }

    channel_common!();
}

/// Half-precision float input word.
pub struct Float16In {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl Float16In {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        Float16In {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<f32> {
        Ok(f16_to_f32(self.channel.read_word()?))
    }

    channel_common!();
}

/// Half-precision float output word.
pub struct Float16Out {
    channel: ModbusChannel,
    index: usize,
    name: Option<String>,
}

impl Float16Out {
    pub(crate) fn new(channel: ModbusChannel, index: usize) -> Self {
        Float16Out {
            channel,
            index,
            name: None,
        }
    }

    pub fn read(&self) -> Result<f32> {
        Ok(f16_to_f32(self.channel.read_word()?))
    }

    pub fn write(&self, value: f32) -> Result<()> {
        self.channel.write_word(f32_to_f16(value))
    }

    channel_common!();
}

pub(crate) fn f16_to_f32(bits: u16) -> f32 {
    let sign = if bits & 0x8000 != 0 { -1.0f32 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1F) as i32;
    let mantissa = (bits & 0x03FF) as f32;
    match exponent {
        0 => sign * mantissa * 2f32.powi(-24),
        0x1F => {
            if mantissa == 0.0 {
                sign * f32::INFINITY
            } else {
                f32::NAN
            }
        }
        _ => sign * (1.0 + mantissa / 1024.0) * 2f32.powi(exponent - 15),
    }
}

pub(crate) fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    if value.is_nan() {
        return sign | 0x7E00;
    }
    let exponent = ((bits >> 23) & 0xFF) as i32 - 127 + 15;
    let mantissa = bits & 0x007F_FFFF;
    if value.is_infinite() || exponent >= 0x1F {
        return sign | 0x7C00;
    }
    if exponent <= 0 {
        if exponent < -10 {
            return sign;
        }
        // Subnormal: shift in the implicit leading one
        let mantissa = (mantissa | 0x0080_0000) >> (1 - exponent);
        return sign | ((mantissa + 0x1000) >> 13) as u16;
    }
    let half = sign | ((exponent as u16) << 10) | (mantissa >> 13) as u16;
    // Round to nearest; a mantissa carry correctly bumps the exponent
    if mantissa & 0x1000 != 0 {
        half + 1
    } else {
        half
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_decode_basics() {
        assert_eq!(f16_to_f32(0x3C00), 1.0);
        assert_eq!(f16_to_f32(0x3800), 0.5);
        assert_eq!(f16_to_f32(0xC000), -2.0);
        assert_eq!(f16_to_f32(0x0000), 0.0);
        assert_eq!(f16_to_f32(0x7C00), f32::INFINITY);
        assert!(f16_to_f32(0x7E00).is_nan());
    }

    #[test]
    fn f16_encode_basics() {
        assert_eq!(f32_to_f16(1.0), 0x3C00);
        assert_eq!(f32_to_f16(0.5), 0x3800);
        assert_eq!(f32_to_f16(-2.0), 0xC000);
        assert_eq!(f32_to_f16(0.0), 0x0000);
        assert_eq!(f32_to_f16(f32::INFINITY), 0x7C00);
        assert_eq!(f32_to_f16(65536.0), 0x7C00);
    }

    #[test]
    fn f16_round_trips_exact_values() {
        for value in [0.0f32, 1.0, -1.0, 0.25, 1.5, 100.0, -0.125] {
            assert_eq!(f16_to_f32(f32_to_f16(value)), value);
        }
    }
}
