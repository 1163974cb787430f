//! Module identification word decoding and the family catalogue.

use std::fmt;

use packed_struct::derive::PackedStruct;
use packed_struct::PackedStruct;

use crate::modbus::connection::ChannelSpec;

/// Direction and signal class of a module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IoType {
    pub digital: bool,
    pub input: bool,
    pub output: bool,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.digital {
            f.write_str("Digital")?;
        }
        if self.input {
            f.write_str("Input")?;
        }
        if self.output {
            f.write_str("Output")?;
        }
        Ok(())
    }
}

/// How the factory assembles high-level channels for a family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleFlavor {
    Digital,
    Analog,
    Counter32,
    Counter16,
    Dali,
    Generic,
}

/// Decoded description of a module family.
#[derive(Clone, Debug)]
pub struct ModuleDescriptor {
    /// Family key, e.g. "641"; for generic digital modules the decimal code.
    pub module_type: String,
    pub display_name: String,
    pub aliases: Vec<String>,
    pub io_type: IoType,
    /// Claimed widths: discrete/coil in bits, input/holding in words.
    pub channels: ChannelSpec,
    pub flavor: ModuleFlavor,
}

/// Identification word of a generic digital module; flagged by the MSB.
#[derive(PackedStruct, Clone, Copy, Debug)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "2", endian = "msb")]
pub struct DigitalIdentifier {
    #[packed_field(bits = "15")]
    pub digital: bool,

    #[packed_field(bits = "14")]
    pub output: bool, // 0: input (discrete space), 1: output (coil space)

    // Kept for diagnostics, not used for address allocation
    #[packed_field(bits = "8:13")]
    pub flags: u8,

    #[packed_field(bits = "0:7")]
    pub channel_count: u8, // Width in bits
}

/// 16-bit identification word read from the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleIdentifier(pub u16);

impl ModuleIdentifier {
    /// Decode into a descriptor. Total: digital codes decode from the
    /// bitfield, decimal codes resolve through the catalogue and unknown
    /// codes fall back to the generic zero-channel descriptor.
    pub fn decode(self) -> ModuleDescriptor {
        if self.0 & 0x8000 != 0 {
            let ident = DigitalIdentifier::unpack(&self.0.to_be_bytes()).unwrap();
            let count = ident.channel_count as u16;
            let channels = if ident.output {
                ChannelSpec {
                    coil: count,
                    ..Default::default()
                }
            } else {
                ChannelSpec {
                    discrete: count,
                    ..Default::default()
                }
            };
            return ModuleDescriptor {
                module_type: format!("{}", self.0),
                display_name: format!("{} D{}", count, if ident.output { "O" } else { "I" }),
                aliases: vec![format!("{}", self.0)],
                io_type: IoType {
                    digital: true,
                    input: !ident.output,
                    output: ident.output,
                },
                channels,
                flavor: ModuleFlavor::Digital,
            };
        }
        family(self.0).unwrap_or_else(|| generic(self.0))
    }

    pub fn is_digital(self) -> bool {
        self.0 & 0x8000 != 0
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_digital() {
            write!(f, "{:#06x}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn entry(
    number: u16,
    display_name: &str,
    io_type: IoType,
    channels: ChannelSpec,
    flavor: ModuleFlavor,
) -> ModuleDescriptor {
    ModuleDescriptor {
        module_type: format!("{}", number),
        display_name: display_name.to_string(),
        aliases: vec![format!("{}", number)],
        io_type,
        channels,
        flavor,
    }
}

fn generic(number: u16) -> ModuleDescriptor {
    ModuleDescriptor {
        module_type: format!("{}", number),
        display_name: "Unknown".to_string(),
        aliases: vec![format!("{}", number)],
        io_type: IoType::default(),
        channels: ChannelSpec::default(),
        flavor: ModuleFlavor::Generic,
    }
}

const DIGITAL_IN: IoType = IoType {
    digital: true,
    input: true,
    output: false,
};
const ANALOG_IN: IoType = IoType {
    digital: false,
    input: true,
    output: false,
};
const ANALOG_OUT: IoType = IoType {
    digital: false,
    input: false,
    output: true,
};
const ANALOG_IN_OUT: IoType = IoType {
    digital: false,
    input: true,
    output: true,
};

/// Static family catalogue. Non-exhaustive; unknown families decode as
/// generic placeholders.
fn family(number: u16) -> Option<ModuleDescriptor> {
    let words_in = |n| ChannelSpec {
        input: n,
        ..Default::default()
    };
    let words_out = |n| ChannelSpec {
        holding: n,
        ..Default::default()
    };
    let words_in_out = |n| ChannelSpec {
        input: n,
        holding: n,
        ..Default::default()
    };
    Some(match number {
        352 => entry(
            number,
            "8 DI",
            DIGITAL_IN,
            ChannelSpec {
                discrete: 8,
                ..Default::default()
            },
            ModuleFlavor::Digital,
        ),
        451 => entry(number, "8 AI", ANALOG_IN, words_in(8), ModuleFlavor::Analog),
        453 => entry(number, "4 AI", ANALOG_IN, words_in(4), ModuleFlavor::Analog),
        459 => entry(number, "4 AI", ANALOG_IN, words_in(4), ModuleFlavor::Analog),
        460 => entry(
            number,
            "4 AI RTD",
            ANALOG_IN,
            words_in(4),
            ModuleFlavor::Analog,
        ),
        404 => entry(
            number,
            "Counter 32",
            ANALOG_IN_OUT,
            words_in_out(3),
            ModuleFlavor::Counter32,
        ),
        638 => entry(
            number,
            "2x Counter 16",
            ANALOG_IN_OUT,
            words_in_out(4),
            ModuleFlavor::Counter16,
        ),
        559 => entry(
            number,
            "4 AO",
            ANALOG_OUT,
            words_out(4),
            ModuleFlavor::Analog,
        ),
        641 => entry(
            number,
            "Dali",
            ANALOG_IN_OUT,
            words_in_out(3),
            ModuleFlavor::Dali,
        ),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_is_total() {
        for code in [0u16, 1, 352, 641, 999, 0x7FFF, 0x8000, 0x8408, 0xFFFF] {
            let descriptor = ModuleIdentifier(code).decode();
            if code & 0x8000 != 0 {
                assert!(descriptor.io_type.digital);
                let claimed = descriptor.channels.discrete + descriptor.channels.coil;
                assert_eq!(claimed, code & 0x00FF);
            }
        }
    }

    #[test]
    fn digital_output_code_decodes_direction_and_count() {
        let descriptor = ModuleIdentifier(0xC408).decode();
        assert!(descriptor.io_type.digital);
        assert!(descriptor.io_type.output);
        assert!(!descriptor.io_type.input);
        assert_eq!(descriptor.channels.coil, 8);
        assert_eq!(descriptor.channels.discrete, 0);
    }

    #[test]
    fn reserved_flag_bits_do_not_affect_allocation() {
        // Same code with a flag bit set decodes to the same channel claim
        let plain = ModuleIdentifier(0x8008).decode();
        let flagged = ModuleIdentifier(0x8408).decode();
        assert_eq!(plain.channels, flagged.channels);
        assert!(flagged.io_type.input);
    }

    #[test]
    fn digital_input_code_uses_discrete_space() {
        let descriptor = ModuleIdentifier(0x8204).decode();
        assert!(descriptor.io_type.input);
        assert_eq!(descriptor.channels.discrete, 4);
        assert_eq!(descriptor.channels.coil, 0);
    }

    #[test]
    fn dali_family_has_three_words_each_way() {
        let descriptor = ModuleIdentifier(641).decode();
        assert_eq!(descriptor.flavor, ModuleFlavor::Dali);
        assert!(!descriptor.io_type.digital);
        assert!(descriptor.io_type.input);
        assert!(descriptor.io_type.output);
        assert_eq!(descriptor.channels.input, 3);
        assert_eq!(descriptor.channels.holding, 3);
        assert_eq!(descriptor.channels.coil, 0);
        assert_eq!(descriptor.channels.discrete, 0);
        assert!(descriptor.aliases.iter().any(|a| a == "641"));
    }

    #[test]
    fn unknown_family_decodes_as_generic() {
        let descriptor = ModuleIdentifier(999).decode();
        assert_eq!(descriptor.flavor, ModuleFlavor::Generic);
        assert_eq!(descriptor.channels, ChannelSpec::default());
    }

    #[test]
    fn catalogue_widths() {
        assert_eq!(ModuleIdentifier(352).decode().channels.discrete, 8);
        assert_eq!(ModuleIdentifier(451).decode().channels.input, 8);
        assert_eq!(ModuleIdentifier(559).decode().channels.holding, 4);
        assert_eq!(ModuleIdentifier(404).decode().channels.input, 3);
    }
}
