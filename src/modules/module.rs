//! Module instances and the chain assembled during discovery.

use std::fmt;
use std::sync::Arc;

use log::{error, warn};

use crate::error::Error;
use crate::modbus::channel::ModbusChannel;
use crate::modbus::connection::{ChannelKind, ChannelSpec, SharedState};
use crate::modules::analog::{
    ByteHalf, Float16In, Float16Out, Int16In, Int16Out, Int8In, Int8Out,
};
use crate::modules::channel::{IoChannel, WagoChannelType};
use crate::modules::counter::{Counter16, Counter32, CounterCommunicationRegister};
use crate::modules::dali::channel::{DaliChannel, BROADCAST_ADDRESS, GROUP_ADDRESS_BASE};
use crate::modules::dali::commands::DaliCommands;
use crate::modules::dali::communication::DaliCommunicationRegister;
use crate::modules::digital::{DigitalIn, DigitalOut};
use crate::modules::identifier::{IoType, ModuleDescriptor, ModuleFlavor, ModuleIdentifier};
use crate::settings::ModuleConfig;

/// Next-free offset per address space. Snapshotted as a module's base during
/// discovery, then advanced by the module's claimed widths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AddressMap {
    pub coil: u16,
    pub discrete: u16,
    pub input: u16,
    pub holding: u16,
}

impl AddressMap {
    pub fn advanced_by(&self, channels: &ChannelSpec) -> AddressMap {
        AddressMap {
            coil: self.coil + channels.coil,
            discrete: self.discrete + channels.discrete,
            input: self.input + channels.input,
            holding: self.holding + channels.holding,
        }
    }
}

/// Typed cells owned by one module, consecutive from its base per space.
#[derive(Default)]
pub struct ModbusChannels {
    pub coil: Vec<ModbusChannel>,
    pub discrete: Vec<ModbusChannel>,
    pub input: Vec<ModbusChannel>,
    pub holding: Vec<ModbusChannel>,
}

/// Gateway-level DALI surface of a 641 module: the communication register,
/// the macro command set, group channels and the broadcast channel.
pub struct DaliInterface {
    pub register: DaliCommunicationRegister,
    pub commands: DaliCommands,
    pub groups: Vec<DaliChannel>,
    pub broadcast: DaliChannel,
}

/// One plug-in module of the chain.
pub struct Module {
    pub index: usize,
    pub identifier: ModuleIdentifier,
    pub descriptor: ModuleDescriptor,
    pub base: AddressMap,
    pub modbus_channels: ModbusChannels,
    pub channels: Vec<IoChannel>,
    pub dali: Option<DaliInterface>,
    name: Option<String>,
}

impl Module {
    pub(crate) fn build(
        index: usize,
        identifier: ModuleIdentifier,
        base: AddressMap,
        state: SharedState,
        config: Option<&ModuleConfig>,
    ) -> Module {
        let descriptor = identifier.decode();
        if descriptor.flavor == ModuleFlavor::Generic {
            warn!(
                "Module {}: {}; keeping zero-channel placeholder",
                index,
                Error::UnknownModule(identifier.0)
            );
        }
        let modbus_channels = create_modbus_channels(&descriptor.channels, &base, &state);
        let (mut channels, dali) = assemble(&descriptor, &modbus_channels, &base, &state, config);
        if let Some(config) = config {
            for (channel, channel_config) in channels.iter_mut().zip(&config.channels) {
                if let Some(name) = &channel_config.name {
                    channel.set_name(name.clone());
                }
            }
        }
        Module {
            index,
            identifier,
            descriptor,
            base,
            modbus_channels,
            channels,
            dali,
            name: config.and_then(|c| c.name.clone()),
        }
    }

    /// Cursor position after this module's slices.
    pub fn next_address(&self) -> AddressMap {
        self.base.advanced_by(&self.descriptor.channels)
    }

    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}", self.descriptor.display_name, self.index),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.descriptor.module_type == key || self.descriptor.aliases.iter().any(|a| a == key)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("index", &self.index)
            .field("identifier", &self.identifier)
            .field("display_name", &self.descriptor.display_name)
            .field("base", &self.base)
            .field("channels", &self.channels.len())
            .finish()
    }
}

fn create_modbus_channels(
    channels: &ChannelSpec,
    base: &AddressMap,
    state: &SharedState,
) -> ModbusChannels {
    let make = |kind: ChannelKind, base: u16, count: u16| -> Vec<ModbusChannel> {
        (0..count)
            .map(|i| ModbusChannel::new(kind, base + i, Arc::clone(state)))
            .collect()
    };
    ModbusChannels {
        coil: make(ChannelKind::Coil, base.coil, channels.coil),
        discrete: make(ChannelKind::Discrete, base.discrete, channels.discrete),
        input: make(ChannelKind::Input, base.input, channels.input),
        holding: make(ChannelKind::Holding, base.holding, channels.holding),
    }
}

/// Requested analog assembly override, e.g. byte-half pairing.
fn analog_override(config: Option<&ModuleConfig>) -> Option<WagoChannelType> {
    config.and_then(|c| c.channels.iter().find_map(|ch| ch.channel_type))
}

fn assemble(
    descriptor: &ModuleDescriptor,
    modbus_channels: &ModbusChannels,
    base: &AddressMap,
    state: &SharedState,
    config: Option<&ModuleConfig>,
) -> (Vec<IoChannel>, Option<DaliInterface>) {
    let mut channels = Vec::new();
    match descriptor.flavor {
        ModuleFlavor::Digital | ModuleFlavor::Generic => {
            for (i, channel) in modbus_channels.discrete.iter().enumerate() {
                channels.push(IoChannel::DigitalIn(DigitalIn::new(channel.clone(), i)));
            }
            for (i, channel) in modbus_channels.coil.iter().enumerate() {
                channels.push(IoChannel::DigitalOut(DigitalOut::new(channel.clone(), i)));
            }
        }
        ModuleFlavor::Analog => {
            let requested = analog_override(config);
            for (i, channel) in modbus_channels.input.iter().enumerate() {
                match requested {
                    Some(WagoChannelType::Int8In) => {
                        channels.push(IoChannel::Int8In(Int8In::new(
                            channel.clone(),
                            ByteHalf::Low,
                            2 * i,
                        )));
                        channels.push(IoChannel::Int8In(Int8In::new(
                            channel.clone(),
                            ByteHalf::High,
                            2 * i + 1,
                        )));
                    }
                    Some(WagoChannelType::Float16In) => {
                        channels.push(IoChannel::Float16In(Float16In::new(channel.clone(), i)));
                    }
                    _ => channels.push(IoChannel::Int16In(Int16In::new(channel.clone(), i))),
                }
            }
            for (i, channel) in modbus_channels.holding.iter().enumerate() {
                match requested {
                    Some(WagoChannelType::Int8Out) => {
                        channels.push(IoChannel::Int8Out(Int8Out::new(
                            channel.clone(),
                            ByteHalf::Low,
                            2 * i,
                        )));
                        channels.push(IoChannel::Int8Out(Int8Out::new(
                            channel.clone(),
                            ByteHalf::High,
                            2 * i + 1,
                        )));
                    }
                    Some(WagoChannelType::Float16Out) => {
                        channels.push(IoChannel::Float16Out(Float16Out::new(channel.clone(), i)));
                    }
                    _ => channels.push(IoChannel::Int16Out(Int16Out::new(channel.clone(), i))),
                }
            }
        }
        ModuleFlavor::Counter32 => {
            let register =
                CounterCommunicationRegister::new(Arc::clone(state), base.input, base.holding, 2);
            channels.push(IoChannel::Counter32(Counter32::new(register, 0)));
        }
        ModuleFlavor::Counter16 => {
            // Two independent counters, two words each
            for i in 0..2u16 {
                let register = CounterCommunicationRegister::new(
                    Arc::clone(state),
                    base.input + 2 * i,
                    base.holding + 2 * i,
                    1,
                );
                channels.push(IoChannel::Counter16(Counter16::new(register, i as usize)));
            }
        }
        ModuleFlavor::Dali => {
            let register =
                DaliCommunicationRegister::new(Arc::clone(state), base.input, base.holding);
            let commands = DaliCommands::new(register.clone());
            match commands.query_short_address_present() {
                Ok(addresses) => {
                    for (i, address) in addresses.into_iter().enumerate() {
                        channels.push(IoChannel::Dali(DaliChannel::new(
                            address,
                            register.clone(),
                            i,
                        )));
                    }
                }
                Err(err) => {
                    error!("Error setting up DALI channels: {}", err);
                }
            }
            let groups = (0..16)
                .map(|i| DaliChannel::new(GROUP_ADDRESS_BASE + i, register.clone(), i as usize))
                .collect();
            let broadcast = DaliChannel::new(BROADCAST_ADDRESS, register.clone(), 0);
            return (
                channels,
                Some(DaliInterface {
                    register,
                    commands,
                    groups,
                    broadcast,
                }),
            );
        }
    }
    (channels, None)
}

/// Ordered module chain with alias lookup.
#[derive(Default)]
pub struct Modules {
    modules: Vec<Module>,
}

impl Modules {
    pub fn append(&mut self, module: Module) {
        self.modules.push(module);
    }

    pub fn reset(&mut self) {
        self.modules.clear();
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn all(&self) -> &[Module] {
        &self.modules
    }

    pub fn get(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Module> {
        self.modules.get_mut(index)
    }

    /// First module whose family key or alias matches.
    pub fn by_alias(&self, key: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.matches(key))
    }

    pub fn by_alias_mut(&mut self, key: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.matches(key))
    }

    pub fn by_io_type(&self, io_type: IoType) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.descriptor.io_type == io_type)
            .collect()
    }

    pub fn digital_modules(&self) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.descriptor.io_type.digital)
            .collect()
    }

    pub fn analog_modules(&self) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| !m.descriptor.io_type.digital && m.descriptor.flavor != ModuleFlavor::Generic)
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Module> {
        self.modules.iter()
    }
}

impl<'a> IntoIterator for &'a Modules {
    type Item = &'a Module;
    type IntoIter = std::slice::Iter<'a, Module>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}

impl fmt::Debug for Modules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.modules.iter()).finish()
    }
}
