pub mod analog;
pub mod channel;
pub mod counter;
pub mod dali;
pub mod digital;
pub mod identifier;
pub mod module;

pub use channel::{IoChannel, IoValue, WagoChannelType};
pub use identifier::{IoType, ModuleDescriptor, ModuleFlavor, ModuleIdentifier};
pub use module::{AddressMap, Module, Modules};
