//! Controller connection bring-up, identification and module discovery.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::modbus::connection::{ChannelSpec, ModbusConnection, SharedState};
use crate::modbus::registers::Register;
use crate::modbus::tcp::TcpModbusClient;
use crate::modules::identifier::ModuleIdentifier;
use crate::modules::module::{AddressMap, Module, Modules};
use crate::settings::HubConfig;
use crate::ModbusClient;

// Process image widths in bits
const WIDTH_HOLDING: u16 = 0x1022;
const WIDTH_INPUT: u16 = 0x1023;
const WIDTH_COIL: u16 = 0x1024;
const WIDTH_DISCRETE: u16 = 0x1025;

const MODULE_DIAGNOSTIC: u16 = 0x1050;

// Identification words: 192 consecutive registers, read in three chunks
const MODULE_LIST_BASE: u16 = 0x2030;
const MODULE_LIST_READS: u16 = 3;
const MODULE_LIST_CHUNK: u16 = 64;

const SELF_TEST_CONSTANTS: [(u16, u16); 9] = [
    (0x2000, 0x0000),
    (0x2001, 0xFFFF),
    (0x2002, 0x1234),
    (0x2003, 0xAAAA),
    (0x2004, 0x5555),
    (0x2005, 0x7FFF),
    (0x2006, 0x8000),
    (0x2007, 0x3FFF),
    (0x2008, 0x4000),
];

/// Identification of the head unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerInfo {
    pub revision: u16,
    pub series: u16,
    pub item: u16,
    pub firmware_version: String,
    pub firmware_timestamp: String,
    pub firmware_info: String,
}

impl fmt::Display for ControllerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} rev {} fw {} ({})",
            self.series, self.item, self.revision, self.firmware_version, self.firmware_timestamp
        )
    }
}

/// A controller and its chain of discovered modules.
pub struct Hub {
    config: HubConfig,
    pub modules: Modules,
    connection: Option<Arc<ModbusConnection>>,
    info: Option<ControllerInfo>,
    process_state_width: ChannelSpec,
    next_address: AddressMap,
    initialized: bool,
    discovered: bool,
}

impl Hub {
    /// Connect over TCP and initialize, including module discovery.
    pub fn connect(config: HubConfig) -> Result<Hub> {
        let client = TcpModbusClient::connect(&config.host, config.port)?;
        Hub::with_client(config, Box::new(client))
    }

    /// Initialize over an already-established client.
    pub fn with_client(config: HubConfig, client: Box<dyn ModbusClient>) -> Result<Hub> {
        let mut hub = Hub {
            config,
            modules: Modules::default(),
            connection: None,
            info: None,
            process_state_width: ChannelSpec::default(),
            next_address: AddressMap::default(),
            initialized: false,
            discovered: false,
        };
        hub.initialize(client)?;
        Ok(hub)
    }

    fn initialize(&mut self, mut client: Box<dyn ModbusClient>) -> Result<()> {
        let widths = read_process_state_width(client.as_mut())?;
        info!(
            "Process image widths (bits): holding {}, input {}, coil {}, discrete {}",
            widths.holding, widths.input, widths.coil, widths.discrete
        );
        self.process_state_width = widths;
        let connection = Arc::new(ModbusConnection::new(client, widths));
        connection.update_state()?;
        self.connection = Some(connection);

        self.check_test_constants()?;
        self.info = Some(self.read_controller_info()?);
        self.read_module_diagnostic()?;
        // A failed discovery leaves the hub usable; the caller may retry.
        if let Err(err) = self.run_discovery(true) {
            error!("Module discovery failed: {}", err);
        }
        self.initialized = true;
        debug!("Controller: {:?}", self.info);
        debug!("Modules: {:?}", self.modules);
        Ok(())
    }

    /// Read the identification words and rebuild the module chain. With
    /// `reset` the existing chain is cleared first; without it discovery only
    /// runs on an empty chain.
    pub fn run_discovery(&mut self, reset: bool) -> Result<()> {
        self.discovered = false;
        if reset {
            self.reset_modules();
        } else if !self.modules.is_empty() {
            self.discovered = true;
            return Ok(());
        }
        let shared = self.shared()?;
        let mut identification = Vec::with_capacity((MODULE_LIST_READS * MODULE_LIST_CHUNK) as usize);
        {
            let mut state = shared.lock().unwrap();
            for i in 0..MODULE_LIST_READS {
                let words = state
                    .read_raw_input_registers(MODULE_LIST_BASE + i * MODULE_LIST_CHUNK, MODULE_LIST_CHUNK)?;
                identification.extend_from_slice(words.as_slice());
            }
        }
        for &word in &identification {
            if word == 0 {
                break;
            }
            let index = self.modules.len();
            let module = Module::build(
                index,
                ModuleIdentifier(word),
                self.next_address,
                Arc::clone(&shared),
                self.config.modules.get(index),
            );
            info!(
                "Discovered module {}: {} ({}), base {:?}",
                index,
                module.descriptor.display_name,
                module.identifier,
                module.base
            );
            self.next_address = module.next_address();
            self.modules.append(module);
        }
        self.check_claimed_widths();
        self.discovered = true;
        Ok(())
    }

    pub fn reset_modules(&mut self) {
        self.modules.reset();
        self.next_address = AddressMap::default();
    }

    pub fn connection(&self) -> Option<&Arc<ModbusConnection>> {
        self.connection.as_ref()
    }

    pub fn info(&self) -> Option<&ControllerInfo> {
        self.info.as_ref()
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_module_discovery_done(&self) -> bool {
        self.discovered
    }

    pub fn process_state_width(&self) -> ChannelSpec {
        self.process_state_width
    }

    /// Cursor position after the last module.
    pub fn next_address(&self) -> AddressMap {
        self.next_address
    }

    /// Start continuous polling with the configured intervals.
    pub fn start_polling(&self) -> Result<()> {
        let connection = self.connection.as_ref().ok_or_else(|| self.not_connected())?;
        connection.start_continuous_update(self.config.polling.intervals());
        Ok(())
    }

    pub fn stop_polling(&self) {
        if let Some(connection) = &self.connection {
            connection.stop_continuous_update();
        }
    }

    /// Stop polling and drop the connection.
    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            if connection.is_continuous_update_running() {
                connection.stop_continuous_update();
            }
        }
    }

    fn not_connected(&self) -> Error {
        Error::Connection {
            endpoint: format!("{}:{}", self.config.host, self.config.port),
            message: "hub is not connected".into(),
        }
    }

    fn shared(&self) -> Result<SharedState> {
        Ok(self
            .connection
            .as_ref()
            .ok_or_else(|| self.not_connected())?
            .shared())
    }

    fn check_test_constants(&self) -> Result<()> {
        let shared = self.shared()?;
        let mut state = shared.lock().unwrap();
        for (address, expected) in SELF_TEST_CONSTANTS {
            let register = Register::new(address, state.read_raw_input_registers(address, 1)?);
            debug!("register: {}", register);
            if register.words.get(0) != expected {
                warn!(
                    "Self-test constant mismatch at {:#06x}: expected {:#06x}, got {:#06x}",
                    address,
                    expected,
                    register.words.get(0)
                );
            }
        }
        Ok(())
    }

    fn read_controller_info(&self) -> Result<ControllerInfo> {
        let shared = self.shared()?;
        let mut state = shared.lock().unwrap();
        let revision = state.read_raw_input_registers(0x2010, 1)?.get(0);
        let series = state.read_raw_input_registers(0x2011, 1)?.get(0);
        let item = state.read_raw_input_registers(0x2012, 1)?.get(0);
        let major = state.read_raw_input_registers(0x2013, 1)?.get(0);
        let minor = state.read_raw_input_registers(0x2014, 1)?.get(0);
        let time = state.read_raw_input_registers(0x2021, 8)?.to_ascii();
        let date = state.read_raw_input_registers(0x2022, 8)?.to_ascii();
        let firmware_info = state.read_raw_input_registers(0x2023, 32)?.to_ascii();
        Ok(ControllerInfo {
            revision,
            series,
            item,
            firmware_version: format!("{}.{}", major, minor),
            firmware_timestamp: format!("{} {}", date, time),
            firmware_info,
        })
    }

    fn read_module_diagnostic(&self) -> Result<()> {
        let shared = self.shared()?;
        let mut state = shared.lock().unwrap();
        let register = Register::new(
            MODULE_DIAGNOSTIC,
            state.read_raw_input_registers(MODULE_DIAGNOSTIC, 3)?,
        );
        debug!("Module diagnostic: {}", register);
        Ok(())
    }

    // Claimed widths must stay within what the controller reported
    fn check_claimed_widths(&self) {
        let mut claimed = ChannelSpec::default();
        for module in &self.modules {
            let channels = module.descriptor.channels;
            claimed.coil += channels.coil;
            claimed.discrete += channels.discrete;
            claimed.input += channels.input;
            claimed.holding += channels.holding;
        }
        let reported = self.process_state_width;
        if claimed.coil > reported.coil {
            error!(
                "Modules claim {} coil bits, controller reports {}",
                claimed.coil, reported.coil
            );
        }
        if claimed.discrete > reported.discrete {
            error!(
                "Modules claim {} discrete bits, controller reports {}",
                claimed.discrete, reported.discrete
            );
        }
        if claimed.input * 16 > reported.input {
            error!(
                "Modules claim {} input bits, controller reports {}",
                claimed.input * 16,
                reported.input
            );
        }
        if claimed.holding * 16 > reported.holding {
            error!(
                "Modules claim {} holding bits, controller reports {}",
                claimed.holding * 16,
                reported.holding
            );
        }
    }
}

fn read_process_state_width(client: &mut dyn ModbusClient) -> Result<ChannelSpec> {
    let mut read = |address: u16| -> Result<u16> {
        let values = client
            .read_input_registers(address, 1)
            .map_err(|e| Error::Connection {
                endpoint: "controller".into(),
                message: e.to_string(),
            })?;
        values
            .first()
            .copied()
            .ok_or_else(|| Error::Protocol("empty process width response".into()))
    };
    Ok(ChannelSpec {
        holding: read(WIDTH_HOLDING)?,
        input: read(WIDTH_INPUT)?,
        coil: read(WIDTH_COIL)?,
        discrete: read(WIDTH_DISCRETE)?,
    })
}
