//! Module discovery and address layout.

mod common;

use common::{setup_controller, DaliEmulation, MockModbusClient, OUTPUT_BASE};

use wg750::modules::{ModuleFlavor, WagoChannelType};
use wg750::{Hub, HubConfig};

fn config() -> HubConfig {
    HubConfig::new("mock")
}

#[test]
fn discovery_lays_out_heterogeneous_chain() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        // 8 discrete in, 8 coil out, DALI master
        setup_controller(&mut state, &[352, 0xC408, 641, 0], [48, 48, 8, 8]);
        // DALI slices start at input word 0 / holding word 0
        state.dali = Some(DaliEmulation::new(OUTPUT_BASE, 0x0000));
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    assert!(hub.is_initialized());
    assert!(hub.is_module_discovery_done());
    assert_eq!(hub.modules.len(), 3);

    let first = hub.modules.get(0).unwrap();
    assert_eq!(first.descriptor.channels.discrete, 8);
    assert!(first.descriptor.io_type.digital);
    assert!(first.descriptor.io_type.input);
    assert_eq!(first.channels.len(), 8);
    assert!(first
        .channels
        .iter()
        .all(|c| c.channel_type() == WagoChannelType::DigitalIn));

    let second = hub.modules.get(1).unwrap();
    assert!(second.descriptor.io_type.digital);
    assert!(second.descriptor.io_type.output);
    assert_eq!(second.descriptor.channels.coil, 8);
    assert_eq!(second.channels.len(), 8);

    let third = hub.modules.get(2).unwrap();
    assert_eq!(third.descriptor.flavor, ModuleFlavor::Dali);
    assert_eq!(third.modbus_channels.input.len(), 3);
    assert_eq!(third.modbus_channels.holding.len(), 3);

    // Final cursor after the whole chain
    let cursor = hub.next_address();
    assert_eq!(cursor.coil, 8);
    assert_eq!(cursor.discrete, 8);
    assert_eq!(cursor.input, 3);
    assert_eq!(cursor.holding, 3);
}

#[test]
fn slices_are_disjoint_and_insertion_ordered() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        // Two DI modules, one DO module, two analog in modules
        setup_controller(
            &mut state,
            &[0x8204, 352, 0xC408, 459, 459, 0],
            [0, 128, 8, 12],
        );
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    assert_eq!(hub.modules.len(), 5);

    // Discrete slices: 4 bits then 8 bits, back to back
    assert_eq!(hub.modules.get(0).unwrap().base.discrete, 0);
    assert_eq!(hub.modules.get(1).unwrap().base.discrete, 4);
    assert_eq!(hub.modules.get(2).unwrap().base.coil, 0);
    // Input word slices for the analog modules
    assert_eq!(hub.modules.get(3).unwrap().base.input, 0);
    assert_eq!(hub.modules.get(4).unwrap().base.input, 4);
    assert_eq!(hub.next_address().input, 8);

    // Channel addresses are consecutive from the module base
    let analog = hub.modules.get(4).unwrap();
    for (i, channel) in analog.modbus_channels.input.iter().enumerate() {
        assert_eq!(channel.address(), 4 + i as u16);
    }
}

#[test]
fn zero_terminates_the_identifier_list() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[352, 0, 352, 352], [0, 0, 0, 8]);
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    assert_eq!(hub.modules.len(), 1);
}

#[test]
fn unknown_family_is_kept_as_generic_placeholder() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[999, 352, 0], [0, 0, 0, 8]);
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    assert_eq!(hub.modules.len(), 2);
    let placeholder = hub.modules.get(0).unwrap();
    assert_eq!(placeholder.descriptor.flavor, ModuleFlavor::Generic);
    assert!(placeholder.channels.is_empty());
    // The placeholder claims no address space
    assert_eq!(hub.modules.get(1).unwrap().base.discrete, 0);
}

#[test]
fn rediscovery_without_reset_keeps_existing_chain() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[352, 0], [0, 0, 0, 8]);
    }

    let mut hub = Hub::with_client(config(), Box::new(client)).unwrap();
    assert_eq!(hub.modules.len(), 1);
    hub.run_discovery(false).unwrap();
    assert_eq!(hub.modules.len(), 1);
    hub.run_discovery(true).unwrap();
    assert_eq!(hub.modules.len(), 1);
}

#[test]
fn controller_info_is_read_from_identification_registers() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[0], [0, 0, 0, 0]);
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    let info = hub.info().unwrap();
    assert_eq!(info.revision, 1);
    assert_eq!(info.series, 750);
    assert_eq!(info.item, 881);
    assert_eq!(info.firmware_version, "1.7");
}

#[test]
fn alias_lookup_finds_first_match() {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[459, 459, 352, 0], [0, 128, 0, 8]);
    }

    let hub = Hub::with_client(config(), Box::new(client)).unwrap();
    let module = hub.modules.by_alias("459").unwrap();
    assert_eq!(module.index, 0);
    assert!(hub.modules.by_alias("641").is_none());
    assert_eq!(hub.modules.digital_modules().len(), 1);
    assert_eq!(hub.modules.analog_modules().len(), 2);
}
