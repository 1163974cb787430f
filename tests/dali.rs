//! DALI gateway handshake and command catalogue.

mod common;

use std::sync::{Arc, Mutex};

use common::{setup_controller, DaliEmulation, MockModbusClient, MockState, OUTPUT_BASE};

use wg750::modules::IoChannel;
use wg750::{Error, Hub, HubConfig};

// First half {2,7,10,14,18,21,26,28}, second half {32,36,40,45,48,54,56,63}
const PRESENT_FIRST_HALF: [u8; 4] = [0x84, 0x44, 0x24, 0x14];
const PRESENT_SECOND_HALF: [u8; 4] = [0x11, 0x21, 0x41, 0x81];

fn dali_hub(present: bool) -> (Hub, Arc<Mutex<MockState>>) {
    let (client, state) = MockModbusClient::new();
    {
        let mut state = state.lock().unwrap();
        setup_controller(&mut state, &[641, 0], [48, 48, 0, 0]);
        let mut dali = DaliEmulation::new(OUTPUT_BASE, 0x0000);
        if present {
            dali.responses.insert(0x06, PRESENT_FIRST_HALF);
            dali.responses.insert(0x07, PRESENT_SECOND_HALF);
        }
        state.dali = Some(dali);
    }
    let hub = Hub::with_client(HubConfig::new("mock"), Box::new(client)).unwrap();
    (hub, state)
}

#[test]
fn dali_module_reserves_three_words_each_way() {
    let (hub, _state) = dali_hub(false);
    let module = hub.modules.by_alias("641").unwrap();
    assert!(!module.descriptor.io_type.digital);
    assert!(module.descriptor.io_type.input);
    assert!(module.descriptor.io_type.output);
    assert_eq!(module.modbus_channels.input.len(), 3);
    assert_eq!(module.modbus_channels.holding.len(), 3);
    assert_eq!(module.modbus_channels.coil.len(), 0);
    assert_eq!(module.modbus_channels.discrete.len(), 0);
}

#[test]
fn short_address_discovery_creates_channels() {
    let (hub, _state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let addresses: Vec<u8> = module
        .channels
        .iter()
        .map(|channel| {
            let IoChannel::Dali(dali) = channel else {
                panic!("expected a DALI channel");
            };
            dali.dali_address()
        })
        .collect();
    assert_eq!(
        addresses,
        vec![2, 7, 10, 14, 18, 21, 26, 28, 32, 36, 40, 45, 48, 54, 56, 63]
    );

    let dali = module.dali.as_ref().unwrap();
    assert_eq!(dali.groups.len(), 16);
    assert_eq!(dali.groups[0].dali_address(), 0x40);
    assert_eq!(dali.broadcast.dali_address(), 0x3F);
}

#[test]
fn query_short_address_present_merges_both_halves() {
    let (hub, _state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let commands = &module.dali.as_ref().unwrap().commands;
    assert_eq!(
        commands.query_short_address_present().unwrap(),
        vec![2, 7, 10, 14, 18, 21, 26, 28, 32, 36, 40, 45, 48, 54, 56, 63]
    );
}

#[test]
fn transmit_handshake_raises_and_releases_the_request() {
    let (hub, state) = dali_hub(false);
    let module = hub.modules.by_alias("641").unwrap();
    let dali = module.dali.as_ref().unwrap();

    // Status byte starts out idle
    assert_eq!(state.lock().unwrap().input_register(0x0000) & 1, 0);
    let transmits_before = state.lock().unwrap().dali.as_ref().unwrap().transmits;

    dali.broadcast.power_off().unwrap();

    let state = state.lock().unwrap();
    // transmit_request released, transmit_ack mirrored back to 0
    assert_eq!(state.holding_register(OUTPUT_BASE) & 1, 0);
    assert_eq!(state.input_register(0x0000) & 1, 0);
    assert_eq!(
        state.dali.as_ref().unwrap().transmits,
        transmits_before + 1
    );
}

#[test]
fn queries_return_the_response_byte() {
    let (hub, state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let IoChannel::Dali(channel) = &module.channels[0] else {
        panic!("expected a DALI channel");
    };
    // Responses to channel commands are keyed by the short address
    state
        .lock()
        .unwrap()
        .dali
        .as_mut()
        .unwrap()
        .responses
        .insert(channel.dali_address(), [0x42, 0, 0, 0]);

    assert_eq!(channel.query_status().unwrap(), 0x42);
    assert_eq!(channel.brightness().unwrap(), 0x42);
}

#[test]
fn config_commands_are_sent_twice() {
    let (hub, state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let IoChannel::Dali(channel) = &module.channels[0] else {
        panic!("expected a DALI channel");
    };

    let transmits_before = state.lock().unwrap().dali.as_ref().unwrap().transmits;
    channel.reset().unwrap();
    assert_eq!(
        state.lock().unwrap().dali.as_ref().unwrap().transmits,
        transmits_before + 2
    );

    let transmits_before = state.lock().unwrap().dali.as_ref().unwrap().transmits;
    channel.power_off().unwrap();
    assert_eq!(
        state.lock().unwrap().dali.as_ref().unwrap().transmits,
        transmits_before + 1
    );
}

#[test]
fn out_of_range_parameters_are_rejected_without_bus_traffic() {
    let (hub, state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let IoChannel::Dali(channel) = &module.channels[0] else {
        panic!("expected a DALI channel");
    };

    let transmits_before = state.lock().unwrap().dali.as_ref().unwrap().transmits;
    assert!(matches!(
        channel.set_brightness(255),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        channel.go_to_scene(0),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        channel.go_to_scene(17),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        channel.add_to_group(17),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        channel.query_scene_value(16),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        state.lock().unwrap().dali.as_ref().unwrap().transmits,
        transmits_before
    );
}

#[test]
fn group_queries_merge_into_group_numbers() {
    let (hub, state) = dali_hub(true);
    let module = hub.modules.by_alias("641").unwrap();
    let IoChannel::Dali(channel) = &module.channels[0] else {
        panic!("expected a DALI channel");
    };
    // Same selector for both halves; membership in groups 1, 3 and 9, 11
    state
        .lock()
        .unwrap()
        .dali
        .as_mut()
        .unwrap()
        .responses
        .insert(channel.dali_address(), [0b0000_0101, 0, 0, 0]);

    assert_eq!(channel.query_groups().unwrap(), vec![1, 3, 9, 11]);
}

#[test]
fn missing_acknowledgement_times_out() {
    let (hub, state) = dali_hub(false);
    let module = hub.modules.by_alias("641").unwrap();
    let dali = module.dali.as_ref().unwrap();

    // Gateway stops answering
    state.lock().unwrap().dali = None;
    assert!(matches!(
        dali.broadcast.power_off(),
        Err(Error::Timeout { .. })
    ));
}
