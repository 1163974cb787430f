#![allow(dead_code)]

//! Scripted Modbus client standing in for a controller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wg750::{ClientError, ClientResult, ModbusClient};

/// Wire base of the holding and coil spaces.
pub const OUTPUT_BASE: u16 = 0x0200;

/// Mirrors the DALI gateway handshake: transmit_ack follows transmit_request,
/// and a configured response (keyed by the selector byte in word 0 high) is
/// placed into the input words when a transmit is observed.
pub struct DaliEmulation {
    pub holding_base: u16,
    pub input_base: u16,
    pub responses: HashMap<u8, [u8; 4]>,
    pub transmits: u32,
}

impl DaliEmulation {
    pub fn new(holding_base: u16, input_base: u16) -> Self {
        DaliEmulation {
            holding_base,
            input_base,
            responses: HashMap::new(),
            transmits: 0,
        }
    }
}

/// Mirrors the counter module: set_counter latches the loaded value into the
/// input cells and raises ack_set_counter; lock is reflected in the status.
pub struct CounterEmulation {
    pub holding_base: u16,
    pub input_base: u16,
}

#[derive(Default)]
pub struct MockState {
    pub input_registers: HashMap<u16, u16>,
    pub holding_registers: HashMap<u16, u16>,
    pub discrete_inputs: HashMap<u16, bool>,
    pub coils: HashMap<u16, bool>,
    /// Fail the next N read transactions with a broken pipe.
    pub fail_reads: u32,
    pub reconnects: u32,
    pub reads: u64,
    pub dali: Option<DaliEmulation>,
    pub counter: Option<CounterEmulation>,
}

impl MockState {
    pub fn input_register(&self, address: u16) -> u16 {
        self.input_registers.get(&address).copied().unwrap_or(0)
    }

    pub fn holding_register(&self, address: u16) -> u16 {
        self.holding_registers.get(&address).copied().unwrap_or(0)
    }

    pub fn coil(&self, address: u16) -> bool {
        self.coils.get(&address).copied().unwrap_or(false)
    }

    fn after_holding_write(&mut self) {
        if let Some(dali) = &mut self.dali {
            let control = self
                .holding_registers
                .get(&dali.holding_base)
                .copied()
                .unwrap_or(0);
            let request = control & 0x0001 != 0;
            let selector = (control >> 8) as u8;
            let status = self
                .input_registers
                .get(&dali.input_base)
                .copied()
                .unwrap_or(0);
            let acked = status & 0x0001 != 0;
            if request && !acked {
                dali.transmits += 1;
                let bytes = dali.responses.get(&selector).copied().unwrap_or([0; 4]);
                self.input_registers
                    .insert(dali.input_base, (bytes[0] as u16) << 8 | 0x0001);
                self.input_registers.insert(
                    dali.input_base + 1,
                    (bytes[2] as u16) << 8 | bytes[1] as u16,
                );
                self.input_registers
                    .insert(dali.input_base + 2, bytes[3] as u16);
            } else if !request && acked {
                self.input_registers.insert(dali.input_base, status & !0x0001);
            }
        }
        if let Some(counter) = &self.counter {
            let control = self
                .holding_registers
                .get(&counter.holding_base)
                .copied()
                .unwrap_or(0);
            let mut status = self
                .input_registers
                .get(&counter.input_base)
                .copied()
                .unwrap_or(0);
            if control & 0x0020 != 0 {
                // set_counter: latch the loaded value and acknowledge
                for offset in 1..=2 {
                    let value = self
                        .holding_registers
                        .get(&(counter.holding_base + offset))
                        .copied()
                        .unwrap_or(0);
                    self.input_registers
                        .insert(counter.input_base + offset, value);
                }
                status |= 0x0020;
            } else {
                status &= !0x0020;
            }
            if control & 0x0010 != 0 {
                status |= 0x0010;
            } else {
                status &= !0x0010;
            }
            self.input_registers.insert(counter.input_base, status);
        }
    }
}

pub struct MockModbusClient {
    state: Arc<Mutex<MockState>>,
}

impl MockModbusClient {
    pub fn new() -> (Self, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            MockModbusClient {
                state: Arc::clone(&state),
            },
            state,
        )
    }

    fn read_gate(state: &mut MockState) -> ClientResult<()> {
        state.reads += 1;
        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(ClientError::Disconnected("broken pipe".into()));
        }
        Ok(())
    }
}

impl ModbusClient for MockModbusClient {
    fn read_coils(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let mut state = self.state.lock().unwrap();
        Self::read_gate(&mut state)?;
        Ok((0..count)
            .map(|i| state.coils.get(&(address + i)).copied().unwrap_or(false))
            .collect())
    }

    fn read_discrete_inputs(&mut self, address: u16, count: u16) -> ClientResult<Vec<bool>> {
        let mut state = self.state.lock().unwrap();
        Self::read_gate(&mut state)?;
        Ok((0..count)
            .map(|i| {
                state
                    .discrete_inputs
                    .get(&(address + i))
                    .copied()
                    .unwrap_or(false)
            })
            .collect())
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        let mut state = self.state.lock().unwrap();
        Self::read_gate(&mut state)?;
        Ok((0..count)
            .map(|i| {
                state
                    .holding_registers
                    .get(&(address + i))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> ClientResult<Vec<u16>> {
        let mut state = self.state.lock().unwrap();
        Self::read_gate(&mut state)?;
        Ok((0..count)
            .map(|i| {
                state
                    .input_registers
                    .get(&(address + i))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    fn write_single_coil(&mut self, address: u16, value: bool) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.coils.insert(address, value);
        Ok(())
    }

    fn write_multiple_coils(&mut self, address: u16, values: &[bool]) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        for (i, &value) in values.iter().enumerate() {
            state.coils.insert(address + i as u16, value);
        }
        Ok(())
    }

    fn write_single_register(&mut self, address: u16, value: u16) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.holding_registers.insert(address, value);
        state.after_holding_write();
        Ok(())
    }

    fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        for (i, &value) in values.iter().enumerate() {
            state.holding_registers.insert(address + i as u16, value);
        }
        state.after_holding_write();
        Ok(())
    }

    fn reconnect(&mut self) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        state.reconnects += 1;
        Ok(())
    }
}

/// Populate the controller registers: process image widths (in bits, in the
/// order holding/input/coil/discrete), self-test constants, identification
/// and a firmware version.
pub fn setup_controller(state: &mut MockState, identifiers: &[u16], widths: [u16; 4]) {
    state.input_registers.insert(0x1022, widths[0]);
    state.input_registers.insert(0x1023, widths[1]);
    state.input_registers.insert(0x1024, widths[2]);
    state.input_registers.insert(0x1025, widths[3]);

    for (address, value) in [
        (0x2000, 0x0000),
        (0x2001, 0xFFFF),
        (0x2002, 0x1234),
        (0x2003, 0xAAAA),
        (0x2004, 0x5555),
        (0x2005, 0x7FFF),
        (0x2006, 0x8000),
        (0x2007, 0x3FFF),
        (0x2008, 0x4000),
    ] {
        state.input_registers.insert(address, value);
    }

    state.input_registers.insert(0x2010, 1);
    state.input_registers.insert(0x2011, 750);
    state.input_registers.insert(0x2012, 881);
    state.input_registers.insert(0x2013, 1);
    state.input_registers.insert(0x2014, 7);

    for (i, &word) in identifiers.iter().enumerate() {
        state.input_registers.insert(0x2030 + i as u16, word);
    }
}
