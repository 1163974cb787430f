//! Process image cache, per-region polling and change notification.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::modbus::registers::{Bits, Words};
use crate::{ClientError, ClientResult, ModbusClient};

/// Wire base of the holding and coil spaces. Input and discrete start at 0.
/// Cache-facing addresses are always local (0-based within the space).
pub const OUTPUT_SPACE_BASE: u16 = 0x0200;

const RETRY_ATTEMPTS: u32 = 3;
const ERROR_PAUSE: Duration = Duration::from_millis(500);
const MAX_TICK_SLEEP: Duration = Duration::from_millis(100);

/// One of the four Modbus address spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Coil,
    Discrete,
    Holding,
    Input,
}

impl ChannelKind {
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Coil => "coil",
            ChannelKind::Discrete => "discrete",
            ChannelKind::Holding => "holding",
            ChannelKind::Input => "input",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity of a single cell in the process image. Listener key and callback
/// argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub kind: ChannelKind,
    pub address: u16,
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#06x}", self.kind, self.address)
    }
}

/// Value of a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelValue {
    Bit(bool),
    Word(u16),
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Bit(b) => write!(f, "{}", b),
            ChannelValue::Word(w) => write!(f, "{:#06x}", w),
        }
    }
}

/// Called from the poller context; must not block.
pub type ChangeListener = Box<dyn Fn(ChannelValue, ChannelRef) + Send>;

/// Per-space sizes. Used both for the controller-reported process image
/// widths (in bits) and for per-module channel counts (bit spaces in bits,
/// word spaces in words).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelSpec {
    pub coil: u16,
    pub discrete: u16,
    pub input: u16,
    pub holding: u16,
}

/// Refresh cadence per address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollIntervals {
    pub input: Duration,
    pub holding: Duration,
    pub discrete: Duration,
    pub coil: Duration,
}

impl PollIntervals {
    pub fn uniform(interval: Duration) -> Self {
        PollIntervals {
            input: interval,
            holding: interval,
            discrete: interval,
            coil: interval,
        }
    }

    pub fn min(&self) -> Duration {
        self.input
            .min(self.holding)
            .min(self.discrete)
            .min(self.coil)
    }
}

impl Default for PollIntervals {
    fn default() -> Self {
        PollIntervals::uniform(Duration::from_secs(1))
    }
}

/// Cached mirror of the four address spaces.
pub(crate) struct ProcessImage {
    pub input: Words,
    pub holding: Words,
    pub discrete: Bits,
    pub coil: Bits,
}

/// Everything shared between API callers and the poller: the client, the
/// image and the listener map, guarded by one mutex. The lock is held for one
/// Modbus round trip plus the cache update and callback dispatch.
pub(crate) struct ConnectionState {
    client: Box<dyn ModbusClient>,
    widths: ChannelSpec,
    image: ProcessImage,
    listeners: HashMap<ChannelRef, ChangeListener>,
}

pub(crate) type SharedState = Arc<Mutex<ConnectionState>>;

impl ConnectionState {
    fn new(client: Box<dyn ModbusClient>, widths: ChannelSpec) -> Self {
        ConnectionState {
            client,
            widths,
            image: ProcessImage {
                input: Words::zeroed(widths.input as usize / 16),
                holding: Words::zeroed(widths.holding as usize / 16),
                discrete: Bits::zeroed(widths.discrete as usize),
                coil: Bits::zeroed(widths.coil as usize),
            },
            listeners: HashMap::new(),
        }
    }

    /// Run one client call, reconnecting and retrying on transport loss.
    /// Protocol errors are surfaced immediately.
    fn with_retry<T>(
        &mut self,
        what: &str,
        mut op: impl FnMut(&mut dyn ModbusClient) -> ClientResult<T>,
    ) -> Result<T> {
        let mut message = String::new();
        for attempt in 1..=RETRY_ATTEMPTS {
            match op(self.client.as_mut()) {
                Ok(value) => return Ok(value),
                Err(ClientError::Protocol(msg)) => {
                    return Err(Error::Protocol(format!("{}: {}", what, msg)))
                }
                Err(ClientError::Disconnected(msg)) => {
                    warn!(
                        "Failed to execute {} ({}), reconnecting ({}/{})",
                        what, msg, attempt, RETRY_ATTEMPTS
                    );
                    message = msg;
                    if let Err(err) = self.client.reconnect() {
                        warn!("Reconnect failed: {}", err);
                    }
                }
            }
        }
        Err(Error::Communication {
            attempts: RETRY_ATTEMPTS,
            message: format!("{}: {}", what, message),
        })
    }

    fn input_words(&self) -> u16 {
        self.widths.input / 16
    }

    fn holding_words(&self) -> u16 {
        self.widths.holding / 16
    }

    // Region refresh. Width defaults to "address to end of the space".

    pub fn update_input_state(&mut self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        let address = address.unwrap_or(0);
        let width = width.unwrap_or_else(|| self.input_words().saturating_sub(address));
        if width == 0 {
            return Ok(());
        }
        let registers =
            self.with_retry("input state update", |c| c.read_input_registers(address, width))?;
        debug!(
            "Updating input state from {:#06x} width {}: {}",
            address,
            width,
            Words::new(&registers).to_hex()
        );
        self.apply_words(ChannelKind::Input, address, &registers);
        Ok(())
    }

    pub fn update_holding_state(&mut self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        let address = address.unwrap_or(0);
        let width = width.unwrap_or_else(|| self.holding_words().saturating_sub(address));
        if width == 0 {
            return Ok(());
        }
        let registers = self.with_retry("holding state update", |c| {
            c.read_holding_registers(OUTPUT_SPACE_BASE + address, width)
        })?;
        debug!(
            "Updating holding state from {:#06x} width {}: {}",
            address,
            width,
            Words::new(&registers).to_hex()
        );
        self.apply_words(ChannelKind::Holding, address, &registers);
        Ok(())
    }

    pub fn update_discrete_state(&mut self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        let address = address.unwrap_or(0);
        let width = width.unwrap_or_else(|| self.widths.discrete.saturating_sub(address));
        if width == 0 {
            return Ok(());
        }
        let mut bits = self.with_retry("discrete state update", |c| {
            c.read_discrete_inputs(address, width)
        })?;
        // Responses are padded to byte multiples
        bits.truncate(width as usize);
        debug!(
            "Updating discrete state from {:#06x} width {}",
            address, width
        );
        self.apply_bits(ChannelKind::Discrete, address, &bits);
        Ok(())
    }

    pub fn update_coil_state(&mut self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        let address = address.unwrap_or(0);
        let width = width.unwrap_or_else(|| self.widths.coil.saturating_sub(address));
        if width == 0 {
            return Ok(());
        }
        let mut bits = self.with_retry("coil state update", |c| {
            c.read_coils(OUTPUT_SPACE_BASE + address, width)
        })?;
        bits.truncate(width as usize);
        debug!("Updating coil state from {:#06x} width {}", address, width);
        self.apply_bits(ChannelKind::Coil, address, &bits);
        Ok(())
    }

    /// Refresh all four regions: input, holding, discrete, coil.
    pub fn update_state(&mut self) -> Result<()> {
        self.update_input_state(None, None)?;
        self.update_holding_state(None, None)?;
        self.update_discrete_state(None, None)?;
        self.update_coil_state(None, None)?;
        Ok(())
    }

    fn apply_words(&mut self, kind: ChannelKind, address: u16, new: &[u16]) {
        let image = match kind {
            ChannelKind::Input => &mut self.image.input,
            _ => &mut self.image.holding,
        };
        let mut changed = Vec::new();
        for (i, &value) in new.iter().enumerate() {
            let index = address as usize + i;
            if index >= image.width() {
                break;
            }
            if image.get(index) != value {
                image.set(index, value);
                changed.push((
                    ChannelRef {
                        kind,
                        address: index as u16,
                    },
                    ChannelValue::Word(value),
                ));
            }
        }
        self.notify(&changed);
    }

    fn apply_bits(&mut self, kind: ChannelKind, address: u16, new: &[bool]) {
        let image = match kind {
            ChannelKind::Discrete => &mut self.image.discrete,
            _ => &mut self.image.coil,
        };
        let mut changed = Vec::new();
        for (i, &value) in new.iter().enumerate() {
            let index = address as usize + i;
            if index >= image.width() {
                break;
            }
            if image.get(index) != value {
                image.set(index, value);
                changed.push((
                    ChannelRef {
                        kind,
                        address: index as u16,
                    },
                    ChannelValue::Bit(value),
                ));
            }
        }
        self.notify(&changed);
    }

    // Changes are collected in ascending address order and dispatched on the
    // refreshing context.
    fn notify(&self, changed: &[(ChannelRef, ChannelValue)]) {
        for &(channel, value) in changed {
            if let Some(listener) = self.listeners.get(&channel) {
                debug!("Value change on {}: {}", channel, value);
                listener(value, channel);
            }
        }
    }

    // Cache reads. `update` refreshes the cell(s) from the wire first.

    fn check_bounds(&self, kind: ChannelKind, address: u16, width: u16) -> Result<()> {
        let total = match kind {
            ChannelKind::Input => self.input_words(),
            ChannelKind::Holding => self.holding_words(),
            ChannelKind::Discrete => self.widths.discrete,
            ChannelKind::Coil => self.widths.coil,
        };
        if address.saturating_add(width) > total {
            return Err(Error::InvalidArgument(format!(
                "{} address {:#06x} width {} outside process image ({} cells)",
                kind, address, width, total
            )));
        }
        Ok(())
    }

    pub fn read_input_register(&mut self, address: u16, update: bool) -> Result<u16> {
        if update {
            self.update_input_state(Some(address), Some(1))?;
        }
        self.check_bounds(ChannelKind::Input, address, 1)?;
        Ok(self.image.input.get(address as usize))
    }

    pub fn read_input_registers(&mut self, address: u16, width: u16, update: bool) -> Result<Words> {
        if update {
            self.update_input_state(Some(address), Some(width))?;
        }
        self.check_bounds(ChannelKind::Input, address, width)?;
        Ok(self
            .image
            .input
            .slice(address as usize, (address + width) as usize))
    }

    pub fn read_holding_register(&mut self, address: u16, update: bool) -> Result<u16> {
        if update {
            self.update_holding_state(Some(address), Some(1))?;
        }
        self.check_bounds(ChannelKind::Holding, address, 1)?;
        Ok(self.image.holding.get(address as usize))
    }

    pub fn read_holding_registers(
        &mut self,
        address: u16,
        width: u16,
        update: bool,
    ) -> Result<Words> {
        if update {
            self.update_holding_state(Some(address), Some(width))?;
        }
        self.check_bounds(ChannelKind::Holding, address, width)?;
        Ok(self
            .image
            .holding
            .slice(address as usize, (address + width) as usize))
    }

    pub fn read_discrete_input(&mut self, address: u16, update: bool) -> Result<bool> {
        if update {
            self.update_discrete_state(Some(address), Some(1))?;
        }
        self.check_bounds(ChannelKind::Discrete, address, 1)?;
        Ok(self.image.discrete.get(address as usize))
    }

    pub fn read_discrete_inputs(&mut self, address: u16, width: u16, update: bool) -> Result<Bits> {
        if update {
            self.update_discrete_state(Some(address), Some(width))?;
        }
        self.check_bounds(ChannelKind::Discrete, address, width)?;
        Ok(self
            .image
            .discrete
            .slice(address as usize, (address + width) as usize))
    }

    pub fn read_coil(&mut self, address: u16, update: bool) -> Result<bool> {
        if update {
            self.update_coil_state(Some(address), Some(1))?;
        }
        self.check_bounds(ChannelKind::Coil, address, 1)?;
        Ok(self.image.coil.get(address as usize))
    }

    pub fn read_coils(&mut self, address: u16, width: u16, update: bool) -> Result<Bits> {
        if update {
            self.update_coil_state(Some(address), Some(width))?;
        }
        self.check_bounds(ChannelKind::Coil, address, width)?;
        Ok(self
            .image
            .coil
            .slice(address as usize, (address + width) as usize))
    }

    // Writes are write-through: the Modbus write is followed by a refresh of
    // the affected region before the lock is released.

    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<()> {
        debug!("Writing coil {:#06x} value {}", address, value);
        self.with_retry("coil write", |c| {
            c.write_single_coil(OUTPUT_SPACE_BASE + address, value)
        })?;
        self.update_coil_state(None, None)
    }

    pub fn write_coils(&mut self, address: u16, values: &[bool]) -> Result<()> {
        debug!(
            "Writing {} coils from {:#06x}: {}",
            values.len(),
            address,
            Bits::new(values).to_bin()
        );
        self.with_retry("coil write", |c| {
            c.write_multiple_coils(OUTPUT_SPACE_BASE + address, values)
        })?;
        self.update_coil_state(None, None)
    }

    pub fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        debug!("Writing register {:#06x} value {:#06x}", address, value);
        self.with_retry("register write", |c| {
            c.write_single_register(OUTPUT_SPACE_BASE + address, value)
        })?;
        self.update_holding_state(None, None)
    }

    pub fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        debug!(
            "Writing {} registers from {:#06x}: {}",
            values.len(),
            address,
            Words::new(values).to_hex()
        );
        self.with_retry("register write", |c| {
            c.write_multiple_registers(OUTPUT_SPACE_BASE + address, values)
        })?;
        self.update_holding_state(None, None)
    }

    // Controller registers outside the process image (identification words,
    // self-test constants, firmware info) bypass the cache.

    pub fn read_raw_input_registers(&mut self, address: u16, width: u16) -> Result<Words> {
        let registers = self.with_retry("controller register read", |c| {
            c.read_input_registers(address, width)
        })?;
        Ok(Words::new(&registers))
    }

    pub fn register_listener(&mut self, channel: ChannelRef, listener: ChangeListener) {
        self.listeners.insert(channel, listener);
    }

    pub fn unregister_listener(&mut self, channel: &ChannelRef) {
        self.listeners.remove(channel);
    }
}

struct Poller {
    intervals: PollIntervals,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Connection to a controller: shared cache state plus the continuous update
/// worker. Channels hold a clone of the shared state; the connection owns the
/// poller lifecycle.
pub struct ModbusConnection {
    state: SharedState,
    poller: Mutex<Poller>,
}

impl ModbusConnection {
    pub fn new(client: Box<dyn ModbusClient>, widths: ChannelSpec) -> Self {
        ModbusConnection {
            state: Arc::new(Mutex::new(ConnectionState::new(client, widths))),
            poller: Mutex::new(Poller {
                intervals: PollIntervals::default(),
                running: Arc::new(AtomicBool::new(false)),
                handle: None,
            }),
        }
    }

    pub(crate) fn shared(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn update_state(&self) -> Result<()> {
        self.state.lock().unwrap().update_state()
    }

    pub fn update_input_state(&self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        self.state.lock().unwrap().update_input_state(address, width)
    }

    pub fn update_holding_state(&self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .update_holding_state(address, width)
    }

    pub fn update_discrete_state(&self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .update_discrete_state(address, width)
    }

    pub fn update_coil_state(&self, address: Option<u16>, width: Option<u16>) -> Result<()> {
        self.state.lock().unwrap().update_coil_state(address, width)
    }

    // Cache-facing reads and write-through writes, one lock each.

    pub fn read_input_register(&self, address: u16, update: bool) -> Result<u16> {
        self.state
            .lock()
            .unwrap()
            .read_input_register(address, update)
    }

    pub fn read_input_registers(&self, address: u16, width: u16, update: bool) -> Result<Words> {
        self.state
            .lock()
            .unwrap()
            .read_input_registers(address, width, update)
    }

    pub fn read_holding_register(&self, address: u16, update: bool) -> Result<u16> {
        self.state
            .lock()
            .unwrap()
            .read_holding_register(address, update)
    }

    pub fn read_holding_registers(&self, address: u16, width: u16, update: bool) -> Result<Words> {
        self.state
            .lock()
            .unwrap()
            .read_holding_registers(address, width, update)
    }

    pub fn read_discrete_input(&self, address: u16, update: bool) -> Result<bool> {
        self.state
            .lock()
            .unwrap()
            .read_discrete_input(address, update)
    }

    pub fn read_discrete_inputs(&self, address: u16, width: u16, update: bool) -> Result<Bits> {
        self.state
            .lock()
            .unwrap()
            .read_discrete_inputs(address, width, update)
    }

    pub fn read_coil(&self, address: u16, update: bool) -> Result<bool> {
        self.state.lock().unwrap().read_coil(address, update)
    }

    pub fn read_coils(&self, address: u16, width: u16, update: bool) -> Result<Bits> {
        self.state
            .lock()
            .unwrap()
            .read_coils(address, width, update)
    }

    pub fn write_coil(&self, address: u16, value: bool) -> Result<()> {
        self.state.lock().unwrap().write_coil(address, value)
    }

    pub fn write_coils(&self, address: u16, values: &[bool]) -> Result<()> {
        self.state.lock().unwrap().write_coils(address, values)
    }

    pub fn write_register(&self, address: u16, value: u16) -> Result<()> {
        self.state.lock().unwrap().write_register(address, value)
    }

    pub fn write_registers(&self, address: u16, values: &[u16]) -> Result<()> {
        self.state.lock().unwrap().write_registers(address, values)
    }

    pub fn register_channel_callback(&self, channel: ChannelRef, listener: ChangeListener) {
        self.state
            .lock()
            .unwrap()
            .register_listener(channel, listener);
    }

    pub fn unregister_channel_callback(&self, channel: &ChannelRef) {
        self.state.lock().unwrap().unregister_listener(channel);
    }

    /// Start the continuous update worker. Use [`PollIntervals::uniform`] for
    /// a single global cadence.
    pub fn start_continuous_update(&self, intervals: PollIntervals) {
        let mut poller = self.poller.lock().unwrap();
        if poller.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Continuous update thread already running");
            return;
        }
        info!(
            "Starting continuous update (input {:?}, holding {:?}, discrete {:?}, coil {:?})",
            intervals.input, intervals.holding, intervals.discrete, intervals.coil
        );
        let running = Arc::new(AtomicBool::new(true));
        let state = Arc::clone(&self.state);
        poller.intervals = intervals;
        poller.running = Arc::clone(&running);
        poller.handle = Some(thread::spawn(move || poll_loop(state, intervals, running)));
    }

    pub fn is_continuous_update_running(&self) -> bool {
        self.poller
            .lock()
            .unwrap()
            .handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the worker, waiting up to twice the smallest interval for it to
    /// finish. A worker stuck in a Modbus call past that is abandoned.
    pub fn stop_continuous_update(&self) {
        let mut poller = self.poller.lock().unwrap();
        let Some(handle) = poller.handle.take() else {
            warn!("No continuous update thread running");
            return;
        };
        info!("Stopping continuous update thread");
        poller.running.store(false, Ordering::Relaxed);
        let deadline = Instant::now() + poller.intervals.min() * 2;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            warn!("Continuous update thread did not terminate gracefully");
        }
    }
}

impl Drop for ModbusConnection {
    fn drop(&mut self) {
        if self.is_continuous_update_running() {
            self.stop_continuous_update();
        }
    }
}

fn poll_loop(state: SharedState, intervals: PollIntervals, running: Arc<AtomicBool>) {
    debug!("Continuous state update thread started");
    let now = Instant::now();
    let mut last = [now; 4];
    let tick = (intervals.min() / 10).min(MAX_TICK_SLEEP);
    while running.load(Ordering::Relaxed) {
        if let Err(err) = poll_tick(&state, &intervals, &mut last) {
            error!("Error in continuous update thread: {}", err);
            thread::sleep(ERROR_PAUSE);
        }
        thread::sleep(tick);
    }
    debug!("Continuous state update thread finished");
}

// Regions are refreshed in fixed order: input, holding, discrete, coil.
// An error skips the remaining regions of this tick; their timestamps stay
// untouched so they are retried on the next one.
fn poll_tick(
    state: &SharedState,
    intervals: &PollIntervals,
    last: &mut [Instant; 4],
) -> Result<()> {
    let now = Instant::now();
    if now.duration_since(last[0]) >= intervals.input {
        state.lock().unwrap().update_input_state(None, None)?;
        last[0] = now;
    }
    if now.duration_since(last[1]) >= intervals.holding {
        state.lock().unwrap().update_holding_state(None, None)?;
        last[1] = now;
    }
    if now.duration_since(last[2]) >= intervals.discrete {
        state.lock().unwrap().update_discrete_state(None, None)?;
        last[2] = now;
    }
    if now.duration_since(last[3]) >= intervals.coil {
        state.lock().unwrap().update_coil_state(None, None)?;
        last[3] = now;
    }
    Ok(())
}
