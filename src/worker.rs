//! Instrument worker that owns all hardware state on its own thread.
//!
//! The worker owns the bus and every chip driver, receives UI commands over
//! a channel, and reports back as events. Nothing hardware-shaped crosses
//! the thread boundary: events carry plain data such as [`DeviceInfo`] and
//! option lists.
//!
//! `Connect` runs the whole bring-up as one pass: open the port, probe each
//! chip family's candidate addresses in discovery order, then initialize
//! every found chip in dependency order. Any fatal failure tears the
//! partial state all the way back down before the outcome is reported, so
//! the worker is always either fully connected or fully disconnected.

use std::thread::{Builder, JoinHandle};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use tracing::{debug, info, warn};

use crate::comms::{I2CComms, I2cBus};
use crate::component::gt1724::LANES_PER_CHIP;
use crate::component::{
    ChipFamily, Component, DeviceInfo, Gt1724, Lmx2594, M24m02, OptionList, Pca9557, Si5340,
};
use crate::config::InstrumentConfig;
use crate::error::{BertError, Result};

/// Commands sent to the instrument worker by the UI layer.
#[derive(Clone, Debug)]
pub enum WorkerCommand {
    /// Open the named serial port, then discover and initialize the
    /// instrument. No-op if already connected.
    Connect { port: String },
    /// Tear down all chips and release the serial port. No-op if already
    /// disconnected.
    Disconnect,
    /// Re-run chip initialization on an already-connected instrument.
    InitComponents,
    /// Emit every chip's option lists, terminated by
    /// [`WorkerEvent::OptionsSent`].
    GetOptions,
    /// Emit the current set of serial ports on the host.
    RefreshSerialPorts,
    /// Select the trigger output divide ratio on every I/O expander.
    SetTriggerDivide { index: usize },
    /// Enable or disable EEPROM writes on every I/O expander.
    SetEepromWriteEnable { enabled: bool },
    /// Shut down the worker.
    Stop,
}

/// Events emitted by the instrument worker to the UI layer.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Serial ports currently present on the host.
    SerialPorts(Vec<String>),
    /// Human-readable progress or diagnostic line.
    Message(String),
    /// A chip was discovered during connect.
    DeviceAdded(DeviceInfo),
    /// Connection state changed.
    StatusConnect(bool),
    /// Terminal outcome of the most recent command.
    Outcome(Result<()>),
    /// One option list contributed by a chip.
    OptionList(OptionList),
    /// All option lists for the current instrument have been emitted.
    OptionsSent,
    /// Synthesizer lock-detect level changed, as read through an I/O
    /// expander input pin.
    LockDetect { device_id: u8, locked: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connected,
}

/// Worker instance that runs the instrument on a dedicated thread.
pub struct BertWorker {
    config: InstrumentConfig,
    bus: Box<dyn I2cBus>,
    state: ConnectionState,

    gt1724s: Vec<Gt1724>,
    m24m02s: Vec<M24m02>,
    lmx2594s: Vec<Lmx2594>,
    pca9557s: Vec<Pca9557>,
    si5340s: Vec<Si5340>,

    /// Last lock-detect level reported, to emit edges only.
    last_lock: Option<bool>,

    cmd_rx: Receiver<WorkerCommand>,
    event_tx: Sender<WorkerEvent>,
}

impl BertWorker {
    pub fn new(
        config: InstrumentConfig,
        bus: Box<dyn I2cBus>,
        cmd_rx: Receiver<WorkerCommand>,
        event_tx: Sender<WorkerEvent>,
    ) -> Self {
        Self {
            config,
            bus,
            state: ConnectionState::Disconnected,
            gt1724s: Vec::new(),
            m24m02s: Vec::new(),
            lmx2594s: Vec::new(),
            pca9557s: Vec::new(),
            si5340s: Vec::new(),
            last_lock: None,
            cmd_rx,
            event_tx,
        }
    }

    /// Run the worker loop until shutdown, returning the owned bus.
    pub fn run(mut self) -> Box<dyn I2cBus> {
        loop {
            match self.cmd_rx.recv_timeout(self.config.tick_interval) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.tick(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Leave the hardware quiesced on the way out.
        self.disconnect();
        self.bus
    }

    /// Process a single command.
    ///
    /// Returns `false` when the worker should shut down.
    fn handle_command(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::Connect { port } => {
                if self.state == ConnectionState::Connected {
                    let _ = self.send_event(WorkerEvent::Message(
                        "Already connected to instrument".to_string(),
                    ));
                    return self.send_event(WorkerEvent::Outcome(Ok(())));
                }
                let result = self.connect(&port);
                let connected = result.is_ok();
                if connected {
                    self.state = ConnectionState::Connected;
                } else if let Err(e) = &result {
                    let _ = self
                        .send_event(WorkerEvent::Message(format!("Connect failed: {e}")));
                }
                let _ = self.send_event(WorkerEvent::StatusConnect(connected));
                self.send_event(WorkerEvent::Outcome(result))
            }
            WorkerCommand::Disconnect => {
                self.disconnect();
                let _ = self.send_event(WorkerEvent::StatusConnect(false));
                self.send_event(WorkerEvent::Outcome(Ok(())))
            }
            WorkerCommand::InitComponents => {
                let result = self.reinit();
                if result.is_err() {
                    self.disconnect();
                    let _ = self.send_event(WorkerEvent::StatusConnect(false));
                }
                self.send_event(WorkerEvent::Outcome(result))
            }
            WorkerCommand::GetOptions => {
                let result = self.send_options();
                self.send_event(WorkerEvent::Outcome(result))
            }
            WorkerCommand::RefreshSerialPorts => {
                self.send_event(WorkerEvent::SerialPorts(I2CComms::list_ports()))
            }
            WorkerCommand::SetTriggerDivide { index } => {
                let result = self.set_trigger_divide(index);
                self.send_event(WorkerEvent::Outcome(result))
            }
            WorkerCommand::SetEepromWriteEnable { enabled } => {
                let result = self.set_eeprom_write_enable(enabled);
                self.send_event(WorkerEvent::Outcome(result))
            }
            WorkerCommand::Stop => false,
        }
    }

    /// Forward an event to the UI layer.
    ///
    /// Returns `false` when the event channel has closed, which means the
    /// UI is gone and the worker should shut down.
    fn send_event(&self, event: WorkerEvent) -> bool {
        self.event_tx.send(event).is_ok()
    }

    /// Periodic status poll while connected.
    fn tick(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        // Lock detect is wired to the master board's expander.
        if let Some(pca) = self.pca9557s.first_mut() {
            match pca.read_lock_detect(self.bus.as_mut()) {
                Ok(locked) => {
                    if self.last_lock != Some(locked) {
                        self.last_lock = Some(locked);
                        let _ = self.event_tx.send(WorkerEvent::LockDetect {
                            device_id: 0,
                            locked,
                        });
                    }
                }
                Err(e) => warn!("Lock detect poll failed: {e}"),
            }
        }
    }

    /// Full bring-up: open the port, discover, initialize. On any fatal
    /// failure the partial state is torn down before the error propagates.
    fn connect(&mut self, port: &str) -> Result<()> {
        self.bus.open(port)?;
        info!("Opened adaptor on {port}");
        let _ = self.send_event(WorkerEvent::Message(format!("Connected to {port}")));

        let result = self
            .find_components()
            .and_then(|_| self.init_components());
        if let Err(e) = result {
            warn!("Instrument bring-up failed: {e}");
            self.shutdown_components();
            self.bus.close();
            return Err(e);
        }
        self.last_lock = None;
        Ok(())
    }

    /// Tear down every chip and release the port. Safe to call in any state.
    fn disconnect(&mut self) {
        if self.state == ConnectionState::Connected {
            info!("Disconnecting from instrument");
        }
        self.shutdown_components();
        self.bus.close();
        self.state = ConnectionState::Disconnected;
        self.last_lock = None;
    }

    /// Probe each family's candidate addresses in discovery order and build
    /// the driver arena.
    ///
    /// Discovery order is GT1724, M24M02, LMX2594, PCA9557, SI5340. A
    /// family with no devices found aborts immediately when mandatory; the
    /// SI5340 is fitted on selected models only and its absence is just
    /// reported.
    fn find_components(&mut self) -> Result<()> {
        for address in self.config.gt1724_addresses.clone() {
            if Gt1724::ping(self.bus.as_mut(), address) {
                let device_id = self.gt1724s.len() as u8;
                let chip = Gt1724::new(address, device_id, device_id * LANES_PER_CHIP);
                self.report_found(chip.info());
                self.gt1724s.push(chip);
            }
        }
        self.require_found(ChipFamily::Gt1724, self.gt1724s.len())?;

        for address in self.config.m24m02_addresses.clone() {
            if M24m02::ping(self.bus.as_mut(), address) {
                let chip = M24m02::new(address, self.m24m02s.len() as u8);
                self.report_found(chip.info());
                self.m24m02s.push(chip);
            }
        }
        self.require_found(ChipFamily::M24m02, self.m24m02s.len())?;

        for address in self.config.lmx2594_addresses.clone() {
            if Lmx2594::ping(self.bus.as_mut(), address) {
                let device_id = self.lmx2594s.len() as u8;
                // Each synthesizer reads its clock profiles from the EEPROM
                // on the same board.
                let eeprom = self
                    .m24m02s
                    .get(device_id as usize)
                    .map(|e| e.address());
                let chip = Lmx2594::new(address, device_id, eeprom);
                self.report_found(chip.info());
                self.lmx2594s.push(chip);
            }
        }
        self.require_found(ChipFamily::Lmx2594, self.lmx2594s.len())?;

        for address in self.config.pca9557_addresses.clone() {
            if Pca9557::ping(self.bus.as_mut(), address) {
                let chip = Pca9557::new(address, self.pca9557s.len() as u8);
                self.report_found(chip.info());
                self.pca9557s.push(chip);
            }
        }
        self.require_found(ChipFamily::Pca9557, self.pca9557s.len())?;

        for address in self.config.si5340_addresses.clone() {
            if Si5340::ping(self.bus.as_mut(), address) {
                let chip = Si5340::new(address, self.si5340s.len() as u8);
                self.report_found(chip.info());
                self.si5340s.push(chip);
            }
        }
        if self.si5340s.is_empty() {
            warn!("No SI5340 reference clock found; assuming external reference");
            let _ = self.send_event(WorkerEvent::Message(
                "SI5340 reference clock not fitted on this instrument".to_string(),
            ));
        }

        Ok(())
    }

    fn report_found(&self, info: DeviceInfo) {
        info!(
            "Found {} {} at address 0x{:02X}",
            info.family, info.device_id, info.address
        );
        let _ = self.send_event(WorkerEvent::Message(format!(
            "Found {} at address 0x{:02X}",
            info.family, info.address
        )));
        let _ = self.send_event(WorkerEvent::DeviceAdded(info));
    }

    fn require_found(&self, family: ChipFamily, count: usize) -> Result<()> {
        if count == 0 && family.is_mandatory() {
            return Err(BertError::Missing(family));
        }
        Ok(())
    }

    /// Initialize every discovered chip in dependency order: reference
    /// clock, then EEPROM, then synthesizer, then I/O expander, then the
    /// BERT cores. The first failure aborts.
    fn init_components(&mut self) -> Result<()> {
        for chip in &mut self.si5340s {
            chip.init(self.bus.as_mut())?;
        }
        for chip in &mut self.m24m02s {
            chip.init(self.bus.as_mut())?;
        }
        for chip in &mut self.lmx2594s {
            chip.init(self.bus.as_mut())?;
        }
        for chip in &mut self.pca9557s {
            chip.init(self.bus.as_mut())?;
        }
        for chip in &mut self.gt1724s {
            chip.init(self.bus.as_mut())?;
        }
        info!("Instrument initialization complete");
        Ok(())
    }

    /// Re-run initialization on a connected instrument.
    fn reinit(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(BertError::NotConnected);
        }
        self.last_lock = None;
        self.init_components()
    }

    /// Drop every driver, in reverse of initialization order.
    fn shutdown_components(&mut self) {
        for chip in self.gt1724s.drain(..).rev() {
            debug!("Shutting down {} {}", chip.family(), chip.device_id());
        }
        for chip in self.pca9557s.drain(..).rev() {
            debug!("Shutting down {} {}", chip.family(), chip.device_id());
        }
        for chip in self.lmx2594s.drain(..).rev() {
            debug!("Shutting down {} {}", chip.family(), chip.device_id());
        }
        for chip in self.m24m02s.drain(..).rev() {
            debug!("Shutting down {} {}", chip.family(), chip.device_id());
        }
        for chip in self.si5340s.drain(..).rev() {
            debug!("Shutting down {} {}", chip.family(), chip.device_id());
        }
    }

    /// Emit every option list the instrument's chips contribute.
    ///
    /// Lane-scoped lists come from every BERT core; instrument-wide lists
    /// come from one representative of each remaining family.
    fn send_options(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(BertError::NotConnected);
        }
        let mut lists: Vec<OptionList> = Vec::new();
        for chip in &self.gt1724s {
            lists.extend(chip.options());
        }
        if let Some(chip) = self.lmx2594s.first() {
            lists.extend(chip.options());
        }
        if let Some(chip) = self.pca9557s.first() {
            lists.extend(chip.options());
        }
        if let Some(chip) = self.si5340s.first() {
            lists.extend(chip.options());
        }
        for list in lists {
            let _ = self.send_event(WorkerEvent::OptionList(list));
        }
        let _ = self.send_event(WorkerEvent::OptionsSent);
        Ok(())
    }

    fn set_trigger_divide(&mut self, index: usize) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(BertError::NotConnected);
        }
        for chip in &mut self.pca9557s {
            chip.select_trigger_divide(self.bus.as_mut(), index)?;
        }
        Ok(())
    }

    fn set_eeprom_write_enable(&mut self, enabled: bool) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(BertError::NotConnected);
        }
        for chip in &mut self.pca9557s {
            chip.set_eeprom_write_enable(self.bus.as_mut(), enabled)?;
        }
        Ok(())
    }
}

/// Transmission channel and join handle for a running instrument worker.
pub struct BertWorkerHandle {
    pub cmd_tx: Sender<WorkerCommand>,
    thread: JoinHandle<Box<dyn I2cBus>>,
}

impl BertWorkerHandle {
    /// Spin up a worker on its own thread, talking to real hardware through
    /// the serial adaptor.
    pub fn spawn(config: InstrumentConfig, event_tx: Sender<WorkerEvent>) -> Self {
        let bus = Box::new(I2CComms::new(config.baud_rate, config.comms_timeout));
        Self::spawn_with_bus(config, bus, event_tx)
    }

    /// Spin up a worker over an arbitrary bus implementation (used for
    /// hardware-out-of-the-loop testing).
    pub fn spawn_with_bus(
        config: InstrumentConfig,
        bus: Box<dyn I2cBus>,
        event_tx: Sender<WorkerEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let worker = BertWorker::new(config, bus, cmd_rx, event_tx);
        let thread = Builder::new()
            .name("bert-worker".to_string())
            .spawn(move || worker.run())
            .expect("Failed to spawn instrument worker thread");
        Self { cmd_tx, thread }
    }

    /// Request shutdown and wait for the worker thread to complete.
    pub fn stop(self) -> std::result::Result<Box<dyn I2cBus>, String> {
        let _ = self.cmd_tx.send(WorkerCommand::Stop);
        self.join()
    }

    /// Wait for the worker thread to complete.
    pub fn join(self) -> std::result::Result<Box<dyn I2cBus>, String> {
        self.thread
            .join()
            .map_err(|_| "Instrument worker thread panicked".to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::comms::mockup::{BusOp, MockBus, MockDevice};
    use std::time::Duration;

    /// Drive the worker and collect events until the next `Outcome`.
    fn recv_until_outcome(event_rx: &Receiver<WorkerEvent>) -> (Vec<WorkerEvent>, Result<()>) {
        let mut events = Vec::new();
        loop {
            let event = event_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("worker did not report an outcome");
            match event {
                WorkerEvent::Outcome(result) => return (events, result),
                other => events.push(other),
            }
        }
    }

    fn connect(
        handle: &BertWorkerHandle,
        event_rx: &Receiver<WorkerEvent>,
    ) -> (Vec<WorkerEvent>, Result<()>) {
        handle
            .cmd_tx
            .send(WorkerCommand::Connect {
                port: "mock".to_string(),
            })
            .unwrap();
        recv_until_outcome(event_rx)
    }

    #[test]
    fn test_connect_discovers_in_order_and_inits_in_dependency_order() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        let (events, result) = connect(&handle, &event_rx);
        assert!(result.is_ok());

        // Discovery reports families in probe order.
        let families: Vec<ChipFamily> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::DeviceAdded(info) => Some(info.family),
                _ => None,
            })
            .collect();
        assert_eq!(
            families,
            vec![
                ChipFamily::Gt1724,
                ChipFamily::M24m02,
                ChipFamily::Lmx2594,
                ChipFamily::Pca9557,
                ChipFamily::Si5340,
            ]
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::StatusConnect(true))));

        // Pings happen only during discovery, so past the last ping (and
        // its readback, which targets the reference clock, the first family
        // to init anyway) everything is init traffic. The first operation
        // per address then orders the init phases: reference clock, EEPROM,
        // synthesizer, expander, BERT core.
        let ops = probe.ops();
        let last_ping = ops
            .iter()
            .rposition(|op| matches!(op, BusOp::Ping { .. }))
            .expect("no discovery pings recorded");
        let init_addrs: Vec<u8> = ops[last_ping + 1..].iter().map(|op| op.address()).collect();
        let first_op = |addr: u8| init_addrs.iter().position(|&a| a == addr);
        let si = first_op(0x76).expect("SI5340 never initialized");
        let m24 = first_op(0x50).expect("M24M02 never initialized");
        let lmx = first_op(0x28).expect("LMX2594 never initialized");
        let pca = first_op(0x1C).expect("PCA9557 never initialized");
        let gt = first_op(0x12).expect("GT1724 never initialized");
        assert!(si < m24 && m24 < lmx && lmx < pca && pca < gt);

        handle.stop().unwrap();
    }

    #[test]
    fn test_connect_fails_when_mandatory_family_missing() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        for &addr in &config.gt1724_addresses {
            bus.remove_device(addr);
        }
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        let (events, result) = connect(&handle, &event_rx);
        assert!(matches!(result, Err(BertError::Missing(ChipFamily::Gt1724))));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::StatusConnect(false))));
        // Teardown released the port.
        assert!(!probe.is_open());

        handle.stop().unwrap();
    }

    #[test]
    fn test_init_failure_aborts_sequence_and_tears_down() {
        let config = InstrumentConfig::pixie();
        let lmx_addr = config.lmx2594_addresses[0];
        let pca_addr = config.pca9557_addresses[0];
        let gt_addr = config.gt1724_addresses[0];
        let bus = MockBus::standard_instrument(&config);
        // The synthesizer NAKs its first profile register write.
        bus.add_device(lmx_addr, MockDevice::new().fail_write(0x70, 1));
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        let (events, result) = connect(&handle, &event_rx);
        assert!(matches!(
            result,
            Err(BertError::Nak { address, .. }) if address == lmx_addr
        ));
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::StatusConnect(false))));
        // Teardown released the port, and the families after the
        // synthesizer were never initialized.
        assert!(!probe.is_open());
        assert_eq!(probe.register(pca_addr, 0x03), Some(0x00));
        assert_eq!(probe.register(gt_addr, 0x10), Some(0x00));

        handle.stop().unwrap();
    }

    #[test]
    fn test_init_components_reruns_initialization_when_connected() {
        let config = InstrumentConfig::pixie();
        let si_addr = config.si5340_addresses[0];
        let gt_addr = config.gt1724_addresses[0];
        let bus = MockBus::standard_instrument(&config);
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        // Rejected while disconnected.
        handle.cmd_tx.send(WorkerCommand::InitComponents).unwrap();
        let (_, result) = recv_until_outcome(&event_rx);
        assert!(matches!(result, Err(BertError::NotConnected)));

        assert!(connect(&handle, &event_rx).1.is_ok());
        probe.clear_ops();
        handle.cmd_tx.send(WorkerCommand::InitComponents).unwrap();
        let (_, result) = recv_until_outcome(&event_rx);
        assert!(result.is_ok());

        // The whole init sequence ran again, reference clock first through
        // BERT core last.
        let writes: Vec<u8> = probe
            .ops()
            .iter()
            .filter_map(|op| match op {
                BusOp::Write { address, .. } => Some(*address),
                _ => None,
            })
            .collect();
        assert_eq!(writes.first(), Some(&si_addr));
        assert_eq!(writes.last(), Some(&gt_addr));

        handle.stop().unwrap();
    }

    #[test]
    fn test_disconnect_is_idempotent_and_reconnect_reopens() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        assert!(connect(&handle, &event_rx).1.is_ok());

        for _ in 0..2 {
            handle.cmd_tx.send(WorkerCommand::Disconnect).unwrap();
            let (events, result) = recv_until_outcome(&event_rx);
            assert!(result.is_ok());
            assert!(events
                .iter()
                .any(|e| matches!(e, WorkerEvent::StatusConnect(false))));
        }
        assert!(!probe.is_open());

        assert!(connect(&handle, &event_rx).1.is_ok());
        assert_eq!(probe.open_count(), 2);

        handle.stop().unwrap();
    }

    #[test]
    fn test_connect_while_connected_is_a_no_op() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        assert!(connect(&handle, &event_rx).1.is_ok());
        assert!(connect(&handle, &event_rx).1.is_ok());
        assert_eq!(probe.open_count(), 1);

        handle.stop().unwrap();
    }

    #[test]
    fn test_missing_reference_clock_is_only_a_warning() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        for &addr in &config.si5340_addresses {
            bus.remove_device(addr);
        }
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        let (events, result) = connect(&handle, &event_rx);
        assert!(result.is_ok());
        assert!(events
            .iter()
            .any(|e| matches!(e, WorkerEvent::StatusConnect(true))));
        assert!(!events.iter().any(|e| matches!(
            e,
            WorkerEvent::DeviceAdded(DeviceInfo {
                family: ChipFamily::Si5340,
                ..
            })
        )));
        assert!(events.iter().any(
            |e| matches!(e, WorkerEvent::Message(m) if m.contains("SI5340"))
        ));

        handle.stop().unwrap();
    }

    #[test]
    fn test_lane_offsets_stay_dense_across_missing_chips() {
        let config = InstrumentConfig::default();
        let bus = MockBus::standard_instrument(&config);
        // Second candidate address does not answer.
        bus.remove_device(config.gt1724_addresses[1]);
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        let (events, result) = connect(&handle, &event_rx);
        assert!(result.is_ok());

        let offsets: Vec<Option<u8>> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::DeviceAdded(info) if info.family == ChipFamily::Gt1724 => {
                    Some(info.lane_offset)
                }
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![Some(0), Some(4), Some(8)]);

        handle.stop().unwrap();
    }

    #[test]
    fn test_options_require_connection_then_cover_every_core() {
        let config = InstrumentConfig::pixie();
        let bus = MockBus::standard_instrument(&config);
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        handle.cmd_tx.send(WorkerCommand::GetOptions).unwrap();
        let (_, result) = recv_until_outcome(&event_rx);
        assert!(matches!(result, Err(BertError::NotConnected)));

        assert!(connect(&handle, &event_rx).1.is_ok());
        handle.cmd_tx.send(WorkerCommand::GetOptions).unwrap();
        let (events, result) = recv_until_outcome(&event_rx);
        assert!(result.is_ok());

        let names: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                WorkerEvent::OptionList(list) => Some(list.name.as_str()),
                _ => None,
            })
            .collect();
        assert!(names.contains(&"listPGPattern"));
        assert!(names.contains(&"listLMXTrigOutDivRatio"));
        assert!(names.contains(&"listRefClockFreq"));
        assert!(matches!(events.last(), Some(WorkerEvent::OptionsSent)));

        handle.stop().unwrap();
    }

    #[test]
    fn test_trigger_divide_reaches_the_expander() {
        let config = InstrumentConfig::pixie();
        let pca_addr = config.pca9557_addresses[0];
        let bus = MockBus::standard_instrument(&config);
        let probe = bus.clone();
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        assert!(connect(&handle, &event_rx).1.is_ok());
        handle
            .cmd_tx
            .send(WorkerCommand::SetTriggerDivide { index: 1 })
            .unwrap();
        let (_, result) = recv_until_outcome(&event_rx);
        assert!(result.is_ok());

        // Init leaves output 0xC4; divide 1/4 swaps the trigger field for
        // 0x80 while leaving EEPROM write-control untouched.
        assert_eq!(probe.register(pca_addr, 0x01), Some(0x84));

        handle.stop().unwrap();
    }

    #[test]
    fn test_tick_reports_lock_detect_edges() {
        let mut config = InstrumentConfig::pixie();
        config.tick_interval = Duration::from_millis(10);
        let bus = MockBus::standard_instrument(&config);
        let (event_tx, event_rx) = unbounded();
        let handle = BertWorkerHandle::spawn_with_bus(config, Box::new(bus), event_tx);

        assert!(connect(&handle, &event_rx).1.is_ok());

        // First poll reports the initial level (high on the mock).
        loop {
            match event_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                WorkerEvent::LockDetect { device_id, locked } => {
                    assert_eq!(device_id, 0);
                    assert!(locked);
                    break;
                }
                _ => continue,
            }
        }

        handle.stop().unwrap();
    }
}
