//! Test support utilities - only compiled in test builds.

use core::cell::RefCell;

use crate::{
    Error,
    bus::{
        Address, BusResult, Completion, TwiMaster,
        port::{
            Acknowledge, MasterCommand, MasterPort, MasterStatus, SlaveCommand, SlavePort,
            SlaveStatus,
        },
    },
    module::metadata::{HEADER, NAME_LEN, NAME_OFFSET, RESPONSE_PREFIX, STATUS_OFFSET},
};

/// Scratch size reported by [`MockMaster`].
pub const MOCK_CAPACITY: usize = 32;
const IMAGE_LEN: usize = 64;

pub fn addr(raw: u8) -> Address {
    Address::new(raw).unwrap()
}

/// Identity block of a module with status Active and Operational set.
pub fn module_image(signature: u8, id: u8, name: &[u8]) -> [u8; 14] {
    let mut image = [0u8; 14];
    image[..2].copy_from_slice(&HEADER);
    image[2] = signature;
    image[3] = id;
    let n = name.len().min(NAME_LEN);
    image[NAME_OFFSET..NAME_OFFSET + n].copy_from_slice(&name[..n]);
    image[STATUS_OFFSET] = 0b11;
    image
}

// ---------------------------------------------------------------------------
// Mock master
// ---------------------------------------------------------------------------

/// Operation recorded by [`MockMaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOp {
    Probe(Address),
    Write { address: Address, len: usize },
    Read { address: Address, len: usize },
    WriteRead { address: Address, len: usize },
    WriteRegister { address: Address, register: u8, len: usize },
    ReadRegister { address: Address, register: u8, len: usize },
}

struct Device {
    address: Address,
    image: heapless::Vec<u8, IMAGE_LEN>,
    /// Reads start with the protocol prefix byte.
    prefixed: bool,
}

impl Device {
    fn response(&self, register: usize, len: usize) -> heapless::Vec<u8, MOCK_CAPACITY> {
        let mut out = heapless::Vec::new();
        if self.prefixed {
            let _ = out.push(RESPONSE_PREFIX);
        }
        let body = self.image.get(register..).unwrap_or(&[]);
        for &b in body.iter().chain(core::iter::repeat(&0)) {
            if out.is_full() || (len != 0 && out.len() >= len) {
                break;
            }
            let _ = out.push(b);
            if len == 0 && b == 0 {
                break;
            }
        }
        out
    }

    fn store(&mut self, register: usize, data: &[u8]) {
        if register >= self.image.len() {
            return;
        }
        let end = (register + data.len()).min(self.image.len());
        self.image[register..end].copy_from_slice(&data[..end - register]);
    }
}

#[derive(Default)]
struct MockState {
    devices: heapless::Vec<Device, 8>,
    ops: heapless::Vec<MockOp, 256>,
    result: BusResult,
    completion: Option<Completion>,
    held: Option<Completion>,
    hold: bool,
    fail: usize,
    rx: heapless::Vec<u8, MOCK_CAPACITY>,
}

/// [`TwiMaster`] that completes every operation synchronously against
/// simulated peripheral images.
#[derive(Default)]
pub struct MockMaster {
    state: RefCell<MockState>,
}

impl MockMaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a module whose reads are prefixed with the protocol byte.
    pub fn attach(&self, address: Address, image: &[u8]) {
        self.attach_device(address, image, true);
    }

    /// Attaches a foreign device that answers reads with `image` as is.
    pub fn attach_raw(&self, address: Address, image: &[u8]) {
        self.attach_device(address, image, false);
    }

    fn attach_device(&self, address: Address, image: &[u8], prefixed: bool) {
        let device = Device {
            address,
            image: heapless::Vec::from_slice(image).unwrap(),
            prefixed,
        };
        let mut state = self.state.borrow_mut();
        state.devices.retain(|d| d.address != address);
        assert!(state.devices.push(device).is_ok(), "too many devices");
    }

    pub fn detach(&self, address: Address) {
        self.state.borrow_mut().devices.retain(|d| d.address != address);
    }

    pub fn image(&self, address: Address) -> heapless::Vec<u8, IMAGE_LEN> {
        let state = self.state.borrow();
        let device = state.devices.iter().find(|d| d.address == address).unwrap();
        device.image.clone()
    }

    /// Changes a device image behind the master's back.
    pub fn image_write(&self, address: Address, offset: usize, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.address == address)
            .unwrap();
        device.store(offset, data);
    }

    /// Fails the next `count` operations with [`BusResult::NackReceived`].
    pub fn fail_next(&self, count: usize) {
        self.state.borrow_mut().fail = count;
    }

    /// While held, operations stay pending until [`release`](MockMaster::release).
    pub fn hold(&self, hold: bool) {
        self.state.borrow_mut().hold = hold;
    }

    pub fn release(&self) {
        let mut state = self.state.borrow_mut();
        state.hold = false;
        if let Some(completion) = state.held.take() {
            state.result = completion.result;
            state.completion = Some(completion);
        }
    }

    pub fn ops(&self) -> heapless::Vec<MockOp, 256> {
        self.state.borrow().ops.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().ops.clear();
    }

    pub fn probes(&self) -> usize {
        self.count(|op| matches!(op, MockOp::Probe(_)))
    }

    pub fn register_reads(&self) -> usize {
        self.count(|op| matches!(op, MockOp::ReadRegister { .. }))
    }

    pub fn writes(&self) -> usize {
        self.count(|op| matches!(op, MockOp::Write { .. } | MockOp::WriteRegister { .. }))
    }

    fn count(&self, f: impl Fn(&MockOp) -> bool) -> usize {
        self.state.borrow().ops.iter().filter(|op| f(op)).count()
    }

    fn run(
        &self,
        address: Address,
        op: MockOp,
        f: impl FnOnce(Option<&mut Device>, &mut heapless::Vec<u8, MOCK_CAPACITY>) -> BusResult,
    ) -> Result<(), Error> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        if state.result.is_pending() {
            return Err(Error::Busy);
        }
        let _ = state.ops.push(op);
        state.rx.clear();
        state.completion = None;

        let device = state.devices.iter_mut().find(|d| d.address == address);
        let result = if state.fail > 0 {
            state.fail -= 1;
            BusResult::NackReceived
        } else {
            f(device, &mut state.rx)
        };

        let completion = Completion {
            address,
            result,
            received: state.rx.len(),
        };
        if state.hold {
            state.result = BusResult::Wait;
            state.held = Some(completion);
        } else {
            state.result = result;
            state.completion = Some(completion);
        }
        Ok(())
    }
}

fn check_len(len: usize) -> Result<(), Error> {
    if len > MOCK_CAPACITY {
        Err(Error::CapacityExceeded)
    } else {
        Ok(())
    }
}

impl TwiMaster for MockMaster {
    fn probe_address(&self, address: Address) -> Result<(), Error> {
        self.run(address, MockOp::Probe(address), |device, _| match device {
            Some(_) => BusResult::Success,
            None => BusResult::NoResponse,
        })
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }
        check_len(data.len())?;
        let op = MockOp::Write {
            address,
            len: data.len(),
        };
        self.run(address, op, |device, _| match device {
            Some(device) => {
                device.store(data[0] as usize, &data[1..]);
                BusResult::Success
            }
            None => BusResult::NoResponse,
        })
    }

    fn write_until_nul(&self, address: Address, data: &[u8]) -> Result<(), Error> {
        let end = data
            .iter()
            .position(|&b| b == 0)
            .map_or(data.len(), |nul| nul + 1);
        self.write_bytes(address, &data[..end])
    }

    fn read_bytes(&self, address: Address, len: usize) -> Result<(), Error> {
        check_len(len)?;
        self.run(address, MockOp::Read { address, len }, |device, rx| {
            match device {
                Some(device) => {
                    *rx = device.response(0, len);
                    BusResult::Success
                }
                None => BusResult::NoResponse,
            }
        })
    }

    fn write_then_read(&self, address: Address, data: &[u8], len: usize) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }
        check_len(len)?;
        self.run(address, MockOp::WriteRead { address, len }, |device, rx| {
            match device {
                Some(device) => {
                    device.store(data[0] as usize, &data[1..]);
                    *rx = device.response(data[0] as usize, len);
                    BusResult::Success
                }
                None => BusResult::NoResponse,
            }
        })
    }

    fn write_to_address(&self, address: Address, register: u8, data: &[u8]) -> Result<(), Error> {
        check_len(data.len() + 1)?;
        let op = MockOp::WriteRegister {
            address,
            register,
            len: data.len(),
        };
        self.run(address, op, |device, _| match device {
            Some(device) => {
                device.store(register as usize, data);
                BusResult::Success
            }
            None => BusResult::NoResponse,
        })
    }

    fn read_from_address(&self, address: Address, register: u8, len: usize) -> Result<(), Error> {
        check_len(len)?;
        let op = MockOp::ReadRegister {
            address,
            register,
            len,
        };
        self.run(address, op, |device, rx| match device {
            Some(device) => {
                *rx = device.response(register as usize, len);
                BusResult::Success
            }
            None => BusResult::NoResponse,
        })
    }

    fn result(&self) -> BusResult {
        self.state.borrow().result
    }

    fn take_completion(&self) -> Option<Completion> {
        self.state.borrow_mut().completion.take()
    }

    fn read_received(&self, skip: usize, out: &mut [u8]) -> usize {
        let state = self.state.borrow();
        let src = state.rx.get(skip..).unwrap_or(&[]);
        let n = src.len().min(out.len());
        out[..n].copy_from_slice(&src[..n]);
        n
    }

    fn capacity(&self) -> usize {
        MOCK_CAPACITY
    }
}

// ---------------------------------------------------------------------------
// Scripted ports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterPortOp {
    Start(u8),
    Write(u8),
    Command(Acknowledge, MasterCommand),
}

/// Master port whose status and received byte are set by the test.
pub struct ScriptedMasterPort {
    pub status: MasterStatus,
    pub rx_byte: u8,
    pub log: heapless::Vec<MasterPortOp, 64>,
}

impl Default for ScriptedMasterPort {
    fn default() -> Self {
        Self {
            status: MasterStatus::empty(),
            rx_byte: 0,
            log: heapless::Vec::new(),
        }
    }
}

impl MasterPort for ScriptedMasterPort {
    fn status(&mut self) -> MasterStatus {
        self.status
    }

    fn start(&mut self, address_byte: u8) {
        let _ = self.log.push(MasterPortOp::Start(address_byte));
    }

    fn write_data(&mut self, byte: u8) {
        let _ = self.log.push(MasterPortOp::Write(byte));
    }

    fn read_data(&mut self) -> u8 {
        self.rx_byte
    }

    fn command(&mut self, ack: Acknowledge, command: MasterCommand) {
        let _ = self.log.push(MasterPortOp::Command(ack, command));
    }

    fn bus_idle(&mut self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlavePortOp {
    Write(u8),
    Respond(Acknowledge, SlaveCommand),
}

/// Slave port whose status and received byte are set by the test.
pub struct ScriptedSlavePort {
    pub status: SlaveStatus,
    pub rx_byte: u8,
    /// Last byte handed to the port for sending.
    pub tx_byte: u8,
    pub enabled: bool,
    pub address: Option<Address>,
    pub log: heapless::Vec<SlavePortOp, 128>,
}

impl Default for ScriptedSlavePort {
    fn default() -> Self {
        Self {
            status: SlaveStatus::empty(),
            rx_byte: 0,
            tx_byte: 0,
            enabled: false,
            address: None,
            log: heapless::Vec::new(),
        }
    }
}

impl SlavePort for ScriptedSlavePort {
    fn status(&mut self) -> SlaveStatus {
        self.status
    }

    fn read_data(&mut self) -> u8 {
        self.rx_byte
    }

    fn write_data(&mut self, byte: u8) {
        self.tx_byte = byte;
        let _ = self.log.push(SlavePortOp::Write(byte));
    }

    fn respond(&mut self, ack: Acknowledge, command: SlaveCommand) {
        let _ = self.log.push(SlavePortOp::Respond(ack, command));
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn set_address(&mut self, address: Address) {
        self.address = Some(address);
    }
}
