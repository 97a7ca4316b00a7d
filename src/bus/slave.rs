use core::cell::RefCell;

use critical_section::Mutex;

use crate::{
    Error,
    bus::{
        Address, SlaveEvent, SlaveResult, TransferDirection,
        port::{Acknowledge, SlaveCommand, SlavePort, SlaveStatus},
    },
    helpers::union_range,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlaveState {
    Idle,
    Transaction(TransferDirection),
}

/// How the send buffer is addressed by the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageMode {
    /// Every read starts at byte 0 of the send buffer.
    Plain,
    /// The send buffer is a fixed prefix followed by a register image.
    /// The first byte of each master write selects a register pointer.
    Registers { prefix: usize },
}

/// Mutable view of the register image handed out by [`BusSlave::with_image`].
pub struct RegisterImage<'a> {
    body: &'a mut [u8],
    written: &'a mut Option<(usize, usize)>,
}

impl RegisterImage<'_> {
    /// Image bytes after the prefix.
    pub fn body(&self) -> &[u8] {
        &*self.body
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut *self.body
    }

    /// Returns and clears the range written by the master since the last call.
    pub fn take_written(&mut self) -> Option<(usize, usize)> {
        self.written.take()
    }
}

struct SlaveInner<P, const N: usize> {
    port: P,
    state: SlaveState,
    result: SlaveResult,
    mode: ImageMode,
    send: Option<heapless::Vec<u8, N>>,
    receive: Option<heapless::Vec<u8, N>>,
    receive_capacity: usize,
    cursor: usize,
    resent: bool,
    pointer: usize,
    written: Option<(usize, usize)>,
    event: Option<SlaveEvent>,
    last: Option<SlaveEvent>,
    enabled: bool,
}

impl<P: SlavePort, const N: usize> SlaveInner<P, N> {
    fn service(&mut self) {
        let status = self.port.status();
        if status.intersects(SlaveStatus::COLLISION | SlaveStatus::BUS_ERROR) {
            self.state = SlaveState::Idle;
            self.pointer = 0;
            self.result = SlaveResult::Error;
            self.port.respond(Acknowledge::Ack, SlaveCommand::Complete);
        } else if status.contains(SlaveStatus::ADDRESS_INTERRUPT) {
            self.on_address(status);
        } else if status.contains(SlaveStatus::DATA_INTERRUPT) {
            self.on_data(status);
        }
    }

    fn on_address(&mut self, status: SlaveStatus) {
        // Stop or repeated start closes the running transaction.
        if let SlaveState::Transaction(direction) = self.state {
            self.finalize(direction);
        }

        if !status.contains(SlaveStatus::ADDRESS_MATCH) {
            self.state = SlaveState::Idle;
            self.pointer = 0;
            self.port.respond(Acknowledge::Ack, SlaveCommand::Complete);
            return;
        }

        let direction = if status.contains(SlaveStatus::READ) {
            TransferDirection::Send
        } else {
            TransferDirection::Receive
        };
        self.state = SlaveState::Transaction(direction);
        self.cursor = 0;
        self.resent = false;
        self.result = SlaveResult::Wait;
        if direction == TransferDirection::Receive {
            if let Some(rx) = self.receive.as_mut() {
                rx.clear();
            }
        }
        // Always acknowledge our address, even without buffers.
        self.port.respond(Acknowledge::Ack, SlaveCommand::Response);
    }

    fn on_data(&mut self, status: SlaveStatus) {
        match self.state {
            SlaveState::Transaction(TransferDirection::Send) => {
                if self.cursor > 0 && status.contains(SlaveStatus::RX_NACK) && !self.resent {
                    self.cursor -= 1;
                    self.resent = true;
                }
                let byte = self.send_byte(self.cursor);
                self.cursor = self.cursor.saturating_add(1);
                self.port.write_data(byte);
                self.port.respond(Acknowledge::Ack, SlaveCommand::Response);
            }
            SlaveState::Transaction(TransferDirection::Receive) => {
                let byte = self.port.read_data();
                let capacity = self.receive_capacity;
                let stored = match self.receive.as_mut() {
                    Some(rx) if rx.len() < capacity => rx.push(byte).is_ok(),
                    _ => false,
                };
                if stored {
                    self.cursor += 1;
                    self.port.respond(Acknowledge::Ack, SlaveCommand::Response);
                } else {
                    self.result = SlaveResult::NackSent;
                    self.port.respond(Acknowledge::Nack, SlaveCommand::Complete);
                }
            }
            SlaveState::Idle => self.port.respond(Acknowledge::Nack, SlaveCommand::Complete),
        }
    }

    fn send_byte(&self, index: usize) -> u8 {
        let Some(image) = self.send.as_ref() else {
            return 0;
        };
        let at = match self.mode {
            ImageMode::Plain => index,
            ImageMode::Registers { prefix } if index < prefix => index,
            ImageMode::Registers { .. } => index + self.pointer,
        };
        // Zero past the end.
        image.get(at).copied().unwrap_or(0)
    }

    fn finalize(&mut self, direction: TransferDirection) {
        if direction == TransferDirection::Receive {
            if let ImageMode::Registers { prefix } = self.mode {
                self.apply_register_write(prefix);
            }
        }

        let event = SlaveEvent {
            direction,
            len: self.cursor,
        };
        self.last = Some(event);
        self.event = Some(event);
        if self.result == SlaveResult::Wait {
            self.result = match direction {
                TransferDirection::Send => SlaveResult::Sent,
                TransferDirection::Receive => SlaveResult::Received,
            };
        }
    }

    fn apply_register_write(&mut self, prefix: usize) {
        let Some((&register, data)) = self.receive.as_ref().and_then(|rx| rx.split_first()) else {
            return;
        };
        self.pointer = register as usize;
        let Some(image) = self.send.as_mut() else {
            return;
        };

        let start = prefix + self.pointer;
        if data.is_empty() || start >= image.len() {
            return;
        }
        let end = (start + data.len()).min(image.len());
        image[start..end].copy_from_slice(&data[..end - start]);
        self.written = union_range(self.written, start - prefix, end - prefix);
    }

    fn enable_check(&mut self) {
        self.enabled = self.send.is_some() && self.receive.is_some();
        self.port.set_enabled(self.enabled);
    }
}

/// Interrupt-driven bus slave.
///
/// Owns the send image and the receive buffer, both at most `N` bytes.
/// Address matching is enabled only while both buffers are assigned. Place
/// it in a `static` and call [`on_interrupt`](BusSlave::on_interrupt) from
/// the slave interrupt vector.
pub struct BusSlave<P: SlavePort, const N: usize> {
    inner: Mutex<RefCell<SlaveInner<P, N>>>,
}

impl<P: SlavePort, const N: usize> BusSlave<P, N> {
    pub const fn new(port: P) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(SlaveInner {
                port,
                state: SlaveState::Idle,
                result: SlaveResult::Idle,
                mode: ImageMode::Plain,
                send: None,
                receive: None,
                receive_capacity: 0,
                cursor: 0,
                resent: false,
                pointer: 0,
                written: None,
                event: None,
                last: None,
                enabled: false,
            })),
        }
    }

    /// Services the pending slave interrupt.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).service());
    }

    pub fn set_address(&self, address: Address) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).port.set_address(address));
    }

    /// Assigns a plain send buffer; every read starts at its first byte.
    pub fn set_send_buffer(&self, data: &[u8]) -> Result<(), Error> {
        let image = heapless::Vec::from_slice(data).map_err(|_| Error::CapacityExceeded)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.mode = ImageMode::Plain;
            inner.send = Some(image);
            inner.enable_check();
        });
        Ok(())
    }

    /// Assigns a register-addressed send image made of `prefix` then `body`.
    ///
    /// Reads return the prefix followed by `body` from the register pointer
    /// on. Master writes select the pointer with their first byte and store
    /// the remaining bytes into `body`.
    pub fn set_register_image(&self, prefix: &[u8], body: &[u8]) -> Result<(), Error> {
        let mut image: heapless::Vec<u8, N> = heapless::Vec::new();
        image
            .extend_from_slice(prefix)
            .map_err(|_| Error::CapacityExceeded)?;
        image
            .extend_from_slice(body)
            .map_err(|_| Error::CapacityExceeded)?;
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.mode = ImageMode::Registers {
                prefix: prefix.len(),
            };
            inner.send = Some(image);
            inner.pointer = 0;
            inner.written = None;
            inner.enable_check();
        });
        Ok(())
    }

    pub fn clear_send_buffer(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.send = None;
            inner.enable_check();
        });
    }

    /// Assigns a receive buffer accepting up to `capacity` bytes per write.
    pub fn set_receive_buffer(&self, capacity: usize) -> Result<(), Error> {
        if capacity == 0 {
            return Err(Error::ZeroLength);
        }
        if capacity > N {
            return Err(Error::CapacityExceeded);
        }
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.receive = Some(heapless::Vec::new());
            inner.receive_capacity = capacity;
            inner.enable_check();
        });
        Ok(())
    }

    pub fn clear_receive_buffer(&self) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.receive = None;
            inner.receive_capacity = 0;
            inner.enable_check();
        });
    }

    pub fn is_enabled(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).enabled)
    }

    pub fn result(&self) -> SlaveResult {
        critical_section::with(|cs| self.inner.borrow_ref(cs).result)
    }

    /// Takes the most recent finished transaction, if not taken yet.
    pub fn take_event(&self) -> Option<SlaveEvent> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).event.take())
    }

    /// The most recent finished transaction.
    pub fn last_transaction(&self) -> Option<SlaveEvent> {
        critical_section::with(|cs| self.inner.borrow_ref(cs).last)
    }

    pub fn register_pointer(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).pointer)
    }

    /// Copies the bytes of the last master write into `out`.
    pub fn received(&self, out: &mut [u8]) -> usize {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            let src = inner.receive.as_deref().unwrap_or(&[]);
            let n = src.len().min(out.len());
            out[..n].copy_from_slice(&src[..n]);
            n
        })
    }

    /// Runs `f` on the register image with interrupts masked.
    ///
    /// Fails with [`Error::NotReady`] unless a register image was assigned
    /// with [`set_register_image`](BusSlave::set_register_image).
    pub fn with_image<R>(&self, f: impl FnOnce(&mut RegisterImage<'_>) -> R) -> Result<R, Error> {
        critical_section::with(|cs| {
            let mut guard = self.inner.borrow_ref_mut(cs);
            let inner = &mut *guard;
            let ImageMode::Registers { prefix } = inner.mode else {
                return Err(Error::NotReady);
            };
            let Some(send) = inner.send.as_mut() else {
                return Err(Error::NotReady);
            };
            let body = send.get_mut(prefix..).ok_or(Error::OutOfBounds)?;
            let mut image = RegisterImage {
                body,
                written: &mut inner.written,
            };
            Ok(f(&mut image))
        })
    }

    /// Runs `f` with exclusive access to the hardware port.
    pub fn with_port<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedSlavePort, SlavePortOp};

    type TestSlave = BusSlave<ScriptedSlavePort, 16>;

    fn interrupt(slave: &TestSlave, status: SlaveStatus) {
        slave.with_port(|p| p.status = status);
        slave.on_interrupt();
    }

    fn address_write(slave: &TestSlave) {
        interrupt(
            slave,
            SlaveStatus::ADDRESS_INTERRUPT | SlaveStatus::ADDRESS_MATCH,
        );
    }

    fn address_read(slave: &TestSlave) {
        interrupt(
            slave,
            SlaveStatus::ADDRESS_INTERRUPT | SlaveStatus::ADDRESS_MATCH | SlaveStatus::READ,
        );
    }

    fn stop(slave: &TestSlave) {
        interrupt(slave, SlaveStatus::ADDRESS_INTERRUPT);
    }

    fn write_byte(slave: &TestSlave, byte: u8) {
        slave.with_port(|p| {
            p.status = SlaveStatus::DATA_INTERRUPT;
            p.rx_byte = byte;
        });
        slave.on_interrupt();
    }

    fn read_byte(slave: &TestSlave, nacked: bool) -> u8 {
        let mut status = SlaveStatus::DATA_INTERRUPT | SlaveStatus::READ;
        if nacked {
            status |= SlaveStatus::RX_NACK;
        }
        interrupt(slave, status);
        slave.with_port(|p| p.tx_byte)
    }

    fn ready_slave() -> TestSlave {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        slave.set_send_buffer(&[1, 2, 3]).unwrap();
        slave.set_receive_buffer(4).unwrap();
        slave
    }

    #[test]
    fn enabled_only_with_both_buffers() {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        assert!(!slave.is_enabled());
        slave.set_send_buffer(&[1]).unwrap();
        assert!(!slave.is_enabled());
        slave.set_receive_buffer(4).unwrap();
        assert!(slave.is_enabled());
        assert!(slave.with_port(|p| p.enabled));
        slave.clear_send_buffer();
        assert!(!slave.is_enabled());
        assert!(!slave.with_port(|p| p.enabled));
    }

    #[test]
    fn sends_buffer_then_zero_sentinel() {
        let slave = ready_slave();
        address_read(&slave);
        assert_eq!(slave.result(), SlaveResult::Wait);
        let bytes: [u8; 5] = core::array::from_fn(|_| read_byte(&slave, false));
        assert_eq!(bytes, [1, 2, 3, 0, 0]);
        stop(&slave);

        assert_eq!(slave.result(), SlaveResult::Sent);
        assert_eq!(
            slave.take_event(),
            Some(SlaveEvent {
                direction: TransferDirection::Send,
                len: 5
            })
        );
        assert_eq!(slave.take_event(), None);
    }

    #[test]
    fn nacked_byte_is_resent_once() {
        let slave = ready_slave();
        address_read(&slave);
        assert_eq!(read_byte(&slave, false), 1);
        assert_eq!(read_byte(&slave, true), 1);
        assert_eq!(read_byte(&slave, true), 2);
        assert_eq!(read_byte(&slave, false), 3);
    }

    #[test]
    fn receives_until_full_then_nacks() {
        let slave = ready_slave();
        address_write(&slave);
        for b in [10, 11, 12, 13] {
            write_byte(&slave, b);
        }
        assert_eq!(
            slave.with_port(|p| *p.log.last().unwrap()),
            SlavePortOp::Respond(Acknowledge::Ack, SlaveCommand::Response)
        );
        write_byte(&slave, 14);
        assert_eq!(
            slave.with_port(|p| *p.log.last().unwrap()),
            SlavePortOp::Respond(Acknowledge::Nack, SlaveCommand::Complete)
        );
        assert_eq!(slave.result(), SlaveResult::NackSent);
        stop(&slave);

        let mut out = [0u8; 8];
        assert_eq!(slave.received(&mut out), 4);
        assert_eq!(&out[..4], &[10, 11, 12, 13]);
        assert_eq!(slave.result(), SlaveResult::NackSent);
        assert_eq!(slave.last_transaction().unwrap().len, 4);
    }

    #[test]
    fn acks_address_without_buffers() {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        address_read(&slave);
        assert_eq!(
            slave.with_port(|p| *p.log.last().unwrap()),
            SlavePortOp::Respond(Acknowledge::Ack, SlaveCommand::Response)
        );
        assert_eq!(read_byte(&slave, false), 0);
    }

    #[test]
    fn repeated_start_finalizes_previous_transaction() {
        let slave = ready_slave();
        address_write(&slave);
        write_byte(&slave, 7);
        address_read(&slave);
        assert_eq!(
            slave.take_event(),
            Some(SlaveEvent {
                direction: TransferDirection::Receive,
                len: 1
            })
        );
        assert_eq!(slave.result(), SlaveResult::Wait);
    }

    #[test]
    fn bus_error_returns_to_idle() {
        let slave = ready_slave();
        address_write(&slave);
        interrupt(&slave, SlaveStatus::BUS_ERROR);
        assert_eq!(slave.result(), SlaveResult::Error);
        // Data after the fault is refused
        write_byte(&slave, 1);
        assert_eq!(
            slave.with_port(|p| *p.log.last().unwrap()),
            SlavePortOp::Respond(Acknowledge::Nack, SlaveCommand::Complete)
        );
    }

    #[test]
    fn register_image_addressing() {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        slave.set_register_image(&[0x5E], &[0xA0, 0xA1, 0xA2, 0xA3]).unwrap();
        slave.set_receive_buffer(8).unwrap();

        // Bare read: prefix then image from 0
        address_read(&slave);
        let bytes: [u8; 3] = core::array::from_fn(|_| read_byte(&slave, false));
        assert_eq!(bytes, [0x5E, 0xA0, 0xA1]);
        stop(&slave);

        // Register write then repeated-start read from the same register
        address_write(&slave);
        write_byte(&slave, 2);
        address_read(&slave);
        assert_eq!(slave.register_pointer(), 2);
        let bytes: [u8; 4] = core::array::from_fn(|_| read_byte(&slave, false));
        assert_eq!(bytes, [0x5E, 0xA2, 0xA3, 0]);
        stop(&slave);
        assert_eq!(slave.register_pointer(), 0);

        // Register write with data lands in the image
        address_write(&slave);
        write_byte(&slave, 1);
        write_byte(&slave, 0x11);
        write_byte(&slave, 0x22);
        stop(&slave);
        let (body, written) = slave
            .with_image(|image| {
                let mut body = [0u8; 4];
                body.copy_from_slice(image.body());
                (body, image.take_written())
            })
            .unwrap();
        assert_eq!(body, [0xA0, 0x11, 0x22, 0xA3]);
        assert_eq!(written, Some((1, 3)));
        assert_eq!(slave.with_image(|image| image.take_written()).unwrap(), None);
    }

    #[test]
    fn bus_error_resets_register_pointer() {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        slave.set_register_image(&[0x5E], &[0xA0, 0xA1, 0xA2, 0xA3]).unwrap();
        slave.set_receive_buffer(8).unwrap();

        address_write(&slave);
        write_byte(&slave, 3);
        address_read(&slave);
        assert_eq!(slave.register_pointer(), 3);
        interrupt(&slave, SlaveStatus::BUS_ERROR);
        assert_eq!(slave.register_pointer(), 0);

        // No stop was seen; the next bare read starts at the prefix again
        address_read(&slave);
        let bytes: [u8; 2] = core::array::from_fn(|_| read_byte(&slave, false));
        assert_eq!(bytes, [0x5E, 0xA0]);
    }

    #[test]
    fn register_write_past_image_is_clipped() {
        let slave = TestSlave::new(ScriptedSlavePort::default());
        slave.set_register_image(&[0x5E], &[0; 4]).unwrap();
        slave.set_receive_buffer(8).unwrap();

        address_write(&slave);
        for b in [3, 0xEE, 0xFF] {
            write_byte(&slave, b);
        }
        stop(&slave);
        let written = slave.with_image(|image| image.take_written()).unwrap();
        assert_eq!(written, Some((3, 4)));
    }

    #[test]
    fn with_image_needs_register_mode() {
        let slave = ready_slave();
        assert_eq!(slave.with_image(|_| ()), Err(Error::NotReady));
    }
}
