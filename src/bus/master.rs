use core::cell::RefCell;

use critical_section::Mutex;

use crate::{
    Error,
    bus::{
        Address, BusResult, Completion,
        port::{Acknowledge, MasterCommand, MasterPort, MasterStatus},
    },
};

/// Mainline interface of a bus master.
///
/// Every operation starts asynchronously and returns immediately. Exactly
/// one operation may be outstanding; starting another while the result is
/// [`BusResult::Wait`] fails with [`Error::Busy`]. The outcome is collected
/// with [`take_completion`](TwiMaster::take_completion) and any received
/// bytes with [`read_received`](TwiMaster::read_received).
pub trait TwiMaster {
    /// Address-only transaction; succeeds when the address is acknowledged.
    fn probe_address(&self, address: Address) -> Result<(), Error>;

    /// Writes all of `data`.
    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), Error>;

    /// Writes `data` up to and including its first zero byte.
    fn write_until_nul(&self, address: Address, data: &[u8]) -> Result<(), Error>;

    /// Reads `len` bytes, NACKing the last one. A `len` of 0 reads until a
    /// zero byte arrives or the scratch buffer is full.
    fn read_bytes(&self, address: Address, len: usize) -> Result<(), Error>;

    /// Writes `data`, issues a repeated start, then reads as [`read_bytes`](TwiMaster::read_bytes).
    fn write_then_read(&self, address: Address, data: &[u8], len: usize) -> Result<(), Error>;

    /// Writes `data` prefixed by a one-byte register address.
    fn write_to_address(&self, address: Address, register: u8, data: &[u8]) -> Result<(), Error>;

    /// Selects `register` and reads `len` bytes in one write-then-read.
    fn read_from_address(&self, address: Address, register: u8, len: usize) -> Result<(), Error>;

    /// Latched result of the current or last operation.
    fn result(&self) -> BusResult;

    /// Takes the posted completion, if any.
    fn take_completion(&self) -> Option<Completion>;

    /// Copies received bytes, skipping the first `skip`, into `out`.
    ///
    /// Returns the number of bytes copied.
    fn read_received(&self, skip: usize, out: &mut [u8]) -> usize;

    /// Size of the transfer scratch buffers in bytes.
    fn capacity(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Idle,
    Probe,
    Write,
    Read,
    WriteRead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AddressPacket,
    DataPacket,
}

/// One transfer direction: buffer, requested length and cursor.
struct Transaction<const N: usize> {
    buf: heapless::Vec<u8, N>,
    /// Requested length, 0 meaning "until a zero byte".
    len: usize,
    cursor: usize,
}

impl<const N: usize> Transaction<N> {
    const fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
            len: 0,
            cursor: 0,
        }
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.len = 0;
        self.cursor = 0;
    }

    fn load(&mut self, prefix: Option<u8>, data: &[u8]) -> Result<(), Error> {
        self.reset();
        if let Some(byte) = prefix {
            self.buf.push(byte).map_err(|_| Error::CapacityExceeded)?;
        }
        self.buf
            .extend_from_slice(data)
            .map_err(|_| Error::CapacityExceeded)?;
        self.len = self.buf.len();
        Ok(())
    }

    fn expect_len(&mut self, len: usize) -> Result<(), Error> {
        if len > N {
            return Err(Error::CapacityExceeded);
        }
        self.reset();
        self.len = len;
        Ok(())
    }

    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.buf.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(byte)
    }

    /// Stores a received byte; returns true once the transfer is complete.
    fn store(&mut self, byte: u8) -> bool {
        if self.buf.push(byte).is_err() {
            return true;
        }
        self.cursor += 1;
        if self.len == 0 {
            byte == 0 || self.buf.len() == self.buf.capacity()
        } else {
            self.cursor >= self.len
        }
    }
}

struct MasterInner<P, const N: usize> {
    port: P,
    op: Operation,
    phase: Phase,
    address: Option<Address>,
    result: BusResult,
    tx: Transaction<N>,
    rx: Transaction<N>,
    completion: Option<Completion>,
}

impl<P: MasterPort, const N: usize> MasterInner<P, N> {
    fn service(&mut self) {
        let status = self.port.status();
        if self.op == Operation::Idle {
            // Nothing to finish; release the bus and keep the last result.
            self.port.command(Acknowledge::Ack, MasterCommand::Stop);
            return;
        }
        if status.contains(MasterStatus::ARBITRATION_LOST) {
            self.abort(BusResult::ArbitrationLost);
        } else if status.contains(MasterStatus::BUS_ERROR) {
            self.abort(BusResult::BusError);
        } else if status.contains(MasterStatus::WRITE_INTERRUPT) {
            self.on_write(status);
        } else if status.contains(MasterStatus::READ_INTERRUPT) {
            self.on_read();
        }
    }

    fn on_write(&mut self, status: MasterStatus) {
        let after_address = self.phase == Phase::AddressPacket;
        self.phase = Phase::DataPacket;

        if status.contains(MasterStatus::RX_NACK) {
            let result = if after_address {
                BusResult::NoResponse
            } else {
                BusResult::NackReceived
            };
            self.stop(result);
            return;
        }

        match self.op {
            Operation::Probe => self.stop(BusResult::Success),
            Operation::Write | Operation::WriteRead => match self.tx.next_byte() {
                Some(byte) => self.port.write_data(byte),
                None if self.op == Operation::WriteRead => self.repeated_start(),
                None => self.stop(BusResult::Success),
            },
            // A read address packet completes with a read interrupt.
            Operation::Read | Operation::Idle => self.abort(BusResult::BusError),
        }
    }

    fn on_read(&mut self) {
        self.phase = Phase::DataPacket;
        if self.op != Operation::Read {
            self.abort(BusResult::BusError);
            return;
        }

        let byte = self.port.read_data();
        if self.rx.store(byte) {
            self.port.command(Acknowledge::Nack, MasterCommand::Stop);
            self.finish(BusResult::Success);
        } else {
            self.port
                .command(Acknowledge::Ack, MasterCommand::ReceiveNext);
        }
    }

    fn repeated_start(&mut self) {
        match self.address {
            Some(address) => {
                self.op = Operation::Read;
                self.phase = Phase::AddressPacket;
                self.port.start(address.read_byte());
            }
            None => self.abort(BusResult::BusError),
        }
    }

    fn stop(&mut self, result: BusResult) {
        self.port.command(Acknowledge::Ack, MasterCommand::Stop);
        self.finish(result);
    }

    fn abort(&mut self, result: BusResult) {
        self.port.command(Acknowledge::Ack, MasterCommand::Stop);
        self.tx.reset();
        self.finish(result);
    }

    fn finish(&mut self, result: BusResult) {
        self.op = Operation::Idle;
        self.phase = Phase::Idle;
        self.result = result;
        if let Some(address) = self.address {
            self.completion = Some(Completion {
                address,
                result,
                received: self.rx.buf.len(),
            });
        }
    }
}

/// Interrupt-driven bus master.
///
/// Owns the hardware port and two scratch buffers of `N` bytes. Place it in
/// a `static` and call [`on_interrupt`](BusMaster::on_interrupt) from the
/// master interrupt vector; drive it from mainline code through
/// [`TwiMaster`].
pub struct BusMaster<P: MasterPort, const N: usize> {
    inner: Mutex<RefCell<MasterInner<P, N>>>,
}

impl<P: MasterPort, const N: usize> BusMaster<P, N> {
    pub const fn new(port: P) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(MasterInner {
                port,
                op: Operation::Idle,
                phase: Phase::Idle,
                address: None,
                result: BusResult::Idle,
                tx: Transaction::new(),
                rx: Transaction::new(),
                completion: None,
            })),
        }
    }

    /// Services the pending master interrupt.
    ///
    /// Runs to completion without blocking; never starts a new operation.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).service());
    }

    /// True when no operation is pending and the bus is idle.
    pub fn ready(&self) -> bool {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            !inner.result.is_pending() && inner.port.bus_idle()
        })
    }

    /// True while a posted completion has not been taken.
    pub fn attention(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).completion.is_some())
    }

    /// Runs `f` with exclusive access to the hardware port.
    pub fn with_port<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs).port))
    }

    fn begin(
        &self,
        address: Address,
        op: Operation,
        setup: impl FnOnce(&mut MasterInner<P, N>) -> Result<(), Error>,
    ) -> Result<(), Error> {
        critical_section::with(|cs| {
            let mut guard = self.inner.borrow_ref_mut(cs);
            let inner = &mut *guard;
            if inner.result.is_pending() {
                return Err(Error::Busy);
            }

            inner.tx.reset();
            inner.rx.reset();
            setup(inner)?;

            inner.op = op;
            inner.phase = Phase::AddressPacket;
            inner.address = Some(address);
            inner.result = BusResult::Wait;
            inner.completion = None;

            let byte = match op {
                Operation::Read => address.read_byte(),
                _ => address.write_byte(),
            };
            inner.port.start(byte);
            Ok(())
        })
    }
}

impl<P: MasterPort, const N: usize> TwiMaster for BusMaster<P, N> {
    fn probe_address(&self, address: Address) -> Result<(), Error> {
        self.begin(address, Operation::Probe, |_| Ok(()))
    }

    fn write_bytes(&self, address: Address, data: &[u8]) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }
        self.begin(address, Operation::Write, |inner| inner.tx.load(None, data))
    }

    fn write_until_nul(&self, address: Address, data: &[u8]) -> Result<(), Error> {
        let end = data
            .iter()
            .position(|&b| b == 0)
            .map_or(data.len(), |nul| nul + 1);
        self.write_bytes(address, &data[..end])
    }

    fn read_bytes(&self, address: Address, len: usize) -> Result<(), Error> {
        self.begin(address, Operation::Read, |inner| inner.rx.expect_len(len))
    }

    fn write_then_read(&self, address: Address, data: &[u8], len: usize) -> Result<(), Error> {
        if data.is_empty() {
            return Err(Error::ZeroLength);
        }
        self.begin(address, Operation::WriteRead, |inner| {
            inner.tx.load(None, data)?;
            inner.rx.expect_len(len)
        })
    }

    fn write_to_address(&self, address: Address, register: u8, data: &[u8]) -> Result<(), Error> {
        self.begin(address, Operation::Write, |inner| {
            inner.tx.load(Some(register), data)
        })
    }

    fn read_from_address(&self, address: Address, register: u8, len: usize) -> Result<(), Error> {
        self.begin(address, Operation::WriteRead, |inner| {
            inner.tx.load(Some(register), &[])?;
            inner.rx.expect_len(len)
        })
    }

    fn result(&self) -> BusResult {
        critical_section::with(|cs| self.inner.borrow_ref(cs).result)
    }

    fn take_completion(&self) -> Option<Completion> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).completion.take())
    }

    fn read_received(&self, skip: usize, out: &mut [u8]) -> usize {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            let src = inner.rx.buf.get(skip..).unwrap_or(&[]);
            let n = src.len().min(out.len());
            out[..n].copy_from_slice(&src[..n]);
            n
        })
    }

    fn capacity(&self) -> usize {
        N
    }
}
