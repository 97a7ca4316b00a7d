use crate::{
    Error,
    bus::{Address, Completion, TwiMaster},
};

/// Verdict of an [`AddressCheck`] after a completed bus operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStep {
    /// A follow-up operation was issued; wait for its completion.
    Pending,
    Accept,
    Reject,
}

/// Per-address test run by a [`Scanner`].
pub trait AddressCheck {
    /// Starts checking `address`.
    fn begin<M: TwiMaster>(&mut self, master: &M, address: Address) -> Result<(), Error>;

    /// Evaluates a completed operation started by this check.
    fn on_completion<M: TwiMaster>(&mut self, master: &M, completion: Completion) -> CheckStep;
}

/// Accepts any address that acknowledges a probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProbeCheck;

impl AddressCheck for ProbeCheck {
    fn begin<M: TwiMaster>(&mut self, master: &M, address: Address) -> Result<(), Error> {
        master.probe_address(address)
    }

    fn on_completion<M: TwiMaster>(&mut self, _master: &M, completion: Completion) -> CheckStep {
        if completion.result.is_success() {
            CheckStep::Accept
        } else {
            CheckStep::Reject
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    /// The check escalated to a follow-up read at the current address.
    Reading,
    Found,
}

/// [`Scanner::found`] value while a scan is running.
pub const FOUND_SCANNING: u8 = 0x00;
/// [`Scanner::found`] value when idle without a hit.
pub const FOUND_IDLE: u8 = 0x7F;
/// Flag set in [`Scanner::found`] next to the found address.
pub const FOUND_FLAG: u8 = 0x80;

/// Linear address sweep driven one step per [`update`](Scanner::update).
///
/// The range is inclusive. A one-shot scan goes idle after the end address;
/// otherwise it wraps to the start address and keeps going.
pub struct Scanner<'m, M: TwiMaster, C: AddressCheck> {
    master: &'m M,
    check: C,
    start: Address,
    end: Address,
    oneshot: bool,
    current: Address,
    state: ScanState,
    issued: bool,
}

/// Scanner accepting any acknowledging address.
pub type BusScanner<'m, M> = Scanner<'m, M, ProbeCheck>;

impl<'m, M: TwiMaster> Scanner<'m, M, ProbeCheck> {
    pub fn new(master: &'m M, start: Address, end: Address, oneshot: bool) -> Result<Self, Error> {
        Self::with_check(master, ProbeCheck, start, end, oneshot)
    }
}

impl<'m, M: TwiMaster, C: AddressCheck> Scanner<'m, M, C> {
    pub fn with_check(
        master: &'m M,
        check: C,
        start: Address,
        end: Address,
        oneshot: bool,
    ) -> Result<Self, Error> {
        if start > end {
            return Err(Error::InvalidAddress);
        }
        Ok(Self {
            master,
            check,
            start,
            end,
            oneshot,
            current: start,
            state: ScanState::Idle,
            issued: false,
        })
    }

    /// Starts a scan at the start address.
    pub fn scan(&mut self) {
        self.scan_from(self.start);
    }

    /// Starts a scan at `address`, clamped into the configured range.
    pub fn scan_from(&mut self, address: Address) {
        self.current = address.clamp(self.start, self.end);
        self.state = ScanState::Scanning;
        self.issued = false;
        self.issue();
    }

    /// Continues with the address after the current one.
    pub fn resume(&mut self) {
        self.issued = false;
        self.state = ScanState::Scanning;
        self.advance();
        if self.state == ScanState::Scanning {
            self.issue();
        }
    }

    pub fn stop(&mut self) {
        self.state = ScanState::Idle;
        self.issued = false;
    }

    /// Advances the scan by at most one bus operation.
    pub fn update(&mut self) {
        if !matches!(self.state, ScanState::Scanning | ScanState::Reading) {
            return;
        }
        if !self.issued {
            self.issue();
            return;
        }

        let Some(completion) = self.master.take_completion() else {
            return;
        };
        if completion.address != self.current {
            // Left over from an operation started before a restart.
            self.issued = false;
            self.issue();
            return;
        }

        match self.check.on_completion(self.master, completion) {
            CheckStep::Pending => self.state = ScanState::Reading,
            CheckStep::Accept => {
                log::info!("scan hit at {}", self.current);
                self.state = ScanState::Found;
                self.issued = false;
            }
            CheckStep::Reject => {
                self.issued = false;
                self.advance();
                if self.state == ScanState::Scanning {
                    self.issue();
                }
            }
        }
    }

    /// Tri-state scan result: `0x80 | address` when found, `0x00` while
    /// scanning, `0x7F` when idle.
    pub fn found(&self) -> u8 {
        match self.state {
            ScanState::Found => FOUND_FLAG | self.current.get(),
            ScanState::Scanning | ScanState::Reading => FOUND_SCANNING,
            ScanState::Idle => FOUND_IDLE,
        }
    }

    pub fn found_address(&self) -> Option<Address> {
        (self.state == ScanState::Found).then_some(self.current)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn current(&self) -> Address {
        self.current
    }

    pub fn check(&self) -> &C {
        &self.check
    }

    fn issue(&mut self) {
        match self.check.begin(self.master, self.current) {
            Ok(()) => {
                self.issued = true;
                self.state = ScanState::Scanning;
            }
            // Retried on the next update.
            Err(Error::Busy) => {}
            Err(e) => {
                log::warn!("check at {} not started: {}", self.current, e);
                self.advance();
            }
        }
    }

    fn advance(&mut self) {
        if self.current >= self.end {
            if self.oneshot {
                self.state = ScanState::Idle;
                return;
            }
            self.current = self.start;
        } else {
            self.current = self.current.next().unwrap_or(self.start);
        }
        self.state = ScanState::Scanning;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockMaster, addr};

    #[test]
    fn finds_single_responder() {
        let master = MockMaster::new();
        master.attach(addr(42), &[0x5E]);
        let mut scanner = BusScanner::new(&master, Address::MIN, Address::MAX, true).unwrap();
        assert_eq!(scanner.found(), FOUND_IDLE);

        scanner.scan();
        assert_eq!(scanner.found(), FOUND_SCANNING);
        for _ in 0..64 {
            scanner.update();
        }
        assert_eq!(scanner.found(), 0x80 | 42);
        assert_eq!(scanner.found_address(), Some(addr(42)));
        assert_eq!(master.probes(), 42);
    }

    #[test]
    fn oneshot_goes_idle_after_inclusive_end() {
        let master = MockMaster::new();
        master.attach(addr(10), &[0x5E]);
        let mut scanner = BusScanner::new(&master, addr(5), addr(10), true).unwrap();
        scanner.scan();
        for _ in 0..16 {
            scanner.update();
        }
        // End address is part of the range
        assert_eq!(scanner.found_address(), Some(addr(10)));

        let mut scanner = BusScanner::new(&master, addr(5), addr(9), true).unwrap();
        master.clear_log();
        scanner.scan();
        for _ in 0..16 {
            scanner.update();
        }
        assert_eq!(scanner.state(), ScanState::Idle);
        assert_eq!(scanner.found(), FOUND_IDLE);
        // Exactly one probe per address, nothing after the sweep ended
        assert_eq!(master.probes(), 5);
    }

    #[test]
    fn continuous_scan_wraps() {
        let master = MockMaster::new();
        master.attach(addr(3), &[0x5E]);
        let mut scanner = BusScanner::new(&master, addr(1), addr(8), false).unwrap();
        scanner.scan_from(addr(5));
        for _ in 0..16 {
            scanner.update();
        }
        assert_eq!(scanner.found_address(), Some(addr(3)));
    }

    #[test]
    fn resume_continues_after_hit() {
        let master = MockMaster::new();
        master.attach(addr(3), &[0x5E]);
        master.attach(addr(6), &[0x5E]);
        let mut scanner = BusScanner::new(&master, addr(1), addr(8), true).unwrap();
        scanner.scan();
        for _ in 0..16 {
            scanner.update();
        }
        assert_eq!(scanner.found_address(), Some(addr(3)));

        scanner.resume();
        for _ in 0..16 {
            scanner.update();
        }
        assert_eq!(scanner.found_address(), Some(addr(6)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let master = MockMaster::new();
        assert!(matches!(
            BusScanner::new(&master, addr(10), addr(9), true),
            Err(Error::InvalidAddress)
        ));
    }

    #[test]
    fn stop_returns_to_idle() {
        let master = MockMaster::new();
        let mut scanner = BusScanner::new(&master, addr(1), addr(8), false).unwrap();
        scanner.scan();
        scanner.update();
        scanner.stop();
        assert_eq!(scanner.found(), FOUND_IDLE);
        let before = master.probes();
        scanner.update();
        assert_eq!(master.probes(), before);
    }
}
