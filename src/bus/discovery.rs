use crate::{
    Error,
    bus::{
        Address, Completion, TwiMaster,
        scanner::{AddressCheck, CheckStep, ScanState, Scanner},
    },
    module::metadata::{HEADER, RESPONSE_PREFIX},
};

/// Identity of a protocol-conformant peripheral captured during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ModuleDescriptor {
    pub address: Address,
    pub signature: u8,
    pub id: u8,
}

/// Prefix byte, both header bytes, signature and id.
const METADATA_READ_LEN: usize = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum CheckPhase {
    #[default]
    Prefix,
    Metadata,
}

/// Two-phase check: a cheap one-byte read, escalated to a metadata read only
/// when that byte is the protocol prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleCheck {
    phase: CheckPhase,
    descriptor: Option<ModuleDescriptor>,
}

impl ModuleCheck {
    pub fn descriptor(&self) -> Option<ModuleDescriptor> {
        self.descriptor
    }
}

impl AddressCheck for ModuleCheck {
    fn begin<M: TwiMaster>(&mut self, master: &M, address: Address) -> Result<(), Error> {
        self.phase = CheckPhase::Prefix;
        self.descriptor = None;
        master.read_bytes(address, 1)
    }

    fn on_completion<M: TwiMaster>(&mut self, master: &M, completion: Completion) -> CheckStep {
        if !completion.result.is_success() {
            return CheckStep::Reject;
        }

        match self.phase {
            CheckPhase::Prefix => {
                let mut first = [0u8; 1];
                if master.read_received(0, &mut first) != 1 || first[0] != RESPONSE_PREFIX {
                    log::debug!(
                        "{} answered {:#04x}, not a module",
                        completion.address,
                        first[0]
                    );
                    return CheckStep::Reject;
                }
                match master.read_from_address(completion.address, 0, METADATA_READ_LEN) {
                    Ok(()) => {
                        self.phase = CheckPhase::Metadata;
                        CheckStep::Pending
                    }
                    Err(_) => CheckStep::Reject,
                }
            }
            CheckPhase::Metadata => {
                let mut buf = [0u8; METADATA_READ_LEN];
                if master.read_received(0, &mut buf) != METADATA_READ_LEN || buf[1..3] != HEADER {
                    log::debug!("{} failed header check", completion.address);
                    return CheckStep::Reject;
                }
                self.descriptor = Some(ModuleDescriptor {
                    address: completion.address,
                    signature: buf[3],
                    id: buf[4],
                });
                CheckStep::Accept
            }
        }
    }
}

/// Address sweep that only stops at protocol-conformant peripherals.
pub struct ModuleDiscovery<'m, M: TwiMaster> {
    scanner: Scanner<'m, M, ModuleCheck>,
}

impl<'m, M: TwiMaster> ModuleDiscovery<'m, M> {
    pub fn new(master: &'m M, start: Address, end: Address, oneshot: bool) -> Result<Self, Error> {
        Ok(Self {
            scanner: Scanner::with_check(master, ModuleCheck::default(), start, end, oneshot)?,
        })
    }

    pub fn scan(&mut self) {
        self.scanner.scan();
    }

    pub fn scan_from(&mut self, address: Address) {
        self.scanner.scan_from(address);
    }

    /// Continues after the last found module.
    pub fn resume(&mut self) {
        self.scanner.resume();
    }

    pub fn stop(&mut self) {
        self.scanner.stop();
    }

    pub fn update(&mut self) {
        let was_found = self.scanner.state() == ScanState::Found;
        self.scanner.update();
        if was_found {
            return;
        }
        if let Some(found) = self.descriptor() {
            log::info!(
                "module {:#04x}/{} at {}",
                found.signature,
                found.id,
                found.address
            );
        }
    }

    /// See [`Scanner::found`].
    pub fn found(&self) -> u8 {
        self.scanner.found()
    }

    pub fn state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Descriptor of the found module, once the scan stopped on one.
    pub fn descriptor(&self) -> Option<ModuleDescriptor> {
        match self.scanner.state() {
            ScanState::Found => self.scanner.check().descriptor(),
            _ => None,
        }
    }
}
